//! Line-oriented command files that drive a [`Cursor`](crate::cursor::Cursor).
//!
//! ```text
//! // two measures of 3/4, then a short melody
//! measure 3/4 2
//! rewind 0
//! duration 1 8
//! note 60
//! note 62
//! print
//! ```

pub mod command;
pub mod parser;
pub mod runner;

pub use command::{Command, parse_command_line};
pub use parser::{Script, ScriptLine, parse_script};
pub use runner::{ScoreSetup, ScriptRunner};
