//! Score Cursor - positional traversal and editing of music scores
//!
//! A [`Cursor`] walks the segments of a [`Score`] track by track, in score
//! order or in playback order with repeats expanded, reads what it finds
//! through [`ElementW`] wrappers and writes notes and other elements at its
//! position. Command files ([`script`]) drive a cursor from the command line.

pub mod cursor;
pub mod error;
pub mod listing;
pub mod score;
pub mod script;
pub mod types;
pub mod util;
pub mod wrapper;

#[cfg(feature = "midi")]
pub mod midi;

// Re-export commonly used types
pub use cursor::{Cursor, CursorState, RewindMode};
pub use error::ScoreError;
pub use listing::Listing;
pub use score::{Score, ScoreRef, VOICES};
pub use types::element::{Element, ElementType, Property, PropertyValue};
pub use types::fraction::{DIVISION, Fraction};
pub use types::segment_type::{SegmentType, SegmentTypeFilter};
pub use types::signature::{Key, TimeSignature};
pub use wrapper::ElementW;
