use super::command::{Command, parse_command_line};
use anyhow::{Result, bail};

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptLine {
    /// 1-based line number in the source.
    pub line: usize,
    pub command: Command,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    pub lines: Vec<ScriptLine>,
}

pub fn parse_script(content: &str) -> Result<Script> {
    let mut parser = ScriptParser::new();
    parser.parse(content)
}

pub struct ScriptParser {}

impl Default for ScriptParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptParser {
    pub fn new() -> Self {
        Self {}
    }

    pub fn parse(&mut self, content: &str) -> Result<Script> {
        let mut script = Script::default();

        for (line_idx, line) in content.lines().enumerate() {
            match parse_command_line(line) {
                Ok(Some(command)) => script.lines.push(ScriptLine {
                    line: line_idx + 1,
                    command,
                }),
                Ok(None) => {}
                Err(e) => bail!("Line #{}: {}", line_idx + 1, e),
            }
        }

        Ok(script)
    }
}
