use super::command::Command;
use super::parser::Script;
use crate::cursor::{Cursor, CursorState};
use crate::listing::Listing;
use crate::score::{Score, ScoreRef};
use crate::types::element::PropertyValue;
use crate::types::signature::TimeSignature;
use crate::util::format_float;
use anyhow::{Context, Result, bail};

/// How the score is set up before a command file runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSetup {
    pub staves: usize,
    pub measures: usize,
    pub time_signature: TimeSignature,
    pub tempo: Option<f64>,
    pub expand_repeats: bool,
}

impl Default for ScoreSetup {
    fn default() -> Self {
        Self {
            staves: 1,
            measures: 0,
            time_signature: TimeSignature::default(),
            tempo: None,
            expand_repeats: false,
        }
    }
}

impl ScoreSetup {
    pub fn build(&self) -> Result<ScoreRef> {
        if self.staves == 0 {
            bail!("A score needs at least one staff");
        }
        let mut score = Score::new(self.staves);
        score.append_measures(self.measures, self.time_signature);
        if let Some(bpm) = self.tempo {
            score.set_tempo(0, bpm)?;
        }
        Ok(score.into_ref())
    }
}

/// Executes commands against a score through a single cursor.
pub struct ScriptRunner {
    score: ScoreRef,
    cursor: Cursor,
    output: Vec<String>,
}

impl ScriptRunner {
    pub fn new(setup: &ScoreSetup) -> Result<Self> {
        let score = setup.build()?;
        let cursor = Cursor::with_score_expanded(&score, setup.expand_repeats);
        Ok(Self {
            score,
            cursor,
            output: Vec::new(),
        })
    }

    pub fn score(&self) -> &ScoreRef {
        &self.score
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Lines written by `print`.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn into_score(self) -> ScoreRef {
        self.score
    }

    /// Runs every command; returns how many were executed.
    pub fn run(&mut self, script: &Script) -> Result<usize> {
        for line in &script.lines {
            self.execute(&line.command)
                .with_context(|| format!("Line #{}: {}", line.line, line.command))?;
        }
        log::info!("executed {} commands", script.lines.len());
        Ok(script.lines.len())
    }

    pub fn execute(&mut self, command: &Command) -> Result<()> {
        log::debug!("{}", command);
        match command {
            Command::Staves(count) => {
                if self.score.borrow().measure_count() > 0 {
                    bail!("Staves must be set before the first measure");
                }
                self.score = Score::new(*count).into_ref();
                self.cursor.set_score(Some(&self.score));
            }
            Command::Measure { signature, count } => {
                self.score.borrow_mut().append_measures(*count, *signature);
            }
            Command::Tempo { tick, bpm } => self.score.borrow_mut().set_tempo(*tick, *bpm)?,
            Command::Key { staff, tick, key } => {
                self.score.borrow_mut().set_key(*staff, *tick, *key)?
            }
            Command::RepeatStart { measure } => {
                self.score.borrow_mut().set_repeat_start(measure - 1, true)?
            }
            Command::RepeatEnd { measure, count } => self
                .score
                .borrow_mut()
                .set_repeat_end(measure - 1, Some(*count))?,
            Command::Select {
                start_tick,
                end_tick,
                staff_start,
                staff_end,
            } => self.score.borrow_mut().select_range(
                *start_tick,
                *end_tick,
                *staff_start,
                *staff_end,
            )?,
            Command::Track(track) => self.cursor.set_track(*track),
            Command::Staff(staff) => self.cursor.set_staff_idx(*staff),
            Command::Voice(voice) => self.cursor.set_voice(*voice),
            Command::Filter(filter) => self.cursor.set_filter(*filter),
            Command::ExpandRepeats(on) => self.cursor.set_expand_repeats(*on),
            Command::Rewind(mode) => self.cursor.rewind(*mode),
            Command::Next => {
                if !self.cursor.next() {
                    log::debug!("end of score reached");
                }
            }
            Command::NextMeasure => {
                if !self.cursor.next_measure() {
                    log::debug!("no further measure");
                }
            }
            Command::Duration { z, n } => self.cursor.set_duration(*z, *n),
            Command::Note(pitch) => {
                self.require_position()?;
                if !self.cursor.add_note(*pitch) {
                    bail!("Could not write note {}", pitch);
                }
            }
            Command::Add(element) => {
                self.require_position()?;
                if !self.cursor.add(element.clone()) {
                    bail!("Could not add {}", element);
                }
            }
            Command::Print => {
                let line = self.describe_position();
                log::info!("{}", line);
                self.output.push(line);
            }
        }
        Ok(())
    }

    fn require_position(&self) -> Result<()> {
        match self.cursor.state() {
            CursorState::BoundPositioned => Ok(()),
            state => bail!("Cursor is not positioned ({:?})", state),
        }
    }

    fn describe_position(&self) -> String {
        let cursor = &self.cursor;
        if cursor.state() != CursorState::BoundPositioned {
            return format!("track {}: not positioned", cursor.track());
        }
        let measure = match cursor.measure().and_then(|m| m.get("number")) {
            Some(PropertyValue::Int(number)) => number,
            _ => 0,
        };
        let element = cursor
            .element()
            .and_then(|e| e.element())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "track {} measure {} tick {} time {} tempo {} key {}: {}",
            cursor.track(),
            measure,
            cursor.tick(),
            format_float(cursor.time()),
            format_float(cursor.tempo()),
            cursor.key_signature(),
            element
        )
    }

    /// Listing of the current score with the cursor's filter and repeat mode.
    pub fn listing(&self) -> Listing {
        Listing::new(
            &self.score,
            self.cursor.filter(),
            self.cursor.expand_repeats(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parser::parse_script;
    use pretty_assertions::assert_eq;

    fn run(source: &str) -> Result<ScriptRunner> {
        let script = parse_script(source)?;
        let mut runner = ScriptRunner::new(&ScoreSetup::default())?;
        runner.run(&script)?;
        Ok(runner)
    }

    #[test]
    fn test_melody_script() {
        let runner = run("\
            measure 4/4 2\n\
            tempo 0 60\n\
            rewind 0\n\
            duration 1 4\n\
            note 60\n\
            note 62\n\
            print\n\
            duration 1 2\n\
            note 64\n\
            rewind 0\n\
            next\n\
            print\n")
        .unwrap();
        assert_eq!(
            runner.output(),
            &[
                "track 0 measure 1 tick 960 time 2.0 tempo 60.0 key 0: rest 1/2".to_string(),
                "track 0 measure 1 tick 480 time 1.0 tempo 60.0 key 0: note 62 1/4".to_string(),
            ]
        );
        let listing = runner.listing();
        let ticks: Vec<i32> = listing.rows().iter().map(|r| r.tick).collect();
        assert_eq!(ticks, vec![0, 480, 960, 1920]);
    }

    #[test]
    fn test_expanded_print() {
        let runner = run("\
            measure 4/4 2\n\
            repeat-end 1\n\
            expand-repeats on\n\
            rewind 0\n\
            next\n\
            print\n")
        .unwrap();
        assert_eq!(
            runner.output(),
            &["track 0 measure 1 tick 0 time 2.0 tempo 120.0 key 0: rest 1/1".to_string()]
        );
    }

    #[test]
    fn test_runtime_errors_have_line_numbers() {
        let err = run("measure 4/4\nnote 60\n").err().unwrap();
        assert_eq!(err.to_string(), "Line #2: note 60");
        assert!(format!("{:#}", err).contains("Cursor is not positioned"));

        let err = run("measure 4/4\nstaves 2\n").err().unwrap();
        assert!(format!("{:#}", err).contains("before the first measure"));

        let err = run("measure 4/4\nrepeat-start 3\n").err().unwrap();
        assert!(format!("{:#}", err).contains("measure index 2 out of range"));
    }

    #[test]
    fn test_staves_rebinds_cursor() {
        let runner = run("staves 3\nmeasure 3/4\nrewind 0\nstaff 2\nadd chord 60,67\n").unwrap();
        let score = runner.score().borrow();
        assert_eq!(score.staves(), 3);
        assert_eq!(runner.cursor().track(), 8);
        assert_eq!(
            runner.cursor().element().unwrap().get("durationTicks"),
            Some(PropertyValue::Int(480))
        );
    }
}
