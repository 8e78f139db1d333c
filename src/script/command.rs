use crate::types::element::Element;
use crate::types::fraction::Fraction;
use crate::types::segment_type::SegmentTypeFilter;
use crate::types::signature::{Key, TimeSignature};
use anyhow::{Result, bail};
use std::fmt;

/// One line of a command file.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Staves(usize),
    Measure {
        signature: TimeSignature,
        count: usize,
    },
    Tempo {
        tick: u32,
        bpm: f64,
    },
    Key {
        staff: usize,
        tick: u32,
        key: Key,
    },
    /// Measure numbers start at 1.
    RepeatStart {
        measure: usize,
    },
    RepeatEnd {
        measure: usize,
        count: u32,
    },
    Select {
        start_tick: u32,
        end_tick: u32,
        staff_start: usize,
        staff_end: usize,
    },
    Track(i32),
    Staff(i32),
    Voice(i32),
    Filter(SegmentTypeFilter),
    ExpandRepeats(bool),
    Rewind(i32),
    Next,
    NextMeasure,
    Duration {
        z: i32,
        n: i32,
    },
    Note(i32),
    Add(Element),
    Print,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Staves(count) => write!(f, "staves {}", count),
            Command::Measure { signature, count } => write!(f, "measure {} {}", signature, count),
            Command::Tempo { tick, bpm } => write!(f, "tempo {} {}", tick, bpm),
            Command::Key { staff, tick, key } => {
                write!(f, "key {} {} {}", staff, tick, key.accidentals())
            }
            Command::RepeatStart { measure } => write!(f, "repeat-start {}", measure),
            Command::RepeatEnd { measure, count } => write!(f, "repeat-end {} {}", measure, count),
            Command::Select {
                start_tick,
                end_tick,
                staff_start,
                staff_end,
            } => write!(
                f,
                "select {} {} {} {}",
                start_tick, end_tick, staff_start, staff_end
            ),
            Command::Track(track) => write!(f, "track {}", track),
            Command::Staff(staff) => write!(f, "staff {}", staff),
            Command::Voice(voice) => write!(f, "voice {}", voice),
            Command::Filter(filter) => write!(f, "filter {}", filter),
            Command::ExpandRepeats(on) => {
                write!(f, "expand-repeats {}", if *on { "on" } else { "off" })
            }
            Command::Rewind(mode) => write!(f, "rewind {}", mode),
            Command::Next => write!(f, "next"),
            Command::NextMeasure => write!(f, "next-measure"),
            Command::Duration { z, n } => write!(f, "duration {} {}", z, n),
            Command::Note(pitch) => write!(f, "note {}", pitch),
            Command::Add(element) => write!(f, "add {}", element),
            Command::Print => write!(f, "print"),
        }
    }
}

fn arg<'a>(parts: &[&'a str], index: usize, what: &str) -> Result<&'a str> {
    match parts.get(index) {
        Some(part) => Ok(part),
        None => bail!("Missing {}", what),
    }
}

fn number<T: std::str::FromStr>(parts: &[&str], index: usize, what: &str) -> Result<T> {
    let part = arg(parts, index, what)?;
    part.parse()
        .map_err(|_| anyhow::anyhow!("Invalid {} \"{}\"", what, part))
}

fn optional_number<T: std::str::FromStr>(
    parts: &[&str],
    index: usize,
    what: &str,
    default: T,
) -> Result<T> {
    if parts.len() > index {
        number(parts, index, what)
    } else {
        Ok(default)
    }
}

fn measure_number(parts: &[&str]) -> Result<usize> {
    let measure: usize = number(parts, 1, "measure number")?;
    if measure == 0 {
        bail!("Measure numbers start at 1");
    }
    Ok(measure)
}

fn switch(parts: &[&str]) -> Result<bool> {
    match parts.get(1).copied() {
        None | Some("on") | Some("true") | Some("1") => Ok(true),
        Some("off") | Some("false") | Some("0") => Ok(false),
        Some(other) => bail!("Expected on or off, got \"{}\"", other),
    }
}

/// Parses a single command line. Returns `None` for blank lines and
/// comments.
pub fn parse_command_line(line: &str) -> Result<Option<Command>> {
    let line = match line.split_once("//") {
        Some((code, _comment)) => code,
        None => line,
    };
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let parts: Vec<&str> = line.split_whitespace().collect();
    let rest = line[parts[0].len()..].trim();
    let command = match parts[0] {
        "staves" => {
            let count: usize = number(&parts, 1, "staff count")?;
            if count == 0 {
                bail!("A score needs at least one staff");
            }
            Command::Staves(count)
        }
        "measure" | "measures" => Command::Measure {
            signature: arg(&parts, 1, "time signature")?.parse()?,
            count: optional_number(&parts, 2, "measure count", 1)?,
        },
        "tempo" => Command::Tempo {
            tick: number(&parts, 1, "tick")?,
            bpm: number(&parts, 2, "tempo")?,
        },
        "key" => Command::Key {
            staff: number(&parts, 1, "staff")?,
            tick: number(&parts, 2, "tick")?,
            key: Key::new(number(&parts, 3, "key")?)?,
        },
        "repeat-start" => Command::RepeatStart {
            measure: measure_number(&parts)?,
        },
        "repeat-end" => {
            let count: u32 = optional_number(&parts, 2, "repeat count", 2)?;
            if count < 2 {
                bail!("A repeat plays at least twice");
            }
            Command::RepeatEnd {
                measure: measure_number(&parts)?,
                count,
            }
        }
        "select" => Command::Select {
            start_tick: number(&parts, 1, "start tick")?,
            end_tick: number(&parts, 2, "end tick")?,
            staff_start: number(&parts, 3, "first staff")?,
            staff_end: number(&parts, 4, "end staff")?,
        },
        "track" => Command::Track(number(&parts, 1, "track")?),
        "staff" => Command::Staff(number(&parts, 1, "staff")?),
        "voice" => Command::Voice(number(&parts, 1, "voice")?),
        "filter" => Command::Filter(rest.parse()?),
        "expand-repeats" => Command::ExpandRepeats(switch(&parts)?),
        "rewind" => Command::Rewind(optional_number(&parts, 1, "rewind mode", 0)?),
        "next" => Command::Next,
        "next-measure" => Command::NextMeasure,
        "duration" => {
            if parts.len() == 2 && parts[1].contains('/') {
                let fraction: Fraction = parts[1].parse()?;
                Command::Duration {
                    z: fraction.numerator() as i32,
                    n: fraction.denominator() as i32,
                }
            } else {
                Command::Duration {
                    z: number(&parts, 1, "numerator")?,
                    n: number(&parts, 2, "denominator")?,
                }
            }
        }
        "note" => Command::Note(number(&parts, 1, "pitch")?),
        "rest" => Command::Add(Element::rest(Fraction::QUARTER)),
        "text" => Command::Add(format!("text {}", rest).parse()?),
        "add" => Command::Add(rest.parse()?),
        "print" => Command::Print,
        other => bail!("Unknown command \"{}\"", other),
    };
    Ok(Some(command))
}
