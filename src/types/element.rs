use crate::error::ScoreError;
use crate::types::fraction::Fraction;
use crate::types::segment_type::SegmentType;
use crate::types::signature::{Key, TimeSignature};
use anyhow::Result;
use anyhow::bail;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClefType {
    Treble,
    Bass,
    Alto,
    Tenor,
}

impl ClefType {
    pub fn name(&self) -> &'static str {
        match self {
            ClefType::Treble => "treble",
            ClefType::Bass => "bass",
            ClefType::Alto => "alto",
            ClefType::Tenor => "tenor",
        }
    }
}

impl FromStr for ClefType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "treble" | "g" => Ok(ClefType::Treble),
            "bass" | "f" => Ok(ClefType::Bass),
            "alto" => Ok(ClefType::Alto),
            "tenor" => Ok(ClefType::Tenor),
            _ => bail!("Unknown clef: {}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarLineType {
    Normal,
    Double,
    Final,
    StartRepeat,
    EndRepeat,
}

impl BarLineType {
    pub fn name(&self) -> &'static str {
        match self {
            BarLineType::Normal => "normal",
            BarLineType::Double => "double",
            BarLineType::Final => "final",
            BarLineType::StartRepeat => "start-repeat",
            BarLineType::EndRepeat => "end-repeat",
        }
    }
}

impl FromStr for BarLineType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "normal" => Ok(BarLineType::Normal),
            "double" => Ok(BarLineType::Double),
            "final" | "end" => Ok(BarLineType::Final),
            "start-repeat" => Ok(BarLineType::StartRepeat),
            "end-repeat" => Ok(BarLineType::EndRepeat),
            _ => bail!("Unknown bar line: {}", s),
        }
    }
}

/// Score content attached to a segment at a track.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Note {
        pitch: u8,
        duration: Fraction,
        tied: bool,
    },
    Chord {
        pitches: Vec<u8>,
        duration: Fraction,
        tied: bool,
    },
    Rest {
        duration: Fraction,
    },
    StaffText {
        text: String,
    },
    Clef {
        clef: ClefType,
    },
    KeySig {
        key: Key,
    },
    TimeSig {
        signature: TimeSignature,
    },
    BarLine {
        kind: BarLineType,
    },
    Breath,
}

/// Kinds of score items visible to scripts. Segments and measures are
/// included so one wrapper type can expose all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Note = 1,
    Chord,
    Rest,
    StaffText,
    Clef,
    KeySig,
    TimeSig,
    BarLine,
    Breath,
    Segment,
    Measure,
}

impl ElementType {
    pub fn name(&self) -> &'static str {
        match self {
            ElementType::Note => "Note",
            ElementType::Chord => "Chord",
            ElementType::Rest => "Rest",
            ElementType::StaffText => "StaffText",
            ElementType::Clef => "Clef",
            ElementType::KeySig => "KeySig",
            ElementType::TimeSig => "TimeSig",
            ElementType::BarLine => "BarLine",
            ElementType::Breath => "Breath",
            ElementType::Segment => "Segment",
            ElementType::Measure => "Measure",
        }
    }

    /// Properties readable through `ElementW::get` for this kind.
    pub fn properties(&self) -> &'static [Property] {
        use Property::*;
        match self {
            ElementType::Note => &[Pitch, Duration, DurationTicks, Tied],
            ElementType::Chord => &[Pitches, Duration, DurationTicks, Tied],
            ElementType::Rest => &[Duration, DurationTicks],
            ElementType::StaffText => &[Text],
            ElementType::Clef => &[ClefName],
            ElementType::KeySig => &[KeyAccidentals, KeyName],
            ElementType::TimeSig => &[Numerator, Denominator],
            ElementType::BarLine => &[BarLineName],
            ElementType::Breath => &[],
            ElementType::Segment => &[SegmentKind, Tick],
            ElementType::Measure => &[Number, Tick, DurationTicks, Numerator, Denominator],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Pitch,
    Pitches,
    Duration,
    DurationTicks,
    Tied,
    Text,
    ClefName,
    KeyAccidentals,
    KeyName,
    Numerator,
    Denominator,
    BarLineName,
    SegmentKind,
    Tick,
    Number,
}

impl Property {
    pub const ALL: [Property; 15] = [
        Property::Pitch,
        Property::Pitches,
        Property::Duration,
        Property::DurationTicks,
        Property::Tied,
        Property::Text,
        Property::ClefName,
        Property::KeyAccidentals,
        Property::KeyName,
        Property::Numerator,
        Property::Denominator,
        Property::BarLineName,
        Property::SegmentKind,
        Property::Tick,
        Property::Number,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Property::Pitch => "pitch",
            Property::Pitches => "pitches",
            Property::Duration => "duration",
            Property::DurationTicks => "durationTicks",
            Property::Tied => "tied",
            Property::Text => "text",
            Property::ClefName => "clef",
            Property::KeyAccidentals => "key",
            Property::KeyName => "keyName",
            Property::Numerator => "numerator",
            Property::Denominator => "denominator",
            Property::BarLineName => "barline",
            Property::SegmentKind => "segmentType",
            Property::Tick => "tick",
            Property::Number => "number",
        }
    }
}

impl FromStr for Property {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match Property::ALL.iter().find(|p| p.name() == s) {
            Some(p) => Ok(*p),
            None => bail!("Unknown property: {}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Int(i64),
    Bool(bool),
    Str(String),
    Fraction(Fraction),
    IntList(Vec<i64>),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Str(v) => write!(f, "{}", v),
            PropertyValue::Fraction(v) => write!(f, "{}", v),
            PropertyValue::IntList(v) => {
                let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

fn check_pitch(pitch: i32) -> Result<u8, ScoreError> {
    if !(0..=127).contains(&pitch) {
        return Err(ScoreError::InvalidPitch(pitch));
    }
    Ok(pitch as u8)
}

impl Element {
    pub fn note(pitch: i32, duration: Fraction) -> Result<Self, ScoreError> {
        Ok(Element::Note {
            pitch: check_pitch(pitch)?,
            duration,
            tied: false,
        })
    }

    pub fn rest(duration: Fraction) -> Self {
        Element::Rest { duration }
    }

    pub fn chord(pitches: &[i32], duration: Fraction) -> Result<Self, ScoreError> {
        let mut checked = pitches
            .iter()
            .map(|p| check_pitch(*p))
            .collect::<Result<Vec<u8>, ScoreError>>()?;
        checked.sort_unstable();
        checked.dedup();
        Ok(Element::Chord {
            pitches: checked,
            duration,
            tied: false,
        })
    }

    pub fn staff_text(text: impl Into<String>) -> Self {
        Element::StaffText { text: text.into() }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            Element::Note { .. } => ElementType::Note,
            Element::Chord { .. } => ElementType::Chord,
            Element::Rest { .. } => ElementType::Rest,
            Element::StaffText { .. } => ElementType::StaffText,
            Element::Clef { .. } => ElementType::Clef,
            Element::KeySig { .. } => ElementType::KeySig,
            Element::TimeSig { .. } => ElementType::TimeSig,
            Element::BarLine { .. } => ElementType::BarLine,
            Element::Breath => ElementType::Breath,
        }
    }

    pub fn name(&self) -> &'static str {
        self.element_type().name()
    }

    /// Segment kind this element is stored on.
    pub fn segment_type(&self) -> SegmentType {
        match self {
            Element::Note { .. }
            | Element::Chord { .. }
            | Element::Rest { .. }
            | Element::StaffText { .. } => SegmentType::ChordRest,
            Element::Clef { .. } => SegmentType::Clef,
            Element::KeySig { .. } => SegmentType::KeySig,
            Element::TimeSig { .. } => SegmentType::TimeSig,
            Element::BarLine {
                kind: BarLineType::StartRepeat,
            } => SegmentType::StartRepeatBarLine,
            Element::BarLine { .. } => SegmentType::EndBarLine,
            Element::Breath => SegmentType::Breath,
        }
    }

    pub fn is_chord_rest(&self) -> bool {
        matches!(
            self,
            Element::Note { .. } | Element::Chord { .. } | Element::Rest { .. }
        )
    }

    pub fn duration(&self) -> Option<Fraction> {
        match self {
            Element::Note { duration, .. }
            | Element::Chord { duration, .. }
            | Element::Rest { duration } => Some(*duration),
            _ => None,
        }
    }

    pub fn set_duration(&mut self, value: Fraction) {
        match self {
            Element::Note { duration, .. }
            | Element::Chord { duration, .. }
            | Element::Rest { duration } => *duration = value,
            _ => {}
        }
    }

    pub fn set_tied(&mut self, value: bool) {
        match self {
            Element::Note { tied, .. } | Element::Chord { tied, .. } => *tied = value,
            _ => {}
        }
    }

    pub fn is_tied(&self) -> bool {
        match self {
            Element::Note { tied, .. } | Element::Chord { tied, .. } => *tied,
            _ => false,
        }
    }

    pub fn pitches(&self) -> Vec<u8> {
        match self {
            Element::Note { pitch, .. } => vec![*pitch],
            Element::Chord { pitches, .. } => pitches.clone(),
            _ => Vec::new(),
        }
    }

    /// Adds a pitch to a note or chord, turning a single note into a chord.
    /// Returns false for non-note elements.
    pub fn add_pitch(&mut self, extra: u8) -> bool {
        match self {
            Element::Note {
                pitch,
                duration,
                tied,
            } => {
                if *pitch != extra {
                    let mut pitches = vec![*pitch, extra];
                    pitches.sort_unstable();
                    *self = Element::Chord {
                        pitches,
                        duration: *duration,
                        tied: *tied,
                    };
                }
                true
            }
            Element::Chord { pitches, .. } => {
                if let Err(idx) = pitches.binary_search(&extra) {
                    pitches.insert(idx, extra);
                }
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, property: Property) -> Option<PropertyValue> {
        let value = match (self, property) {
            (Element::Note { pitch, .. }, Property::Pitch) => PropertyValue::Int(*pitch as i64),
            (Element::Note { pitch, .. }, Property::Pitches) => {
                PropertyValue::IntList(vec![*pitch as i64])
            }
            (Element::Chord { pitches, .. }, Property::Pitches) => {
                PropertyValue::IntList(pitches.iter().map(|p| *p as i64).collect())
            }
            (_, Property::Duration) => PropertyValue::Fraction(self.duration()?),
            (_, Property::DurationTicks) => PropertyValue::Int(self.duration()?.ticks() as i64),
            (Element::Note { tied, .. } | Element::Chord { tied, .. }, Property::Tied) => {
                PropertyValue::Bool(*tied)
            }
            (Element::StaffText { text }, Property::Text) => PropertyValue::Str(text.clone()),
            (Element::Clef { clef }, Property::ClefName) => {
                PropertyValue::Str(clef.name().to_string())
            }
            (Element::KeySig { key }, Property::KeyAccidentals) => {
                PropertyValue::Int(key.accidentals() as i64)
            }
            (Element::KeySig { key }, Property::KeyName) => {
                PropertyValue::Str(key.major_name().to_string())
            }
            (Element::TimeSig { signature }, Property::Numerator) => {
                PropertyValue::Int(signature.numerator as i64)
            }
            (Element::TimeSig { signature }, Property::Denominator) => {
                PropertyValue::Int(signature.denominator as i64)
            }
            (Element::BarLine { kind }, Property::BarLineName) => {
                PropertyValue::Str(kind.name().to_string())
            }
            _ => return None,
        };
        Some(value)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Note {
                pitch,
                duration,
                tied,
            } => {
                write!(f, "note {} {}", pitch, duration)?;
                if *tied {
                    write!(f, "~")?;
                }
                Ok(())
            }
            Element::Chord {
                pitches,
                duration,
                tied,
            } => {
                let parts: Vec<String> = pitches.iter().map(|p| p.to_string()).collect();
                write!(f, "chord {} {}", parts.join(","), duration)?;
                if *tied {
                    write!(f, "~")?;
                }
                Ok(())
            }
            Element::Rest { duration } => write!(f, "rest {}", duration),
            Element::StaffText { text } => write!(f, "text \"{}\"", text),
            Element::Clef { clef } => write!(f, "clef {}", clef.name()),
            Element::KeySig { key } => write!(f, "key {}", key),
            Element::TimeSig { signature } => write!(f, "time {}", signature),
            Element::BarLine { kind } => write!(f, "barline {}", kind.name()),
            Element::Breath => write!(f, "breath"),
        }
    }
}

fn parse_pitch(s: &str) -> Result<i32> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("Invalid pitch \"{}\"", s))
}

fn parse_optional_duration(s: Option<&&str>) -> Result<Fraction> {
    match s {
        Some(s) => s.parse(),
        None => Ok(Fraction::QUARTER),
    }
}

/// Parses the textual form written by `Display`. Durations may be left out
/// and default to a quarter note; key signatures are given as a count of
/// accidentals.
impl FromStr for Element {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (kind, rest) = s.split_once(char::is_whitespace).unwrap_or((s, ""));
        let parts: Vec<&str> = rest.split_whitespace().collect();
        let element = match kind {
            "note" => {
                let Some(pitch) = parts.first() else {
                    bail!("note requires a pitch");
                };
                let (duration, tied) = match parts.get(1) {
                    Some(d) => match d.strip_suffix('~') {
                        Some(d) => (d.parse()?, true),
                        None => (d.parse()?, false),
                    },
                    None => (Fraction::QUARTER, false),
                };
                let mut note = Element::note(parse_pitch(pitch)?, duration)?;
                note.set_tied(tied);
                note
            }
            "chord" => {
                let Some(pitches) = parts.first() else {
                    bail!("chord requires pitches");
                };
                let pitches = pitches
                    .split(',')
                    .map(parse_pitch)
                    .collect::<Result<Vec<i32>>>()?;
                Element::chord(&pitches, parse_optional_duration(parts.get(1))?)?
            }
            "rest" => Element::rest(parse_optional_duration(parts.first())?),
            "text" => {
                let text = rest.trim().trim_matches('"');
                if text.is_empty() {
                    bail!("text requires content");
                }
                Element::staff_text(text)
            }
            "clef" => Element::Clef {
                clef: parts.first().copied().unwrap_or_default().parse()?,
            },
            "key" => {
                let accidentals: i32 = parts
                    .first()
                    .and_then(|p| p.parse().ok())
                    .ok_or_else(|| anyhow::anyhow!("key requires a number of accidentals"))?;
                Element::KeySig {
                    key: Key::new(accidentals)?,
                }
            }
            "time" => Element::TimeSig {
                signature: parts.first().copied().unwrap_or_default().parse()?,
            },
            "barline" => Element::BarLine {
                kind: parts.first().copied().unwrap_or("normal").parse()?,
            },
            "breath" => Element::Breath,
            _ => bail!("Unknown element \"{}\"", kind),
        };
        Ok(element)
    }
}
