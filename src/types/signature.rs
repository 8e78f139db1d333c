use crate::error::ScoreError;
use crate::types::fraction::{DIVISION, Fraction};
use anyhow::Result;
use anyhow::anyhow;
use std::fmt;
use std::str::FromStr;

/// Key signature as a count of sharps (positive) or flats (negative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Key(i8);

impl Key {
    pub const C: Self = Self(0);

    pub fn new(accidentals: i32) -> Result<Self, ScoreError> {
        if !(-7..=7).contains(&accidentals) {
            return Err(ScoreError::InvalidKey(accidentals));
        }
        Ok(Self(accidentals as i8))
    }

    pub fn accidentals(&self) -> i32 {
        self.0 as i32
    }

    /// Name of the major key, e.g. `Eb` for three flats.
    pub fn major_name(&self) -> &'static str {
        const NAMES: [&str; 15] = [
            "Cb", "Gb", "Db", "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#",
        ];
        NAMES[(self.0 + 7) as usize]
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.major_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }
}

impl TimeSignature {
    pub fn new(numerator: u8, denominator: u8) -> Result<Self, ScoreError> {
        if numerator == 0 || !denominator.is_power_of_two() || denominator > 64 {
            return Err(ScoreError::InvalidDuration(format!(
                "time signature {}/{}",
                numerator, denominator
            )));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    pub fn measure_ticks(&self) -> u32 {
        DIVISION * 4 * self.numerator as u32 / self.denominator as u32
    }

    pub fn measure_length(&self) -> Fraction {
        Fraction::from_ticks(self.measure_ticks()).unwrap_or(Fraction::WHOLE)
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl FromStr for TimeSignature {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (numerator, denominator) = s
            .split_once('/')
            .ok_or_else(|| anyhow!("Invalid time signature: {}", s))?;
        let numerator: u8 = numerator
            .parse()
            .map_err(|_e| anyhow!("Invalid time signature: {}", s))?;
        let denominator: u8 = denominator
            .parse()
            .map_err(|_e| anyhow!("Invalid time signature: {}", s))?;
        Ok(Self::new(numerator, denominator)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key() {
        assert_eq!(Key::new(-3).unwrap().major_name(), "Eb");
        assert_eq!(Key::new(7).unwrap().to_string(), "C#");
        assert_eq!(Key::default(), Key::C);
        assert!(Key::new(8).is_err());
        assert!(Key::new(-8).is_err());
    }

    #[test]
    fn test_time_signature() {
        let ts: TimeSignature = "3/4".parse().unwrap();
        assert_eq!(ts.measure_ticks(), 1440);
        assert_eq!(ts.measure_length(), Fraction::new(3, 4).unwrap());
        assert_eq!("6/8".parse::<TimeSignature>().unwrap().measure_ticks(), 1440);
        assert!("3/5".parse::<TimeSignature>().is_err());
        assert!("0/4".parse::<TimeSignature>().is_err());
        assert!("4".parse::<TimeSignature>().is_err());
    }
}
