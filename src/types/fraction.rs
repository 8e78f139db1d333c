use crate::error::ScoreError;
use anyhow::Result;
use anyhow::anyhow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Ticks per quarter note.
pub const DIVISION: u32 = 480;

/// Ticks in a whole note.
const WHOLE: u64 = DIVISION as u64 * 4;

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Exact note value as a fraction of a whole note (`1/4` is a quarter).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fraction {
    numerator: u32,
    denominator: u32,
}

impl Fraction {
    pub const WHOLE: Self = Self::raw(1, 1);
    pub const HALF: Self = Self::raw(1, 2);
    pub const QUARTER: Self = Self::raw(1, 4);
    pub const EIGHTH: Self = Self::raw(1, 8);

    const fn raw(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub fn new(numerator: u32, denominator: u32) -> Result<Self, ScoreError> {
        if numerator == 0 || denominator == 0 {
            return Err(ScoreError::InvalidDuration(format!(
                "{}/{}",
                numerator, denominator
            )));
        }
        let g = gcd(numerator as u64, denominator as u64) as u32;
        Ok(Self::raw(numerator / g, denominator / g))
    }

    /// Interprets a numerator/denominator pair coming from a script.
    ///
    /// A zero denominator selects a quarter note whatever the numerator is.
    /// Pairs that do not describe a positive duration fall back to a quarter.
    pub fn from_script(z: i32, n: i32) -> Self {
        if n == 0 {
            return Self::QUARTER;
        }
        if z <= 0 || n < 0 {
            log::warn!("duration {}/{} is not positive, using a quarter note", z, n);
            return Self::QUARTER;
        }
        let Ok(fraction) = Self::new(z as u32, n as u32) else {
            return Self::QUARTER;
        };
        match fraction.checked_ticks() {
            Some(0) => {
                log::warn!("duration {}/{} is too short, using a quarter note", z, n);
                Self::QUARTER
            }
            Some(_) => fraction,
            None => {
                log::warn!("duration {}/{} is too long, using a quarter note", z, n);
                Self::QUARTER
            }
        }
    }

    pub fn from_ticks(ticks: u32) -> Result<Self, ScoreError> {
        if ticks == 0 {
            return Err(ScoreError::InvalidDuration("0 ticks".to_string()));
        }
        let whole = DIVISION * 4;
        let g = gcd(ticks as u64, WHOLE) as u32;
        Ok(Self::raw(ticks / g, whole / g))
    }

    pub fn numerator(&self) -> u32 {
        self.numerator
    }

    pub fn denominator(&self) -> u32 {
        self.denominator
    }

    /// Length in ticks, rounded down for values that do not divide the tick
    /// grid. Saturates at `u32::MAX`.
    pub fn ticks(&self) -> u32 {
        self.checked_ticks().unwrap_or(u32::MAX)
    }

    /// Length in ticks, or `None` when it does not fit in a `u32`.
    pub fn checked_ticks(&self) -> Option<u32> {
        u32::try_from(self.numerator as u64 * WHOLE / self.denominator as u64).ok()
    }

    /// Sum of two note values, or `None` when it cannot be represented.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        let numerator = self.numerator as u64 * rhs.denominator as u64
            + rhs.numerator as u64 * self.denominator as u64;
        let denominator = self.denominator as u64 * rhs.denominator as u64;
        let g = gcd(numerator, denominator);
        Some(Self::raw(
            u32::try_from(numerator / g).ok()?,
            u32::try_from(denominator / g).ok()?,
        ))
    }
}

impl Default for Fraction {
    fn default() -> Self {
        Self::QUARTER
    }
}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.numerator as u64 * other.denominator as u64;
        let rhs = other.numerator as u64 * self.denominator as u64;
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl fmt::Debug for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fraction({})", self)
    }
}

impl FromStr for Fraction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (numerator, denominator) = s
            .split_once('/')
            .ok_or_else(|| anyhow!("Invalid duration: {}", s))?;

        let numerator: u32 = numerator
            .parse()
            .map_err(|_e| anyhow!("Invalid duration: {}", s))?;
        let denominator: u32 = denominator
            .parse()
            .map_err(|_e| anyhow!("Invalid duration: {}", s))?;

        Ok(Self::new(numerator, denominator)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks() {
        assert_eq!(Fraction::QUARTER.ticks(), 480);
        assert_eq!(Fraction::WHOLE.ticks(), 1920);
        assert_eq!(Fraction::new(3, 8).unwrap().ticks(), 720);
        assert_eq!(Fraction::new(1, 12).unwrap().ticks(), 160);
        assert_eq!(Fraction::from_ticks(720).unwrap(), Fraction::new(3, 8).unwrap());
        assert_eq!(Fraction::from_ticks(1920).unwrap(), Fraction::WHOLE);
        assert!(Fraction::from_ticks(0).is_err());
        assert_eq!(Fraction::from_ticks(u32::MAX).unwrap().ticks(), u32::MAX);
        let long = Fraction::new(2_236_963, 1).unwrap();
        assert_eq!(long.checked_ticks(), None);
        assert_eq!(long.ticks(), u32::MAX);
    }

    #[test]
    fn test_reduce() {
        let half = Fraction::new(2, 4).unwrap();
        assert_eq!(half, Fraction::HALF);
        assert_eq!(half.to_string(), "1/2");
        assert_eq!(
            Fraction::QUARTER.checked_add(Fraction::EIGHTH),
            Some(Fraction::new(3, 8).unwrap())
        );
        let huge = Fraction::new(u32::MAX, 1).unwrap();
        assert_eq!(huge.checked_add(Fraction::WHOLE), None);
        assert!(Fraction::EIGHTH < Fraction::QUARTER);
    }

    #[test]
    fn test_from_script() {
        assert_eq!(Fraction::from_script(1, 8), Fraction::EIGHTH);
        assert_eq!(Fraction::from_script(3, 0), Fraction::QUARTER);
        assert_eq!(Fraction::from_script(0, 0), Fraction::QUARTER);
        assert_eq!(Fraction::from_script(0, 4), Fraction::QUARTER);
        assert_eq!(Fraction::from_script(-1, 4), Fraction::QUARTER);
        assert_eq!(Fraction::from_script(1, -4), Fraction::QUARTER);
        assert_eq!(Fraction::from_script(1, 4096), Fraction::QUARTER);
        assert_eq!(Fraction::from_script(2_236_962, 1).ticks(), 4_294_967_040);
        assert_eq!(Fraction::from_script(2_236_963, 1), Fraction::QUARTER);
        assert_eq!(Fraction::from_script(i32::MAX, 3), Fraction::QUARTER);
    }

    #[test]
    fn test_parsing() {
        assert_eq!("1/4".parse::<Fraction>().unwrap(), Fraction::QUARTER);
        assert_eq!(" 6/8 ".parse::<Fraction>().unwrap().to_string(), "3/4");
        assert!("".parse::<Fraction>().is_err());
        assert!("4".parse::<Fraction>().is_err());
        assert!("0/4".parse::<Fraction>().is_err());
        assert!("1/0".parse::<Fraction>().is_err());
        assert!("-1/4".parse::<Fraction>().is_err());
        assert!("a/b".parse::<Fraction>().is_err());
    }
}
