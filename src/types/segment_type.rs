use anyhow::Result;
use anyhow::bail;
use std::fmt;
use std::str::FromStr;

/// Kind of a time slot inside a measure. Within one tick, segments are
/// ordered by declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SegmentType {
    BeginBarLine,
    Clef,
    KeySig,
    TimeSig,
    StartRepeatBarLine,
    BarLine,
    ChordRest,
    Breath,
    EndBarLine,
}

impl SegmentType {
    pub const ALL: [SegmentType; 9] = [
        SegmentType::BeginBarLine,
        SegmentType::Clef,
        SegmentType::KeySig,
        SegmentType::TimeSig,
        SegmentType::StartRepeatBarLine,
        SegmentType::BarLine,
        SegmentType::ChordRest,
        SegmentType::Breath,
        SegmentType::EndBarLine,
    ];

    const fn bit(self) -> u32 {
        1 << self as u32
    }

    pub fn name(&self) -> &'static str {
        match self {
            SegmentType::BeginBarLine => "begin-barline",
            SegmentType::Clef => "clef",
            SegmentType::KeySig => "key-sig",
            SegmentType::TimeSig => "time-sig",
            SegmentType::StartRepeatBarLine => "start-repeat",
            SegmentType::BarLine => "barline",
            SegmentType::ChordRest => "chord-rest",
            SegmentType::Breath => "breath",
            SegmentType::EndBarLine => "end-barline",
        }
    }
}

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SegmentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        match SegmentType::ALL.iter().find(|kind| kind.name() == s) {
            Some(kind) => Ok(*kind),
            None => bail!("Unknown segment type: {}", s),
        }
    }
}

/// Set of segment kinds a cursor stops on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SegmentTypeFilter {
    bits: u32,
}

impl SegmentTypeFilter {
    const MASK: u32 = (1 << SegmentType::ALL.len()) - 1;

    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    pub const fn all() -> Self {
        Self { bits: Self::MASK }
    }

    pub const fn only(kind: SegmentType) -> Self {
        Self { bits: kind.bit() }
    }

    pub const fn chord_rest() -> Self {
        Self::only(SegmentType::ChordRest)
    }

    pub const fn with(self, kind: SegmentType) -> Self {
        Self {
            bits: self.bits | kind.bit(),
        }
    }

    pub const fn without(self, kind: SegmentType) -> Self {
        Self {
            bits: self.bits & !kind.bit(),
        }
    }

    pub const fn union(self, other: Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    pub const fn contains(&self, kind: SegmentType) -> bool {
        self.bits & kind.bit() != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = SegmentType> + '_ {
        SegmentType::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }

    /// Integer form used by script callers; bit `i` is `SegmentType::ALL[i]`.
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    /// Unknown bits are dropped.
    pub const fn from_bits(bits: u32) -> Self {
        Self {
            bits: bits & Self::MASK,
        }
    }
}

impl From<SegmentType> for SegmentTypeFilter {
    fn from(kind: SegmentType) -> Self {
        Self::only(kind)
    }
}

impl FromIterator<SegmentType> for SegmentTypeFilter {
    fn from_iter<I: IntoIterator<Item = SegmentType>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl fmt::Debug for SegmentTypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for SegmentTypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::all() {
            return write!(f, "all");
        }
        if self.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<&str> = self.iter().map(|kind| kind.name()).collect();
        write!(f, "{}", names.join("|"))
    }
}

impl FromStr for SegmentTypeFilter {
    type Err = anyhow::Error;

    /// Accepts `all`, `none` or kind names separated by `|` or `,`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "all" => return Ok(Self::all()),
            "none" => return Ok(Self::empty()),
            _ => {}
        }
        s.split(['|', ','])
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(SegmentType::from_str)
            .collect::<Result<SegmentTypeFilter>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_operations() {
        let filter = SegmentTypeFilter::chord_rest().with(SegmentType::Clef);
        assert!(filter.contains(SegmentType::ChordRest));
        assert!(filter.contains(SegmentType::Clef));
        assert!(!filter.contains(SegmentType::BarLine));

        let union = filter.union(SegmentType::BarLine.into());
        assert_eq!(union.iter().count(), 3);
        assert_eq!(union.without(SegmentType::Clef).iter().count(), 2);
        assert!(SegmentTypeFilter::empty().is_empty());
        assert!(SegmentType::ALL
            .iter()
            .all(|kind| SegmentTypeFilter::all().contains(*kind)));
    }

    #[test]
    fn test_bits() {
        let filter = SegmentTypeFilter::chord_rest();
        assert_eq!(SegmentTypeFilter::from_bits(filter.bits()), filter);
        assert_eq!(SegmentTypeFilter::from_bits(u32::MAX), SegmentTypeFilter::all());
    }

    #[test]
    fn test_parsing() {
        let filter: SegmentTypeFilter = "chord-rest|clef".parse().unwrap();
        assert_eq!(filter, SegmentTypeFilter::chord_rest().with(SegmentType::Clef));
        assert_eq!(filter.to_string(), "clef|chord-rest");
        assert_eq!("all".parse::<SegmentTypeFilter>().unwrap(), SegmentTypeFilter::all());
        assert_eq!("key-sig, time-sig".parse::<SegmentTypeFilter>().unwrap().iter().count(), 2);
        assert!("chord".parse::<SegmentTypeFilter>().is_err());
    }
}
