use crate::score::{MeasureHandle, SegmentHandle};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScoreError {
    #[error("track {track} out of range (score has {tracks} tracks)")]
    InvalidTrack { track: i32, tracks: usize },

    #[error("staff {staff} out of range (score has {staves} staves)")]
    InvalidStaff { staff: usize, staves: usize },

    #[error("stale segment handle {0:?}")]
    StaleSegment(SegmentHandle),

    #[error("stale measure handle {0:?}")]
    StaleMeasure(MeasureHandle),

    #[error("measure index {0} out of range")]
    NoSuchMeasure(usize),

    #[error("tick {tick} is outside measure starting at {measure_tick}")]
    TickOutsideMeasure { tick: u32, measure_tick: u32 },

    #[error("{element} cannot be placed on a {segment} segment")]
    WrongSegment {
        element: &'static str,
        segment: &'static str,
    },

    #[error("invalid duration {0}")]
    InvalidDuration(String),

    #[error("invalid pitch {0} (expected 0-127)")]
    InvalidPitch(i32),

    #[error("tempo must be positive, got {0}")]
    InvalidTempo(f64),

    #[error("key signature {0} out of range (-7..=7)")]
    InvalidKey(i32),
}
