use crate::error::ScoreError;
use crate::types::fraction::DIVISION;
use std::collections::BTreeMap;

/// Tempo changes keyed by tick, in quarter notes per minute.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    changes: BTreeMap<u32, f64>,
}

impl TempoMap {
    pub const DEFAULT_BPM: f64 = 120.0;

    pub fn new() -> Self {
        Self {
            changes: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, tick: u32, bpm: f64) -> Result<(), ScoreError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(ScoreError::InvalidTempo(bpm));
        }
        self.changes.insert(tick, bpm);
        Ok(())
    }

    pub fn tempo_at(&self, tick: u32) -> f64 {
        self.changes
            .range(..=tick)
            .next_back()
            .map(|(_, bpm)| *bpm)
            .unwrap_or(Self::DEFAULT_BPM)
    }

    pub fn changes(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.changes.iter().map(|(tick, bpm)| (*tick, *bpm))
    }

    /// Seconds from the start of the score to `tick`.
    pub fn tick_to_seconds(&self, tick: u32) -> f64 {
        let mut seconds = 0.0;
        let mut last_tick = 0;
        let mut bpm = Self::DEFAULT_BPM;
        for (change_tick, change_bpm) in self.changes.range(..tick) {
            seconds += ticks_to_seconds(change_tick - last_tick, bpm);
            last_tick = *change_tick;
            bpm = *change_bpm;
        }
        seconds + ticks_to_seconds(tick - last_tick, bpm)
    }
}

impl Default for TempoMap {
    fn default() -> Self {
        Self::new()
    }
}

fn ticks_to_seconds(ticks: u32, bpm: f64) -> f64 {
    ticks as f64 / DIVISION as f64 * 60.0 / bpm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tempo() {
        let map = TempoMap::new();
        assert_eq!(map.tempo_at(0), 120.0);
        assert_eq!(map.tick_to_seconds(480), 0.5);
        assert_eq!(map.tick_to_seconds(1920), 2.0);
    }

    #[test]
    fn test_tempo_changes() {
        let mut map = TempoMap::new();
        map.set(0, 60.0).unwrap();
        map.set(960, 120.0).unwrap();
        assert_eq!(map.tempo_at(959), 60.0);
        assert_eq!(map.tempo_at(960), 120.0);
        assert_eq!(map.tick_to_seconds(960), 2.0);
        assert_eq!(map.tick_to_seconds(1920), 3.0);
        assert!(map.set(0, 0.0).is_err());
        assert!(map.set(0, f64::NAN).is_err());
    }
}
