use super::TempoMap;

pub(crate) struct RepeatMarks {
    pub tick: u32,
    pub ticks: u32,
    pub start: bool,
    pub end: Option<u32>,
}

/// A run of consecutive measures played straight through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatSegment {
    /// Index of the first measure.
    pub first_measure: usize,
    /// Index of the last measure (inclusive).
    pub last_measure: usize,
    pub tick: u32,
    pub len: u32,
    /// Start of the run in playback (unrolled) ticks.
    pub utick: u32,
}

impl RepeatSegment {
    pub fn contains_measure(&self, index: usize) -> bool {
        (self.first_measure..=self.last_measure).contains(&index)
    }

    pub fn contains_tick(&self, tick: u32) -> bool {
        tick >= self.tick && tick < self.tick + self.len
    }
}

/// Playback order of a score with its repeats expanded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RepeatList {
    segments: Vec<RepeatSegment>,
}

impl RepeatList {
    /// Builds the playback order. An end repeat jumps back to the closest
    /// preceding start repeat, or to the measure after the previous
    /// completed repeat, until it has been played `end` times.
    pub(crate) fn unwind(measures: &[RepeatMarks]) -> Self {
        let mut segments = Vec::new();
        let mut utick = 0;
        let mut push_run = |first: usize, last: usize, segments: &mut Vec<RepeatSegment>| {
            let tick = measures[first].tick;
            let len = measures[last].tick + measures[last].ticks - tick;
            segments.push(RepeatSegment {
                first_measure: first,
                last_measure: last,
                tick,
                len,
                utick,
            });
            utick += len;
        };

        let mut index = 0;
        let mut loop_start = 0;
        let mut run_start = 0;
        let mut pass = 1;
        while index < measures.len() {
            let measure = &measures[index];
            if measure.start && index != loop_start {
                loop_start = index;
                pass = 1;
            }
            match measure.end {
                Some(count) if pass < count => {
                    push_run(run_start, index, &mut segments);
                    pass += 1;
                    index = loop_start;
                    run_start = loop_start;
                    continue;
                }
                Some(_) => {
                    loop_start = index + 1;
                    pass = 1;
                }
                None => {}
            }
            index += 1;
        }
        if run_start < measures.len() {
            push_run(run_start, measures.len() - 1, &mut segments);
        }
        Self { segments }
    }

    pub fn segments(&self) -> &[RepeatSegment] {
        &self.segments
    }

    pub fn get(&self, index: usize) -> Option<&RepeatSegment> {
        self.segments.get(index)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// First run at or after `from` that plays measure `index`.
    pub fn find_measure(&self, index: usize, from: usize) -> Option<usize> {
        self.segments
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, s)| s.contains_measure(index))
            .map(|(i, _)| i)
    }

    /// Playback tick of `tick` while in run `repeat`.
    pub fn utick(&self, repeat: usize, tick: u32) -> u32 {
        match self.segments.get(repeat) {
            Some(s) => s.utick + tick.saturating_sub(s.tick),
            None => tick,
        }
    }

    /// Playback time in seconds of `tick` while in run `repeat`.
    pub fn seconds(&self, tempo: &TempoMap, repeat: usize, tick: u32) -> f64 {
        let Some(current) = self.segments.get(repeat) else {
            return tempo.tick_to_seconds(tick);
        };
        let before: f64 = self.segments[..repeat]
            .iter()
            .map(|s| tempo.tick_to_seconds(s.tick + s.len) - tempo.tick_to_seconds(s.tick))
            .sum();
        before + tempo.tick_to_seconds(tick) - tempo.tick_to_seconds(current.tick)
    }

    pub fn total_ticks(&self) -> u32 {
        self.segments.last().map(|s| s.utick + s.len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn marks(spec: &[(bool, Option<u32>)]) -> Vec<RepeatMarks> {
        spec.iter()
            .enumerate()
            .map(|(i, (start, end))| RepeatMarks {
                tick: i as u32 * 1920,
                ticks: 1920,
                start: *start,
                end: *end,
            })
            .collect()
    }

    fn runs(list: &RepeatList) -> Vec<(usize, usize, u32)> {
        list.segments()
            .iter()
            .map(|s| (s.first_measure, s.last_measure, s.utick))
            .collect()
    }

    #[test]
    fn test_no_repeats() {
        let list = RepeatList::unwind(&marks(&[(false, None); 3]));
        assert_eq!(runs(&list), vec![(0, 2, 0)]);
        assert_eq!(list.total_ticks(), 5760);
        assert!(RepeatList::unwind(&[]).is_empty());
    }

    #[test]
    fn test_simple_repeat() {
        // | m0 |: m1 | m2 :| m3 |
        let list = RepeatList::unwind(&marks(&[
            (false, None),
            (true, None),
            (false, Some(2)),
            (false, None),
        ]));
        assert_eq!(
            runs(&list),
            vec![(0, 2, 0), (1, 3, 5760)]
        );
        assert_eq!(list.total_ticks(), 6 * 1920);
        assert_eq!(list.utick(1, 1920), 5760);
        assert_eq!(list.find_measure(1, 0), Some(0));
        assert_eq!(list.find_measure(1, 1), Some(1));
        assert_eq!(list.find_measure(3, 0), Some(1));
    }

    #[test]
    fn test_repeat_without_start_and_count() {
        // m0 m1 :|x3 m2 :|
        let list = RepeatList::unwind(&marks(&[
            (false, None),
            (false, Some(3)),
            (false, Some(2)),
        ]));
        assert_eq!(
            runs(&list),
            vec![(0, 1, 0), (0, 1, 3840), (0, 2, 7680), (2, 2, 13440)]
        );

        let list = RepeatList::unwind(&marks(&[
            (false, None),
            (false, Some(3)),
            (false, Some(2)),
            (false, None),
        ]));
        assert_eq!(
            runs(&list),
            vec![(0, 1, 0), (0, 1, 3840), (0, 2, 7680), (2, 3, 13440)]
        );
    }

    #[test]
    fn test_seconds_follow_playback_order() {
        let list = RepeatList::unwind(&marks(&[(true, None), (false, Some(2))]));
        let tempo = TempoMap::new();
        // 4/4 at 120 bpm: two seconds per measure
        assert_eq!(list.seconds(&tempo, 0, 1920), 2.0);
        assert_eq!(list.seconds(&tempo, 1, 0), 4.0);
        assert_eq!(list.seconds(&tempo, 1, 1920), 6.0);
    }
}
