mod arena;
mod edit;
mod repeat;
mod tempo;

pub use arena::{Arena, Handle};
pub use repeat::{RepeatList, RepeatSegment};
pub use tempo::TempoMap;

use crate::error::ScoreError;
use crate::types::element::Element;
use crate::types::segment_type::{SegmentType, SegmentTypeFilter};
use crate::types::signature::{Key, TimeSignature};
use std::cell::{OnceCell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Voices per staff; track = staff * VOICES + voice.
pub const VOICES: usize = 4;

/// Upper bound for the play count of an end repeat.
pub const MAX_REPEAT_PLAYS: u32 = 100;

pub type ScoreRef = Rc<RefCell<Score>>;
pub type MeasureHandle = Handle<Measure>;
pub type SegmentHandle = Handle<Segment>;
pub type ElementHandle = Handle<ScoreElement>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScoreId(u64);

impl ScoreId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
pub struct Measure {
    index: usize,
    tick: u32,
    time_signature: TimeSignature,
    segments: Vec<SegmentHandle>,
    repeat_start: bool,
    repeat_end: Option<u32>,
}

impl Measure {
    /// Position in the score, counting from 0.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn ticks(&self) -> u32 {
        self.time_signature.measure_ticks()
    }

    pub fn end_tick(&self) -> u32 {
        self.tick + self.ticks()
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    /// Segments ordered by tick, then by segment type.
    pub fn segments(&self) -> &[SegmentHandle] {
        &self.segments
    }

    pub fn repeat_start(&self) -> bool {
        self.repeat_start
    }

    /// Total number of plays when the measure closes a repeat.
    pub fn repeat_end(&self) -> Option<u32> {
        self.repeat_end
    }
}

#[derive(Debug, Clone)]
pub struct Segment {
    kind: SegmentType,
    tick: u32,
    measure: MeasureHandle,
    elements: Vec<Option<ElementHandle>>,
    annotations: Vec<ElementHandle>,
}

impl Segment {
    pub fn kind(&self) -> SegmentType {
        self.kind
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn measure(&self) -> MeasureHandle {
        self.measure
    }

    pub fn element(&self, track: usize) -> Option<ElementHandle> {
        self.elements.get(track).copied().flatten()
    }

    pub fn annotations(&self) -> &[ElementHandle] {
        &self.annotations
    }

    pub fn is_empty(&self) -> bool {
        self.elements.iter().all(Option::is_none) && self.annotations.is_empty()
    }
}

/// An element together with where it lives in the score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreElement {
    element: Element,
    segment: SegmentHandle,
    track: usize,
}

impl ScoreElement {
    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn segment(&self) -> SegmentHandle {
        self.segment
    }

    pub fn track(&self) -> usize {
        self.track
    }
}

/// Range selection: ticks in `start_tick..end_tick`, staves in
/// `staff_start..staff_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start_tick: u32,
    pub end_tick: u32,
    pub staff_start: usize,
    pub staff_end: usize,
}

#[derive(Debug)]
pub struct Score {
    id: ScoreId,
    staves: usize,
    measure_list: Vec<MeasureHandle>,
    measures: Arena<Measure>,
    segments: Arena<Segment>,
    elements: Arena<ScoreElement>,
    tempo: TempoMap,
    keys: Vec<BTreeMap<u32, Key>>,
    selection: Option<Selection>,
    /// Playback order, rebuilt after measures or repeat marks change.
    repeats: OnceCell<RepeatList>,
}

impl Score {
    pub fn new(staves: usize) -> Self {
        Self {
            id: ScoreId::next(),
            staves,
            measure_list: Vec::new(),
            measures: Arena::new(),
            segments: Arena::new(),
            elements: Arena::new(),
            tempo: TempoMap::new(),
            keys: vec![BTreeMap::new(); staves],
            selection: None,
            repeats: OnceCell::new(),
        }
    }

    pub fn into_ref(self) -> ScoreRef {
        Rc::new(RefCell::new(self))
    }

    pub fn id(&self) -> ScoreId {
        self.id
    }

    pub fn staves(&self) -> usize {
        self.staves
    }

    pub fn track_count(&self) -> usize {
        self.staves * VOICES
    }

    pub fn track_index(&self, track: i32) -> Option<usize> {
        usize::try_from(track)
            .ok()
            .filter(|track| *track < self.track_count())
    }

    // ---- measures ----

    /// Appends a measure holding a measure rest in the first voice of
    /// every staff.
    pub fn append_measure(&mut self, time_signature: TimeSignature) -> MeasureHandle {
        let measure = self.append_empty_measure(time_signature);
        let tick = self.measures.get(measure).map(Measure::tick).unwrap_or(0);
        let length = time_signature.measure_length();
        if self.staves > 0 {
            let segment = self.insert_segment(measure, SegmentType::ChordRest, tick);
            for staff in 0..self.staves {
                self.store_element(segment, staff * VOICES, Element::rest(length));
            }
        }
        measure
    }

    pub fn append_measures(&mut self, count: usize, time_signature: TimeSignature) {
        for _ in 0..count {
            self.append_measure(time_signature);
        }
    }

    pub fn append_empty_measure(&mut self, time_signature: TimeSignature) -> MeasureHandle {
        let tick = self.end_tick();
        let handle = self.measures.insert(Measure {
            index: self.measure_list.len(),
            tick,
            time_signature,
            segments: Vec::new(),
            repeat_start: false,
            repeat_end: None,
        });
        self.measure_list.push(handle);
        self.invalidate_repeats();
        handle
    }

    pub fn measure_count(&self) -> usize {
        self.measure_list.len()
    }

    pub fn measures(&self) -> impl Iterator<Item = MeasureHandle> + '_ {
        self.measure_list.iter().copied()
    }

    pub fn measure(&self, handle: MeasureHandle) -> Option<&Measure> {
        self.measures.get(handle)
    }

    pub fn measure_at(&self, index: usize) -> Option<MeasureHandle> {
        self.measure_list.get(index).copied()
    }

    pub fn measure_index(&self, handle: MeasureHandle) -> Option<usize> {
        self.measures.get(handle).map(Measure::index)
    }

    pub fn first_measure(&self) -> Option<MeasureHandle> {
        self.measure_list.first().copied()
    }

    pub fn next_measure(&self, handle: MeasureHandle) -> Option<MeasureHandle> {
        let index = self.measure_index(handle)?;
        self.measure_at(index + 1)
    }

    pub fn measure_at_tick(&self, tick: u32) -> Option<MeasureHandle> {
        self.measures().find(|m| {
            self.measure(*m)
                .is_some_and(|measure| measure.tick <= tick && tick < measure.end_tick())
        })
    }

    /// Tick just past the last measure.
    pub fn end_tick(&self) -> u32 {
        self.measure_list
            .last()
            .and_then(|m| self.measures.get(*m))
            .map(Measure::end_tick)
            .unwrap_or(0)
    }

    fn measure_or_err(&self, index: usize) -> Result<MeasureHandle, ScoreError> {
        self.measure_at(index)
            .ok_or(ScoreError::NoSuchMeasure(index))
    }

    pub fn set_repeat_start(&mut self, index: usize, value: bool) -> Result<(), ScoreError> {
        let handle = self.measure_or_err(index)?;
        if let Some(measure) = self.measures.get_mut(handle) {
            measure.repeat_start = value;
        }
        self.invalidate_repeats();
        Ok(())
    }

    /// `count` is the total number of plays, capped at [`MAX_REPEAT_PLAYS`];
    /// `None` removes the repeat.
    pub fn set_repeat_end(&mut self, index: usize, count: Option<u32>) -> Result<(), ScoreError> {
        let handle = self.measure_or_err(index)?;
        let count = count.map(|count| {
            if count > MAX_REPEAT_PLAYS {
                log::warn!(
                    "repeat of measure {} played {} times, capped at {}",
                    index + 1,
                    count,
                    MAX_REPEAT_PLAYS
                );
            }
            count.min(MAX_REPEAT_PLAYS)
        });
        if let Some(measure) = self.measures.get_mut(handle) {
            measure.repeat_end = count;
        }
        self.invalidate_repeats();
        Ok(())
    }

    fn invalidate_repeats(&mut self) {
        self.repeats.take();
    }

    pub fn repeat_list(&self) -> &RepeatList {
        self.repeats.get_or_init(|| self.unwind_repeats())
    }

    fn unwind_repeats(&self) -> RepeatList {
        let marks: Vec<repeat::RepeatMarks> = self
            .measures()
            .filter_map(|m| self.measure(m))
            .map(|measure| repeat::RepeatMarks {
                tick: measure.tick,
                ticks: measure.ticks(),
                start: measure.repeat_start,
                end: measure.repeat_end,
            })
            .collect();
        RepeatList::unwind(&marks)
    }

    // ---- segments ----

    pub fn segment(&self, handle: SegmentHandle) -> Option<&Segment> {
        self.segments.get(handle)
    }

    pub fn first_segment_in(
        &self,
        measure: MeasureHandle,
        filter: SegmentTypeFilter,
    ) -> Option<SegmentHandle> {
        self.measure(measure)?
            .segments
            .iter()
            .copied()
            .find(|s| self.accepts(*s, filter))
    }

    /// First accepted segment in measures `first..=last`.
    pub fn first_segment_between(
        &self,
        first: usize,
        last: usize,
        filter: SegmentTypeFilter,
    ) -> Option<SegmentHandle> {
        self.measure_list
            .iter()
            .skip(first)
            .take((last + 1).saturating_sub(first))
            .find_map(|m| self.first_segment_in(*m, filter))
    }

    pub fn first_segment(&self, filter: SegmentTypeFilter) -> Option<SegmentHandle> {
        self.first_segment_between(0, self.measure_count().saturating_sub(1), filter)
    }

    /// Next accepted segment after `current` in linear score order,
    /// continuing into following measures.
    pub fn next_segment(
        &self,
        current: SegmentHandle,
        filter: SegmentTypeFilter,
    ) -> Option<SegmentHandle> {
        let measure_handle = self.segment(current)?.measure;
        let measure = self.measure(measure_handle)?;
        let position = measure.segments.iter().position(|s| *s == current)?;
        if let Some(found) = measure.segments[position + 1..]
            .iter()
            .copied()
            .find(|s| self.accepts(*s, filter))
        {
            return Some(found);
        }
        let index = self.measure_index(measure_handle)?;
        self.first_segment_between(index + 1, self.measure_count().saturating_sub(1), filter)
    }

    fn accepts(&self, segment: SegmentHandle, filter: SegmentTypeFilter) -> bool {
        self.segment(segment)
            .is_some_and(|s| filter.contains(s.kind))
    }

    pub fn segment_at(
        &self,
        measure: MeasureHandle,
        kind: SegmentType,
        tick: u32,
    ) -> Option<SegmentHandle> {
        self.measure(measure)?.segments.iter().copied().find(|s| {
            self.segment(*s)
                .is_some_and(|segment| segment.kind == kind && segment.tick == tick)
        })
    }

    /// First segment of any kind at or after `tick`.
    pub fn first_segment_at_or_after(&self, tick: u32) -> Option<SegmentHandle> {
        self.measures()
            .filter_map(|m| self.measure(m))
            .filter(|measure| measure.end_tick() >= tick)
            .flat_map(|measure| measure.segments.iter().copied())
            .find(|s| self.segment(*s).is_some_and(|segment| segment.tick >= tick))
    }

    pub fn get_or_create_segment(
        &mut self,
        measure: MeasureHandle,
        kind: SegmentType,
        tick: u32,
    ) -> Result<SegmentHandle, ScoreError> {
        let (start, end) = self
            .measure(measure)
            .map(|m| (m.tick, m.end_tick()))
            .ok_or(ScoreError::StaleMeasure(measure))?;
        let at_end_allowed = matches!(
            kind,
            SegmentType::BarLine | SegmentType::EndBarLine | SegmentType::Breath
        );
        if tick < start || tick > end || (tick == end && !at_end_allowed) {
            return Err(ScoreError::TickOutsideMeasure {
                tick,
                measure_tick: start,
            });
        }
        if let Some(existing) = self.segment_at(measure, kind, tick) {
            return Ok(existing);
        }
        Ok(self.insert_segment(measure, kind, tick))
    }

    fn insert_segment(
        &mut self,
        measure: MeasureHandle,
        kind: SegmentType,
        tick: u32,
    ) -> SegmentHandle {
        let handle = self.segments.insert(Segment {
            kind,
            tick,
            measure,
            elements: vec![None; self.track_count()],
            annotations: Vec::new(),
        });
        let segments = &self.segments;
        if let Some(m) = self.measures.get_mut(measure) {
            let position = m
                .segments
                .iter()
                .position(|s| {
                    segments
                        .get(*s)
                        .is_some_and(|other| (other.tick, other.kind) > (tick, kind))
                })
                .unwrap_or(m.segments.len());
            m.segments.insert(position, handle);
        }
        handle
    }

    /// Removes a segment and everything attached to it. Outstanding handles
    /// to the segment or its elements stop resolving.
    pub fn remove_segment(&mut self, handle: SegmentHandle) -> bool {
        let Some(segment) = self.segments.remove(handle) else {
            return false;
        };
        for element in segment.elements.iter().flatten().chain(&segment.annotations) {
            self.elements.remove(*element);
        }
        if let Some(measure) = self.measures.get_mut(segment.measure) {
            measure.segments.retain(|s| *s != handle);
        }
        true
    }

    // ---- elements ----

    pub fn element(&self, handle: ElementHandle) -> Option<&ScoreElement> {
        self.elements.get(handle)
    }

    pub fn element_at(&self, segment: SegmentHandle, track: usize) -> Option<ElementHandle> {
        self.segment(segment)?.element(track)
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    // ---- tempo and keys ----

    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo
    }

    pub fn set_tempo(&mut self, tick: u32, bpm: f64) -> Result<(), ScoreError> {
        self.tempo.set(tick, bpm)
    }

    pub fn tempo_at(&self, tick: u32) -> f64 {
        self.tempo.tempo_at(tick)
    }

    pub fn tick_to_seconds(&self, tick: u32) -> f64 {
        self.tempo.tick_to_seconds(tick)
    }

    pub fn set_key(&mut self, staff: usize, tick: u32, key: Key) -> Result<(), ScoreError> {
        let staves = self.staves;
        let keys = self
            .keys
            .get_mut(staff)
            .ok_or(ScoreError::InvalidStaff { staff, staves })?;
        keys.insert(tick, key);
        Ok(())
    }

    /// Key in effect for `staff` at `tick`; C major when none was set.
    pub fn key_at(&self, staff: usize, tick: u32) -> Key {
        self.keys
            .get(staff)
            .and_then(|keys| keys.range(..=tick).next_back())
            .map(|(_, key)| *key)
            .unwrap_or_default()
    }

    // ---- selection ----

    pub fn select_range(
        &mut self,
        start_tick: u32,
        end_tick: u32,
        staff_start: usize,
        staff_end: usize,
    ) -> Result<(), ScoreError> {
        if staff_start >= staff_end || staff_end > self.staves {
            return Err(ScoreError::InvalidStaff {
                staff: staff_end,
                staves: self.staves,
            });
        }
        if end_tick <= start_tick {
            return Err(ScoreError::TickOutsideMeasure {
                tick: end_tick,
                measure_tick: start_tick,
            });
        }
        self.selection = Some(Selection {
            start_tick,
            end_tick,
            staff_start,
            staff_end,
        });
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }
}
