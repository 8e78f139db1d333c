use crate::score::{RepeatList, Score, ScoreRef, SegmentHandle, VOICES};
use crate::types::element::Element;
use crate::types::fraction::Fraction;
use crate::types::segment_type::{SegmentType, SegmentTypeFilter};
use crate::wrapper::{ElementW, ItemHandle};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

const VOICES_I32: i32 = VOICES as i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No score, or the score has been dropped.
    Unbound,
    BoundUnpositioned,
    BoundPositioned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewindMode {
    ScoreStart,
    SelectionStart,
    SelectionEnd,
}

impl TryFrom<i32> for RewindMode {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RewindMode::ScoreStart),
            1 => Ok(RewindMode::SelectionStart),
            2 => Ok(RewindMode::SelectionEnd),
            other => Err(other),
        }
    }
}

impl fmt::Display for RewindMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            RewindMode::ScoreStart => "score start",
            RewindMode::SelectionStart => "selection start",
            RewindMode::SelectionEnd => "selection end",
        };
        write!(f, "{}", name)
    }
}

/// A position in a score together with the track it reads and writes.
///
/// The cursor only keeps a weak reference to the score and a generational
/// segment handle. Dropping the score turns the cursor unbound; removing the
/// segment it points at turns it unpositioned. None of the operations panic
/// or return errors: failures read as `None`, `0`, `0.0` or `false` so that
/// scripted loops always terminate.
#[derive(Debug, Clone)]
pub struct Cursor {
    score: Option<Weak<RefCell<Score>>>,
    track: i32,
    filter: SegmentTypeFilter,
    segment: Option<SegmentHandle>,
    expand_repeats: bool,
    repeat_index: usize,
    duration: Fraction,
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}

impl Cursor {
    pub fn new() -> Self {
        Self {
            score: None,
            track: 0,
            filter: SegmentTypeFilter::chord_rest(),
            segment: None,
            expand_repeats: false,
            repeat_index: 0,
            duration: Fraction::QUARTER,
        }
    }

    pub fn with_score(score: &ScoreRef) -> Self {
        Self::with_score_expanded(score, false)
    }

    pub fn with_score_expanded(score: &ScoreRef, expand_repeats: bool) -> Self {
        let mut cursor = Self::new();
        cursor.expand_repeats = expand_repeats;
        cursor.set_score(Some(score));
        cursor
    }

    // ---- binding ----

    pub fn score(&self) -> Option<ScoreRef> {
        self.score.as_ref()?.upgrade()
    }

    /// Rebinds the cursor. The position is always cleared.
    pub fn set_score(&mut self, score: Option<&ScoreRef>) {
        self.score = score.map(Rc::downgrade);
        self.segment = None;
        self.repeat_index = 0;
    }

    pub fn state(&self) -> CursorState {
        let Some(score) = self.score() else {
            return CursorState::Unbound;
        };
        match read(&score) {
            Some(s) if self.current(&s).is_some() => CursorState::BoundPositioned,
            _ => CursorState::BoundUnpositioned,
        }
    }

    fn weak(&self) -> Weak<RefCell<Score>> {
        self.score.clone().unwrap_or_default()
    }

    /// Current segment if it still resolves in `score`.
    fn current(&self, score: &Score) -> Option<SegmentHandle> {
        self.segment.filter(|s| score.segment(*s).is_some())
    }

    fn read_score<R>(&self, f: impl FnOnce(&Score) -> Option<R>) -> Option<R> {
        let score = self.score()?;
        let score = read(&score)?;
        f(&score)
    }

    // ---- track selection ----

    pub fn track(&self) -> i32 {
        self.track
    }

    /// Any value is accepted; one outside the score's tracks makes reads and
    /// edits come back empty.
    pub fn set_track(&mut self, track: i32) {
        self.track = track;
    }

    pub fn staff_idx(&self) -> i32 {
        self.track.div_euclid(VOICES_I32)
    }

    /// Keeps the voice. A staff whose track would not fit in an `i32` is
    /// ignored.
    pub fn set_staff_idx(&mut self, staff: i32) {
        match staff
            .checked_mul(VOICES_I32)
            .and_then(|track| track.checked_add(self.voice()))
        {
            Some(track) => self.track = track,
            None => log::warn!("staff {} out of range, ignored", staff),
        }
    }

    pub fn voice(&self) -> i32 {
        self.track.rem_euclid(VOICES_I32)
    }

    pub fn set_voice(&mut self, voice: i32) {
        if !(0..VOICES_I32).contains(&voice) {
            log::warn!("voice {} out of range 0..{}, ignored", voice, VOICES);
            return;
        }
        match self
            .staff_idx()
            .checked_mul(VOICES_I32)
            .and_then(|track| track.checked_add(voice))
        {
            Some(track) => self.track = track,
            None => log::warn!("voice {} on staff {} out of range, ignored", voice, self.staff_idx()),
        }
    }

    pub fn filter(&self) -> SegmentTypeFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: SegmentTypeFilter) {
        self.filter = filter;
    }

    pub fn filter_bits(&self) -> i32 {
        self.filter.bits() as i32
    }

    pub fn set_filter_bits(&mut self, bits: i32) {
        self.filter = SegmentTypeFilter::from_bits(bits as u32);
    }

    pub fn expand_repeats(&self) -> bool {
        self.expand_repeats
    }

    pub fn set_expand_repeats(&mut self, value: bool) {
        self.expand_repeats = value;
    }

    pub fn duration(&self) -> Fraction {
        self.duration
    }

    // ---- reads ----

    /// Element at the current segment in the current track.
    pub fn element(&self) -> Option<ElementW> {
        let handle = self.read_score(|score| {
            let track = score.track_index(self.track)?;
            score.element_at(self.current(score)?, track)
        })?;
        Some(ElementW::new(self.weak(), ItemHandle::Element(handle)))
    }

    pub fn segment(&self) -> Option<ElementW> {
        let handle = self.read_score(|score| self.current(score))?;
        Some(ElementW::new(self.weak(), ItemHandle::Segment(handle)))
    }

    pub fn measure(&self) -> Option<ElementW> {
        let handle = self.read_score(|score| Some(score.segment(self.current(score)?)?.measure()))?;
        Some(ElementW::new(self.weak(), ItemHandle::Measure(handle)))
    }

    pub fn segment_type(&self) -> Option<SegmentType> {
        self.read_score(|score| Some(score.segment(self.current(score)?)?.kind()))
    }

    fn current_tick(&self, score: &Score) -> Option<u32> {
        Some(score.segment(self.current(score)?)?.tick())
    }

    /// Score tick of the current segment; 0 when unpositioned.
    pub fn tick(&self) -> i32 {
        self.read_score(|score| self.current_tick(score))
            .map(|tick| tick as i32)
            .unwrap_or(0)
    }

    /// Tick in playback order. Equals `tick()` unless repeats are expanded.
    pub fn playback_tick(&self) -> i32 {
        self.read_score(|score| {
            let tick = self.current_tick(score)?;
            if !self.expand_repeats {
                return Some(tick);
            }
            Some(score.repeat_list().utick(self.repeat_index, tick))
        })
        .map(|tick| tick as i32)
        .unwrap_or(0)
    }

    /// Seconds from the start of playback; 0.0 when unpositioned.
    pub fn time(&self) -> f64 {
        self.read_score(|score| {
            let tick = self.current_tick(score)?;
            if !self.expand_repeats {
                return Some(score.tick_to_seconds(tick));
            }
            let repeats = score.repeat_list();
            Some(repeats.seconds(score.tempo_map(), self.repeat_index, tick))
        })
        .unwrap_or(0.0)
    }

    /// Tempo in quarter notes per minute; 0.0 when unpositioned.
    pub fn tempo(&self) -> f64 {
        self.read_score(|score| Some(score.tempo_at(self.current_tick(score)?)))
            .unwrap_or(0.0)
    }

    /// Accidentals of the key in effect for the current staff, sharps
    /// positive; 0 when unpositioned.
    pub fn key_signature(&self) -> i32 {
        self.read_score(|score| {
            let staff = score.track_index(self.track)? / VOICES;
            Some(score.key_at(staff, self.current_tick(score)?).accidentals())
        })
        .unwrap_or(0)
    }

    // ---- navigation ----

    /// Integer form of [`Cursor::rewind_to`]. Unknown modes leave the cursor
    /// unpositioned.
    pub fn rewind(&mut self, mode: i32) {
        match RewindMode::try_from(mode) {
            Ok(mode) => self.rewind_to(mode),
            Err(mode) => {
                log::warn!("unknown rewind mode {}", mode);
                self.segment = None;
            }
        }
    }

    pub fn rewind_to(&mut self, mode: RewindMode) {
        self.segment = None;
        self.repeat_index = 0;
        let Some(score) = self.score() else {
            return;
        };
        let Some(score) = read(&score) else {
            return;
        };
        let target = match mode {
            RewindMode::ScoreStart => score.first_segment(SegmentTypeFilter::all()),
            RewindMode::SelectionStart | RewindMode::SelectionEnd => {
                let Some(selection) = score.selection() else {
                    log::debug!("rewind to {}: nothing selected", mode);
                    return;
                };
                if mode == RewindMode::SelectionStart {
                    self.track = (selection.staff_start * VOICES) as i32;
                    score.first_segment_at_or_after(selection.start_tick)
                } else {
                    self.track = (selection.staff_end * VOICES) as i32 - 1;
                    score.first_segment_at_or_after(selection.end_tick)
                }
            }
        };
        self.segment = target;
        if self.expand_repeats {
            if let Some(segment) = target {
                self.repeat_index = repeat_for(&score, &score.repeat_list(), segment, 0);
            }
        }
    }

    /// Moves to the next segment accepted by the filter. Returns false and
    /// leaves the cursor unpositioned once the score is exhausted; does
    /// nothing when not positioned.
    pub fn next(&mut self) -> bool {
        let Some(score) = self.score() else {
            return false;
        };
        let Some(score) = read(&score) else {
            return false;
        };
        let Some(current) = self.current(&score) else {
            return false;
        };
        let next = self.next_in_track(&score, current);
        self.segment = next;
        if next.is_none() {
            self.repeat_index = 0;
        }
        next.is_some()
    }

    fn next_in_track(&mut self, score: &Score, current: SegmentHandle) -> Option<SegmentHandle> {
        if !self.expand_repeats {
            return score.next_segment(current, self.filter);
        }
        let repeats = score.repeat_list();
        let mut repeat = repeat_for(score, &repeats, current, self.repeat_index);

        if let Some(candidate) = score.next_segment(current, self.filter) {
            let index = score
                .segment(candidate)
                .and_then(|s| score.measure_index(s.measure()));
            let run = repeats.get(repeat)?;
            if index.is_some_and(|index| index <= run.last_measure) {
                self.repeat_index = repeat;
                return Some(candidate);
            }
        }

        repeat += 1;
        while let Some(run) = repeats.get(repeat) {
            if let Some(found) =
                score.first_segment_between(run.first_measure, run.last_measure, self.filter)
            {
                self.repeat_index = repeat;
                return Some(found);
            }
            repeat += 1;
        }
        None
    }

    /// Jumps to the first segment of the next measure, whatever its kind.
    pub fn next_measure(&mut self) -> bool {
        let Some(score) = self.score() else {
            return false;
        };
        let Some(score) = read(&score) else {
            return false;
        };
        let next = self
            .current(&score)
            .and_then(|current| self.next_measure_start(&score, current));
        self.segment = next;
        if next.is_none() {
            self.repeat_index = 0;
        }
        next.is_some()
    }

    fn next_measure_start(&mut self, score: &Score, current: SegmentHandle) -> Option<SegmentHandle> {
        let all = SegmentTypeFilter::all();
        let index = score.measure_index(score.segment(current)?.measure())?;
        if !self.expand_repeats {
            let last = score.measure_count().checked_sub(1)?;
            return score.first_segment_between(index + 1, last, all);
        }
        let repeats = score.repeat_list();
        let mut repeat = repeat_for(score, &repeats, current, self.repeat_index);
        let mut first = index + 1;
        while let Some(run) = repeats.get(repeat) {
            if first <= run.last_measure {
                if let Some(found) = score.first_segment_between(first, run.last_measure, all) {
                    self.repeat_index = repeat;
                    return Some(found);
                }
            }
            repeat += 1;
            first = repeats.get(repeat).map(|r| r.first_measure)?;
        }
        None
    }

    // ---- editing ----

    /// Inserts `element` at the current position. Chords and rests take the
    /// cursor duration. The cursor does not move.
    pub fn add(&mut self, element: Element) -> bool {
        let Some(score) = self.score() else {
            log::warn!("add: cursor is not bound to a score");
            return false;
        };
        let Some(mut score) = write(&score) else {
            return false;
        };
        let Some(segment) = self.current(&score) else {
            log::warn!("add: cursor is not positioned");
            return false;
        };
        let Some(track) = score.track_index(self.track) else {
            log::warn!("add: track {} out of range", self.track);
            return false;
        };
        let mut element = element;
        if element.is_chord_rest() {
            element.set_duration(self.duration);
        }
        match score.add_element(segment, track, element) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("add: {}", e);
                false
            }
        }
    }

    /// Writes a note of the cursor duration and moves past it.
    ///
    /// At the end of the score the note is shortened to fit and the cursor
    /// ends up unpositioned.
    pub fn add_note(&mut self, pitch: i32) -> bool {
        if !(0..=127).contains(&pitch) {
            log::warn!("addNote: pitch {} out of range", pitch);
            return false;
        }
        let Some(score) = self.score() else {
            log::warn!("addNote: cursor is not bound to a score");
            return false;
        };
        let Some(mut score) = write(&score) else {
            return false;
        };
        let Some(segment) = self.current(&score) else {
            log::warn!("addNote: cursor is not positioned");
            return false;
        };
        let Some(track) = score.track_index(self.track) else {
            log::warn!("addNote: track {} out of range", self.track);
            return false;
        };
        match score.set_note_rest(segment, track, pitch as u8, self.duration) {
            Ok(next) => {
                self.segment = next;
                if let (true, Some(next)) = (self.expand_repeats, next) {
                    self.repeat_index =
                        repeat_for(&score, &score.repeat_list(), next, self.repeat_index);
                }
                true
            }
            Err(e) => {
                log::warn!("addNote: {}", e);
                false
            }
        }
    }

    /// Duration for later `add`/`add_note` calls. `n == 0` selects a quarter
    /// note; non-positive durations fall back to a quarter as well.
    pub fn set_duration(&mut self, z: i32, n: i32) {
        self.duration = Fraction::from_script(z, n);
    }
}

/// Run of `repeats` that plays the measure of `segment`, preferring `hint`.
fn repeat_for(score: &Score, repeats: &RepeatList, segment: SegmentHandle, hint: usize) -> usize {
    let Some(index) = score
        .segment(segment)
        .and_then(|s| score.measure_index(s.measure()))
    else {
        return hint;
    };
    if repeats.get(hint).is_some_and(|r| r.contains_measure(index)) {
        return hint;
    }
    repeats
        .find_measure(index, hint)
        .or_else(|| repeats.find_measure(index, 0))
        .unwrap_or(0)
}

fn read(score: &ScoreRef) -> Option<Ref<'_, Score>> {
    match score.try_borrow() {
        Ok(score) => Some(score),
        Err(_) => {
            log::warn!("score is being edited elsewhere");
            None
        }
    }
}

fn write(score: &ScoreRef) -> Option<RefMut<'_, Score>> {
    match score.try_borrow_mut() {
        Ok(score) => Some(score),
        Err(_) => {
            log::warn!("score is being read elsewhere");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::element::{ElementType, PropertyValue};
    use crate::types::signature::{Key, TimeSignature};
    use crate::util::test_score;
    use pretty_assertions::assert_eq;

    /// Two 4/4 measures with chord-rests at 0 and 480 in the first one and
    /// only bar lines in the second.
    fn two_measure_score() -> ScoreRef {
        let mut score = Score::new(1);
        let m0 = score.append_empty_measure(TimeSignature::default());
        let m1 = score.append_empty_measure(TimeSignature::default());
        for tick in [0, 480] {
            let s = score
                .get_or_create_segment(m0, SegmentType::ChordRest, tick)
                .unwrap();
            score
                .add_element(s, 0, Element::note(60, Fraction::QUARTER).unwrap())
                .unwrap();
        }
        for (m, tick) in [(m0, 1920), (m1, 3840)] {
            score
                .get_or_create_segment(m, SegmentType::EndBarLine, tick)
                .unwrap();
        }
        score.into_ref()
    }

    fn walk(cursor: &mut Cursor) -> Vec<i32> {
        let mut ticks = Vec::new();
        cursor.rewind(0);
        if cursor.state() != CursorState::BoundPositioned {
            return ticks;
        }
        if cursor
            .segment_type()
            .is_some_and(|kind| !cursor.filter().contains(kind))
        {
            cursor.next();
        }
        while cursor.state() == CursorState::BoundPositioned {
            ticks.push(cursor.tick());
            cursor.next();
        }
        ticks
    }

    #[test]
    fn test_melody_traversal() {
        let score = two_measure_score();
        let mut cursor = Cursor::with_score(&score);
        assert_eq!(cursor.state(), CursorState::BoundUnpositioned);

        cursor.rewind(0);
        assert_eq!(cursor.tick(), 0);
        assert!(cursor.next());
        assert_eq!(cursor.tick(), 480);
        assert!(!cursor.next());
        assert_eq!(cursor.state(), CursorState::BoundUnpositioned);
        assert_eq!(cursor.tick(), 0);
        assert!(cursor.element().is_none());
        // exhausted cursor stays put
        assert!(!cursor.next());
    }

    #[test]
    fn test_rewind_is_idempotent() {
        let score = test_score(2, 3);
        let mut cursor = Cursor::with_score(&score);
        cursor.rewind(0);
        let first = cursor.segment();
        cursor.rewind(0);
        assert_eq!(cursor.segment(), first);
        assert_eq!(cursor.tick(), 0);
    }

    #[test]
    fn test_filter_enumerates_matching_segments() {
        let score = test_score(1, 2);
        {
            let mut s = score.borrow_mut();
            let m0 = s.measure_at(0).unwrap();
            s.get_or_create_segment(m0, SegmentType::Clef, 0).unwrap();
            s.get_or_create_segment(m0, SegmentType::Breath, 960).unwrap();
            s.get_or_create_segment(m0, SegmentType::EndBarLine, 1920)
                .unwrap();
        }
        let mut cursor = Cursor::with_score(&score);
        assert_eq!(walk(&mut cursor), vec![0, 1920]);

        cursor.set_filter(SegmentTypeFilter::all());
        assert_eq!(walk(&mut cursor), vec![0, 0, 960, 1920, 1920]);

        cursor.set_filter(
            SegmentTypeFilter::only(SegmentType::Breath).with(SegmentType::EndBarLine),
        );
        assert_eq!(walk(&mut cursor), vec![960, 1920]);

        cursor.set_filter(SegmentTypeFilter::empty());
        assert_eq!(walk(&mut cursor), Vec::<i32>::new());
    }

    #[test]
    fn test_next_stops_on_empty_tracks() {
        let score = test_score(2, 1);
        {
            let mut s = score.borrow_mut();
            let m0 = s.measure_at(0).unwrap();
            let seg = s
                .get_or_create_segment(m0, SegmentType::ChordRest, 960)
                .unwrap();
            s.add_element(seg, 4, Element::rest(Fraction::HALF)).unwrap();
        }
        let mut cursor = Cursor::with_score(&score);
        cursor.rewind(0);
        assert!(cursor.next());
        assert_eq!(cursor.tick(), 960);
        assert!(cursor.element().is_none());
        cursor.set_staff_idx(1);
        assert_eq!(cursor.element().unwrap().name(), "Rest");
    }

    #[test]
    fn test_next_measure() {
        let score = test_score(1, 3);
        let mut cursor = Cursor::with_score(&score);
        cursor.rewind(0);
        assert!(cursor.next_measure());
        assert_eq!(cursor.tick(), 1920);
        assert!(cursor.next_measure());
        assert_eq!(cursor.tick(), 3840);
        assert!(!cursor.next_measure());
        assert_eq!(cursor.state(), CursorState::BoundUnpositioned);

        // the landing segment ignores the filter
        {
            let mut s = score.borrow_mut();
            let m1 = s.measure_at(1).unwrap();
            s.get_or_create_segment(m1, SegmentType::KeySig, 1920).unwrap();
        }
        cursor.rewind(0);
        assert!(cursor.next_measure());
        assert_eq!(cursor.segment_type(), Some(SegmentType::KeySig));
        assert_eq!(
            cursor.segment().unwrap().get("segmentType"),
            Some(PropertyValue::Str("key-sig".to_string()))
        );
        assert_eq!(
            cursor.measure().unwrap().get("number"),
            Some(PropertyValue::Int(2))
        );
    }

    #[test]
    fn test_track_decomposition() {
        let mut cursor = Cursor::new();
        for t in 0..16 {
            cursor.set_track(t);
            assert_eq!(cursor.staff_idx() * 4 + cursor.voice(), t);
        }
        cursor.set_track(6);
        cursor.set_staff_idx(3);
        assert_eq!((cursor.track(), cursor.voice()), (14, 2));
        cursor.set_voice(1);
        assert_eq!((cursor.track(), cursor.staff_idx()), (13, 3));
        cursor.set_voice(4);
        assert_eq!(cursor.track(), 13);
    }

    #[test]
    fn test_out_of_range_track_is_inert() {
        let score = test_score(1, 1);
        let mut cursor = Cursor::with_score(&score);
        cursor.rewind(0);
        cursor.set_track(9);
        assert!(cursor.element().is_none());
        assert_eq!(cursor.key_signature(), 0);
        assert!(!cursor.add_note(60));
        cursor.set_track(-1);
        assert!(!cursor.add(Element::rest(Fraction::QUARTER)));
        cursor.set_track(0);
        assert!(cursor.element().is_some());
    }

    #[test]
    fn test_extreme_track_values() {
        let score = test_score(1, 1);
        let mut cursor = Cursor::with_score(&score);
        cursor.rewind(0);

        cursor.set_track(i32::MAX);
        assert_eq!((cursor.staff_idx(), cursor.voice()), (i32::MAX / 4, 3));
        cursor.set_staff_idx(i32::MAX);
        assert_eq!(cursor.track(), i32::MAX);
        cursor.set_voice(0);
        assert_eq!(cursor.track(), i32::MAX - 3);
        assert!(cursor.element().is_none());
        assert!(!cursor.add_note(60));
        assert_eq!(cursor.key_signature(), 0);

        cursor.set_track(i32::MIN);
        assert_eq!((cursor.staff_idx(), cursor.voice()), (i32::MIN / 4, 0));
        cursor.set_voice(3);
        assert_eq!(cursor.track(), i32::MIN + 3);
        cursor.set_staff_idx(i32::MIN);
        assert_eq!(cursor.track(), i32::MIN + 3);
        assert!(cursor.element().is_none());
        assert!(!cursor.add(Element::rest(Fraction::QUARTER)));

        assert_eq!(cursor.state(), CursorState::BoundPositioned);
        cursor.set_staff_idx(0);
        cursor.set_voice(0);
        assert!(cursor.element().is_some());
    }

    #[test]
    fn test_oversized_duration_falls_back() {
        let score = test_score(1, 1);
        let mut cursor = Cursor::with_score(&score);
        cursor.rewind(0);
        cursor.set_duration(2_236_963, 1);
        assert_eq!(cursor.duration(), Fraction::QUARTER);
        assert!(cursor.add_note(60));
        assert_eq!(cursor.tick(), 480);
        cursor.set_duration(i32::MAX, 1);
        assert_eq!(cursor.duration(), Fraction::QUARTER);
    }

    #[test]
    fn test_add_note_advances() {
        let score = test_score(1, 2);
        let mut cursor = Cursor::with_score(&score);
        cursor.rewind(0);
        cursor.set_duration(1, 4);
        assert!(cursor.add_note(60));
        assert_eq!(cursor.tick(), 480);
        cursor.set_duration(1, 2);
        assert!(cursor.add_note(62));
        assert_eq!(cursor.tick(), 1440);

        cursor.rewind(0);
        let element = cursor.element().unwrap();
        assert_eq!(element.element_type(), Some(ElementType::Note));
        assert_eq!(element.get("pitch"), Some(PropertyValue::Int(60)));
        cursor.next();
        assert_eq!(cursor.element().unwrap().get("pitch"), Some(PropertyValue::Int(62)));
        cursor.next();
        assert_eq!(cursor.element().unwrap().name(), "Rest");
    }

    #[test]
    fn test_add_note_at_score_end() {
        let score = test_score(1, 1);
        let mut cursor = Cursor::with_score(&score);
        cursor.rewind(0);
        cursor.set_duration(1, 1);
        assert!(cursor.add_note(72));
        assert_eq!(cursor.state(), CursorState::BoundUnpositioned);
        assert!(!cursor.add_note(72));
    }

    #[test]
    fn test_add_uses_cursor_duration() {
        let score = test_score(1, 1);
        let mut cursor = Cursor::with_score(&score);
        cursor.rewind(0);
        cursor.set_duration(0, 0);
        assert_eq!(cursor.duration(), Fraction::QUARTER);
        cursor.set_duration(3, 8);
        assert!(cursor.add(Element::chord(&[60, 64, 67], Fraction::WHOLE).unwrap()));
        assert_eq!(
            cursor.element().unwrap().get("durationTicks"),
            Some(PropertyValue::Int(720))
        );
        assert!(cursor.add(Element::staff_text("dolce")));
        assert_eq!(cursor.element().unwrap().name(), "Chord");
        cursor.set_duration(-1, 4);
        assert_eq!(cursor.duration(), Fraction::QUARTER);
    }

    #[test]
    fn test_unbound_cursor_sentinels() {
        let mut cursor = Cursor::new();
        assert_eq!(cursor.state(), CursorState::Unbound);
        cursor.rewind(0);
        assert!(!cursor.next());
        assert!(!cursor.next_measure());
        assert!(!cursor.add_note(60));
        assert!(!cursor.add(Element::Breath));
        assert_eq!(cursor.tick(), 0);
        assert_eq!(cursor.time(), 0.0);
        assert_eq!(cursor.tempo(), 0.0);
        assert_eq!(cursor.key_signature(), 0);
        assert!(cursor.element().is_none());
        assert!(cursor.segment().is_none());
        assert!(cursor.measure().is_none());
    }

    #[test]
    fn test_set_score_resets_position() {
        let a = test_score(1, 2);
        let b = test_score(1, 2);
        let mut cursor = Cursor::with_score(&a);
        cursor.rewind(0);
        cursor.next_measure();
        assert_eq!(cursor.state(), CursorState::BoundPositioned);
        cursor.set_score(Some(&b));
        assert_eq!(cursor.state(), CursorState::BoundUnpositioned);
        cursor.set_score(None);
        assert_eq!(cursor.state(), CursorState::Unbound);
    }

    #[test]
    fn test_dropped_score_unbinds() {
        let score = test_score(1, 1);
        let mut cursor = Cursor::with_score(&score);
        cursor.rewind(0);
        let element = cursor.element().unwrap();
        drop(score);
        assert_eq!(cursor.state(), CursorState::Unbound);
        assert!(cursor.element().is_none());
        assert!(!cursor.next());
        assert!(!element.is_valid());
    }

    #[test]
    fn test_stale_segment_unpositions() {
        let score = test_score(1, 2);
        let mut cursor = Cursor::with_score(&score);
        cursor.rewind(0);
        let segment = score.borrow().first_segment(SegmentTypeFilter::all()).unwrap();
        score.borrow_mut().remove_segment(segment);
        assert_eq!(cursor.state(), CursorState::BoundUnpositioned);
        assert_eq!(cursor.tick(), 0);
        assert!(!cursor.next());
    }

    #[test]
    fn test_rewind_to_selection() {
        let score = test_score(3, 4);
        score.borrow_mut().select_range(1920, 3840, 1, 3).unwrap();
        let mut cursor = Cursor::with_score(&score);

        cursor.rewind(1);
        assert_eq!((cursor.tick(), cursor.track()), (1920, 4));
        cursor.rewind(2);
        assert_eq!((cursor.tick(), cursor.track()), (3840, 11));

        score.borrow_mut().clear_selection();
        cursor.rewind(1);
        assert_eq!(cursor.state(), CursorState::BoundUnpositioned);

        cursor.rewind(0);
        cursor.rewind(7);
        assert_eq!(cursor.state(), CursorState::BoundUnpositioned);
    }

    #[test]
    fn test_time_tempo_and_key() {
        let score = test_score(2, 2);
        {
            let mut s = score.borrow_mut();
            s.set_tempo(1920, 60.0).unwrap();
            s.set_key(1, 1920, Key::new(3).unwrap()).unwrap();
        }
        let mut cursor = Cursor::with_score(&score);
        cursor.rewind(0);
        assert_eq!(cursor.tempo(), 120.0);
        cursor.set_staff_idx(1);
        assert_eq!(cursor.key_signature(), 0);
        cursor.next();
        assert_eq!(cursor.tick(), 1920);
        assert_eq!(cursor.time(), 2.0);
        assert_eq!(cursor.tempo(), 60.0);
        assert_eq!(cursor.key_signature(), 3);
        cursor.set_staff_idx(0);
        assert_eq!(cursor.key_signature(), 0);
    }

    #[test]
    fn test_expanded_traversal() {
        // | m0 |: m1 :| m2 |
        let score = test_score(1, 3);
        score.borrow_mut().set_repeat_start(1, true).unwrap();
        score.borrow_mut().set_repeat_end(1, Some(3)).unwrap();

        let mut cursor = Cursor::with_score_expanded(&score, true);
        let mut visited = Vec::new();
        cursor.rewind(0);
        while cursor.state() == CursorState::BoundPositioned {
            visited.push((cursor.tick(), cursor.playback_tick(), cursor.time()));
            cursor.next();
        }
        assert_eq!(
            visited,
            vec![
                (0, 0, 0.0),
                (1920, 1920, 2.0),
                (1920, 3840, 4.0),
                (1920, 5760, 6.0),
                (3840, 7680, 8.0),
            ]
        );

        cursor.rewind(0);
        let mut measures = Vec::new();
        while cursor.state() == CursorState::BoundPositioned {
            measures.push(cursor.tick());
            cursor.next_measure();
        }
        assert_eq!(measures, vec![0, 1920, 1920, 1920, 3840]);

        cursor.set_expand_repeats(false);
        assert_eq!(walk(&mut cursor), vec![0, 1920, 3840]);
    }
}
