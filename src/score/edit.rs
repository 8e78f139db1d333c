use super::{ElementHandle, MeasureHandle, Score, ScoreElement, SegmentHandle, VOICES};
use crate::error::ScoreError;
use crate::types::element::{BarLineType, Element};
use crate::types::fraction::Fraction;
use crate::types::segment_type::SegmentType;

impl Score {
    /// Stores `element` in the track slot of `segment`, dropping whatever was
    /// there before.
    pub(super) fn store_element(
        &mut self,
        segment: SegmentHandle,
        track: usize,
        element: Element,
    ) -> ElementHandle {
        let handle = self.elements.insert(ScoreElement {
            element,
            segment,
            track,
        });
        let previous = self
            .segments
            .get_mut(segment)
            .and_then(|s| s.elements.get_mut(track))
            .and_then(|slot| slot.replace(handle));
        if let Some(previous) = previous {
            self.elements.remove(previous);
        }
        handle
    }

    fn remove_element(&mut self, segment: SegmentHandle, track: usize) {
        let removed = self
            .segments
            .get_mut(segment)
            .and_then(|s| s.elements.get_mut(track))
            .and_then(Option::take);
        if let Some(handle) = removed {
            self.elements.remove(handle);
        }
    }

    fn check_track(&self, track: usize) -> Result<(), ScoreError> {
        if track >= self.track_count() {
            return Err(ScoreError::InvalidTrack {
                track: track as i32,
                tracks: self.track_count(),
            });
        }
        Ok(())
    }

    /// Inserts `element` at `segment`/`track`.
    ///
    /// Elements that belong to another segment kind are placed on a segment
    /// of that kind at the same tick (bar lines go to the measure edges). A
    /// note added on top of a note or chord of equal duration is merged into
    /// a chord; otherwise the previous occupant is replaced. Staff text is
    /// kept next to the chord-rest and never displaces it.
    pub fn add_element(
        &mut self,
        segment: SegmentHandle,
        track: usize,
        element: Element,
    ) -> Result<ElementHandle, ScoreError> {
        self.check_track(track)?;
        let (kind, tick, measure) = self
            .segment(segment)
            .map(|s| (s.kind, s.tick, s.measure))
            .ok_or(ScoreError::StaleSegment(segment))?;
        let (measure_tick, measure_end) = self
            .measure(measure)
            .map(|m| (m.tick, m.end_tick()))
            .ok_or(ScoreError::StaleMeasure(measure))?;

        let target_kind = element.segment_type();
        let target_tick = match &element {
            Element::BarLine {
                kind: BarLineType::StartRepeat,
            } => measure_tick,
            Element::BarLine { .. } => measure_end,
            _ => tick,
        };
        let target = if target_kind == kind && target_tick == tick {
            segment
        } else {
            self.get_or_create_segment(measure, target_kind, target_tick)?
        };

        if matches!(element, Element::StaffText { .. }) {
            let handle = self.elements.insert(ScoreElement {
                element,
                segment: target,
                track,
            });
            if let Some(s) = self.segments.get_mut(target) {
                s.annotations.push(handle);
            }
            return Ok(handle);
        }

        match &element {
            Element::BarLine {
                kind: BarLineType::StartRepeat,
            } => self.set_measure_repeat(measure, |m| m.repeat_start = true),
            Element::BarLine {
                kind: BarLineType::EndRepeat,
            } => self.set_measure_repeat(measure, |m| {
                m.repeat_end.get_or_insert(2);
            }),
            Element::KeySig { key } => self.set_key(track / VOICES, target_tick, *key)?,
            _ => {}
        }

        if let Element::Note { pitch, duration, .. } = &element {
            if let Some(existing) = self.element_at(target, track) {
                if let Some(entry) = self.elements.get_mut(existing) {
                    if entry.element.duration() == Some(*duration)
                        && entry.element.add_pitch(*pitch)
                    {
                        return Ok(existing);
                    }
                }
            }
        }

        Ok(self.store_element(target, track, element))
    }

    fn set_measure_repeat(&mut self, measure: MeasureHandle, f: impl FnOnce(&mut super::Measure)) {
        if let Some(m) = self.measures.get_mut(measure) {
            f(m);
        }
        self.invalidate_repeats();
    }

    /// Removes chord-rests in `track` of `measure` that start inside
    /// `start..end` and shortens one that runs into `start`. Returns the
    /// furthest tick the affected chord-rests used to cover.
    fn clear_chord_rests(&mut self, measure: MeasureHandle, track: usize, start: u32, end: u32) -> u32 {
        let mut covered = end;
        let segments = match self.measure(measure) {
            Some(m) => m.segments.clone(),
            None => return covered,
        };
        for segment in segments {
            let Some(s) = self.segment(segment) else {
                continue;
            };
            if s.kind != SegmentType::ChordRest {
                continue;
            }
            let seg_tick = s.tick;
            let Some(handle) = s.element(track) else {
                continue;
            };
            let Some(length) = self
                .element(handle)
                .and_then(|e| e.element.duration())
                .map(|d| d.ticks())
            else {
                continue;
            };
            let seg_end = seg_tick.saturating_add(length);
            if seg_tick >= start && seg_tick < end {
                covered = covered.max(seg_end);
                self.remove_element(segment, track);
            } else if seg_tick < start && seg_end > start {
                covered = covered.max(seg_end);
                if let (Some(entry), Ok(shorter)) = (
                    self.elements.get_mut(handle),
                    Fraction::from_ticks(start - seg_tick),
                ) {
                    entry.element.set_duration(shorter);
                    entry.element.set_tied(false);
                }
            }
        }
        covered
    }

    /// Writes a note of `duration` at the chord-rest `segment` in `track`,
    /// overwriting what the track held in that span.
    ///
    /// A note that does not fit in its measure is split at the bar line and
    /// tied into the next measure; at the end of the score it is cut short.
    /// Space left over by a shortened or removed chord-rest is filled with a
    /// rest. Returns the chord-rest segment right after the note, if any.
    pub fn set_note_rest(
        &mut self,
        segment: SegmentHandle,
        track: usize,
        pitch: u8,
        duration: Fraction,
    ) -> Result<Option<SegmentHandle>, ScoreError> {
        self.check_track(track)?;
        let (mut tick, mut measure) = self
            .segment(segment)
            .map(|s| (s.tick, s.measure))
            .ok_or(ScoreError::StaleSegment(segment))?;
        let mut remaining = duration.ticks();
        let mut previous: Option<ElementHandle> = None;

        loop {
            let measure_end = self
                .measure(measure)
                .map(|m| m.end_tick())
                .ok_or(ScoreError::StaleMeasure(measure))?;
            let length = remaining.min(measure_end - tick);
            let end = tick + length;

            let covered = self.clear_chord_rests(measure, track, tick, end);
            let target = self.get_or_create_segment(measure, SegmentType::ChordRest, tick)?;
            let handle = self.store_element(
                target,
                track,
                Element::Note {
                    pitch,
                    duration: Fraction::from_ticks(length)?,
                    tied: false,
                },
            );
            if let Some(entry) = previous.and_then(|p| self.elements.get_mut(p)) {
                entry.element.set_tied(true);
            }
            previous = Some(handle);

            if covered > end {
                let gap = self.get_or_create_segment(measure, SegmentType::ChordRest, end)?;
                self.store_element(gap, track, Element::rest(Fraction::from_ticks(covered - end)?));
            }

            remaining -= length;
            tick = end;

            if tick < measure_end {
                return self
                    .get_or_create_segment(measure, SegmentType::ChordRest, tick)
                    .map(Some);
            }
            let Some(next) = self.next_measure(measure) else {
                if remaining > 0 {
                    log::debug!("note at end of score shortened by {} ticks", remaining);
                }
                return Ok(None);
            };
            measure = next;
            tick = self.measure(measure).map(|m| m.tick).unwrap_or(tick);
            if remaining == 0 {
                return self
                    .get_or_create_segment(measure, SegmentType::ChordRest, tick)
                    .map(Some);
            }
        }
    }
}
