use crate::cursor::{Cursor, CursorState};
use crate::score::{RepeatSegment, Score, ScoreRef, VOICES};
use crate::types::element::Element;
use crate::types::fraction::DIVISION;
use crate::types::segment_type::SegmentType;
use anyhow::Result;
use midly::num::{u4, u7, u15, u24, u28};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::collections::BTreeMap;

const VELOCITY: u8 = 80;

/// Sort rank for events on the same tick: meta first, then note offs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Meta,
    NoteOff,
    NoteOn,
}

struct TimedEvent {
    tick: u32,
    rank: Rank,
    kind: TrackEventKind<'static>,
}

/// Writes the score as a single-track SMF at 480 ticks per quarter.
///
/// Notes are collected by walking every track with a cursor; tied notes
/// become a single note. With `expand_repeats` the output follows playback
/// order.
pub fn convert_score_to_midi(score: &ScoreRef, expand_repeats: bool) -> Result<Vec<u8>> {
    let mut events = {
        let score = score.borrow();
        meta_events(&score, &runs(&score, expand_repeats))
    };
    let tracks = score.borrow().track_count();
    for track in 0..tracks {
        events.extend(track_events(score, track, expand_repeats));
    }
    events.sort_by_key(|e| (e.tick, e.rank));
    log::debug!("writing {} midi events", events.len());

    let smf = events_to_smf(events);
    let mut buffer = Vec::new();
    smf.write(&mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to write MIDI: {}", e))?;
    Ok(buffer)
}

fn runs(score: &Score, expand_repeats: bool) -> Vec<RepeatSegment> {
    if expand_repeats {
        return score.repeat_list().segments().to_vec();
    }
    match score.measure_count() {
        0 => Vec::new(),
        count => vec![RepeatSegment {
            first_measure: 0,
            last_measure: count - 1,
            tick: 0,
            len: score.end_tick(),
            utick: 0,
        }],
    }
}

fn meta_events(score: &Score, runs: &[RepeatSegment]) -> Vec<TimedEvent> {
    let mut events = Vec::new();
    let mut last_tempo = None;
    let mut last_signature = None;
    let mut last_key = None;

    for run in runs {
        let to_utick = |tick: u32| run.utick + tick - run.tick;
        let run_end = run.tick + run.len;

        let tempos = std::iter::once((run.tick, score.tempo_at(run.tick))).chain(
            score
                .tempo_map()
                .changes()
                .filter(|(tick, _)| *tick > run.tick && *tick < run_end),
        );
        for (tick, bpm) in tempos {
            if last_tempo == Some(bpm) {
                continue;
            }
            last_tempo = Some(bpm);
            let micros = (60_000_000.0 / bpm).round() as u32;
            events.push(TimedEvent {
                tick: to_utick(tick),
                rank: Rank::Meta,
                kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(micros))),
            });
        }

        for index in run.first_measure..=run.last_measure {
            let Some(measure) = score.measure_at(index).and_then(|m| score.measure(m)) else {
                continue;
            };
            let signature = measure.time_signature();
            if last_signature != Some(signature) {
                last_signature = Some(signature);
                events.push(TimedEvent {
                    tick: to_utick(measure.tick()),
                    rank: Rank::Meta,
                    kind: TrackEventKind::Meta(MetaMessage::TimeSignature(
                        signature.numerator,
                        signature.denominator.trailing_zeros() as u8,
                        24, // MIDI clocks per metronome click
                        8,  // 32nd notes per quarter note
                    )),
                });
            }
            let key = score.key_at(0, measure.tick());
            if last_key != Some(key) {
                last_key = Some(key);
                events.push(TimedEvent {
                    tick: to_utick(measure.tick()),
                    rank: Rank::Meta,
                    kind: TrackEventKind::Meta(MetaMessage::KeySignature(
                        key.accidentals() as i8,
                        false,
                    )),
                });
            }
        }
    }
    events
}

/// Sounding note: start, end and whether it continues into the next one.
struct OpenNote {
    start: u32,
    end: u32,
    tied: bool,
}

fn track_events(score: &ScoreRef, track: usize, expand_repeats: bool) -> Vec<TimedEvent> {
    let channel = u4::new(((track / VOICES) % 16) as u8);
    let mut events = Vec::new();
    let mut open: BTreeMap<u8, OpenNote> = BTreeMap::new();
    let close = |pitch: u8, note: OpenNote, events: &mut Vec<TimedEvent>| {
        events.push(note_event(note.start, Rank::NoteOn, channel, pitch));
        events.push(note_event(note.end, Rank::NoteOff, channel, pitch));
    };

    let mut cursor = Cursor::with_score_expanded(score, expand_repeats);
    cursor.set_track(track as i32);
    cursor.rewind(0);
    if cursor
        .segment_type()
        .is_some_and(|kind| kind != SegmentType::ChordRest)
    {
        cursor.next();
    }

    while cursor.state() == CursorState::BoundPositioned {
        if let Some(element) = cursor.element().and_then(|e| e.element()) {
            let start = cursor.playback_tick() as u32;
            let (pitches, tied) = match &element {
                Element::Note { tied, .. } | Element::Chord { tied, .. } => {
                    (element.pitches(), *tied)
                }
                _ => (Vec::new(), false),
            };
            let length = element.duration().map(|d| d.ticks()).unwrap_or(0);

            let finished: Vec<u8> = open
                .iter()
                .filter(|(pitch, note)| {
                    !(note.tied && note.end == start && pitches.contains(*pitch))
                })
                .map(|(pitch, _)| *pitch)
                .collect();
            for pitch in finished {
                if let Some(note) = open.remove(&pitch) {
                    close(pitch, note, &mut events);
                }
            }

            for pitch in pitches {
                let note = open.entry(pitch).or_insert(OpenNote {
                    start,
                    end: start,
                    tied,
                });
                note.end = start.saturating_add(length);
                note.tied = tied;
            }
        }
        cursor.next();
    }
    for (pitch, note) in open {
        close(pitch, note, &mut events);
    }
    events
}

fn note_event(tick: u32, rank: Rank, channel: u4, pitch: u8) -> TimedEvent {
    let key = u7::new(pitch);
    let message = match rank {
        Rank::NoteOff => MidiMessage::NoteOff {
            key,
            vel: u7::new(0),
        },
        _ => MidiMessage::NoteOn {
            key,
            vel: u7::new(VELOCITY),
        },
    };
    TimedEvent {
        tick,
        rank,
        kind: TrackEventKind::Midi { channel, message },
    }
}

fn events_to_smf(events: Vec<TimedEvent>) -> Smf<'static> {
    let mut track_events = Vec::with_capacity(events.len() + 1);
    let mut last_tick = 0;
    for event in events {
        track_events.push(TrackEvent {
            delta: u28::new(event.tick - last_tick),
            kind: event.kind,
        });
        last_tick = event.tick;
    }
    track_events.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    Smf {
        header: midly::Header {
            format: midly::Format::SingleTrack,
            timing: Timing::Metrical(u15::new(DIVISION as u16)),
        },
        tracks: vec![track_events],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fraction::Fraction;
    use crate::util::test_score;
    use pretty_assertions::assert_eq;

    /// `(tick, channel, key, on)` for every note message.
    fn notes(bytes: &[u8]) -> Vec<(u32, u8, u8, bool)> {
        let smf = Smf::parse(bytes).unwrap();
        assert_eq!(smf.header.timing, Timing::Metrical(u15::new(480)));
        let mut tick = 0;
        let mut out = Vec::new();
        for event in &smf.tracks[0] {
            tick += event.delta.as_int();
            if let TrackEventKind::Midi { channel, message } = event.kind {
                match message {
                    MidiMessage::NoteOn { key, .. } => {
                        out.push((tick, channel.as_int(), key.as_int(), true))
                    }
                    MidiMessage::NoteOff { key, .. } => {
                        out.push((tick, channel.as_int(), key.as_int(), false))
                    }
                    _ => {}
                }
            }
        }
        out
    }

    #[test]
    fn test_notes_and_meta() {
        let score = test_score(2, 2);
        score.borrow_mut().set_tempo(0, 90.0).unwrap();
        let mut cursor = Cursor::with_score(&score);
        cursor.rewind(0);
        cursor.add_note(60);
        cursor.add(Element::chord(&[64, 67], Fraction::QUARTER).unwrap());
        cursor.rewind(0);
        cursor.set_staff_idx(1);
        cursor.add_note(48);

        let bytes = convert_score_to_midi(&score, false).unwrap();
        assert_eq!(
            notes(&bytes),
            vec![
                (0, 0, 60, true),
                (0, 1, 48, true),
                (480, 0, 60, false),
                (480, 1, 48, false),
                (480, 0, 64, true),
                (480, 0, 67, true),
                (960, 0, 64, false),
                (960, 0, 67, false),
            ]
        );

        let smf = Smf::parse(&bytes).unwrap();
        let meta: Vec<MetaMessage> = smf.tracks[0]
            .iter()
            .filter_map(|e| match e.kind {
                TrackEventKind::Meta(m) => Some(m),
                _ => None,
            })
            .collect();
        assert_eq!(
            meta,
            vec![
                MetaMessage::Tempo(u24::new(666_667)),
                MetaMessage::TimeSignature(4, 2, 24, 8),
                MetaMessage::KeySignature(0, false),
                MetaMessage::EndOfTrack,
            ]
        );
    }

    #[test]
    fn test_tied_notes_are_merged() {
        let score = test_score(1, 2);
        let mut cursor = Cursor::with_score(&score);
        cursor.rewind(0);
        cursor.set_duration(3, 4);
        cursor.add_note(62);
        cursor.set_duration(1, 2);
        cursor.add_note(64);

        let bytes = convert_score_to_midi(&score, false).unwrap();
        assert_eq!(
            notes(&bytes),
            vec![
                (0, 0, 62, true),
                (1440, 0, 62, false),
                (1440, 0, 64, true),
                (2400, 0, 64, false),
            ]
        );
    }

    #[test]
    fn test_expanded_repeats() {
        let score = test_score(1, 2);
        score.borrow_mut().set_repeat_end(0, Some(3)).unwrap();
        let mut cursor = Cursor::with_score(&score);
        cursor.rewind(0);
        cursor.set_duration(1, 1);
        cursor.add_note(60);

        let linear = notes(&convert_score_to_midi(&score, false).unwrap());
        assert_eq!(linear.len(), 2);

        let expanded = notes(&convert_score_to_midi(&score, true).unwrap());
        let ons: Vec<u32> = expanded
            .iter()
            .filter(|(_, _, _, on)| *on)
            .map(|(tick, ..)| *tick)
            .collect();
        assert_eq!(ons, vec![0, 1920, 3840]);
    }

    #[test]
    fn test_empty_score() {
        let score = Score::new(1).into_ref();
        let bytes = convert_score_to_midi(&score, true).unwrap();
        assert_eq!(notes(&bytes), vec![]);
    }
}
