use crate::cursor::{Cursor, CursorState};
use crate::score::{ScoreRef, VOICES};
use crate::types::element::PropertyValue;
use crate::types::segment_type::SegmentTypeFilter;
use crate::util::format_seconds;
use crate::wrapper::ItemHandle;
use std::fmt;

/// One stop of a cursor traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingRow {
    pub tick: i32,
    pub playback_tick: i32,
    pub time: f64,
    pub measure: i64,
    pub segment: String,
    /// `(track, element)` for every occupied track, annotations last.
    pub elements: Vec<(usize, String)>,
}

impl fmt::Display for ListingRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:>7} m{:<3} {:<14}",
            format_seconds(self.time),
            self.playback_tick,
            self.measure,
            self.segment
        )?;
        let parts: Vec<String> = self
            .elements
            .iter()
            .map(|(track, element)| {
                format!("s{}v{} {}", track / VOICES, track % VOICES, element)
            })
            .collect();
        if !parts.is_empty() {
            write!(f, " {}", parts.join(" | "))?;
        }
        Ok(())
    }
}

/// Table of every segment a cursor with the given filter visits.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    rows: Vec<ListingRow>,
}

impl Listing {
    pub fn new(score: &ScoreRef, filter: SegmentTypeFilter, expand_repeats: bool) -> Self {
        let mut cursor = Cursor::with_score_expanded(score, expand_repeats);
        cursor.set_filter(filter);
        cursor.rewind(0);
        if cursor
            .segment_type()
            .is_some_and(|kind| !filter.contains(kind))
        {
            cursor.next();
        }

        let tracks = score.borrow().track_count();
        let mut rows = Vec::new();
        while cursor.state() == CursorState::BoundPositioned {
            rows.push(Self::row(score, &mut cursor, tracks));
            cursor.next();
        }
        log::debug!("listing has {} rows", rows.len());
        Self { rows }
    }

    fn row(score: &ScoreRef, cursor: &mut Cursor, tracks: usize) -> ListingRow {
        let track = cursor.track();
        let mut elements = Vec::new();
        for t in 0..tracks {
            cursor.set_track(t as i32);
            if let Some(element) = cursor.element().and_then(|e| e.element()) {
                elements.push((t, element.to_string()));
            }
        }
        cursor.set_track(track);

        if let Some(ItemHandle::Segment(handle)) = cursor.segment().map(|s| s.item()) {
            let score = score.borrow();
            let annotations = score
                .segment(handle)
                .map(|s| s.annotations().to_vec())
                .unwrap_or_default();
            for annotation in annotations {
                if let Some(entry) = score.element(annotation) {
                    elements.push((entry.track(), entry.element().to_string()));
                }
            }
        }

        let measure = match cursor.measure().and_then(|m| m.get("number")) {
            Some(PropertyValue::Int(number)) => number,
            _ => 0,
        };
        ListingRow {
            tick: cursor.tick(),
            playback_tick: cursor.playback_tick(),
            time: cursor.time(),
            measure,
            segment: cursor
                .segment_type()
                .map(|kind| kind.name().to_string())
                .unwrap_or_default(),
            elements,
        }
    }

    pub fn rows(&self) -> &[ListingRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            writeln!(f, "{}", row)?;
        }
        Ok(())
    }
}
