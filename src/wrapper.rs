use crate::score::{ElementHandle, MeasureHandle, Score, SegmentHandle};
use crate::types::element::{Element, ElementType, Property, PropertyValue};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemHandle {
    Element(ElementHandle),
    Segment(SegmentHandle),
    Measure(MeasureHandle),
}

/// Script-side view of a score item.
///
/// Holds a weak score reference and a handle; every accessor resolves both
/// again, so a wrapper outliving its score or item reads as empty.
#[derive(Debug, Clone)]
pub struct ElementW {
    score: Weak<RefCell<Score>>,
    item: ItemHandle,
}

impl ElementW {
    pub(crate) fn new(score: Weak<RefCell<Score>>, item: ItemHandle) -> Self {
        Self { score, item }
    }

    pub fn item(&self) -> ItemHandle {
        self.item
    }

    fn with_score<R>(&self, f: impl FnOnce(&Score) -> Option<R>) -> Option<R> {
        let score: Rc<RefCell<Score>> = self.score.upgrade()?;
        let score = score.try_borrow().ok()?;
        f(&score)
    }

    pub fn is_valid(&self) -> bool {
        self.with_score(|score| match self.item {
            ItemHandle::Element(h) => score.element(h).map(|_| ()),
            ItemHandle::Segment(h) => score.segment(h).map(|_| ()),
            ItemHandle::Measure(h) => score.measure(h).map(|_| ()),
        })
        .is_some()
    }

    pub fn element_type(&self) -> Option<ElementType> {
        self.with_score(|score| match self.item {
            ItemHandle::Element(h) => Some(score.element(h)?.element().element_type()),
            ItemHandle::Segment(h) => score.segment(h).map(|_| ElementType::Segment),
            ItemHandle::Measure(h) => score.measure(h).map(|_| ElementType::Measure),
        })
    }

    /// Empty once the item is gone.
    pub fn name(&self) -> String {
        self.element_type()
            .map(|t| t.name().to_string())
            .unwrap_or_default()
    }

    /// Integer type code; 0 once the item is gone.
    pub fn type_id(&self) -> i32 {
        self.element_type().map(|t| t as i32).unwrap_or(0)
    }

    pub fn tick(&self) -> i32 {
        self.with_score(|score| {
            let tick = match self.item {
                ItemHandle::Element(h) => score.segment(score.element(h)?.segment())?.tick(),
                ItemHandle::Segment(h) => score.segment(h)?.tick(),
                ItemHandle::Measure(h) => score.measure(h)?.tick(),
            };
            Some(tick as i32)
        })
        .unwrap_or(0)
    }

    /// Copy of the wrapped element; `None` for segments and measures.
    pub fn element(&self) -> Option<Element> {
        self.with_score(|score| match self.item {
            ItemHandle::Element(h) => Some(score.element(h)?.element().clone()),
            _ => None,
        })
    }

    /// Reads a property by its script name. Unknown names and properties the
    /// item does not have yield `None`.
    pub fn get(&self, name: &str) -> Option<PropertyValue> {
        match name.parse::<Property>() {
            Ok(property) => self.get_property(property),
            Err(e) => {
                log::debug!("{}", e);
                None
            }
        }
    }

    pub fn get_property(&self, property: Property) -> Option<PropertyValue> {
        self.with_score(|score| match self.item {
            ItemHandle::Element(h) => score.element(h)?.element().get(property),
            ItemHandle::Segment(h) => {
                let segment = score.segment(h)?;
                match property {
                    Property::SegmentKind => {
                        Some(PropertyValue::Str(segment.kind().name().to_string()))
                    }
                    Property::Tick => Some(PropertyValue::Int(segment.tick() as i64)),
                    _ => None,
                }
            }
            ItemHandle::Measure(h) => {
                let measure = score.measure(h)?;
                let signature = measure.time_signature();
                match property {
                    Property::Number => {
                        Some(PropertyValue::Int(score.measure_index(h)? as i64 + 1))
                    }
                    Property::Tick => Some(PropertyValue::Int(measure.tick() as i64)),
                    Property::DurationTicks => Some(PropertyValue::Int(measure.ticks() as i64)),
                    Property::Numerator => Some(PropertyValue::Int(signature.numerator as i64)),
                    Property::Denominator => {
                        Some(PropertyValue::Int(signature.denominator as i64))
                    }
                    _ => None,
                }
            }
        })
    }
}

impl PartialEq for ElementW {
    fn eq(&self, other: &Self) -> bool {
        self.item == other.item && Weak::ptr_eq(&self.score, &other.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::segment_type::SegmentTypeFilter;
    use crate::types::signature::TimeSignature;

    #[test]
    fn test_wrapper_reads() {
        let mut score = Score::new(1);
        score.append_measures(2, "3/4".parse::<TimeSignature>().unwrap());
        let score = score.into_ref();

        let (segment, element, measure) = {
            let s = score.borrow();
            let measure = s.measure_at(1).unwrap();
            let segment = s.first_segment_in(measure, SegmentTypeFilter::all()).unwrap();
            (segment, s.element_at(segment, 0).unwrap(), measure)
        };
        let weak = Rc::downgrade(&score);

        let rest = ElementW::new(weak.clone(), ItemHandle::Element(element));
        assert_eq!(rest.name(), "Rest");
        assert_eq!(rest.type_id(), ElementType::Rest as i32);
        assert_eq!(rest.tick(), 1440);
        assert_eq!(rest.get("durationTicks"), Some(PropertyValue::Int(1440)));
        assert_eq!(rest.get("pitch"), None);
        assert_eq!(rest.get("nonsense"), None);

        let segment = ElementW::new(weak.clone(), ItemHandle::Segment(segment));
        assert_eq!(segment.name(), "Segment");
        assert_eq!(
            segment.get("segmentType"),
            Some(PropertyValue::Str("chord-rest".to_string()))
        );

        let measure = ElementW::new(weak, ItemHandle::Measure(measure));
        assert_eq!(measure.get("number"), Some(PropertyValue::Int(2)));
        assert_eq!(measure.get("numerator"), Some(PropertyValue::Int(3)));

        drop(score);
        assert!(!rest.is_valid());
        assert_eq!(rest.name(), "");
        assert_eq!(rest.type_id(), 0);
        assert_eq!(rest.tick(), 0);
        assert_eq!(measure.get("number"), None);
    }
}
