//! Translation of listing filters into query predicates.

use crate::error::MetadataResult;
use crate::models::coordinate_to_db;
use crate::query::{Column, Predicate, SelectQuery, Value};
use forkchoice_core::FrameFilter;

/// Predicates for the non-label fields of `filter`, in application order:
/// node, then slot, then epoch. Labels are resolved separately.
pub fn predicates(filter: &FrameFilter) -> MetadataResult<Vec<Predicate>> {
    let mut predicates = Vec::with_capacity(3);

    if let Some(node) = &filter.node {
        predicates.push(Predicate::Eq(Column::Node, Value::Text(node.clone())));
    }
    if let Some(slot) = filter.wall_clock_slot {
        predicates.push(Predicate::Eq(
            Column::WallClockSlot,
            Value::Int(coordinate_to_db("wall_clock_slot", slot.get())?),
        ));
    }
    if let Some(epoch) = filter.wall_clock_epoch {
        predicates.push(Predicate::Eq(
            Column::WallClockEpoch,
            Value::Int(coordinate_to_db("wall_clock_epoch", epoch.get())?),
        ));
    }

    Ok(predicates)
}

/// Push the predicates for `filter` onto a frame query.
pub fn apply(filter: &FrameFilter, query: &mut SelectQuery) -> MetadataResult<()> {
    for predicate in predicates(filter)? {
        query.filter(predicate);
    }
    Ok(())
}

/// Whether the filter restricts frame rows beyond their labels.
pub fn has_predicates(filter: &FrameFilter) -> bool {
    filter.node.is_some() || filter.wall_clock_slot.is_some() || filter.wall_clock_epoch.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetadataError;
    use crate::query::Table;

    #[test]
    fn test_open_filter_has_no_predicates() {
        assert!(predicates(&FrameFilter::open()).unwrap().is_empty());
        assert!(!has_predicates(&FrameFilter::open()));
    }

    #[test]
    fn test_predicates_follow_field_order() {
        let filter = FrameFilter::open()
            .with_epoch(3u64)
            .with_slot(100u64)
            .with_node("syd1-prysm-001")
            .with_labels(["ignored-here"]);

        assert_eq!(
            predicates(&filter).unwrap(),
            vec![
                Predicate::Eq(Column::Node, Value::Text("syd1-prysm-001".to_string())),
                Predicate::Eq(Column::WallClockSlot, Value::Int(100)),
                Predicate::Eq(Column::WallClockEpoch, Value::Int(3)),
            ]
        );
        assert!(has_predicates(&filter));
    }

    #[test]
    fn test_apply_appends_to_existing_predicates() {
        let mut query = SelectQuery::from(Table::Frame);
        query.filter_eq(Column::Id, "a");
        apply(&FrameFilter::open().with_slot(7u64), &mut query).unwrap();

        assert_eq!(query.predicates().len(), 2);
        assert_eq!(query.predicates()[1].column(), Column::WallClockSlot);
    }

    #[test]
    fn test_out_of_range_slot_is_a_validation_error() {
        let err = predicates(&FrameFilter::open().with_slot(u64::MAX)).unwrap_err();
        assert!(matches!(err, MetadataError::Validation(_)));
    }
}
