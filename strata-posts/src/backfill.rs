//! Ingestion shaping for post collections.
//!
//! The remote API omits `date` and `reactions` on seeded posts. Records
//! missing a date get synthetic timestamps one minute apart, counting back
//! from the fetch time in payload order, so the newest-first ordering of a
//! freshly loaded list is deterministic. Missing reactions become zero
//! counters, and partial reaction objects are completed with zeros.

use std::cmp::Ordering;

use chrono::{Duration, SecondsFormat};
use serde_json::Value;
use strata_cache::{EntityAdapter, QueryData};
use strata_core::record::{DATE_FIELD, REACTIONS_FIELD};
use strata_core::{Reactions, Record, ShapingError, Timestamp};

/// Gap between consecutive synthesized dates.
pub const BACKFILL_STEP_MINUTES: i64 = 1;

/// Storage rule for posts: newest `date` first, undated records last, ties in
/// arrival order.
pub const POSTS_ADAPTER: EntityAdapter = EntityAdapter::sorted(newest_first);

/// Ordering of posts by descending `date`.
pub fn newest_first(a: &Record, b: &Record) -> Ordering {
    b.date().cmp(&a.date())
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn format_timestamp(at: Timestamp) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// Complete `reactions` to all five counters, keeping the ones present.
/// Anything other than an object is replaced by zeros.
fn fill_reactions(record: &mut Record) {
    let mut counters = Reactions::default().to_value();
    if let (Some(Value::Object(present)), Value::Object(filled)) =
        (record.get(REACTIONS_FIELD), &mut counters)
    {
        filled.extend(present.iter().map(|(key, value)| (key.clone(), value.clone())));
    }
    record.set(REACTIONS_FIELD, counters);
}

/// Parse a raw array into records and fill in missing fields.
///
/// The n-th record without a date (counting from one) is dated
/// `now - n * BACKFILL_STEP_MINUTES`.
pub fn backfill_records(raw: Value, now: Timestamp) -> Result<Vec<Record>, ShapingError> {
    let items = match raw {
        Value::Array(items) => items,
        other => {
            return Err(ShapingError::UnexpectedShape {
                expected: "array of posts",
                found: other.to_string(),
            })
        }
    };

    let mut missing_dates = 0i64;
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let mut record = Record::from_value(item, index)?;
            if is_blank(record.get(DATE_FIELD)) {
                missing_dates += 1;
                let date = now - Duration::minutes(missing_dates * BACKFILL_STEP_MINUTES);
                record.set(DATE_FIELD, format_timestamp(date));
            }
            fill_reactions(&mut record);
            Ok(record)
        })
        .collect()
}

/// Response shaper for post collections.
pub fn shape_posts(raw: Value) -> Result<QueryData, ShapingError> {
    let records = backfill_records(raw, chrono::Utc::now())?;
    Ok(QueryData::Entities(POSTS_ADAPTER.set_all(records)))
}

/// Response shaper for a single post; stored as a one-record collection.
pub fn shape_post(raw: Value) -> Result<QueryData, ShapingError> {
    shape_posts(Value::Array(vec![raw]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use strata_core::EntityId;

    fn fixed_now() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_missing_dates_count_back_one_minute_each() {
        let raw = json!([{"id": 1}, {"id": 2, "date": "2020-01-01T00:00:00.000Z"}, {"id": 3}]);
        let records = backfill_records(raw, fixed_now()).unwrap();

        assert_eq!(
            records[0].get(DATE_FIELD),
            Some(&json!("2024-03-01T11:59:00.000Z"))
        );
        assert_eq!(
            records[1].get(DATE_FIELD),
            Some(&json!("2020-01-01T00:00:00.000Z"))
        );
        assert_eq!(
            records[2].get(DATE_FIELD),
            Some(&json!("2024-03-01T11:58:00.000Z"))
        );
    }

    #[test]
    fn test_missing_reactions_are_zeroed() {
        let raw = json!([{"id": 1}, {"id": 2, "reactions": {"wow": 4}}]);
        let records = backfill_records(raw, fixed_now()).unwrap();

        assert_eq!(records[0].reactions(), Some(Reactions::default()));
        assert_eq!(
            records[0].get(REACTIONS_FIELD),
            Some(&json!({"thumbsUp": 0, "wow": 0, "heart": 0, "rocket": 0, "coffee": 0}))
        );
        assert_eq!(records[1].reactions().map(|r| r.wow), Some(4));
    }

    #[test]
    fn test_partial_reactions_are_completed() {
        let raw = json!([
            {"id": 1, "reactions": {}},
            {"id": 2, "reactions": {"rocket": 2, "heart": 1}},
            {"id": 3, "reactions": "none"},
        ]);
        let records = backfill_records(raw, fixed_now()).unwrap();

        assert_eq!(
            records[0].get(REACTIONS_FIELD),
            Some(&json!({"thumbsUp": 0, "wow": 0, "heart": 0, "rocket": 0, "coffee": 0}))
        );
        assert_eq!(
            records[1].get(REACTIONS_FIELD),
            Some(&json!({"thumbsUp": 0, "wow": 0, "heart": 1, "rocket": 2, "coffee": 0}))
        );
        assert_eq!(records[2].reactions(), Some(Reactions::default()));
    }

    #[test]
    fn test_non_array_payload_is_rejected() {
        assert!(matches!(
            backfill_records(json!({"id": 1}), fixed_now()),
            Err(ShapingError::UnexpectedShape { .. })
        ));
        assert!(matches!(
            backfill_records(json!([{"title": "no id"}]), fixed_now()),
            Err(ShapingError::MissingId { index: 0 })
        ));
    }

    #[test]
    fn test_shaped_posts_are_newest_first() {
        let raw = json!([
            {"id": 1, "date": "2021-01-01T00:00:00.000Z"},
            {"id": 2},
            {"id": 3, "date": "2023-01-01T00:00:00.000Z"},
            {"id": 4},
        ]);
        let shaped = shape_posts(raw).unwrap();
        let ids: Vec<_> = shaped.as_entities().unwrap().ids().to_vec();
        // 2 and 4 are backfilled near now, in payload order
        let expected: Vec<EntityId> = [2, 4, 3, 1].into_iter().map(EntityId::Int).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_newest_first_puts_undated_last() {
        let dated = Record::new(1).with(DATE_FIELD, "2024-01-01T00:00:00Z");
        let undated = Record::new(2);
        assert_eq!(newest_first(&dated, &undated), Ordering::Less);
        assert_eq!(newest_first(&undated, &undated), Ordering::Equal);
    }

    #[test]
    fn test_single_post_shape() {
        let shaped = shape_post(json!({"id": 9, "title": "t"})).unwrap();
        let snapshot = shaped.as_entities().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get(&EntityId::Int(9)).unwrap().date().is_some());
    }
}
