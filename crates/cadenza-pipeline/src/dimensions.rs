//! Dimension builder: projection, set-based dedup, surrogate keys.
//!
//! All four builders are pure batch functions over already-adapted raw
//! records. Dedup is set-based on the full projected tuple, so identical
//! tuples collapse to one row regardless of source-file order; float
//! attributes participate by bit pattern. Surrogate item keys are unique
//! within one invocation and carry no meaning across runs.

use std::collections::{BTreeSet, HashSet};

use crate::error::{PipelineError, Result};
use crate::model::{ActorRow, CreatorRow, ItemRow, TimeBucketRow};
use crate::raw::{RawCatalogRecord, RawEventRecord};

/// Builds the items dimension from catalog records.
///
/// Projects (title, creator, year, duration), deduplicates on the full
/// tuple, then assigns a surrogate key per distinct row. Key values are
/// unique within this invocation only — callers must never persist or
/// compare them across runs.
#[must_use]
pub fn build_items(catalog: &[RawCatalogRecord]) -> Vec<ItemRow> {
    let mut seen: HashSet<(&str, &str, i32, u64)> = HashSet::new();
    let mut rows = Vec::new();
    let mut next_key: i64 = 1;

    for record in catalog {
        let key = (
            record.title.as_str(),
            record.creator_id.as_str(),
            record.year,
            record.duration.to_bits(),
        );
        if seen.insert(key) {
            rows.push(ItemRow {
                item_key: next_key,
                title: record.title.clone(),
                creator_id: record.creator_id.clone(),
                year: record.year,
                duration: record.duration,
            });
            next_key += 1;
        }
    }
    rows
}

/// Builds the creators dimension from catalog records.
///
/// Deduplicates on the full tuple: the same creator identifier with
/// different location or coordinates produces multiple rows.
#[must_use]
pub fn build_creators(catalog: &[RawCatalogRecord]) -> Vec<CreatorRow> {
    let mut seen: HashSet<(&str, &str, Option<&str>, Option<u64>, Option<u64>)> = HashSet::new();
    let mut rows = Vec::new();

    for record in catalog {
        let key = (
            record.creator_id.as_str(),
            record.creator_name.as_str(),
            record.creator_location.as_deref(),
            record.creator_latitude.map(f64::to_bits),
            record.creator_longitude.map(f64::to_bits),
        );
        if seen.insert(key) {
            rows.push(CreatorRow {
                creator_id: record.creator_id.clone(),
                name: record.creator_name.clone(),
                location: record.creator_location.clone(),
                latitude: record.creator_latitude,
                longitude: record.creator_longitude,
            });
        }
    }
    rows
}

/// Builds the actors dimension from qualifying events.
///
/// Deduplicates on the full tuple including subscription level, so an
/// actor whose level changes mid-dataset yields one row per level.
///
/// # Errors
///
/// Returns [`PipelineError::Schema`] if a qualifying event is missing its
/// actor identifier or level.
pub fn build_actors(events: &[RawEventRecord]) -> Result<Vec<ActorRow>> {
    let mut seen: HashSet<(String, Option<String>, Option<String>, Option<String>, String)> =
        HashSet::new();
    let mut rows = Vec::new();

    for event in events.iter().filter(|e| e.is_play()) {
        let actor_id = required_field("user_id", event.user_id.as_deref())?;
        let level = required_field("level", event.level.as_deref())?;

        let key = (
            actor_id.to_string(),
            event.first_name.clone(),
            event.last_name.clone(),
            event.gender.clone(),
            level.to_string(),
        );
        if seen.insert(key) {
            rows.push(ActorRow {
                actor_id: actor_id.to_string(),
                first_name: event.first_name.clone(),
                last_name: event.last_name.clone(),
                gender: event.gender.clone(),
                level: level.to_string(),
            });
        }
    }
    Ok(rows)
}

/// Builds the time dimension: one row per distinct timestamp instant among
/// qualifying events. An input with no qualifying events yields zero rows.
///
/// # Errors
///
/// Returns [`PipelineError::Schema`] if a timestamp cannot be decomposed.
pub fn build_time_buckets(events: &[RawEventRecord]) -> Result<Vec<TimeBucketRow>> {
    let instants: BTreeSet<i64> = events
        .iter()
        .filter(|e| e.is_play())
        .map(|e| e.ts)
        .collect();

    instants.into_iter().map(TimeBucketRow::from_epoch_ms).collect()
}

pub(crate) fn required_field<'a>(name: &str, value: Option<&'a str>) -> Result<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PipelineError::Schema {
            message: format!("qualifying event missing required field: {name}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::PLAY_ACTION;

    fn catalog(title: &str, creator_id: &str, year: i32, duration: f64) -> RawCatalogRecord {
        RawCatalogRecord {
            item_id: format!("I-{title}"),
            creator_id: creator_id.to_string(),
            creator_name: format!("Name of {creator_id}"),
            creator_location: None,
            creator_latitude: None,
            creator_longitude: None,
            title: title.to_string(),
            duration,
            year,
            num_items: Some(1),
        }
    }

    fn play(user_id: &str, level: &str, ts: i64) -> RawEventRecord {
        RawEventRecord {
            page: PLAY_ACTION.to_string(),
            user_id: Some(user_id.to_string()),
            first_name: Some("Ada".to_string()),
            last_name: Some("L".to_string()),
            gender: Some("F".to_string()),
            level: Some(level.to_string()),
            session_id: Some(583),
            location: Some("Portland, OR".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
            title: Some("Song A".to_string()),
            creator_name: Some("Artist X".to_string()),
            duration: Some(200.5),
            ts,
        }
    }

    #[test]
    fn identical_item_tuples_collapse_to_one_row() {
        let records = vec![
            catalog("Song A", "C1", 2005, 200.5),
            catalog("Song A", "C1", 2005, 200.5),
            catalog("Song B", "C1", 2005, 200.5),
        ];
        let items = build_items(&records);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn item_surrogate_keys_are_unique() {
        let records = vec![
            catalog("A", "C1", 2001, 1.0),
            catalog("B", "C1", 2002, 2.0),
            catalog("C", "C2", 2003, 3.0),
        ];
        let items = build_items(&records);
        let keys: HashSet<i64> = items.iter().map(|i| i.item_key).collect();
        assert_eq!(keys.len(), items.len());
    }

    #[test]
    fn duration_distinguishes_items() {
        let records = vec![catalog("A", "C1", 2001, 1.0), catalog("A", "C1", 2001, 1.5)];
        assert_eq!(build_items(&records).len(), 2);
    }

    #[test]
    fn creator_conflicting_attributes_yield_two_rows() {
        let mut a = catalog("A", "C1", 2001, 1.0);
        a.creator_location = Some("Oakland, CA".to_string());
        let mut b = catalog("B", "C1", 2002, 2.0);
        b.creator_location = Some("Berlin".to_string());

        let creators = build_creators(&[a, b]);
        assert_eq!(creators.len(), 2);
        assert!(creators.iter().all(|c| c.creator_id == "C1"));
    }

    #[test]
    fn actor_level_change_yields_one_row_per_level() {
        let events = vec![play("U1", "free", 1), play("U1", "paid", 2), play("U1", "paid", 3)];
        let actors = build_actors(&events).expect("build");
        assert_eq!(actors.len(), 2);
        assert!(actors.iter().all(|a| a.actor_id == "U1"));
    }

    #[test]
    fn non_play_events_do_not_reach_actors() {
        let mut auth = play("U1", "free", 1);
        auth.page = "Login".to_string();
        let actors = build_actors(&[auth]).expect("build");
        assert!(actors.is_empty());
    }

    #[test]
    fn qualifying_event_without_actor_id_is_schema_error() {
        let mut event = play("U1", "free", 1);
        event.user_id = None;
        let err = build_actors(&[event]).unwrap_err();
        assert!(matches!(err, PipelineError::Schema { .. }));
    }

    #[test]
    fn time_buckets_one_row_per_distinct_instant() {
        let events = vec![play("U1", "free", 10), play("U2", "free", 10), play("U1", "free", 20)];
        let buckets = build_time_buckets(&events).expect("build");
        assert_eq!(buckets.len(), 2);
    }

    #[test]
    fn no_qualifying_events_means_zero_buckets() {
        let mut event = play("U1", "free", 10);
        event.page = "Home".to_string();
        let buckets = build_time_buckets(&[event]).expect("build");
        assert!(buckets.is_empty());
    }
}
