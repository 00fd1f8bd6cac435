//! Fact builder: qualifying-event filtering, single-point timestamp
//! decomposition, and exact-equality dimension resolution.
//!
//! Dimension matching joins the event's (title, creator name, duration)
//! against items joined with creators on exactly those attributes — no
//! fuzzy matching, no duration tolerance. A non-match yields null foreign
//! keys on the emitted row; fact rows are never dropped for an unresolved
//! match, so the output cardinality always equals the filtered event count.

use std::collections::HashMap;

use crate::dimensions::required_field;
use crate::error::{PipelineError, Result};
use crate::model::{CreatorRow, InteractionEventRow, ItemRow, TimeBucketRow};
use crate::raw::RawEventRecord;

/// Lookup from (title, creator name, duration bits) to resolved keys.
type DimensionIndex = HashMap<(String, String, u64), (i64, String)>;

/// Builds the interaction fact table from raw events and the materialized
/// item/creator dimensions.
///
/// The timestamp is decomposed exactly once per event; the carried
/// year/month come from that same decomposition, never recomputed.
///
/// # Errors
///
/// Returns [`PipelineError::Schema`] if a qualifying event is missing its
/// actor identifier, level, or session identifier, or carries an
/// undecomposable timestamp.
pub fn build_interaction_events(
    events: &[RawEventRecord],
    items: &[ItemRow],
    creators: &[CreatorRow],
) -> Result<Vec<InteractionEventRow>> {
    let index = build_dimension_index(items, creators);
    let mut rows = Vec::new();

    for event in events.iter().filter(|e| e.is_play()) {
        let actor_id = required_field("user_id", event.user_id.as_deref())?;
        let level = required_field("level", event.level.as_deref())?;
        let session_id = event.session_id.ok_or_else(|| PipelineError::Schema {
            message: "qualifying event missing required field: session_id".to_string(),
        })?;

        let bucket = TimeBucketRow::from_epoch_ms(event.ts)?;

        let resolved = match (&event.title, &event.creator_name, event.duration) {
            (Some(title), Some(creator_name), Some(duration)) => index
                .get(&(title.clone(), creator_name.clone(), duration.to_bits()))
                .cloned(),
            _ => None,
        };
        let (item_key, creator_id) = match resolved {
            Some((item_key, creator_id)) => (Some(item_key), Some(creator_id)),
            None => (None, None),
        };

        rows.push(InteractionEventRow {
            start_ts: bucket.start_ts,
            actor_id: actor_id.to_string(),
            level: level.to_string(),
            item_key,
            creator_id,
            session_id,
            location: event.location.clone(),
            user_agent: event.user_agent.clone(),
            year: bucket.year,
            month: bucket.month,
        });
    }
    Ok(rows)
}

/// Joins items with creators on the creator identifier and indexes the
/// result by (title, creator name, duration). When duplicate creator rows
/// share a name, the first mapping wins — equality is exact either way.
fn build_dimension_index(items: &[ItemRow], creators: &[CreatorRow]) -> DimensionIndex {
    let mut names_by_creator: HashMap<&str, Vec<&str>> = HashMap::new();
    for creator in creators {
        names_by_creator
            .entry(creator.creator_id.as_str())
            .or_default()
            .push(creator.name.as_str());
    }

    let mut index = DimensionIndex::new();
    for item in items {
        let Some(names) = names_by_creator.get(item.creator_id.as_str()) else {
            continue;
        };
        for name in names {
            index
                .entry((
                    item.title.clone(),
                    (*name).to_string(),
                    item.duration.to_bits(),
                ))
                .or_insert((item.item_key, item.creator_id.clone()));
        }
    }
    index
}
