//! Star-schema row types and table definitions.
//!
//! Five logical tables: four dimensions (creators, items, actors,
//! time_buckets) and one fact (interaction_events). Each row type knows its
//! own partition key; partition column order follows the table definition.
//!
//! Timestamp decomposition lives here, in one place, so the time dimension
//! and the fact table's carried year/month can never skew: both are derived
//! from the same [`TimeBucketRow`].
//!
//! Weekday convention: **0 = Monday … 6 = Sunday**.

use cadenza_core::{PartitionKey, PartitionValue};
use chrono::{DateTime, Datelike, Timelike};

use crate::error::{PipelineError, Result};

/// A logical table: sink name plus declared partition columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDef {
    /// Logical table name (also the sink path segment).
    pub name: &'static str,
    /// Partition columns in declared order; empty for unpartitioned tables.
    pub partition_by: &'static [&'static str],
}

/// The creators dimension (unpartitioned).
pub const CREATORS: TableDef = TableDef {
    name: "creators",
    partition_by: &[],
};

/// The items dimension, partitioned by year and creator.
pub const ITEMS: TableDef = TableDef {
    name: "items",
    partition_by: &["year", "creator_id"],
};

/// The actors dimension (unpartitioned).
pub const ACTORS: TableDef = TableDef {
    name: "actors",
    partition_by: &[],
};

/// The time dimension, partitioned by year and month.
pub const TIME_BUCKETS: TableDef = TableDef {
    name: "time_buckets",
    partition_by: &["year", "month"],
};

/// The interaction fact table, partitioned by year and month.
pub const INTERACTION_EVENTS: TableDef = TableDef {
    name: "interaction_events",
    partition_by: &["year", "month"],
};

/// All star-schema tables, dimensions first.
pub const ALL_TABLES: [TableDef; 5] = [CREATORS, ITEMS, ACTORS, TIME_BUCKETS, INTERACTION_EVENTS];

/// A row that can name the partition it belongs to.
pub trait PartitionedRow {
    /// Returns the partition key for this row, in the table's declared
    /// partition column order. Empty for unpartitioned tables.
    fn partition_key(&self) -> PartitionKey;
}

/// One creators dimension row. Deduplicated on the full tuple; a creator
/// identifier with conflicting attributes yields multiple rows (no
/// "latest wins" reconciliation).
#[derive(Debug, Clone, PartialEq)]
pub struct CreatorRow {
    /// Creator natural key.
    pub creator_id: String,
    /// Creator display name.
    pub name: String,
    /// Location, if known.
    pub location: Option<String>,
    /// Latitude, if known.
    pub latitude: Option<f64>,
    /// Longitude, if known.
    pub longitude: Option<f64>,
}

impl PartitionedRow for CreatorRow {
    fn partition_key(&self) -> PartitionKey {
        PartitionKey::new()
    }
}

/// One items dimension row. The surrogate `item_key` is unique within a
/// single pipeline run only; reruns may assign different keys, which is why
/// all writes are full overwrites.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    /// Surrogate key, unique within one run.
    pub item_key: i64,
    /// Item title.
    pub title: String,
    /// Creator natural key (foreign key to creators).
    pub creator_id: String,
    /// Release year; `0` means unknown.
    pub year: i32,
    /// Duration in seconds.
    pub duration: f64,
}

impl PartitionedRow for ItemRow {
    fn partition_key(&self) -> PartitionKey {
        let mut pk = PartitionKey::new();
        pk.push("year", PartitionValue::Int64(i64::from(self.year)));
        pk.push(
            "creator_id",
            PartitionValue::String(self.creator_id.clone()),
        );
        pk
    }
}

/// One actors dimension row.
///
/// Deduplicated on the full tuple including `level`: an actor whose
/// subscription level changes mid-dataset appears once per level. This is
/// deliberate — the level is a dimension attribute value at dedup time, not
/// a slowly-changing dimension with validity intervals.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorRow {
    /// Actor natural key.
    pub actor_id: String,
    /// First name, if present.
    pub first_name: Option<String>,
    /// Last name, if present.
    pub last_name: Option<String>,
    /// Gender, if present.
    pub gender: Option<String>,
    /// Subscription level at dedup time.
    pub level: String,
}

impl PartitionedRow for ActorRow {
    fn partition_key(&self) -> PartitionKey {
        PartitionKey::new()
    }
}

/// One time dimension row: a distinct event instant and its calendar
/// decomposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBucketRow {
    /// The instant, epoch milliseconds UTC.
    pub start_ts: i64,
    /// Hour of day (0-23).
    pub hour: i32,
    /// Day of month (1-31).
    pub day: i32,
    /// ISO week number (1-53).
    pub week: i32,
    /// Month (1-12).
    pub month: i32,
    /// Year.
    pub year: i32,
    /// Weekday ordinal, 0 = Monday … 6 = Sunday.
    pub weekday: i32,
}

impl TimeBucketRow {
    /// Decomposes an epoch-millisecond timestamp into its calendar fields.
    ///
    /// This is the single decomposition point for both the time dimension
    /// and the fact table's carried year/month.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Schema`] if the timestamp is outside the
    /// representable datetime range.
    pub fn from_epoch_ms(ts: i64) -> Result<Self> {
        let instant = DateTime::from_timestamp_millis(ts).ok_or_else(|| PipelineError::Schema {
            message: format!("timestamp out of range: {ts}"),
        })?;

        #[allow(clippy::cast_possible_wrap)]
        Ok(Self {
            start_ts: ts,
            hour: instant.hour() as i32,
            day: instant.day() as i32,
            week: instant.iso_week().week() as i32,
            month: instant.month() as i32,
            year: instant.year(),
            weekday: instant.weekday().num_days_from_monday() as i32,
        })
    }
}

impl PartitionedRow for TimeBucketRow {
    fn partition_key(&self) -> PartitionKey {
        let mut pk = PartitionKey::new();
        pk.push("year", PartitionValue::Int64(i64::from(self.year)));
        pk.push("month", PartitionValue::Int64(i64::from(self.month)));
        pk
    }
}

/// One interaction fact row.
///
/// `item_key` and `creator_id` are nullable: null means no dimension row
/// matched, which is expected, not an error. `start_ts` always references a
/// time_buckets row. Year and month are carried for partitioning, derived
/// from the same decomposition as the time dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionEventRow {
    /// Event instant, epoch milliseconds UTC (foreign key to time_buckets).
    pub start_ts: i64,
    /// Actor natural key (foreign key to actors).
    pub actor_id: String,
    /// Subscription level at event time.
    pub level: String,
    /// Item surrogate key, if the dimension lookup matched.
    pub item_key: Option<i64>,
    /// Creator natural key, if the dimension lookup matched.
    pub creator_id: Option<String>,
    /// Session identifier.
    pub session_id: i64,
    /// Geographic location string, if present.
    pub location: Option<String>,
    /// Client-agent string, if present.
    pub user_agent: Option<String>,
    /// Partition year.
    pub year: i32,
    /// Partition month.
    pub month: i32,
}

impl PartitionedRow for InteractionEventRow {
    fn partition_key(&self) -> PartitionKey {
        let mut pk = PartitionKey::new();
        pk.push("year", PartitionValue::Int64(i64::from(self.year)));
        pk.push("month", PartitionValue::Int64(i64::from(self.month)));
        pk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decomposes_known_instant() {
        // 2018-11-02T01:25:34.796Z, a Friday.
        let tb = TimeBucketRow::from_epoch_ms(1_541_121_934_796).expect("decompose");
        assert_eq!(tb.start_ts, 1_541_121_934_796);
        assert_eq!(tb.year, 2018);
        assert_eq!(tb.month, 11);
        assert_eq!(tb.day, 2);
        assert_eq!(tb.hour, 1);
        assert_eq!(tb.week, 44);
        assert_eq!(tb.weekday, 4); // Friday, 0 = Monday
    }

    #[test]
    fn monday_is_weekday_zero() {
        // 2018-11-05T00:00:00Z is a Monday.
        let tb = TimeBucketRow::from_epoch_ms(1_541_376_000_000).expect("decompose");
        assert_eq!(tb.weekday, 0);
    }

    #[test]
    fn out_of_range_timestamp_is_schema_error() {
        let err = TimeBucketRow::from_epoch_ms(i64::MAX).unwrap_err();
        assert!(matches!(err, PipelineError::Schema { .. }));
    }

    #[test]
    fn item_partition_key_order_is_year_then_creator() {
        let row = ItemRow {
            item_key: 1,
            title: "Song A".into(),
            creator_id: "C1".into(),
            year: 2005,
            duration: 200.5,
        };
        assert_eq!(row.partition_key().path(), "year=2005/creator_id=C1");
    }

    #[test]
    fn unpartitioned_rows_have_empty_keys() {
        let row = CreatorRow {
            creator_id: "C1".into(),
            name: "Artist X".into(),
            location: None,
            latitude: None,
            longitude: None,
        };
        assert!(row.partition_key().is_empty());
    }
}
