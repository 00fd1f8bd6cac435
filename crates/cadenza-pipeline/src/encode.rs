//! Parquet encoding/decoding for the star-schema tables.
//!
//! This module defines the canonical arrow schemas for the five sink
//! tables and the encode/decode pairs the writer and quality gate use.
//! The schemas here are the contract for downstream readers; keep changes
//! backwards-compatible.

use std::io::Cursor;
use std::sync::Arc;

use arrow::array::{
    Array as _, Float64Array, Int32Array, Int64Array, StringArray, TimestampMillisecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;

use crate::error::{PipelineError, Result};
use crate::model::{ActorRow, CreatorRow, InteractionEventRow, ItemRow, TimeBucketRow};

const UTC: &str = "UTC";

fn ts_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::Timestamp(TimeUnit::Millisecond, Some(UTC.into())),
        false,
    )
}

fn creators_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("creator_id", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("location", DataType::Utf8, true),
        Field::new("latitude", DataType::Float64, true),
        Field::new("longitude", DataType::Float64, true),
    ]))
}

fn items_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("item_key", DataType::Int64, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("creator_id", DataType::Utf8, false),
        Field::new("year", DataType::Int32, false),
        Field::new("duration", DataType::Float64, false),
    ]))
}

fn actors_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("actor_id", DataType::Utf8, false),
        Field::new("first_name", DataType::Utf8, true),
        Field::new("last_name", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, false),
    ]))
}

fn time_buckets_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        ts_field("start_ts"),
        Field::new("hour", DataType::Int32, false),
        Field::new("day", DataType::Int32, false),
        Field::new("week", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
        Field::new("year", DataType::Int32, false),
        Field::new("weekday", DataType::Int32, false),
    ]))
}

fn interaction_events_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        ts_field("start_ts"),
        Field::new("actor_id", DataType::Utf8, false),
        Field::new("level", DataType::Utf8, false),
        Field::new("item_key", DataType::Int64, true),
        Field::new("creator_id", DataType::Utf8, true),
        Field::new("session_id", DataType::Int64, false),
        Field::new("location", DataType::Utf8, true),
        Field::new("user_agent", DataType::Utf8, true),
        Field::new("year", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
    ]))
}

/// Returns the arrow schema for a logical table name, if known.
#[must_use]
pub fn table_schema(name: &str) -> Option<Arc<Schema>> {
    match name {
        "creators" => Some(creators_schema()),
        "items" => Some(items_schema()),
        "actors" => Some(actors_schema()),
        "time_buckets" => Some(time_buckets_schema()),
        "interaction_events" => Some(interaction_events_schema()),
        _ => None,
    }
}

fn writer_properties() -> WriterProperties {
    let created_by = KeyValue {
        key: "created_by".to_string(),
        value: Some("cadenza-pipeline".to_string()),
    };
    WriterProperties::builder()
        .set_key_value_metadata(Some(vec![created_by]))
        .build()
}

fn write_single_batch(schema: Arc<Schema>, batch: &RecordBatch) -> Result<Bytes> {
    let mut cursor = Cursor::new(Vec::<u8>::new());
    let props = writer_properties();
    let mut writer =
        ArrowWriter::try_new(&mut cursor, schema, Some(props)).map_err(|e| {
            PipelineError::Encoding {
                message: format!("parquet writer init failed: {e}"),
            }
        })?;
    writer.write(batch).map_err(|e| PipelineError::Encoding {
        message: format!("parquet write failed: {e}"),
    })?;
    writer.close().map_err(|e| PipelineError::Encoding {
        message: format!("parquet close failed: {e}"),
    })?;
    Ok(Bytes::from(cursor.into_inner()))
}

fn batch_error(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Encoding {
        message: format!("record batch build failed: {e}"),
    }
}

fn ts_array(values: Vec<i64>) -> TimestampMillisecondArray {
    TimestampMillisecondArray::from(values).with_timezone(UTC)
}

/// Encodes creators rows to a parquet payload.
///
/// # Errors
///
/// Returns an error if the record batch cannot be built or the parquet
/// write fails.
pub fn write_creators(rows: &[CreatorRow]) -> Result<Bytes> {
    let schema = creators_schema();

    let creator_ids = StringArray::from(
        rows.iter()
            .map(|r| Some(r.creator_id.as_str()))
            .collect::<Vec<_>>(),
    );
    let names = StringArray::from(rows.iter().map(|r| Some(r.name.as_str())).collect::<Vec<_>>());
    let locations =
        StringArray::from(rows.iter().map(|r| r.location.as_deref()).collect::<Vec<_>>());
    let latitudes = Float64Array::from(rows.iter().map(|r| r.latitude).collect::<Vec<_>>());
    let longitudes = Float64Array::from(rows.iter().map(|r| r.longitude).collect::<Vec<_>>());

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(creator_ids),
            Arc::new(names),
            Arc::new(locations),
            Arc::new(latitudes),
            Arc::new(longitudes),
        ],
    )
    .map_err(batch_error)?;

    write_single_batch(schema, &batch)
}

/// Encodes items rows to a parquet payload.
///
/// # Errors
///
/// Returns an error if the record batch cannot be built or the parquet
/// write fails.
pub fn write_items(rows: &[ItemRow]) -> Result<Bytes> {
    let schema = items_schema();

    let item_keys = Int64Array::from(rows.iter().map(|r| r.item_key).collect::<Vec<_>>());
    let titles = StringArray::from(rows.iter().map(|r| Some(r.title.as_str())).collect::<Vec<_>>());
    let creator_ids = StringArray::from(
        rows.iter()
            .map(|r| Some(r.creator_id.as_str()))
            .collect::<Vec<_>>(),
    );
    let years = Int32Array::from(rows.iter().map(|r| r.year).collect::<Vec<_>>());
    let durations = Float64Array::from(rows.iter().map(|r| r.duration).collect::<Vec<_>>());

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(item_keys),
            Arc::new(titles),
            Arc::new(creator_ids),
            Arc::new(years),
            Arc::new(durations),
        ],
    )
    .map_err(batch_error)?;

    write_single_batch(schema, &batch)
}

/// Encodes actors rows to a parquet payload.
///
/// # Errors
///
/// Returns an error if the record batch cannot be built or the parquet
/// write fails.
pub fn write_actors(rows: &[ActorRow]) -> Result<Bytes> {
    let schema = actors_schema();

    let actor_ids = StringArray::from(
        rows.iter()
            .map(|r| Some(r.actor_id.as_str()))
            .collect::<Vec<_>>(),
    );
    let first_names =
        StringArray::from(rows.iter().map(|r| r.first_name.as_deref()).collect::<Vec<_>>());
    let last_names =
        StringArray::from(rows.iter().map(|r| r.last_name.as_deref()).collect::<Vec<_>>());
    let genders = StringArray::from(rows.iter().map(|r| r.gender.as_deref()).collect::<Vec<_>>());
    let levels = StringArray::from(rows.iter().map(|r| Some(r.level.as_str())).collect::<Vec<_>>());

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(actor_ids),
            Arc::new(first_names),
            Arc::new(last_names),
            Arc::new(genders),
            Arc::new(levels),
        ],
    )
    .map_err(batch_error)?;

    write_single_batch(schema, &batch)
}

/// Encodes time dimension rows to a parquet payload.
///
/// # Errors
///
/// Returns an error if the record batch cannot be built or the parquet
/// write fails.
pub fn write_time_buckets(rows: &[TimeBucketRow]) -> Result<Bytes> {
    let schema = time_buckets_schema();

    let start_ts = ts_array(rows.iter().map(|r| r.start_ts).collect::<Vec<_>>());
    let hours = Int32Array::from(rows.iter().map(|r| r.hour).collect::<Vec<_>>());
    let days = Int32Array::from(rows.iter().map(|r| r.day).collect::<Vec<_>>());
    let weeks = Int32Array::from(rows.iter().map(|r| r.week).collect::<Vec<_>>());
    let months = Int32Array::from(rows.iter().map(|r| r.month).collect::<Vec<_>>());
    let years = Int32Array::from(rows.iter().map(|r| r.year).collect::<Vec<_>>());
    let weekdays = Int32Array::from(rows.iter().map(|r| r.weekday).collect::<Vec<_>>());

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(start_ts),
            Arc::new(hours),
            Arc::new(days),
            Arc::new(weeks),
            Arc::new(months),
            Arc::new(years),
            Arc::new(weekdays),
        ],
    )
    .map_err(batch_error)?;

    write_single_batch(schema, &batch)
}

/// Encodes interaction fact rows to a parquet payload.
///
/// # Errors
///
/// Returns an error if the record batch cannot be built or the parquet
/// write fails.
pub fn write_interaction_events(rows: &[InteractionEventRow]) -> Result<Bytes> {
    let schema = interaction_events_schema();

    let start_ts = ts_array(rows.iter().map(|r| r.start_ts).collect::<Vec<_>>());
    let actor_ids = StringArray::from(
        rows.iter()
            .map(|r| Some(r.actor_id.as_str()))
            .collect::<Vec<_>>(),
    );
    let levels = StringArray::from(rows.iter().map(|r| Some(r.level.as_str())).collect::<Vec<_>>());
    let item_keys = Int64Array::from(rows.iter().map(|r| r.item_key).collect::<Vec<_>>());
    let creator_ids =
        StringArray::from(rows.iter().map(|r| r.creator_id.as_deref()).collect::<Vec<_>>());
    let session_ids = Int64Array::from(rows.iter().map(|r| r.session_id).collect::<Vec<_>>());
    let locations =
        StringArray::from(rows.iter().map(|r| r.location.as_deref()).collect::<Vec<_>>());
    let user_agents =
        StringArray::from(rows.iter().map(|r| r.user_agent.as_deref()).collect::<Vec<_>>());
    let years = Int32Array::from(rows.iter().map(|r| r.year).collect::<Vec<_>>());
    let months = Int32Array::from(rows.iter().map(|r| r.month).collect::<Vec<_>>());

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(start_ts),
            Arc::new(actor_ids),
            Arc::new(levels),
            Arc::new(item_keys),
            Arc::new(creator_ids),
            Arc::new(session_ids),
            Arc::new(locations),
            Arc::new(user_agents),
            Arc::new(years),
            Arc::new(months),
        ],
    )
    .map_err(batch_error)?;

    write_single_batch(schema, &batch)
}

/// Decodes a parquet payload into record batches.
///
/// # Errors
///
/// Returns an error if the payload is not valid parquet.
pub fn read_batches(bytes: &Bytes) -> Result<Vec<RecordBatch>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes.clone())
        .map_err(|e| PipelineError::Encoding {
            message: format!("parquet reader init failed: {e}"),
        })?
        .build()
        .map_err(|e| PipelineError::Encoding {
            message: format!("parquet reader build failed: {e}"),
        })?;

    let mut batches = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| PipelineError::Encoding {
            message: format!("parquet read batch failed: {e}"),
        })?;
        batches.push(batch);
    }
    Ok(batches)
}

fn col_index(batch: &RecordBatch, name: &str) -> Result<usize> {
    batch
        .schema()
        .index_of(name)
        .map_err(|e| PipelineError::Encoding {
            message: format!("missing column '{name}': {e}"),
        })
}

fn col_string<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    let idx = col_index(batch, name)?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| PipelineError::Encoding {
            message: format!("column '{name}' is not StringArray"),
        })
}

fn col_i64<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    let idx = col_index(batch, name)?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| PipelineError::Encoding {
            message: format!("column '{name}' is not Int64Array"),
        })
}

fn col_i32<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array> {
    let idx = col_index(batch, name)?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<Int32Array>()
        .ok_or_else(|| PipelineError::Encoding {
            message: format!("column '{name}' is not Int32Array"),
        })
}

fn col_f64<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float64Array> {
    let idx = col_index(batch, name)?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| PipelineError::Encoding {
            message: format!("column '{name}' is not Float64Array"),
        })
}

fn col_ts<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a TimestampMillisecondArray> {
    let idx = col_index(batch, name)?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<TimestampMillisecondArray>()
        .ok_or_else(|| PipelineError::Encoding {
            message: format!("column '{name}' is not TimestampMillisecondArray"),
        })
}

fn opt_string(col: &StringArray, row: usize) -> Option<String> {
    if col.is_null(row) {
        None
    } else {
        Some(col.value(row).to_string())
    }
}

fn opt_f64(col: &Float64Array, row: usize) -> Option<f64> {
    if col.is_null(row) {
        None
    } else {
        Some(col.value(row))
    }
}

fn opt_i64(col: &Int64Array, row: usize) -> Option<i64> {
    if col.is_null(row) {
        None
    } else {
        Some(col.value(row))
    }
}

/// Decodes a creators parquet payload.
///
/// # Errors
///
/// Returns an error if the payload is invalid or required columns are
/// missing.
pub fn read_creators(bytes: &Bytes) -> Result<Vec<CreatorRow>> {
    let mut out = Vec::new();
    for batch in read_batches(bytes)? {
        let creator_id = col_string(&batch, "creator_id")?;
        let name = col_string(&batch, "name")?;
        let location = col_string(&batch, "location")?;
        let latitude = col_f64(&batch, "latitude")?;
        let longitude = col_f64(&batch, "longitude")?;

        for row in 0..batch.num_rows() {
            out.push(CreatorRow {
                creator_id: creator_id.value(row).to_string(),
                name: name.value(row).to_string(),
                location: opt_string(location, row),
                latitude: opt_f64(latitude, row),
                longitude: opt_f64(longitude, row),
            });
        }
    }
    Ok(out)
}

/// Decodes an items parquet payload.
///
/// # Errors
///
/// Returns an error if the payload is invalid or required columns are
/// missing.
pub fn read_items(bytes: &Bytes) -> Result<Vec<ItemRow>> {
    let mut out = Vec::new();
    for batch in read_batches(bytes)? {
        let item_key = col_i64(&batch, "item_key")?;
        let title = col_string(&batch, "title")?;
        let creator_id = col_string(&batch, "creator_id")?;
        let year = col_i32(&batch, "year")?;
        let duration = col_f64(&batch, "duration")?;

        for row in 0..batch.num_rows() {
            out.push(ItemRow {
                item_key: item_key.value(row),
                title: title.value(row).to_string(),
                creator_id: creator_id.value(row).to_string(),
                year: year.value(row),
                duration: duration.value(row),
            });
        }
    }
    Ok(out)
}

/// Decodes an actors parquet payload.
///
/// # Errors
///
/// Returns an error if the payload is invalid or required columns are
/// missing.
pub fn read_actors(bytes: &Bytes) -> Result<Vec<ActorRow>> {
    let mut out = Vec::new();
    for batch in read_batches(bytes)? {
        let actor_id = col_string(&batch, "actor_id")?;
        let first_name = col_string(&batch, "first_name")?;
        let last_name = col_string(&batch, "last_name")?;
        let gender = col_string(&batch, "gender")?;
        let level = col_string(&batch, "level")?;

        for row in 0..batch.num_rows() {
            out.push(ActorRow {
                actor_id: actor_id.value(row).to_string(),
                first_name: opt_string(first_name, row),
                last_name: opt_string(last_name, row),
                gender: opt_string(gender, row),
                level: level.value(row).to_string(),
            });
        }
    }
    Ok(out)
}

/// Decodes a time dimension parquet payload.
///
/// # Errors
///
/// Returns an error if the payload is invalid or required columns are
/// missing.
pub fn read_time_buckets(bytes: &Bytes) -> Result<Vec<TimeBucketRow>> {
    let mut out = Vec::new();
    for batch in read_batches(bytes)? {
        let start_ts = col_ts(&batch, "start_ts")?;
        let hour = col_i32(&batch, "hour")?;
        let day = col_i32(&batch, "day")?;
        let week = col_i32(&batch, "week")?;
        let month = col_i32(&batch, "month")?;
        let year = col_i32(&batch, "year")?;
        let weekday = col_i32(&batch, "weekday")?;

        for row in 0..batch.num_rows() {
            out.push(TimeBucketRow {
                start_ts: start_ts.value(row),
                hour: hour.value(row),
                day: day.value(row),
                week: week.value(row),
                month: month.value(row),
                year: year.value(row),
                weekday: weekday.value(row),
            });
        }
    }
    Ok(out)
}

/// Decodes an interaction fact parquet payload.
///
/// # Errors
///
/// Returns an error if the payload is invalid or required columns are
/// missing.
pub fn read_interaction_events(bytes: &Bytes) -> Result<Vec<InteractionEventRow>> {
    let mut out = Vec::new();
    for batch in read_batches(bytes)? {
        let start_ts = col_ts(&batch, "start_ts")?;
        let actor_id = col_string(&batch, "actor_id")?;
        let level = col_string(&batch, "level")?;
        let item_key = col_i64(&batch, "item_key")?;
        let creator_id = col_string(&batch, "creator_id")?;
        let session_id = col_i64(&batch, "session_id")?;
        let location = col_string(&batch, "location")?;
        let user_agent = col_string(&batch, "user_agent")?;
        let year = col_i32(&batch, "year")?;
        let month = col_i32(&batch, "month")?;

        for row in 0..batch.num_rows() {
            out.push(InteractionEventRow {
                start_ts: start_ts.value(row),
                actor_id: actor_id.value(row).to_string(),
                level: level.value(row).to_string(),
                item_key: opt_i64(item_key, row),
                creator_id: opt_string(creator_id, row),
                session_id: session_id.value(row),
                location: opt_string(location, row),
                user_agent: opt_string(user_agent, row),
                year: year.value(row),
                month: month.value(row),
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creators_roundtrip_preserves_nulls() {
        let rows = vec![
            CreatorRow {
                creator_id: "C1".into(),
                name: "Artist X".into(),
                location: Some("Oakland, CA".into()),
                latitude: Some(37.8),
                longitude: Some(-122.27),
            },
            CreatorRow {
                creator_id: "C2".into(),
                name: "Artist Y".into(),
                location: None,
                latitude: None,
                longitude: None,
            },
        ];
        let bytes = write_creators(&rows).expect("write");
        let back = read_creators(&bytes).expect("read");
        assert_eq!(back, rows);
    }

    #[test]
    fn interaction_events_roundtrip_preserves_null_keys() {
        let rows = vec![InteractionEventRow {
            start_ts: 1_541_121_934_796,
            actor_id: "U1".into(),
            level: "free".into(),
            item_key: None,
            creator_id: None,
            session_id: 583,
            location: None,
            user_agent: Some("Mozilla/5.0".into()),
            year: 2018,
            month: 11,
        }];
        let bytes = write_interaction_events(&rows).expect("write");
        let back = read_interaction_events(&bytes).expect("read");
        assert_eq!(back, rows);
        assert_eq!(back[0].item_key, None);
    }

    #[test]
    fn empty_table_roundtrips() {
        let bytes = write_time_buckets(&[]).expect("write");
        let back = read_time_buckets(&bytes).expect("read");
        assert!(back.is_empty());
    }

    #[test]
    fn table_schema_knows_all_tables() {
        for table in crate::model::ALL_TABLES {
            assert!(table_schema(table.name).is_some(), "{}", table.name);
        }
        assert!(table_schema("nope").is_none());
    }
}
