//! Quality gate semantics: fail-fast ordering and the split between
//! determinate check failures and infrastructure errors.

use std::sync::Arc;

use cadenza_core::MemoryBackend;
use cadenza_pipeline::encode;
use cadenza_pipeline::model::{
    ActorRow, CreatorRow, InteractionEventRow, ItemRow, TimeBucketRow, ACTORS, CREATORS,
    INTERACTION_EVENTS, ITEMS, TIME_BUCKETS,
};
use cadenza_pipeline::writer::{TableReader, TableWriter};
use cadenza_pipeline::{CheckValue, PipelineError, QualityCheck, QualityGate};

/// Commits all five tables, creators holding one row and everything else
/// empty. The gate requires every table to be committed before it runs.
async fn committed_reader() -> TableReader {
    let storage = Arc::new(MemoryBackend::new());
    let writer = TableWriter::new(storage.clone(), "warehouse");

    let creators = vec![CreatorRow {
        creator_id: "C1".to_string(),
        name: "Artist X".to_string(),
        location: None,
        latitude: None,
        longitude: None,
    }];
    writer
        .overwrite(&CREATORS, &creators, |r| encode::write_creators(r))
        .await
        .expect("creators");
    writer
        .overwrite(&ITEMS, &[], |r: &[ItemRow]| encode::write_items(r))
        .await
        .expect("items");
    writer
        .overwrite(&ACTORS, &[], |r: &[ActorRow]| encode::write_actors(r))
        .await
        .expect("actors");
    writer
        .overwrite(&TIME_BUCKETS, &[], |r: &[TimeBucketRow]| {
            encode::write_time_buckets(r)
        })
        .await
        .expect("time_buckets");
    writer
        .overwrite(&INTERACTION_EVENTS, &[], |r: &[InteractionEventRow]| {
            encode::write_interaction_events(r)
        })
        .await
        .expect("interaction_events");

    TableReader::new(storage, "warehouse")
}

#[tokio::test]
async fn passing_checks_run_to_completion() {
    let reader = committed_reader().await;
    let gate = QualityGate::new(vec![
        QualityCheck::new("SELECT count(*) FROM creators", CheckValue::Int(1)).expect("check"),
        QualityCheck::new("SELECT count(*) FROM interaction_events", CheckValue::Int(0))
            .expect("check"),
    ]);
    gate.run(&reader).await.expect("gate");
}

#[tokio::test]
async fn first_mismatch_short_circuits() {
    let reader = committed_reader().await;
    let failing = "SELECT count(*) FROM creators";
    let gate = QualityGate::new(vec![
        QualityCheck::new(failing, CheckValue::Int(999)).expect("check"),
        // Would error if evaluated; must never run.
        QualityCheck::new("SELECT no_such_column FROM creators", CheckValue::Int(0))
            .expect("check"),
    ]);

    let err = gate.run(&reader).await.unwrap_err();
    let PipelineError::ExpectationMismatch { query, expected, observed } = err else {
        panic!("expected a mismatch, got {err}");
    };
    assert_eq!(query, failing);
    assert_eq!(expected, CheckValue::Int(999));
    assert_eq!(observed, CheckValue::Int(1));
}

#[tokio::test]
async fn unexecutable_query_is_an_infrastructure_error() {
    let reader = committed_reader().await;
    let gate = QualityGate::new(vec![QualityCheck::new(
        "SELECT count(*) FROM no_such_table",
        CheckValue::Int(0),
    )
    .expect("check")]);

    let err = gate.run(&reader).await.unwrap_err();
    assert!(matches!(err, PipelineError::Query { .. }));
}

#[tokio::test]
async fn gate_over_uncommitted_tables_is_a_storage_error() {
    let storage = Arc::new(MemoryBackend::new());
    let reader = TableReader::new(storage, "warehouse");
    let gate = QualityGate::new(vec![QualityCheck::new(
        "SELECT count(*) FROM creators",
        CheckValue::Int(0),
    )
    .expect("check")]);

    let err = gate.run(&reader).await.unwrap_err();
    assert!(matches!(err, PipelineError::Storage { .. }));
}

#[tokio::test]
async fn empty_tables_still_answer_queries() {
    let reader = committed_reader().await;
    let gate = QualityGate::new(vec![QualityCheck::new(
        "SELECT count(*) FROM time_buckets WHERE start_ts IS NULL",
        CheckValue::Int(0),
    )
    .expect("check")]);
    gate.run(&reader).await.expect("gate");
}

#[tokio::test]
async fn scalar_query_with_no_rows_observes_null() {
    let reader = committed_reader().await;
    let gate = QualityGate::new(vec![QualityCheck::new(
        "SELECT creator_id FROM creators WHERE creator_id = 'absent'",
        CheckValue::Null,
    )
    .expect("check")]);
    gate.run(&reader).await.expect("gate");
}
