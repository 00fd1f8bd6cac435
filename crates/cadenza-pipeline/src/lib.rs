//! # cadenza-pipeline
//!
//! Transformation-and-load pipeline turning two raw record streams — per-item
//! catalog metadata and per-event interaction logs — into a partitioned
//! star-schema dataset, validated by a post-load quality gate.
//!
//! The pipeline is organized as a chain of batch steps:
//!
//! 1. **Raw schema adapter** ([`raw`]) — pure parse/validate of raw payloads
//! 2. **Dimension builder** ([`dimensions`]) — items, creators, actors and
//!    time buckets via projection, set dedup and surrogate keys
//! 3. **Fact builder** ([`facts`]) — interaction events with exact-equality
//!    dimension resolution and null-tolerant foreign keys
//! 4. **Partitioned writer** ([`writer`]) — staged-run parquet writes
//!    committed by a single manifest swap, so reruns fully overwrite
//! 5. **Quality gate** ([`quality`]) — ordered, fail-fast scalar SQL checks
//!    evaluated read-only against the written tables
//!
//! Each step is exposed through [`steps::Pipeline`] as an idempotent,
//! independently re-runnable unit; scheduling, retries and concurrency
//! control belong to an external orchestrator.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod dimensions;
pub mod encode;
pub mod error;
pub mod facts;
pub mod model;
pub mod quality;
pub mod raw;
pub mod steps;
pub mod writer;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use quality::{default_checks, CheckValue, QualityCheck, QualityGate};
pub use raw::{RawCatalogRecord, RawEventRecord, PLAY_ACTION};
pub use steps::{DimensionCounts, Pipeline};
pub use writer::{TableReader, TableWriter};
