//! # cadenza-core
//!
//! Shared primitives for the cadenza transformation-and-load pipeline.
//!
//! This crate provides the foundational types used by the pipeline crates:
//!
//! - **Error Types**: Shared error definitions and result aliases
//! - **Storage Backends**: Abstract object-storage interface with in-memory
//!   and local-filesystem implementations
//! - **Partition Keys**: Hive-style partition path encoding
//! - **Observability**: Structured logging initialization and span helpers
//!
//! Higher layers (`cadenza-pipeline`, `cadenza-cli`) depend only on the
//! contracts defined here; nothing in this crate knows about the star
//! schema itself.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod local_fs;
pub mod observability;
pub mod partition;
pub mod storage;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::local_fs::LocalFsBackend;
    pub use crate::partition::{PartitionKey, PartitionValue};
    pub use crate::storage::{
        MemoryBackend, ObjectMeta, StorageBackend, WritePrecondition, WriteResult,
    };
}

pub use error::{Error, Result};
pub use local_fs::LocalFsBackend;
pub use observability::{init_logging, step_span, LogFormat};
pub use partition::{PartitionKey, PartitionValue};
pub use storage::{MemoryBackend, ObjectMeta, StorageBackend, WritePrecondition, WriteResult};
