//! Post-load quality gate: ordered, fail-fast scalar SQL checks.
//!
//! The gate reads the committed tables back through the sink (never the
//! in-memory intermediates), registers them with an embedded query engine,
//! and evaluates each check's query to a single scalar. The first mismatch
//! short-circuits: remaining checks are skipped and the run fails with a
//! determinate [`PipelineError::ExpectationMismatch`], which callers can
//! tell apart from infrastructure failures (`Query`, `Storage`).

use std::fmt;
use std::sync::Arc;

use datafusion::common::ScalarValue;
use datafusion::datasource::MemTable;
use datafusion::prelude::SessionContext;
use tracing::info;

use crate::encode;
use crate::error::{PipelineError, Result};
use crate::model::ALL_TABLES;
use crate::writer::TableReader;

/// A scalar value a quality check expects or observes.
#[derive(Debug, Clone)]
pub enum CheckValue {
    /// A signed integer (counts, sums).
    Int(i64),
    /// A floating-point number.
    Float(f64),
    /// A string.
    Text(String),
    /// A boolean.
    Bool(bool),
    /// SQL NULL, or a query that produced no rows.
    Null,
}

impl PartialEq for CheckValue {
    fn eq(&self, other: &Self) -> bool {
        #[allow(clippy::cast_precision_loss)]
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => *a as f64 == *b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Null, Self::Null) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CheckValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "'{v}'"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Null => f.write_str("NULL"),
        }
    }
}

/// One quality check: a scalar query paired with its expected value.
///
/// Checks are validated at construction, so a gate holding a
/// `QualityCheck` can assume the query is at least well-formed enough to
/// submit.
#[derive(Debug, Clone)]
pub struct QualityCheck {
    query: String,
    expected: CheckValue,
}

impl QualityCheck {
    /// Creates a check after validating the query text.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidCheck`] if the query is empty or is
    /// not a `SELECT`/`WITH` statement. The gate is read-only; DML has no
    /// business here.
    pub fn new(query: impl Into<String>, expected: CheckValue) -> Result<Self> {
        let query = query.into();
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::InvalidCheck {
                message: "query is empty".to_string(),
            });
        }
        let head = trimmed
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        if head != "SELECT" && head != "WITH" {
            return Err(PipelineError::InvalidCheck {
                message: format!("query must be a SELECT or WITH statement, got `{head}`"),
            });
        }
        Ok(Self { query, expected })
    }

    fn known_good(query: &str, expected: CheckValue) -> Self {
        Self {
            query: query.to_string(),
            expected,
        }
    }

    /// Returns the check's query text.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Returns the check's expected value.
    #[must_use]
    pub fn expected(&self) -> &CheckValue {
        &self.expected
    }
}

/// The standard post-load checks: the fact table is non-empty, referential
/// fields are never null, and the item dimension holds no duplicate logical
/// tuples.
#[must_use]
pub fn default_checks() -> Vec<QualityCheck> {
    vec![
        QualityCheck::known_good(
            "SELECT count(*) > 0 FROM interaction_events",
            CheckValue::Bool(true),
        ),
        QualityCheck::known_good(
            "SELECT count(*) FROM interaction_events WHERE actor_id IS NULL",
            CheckValue::Int(0),
        ),
        QualityCheck::known_good(
            "SELECT count(*) FROM interaction_events WHERE start_ts IS NULL",
            CheckValue::Int(0),
        ),
        QualityCheck::known_good(
            "SELECT count(*) FROM actors WHERE actor_id IS NULL",
            CheckValue::Int(0),
        ),
        QualityCheck::known_good(
            "SELECT count(*) FROM time_buckets WHERE start_ts IS NULL",
            CheckValue::Int(0),
        ),
        QualityCheck::known_good(
            "SELECT count(*) FROM (SELECT title, creator_id, year, duration \
             FROM items GROUP BY title, creator_id, year, duration \
             HAVING count(*) > 1) AS dup",
            CheckValue::Int(0),
        ),
    ]
}

/// Evaluates an ordered list of quality checks against the committed
/// tables.
pub struct QualityGate {
    checks: Vec<QualityCheck>,
}

impl QualityGate {
    /// Creates a gate over the given checks, evaluated in order.
    #[must_use]
    pub fn new(checks: Vec<QualityCheck>) -> Self {
        Self { checks }
    }

    /// Runs all checks against the tables committed in the sink.
    ///
    /// Checks run in order; the first mismatch stops evaluation.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::ExpectationMismatch`] on the first failed check
    /// - [`PipelineError::Query`] if a query cannot be executed
    /// - [`PipelineError::Storage`] if a table cannot be read back
    pub async fn run(&self, reader: &TableReader) -> Result<()> {
        let ctx = register_tables(reader).await?;

        for check in &self.checks {
            let observed = eval_scalar(&ctx, &check.query).await?;
            if observed != check.expected {
                return Err(PipelineError::ExpectationMismatch {
                    query: check.query.clone(),
                    expected: check.expected.clone(),
                    observed,
                });
            }
            info!(query = %check.query, observed = %observed, "quality check passed");
        }
        Ok(())
    }

}

/// Registers every committed table with a fresh query session. Empty
/// tables register with their schema so queries against them still plan.
async fn register_tables(reader: &TableReader) -> Result<SessionContext> {
    let ctx = SessionContext::new();
    for table in &ALL_TABLES {
        let Some(schema) = encode::table_schema(table.name) else {
            return Err(PipelineError::Query {
                message: format!("no schema for table {}", table.name),
            });
        };
        let mut batches = Vec::new();
        for payload in reader.read_table(table).await? {
            batches.extend(encode::read_batches(&payload)?);
        }
        let mem = MemTable::try_new(schema, vec![batches]).map_err(|e| PipelineError::Query {
            message: format!("failed to register table {}: {e}", table.name),
        })?;
        ctx.register_table(table.name, Arc::new(mem))
            .map_err(|e| PipelineError::Query {
                message: format!("failed to register table {}: {e}", table.name),
            })?;
    }
    Ok(ctx)
}

/// Executes a query and reduces its result to the first column of the
/// first row. A result with no rows is `Null`.
async fn eval_scalar(ctx: &SessionContext, query: &str) -> Result<CheckValue> {
    let df = ctx.sql(query).await.map_err(|e| PipelineError::Query {
        message: format!("query failed to plan: {e}"),
    })?;
    let batches = df.collect().await.map_err(|e| PipelineError::Query {
        message: format!("query failed to execute: {e}"),
    })?;

    let Some(batch) = batches.iter().find(|b| b.num_rows() > 0) else {
        return Ok(CheckValue::Null);
    };
    let scalar =
        ScalarValue::try_from_array(batch.column(0), 0).map_err(|e| PipelineError::Query {
            message: format!("query result is not scalar-convertible: {e}"),
        })?;
    check_value_from_scalar(&scalar)
}

#[allow(clippy::cast_possible_wrap)]
fn check_value_from_scalar(scalar: &ScalarValue) -> Result<CheckValue> {
    match scalar {
        ScalarValue::Int64(Some(v)) => Ok(CheckValue::Int(*v)),
        ScalarValue::Int32(Some(v)) => Ok(CheckValue::Int(i64::from(*v))),
        ScalarValue::UInt64(Some(v)) => Ok(CheckValue::Int(*v as i64)),
        ScalarValue::Float64(Some(v)) => Ok(CheckValue::Float(*v)),
        ScalarValue::Float32(Some(v)) => Ok(CheckValue::Float(f64::from(*v))),
        ScalarValue::Utf8(Some(v)) | ScalarValue::LargeUtf8(Some(v)) => {
            Ok(CheckValue::Text(v.clone()))
        }
        ScalarValue::Boolean(Some(v)) => Ok(CheckValue::Bool(*v)),
        ScalarValue::Int64(None)
        | ScalarValue::Int32(None)
        | ScalarValue::UInt64(None)
        | ScalarValue::Float64(None)
        | ScalarValue::Float32(None)
        | ScalarValue::Utf8(None)
        | ScalarValue::LargeUtf8(None)
        | ScalarValue::Boolean(None)
        | ScalarValue::Null => Ok(CheckValue::Null),
        other => Err(PipelineError::Query {
            message: format!("unsupported scalar type in check result: {other:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_rejects_empty_query() {
        let err = QualityCheck::new("   ", CheckValue::Int(0)).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidCheck { .. }));
    }

    #[test]
    fn check_rejects_non_select_query() {
        let err = QualityCheck::new("DELETE FROM items", CheckValue::Int(0)).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidCheck { .. }));
    }

    #[test]
    fn check_accepts_select_and_with_any_case() {
        assert!(QualityCheck::new("select 1", CheckValue::Int(1)).is_ok());
        assert!(QualityCheck::new(
            "WITH t AS (SELECT 1 AS v) SELECT v FROM t",
            CheckValue::Int(1)
        )
        .is_ok());
    }

    #[test]
    fn int_and_float_values_cross_compare() {
        assert_eq!(CheckValue::Int(3), CheckValue::Float(3.0));
        assert_ne!(CheckValue::Int(3), CheckValue::Float(3.5));
        assert_ne!(CheckValue::Int(0), CheckValue::Null);
    }

    #[test]
    fn default_checks_are_all_valid() {
        for check in default_checks() {
            assert!(
                QualityCheck::new(check.query().to_string(), check.expected().clone()).is_ok(),
                "{}",
                check.query()
            );
        }
    }
}
