//! Hive-style partition keys with path-safe encoding.
//!
//! A partition key is an ordered list of `column = value` dimensions; the
//! order follows the table's declared partition spec, because hive paths
//! are position-sensitive (`year=2018/month=11` is not `month=11/year=2018`).
//!
//! String values are percent-encoded so arbitrary identifiers cannot break
//! out of their path segment. The encoding is deterministic: the same
//! logical key always yields the same path.

use std::fmt;

/// Scalar value types allowed in partition keys.
///
/// Floats are intentionally excluded; partition columns in this pipeline
/// are years, months, and identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartitionValue {
    /// 64-bit signed integer.
    Int64(i64),
    /// Arbitrary string (percent-encoded in path form).
    String(String),
}

impl PartitionValue {
    /// Returns the path-safe representation of the value.
    #[must_use]
    pub fn path_repr(&self) -> String {
        match self {
            Self::Int64(n) => n.to_string(),
            Self::String(s) => encode_path_component(s),
        }
    }
}

impl fmt::Display for PartitionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path_repr())
    }
}

/// Ordered multi-dimensional partition key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PartitionKey(Vec<(String, PartitionValue)>);

impl PartitionKey {
    /// Creates a new empty partition key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a dimension to the partition key.
    pub fn push(&mut self, column: impl Into<String>, value: PartitionValue) {
        self.0.push((column.into(), value));
    }

    /// Returns the hive-style path for this key, e.g. `year=2018/month=11`.
    ///
    /// Empty keys produce an empty path (unpartitioned table).
    #[must_use]
    pub fn path(&self) -> String {
        self.0
            .iter()
            .map(|(col, value)| format!("{col}={}", value.path_repr()))
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Returns true if the key has no dimensions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns an iterator over dimensions in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PartitionValue)> {
        self.0.iter().map(|(col, value)| (col, value))
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Percent-encodes everything outside `[A-Za-z0-9._-]`.
fn encode_path_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                out.push(byte as char);
            }
            _ => {
                out.push('%');
                out.push_str(&format!("{byte:02X}"));
            }
        }
    }
    out
}
