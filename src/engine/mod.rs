//! Database engines the profiler knows how to wrap.
//!
//! Everything funnels through [`Engine::execute`], the single entry point the
//! instrumentation layer intercepts.

pub mod async_engine;
pub mod redis;
pub mod sqlite;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::error::EngineError;

pub use async_engine::AsyncEngine;
pub use self::redis::RedisEngine;
pub use sqlite::SqliteEngine;

/// Engines are shared behind an `Arc<dyn Engine>` so a wrapper can stand in
/// for the engine it wraps anywhere.
pub type SharedEngine = Arc<dyn Engine>;

/// Blocking statement executor.
pub trait Engine: Send + Sync + 'static {
    /// Identity of the engine actually doing the work. Wrappers report their
    /// delegate's id.
    fn id(&self) -> EngineId;

    /// Short human-readable label, e.g. `sqlite::memory`.
    fn name(&self) -> &str;

    fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<QueryResult, EngineError>;

    fn is_instrumented(&self) -> bool {
        false
    }
}

// ─── EngineId ────────────────────────────────────────────────────

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique engine identity, allocated once per engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EngineId(u64);

impl EngineId {
    pub fn next() -> Self {
        Self(NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

// ─── Values ──────────────────────────────────────────────────────

/// A bound parameter or a result cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// Rendering used for captured parameters.
impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "'{v}'"),
            Self::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Integer(v.into())
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        Self::Integer(v.into())
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

// ─── QueryResult ─────────────────────────────────────────────────

/// Materialized outcome of one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
    /// Rows changed by a statement that returns no columns
    pub rows_affected: usize,
    pub last_insert_id: Option<i64>,
}

impl QueryResult {
    /// First column of the first row.
    pub fn scalar(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|row| row.first())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows returned, or rows affected when the statement returned none.
    pub fn row_count(&self) -> usize {
        if self.columns.is_empty() {
            self.rows_affected
        } else {
            self.rows.len()
        }
    }

    /// Value of `column` in `row`, by name.
    pub fn get(&self, row: usize, column: &str) -> Option<&SqlValue> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_ids_are_unique() {
        let a = EngineId::next();
        let b = EngineId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn parameters_render_readably() {
        let rendered: Vec<String> = [
            SqlValue::Null,
            SqlValue::from(7),
            SqlValue::from("widget"),
            SqlValue::from(vec![1u8, 2, 3]),
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(rendered, ["NULL", "7", "'widget'", "<3 bytes>"]);
    }

    #[test]
    fn result_accessors() {
        let result = QueryResult {
            columns: vec!["id".into(), "name".into()],
            rows: vec![vec![SqlValue::from(1), SqlValue::from("a")]],
            ..Default::default()
        };
        assert_eq!(result.scalar(), Some(&SqlValue::Integer(1)));
        assert_eq!(result.get(0, "name").and_then(SqlValue::as_str), Some("a"));
        assert_eq!(result.row_count(), 1);

        let write = QueryResult {
            rows_affected: 3,
            ..Default::default()
        };
        assert_eq!(write.row_count(), 3);
    }
}
