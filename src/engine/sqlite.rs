use parking_lot::Mutex;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection};

use super::{Engine, EngineId, QueryResult, SqlValue};
use crate::error::EngineError;

/// Blocking SQLite engine. One connection, serialized behind a mutex.
pub struct SqliteEngine {
    id: EngineId,
    name: String,
    conn: Mutex<Connection>,
}

impl SqliteEngine {
    /// Opens `path`; `":memory:"` gives a private in-memory database.
    pub fn open(path: &str) -> Result<Self, EngineError> {
        if path == ":memory:" {
            return Self::open_in_memory();
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self::from_connection(conn, format!("sqlite::{path}")))
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn, "sqlite::memory".into()))
    }

    fn from_connection(conn: Connection, name: String) -> Self {
        Self {
            id: EngineId::next(),
            name,
            conn: Mutex::new(conn),
        }
    }
}

impl Engine for SqliteEngine {
    fn id(&self) -> EngineId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<QueryResult, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(statement)?;
        let bound = params.iter().map(to_sqlite);

        // Statements without result columns (DDL, plain INSERT/UPDATE/DELETE)
        if stmt.column_count() == 0 {
            let rows_affected = stmt.execute(params_from_iter(bound))?;
            return Ok(QueryResult {
                rows_affected,
                last_insert_id: Some(conn.last_insert_rowid()),
                ..Default::default()
            });
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let mut rows = Vec::new();
        let mut cursor = stmt.query(params_from_iter(bound))?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(from_sqlite(row.get_ref(idx)?));
            }
            rows.push(values);
        }

        Ok(QueryResult {
            columns,
            rows,
            rows_affected: 0,
            last_insert_id: None,
        })
    }
}

fn to_sqlite(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) => Value::Integer(*v),
        SqlValue::Real(v) => Value::Real(*v),
        SqlValue::Text(v) => Value::Text(v.clone()),
        SqlValue::Blob(v) => Value::Blob(v.clone()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(v) => SqlValue::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => SqlValue::Blob(v.to_vec()),
    }
}
