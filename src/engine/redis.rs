use parking_lot::Mutex;
use redis::{Connection, Value};

use super::{Engine, EngineId, QueryResult, SqlValue};
use crate::error::EngineError;

/// Blocking Redis engine.
///
/// The "statement" is the command name (`HSET`, `GET`, ...) and the
/// parameters are its arguments. Replies come back as a single `value`
/// column, one row per element for array replies.
pub struct RedisEngine {
    id: EngineId,
    name: String,
    conn: Mutex<Connection>,
}

impl RedisEngine {
    pub fn connect(url: &str) -> Result<Self, EngineError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection()?;
        Ok(Self {
            id: EngineId::next(),
            name: format!("redis::{}", client.get_connection_info().addr),
            conn: Mutex::new(conn),
        })
    }
}

impl Engine for RedisEngine {
    fn id(&self) -> EngineId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<QueryResult, EngineError> {
        let cmd = command(statement, params)?;
        let reply: Value = cmd.query(&mut *self.conn.lock())?;
        Ok(reply_to_result(reply))
    }
}

/// Redis has no null argument, so `SqlValue::Null` is rejected rather than
/// sent as something indistinguishable from a real value.
fn command(statement: &str, params: &[SqlValue]) -> Result<redis::Cmd, EngineError> {
    let mut cmd = redis::cmd(statement);
    for (index, param) in params.iter().enumerate() {
        match param {
            SqlValue::Null => {
                return Err(EngineError::InvalidArgument(format!(
                    "{statement} argument {} is NULL; redis arguments cannot be null",
                    index + 1
                )))
            }
            SqlValue::Integer(v) => cmd.arg(*v),
            SqlValue::Real(v) => cmd.arg(*v),
            SqlValue::Text(v) => cmd.arg(v.as_str()),
            SqlValue::Blob(v) => cmd.arg(v.as_slice()),
        };
    }
    Ok(cmd)
}

fn reply_to_result(reply: Value) -> QueryResult {
    let rows = match reply {
        Value::Bulk(items) => items.into_iter().map(|v| vec![scalar(v)]).collect(),
        Value::Nil => Vec::new(),
        other => vec![vec![scalar(other)]],
    };
    QueryResult {
        columns: vec!["value".into()],
        rows,
        rows_affected: 0,
        last_insert_id: None,
    }
}

fn scalar(value: Value) -> SqlValue {
    match value {
        Value::Nil => SqlValue::Null,
        Value::Int(v) => SqlValue::Integer(v),
        Value::Data(bytes) => match String::from_utf8(bytes) {
            Ok(text) => SqlValue::Text(text),
            Err(err) => SqlValue::Blob(err.into_bytes()),
        },
        Value::Status(text) => SqlValue::Text(text),
        Value::Okay => SqlValue::Text("OK".into()),
        Value::Bulk(items) => SqlValue::Text(format!("<{} elements>", items.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_replies_become_rows() {
        let result = reply_to_result(Value::Bulk(vec![
            Value::Data(b"name".to_vec()),
            Value::Data(b"lamp".to_vec()),
            Value::Int(3),
        ]));
        assert_eq!(result.columns, ["value"]);
        assert_eq!(result.len(), 3);
        assert_eq!(result.rows[1][0], SqlValue::Text("lamp".into()));
        assert_eq!(result.rows[2][0], SqlValue::Integer(3));
    }

    #[test]
    fn nil_is_an_empty_result_and_ok_is_text() {
        assert!(reply_to_result(Value::Nil).is_empty());
        assert_eq!(
            reply_to_result(Value::Okay).scalar(),
            Some(&SqlValue::Text("OK".into()))
        );
    }

    #[test]
    fn non_utf8_payloads_stay_binary() {
        assert_eq!(
            scalar(Value::Data(vec![0xff, 0xfe])),
            SqlValue::Blob(vec![0xff, 0xfe])
        );
    }

    #[test]
    fn null_arguments_are_refused() {
        let err = command("HSET", &["k".into(), "f".into(), SqlValue::Null]).err().unwrap();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
        assert!(err.to_string().contains("argument 3"));

        let ok = command("HSET", &["k".into(), "f".into(), "".into()]).unwrap();
        assert_eq!(ok.args_iter().count(), 4);
    }
}
