//! Per-request profile records and the shared handle used to fill them in.
//!
//! A record moves through `Created → Active → Sealed`. While active, the
//! instrumentation layer appends query entries through a [`ProfileHandle`];
//! once sealed the record is frozen and copied into the history.

pub mod history;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::engine::EngineId;

pub use history::ProfileHistory;

// ─── Public types ────────────────────────────────────────────────

/// Lifecycle of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileState {
    Created,
    Active,
    Sealed,
}

/// How the request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The handler produced a response
    Completed,
    /// The request future was dropped or the handler panicked
    Cancelled,
}

/// Everything captured for a single inbound request.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileRecord {
    pub id: Uuid,
    pub method: String,
    pub path: String,
    /// Route template the request matched, e.g. `/items/:id`
    pub route: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(rename = "duration_ms", serialize_with = "opt_millis")]
    pub duration: Option<Duration>,
    pub status: Option<u16>,
    pub outcome: Option<Outcome>,
    pub queries: Vec<DbQuery>,
    pub tags: BTreeMap<String, String>,
}

/// One statement executed while a record was active.
#[derive(Debug, Clone, Serialize)]
pub struct DbQuery {
    pub statement: String,
    pub params: Vec<String>,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "duration_ms", serialize_with = "millis")]
    pub duration: Duration,
    pub engine_id: EngineId,
    pub engine: String,
    /// Rows returned (queries) or affected (other statements)
    pub rows: Option<usize>,
    pub error: Option<String>,
    pub slow: bool,
}

impl DbQuery {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

impl ProfileRecord {
    fn new(id: Uuid, method: String, path: String, route: Option<String>) -> Self {
        Self {
            id,
            method,
            path,
            route,
            started_at: Utc::now(),
            ended_at: None,
            duration: None,
            status: None,
            outcome: None,
            queries: Vec::new(),
            tags: BTreeMap::new(),
        }
    }

    /// `"GET /items/:id"`, falling back to the raw path for unmatched routes.
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.route.as_deref().unwrap_or(&self.path))
    }

    /// Sum of every recorded statement's duration.
    pub fn db_time(&self) -> Duration {
        self.queries.iter().map(|q| q.duration).sum()
    }

    pub fn failed_queries(&self) -> usize {
        self.queries.iter().filter(|q| !q.succeeded()).count()
    }
}

// ─── ProfileHandle ───────────────────────────────────────────────

/// Cheaply cloneable reference to a record that is still being filled in.
///
/// This is what the context carrier stores; every clone points at the same
/// record.
#[derive(Clone)]
pub struct ProfileHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: Uuid,
    started: Instant,
    slot: Mutex<Slot>,
}

struct Slot {
    state: ProfileState,
    record: ProfileRecord,
}

impl ProfileHandle {
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        route: Option<String>,
    ) -> Self {
        let id = Uuid::new_v4();
        Self {
            inner: Arc::new(HandleInner {
                id,
                started: Instant::now(),
                slot: Mutex::new(Slot {
                    state: ProfileState::Created,
                    record: ProfileRecord::new(id, method.into(), path.into(), route),
                }),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn state(&self) -> ProfileState {
        self.inner.slot.lock().state
    }

    /// Time since the handle was created.
    pub fn elapsed(&self) -> Duration {
        self.inner.started.elapsed()
    }

    /// `Created → Active`. Returns false for any other starting state.
    pub fn activate(&self) -> bool {
        let mut slot = self.inner.slot.lock();
        if slot.state == ProfileState::Created {
            slot.state = ProfileState::Active;
            true
        } else {
            false
        }
    }

    /// Append a query entry. Refused (returns false) unless the record is
    /// active.
    pub fn add_query(&self, query: DbQuery) -> bool {
        let mut slot = self.inner.slot.lock();
        if slot.state != ProfileState::Active {
            return false;
        }
        slot.record.queries.push(query);
        true
    }

    /// Attach free-form metadata. Ignored once sealed.
    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut slot = self.inner.slot.lock();
        if slot.state != ProfileState::Sealed {
            slot.record.tags.insert(key.into(), value.into());
        }
    }

    pub fn query_count(&self) -> usize {
        self.inner.slot.lock().record.queries.len()
    }

    /// Copy of the record as it stands right now.
    pub fn snapshot(&self) -> ProfileRecord {
        self.inner.slot.lock().record.clone()
    }

    /// `Active → Sealed`. Stamps the end time and hands back the frozen
    /// record; `None` if the record was never activated or is already sealed.
    pub fn seal(&self, status: Option<u16>, outcome: Outcome) -> Option<ProfileRecord> {
        let mut slot = self.inner.slot.lock();
        if slot.state != ProfileState::Active {
            return None;
        }
        slot.state = ProfileState::Sealed;
        slot.record.ended_at = Some(Utc::now());
        slot.record.duration = Some(self.inner.started.elapsed());
        slot.record.status = status;
        slot.record.outcome = Some(outcome);
        Some(slot.record.clone())
    }
}

impl std::fmt::Debug for ProfileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileHandle")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

// ─── Serde helpers ───────────────────────────────────────────────

fn millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_nanos() as f64 / 1_000_000.0)
}

fn opt_millis<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => millis(d, s),
        None => s.serialize_none(),
    }
}

#[cfg(test)]
pub(crate) fn sample_query(statement: &str) -> DbQuery {
    DbQuery {
        statement: statement.into(),
        params: Vec::new(),
        started_at: Utc::now(),
        duration: Duration::from_micros(250),
        engine_id: EngineId::next(),
        engine: "test".into(),
        rows: Some(1),
        error: None,
        slow: false,
    }
}
