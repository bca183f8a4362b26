use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::{AsyncEngine, QueryResult, SqlValue};
use crate::AppState;

use super::AppError;

// ─── Domain types ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub ip: String,
    pub created_at: String,
    pub ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: String,
    #[serde(default = "default_ip")]
    pub ip: String,
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
}

fn default_ip() -> String {
    "127.0.0.1".into()
}
fn default_ttl() -> u64 {
    300
}

fn store(state: &AppState) -> Result<&AsyncEngine, AppError> {
    state
        .sessions
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("session store not configured".into()))
}

// ─── GET /api/sessions/:id ───────────────────────────────────────

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Session>, AppError> {
    let redis = store(&state)?;

    let reply = redis
        .execute("HGETALL", vec![format!("session:{id}").into()])
        .await?;
    let fields = hash_from_reply(reply);
    if fields.is_empty() {
        return Err(AppError::NotFound(format!("session '{id}' not found")));
    }

    Ok(Json(Session {
        id,
        user_id: fields.get("user_id").cloned().unwrap_or_default(),
        ip: fields.get("ip").cloned().unwrap_or_default(),
        created_at: fields.get("created_at").cloned().unwrap_or_default(),
        ttl_secs: fields
            .get("ttl_secs")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
    }))
}

// ─── POST /api/sessions ──────────────────────────────────────────

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Session>), AppError> {
    let redis = store(&state)?;
    if req.ttl_secs == 0 {
        return Err(AppError::BadRequest("ttl_secs must be positive".into()));
    }

    let session = Session {
        id: format!("sess_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]),
        user_id: req.user_id,
        ip: req.ip,
        created_at: chrono::Utc::now().to_rfc3339(),
        ttl_secs: req.ttl_secs,
    };
    let key = format!("session:{}", session.id);

    redis
        .execute(
            "HSET",
            vec![
                key.clone().into(),
                "user_id".into(),
                session.user_id.clone().into(),
                "ip".into(),
                session.ip.clone().into(),
                "created_at".into(),
                session.created_at.clone().into(),
                "ttl_secs".into(),
                (session.ttl_secs as i64).into(),
            ],
        )
        .await?;
    redis
        .execute("EXPIRE", vec![key.into(), (session.ttl_secs as i64).into()])
        .await?;

    Ok((StatusCode::CREATED, Json(session)))
}

// ─── Helpers ─────────────────────────────────────────────────────

/// HGETALL replies alternate field, value, field, value...
fn hash_from_reply(reply: QueryResult) -> HashMap<String, String> {
    let mut cells = reply
        .rows
        .into_iter()
        .filter_map(|row| row.into_iter().next());
    let mut fields = HashMap::new();
    while let (Some(k), Some(v)) = (cells.next(), cells.next()) {
        if let (SqlValue::Text(k), SqlValue::Text(v)) = (k, v) {
            fields.insert(k, v);
        }
    }
    fields
}
