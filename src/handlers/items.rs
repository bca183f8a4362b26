use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::engine::{QueryResult, SqlValue};
use crate::AppState;

use super::AppError;

const MAX_PAGE: u32 = 100;

// ─── Domain types ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateItem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    10
}

#[derive(Debug, Serialize)]
pub struct RawSummary {
    pub total_items: i64,
    pub recent_items: Vec<String>,
}

// ─── GET / ───────────────────────────────────────────────────────

pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "query-profiler demo; profiles under /profiler/api/profiles",
    }))
}

// ─── GET /items ──────────────────────────────────────────────────

pub async fn list_items(
    State(state): State<Arc<AppState>>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Item>>, AppError> {
    if page.limit == 0 || page.limit > MAX_PAGE {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {MAX_PAGE}"
        )));
    }

    let result = state
        .db
        .execute(
            "SELECT id, name, description FROM items ORDER BY id LIMIT ?1 OFFSET ?2",
            vec![page.limit.into(), page.skip.into()],
        )
        .await?;

    Ok(Json(items_from_result(result)))
}

// ─── GET /items/:id ──────────────────────────────────────────────

pub async fn get_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Item>, AppError> {
    let result = state
        .db
        .execute(
            "SELECT id, name, description FROM items WHERE id = ?1",
            vec![id.into()],
        )
        .await?;

    items_from_result(result)
        .into_iter()
        .next()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("item {id} not found")))
}

// ─── POST /items ─────────────────────────────────────────────────

pub async fn create_item(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateItem>,
) -> Result<(StatusCode, Json<Item>), AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name must not be empty".into()));
    }

    let result = state
        .db
        .execute(
            "INSERT INTO items (name, description) VALUES (?1, ?2) \
             RETURNING id, name, description",
            vec![name.into(), req.description.into()],
        )
        .await?;

    let item = items_from_result(result)
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Internal("INSERT ... RETURNING produced no row".into()))?;
    Ok((StatusCode::CREATED, Json(item)))
}

// ─── GET /raw-query ──────────────────────────────────────────────

/// Two plain statements in one request.
pub async fn raw_query(State(state): State<Arc<AppState>>) -> Result<Json<RawSummary>, AppError> {
    let count = state
        .db
        .execute("SELECT COUNT(*) FROM items", Vec::new())
        .await?;
    let total_items = count.scalar().and_then(SqlValue::as_i64).unwrap_or(0);

    let recent = state
        .db
        .execute("SELECT name FROM items ORDER BY id DESC LIMIT 5", Vec::new())
        .await?;
    let recent_items = recent
        .rows
        .into_iter()
        .filter_map(|row| row.into_iter().next().and_then(SqlValue::into_text))
        .collect();

    Ok(Json(RawSummary {
        total_items,
        recent_items,
    }))
}

// ─── Helpers ─────────────────────────────────────────────────────

fn items_from_result(result: QueryResult) -> Vec<Item> {
    result
        .rows
        .into_iter()
        .filter_map(|row| {
            let mut cells = row.into_iter();
            let id = cells.next()?.as_i64()?;
            let name = cells.next()?.into_text()?;
            let description = cells.next().and_then(SqlValue::into_text);
            Some(Item {
                id,
                name,
                description,
            })
        })
        .collect()
}
