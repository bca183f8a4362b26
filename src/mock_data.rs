use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use tracing::info;

use crate::engine::{AsyncEngine, SqlValue};
use crate::error::EngineError;

// ─── Constants ───────────────────────────────────────────────────

const NUM_ITEMS: usize = 20;

// ─── Name pools ──────────────────────────────────────────────────

static ADJ: &[&str] = &[
    "Premium", "Wireless", "Compact", "Ergonomic", "Portable", "Classic", "Modern", "Dual",
];

static NOUN: &[&str] = &[
    "Keyboard", "Monitor", "Headphones", "Speaker", "Camera", "Charger", "Dock", "Lamp",
];

/// Create the `items` table and fill it with sample rows if it is empty.
///
/// Runs at startup, outside any request, so none of these statements end up
/// in a profile. Returns the number of rows inserted.
pub async fn seed(db: &AsyncEngine) -> Result<usize, EngineError> {
    db.execute(
        "CREATE TABLE IF NOT EXISTS items (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            description TEXT
        )",
        Vec::new(),
    )
    .await?;

    let existing = db
        .execute("SELECT COUNT(*) FROM items", Vec::new())
        .await?
        .scalar()
        .and_then(SqlValue::as_i64)
        .unwrap_or(0);
    if existing > 0 {
        info!(existing, "items table already populated");
        return Ok(0);
    }

    let mut rng = StdRng::seed_from_u64(42);
    for i in 0..NUM_ITEMS {
        let adj = ADJ[rng.gen_range(0..ADJ.len())];
        let noun = NOUN[rng.gen_range(0..NOUN.len())];
        db.execute(
            "INSERT INTO items (name, description) VALUES (?1, ?2)",
            vec![
                format!("{adj} {noun} {i}").into(),
                format!("Sample {} {}", adj.to_lowercase(), noun.to_lowercase()).into(),
            ],
        )
        .await?;
    }

    info!(rows = NUM_ITEMS, "seeded items table");
    Ok(NUM_ITEMS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SqliteEngine;

    #[tokio::test]
    async fn seeds_once() {
        let db = AsyncEngine::from_engine(SqliteEngine::open_in_memory().unwrap());
        assert_eq!(seed(&db).await.unwrap(), NUM_ITEMS);
        assert_eq!(seed(&db).await.unwrap(), 0);

        let count = db
            .execute("SELECT COUNT(*) FROM items", Vec::new())
            .await
            .unwrap();
        assert_eq!(count.scalar(), Some(&SqlValue::Integer(NUM_ITEMS as i64)));
    }
}
