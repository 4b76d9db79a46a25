//! SQLite-backed like store.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use likeboard_engagement::{Item, ItemId, ToggleResponse, UserId};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, types::Type};
use tracing::{debug, info};

use super::{LikeStore, normalize, sort_newest_first};
use crate::error::AuthorityError;

/// Durable store. Every toggle runs in one `IMMEDIATE` transaction, so the
/// membership check, the write and the recount see the same liker set.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS items (
        item_id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        caption TEXT,
        image_url TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_items_created ON items(created_at);

    CREATE TABLE IF NOT EXISTS likes (
        item_id TEXT NOT NULL REFERENCES items(item_id) ON DELETE CASCADE,
        user_id TEXT NOT NULL,
        PRIMARY KEY (item_id, user_id)
    );
";

/// A row from `items`, before likers are attached.
struct ItemRow {
    item_id: String,
    owner_id: String,
    created_at: String,
    caption: Option<String>,
    image_url: Option<String>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &str) -> Result<Self, AuthorityError> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self::init(conn)?;

        info!(path = %path, "like database initialized");
        Ok(store)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, AuthorityError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, AuthorityError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AuthorityError> {
        self.conn
            .lock()
            .map_err(|_| AuthorityError::Unavailable("database lock poisoned".to_string()))
    }
}

fn parse_timestamp(column: usize, raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn assemble(row: ItemRow, likers: BTreeSet<UserId>) -> Result<Item, rusqlite::Error> {
    Ok(Item {
        item_id: ItemId(row.item_id),
        like_count: likers.len() as u64,
        liker_ids: likers,
        created_at: parse_timestamp(2, &row.created_at)?,
        owner_id: UserId(row.owner_id),
        caption: row.caption,
        image_url: row.image_url,
    })
}

fn read_item_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        item_id: row.get(0)?,
        owner_id: row.get(1)?,
        created_at: row.get(2)?,
        caption: row.get(3)?,
        image_url: row.get(4)?,
    })
}

fn count_likes(conn: &Connection, item_id: &ItemId) -> rusqlite::Result<u64> {
    conn.query_row(
        "SELECT COUNT(*) FROM likes WHERE item_id = ?1",
        params![item_id.0],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n as u64)
}

#[async_trait]
impl LikeStore for SqliteStore {
    async fn list_items(&self) -> Result<Vec<Item>, AuthorityError> {
        let conn = self.lock()?;

        let mut likers: HashMap<String, BTreeSet<UserId>> = HashMap::new();
        let mut stmt = conn.prepare("SELECT item_id, user_id FROM likes")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (item_id, user_id) = row?;
            likers.entry(item_id).or_default().insert(UserId(user_id));
        }

        let mut stmt = conn
            .prepare("SELECT item_id, owner_id, created_at, caption, image_url FROM items")?;
        let rows = stmt
            .query_map([], read_item_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut items = rows
            .into_iter()
            .map(|row| {
                let set = likers.remove(&row.item_id).unwrap_or_default();
                assemble(row, set)
            })
            .collect::<Result<Vec<_>, _>>()?;
        sort_newest_first(&mut items);
        Ok(items)
    }

    async fn get_item(&self, item_id: &ItemId) -> Result<Item, AuthorityError> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                "SELECT item_id, owner_id, created_at, caption, image_url FROM items WHERE item_id = ?1",
                params![item_id.0],
                read_item_row,
            )
            .optional()?
            .ok_or_else(|| AuthorityError::NotFound(item_id.clone()))?;

        let mut stmt = conn.prepare("SELECT user_id FROM likes WHERE item_id = ?1")?;
        let likers = stmt
            .query_map(params![item_id.0], |row| row.get::<_, String>(0).map(UserId))?
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(assemble(row, likers)?)
    }

    async fn toggle_like(
        &self,
        item_id: &ItemId,
        user_id: &UserId,
    ) -> Result<ToggleResponse, AuthorityError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM items WHERE item_id = ?1",
                params![item_id.0],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(AuthorityError::NotFound(item_id.clone()));
        }

        let removed = tx.execute(
            "DELETE FROM likes WHERE item_id = ?1 AND user_id = ?2",
            params![item_id.0, user_id.0],
        )?;
        let viewer_now_likes = if removed == 0 {
            tx.execute(
                "INSERT INTO likes (item_id, user_id) VALUES (?1, ?2)",
                params![item_id.0, user_id.0],
            )?;
            true
        } else {
            false
        };

        let new_like_count = count_likes(&tx, item_id)?;
        tx.commit()?;

        debug!(item = %item_id, user = %user_id, like_count = new_like_count, viewer_now_likes, "toggled like");
        Ok(ToggleResponse {
            new_like_count,
            viewer_now_likes,
        })
    }

    async fn insert_item(&self, item: Item) -> Result<(), AuthorityError> {
        let item = normalize(item);
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO items (item_id, owner_id, created_at, caption, image_url)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(item_id) DO UPDATE SET
                owner_id = excluded.owner_id,
                created_at = excluded.created_at,
                caption = excluded.caption,
                image_url = excluded.image_url",
            params![
                item.item_id.0,
                item.owner_id.0,
                item.created_at.to_rfc3339(),
                item.caption,
                item.image_url,
            ],
        )?;
        tx.execute("DELETE FROM likes WHERE item_id = ?1", params![item.item_id.0])?;
        for liker in &item.liker_ids {
            tx.execute(
                "INSERT INTO likes (item_id, user_id) VALUES (?1, ?2)",
                params![item.item_id.0, liker.0],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn delete_item(&self, item_id: &ItemId, user_id: &UserId) -> Result<(), AuthorityError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let owner: Option<String> = tx
            .query_row(
                "SELECT owner_id FROM items WHERE item_id = ?1",
                params![item_id.0],
                |row| row.get(0),
            )
            .optional()?;

        match owner {
            None => Err(AuthorityError::NotFound(item_id.clone())),
            Some(owner) if owner != user_id.0 => Err(AuthorityError::Forbidden(
                "only the owner can delete this item".to_string(),
            )),
            Some(_) => {
                tx.execute("DELETE FROM items WHERE item_id = ?1", params![item_id.0])?;
                tx.commit()?;
                debug!(item = %item_id, "deleted item");
                Ok(())
            }
        }
    }
}
