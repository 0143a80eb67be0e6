use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::db::now_timestamp;
use crate::errors::AppResult;

pub const CACHE_TTL_DAYS: i64 = 30;

#[derive(Clone)]
pub struct TileCache {
    db: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub place_ids: Vec<i64>,
    pub last_fetched_at: DateTime<Utc>,
}

impl CachedEntry {
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.last_fetched_at > Duration::days(CACHE_TTL_DAYS)
    }
}

impl TileCache {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    pub fn get(&self, tile_key: &str, category: &str) -> Option<CachedEntry> {
        match self.read(tile_key, category) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(
                    ?err,
                    tile_key, category, "tile cache read failed; treating as miss"
                );
                None
            }
        }
    }

    pub fn put(&self, tile_key: &str, category: &str, place_ids: &[i64]) {
        if let Err(err) = self.write(tile_key, category, place_ids) {
            warn!(?err, tile_key, category, "tile cache write failed");
        }
    }

    fn read(&self, tile_key: &str, category: &str) -> AppResult<Option<CachedEntry>> {
        let connection = self.db.lock();
        let row = connection
            .query_row(
                "SELECT place_ids, last_fetched_at FROM nearby_cache
                 WHERE tile_key = ?1 AND category = ?2",
                params![tile_key, category],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        let Some((ids_json, fetched_at)) = row else {
            return Ok(None);
        };

        let place_ids: Vec<i64> = serde_json::from_str(&ids_json)?;
        let last_fetched_at = match DateTime::parse_from_rfc3339(&fetched_at) {
            Ok(parsed) => parsed.with_timezone(&Utc),
            Err(err) => {
                warn!(
                    ?err,
                    tile_key, category, "cache timestamp unreadable; treating as miss"
                );
                return Ok(None);
            }
        };
        Ok(Some(CachedEntry {
            place_ids,
            last_fetched_at,
        }))
    }

    fn write(&self, tile_key: &str, category: &str, place_ids: &[i64]) -> AppResult<()> {
        let payload = serde_json::to_string(place_ids)?;
        let connection = self.db.lock();
        connection.execute(
            "INSERT INTO nearby_cache (tile_key, category, place_ids, last_fetched_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(tile_key, category) DO UPDATE SET
                place_ids = excluded.place_ids,
                last_fetched_at = excluded.last_fetched_at",
            params![tile_key, category, payload, now_timestamp()],
        )?;
        Ok(())
    }
}
