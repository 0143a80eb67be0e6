use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{Connection, OpenFlags};

use crate::errors::{AppError, AppResult};

pub struct DatabaseContext {
    pub connection: Connection,
    pub path: PathBuf,
}

pub fn bootstrap<P: AsRef<Path>>(data_dir: P, database_file: &str) -> AppResult<DatabaseContext> {
    let data_dir = data_dir.as_ref();
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join(database_file);

    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let connection = Connection::open_with_flags(&db_path, flags)?;
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;
        "#,
    )?;
    run_migrations(&connection)?;

    Ok(DatabaseContext {
        connection,
        path: db_path,
    })
}

fn run_migrations(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS places (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            osm_id TEXT UNIQUE,
            google_place_id TEXT UNIQUE,
            source TEXT NOT NULL,
            name TEXT NOT NULL,
            address TEXT,
            lat REAL NOT NULL,
            lng REAL NOT NULL,
            rating REAL,
            price_level INTEGER,
            types TEXT,
            osm_tags TEXT,
            business_status TEXT,
            phone TEXT,
            website TEXT,
            opening_hours TEXT,
            last_fetched_at TEXT NOT NULL DEFAULT (DATETIME('now'))
        );

        CREATE TABLE IF NOT EXISTS nearby_cache (
            tile_key TEXT NOT NULL,
            category TEXT NOT NULL,
            place_ids TEXT NOT NULL,
            last_fetched_at TEXT NOT NULL,
            PRIMARY KEY (tile_key, category)
        );

        CREATE TABLE IF NOT EXISTS zones (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            property_id TEXT NOT NULL,
            category TEXT NOT NULL,
            name TEXT NOT NULL,
            icon TEXT NOT NULL,
            description TEXT,
            qr_code TEXT NOT NULL,
            access_code TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'ACTIVE',
            is_published INTEGER NOT NULL DEFAULT 1 CHECK (is_published IN (0, 1)),
            zone_order INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (DATETIME('now')),
            updated_at TEXT NOT NULL DEFAULT (DATETIME('now')),
            UNIQUE (property_id, category)
        );

        CREATE TABLE IF NOT EXISTS recommendations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            zone_id INTEGER NOT NULL,
            place_id INTEGER NOT NULL,
            source TEXT NOT NULL,
            distance_meters INTEGER NOT NULL,
            walk_minutes INTEGER NOT NULL,
            position INTEGER NOT NULL,
            FOREIGN KEY (zone_id) REFERENCES zones(id) ON DELETE CASCADE,
            FOREIGN KEY (place_id) REFERENCES places(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_zones_property ON zones(property_id);
        CREATE INDEX IF NOT EXISTS idx_recommendations_zone ON recommendations(zone_id);
        "#,
    )?;

    ensure_column(connection, "places", "photo_url TEXT")?;
    ensure_column(connection, "recommendations", "description TEXT")?;
    Ok(())
}

fn ensure_column(connection: &Connection, table: &str, definition: &str) -> AppResult<()> {
    let column_name = definition
        .split_whitespace()
        .next()
        .ok_or_else(|| AppError::Config(format!("invalid column definition: {definition}")))?;
    if column_exists(connection, table, column_name)? {
        return Ok(());
    }
    let sql = format!("ALTER TABLE {table} ADD COLUMN {definition}");
    connection.execute(&sql, [])?;
    Ok(())
}

fn column_exists(connection: &Connection, table: &str, column: &str) -> AppResult<bool> {
    let pragma = format!("PRAGMA table_info({table})");
    let mut stmt = connection.prepare(&pragma)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn runs_migrations_and_creates_tables() {
        let dir = tempdir().unwrap();
        let ctx = bootstrap(dir.path(), "test.db").unwrap();

        let mut stmt = ctx
            .connection
            .prepare(
                "SELECT name FROM sqlite_master WHERE type='table' AND name IN ('places','nearby_cache','zones','recommendations')",
            )
            .unwrap();
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .count();
        assert_eq!(rows, 4);
        assert!(ctx.path.ends_with("test.db"));
    }

    #[test]
    fn reopens_existing_database() {
        let dir = tempdir().unwrap();
        {
            let ctx = bootstrap(dir.path(), "reopen.db").unwrap();
            ctx.connection
                .execute(
                    "INSERT INTO places (osm_id, source, name, lat, lng) VALUES ('node/1', 'OSM', 'Kept', 1.0, 2.0)",
                    [],
                )
                .unwrap();
        }

        let ctx = bootstrap(dir.path(), "reopen.db").unwrap();
        let count: i64 = ctx
            .connection
            .query_row("SELECT COUNT(*) FROM places", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn additive_columns_are_present() {
        let dir = tempdir().unwrap();
        let ctx = bootstrap(dir.path(), "columns.db").unwrap();
        assert!(column_exists(&ctx.connection, "places", "photo_url").unwrap());
        assert!(column_exists(&ctx.connection, "recommendations", "description").unwrap());
    }
}
