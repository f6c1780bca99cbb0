use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 2;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    // Checkpoint every ~400KB so cache churn keeps the WAL small
    conn.pragma_update(None, "wal_autocheckpoint", 100)?;

    // In-memory DBs legitimately fail this.
    if conn
        .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        .is_ok()
    {
        tracing::info!("startup WAL checkpoint complete");
    }

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tool_cache (
            key         TEXT PRIMARY KEY,
            value       TEXT NOT NULL,
            result_type TEXT NOT NULL DEFAULT 'general',
            created_at  INTEGER NOT NULL,
            expires_at  INTEGER NOT NULL,
            hit_count   INTEGER NOT NULL DEFAULT 0,
            source      TEXT NOT NULL DEFAULT 'unknown',
            confidence  TEXT NOT NULL DEFAULT 'medium'
        );

        CREATE TABLE IF NOT EXISTS parts (
            mpn            TEXT PRIMARY KEY,
            name           TEXT NOT NULL,
            category       TEXT NOT NULL,
            specs          TEXT NOT NULL DEFAULT '{}',
            unit_price_usd REAL NOT NULL,
            supplier       TEXT NOT NULL DEFAULT '',
            lead_time_days INTEGER NOT NULL DEFAULT 0,
            updated_at     TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_cache_type_expiry ON tool_cache(result_type, expires_at);
        CREATE INDEX IF NOT EXISTS idx_parts_category ON parts(category);
        ",
    )?;

    // v1 databases predate the job history table
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS design_jobs (
            id          TEXT PRIMARY KEY,
            prompt      TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'pending',
            spec_json   TEXT,
            result_json TEXT,
            error       TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_jobs_created ON design_jobs(created_at);
        ",
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| row.get::<_, String>(0))
        .ok()
        .and_then(|v| v.parse().ok());
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        for t in ["design_jobs", "metadata", "parts", "tool_cache"] {
            assert!(tables.iter().any(|n| n == t), "missing table {t}");
        }
    }

    #[test]
    fn test_schema_version_recorded() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(conn.prepare("SELECT 1 FROM metadata").is_err());
        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn.execute(
            "INSERT INTO metadata (key, value) VALUES ('probe', 'kept')",
            [],
        )
        .unwrap();
        initialize(&conn).unwrap();
        let v: String = conn
            .query_row("SELECT value FROM metadata WHERE key = 'probe'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(v, "kept");
    }
}
