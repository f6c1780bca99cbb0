use std::path::{Path, PathBuf};

use rusqlite::{Connection, params};

use crate::error::{Result, StoreError};
use crate::schema;

/// Where a `DATABASE_URL` points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    Memory,
    File(PathBuf),
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::InvalidData(format!("create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        tracing::debug!(path = %path.display(), "opened store");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Open from a `DATABASE_URL` value.
    pub fn open_url(url: &str) -> Result<Self> {
        match parse_database_url(url)? {
            DatabaseLocation::Memory => Self::open_in_memory(),
            DatabaseLocation::File(path) => Self::open(&path),
        }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM metadata WHERE key = ?1")?;
        let result = stmt.query_row([key], |row| row.get(0)).ok();
        Ok(result)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

// --- Pure parsing helpers ---

/// Accepts `sqlite://path`, `sqlite:path`, `sqlite::memory:`, `:memory:` and
/// bare filesystem paths. Other schemes (postgres://...) are rejected.
pub fn parse_database_url(url: &str) -> Result<DatabaseLocation> {
    let url = url.trim();
    if url.is_empty() {
        return Err(StoreError::InvalidData("empty database url".into()));
    }
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    if rest == ":memory:" || (rest.is_empty() && url.starts_with("sqlite:")) {
        return Ok(DatabaseLocation::Memory);
    }
    if let Some((scheme, _)) = rest.split_once("://") {
        return Err(StoreError::InvalidData(format!(
            "unsupported database scheme: {scheme}"
        )));
    }
    Ok(DatabaseLocation::File(PathBuf::from(rest)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_database_url() {
        assert_eq!(
            parse_database_url(":memory:").unwrap(),
            DatabaseLocation::Memory
        );
        assert_eq!(
            parse_database_url("sqlite::memory:").unwrap(),
            DatabaseLocation::Memory
        );
        assert_eq!(
            parse_database_url("sqlite://data/cem.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("data/cem.db"))
        );
        assert_eq!(
            parse_database_url("sqlite:///var/lib/cem.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("/var/lib/cem.db"))
        );
        assert_eq!(
            parse_database_url("cache.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("cache.db"))
        );
        assert!(parse_database_url("postgres://localhost/cem").is_err());
        assert!(parse_database_url("  ").is_err());
    }

    #[test]
    fn test_metadata_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.get_metadata("missing").unwrap(), None);
        store.set_metadata("k", "v1").unwrap();
        store.set_metadata("k", "v2").unwrap();
        assert_eq!(store.get_metadata("k").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn test_open_file_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cem.db");
        let store = Store::open(&path).unwrap();
        store.set_metadata("probe", "1").unwrap();
        drop(store);

        let reopened = Store::open_url(&format!("sqlite://{}", path.display())).unwrap();
        assert_eq!(reopened.get_metadata("probe").unwrap().as_deref(), Some("1"));
        assert_eq!(
            schema::get_schema_version(reopened.conn()).unwrap(),
            Some(schema::SCHEMA_VERSION)
        );
    }
}
