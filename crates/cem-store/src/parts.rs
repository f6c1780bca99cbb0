//! Parts database: offline component catalog with JSON import/export.

use std::path::Path;

use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

use cem_core::catalog::CATALOG;
use cem_core::time::now_iso8601;
use cem_core::{ComponentKind, ComponentPart};

use crate::error::{Result, StoreError};
use crate::store::Store;

#[derive(Debug, Serialize, Deserialize)]
struct PartsExport {
    version: u32,
    exported_at: String,
    parts: Vec<ComponentPart>,
}

const EXPORT_VERSION: u32 = 1;

impl Store {
    /// Insert catalog entries that are not already present. Returns the
    /// number of rows added.
    pub fn seed_parts_from_catalog(&self) -> Result<usize> {
        let tx = self.conn().unchecked_transaction()?;
        let now = now_iso8601();
        let mut added = 0;
        for entry in CATALOG.iter() {
            let part = entry.to_part(1);
            added += tx.execute(
                "INSERT OR IGNORE INTO parts
                     (mpn, name, category, specs, unit_price_usd, supplier, lead_time_days, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    part.mpn,
                    part.name,
                    part.category.as_str(),
                    serde_json::to_string(&part.specs)?,
                    part.unit_price_usd,
                    part.supplier,
                    part.lead_time_days,
                    now,
                ],
            )?;
        }
        tx.commit()?;
        if added > 0 {
            tracing::info!(added, "seeded parts database from catalog");
        }
        Ok(added)
    }

    pub fn upsert_part(&self, part: &ComponentPart) -> Result<()> {
        if part.mpn.trim().is_empty() {
            return Err(StoreError::InvalidData(format!(
                "part {:?} has no MPN",
                part.name
            )));
        }
        self.conn().execute(
            "INSERT OR REPLACE INTO parts
                 (mpn, name, category, specs, unit_price_usd, supplier, lead_time_days, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                part.mpn,
                part.name,
                part.category.as_str(),
                serde_json::to_string(&part.specs)?,
                part.unit_price_usd,
                part.supplier,
                part.lead_time_days,
                now_iso8601(),
            ],
        )?;
        Ok(())
    }

    /// Case-insensitive MPN lookup.
    pub fn get_part(&self, mpn: &str) -> Result<Option<ComponentPart>> {
        let raw = self
            .conn()
            .query_row(
                "SELECT mpn, name, category, specs, unit_price_usd, supplier, lead_time_days
                 FROM parts WHERE mpn = ?1 COLLATE NOCASE",
                [mpn.trim()],
                raw_part,
            )
            .optional()?;
        raw.map(RawPart::into_part).transpose()
    }

    /// Parts of one category, cheapest first.
    pub fn parts_by_category(&self, kind: ComponentKind) -> Result<Vec<ComponentPart>> {
        self.query_parts(
            "SELECT mpn, name, category, specs, unit_price_usd, supplier, lead_time_days
             FROM parts WHERE category = ?1 ORDER BY unit_price_usd, mpn",
            [kind.as_str()],
        )
    }

    pub fn all_parts(&self) -> Result<Vec<ComponentPart>> {
        self.query_parts(
            "SELECT mpn, name, category, specs, unit_price_usd, supplier, lead_time_days
             FROM parts ORDER BY category, mpn",
            [],
        )
    }

    pub fn delete_part(&self, mpn: &str) -> Result<bool> {
        let n = self
            .conn()
            .execute("DELETE FROM parts WHERE mpn = ?1 COLLATE NOCASE", [mpn.trim()])?;
        Ok(n > 0)
    }

    fn query_parts<P: rusqlite::Params>(&self, sql: &str, p: P) -> Result<Vec<ComponentPart>> {
        let mut stmt = self.conn().prepare(sql)?;
        let raws = stmt
            .query_map(p, raw_part)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawPart::into_part).collect()
    }

    // --- JSON bridge ---

    pub fn export_parts_json(&self) -> Result<String> {
        let export = PartsExport {
            version: EXPORT_VERSION,
            exported_at: now_iso8601(),
            parts: self.all_parts()?,
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// Accepts either an export document or a bare array of parts.
    /// Returns the number of parts written.
    pub fn import_parts_json(&self, json: &str) -> Result<usize> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let parts: Vec<ComponentPart> = if value.is_array() {
            serde_json::from_value(value)?
        } else {
            let export: PartsExport = serde_json::from_value(value)?;
            if export.version > EXPORT_VERSION {
                return Err(StoreError::InvalidData(format!(
                    "unsupported parts export version {}",
                    export.version
                )));
            }
            export.parts
        };

        let tx = self.conn().unchecked_transaction()?;
        for part in &parts {
            self.upsert_part(part)?;
        }
        tx.commit()?;
        tracing::info!(count = parts.len(), "imported parts");
        Ok(parts.len())
    }

    pub fn export_parts_file(&self, path: &Path) -> Result<()> {
        let json = self.export_parts_json()?;
        std::fs::write(path, json)
            .map_err(|e| StoreError::InvalidData(format!("write {}: {e}", path.display())))
    }

    pub fn import_parts_file(&self, path: &Path) -> Result<usize> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| StoreError::InvalidData(format!("read {}: {e}", path.display())))?;
        self.import_parts_json(&json)
    }
}

struct RawPart {
    mpn: String,
    name: String,
    category: String,
    specs: String,
    unit_price_usd: f64,
    supplier: String,
    lead_time_days: u32,
}

fn raw_part(row: &Row<'_>) -> rusqlite::Result<RawPart> {
    Ok(RawPart {
        mpn: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        specs: row.get(3)?,
        unit_price_usd: row.get(4)?,
        supplier: row.get(5)?,
        lead_time_days: row.get(6)?,
    })
}

impl RawPart {
    fn into_part(self) -> Result<ComponentPart> {
        let category: ComponentKind =
            serde_json::from_value(serde_json::Value::String(self.category.clone())).map_err(
                |_| StoreError::InvalidData(format!("unknown part category: {}", self.category)),
            )?;
        Ok(ComponentPart {
            name: self.name,
            category,
            mpn: self.mpn,
            specs: serde_json::from_str(&self.specs)?,
            unit_price_usd: self.unit_price_usd,
            supplier: self.supplier,
            lead_time_days: self.lead_time_days,
            quantity: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.seed_parts_from_catalog().unwrap(), CATALOG.len());
        assert_eq!(store.seed_parts_from_catalog().unwrap(), 0);
        assert_eq!(store.all_parts().unwrap().len(), CATALOG.len());
    }

    #[test]
    fn test_get_by_mpn_and_category() {
        let store = Store::open_in_memory().unwrap();
        store.seed_parts_from_catalog().unwrap();

        let servo = store.get_part("mg996r").unwrap().unwrap();
        assert_eq!(servo.category, ComponentKind::Servo);
        assert_eq!(servo.torque_kg_cm(), Some(11.0));
        assert_eq!(servo.quantity, 1);

        let servos = store.parts_by_category(ComponentKind::Servo).unwrap();
        assert!(servos.len() >= 2);
        assert!(
            servos
                .windows(2)
                .all(|w| w[0].unit_price_usd <= w[1].unit_price_usd)
        );
        assert!(store.get_part("NOPE-1").unwrap().is_none());
    }

    #[test]
    fn test_upsert_overrides_seed_price() {
        let store = Store::open_in_memory().unwrap();
        store.seed_parts_from_catalog().unwrap();
        let mut sg90 = store.get_part("SG90").unwrap().unwrap();
        sg90.unit_price_usd = 1.99;
        store.upsert_part(&sg90).unwrap();
        assert_eq!(store.get_part("SG90").unwrap().unwrap().unit_price_usd, 1.99);

        // Re-seeding never clobbers local edits.
        store.seed_parts_from_catalog().unwrap();
        assert_eq!(store.get_part("SG90").unwrap().unwrap().unit_price_usd, 1.99);
    }

    #[test]
    fn test_upsert_rejects_missing_mpn() {
        let store = Store::open_in_memory().unwrap();
        let mut part = CATALOG[0].to_part(1);
        part.mpn = " ".into();
        assert!(matches!(
            store.upsert_part(&part),
            Err(StoreError::InvalidData(_))
        ));
    }

    #[test]
    fn test_json_export_import() {
        let source = Store::open_in_memory().unwrap();
        source.seed_parts_from_catalog().unwrap();
        let json = source.export_parts_json().unwrap();

        let target = Store::open_in_memory().unwrap();
        assert_eq!(target.import_parts_json(&json).unwrap(), CATALOG.len());
        assert_eq!(target.all_parts().unwrap(), source.all_parts().unwrap());

        let bare = r#"[{"name": "Pi Pico", "category": "controller", "mpn": "SC0915",
                        "unit_price_usd": 4.0, "supplier": "Raspberry Pi", "lead_time_days": 3}]"#;
        assert_eq!(target.import_parts_json(bare).unwrap(), 1);
        assert_eq!(
            target.get_part("sc0915").unwrap().unwrap().category,
            ComponentKind::Controller
        );
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parts.json");
        let store = Store::open_in_memory().unwrap();
        store.seed_parts_from_catalog().unwrap();
        store.export_parts_file(&path).unwrap();

        let other = Store::open_in_memory().unwrap();
        assert_eq!(other.import_parts_file(&path).unwrap(), CATALOG.len());
        assert!(other.import_parts_file(&dir.path().join("missing.json")).is_err());
    }
}
