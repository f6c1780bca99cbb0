//! Built-in catalog of common robotics components.
//!
//! Prices are typical single-unit street prices and serve as the offline
//! fallback when no live price is available.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::spec::ComponentKind;

/// A concrete, orderable part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentPart {
    pub name: String,
    pub category: ComponentKind,
    pub mpn: String,
    #[serde(default)]
    pub specs: serde_json::Map<String, serde_json::Value>,
    pub unit_price_usd: f64,
    pub supplier: String,
    pub lead_time_days: u32,
    #[serde(default = "one")]
    pub quantity: u32,
}

fn one() -> u32 {
    1
}

impl ComponentPart {
    pub fn line_total(&self) -> f64 {
        self.unit_price_usd * f64::from(self.quantity)
    }

    /// Rated torque in kg·cm for servos and steppers.
    pub fn torque_kg_cm(&self) -> Option<f64> {
        self.specs.get("torque_kg_cm").and_then(|v| v.as_f64())
    }
}

/// Catalog entry: static description used to build `ComponentPart`s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub kind: ComponentKind,
    pub mpn: &'static str,
    pub price_usd: f64,
    pub supplier: &'static str,
    pub lead_time_days: u32,
    /// Servo/stepper torque in kg·cm.
    pub torque_kg_cm: Option<f64>,
    pub weight_g: Option<f64>,
    pub dimensions_mm: [f64; 3],
}

pub const CATALOG: [CatalogEntry; 5] = [
    CatalogEntry {
        name: "MG996R",
        kind: ComponentKind::Servo,
        mpn: "MG996R",
        price_usd: 8.50,
        supplier: "TowerPro",
        lead_time_days: 7,
        torque_kg_cm: Some(11.0),
        weight_g: Some(55.0),
        dimensions_mm: [40.7, 19.7, 42.9],
    },
    CatalogEntry {
        name: "SG90",
        kind: ComponentKind::Servo,
        mpn: "SG90",
        price_usd: 2.50,
        supplier: "TowerPro",
        lead_time_days: 7,
        torque_kg_cm: Some(1.8),
        weight_g: Some(9.0),
        dimensions_mm: [22.2, 11.8, 31.0],
    },
    CatalogEntry {
        name: "NEMA17",
        kind: ComponentKind::Stepper,
        mpn: "17HS4401",
        price_usd: 12.00,
        supplier: "StepperOnline",
        lead_time_days: 10,
        // 40 N·cm holding torque
        torque_kg_cm: Some(4.08),
        weight_g: Some(280.0),
        dimensions_mm: [42.0, 42.0, 48.0],
    },
    CatalogEntry {
        name: "28BYJ-48",
        kind: ComponentKind::Stepper,
        mpn: "28BYJ-48",
        price_usd: 3.00,
        supplier: "Kiatronics",
        lead_time_days: 14,
        torque_kg_cm: Some(0.3),
        weight_g: Some(30.0),
        dimensions_mm: [28.0, 28.0, 19.0],
    },
    CatalogEntry {
        name: "608ZZ",
        kind: ComponentKind::Bearing,
        mpn: "608ZZ",
        price_usd: 0.50,
        supplier: "Generic",
        lead_time_days: 5,
        torque_kg_cm: None,
        weight_g: Some(12.0),
        dimensions_mm: [22.0, 22.0, 7.0],
    },
];

impl CatalogEntry {
    pub fn to_part(&self, quantity: u32) -> ComponentPart {
        let mut specs = serde_json::Map::new();
        if let Some(t) = self.torque_kg_cm {
            specs.insert("torque_kg_cm".into(), json!(t));
        }
        if let Some(w) = self.weight_g {
            specs.insert("weight_g".into(), json!(w));
        }
        specs.insert("dimensions_mm".into(), json!(self.dimensions_mm));
        if self.kind == ComponentKind::Bearing {
            specs.insert("bore_mm".into(), json!(8.0));
            specs.insert("dynamic_load_rating_n".into(), json!(3450.0));
        }
        ComponentPart {
            name: self.name.to_string(),
            category: self.kind,
            mpn: self.mpn.to_string(),
            specs,
            unit_price_usd: self.price_usd,
            supplier: self.supplier.to_string(),
            lead_time_days: self.lead_time_days,
            quantity,
        }
    }
}

/// Find a catalog entry by MPN or common name, case-insensitively.
pub fn find(mpn_or_name: &str) -> Option<&'static CatalogEntry> {
    let key = mpn_or_name.trim();
    CATALOG
        .iter()
        .find(|e| e.mpn.eq_ignore_ascii_case(key) || e.name.eq_ignore_ascii_case(key))
}

/// All entries of one kind, cheapest first.
pub fn by_kind(kind: ComponentKind) -> Vec<&'static CatalogEntry> {
    let mut out: Vec<_> = CATALOG.iter().filter(|e| e.kind == kind).collect();
    out.sort_by(|a, b| a.price_usd.total_cmp(&b.price_usd));
    out
}

/// Offline unit price for a part number.
pub fn local_price(mpn: &str) -> Option<f64> {
    find(mpn).map(|e| e.price_usd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_mpn_and_name() {
        assert_eq!(find("17HS4401").unwrap().name, "NEMA17");
        assert_eq!(find("nema17").unwrap().mpn, "17HS4401");
        assert_eq!(find("mg996r").unwrap().price_usd, 8.50);
        assert!(find("XYZ-1").is_none());
    }

    #[test]
    fn test_by_kind_sorted_by_price() {
        let servos = by_kind(ComponentKind::Servo);
        assert_eq!(servos.len(), 2);
        assert_eq!(servos[0].mpn, "SG90");
    }

    #[test]
    fn test_to_part_carries_specs() {
        let part = find("MG996R").unwrap().to_part(3);
        assert_eq!(part.torque_kg_cm(), Some(11.0));
        assert_eq!(part.line_total(), 25.5);
        assert_eq!(part.category, ComponentKind::Servo);
    }

    #[test]
    fn test_local_prices() {
        assert_eq!(local_price("608ZZ"), Some(0.50));
        assert_eq!(local_price("28BYJ-48"), Some(3.00));
    }
}
