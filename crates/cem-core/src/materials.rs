//! Material property database.

use serde::Serialize;

use crate::spec::{ManufacturingMethod, normalize_key};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Printability {
    Excellent,
    Good,
    Moderate,
    /// Not printable on hobby equipment; machined or cast.
    NotApplicable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Material {
    pub name: &'static str,
    /// g/cm³
    pub density: f64,
    /// MPa
    pub tensile_strength: f64,
    /// MPa
    pub yield_strength: f64,
    /// MPa
    pub elastic_modulus: f64,
    pub poisson_ratio: f64,
    /// µm/(m·K)
    pub thermal_expansion: f64,
    /// °C
    pub max_temp: f64,
    /// USD/kg
    pub cost_per_kg: f64,
    pub printability: Printability,
}

pub const MATERIALS: [Material; 11] = [
    Material {
        name: "PLA",
        density: 1.25,
        tensile_strength: 50.0,
        yield_strength: 40.0,
        elastic_modulus: 3500.0,
        poisson_ratio: 0.36,
        thermal_expansion: 68.0,
        max_temp: 60.0,
        cost_per_kg: 20.0,
        printability: Printability::Excellent,
    },
    Material {
        name: "ABS",
        density: 1.05,
        tensile_strength: 40.0,
        yield_strength: 35.0,
        elastic_modulus: 2300.0,
        poisson_ratio: 0.35,
        thermal_expansion: 90.0,
        max_temp: 98.0,
        cost_per_kg: 25.0,
        printability: Printability::Good,
    },
    Material {
        name: "PETG",
        density: 1.27,
        tensile_strength: 53.0,
        yield_strength: 45.0,
        elastic_modulus: 2070.0,
        poisson_ratio: 0.38,
        thermal_expansion: 60.0,
        max_temp: 73.0,
        cost_per_kg: 30.0,
        printability: Printability::Good,
    },
    Material {
        name: "Nylon",
        density: 1.14,
        tensile_strength: 75.0,
        yield_strength: 45.0,
        elastic_modulus: 1600.0,
        poisson_ratio: 0.39,
        thermal_expansion: 80.0,
        max_temp: 178.0,
        cost_per_kg: 80.0,
        printability: Printability::Moderate,
    },
    Material {
        name: "TPU",
        density: 1.21,
        tensile_strength: 35.0,
        yield_strength: 20.0,
        elastic_modulus: 26.0,
        poisson_ratio: 0.48,
        thermal_expansion: 150.0,
        max_temp: 80.0,
        cost_per_kg: 60.0,
        printability: Printability::Moderate,
    },
    Material {
        name: "ASA",
        density: 1.05,
        tensile_strength: 45.0,
        yield_strength: 40.0,
        elastic_modulus: 2000.0,
        poisson_ratio: 0.35,
        thermal_expansion: 98.0,
        max_temp: 95.0,
        cost_per_kg: 35.0,
        printability: Printability::Good,
    },
    Material {
        name: "Carbon_Fiber_PLA",
        density: 1.30,
        tensile_strength: 65.0,
        yield_strength: 55.0,
        elastic_modulus: 6000.0,
        poisson_ratio: 0.35,
        thermal_expansion: 40.0,
        max_temp: 65.0,
        cost_per_kg: 120.0,
        printability: Printability::Good,
    },
    Material {
        name: "Aluminum_6061",
        density: 2.70,
        tensile_strength: 310.0,
        yield_strength: 276.0,
        elastic_modulus: 68_900.0,
        poisson_ratio: 0.33,
        thermal_expansion: 23.6,
        max_temp: 582.0,
        cost_per_kg: 15.0,
        printability: Printability::NotApplicable,
    },
    Material {
        name: "Steel_1045",
        density: 7.85,
        tensile_strength: 620.0,
        yield_strength: 450.0,
        elastic_modulus: 205_000.0,
        poisson_ratio: 0.29,
        thermal_expansion: 11.5,
        max_temp: 1500.0,
        cost_per_kg: 5.0,
        printability: Printability::NotApplicable,
    },
    Material {
        name: "Stainless_316",
        density: 8.0,
        tensile_strength: 580.0,
        yield_strength: 290.0,
        elastic_modulus: 193_000.0,
        poisson_ratio: 0.30,
        thermal_expansion: 16.0,
        max_temp: 870.0,
        cost_per_kg: 12.0,
        printability: Printability::NotApplicable,
    },
    Material {
        name: "Titanium_Ti6Al4V",
        density: 4.43,
        tensile_strength: 950.0,
        yield_strength: 880.0,
        elastic_modulus: 113_800.0,
        poisson_ratio: 0.34,
        thermal_expansion: 8.6,
        max_temp: 400.0,
        cost_per_kg: 350.0,
        printability: Printability::NotApplicable,
    },
];

/// Materials tried in order when a design fails structurally or thermally.
pub const UPGRADE_PATH: [&str; 4] = ["Carbon_Fiber_PLA", "Nylon", "Aluminum_6061", "Steel_1045"];

const ALIASES: [(&str, &str); 12] = [
    ("aluminum", "Aluminum_6061"),
    ("aluminium", "Aluminum_6061"),
    ("al6061", "Aluminum_6061"),
    ("steel", "Steel_1045"),
    ("stainless", "Stainless_316"),
    ("stainless_steel", "Stainless_316"),
    ("titanium", "Titanium_Ti6Al4V"),
    ("ti6al4v", "Titanium_Ti6Al4V"),
    ("carbon_fiber", "Carbon_Fiber_PLA"),
    ("cf_pla", "Carbon_Fiber_PLA"),
    ("carbon_fibre_pla", "Carbon_Fiber_PLA"),
    ("nylon_pa12", "Nylon"),
];

/// Find a material by name, alias or loose spelling ("aluminum", "carbon fiber pla").
pub fn lookup(name: &str) -> Option<&'static Material> {
    let key = normalize_key(name);
    if key.is_empty() {
        return None;
    }
    let canonical = ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, c)| *c);
    MATERIALS.iter().find(|m| match canonical {
        Some(c) => m.name == c,
        None => normalize_key(m.name) == key,
    })
}

/// Canonical table name for a material, if known.
pub fn canonical_name(name: &str) -> Option<&'static str> {
    lookup(name).map(|m| m.name)
}

/// Next stronger material after `current` on the upgrade path.
///
/// A material on the path steps to its successor. A known material off the
/// path moves to the first entry at least as strong and as heat tolerant,
/// so nothing is downgraded. Unknown names start at the head of the path.
pub fn next_upgrade(current: &str) -> Option<&'static str> {
    let Some(current) = lookup(current) else {
        return UPGRADE_PATH.first().copied();
    };
    if let Some(i) = UPGRADE_PATH.iter().position(|m| *m == current.name) {
        return UPGRADE_PATH.get(i + 1).copied();
    }
    UPGRADE_PATH.iter().copied().find(|name| {
        lookup(name).is_some_and(|m| {
            m.yield_strength >= current.yield_strength && m.max_temp >= current.max_temp
        })
    })
}

/// Requirements used to score candidate materials.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialNeeds {
    pub temp_max_c: f64,
    pub method: ManufacturingMethod,
}

/// Score a material for the given needs. Higher is better.
///
/// Strength-to-weight dominates, cost is a penalty, a service temperature
/// with margin earns a bonus, and printability counts for additive builds.
pub fn score(material: &Material, needs: &MaterialNeeds) -> f64 {
    let mut s = material.yield_strength / material.density * 10.0 / 100.0;
    s -= material.cost_per_kg * 0.5 / 10.0;
    if material.max_temp > needs.temp_max_c * 1.2 {
        s += 20.0;
    }
    if needs.method == ManufacturingMethod::Fdm {
        s += match material.printability {
            Printability::Excellent => 30.0,
            Printability::Good => 15.0,
            Printability::Moderate => 5.0,
            Printability::NotApplicable => -50.0,
        };
    }
    s
}

/// Best-scoring material for the needs.
pub fn optimal_material(needs: &MaterialNeeds) -> &'static Material {
    MATERIALS
        .iter()
        .max_by(|a, b| score(a, needs).total_cmp(&score(b, needs)))
        .unwrap_or(&MATERIALS[0])
}
