//! Offline cost tools: density lookup, raw material cost, manufacturing
//! cost estimates and currency conversion.

use serde::{Deserialize, Serialize};

use crate::error::{CemError, Result};

fn round_to(v: f64, places: i32) -> f64 {
    let f = 10f64.powi(places);
    (v * f).round() / f
}

/// Round to cents.
pub fn round_cents(v: f64) -> f64 {
    round_to(v, 2)
}

// --- Density ---

/// (family, grade, g/cm³). The first grade of a family is its default.
const DENSITIES: &[(&str, &str, f64)] = &[
    ("aluminum", "6061", 2.70),
    ("aluminum", "5083", 2.66),
    ("aluminum", "7075", 2.81),
    ("steel", "1045", 7.85),
    ("steel", "304", 8.0),
    ("steel", "316", 8.0),
    ("steel", "4140", 7.85),
    ("stainless", "304", 8.0),
    ("stainless", "316", 8.0),
    ("stainless", "410", 7.75),
    ("titanium", "ti-6al-4v", 4.43),
    ("titanium", "ti-5al-5v-5fe", 4.81),
    ("titanium", "grade 2", 4.51),
    ("copper", "pure", 8.96),
    ("copper", "brass", 8.5),
    ("copper", "bronze", 8.75),
    ("nickel", "inconel 625", 8.44),
    ("nickel", "inconel 718", 8.19),
    ("cast iron", "", 7.2),
    ("magnesium", "", 1.8),
    ("lead", "", 11.34),
    ("zinc", "", 7.14),
    ("tungsten", "", 19.25),
    ("platinum", "", 21.45),
    ("gold", "", 19.3),
    ("silver", "", 10.49),
    ("abs", "", 1.04),
    ("pla", "", 1.24),
    ("petg", "", 1.27),
    ("nylon", "", 1.14),
    ("tpu", "", 1.21),
    ("peek", "", 1.32),
    ("polycarbonate", "", 1.20),
    ("carbon-fiber", "", 1.60),
    ("glass-fiber", "", 1.85),
    ("aramid", "", 1.44),
];

/// Density in g/cm³. Matches a family name contained in `material` (or vice
/// versa), preferring a grade that `material` mentions.
pub fn find_density(material: &str) -> Option<f64> {
    let name = material.trim().to_lowercase().replace('_', " ");
    if name.is_empty() {
        return None;
    }
    let family = DENSITIES
        .iter()
        .find(|(f, _, _)| *f == name)
        .or_else(|| {
            DENSITIES
                .iter()
                .find(|(f, _, _)| name.contains(f) || f.contains(name.as_str()))
        })
        .map(|(f, _, _)| *f)?;
    let grades = DENSITIES.iter().filter(|(f, _, _)| *f == family);
    grades
        .clone()
        .find(|(_, g, _)| !g.is_empty() && name.contains(g))
        .or_else(|| grades.clone().next())
        .map(|(_, _, d)| *d)
}

/// Factor from g/cm³ to `unit`.
pub fn density_factor(unit: &str) -> Result<f64> {
    match unit.trim().to_lowercase().as_str() {
        "g/cm3" | "g/cm³" => Ok(1.0),
        "kg/m3" | "kg/m³" => Ok(1000.0),
        "lb/in3" | "lb/in³" => Ok(0.036127),
        "lb/ft3" | "lb/ft³" => Ok(62.4279),
        other => Err(CemError::UnknownUnit(other.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityResult {
    pub material: String,
    pub density: f64,
    pub unit: String,
    pub base_density_g_cm3: f64,
}

pub fn density_lookup(material: &str, unit: &str) -> Result<DensityResult> {
    let base = find_density(material).ok_or_else(|| CemError::UnknownMaterial(material.to_string()))?;
    let factor = density_factor(unit)?;
    Ok(DensityResult {
        material: material.to_string(),
        density: round_to(base * factor, 4),
        unit: unit.to_string(),
        base_density_g_cm3: base,
    })
}

// --- Material cost ---

/// Factor from `unit` to kilograms.
pub fn mass_to_kg(unit: &str) -> Result<f64> {
    match unit.trim().to_lowercase().as_str() {
        "kg" => Ok(1.0),
        "g" => Ok(0.001),
        "lb" | "lbs" => Ok(0.453592),
        "oz" => Ok(0.0283495),
        "mg" => Ok(0.000001),
        other => Err(CemError::UnknownUnit(other.to_string())),
    }
}

/// Multiplier turning a price quoted per `unit` into a price per kg.
pub fn price_per_kg_factor(unit: &str) -> f64 {
    match unit.trim().to_lowercase().as_str() {
        "lb" => 2.20462,
        "g" => 1000.0,
        // Volume units assume water density; callers should prefer density_lookup.
        "m3" => 0.001,
        "cm3" => 1_000_000.0,
        _ => 1.0,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialCost {
    pub material: String,
    pub quantity: f64,
    pub unit: String,
    pub quantity_kg: f64,
    pub price_per_kg: f64,
    pub total_cost: f64,
    pub calculation: String,
}

pub fn material_cost(material: &str, quantity: f64, unit: &str, price_per_kg: f64) -> Result<MaterialCost> {
    if !quantity.is_finite() || quantity < 0.0 {
        return Err(CemError::InvalidSpec(format!("quantity must be non-negative, got {quantity}")));
    }
    let quantity_kg = quantity * mass_to_kg(unit)?;
    let total = quantity_kg * price_per_kg;
    Ok(MaterialCost {
        material: material.to_string(),
        quantity,
        unit: unit.to_string(),
        quantity_kg: round_to(quantity_kg, 4),
        price_per_kg: round_cents(price_per_kg),
        total_cost: round_cents(total),
        calculation: format!("{quantity_kg:.4} kg × ${price_per_kg}/kg = ${total:.2}"),
    })
}

// --- Manufacturing cost ---

/// (method, base $/g, setup $)
const COST_MODELS: &[(&str, f64, f64)] = &[
    ("FDM", 0.05, 10.0),
    ("SLA", 0.08, 15.0),
    ("SLS", 0.10, 20.0),
    ("DMLS", 0.80, 50.0),
    ("SLM", 1.20, 75.0),
    ("CNC", 0.40, 30.0),
    ("Machining", 0.35, 25.0),
    ("Casting", 0.15, 100.0),
    ("Forging", 0.25, 150.0),
    ("Sheet_Metal", 0.20, 40.0),
];

const POST_PROCESSING: &[(&str, f64)] = &[
    ("none", 0.0),
    ("light_sanding", 15.0),
    ("polishing", 30.0),
    ("anodizing", 50.0),
    ("plating", 75.0),
    ("painting", 40.0),
    ("heat_treatment", 100.0),
    ("assembly", 75.0),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    #[default]
    Moderate,
    Complex,
}

impl Complexity {
    pub fn multiplier(&self) -> f64 {
        match self {
            Complexity::Simple => 1.0,
            Complexity::Moderate => 1.5,
            Complexity::Complex => 2.5,
        }
    }

    /// Unknown names fall back to `Moderate`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "simple" => Complexity::Simple,
            "complex" => Complexity::Complex,
            _ => Complexity::Moderate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManufacturingEstimate {
    pub method: String,
    pub material: String,
    pub weight_g: f64,
    pub complexity: Complexity,
    pub base_cost_per_g: f64,
    pub complexity_multiplier: f64,
    pub setup_cost: f64,
    pub manufacturing_cost: f64,
    pub post_processing_cost: f64,
    pub total_cost: f64,
}

/// Method lookup is case-insensitive; `hybrid` prices as FDM.
fn cost_model(method: &str) -> Option<(&'static str, f64, f64)> {
    let key = if method.eq_ignore_ascii_case("hybrid") { "FDM" } else { method.trim() };
    COST_MODELS
        .iter()
        .copied()
        .find(|(m, _, _)| m.eq_ignore_ascii_case(key))
}

pub fn estimate_manufacturing_cost(
    method: &str,
    material: &str,
    weight_g: f64,
    complexity: Complexity,
    post_processing: Option<&str>,
) -> Result<ManufacturingEstimate> {
    let (name, per_g, setup) =
        cost_model(method).ok_or_else(|| CemError::UnknownMethod(method.to_string()))?;
    if !weight_g.is_finite() || weight_g < 0.0 {
        return Err(CemError::InvalidSpec(format!("weight must be non-negative, got {weight_g}")));
    }
    let manufacturing = per_g * weight_g * complexity.multiplier() + setup;
    let post = post_processing
        .map(|p| p.trim().to_lowercase())
        .and_then(|p| POST_PROCESSING.iter().find(|(k, _)| *k == p).map(|(_, c)| *c))
        .unwrap_or(0.0);
    Ok(ManufacturingEstimate {
        method: name.to_string(),
        material: material.to_string(),
        weight_g,
        complexity,
        base_cost_per_g: per_g,
        complexity_multiplier: complexity.multiplier(),
        setup_cost: setup,
        manufacturing_cost: round_cents(manufacturing),
        post_processing_cost: post,
        total_cost: round_cents(manufacturing + post),
    })
}

// --- Currency ---

/// Units of each currency per US dollar.
pub const EXCHANGE_RATES: &[(&str, f64)] = &[
    ("USD", 1.0),
    ("EUR", 0.92),
    ("GBP", 0.79),
    ("JPY", 149.50),
    ("CNY", 7.08),
    ("INR", 83.12),
    ("CAD", 1.36),
    ("AUD", 1.52),
    ("CHF", 0.88),
    ("SGD", 1.34),
    ("HKD", 7.81),
    ("NZD", 1.69),
    ("MXN", 17.05),
    ("BRL", 4.97),
];

fn rate(code: &str) -> Result<f64> {
    EXCHANGE_RATES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, r)| *r)
        .ok_or_else(|| CemError::UnknownCurrency(code.to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyConversion {
    pub from_amount: f64,
    pub from_currency: String,
    pub to_amount: f64,
    pub to_currency: String,
    pub exchange_rate: f64,
}

/// Convert through USD using the fixed rate table.
pub fn convert_currency(amount: f64, from: &str, to: &str) -> Result<CurrencyConversion> {
    let from = from.trim().to_ascii_uppercase();
    let to = to.trim().to_ascii_uppercase();
    let from_rate = rate(&from)?;
    let to_rate = rate(&to)?;
    let converted = amount / from_rate * to_rate;
    Ok(CurrencyConversion {
        from_amount: amount,
        from_currency: from,
        to_amount: round_cents(converted),
        to_currency: to,
        exchange_rate: round_to(to_rate / from_rate, 4),
    })
}
