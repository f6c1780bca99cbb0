//! Bill of materials: printed or machined body, sourced parts, fasteners,
//! with shipping and tax estimates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::costing::{self, Complexity, round_cents};
use crate::materials;
use crate::sourcing::SourcingSummary;
use crate::spec::DesignSpecification;
use crate::time;

pub const SHIPPING_RATE: f64 = 0.05;
pub const TAX_RATE: f64 = 0.08;
/// Unit cost for parts with no live, catalog or estimated price.
pub const FALLBACK_PART_COST: f64 = 5.00;
pub const DEFAULT_HARDWARE_COST: f64 = 0.10;

/// Printed volume throughput, cm³ per hour.
const PRINT_RATE_CM3_PER_H: f64 = 10.0;
const MACHINE_COST_PER_H: f64 = 0.10;
const PRINTER_KW: f64 = 0.12;
const ENERGY_COST_PER_KWH: f64 = 0.15;
const LABOR_SETUP_H: f64 = 0.5;
const LABOR_SUPERVISION: f64 = 0.1;
const LABOR_COST_PER_H: f64 = 25.0;
const DEFAULT_DENSITY: f64 = 1.25;
const DEFAULT_COST_PER_KG: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintingCost {
    pub material: String,
    pub volume_cm3: f64,
    pub solid_mass_g: f64,
    pub actual_mass_g: f64,
    pub infill_percent: f64,
    pub material_cost_usd: f64,
    pub machine_cost_usd: f64,
    pub energy_cost_usd: f64,
    pub labor_cost_usd: f64,
    pub total_cost_usd: f64,
    pub print_time_hours: f64,
}

/// Cost of printing `volume_cm3` of `material` at `infill_percent`.
pub fn printing_cost(volume_cm3: f64, material: &str, infill_percent: f64) -> PrintingCost {
    let volume_cm3 = volume_cm3.max(0.0);
    let props = materials::lookup(material);
    let density = props.map_or(DEFAULT_DENSITY, |m| m.density);
    let cost_per_kg = props.map_or(DEFAULT_COST_PER_KG, |m| m.cost_per_kg);

    let solid_mass_g = volume_cm3 * density;
    let actual_mass_g = solid_mass_g * infill_percent / 100.0;
    let material_cost = actual_mass_g / 1000.0 * cost_per_kg;
    let hours = volume_cm3 / PRINT_RATE_CM3_PER_H;
    let machine = hours * MACHINE_COST_PER_H;
    let energy = hours * PRINTER_KW * ENERGY_COST_PER_KWH;
    let labor = (LABOR_SETUP_H + hours * LABOR_SUPERVISION) * LABOR_COST_PER_H;
    let total = material_cost + machine + energy + labor;

    PrintingCost {
        material: props.map_or(material, |m| m.name).to_string(),
        volume_cm3,
        solid_mass_g,
        actual_mass_g,
        infill_percent,
        material_cost_usd: round_cents(material_cost),
        machine_cost_usd: round_cents(machine),
        energy_cost_usd: round_cents(energy),
        labor_cost_usd: round_cents(labor),
        total_cost_usd: round_cents(total),
        print_time_hours: (hours * 10.0).round() / 10.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BomCategory {
    #[serde(rename = "3D Printed Parts")]
    PrintedParts,
    #[serde(rename = "Machined Parts")]
    MachinedParts,
    #[serde(rename = "Electronic Components")]
    Electronics,
    Hardware,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomItem {
    pub category: BomCategory,
    pub item: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mpn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specification: Option<String>,
    pub quantity: u32,
    pub unit_cost_usd: f64,
    pub total_cost_usd: f64,
    pub supplier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mass_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub printing: Option<PrintingCost>,
}

impl BomItem {
    fn new(category: BomCategory, item: impl Into<String>, quantity: u32, unit_cost: f64, supplier: &str) -> Self {
        Self {
            category,
            item: item.into(),
            mpn: None,
            specification: None,
            quantity,
            unit_cost_usd: unit_cost,
            total_cost_usd: round_cents(unit_cost * f64::from(quantity)),
            supplier: supplier.to_string(),
            mass_g: None,
            printing: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomSummary {
    pub subtotal_usd: f64,
    pub shipping_usd: f64,
    pub tax_usd: f64,
    pub total_usd: f64,
    pub item_count: usize,
    pub total_weight_g: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bom {
    pub items: Vec<BomItem>,
    pub summary: BomSummary,
    pub currency: String,
    pub generated_at: String,
}

/// Totals in whole cents so `total == subtotal + shipping + tax` holds exactly.
pub fn summarize(items: &[BomItem]) -> BomSummary {
    let to_cents = |v: f64| (v * 100.0).round() as i64;
    let subtotal: i64 = items.iter().map(|i| to_cents(i.total_cost_usd)).sum();
    let shipping = (subtotal as f64 * SHIPPING_RATE).round() as i64;
    let tax = (subtotal as f64 * TAX_RATE).round() as i64;
    let total = subtotal + shipping + tax;
    BomSummary {
        subtotal_usd: subtotal as f64 / 100.0,
        shipping_usd: shipping as f64 / 100.0,
        tax_usd: tax as f64 / 100.0,
        total_usd: total as f64 / 100.0,
        item_count: items.len(),
        total_weight_g: items.iter().filter_map(|i| i.mass_g).sum(),
    }
}

fn body_item(spec: &DesignSpecification, volume_cm3: f64) -> BomItem {
    let material = spec.primary_material();
    let method = spec.manufacturing_method();
    let name = spec.device_type.as_str();
    if method.is_additive() {
        let cost = printing_cost(volume_cm3, material, spec.infill_percent());
        let mut item = BomItem::new(
            BomCategory::PrintedParts,
            name,
            1,
            cost.total_cost_usd,
            "In-house/Service Bureau",
        );
        item.specification = Some(format!("{} {}", cost.material, method));
        item.mass_g = Some(cost.actual_mass_g);
        item.printing = Some(cost);
        return item;
    }

    let props = materials::lookup(material);
    let mass_g = volume_cm3.max(0.0) * props.map_or(DEFAULT_DENSITY, |m| m.density);
    let stock = mass_g / 1000.0 * props.map_or(DEFAULT_COST_PER_KG, |m| m.cost_per_kg);
    // CNC is always a known cost model.
    let machining = costing::estimate_manufacturing_cost(
        method.as_str(),
        material,
        mass_g,
        Complexity::Moderate,
        None,
    )
    .map_or(0.0, |e| e.total_cost);
    let mut item = BomItem::new(
        BomCategory::MachinedParts,
        name,
        1,
        round_cents(stock + machining),
        "Machine Shop",
    );
    item.specification = Some(format!("{} {}", props.map_or(material, |m| m.name), method));
    item.mass_g = Some(mass_g);
    item
}

/// Assemble the bill of materials.
///
/// `volume_cm3` is the body volume (from the STL when one was produced);
/// `None` omits the body line. `live_prices` maps MPN to a fetched unit price
/// and overrides catalog and estimated prices.
pub fn generate_bom(
    spec: &DesignSpecification,
    volume_cm3: Option<f64>,
    sourcing: &SourcingSummary,
    live_prices: &BTreeMap<String, f64>,
) -> Bom {
    let mut items = Vec::new();

    if let Some(volume) = volume_cm3.filter(|v| *v > 0.0) {
        items.push(body_item(spec, volume));
    }

    for part in &sourcing.parts {
        let live = live_prices.get(&part.mpn).copied();
        let supplier = if live.is_some() { "Web search" } else { part.supplier.as_str() };
        let mut item = BomItem::new(
            BomCategory::Electronics,
            &part.name,
            part.quantity,
            live.unwrap_or(part.unit_price_usd),
            supplier,
        );
        item.mpn = Some(part.mpn.clone());
        items.push(item);
    }

    for request in &sourcing.unresolved {
        let live = request.mpn.as_ref().and_then(|m| live_prices.get(m)).copied();
        let (cost, supplier) = match live {
            Some(p) => (p, "Web search"),
            None => (request.estimated_cost.unwrap_or(FALLBACK_PART_COST), "TBD"),
        };
        let mut item = BomItem::new(BomCategory::Electronics, &request.name, request.quantity, cost, supplier);
        item.mpn = request.mpn.clone();
        items.push(item);
    }

    for hw in &sourcing.hardware {
        let mut item = BomItem::new(
            BomCategory::Hardware,
            &hw.name,
            hw.quantity,
            hw.unit_cost.unwrap_or(DEFAULT_HARDWARE_COST),
            "McMaster-Carr / Fastenal",
        );
        item.specification = (!hw.spec.is_empty()).then(|| hw.spec.clone());
        items.push(item);
    }

    let summary = summarize(&items);
    Bom {
        items,
        summary,
        currency: "USD".into(),
        generated_at: time::now_iso8601(),
    }
}
