//! Component sourcing: turn a specification into concrete catalog parts.

use serde::{Deserialize, Serialize};

use crate::catalog::{self, CatalogEntry, ComponentPart};
use crate::spec::{ComponentKind, ComponentRequest, DesignSpecification, DeviceType, HardwareItem};

/// Jaw lever used for gripper torque when no length is given, in cm.
pub const DEFAULT_JAW_LEVER_CM: f64 = 5.0;
/// Grip force margin over the payload weight.
pub const GRIP_MARGIN: f64 = 1.5;
/// Lower bound on payload for sizing, so unloaded joints still get a motor.
const MIN_SIZING_PAYLOAD_KG: f64 = 0.1;
const SCREW_UNIT_COST: f64 = 0.10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcingSummary {
    pub parts: Vec<ComponentPart>,
    /// Requests naming a part number the catalog does not carry.
    pub unresolved: Vec<ComponentRequest>,
    pub hardware: Vec<HardwareItem>,
    pub total_cost: f64,
    pub max_lead_time_days: u32,
    pub warnings: Vec<String>,
}

impl SourcingSummary {
    fn push_part(&mut self, part: ComponentPart) {
        if let Some(existing) = self.parts.iter_mut().find(|p| p.mpn == part.mpn) {
            existing.quantity += part.quantity;
        } else {
            self.parts.push(part);
        }
    }

    fn has_kind(&self, kind: ComponentKind) -> bool {
        self.parts.iter().any(|p| p.category == kind)
            || self.unresolved.iter().any(|r| r.kind == kind)
    }

    fn finish(mut self) -> Self {
        self.total_cost = self.parts.iter().map(ComponentPart::line_total).sum();
        self.max_lead_time_days = self.parts.iter().map(|p| p.lead_time_days).max().unwrap_or(0);
        self
    }
}

/// Torque one actuator must deliver for this device, in kg·cm.
pub fn required_torque_kg_cm(spec: &DesignSpecification) -> f64 {
    let payload = spec.payload_kg().max(MIN_SIZING_PAYLOAD_KG);
    let dims = &spec.dimensions;
    match spec.device_type {
        DeviceType::RobotArm => {
            let reach_cm = dims.reach_mm.or(dims.length_mm).unwrap_or(300.0) / 10.0;
            payload * reach_cm * spec.safety_factor()
        }
        DeviceType::Gripper => {
            let lever_cm = dims.length_mm.map_or(DEFAULT_JAW_LEVER_CM, |l| l / 10.0);
            payload * GRIP_MARGIN * lever_cm
        }
        DeviceType::PanTilt => {
            // Tilt axis carries the payload at half the head height.
            let arm_cm = dims.height_mm.unwrap_or(80.0) / 20.0;
            payload * arm_cm * spec.safety_factor()
        }
        DeviceType::LinearActuator | DeviceType::Custom => 0.0,
    }
}

/// Cheapest motor of `kind` meeting `required`, or the strongest with a warning.
fn size_motor(
    kind: ComponentKind,
    required: f64,
    warnings: &mut Vec<String>,
) -> Option<&'static CatalogEntry> {
    let candidates = catalog::by_kind(kind);
    if let Some(fit) = candidates
        .iter()
        .find(|e| e.torque_kg_cm.is_some_and(|t| t >= required))
    {
        return Some(*fit);
    }
    let strongest = candidates
        .into_iter()
        .max_by(|a, b| a.torque_kg_cm.unwrap_or(0.0).total_cmp(&b.torque_kg_cm.unwrap_or(0.0)))?;
    warnings.push(format!(
        "no {} in catalog meets {:.1} kg·cm; using strongest available {} ({:.1} kg·cm)",
        kind.as_str(),
        required,
        strongest.name,
        strongest.torque_kg_cm.unwrap_or(0.0)
    ));
    Some(strongest)
}

/// Resolve explicit requests and derive the components the device needs.
pub fn source_components(spec: &DesignSpecification) -> SourcingSummary {
    let mut summary = SourcingSummary {
        parts: Vec::new(),
        unresolved: Vec::new(),
        hardware: Vec::new(),
        total_cost: 0.0,
        max_lead_time_days: 0,
        warnings: Vec::new(),
    };
    let required = required_torque_kg_cm(spec);

    for request in &spec.components {
        let entry = request
            .mpn
            .as_deref()
            .and_then(catalog::find)
            .or_else(|| catalog::find(&request.name));
        match entry {
            Some(entry) => summary.push_part(entry.to_part(request.quantity)),
            None if request.mpn.is_some() => {
                summary.warnings.push(format!(
                    "part {} is not in the catalog; price must be looked up",
                    request.mpn.as_deref().unwrap_or_default()
                ));
                summary.unresolved.push(request.clone());
            }
            None => match request.kind {
                ComponentKind::Servo | ComponentKind::Stepper => {
                    if let Some(e) = size_motor(request.kind, required, &mut summary.warnings) {
                        summary.push_part(e.to_part(request.quantity));
                    }
                }
                ComponentKind::Bearing => {
                    if let Some(e) = catalog::by_kind(ComponentKind::Bearing).first() {
                        summary.push_part(e.to_part(request.quantity));
                    }
                }
                _ => summary.unresolved.push(request.clone()),
            },
        }
    }

    let dof = spec.motion.dof.unwrap_or(1).max(1);
    let derived: &[(ComponentKind, u32)] = match spec.device_type {
        DeviceType::RobotArm => &[(ComponentKind::Servo, dof), (ComponentKind::Bearing, dof)],
        DeviceType::Gripper => &[(ComponentKind::Servo, 1)],
        DeviceType::PanTilt => &[(ComponentKind::Servo, 2)],
        DeviceType::LinearActuator => &[(ComponentKind::Stepper, 1), (ComponentKind::Bearing, 2)],
        DeviceType::Custom => &[],
    };
    for &(kind, qty) in derived {
        if summary.has_kind(kind) {
            continue;
        }
        let entry = match kind {
            ComponentKind::Bearing => catalog::by_kind(kind).first().copied(),
            // Linear stages run off a NEMA17 regardless of load.
            ComponentKind::Stepper => catalog::find("NEMA17"),
            _ => size_motor(kind, required, &mut summary.warnings),
        };
        if let Some(entry) = entry {
            summary.push_part(entry.to_part(qty));
        }
    }

    let actuators: u32 = summary
        .parts
        .iter()
        .filter(|p| matches!(p.category, ComponentKind::Servo | ComponentKind::Stepper))
        .map(|p| p.quantity)
        .sum();
    if actuators > 0 || spec.device_type != DeviceType::Custom {
        summary.hardware.push(HardwareItem {
            name: "M3 screw".into(),
            spec: "M3x10 socket head".into(),
            quantity: 8 + 4 * actuators,
            unit_cost: Some(SCREW_UNIT_COST),
        });
        summary.hardware.push(HardwareItem {
            name: "M3 nut".into(),
            spec: "M3 hex".into(),
            quantity: 8 + 4 * actuators,
            unit_cost: Some(SCREW_UNIT_COST),
        });
    }
    summary.hardware.extend(spec.hardware.iter().cloned());

    summary.finish()
}
