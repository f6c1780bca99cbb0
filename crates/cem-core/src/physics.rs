//! First-order physics and manufacturability checks.
//!
//! These are screening calculations (cantilever beam, lever torque, service
//! temperature), not FEA. Units: mm, N, MPa.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::catalog;
use crate::materials;
use crate::rules::rules_for;
use crate::sourcing::{DEFAULT_JAW_LEVER_CM, GRIP_MARGIN};
use crate::spec::{ComponentKind, DesignSpecification, DeviceType, ManufacturingMethod};

pub const GRAVITY: f64 = 9.81;
/// Arm tube wall when none is given, mm.
pub const DEFAULT_ARM_WALL_MM: f64 = 3.0;
/// Servo torque assumed when the servo's rating is unknown, kg·cm.
pub const DEFAULT_SERVO_TORQUE_KG_CM: f64 = 10.0;

const DEFLECTION_ERROR_RATIO: f64 = 0.05;
const DEFLECTION_WARNING_RATIO: f64 = 0.02;
const STRESS_WARNING_RATIO: f64 = 0.8;
const THERMAL_WARNING_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl CheckResult {
    fn new(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub structural: CheckResult,
    pub thermal: CheckResult,
    pub manufacturing: CheckResult,
}

impl ValidationReport {
    /// The auto-fix loop stops once these two pass.
    pub fn structurally_and_thermally_valid(&self) -> bool {
        self.structural.valid && self.thermal.valid
    }

    pub fn all_valid(&self) -> bool {
        self.structurally_and_thermally_valid() && self.manufacturing.valid
    }
}

pub fn validate(spec: &DesignSpecification) -> ValidationReport {
    ValidationReport {
        structural: validate_structural(spec),
        thermal: validate_thermal(spec),
        manufacturing: validate_manufacturing(spec),
    }
}

pub fn validate_structural(spec: &DesignSpecification) -> CheckResult {
    match spec.device_type {
        DeviceType::RobotArm => cantilever_arm(spec),
        DeviceType::Gripper => gripper(spec),
        _ => CheckResult::new(Vec::new(), Vec::new()),
    }
}

/// Hollow round tube of `reach` length loaded by the payload at its tip.
fn cantilever_arm(spec: &DesignSpecification) -> CheckResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let material_name = spec.primary_material();
    let Some(mat) = materials::lookup(material_name) else {
        errors.push(format!("Unknown material: {material_name}"));
        return CheckResult::new(errors, warnings);
    };
    let reach = spec.dimensions.reach_mm.unwrap_or(0.0);
    if reach <= 0.0 {
        return CheckResult::new(errors, warnings);
    }

    let diameter = spec.dimensions.diameter_mm.unwrap_or(reach / 10.0);
    let wall = spec.wall_thickness_mm().unwrap_or(DEFAULT_ARM_WALL_MM);
    let ro = diameter / 2.0;
    let ri = (ro - wall).max(0.0);
    let inertia = PI / 4.0 * (ro.powi(4) - ri.powi(4));
    if inertia <= 0.0 {
        errors.push(format!("Degenerate arm cross-section: diameter {diameter:.1}mm"));
        return CheckResult::new(errors, warnings);
    }

    let force = spec.payload_kg() * GRAVITY;
    let deflection = force * reach.powi(3) / (3.0 * mat.elastic_modulus * inertia);
    if deflection > reach * DEFLECTION_ERROR_RATIO {
        errors.push(format!(
            "Excessive deflection: {deflection:.1}mm ({:.1}% of reach)",
            deflection / reach * 100.0
        ));
    } else if deflection > reach * DEFLECTION_WARNING_RATIO {
        warnings.push(format!("Significant deflection expected: {deflection:.1}mm"));
    }

    let moment = force * reach;
    let stress = moment * ro / inertia;
    let allowable = mat.yield_strength / spec.safety_factor();
    if stress > allowable {
        errors.push(format!(
            "Stress failure: {stress:.1} MPa > allowable {allowable:.1} MPa. \
             Increase diameter, add ribs, or use stronger material."
        ));
    } else if stress > allowable * STRESS_WARNING_RATIO {
        warnings.push(format!("High stress: {stress:.1} MPa (80% of allowable)"));
    }

    CheckResult::new(errors, warnings)
}

fn gripper(spec: &DesignSpecification) -> CheckResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let Some(servo) = spec
        .components
        .iter()
        .find(|c| c.kind == ComponentKind::Servo)
    else {
        warnings.push("No servo specified for gripper actuation".to_string());
        return CheckResult::new(errors, warnings);
    };

    let torque = servo
        .mpn
        .as_deref()
        .and_then(catalog::find)
        .and_then(|e| e.torque_kg_cm)
        .unwrap_or(DEFAULT_SERVO_TORQUE_KG_CM);
    let lever_cm = spec
        .dimensions
        .length_mm
        .map_or(DEFAULT_JAW_LEVER_CM, |l| l / 10.0);
    let grip = torque / lever_cm;
    let required = spec.payload_kg() * GRIP_MARGIN;
    if grip < required {
        errors.push(format!(
            "Insufficient grip force: {grip:.1}kg < required {required:.1}kg. \
             Use stronger servo or increase mechanical advantage."
        ));
    }
    CheckResult::new(errors, warnings)
}

pub fn validate_thermal(spec: &DesignSpecification) -> CheckResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let temp = spec.temp_max_c();
    if let Some(mat) = materials::lookup(spec.primary_material()) {
        if temp > mat.max_temp {
            errors.push(format!(
                "Operating temperature {temp}°C exceeds material limit {}°C. \
                 Use heat-resistant material or add cooling.",
                mat.max_temp
            ));
        } else if temp > mat.max_temp * THERMAL_WARNING_RATIO {
            warnings.push(format!(
                "Operating near material limit: {temp}°C (limit: {}°C)",
                mat.max_temp
            ));
        }
    }
    CheckResult::new(errors, warnings)
}

pub fn validate_manufacturing(spec: &DesignSpecification) -> CheckResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let method = spec.manufacturing_method();
    let rules = rules_for(method);

    if let Some(wall) = spec.wall_thickness_mm()
        && wall < rules.min_wall_thickness_mm()
    {
        errors.push(format!(
            "Wall thickness {wall}mm is below the {method} minimum of {}mm",
            rules.min_wall_thickness_mm()
        ));
    }
    let tolerance = spec.tolerance_mm();
    if tolerance < 0.05 && method == ManufacturingMethod::Fdm {
        warnings.push(format!(
            "Tolerance {tolerance}mm difficult with FDM. Consider SLA or post-machining."
        ));
    }
    if method == ManufacturingMethod::Cnc
        && spec.requirements.as_ref().and_then(|r| r.use_lattice) == Some(true)
    {
        warnings.push("Lattice infill cannot be machined; it will be ignored for CNC".to_string());
    }
    CheckResult::new(errors, warnings)
}
