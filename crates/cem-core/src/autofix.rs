//! Automatic repair of specifications that fail validation.

use serde::{Deserialize, Serialize};

use crate::catalog;
use crate::materials;
use crate::physics::{self, ValidationReport};
use crate::spec::{ComponentKind, DesignSpecification};

pub const MAX_FIX_ITERATIONS: usize = 3;
pub const DIMENSION_SCALE: f64 = 1.3;
/// Servo assigned to unnamed servo requests when the structure is marginal.
pub const DEFAULT_SERVO_MPN: &str = "MG996R";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FixAction {
    ScaleDimensions { factor: f64 },
    UpgradeMaterial { from: String, to: String },
    AssignServo { name: String, mpn: String },
}

/// Return a repaired copy of `spec` and the actions taken.
///
/// Structural errors grow the geometry and step the material up the
/// upgrade path; thermal errors step the material again; structural
/// warnings give unnamed servos a concrete part.
pub fn propose_fixes(
    spec: &DesignSpecification,
    report: &ValidationReport,
) -> (DesignSpecification, Vec<FixAction>) {
    let mut fixed = spec.clone();
    let mut actions = Vec::new();

    if !report.structural.errors.is_empty() {
        fixed.dimensions.scale(DIMENSION_SCALE);
        if let Some(req) = fixed.requirements.as_mut()
            && let Some(wall) = req.wall_thickness_mm.as_mut()
        {
            *wall *= DIMENSION_SCALE;
        }
        actions.push(FixAction::ScaleDimensions {
            factor: DIMENSION_SCALE,
        });
        actions.extend(upgrade_material(&mut fixed));
    }
    if !report.thermal.errors.is_empty() {
        actions.extend(upgrade_material(&mut fixed));
    }
    if !report.structural.warnings.is_empty() {
        let price = catalog::local_price(DEFAULT_SERVO_MPN);
        for c in fixed
            .components
            .iter_mut()
            .filter(|c| c.kind == ComponentKind::Servo && c.mpn.is_none())
        {
            c.mpn = Some(DEFAULT_SERVO_MPN.to_string());
            c.estimated_cost = price;
            actions.push(FixAction::AssignServo {
                name: c.name.clone(),
                mpn: DEFAULT_SERVO_MPN.to_string(),
            });
        }
    }
    (fixed, actions)
}

fn upgrade_material(spec: &mut DesignSpecification) -> Option<FixAction> {
    let from = spec.primary_material().to_string();
    let to = materials::next_upgrade(&from)?;
    spec.materials = vec![to.to_string()];
    Some(FixAction::UpgradeMaterial {
        from,
        to: to.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoFixOutcome {
    pub specification: DesignSpecification,
    /// Report for the final specification.
    pub report: ValidationReport,
    /// Number of fix rounds applied, at most `MAX_FIX_ITERATIONS`.
    pub iterations: usize,
    pub actions: Vec<FixAction>,
}

/// Validate, repairing up to `MAX_FIX_ITERATIONS` times until structural and
/// thermal checks pass. Stops early when a round changes nothing.
pub fn validate_with_fixes(spec: DesignSpecification) -> AutoFixOutcome {
    let mut spec = spec;
    let mut report = physics::validate(&spec);
    let mut iterations = 0;
    let mut actions = Vec::new();

    while iterations < MAX_FIX_ITERATIONS && !report.structurally_and_thermally_valid() {
        let (fixed, applied) = propose_fixes(&spec, &report);
        if applied.is_empty() {
            break;
        }
        iterations += 1;
        actions.extend(applied);
        spec = fixed;
        report = physics::validate(&spec);
    }

    AutoFixOutcome {
        specification: spec,
        report,
        iterations,
        actions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::CheckResult;
    use crate::spec::{ComponentRequest, DeviceType, Environment};

    fn failing(structural: bool, thermal: bool) -> ValidationReport {
        let check = |fail: bool| CheckResult {
            valid: !fail,
            errors: if fail { vec!["x".into()] } else { Vec::new() },
            warnings: Vec::new(),
        };
        ValidationReport {
            structural: check(structural),
            thermal: check(thermal),
            manufacturing: CheckResult::default(),
        }
    }

    #[test]
    fn test_structural_fix_scales_and_upgrades() {
        let mut spec = DesignSpecification::new(DeviceType::RobotArm);
        spec.dimensions.reach_mm = Some(100.0);
        let (fixed, actions) = propose_fixes(&spec, &failing(true, false));
        assert_eq!(fixed.dimensions.reach_mm, Some(130.0));
        assert_eq!(fixed.materials, vec!["Carbon_Fiber_PLA"]);
        assert_eq!(actions.len(), 2);
    }

    #[test]
    fn test_structural_and_thermal_step_twice() {
        let spec = DesignSpecification::new(DeviceType::RobotArm);
        let (fixed, _) = propose_fixes(&spec, &failing(true, true));
        assert_eq!(fixed.materials, vec!["Nylon"]);
    }

    #[test]
    fn test_warning_assigns_servo() {
        let mut spec = DesignSpecification::new(DeviceType::Gripper);
        spec.components
            .push(ComponentRequest::new(ComponentKind::Servo, "jaw", 1));
        let mut report = ValidationReport::default();
        report.structural.warnings.push("marginal".into());
        let (fixed, actions) = propose_fixes(&spec, &report);
        assert_eq!(fixed.components[0].mpn.as_deref(), Some("MG996R"));
        assert_eq!(fixed.components[0].estimated_cost, Some(8.50));
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn test_hot_environment_converges() {
        let mut spec = DesignSpecification::new(DeviceType::Custom);
        spec.environment = Some(Environment {
            temp_max_c: Some(150.0),
            ..Default::default()
        });
        let out = validate_with_fixes(spec);
        // PLA → CF-PLA → Nylon (178 °C)
        assert_eq!(out.specification.materials, vec!["Nylon"]);
        assert_eq!(out.iterations, 2);
        assert!(out.report.thermal.valid);
    }

    #[test]
    fn test_loop_is_bounded() {
        let mut spec = DesignSpecification::new(DeviceType::Custom);
        spec.environment = Some(Environment {
            temp_max_c: Some(5000.0),
            ..Default::default()
        });
        let out = validate_with_fixes(spec);
        assert!(out.iterations <= MAX_FIX_ITERATIONS);
        assert!(!out.report.thermal.valid);
    }

    #[test]
    fn test_valid_spec_untouched() {
        let spec = DesignSpecification::new(DeviceType::Custom);
        let out = validate_with_fixes(spec.clone());
        assert_eq!(out.iterations, 0);
        assert_eq!(out.specification, spec);
    }
}
