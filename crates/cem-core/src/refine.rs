//! Goal-driven optimization suggestions for an existing specification.

use serde::{Deserialize, Serialize};

use crate::materials;
use crate::spec::{DesignSpecification, ManufacturingMethod, OptimizationGoal};

/// What a goal prefers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizationRule {
    pub goal: OptimizationGoal,
    /// Preferred materials, best first.
    pub materials: &'static [&'static str],
    pub manufacturing: Option<ManufacturingMethod>,
    pub infill_percent: Option<f64>,
    pub target_volume_reduction: Option<f64>,
    pub safety_factor: Option<f64>,
    pub tolerance_mm: Option<f64>,
}

pub const OPTIMIZATION_RULES: [OptimizationRule; 5] = [
    OptimizationRule {
        goal: OptimizationGoal::Lightweight,
        materials: &["Carbon_Fiber_PLA", "Aluminum_6061", "Titanium_Ti6Al4V"],
        manufacturing: None,
        infill_percent: Some(30.0),
        target_volume_reduction: Some(0.4),
        safety_factor: None,
        tolerance_mm: None,
    },
    OptimizationRule {
        goal: OptimizationGoal::Durable,
        materials: &["Steel_1045", "Titanium_Ti6Al4V"],
        manufacturing: Some(ManufacturingMethod::Cnc),
        infill_percent: None,
        target_volume_reduction: None,
        safety_factor: Some(3.0),
        tolerance_mm: None,
    },
    OptimizationRule {
        goal: OptimizationGoal::CostEffective,
        materials: &["PLA", "ABS", "Aluminum_6061"],
        manufacturing: Some(ManufacturingMethod::Fdm),
        infill_percent: Some(20.0),
        target_volume_reduction: None,
        safety_factor: None,
        tolerance_mm: None,
    },
    OptimizationRule {
        goal: OptimizationGoal::HighPrecision,
        materials: &["Aluminum_6061", "Steel_1045"],
        manufacturing: Some(ManufacturingMethod::Cnc),
        infill_percent: None,
        target_volume_reduction: None,
        safety_factor: None,
        tolerance_mm: Some(0.1),
    },
    OptimizationRule {
        goal: OptimizationGoal::RapidPrototyping,
        materials: &["PLA"],
        manufacturing: Some(ManufacturingMethod::Fdm),
        infill_percent: None,
        target_volume_reduction: None,
        safety_factor: None,
        tolerance_mm: None,
    },
];

pub fn rule_for(goal: OptimizationGoal) -> &'static OptimizationRule {
    OPTIMIZATION_RULES
        .iter()
        .find(|r| r.goal == goal)
        .unwrap_or(&OPTIMIZATION_RULES[0])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialChange {
    pub from: String,
    pub to: String,
    pub benefit: OptimizationGoal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManufacturingChange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<ManufacturingMethod>,
    pub to: ManufacturingMethod,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeometryChange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_lattice: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infill_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_reduction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_factor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance_mm: Option<f64>,
}

impl GeometryChange {
    fn is_empty(&self) -> bool {
        *self == GeometryChange::default()
    }
}

/// Fractional improvements; negative values are regressions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimatedImprovements {
    pub cost_reduction_percent: f64,
    pub weight_reduction_percent: f64,
    pub manufacturing_time_reduction_percent: f64,
}

impl EstimatedImprovements {
    pub fn for_goal(goal: OptimizationGoal) -> Self {
        use OptimizationGoal::*;
        let (cost, weight, time) = match goal {
            CostEffective => (0.35, 0.15, 0.30),
            Lightweight => (0.20, 0.40, 0.10),
            Durable => (-0.15, 0.05, -0.20),
            HighPrecision => (-0.25, 0.0, -0.30),
            RapidPrototyping => (0.0, 0.0, 0.60),
        };
        Self {
            cost_reduction_percent: cost,
            weight_reduction_percent: weight,
            manufacturing_time_reduction_percent: time,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSuggestions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<OptimizationGoal>,
    pub material_changes: Vec<MaterialChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturing_change: Option<ManufacturingChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry_change: Option<GeometryChange>,
    pub estimated_improvements: EstimatedImprovements,
}

impl OptimizationSuggestions {
    pub fn is_empty(&self) -> bool {
        self.material_changes.is_empty()
            && self.manufacturing_change.is_none()
            && self.geometry_change.is_none()
    }
}

/// Suggest changes that move `spec` toward `goal`. No goal, no suggestions.
pub fn suggest_optimizations(
    spec: &DesignSpecification,
    goal: Option<OptimizationGoal>,
) -> OptimizationSuggestions {
    let Some(goal) = goal else {
        return OptimizationSuggestions::default();
    };
    let rule = rule_for(goal);
    let current = materials::canonical_name(spec.primary_material())
        .unwrap_or(spec.primary_material())
        .to_string();

    let material_changes = if rule.materials.contains(&current.as_str()) {
        Vec::new()
    } else {
        rule.materials
            .iter()
            .map(|m| MaterialChange {
                from: current.clone(),
                to: m.to_string(),
                benefit: goal,
            })
            .collect()
    };

    let manufacturing_change = rule
        .manufacturing
        .filter(|m| spec.manufacturing != Some(*m))
        .map(|to| ManufacturingChange {
            from: spec.manufacturing,
            to,
            reason: format!("Better for {goal}"),
        });

    let geometry = GeometryChange {
        use_lattice: (goal == OptimizationGoal::Lightweight).then_some(true),
        infill_percent: rule.infill_percent,
        target_reduction: rule.target_volume_reduction,
        safety_factor: rule.safety_factor,
        tolerance_mm: rule.tolerance_mm,
    };

    OptimizationSuggestions {
        goal: Some(goal),
        material_changes,
        manufacturing_change,
        geometry_change: (!geometry.is_empty()).then_some(geometry),
        estimated_improvements: EstimatedImprovements::for_goal(goal),
    }
}

/// Apply the first material change, the manufacturing change and any
/// geometry changes.
pub fn apply_suggestions(
    spec: &DesignSpecification,
    suggestions: &OptimizationSuggestions,
) -> DesignSpecification {
    let mut updated = spec.clone();
    if let Some(change) = suggestions.material_changes.first() {
        updated.materials = vec![change.to.clone()];
    }
    if let Some(change) = &suggestions.manufacturing_change {
        updated.manufacturing = Some(change.to);
    }
    if let Some(geometry) = &suggestions.geometry_change {
        let req = updated.requirements_mut();
        if geometry.use_lattice.is_some() {
            req.use_lattice = geometry.use_lattice;
        }
        if geometry.infill_percent.is_some() {
            req.infill_percent = geometry.infill_percent;
        }
        if geometry.safety_factor.is_some() {
            req.safety_factor = geometry.safety_factor;
        }
        if geometry.tolerance_mm.is_some() {
            req.tolerance_mm = geometry.tolerance_mm;
        }
    }
    if let Some(goal) = suggestions.goal
        && !updated.has_goal(goal)
    {
        updated.optimization_goals.insert(0, goal);
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::DeviceType;

    #[test]
    fn test_no_goal_no_suggestions() {
        let spec = DesignSpecification::new(DeviceType::Gripper);
        let s = suggest_optimizations(&spec, None);
        assert!(s.is_empty());
        assert_eq!(s.estimated_improvements, EstimatedImprovements::default());
    }

    #[test]
    fn test_lightweight_suggests_lattice_and_composites() {
        let spec = DesignSpecification::new(DeviceType::RobotArm);
        let s = suggest_optimizations(&spec, Some(OptimizationGoal::Lightweight));
        assert_eq!(s.material_changes[0].to, "Carbon_Fiber_PLA");
        assert_eq!(s.material_changes[0].from, "PLA");
        let g = s.geometry_change.as_ref().unwrap();
        assert_eq!(g.use_lattice, Some(true));
        assert_eq!(g.infill_percent, Some(30.0));
        assert!(s.manufacturing_change.is_none());
        assert_eq!(s.estimated_improvements.weight_reduction_percent, 0.40);
    }

    #[test]
    fn test_already_preferred_material_kept() {
        let mut spec = DesignSpecification::new(DeviceType::Custom);
        spec.materials = vec!["pla".into()];
        spec.manufacturing = Some(ManufacturingMethod::Fdm);
        let s = suggest_optimizations(&spec, Some(OptimizationGoal::RapidPrototyping));
        assert!(s.material_changes.is_empty());
        assert!(s.manufacturing_change.is_none());
    }

    #[test]
    fn test_apply_durable() {
        let spec = DesignSpecification::new(DeviceType::RobotArm);
        let s = suggest_optimizations(&spec, Some(OptimizationGoal::Durable));
        let updated = apply_suggestions(&spec, &s);
        assert_eq!(updated.materials, vec!["Steel_1045"]);
        assert_eq!(updated.manufacturing, Some(ManufacturingMethod::Cnc));
        assert_eq!(updated.safety_factor(), 3.0);
        assert_eq!(updated.primary_goal(), Some(OptimizationGoal::Durable));
    }
}
