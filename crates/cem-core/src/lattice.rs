//! Lattice infill parameters for the primary body.

use serde::{Deserialize, Serialize};

use crate::rules::{LATTICE_CELL_SIZE_MAX_MM, LATTICE_CELL_SIZE_MIN_MM, beam_thickness_rule};
use crate::shapes::BaseShape;
use crate::spec::{DesignSpecification, ManufacturingMethod, OptimizationGoal};

/// Payload above which a lattice is graded toward the boundary.
pub const HIGH_LOAD_KG: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatticeKind {
    Regular,
    Conformal,
    Gradient,
}

impl LatticeKind {
    pub fn weight_reduction(&self) -> f64 {
        match self {
            LatticeKind::Regular => 0.25,
            LatticeKind::Conformal => 0.30,
            LatticeKind::Gradient => 0.20,
        }
    }

    fn subsampling(&self) -> u32 {
        match self {
            LatticeKind::Gradient => 8,
            _ => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeParams {
    pub kind: LatticeKind,
    pub cell_size_mm: f64,
    pub beam_thickness_mm: f64,
    /// Gradient lattices only: beam thickness range from core to boundary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_beam_thickness_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_beam_thickness_mm: Option<f64>,
    /// Conformal lattices only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cells_per_dimension: Option<u32>,
    pub subsampling: u32,
    pub estimated_weight_reduction: f64,
}

/// Whether the specification asks for lattice infill at all.
pub fn lattice_enabled(spec: &DesignSpecification) -> bool {
    let explicit = spec.requirements.as_ref().and_then(|r| r.use_lattice);
    explicit.unwrap_or(false) || (explicit.is_none() && spec.has_goal(OptimizationGoal::Lightweight))
}

/// Size an infill lattice for `shape`, or `None` when none is wanted.
pub fn calculate_lattice(spec: &DesignSpecification, shape: &BaseShape) -> Option<LatticeParams> {
    if !lattice_enabled(spec) || spec.manufacturing_method() == ManufacturingMethod::Cnc {
        return None;
    }
    let kind = if spec.has_goal(OptimizationGoal::Durable) || spec.payload_kg() > HIGH_LOAD_KG {
        LatticeKind::Gradient
    } else if shape.is_curved() {
        LatticeKind::Conformal
    } else {
        LatticeKind::Regular
    };

    let cell = (shape.min_extent() / 4.0).clamp(LATTICE_CELL_SIZE_MIN_MM, LATTICE_CELL_SIZE_MAX_MM);
    let rule = beam_thickness_rule(spec.manufacturing_method());
    let beam = (cell * 0.1).clamp(rule.minimum_mm, rule.maximum_mm);

    let (min_beam, max_beam) = match kind {
        LatticeKind::Gradient => (
            Some(rule.minimum_mm.max(beam * 0.75)),
            Some((beam * 2.0).min(rule.maximum_mm)),
        ),
        _ => (None, None),
    };
    let cells_per_dimension = match kind {
        LatticeKind::Conformal => Some(((shape.min_extent() / cell).round() as u32).max(1)),
        _ => None,
    };

    Some(LatticeParams {
        kind,
        cell_size_mm: cell,
        beam_thickness_mm: beam,
        min_beam_thickness_mm: min_beam,
        max_beam_thickness_mm: max_beam,
        cells_per_dimension,
        subsampling: kind.subsampling(),
        estimated_weight_reduction: kind.weight_reduction(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::DeviceType;
    use approx::assert_relative_eq;

    fn lightweight() -> DesignSpecification {
        let mut spec = DesignSpecification::new(DeviceType::Custom);
        spec.optimization_goals.push(OptimizationGoal::Lightweight);
        spec
    }

    #[test]
    fn test_disabled_without_request() {
        let spec = DesignSpecification::new(DeviceType::Custom);
        let shape = BaseShape::Box { length: 100.0, width: 100.0, height: 100.0 };
        assert!(calculate_lattice(&spec, &shape).is_none());
    }

    #[test]
    fn test_explicit_false_overrides_goal() {
        let mut spec = lightweight();
        spec.requirements_mut().use_lattice = Some(false);
        assert!(!lattice_enabled(&spec));
    }

    #[test]
    fn test_regular_sizing() {
        let shape = BaseShape::Box { length: 200.0, width: 120.0, height: 80.0 };
        let p = calculate_lattice(&lightweight(), &shape).unwrap();
        assert_eq!(p.kind, LatticeKind::Regular);
        assert_relative_eq!(p.cell_size_mm, 20.0);
        assert_relative_eq!(p.beam_thickness_mm, 2.0);
        assert_eq!(p.subsampling, 5);
        assert_relative_eq!(p.estimated_weight_reduction, 0.25);
    }

    #[test]
    fn test_cell_and_beam_clamped() {
        let small = BaseShape::Box { length: 8.0, width: 8.0, height: 8.0 };
        let p = calculate_lattice(&lightweight(), &small).unwrap();
        assert_relative_eq!(p.cell_size_mm, LATTICE_CELL_SIZE_MIN_MM);
        // 0.5 mm is under the FDM minimum beam
        assert_relative_eq!(p.beam_thickness_mm, 0.8);

        let mut spec = lightweight();
        spec.manufacturing = Some(ManufacturingMethod::Sla);
        let p = calculate_lattice(&spec, &small).unwrap();
        assert_relative_eq!(p.beam_thickness_mm, 0.5);
    }

    #[test]
    fn test_cnc_never_gets_lattice() {
        let mut spec = lightweight();
        spec.manufacturing = Some(ManufacturingMethod::Cnc);
        let shape = BaseShape::Box { length: 100.0, width: 100.0, height: 100.0 };
        assert!(calculate_lattice(&spec, &shape).is_none());
    }

    #[test]
    fn test_curved_shape_is_conformal() {
        let p = calculate_lattice(&lightweight(), &BaseShape::Sphere { radius: 40.0 }).unwrap();
        assert_eq!(p.kind, LatticeKind::Conformal);
        assert_eq!(p.cells_per_dimension, Some(4));
        assert_relative_eq!(p.estimated_weight_reduction, 0.30);
    }

    #[test]
    fn test_durable_is_gradient() {
        let mut spec = lightweight();
        spec.optimization_goals.push(OptimizationGoal::Durable);
        let shape = BaseShape::Box { length: 100.0, width: 100.0, height: 100.0 };
        let p = calculate_lattice(&spec, &shape).unwrap();
        assert_eq!(p.kind, LatticeKind::Gradient);
        assert_eq!(p.subsampling, 8);
        assert!(p.min_beam_thickness_mm.unwrap() <= p.max_beam_thickness_mm.unwrap());
    }
}
