//! Manufacturing and mechanical design rules.
//!
//! Static tables keyed by process. Values are conservative hobby/prosumer
//! figures; every length is in mm.

use serde::Serialize;

use crate::spec::ManufacturingMethod;

/// Constraints for one additive process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrintRules {
    pub min_wall_thickness_mm: f64,
    pub min_hole_diameter_mm: f64,
    pub max_overhang_angle_deg: f64,
    pub layer_height_range_mm: (f64, f64),
    pub min_feature_size_mm: f64,
    pub typical_accuracy_mm: f64,
    pub surface_roughness_um: f64,
    /// FDM only: longest unsupported bridge.
    pub bridging_max_distance_mm: Option<f64>,
    /// SLA only: drain hole for hollow parts.
    pub min_escape_hole_diameter_mm: Option<f64>,
    /// SLS parts need no support structures.
    pub self_supporting: bool,
}

pub const FDM_RULES: PrintRules = PrintRules {
    min_wall_thickness_mm: 0.8,
    min_hole_diameter_mm: 2.0,
    max_overhang_angle_deg: 45.0,
    layer_height_range_mm: (0.1, 0.4),
    min_feature_size_mm: 0.4,
    typical_accuracy_mm: 0.2,
    surface_roughness_um: 12.0,
    bridging_max_distance_mm: Some(5.0),
    min_escape_hole_diameter_mm: None,
    self_supporting: false,
};

pub const SLA_RULES: PrintRules = PrintRules {
    min_wall_thickness_mm: 0.4,
    min_hole_diameter_mm: 0.5,
    max_overhang_angle_deg: 30.0,
    layer_height_range_mm: (0.025, 0.1),
    min_feature_size_mm: 0.2,
    typical_accuracy_mm: 0.05,
    surface_roughness_um: 3.0,
    bridging_max_distance_mm: None,
    min_escape_hole_diameter_mm: Some(3.0),
    self_supporting: false,
};

pub const SLS_RULES: PrintRules = PrintRules {
    min_wall_thickness_mm: 0.7,
    min_hole_diameter_mm: 1.5,
    max_overhang_angle_deg: 90.0,
    layer_height_range_mm: (0.1, 0.15),
    min_feature_size_mm: 0.5,
    typical_accuracy_mm: 0.1,
    surface_roughness_um: 8.0,
    bridging_max_distance_mm: None,
    min_escape_hole_diameter_mm: None,
    self_supporting: true,
};

/// Constraints for CNC machining.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CncRules {
    pub min_tool_diameter_mm: f64,
    pub min_inside_corner_radius_mm: f64,
    pub max_depth_to_diameter_ratio: f64,
    pub min_wall_thickness_mm: f64,
    pub typical_tolerance_mm: f64,
    pub surface_finish_ra_um: f64,
}

pub const CNC_RULES: CncRules = CncRules {
    min_tool_diameter_mm: 0.5,
    min_inside_corner_radius_mm: 0.25,
    max_depth_to_diameter_ratio: 4.0,
    min_wall_thickness_mm: 1.0,
    typical_tolerance_mm: 0.025,
    surface_finish_ra_um: 1.6,
};

/// Rules for whichever process a key names.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProcessRules {
    Print(PrintRules),
    Cnc(CncRules),
}

impl ProcessRules {
    pub fn min_wall_thickness_mm(&self) -> f64 {
        match self {
            ProcessRules::Print(r) => r.min_wall_thickness_mm,
            ProcessRules::Cnc(r) => r.min_wall_thickness_mm,
        }
    }

    pub fn typical_accuracy_mm(&self) -> f64 {
        match self {
            ProcessRules::Print(r) => r.typical_accuracy_mm,
            ProcessRules::Cnc(r) => r.typical_tolerance_mm,
        }
    }
}

/// Rules for a manufacturing method. Hybrid builds are held to FDM rules.
pub fn rules_for(method: ManufacturingMethod) -> ProcessRules {
    match method {
        ManufacturingMethod::Fdm | ManufacturingMethod::Hybrid => ProcessRules::Print(FDM_RULES),
        ManufacturingMethod::Sla => ProcessRules::Print(SLA_RULES),
        ManufacturingMethod::Sls => ProcessRules::Print(SLS_RULES),
        ManufacturingMethod::Cnc => ProcessRules::Cnc(CNC_RULES),
    }
}

/// Look up rules by process key ("FDM", "sla", "cnc", ...). Unknown keys yield `None`.
pub fn rules_for_key(key: &str) -> Option<ProcessRules> {
    ManufacturingMethod::from_name(key).map(rules_for)
}

/// Documented minimum wall thickness for a process key.
pub fn min_wall_thickness(key: &str) -> Option<f64> {
    rules_for_key(key).map(|r| r.min_wall_thickness_mm())
}

// --- Mechanical ---

/// Thread engagement as a multiple of the nominal diameter.
pub const THREAD_ENGAGEMENT_RATIO: f64 = 1.5;
pub const BEARING_CLEARANCE_MM: f64 = 0.05;
pub const PRESS_FIT_INTERFERENCE_MM: f64 = 0.02;
pub const SLIDING_FIT_CLEARANCE_MM: f64 = 0.1;
/// Minimum bolt-hole edge distance as a multiple of bolt diameter.
pub const MIN_BOLT_EDGE_DISTANCE_RATIO: f64 = 2.0;
/// Fillet radius as a fraction of wall thickness.
pub const FILLET_RADIUS_RATIO: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScrewSize {
    pub name: &'static str,
    pub thread_mm: f64,
    pub clearance_hole_mm: f64,
    pub tap_drill_mm: f64,
}

pub const STANDARD_SCREWS: [ScrewSize; 5] = [
    ScrewSize { name: "M2", thread_mm: 2.0, clearance_hole_mm: 2.2, tap_drill_mm: 1.6 },
    ScrewSize { name: "M3", thread_mm: 3.0, clearance_hole_mm: 3.2, tap_drill_mm: 2.5 },
    ScrewSize { name: "M4", thread_mm: 4.0, clearance_hole_mm: 4.3, tap_drill_mm: 3.3 },
    ScrewSize { name: "M5", thread_mm: 5.0, clearance_hole_mm: 5.3, tap_drill_mm: 4.2 },
    ScrewSize { name: "M6", thread_mm: 6.0, clearance_hole_mm: 6.4, tap_drill_mm: 5.0 },
];

pub fn screw(name: &str) -> Option<&'static ScrewSize> {
    STANDARD_SCREWS
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(name.trim()))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BearingSize {
    pub name: &'static str,
    pub bore_mm: f64,
    pub outer_diameter_mm: f64,
    pub width_mm: f64,
}

pub const STANDARD_BEARINGS: [BearingSize; 3] = [
    BearingSize { name: "608", bore_mm: 8.0, outer_diameter_mm: 22.0, width_mm: 7.0 },
    BearingSize { name: "6000", bore_mm: 10.0, outer_diameter_mm: 26.0, width_mm: 8.0 },
    BearingSize { name: "6200", bore_mm: 10.0, outer_diameter_mm: 30.0, width_mm: 9.0 },
];

// --- Lattice ---

/// Beam thickness limits (min, recommended, max) for lattice infill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BeamThicknessRule {
    pub minimum_mm: f64,
    pub recommended_mm: f64,
    pub maximum_mm: f64,
}

pub const LATTICE_CELL_SIZE_MIN_MM: f64 = 5.0;
pub const LATTICE_CELL_SIZE_MAX_MM: f64 = 100.0;

/// Beam thickness limits per process. CNC cannot produce lattices; it
/// falls back to the FDM envelope so a misconfigured spec still yields
/// printable numbers.
pub fn beam_thickness_rule(method: ManufacturingMethod) -> BeamThicknessRule {
    match method {
        ManufacturingMethod::Sla => BeamThicknessRule {
            minimum_mm: 0.4,
            recommended_mm: 0.5,
            maximum_mm: 5.0,
        },
        ManufacturingMethod::Sls => BeamThicknessRule {
            minimum_mm: 0.7,
            recommended_mm: 1.0,
            maximum_mm: 8.0,
        },
        _ => BeamThicknessRule {
            minimum_mm: 0.8,
            recommended_mm: 1.0,
            maximum_mm: 10.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_min_wall_per_process() {
        assert_eq!(min_wall_thickness("FDM"), Some(0.8));
        assert_eq!(min_wall_thickness("SLA"), Some(0.4));
        assert_eq!(min_wall_thickness("SLS"), Some(0.7));
        assert_eq!(min_wall_thickness("CNC"), Some(1.0));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(min_wall_thickness("fdm"), Some(0.8));
        assert_eq!(min_wall_thickness(" cnc "), Some(1.0));
    }

    #[test]
    fn test_unknown_process_is_none() {
        assert_eq!(min_wall_thickness("injection_molding"), None);
        assert!(rules_for_key("").is_none());
    }

    #[test]
    fn test_hybrid_uses_fdm_rules() {
        assert_eq!(min_wall_thickness("hybrid"), Some(0.8));
    }

    #[test]
    fn test_screw_table() {
        let m3 = screw("m3").unwrap();
        assert_eq!(m3.clearance_hole_mm, 3.2);
        assert_eq!(m3.tap_drill_mm, 2.5);
        assert!(screw("M12").is_none());
    }

    #[test]
    fn test_beam_rules_ordered() {
        for method in ManufacturingMethod::ALL {
            let r = beam_thickness_rule(method);
            assert!(r.minimum_mm <= r.recommended_mm && r.recommended_mm <= r.maximum_mm);
        }
    }
}
