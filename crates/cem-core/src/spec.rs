//! Design specification: the typed record every pipeline stage reads and
//! rewrites.
//!
//! The JSON shape mirrors what the prompt parser and an external LLM both
//! produce, so a specification can round-trip through the HTTP API and the
//! conversation store unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CemError, Result};

/// Default safety factor applied when a specification does not state one.
pub const DEFAULT_SAFETY_FACTOR: f64 = 2.0;
/// Default infill percentage for printed parts.
pub const DEFAULT_INFILL_PERCENT: f64 = 20.0;
/// Default dimensional tolerance in mm.
pub const DEFAULT_TOLERANCE_MM: f64 = 0.1;
/// Ambient temperature assumed when no environment is given.
pub const DEFAULT_TEMP_MAX_C: f64 = 25.0;
/// Material assumed when none is named.
pub const DEFAULT_MATERIAL: &str = "PLA";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    RobotArm,
    Gripper,
    LinearActuator,
    PanTilt,
    #[default]
    #[serde(other)]
    Custom,
}

impl DeviceType {
    pub const ALL: [DeviceType; 5] = [
        DeviceType::RobotArm,
        DeviceType::Gripper,
        DeviceType::LinearActuator,
        DeviceType::PanTilt,
        DeviceType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::RobotArm => "robot_arm",
            DeviceType::Gripper => "gripper",
            DeviceType::LinearActuator => "linear_actuator",
            DeviceType::PanTilt => "pan_tilt",
            DeviceType::Custom => "custom",
        }
    }

    /// Parse a device name, tolerating spaces and hyphens ("robot arm", "pan-tilt").
    pub fn from_name(name: &str) -> Option<Self> {
        let norm = normalize_key(name);
        Self::ALL.into_iter().find(|d| d.as_str() == norm)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ManufacturingMethod {
    #[default]
    #[serde(rename = "FDM")]
    Fdm,
    #[serde(rename = "SLA")]
    Sla,
    #[serde(rename = "SLS")]
    Sls,
    #[serde(rename = "CNC")]
    Cnc,
    #[serde(rename = "hybrid")]
    Hybrid,
}

impl ManufacturingMethod {
    pub const ALL: [ManufacturingMethod; 5] = [
        ManufacturingMethod::Fdm,
        ManufacturingMethod::Sla,
        ManufacturingMethod::Sls,
        ManufacturingMethod::Cnc,
        ManufacturingMethod::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ManufacturingMethod::Fdm => "FDM",
            ManufacturingMethod::Sla => "SLA",
            ManufacturingMethod::Sls => "SLS",
            ManufacturingMethod::Cnc => "CNC",
            ManufacturingMethod::Hybrid => "hybrid",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name))
    }

    /// True for layer-by-layer processes (FDM, SLA, SLS and hybrid builds).
    pub fn is_additive(&self) -> bool {
        !matches!(self, ManufacturingMethod::Cnc)
    }
}

impl fmt::Display for ManufacturingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationGoal {
    Lightweight,
    Durable,
    CostEffective,
    HighPrecision,
    RapidPrototyping,
}

impl OptimizationGoal {
    pub const ALL: [OptimizationGoal; 5] = [
        OptimizationGoal::Lightweight,
        OptimizationGoal::Durable,
        OptimizationGoal::CostEffective,
        OptimizationGoal::HighPrecision,
        OptimizationGoal::RapidPrototyping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationGoal::Lightweight => "lightweight",
            OptimizationGoal::Durable => "durable",
            OptimizationGoal::CostEffective => "cost_effective",
            OptimizationGoal::HighPrecision => "high_precision",
            OptimizationGoal::RapidPrototyping => "rapid_prototyping",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let norm = normalize_key(name);
        Self::ALL.into_iter().find(|g| g.as_str() == norm)
    }
}

impl fmt::Display for OptimizationGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Servo,
    Stepper,
    Bearing,
    Sensor,
    Controller,
    #[serde(other)]
    Other,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Servo => "servo",
            ComponentKind::Stepper => "stepper",
            ComponentKind::Bearing => "bearing",
            ComponentKind::Sensor => "sensor",
            ComponentKind::Controller => "controller",
            ComponentKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dimensions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diameter_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reach_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jaw_width_mm: Option<f64>,
    /// Set when any value was filled from device defaults rather than stated.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub estimated: bool,
}

impl Dimensions {
    fn fields_mut(&mut self) -> [&mut Option<f64>; 7] {
        [
            &mut self.length_mm,
            &mut self.width_mm,
            &mut self.height_mm,
            &mut self.diameter_mm,
            &mut self.reach_mm,
            &mut self.stroke_mm,
            &mut self.jaw_width_mm,
        ]
    }

    fn fields(&self) -> [(&'static str, Option<f64>); 7] {
        [
            ("length_mm", self.length_mm),
            ("width_mm", self.width_mm),
            ("height_mm", self.height_mm),
            ("diameter_mm", self.diameter_mm),
            ("reach_mm", self.reach_mm),
            ("stroke_mm", self.stroke_mm),
            ("jaw_width_mm", self.jaw_width_mm),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|(_, v)| v.is_none())
    }

    /// Multiply every stated dimension by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for v in self.fields_mut().into_iter().flatten() {
            *v *= factor;
        }
    }

    /// Longest stated extent, used as a characteristic size.
    pub fn max_extent(&self) -> Option<f64> {
        self.fields()
            .iter()
            .filter_map(|(_, v)| *v)
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Loads {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_force_n: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torque_nm: Option<f64>,
}

impl Loads {
    pub fn is_empty(&self) -> bool {
        self.payload_kg.is_none() && self.max_force_n.is_none() && self.torque_nm.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Motion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dof: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeatability_mm: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_min_c: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_max_c: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity_max_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outdoor: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Requirements {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_factor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infill_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_lattice: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wall_thickness_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish: Option<String>,
}

/// A component the design needs, as requested by the user or derived by sourcing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRequest {
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mpn: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub specifications: serde_json::Map<String, serde_json::Value>,
}

impl ComponentRequest {
    pub fn new(kind: ComponentKind, name: impl Into<String>, quantity: u32) -> Self {
        Self {
            kind,
            name: name.into(),
            mpn: None,
            quantity,
            estimated_cost: None,
            specifications: serde_json::Map::new(),
        }
    }

    pub fn with_mpn(mut self, mpn: impl Into<String>) -> Self {
        self.mpn = Some(mpn.into());
        self
    }
}

/// Fasteners and other commodity hardware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareItem {
    pub name: String,
    #[serde(default)]
    pub spec: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_cost: Option<f64>,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignSpecification {
    pub device_type: DeviceType,
    pub dimensions: Dimensions,
    pub loads: Loads,
    pub motion: Motion,
    pub materials: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturing: Option<ManufacturingMethod>,
    pub components: Vec<ComponentRequest>,
    pub hardware: Vec<HardwareItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Requirements>,
    pub optimization_goals: Vec<OptimizationGoal>,
}

impl DesignSpecification {
    pub fn new(device_type: DeviceType) -> Self {
        Self {
            device_type,
            ..Self::default()
        }
    }

    pub fn primary_material(&self) -> &str {
        self.materials
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_MATERIAL)
    }

    pub fn manufacturing_method(&self) -> ManufacturingMethod {
        self.manufacturing.unwrap_or_default()
    }

    pub fn primary_goal(&self) -> Option<OptimizationGoal> {
        self.optimization_goals.first().copied()
    }

    pub fn has_goal(&self, goal: OptimizationGoal) -> bool {
        self.optimization_goals.contains(&goal)
    }

    pub fn safety_factor(&self) -> f64 {
        self.requirements
            .as_ref()
            .and_then(|r| r.safety_factor)
            .unwrap_or(DEFAULT_SAFETY_FACTOR)
    }

    pub fn tolerance_mm(&self) -> f64 {
        self.requirements
            .as_ref()
            .and_then(|r| r.tolerance_mm)
            .unwrap_or(DEFAULT_TOLERANCE_MM)
    }

    pub fn infill_percent(&self) -> f64 {
        self.requirements
            .as_ref()
            .and_then(|r| r.infill_percent)
            .unwrap_or(DEFAULT_INFILL_PERCENT)
    }

    pub fn wall_thickness_mm(&self) -> Option<f64> {
        self.requirements.as_ref().and_then(|r| r.wall_thickness_mm)
    }

    pub fn temp_max_c(&self) -> f64 {
        self.environment
            .as_ref()
            .and_then(|e| e.temp_max_c)
            .unwrap_or(DEFAULT_TEMP_MAX_C)
    }

    pub fn payload_kg(&self) -> f64 {
        self.loads.payload_kg.unwrap_or(0.0)
    }

    pub fn requirements_mut(&mut self) -> &mut Requirements {
        self.requirements.get_or_insert_with(Requirements::default)
    }

    /// Range checks on user-supplied values. Runs before any stage consumes the spec.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in self.dimensions.fields() {
            if let Some(v) = value
                && !(v.is_finite() && v > 0.0)
            {
                return Err(CemError::InvalidSpec(format!(
                    "{name} must be a positive number, got {v}"
                )));
            }
        }
        let loads = [
            ("payload_kg", self.loads.payload_kg),
            ("max_force_n", self.loads.max_force_n),
            ("torque_nm", self.loads.torque_nm),
        ];
        for (name, value) in loads {
            if let Some(v) = value
                && !(v.is_finite() && v >= 0.0)
            {
                return Err(CemError::InvalidSpec(format!(
                    "{name} must be non-negative, got {v}"
                )));
            }
        }
        if let Some(dof) = self.motion.dof
            && !(1..=12).contains(&dof)
        {
            return Err(CemError::InvalidSpec(format!(
                "dof must be between 1 and 12, got {dof}"
            )));
        }
        if let Some(req) = &self.requirements {
            if let Some(sf) = req.safety_factor
                && !(sf.is_finite() && sf >= 1.0)
            {
                return Err(CemError::InvalidSpec(format!(
                    "safety_factor must be at least 1.0, got {sf}"
                )));
            }
            if let Some(infill) = req.infill_percent
                && !(0.0..=100.0).contains(&infill)
            {
                return Err(CemError::InvalidSpec(format!(
                    "infill_percent must be within 0-100, got {infill}"
                )));
            }
            if let Some(t) = req.wall_thickness_mm
                && !(t.is_finite() && t > 0.0)
            {
                return Err(CemError::InvalidSpec(format!(
                    "wall_thickness_mm must be positive, got {t}"
                )));
            }
        }
        for c in &self.components {
            if c.quantity == 0 {
                return Err(CemError::InvalidSpec(format!(
                    "component '{}' has zero quantity",
                    c.name
                )));
            }
        }
        for h in &self.hardware {
            if h.quantity == 0 {
                return Err(CemError::InvalidSpec(format!(
                    "hardware '{}' has zero quantity",
                    h.name
                )));
            }
        }
        Ok(())
    }
}

/// Lowercase, trim and fold spaces/hyphens into underscores.
pub(crate) fn normalize_key(s: &str) -> String {
    s.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}
