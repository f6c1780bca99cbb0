//! Prompt parsing: natural language → `DesignSpecification`.
//!
//! The keyword matcher is deterministic: the same prompt always yields the
//! same device type, goals and numbers. Where several keyword groups match,
//! the earliest mention in the prompt wins. An LLM can produce the same
//! record as JSON; `spec_from_llm_output` accepts that path.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::catalog::{CATALOG, CatalogEntry};
use crate::error::{CemError, Result};
use crate::spec::{
    ComponentKind, ComponentRequest, DesignSpecification, DeviceType, Dimensions, Environment,
    ManufacturingMethod, OptimizationGoal, Requirements,
};

/// System prompt for LLM backends asked to emit a specification as JSON.
pub const LLM_SYSTEM_PROMPT: &str = "You are an expert robotics engineer who extracts precise \
specifications from natural language. Return ONLY a JSON object with this structure: \
{\"device_type\": \"robot_arm|gripper|linear_actuator|pan_tilt|custom\", \
\"dimensions\": {\"length_mm\", \"width_mm\", \"height_mm\", \"diameter_mm\", \"reach_mm\", \"stroke_mm\", \"jaw_width_mm\"}, \
\"loads\": {\"payload_kg\", \"max_force_n\", \"torque_nm\"}, \
\"motion\": {\"dof\", \"max_speed\", \"repeatability_mm\"}, \
\"materials\": [\"PLA\", \"ABS\", \"PETG\", \"Nylon\", \"Aluminum_6061\", ...], \
\"manufacturing\": \"FDM|SLA|SLS|CNC|hybrid\", \
\"components\": [{\"type\": \"servo|stepper|bearing|sensor|controller\", \"name\", \"mpn\", \"quantity\"}], \
\"environment\": {\"temp_min_c\", \"temp_max_c\", \"humidity_max_percent\", \"outdoor\"}, \
\"requirements\": {\"safety_factor\", \"tolerance_mm\", \"infill_percent\", \"use_lattice\", \"finish\"}, \
\"optimization_goals\": [\"lightweight|durable|cost_effective|high_precision|rapid_prototyping\"]}. \
Convert every quantity to mm, kg and N. Identify component part numbers such as MG996R or NEMA17. \
No markdown, no explanations.";

/// What the keyword matcher recognized before defaults were applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentAnalysis {
    pub detected_device_type: DeviceType,
    /// Goals in order of first mention.
    pub optimization_goals: Vec<OptimizationGoal>,
    /// Earliest-mentioned goal.
    pub optimization_goal: Option<OptimizationGoal>,
    /// Fraction of quantitative fields the prompt stated explicitly, in [0, 1].
    pub specificity: f64,
    pub matched_keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedPrompt {
    pub specification: DesignSpecification,
    pub intent: IntentAnalysis,
}

// --- Keyword tables ---

pub(crate) fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

static DEVICE_PATTERNS: LazyLock<Vec<(DeviceType, Regex)>> = LazyLock::new(|| {
    vec![
        (
            DeviceType::RobotArm,
            compile(r"\b(?:robot(?:ic)?[\s-]+arms?|arms?|manipulators?)\b"),
        ),
        (
            DeviceType::Gripper,
            compile(r"\b(?:grippers?|claws?|jaws?|end[\s-]effectors?)\b"),
        ),
        (
            DeviceType::LinearActuator,
            compile(r"\b(?:linear[\s-]+(?:actuators?|axis|axes|stages?|slides?)|sliders?|lead[\s-]?screw)\b"),
        ),
        (
            DeviceType::PanTilt,
            compile(r"\b(?:pan[\s-]*(?:and[\s-]+)?tilt|gimbals?|camera[\s-]+mounts?)\b"),
        ),
    ]
});

static GOAL_PATTERNS: LazyLock<Vec<(OptimizationGoal, Regex)>> = LazyLock::new(|| {
    vec![
        (
            OptimizationGoal::Lightweight,
            compile(r"\b(?:light[\s-]?weight|low[\s-]weight|weight[\s-](?:reduction|saving|optimi[sz]ed)|as light as possible)\b"),
        ),
        (
            OptimizationGoal::Durable,
            compile(r"\b(?:durable|durability|robust|rugged|heavy[\s-]duty|long[\s-]lasting|sturdy)\b"),
        ),
        (
            OptimizationGoal::CostEffective,
            compile(r"\b(?:cost[\s-]effective|cheap|low[\s-]cost|budget|affordable|inexpensive|economical)\b"),
        ),
        (
            OptimizationGoal::HighPrecision,
            compile(r"\b(?:high[\s-]precision|precise|precision|accurate|tight[\s-]tolerances?)\b"),
        ),
        (
            OptimizationGoal::RapidPrototyping,
            compile(r"\b(?:prototypes?|prototyping|rapid|quick(?:ly)?|proof[\s-]of[\s-]concept)\b"),
        ),
    ]
});

/// Materials in the order they are stripped from the text. Longer names go
/// first so "carbon fiber PLA" is not also read as plain PLA.
static MATERIAL_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("Carbon_Fiber_PLA", compile(r"\b(?:carbon[\s-]?fib(?:er|re)(?:[\s-]+(?:reinforced[\s-]+)?pla)?|cf[\s-]?pla)\b")),
        ("Stainless_316", compile(r"\bstainless(?:[\s-]+steel)?(?:[\s-]+316)?\b")),
        ("Aluminum_6061", compile(r"\balumin(?:i)?um(?:[\s-]+6061)?\b")),
        ("Titanium_Ti6Al4V", compile(r"\b(?:titanium|ti6al4v)\b")),
        ("Steel_1045", compile(r"\bsteel\b")),
        ("PETG", compile(r"\bpetg\b")),
        ("PLA", compile(r"\bpla\b")),
        ("ABS", compile(r"\babs\b")),
        ("ASA", compile(r"\basa\b")),
        ("Nylon", compile(r"\b(?:nylon|pa12|pa6)\b")),
        ("TPU", compile(r"\b(?:tpu|flexible filament)\b")),
    ]
});

static METHOD_PATTERNS: LazyLock<Vec<(ManufacturingMethod, Regex)>> = LazyLock::new(|| {
    vec![
        (ManufacturingMethod::Hybrid, compile(r"\bhybrid\b")),
        (ManufacturingMethod::Cnc, compile(r"\b(?:cnc|machined|machining|milled)\b")),
        (ManufacturingMethod::Sla, compile(r"\b(?:sla|resin)\b")),
        (ManufacturingMethod::Sls, compile(r"\b(?:sls|sintered|sintering)\b")),
        (ManufacturingMethod::Fdm, compile(r"\b(?:fdm|fff|3d[\s-]?print(?:ed|ing|er)?|printed)\b")),
    ]
});

const NUM: &str = r"(\d+(?:\.\d+)?)";
/// Carries its own leading space. A bare `in` must touch the number so
/// "300 in PLA" is not read as inches.
const LEN_UNIT: &str = r#"(\s*(?:mm|cm|m|inches|inch)\b|in\b|\s*")"#;
const FILLER: &str = r"(?:\s*(?:of|about|around|approximately|approx\.?|up\s+to|roughly|is|=|:))*";

/// Build the two length patterns for a dimension keyword: "reach of 500 mm"
/// and "500 mm reach".
fn length_patterns(keyword: &str) -> (Regex, Regex) {
    (
        compile(&format!(r"\b(?:{keyword}){FILLER}\s*{NUM}{LEN_UNIT}")),
        compile(&format!(r"{NUM}{LEN_UNIT}\s*(?:long\s+)?(?:{keyword})\b")),
    )
}

static REACH: LazyLock<(Regex, Regex)> = LazyLock::new(|| length_patterns("reach|working\\s+radius"));
static LENGTH: LazyLock<(Regex, Regex)> = LazyLock::new(|| length_patterns("length|long"));
static WIDTH: LazyLock<(Regex, Regex)> = LazyLock::new(|| length_patterns("width|wide"));
static HEIGHT: LazyLock<(Regex, Regex)> = LazyLock::new(|| length_patterns("height|tall|high"));
static DIAMETER: LazyLock<(Regex, Regex)> = LazyLock::new(|| length_patterns("diameter|dia"));
static STROKE: LazyLock<(Regex, Regex)> = LazyLock::new(|| length_patterns("stroke|travel"));
static JAW: LazyLock<(Regex, Regex)> =
    LazyLock::new(|| length_patterns("jaw\\s+(?:width|opening)|opening|grip\\s+width"));

static MASS: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"{NUM}\s*(kg|kilograms?|g|grams?|lbs?|pounds?)\b")));
static PAYLOAD_MASS: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"(?:payload|load|lift|carry|hold|handle|grip|grasp)\w*{FILLER}\s*(?:a\s+)?{NUM}\s*(kg|kilograms?|g|grams?|lbs?|pounds?)\b|{NUM}\s*(kg|kilograms?|g|grams?|lbs?|pounds?)\s+(?:payload|load)"
    ))
});
static FORCE: LazyLock<Regex> = LazyLock::new(|| compile(&format!(r"{NUM}\s*(?:n|newtons?)\b")));
static TORQUE: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"{NUM}\s*(?:nm|n·m|n\.m|n-m|newton[\s-]met(?:er|re)s?)\b")));
static DOF: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\b(\d{1,2})\s*[-\s]?\s*(?:dof|degrees?[\s-]+of[\s-]+freedom|axis|axes)\b")
});
static TEMPERATURE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(-?\d+(?:\.\d+)?)\s*(?:°|º|deg(?:rees?)?\s*)\s*c(?:elsius)?\b")
});
static HUMIDITY: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"{NUM}\s*%\s*(?:relative\s+)?humidity")));
static OUTDOOR: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b(?:outdoors?|outside|weather(?:proof)?|rain)\b"));
static TOLERANCE: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"(?:±|\+/-)\s*{NUM}\s*mm|(?:tolerance|accuracy|repeatability)\w*{FILLER}\s*(?:±|\+/-)?\s*{NUM}\s*mm"
    ))
});
static SAFETY_FACTOR: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"safety\s+factor{FILLER}\s*{NUM}")));
static INFILL: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(\d{1,3})\s*%\s*infill|infill(?:\s+of)?\s*(\d{1,3})\s*%")
});
static LATTICE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b(?:lattice|gyroid|honeycomb|infill structure)\b"));
static SOLID: LazyLock<Regex> = LazyLock::new(|| compile(r"\b(?:fully\s+solid|solid\s+part|no\s+lattice)\b"));
static SERVO: LazyLock<Regex> = LazyLock::new(|| compile(r"(?:(\d+)\s*x?\s*)?\bservo(?:s|\s+motors?)?\b"));
static STEPPER: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?:(\d+)\s*x?\s*)?\bstepper(?:s|\s+motors?)?\b"));

// --- Parsing ---

/// Parse a natural-language prompt into a specification and intent report.
pub fn parse_prompt(text: &str) -> ParsedPrompt {
    let lower = text.to_lowercase();
    let mut matched_keywords = Vec::new();

    let device_type = earliest_device(&lower, &mut matched_keywords);
    let goals = goals_in_order(&lower, &mut matched_keywords);

    let mut spec = DesignSpecification::new(device_type);
    spec.optimization_goals = goals.clone();

    let dims = extract_dimensions(&lower);
    let dims_stated = !dims.is_empty();
    spec.dimensions = dims;

    if let Some(kg) = extract_payload(&lower) {
        spec.loads.payload_kg = Some(kg);
    }
    if let Some(n) = first_number(&FORCE, &lower) {
        spec.loads.max_force_n = Some(n);
    }
    if let Some(nm) = first_number(&TORQUE, &lower) {
        spec.loads.torque_nm = Some(nm);
    }
    let dof = DOF
        .captures(&lower)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|d| (1..=12).contains(d));
    spec.motion.dof = dof;

    spec.materials = extract_materials(&lower);
    spec.manufacturing = extract_method(&lower, &spec.materials);
    spec.environment = extract_environment(&lower);
    spec.requirements = extract_requirements(&lower, &goals);
    spec.components = extract_components(&lower, dof);

    let stated = [
        dims_stated,
        !spec.loads.is_empty(),
        !spec.materials.is_empty(),
        spec.manufacturing.is_some(),
        dof.is_some(),
        spec.requirements
            .as_ref()
            .is_some_and(|r| r.tolerance_mm.is_some() || r.safety_factor.is_some()),
    ];
    let specificity = stated.iter().filter(|s| **s).count() as f64 / stated.len() as f64;

    apply_device_defaults(&mut spec);

    ParsedPrompt {
        intent: IntentAnalysis {
            detected_device_type: device_type,
            optimization_goal: goals.first().copied(),
            optimization_goals: goals,
            specificity,
            matched_keywords,
        },
        specification: spec,
    }
}

fn earliest_device(lower: &str, matched: &mut Vec<String>) -> DeviceType {
    let mut best: Option<(usize, DeviceType, String)> = None;
    for (device, re) in DEVICE_PATTERNS.iter() {
        if let Some(m) = re.find(lower)
            && best.as_ref().is_none_or(|(pos, _, _)| m.start() < *pos)
        {
            best = Some((m.start(), *device, m.as_str().to_string()));
        }
    }
    match best {
        Some((_, device, word)) => {
            matched.push(word);
            device
        }
        None => DeviceType::Custom,
    }
}

fn goals_in_order(lower: &str, matched: &mut Vec<String>) -> Vec<OptimizationGoal> {
    let mut hits: Vec<(usize, OptimizationGoal, String)> = GOAL_PATTERNS
        .iter()
        .filter_map(|(goal, re)| re.find(lower).map(|m| (m.start(), *goal, m.as_str().to_string())))
        .collect();
    hits.sort_by_key(|(pos, _, _)| *pos);
    hits.into_iter()
        .map(|(_, goal, word)| {
            matched.push(word);
            goal
        })
        .collect()
}

fn to_mm(value: f64, unit: &str) -> f64 {
    match unit {
        "cm" => value * 10.0,
        "m" => value * 1000.0,
        "in" | "inch" | "inches" | "\"" => value * 25.4,
        _ => value,
    }
}

fn to_kg(value: f64, unit: &str) -> f64 {
    match unit {
        u if u.starts_with('g') => value / 1000.0,
        u if u.starts_with("lb") || u.starts_with("pound") => value * 0.453_592,
        _ => value,
    }
}

/// First length matching either pattern of a dimension, converted to mm.
fn find_length(patterns: &(Regex, Regex), lower: &str) -> Option<f64> {
    let (before, after) = patterns;
    let candidates = [before.captures(lower), after.captures(lower)];
    candidates
        .into_iter()
        .flatten()
        .min_by_key(|c| c.get(0).map_or(usize::MAX, |m| m.start()))
        .and_then(|c| {
            let value: f64 = c.get(1)?.as_str().parse().ok()?;
            Some(to_mm(value, c.get(2)?.as_str().trim()))
        })
        .filter(|v| *v > 0.0)
}

fn extract_dimensions(lower: &str) -> Dimensions {
    Dimensions {
        reach_mm: find_length(&REACH, lower),
        length_mm: find_length(&LENGTH, lower),
        width_mm: find_length(&WIDTH, lower),
        height_mm: find_length(&HEIGHT, lower),
        diameter_mm: find_length(&DIAMETER, lower),
        stroke_mm: find_length(&STROKE, lower),
        jaw_width_mm: find_length(&JAW, lower),
        estimated: false,
    }
}

fn extract_payload(lower: &str) -> Option<f64> {
    if let Some(c) = PAYLOAD_MASS.captures(lower) {
        let (num, unit) = match (c.get(1), c.get(2)) {
            (Some(n), Some(u)) => (n, u),
            _ => (c.get(3)?, c.get(4)?),
        };
        let value: f64 = num.as_str().parse().ok()?;
        return Some(to_kg(value, unit.as_str()));
    }
    let c = MASS.captures(lower)?;
    let value: f64 = c.get(1)?.as_str().parse().ok()?;
    Some(to_kg(value, c.get(2)?.as_str()))
}

fn first_number(re: &Regex, lower: &str) -> Option<f64> {
    re.captures(lower)?.get(1)?.as_str().parse().ok()
}

fn extract_materials(lower: &str) -> Vec<String> {
    let mut scratch = lower.to_string();
    let mut hits: Vec<(usize, &'static str)> = Vec::new();
    for (name, re) in MATERIAL_PATTERNS.iter() {
        let found: Vec<(usize, usize)> = re.find_iter(&scratch).map(|m| (m.start(), m.end())).collect();
        if let Some((start, _)) = found.first() {
            hits.push((*start, *name));
        }
        // Blank matched spans so shorter names cannot match inside them.
        for (start, end) in found {
            scratch.replace_range(start..end, &" ".repeat(end - start));
        }
    }
    hits.sort_by_key(|(pos, _)| *pos);
    hits.into_iter().map(|(_, name)| name.to_string()).collect()
}

fn extract_method(lower: &str, materials: &[String]) -> Option<ManufacturingMethod> {
    let found: Vec<(usize, ManufacturingMethod)> = METHOD_PATTERNS
        .iter()
        .filter_map(|(method, re)| re.find(lower).map(|m| (m.start(), *method)))
        .collect();
    if found.iter().any(|(_, m)| *m == ManufacturingMethod::Hybrid) {
        return Some(ManufacturingMethod::Hybrid);
    }
    let machined = found.iter().any(|(_, m)| *m == ManufacturingMethod::Cnc);
    let printed = found.iter().any(|(_, m)| m.is_additive());
    if machined && printed {
        return Some(ManufacturingMethod::Hybrid);
    }
    if let Some((_, method)) = found.iter().min_by_key(|(pos, _)| *pos) {
        return Some(*method);
    }
    // A metal-only material list implies machining.
    let metal = |m: &String| {
        matches!(
            m.as_str(),
            "Aluminum_6061" | "Steel_1045" | "Stainless_316" | "Titanium_Ti6Al4V"
        )
    };
    if !materials.is_empty() && materials.iter().all(metal) {
        return Some(ManufacturingMethod::Cnc);
    }
    None
}

fn extract_environment(lower: &str) -> Option<Environment> {
    let temps: Vec<f64> = TEMPERATURE
        .captures_iter(lower)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect();
    let humidity = first_number(&HUMIDITY, lower);
    let outdoor = OUTDOOR.is_match(lower);
    if temps.is_empty() && humidity.is_none() && !outdoor {
        return None;
    }
    let max = temps.iter().copied().reduce(f64::max);
    let min = if temps.len() > 1 {
        temps.iter().copied().reduce(f64::min)
    } else {
        None
    };
    Some(Environment {
        temp_min_c: min,
        temp_max_c: max,
        humidity_max_percent: humidity,
        outdoor: outdoor.then_some(true),
    })
}

fn extract_requirements(lower: &str, goals: &[OptimizationGoal]) -> Option<Requirements> {
    let tolerance = TOLERANCE.captures(lower).and_then(|c| {
        c.get(1)
            .or_else(|| c.get(2))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    });
    let safety_factor = first_number(&SAFETY_FACTOR, lower);
    let infill = INFILL.captures(lower).and_then(|c| {
        c.get(1)
            .or_else(|| c.get(2))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    });
    let use_lattice = if SOLID.is_match(lower) {
        Some(false)
    } else if LATTICE.is_match(lower) || goals.contains(&OptimizationGoal::Lightweight) {
        Some(true)
    } else {
        None
    };
    if tolerance.is_none() && safety_factor.is_none() && infill.is_none() && use_lattice.is_none()
    {
        return None;
    }
    Some(Requirements {
        safety_factor,
        tolerance_mm: tolerance,
        infill_percent: infill.map(|v| v.min(100.0)),
        use_lattice,
        ..Requirements::default()
    })
}

/// Per catalog entry, patterns for its part number and its name, each with
/// an optional leading quantity.
static CATALOG_PATTERNS: LazyLock<Vec<(&'static CatalogEntry, [Regex; 2])>> = LazyLock::new(|| {
    let pattern = |n: &str| compile(&format!(r"(?:(\d+)\s*x?\s*)?\b{}\b", regex::escape(&n.to_lowercase())));
    CATALOG
        .iter()
        .map(|entry| (entry, [pattern(entry.mpn), pattern(entry.name)]))
        .collect()
});

fn extract_components(lower: &str, dof: Option<u32>) -> Vec<ComponentRequest> {
    let mut out = Vec::new();
    for (entry, patterns) in CATALOG_PATTERNS.iter() {
        let found = patterns.iter().find_map(|re| re.captures(lower));
        if let Some(c) = found {
            let qty = c
                .get(1)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .filter(|q| *q > 0)
                .unwrap_or(1);
            out.push(ComponentRequest::new(entry.kind, entry.name, qty).with_mpn(entry.mpn));
        }
    }
    let has = |kind: ComponentKind, out: &[ComponentRequest]| out.iter().any(|c| c.kind == kind);
    if !has(ComponentKind::Servo, &out)
        && let Some(c) = SERVO.captures(lower)
    {
        let qty = c
            .get(1)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .or(dof)
            .unwrap_or(1);
        out.push(ComponentRequest::new(ComponentKind::Servo, "servo", qty.max(1)));
    }
    if !has(ComponentKind::Stepper, &out)
        && let Some(c) = STEPPER.captures(lower)
    {
        let qty = c
            .get(1)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(1);
        out.push(ComponentRequest::new(ComponentKind::Stepper, "stepper motor", qty.max(1)));
    }
    out
}

/// Fill unstated geometry with per-device engineering defaults. Marks the
/// dimensions as estimated when anything was filled in.
pub fn apply_device_defaults(spec: &mut DesignSpecification) {
    let d = &mut spec.dimensions;
    let before = d.clone();
    match spec.device_type {
        DeviceType::RobotArm => {
            if d.reach_mm.is_none() {
                d.reach_mm = Some(d.length_mm.unwrap_or(300.0));
            }
            if spec.motion.dof.is_none() {
                spec.motion.dof = Some(3);
            }
        }
        DeviceType::Gripper => {
            d.length_mm.get_or_insert(50.0);
            d.jaw_width_mm.get_or_insert(30.0);
            d.height_mm.get_or_insert(5.0);
        }
        DeviceType::LinearActuator => {
            let stroke = *d.stroke_mm.get_or_insert(200.0);
            d.length_mm.get_or_insert(stroke + 100.0);
            d.width_mm.get_or_insert(40.0);
            d.height_mm.get_or_insert(40.0);
        }
        DeviceType::PanTilt => {
            d.width_mm.get_or_insert(60.0);
            d.height_mm.get_or_insert(80.0);
            if spec.motion.dof.is_none() {
                spec.motion.dof = Some(2);
            }
        }
        DeviceType::Custom => {
            d.length_mm.get_or_insert(100.0);
            d.width_mm.get_or_insert(50.0);
            d.height_mm.get_or_insert(30.0);
        }
    }
    if *d != before {
        d.estimated = true;
    }
}

// --- LLM output ---

static FENCE_OPEN: LazyLock<Regex> = LazyLock::new(|| compile(r"^```(?:json)?\s*"));
static FENCE_CLOSE: LazyLock<Regex> = LazyLock::new(|| compile(r"\s*```$"));
static JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| compile(r"\{[\s\S]*\}"));

/// Parse a specification an LLM returned as text.
///
/// Markdown fences are stripped; if the remainder is not valid JSON, the
/// outermost `{ ... }` span is tried before giving up. Unstated geometry is
/// filled with device defaults, as for keyword parsing.
pub fn spec_from_llm_output(raw: &str) -> Result<DesignSpecification> {
    let trimmed = raw.trim();
    let unfenced = FENCE_OPEN.replace(trimmed, "");
    let unfenced = FENCE_CLOSE.replace(&unfenced, "");
    let mut spec: DesignSpecification = match serde_json::from_str(unfenced.trim()) {
        Ok(spec) => spec,
        Err(first) => {
            let Some(m) = JSON_OBJECT.find(&unfenced) else {
                return Err(CemError::Parse(format!("no JSON object in model output: {first}")));
            };
            serde_json::from_str(m.as_str())
                .map_err(|e| CemError::Parse(format!("invalid JSON in model output: {e}")))?
        }
    };
    spec.validate()?;
    apply_device_defaults(&mut spec);
    Ok(spec)
}
