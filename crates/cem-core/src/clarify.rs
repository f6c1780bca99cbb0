//! Confidence scoring and clarification questions for parsed specifications.

use serde::{Deserialize, Serialize};

use crate::spec::{DesignSpecification, DeviceType};

/// Below this confidence the caller should ask before building.
pub const CLARIFICATION_THRESHOLD: f64 = 0.7;
pub const MAX_QUESTIONS: usize = 3;

const CRITICAL_PENALTY: f64 = 0.15;
const SECONDARY_PENALTY: f64 = 0.05;
const ESTIMATED_PENALTY: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingField {
    DeviceType,
    Dimensions,
    Loads,
    Materials,
    Manufacturing,
    Environment,
    Requirements,
}

impl MissingField {
    fn is_critical(self) -> bool {
        matches!(
            self,
            MissingField::DeviceType
                | MissingField::Dimensions
                | MissingField::Loads
                | MissingField::Materials
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbiguityAssessment {
    pub confidence: f64,
    /// Missing critical fields only; secondary gaps lower the score silently.
    pub missing_fields: Vec<MissingField>,
    pub clarification_needed: bool,
    pub questions: Vec<String>,
}

/// Score how much of a specification was actually stated.
pub fn assess_ambiguity(spec: &DesignSpecification) -> AmbiguityAssessment {
    let mut confidence = 1.0_f64;
    let mut missing = Vec::new();

    let checks = [
        (MissingField::DeviceType, spec.device_type == DeviceType::Custom),
        (MissingField::Dimensions, spec.dimensions.is_empty()),
        (MissingField::Loads, spec.loads.is_empty()),
        (MissingField::Materials, spec.materials.is_empty()),
        (MissingField::Manufacturing, spec.manufacturing.is_none()),
        (MissingField::Environment, spec.environment.is_none()),
        (MissingField::Requirements, spec.requirements.is_none()),
    ];
    for (field, absent) in checks {
        if !absent {
            continue;
        }
        if field.is_critical() {
            confidence -= CRITICAL_PENALTY;
            missing.push(field);
        } else {
            confidence -= SECONDARY_PENALTY;
        }
    }
    if spec.dimensions.estimated {
        confidence -= ESTIMATED_PENALTY;
    }
    let confidence = confidence.max(0.0);
    let clarification_needed = confidence < CLARIFICATION_THRESHOLD;
    let questions = if clarification_needed {
        clarification_questions(confidence, &missing, spec.manufacturing.is_none())
    } else {
        Vec::new()
    };

    AmbiguityAssessment {
        confidence,
        missing_fields: missing,
        clarification_needed,
        questions,
    }
}

/// Most important questions first, capped at `MAX_QUESTIONS`.
fn clarification_questions(
    confidence: f64,
    missing: &[MissingField],
    no_manufacturing: bool,
) -> Vec<String> {
    let mut questions = Vec::new();
    if confidence < 0.6 {
        questions.push("Could you describe the primary function of this device?".to_string());
    }
    for field in missing {
        let q = match field {
            MissingField::DeviceType => {
                "What type of device are we building? (robot_arm, gripper, linear_actuator, pan_tilt)"
            }
            MissingField::Dimensions => {
                "What are the approximate dimensions or working space (in mm)?"
            }
            MissingField::Loads => "What's the expected payload or force this needs to handle?",
            MissingField::Materials => {
                "Any material preferences? (plastic, metal, composite, etc.)"
            }
            _ => continue,
        };
        questions.push(q.to_string());
    }
    if no_manufacturing {
        questions.push(
            "How do you plan to manufacture this? (3D printing, CNC, assembled, etc.)".to_string(),
        );
    }
    questions.truncate(MAX_QUESTIONS);
    questions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_prompt;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_spec_scores_low() {
        let spec = DesignSpecification::default();
        let a = assess_ambiguity(&spec);
        // 4 critical + 3 secondary missing
        assert_relative_eq!(a.confidence, 1.0 - 0.6 - 0.15, epsilon = 1e-9);
        assert!(a.clarification_needed);
        assert_eq!(a.questions.len(), MAX_QUESTIONS);
        assert_eq!(a.missing_fields.len(), 4);
    }

    #[test]
    fn test_detailed_prompt_needs_no_clarification() {
        let parsed = parse_prompt(
            "lightweight 3-DOF robotic arm with 500mm reach and 2kg payload, 3D printed in PLA",
        );
        let a = assess_ambiguity(&parsed.specification);
        assert!(!a.clarification_needed, "confidence {}", a.confidence);
        assert!(a.questions.is_empty());
    }

    #[test]
    fn test_estimated_dimensions_penalized() {
        let mut spec = DesignSpecification::new(DeviceType::Gripper);
        spec.dimensions.length_mm = Some(50.0);
        let before = assess_ambiguity(&spec).confidence;
        spec.dimensions.estimated = true;
        let after = assess_ambiguity(&spec).confidence;
        assert_relative_eq!(before - after, 0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_confidence_never_negative() {
        let mut spec = DesignSpecification::default();
        spec.dimensions.estimated = true;
        assert!(assess_ambiguity(&spec).confidence >= 0.0);
    }
}
