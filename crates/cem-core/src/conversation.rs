//! Per-session design conversation: the current specification, its
//! refinement history and user feedback.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::clarify::AmbiguityAssessment;
use crate::error::CemError;
use crate::refine::{OptimizationSuggestions, apply_suggestions, suggest_optimizations};
use crate::spec::{DesignSpecification, DeviceType, OptimizationGoal};
use crate::time;

pub const MAX_REFINEMENT_ITERATIONS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<DeviceType>,
    pub initial_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specification: Option<DesignSpecification>,
    pub history: Vec<HistoryEntry>,
    pub refinement_iterations: u32,
    pub max_iterations: u32,
    pub confidence_score: f64,
    pub created_at: String,
}

/// Result of one refinement request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefineOutcome {
    Refined {
        iteration: u32,
        suggestions: OptimizationSuggestions,
        updated_specification: DesignSpecification,
        feedback_received: String,
    },
    MaxIterationsReached {
        final_specification: DesignSpecification,
    },
    NoSpecification,
}

impl ConversationContext {
    pub fn new(session_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            device_type: None,
            initial_prompt: prompt.into(),
            specification: None,
            history: Vec::new(),
            refinement_iterations: 0,
            max_iterations: MAX_REFINEMENT_ITERATIONS,
            confidence_score: 0.0,
            created_at: time::now_iso8601(),
        }
    }

    /// Store a freshly parsed specification with its assessment.
    pub fn record_specification(&mut self, spec: DesignSpecification, assessment: &AmbiguityAssessment) {
        self.device_type = Some(spec.device_type);
        self.confidence_score = assessment.confidence;
        self.specification = Some(spec);
    }

    fn push_history(&mut self, kind: &str, text: Option<&str>) {
        self.history.push(HistoryEntry {
            kind: kind.to_string(),
            text: text.map(str::to_string),
            timestamp: time::now_iso8601(),
        });
    }

    /// Refine toward `goal`, counting against the iteration limit.
    pub fn refine(&mut self, feedback: &str, goal: Option<OptimizationGoal>) -> RefineOutcome {
        let Some(spec) = self.specification.clone() else {
            return RefineOutcome::NoSpecification;
        };
        if self.refinement_iterations >= self.max_iterations {
            return RefineOutcome::MaxIterationsReached {
                final_specification: spec,
            };
        }
        self.refinement_iterations += 1;
        let goal = goal.or_else(|| spec.primary_goal());
        let suggestions = suggest_optimizations(&spec, goal);
        let updated = if goal.is_some() {
            apply_suggestions(&spec, &suggestions)
        } else {
            spec
        };
        self.specification = Some(updated.clone());
        self.push_history("refine", Some(feedback));
        RefineOutcome::Refined {
            iteration: self.refinement_iterations,
            suggestions,
            updated_specification: updated,
            feedback_received: feedback.to_string(),
        }
    }

    /// Respond to feedback on the current design. `None` when there is no
    /// design to talk about.
    pub fn handle_feedback(
        &mut self,
        kind: FeedbackKind,
        text: Option<&str>,
    ) -> Option<FeedbackResponse> {
        let spec = self.specification.as_ref()?;
        let response = match kind {
            FeedbackKind::Like => FeedbackResponse {
                message: "Great! Ready to generate CAD files and BOM?".into(),
                next_steps: vec!["generate_cad".into(), "generate_bom".into(), "export".into()],
                suggestions: None,
                optimization: None,
            },
            FeedbackKind::Dislike => FeedbackResponse {
                message: "I understand. What specifically would you like to change?".into(),
                next_steps: vec!["clarification".into()],
                suggestions: Some(suggest_optimizations(spec, spec.primary_goal())),
                optimization: None,
            },
            FeedbackKind::Modify => FeedbackResponse {
                message: format!(
                    "Got it. Modifying design based on: {}",
                    text.unwrap_or("your notes")
                ),
                next_steps: vec!["refinement".into()],
                suggestions: None,
                optimization: None,
            },
            FeedbackKind::Simplify => FeedbackResponse {
                message: "Simplifying design for cost-effectiveness...".into(),
                next_steps: vec!["optimization".into()],
                suggestions: None,
                optimization: Some(OptimizationGoal::CostEffective),
            },
            FeedbackKind::Complex => FeedbackResponse {
                message: "Adding advanced features...".into(),
                next_steps: vec!["optimization".into()],
                suggestions: None,
                optimization: Some(OptimizationGoal::HighPrecision),
            },
        };
        self.push_history(kind.as_str(), text);
        Some(response)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Like,
    Dislike,
    Modify,
    Simplify,
    Complex,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackKind::Like => "like",
            FeedbackKind::Dislike => "dislike",
            FeedbackKind::Modify => "modify",
            FeedbackKind::Simplify => "simplify",
            FeedbackKind::Complex => "complex",
        }
    }
}

impl fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackKind {
    type Err = CemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "like" => Ok(FeedbackKind::Like),
            "dislike" => Ok(FeedbackKind::Dislike),
            "modify" => Ok(FeedbackKind::Modify),
            "simplify" => Ok(FeedbackKind::Simplify),
            "complex" => Ok(FeedbackKind::Complex),
            other => Err(CemError::Parse(format!("unknown feedback type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackResponse {
    pub message: String,
    pub next_steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<OptimizationSuggestions>,
    /// Goal the client should optimize toward next.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimization: Option<OptimizationGoal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clarify::assess_ambiguity;

    fn with_spec() -> ConversationContext {
        let mut ctx = ConversationContext::new("s1", "a robot arm");
        let spec = DesignSpecification::new(DeviceType::RobotArm);
        let assessment = assess_ambiguity(&spec);
        ctx.record_specification(spec, &assessment);
        ctx
    }

    #[test]
    fn test_refine_without_spec() {
        let mut ctx = ConversationContext::new("s1", "x");
        assert_eq!(ctx.refine("lighter", None), RefineOutcome::NoSpecification);
    }

    #[test]
    fn test_refine_counts_and_caps() {
        let mut ctx = with_spec();
        for i in 1..=MAX_REFINEMENT_ITERATIONS {
            match ctx.refine("make it lighter", Some(OptimizationGoal::Lightweight)) {
                RefineOutcome::Refined { iteration, .. } => assert_eq!(iteration, i),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(matches!(
            ctx.refine("again", None),
            RefineOutcome::MaxIterationsReached { .. }
        ));
        assert_eq!(ctx.history.len(), MAX_REFINEMENT_ITERATIONS as usize);
    }

    #[test]
    fn test_refine_applies_goal() {
        let mut ctx = with_spec();
        ctx.refine("cheaper please", Some(OptimizationGoal::CostEffective));
        let spec = ctx.specification.unwrap();
        assert_eq!(spec.infill_percent(), 20.0);
        assert_eq!(spec.primary_goal(), Some(OptimizationGoal::CostEffective));
    }

    #[test]
    fn test_feedback_kinds() {
        let mut ctx = with_spec();
        let r = ctx.handle_feedback(FeedbackKind::Simplify, None).unwrap();
        assert_eq!(r.optimization, Some(OptimizationGoal::CostEffective));
        let r = ctx.handle_feedback(FeedbackKind::Modify, Some("thicker base")).unwrap();
        assert!(r.message.ends_with("thicker base"));
        assert_eq!(ctx.history.len(), 2);
        assert_eq!(ctx.history[1].kind, "modify");
    }

    #[test]
    fn test_feedback_needs_design() {
        let mut ctx = ConversationContext::new("s2", "x");
        assert!(ctx.handle_feedback(FeedbackKind::Like, None).is_none());
    }

    #[test]
    fn test_feedback_kind_parsing() {
        assert_eq!("Dislike".parse::<FeedbackKind>().unwrap(), FeedbackKind::Dislike);
        assert!("meh".parse::<FeedbackKind>().is_err());
    }
}
