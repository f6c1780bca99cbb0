//! The pure part of the design pipeline: everything from a specification up
//! to generated code. Compilation, execution and live pricing happen in the
//! caller.

use serde::{Deserialize, Serialize};

use crate::autofix::{AutoFixOutcome, validate_with_fixes};
use crate::clarify::{AmbiguityAssessment, assess_ambiguity};
use crate::codegen::{CodegenOptions, GeneratedProgram, generate_csharp};
use crate::lattice::{LatticeParams, calculate_lattice};
use crate::parser::{IntentAnalysis, parse_prompt};
use crate::shapes::{ShapeRecommendation, recommend_shape};
use crate::sourcing::{SourcingSummary, source_components};
use crate::spec::DesignSpecification;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Parse,
    Source,
    Shape,
    Lattice,
    Validate,
    Codegen,
    Execute,
    Bom,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; 8] = [
        PipelineStep::Parse,
        PipelineStep::Source,
        PipelineStep::Shape,
        PipelineStep::Lattice,
        PipelineStep::Validate,
        PipelineStep::Codegen,
        PipelineStep::Execute,
        PipelineStep::Bom,
    ];

    /// 1-based position in the pipeline.
    pub fn number(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).map_or(0, |i| i + 1)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Parse => "parse",
            PipelineStep::Source => "source",
            PipelineStep::Shape => "shape",
            PipelineStep::Lattice => "lattice",
            PipelineStep::Validate => "validate",
            PipelineStep::Codegen => "codegen",
            PipelineStep::Execute => "execute",
            PipelineStep::Bom => "bom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignPlan {
    /// Specification after auto-fix.
    pub specification: DesignSpecification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentAnalysis>,
    pub assessment: AmbiguityAssessment,
    pub sourcing: SourcingSummary,
    pub shapes: ShapeRecommendation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lattice: Option<LatticeParams>,
    pub validation: AutoFixOutcome,
    pub program: GeneratedProgram,
    /// Body volume estimate used when no STL is available.
    pub estimated_volume_cm3: f64,
}

/// Shape volume less the lattice weight reduction, cm³.
pub fn estimated_volume_cm3(shapes: &ShapeRecommendation, lattice: Option<&LatticeParams>) -> f64 {
    let solid = shapes.total_volume_mm3() / 1000.0;
    solid * (1.0 - lattice.map_or(0.0, |l| l.estimated_weight_reduction))
}

/// Run source → shape → lattice → validate/fix → codegen over `spec`.
///
/// `observe` is called once per completed step with a short summary.
pub fn plan_design(
    spec: DesignSpecification,
    opts: &CodegenOptions,
    mut observe: impl FnMut(PipelineStep, String),
) -> DesignPlan {
    let assessment = assess_ambiguity(&spec);

    let mut sourcing = source_components(&spec);
    observe(
        PipelineStep::Source,
        format!(
            "{} parts, {} unresolved, ${:.2}",
            sourcing.parts.len(),
            sourcing.unresolved.len(),
            sourcing.total_cost
        ),
    );

    let mut shapes = recommend_shape(&spec);
    observe(
        PipelineStep::Shape,
        format!("{} ({})", shapes.primary.shape.kernel_class(), shapes.rationale),
    );

    let mut lattice = calculate_lattice(&spec, &shapes.primary.shape);
    observe(
        PipelineStep::Lattice,
        lattice.as_ref().map_or_else(
            || "no lattice".to_string(),
            |l| format!("{:?} cell {:.1} mm beam {:.2} mm", l.kind, l.cell_size_mm, l.beam_thickness_mm),
        ),
    );

    let validation = validate_with_fixes(spec);
    if validation.iterations > 0 {
        // Fixes can grow the geometry and with it the required torque.
        sourcing = source_components(&validation.specification);
        shapes = recommend_shape(&validation.specification);
        lattice = calculate_lattice(&validation.specification, &shapes.primary.shape);
    }
    observe(
        PipelineStep::Validate,
        if validation.iterations > 0 {
            format!(
                "valid={} after {} fix iteration(s), re-sourced {} parts (${:.2})",
                validation.report.structurally_and_thermally_valid(),
                validation.iterations,
                sourcing.parts.len(),
                sourcing.total_cost
            )
        } else {
            format!(
                "valid={} after 0 fix iteration(s)",
                validation.report.structurally_and_thermally_valid()
            )
        },
    );

    let program = generate_csharp(&validation.specification, &shapes, lattice.as_ref(), opts);
    observe(
        PipelineStep::Codegen,
        format!("{} ({} bytes)", program.file_name, program.source.len()),
    );

    DesignPlan {
        specification: validation.specification.clone(),
        intent: None,
        assessment,
        sourcing,
        estimated_volume_cm3: estimated_volume_cm3(&shapes, lattice.as_ref()),
        shapes,
        lattice,
        validation,
        program,
    }
}

/// Parse `prompt` with the keyword matcher, then `plan_design`.
pub fn plan_from_prompt(
    prompt: &str,
    opts: &CodegenOptions,
    mut observe: impl FnMut(PipelineStep, String),
) -> DesignPlan {
    let parsed = parse_prompt(prompt);
    observe(
        PipelineStep::Parse,
        format!(
            "{} (specificity {:.2})",
            parsed.specification.device_type, parsed.intent.specificity
        ),
    );
    let mut plan = plan_design(parsed.specification, opts, observe);
    plan.intent = Some(parsed.intent);
    plan
}
