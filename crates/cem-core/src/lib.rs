//! Computational engineering model (CEM) pipeline core.
//!
//! Turns a natural-language design prompt into an engineering specification,
//! sources components, picks parametric base shapes and lattice infill,
//! validates structural, thermal and manufacturing constraints, emits C# for
//! the PicoGK geometry kernel, analyzes the resulting STL and prices a bill
//! of materials.
//!
//! Zero I/O: the HTTP, subprocess, search and persistence layers live in the
//! `cem-store` and `cem-cli` crates.

pub mod autofix;
pub mod bom;
pub mod catalog;
pub mod clarify;
pub mod codegen;
pub mod conversation;
pub mod costing;
pub mod error;
pub mod lattice;
pub mod materials;
pub mod parser;
pub mod physics;
pub mod pipeline;
pub mod price;
pub mod refine;
pub mod rules;
pub mod shapes;
pub mod sourcing;
pub mod spec;
pub mod stl;
pub mod time;

pub use autofix::{AutoFixOutcome, FixAction, MAX_FIX_ITERATIONS, propose_fixes, validate_with_fixes};
pub use bom::{Bom, BomCategory, BomItem, BomSummary, PrintingCost, generate_bom, printing_cost};
pub use catalog::{CATALOG, CatalogEntry, ComponentPart};
pub use clarify::{AmbiguityAssessment, CLARIFICATION_THRESHOLD, assess_ambiguity};
pub use codegen::{CodegenOptions, GeneratedProgram, PROGRAM_FILE_NAME, generate_csharp};
pub use conversation::{ConversationContext, FeedbackKind, FeedbackResponse, RefineOutcome};
pub use error::{CemError, Result};
pub use lattice::{LatticeKind, LatticeParams, calculate_lattice};
pub use materials::Material;
pub use parser::{IntentAnalysis, ParsedPrompt, parse_prompt, spec_from_llm_output};
pub use physics::{CheckResult, ValidationReport, validate};
pub use pipeline::{DesignPlan, PipelineStep, plan_design, plan_from_prompt};
pub use price::{ExtractedPrice, PriceStats, extract_best_price, extract_prices};
pub use refine::{OptimizationSuggestions, apply_suggestions, suggest_optimizations};
pub use rules::{min_wall_thickness, rules_for};
pub use shapes::{BaseShape, ShapePart, ShapeRecommendation, recommend_shape};
pub use sourcing::{SourcingSummary, source_components};
pub use spec::{
    ComponentKind, ComponentRequest, DesignSpecification, DeviceType, ManufacturingMethod,
    OptimizationGoal,
};
pub use stl::{StlAnalysis, analyze_stl};
