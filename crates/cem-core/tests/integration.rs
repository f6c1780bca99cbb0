//! End-to-end checks across the pure pipeline:
//! prompt → spec → sourcing → shapes → validation → codegen → BOM.

use std::collections::BTreeMap;

use cem_core::{
    BomCategory, CodegenOptions, DeviceType, ManufacturingMethod, OptimizationGoal,
    generate_bom, min_wall_thickness, parse_prompt, plan_from_prompt, spec_from_llm_output,
};

const ARM_PROMPT: &str = "Design a lightweight 4-DOF robot arm with 400mm reach that can \
lift 1kg, printed in PETG. It should be cheap too.";

#[test]
fn parser_is_deterministic() {
    let first = parse_prompt(ARM_PROMPT);
    for _ in 0..10 {
        let again = parse_prompt(ARM_PROMPT);
        assert_eq!(again.specification.device_type, first.specification.device_type);
        assert_eq!(again.intent.optimization_goal, first.intent.optimization_goal);
        assert_eq!(again, first);
    }
    assert_eq!(first.specification.device_type, DeviceType::RobotArm);
    assert_eq!(first.intent.optimization_goal, Some(OptimizationGoal::Lightweight));
    assert_eq!(first.specification.motion.dof, Some(4));
    assert_eq!(first.specification.dimensions.reach_mm, Some(400.0));
    assert_eq!(first.specification.primary_material(), "PETG");
}

#[test]
fn documented_min_wall_thickness() {
    assert_eq!(min_wall_thickness("FDM"), Some(0.8));
    assert_eq!(min_wall_thickness("sla"), Some(0.4));
    assert_eq!(min_wall_thickness("SLS"), Some(0.7));
    assert_eq!(min_wall_thickness("cnc"), Some(1.0));
    assert_eq!(min_wall_thickness("hybrid"), Some(0.8));
    assert_eq!(min_wall_thickness("waterjet"), None);
}

#[test]
fn full_plan_to_bom() {
    let plan = plan_from_prompt(ARM_PROMPT, &CodegenOptions::default(), |_, _| {});
    assert!(plan.validation.iterations <= cem_core::MAX_FIX_ITERATIONS);
    assert!(plan.program.source.contains("Library.Go("));
    assert!(plan.lattice.is_some(), "lightweight goal enables lattice");

    let bom = generate_bom(
        &plan.specification,
        Some(plan.estimated_volume_cm3),
        &plan.sourcing,
        &BTreeMap::new(),
    );
    assert_eq!(bom.items[0].category, BomCategory::PrintedParts);
    let servos = bom
        .items
        .iter()
        .filter(|i| i.category == BomCategory::Electronics)
        .count();
    assert!(servos >= 1);

    let s = &bom.summary;
    let lines: f64 = bom.items.iter().map(|i| i.total_cost_usd).sum();
    assert!((s.subtotal_usd - lines).abs() < 1e-6);
    assert!((s.total_usd - (s.subtotal_usd + s.shipping_usd + s.tax_usd)).abs() < 1e-9);
    assert!((s.shipping_usd - s.subtotal_usd * 0.05).abs() <= 0.005 + 1e-9);
    assert!((s.tax_usd - s.subtotal_usd * 0.08).abs() <= 0.005 + 1e-9);
}

#[test]
fn llm_json_enters_same_pipeline() {
    let raw = "Here you go:\n```json\n{\"device_type\": \"gripper\", \"manufacturing\": \"CNC\", \
               \"materials\": [\"Aluminum_6061\"], \"loads\": {\"payload_kg\": 0.2}}\n```";
    let spec = spec_from_llm_output(raw).unwrap();
    assert_eq!(spec.device_type, DeviceType::Gripper);
    assert_eq!(spec.manufacturing, Some(ManufacturingMethod::Cnc));

    let plan = cem_core::plan_design(spec, &CodegenOptions::default(), |_, _| {});
    assert!(plan.lattice.is_none(), "machined parts get no lattice");
    let bom = generate_bom(
        &plan.specification,
        Some(plan.estimated_volume_cm3),
        &plan.sourcing,
        &BTreeMap::new(),
    );
    assert_eq!(bom.items[0].category, BomCategory::MachinedParts);
}
