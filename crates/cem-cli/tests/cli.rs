//! CLI command integration tests.
//! Each test points DATABASE_URL at a temp directory for full isolation.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cem_cmd(dir: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("cem").unwrap();
    cmd.env_remove("CEM_CONFIG")
        .env_remove("REDIS_URL")
        .env("DATABASE_URL", dir.path().join("cem.db"))
        .env("OUTPUT_DIR", dir.path().join("output"));
    cmd
}

const TETRA: &str = "solid t
facet normal 0 0 -1
outer loop
vertex 0 0 0
vertex 0 10 0
vertex 10 0 0
endloop
endfacet
facet normal 0 -1 0
outer loop
vertex 0 0 0
vertex 10 0 0
vertex 0 0 10
endloop
endfacet
facet normal -1 0 0
outer loop
vertex 0 0 0
vertex 0 0 10
vertex 0 10 0
endloop
endfacet
facet normal 1 1 1
outer loop
vertex 10 0 0
vertex 0 10 0
vertex 0 0 10
endloop
endfacet
endsolid t
";

#[test]
fn parse_prints_specification() {
    let dir = TempDir::new().unwrap();
    let output = cem_cmd(&dir)
        .args(["parse", "pan-tilt camera mount in PETG"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["source"], "keywords");
    assert_eq!(json["specification"]["device_type"], "pan_tilt");
    assert!(json["assessment"]["confidence"].is_number());
}

#[test]
fn parts_seed_list_export_import() {
    let dir = TempDir::new().unwrap();

    cem_cmd(&dir)
        .args(["parts", "seed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("seeded 5 part(s)"));

    // Seeding again adds nothing
    cem_cmd(&dir)
        .args(["parts", "seed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("seeded 0 part(s)"));

    cem_cmd(&dir)
        .args(["parts", "list", "--category", "servo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SG90"))
        .stdout(predicate::str::contains("MG996R"))
        .stdout(predicate::str::contains("608ZZ").not());

    let export = dir.path().join("parts.json");
    cem_cmd(&dir)
        .args(["parts", "export"])
        .arg(&export)
        .assert()
        .success()
        .stdout(predicate::str::contains("exported to"));
    assert!(export.exists());

    let other = TempDir::new().unwrap();
    cem_cmd(&other)
        .args(["parts", "import"])
        .arg(&export)
        .assert()
        .success()
        .stdout(predicate::str::contains("imported 5 part(s)"));
    cem_cmd(&other)
        .args(["parts", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("17HS4401"));
}

#[test]
fn parts_list_empty_db() {
    let dir = TempDir::new().unwrap();
    cem_cmd(&dir)
        .args(["parts", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(no parts)"));
}

#[test]
fn tool_density_then_cache_stats() {
    let dir = TempDir::new().unwrap();
    let output = cem_cmd(&dir)
        .args(["tool", "density_lookup", r#"{"material_name": "steel", "unit": "kg/m3"}"#])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["status"], "success");
    assert_eq!(json["density"], 7850.0);

    cem_cmd(&dir)
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("entries:    1"))
        .stdout(predicate::str::contains("density"));

    cem_cmd(&dir)
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cleared 1 entry"));
}

#[test]
fn unknown_tool_fails() {
    let dir = TempDir::new().unwrap();
    cem_cmd(&dir)
        .args(["tool", "weather"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown tool: weather"));
}

#[test]
fn analyze_stl_file() {
    let dir = TempDir::new().unwrap();
    let stl = dir.path().join("tetra.stl");
    std::fs::write(&stl, TETRA).unwrap();

    cem_cmd(&dir)
        .arg("analyze")
        .arg(&stl)
        .assert()
        .success()
        .stdout(predicate::str::contains("faces:      4"))
        .stdout(predicate::str::contains("volume:     0.167 cm³"))
        .stdout(predicate::str::contains("watertight: true"));
}

#[test]
fn jobs_fresh_db() {
    let dir = TempDir::new().unwrap();
    cem_cmd(&dir)
        .arg("jobs")
        .assert()
        .success()
        .stdout(predicate::str::contains("(no jobs)"));
}
