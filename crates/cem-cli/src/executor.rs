//! Compiles and runs generated PicoGK programs with the dotnet CLI, then
//! collects the STL, its metadata and a mesh analysis.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::Value;
use tokio::process::Command;

use cem_core::costing::find_density;
use cem_core::{GeneratedProgram, StlAnalysis, analyze_stl};

use crate::config::Config;

/// Density used for mass estimates when the material is unknown, g/cm³.
const FALLBACK_DENSITY: f64 = 1.25;
const MAX_ERROR_LINES: usize = 20;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stl_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<StlAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mass_g: Option<f64>,
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    pub build_time_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    fn failed(error: impl Into<String>, stdout: String, stderr: String, started: Instant) -> Self {
        Self {
            success: false,
            stdout,
            stderr,
            build_time_secs: started.elapsed().as_secs_f64(),
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

struct CommandOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

#[derive(Debug, Clone)]
pub struct Executor {
    project_dir: PathBuf,
    output_dir: PathBuf,
    dotnet: String,
    build_timeout: Duration,
    run_timeout: Duration,
}

impl Executor {
    pub fn new(config: &Config) -> Self {
        Self {
            project_dir: config.csharp_project_path.clone(),
            output_dir: config.output_dir.clone(),
            dotnet: config.executor.dotnet.clone(),
            build_timeout: Duration::from_secs(config.executor.build_timeout_secs),
            run_timeout: Duration::from_secs(config.executor.run_timeout_secs),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    async fn run_command(&self, args: &[&str], limit: Duration) -> Result<CommandOutput> {
        tracing::debug!(dotnet = %self.dotnet, ?args, dir = %self.project_dir.display(), "running");
        let child = Command::new(&self.dotnet)
            .args(args)
            .current_dir(&self.project_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start {}", self.dotnet))?;

        // Dropping the future on timeout kills the child.
        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(out) => out.context("failed to wait for dotnet")?,
            Err(_) => bail!("Command timed out after {}s", limit.as_secs()),
        };
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Write `program` into the C# project, build it, run it headless and
    /// gather the outputs. Failures are reported in the result, not as `Err`.
    pub async fn execute(&self, program: &GeneratedProgram, material: &str) -> ExecutionResult {
        let started = Instant::now();
        if let Err(e) = self.prepare(program) {
            tracing::error!(error = %e, "failed to prepare C# project");
            return ExecutionResult::failed(format!("{e:#}"), String::new(), String::new(), started);
        }

        match self.run_command(&["clean"], self.build_timeout).await {
            Ok(out) if !out.success => tracing::warn!("dotnet clean failed; building anyway"),
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "dotnet clean failed");
                return ExecutionResult::failed(format!("{e:#}"), String::new(), String::new(), started);
            }
        }

        tracing::info!(project = %self.project_dir.display(), "building C# project");
        let build_log = self.output_dir.join("build.log");
        let build = match self
            .run_command(&["build", "--configuration", "Release"], self.build_timeout)
            .await
        {
            Ok(out) => out,
            Err(e) => {
                tracing::error!(error = %e, "dotnet build failed");
                return ExecutionResult::failed(format!("{e:#}"), String::new(), String::new(), started);
            }
        };
        write_log(&build_log, &build.stdout, &build.stderr, "BUILD");
        if !build.success {
            let errors = summarize_build_errors(&format!("{}\n{}", build.stdout, build.stderr));
            tracing::error!(log = %build_log.display(), "build failed");
            return ExecutionResult::failed(
                format!("Build failed. See {}\n{errors}", build_log.display()),
                build.stdout,
                build.stderr,
                started,
            );
        }

        tracing::info!("running generated program");
        let run = match self
            .run_command(
                &["run", "--configuration", "Release", "--no-build", "--", "--headless"],
                self.run_timeout,
            )
            .await
        {
            Ok(out) => out,
            Err(e) => {
                tracing::error!(error = %e, "generated program did not finish");
                return ExecutionResult::failed(format!("{e:#}"), String::new(), String::new(), started);
            }
        };
        write_log(&self.output_dir.join("execution.log"), &run.stdout, &run.stderr, "EXECUTION");
        if !run.success {
            tracing::error!("generated program exited with an error");
            let detail = if run.stderr.trim().is_empty() { &run.stdout } else { &run.stderr };
            return ExecutionResult::failed(
                format!("Execution failed: {}", last_lines(detail, MAX_ERROR_LINES)),
                run.stdout,
                run.stderr,
                started,
            );
        }

        let stl_path = match locate_stl(&self.project_dir, &self.output_dir, &program.output_name) {
            Ok(Some(p)) => p,
            Ok(None) => {
                return ExecutionResult::failed(
                    "Program finished but produced no STL file",
                    run.stdout,
                    run.stderr,
                    started,
                );
            }
            Err(e) => {
                return ExecutionResult::failed(format!("{e:#}"), run.stdout, run.stderr, started);
            }
        };

        let metadata = load_metadata(&self.output_dir, &program.output_name);
        let analysis = match std::fs::read(&stl_path) {
            Ok(bytes) => analyze_stl(&bytes)
                .inspect_err(|e| tracing::warn!(error = %e, "STL analysis failed"))
                .ok(),
            Err(e) => {
                tracing::warn!(path = %stl_path.display(), error = %e, "cannot read STL");
                None
            }
        };
        let density = find_density(material).unwrap_or(FALLBACK_DENSITY);
        let mass_g = analysis.as_ref().map(|a| a.mass_g(density));

        tracing::info!(stl = %stl_path.display(), elapsed_ms = started.elapsed().as_millis() as u64, "design generated");
        ExecutionResult {
            success: true,
            stl_path: Some(stl_path),
            metadata,
            analysis,
            mass_g,
            stdout: run.stdout,
            stderr: String::new(),
            build_time_secs: started.elapsed().as_secs_f64(),
            error: None,
        }
    }

    fn prepare(&self, program: &GeneratedProgram) -> Result<()> {
        if !self.project_dir.is_dir() {
            bail!("C# project not found at {}", self.project_dir.display());
        }
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("failed to create {}", self.output_dir.display()))?;
        let path = self.project_dir.join(&program.file_name);
        std::fs::write(&path, &program.source)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::debug!(path = %path.display(), bytes = program.source.len(), "wrote program");
        Ok(())
    }
}

fn write_log(path: &Path, stdout: &str, stderr: &str, label: &str) {
    let mut text = format!("=== {label} OUTPUT ===\n{stdout}");
    if !stderr.trim().is_empty() {
        text.push_str(&format!("\n=== {label} ERRORS ===\n{stderr}"));
    }
    if let Err(e) = std::fs::write(path, text) {
        tracing::error!(path = %path.display(), error = %e, "failed to write log");
    }
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

/// Compiler diagnostics from build output, last `MAX_ERROR_LINES` only.
pub fn summarize_build_errors(output: &str) -> String {
    let errors: Vec<&str> = output
        .lines()
        .filter(|l| {
            l.contains("error CS")
                || l.contains("error:")
                || l.contains("Error:")
                || l.contains("Cannot find")
        })
        .map(str::trim)
        .collect();
    if errors.is_empty() {
        return last_lines(output, MAX_ERROR_LINES);
    }
    errors[errors.len().saturating_sub(MAX_ERROR_LINES)..].join("\n")
}

/// Find `<name>.stl` in the output directory, or move a stray STL the
/// program left in the project directory there.
pub fn locate_stl(project_dir: &Path, output_dir: &Path, name: &str) -> Result<Option<PathBuf>> {
    let target = output_dir.join(format!("{name}.stl"));
    if target.is_file() {
        return Ok(Some(target));
    }
    let entries = match std::fs::read_dir(project_dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(None),
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("stl"))
        {
            if std::fs::rename(&path, &target).is_err() {
                // Cross-device moves need a copy.
                std::fs::copy(&path, &target)
                    .with_context(|| format!("failed to move {}", path.display()))?;
                let _ = std::fs::remove_file(&path);
            }
            tracing::debug!(from = %path.display(), to = %target.display(), "moved STL");
            return Ok(Some(target));
        }
    }
    Ok(None)
}

fn load_metadata(output_dir: &Path, name: &str) -> Option<Value> {
    let path = output_dir.join(format!("{name}_meta.json"));
    let text = std::fs::read_to_string(&path).ok()?;
    serde_json::from_str(&text)
        .inspect_err(|e| tracing::warn!(path = %path.display(), error = %e, "invalid metadata"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_summarize_build_errors() {
        let out = "Restoring...\n  Foo.cs(3,1): error CS1002: ; expected\nwarning CS0168\n  Cannot find project\n";
        let summary = summarize_build_errors(out);
        assert_eq!(summary, "Foo.cs(3,1): error CS1002: ; expected\nCannot find project");

        let many: String = (0..30).map(|i| format!("error CS{i:04}: bad\n")).collect();
        let summary = summarize_build_errors(&many);
        assert_eq!(summary.lines().count(), MAX_ERROR_LINES);
        assert!(summary.starts_with("error CS0010"));

        assert_eq!(summarize_build_errors("just output"), "just output");
    }

    #[test]
    fn test_locate_stl_moves_stray_file() {
        let project = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        assert!(locate_stl(project.path(), output.path(), "arm").unwrap().is_none());

        std::fs::write(project.path().join("Result.STL"), TETRA).unwrap();
        let found = locate_stl(project.path(), output.path(), "arm").unwrap().unwrap();
        assert_eq!(found, output.path().join("arm.stl"));
        assert!(found.is_file());
        assert!(!project.path().join("Result.STL").exists());

        // Already in place on the second call.
        assert_eq!(locate_stl(project.path(), output.path(), "arm").unwrap(), Some(found));
    }

    #[tokio::test]
    async fn test_missing_project_is_reported() {
        let out = tempfile::tempdir().unwrap();
        let config = Config {
            csharp_project_path: out.path().join("nope"),
            output_dir: out.path().to_path_buf(),
            ..Config::default()
        };
        let program = GeneratedProgram {
            file_name: "GeneratedDesign.cs".into(),
            output_name: "x".into(),
            source: "class X {}".into(),
        };
        let result = Executor::new(&config).execute(&program, "PLA").await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("C# project not found"));
    }

    #[cfg(unix)]
    fn fake_dotnet(dir: &Path, build_body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let script = dir.join("dotnet");
        let body = format!(
            "#!/bin/sh\ncase \"$1\" in\n  clean) echo cleaned ;;\n  build) {build_body} ;;\n  run) cat > part.stl <<'EOF'\n{TETRA}EOF\n  echo generated ;;\nesac\n"
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    fn fake_config(root: &Path, build_body: &str) -> Config {
        let project = root.join("project");
        std::fs::create_dir_all(&project).unwrap();
        let dotnet = fake_dotnet(root, build_body);
        let mut config = Config {
            csharp_project_path: project,
            output_dir: root.join("out"),
            ..Config::default()
        };
        config.executor.dotnet = dotnet.display().to_string();
        config
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_with_fake_toolchain() {
        let root = tempfile::tempdir().unwrap();
        let config = fake_config(root.path(), "echo 'Build succeeded.'");
        let program = GeneratedProgram {
            file_name: "GeneratedDesign.cs".into(),
            output_name: "tetra".into(),
            source: "// generated".into(),
        };
        let result = Executor::new(&config).execute(&program, "PLA").await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.stl_path.as_deref(), Some(root.path().join("out/tetra.stl").as_path()));
        let analysis = result.analysis.unwrap();
        assert_eq!(analysis.faces, 4);
        assert!((result.mass_g.unwrap() - analysis.volume_cm3 * 1.24).abs() < 1e-9);
        assert!(result.stdout.contains("generated"));

        assert!(root.path().join("project/GeneratedDesign.cs").is_file());
        let build_log = std::fs::read_to_string(root.path().join("out/build.log")).unwrap();
        assert!(build_log.starts_with("=== BUILD OUTPUT ==="));
        assert!(root.path().join("out/execution.log").is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_build_failure_surfaces_compiler_errors() {
        let root = tempfile::tempdir().unwrap();
        let config = fake_config(
            root.path(),
            "echo 'GeneratedDesign.cs(4,9): error CS0103: name does not exist'; exit 1",
        );
        let program = GeneratedProgram {
            file_name: "GeneratedDesign.cs".into(),
            output_name: "broken".into(),
            source: "// broken".into(),
        };
        let result = Executor::new(&config).execute(&program, "PLA").await;
        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.starts_with("Build failed. See"));
        assert!(error.contains("error CS0103"));
    }
}
