//! End-to-end design workflow: plan, compile and run, then price the bill of
//! materials. Progress is logged per step and optionally streamed as events.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use cem_core::{
    AutoFixOutcome, Bom, CodegenOptions, DesignSpecification, PipelineStep, SourcingSummary,
    generate_bom, plan_design,
};
use cem_store::Store;

use crate::executor::{ExecutionResult, Executor};
use crate::tools::{PriceTools, ProductPriceRequest};

fn default_output_name() -> String {
    "generated_design".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowOptions {
    #[serde(default = "default_output_name")]
    pub output_name: String,
    /// Only `execute` and `bom` can be skipped; the planning steps always run.
    #[serde(default)]
    pub skip_steps: Vec<PipelineStep>,
    /// Look up current part prices on the web for the BOM.
    #[serde(default)]
    pub live_pricing: bool,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            output_name: default_output_name(),
            skip_steps: Vec::new(),
            live_pricing: false,
        }
    }
}

/// Steps a caller may skip. The planning steps feed everything after them.
pub const SKIPPABLE_STEPS: [PipelineStep; 2] = [PipelineStep::Execute, PipelineStep::Bom];

impl WorkflowOptions {
    fn skips(&self, step: PipelineStep) -> bool {
        self.skip_steps.contains(&step)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    Started {
        workflow_id: Uuid,
    },
    StepCompleted {
        step: PipelineStep,
        number: usize,
        summary: String,
    },
    StepFailed {
        step: PipelineStep,
        error: String,
    },
    Finished {
        result: Box<WorkflowResult>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub success: bool,
    pub workflow_id: Uuid,
    pub steps_completed: Vec<PipelineStep>,
    pub specification: DesignSpecification,
    pub sourcing_summary: SourcingSummary,
    pub validation_report: AutoFixOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_status: Option<ExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bom: Option<Bom>,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct Orchestrator {
    executor: Executor,
    tools: PriceTools,
    store: Arc<Mutex<Store>>,
}

type EventSink = Option<mpsc::UnboundedSender<WorkflowEvent>>;

fn emit(sink: &EventSink, event: WorkflowEvent) {
    // The receiver may have gone away; the workflow still finishes.
    if let Some(tx) = sink {
        let _ = tx.send(event);
    }
}

impl Orchestrator {
    pub fn new(executor: Executor, tools: PriceTools, store: Arc<Mutex<Store>>) -> Self {
        Self {
            executor,
            tools,
            store,
        }
    }

    pub fn store(&self) -> &Arc<Mutex<Store>> {
        &self.store
    }

    pub fn tools(&self) -> &PriceTools {
        &self.tools
    }

    /// Run the workflow for `spec`. Failures of individual steps are recorded
    /// in `errors`; the result is always returned.
    pub async fn run(
        &self,
        prompt: &str,
        spec: DesignSpecification,
        opts: &WorkflowOptions,
        sink: EventSink,
    ) -> WorkflowResult {
        let workflow_id = self.start_job(prompt).await;
        emit(&sink, WorkflowEvent::Started { workflow_id });
        tracing::info!(%workflow_id, device = %spec.device_type, "workflow started");

        let spec_value = serde_json::to_value(&spec).unwrap_or_default();
        if let Err(e) = self.store.lock().await.mark_job_running(workflow_id, &spec_value) {
            tracing::error!(%workflow_id, error = %e, "failed to update job");
        }

        let codegen = CodegenOptions {
            output_name: opts.output_name.clone(),
            output_dir: absolute_dir(self.executor.output_dir()),
            ..CodegenOptions::default()
        };

        let mut steps_completed = vec![PipelineStep::Parse];
        emit(
            &sink,
            WorkflowEvent::StepCompleted {
                step: PipelineStep::Parse,
                number: PipelineStep::Parse.number(),
                summary: spec.device_type.to_string(),
            },
        );
        let plan = plan_design(spec, &codegen, |step, summary| {
            tracing::info!(step = step.number(), name = step.as_str(), %summary, "workflow step");
            steps_completed.push(step);
            emit(
                &sink,
                WorkflowEvent::StepCompleted {
                    step,
                    number: step.number(),
                    summary,
                },
            );
        });

        let mut errors = Vec::new();
        if !plan.validation.report.structurally_and_thermally_valid() {
            errors.push(format!(
                "design still invalid after {} fix iteration(s)",
                plan.validation.iterations
            ));
        }

        let generation_status = if opts.skips(PipelineStep::Execute) {
            tracing::info!("execute step skipped");
            None
        } else {
            let result = self
                .executor
                .execute(&plan.program, plan.specification.primary_material())
                .await;
            match &result.error {
                Some(error) => {
                    errors.push(error.clone());
                    emit(
                        &sink,
                        WorkflowEvent::StepFailed {
                            step: PipelineStep::Execute,
                            error: error.clone(),
                        },
                    );
                }
                None => {
                    steps_completed.push(PipelineStep::Execute);
                    emit(
                        &sink,
                        WorkflowEvent::StepCompleted {
                            step: PipelineStep::Execute,
                            number: PipelineStep::Execute.number(),
                            summary: result
                                .stl_path
                                .as_ref()
                                .map_or_else(String::new, |p| p.display().to_string()),
                        },
                    );
                }
            }
            Some(result)
        };

        let bom = if opts.skips(PipelineStep::Bom) {
            None
        } else {
            let volume = generation_status
                .as_ref()
                .and_then(|g| g.analysis.as_ref())
                .map(|a| a.volume_cm3)
                .unwrap_or(plan.estimated_volume_cm3);
            let prices = self.part_prices(&plan.sourcing, opts.live_pricing).await;
            let bom = generate_bom(&plan.specification, Some(volume), &plan.sourcing, &prices);
            tracing::info!(items = bom.items.len(), total = bom.summary.total_usd, "bill of materials");
            steps_completed.push(PipelineStep::Bom);
            emit(
                &sink,
                WorkflowEvent::StepCompleted {
                    step: PipelineStep::Bom,
                    number: PipelineStep::Bom.number(),
                    summary: format!("{} items, ${:.2}", bom.items.len(), bom.summary.total_usd),
                },
            );
            Some(bom)
        };

        let result = WorkflowResult {
            success: errors.is_empty(),
            workflow_id,
            steps_completed,
            specification: plan.specification,
            sourcing_summary: plan.sourcing,
            validation_report: plan.validation,
            generation_status,
            bom,
            errors,
        };
        self.finish_job(&result).await;
        emit(
            &sink,
            WorkflowEvent::Finished {
                result: Box::new(result.clone()),
            },
        );
        result
    }

    async fn start_job(&self, prompt: &str) -> Uuid {
        match self.store.lock().await.create_job(prompt) {
            Ok(job) => job.id,
            Err(e) => {
                tracing::error!(error = %e, "failed to record job");
                Uuid::new_v4()
            }
        }
    }

    async fn finish_job(&self, result: &WorkflowResult) {
        let store = self.store.lock().await;
        let outcome = if result.success {
            serde_json::to_value(result)
                .map_err(cem_store::StoreError::from)
                .and_then(|v| store.complete_job(result.workflow_id, &v))
        } else {
            store.fail_job(result.workflow_id, &result.errors.join("; "))
        };
        if let Err(e) = outcome {
            tracing::error!(workflow_id = %result.workflow_id, error = %e, "failed to record job result");
        }
    }

    /// Unit prices by MPN: the parts database first, then live web prices.
    async fn part_prices(&self, sourcing: &SourcingSummary, live: bool) -> BTreeMap<String, f64> {
        let mut prices = BTreeMap::new();
        let mpns: Vec<(String, String)> = sourcing
            .parts
            .iter()
            .map(|p| (p.mpn.clone(), p.name.clone()))
            .chain(
                sourcing
                    .unresolved
                    .iter()
                    .filter_map(|r| r.mpn.clone().map(|m| (m, r.name.clone()))),
            )
            .collect();

        {
            let store = self.store.lock().await;
            for (mpn, _) in &mpns {
                match store.get_part(mpn) {
                    Ok(Some(part)) => {
                        prices.insert(mpn.clone(), part.unit_price_usd);
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(mpn, error = %e, "parts lookup failed"),
                }
            }
        }

        if live {
            for (mpn, name) in &mpns {
                let query = if name.is_empty() { mpn.clone() } else { format!("{name} {mpn}") };
                let result = self
                    .tools
                    .product_price_lookup(ProductPriceRequest {
                        product_name: query,
                        quantity: 1,
                        region: "US".into(),
                    })
                    .await;
                if let Some(min) = result["min"].as_f64() {
                    prices.insert(mpn.clone(), min);
                } else {
                    tracing::warn!(mpn, status = %result["status"], "no live price");
                }
            }
        }
        prices
    }
}

fn absolute_dir(path: &std::path::Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use cem_core::parse_prompt;
    use cem_store::{CacheStore, JobStatus, MemoryCache};

    use super::*;
    use crate::config::{CacheTtlConfig, Config, SearchConfig};
    use crate::search::WebSearch;

    fn orchestrator(config: &Config) -> Orchestrator {
        let search = WebSearch::new(&SearchConfig::default()).unwrap();
        let cache = CacheStore::new(Box::new(MemoryCache::new()));
        let tools = PriceTools::new(search, Arc::new(Mutex::new(cache)), CacheTtlConfig::default());
        let store = Store::open_in_memory().unwrap();
        store.seed_parts_from_catalog().unwrap();
        Orchestrator::new(Executor::new(config), tools, Arc::new(Mutex::new(store)))
    }

    const PROMPT: &str = "lightweight 3-DOF robot arm with 300mm reach and 0.5kg payload in PLA";

    #[tokio::test]
    async fn test_run_without_execution() {
        let orch = orchestrator(&Config::default());
        let opts = WorkflowOptions {
            skip_steps: vec![PipelineStep::Execute],
            ..WorkflowOptions::default()
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let spec = parse_prompt(PROMPT).specification;
        let result = orch.run(PROMPT, spec, &opts, Some(tx)).await;

        assert!(result.generation_status.is_none());
        assert!(result.steps_completed.contains(&PipelineStep::Codegen));
        assert!(!result.steps_completed.contains(&PipelineStep::Execute));
        assert_eq!(result.steps_completed.last(), Some(&PipelineStep::Bom));
        let bom = result.bom.as_ref().unwrap();
        assert!(bom.summary.total_usd > 0.0);

        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        assert!(matches!(events.first(), Some(WorkflowEvent::Started { .. })));
        assert!(matches!(events.last(), Some(WorkflowEvent::Finished { .. })));

        let job = orch.store().lock().await.get_job(result.workflow_id).unwrap().unwrap();
        let expected = if result.success { JobStatus::Completed } else { JobStatus::Failed };
        assert_eq!(job.status, expected);
        assert_eq!(job.prompt, PROMPT);
    }

    #[tokio::test]
    async fn test_parts_database_prices_feed_the_bom() {
        let orch = orchestrator(&Config::default());
        let spec = parse_prompt(PROMPT).specification;
        let opts = WorkflowOptions {
            skip_steps: vec![PipelineStep::Execute],
            ..WorkflowOptions::default()
        };
        let baseline = orch.run(PROMPT, spec.clone(), &opts, None).await;
        let part = baseline
            .sourcing_summary
            .parts
            .first()
            .cloned()
            .expect("robot arm sources at least one part");
        let mut edited = part.clone();
        edited.unit_price_usd = part.unit_price_usd + 100.0;
        orch.store().lock().await.upsert_part(&edited).unwrap();

        let repriced = orch.run(PROMPT, spec, &opts, None).await;
        let line = repriced
            .bom
            .unwrap()
            .items
            .into_iter()
            .find(|i| i.mpn.as_deref() == Some(part.mpn.as_str()))
            .unwrap();
        assert_eq!(line.unit_cost_usd, edited.unit_price_usd);
    }

    #[tokio::test]
    async fn test_execute_failure_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            csharp_project_path: dir.path().join("missing"),
            output_dir: dir.path().join("out"),
            ..Config::default()
        };
        let orch = orchestrator(&config);
        let spec = parse_prompt(PROMPT).specification;
        let result = orch.run(PROMPT, spec, &WorkflowOptions::default(), None).await;
        assert!(!result.success);
        assert!(result.errors.iter().any(|e| e.contains("C# project not found")));
        assert!(result.bom.is_some(), "BOM falls back to the estimated volume");

        let job = orch.store().lock().await.get_job(result.workflow_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("C# project not found"));
    }
}
