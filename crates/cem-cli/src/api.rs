//! HTTP API: conversation, refinement and workflow routes under `/api`, the
//! pricing tools under `/tools`.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures_util::Stream;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use cem_core::time::now_iso8601;
use cem_core::{
    AmbiguityAssessment, ConversationContext, DesignSpecification, FeedbackKind, IntentAnalysis,
    OptimizationGoal, PipelineStep, RefineOutcome, assess_ambiguity,
};
use cem_store::Store;

use crate::config::Config;
use crate::executor::Executor;
use crate::llm::{OllamaClient, SpecSource, parse_design};
use crate::tools::{
    CurrencyRequest, DensityRequest, ManufacturingCostRequest, MaterialCostRequest,
    MaterialPriceRequest, PriceTools, ProductPriceRequest, TOOLS, ToolCategory, find_tool,
    function_schemas, tools_in_category,
};
use crate::workflow::{Orchestrator, SKIPPABLE_STEPS, WorkflowEvent, WorkflowOptions};
use crate::ws;

pub type Sessions = Arc<Mutex<HashMap<String, ConversationContext>>>;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Sessions,
    pub orchestrator: Orchestrator,
    pub llm: Option<OllamaClient>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = Store::open_url(&config.database_url)
            .with_context(|| format!("failed to open database {}", config.database_url))?;
        store.seed_parts_from_catalog().context("failed to seed parts")?;
        let tools = PriceTools::from_config(config)?;
        let orchestrator = Orchestrator::new(Executor::new(config), tools, Arc::new(Mutex::new(store)));
        let llm = if config.llm.enabled {
            Some(OllamaClient::new(&config.llm)?)
        } else {
            tracing::info!("LLM disabled; prompts use the keyword parser");
            None
        };
        Ok(Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            orchestrator,
            llm,
        })
    }

    pub fn tools(&self) -> &PriceTools {
        self.orchestrator.tools()
    }
}

// --- Errors ---

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        }
        (self.status, Json(json!({"success": false, "detail": self.message}))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn parse_goal(name: Option<&str>) -> ApiResult<Option<OptimizationGoal>> {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => OptimizationGoal::from_name(n)
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("unknown optimization goal: {n}"))),
        None => Ok(None),
    }
}

fn to_value<T: serde::Serialize>(v: &T) -> ApiResult<Value> {
    serde_json::to_value(v).map_err(|e| ApiError::internal(e.to_string()))
}

// --- Session operations shared with the WebSocket handler ---

pub async fn session_state(state: &AppState, session_id: &str) -> ApiResult<Value> {
    let sessions = state.sessions.lock().await;
    let ctx = sessions
        .get(session_id)
        .ok_or_else(|| ApiError::not_found("Session not found"))?;
    to_value(ctx)
}

pub async fn refine_session(
    state: &AppState,
    session_id: &str,
    feedback: &str,
    goal: Option<&str>,
) -> ApiResult<RefineOutcome> {
    let goal = parse_goal(goal)?;
    let mut sessions = state.sessions.lock().await;
    let ctx = sessions
        .get_mut(session_id)
        .ok_or_else(|| ApiError::not_found("Session not found"))?;
    let outcome = ctx.refine(feedback, goal);
    tracing::info!(session_id, iterations = ctx.refinement_iterations, "refined design");
    Ok(outcome)
}

pub async fn feedback_session(
    state: &AppState,
    session_id: &str,
    kind: &str,
    text: Option<&str>,
) -> ApiResult<Value> {
    let kind: FeedbackKind = kind.parse().map_err(|e: cem_core::CemError| ApiError::bad_request(e.to_string()))?;
    let mut sessions = state.sessions.lock().await;
    let ctx = sessions
        .get_mut(session_id)
        .ok_or_else(|| ApiError::not_found("Session not found"))?;
    let response = ctx
        .handle_feedback(kind, text)
        .ok_or_else(|| ApiError::bad_request("No specification in session"))?;
    to_value(&response)
}

// --- /api ---

#[derive(Debug, Deserialize)]
struct PromptRequest {
    prompt: String,
    session_id: Option<String>,
    optimization_goal: Option<String>,
}

fn specification_response(
    session_id: &str,
    spec: &DesignSpecification,
    assessment: &AmbiguityAssessment,
    intent: &IntentAnalysis,
    source: SpecSource,
) -> Value {
    json!({
        "success": true,
        "session_id": session_id,
        "specification": spec,
        "confidence_score": assessment.confidence,
        "clarification_needed": assessment.clarification_needed,
        "clarification_questions": assessment.questions,
        "missing_fields": assessment.missing_fields,
        "device_type": spec.device_type,
        "optimization_goals": intent.optimization_goals,
        "source": source,
    })
}

async fn interpret(
    state: &AppState,
    session_id: String,
    prompt: &str,
    goal: Option<OptimizationGoal>,
) -> Value {
    let parsed = parse_design(state.llm.as_ref(), prompt).await;
    let mut spec = parsed.specification;
    if let Some(goal) = goal {
        spec.optimization_goals.retain(|g| *g != goal);
        spec.optimization_goals.insert(0, goal);
    }
    let assessment = assess_ambiguity(&spec);
    tracing::info!(
        %session_id,
        device = %spec.device_type,
        confidence = assessment.confidence,
        "prompt interpreted"
    );

    let mut sessions = state.sessions.lock().await;
    let ctx = sessions
        .entry(session_id.clone())
        .or_insert_with(|| ConversationContext::new(session_id.clone(), prompt));
    ctx.record_specification(spec.clone(), &assessment);
    specification_response(&session_id, &spec, &assessment, &parsed.intent, parsed.source)
}

async fn process_prompt(
    State(state): State<AppState>,
    Json(req): Json<PromptRequest>,
) -> ApiResult<Json<Value>> {
    if req.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("prompt must not be empty"));
    }
    let goal = parse_goal(req.optimization_goal.as_deref())?;
    let session_id = req.session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    Ok(Json(interpret(&state, session_id, &req.prompt, goal).await))
}

#[derive(Debug, Deserialize)]
struct ClarificationRequest {
    session_id: String,
    answer: String,
}

/// Re-interpret the original prompt with the answer appended.
async fn answer_clarification(
    State(state): State<AppState>,
    Json(req): Json<ClarificationRequest>,
) -> ApiResult<Json<Value>> {
    let combined = {
        let sessions = state.sessions.lock().await;
        let ctx = sessions
            .get(&req.session_id)
            .ok_or_else(|| ApiError::not_found("Session not found"))?;
        format!("{} {}", ctx.initial_prompt, req.answer.trim())
    };
    Ok(Json(interpret(&state, req.session_id, &combined, None).await))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    session_state(&state, &session_id).await.map(Json)
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    match state.sessions.lock().await.remove(&session_id) {
        Some(_) => Ok(Json(json!({"success": true, "session_id": session_id}))),
        None => Err(ApiError::not_found("Session not found")),
    }
}

#[derive(Debug, Deserialize)]
struct FeedbackRequest {
    session_id: String,
    feedback_type: String,
    feedback_text: Option<String>,
}

async fn design_feedback(
    State(state): State<AppState>,
    Json(req): Json<FeedbackRequest>,
) -> ApiResult<Json<Value>> {
    feedback_session(&state, &req.session_id, &req.feedback_type, req.feedback_text.as_deref())
        .await
        .map(Json)
}

#[derive(Debug, Deserialize)]
struct OptimizeRequest {
    session_id: String,
    optimization_goal: String,
    #[serde(default)]
    constraints: Option<Value>,
}

async fn optimize_design(
    State(state): State<AppState>,
    Json(req): Json<OptimizeRequest>,
) -> ApiResult<Json<Value>> {
    if let Some(constraints) = &req.constraints {
        tracing::debug!(%constraints, "optimization constraints are advisory");
    }
    let feedback = format!("Optimize for {}", req.optimization_goal);
    match refine_session(&state, &req.session_id, &feedback, Some(&req.optimization_goal)).await? {
        RefineOutcome::Refined {
            iteration,
            suggestions,
            updated_specification,
            ..
        } => Ok(Json(json!({
            "success": true,
            "iteration": iteration,
            "estimated_improvements": suggestions.estimated_improvements,
            "suggestions": suggestions,
            "updated_specification": updated_specification,
        }))),
        RefineOutcome::MaxIterationsReached { .. } => {
            Err(ApiError::bad_request("Maximum refinement iterations reached"))
        }
        RefineOutcome::NoSpecification => Err(ApiError::bad_request("No specification in session")),
    }
}

/// A step given by 1-based number or by name.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum StepRef {
    Number(usize),
    Name(PipelineStep),
}

impl StepRef {
    fn resolve(&self) -> ApiResult<PipelineStep> {
        match self {
            StepRef::Name(step) => Ok(*step),
            StepRef::Number(n) => n
                .checked_sub(1)
                .and_then(|i| PipelineStep::ALL.get(i))
                .copied()
                .ok_or_else(|| ApiError::bad_request(format!("no pipeline step {n}"))),
        }
    }
}

fn skippable(step: PipelineStep) -> ApiResult<PipelineStep> {
    if SKIPPABLE_STEPS.contains(&step) {
        Ok(step)
    } else {
        Err(ApiError::bad_request(format!(
            "step {} ({}) cannot be skipped; only execute and bom can",
            step.number(),
            step.as_str()
        )))
    }
}

#[derive(Debug, Deserialize)]
struct WorkflowRequest {
    session_id: String,
    output_name: Option<String>,
    #[serde(default)]
    skip_steps: Vec<StepRef>,
    #[serde(default)]
    live_pricing: bool,
}

impl WorkflowRequest {
    fn options(&self) -> ApiResult<WorkflowOptions> {
        let mut opts = WorkflowOptions {
            skip_steps: self
                .skip_steps
                .iter()
                .map(|r| r.resolve().and_then(skippable))
                .collect::<ApiResult<_>>()?,
            live_pricing: self.live_pricing,
            ..WorkflowOptions::default()
        };
        if let Some(name) = self.output_name.as_ref().filter(|n| !n.trim().is_empty()) {
            opts.output_name = name.clone();
        }
        Ok(opts)
    }
}

async fn session_spec(state: &AppState, session_id: &str) -> ApiResult<(String, DesignSpecification)> {
    let sessions = state.sessions.lock().await;
    let ctx = sessions
        .get(session_id)
        .ok_or_else(|| ApiError::not_found("Session not found"))?;
    let spec = ctx
        .specification
        .clone()
        .ok_or_else(|| ApiError::bad_request("No specification in session"))?;
    Ok((ctx.initial_prompt.clone(), spec))
}

async fn execute_workflow(
    State(state): State<AppState>,
    Json(req): Json<WorkflowRequest>,
) -> ApiResult<Json<Value>> {
    let opts = req.options()?;
    let (prompt, spec) = session_spec(&state, &req.session_id).await?;
    let result = state.orchestrator.run(&prompt, spec, &opts, None).await;
    to_value(&result).map(Json)
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    session_id: String,
    output_name: Option<String>,
    /// Comma-separated step names or numbers.
    skip: Option<String>,
}

/// Run the workflow and stream its progress as server-sent events.
async fn stream_workflow(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let skip_steps = query
        .skip
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<usize>() {
            Ok(n) => StepRef::Number(n).resolve(),
            Err(_) => serde_json::from_value::<PipelineStep>(json!(s))
                .map_err(|_| ApiError::bad_request(format!("unknown pipeline step: {s}"))),
        })
        .map(|step| step.and_then(skippable))
        .collect::<ApiResult<Vec<_>>>()?;
    let mut opts = WorkflowOptions {
        skip_steps,
        ..WorkflowOptions::default()
    };
    if let Some(name) = query.output_name {
        opts.output_name = name;
    }
    let (prompt, spec) = session_spec(&state, &query.session_id).await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        orchestrator.run(&prompt, spec, &opts, Some(tx)).await;
    });

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let name = match &event {
                WorkflowEvent::Started { .. } => "started",
                WorkflowEvent::StepCompleted { .. } => "step_completed",
                WorkflowEvent::StepFailed { .. } => "step_failed",
                WorkflowEvent::Finished { .. } => "finished",
            };
            let sse = Event::default()
                .event(name)
                .json_data(&event)
                .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()));
            yield Ok::<_, Infallible>(sse);
        }
    };
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
struct JobsQuery {
    limit: Option<usize>,
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobsQuery>,
) -> ApiResult<Json<Value>> {
    let store = state.orchestrator.store().lock().await;
    let jobs = store
        .recent_jobs(query.limit.unwrap_or(20))
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(json!({"jobs": jobs})))
}

async fn get_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    let store = state.orchestrator.store().lock().await;
    match store.get_job(id).map_err(|e| ApiError::internal(e.to_string()))? {
        Some(job) => to_value(&job).map(Json),
        None => Err(ApiError::not_found("Job not found")),
    }
}

async fn api_health(State(state): State<AppState>) -> Json<Value> {
    let llm = match &state.llm {
        Some(client) if client.is_available().await => format!("ollama ({})", client.model()),
        Some(_) => "unreachable (keyword fallback)".to_string(),
        None => "keywords".to_string(),
    };
    Json(json!({
        "status": "healthy",
        "llm_engine": llm,
        "orchestrator": "ready",
        "sessions": state.sessions.lock().await.len(),
        "timestamp": now_iso8601(),
    }))
}

// --- /tools ---

async fn tools_index() -> Json<Value> {
    Json(json!({
        "message": "Tool Server - Real-time Pricing & Cost Calculation",
        "version": env!("CARGO_PKG_VERSION"),
        "tools": TOOLS.iter().map(|t| t.name).collect::<Vec<_>>(),
        "documentation": "/tools/schema",
    }))
}

async fn tools_schema() -> Json<Value> {
    Json(json!({"type": "function", "functions": function_schemas()}))
}

async fn tool_info(Path(name): Path<String>) -> ApiResult<Json<Value>> {
    let tool = find_tool(&name).ok_or_else(|| ApiError::not_found(format!("Tool not found: {name}")))?;
    to_value(tool).map(Json)
}

async fn tools_by_category(Path(category): Path<String>) -> ApiResult<Json<Value>> {
    let category: ToolCategory = serde_json::from_value(json!(category.to_lowercase()))
        .map_err(|_| ApiError::not_found(format!("Unknown category: {category}")))?;
    Ok(Json(json!({"category": category, "tools": tools_in_category(category)})))
}

async fn product_price(State(state): State<AppState>, Json(req): Json<ProductPriceRequest>) -> Json<Value> {
    Json(state.tools().product_price_lookup(req).await)
}

async fn material_price(State(state): State<AppState>, Json(req): Json<MaterialPriceRequest>) -> Json<Value> {
    Json(state.tools().material_price_lookup(req).await)
}

async fn density(State(state): State<AppState>, Json(req): Json<DensityRequest>) -> Json<Value> {
    Json(state.tools().density_lookup(req).await)
}

async fn material_cost(State(state): State<AppState>, Json(req): Json<MaterialCostRequest>) -> Json<Value> {
    Json(state.tools().material_cost_calculator(req))
}

async fn manufacturing_cost(
    State(state): State<AppState>,
    Json(req): Json<ManufacturingCostRequest>,
) -> Json<Value> {
    Json(state.tools().manufacturing_cost_estimator(req).await)
}

async fn currency(State(state): State<AppState>, Json(req): Json<CurrencyRequest>) -> Json<Value> {
    Json(state.tools().currency_convert(req).await)
}

async fn cache_stats(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let cache = state.tools().cache().lock().await;
    let stats = cache.stats().map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(json!({"status": "success", "layers": cache.describe(), "stats": stats})))
}

async fn cache_clear_expired(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let cleared = state
        .tools()
        .cache()
        .lock()
        .await
        .clear_expired()
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(json!({"status": "success", "entries_cleared": cleared})))
}

async fn cache_delete(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult<Json<Value>> {
    let removed = state
        .tools()
        .cache()
        .lock()
        .await
        .delete(&key)
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let status = if removed { "success" } else { "not_found" };
    Ok(Json(json!({"status": status, "key": key})))
}

async fn tools_health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": now_iso8601(),
        "tools": TOOLS.len(),
        "message": "All tools operational",
    }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(api_health))
        .route("/api/prompt", post(process_prompt))
        .route("/api/conversation/clarification", post(answer_clarification))
        .route(
            "/api/conversation/{session_id}",
            get(get_conversation).delete(delete_conversation),
        )
        .route("/api/design/feedback", post(design_feedback))
        .route("/api/design/optimize", post(optimize_design))
        .route("/api/workflow/execute", post(execute_workflow))
        .route("/api/workflow/stream", get(stream_workflow))
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/ws/design/{session_id}", get(ws::ws_handler))
        .route("/tools", get(tools_index))
        .route("/tools/", get(tools_index))
        .route("/tools/schema", get(tools_schema))
        .route("/tools/health", get(tools_health))
        .route("/tools/tools/{name}", get(tool_info))
        .route("/tools/tools/category/{category}", get(tools_by_category))
        .route("/tools/product_price_lookup", post(product_price))
        .route("/tools/material_price_lookup", post(material_price))
        .route("/tools/density_lookup", post(density))
        .route("/tools/material_cost_calculator", post(material_cost))
        .route("/tools/manufacturing_cost_estimator", post(manufacturing_cost))
        .route("/tools/currency_convert", post(currency))
        .route("/tools/cache/stats", get(cache_stats))
        .route("/tools/cache/clear-expired", post(cache_clear_expired))
        .route("/tools/cache/{key}", delete(cache_delete))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let addr = listener.local_addr().context("listener has no address")?;
    tracing::info!(%addr, "HTTP API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")?;
    tracing::info!("HTTP API stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        let config = Config {
            database_url: ":memory:".into(),
            llm: crate::config::LlmConfig {
                enabled: false,
                ..Default::default()
            },
            ..Config::default()
        };
        AppState::from_config(&config).unwrap()
    }

    async fn spawn(state: AppState) -> (String, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let token = CancellationToken::new();
        tokio::spawn(serve(listener, state, token.clone()));
        (base, token)
    }

    #[test]
    fn test_step_refs() {
        assert_eq!(StepRef::Number(7).resolve().unwrap(), PipelineStep::Execute);
        assert!(StepRef::Number(0).resolve().is_err());
        assert!(StepRef::Number(9).resolve().is_err());
        let refs: Vec<StepRef> = serde_json::from_value(json!([8, "execute"])).unwrap();
        assert_eq!(refs[0].resolve().unwrap(), PipelineStep::Bom);
        assert_eq!(refs[1].resolve().unwrap(), PipelineStep::Execute);
    }

    #[tokio::test]
    async fn test_prompt_then_optimize() {
        let (base, token) = spawn(state()).await;
        let http = reqwest::Client::new();

        let v: Value = http
            .post(format!("{base}/api/prompt"))
            .json(&json!({
                "prompt": "robot arm with 400mm reach and 1kg payload in PLA",
                "session_id": "s1",
                "optimization_goal": "durable",
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(v["success"], true);
        assert_eq!(v["session_id"], "s1");
        assert_eq!(v["device_type"], "robot_arm");
        assert_eq!(v["specification"]["optimization_goals"][0], "durable");

        let v: Value = http
            .post(format!("{base}/api/design/optimize"))
            .json(&json!({"session_id": "s1", "optimization_goal": "lightweight"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(v["iteration"], 1);
        assert!(v["estimated_improvements"].is_object());

        let state: Value = http
            .get(format!("{base}/api/conversation/s1"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(state["refinement_iterations"], 1);
        token.cancel();
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let (base, token) = spawn(state()).await;
        let http = reqwest::Client::new();

        let resp = http.get(format!("{base}/api/conversation/nope")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["detail"], "Session not found");

        let resp = http
            .post(format!("{base}/api/prompt"))
            .json(&json!({"prompt": "  "}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = http
            .post(format!("{base}/api/prompt"))
            .json(&json!({"prompt": "gripper", "optimization_goal": "shiny"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = http
            .post(format!("{base}/api/workflow/execute"))
            .json(&json!({"session_id": "missing"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = http.get(format!("{base}/tools/tools/weather")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        token.cancel();
    }

    #[tokio::test]
    async fn test_workflow_execute_skipping_compile() {
        let (base, token) = spawn(state()).await;
        let http = reqwest::Client::new();
        http.post(format!("{base}/api/prompt"))
            .json(&json!({"prompt": "parallel gripper in PETG", "session_id": "g"}))
            .send()
            .await
            .unwrap();

        let v: Value = http
            .post(format!("{base}/api/workflow/execute"))
            .json(&json!({"session_id": "g", "output_name": "grip", "skip_steps": [7]}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(v["workflow_id"].is_string());
        assert!(v["bom"]["items"].is_array());
        assert!(v.get("generation_status").is_none());

        let jobs: Value = http
            .get(format!("{base}/api/jobs"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(jobs["jobs"][0]["id"], v["workflow_id"]);
        token.cancel();
    }

    #[tokio::test]
    async fn test_workflow_stream_event_order() {
        use eventsource_stream::Eventsource;
        use futures_util::StreamExt;

        let (base, token) = spawn(state()).await;
        let http = reqwest::Client::new();
        http.post(format!("{base}/api/prompt"))
            .json(&json!({"prompt": "parallel gripper in PETG", "session_id": "sse"}))
            .send()
            .await
            .unwrap();

        let resp = http
            .get(format!("{base}/api/workflow/stream?session_id=sse&output_name=grip&skip=execute"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let mut events = resp.bytes_stream().eventsource();
        let mut names = Vec::new();
        let mut numbers = Vec::new();
        let mut finished = Value::Null;
        while let Some(event) = events.next().await {
            let event = event.unwrap();
            let data: Value = serde_json::from_str(&event.data).unwrap();
            if event.event == "step_completed" {
                numbers.push(data["number"].as_u64().unwrap());
            }
            if event.event == "finished" {
                finished = data;
            }
            names.push(event.event);
        }

        assert_eq!(names.first().map(String::as_str), Some("started"));
        assert_eq!(names.last().map(String::as_str), Some("finished"));
        assert!(names[1..names.len() - 1].iter().all(|n| n == "step_completed"));
        assert_eq!(numbers, [1, 2, 3, 4, 5, 6, 8]);
        assert!(finished["result"]["bom"]["items"].is_array());
        assert!(finished["result"].get("generation_status").is_none());
        token.cancel();
    }

    #[tokio::test]
    async fn test_only_execute_and_bom_can_be_skipped() {
        let (base, token) = spawn(state()).await;
        let http = reqwest::Client::new();
        http.post(format!("{base}/api/prompt"))
            .json(&json!({"prompt": "parallel gripper in PETG", "session_id": "k"}))
            .send()
            .await
            .unwrap();

        let resp = http
            .get(format!("{base}/api/workflow/stream?session_id=k&skip=dance"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["detail"], "unknown pipeline step: dance");

        let resp = http
            .get(format!("{base}/api/workflow/stream?session_id=k&skip=validate"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = http
            .post(format!("{base}/api/workflow/execute"))
            .json(&json!({"session_id": "k", "skip_steps": [2]}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert!(body["detail"].as_str().unwrap().contains("cannot be skipped"));
        token.cancel();
    }

    #[tokio::test]
    async fn test_tool_routes() {
        let (base, token) = spawn(state()).await;
        let http = reqwest::Client::new();

        let index: Value = http.get(format!("{base}/tools/")).send().await.unwrap().json().await.unwrap();
        assert_eq!(index["tools"].as_array().unwrap().len(), TOOLS.len());

        let schema: Value = http.get(format!("{base}/tools/schema")).send().await.unwrap().json().await.unwrap();
        assert_eq!(schema["functions"].as_array().unwrap().len(), TOOLS.len());

        let cat: Value = http
            .get(format!("{base}/tools/tools/category/calculation"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(cat["tools"].as_array().unwrap().len(), 3);

        let d: Value = http
            .post(format!("{base}/tools/density_lookup"))
            .json(&json!({"material_name": "steel", "unit": "kg/m3"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(d["density"], 7850.0);

        let stats: Value = http.get(format!("{base}/tools/cache/stats")).send().await.unwrap().json().await.unwrap();
        assert_eq!(stats["stats"]["primary"]["total_entries"], 1);

        let del: Value = http
            .delete(format!("{base}/tools/cache/density:steel:kg%2Fm3"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(del["status"], "success");

        let cleared: Value = http
            .post(format!("{base}/tools/cache/clear-expired"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(cleared["entries_cleared"], 0);
        token.cancel();
    }
}
