mod api;
mod config;
mod executor;
mod llm;
mod mcp;
mod search;
mod tools;
mod workflow;
mod ws;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rmcp::{ServiceExt, transport::stdio};
use tokio_util::sync::CancellationToken;

use cem_core::{ComponentKind, PipelineStep, analyze_stl};
use cem_store::{CacheBackend, Store};

use crate::config::Config;
use crate::workflow::WorkflowOptions;

#[derive(Parser)]
#[command(name = "cem", about = "Prompt-to-geometry design pipeline: HTTP API, MCP tools and CLI")]
struct Cli {
    /// Config file (TOML); defaults to $CEM_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Address to bind, overriding the config
        #[arg(long)]
        bind: Option<String>,
    },

    /// Start the pricing tools as an MCP server on stdio
    Mcp,

    /// Run the full workflow for a prompt
    Run {
        /// Natural language description of the device
        prompt: String,

        /// Base name for the generated files
        #[arg(long, default_value = "generated_design")]
        output_name: String,

        /// Plan and price only; do not compile or run the C# program
        #[arg(long)]
        no_execute: bool,

        /// Look up live part prices for the BOM
        #[arg(long)]
        live_pricing: bool,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse a prompt and print the specification
    Parse {
        prompt: String,

        /// Ask the configured LLM first
        #[arg(long)]
        llm: bool,
    },

    /// Analyze an STL file
    Analyze {
        path: PathBuf,

        /// Material used for the mass estimate
        #[arg(long, default_value = "PLA")]
        material: String,
    },

    /// Call a pricing tool with JSON arguments
    Tool {
        name: String,

        #[arg(default_value = "{}")]
        args: String,
    },

    /// Manage the parts database
    Parts {
        #[command(subcommand)]
        command: PartsCommand,
    },

    /// Inspect or prune the price cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },

    /// List recent workflow runs
    Jobs {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum PartsCommand {
    /// Add built-in catalog parts that are missing
    Seed,
    /// List parts, optionally of one category
    List {
        #[arg(long)]
        category: Option<String>,
    },
    /// Export parts to a JSON file
    Export { path: PathBuf },
    /// Import parts from a JSON file
    Import { path: PathBuf },
}

#[derive(Subcommand)]
enum CacheCommand {
    Stats,
    ClearExpired,
    Clear,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn open_store(config: &Config) -> Result<Store> {
    Store::open_url(&config.database_url)
        .with_context(|| format!("failed to open database {}", config.database_url))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match &cli.command {
        Commands::Serve { bind } => cmd_serve(&config, bind.as_deref()).await,
        Commands::Mcp => cmd_mcp(&config).await,
        Commands::Run {
            prompt,
            output_name,
            no_execute,
            live_pricing,
            json,
        } => {
            let opts = WorkflowOptions {
                output_name: output_name.clone(),
                skip_steps: if *no_execute { vec![PipelineStep::Execute] } else { Vec::new() },
                live_pricing: *live_pricing,
            };
            cmd_run(&config, prompt, &opts, *json).await
        }
        Commands::Parse { prompt, llm } => cmd_parse(&config, prompt, *llm).await,
        Commands::Analyze { path, material } => cmd_analyze(path, material),
        Commands::Tool { name, args } => cmd_tool(&config, name, args).await,
        Commands::Parts { command } => cmd_parts(&config, command),
        Commands::Cache { command } => cmd_cache(&config, command),
        Commands::Jobs { limit } => cmd_jobs(&config, *limit),
    }
}

async fn cmd_serve(config: &Config, bind: Option<&str>) -> Result<()> {
    let state = api::AppState::from_config(config)?;
    let addr = bind.unwrap_or(&config.bind);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    eprintln!("listening on http://{}", listener.local_addr()?);

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
        }
        trigger.cancel();
    });
    api::serve(listener, state, shutdown).await
}

async fn cmd_mcp(config: &Config) -> Result<()> {
    let tools = tools::PriceTools::from_config(config)?;
    tracing::info!("starting MCP server");
    let service = mcp::CemServer::new(tools)
        .serve(stdio())
        .await
        .context("failed to start MCP server")?;
    service.waiting().await?;
    Ok(())
}

async fn cmd_run(config: &Config, prompt: &str, opts: &WorkflowOptions, json: bool) -> Result<()> {
    let state = api::AppState::from_config(config)?;
    let parsed = llm::parse_design(state.llm.as_ref(), prompt).await;
    let result = state
        .orchestrator
        .run(prompt, parsed.specification, opts, None)
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("workflow:   {}", result.workflow_id);
        println!("device:     {}", result.specification.device_type);
        println!(
            "steps:      {}",
            result
                .steps_completed
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(" → ")
        );
        if let Some(stl) = result.generation_status.as_ref().and_then(|g| g.stl_path.as_ref()) {
            println!("stl:        {}", stl.display());
        }
        if let Some(bom) = &result.bom {
            println!("bom:        {} items, ${:.2}", bom.summary.item_count, bom.summary.total_usd);
        }
        for error in &result.errors {
            println!("error:      {error}");
        }
    }
    if !result.success {
        anyhow::bail!("workflow finished with {} error(s)", result.errors.len());
    }
    Ok(())
}

async fn cmd_parse(config: &Config, prompt: &str, use_llm: bool) -> Result<()> {
    let client = if use_llm {
        Some(llm::OllamaClient::new(&config.llm)?)
    } else {
        None
    };
    let parsed = llm::parse_design(client.as_ref(), prompt).await;
    let assessment = cem_core::assess_ambiguity(&parsed.specification);
    let out = serde_json::json!({
        "source": parsed.source,
        "specification": parsed.specification,
        "intent": parsed.intent,
        "assessment": assessment,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn cmd_analyze(path: &Path, material: &str) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let analysis = analyze_stl(&bytes).with_context(|| format!("failed to analyze {}", path.display()))?;
    let density = cem_core::costing::find_density(material)
        .with_context(|| format!("unknown material: {material}"))?;

    println!("faces:      {}", analysis.faces);
    println!("vertices:   {}", analysis.vertices);
    println!("volume:     {:.3} cm³", analysis.volume_cm3);
    println!("area:       {:.1} mm²", analysis.surface_area_mm2);
    println!(
        "size:       {:.1} × {:.1} × {:.1} mm",
        analysis.dimensions.x, analysis.dimensions.y, analysis.dimensions.z
    );
    println!("watertight: {}", analysis.is_watertight);
    println!("mass:       {:.1} g ({material})", analysis.mass_g(density));
    Ok(())
}

async fn cmd_tool(config: &Config, name: &str, args: &str) -> Result<()> {
    if tools::find_tool(name).is_none() {
        anyhow::bail!("unknown tool: {name}");
    }
    let args: serde_json::Value = serde_json::from_str(args).context("arguments must be JSON")?;
    let tools = tools::PriceTools::from_config(config)?;
    let result = tools.call(name, args).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn cmd_parts(config: &Config, command: &PartsCommand) -> Result<()> {
    let store = open_store(config)?;
    match command {
        PartsCommand::Seed => {
            let added = store.seed_parts_from_catalog()?;
            println!("seeded {added} part(s)");
        }
        PartsCommand::List { category } => {
            let parts = match category {
                Some(c) => {
                    let kind: ComponentKind = serde_json::from_value(serde_json::json!(c.to_lowercase()))
                        .with_context(|| format!("unknown category: {c}"))?;
                    store.parts_by_category(kind)?
                }
                None => store.all_parts()?,
            };
            if parts.is_empty() {
                println!("(no parts)");
            }
            for p in &parts {
                println!(
                    "{:<12} {:<10} ${:>8.2}  {:<24} {}",
                    p.mpn,
                    p.category.as_str(),
                    p.unit_price_usd,
                    p.name,
                    p.supplier
                );
            }
        }
        PartsCommand::Export { path } => {
            store.export_parts_file(path)?;
            println!("exported to {}", path.display());
        }
        PartsCommand::Import { path } => {
            let n = store.import_parts_file(path)?;
            println!("imported {n} part(s) from {}", path.display());
        }
    }
    Ok(())
}

fn cmd_cache(config: &Config, command: &CacheCommand) -> Result<()> {
    let mut store = open_store(config)?;
    match command {
        CacheCommand::Stats => {
            let stats = store.stats().context("failed to read cache stats")?;
            println!("entries:    {}", stats.total_entries);
            println!("expired:    {}", stats.expired_entries);
            println!("hits:       {}", stats.total_hits);
            for (kind, t) in &stats.by_type {
                println!("  {kind:<20} {} entries, {} hits", t.entries, t.hits);
            }
        }
        CacheCommand::ClearExpired => {
            let n = store.clear_expired()?;
            println!("cleared {n} expired entr{}", if n == 1 { "y" } else { "ies" });
        }
        CacheCommand::Clear => {
            let n = store.clear()?;
            println!("cleared {n} entr{}", if n == 1 { "y" } else { "ies" });
        }
    }
    Ok(())
}

fn cmd_jobs(config: &Config, limit: usize) -> Result<()> {
    let store = open_store(config)?;
    let jobs = store.recent_jobs(limit)?;
    if jobs.is_empty() {
        println!("(no jobs)");
    }
    for job in jobs {
        let prompt: String = job.prompt.chars().take(60).collect();
        println!("{}  {:<9}  {}  {}", job.id, job.status, job.created_at, prompt);
    }
    Ok(())
}
