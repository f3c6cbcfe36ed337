use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracemap_capture::{DapConfig, DapSession};
use tracemap_core::{init_tracing, ConfigManager, TraceMapConfig, TraceMapError};
use tracemap_knowledge::JsonKnowledgeStore;
use tracemap_session::{TraceReview, TraceSessionController};
use tracing::warn;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "tracemap")]
#[command(about = "TraceMap - Record what a debugged program runs and explain it", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (json, pretty)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Configuration file (defaults to .tracemap.toml, then ~/.tracemap/config.toml)
    #[arg(long, global = true, env = "TRACEMAP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a trace from a running debug adapter
    Record {
        /// Debug adapter address (host:port)
        #[arg(short, long)]
        connect: String,

        /// JSON arguments for the `attach` request
        #[arg(short, long)]
        attach: Option<String>,

        /// Stop after this many seconds (default: wait for Ctrl-C)
        #[arg(short, long)]
        duration: Option<u64>,

        /// Workspace folders of the debugged project
        #[arg(short, long)]
        workspace: Vec<PathBuf>,
    },

    /// Review stored traces
    #[command(subcommand)]
    Traces(TracesCommands),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum TracesCommands {
    /// List stored traces, newest first
    List,

    /// Show a trace with its explanations
    Show {
        /// Trace ID
        trace_id: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a default configuration file
    Init {
        #[arg(short, long, default_value = ".tracemap.toml")]
        path: PathBuf,
    },

    /// Show the effective configuration
    Show,
}

#[derive(Serialize)]
struct RecordResult {
    count: usize,
    reused: bool,
    trace_id: Option<String>,
    failed_functions: Vec<String>,
    persist_error: Option<String>,
    diagnostics: String,
}

#[derive(Serialize)]
struct TraceListEntry {
    trace_id: String,
    label: String,
    description: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config(ConfigCommands::Init { path }) = &cli.command {
        ConfigManager::create_default_config(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{} {}", "Wrote".green().bold(), path.display());
        return Ok(());
    }

    let manager = match &cli.config {
        Some(path) => ConfigManager::load_from(path),
        None => ConfigManager::load(),
    }
    .context("Failed to load configuration")?;
    let config = manager.config().clone();
    init_tracing(&config.logging);

    match execute_command(&cli, &config).await {
        Ok(output) => {
            print_output(&cli.output, &output)?;
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn execute_command(cli: &Cli, config: &TraceMapConfig) -> Result<serde_json::Value> {
    match &cli.command {
        Commands::Record {
            connect,
            attach,
            duration,
            workspace,
        } => execute_record(config, connect, attach.as_deref(), *duration, workspace).await,
        Commands::Traces(cmd) => execute_traces_command(cmd, config).await,
        Commands::Config(ConfigCommands::Show) => {
            let mut value = serde_json::to_value(config)?;
            if let Some(key) = value.pointer_mut("/ai/api_key") {
                if key.as_str().is_some_and(|k| !k.is_empty()) {
                    *key = serde_json::Value::String("********".into());
                }
            }
            Ok(value)
        }
        Commands::Config(ConfigCommands::Init { .. }) => Ok(serde_json::Value::Null),
    }
}

async fn open_store(config: &TraceMapConfig) -> Result<Arc<JsonKnowledgeStore>> {
    let path = config.knowledge.resolved_path();
    let store = JsonKnowledgeStore::open(&path)
        .await
        .with_context(|| format!("Failed to open knowledge store {}", path.display()))?;
    Ok(Arc::new(store))
}

async fn execute_record(
    config: &TraceMapConfig,
    connect: &str,
    attach: Option<&str>,
    duration: Option<u64>,
    workspace: &[PathBuf],
) -> Result<serde_json::Value> {
    let workspace_roots = if workspace.is_empty() {
        vec![std::env::current_dir().context("Failed to resolve current directory")?]
    } else {
        workspace.to_vec()
    };

    let session = Arc::new(
        DapSession::connect(connect, DapConfig::default())
            .await
            .with_context(|| format!("Failed to connect to debug adapter at {}", connect))?,
    );
    if let Some(args) = attach {
        let args: serde_json::Value =
            serde_json::from_str(args).context("Invalid --attach JSON")?;
        session.attach(args).await.context("Attach request failed")?;
    }
    session
        .configuration_done()
        .await
        .context("configurationDone request failed")?;

    let store = open_store(config).await?;
    let controller = TraceSessionController::from_config(config, workspace_roots, store)?;
    controller.set_active_session(session.clone());
    controller.start();

    eprintln!(
        "{} {}",
        "Recording".cyan().bold(),
        match duration {
            Some(secs) => format!("for {}s (Ctrl-C to stop early)", secs),
            None => "until Ctrl-C".to_string(),
        }
    );
    let deadline = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        _ = deadline => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
        }
    }

    eprintln!("{}", "Explaining traced functions...".cyan());
    let report = controller.stop().await;
    controller.dispose();
    if let Err(e) = session.disconnect().await {
        warn!("Disconnect failed: {}", e);
    }

    let result = RecordResult {
        count: report.count,
        reused: report.reused,
        trace_id: report.trace_id.map(|id| id.to_string()),
        failed_functions: report.failed_functions.clone(),
        persist_error: report.persist_error.clone(),
        diagnostics: report.diagnostics_summary(),
    };
    Ok(serde_json::to_value(result)?)
}

async fn execute_traces_command(
    cmd: &TracesCommands,
    config: &TraceMapConfig,
) -> Result<serde_json::Value> {
    let review = TraceReview::new(open_store(config).await?);
    match cmd {
        TracesCommands::List => {
            let traces = review.list_traces().await?;
            let entries: Vec<TraceListEntry> = traces
                .iter()
                .map(|t| TraceListEntry {
                    trace_id: t.id.to_string(),
                    label: t.label(),
                    description: t.description(),
                })
                .collect();
            Ok(serde_json::to_value(entries)?)
        }
        TracesCommands::Show { trace_id } => {
            let id = Uuid::parse_str(trace_id).context("Invalid trace ID format")?;
            let detail = review
                .detail(id)
                .await?
                .ok_or_else(|| TraceMapError::TraceNotFound(trace_id.clone()))?;

            Ok(serde_json::json!({
                "trace_id": detail.summary.id.to_string(),
                "label": detail.summary.label(),
                "description": detail.summary.description(),
                "functions": detail.functions,
            }))
        }
    }
}

fn print_output(format: &OutputFormat, value: &serde_json::Value) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Pretty => {
            print_pretty(value)?;
        }
    }
    Ok(())
}

fn print_pretty(value: &serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                let key_colored = key.cyan().bold();
                match val {
                    serde_json::Value::String(s) => {
                        println!("{}: {}", key_colored, s.green());
                    }
                    serde_json::Value::Number(n) => {
                        println!("{}: {}", key_colored, n.to_string().yellow());
                    }
                    serde_json::Value::Bool(b) => {
                        let val_colored = if *b {
                            "true".green()
                        } else {
                            "false".red()
                        };
                        println!("{}: {}", key_colored, val_colored);
                    }
                    serde_json::Value::Null => {
                        println!("{}: {}", key_colored, "-".dimmed());
                    }
                    serde_json::Value::Array(items) if items.iter().all(|i| !i.is_object()) => {
                        let joined: Vec<String> = items
                            .iter()
                            .map(|i| i.as_str().map(str::to_string).unwrap_or_else(|| i.to_string()))
                            .collect();
                        println!("{}: {}", key_colored, joined.join(", "));
                    }
                    _ => {
                        println!("{}:", key_colored);
                        print_pretty(val)?;
                    }
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                println!("\n{}{}:", "Item ".cyan(), (i + 1).to_string().yellow());
                print_pretty(item)?;
            }
        }
        _ => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
    }
    Ok(())
}
