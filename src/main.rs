mod input;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail};
use clap::{CommandFactory, Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use aiflow_agent::{run_flow, RunLogger, RunOptions, SimulatedExecutor, Validator, WorkflowRunner};
use aiflow_core::traits::ProjectValidator;
use aiflow_core::{AppConfig, EventBus, Project, RunId};
use aiflow_expr::{auto_rewrite, build_auto_context, evaluate_with_trace, EvalScope};
use aiflow_tools::{build_http_request, ReqwestTransport, ToolInvocation, ToolRegistry, ToolRunner};

#[derive(Parser)]
#[command(name = "aiflow", version, about = "Rule-routed multi-agent workflow engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "aiflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a project with mock agent outputs (no agents are executed)
    Run {
        /// Project JSON file
        project: PathBuf,
        /// Initial context (file or inline JSON object)
        #[arg(long)]
        context: Option<String>,
        /// Mock outputs keyed by agent id (file or inline JSON object)
        #[arg(long)]
        outputs: Option<String>,
        /// Step ceiling (overrides config)
        #[arg(long)]
        max_steps: Option<usize>,
    },
    /// Execute a project with the simulated agent executor and live HTTP tools
    Execute {
        /// Project JSON file
        project: PathBuf,
        /// Initial context (file or inline JSON object)
        #[arg(long)]
        context: Option<String>,
        /// Scripted agent outputs keyed by agent id
        #[arg(long)]
        outputs: Option<String>,
        /// Step ceiling (overrides config)
        #[arg(long)]
        max_steps: Option<usize>,
    },
    /// Evaluate a condition and print its trace
    Eval {
        expression: String,
        /// Scope object (file or inline JSON)
        #[arg(long)]
        context: Option<String>,
    },
    /// Generate a sample context that satisfies a condition
    Autocontext { expression: String },
    /// Rewrite identifiers in a condition to known field paths
    Rewrite {
        expression: String,
        /// Known field: `path` or `path=alias1,alias2` (repeatable)
        #[arg(long = "field")]
        fields: Vec<String>,
    },
    /// Validate a project
    Validate { project: PathBuf },
    /// Print the HTTP request a tool call would send
    Request {
        project: PathBuf,
        tool: String,
        /// Tool input (file or inline JSON)
        #[arg(long)]
        input: Option<String>,
        /// Operation appended to the endpoint path
        #[arg(long)]
        operation: Option<String>,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aiflow=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "aiflow", &mut std::io::stdout());
        return Ok(());
    }

    let config = AppConfig::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Run {
            project,
            context,
            outputs,
            max_steps,
        } => {
            let project = Project::load(&project)?;
            let options = RunOptions {
                initial_context: input::object_arg(context.as_deref())?,
                outputs_by_agent: input::outputs_arg(outputs.as_deref())?,
                max_steps: max_steps.unwrap_or(config.engine.max_steps),
                embed_trace: config.engine.embed_trace,
            };
            let result = run_flow(&project, options, &Validator)?;
            print_json(&result)?;
        }
        Commands::Execute {
            project,
            context,
            outputs,
            max_steps,
        } => {
            let project = Project::load(&project)?;
            let initial = input::object_arg(context.as_deref())?;
            let outputs = input::outputs_arg(outputs.as_deref())?;
            let max_steps = max_steps.unwrap_or(config.engine.max_steps);
            execute(&config, project, initial, outputs, max_steps).await?;
        }
        Commands::Eval {
            expression,
            context,
        } => {
            let scope = match context.as_deref() {
                Some(arg) => EvalScope::from_value(input::json_arg(arg)?),
                None => EvalScope::default(),
            };
            let trace = evaluate_with_trace(&expression, &scope)?;
            print_json(&trace)?;
        }
        Commands::Autocontext { expression } => {
            print_json(&build_auto_context(&expression))?;
        }
        Commands::Rewrite { expression, fields } => {
            let known: Vec<_> = fields.iter().map(|f| input::known_field(f)).collect();
            match auto_rewrite(&expression, &known) {
                Some(rewrite) => print_json(&rewrite)?,
                None => println!("{expression}"),
            }
        }
        Commands::Validate { project } => validate(&project)?,
        Commands::Request {
            project,
            tool,
            input: tool_input,
            operation,
        } => {
            let project = Project::load(&project)?;
            let registry = ToolRegistry::from_project(&project);
            let definition = registry
                .resolve(&tool)
                .ok_or_else(|| anyhow!("Tool not found: {tool}"))?;

            let payload = match tool_input.as_deref() {
                Some(arg) => input::json_arg(arg)?,
                None => serde_json::Value::Object(Default::default()),
            };
            let mut invocation = ToolInvocation::new(payload)
                .with_global_api_key(config.tools.api_key().map(str::to_string));
            if let Some(op) = operation {
                invocation = invocation.with_operation(op);
            }
            let request = build_http_request(&tool, definition, &invocation)?;
            print_json(&request)?;
        }
        // Handled before config loading
        Commands::Completions { .. } => {}
    }

    Ok(())
}

async fn execute(
    config: &AppConfig,
    project: Project,
    initial: serde_json::Map<String, serde_json::Value>,
    outputs: std::collections::HashMap<String, serde_json::Value>,
    max_steps: usize,
) -> anyhow::Result<()> {
    let transport = Arc::new(ReqwestTransport::new(config.tools.timeout_secs)?);
    let tools = ToolRunner::new(ToolRegistry::from_project(&project), transport)
        .with_global_api_key(config.tools.api_key().map(str::to_string));
    let executor = Arc::new(SimulatedExecutor::with_outputs(outputs));

    let event_bus = Arc::new(EventBus::default());
    let run_id = RunId::new();
    let cancel = CancellationToken::new();

    // Stop between steps on Ctrl-C
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Cancelling run...");
        cancel_clone.cancel();
    });

    let logger = config.log.enabled.then(|| {
        RunLogger::new(config.log_dir()).spawn(&event_bus, run_id.clone(), CancellationToken::new())
    });

    let runner = WorkflowRunner::new(project, executor)
        .with_tools(tools)
        .with_event_bus(event_bus.clone())
        .with_cancel_token(cancel)
        .with_max_steps(max_steps)
        .with_embedded_trace(config.engine.embed_trace);

    let result = runner.run_with_id(run_id, initial).await;

    if let Some(handle) = logger {
        match handle.await {
            Ok(Some(path)) => info!(path = %path.display(), "Run log written"),
            Ok(None) => warn!("Run log could not be written"),
            Err(e) => warn!(error = %e, "Run logger task failed"),
        }
    }

    print_json(&result?)
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let project = Project::load(path)?;
    let issues = Validator.validate(&project);
    if issues.is_empty() {
        println!("OK: no issues found");
        return Ok(());
    }

    for issue in &issues {
        let level = if issue.is_error() { "error" } else { "warning" };
        println!("{level:<7} {:<20} {}", issue.code, issue.message);
    }
    let errors = issues.iter().filter(|i| i.is_error()).count();
    if errors > 0 {
        bail!("{errors} validation error(s)");
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
