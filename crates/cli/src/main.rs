use std::{
    io::{self, IsTerminal},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command};
use nodeflow_engine::{
    EngineConfig, ExecuteOptions, ExecutionLogger, JsonlLogSink, WorkflowEngine, builtin_registry, load_config, validate_graph_conditions,
};
use nodeflow_types::Graph;
use nodeflow_util::{CredentialBroker, CredentialCipher, FileCredentialStore, NullCredentialBroker, StoreCredentialBroker};
use serde_json::Value;
use tracing::{debug, warn};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let matches = build_cli().get_matches();
    let config = load_config().context("failed to load engine configuration")?;
    debug!(log_path = %config.execution_log_path.display(), "configuration loaded");

    match matches.subcommand() {
        Some(("run", sub)) => run_graph(&config, sub).await,
        Some(("encrypt", sub)) => encrypt_credentials(&config, sub),
        Some(("logs", sub)) => print_logs(&config, sub).await,
        Some(("validate", sub)) => validate(sub),
        _ => bail!("expected a subcommand; see --help"),
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn build_cli() -> Command {
    let log_file = Arg::new("log-file")
        .long("log-file")
        .action(ArgAction::Set)
        .value_parser(clap::value_parser!(PathBuf))
        .help("Execution log file (defaults to the configured executionLogPath)");

    Command::new("nodeflow")
        .about("Run workflow graphs")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("Execute a workflow graph and print the execution report")
                .arg(graph_arg())
                .arg(
                    Arg::new("input")
                        .long("input")
                        .short('i')
                        .action(ArgAction::Set)
                        .conflicts_with("input-file")
                        .help("Trigger input as inline JSON"),
                )
                .arg(
                    Arg::new("input-file")
                        .long("input-file")
                        .action(ArgAction::Set)
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("Trigger input read from a JSON file"),
                )
                .arg(
                    Arg::new("execution-id")
                        .long("execution-id")
                        .action(ArgAction::Set)
                        .help("Execution id to log under (a UUID is generated otherwise)"),
                )
                .arg(log_file.clone()),
        )
        .subcommand(
            Command::new("encrypt")
                .about("Encrypt a credential object for the integrations store")
                .arg(Arg::new("json").action(ArgAction::Set).help("Credential JSON object; read from stdin when omitted")),
        )
        .subcommand(
            Command::new("logs")
                .about("Print the logged entries of one execution")
                .arg(Arg::new("execution-id").required(true).action(ArgAction::Set))
                .arg(log_file),
        )
        .subcommand(
            Command::new("validate")
                .about("Report structural issues and rejected conditions in a graph")
                .arg(graph_arg()),
        )
}

fn graph_arg() -> Arg {
    Arg::new("graph")
        .required(true)
        .action(ArgAction::Set)
        .value_parser(clap::value_parser!(PathBuf))
        .help("Path to a graph document (JSON or YAML)")
}

fn log_path(config: &EngineConfig, matches: &ArgMatches) -> PathBuf {
    matches
        .get_one::<PathBuf>("log-file")
        .cloned()
        .unwrap_or_else(|| config.execution_log_path.clone())
}

fn load_graph(matches: &ArgMatches) -> Result<Graph> {
    let path = matches.get_one::<PathBuf>("graph").context("missing graph path")?;
    Graph::from_path(path).with_context(|| format!("failed to load graph {}", path.display()))
}

fn trigger_input(matches: &ArgMatches) -> Result<Value> {
    if let Some(inline) = matches.get_one::<String>("input") {
        return serde_json::from_str(inline).context("--input is not valid JSON");
    }
    if let Some(path) = matches.get_one::<PathBuf>("input-file") {
        let content = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        return serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path.display()));
    }
    Ok(Value::Null)
}

/// Decrypts integration credentials when the configured key is available.
fn credential_broker(config: &EngineConfig) -> Arc<dyn CredentialBroker> {
    match CredentialCipher::from_env_var(&config.encryption_key_env) {
        Ok(cipher) => Arc::new(StoreCredentialBroker::new(FileCredentialStore::new(&config.credentials_path), cipher)),
        Err(error) => {
            debug!(error = %error, "credential access disabled");
            Arc::new(NullCredentialBroker)
        }
    }
}

async fn run_graph(config: &EngineConfig, matches: &ArgMatches) -> Result<ExitCode> {
    let graph = load_graph(matches)?;
    for issue in graph.validate() {
        warn!(issue = %issue, "graph issue");
    }

    let mut options = ExecuteOptions::new(trigger_input(matches)?);
    if let Some(execution_id) = matches.get_one::<String>("execution-id") {
        options = options.with_execution_id(execution_id.clone());
    }

    let registry = builtin_registry().context("failed to build step registry")?;
    let logger = ExecutionLogger::new(Arc::new(JsonlLogSink::new(log_path(config, matches))));
    let engine = WorkflowEngine::new(registry)
        .with_logger(logger)
        .with_credentials(credential_broker(config));

    let report = engine.execute(&graph, options).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if report.success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn encrypt_credentials(config: &EngineConfig, matches: &ArgMatches) -> Result<ExitCode> {
    let raw = match matches.get_one::<String>("json") {
        Some(inline) => inline.clone(),
        None => {
            let stdin = io::stdin();
            if stdin.is_terminal() {
                bail!("provide the credential JSON as an argument or on stdin");
            }
            io::read_to_string(stdin).context("failed to read stdin")?
        }
    };
    let credentials: Value = serde_json::from_str(&raw).context("credentials are not valid JSON")?;
    if !credentials.is_object() {
        bail!("credentials must be a JSON object");
    }

    let cipher = CredentialCipher::from_env_var(&config.encryption_key_env)?;
    println!("{}", cipher.encrypt_value(&credentials)?);
    Ok(ExitCode::SUCCESS)
}

async fn print_logs(config: &EngineConfig, matches: &ArgMatches) -> Result<ExitCode> {
    let execution_id = matches.get_one::<String>("execution-id").context("missing execution id")?;
    let path = log_path(config, matches);
    let entries = JsonlLogSink::new(&path).read_execution(execution_id).await?;
    if entries.is_empty() {
        eprintln!("no entries for execution {execution_id} in {}", path.display());
        return Ok(ExitCode::FAILURE);
    }
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(ExitCode::SUCCESS)
}

fn validate(matches: &ArgMatches) -> Result<ExitCode> {
    let graph = load_graph(matches)?;
    let issues = graph.validate();
    let rejected = validate_graph_conditions(&graph);

    for issue in &issues {
        println!("issue: {issue}");
    }
    for (node_id, error) in &rejected {
        println!("condition '{node_id}': {error}");
    }
    if issues.is_empty() && rejected.is_empty() {
        println!("ok: {} nodes, {} edges", graph.nodes.len(), graph.edges.len());
        return Ok(ExitCode::SUCCESS);
    }
    Ok(ExitCode::FAILURE)
}
