//! CLI command definitions for qa-forge.
//!
//! Each subcommand maps onto one [`QaService`] operation. Results are printed
//! as JSON, either to stdout or to the file given with `--output`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::execution::{RawResult, TestCase};
use crate::llm::{LiteLlmClient, LlmProvider};
use crate::pipeline::{CaptureBackend, PipelineConfig, QaService};

/// Automated QA planning, execution and verdict analysis for web applications.
#[derive(Parser)]
#[command(name = "qa-forge")]
#[command(about = "Plan, execute and analyze automated QA tests for web applications")]
#[command(version)]
#[command(
    long_about = "qa-forge runs batches of browser tests with bounded parallelism, captures \
screenshots, DOM snapshots and console logs, and derives pass/fail/flaky verdicts into a \
persisted report.\n\nExample usage:\n  qa-forge plan --target-url https://app.example -n 10 -o candidates.json\n  \
qa-forge rank --input candidates.json --top-k 5 -o tests.json\n  qa-forge run --input tests.json --parallelism 3"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Generate candidate test cases for a target application.
    Plan(PlanArgs),

    /// Select the most promising candidate test cases.
    Rank(RankArgs),

    /// Execute test cases and store the raw results.
    #[command(alias = "exec")]
    Execute(ExecuteArgs),

    /// Derive verdicts for an executed run and write its report.
    Analyze(AnalyzeArgs),

    /// Print a stored report.
    Report(ReportArgs),

    /// Execute and analyze test cases in one go.
    Run(RunArgs),
}

/// LLM connection options shared by commands that may call a model.
#[derive(clap::Args, Debug, Clone)]
pub struct LlmArgs {
    /// OpenRouter API key. Without it, `LITELLM_API_BASE` is used when set.
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model override (falls back to `QA_MODEL`).
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Never call an LLM, even if one is configured.
    #[arg(long)]
    pub offline: bool,
}

/// Options controlling execution.
#[derive(clap::Args, Debug, Clone)]
pub struct ExecutionArgs {
    /// Maximum number of tests executing at once (falls back to `QA_PARALLELISM`).
    #[arg(short = 'p', long)]
    pub parallelism: Option<usize>,

    /// Capture backend: playwright or http (falls back to `QA_CAPTURE_BACKEND`).
    #[arg(long)]
    pub backend: Option<CaptureBackend>,

    /// Write Prometheus metrics in text format to this file after the command.
    #[arg(long)]
    pub metrics_output: Option<PathBuf>,
}

/// Arguments for `qa-forge plan`.
#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Application under test (falls back to `QA_TARGET_URL`).
    #[arg(short = 't', long)]
    pub target_url: Option<String>,

    /// Seed topic to steer generation; may be repeated.
    #[arg(short = 's', long = "seed")]
    pub seeds: Vec<String>,

    /// Number of candidates to generate.
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Write JSON output to this file instead of stdout.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub llm: LlmArgs,
}

/// Arguments for `qa-forge rank`.
#[derive(Parser, Debug)]
pub struct RankArgs {
    /// JSON file with candidate test cases.
    #[arg(short = 'i', long)]
    pub input: PathBuf,

    /// Number of candidates to keep.
    #[arg(short = 'k', long, default_value = "5")]
    pub top_k: usize,

    /// Write JSON output to this file instead of stdout.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub llm: LlmArgs,
}

/// Arguments for `qa-forge execute`.
#[derive(Parser, Debug)]
pub struct ExecuteArgs {
    /// JSON file with the test cases to execute.
    #[arg(short = 'i', long)]
    pub input: PathBuf,

    /// Run id to use instead of a generated one.
    #[arg(long)]
    pub run_id: Option<String>,

    /// Write JSON output to this file instead of stdout.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub execution: ExecutionArgs,
}

/// Arguments for `qa-forge analyze`.
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// Run to analyze.
    #[arg(short = 'r', long)]
    pub run_id: String,

    /// JSON file with raw results; defaults to the results stored for the run.
    #[arg(short = 'i', long)]
    pub input: Option<PathBuf>,

    /// Write JSON output to this file instead of stdout.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub llm: LlmArgs,
}

/// Arguments for `qa-forge report`.
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Run whose report should be printed.
    #[arg(short = 'r', long)]
    pub run_id: String,

    /// Write JSON output to this file instead of stdout.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `qa-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// JSON file with the test cases to execute.
    #[arg(short = 'i', long)]
    pub input: PathBuf,

    /// Write JSON output to this file instead of stdout.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub execution: ExecutionArgs,

    #[command(flatten)]
    pub llm: LlmArgs,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = PipelineConfig::from_env().context("Invalid QA_* configuration")?;

    match cli.command {
        Commands::Plan(args) => run_plan_command(config, args).await,
        Commands::Rank(args) => run_rank_command(config, args).await,
        Commands::Execute(args) => run_execute_command(config, args).await,
        Commands::Analyze(args) => run_analyze_command(config, args).await,
        Commands::Report(args) => run_report_command(config, args).await,
        Commands::Run(args) => run_run_command(config, args).await,
    }
}

async fn run_plan_command(config: PipelineConfig, args: PlanArgs) -> anyhow::Result<()> {
    let service = build_service(config, Some(&args.llm), None)?;
    let candidates = service
        .plan(args.target_url.as_deref(), &args.seeds, args.count)
        .await?;
    info!(count = candidates.len(), "Candidates generated");
    write_output(args.output.as_deref(), &candidates)
}

async fn run_rank_command(config: PipelineConfig, args: RankArgs) -> anyhow::Result<()> {
    let candidates: Vec<TestCase> = read_json(&args.input)?;
    let service = build_service(config, Some(&args.llm), None)?;
    let selected = service.rank(candidates, args.top_k).await?;
    info!(count = selected.len(), "Candidates selected");
    write_output(args.output.as_deref(), &selected)
}

async fn run_execute_command(config: PipelineConfig, args: ExecuteArgs) -> anyhow::Result<()> {
    let tests: Vec<TestCase> = read_json(&args.input)?;
    let service = build_service(config, None, Some(&args.execution))?;

    let outcome = match args.run_id.as_deref() {
        Some(run_id) => {
            service
                .execute_as(run_id, tests, args.execution.parallelism)
                .await?
        }
        None => service.execute(tests, args.execution.parallelism).await?,
    };
    info!(
        run_id = %outcome.run_id,
        raw_results = %service.store().raw_path(&outcome.run_id).display(),
        "Execution finished"
    );

    write_metrics(&service, args.execution.metrics_output.as_deref())?;
    write_output(args.output.as_deref(), &outcome)
}

async fn run_analyze_command(config: PipelineConfig, args: AnalyzeArgs) -> anyhow::Result<()> {
    let service = build_service(config, Some(&args.llm), None)?;

    let outcome = match args.input.as_deref() {
        Some(path) => {
            let results: Vec<RawResult> = read_json(path)?;
            service.analyze(&args.run_id, &results).await?
        }
        None => service.analyze_run(&args.run_id).await?,
    };
    info!(report = %outcome.report_path, "Report written");
    write_output(args.output.as_deref(), &outcome.report)
}

async fn run_report_command(config: PipelineConfig, args: ReportArgs) -> anyhow::Result<()> {
    let service = build_service(config, None, None)?;
    let report = service.report(&args.run_id).await.map_err(|e| {
        if e.is_not_found() {
            anyhow::anyhow!("No report stored for run {}", args.run_id)
        } else {
            e.into()
        }
    })?;
    write_output(args.output.as_deref(), &report)
}

async fn run_run_command(config: PipelineConfig, args: RunArgs) -> anyhow::Result<()> {
    let tests: Vec<TestCase> = read_json(&args.input)?;
    let service = build_service(config, Some(&args.llm), Some(&args.execution))?;

    let outcome = service.run(tests, args.execution.parallelism).await?;
    info!(report = %outcome.report_path, "Report written");

    write_metrics(&service, args.execution.metrics_output.as_deref())?;
    write_output(args.output.as_deref(), &outcome)
}

fn build_service(
    mut config: PipelineConfig,
    llm: Option<&LlmArgs>,
    execution: Option<&ExecutionArgs>,
) -> anyhow::Result<QaService> {
    if let Some(backend) = execution.and_then(|e| e.backend) {
        config = config.with_capture_backend(backend);
    }
    if let Some(model) = llm.and_then(|l| l.model.clone()) {
        config = config.with_model(model);
    }

    let service = QaService::from_config(config)?;
    let client = llm.and_then(|args| build_llm_client(args, &service.config().model));
    match client {
        Some(client) => Ok(service.with_llm(client)),
        None => Ok(service),
    }
}

/// Resolves an LLM client, or `None` when the command should run without one.
fn build_llm_client(args: &LlmArgs, model: &str) -> Option<Arc<dyn LlmProvider>> {
    if args.offline {
        return None;
    }

    if let Some(key) = args.api_key.clone() {
        match LiteLlmClient::new_with_defaults(key, model) {
            Ok(client) => {
                info!(model = %model, "Using OpenRouter with specified API key");
                return Some(Arc::new(client));
            }
            Err(e) => warn!(error = %e, "Failed to initialize OpenRouter client"),
        }
    }

    match LiteLlmClient::from_env() {
        Ok(client) => {
            info!(api_base = %client.api_base(), "Using LiteLLM client from environment");
            Some(Arc::new(client))
        }
        Err(e) => {
            warn!(
                error = %e,
                "No LLM configured, using placeholder planning and local verdicts only"
            );
            None
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn write_output<T: Serialize>(output: Option<&Path>, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Output written");
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn write_metrics(service: &QaService, path: Option<&Path>) -> anyhow::Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let text = service.metrics().export();
    std::fs::write(path, text)
        .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_arguments() {
        let cli = Cli::try_parse_from([
            "qa-forge",
            "--log-level",
            "debug",
            "run",
            "--input",
            "tests.json",
            "--parallelism",
            "4",
            "--backend",
            "http",
            "--offline",
        ])
        .expect("arguments should parse");

        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.input, PathBuf::from("tests.json"));
                assert_eq!(args.execution.parallelism, Some(4));
                assert_eq!(args.execution.backend, Some(CaptureBackend::Http));
                assert!(args.llm.offline);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_parse_plan_seeds() {
        let cli = Cli::try_parse_from([
            "qa-forge", "plan", "-t", "https://app.test", "-s", "login", "-s", "search", "-n", "3",
        ])
        .expect("arguments should parse");

        match cli.command {
            Commands::Plan(args) => {
                assert_eq!(args.target_url.as_deref(), Some("https://app.test"));
                assert_eq!(args.seeds, vec!["login", "search"]);
                assert_eq!(args.count, 3);
            }
            _ => panic!("expected plan command"),
        }
    }

    #[test]
    fn test_offline_skips_llm() {
        let args = LlmArgs {
            api_key: Some("sk-test".to_string()),
            model: None,
            offline: true,
        };
        assert!(build_llm_client(&args, "gpt-4o-mini").is_none());
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join("tests.json");
        let tests = vec![TestCase::new("login", "Login works")];

        write_output(Some(&path), &tests).expect("write");
        let loaded: Vec<TestCase> = read_json(&path).expect("read");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id.as_deref(), Some("login"));
    }

    #[test]
    fn test_read_json_reports_path() {
        let err = read_json::<Vec<TestCase>>(Path::new("/definitely/missing.json")).unwrap_err();
        assert!(err.to_string().contains("/definitely/missing.json"));
    }
}
