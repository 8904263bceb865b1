use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use settle_api::ControlPlaneClient;
use settle_engine::{
    OperationHandle, OperationKind, OperationStatusProbe, PollLabel, ReadinessProbe, WaitPolicy, WaitResult, WaitSettings, wait,
};
use settle_util::{build_path, parse_duration, unresolved_placeholders};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod report;

use report::WaitReport;

/// Wait for control-plane operations and resources to settle.
#[derive(Debug, Parser)]
#[command(name = "settle", version, about)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// YAML or JSON settings file.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Poll interval, e.g. 5s or 500ms.
    #[arg(long, global = true, value_name = "DUR", value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Timeout for this wait; defaults to the budget for the operation kind.
    #[arg(long, global = true, value_name = "DUR", value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// Consecutive reads without status metadata to tolerate.
    #[arg(long, global = true, value_name = "N")]
    tolerance: Option<u32>,

    /// Control-plane base URL (overrides SETTLE_API_BASE).
    #[arg(long, global = true, value_name = "URL")]
    base_url: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Wait for an operation status URL or request ID to reach DONE.
    Operation {
        reference: String,
        #[arg(long, value_enum, default_value_t = KindArg::Create)]
        kind: KindArg,
    },
    /// Wait for a resource to reach its ready state.
    Ready {
        /// Resource path; `{name}` placeholders are filled from --var.
        path: String,
        /// Ready state to wait for (case-insensitive).
        #[arg(long)]
        state: Option<String>,
        #[arg(long, value_enum, default_value_t = KindArg::Create)]
        kind: KindArg,
        #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,
    },
    /// Wait until a resource read returns not-found.
    Deleted {
        path: String,
        #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum KindArg {
    Create,
    Read,
    Update,
    Delete,
}

impl From<KindArg> for OperationKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Create => OperationKind::Create,
            KindArg::Read => OperationKind::Read,
            KindArg::Update => OperationKind::Update,
            KindArg::Delete => OperationKind::Delete,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    let settings = load_settings(&cli.global)?;
    let client = build_client(&cli.global)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; cancelling wait");
                cancel.cancel();
            }
        });
    }

    let result = run_command(&cli, &client, &settings, &cancel).await?;
    let report = WaitReport::from(&result);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if result.is_success() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Logs go to stderr so stdout carries only the report.
fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_settings(global: &GlobalArgs) -> Result<WaitSettings> {
    let mut settings = match &global.config {
        Some(path) => WaitSettings::load_from_file(path)?,
        None => WaitSettings::default(),
    };
    settings.apply_env_overrides()?;
    if let Some(interval) = global.interval {
        settings.poll_interval = interval;
    }
    if let Some(tolerance) = global.tolerance {
        settings.missing_metadata_tolerance = tolerance;
    }
    settings.validate()?;
    Ok(settings)
}

fn build_client(global: &GlobalArgs) -> Result<ControlPlaneClient> {
    let client = ControlPlaneClient::new_from_env().context("create control-plane client")?;
    match &global.base_url {
        Some(base_url) => client.with_base_url(base_url).context("apply --base-url"),
        None => Ok(client),
    }
}

fn policy(global: &GlobalArgs, settings: &WaitSettings, kind: OperationKind) -> WaitPolicy {
    let mut policy = settings.policy_for(kind);
    if let Some(timeout) = global.timeout {
        policy.timeout = timeout;
    }
    policy
}

async fn run_command(cli: &Cli, client: &ControlPlaneClient, settings: &WaitSettings, cancel: &CancellationToken) -> Result<WaitResult> {
    let result = match &cli.command {
        Command::Operation { reference, kind } => {
            let policy = policy(&cli.global, settings, (*kind).into());
            let handle = OperationHandle::new(reference.as_str(), policy.poll_interval, policy.timeout)?;
            let probe = OperationStatusProbe::for_handle(client, &handle, settings.status_fields.clone());
            info!(reference = handle.reference(), "waiting for operation");
            wait(&probe, &[PollLabel::Pending], &[PollLabel::Done], policy, cancel).await
        }
        Command::Ready { path, state, kind, vars } => {
            let path = fill_path(path, vars)?;
            let mut probe = ReadinessProbe::new(client, path.as_str(), settings);
            if let Some(state) = state {
                probe = probe.with_ready_state(state.as_str());
            }
            info!(path = %path, "waiting for resource readiness");
            let policy = policy(&cli.global, settings, (*kind).into());
            wait(&probe, &[PollLabel::Pending], &[PollLabel::Done], policy, cancel).await
        }
        Command::Deleted { path, vars } => {
            let path = fill_path(path, vars)?;
            let probe = ReadinessProbe::new(client, path.as_str(), settings);
            info!(path = %path, "waiting for resource deletion");
            let policy = policy(&cli.global, settings, OperationKind::Delete);
            wait(&probe.until_deleted(), &[PollLabel::Pending], &[PollLabel::Deleted], policy, cancel).await
        }
    };
    Ok(result)
}

fn fill_path(template: &str, vars: &[(String, String)]) -> Result<String> {
    let variables: Map<String, Value> = vars
        .iter()
        .map(|(name, value)| (name.clone(), Value::String(value.clone())))
        .collect();
    let path = build_path(template, &variables);
    let unresolved = unresolved_placeholders(&path);
    if !unresolved.is_empty() {
        bail!("unresolved path placeholders: {} (pass them with --var NAME=VALUE)", unresolved.join(", "));
    }
    Ok(path)
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing variable name in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_ready_with_globals() {
        let cli = Cli::try_parse_from([
            "settle",
            "ready",
            "/datacenters/{datacenter}",
            "--var",
            "datacenter=dc-1",
            "--state",
            "ACTIVE",
            "--interval",
            "500ms",
            "--timeout",
            "10m",
        ])
        .expect("valid arguments");

        assert_eq!(cli.global.interval, Some(Duration::from_millis(500)));
        assert_eq!(cli.global.timeout, Some(Duration::from_secs(600)));
        match cli.command {
            Command::Ready { path, state, kind, vars } => {
                assert_eq!(path, "/datacenters/{datacenter}");
                assert_eq!(state.as_deref(), Some("ACTIVE"));
                assert_eq!(kind, KindArg::Create);
                assert_eq!(vars, vec![("datacenter".to_string(), "dc-1".to_string())]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_durations() {
        assert!(Cli::try_parse_from(["settle", "operation", "req-1", "--interval", "soon"]).is_err());
    }

    #[test]
    fn timeout_flag_overrides_kind_budget() {
        let cli = Cli::try_parse_from(["settle", "deleted", "/vpns/vpn-1", "--timeout", "90s"]).expect("valid arguments");
        let settings = WaitSettings::default();
        assert_eq!(policy(&cli.global, &settings, OperationKind::Delete).timeout, Duration::from_secs(90));

        let cli = Cli::try_parse_from(["settle", "deleted", "/vpns/vpn-1"]).expect("valid arguments");
        assert_eq!(
            policy(&cli.global, &settings, OperationKind::Delete).timeout,
            settings.timeouts.delete
        );
    }

    #[test]
    fn fill_path_requires_every_placeholder() {
        let vars = vec![("cluster".to_string(), "c 1".to_string())];
        assert_eq!(fill_path("/clusters/{cluster}", &vars).expect("filled"), "/clusters/c%201");

        let error = fill_path("/clusters/{cluster}/nodepools/{nodepool}", &vars).expect_err("missing nodepool");
        assert!(error.to_string().contains("nodepool"), "{error}");
    }

    #[test]
    fn parse_var_requires_name_and_equals() {
        assert_eq!(parse_var("id=a=b"), Ok(("id".to_string(), "a=b".to_string())));
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }
}
