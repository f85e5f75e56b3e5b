//! Phasewright CLI
//!
//! The `phasewright` command drives phase-gated agents from a terminal.
//!
//! ## Commands
//!
//! - `phases`: Show the declared phase order and each stage's modes
//! - `tools`: List the built-in tools
//! - `run-phase`: Run one phase
//! - `run-workflow`: Run a range of phases in order
//! - `run-team`: Run Design & Build team roles
//! - `approvals`: List approvals parked in `--approvals-dir`
//! - `resolve`: Decide a parked approval and resume its run

mod approver;
mod builtin_tools;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use phasewright_core::agent::InvocationOutcome;
use phasewright_core::approval::PendingApproval;
use phasewright_core::orchestrator::ModeTable;
use phasewright_core::{
    init_tracing, load_config, with_cancellation, AnthropicClient, ApprovalDecision,
    ApprovalGate, AutoApprover, CancelSignal, FsApprovalStore, GeminiClient, Orchestrator,
    OrchestratorConfig, OrchestratorResult, Phase, PhaseResult, PhaseRun, ProviderRegistry,
    ProviderResponse, Resolution, Role, ScriptedProvider, SequenceReport, SequenceStatus,
    StageOverride,
};
use serde_json::Value;
use tracing::{debug, info, Level};

use crate::approver::StdinApprover;
use crate::builtin_tools::{READ_FILE, RUN_TESTS, WRITE_FILE};

const DRY_RUN_PROVIDER: &str = "scripted";
const DRY_RUN_REPLY: &str = "[dry run] No model was called. Configure a provider to get real output.";

#[derive(Parser)]
#[command(name = "phasewright")]
#[command(version = phasewright_core::VERSION)]
#[command(about = "Phase-gated delivery agents with human approval", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Orchestrator config file (TOML)
    #[arg(long, global = true, default_value = "phasewright.toml")]
    config: PathBuf,

    /// Approve every gated tool call without asking
    #[arg(long, global = true)]
    auto_approve: bool,

    /// Persist approvals here and park runs instead of prompting
    #[arg(long, global = true, env = "PHASEWRIGHT_APPROVALS_DIR")]
    approvals_dir: Option<PathBuf>,

    /// Use an offline scripted provider instead of a model backend
    #[arg(long, global = true)]
    dry_run: bool,

    /// Command `run_tests` executes
    #[arg(long, global = true, default_value = "cargo test")]
    test_command: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the phase order and every stage's modes and tools
    Phases,

    /// List the built-in tools
    Tools,

    /// Run a single phase
    RunPhase {
        /// Phase to run, e.g. `requirements` or `design-build`
        #[arg(short, long)]
        phase: Phase,

        /// Project input handed to the agent
        #[arg(short, long)]
        input: String,
    },

    /// Run phases in declared order
    RunWorkflow {
        #[arg(short, long)]
        input: String,

        /// First phase (default: first declared)
        #[arg(long)]
        from: Option<Phase>,

        /// Last phase (default: last declared)
        #[arg(long)]
        to: Option<Phase>,
    },

    /// Run Design & Build team roles
    RunTeam {
        #[arg(short, long)]
        input: String,

        /// Comma-separated roles in run order (default: whole team)
        #[arg(long, value_delimiter = ',')]
        roles: Option<Vec<Role>>,
    },

    /// List approvals waiting in --approvals-dir
    Approvals,

    /// Decide a parked approval and resume its run
    Resolve {
        /// Request id shown when the run was parked
        request_id: String,

        #[arg(value_enum)]
        verdict: VerdictArg,

        /// Reason recorded with the decision
        #[arg(long)]
        reason: Option<String>,

        /// Replacement arguments (JSON object) for `modify`
        #[arg(long)]
        args: Option<String>,

        /// Who is deciding
        #[arg(long, env = "USER", default_value = "operator")]
        decider: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum VerdictArg {
    Approve,
    Deny,
    Modify,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match &cli.command {
        Commands::Phases => cmd_phases(&cli),
        Commands::Tools => cmd_tools(&cli),
        Commands::RunPhase { phase, input } => cmd_run_phase(&cli, *phase, input).await,
        Commands::RunWorkflow { input, from, to } => {
            cmd_run_workflow(&cli, input, *from, *to).await
        }
        Commands::RunTeam { input, roles } => cmd_run_team(&cli, input, roles.as_deref()).await,
        Commands::Approvals => cmd_approvals(&cli),
        Commands::Resolve {
            request_id,
            verdict,
            reason,
            args,
            decider,
        } => {
            cmd_resolve(
                &cli,
                request_id,
                *verdict,
                reason.as_deref(),
                args.as_deref(),
                decider,
            )
            .await
        }
    }
}

// --- setup ---

/// The config file if present, otherwise defaults with the demo tools
/// assigned to stages. `--dry-run` points every stage at the scripted
/// provider.
fn settings(cli: &Cli) -> Result<OrchestratorConfig> {
    let mut config = if cli.config.exists() {
        load_config(&cli.config)
            .with_context(|| format!("Failed to load config from {}", cli.config.display()))?
    } else {
        debug!(path = %cli.config.display(), "config file not found, using demo defaults");
        demo_config()
    };

    if cli.dry_run {
        config.default_provider = DRY_RUN_PROVIDER.to_string();
        for table in config.phases.values_mut().chain(config.roles.values_mut()) {
            table.provider = None;
        }
    }
    Ok(config)
}

fn demo_config() -> OrchestratorConfig {
    fn tools(names: &[&str]) -> StageOverride {
        StageOverride {
            allowed_tools: Some(names.iter().map(|n| n.to_string()).collect()),
            ..StageOverride::default()
        }
    }

    let mut config = OrchestratorConfig::default();
    let phases: [(Phase, &[&str]); 6] = [
        (Phase::Discovery, &[READ_FILE]),
        (Phase::Requirements, &[READ_FILE]),
        (Phase::Architecture, &[READ_FILE]),
        (Phase::DesignBuild, &[READ_FILE, WRITE_FILE]),
        (Phase::Testing, &[READ_FILE, RUN_TESTS]),
        (Phase::Deployment, &[READ_FILE]),
    ];
    for (phase, names) in phases {
        config.phases.insert(phase.as_str().to_string(), tools(names));
    }
    let roles: [(Role, &[&str]); 6] = [
        (Role::DevLead, &[READ_FILE]),
        (Role::Frontend, &[READ_FILE, WRITE_FILE]),
        (Role::Backend, &[READ_FILE, WRITE_FILE]),
        (Role::AutomationTester, &[READ_FILE, WRITE_FILE, RUN_TESTS]),
        (Role::NfrTester, &[READ_FILE, RUN_TESTS]),
        (Role::PenTester, &[READ_FILE]),
    ];
    for (role, names) in roles {
        config.roles.insert(role.as_str().to_string(), tools(names));
    }
    config
}

fn providers(dry_run: bool) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    if dry_run {
        registry.register(Arc::new(ScriptedProvider::always(
            DRY_RUN_PROVIDER,
            ProviderResponse::text(DRY_RUN_REPLY),
        )));
        return registry;
    }
    match AnthropicClient::from_env() {
        Ok(client) => registry.register(Arc::new(client)),
        Err(err) => debug!(error = %err, "anthropic provider not configured"),
    }
    match GeminiClient::from_env() {
        Ok(client) => registry.register(Arc::new(client)),
        Err(err) => debug!(error = %err, "gemini provider not configured"),
    }
    registry
}

fn build_orchestrator(cli: &Cli) -> Result<Orchestrator> {
    let config = settings(cli)?;
    let root = std::env::current_dir().context("Failed to resolve the working directory")?;
    let tools = Arc::new(builtin_tools::registry(&root, &cli.test_command)?);

    let mut orchestrator = Orchestrator::new(config, tools, providers(cli.dry_run)).context(
        "Failed to build the orchestrator (set ANTHROPIC_API_KEY or GEMINI_API_KEY, or pass --dry-run)",
    )?;

    if let Some(dir) = &cli.approvals_dir {
        let store = FsApprovalStore::new(dir)
            .with_context(|| format!("Failed to open approvals dir {}", dir.display()))?;
        orchestrator = orchestrator.with_gate(Arc::new(ApprovalGate::new(Arc::new(store))));
    }
    if cli.auto_approve {
        orchestrator = orchestrator.with_approver(Arc::new(AutoApprover::new("cli:auto-approve")));
    } else if cli.approvals_dir.is_none() {
        orchestrator = orchestrator.with_approver(Arc::new(StdinApprover::from_env()));
    }
    Ok(orchestrator)
}

// --- commands ---

fn cmd_phases(cli: &Cli) -> Result<()> {
    let config = settings(cli)?;
    let modes = ModeTable::from_config(&config);

    println!("Phase order: {}", join(config.phase_order.iter()));
    println!();
    for stage_config in modes.iter() {
        let tools = if stage_config.allowed_tools.is_empty() {
            "-".to_string()
        } else {
            stage_config.allowed_tools.join(", ")
        };
        println!(
            "{:<20} {:<10} {:<17} {}/{}  tools: {}",
            stage_config.stage.title(),
            stage_config.execution_mode.as_str(),
            stage_config.workflow_mode.as_str(),
            stage_config.provider,
            stage_config.model,
            tools
        );
    }
    Ok(())
}

fn cmd_tools(cli: &Cli) -> Result<()> {
    let root = std::env::current_dir().context("Failed to resolve the working directory")?;
    let registry = builtin_tools::registry(&root, &cli.test_command)?;
    for tool in registry.list(None) {
        let spec = tool.spec();
        let approval = if spec.requires_approval {
            "approval"
        } else {
            "-"
        };
        println!(
            "{:<12} {:<13} {:<9} {}",
            spec.name,
            spec.category.to_string(),
            approval,
            spec.description
        );
    }
    Ok(())
}

/// Drive `fut` until it finishes or Ctrl-C arrives.
async fn interruptible<T>(
    fut: impl Future<Output = OrchestratorResult<T>>,
) -> OrchestratorResult<T> {
    let (handle, signal) = CancelSignal::new();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });
    let out = with_cancellation(fut, signal).await;
    watcher.abort();
    out
}

async fn cmd_run_phase(cli: &Cli, phase: Phase, input: &str) -> Result<()> {
    let orchestrator = build_orchestrator(cli)?;
    let run = interruptible(orchestrator.run_phase(phase, input))
        .await
        .with_context(|| format!("Failed to run phase '{phase}'"))?;
    orchestrator.metrics().flush();
    report_phase_run(&run)
}

async fn cmd_run_workflow(
    cli: &Cli,
    input: &str,
    from: Option<Phase>,
    to: Option<Phase>,
) -> Result<()> {
    let orchestrator = build_orchestrator(cli)?;
    let report = interruptible(orchestrator.run_workflow(input, from, to))
        .await
        .context("Failed to run workflow")?;
    report_sequence(&report)
}

async fn cmd_run_team(cli: &Cli, input: &str, roles: Option<&[Role]>) -> Result<()> {
    let orchestrator = build_orchestrator(cli)?;
    let report = interruptible(orchestrator.run_design_build_team(input, roles))
        .await
        .context("Failed to run the design & build team")?;
    report_sequence(&report)
}

fn cmd_approvals(cli: &Cli) -> Result<()> {
    let Some(dir) = &cli.approvals_dir else {
        bail!("--approvals-dir is required to list parked approvals");
    };
    let store = FsApprovalStore::new(dir)
        .with_context(|| format!("Failed to open approvals dir {}", dir.display()))?;
    let gate = ApprovalGate::new(Arc::new(store));
    let pending = gate.pending().context("Failed to read parked approvals")?;
    if pending.is_empty() {
        println!("No approvals waiting.");
        return Ok(());
    }
    for prompt in pending {
        println!("{}  {}", prompt.request_id, prompt);
    }
    Ok(())
}

async fn cmd_resolve(
    cli: &Cli,
    request_id: &str,
    verdict: VerdictArg,
    reason: Option<&str>,
    args: Option<&str>,
    decider: &str,
) -> Result<()> {
    if cli.approvals_dir.is_none() {
        bail!("--approvals-dir is required to resolve a parked approval");
    }
    let mut decision = match verdict {
        VerdictArg::Approve => ApprovalDecision::approve(request_id, decider),
        VerdictArg::Deny => ApprovalDecision::deny(
            request_id,
            decider,
            reason.unwrap_or("denied from the command line"),
        ),
        VerdictArg::Modify => {
            let Some(raw) = args else {
                bail!("modify needs --args with a JSON object");
            };
            let arguments: Value =
                serde_json::from_str(raw).context("Failed to parse --args as JSON")?;
            ApprovalDecision::modify(request_id, decider, arguments)
        }
    };
    if let Some(reason) = reason.filter(|_| !matches!(verdict, VerdictArg::Deny)) {
        decision = decision.with_reason(reason);
    }

    let orchestrator = build_orchestrator(cli)?;
    let resolution = interruptible(orchestrator.resolve_approval(request_id, decision))
        .await
        .with_context(|| format!("Failed to resolve approval {request_id}"))?;
    info!(request_id = %request_id, "approval resolved");
    orchestrator.metrics().flush();

    match resolution {
        Resolution::Phase(run) => report_phase_run(&run),
        Resolution::Sequence(report) => report_sequence(&report),
    }
}

// --- output ---

fn report_phase_run(run: &PhaseRun) -> Result<()> {
    match run {
        PhaseRun::Completed(result) => {
            print_result(result);
            if !result.success {
                bail!("{} failed", result.stage.title());
            }
            Ok(())
        }
        PhaseRun::AwaitingApproval(pending) => {
            print_pending(pending);
            Ok(())
        }
    }
}

fn report_sequence(report: &SequenceReport) -> Result<()> {
    for result in &report.results {
        print_result(result);
    }
    match &report.status {
        SequenceStatus::Completed => {
            println!("Completed {} stage(s).", report.results.len());
            Ok(())
        }
        SequenceStatus::Halted { stage } => bail!("Halted at {}", stage.title()),
        SequenceStatus::AwaitingApproval { .. } => {
            if let Some(pending) = &report.pending {
                print_pending(pending);
            }
            Ok(())
        }
    }
}

fn print_result(result: &PhaseResult) {
    let status = if result.success { "ok" } else { "failed" };
    println!(
        "== {} [{}] {} iteration(s), {} ms",
        result.stage.title(),
        status,
        result.iterations,
        result.duration_ms
    );
    for invocation in &result.tool_invocations {
        let label = match &invocation.outcome {
            InvocationOutcome::Executed { duration_ms, .. } => {
                format!("executed ({duration_ms} ms)")
            }
            InvocationOutcome::Failed { kind, .. } => format!("failed ({kind})"),
            InvocationOutcome::Denied { decider, .. } => format!("denied by {decider}"),
            InvocationOutcome::Rejected { reason } => format!("rejected: {reason}"),
            InvocationOutcome::Advisory => "advisory only".to_string(),
        };
        println!("   - {} {}", invocation.request.tool_name, label);
    }
    if let Some(error) = &result.error {
        println!("   error [{}]: {}", error.kind, error.message);
    }
    if !result.output.trim().is_empty() {
        println!("{}", result.output.trim());
    }
    println!();
}

fn print_pending(pending: &PendingApproval) {
    println!("Awaiting approval {}", pending.request_id);
    println!("  {}", pending.prompt);
    println!(
        "Resolve with: phasewright --approvals-dir <dir> resolve {} approve|deny|modify",
        pending.request_id
    );
}

fn join<T: std::fmt::Display>(items: impl Iterator<Item = T>) -> String {
    items.map(|i| i.to_string()).collect::<Vec<_>>().join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_config_assigns_registered_tools() {
        let config = demo_config();
        config.validate().unwrap();
        let testing = config.agent_config(phasewright_core::Stage::Phase(Phase::Testing));
        assert_eq!(testing.allowed_tools, vec![READ_FILE, RUN_TESTS]);
    }

    #[test]
    fn dry_run_points_every_stage_at_the_scripted_provider() {
        let cli = Cli::parse_from([
            "phasewright",
            "--dry-run",
            "--config",
            "/nonexistent/phasewright.toml",
            "phases",
        ]);
        let config = settings(&cli).unwrap();
        assert_eq!(config.default_provider, DRY_RUN_PROVIDER);
        build_orchestrator(&cli).unwrap();
    }

    #[test]
    fn run_team_parses_comma_separated_roles() {
        let cli = Cli::parse_from([
            "phasewright",
            "run-team",
            "--input",
            "billing",
            "--roles",
            "backend,dev-lead",
        ]);
        match cli.command {
            Commands::RunTeam { roles, .. } => {
                assert_eq!(roles, Some(vec![Role::Backend, Role::DevLead]));
            }
            _ => panic!("expected run-team"),
        }
    }
}
