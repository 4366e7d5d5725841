//! Command-line front end for the governance engines.
//!
//! Inputs are JSON files, results are JSON on stdout, logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! foreman-governance select --domain foreman --descriptor task.json --current gpt-4o-mini
//! foreman-governance struggle --attempts attempts.json
//! foreman-governance decide --task-id task-7 --tier T1 --attempts attempts.json
//! foreman-governance de-escalate --history history.json --current T2
//! foreman-governance drift --signatures window.json
//! foreman-governance blueprint --request request.json --output output.json
//! foreman-governance gate --candidate pr-123.json   # exit 1 when blocked
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

use foreman_governance::audit::{AuditQueue, JsonlAuditSink, NullAuditSink, SharedAuditSink};
use foreman_governance::config::{ConfigOverrides, GovernanceConfig};
use foreman_governance::context::GovernanceContext;
use foreman_governance::drift::Signature;
use foreman_governance::escalation::{
    consider_de_escalation, AttemptLedger, BuildAttempt, BuilderTaskDescriptor, StruggleDetector,
    StruggleThresholds, TaskDescriptor, TaskHistory,
};
use foreman_governance::pipeline::blueprint::model::{BlueprintRequest, BuilderOutput};
use foreman_governance::pipeline::blueprint::{DeterministicPlanSynthesizer, StaticArtifactGenerator};
use foreman_governance::pipeline::gate::MergeCandidate;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Foreman-domain tier table (overrides FOREMAN_TIER_CONFIG)
    #[arg(long, global = true)]
    foreman_tiers: Option<PathBuf>,

    /// Builder-domain tier table (overrides FOREMAN_BUILDER_TIER_CONFIG)
    #[arg(long, global = true)]
    builder_tiers: Option<PathBuf>,

    /// JSON-lines audit log (overrides FOREMAN_AUDIT_LOG)
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,

    /// Emit logs as JSON (overrides FOREMAN_LOG_JSON)
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Domain {
    Foreman,
    Builder,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Select a tier for a task descriptor, or evaluate the current binding
    Select {
        #[arg(long, value_enum)]
        domain: Domain,
        #[arg(long)]
        descriptor: PathBuf,
        /// Resource currently bound to the task
        #[arg(long)]
        current: Option<String>,
    },
    /// Diagnose an attempt history
    Struggle {
        #[arg(long)]
        attempts: PathBuf,
    },
    /// Decide retry, escalate or stop for a builder task
    Decide {
        #[arg(long)]
        task_id: String,
        #[arg(long)]
        tier: String,
        #[arg(long)]
        attempts: PathBuf,
    },
    /// Check whether a clean streak earns a lower tier
    DeEscalate {
        #[arg(long)]
        history: PathBuf,
        /// Builder tier the task type currently runs at
        #[arg(long)]
        current: Option<String>,
    },
    /// Classify a window of structural signatures
    Drift {
        #[arg(long)]
        signatures: PathBuf,
    },
    /// Run the builder blueprint over a request and pre-generated output
    Blueprint {
        #[arg(long)]
        request: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Run the pre-merge gate over a candidate
    Gate {
        #[arg(long)]
        candidate: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize result")?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let mut config = GovernanceConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    config.apply_overrides(&ConfigOverrides {
        foreman_tier_config: args.foreman_tiers.clone(),
        builder_tier_config: args.builder_tiers.clone(),
        audit_log: args.audit_log.clone(),
        log_json: args.log_json.then_some(true),
    });
    init_tracing(config.log_json);

    // Writers funnel through one queue so entries land in submission order.
    let queue = match &config.audit_log {
        Some(path) => {
            let sink = JsonlAuditSink::open(path)
                .with_context(|| format!("Failed to open audit log {}", path.display()))?;
            Some(Arc::new(AuditQueue::spawn(Arc::new(sink))))
        }
        None => None,
    };
    let audit: SharedAuditSink = match &queue {
        Some(queue) => queue.clone() as SharedAuditSink,
        None => Arc::new(NullAuditSink),
    };

    let ctx = GovernanceContext::with_audit(config, audit);
    let exit = run(&ctx, args.command);

    if let Some(queue) = queue {
        match queue.shutdown().await {
            Ok(written) => info!(written, "Audit queue drained"),
            Err(e) => warn!("Audit queue did not drain cleanly: {}", e),
        }
    }
    exit
}

fn run(ctx: &GovernanceContext, command: Command) -> Result<ExitCode> {
    match command {
        Command::Select {
            domain,
            descriptor,
            current,
        } => match domain {
            Domain::Foreman => {
                let descriptor: TaskDescriptor = read_json(&descriptor)?;
                let selector = ctx.foreman_selector();
                match current {
                    Some(resource) => print_json(&selector.evaluate(&resource, &descriptor))?,
                    None => print_json(&selector.select_tier(&descriptor))?,
                }
            }
            Domain::Builder => {
                let descriptor: BuilderTaskDescriptor = read_json(&descriptor)?;
                let selector = ctx.builder_selector();
                match current {
                    Some(resource) => print_json(&selector.evaluate(&resource, &descriptor))?,
                    None => print_json(&selector.select_tier(&descriptor))?,
                }
            }
        },
        Command::Struggle { attempts } => {
            let attempts: Vec<BuildAttempt> = read_json(&attempts)?;
            let thresholds = ctx
                .config()
                .struggle
                .unwrap_or_else(|| StruggleThresholds::from_table(ctx.builder_table()));
            print_json(&StruggleDetector::with_thresholds(thresholds).detect(&attempts))?;
        }
        Command::Decide {
            task_id,
            tier,
            attempts,
        } => {
            let ledger = AttemptLedger::from_attempts(task_id, read_json(&attempts)?);
            let decision = ctx.engine().decide(&tier, &ledger);
            print_json(&decision)?;
            if decision.exhausted_error().is_some() || decision.denial().is_some() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::DeEscalate { history, current } => {
            let history: Vec<TaskHistory> = read_json(&history)?;
            let eligible = consider_de_escalation(&history);
            let next = match (&current, eligible) {
                (Some(tier), true) => ctx.builder_selector().de_escalate(tier).map(|t| t.name.clone()),
                _ => None,
            };
            print_json(&serde_json::json!({ "eligible": eligible, "nextTier": next }))?;
        }
        Command::Drift { signatures } => {
            let signatures: Vec<Signature> = read_json(&signatures)?;
            print_json(&ctx.drift_classifier().classify(&signatures))?;
        }
        Command::Blueprint { request, output } => {
            let request: BlueprintRequest = read_json(&request)?;
            let output: BuilderOutput = read_json(&output)?;
            let blueprint = ctx.blueprint(
                Arc::new(DeterministicPlanSynthesizer),
                Arc::new(StaticArtifactGenerator::new(output)),
            );
            let outcome = blueprint.execute(request);
            print_json(&serde_json::json!({
                "result": outcome.result,
                "handover": outcome.handover,
                "integrityViolations": outcome.integrity_violations,
            }))?;
            if !outcome.passed() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Gate { candidate } => {
            let candidate: MergeCandidate = read_json(&candidate)?;
            let verdict = ctx.gate().evaluate(candidate);
            print_json(&verdict)?;
            if !verdict.merge_allowed {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
