//! memory-courier binary entry point.
//!
//! Usage: memory-courier [--config <path>] [--url <url>] <command>
//!
//! Submission commands print the council's confirmation as JSON and exit
//! non-zero when the record could not be delivered. Ctrl-C cancels a
//! submission between attempts.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use memory_courier::{
    fingerprint, CancellationToken, ClassificationSignals, CourierConfig, MemoryCourier,
    MemoryDraft, SubmissionOutcome,
};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Memory courier: deliver Always Memory records to a Stewardship Council.
#[derive(Parser, Debug)]
#[command(name = "memory-courier")]
#[command(about = "Classify, fingerprint and reliably deliver Always Memory records")]
struct Args {
    /// Config file (defaults to ~/.tml/courier.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Council endpoint.
    #[arg(long, global = true, env = "STEWARDSHIP_COUNCIL_URL")]
    url: Option<String>,

    /// Total delivery attempts.
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Also append JSONL logs to this file.
    #[arg(long, global = true, env = "MEMORY_COURIER_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Append JSONL logs to ~/.tml/logs/courier.jsonl (ignored with --log-file).
    #[arg(long, global = true)]
    jsonl: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify and submit a memory.
    Submit {
        /// Action name stored in the payload.
        #[arg(long)]
        action: String,
        /// Explicit Sacred Zero trigger.
        #[arg(long)]
        trigger: Option<String>,
        /// Severity score in [0, 1].
        #[arg(long)]
        severity: Option<f64>,
        /// Extra payload fields as a JSON object.
        #[arg(long)]
        payload: Option<String>,
        /// Context to fingerprint, as JSON.
        #[arg(long)]
        context: Option<String>,
    },
    /// Escalate an event for human review.
    SacredZero {
        #[arg(long)]
        trigger: String,
        /// Context to fingerprint, as JSON.
        #[arg(long, default_value = "{}")]
        context: String,
    },
    /// Submit an environmental impact assessment.
    PlanetaryImpact {
        /// Assessment JSON with a numeric irreversibility_score.
        #[arg(long)]
        impact: String,
    },
    /// Print the classification without submitting.
    Classify {
        #[arg(long)]
        trigger: Option<String>,
        #[arg(long)]
        severity: Option<f64>,
    },
    /// Print the fingerprint of a JSON context.
    Fingerprint {
        #[arg(long)]
        context: String,
    },
}

fn parse_json(flag: &str, raw: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("--{} is not valid JSON", flag))
}

fn parse_object(flag: &str, raw: &str) -> anyhow::Result<Map<String, Value>> {
    match parse_json(flag, raw)? {
        Value::Object(map) => Ok(map),
        other => bail!("--{} must be a JSON object, got {}", flag, other),
    }
}

fn load_config(args: &Args) -> anyhow::Result<CourierConfig> {
    let mut config = CourierConfig::load(args.config.as_deref())?;

    if let Some(url) = &args.url {
        config.destination_url = url.clone();
    }
    if let Some(max_attempts) = args.max_attempts {
        config.max_attempts = max_attempts;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run a submission, cancelling it on Ctrl-C.
async fn deliver(
    courier: &MemoryCourier,
    command: Command,
    cancel: CancellationToken,
) -> anyhow::Result<SubmissionOutcome> {
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Received interrupt, cancelling submission");
                cancel.cancel();
            }
        })
    };

    let outcome = match command {
        Command::Submit {
            action,
            trigger,
            severity,
            payload,
            context,
        } => {
            let draft = MemoryDraft {
                action: Some(action),
                signals: ClassificationSignals {
                    trigger,
                    severity_score: severity,
                },
                payload: match payload {
                    Some(raw) => parse_object("payload", &raw)?,
                    None => Map::new(),
                },
                context: context.map(|raw| parse_json("context", &raw)).transpose()?,
            };
            courier.submit_memory(draft, &cancel).await
        }
        Command::SacredZero { trigger, context } => {
            let context = parse_json("context", &context)?;
            courier.submit_sacred_zero(&trigger, context, &cancel).await
        }
        Command::PlanetaryImpact { impact } => {
            let impact = parse_json("impact", &impact)?;
            courier.submit_planetary_impact(impact, &cancel).await
        }
        Command::Classify { .. } | Command::Fingerprint { .. } => {
            bail!("not a submission command")
        }
    };

    watcher.abort();
    Ok(outcome)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    observability::init_with_config(observability::LogConfig {
        service_name: "memory-courier".into(),
        default_level: config.log_level.clone(),
        log_path: observability::jsonl_path(args.log_file.clone(), args.jsonl),
        also_stderr: true,
    })
    .context("failed to initialize logging")?;

    let courier = MemoryCourier::from_config(&config)?;

    match args.command {
        Command::Classify { trigger, severity } => {
            let classification = courier.classifier().classify(&ClassificationSignals {
                trigger,
                severity_score: severity,
            })?;
            print_json(&json!({
                "classification": classification.code(),
                "memoryType": classification.routing_tag(),
                "trigger": classification.trigger(),
                "requiresHumanReview": classification.is_sacred_zero(),
            }))
        }
        Command::Fingerprint { context } => {
            let context = parse_json("context", &context)?;
            print_json(&json!({ "fingerprint": fingerprint(&context)? }))
        }
        command => {
            info!(
                destination = %courier.destination(),
                max_attempts = config.max_attempts,
                "Submitting memory"
            );

            match deliver(&courier, command, CancellationToken::new()).await? {
                Ok(confirmation) => print_json(&confirmation),
                Err(e) if e.is_caller_error() => {
                    warn!(error = %e, "Memory rejected before submission");
                    Err(e.into())
                }
                Err(e) => {
                    error!(error = %e, attempts = e.attempts(), "Memory was not delivered");
                    Err(e.into())
                }
            }
        }
    }
}
