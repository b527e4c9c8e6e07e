use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde_json::json;

use incident_tracker_rs::alert::DispatchOutcome;
use incident_tracker_rs::config::AppConfig;
use incident_tracker_rs::delivery::RecordingChannel;
use incident_tracker_rs::session::SessionLog;
use incident_tracker_rs::{IncidentEngine, IncidentError};

#[derive(Parser, Debug)]
struct Args {
    /// Path to session_*.json[.gz] log
    #[arg(long, conflicts_with = "session_dir")]
    session: Option<PathBuf>,

    /// Directory of recorded sessions to batch replay
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// JSON config file; defaults otherwise
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the alert cooldown
    #[arg(long)]
    cooldown_ms: Option<u64>,
}

fn run_once(path: &Path, config: &AppConfig) -> anyhow::Result<serde_json::Value> {
    let log = SessionLog::load(path).with_context(|| format!("Failed to load {}", path.display()))?;

    let channel = RecordingChannel::new();
    let mut engine = IncidentEngine::new(config, Box::new(channel.clone()))?;

    let mut alerts = Vec::new();
    let mut dropped = 0u64;
    for sample in &log.samples {
        match engine.on_sample(sample) {
            Ok(outcome) => {
                if let Some(alert) = outcome.alert {
                    let dispatched = matches!(outcome.dispatch, Some(DispatchOutcome::Sent(_)));
                    alerts.push(json!({
                        "alert": alert,
                        "dispatched": dispatched,
                    }));
                }
            }
            Err(IncidentError::OrderingFault { .. }) => dropped += 1,
            Err(e) => return Err(e.into()),
        }
    }

    let counters = engine.counters();
    Ok(json!({
        "session": path.display().to_string(),
        "session_id": log.session_id,
        "samples": log.samples.len(),
        "ordering_faults": dropped,
        "detections": counters.detections,
        "compound_alerts": alerts,
        "messages": channel.requests().into_iter().map(|r| r.message).collect::<Vec<_>>(),
    }))
}

fn collect_sessions(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("session_") && (n.ends_with(".json") || n.ends_with(".json.gz")))
                .unwrap_or(false)
        })
        .collect();
    // Stable order keeps batch output reproducible
    paths.sort();
    Ok(paths)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(cooldown) = args.cooldown_ms {
        config.engine.cooldown_ms = cooldown;
    }

    let paths = match (&args.session, &args.session_dir) {
        (Some(path), _) => vec![path.clone()],
        (None, Some(dir)) => collect_sessions(dir)?,
        (None, None) => anyhow::bail!("Either --session or --session-dir is required"),
    };

    let mut results = Vec::new();
    for path in &paths {
        results.push(run_once(path, &config)?);
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
