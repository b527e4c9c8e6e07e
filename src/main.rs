use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Duration, Instant};

use incident_tracker_rs::alert::DispatchOutcome;
use incident_tracker_rs::clock::{ClockSource, MonotonicClock};
use incident_tracker_rs::config::AppConfig;
use incident_tracker_rs::delivery::{AlertChannel, DeliveryReport, HttpAlertChannel, LogChannel};
use incident_tracker_rs::live_status::LiveStatus;
use incident_tracker_rs::sensors::{
    run_source, SourceEvent, SyntheticLocationSource, SyntheticMotionSource, TermuxLocationSource,
    TermuxMotionSource,
};
use incident_tracker_rs::session::SessionLog;
use incident_tracker_rs::{IncidentEngine, IncidentError};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    /// termux-sensor / termux-location
    Termux,
    /// Generated cruise, optionally ending in a crash
    Synthetic,
}

#[derive(Parser, Debug)]
#[command(name = "incident_tracker")]
#[command(about = "Vehicle incident detector - speed drop + impact + tilt correlation", long_about = None)]
struct Args {
    /// Duration in seconds (0 = continuous)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// JSON config file (engine thresholds and delivery settings)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Telemetry source
    #[arg(long, value_enum, default_value = "termux")]
    source: SourceKind,

    /// Synthetic source only: crash this many seconds after start
    #[arg(long)]
    simulate_crash_at: Option<u64>,

    /// Motion sampling interval
    #[arg(long, default_value = "100")]
    motion_interval_ms: u64,

    /// Location sampling interval
    #[arg(long, default_value = "1000")]
    location_interval_ms: u64,

    /// Consecutive failed reads before a stream is given up
    #[arg(long, default_value = "20")]
    max_read_failures: u32,

    /// Override the alert cooldown
    #[arg(long)]
    cooldown_ms: Option<u64>,

    /// Detect but never send
    #[arg(long)]
    disable_alerts: bool,

    /// Alert recipient (phone number)
    #[arg(long)]
    recipient: Option<String>,

    /// SMS relay endpoint
    #[arg(long)]
    endpoint: Option<String>,

    /// Vehicle mass for the momentum estimate
    #[arg(long)]
    vehicle_mass_kg: Option<f64>,

    /// Record accepted samples for replay
    #[arg(long)]
    record: bool,

    /// Output directory
    #[arg(long, default_value = "incident_sessions")]
    output_dir: String,
}

fn build_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AppConfig::default(),
    };

    if let Some(cooldown) = args.cooldown_ms {
        config.engine.cooldown_ms = cooldown;
    }
    if args.disable_alerts {
        config.engine.alerts_enabled = false;
    }
    if let Some(mass) = args.vehicle_mass_kg {
        config.engine.vehicle_mass_kg = mass;
    }
    if let Some(recipient) = &args.recipient {
        config.delivery.recipient = recipient.clone();
    }
    if let Some(endpoint) = &args.endpoint {
        config.delivery.endpoint = Some(endpoint.clone());
    }

    config.engine.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = build_config(&args)?;

    println!("[{}] Incident Tracker Starting", ts_now());
    println!("  Duration: {} seconds (0=continuous)", args.duration);
    println!("  Source: {:?}", args.source);
    println!("  Alerts: {}", if config.engine.alerts_enabled { "enabled" } else { "disabled" });
    println!(
        "  Delivery: {}",
        config.delivery.endpoint.as_deref().unwrap_or("log only")
    );
    println!("  Output Dir: {}", args.output_dir);

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create {}", args.output_dir))?;

    let (report_tx, mut report_rx) = mpsc::unbounded_channel::<DeliveryReport>();
    let channel: Box<dyn AlertChannel> = match &config.delivery.endpoint {
        Some(endpoint) => Box::new(HttpAlertChannel::new(endpoint, &config.delivery, report_tx)),
        None => Box::new(LogChannel),
    };
    let mut engine = IncidentEngine::new(&config, channel)?;

    let clock: Arc<dyn ClockSource> = Arc::new(MonotonicClock::new());
    let (tx, mut rx) = mpsc::channel::<SourceEvent>(500);
    let motion_interval = Duration::from_millis(args.motion_interval_ms);
    let location_interval = Duration::from_millis(args.location_interval_ms);

    // Hold handles to keep tasks alive
    let _handles = match args.source {
        SourceKind::Termux => vec![
            tokio::spawn(run_source(
                TermuxMotionSource::new(clock.clone(), motion_interval),
                tx.clone(),
                args.max_read_failures,
            )),
            tokio::spawn(run_source(
                TermuxLocationSource::new(clock.clone(), location_interval),
                tx.clone(),
                args.max_read_failures,
            )),
        ],
        SourceKind::Synthetic => {
            let crash_at = args
                .simulate_crash_at
                .map(|secs| crash_deadline(clock.now_ms(), secs));
            // Half-period fixes keep the braking comparison inside its 1 s gate
            let location_interval = location_interval.min(Duration::from_millis(500));
            vec![
                tokio::spawn(run_source(
                    SyntheticMotionSource::new(clock.clone(), motion_interval, crash_at),
                    tx.clone(),
                    args.max_read_failures,
                )),
                tokio::spawn(run_source(
                    SyntheticLocationSource::new(clock.clone(), location_interval, crash_at),
                    tx.clone(),
                    args.max_read_failures,
                )),
            ]
        }
    };
    drop(tx);

    let mut status = LiveStatus::new();
    let mut session = args.record.then(SessionLog::new);
    let status_path = format!("{}/live_status.json", args.output_dir);
    let mut status_tick = interval(Duration::from_secs(2));
    let start = Instant::now();

    let deadline = sleep(Duration::from_secs(args.duration));
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    println!("[{}] Monitoring...", ts_now());

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    log::warn!("All sample sources stopped");
                    break;
                };
                match event {
                    SourceEvent::Sample(sample) => match engine.on_sample(&sample) {
                        Ok(outcome) => {
                            if let Some(session) = session.as_mut() {
                                session.push(sample);
                            }
                            if let Some(DispatchOutcome::Sent(request)) = outcome.dispatch {
                                println!("[{}] ALERT SENT\n{}", ts_now(), request.message);
                                status.last_alert_message = Some(request.message);
                            } else if outcome.alert.is_some() {
                                println!("[{}] Incident detected, alert suppressed", ts_now());
                            }
                        }
                        Err(IncidentError::OrderingFault { .. }) => {}
                        Err(e) => log::debug!("Sample dropped: {}", e),
                    },
                    SourceEvent::Fault { stream, reason } => {
                        engine.disable_stream(stream, &reason);
                    }
                }
            }
            Some(report) = report_rx.recv() => {
                match (&report, report.fault()) {
                    (DeliveryReport::Delivered { recipient, id }, _) => {
                        log::info!("Alert delivered to {} (id {:?})", recipient, id);
                    }
                    (_, Some(fault)) => log::warn!("{}", fault),
                    (_, None) => {}
                }
                status.apply_delivery(&report);
            }
            _ = status_tick.tick() => {
                status.apply_snapshot(&engine.snapshot());
                status.uptime_seconds = start.elapsed().as_secs();
                if let Err(e) = status.save(&status_path) {
                    log::warn!("Failed to write {}: {}", status_path, e);
                }
            }
            _ = &mut deadline, if args.duration > 0 => {
                println!("[{}] Duration reached, stopping...", ts_now());
                break;
            }
            _ = &mut ctrl_c => {
                println!("[{}] Interrupted, stopping...", ts_now());
                break;
            }
        }
    }

    // In-flight deliveries are not awaited
    status.apply_snapshot(&engine.snapshot());
    status.uptime_seconds = start.elapsed().as_secs();
    let final_path = format!("{}/live_status_final.json", args.output_dir);
    if let Err(e) = status.save(&final_path) {
        log::warn!("Failed to write {}: {}", final_path, e);
    }

    if let Some(session) = session {
        let path = PathBuf::from(format!(
            "{}/session_{}.json.gz",
            args.output_dir,
            ts_now_clean()
        ));
        session
            .save(&path)
            .with_context(|| format!("Failed to save {}", path.display()))?;
        println!(
            "[{}] Recorded {} samples to {}",
            ts_now(),
            session.samples.len(),
            path.display()
        );
    }

    let counters = engine.counters();
    println!("\n=== Final Stats ===");
    println!("Location samples: {}", counters.location_samples);
    println!("Motion samples: {}", counters.motion_samples);
    println!("Ordering faults: {}", counters.ordering_faults);
    for fault in engine.input_faults() {
        println!("  {}", fault);
    }
    println!("Compound incidents: {}", counters.compound_alerts);
    println!(
        "Alerts dispatched/suppressed: {}/{}",
        counters.alerts_dispatched, counters.alerts_suppressed
    );

    Ok(())
}

/// Clock reading at which the synthetic crash starts
fn crash_deadline(now_ms: u64, after_secs: u64) -> u64 {
    now_ms.saturating_add(after_secs.saturating_mul(1000))
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
