use serde::Deserialize;
use std::io::ErrorKind;
use std::process::Command;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tokio::time::{interval, Duration};

use crate::clock::ClockSource;
use crate::health_monitor::StreamHealth;
use crate::types::{LocationSample, Millis, MotionSample, Sample, SensorStream};

const STANDARD_GRAVITY: f64 = 9.80665; // m/s² per g

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Permission denied or hardware missing; the stream will not recover
    #[error("sensor unavailable: {0}")]
    Unavailable(String),

    #[error("read failed: {0}")]
    Transient(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum SourceEvent {
    Sample(Sample),
    Fault { stream: SensorStream, reason: String },
}

/// Push-model telemetry source. `run_source` polls it on its interval.
pub trait SampleSource: Send {
    fn stream(&self) -> SensorStream;
    fn interval(&self) -> Duration;
    fn poll(&mut self) -> Result<Option<Sample>, SourceError>;
}

pub async fn run_source<S: SampleSource>(mut source: S, tx: Sender<SourceEvent>, max_failures: u32) {
    let stream = source.stream();
    let mut health = StreamHealth::new(stream.as_str(), max_failures);
    let mut interval = interval(source.interval());

    loop {
        interval.tick().await;

        let sample = match source.poll() {
            Ok(Some(sample)) => sample,
            Ok(None) => continue,
            Err(SourceError::Transient(reason)) => {
                let exhausted = health.record_failure();
                log::debug!("[{}] {}", health.format_status(), reason);
                if exhausted {
                    let reason = format!("{}, last error: {}", health.format_status(), reason);
                    let _ = tx.send(SourceEvent::Fault { stream, reason }).await;
                    return;
                }
                continue;
            }
            Err(SourceError::Unavailable(reason)) => {
                let _ = tx.send(SourceEvent::Fault { stream, reason }).await;
                return;
            }
        };

        health.record_success();
        match tx.try_send(SourceEvent::Sample(sample)) {
            Ok(_) => {
                if health.total_samples() % 100 == 0 {
                    log::debug!("[{}]", health.format_status());
                }
            }
            Err(TrySendError::Closed(_)) => {
                log::info!(
                    "[{}] Channel closed after {} samples",
                    stream.as_str(),
                    health.total_samples()
                );
                break;
            }
            Err(TrySendError::Full(_)) => {
                // Channel full, drop this sample
            }
        }
    }
}

// ─── Termux:API ──────────────────────────────────────────────────────────────

fn run_termux(program: &str, args: &[&str]) -> Result<String, SourceError> {
    match Command::new(program).args(args).output() {
        Ok(output) if output.status.success() => {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(output) => Err(SourceError::Transient(format!(
            "{} exited with {}",
            program, output.status
        ))),
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => Err(
            SourceError::Unavailable(format!("{}: {}", program, e)),
        ),
        Err(e) => Err(SourceError::Transient(format!("{}: {}", program, e))),
    }
}

/// Accelerometer via `termux-sensor`, converted from m/s² to g
pub struct TermuxMotionSource {
    clock: Arc<dyn ClockSource>,
    interval: Duration,
}

impl TermuxMotionSource {
    pub fn new(clock: Arc<dyn ClockSource>, interval: Duration) -> Self {
        Self { clock, interval }
    }
}

impl SampleSource for TermuxMotionSource {
    fn stream(&self) -> SensorStream {
        SensorStream::Motion
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn poll(&mut self) -> Result<Option<Sample>, SourceError> {
        let output = run_termux("termux-sensor", &["-s", "accelerometer", "-n", "1"])?;
        let timestamp = self.clock.now_ms();
        parse_sensor_json(&output, timestamp).map(|s| Some(Sample::Motion(s)))
    }
}

/// `{"<sensor name>": {"values": [x, y, z]}}` in m/s²
pub fn parse_sensor_json(output: &str, timestamp: Millis) -> Result<MotionSample, SourceError> {
    let value: serde_json::Value = serde_json::from_str(output.trim())
        .map_err(|e| SourceError::Transient(format!("bad sensor JSON: {}", e)))?;

    let values = value
        .as_object()
        .and_then(|sensors| sensors.values().find_map(|s| s.get("values")))
        .and_then(|v| v.as_array())
        .ok_or_else(|| SourceError::Transient("no accelerometer values".to_string()))?;

    let axis = |i: usize| -> Result<f64, SourceError> {
        values
            .get(i)
            .and_then(|v| v.as_f64())
            .map(|v| v / STANDARD_GRAVITY)
            .ok_or_else(|| SourceError::Transient(format!("missing axis {}", i)))
    };

    Ok(MotionSample {
        timestamp,
        x: axis(0)?,
        y: axis(1)?,
        z: axis(2)?,
    })
}

#[derive(Deserialize)]
struct TermuxLocation {
    latitude: Option<f64>,
    longitude: Option<f64>,
    speed: Option<f64>,
    error: Option<String>,
}

/// GPS fixes via `termux-location`
pub struct TermuxLocationSource {
    clock: Arc<dyn ClockSource>,
    interval: Duration,
}

impl TermuxLocationSource {
    pub fn new(clock: Arc<dyn ClockSource>, interval: Duration) -> Self {
        Self { clock, interval }
    }
}

impl SampleSource for TermuxLocationSource {
    fn stream(&self) -> SensorStream {
        SensorStream::Location
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn poll(&mut self) -> Result<Option<Sample>, SourceError> {
        let output = run_termux("termux-location", &["-p", "gps", "-r", "last"])?;
        let timestamp = self.clock.now_ms();
        parse_location_json(&output, timestamp).map(|s| s.map(Sample::Location))
    }
}

/// An empty reply means no fix yet. An `error` field is a denied permission.
pub fn parse_location_json(
    output: &str,
    timestamp: Millis,
) -> Result<Option<LocationSample>, SourceError> {
    let output = output.trim();
    if output.is_empty() {
        return Ok(None);
    }

    let fix: TermuxLocation = serde_json::from_str(output)
        .map_err(|e| SourceError::Transient(format!("bad location JSON: {}", e)))?;

    if let Some(error) = fix.error {
        return Err(SourceError::Unavailable(error));
    }

    match (fix.latitude, fix.longitude) {
        (Some(latitude), Some(longitude)) => Ok(Some(LocationSample {
            timestamp,
            latitude,
            longitude,
            speed: fix.speed,
        })),
        _ => Ok(None),
    }
}

// ─── Synthetic ───────────────────────────────────────────────────────────────

/// Cruising vehicle that optionally crashes `crash_at_ms` after start.
///
/// Before the crash: ~1 g with light vibration. For 200 ms from the crash: a
/// 4 g impulse tilted 45°. Afterwards: resting on its side.
pub struct SyntheticMotionSource {
    clock: Arc<dyn ClockSource>,
    interval: Duration,
    crash_at_ms: Option<Millis>,
    seq: u64,
}

impl SyntheticMotionSource {
    pub fn new(clock: Arc<dyn ClockSource>, interval: Duration, crash_at_ms: Option<Millis>) -> Self {
        Self {
            clock,
            interval,
            crash_at_ms,
            seq: 0,
        }
    }
}

impl SampleSource for SyntheticMotionSource {
    fn stream(&self) -> SensorStream {
        SensorStream::Motion
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn poll(&mut self) -> Result<Option<Sample>, SourceError> {
        let timestamp = self.clock.now_ms();
        self.seq += 1;
        let t = self.seq as f64 * 0.1;

        let (x, y, z) = match self.crash_at_ms {
            Some(crash) if timestamp >= crash && timestamp < crash + 200 => {
                let angle = 45f64.to_radians();
                (4.0 * angle.sin(), 0.0, 4.0 * angle.cos())
            }
            Some(crash) if timestamp >= crash + 200 => {
                let angle = 80f64.to_radians();
                (angle.sin(), 0.0, angle.cos())
            }
            _ => (
                (t * 7.0).sin() * 0.05,
                (t * 3.0).cos() * 0.05,
                1.0 + (t * 11.0).sin() * 0.02,
            ),
        };

        Ok(Some(Sample::Motion(MotionSample { timestamp, x, y, z })))
    }
}

/// 60 km/h heading north-east until the crash, stopped afterwards
pub struct SyntheticLocationSource {
    clock: Arc<dyn ClockSource>,
    interval: Duration,
    crash_at_ms: Option<Millis>,
    latitude: f64,
    longitude: f64,
}

impl SyntheticLocationSource {
    pub fn new(clock: Arc<dyn ClockSource>, interval: Duration, crash_at_ms: Option<Millis>) -> Self {
        Self {
            clock,
            interval,
            crash_at_ms,
            latitude: 37.7749,
            longitude: -122.4194,
        }
    }
}

impl SampleSource for SyntheticLocationSource {
    fn stream(&self) -> SensorStream {
        SensorStream::Location
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn poll(&mut self) -> Result<Option<Sample>, SourceError> {
        let timestamp = self.clock.now_ms();
        let crashed = self.crash_at_ms.map(|c| timestamp >= c).unwrap_or(false);
        let speed = if crashed { 0.0 } else { 60.0 / 3.6 };

        if !crashed {
            self.latitude += 0.00005;
            self.longitude += 0.00005;
        }

        Ok(Some(Sample::Location(LocationSample {
            timestamp,
            latitude: self.latitude,
            longitude: self.longitude,
            speed: Some(speed),
        })))
    }
}
