use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::types::Millis;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionKind {
    SpeedDrop,
    HighAcceleration,
    HighTilt,
}

impl DetectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionKind::SpeedDrop => "speed_drop",
            DetectionKind::HighAcceleration => "high_acceleration",
            DetectionKind::HighTilt => "high_tilt",
        }
    }
}

/// Kind-specific payload, frozen when the detection is created
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    SpeedDrop {
        drop_kmh: f64,
        from_kmh: f64,
        to_kmh: f64,
    },
    HighAcceleration {
        magnitude_g: f64,
        duration_ms: Millis,
    },
    HighTilt {
        tilt_deg: f64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub timestamp: Millis,
    pub signal: Signal,
}

impl Detection {
    pub fn kind(&self) -> DetectionKind {
        match self.signal {
            Signal::SpeedDrop { .. } => DetectionKind::SpeedDrop,
            Signal::HighAcceleration { .. } => DetectionKind::HighAcceleration,
            Signal::HighTilt { .. } => DetectionKind::HighTilt,
        }
    }

    /// Headline number: km/h dropped, g, or degrees
    pub fn value(&self) -> f64 {
        match self.signal {
            Signal::SpeedDrop { drop_kmh, .. } => drop_kmh,
            Signal::HighAcceleration { magnitude_g, .. } => magnitude_g,
            Signal::HighTilt { tilt_deg } => tilt_deg,
        }
    }
}

// ─── Shared detector state ───────────────────────────────────────────────────

/// Per-detector state record. Holds at most one live detection.
#[derive(Clone, Debug)]
pub struct DetectorState {
    kind: DetectionKind,
    window_ms: Millis,
    enabled: bool,
    peak_start: Option<Millis>,
    peak_reported: bool,
    active: Option<Detection>,
}

impl DetectorState {
    fn new(kind: DetectionKind, window_ms: Millis) -> Self {
        Self {
            kind,
            window_ms,
            enabled: true,
            peak_start: None,
            peak_reported: false,
            active: None,
        }
    }

    fn activate(&mut self, timestamp: Millis, signal: Signal) -> Detection {
        let detection = Detection { timestamp, signal };
        self.active = Some(detection);
        detection
    }

    /// Drops the live detection once it is strictly older than the window
    fn expire(&mut self, now: Millis) {
        if let Some(active) = self.active {
            if now.saturating_sub(active.timestamp) > self.window_ms {
                self.active = None;
            }
        }
    }
}

/// Detectors move through `Idle → (Arming) → Active → Idle`.
pub trait SignalDetector {
    fn state(&self) -> &DetectorState;
    fn state_mut(&mut self) -> &mut DetectorState;

    /// Feed one metric value observed at `now`. Returns the detection when one
    /// is created or refreshed on this sample.
    fn observe(&mut self, metric: f64, now: Millis) -> Option<Detection>;

    fn update(&mut self, metric: f64, now: Millis) -> Option<Detection> {
        if !self.state().enabled {
            return None;
        }
        self.observe(metric, now)
    }

    fn kind(&self) -> DetectionKind {
        self.state().kind
    }

    fn is_active(&self, now: Millis) -> bool {
        let state = self.state();
        state.enabled
            && state
                .active
                .map(|d| now.saturating_sub(d.timestamp) < state.window_ms)
                .unwrap_or(false)
    }

    /// Above threshold and waiting out the duration gate
    fn is_arming(&self) -> bool {
        let state = self.state();
        state.peak_start.is_some() && !state.peak_reported
    }

    fn active(&self) -> Option<Detection> {
        self.state().active
    }

    fn clear(&mut self) {
        self.state_mut().active = None;
    }

    /// Permanently switch the detector off for the session
    fn disable(&mut self) {
        let state = self.state_mut();
        state.enabled = false;
        state.active = None;
        state.peak_start = None;
        state.peak_reported = false;
    }

    fn is_enabled(&self) -> bool {
        self.state().enabled
    }
}

// ─── Speed drop (instantaneous) ──────────────────────────────────────────────

/// Compares each speed against the previous fix
pub struct SpeedDropDetector {
    state: DetectorState,
    threshold_kmh: f64,
    max_gap_ms: Millis,
    min_prior_kmh: f64,
    previous: Option<(f64, Millis)>,
}

impl SpeedDropDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            state: DetectorState::new(DetectionKind::SpeedDrop, config.correlation_window_ms),
            threshold_kmh: config.speed_drop_threshold_kmh,
            max_gap_ms: config.speed_drop_window_ms,
            min_prior_kmh: config.min_prior_speed_kmh,
            previous: None,
        }
    }
}

impl SignalDetector for SpeedDropDetector {
    fn state(&self) -> &DetectorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut DetectorState {
        &mut self.state
    }

    fn observe(&mut self, speed_kmh: f64, now: Millis) -> Option<Detection> {
        let previous = self.previous.replace((speed_kmh, now));

        if let Some((prev_speed, prev_t)) = previous {
            let gap = now.saturating_sub(prev_t);
            let drop = prev_speed - speed_kmh;
            // A long gap between fixes is just a failed comparison
            if gap <= self.max_gap_ms && drop >= self.threshold_kmh && prev_speed > self.min_prior_kmh
            {
                return Some(self.state.activate(
                    now,
                    Signal::SpeedDrop {
                        drop_kmh: drop,
                        from_kmh: prev_speed,
                        to_kmh: speed_kmh,
                    },
                ));
            }
        }

        self.state.expire(now);
        None
    }
}

// ─── High acceleration (duration-gated) ──────────────────────────────────────

pub struct HighAccelDetector {
    state: DetectorState,
    threshold_g: f64,
    min_duration_ms: Millis,
}

impl HighAccelDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            state: DetectorState::new(
                DetectionKind::HighAcceleration,
                config.correlation_window_ms,
            ),
            threshold_g: config.accel_magnitude_threshold_g,
            min_duration_ms: config.accel_duration_threshold_ms,
        }
    }
}

impl SignalDetector for HighAccelDetector {
    fn state(&self) -> &DetectorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut DetectorState {
        &mut self.state
    }

    fn observe(&mut self, magnitude_g: f64, now: Millis) -> Option<Detection> {
        if magnitude_g < self.threshold_g {
            self.state.peak_start = None;
            self.state.peak_reported = false;
            self.state.expire(now);
            return None;
        }

        let Some(peak_start) = self.state.peak_start else {
            self.state.peak_start = Some(now);
            return None;
        };

        let duration_ms = now.saturating_sub(peak_start);
        if duration_ms < self.min_duration_ms || self.state.peak_reported {
            return None;
        }

        // One detection per continuous peak; a dip below threshold re-arms
        self.state.peak_reported = true;
        Some(self.state.activate(
            now,
            Signal::HighAcceleration {
                magnitude_g,
                duration_ms,
            },
        ))
    }
}

// ─── High tilt (instantaneous) ───────────────────────────────────────────────

pub struct HighTiltDetector {
    state: DetectorState,
    threshold_deg: f64,
}

impl HighTiltDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            state: DetectorState::new(DetectionKind::HighTilt, config.correlation_window_ms),
            threshold_deg: config.tilt_danger_threshold_deg,
        }
    }
}

impl SignalDetector for HighTiltDetector {
    fn state(&self) -> &DetectorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut DetectorState {
        &mut self.state
    }

    fn observe(&mut self, tilt_deg: f64, now: Millis) -> Option<Detection> {
        if tilt_deg >= self.threshold_deg {
            return Some(self.state.activate(now, Signal::HighTilt { tilt_deg }));
        }
        self.state.expire(now);
        None
    }
}

// ─── Bank ────────────────────────────────────────────────────────────────────

/// The three detectors the correlation engine evaluates together
pub struct DetectorBank {
    pub speed_drop: SpeedDropDetector,
    pub acceleration: HighAccelDetector,
    pub tilt: HighTiltDetector,
}

impl DetectorBank {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            speed_drop: SpeedDropDetector::new(config),
            acceleration: HighAccelDetector::new(config),
            tilt: HighTiltDetector::new(config),
        }
    }

    pub fn all_active(&self, now: Millis) -> bool {
        self.speed_drop.is_active(now) && self.acceleration.is_active(now) && self.tilt.is_active(now)
    }

    pub fn clear_all(&mut self) {
        self.speed_drop.clear();
        self.acceleration.clear();
        self.tilt.clear();
    }

    pub fn get(&self, kind: DetectionKind) -> &dyn SignalDetector {
        match kind {
            DetectionKind::SpeedDrop => &self.speed_drop,
            DetectionKind::HighAcceleration => &self.acceleration,
            DetectionKind::HighTilt => &self.tilt,
        }
    }

    pub fn disable(&mut self, kind: DetectionKind) {
        match kind {
            DetectionKind::SpeedDrop => self.speed_drop.disable(),
            DetectionKind::HighAcceleration => self.acceleration.disable(),
            DetectionKind::HighTilt => self.tilt.disable(),
        }
    }
}
