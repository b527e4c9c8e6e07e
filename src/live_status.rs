use serde::{Deserialize, Serialize};
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::delivery::DeliveryReport;
use crate::engine::EngineSnapshot;

/// Snapshot written for whatever renders the current state
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub uptime_seconds: u64,
    // Metrics
    pub speed_kmh: f64,
    pub accel_magnitude_g: f64,
    pub tilt_deg: f64,
    pub momentum_change_kg_ms: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    // Detectors
    pub speed_drop_active: bool,
    pub acceleration_active: bool,
    pub acceleration_arming: bool,
    pub tilt_active: bool,
    pub last_detection_message: Option<String>,
    // Streams
    pub location_enabled: bool,
    pub motion_enabled: bool,
    pub location_samples: u64,
    pub motion_samples: u64,
    pub ordering_faults: u64,
    pub input_faults: Vec<String>,
    // Alerts
    pub alerts_enabled: bool,
    pub compound_alerts: u64,
    pub alerts_dispatched: u64,
    pub alerts_suppressed: u64,
    pub last_alert_message: Option<String>,
    pub deliveries_ok: u64,
    pub deliveries_failed: u64,
    pub last_delivery_error: Option<String>,
}

impl LiveStatus {
    pub fn new() -> Self {
        Self {
            timestamp: current_timestamp(),
            location_enabled: true,
            motion_enabled: true,
            alerts_enabled: true,
            ..Self::default()
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: &EngineSnapshot) {
        self.timestamp = current_timestamp();
        self.speed_kmh = snapshot.metrics.speed_kmh;
        self.accel_magnitude_g = snapshot.metrics.accel_magnitude_g;
        self.tilt_deg = snapshot.metrics.tilt_deg;
        self.momentum_change_kg_ms = snapshot.momentum_change_kg_ms;
        self.latitude = snapshot.coordinates.map(|c| c.latitude);
        self.longitude = snapshot.coordinates.map(|c| c.longitude);
        self.speed_drop_active = snapshot.speed_drop_active;
        self.acceleration_active = snapshot.acceleration_active;
        self.acceleration_arming = snapshot.acceleration_arming;
        self.tilt_active = snapshot.tilt_active;
        self.last_detection_message = snapshot.last_detection_message.clone();
        self.location_enabled = snapshot.location_enabled;
        self.motion_enabled = snapshot.motion_enabled;
        self.location_samples = snapshot.counters.location_samples;
        self.motion_samples = snapshot.counters.motion_samples;
        self.ordering_faults = snapshot.counters.ordering_faults;
        self.input_faults = snapshot.input_faults.clone();
        self.alerts_enabled = snapshot.alerts_enabled;
        self.compound_alerts = snapshot.counters.compound_alerts;
        self.alerts_dispatched = snapshot.counters.alerts_dispatched;
        self.alerts_suppressed = snapshot.counters.alerts_suppressed;
    }

    pub fn apply_delivery(&mut self, report: &DeliveryReport) {
        match report.fault() {
            None => self.deliveries_ok += 1,
            Some(fault) => {
                self.deliveries_failed += 1;
                self.last_delivery_error = Some(fault.to_string());
            }
        }
    }

    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
