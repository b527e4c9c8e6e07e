use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{IncidentError, IncidentResult};
use crate::types::Millis;

// ─── Detection / dispatch ────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // ── Speed drop ──
    pub speed_drop_threshold_kmh: f64,
    /// Maximum gap between the two compared fixes
    pub speed_drop_window_ms: Millis,
    /// Prior speed must exceed this for a drop to count
    pub min_prior_speed_kmh: f64,

    // ── Impulse ──
    pub accel_magnitude_threshold_g: f64,
    pub accel_duration_threshold_ms: Millis,

    // ── Tilt ──
    pub tilt_danger_threshold_deg: f64,

    // ── Correlation / alerting ──
    pub correlation_window_ms: Millis,
    pub cooldown_ms: Millis,
    pub alerts_enabled: bool,

    /// Display-only momentum estimate
    pub vehicle_mass_kg: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            speed_drop_threshold_kmh: 40.0,
            speed_drop_window_ms: 1000,
            min_prior_speed_kmh: 5.0,
            accel_magnitude_threshold_g: 3.0,
            accel_duration_threshold_ms: 60,
            tilt_danger_threshold_deg: 30.0,
            correlation_window_ms: 2000,
            cooldown_ms: 10_000,
            alerts_enabled: true,
            vehicle_mass_kg: 1500.0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> IncidentResult<()> {
        let positive = [
            ("speed_drop_threshold_kmh", self.speed_drop_threshold_kmh),
            ("accel_magnitude_threshold_g", self.accel_magnitude_threshold_g),
            ("tilt_danger_threshold_deg", self.tilt_danger_threshold_deg),
            ("vehicle_mass_kg", self.vehicle_mass_kg),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(IncidentError::Config(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if self.min_prior_speed_kmh < 0.0 {
            return Err(IncidentError::Config(
                "min_prior_speed_kmh must not be negative".to_string(),
            ));
        }
        if self.speed_drop_window_ms == 0 || self.correlation_window_ms == 0 {
            return Err(IncidentError::Config(
                "speed drop and correlation windows must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Delivery ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub recipient: String,
    /// SMS relay endpoint; alerts are only logged when unset
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            recipient: String::new(),
            endpoint: None,
            timeout_secs: 15,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub delivery: DeliveryConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> IncidentResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&text)?;
        config.engine.validate()?;
        Ok(config)
    }
}
