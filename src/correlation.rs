use serde::{Deserialize, Serialize};

use crate::incident::{DetectorBank, Signal, SignalDetector};
use crate::types::{Coordinates, Millis};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompoundAlert {
    pub timestamp: Millis,
    pub speed_drop_kmh: f64,
    pub accel_magnitude_g: f64,
    pub accel_duration_ms: Millis,
    pub tilt_deg: f64,
    pub coordinates: Option<Coordinates>,
}

/// Fires when every detector in the bank holds a live detection.
///
/// Only the latest detection per kind takes part. Firing clears all three in
/// the same pass so one episode cannot trigger twice.
#[derive(Debug, Default)]
pub struct CorrelationEngine;

impl CorrelationEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(
        &mut self,
        bank: &mut DetectorBank,
        now: Millis,
        coordinates: Option<Coordinates>,
    ) -> Option<CompoundAlert> {
        if !bank.all_active(now) {
            return None;
        }

        let (speed_drop_kmh, accel_magnitude_g, accel_duration_ms, tilt_deg) = match (
            bank.speed_drop.active().map(|d| d.signal),
            bank.acceleration.active().map(|d| d.signal),
            bank.tilt.active().map(|d| d.signal),
        ) {
            (
                Some(Signal::SpeedDrop { drop_kmh, .. }),
                Some(Signal::HighAcceleration {
                    magnitude_g,
                    duration_ms,
                }),
                Some(Signal::HighTilt { tilt_deg }),
            ) => (drop_kmh, magnitude_g, duration_ms, tilt_deg),
            _ => return None,
        };

        bank.clear_all();

        log::info!(
            "Compound incident at {}ms: drop {:.2} km/h, {:.2} g, tilt {:.1}°",
            now,
            speed_drop_kmh,
            accel_magnitude_g,
            tilt_deg
        );

        Some(CompoundAlert {
            timestamp: now,
            speed_drop_kmh,
            accel_magnitude_g,
            accel_duration_ms,
            tilt_deg,
            coordinates,
        })
    }
}
