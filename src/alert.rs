use serde::{Deserialize, Serialize};

use crate::config::{DeliveryConfig, EngineConfig};
use crate::correlation::CompoundAlert;
use crate::delivery::{AlertChannel, AlertRequest};
use crate::incident::{Detection, Signal};
use crate::types::{Coordinates, Millis};

/// Every alert the engine knows how to describe
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertType {
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
    Combined(CompoundAlert),
}

impl From<&Detection> for AlertType {
    fn from(detection: &Detection) -> Self {
        match detection.signal {
            Signal::SpeedDrop {
                drop_kmh,
                from_kmh,
                to_kmh,
            } => AlertType::SpeedDrop {
                drop_kmh,
                from_kmh,
                to_kmh,
            },
            Signal::HighAcceleration {
                magnitude_g,
                duration_ms,
            } => AlertType::HighAcceleration {
                magnitude_g,
                duration_ms,
            },
            Signal::HighTilt { tilt_deg } => AlertType::HighTilt { tilt_deg },
        }
    }
}

pub fn map_link(coordinates: &Coordinates) -> String {
    format!(
        "https://maps.google.com/?q={:.6},{:.6}",
        coordinates.latitude, coordinates.longitude
    )
}

/// Human-readable text for one alert. Speed and g use two decimals, tilt one,
/// coordinates six.
pub fn compose_message(alert: &AlertType, coordinates: Option<&Coordinates>) -> String {
    let mut lines = match alert {
        AlertType::SpeedDrop {
            drop_kmh,
            from_kmh,
            to_kmh,
        } => vec![
            "SUDDEN SPEED DROP".to_string(),
            format!(
                "Speed dropped {:.2} km/h ({:.2} -> {:.2} km/h)",
                drop_kmh, from_kmh, to_kmh
            ),
        ],
        AlertType::HighAcceleration {
            magnitude_g,
            duration_ms,
        } => vec![
            "HIGH G-FORCE".to_string(),
            format!("Impact: {:.2} g sustained for {} ms", magnitude_g, duration_ms),
        ],
        AlertType::HighTilt { tilt_deg } => vec![
            "DANGEROUS TILT".to_string(),
            format!("Tilt: {:.1}°", tilt_deg),
        ],
        AlertType::Combined(compound) => vec![
            "INCIDENT DETECTED".to_string(),
            "Sudden stop, impact and tilt detected together. Possible crash.".to_string(),
            format!("Speed drop: {:.2} km/h", compound.speed_drop_kmh),
            format!(
                "Impact: {:.2} g ({} ms)",
                compound.accel_magnitude_g, compound.accel_duration_ms
            ),
            format!("Tilt: {:.1}°", compound.tilt_deg),
        ],
    };

    match coordinates {
        Some(c) => {
            lines.push(format!("Location: {:.6}, {:.6}", c.latitude, c.longitude));
            lines.push(format!("Map: {}", map_link(c)));
        }
        None => lines.push("Location: unknown".to_string()),
    }

    lines.join("\n")
}

/// Process-wide alert bookkeeping
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertState {
    pub last_alert_timestamp: Option<Millis>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SuppressReason {
    Disabled,
    Cooldown { remaining_ms: Millis },
}

#[derive(Clone, Debug, PartialEq)]
pub enum DispatchOutcome {
    Sent(AlertRequest),
    Suppressed(SuppressReason),
}

/// Cooldown gate in front of the delivery channel.
///
/// The cooldown is consumed when the gate passes, before delivery is
/// attempted, and is never handed back on a delivery failure.
pub struct AlertDispatcher {
    state: AlertState,
    cooldown_ms: Millis,
    enabled: bool,
    recipient: String,
    channel: Box<dyn AlertChannel>,
}

impl AlertDispatcher {
    pub fn new(
        engine: &EngineConfig,
        delivery: &DeliveryConfig,
        channel: Box<dyn AlertChannel>,
    ) -> Self {
        Self {
            state: AlertState::default(),
            cooldown_ms: engine.cooldown_ms,
            enabled: engine.alerts_enabled,
            recipient: delivery.recipient.clone(),
            channel,
        }
    }

    pub fn dispatch(&mut self, alert: &CompoundAlert, now: Millis) -> DispatchOutcome {
        if !self.enabled {
            log::info!("Alerts disabled, compound incident at {}ms not sent", now);
            return DispatchOutcome::Suppressed(SuppressReason::Disabled);
        }

        if let Some(last) = self.state.last_alert_timestamp {
            // A `now` behind `last` counts as zero elapsed
            let elapsed = now.saturating_sub(last);
            if elapsed < self.cooldown_ms {
                let remaining_ms = self.cooldown_ms - elapsed;
                log::info!(
                    "Alert suppressed by cooldown ({}ms remaining)",
                    remaining_ms
                );
                return DispatchOutcome::Suppressed(SuppressReason::Cooldown { remaining_ms });
            }
        }

        self.state.last_alert_timestamp = Some(now);

        let message = compose_message(&AlertType::Combined(*alert), alert.coordinates.as_ref());
        let request = AlertRequest {
            recipient: self.recipient.clone(),
            message,
            latitude: alert.coordinates.map(|c| c.latitude),
            longitude: alert.coordinates.map(|c| c.longitude),
        };

        log::info!("Dispatching alert to '{}'", request.recipient);
        self.channel.deliver(request.clone());
        DispatchOutcome::Sent(request)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> AlertState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{DeliveryError, DeliveryReport, HttpAlertChannel, RecordingChannel};

    fn compound(timestamp: Millis, coordinates: Option<Coordinates>) -> CompoundAlert {
        CompoundAlert {
            timestamp,
            speed_drop_kmh: 45.0,
            accel_magnitude_g: 3.456,
            accel_duration_ms: 60,
            tilt_deg: 35.04,
            coordinates,
        }
    }

    fn dispatcher(channel: &RecordingChannel) -> AlertDispatcher {
        let delivery = DeliveryConfig {
            recipient: "+15550100".to_string(),
            ..DeliveryConfig::default()
        };
        AlertDispatcher::new(&EngineConfig::default(), &delivery, Box::new(channel.clone()))
    }

    #[test]
    fn test_message_precision() {
        let coords = Coordinates {
            latitude: 37.7749,
            longitude: -122.4194,
        };
        let message = compose_message(&AlertType::Combined(compound(0, Some(coords))), Some(&coords));
        assert!(message.contains("Speed drop: 45.00 km/h"));
        assert!(message.contains("Impact: 3.46 g"));
        assert!(message.contains("Tilt: 35.0°"));
        assert!(message.contains("Location: 37.774900, -122.419400"));
        assert!(message.contains("https://maps.google.com/?q=37.774900,-122.419400"));
    }

    #[test]
    fn test_message_without_coordinates() {
        let message = compose_message(&AlertType::HighTilt { tilt_deg: 42.26 }, None);
        assert!(message.contains("Tilt: 42.3°"));
        assert!(message.contains("Location: unknown"));
        assert!(!message.contains("maps.google.com"));
    }

    #[test]
    fn test_single_signal_messages() {
        let drop = compose_message(
            &AlertType::SpeedDrop {
                drop_kmh: 45.0,
                from_kmh: 60.0,
                to_kmh: 15.0,
            },
            None,
        );
        assert!(drop.contains("45.00 km/h (60.00 -> 15.00 km/h)"));

        let accel = compose_message(
            &AlertType::HighAcceleration {
                magnitude_g: 3.5,
                duration_ms: 60,
            },
            None,
        );
        assert!(accel.contains("3.50 g sustained for 60 ms"));
    }

    #[test]
    fn test_cooldown_suppresses_second_alert() {
        let channel = RecordingChannel::new();
        let mut dispatcher = dispatcher(&channel);

        assert!(matches!(dispatcher.dispatch(&compound(1000, None), 1000), DispatchOutcome::Sent(_)));
        let outcome = dispatcher.dispatch(&compound(4000, None), 4000);
        assert_eq!(
            outcome,
            DispatchOutcome::Suppressed(SuppressReason::Cooldown { remaining_ms: 7000 })
        );
        assert_eq!(channel.requests().len(), 1);
        assert_eq!(dispatcher.state().last_alert_timestamp, Some(1000));

        // Cooldown over
        assert!(matches!(dispatcher.dispatch(&compound(11_000, None), 11_000), DispatchOutcome::Sent(_)));
        assert_eq!(channel.requests().len(), 2);
    }

    #[test]
    fn test_failed_delivery_keeps_cooldown() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        // No runtime in a plain #[test]: every delivery fails immediately
        let channel = HttpAlertChannel::new("http://127.0.0.1:9/alert", &DeliveryConfig::default(), tx);
        let mut dispatcher =
            AlertDispatcher::new(&EngineConfig::default(), &DeliveryConfig::default(), Box::new(channel));

        assert!(matches!(dispatcher.dispatch(&compound(1000, None), 1000), DispatchOutcome::Sent(_)));
        assert!(matches!(
            rx.try_recv(),
            Ok(DeliveryReport::Failed {
                error: DeliveryError::NoRuntime,
                ..
            })
        ));
        assert_eq!(dispatcher.state().last_alert_timestamp, Some(1000));

        assert_eq!(
            dispatcher.dispatch(&compound(9000, None), 9000),
            DispatchOutcome::Suppressed(SuppressReason::Cooldown { remaining_ms: 2000 })
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_first_alert_passes_at_time_zero() {
        let channel = RecordingChannel::new();
        let mut dispatcher = dispatcher(&channel);
        assert!(matches!(dispatcher.dispatch(&compound(0, None), 0), DispatchOutcome::Sent(_)));
    }

    #[test]
    fn test_disabled_does_not_consume_cooldown() {
        let channel = RecordingChannel::new();
        let mut dispatcher = dispatcher(&channel);
        dispatcher.set_enabled(false);
        assert_eq!(
            dispatcher.dispatch(&compound(0, None), 0),
            DispatchOutcome::Suppressed(SuppressReason::Disabled)
        );
        assert_eq!(dispatcher.state().last_alert_timestamp, None);

        dispatcher.set_enabled(true);
        assert!(matches!(dispatcher.dispatch(&compound(10, None), 10), DispatchOutcome::Sent(_)));
    }

    #[test]
    fn test_last_alert_timestamp_never_decreases() {
        let channel = RecordingChannel::new();
        let mut dispatcher = dispatcher(&channel);
        dispatcher.dispatch(&compound(20_000, None), 20_000);
        dispatcher.dispatch(&compound(5_000, None), 5_000);
        assert_eq!(dispatcher.state().last_alert_timestamp, Some(20_000));
    }

    #[test]
    fn test_request_carries_coordinates() {
        let channel = RecordingChannel::new();
        let mut dispatcher = dispatcher(&channel);
        let coords = Coordinates {
            latitude: 1.5,
            longitude: -2.5,
        };
        dispatcher.dispatch(&compound(0, Some(coords)), 0);
        let sent = channel.requests();
        assert_eq!(sent[0].latitude, Some(1.5));
        assert_eq!(sent[0].longitude, Some(-2.5));
        assert_eq!(sent[0].recipient, "+15550100");
    }
}
