// engine.rs — Synchronous incident pipeline
//
// One call per sample: metrics → detector → correlation → dispatch.
// No tokio, no I/O except the hand-off inside the alert channel, so the whole
// thing replays deterministically from a recorded session.

use serde::{Deserialize, Serialize};

use crate::alert::{compose_message, AlertDispatcher, AlertType, DispatchOutcome};
use crate::config::AppConfig;
use crate::correlation::{CompoundAlert, CorrelationEngine};
use crate::delivery::AlertChannel;
use crate::error::{IncidentError, IncidentResult};
use crate::incident::{Detection, DetectionKind, DetectorBank, Signal, SignalDetector};
use crate::metrics::{self, DerivedMetrics};
use crate::types::{Coordinates, LocationSample, Millis, MotionSample, Sample, SensorStream};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineCounters {
    pub location_samples: u64,
    pub motion_samples: u64,
    pub ordering_faults: u64,
    pub detections: u64,
    pub compound_alerts: u64,
    pub alerts_dispatched: u64,
    pub alerts_suppressed: u64,
}

/// Everything one sample produced
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleOutcome {
    pub metrics: DerivedMetrics,
    pub detections: Vec<Detection>,
    pub alert: Option<CompoundAlert>,
    pub dispatch: Option<DispatchOutcome>,
}

/// Read-only view for the presentation layer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub now: Millis,
    pub metrics: DerivedMetrics,
    pub coordinates: Option<Coordinates>,
    pub speed_drop_active: bool,
    pub acceleration_active: bool,
    pub acceleration_arming: bool,
    pub tilt_active: bool,
    pub location_enabled: bool,
    pub motion_enabled: bool,
    pub alerts_enabled: bool,
    pub last_alert_timestamp: Option<Millis>,
    /// Display-only, from the most recent speed drop
    pub momentum_change_kg_ms: f64,
    pub last_detection_message: Option<String>,
    pub input_faults: Vec<String>,
    pub counters: EngineCounters,
}

pub struct IncidentEngine {
    vehicle_mass_kg: f64,
    bank: DetectorBank,
    correlation: CorrelationEngine,
    dispatcher: AlertDispatcher,
    last_location_ts: Option<Millis>,
    last_motion_ts: Option<Millis>,
    location_enabled: bool,
    motion_enabled: bool,
    coordinates: Option<Coordinates>,
    metrics: DerivedMetrics,
    last_speed_drop_kmh: f64,
    last_detection_message: Option<String>,
    input_faults: Vec<IncidentError>,
    counters: EngineCounters,
}

impl IncidentEngine {
    pub fn new(config: &AppConfig, channel: Box<dyn AlertChannel>) -> IncidentResult<Self> {
        config.engine.validate()?;
        Ok(Self {
            vehicle_mass_kg: config.engine.vehicle_mass_kg,
            bank: DetectorBank::new(&config.engine),
            correlation: CorrelationEngine::new(),
            dispatcher: AlertDispatcher::new(&config.engine, &config.delivery, channel),
            last_location_ts: None,
            last_motion_ts: None,
            location_enabled: true,
            motion_enabled: true,
            coordinates: None,
            metrics: DerivedMetrics::default(),
            last_speed_drop_kmh: 0.0,
            last_detection_message: None,
            input_faults: Vec::new(),
            counters: EngineCounters::default(),
        })
    }

    pub fn on_sample(&mut self, sample: &Sample) -> IncidentResult<SampleOutcome> {
        match sample {
            Sample::Location(s) => self.on_location(s),
            Sample::Motion(s) => self.on_motion(s),
        }
    }

    pub fn on_location(&mut self, sample: &LocationSample) -> IncidentResult<SampleOutcome> {
        if !self.location_enabled {
            return Err(IncidentError::StreamDisabled(SensorStream::Location));
        }
        self.check_order(SensorStream::Location, sample.timestamp)?;
        self.counters.location_samples += 1;

        let now = sample.timestamp;
        self.coordinates = Some(Coordinates {
            latitude: sample.latitude,
            longitude: sample.longitude,
        });
        self.metrics.speed_kmh = metrics::speed_kmh(sample);

        let mut outcome = SampleOutcome::default();
        if let Some(detection) = self.bank.speed_drop.update(self.metrics.speed_kmh, now) {
            self.record_detection(detection, &mut outcome);
            self.correlate(now, &mut outcome);
        }
        outcome.metrics = self.metrics;
        Ok(outcome)
    }

    pub fn on_motion(&mut self, sample: &MotionSample) -> IncidentResult<SampleOutcome> {
        if !self.motion_enabled {
            return Err(IncidentError::StreamDisabled(SensorStream::Motion));
        }
        self.check_order(SensorStream::Motion, sample.timestamp)?;
        self.counters.motion_samples += 1;

        let now = sample.timestamp;
        let motion = metrics::compute_motion(sample);
        self.metrics.accel_magnitude_g = motion.accel_magnitude_g;
        self.metrics.tilt_deg = motion.tilt_deg;

        // Both motion detectors see the sample before correlation runs, so a
        // firing pass leaves every detector cleared
        let mut outcome = SampleOutcome::default();
        let accel = self.bank.acceleration.update(motion.accel_magnitude_g, now);
        let tilt = self.bank.tilt.update(motion.tilt_deg, now);
        for detection in accel.into_iter().chain(tilt) {
            self.record_detection(detection, &mut outcome);
        }
        if !outcome.detections.is_empty() {
            self.correlate(now, &mut outcome);
        }
        outcome.metrics = self.metrics;
        Ok(outcome)
    }

    /// InputFault: the stream's detectors stay off for the rest of the session
    pub fn disable_stream(&mut self, stream: SensorStream, reason: &str) {
        let fault = IncidentError::InputFault {
            stream,
            reason: reason.to_string(),
        };
        log::warn!("{}, disabling {} detectors", fault, stream.as_str());
        self.input_faults.push(fault);
        match stream {
            SensorStream::Location => {
                self.location_enabled = false;
                self.bank.disable(DetectionKind::SpeedDrop);
            }
            SensorStream::Motion => {
                self.motion_enabled = false;
                self.bank.disable(DetectionKind::HighAcceleration);
                self.bank.disable(DetectionKind::HighTilt);
            }
        }
    }

    pub fn is_stream_enabled(&self, stream: SensorStream) -> bool {
        match stream {
            SensorStream::Location => self.location_enabled,
            SensorStream::Motion => self.motion_enabled,
        }
    }

    pub fn set_alerts_enabled(&mut self, enabled: bool) {
        self.dispatcher.set_enabled(enabled);
    }

    /// Every InputFault seen this session, oldest first
    pub fn input_faults(&self) -> &[IncidentError] {
        &self.input_faults
    }

    pub fn counters(&self) -> &EngineCounters {
        &self.counters
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let now = self
            .last_location_ts
            .unwrap_or(0)
            .max(self.last_motion_ts.unwrap_or(0));

        EngineSnapshot {
            now,
            metrics: self.metrics,
            coordinates: self.coordinates,
            speed_drop_active: self.bank.speed_drop.is_active(now),
            acceleration_active: self.bank.acceleration.is_active(now),
            acceleration_arming: self.bank.acceleration.is_arming(),
            tilt_active: self.bank.tilt.is_active(now),
            location_enabled: self.location_enabled,
            motion_enabled: self.motion_enabled,
            alerts_enabled: self.dispatcher.is_enabled(),
            last_alert_timestamp: self.dispatcher.state().last_alert_timestamp,
            momentum_change_kg_ms: metrics::momentum_change(
                self.vehicle_mass_kg,
                self.last_speed_drop_kmh,
            ),
            last_detection_message: self.last_detection_message.clone(),
            input_faults: self.input_faults.iter().map(|f| f.to_string()).collect(),
            counters: self.counters.clone(),
        }
    }

    /// OrderingFault: a timestamp at or behind the stream's last one is
    /// rejected before any detector sees it
    fn check_order(&mut self, stream: SensorStream, timestamp: Millis) -> IncidentResult<()> {
        let last = match stream {
            SensorStream::Location => &mut self.last_location_ts,
            SensorStream::Motion => &mut self.last_motion_ts,
        };
        if let Some(previous) = *last {
            if timestamp <= previous {
                self.counters.ordering_faults += 1;
                log::debug!(
                    "Dropping out-of-order {} sample ({} <= {})",
                    stream.as_str(),
                    timestamp,
                    previous
                );
                return Err(IncidentError::OrderingFault {
                    stream,
                    timestamp,
                    previous,
                });
            }
        }
        *last = Some(timestamp);
        Ok(())
    }

    fn record_detection(&mut self, detection: Detection, outcome: &mut SampleOutcome) {
        self.counters.detections += 1;
        if let Signal::SpeedDrop { drop_kmh, .. } = detection.signal {
            self.last_speed_drop_kmh = drop_kmh;
        }
        log::debug!(
            "{} detection at {}ms: {:.2}",
            detection.kind().as_str(),
            detection.timestamp,
            detection.value()
        );
        self.last_detection_message = Some(compose_message(
            &AlertType::from(&detection),
            self.coordinates.as_ref(),
        ));
        outcome.detections.push(detection);
    }

    /// At most once per sample, after every detector has seen it
    fn correlate(&mut self, now: Millis, outcome: &mut SampleOutcome) {
        if let Some(alert) = self.correlation.evaluate(&mut self.bank, now, self.coordinates) {
            self.counters.compound_alerts += 1;
            let dispatch = self.dispatcher.dispatch(&alert, now);
            match dispatch {
                DispatchOutcome::Sent(_) => self.counters.alerts_dispatched += 1,
                DispatchOutcome::Suppressed(_) => self.counters.alerts_suppressed += 1,
            }
            outcome.alert = Some(alert);
            outcome.dispatch = Some(dispatch);
        }
    }
}
