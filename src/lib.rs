//! Vehicle incident detection.
//!
//! Raw location and motion samples are turned into derived metrics, fed
//! through three debounced detectors (speed drop, sustained high g, tilt),
//! correlated inside a short window and, past a cooldown gate, handed to an
//! alert channel. [`engine::IncidentEngine`] runs one synchronous pass per
//! sample.

pub mod alert;
pub mod clock;
pub mod config;
pub mod correlation;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod health_monitor;
pub mod incident;
pub mod live_status;
pub mod metrics;
pub mod sensors;
pub mod session;
pub mod types;

pub use engine::{IncidentEngine, SampleOutcome};
pub use error::{IncidentError, IncidentResult};
