use thiserror::Error;

use crate::types::{Millis, SensorStream};

/// Incident engine error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IncidentError {
    #[error("Input fault on {stream:?} stream: {reason}")]
    InputFault { stream: SensorStream, reason: String },

    #[error("Out-of-order {stream:?} sample: {timestamp} after {previous}")]
    OrderingFault {
        stream: SensorStream,
        timestamp: Millis,
        previous: Millis,
    },

    #[error("{0:?} stream is disabled for this session")]
    StreamDisabled(SensorStream),

    #[error("Delivery failed: {0}")]
    DeliveryFault(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<std::io::Error> for IncidentError {
    fn from(e: std::io::Error) -> Self {
        IncidentError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for IncidentError {
    fn from(e: serde_json::Error) -> Self {
        IncidentError::Parse(e.to_string())
    }
}

pub type IncidentResult<T> = Result<T, IncidentError>;
