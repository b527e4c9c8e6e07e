use serde::{Deserialize, Serialize};

/// Monotonic milliseconds since the clock's origin.
pub type Millis = u64;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub timestamp: Millis,
    pub latitude: f64,
    pub longitude: f64,
    /// Ground speed in m/s, absent when the fix carries none
    #[serde(default)]
    pub speed: Option<f64>,
}

/// Accelerometer reading in g. Gravity may or may not be included.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub timestamp: Millis,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStream {
    Location,
    Motion,
}

impl SensorStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStream::Location => "location",
            SensorStream::Motion => "motion",
        }
    }
}

/// One element of a telemetry feed or a recorded session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Sample {
    Location(LocationSample),
    Motion(MotionSample),
}

impl Sample {
    pub fn timestamp(&self) -> Millis {
        match self {
            Sample::Location(s) => s.timestamp,
            Sample::Motion(s) => s.timestamp,
        }
    }

    pub fn stream(&self) -> SensorStream {
        match self {
            Sample::Location(_) => SensorStream::Location,
            Sample::Motion(_) => SensorStream::Motion,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}
