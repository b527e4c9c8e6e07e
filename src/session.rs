use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::IncidentResult;
use crate::types::Sample;

/// Recorded telemetry, replayable through a fresh engine
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionLog {
    pub session_id: String,
    pub start_time: String,
    pub samples: Vec<Sample>,
}

impl SessionLog {
    pub fn new() -> Self {
        SessionLog {
            session_id: format!("session_{}", Utc::now().timestamp_millis()),
            start_time: Utc::now().to_rfc3339(),
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// `.gz` paths are written gzip-compressed
    pub fn save(&self, path: &Path) -> IncidentResult<()> {
        let file = File::create(path)?;
        if is_gzip(path) {
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            serde_json::to_writer(&mut encoder, self)?;
            encoder.finish()?.flush()?;
        } else {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
        }
        Ok(())
    }

    pub fn load(path: &Path) -> IncidentResult<Self> {
        let file = File::open(path)?;
        if is_gzip(path) {
            let reader = BufReader::new(GzDecoder::new(file));
            Ok(serde_json::from_reader(reader)?)
        } else {
            Ok(serde_json::from_reader(BufReader::new(file))?)
        }
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LocationSample, MotionSample};

    fn sample_log() -> SessionLog {
        let mut log = SessionLog::new();
        log.push(Sample::Location(LocationSample {
            timestamp: 0,
            latitude: 1.0,
            longitude: 2.0,
            speed: Some(10.0),
        }));
        log.push(Sample::Motion(MotionSample {
            timestamp: 100,
            x: 0.0,
            y: 0.0,
            z: 1.0,
        }));
        log
    }

    #[test]
    fn test_save_and_load_plain_and_gzip() {
        let dir = std::env::temp_dir();
        for name in ["session_test.json", "session_test.json.gz"] {
            let path = dir.join(format!("{}_{}", std::process::id(), name));
            let log = sample_log();
            log.save(&path).unwrap();
            let loaded = SessionLog::load(&path).unwrap();
            assert_eq!(loaded.samples, log.samples);
            assert_eq!(loaded.session_id, log.session_id);
            let _ = std::fs::remove_file(&path);
        }
    }

    #[test]
    fn test_load_missing_file() {
        let result = SessionLog::load(Path::new("/nonexistent/session.json"));
        assert!(matches!(result, Err(crate::error::IncidentError::Io(_))));
    }
}
