use std::time::{Duration, Instant};

/// Read-failure accounting for one sample stream.
///
/// A run of `max_failures` consecutive failed reads escalates to an input
/// fault; any good read resets the run.
#[derive(Clone, Debug)]
pub struct StreamHealth {
    pub name: String,
    pub max_failures: u32,
    consecutive_failures: u32,
    total_samples: u64,
    last_sample: Option<Instant>,
}

impl StreamHealth {
    pub fn new(name: &str, max_failures: u32) -> Self {
        StreamHealth {
            name: name.to_string(),
            max_failures,
            consecutive_failures: 0,
            total_samples: 0,
            last_sample: None,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.total_samples += 1;
        self.last_sample = Some(Instant::now());
    }

    /// Returns true once the failure budget is spent
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;
        self.is_exhausted()
    }

    pub fn is_exhausted(&self) -> bool {
        self.consecutive_failures >= self.max_failures
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn silence(&self) -> Option<Duration> {
        self.last_sample.map(|t| t.elapsed())
    }

    pub fn format_status(&self) -> String {
        if self.is_exhausted() {
            return format!("{}: DEAD ({} failed reads)", self.name, self.consecutive_failures);
        }
        match self.silence() {
            Some(d) if self.consecutive_failures > 0 => format!(
                "{}: ⚠ {} failed reads (last sample {:.1}s ago)",
                self.name,
                self.consecutive_failures,
                d.as_secs_f64()
            ),
            Some(_) => format!("{}: ✓ {} samples", self.name, self.total_samples),
            None => format!("{}: waiting", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_budget() {
        let mut health = StreamHealth::new("motion", 3);
        assert!(!health.record_failure());
        assert!(!health.record_failure());
        assert!(health.record_failure());
        assert!(health.is_exhausted());
        assert!(health.format_status().contains("DEAD"));
    }

    #[test]
    fn test_success_resets_run() {
        let mut health = StreamHealth::new("location", 2);
        health.record_failure();
        health.record_success();
        assert_eq!(health.consecutive_failures(), 0);
        assert!(!health.record_failure());
        assert_eq!(health.total_samples(), 1);
    }

    #[test]
    fn test_status_strings() {
        let mut health = StreamHealth::new("motion", 5);
        assert!(health.format_status().contains("waiting"));
        health.record_success();
        assert!(health.format_status().contains("✓"));
        health.record_failure();
        assert!(health.format_status().contains("failed reads"));
    }
}
