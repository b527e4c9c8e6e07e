//! Derived metrics
//! Pure transforms from raw samples into the values the detectors consume.
//! No state and no fault conditions: a zero vector yields zero magnitude and zero tilt.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::types::{LocationSample, MotionSample};

const MS_TO_KMH: f64 = 3.6;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub speed_kmh: f64,
    pub accel_magnitude_g: f64,
    pub tilt_deg: f64,
}

/// Speed from a location fix; a fix without speed counts as standing still
pub fn speed_kmh(sample: &LocationSample) -> f64 {
    sample.speed.unwrap_or(0.0) * MS_TO_KMH
}

pub fn accel_magnitude_g(x: f64, y: f64, z: f64) -> f64 {
    Vector3::new(x, y, z).norm()
}

/// Tilt = max(|pitch|, |roll|) of the accelerometer vector, in degrees
///
/// pitch = -atan2(y, sqrt(x² + z²))
/// roll  =  atan2(x, sqrt(y² + z²))
pub fn tilt_deg(x: f64, y: f64, z: f64) -> f64 {
    let pitch = -y.atan2((x * x + z * z).sqrt());
    let roll = x.atan2((y * y + z * z).sqrt());
    pitch.abs().max(roll.abs()).to_degrees()
}

/// Motion metrics for one accelerometer sample. Speed is left at zero.
pub fn compute_motion(sample: &MotionSample) -> DerivedMetrics {
    DerivedMetrics {
        speed_kmh: 0.0,
        accel_magnitude_g: accel_magnitude_g(sample.x, sample.y, sample.z),
        tilt_deg: tilt_deg(sample.x, sample.y, sample.z),
    }
}

/// Momentum change estimate for display: mass × velocity drop (kg·m/s).
/// Not used by any detector.
pub fn momentum_change(mass_kg: f64, speed_drop_kmh: f64) -> f64 {
    mass_kg * (speed_drop_kmh / MS_TO_KMH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn fix(speed: Option<f64>) -> LocationSample {
        LocationSample {
            timestamp: 0,
            latitude: 0.0,
            longitude: 0.0,
            speed,
        }
    }

    #[test]
    fn test_speed_conversion() {
        assert_abs_diff_eq!(speed_kmh(&fix(Some(10.0))), 36.0, epsilon = 1e-9);
        assert_eq!(speed_kmh(&fix(None)), 0.0);
    }

    #[test]
    fn test_magnitude() {
        assert_abs_diff_eq!(accel_magnitude_g(0.0, 0.0, 1.0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(accel_magnitude_g(3.0, 4.0, 0.0), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_tilt_flat_device() {
        // Gravity straight down the z axis: level
        assert_abs_diff_eq!(tilt_deg(0.0, 0.0, 1.0), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_tilt_roll_and_pitch() {
        // 45° roll
        let s = 45f64.to_radians().sin();
        let c = 45f64.to_radians().cos();
        assert_abs_diff_eq!(tilt_deg(s, 0.0, c), 45.0, epsilon = 1e-9);

        // 35° pitch, sign does not matter
        let s = 35f64.to_radians().sin();
        let c = 35f64.to_radians().cos();
        assert_abs_diff_eq!(tilt_deg(0.0, -s, c), 35.0, epsilon = 1e-9);
        assert_abs_diff_eq!(tilt_deg(0.0, s, c), 35.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_vector_is_not_a_fault() {
        let metrics = compute_motion(&MotionSample {
            timestamp: 0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        });
        assert_eq!(metrics.accel_magnitude_g, 0.0);
        assert_eq!(metrics.tilt_deg, 0.0);
    }

    #[test]
    fn test_momentum_change() {
        // 1500 kg losing 36 km/h (10 m/s)
        assert_abs_diff_eq!(momentum_change(1500.0, 36.0), 15_000.0, epsilon = 1e-6);
    }
}
