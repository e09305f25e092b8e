//! Sensor adapters.
//!
//! Each adapter produces one scalar sample on demand, no buffering. The
//! engine never talks to a bus directly: it goes through [`SensorSuite`],
//! which the binary backs with the simulated suite below and tests back
//! with scripted fakes.

use crate::error::{DeviceError, DeviceResult};
use serde::{Deserialize, Serialize};

/// Standard gravity used to normalize acceleration magnitudes to g units
pub const STANDARD_GRAVITY: f64 = 9.81;

/// Barometric environment sample
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct EnvSample {
    pub altitude_m: f64,
    pub temperature_c: f64,
    pub humidity_pct: f64,
}

/// Raw 3-axis acceleration sample in m/s^2
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AccelSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AccelSample {
    /// Acceleration magnitude in m/s^2
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Acceleration magnitude as a dimensionless multiple of 1g
    pub fn magnitude_g(&self) -> f64 {
        self.magnitude() / STANDARD_GRAVITY
    }
}

/// GPS fix with position and geodetic altitude
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
}

/// On-demand access to the device sensors.
///
/// Readers return `Err(DeviceError::SensorUnavailable)` when a sample cannot
/// be obtained; callers substitute an alternate source or a last-known value
/// and keep the session running. `self_test` is the one fatal gate: it runs
/// once at boot and a failure halts the device.
pub trait SensorSuite {
    fn self_test(&mut self) -> DeviceResult<()>;

    fn read_environment(&mut self) -> DeviceResult<EnvSample>;

    fn read_acceleration(&mut self) -> DeviceResult<AccelSample>;

    /// Current GPS fix; `Err` means no fix right now
    fn read_gps(&mut self) -> DeviceResult<GpsFix>;
}

/// Simulated sensor suite for bench runs without hardware.
///
/// Generates a quiet 1g acceleration with a small wiggle, a slow altitude
/// climb and a fixed GPS position with drift, in the same shape real
/// adapters would deliver.
pub struct SimulatedSensors {
    tick: u64,
    base_altitude_m: f64,
}

impl SimulatedSensors {
    pub fn new(base_altitude_m: f64) -> Self {
        SimulatedSensors {
            tick: 0,
            base_altitude_m,
        }
    }
}

impl SensorSuite for SimulatedSensors {
    fn self_test(&mut self) -> DeviceResult<()> {
        Ok(())
    }

    fn read_environment(&mut self) -> DeviceResult<EnvSample> {
        self.tick += 1;
        let t = self.tick as f64 * 0.1;
        Ok(EnvSample {
            // ~0.2 m/s simulated climb rate
            altitude_m: self.base_altitude_m + t * 0.02 + (t * 0.7).sin() * 0.3,
            temperature_c: 18.0 + (t * 0.05).sin() * 1.5,
            humidity_pct: 55.0 + (t * 0.03).cos() * 5.0,
        })
    }

    fn read_acceleration(&mut self) -> DeviceResult<AccelSample> {
        let t = self.tick as f64 * 0.1;
        Ok(AccelSample {
            x: (t * 2.0).sin() * 0.4,
            y: (t * 1.3).cos() * 0.3,
            z: STANDARD_GRAVITY + (t * 3.1).sin() * 0.2,
        })
    }

    fn read_gps(&mut self) -> DeviceResult<GpsFix> {
        let t = self.tick as f64;
        Ok(GpsFix {
            latitude: 46.0102 + t * 0.000001,
            longitude: 8.9631 + t * 0.000001,
            altitude_m: self.base_altitude_m + t * 0.002,
        })
    }
}

impl Default for SimulatedSensors {
    fn default() -> Self {
        Self::new(1200.0)
    }
}
