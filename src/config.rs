//! Device configuration.
//!
//! Loads settings from a TOML file with environment variable overrides.
//! Detection, telemetry and alarm sections fall back to their built-in
//! defaults when omitted, so a minimal config only needs the device
//! identity and broker address.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

/// Complete device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub alarm: AlarmTimingConfig,
    #[serde(default)]
    pub fallback: FallbackPosition,
}

/// Device identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Globally unique serial, namespaces every topic for this device
    pub serial: String,
}

/// MQTT broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_url: String,
    pub client_id: String,
    pub qos: u8,
}

/// Fall detector thresholds, dimensionless multiples of 1g
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub free_fall_g: f64,
    pub impact_g: f64,
    pub still_low_g: f64,
    pub still_high_g: f64,
    pub cancel_grace_ms: u64,
    pub confirm_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            free_fall_g: 0.25,
            impact_g: 6.0,
            still_low_g: 0.85,
            still_high_g: 1.15,
            cancel_grace_ms: 5_000,
            confirm_ms: 10_000,
        }
    }
}

/// Altitude trace sampling and batching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub sample_interval_ms: u64,
    pub trace_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            sample_interval_ms: 500,
            trace_capacity: 40,
        }
    }
}

/// Local alarm countdown and beep cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmTimingConfig {
    pub local_wait_ms: u64,
    pub blink_period_ms: u64,
    pub beep_period_ms: u64,
}

impl Default for AlarmTimingConfig {
    fn default() -> Self {
        AlarmTimingConfig {
            local_wait_ms: 30_000,
            blink_period_ms: 1_000,
            beep_period_ms: 10_000,
        }
    }
}

/// Position reported when no GPS fix is available at escalation time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackPosition {
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for FallbackPosition {
    fn default() -> Self {
        FallbackPosition {
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// Environment variables override config file values:
    /// - MQTT_BROKER_URL: override the broker address
    /// - DEVICE_SERIAL: override the device serial
    pub fn load(path: &str) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        if let Ok(url) = std::env::var("MQTT_BROKER_URL") {
            log::info!("Using MQTT_BROKER_URL from environment");
            config.mqtt.broker_url = url;
        }
        if let Ok(serial) = std::env::var("DEVICE_SERIAL") {
            log::info!("Using DEVICE_SERIAL from environment");
            config.device.serial = serial;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.device.serial.is_empty() {
            anyhow::bail!("Device serial must not be empty");
        }

        if self.mqtt.qos > 2 {
            anyhow::bail!(
                "Invalid MQTT QoS level: {} (must be 0, 1, or 2)",
                self.mqtt.qos
            );
        }

        if !self.mqtt.broker_url.starts_with("mqtt://")
            && !self.mqtt.broker_url.starts_with("mqtts://")
        {
            anyhow::bail!(
                "Invalid MQTT broker URL: {} (must start with mqtt:// or mqtts://)",
                self.mqtt.broker_url
            );
        }

        let d = &self.detector;
        if !(d.free_fall_g < d.still_low_g
            && d.still_low_g < d.still_high_g
            && d.still_high_g < d.impact_g)
        {
            anyhow::bail!(
                "Detector thresholds must satisfy free_fall < still_low < still_high < impact"
            );
        }
        if d.cancel_grace_ms >= d.confirm_ms {
            anyhow::bail!("Detector cancel_grace_ms must be shorter than confirm_ms");
        }

        if self.telemetry.trace_capacity == 0 {
            anyhow::bail!("Telemetry trace_capacity must be greater than 0");
        }
        if self.telemetry.sample_interval_ms == 0 {
            anyhow::bail!("Telemetry sample_interval_ms must be greater than 0");
        }

        if self.alarm.local_wait_ms == 0 {
            anyhow::bail!("Alarm local_wait_ms must be greater than 0");
        }

        Ok(())
    }
}
