use thiserror::Error;

/// Climb monitor error types
#[derive(Error, Debug, Clone)]
pub enum DeviceError {
    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Sensor initialization failed: {0}")]
    SensorInit(String),

    #[error("Transport unavailable: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),
}

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;
