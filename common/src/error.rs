use thiserror::Error;

/// Device ids never leave the boundary client; diagnostics use this placeholder instead.
pub const REDACTED_DEVICE_ID: &str = "XXXXX";

pub fn redact_device_id(text: &str, device_id: &str) -> String {
    if device_id.is_empty() {
        text.to_string()
    } else {
        text.replace(device_id, REDACTED_DEVICE_ID)
    }
}

/// A sensor read or actuator command failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{target}: `{command}` failed: {message}")]
pub struct DeviceCommandError {
    pub target: String,
    pub command: String,
    pub message: String,
}

impl DeviceCommandError {
    pub fn new(
        target: impl Into<String>,
        command: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn for_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("required setting `{0}` is missing")]
    Missing(&'static str),
    #[error("sensor `{0}` has no device id")]
    SensorId(String),
    #[error("sensor id `{0}` is configured more than once")]
    DuplicateSensor(String),
    #[error("setting `{field}` is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("unknown timezone `{0}`")]
    Timezone(String),
    #[error("environment variable `{0}` is not set")]
    Env(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("store {operation} failed: {message}")]
pub struct PersistenceError {
    pub operation: &'static str,
    pub message: String,
}

impl PersistenceError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("forecast unavailable: {0}")]
pub struct ForecastError(pub String);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("notification via {channel} failed: {message}")]
pub struct NotifyError {
    pub channel: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CycleError {
    #[error(transparent)]
    Device(#[from] DeviceCommandError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redaction_hides_every_occurrence() {
        let url = "https://api/v1.1/devices/ABC123/commands?id=ABC123";
        assert_eq!(
            redact_device_id(url, "ABC123"),
            "https://api/v1.1/devices/XXXXX/commands?id=XXXXX"
        );
        assert_eq!(redact_device_id(url, ""), url);
    }

    #[test]
    fn device_error_names_target_and_command() {
        let err = DeviceCommandError::new("aircon", "setAll", "statusCode 190").for_target("support");
        assert_eq!(err.to_string(), "support: `setAll` failed: statusCode 190");
    }
}
