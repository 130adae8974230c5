use std::{collections::HashMap, thread, time::Duration};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use comfort_common::{
    codes::{fan_id, mode_id, mode_label, power_id, power_label, step_label},
    config::SensorLayout,
    error::redact_device_id,
    sensor::SensorKind,
    AirQualitySource, AirconDevice, AirconPath, AirconSetting, CirculatorDevice, CommandAck,
    ConfigError, DeviceCommandError, DeviceResult, PowerState, Reading, RetryPolicy, SensorSpec,
    StepDirection,
};

use crate::host::{env_or, required_env};

pub const DEFAULT_BASE_URL: &str = "https://api.switch-bot.com";
const STATUS_OK: u32 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandBody {
    pub command: String,
    pub parameter: String,
    pub command_type: &'static str,
}

impl CommandBody {
    pub fn command(command: &str, parameter: String) -> Self {
        Self {
            command: command.to_string(),
            parameter,
            command_type: "command",
        }
    }

    /// A learned remote button, addressed by its label.
    pub fn customize(label: &str) -> Self {
        Self {
            command: label.to_string(),
            parameter: "default".to_string(),
            command_type: "customize",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse<T> {
    status_code: u32,
    #[serde(default)]
    message: String,
    body: Option<T>,
}

#[derive(Debug, Deserialize)]
struct MeterStatus {
    temperature: f64,
    humidity: f64,
    #[serde(rename = "CO2", default)]
    co2: Option<u32>,
}

#[derive(Debug, Error)]
enum RequestError {
    #[error("{url}: HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("{url}: {message}")]
    Transport { url: String, message: String },
    #[error("{url}: unreadable response: {message}")]
    Decode { url: String, message: String },
    #[error("{url}: statusCode {code}: {message}")]
    Vendor {
        url: String,
        code: u32,
        message: String,
    },
}

/// `sign` header value: base64 of HMAC-SHA256 keyed by the secret over `token + t + nonce`.
pub fn sign(token: &str, secret: &str, timestamp_ms: &str, nonce: &str) -> String {
    let payload = format!("{token}{timestamp_ms}{nonce}");
    STANDARD.encode(hmac_sha256::HMAC::mac(payload.as_bytes(), secret.as_bytes()))
}

pub fn aircon_command(setting: &AirconSetting, path: AirconPath) -> CommandBody {
    match path {
        AirconPath::Primary => CommandBody::command(
            "setAll",
            format!(
                "{},{},{},{}",
                setting.temperature,
                mode_id(setting.mode),
                fan_id(setting.fan_speed),
                power_id(setting.power)
            ),
        ),
        AirconPath::Support => CommandBody::customize(mode_label(setting.mode)),
    }
}

fn reading_from_status(status: MeterStatus, kind: SensorKind) -> Result<Reading, String> {
    let reading = Reading::new(status.temperature, status.humidity);
    match (kind, status.co2) {
        (SensorKind::Co2, Some(co2)) => Ok(reading.with_co2(co2)),
        (SensorKind::Co2, None) => Err("status has no CO2 value".to_string()),
        (SensorKind::TemperatureHumidity, _) => Ok(reading),
    }
}

#[derive(Debug, Clone)]
pub struct SwitchBotDevices {
    pub aircon: String,
    pub aircon_support: String,
    pub circulator: String,
    /// Sensor id from the layout to vendor device id.
    pub sensors: HashMap<String, String>,
}

impl SwitchBotDevices {
    pub fn from_env(layout: &SensorLayout) -> Result<Self, ConfigError> {
        let mut sensors = HashMap::new();
        for sensor in layout.all() {
            let key = format!("SWITCHBOT_{}_DEVICE_ID", sensor.id.to_uppercase());
            sensors.insert(sensor.id.clone(), required_env(&key)?);
        }

        Ok(Self {
            aircon: required_env("SWITCHBOT_AIR_CONDITIONER_DEVICE_ID")?,
            aircon_support: required_env("SWITCHBOT_AIR_CONDITIONER_SUPPORT_DEVICE_ID")?,
            circulator: required_env("SWITCHBOT_CIRCULATOR_DEVICE_ID")?,
            sensors,
        })
    }
}

pub struct SwitchBotClient {
    agent: ureq::Agent,
    base_url: String,
    token: String,
    secret: String,
    devices: SwitchBotDevices,
    retry: RetryPolicy,
}

impl SwitchBotClient {
    pub fn new(
        base_url: &str,
        token: String,
        secret: String,
        devices: SwitchBotDevices,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            secret,
            devices,
            retry,
        }
    }

    pub fn from_env(layout: &SensorLayout, retry: RetryPolicy) -> Result<Self, ConfigError> {
        Ok(Self::new(
            &env_or("SWITCHBOT_BASE_URL", DEFAULT_BASE_URL),
            required_env("SWITCHBOT_ACCESS_TOKEN")?,
            required_env("SWITCHBOT_SECRET")?,
            SwitchBotDevices::from_env(layout)?,
            retry,
        ))
    }

    fn signed(&self, request: ureq::Request) -> ureq::Request {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let nonce = "";
        request
            .set("Content-Type", "application/json; charset=utf8")
            .set("Authorization", &self.token)
            .set("t", &timestamp)
            .set("sign", &sign(&self.token, &self.secret, &timestamp, nonce))
            .set("nonce", nonce)
    }

    /// Every error carries `masked`; transport messages are scrubbed of the device id too.
    fn decode<T: DeserializeOwned>(
        masked: &str,
        device_id: &str,
        result: Result<ureq::Response, ureq::Error>,
    ) -> Result<ApiResponse<T>, RequestError> {
        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(RequestError::Status {
                    url: masked.to_string(),
                    status,
                })
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(RequestError::Transport {
                    url: masked.to_string(),
                    message: redact_device_id(&transport.to_string(), device_id),
                })
            }
        };
        response
            .into_json::<ApiResponse<T>>()
            .map_err(|err| RequestError::Decode {
                url: masked.to_string(),
                message: err.to_string(),
            })
    }

    /// Vendor rejections come back as a rejected ack; transport and HTTP failures as errors.
    fn post_command(&self, device_id: &str, body: &CommandBody) -> Result<CommandAck, RequestError> {
        let url = format!("{}/v1.1/devices/{device_id}/commands", self.base_url);
        let masked = redact_device_id(&url, device_id);

        thread::sleep(Duration::from_millis(self.retry.command_pause_ms));
        debug!("POST {masked} {body:?}");
        let result = self.signed(self.agent.post(&url)).send_json(body);
        let response = Self::decode::<serde_json::Value>(&masked, device_id, result)?;

        if response.status_code == STATUS_OK {
            Ok(CommandAck::ACCEPTED)
        } else {
            warn!(
                "{masked}: {} rejected with statusCode {}: {}",
                body.command, response.status_code, response.message
            );
            Ok(CommandAck::REJECTED)
        }
    }

    fn fetch_status(&self, device_id: &str) -> Result<MeterStatus, RequestError> {
        let url = format!("{}/v1.1/devices/{device_id}/status", self.base_url);
        let masked = redact_device_id(&url, device_id);
        let attempts = self.retry.max_attempts.max(1);

        let mut last_error = None;
        for attempt in 1..=attempts {
            let result = self.signed(self.agent.get(&url)).call();
            let outcome = Self::decode::<MeterStatus>(&masked, device_id, result).and_then(|response| {
                match (response.status_code, response.body) {
                    (STATUS_OK, Some(body)) => Ok(body),
                    (code, _) => Err(RequestError::Vendor {
                        url: masked.clone(),
                        code,
                        message: response.message,
                    }),
                }
            });

            match outcome {
                Ok(status) => return Ok(status),
                Err(err) => {
                    warn!("status read attempt {attempt}/{attempts} failed: {err}");
                    last_error = Some(err);
                    if attempt < attempts {
                        thread::sleep(Duration::from_millis(self.retry.retry_delay_ms));
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RequestError::Transport {
            url: masked,
            message: "no attempt made".to_string(),
        }))
    }

    fn send_circulator(&self, body: CommandBody) -> DeviceResult<CommandAck> {
        self.post_command(&self.devices.circulator, &body)
            .map_err(|err| DeviceCommandError::new("circulator", body.command.as_str(), err.to_string()))
    }
}

impl AirQualitySource for SwitchBotClient {
    fn read_air_quality(&mut self, sensor: &SensorSpec) -> DeviceResult<Reading> {
        let device_id = self.devices.sensors.get(&sensor.id).ok_or_else(|| {
            DeviceCommandError::new(sensor.label.as_str(), "status", "no device id configured")
        })?;

        let status = self
            .fetch_status(device_id)
            .map_err(|err| DeviceCommandError::new(sensor.label.as_str(), "status", err.to_string()))?;
        let reading = reading_from_status(status, sensor.kind)
            .map_err(|message| DeviceCommandError::new(sensor.label.as_str(), "status", message))?;

        debug!("{} read {reading:?}", sensor.label);
        Ok(reading)
    }
}

impl AirconDevice for SwitchBotClient {
    fn send_aircon(&mut self, setting: &AirconSetting, path: AirconPath) -> DeviceResult<()> {
        let (target, device_id) = match path {
            AirconPath::Primary => ("aircon", &self.devices.aircon),
            AirconPath::Support => ("aircon_support", &self.devices.aircon_support),
        };
        let body = aircon_command(setting, path);

        let ack = self
            .post_command(device_id, &body)
            .map_err(|err| DeviceCommandError::new(target, body.command.as_str(), err.to_string()))?;
        if !ack.accepted {
            return Err(DeviceCommandError::new(
                target,
                body.command.as_str(),
                "rejected by the device API",
            ));
        }

        info!("{target} accepted {} {}", body.command, body.parameter);
        Ok(())
    }
}

impl CirculatorDevice for SwitchBotClient {
    fn set_power(&mut self, power: PowerState) -> DeviceResult<CommandAck> {
        self.send_circulator(CommandBody::customize(power_label(power)))
    }

    fn step(&mut self, direction: StepDirection) -> DeviceResult<CommandAck> {
        self.send_circulator(CommandBody::customize(step_label(direction)))
    }
}
