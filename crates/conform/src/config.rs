//! Run configuration
//!
//! Loaded from TOML. Every section defaults, so a file only needs the keys
//! that differ from the defaults below.

use alpaca_conform_common::DeviceType;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ConformError, ConformResult};

/// Complete conformance run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConformConfig {
    /// Device under test
    pub device: DeviceConfig,

    /// Transport and reporting behaviour
    pub alpaca: AlpacaConfig,

    pub camera: CameraConfig,
    pub dome: DomeConfig,
    pub focuser: FocuserConfig,
    pub rotator: RotatorConfig,
    pub switch: SwitchConfig,
    pub telescope: TelescopeConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// Address of the device under test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub device_type: DeviceType,
    pub device_number: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            scheme: Scheme::Http,
            host: "127.0.0.1".to_string(),
            port: 11111,
            device_type: DeviceType::Telescope,
            device_number: 0,
        }
    }
}

impl DeviceConfig {
    /// `scheme://host:port` of the Alpaca server
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

/// How large image arrays should be transferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageArrayTransfer {
    Json,
    Base64HandOff,
    ImageBytes,
    #[default]
    BestAvailable,
}

impl ImageArrayTransfer {
    pub fn requests_base64_handoff(&self) -> bool {
        matches!(self, Self::Base64HandOff | Self::BestAvailable)
    }

    pub fn accepts_image_bytes(&self) -> bool {
        matches!(self, Self::ImageBytes | Self::BestAvailable)
    }
}

/// Response decompression accepted from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageArrayCompression {
    #[default]
    None,
    Gzip,
    Deflate,
    GzipOrDeflate,
}

impl ImageArrayCompression {
    pub fn gzip(&self) -> bool {
        matches!(self, Self::Gzip | Self::GzipOrDeflate)
    }

    pub fn deflate(&self) -> bool {
        matches!(self, Self::Deflate | Self::GzipOrDeflate)
    }
}

/// Alpaca transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlpacaConfig {
    /// Basic auth user name, auth is only sent when this is non-empty
    pub username: Option<String>,
    pub password: Option<String>,

    /// Seconds allowed to establish a TCP connection
    pub establish_connection_timeout: u64,

    /// Seconds allowed for quick operations to complete
    pub standard_response_timeout: u64,

    /// Seconds allowed for any single HTTP request
    pub long_response_timeout: u64,

    pub image_array_transfer: ImageArrayTransfer,
    pub image_array_compression: ImageArrayCompression,

    /// Send malformed `/api/v1` URL elements and non-PUT verbs
    pub test_primary_url_structure: bool,

    /// Report NotImplemented device errors instead of ignoring them
    pub report_not_implemented_errors: bool,

    /// Log the raw response alongside OK outcomes
    pub show_success_responses: bool,

    /// Accept self-signed TLS certificates
    pub trust_user_certificates: bool,
}

impl Default for AlpacaConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            establish_connection_timeout: 2,
            standard_response_timeout: 3,
            long_response_timeout: 100,
            image_array_transfer: ImageArrayTransfer::default(),
            image_array_compression: ImageArrayCompression::default(),
            test_primary_url_structure: false,
            report_not_implemented_errors: false,
            show_success_responses: false,
            trust_user_certificates: false,
        }
    }
}

impl AlpacaConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.long_response_timeout)
    }

    /// Credentials to send, if a user name is configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match self.username.as_deref() {
            Some(user) if !user.is_empty() => Some((user, self.password.as_deref().unwrap_or(""))),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Exposure length in seconds used for StartExposure
    pub exposure_duration: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self { exposure_duration: 1.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DomeConfig {
    /// Allow the shutter to be opened during the run
    pub open_shutter: bool,
    pub azimuth_timeout: u64,
    pub altitude_timeout: u64,
    pub shutter_timeout: u64,
    /// Settling delay in seconds after each dome movement
    pub stabilisation_wait: u64,
}

impl Default for DomeConfig {
    fn default() -> Self {
        Self {
            open_shutter: false,
            azimuth_timeout: 240,
            altitude_timeout: 240,
            shutter_timeout: 240,
            stabilisation_wait: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FocuserConfig {
    pub timeout: u64,
}

impl Default for FocuserConfig {
    fn default() -> Self {
        Self { timeout: 60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotatorConfig {
    pub timeout: u64,
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self { timeout: 120 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    /// Allow switch states to be written
    pub enable_set: bool,
    pub read_delay_ms: u64,
    pub write_delay_ms: u64,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            enable_set: false,
            read_delay_ms: 500,
            write_delay_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelescopeConfig {
    /// Longest slew expected, in seconds
    pub maximum_slew_time: u64,
    pub tests: TelescopeTests,
}

impl Default for TelescopeConfig {
    fn default() -> Self {
        Self {
            maximum_slew_time: 300,
            tests: TelescopeTests::default(),
        }
    }
}

/// Telescope methods that may be switched off
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelescopeTests {
    pub park_unpark: bool,
    pub find_home: bool,
    pub abort_slew: bool,
    pub move_axis: bool,
    pub pulse_guide: bool,
    pub slew_to_coordinates: bool,
    pub slew_to_coordinates_async: bool,
    pub slew_to_target: bool,
    pub slew_to_target_async: bool,
    pub sync_to_coordinates: bool,
    pub sync_to_target: bool,
    pub slew_to_alt_az: bool,
    pub slew_to_alt_az_async: bool,
    pub sync_to_alt_az: bool,
}

impl Default for TelescopeTests {
    fn default() -> Self {
        Self {
            park_unpark: true,
            find_home: true,
            abort_slew: true,
            move_axis: true,
            pulse_guide: true,
            slew_to_coordinates: true,
            slew_to_coordinates_async: true,
            slew_to_target: true,
            slew_to_target_async: true,
            sync_to_coordinates: true,
            sync_to_target: true,
            slew_to_alt_az: true,
            slew_to_alt_az_async: true,
            sync_to_alt_az: true,
        }
    }
}

/// Configuration switch guarding a group of plan steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    PrimaryUrlStructure,
    DomeOpenShutter,
    SwitchSet,
    ParkUnpark,
    FindHome,
    AbortSlew,
    MoveAxis,
    PulseGuide,
    SlewToCoordinates,
    SlewToCoordinatesAsync,
    SlewToTarget,
    SlewToTargetAsync,
    SyncToCoordinates,
    SyncToTarget,
    SlewToAltAz,
    SlewToAltAzAsync,
    SyncToAltAz,
}

/// Configured timeout a wait condition is bounded by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutSetting {
    #[default]
    Standard,
    DomeAzimuth,
    DomeAltitude,
    DomeShutter,
    Focuser,
    Rotator,
    TelescopeSlew,
}

/// Configured unconditional delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelaySetting {
    DomeStabilisation,
    SwitchRead,
    SwitchWrite,
}

/// Configuration value that can seed a request parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Setting {
    CameraExposureDuration,
}

impl ConformConfig {
    /// Load configuration from file, falling back to defaults when it is absent
    pub fn load(path: &Path) -> ConformResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> ConformResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> ConformResult<()> {
        if self.device.host.trim().is_empty() {
            return Err(ConformError::Config("device host must not be empty".into()));
        }
        if self.alpaca.long_response_timeout == 0 {
            return Err(ConformError::Config(
                "long_response_timeout must be at least one second".into(),
            ));
        }
        Ok(())
    }

    pub fn gate_enabled(&self, gate: Gate) -> bool {
        let tests = &self.telescope.tests;
        match gate {
            Gate::PrimaryUrlStructure => self.alpaca.test_primary_url_structure,
            Gate::DomeOpenShutter => self.dome.open_shutter,
            Gate::SwitchSet => self.switch.enable_set,
            Gate::ParkUnpark => tests.park_unpark,
            Gate::FindHome => tests.find_home,
            Gate::AbortSlew => tests.abort_slew,
            Gate::MoveAxis => tests.move_axis,
            Gate::PulseGuide => tests.pulse_guide,
            Gate::SlewToCoordinates => tests.slew_to_coordinates,
            Gate::SlewToCoordinatesAsync => tests.slew_to_coordinates_async,
            Gate::SlewToTarget => tests.slew_to_target,
            Gate::SlewToTargetAsync => tests.slew_to_target_async,
            Gate::SyncToCoordinates => tests.sync_to_coordinates,
            Gate::SyncToTarget => tests.sync_to_target,
            Gate::SlewToAltAz => tests.slew_to_alt_az,
            Gate::SlewToAltAzAsync => tests.slew_to_alt_az_async,
            Gate::SyncToAltAz => tests.sync_to_alt_az,
        }
    }

    pub fn timeout_seconds(&self, timeout: TimeoutSetting) -> u64 {
        match timeout {
            TimeoutSetting::Standard => self.alpaca.standard_response_timeout,
            TimeoutSetting::DomeAzimuth => self.dome.azimuth_timeout,
            TimeoutSetting::DomeAltitude => self.dome.altitude_timeout,
            TimeoutSetting::DomeShutter => self.dome.shutter_timeout,
            TimeoutSetting::Focuser => self.focuser.timeout,
            TimeoutSetting::Rotator => self.rotator.timeout,
            TimeoutSetting::TelescopeSlew => self.telescope.maximum_slew_time,
        }
    }

    pub fn delay_ms(&self, delay: DelaySetting) -> u64 {
        match delay {
            DelaySetting::DomeStabilisation => self.dome.stabilisation_wait * 1000,
            DelaySetting::SwitchRead => self.switch.read_delay_ms,
            DelaySetting::SwitchWrite => self.switch.write_delay_ms,
        }
    }

    pub fn setting_value(&self, setting: Setting) -> String {
        match setting {
            Setting::CameraExposureDuration => self.camera.exposure_duration.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ConformConfig::default();
        assert_eq!(config.device.base_url(), "http://127.0.0.1:11111");
        assert_eq!(config.alpaca.request_timeout(), Duration::from_secs(100));
        assert!(!config.gate_enabled(Gate::PrimaryUrlStructure));
        assert!(config.gate_enabled(Gate::SlewToAltAzAsync));
        assert_eq!(config.delay_ms(DelaySetting::DomeStabilisation), 10_000);
        assert_eq!(config.setting_value(Setting::CameraExposureDuration), "1");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let toml = r#"
[device]
host = "10.0.0.5"
device_type = "focuser"

[telescope.tests]
park_unpark = false
"#;
        let config: ConformConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.device.host, "10.0.0.5");
        assert_eq!(config.device.port, 11111);
        assert_eq!(config.device.device_type, DeviceType::Focuser);
        assert!(!config.gate_enabled(Gate::ParkUnpark));
        assert!(config.gate_enabled(Gate::FindHome));
        assert_eq!(config.timeout_seconds(TimeoutSetting::Focuser), 60);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conform.toml");

        let mut config = ConformConfig::default();
        config.device.device_type = DeviceType::Dome;
        config.dome.open_shutter = true;
        config.alpaca.username = Some("observer".into());
        config.save(&path).unwrap();

        let loaded = ConformConfig::load(&path).unwrap();
        assert_eq!(loaded.device.device_type, DeviceType::Dome);
        assert!(loaded.gate_enabled(Gate::DomeOpenShutter));
        assert_eq!(loaded.alpaca.credentials(), Some(("observer", "")));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConformConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.device.device_number, 0);
    }

    #[test]
    fn test_empty_username_sends_no_credentials() {
        let mut alpaca = AlpacaConfig::default();
        alpaca.username = Some(String::new());
        alpaca.password = Some("secret".into());
        assert_eq!(alpaca.credentials(), None);
    }
}
