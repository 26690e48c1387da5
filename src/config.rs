use anyhow::{Context, Result};
use c11204_lib::protocol::{
    VoltageLimits, DEFAULT_LOWER_VOLTAGE_LIMIT, DEFAULT_UPPER_VOLTAGE_LIMIT,
};
use c11204_lib::serialport::{DEFAULT_PORT_DESCRIPTION, DEFAULT_TIMEOUT};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

/// Optional settings file; every value can be overridden on the command line.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Serial port path. When unset the port is looked up by `description`.
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default = "Config::default_description")]
    pub description: String,
    #[serde(
        default = "Config::default_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout: Duration,
    #[serde(default = "Config::default_voltage_min")]
    pub voltage_min: f64,
    #[serde(default = "Config::default_voltage_max")]
    pub voltage_max: f64,
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(&text).map_err(serde::de::Error::custom)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: None,
            description: Self::default_description(),
            timeout: Self::default_timeout(),
            voltage_min: Self::default_voltage_min(),
            voltage_max: Self::default_voltage_max(),
        }
    }
}

impl Config {
    pub const DEFAULT_CONFIG_FILE: &str = "c11204.yaml";

    fn default_description() -> String {
        DEFAULT_PORT_DESCRIPTION.into()
    }

    fn default_timeout() -> Duration {
        DEFAULT_TIMEOUT
    }

    fn default_voltage_min() -> f64 {
        DEFAULT_LOWER_VOLTAGE_LIMIT
    }

    fn default_voltage_max() -> f64 {
        DEFAULT_UPPER_VOLTAGE_LIMIT
    }

    pub fn load(config_file_path: &str) -> Result<Self> {
        log::debug!("Loading config file from {config_file_path:?}");
        let config_file = std::fs::File::open(config_file_path)
            .with_context(|| format!("Cannot open config file {config_file_path:?}"))?;
        let config: Self = serde_yaml::from_reader(&config_file)
            .with_context(|| format!("Cannot read config from file: {config_file_path:?}"))?;
        Ok(config)
    }

    /// Loads the given file, or [`Self::DEFAULT_CONFIG_FILE`] if it exists.
    pub fn load_or_default(config_file_path: Option<&str>) -> Result<Self> {
        match config_file_path {
            Some(path) => Self::load(path),
            None if Path::new(Self::DEFAULT_CONFIG_FILE).exists() => {
                Self::load(Self::DEFAULT_CONFIG_FILE)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn voltage_limits(&self) -> Result<VoltageLimits> {
        VoltageLimits::new(self.voltage_min, self.voltage_max).with_context(|| {
            format!(
                "Invalid voltage limits {} V .. {} V",
                self.voltage_min, self.voltage_max
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_file_uses_defaults() {
        let file = write_config("{}\n");
        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.voltage_limits().unwrap(), VoltageLimits::default());
    }

    #[test]
    fn full_config() {
        let file = write_config(
            "device: /dev/ttyUSB1\n\
             description: CP2102\n\
             timeout: 1s 500ms\n\
             voltage_min: 45\n\
             voltage_max: 75.5\n",
        );
        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.device.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(config.description, "CP2102");
        assert_eq!(config.timeout, Duration::from_millis(1500));
        let limits = config.voltage_limits().unwrap();
        assert_eq!(limits.lower(), 45.0);
        assert_eq!(limits.upper(), 75.5);
    }

    #[test]
    fn limit_above_hardware_is_rejected() {
        let file = write_config("voltage_max: 95\n");
        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert!(config.voltage_limits().is_err());
    }

    #[test]
    fn unknown_key_is_rejected() {
        let file = write_config("baudrate: 9600\n");
        assert!(Config::load(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Config::load_or_default(Some("/nonexistent/c11204.yaml")).is_err());
    }
}
