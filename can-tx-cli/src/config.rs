//! Configuration loading and parsing

use anyhow::{bail, Context, Result};
use can_tx_scheduler::{parse_can_id, LiveValue, SignalConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub run: RunConfig,
    pub signals: Vec<SignalConfig>,
    #[serde(default)]
    pub script: Vec<ScriptStep>,
}

/// Bus settings, reported in the console output
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BusConfig {
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            channel: default_channel(),
            bitrate: default_bitrate(),
        }
    }
}

fn default_interface() -> String {
    "console".to_string()
}

fn default_channel() -> String {
    "can0".to_string()
}

fn default_bitrate() -> u32 {
    500_000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    #[serde(default = "default_duration")]
    pub duration_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_duration(),
        }
    }
}

fn default_duration() -> u64 {
    5000
}

/// A timed edit, standing in for an operator at the controls
///
/// Each step names one signal and applies whichever of `value`,
/// `cycle_time_ms` and `enabled` it sets.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScriptStep {
    pub at_ms: u64,
    pub signal: String,
    pub value: Option<LiveValue>,
    pub cycle_time_ms: Option<f64>,
    pub enabled: Option<bool>,
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;
    Ok(config)
}

/// Check cross-references the per-signal validation cannot see
fn validate_config(config: &AppConfig) -> Result<()> {
    if config.signals.is_empty() {
        bail!("No signals defined");
    }

    for (i, signal) in config.signals.iter().enumerate() {
        signal
            .to_spec()
            .with_context(|| format!("Invalid signal '{}'", signal.name))?;

        if config.signals[..i].iter().any(|other| other.name == signal.name) {
            bail!("Signal name '{}' is used more than once", signal.name);
        }
    }

    for step in &config.script {
        if !config.signals.iter().any(|s| s.name == step.signal) {
            bail!("Script step at {} ms refers to unknown signal '{}'", step.at_ms, step.signal);
        }
    }

    Ok(())
}

/// Parse the one-shot frame arguments: hex ID and up to 8 hex data bytes
///
/// Short data is zero-padded; the transport always sends 8 bytes.
pub fn parse_frame(id: &str, data: &str, extended: Option<bool>) -> Result<(u32, [u8; 8])> {
    let frame_id = parse_can_id(id, extended)?;

    let digits: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(&digits).with_context(|| format!("Invalid data bytes: '{}'", data))?;
    if bytes.len() > 8 {
        bail!("At most 8 data bytes allowed, got {}", bytes.len());
    }

    if bytes.len() < 8 {
        log::info!("Padding {} data bytes with zeros to 8", bytes.len());
    }

    let mut payload = [0u8; 8];
    payload[..bytes.len()].copy_from_slice(&bytes);
    Ok((frame_id, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [bus]
        interface = "pcan"
        channel = "PCAN_USBBUS1"

        [run]
        duration_ms = 1500

        [[signals]]
        name = "Speed"
        id = "0x08"
        size = "1 byte"
        positions = [0]
        value = 17

        [[signals]]
        name = "Label"
        id = "18530902"
        size = "3 byte"
        ascii = true
        positions = [2, 1, 0]
        value = "AB"

        [[script]]
        at_ms = 500
        signal = "Speed"
        value = 42
    "#;

    #[test]
    fn test_config_deserialization() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.bus.interface, "pcan");
        assert_eq!(config.bus.bitrate, 500_000);
        assert_eq!(config.run.duration_ms, 1500);
        assert_eq!(config.signals.len(), 2);
        assert_eq!(config.script[0].value, Some(LiveValue::Number(42.0)));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.signals[1].initial_value(), LiveValue::from("AB"));
    }

    #[test]
    fn test_load_config_rejects_bad_signal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"
            [[signals]]
            name = "Bad"
            id = "0x08"
            size = "2 bit"
            positions = [0]
            "#,
        )
        .unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid signal 'Bad'"));
    }

    #[test]
    fn test_unknown_script_signal() {
        let mut config: AppConfig = toml::from_str(SAMPLE).unwrap();
        config.script[0].signal = "Missing".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_parse_frame() {
        let (id, payload) = parse_frame("0x00000008", "11 22 33 44 55 66 77 88", None).unwrap();
        assert_eq!(id, 0x08);
        assert_eq!(payload, [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);

        let (_, short) = parse_frame("7ff", "0102", Some(false)).unwrap();
        assert_eq!(short, [1, 2, 0, 0, 0, 0, 0, 0]);

        assert!(parse_frame("800", "00", Some(false)).is_err());
        assert!(parse_frame("08", "zz", None).is_err());
        assert!(parse_frame("08", "000102030405060708", None).is_err());
    }
}
