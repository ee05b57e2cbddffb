//! Core types for the CAN transmit scheduler library
//!
//! This module defines the fundamental value types shared by the codec, the
//! frame composer and the scheduler, together with the two error families:
//! configuration errors (surfaced to the caller synchronously) and transport
//! errors (recovered locally at dispatch time).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result type for configuration and scheduling operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Number of data bytes in a classic CAN frame
pub const FRAME_LEN: usize = 8;

/// Outbound payload of one classic CAN frame
pub type Payload = [u8; FRAME_LEN];

/// Highest 11-bit (standard) identifier
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Highest 29-bit (extended) identifier
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// Longest accepted cycle time (one day)
pub const MAX_CYCLE_TIME_MS: f64 = 86_400_000.0;

/// True for a finite cycle time in `(0, MAX_CYCLE_TIME_MS]`
pub fn is_valid_cycle_time(cycle_time_ms: f64) -> bool {
    cycle_time_ms.is_finite() && cycle_time_ms > 0.0 && cycle_time_ms <= MAX_CYCLE_TIME_MS
}

/// Configuration errors
///
/// All of these are detected synchronously, either while validating a signal
/// definition or when a signal is enabled, and are never silently coerced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid CAN ID: {0}")]
    InvalidId(String),

    #[error("Invalid resolution {0}: must be a finite value greater than zero")]
    InvalidResolution(f64),

    #[error("Invalid mapping: {0}")]
    InvalidMapping(String),

    #[error("Value out of range for signal '{signal}': raw {raw} not in [{min}, {max}]")]
    ValueOutOfRange {
        signal: String,
        raw: i128,
        min: i128,
        max: i128,
    },

    #[error("Signal '{signal}' overlaps signal '{existing}' in frame 0x{frame_id:X}")]
    MappingConflict {
        frame_id: u32,
        signal: String,
        existing: String,
    },

    #[error("Cycle time mismatch on frame 0x{frame_id:X}: running at {running_ms} ms, signal requests {requested_ms} ms")]
    CycleTimeMismatch {
        frame_id: u32,
        running_ms: f64,
        requested_ms: f64,
    },

    #[error("Invalid cycle time {0} ms: must be greater than zero and at most 86400000")]
    InvalidCycleTime(f64),

    #[error("Invalid value for signal '{signal}': {reason}")]
    InvalidValue { signal: String, reason: String },

    #[error("Signal '{signal}' is already enabled on frame 0x{frame_id:X}")]
    DuplicateSignal { frame_id: u32, signal: String },

    #[error("Signal '{signal}' is not enabled on frame 0x{frame_id:X}")]
    SignalNotFound { frame_id: u32, signal: String },

    #[error("Frame 0x{0:X} is not registered")]
    NotRegistered(u32),

    #[error("Scheduler has been shut down")]
    SchedulerStopped,
}

/// Errors raised by an outbound transport at dispatch time
///
/// The scheduler logs these and keeps ticking; they never escalate.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport disconnected")]
    Disconnected,

    #[error("Frame 0x{frame_id:X} rejected: {reason}")]
    Rejected { frame_id: u32, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Occupied width of a signal inside the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "unit", content = "count")]
pub enum Width {
    /// `n` bits packed into a single target byte
    Bits(u8),
    /// `n` whole bytes, each placed at its own frame offset
    Bytes(u8),
}

impl Width {
    /// Number of encoded cells (bits for `Bits`, bytes for `Bytes`)
    pub fn count(&self) -> u8 {
        match self {
            Width::Bits(n) | Width::Bytes(n) => *n,
        }
    }

    /// Width of the raw integer domain in bits
    pub fn bit_len(&self) -> u32 {
        match self {
            Width::Bits(n) => u32::from(*n),
            Width::Bytes(n) => u32::from(*n) * 8,
        }
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Width::Bits(n) => write!(f, "{} bit", n),
            Width::Bytes(n) => write!(f, "{} byte", n),
        }
    }
}

impl FromStr for Width {
    type Err = ConfigError;

    /// Parses sizes such as `"4 bit"`, `"3 byte"` or `"2bytes"`
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().to_ascii_lowercase();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, unit) = trimmed.split_at(split);

        let count: u8 = digits
            .parse()
            .map_err(|_| ConfigError::InvalidMapping(format!("invalid size '{}'", s)))?;

        match unit.trim() {
            "bit" | "bits" => Ok(Width::Bits(count)),
            "byte" | "bytes" => Ok(Width::Bytes(count)),
            _ => Err(ConfigError::InvalidMapping(format!("invalid size unit in '{}'", s))),
        }
    }
}

/// Integer interpretation of a numeric signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signedness {
    /// Unsigned integer
    #[default]
    Unsigned,
    /// Two's-complement signed integer
    Signed,
}

/// How the live value of a signal is rendered into the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueFormat {
    /// Scaled integer
    #[default]
    Numeric,
    /// Fixed-length ASCII text (byte signals only)
    Ascii,
}

/// Current value of a signal as supplied by the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiveValue {
    /// Physical numeric value
    Number(f64),
    /// Text, either for ASCII signals or unparsed widget input
    Text(String),
}

impl Default for LiveValue {
    fn default() -> Self {
        LiveValue::Number(0.0)
    }
}

impl fmt::Display for LiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiveValue::Number(v) => write!(f, "{}", v),
            LiveValue::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<f64> for LiveValue {
    fn from(value: f64) -> Self {
        LiveValue::Number(value)
    }
}

impl From<&str> for LiveValue {
    fn from(value: &str) -> Self {
        LiveValue::Text(value.to_string())
    }
}

impl From<String> for LiveValue {
    fn from(value: String) -> Self {
        LiveValue::Text(value)
    }
}

/// Parse a hexadecimal CAN identifier, with or without a `0x` prefix
///
/// `extended` is the frame format requested by the operator: `Some(false)`
/// limits the identifier to 11 bits, `Some(true)` and `None` to 29 bits.
pub fn parse_can_id(text: &str, extended: Option<bool>) -> Result<u32> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    let id = u32::from_str_radix(digits, 16)
        .map_err(|_| ConfigError::InvalidId(format!("'{}' is not a hexadecimal identifier", text)))?;

    let limit = match extended {
        Some(false) => MAX_STANDARD_ID,
        _ => MAX_EXTENDED_ID,
    };
    if id > limit {
        return Err(ConfigError::InvalidId(format!(
            "0x{:X} exceeds the {} limit 0x{:X}",
            id,
            if limit == MAX_STANDARD_ID { "standard" } else { "extended" },
            limit
        )));
    }

    Ok(id)
}

/// Whether a frame identifier needs the 29-bit frame format
pub fn is_extended_id(frame_id: u32) -> bool {
    frame_id > MAX_STANDARD_ID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_can_id() {
        assert_eq!(parse_can_id("0x08", None), Ok(0x08));
        assert_eq!(parse_can_id("18530902", Some(true)), Ok(0x1853_0902));
        assert_eq!(parse_can_id(" 7ff ", Some(false)), Ok(0x7FF));
        assert!(matches!(parse_can_id("800", Some(false)), Err(ConfigError::InvalidId(_))));
        assert!(matches!(parse_can_id("20000000", None), Err(ConfigError::InvalidId(_))));
        assert!(matches!(parse_can_id("xyz", None), Err(ConfigError::InvalidId(_))));
    }

    #[test]
    fn test_extended_threshold() {
        assert!(!is_extended_id(0x7FF));
        assert!(is_extended_id(0x800));
        assert!(is_extended_id(0x1853_0902));
    }

    #[test]
    fn test_width_parsing() {
        assert_eq!("4 bit".parse::<Width>(), Ok(Width::Bits(4)));
        assert_eq!("3 byte".parse::<Width>(), Ok(Width::Bytes(3)));
        assert_eq!("2bytes".parse::<Width>(), Ok(Width::Bytes(2)));
        assert!("3 words".parse::<Width>().is_err());
        assert!("byte".parse::<Width>().is_err());
    }

    #[test]
    fn test_width_bit_len() {
        assert_eq!(Width::Bits(5).bit_len(), 5);
        assert_eq!(Width::Bytes(3).bit_len(), 24);
        assert_eq!(format!("{}", Width::Bytes(3)), "3 byte");
    }

    #[test]
    fn test_live_value_display() {
        assert_eq!(format!("{}", LiveValue::Number(42.0)), "42");
        assert_eq!(format!("{}", LiveValue::from("AB")), "\"AB\"");
    }
}
