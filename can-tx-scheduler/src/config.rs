//! Signal configuration types
//!
//! This module defines the operator-facing description of a signal as it is
//! typed into a form or written into a config file: the CAN ID is hex text and
//! the size is a phrase such as `"4 bit"` or `"3 byte"`. Converting a
//! [`SignalConfig`] validates it into a [`SignalSpec`].

use crate::signal::{Signal, SignalSpec};
use crate::types::{parse_can_id, LiveValue, Result, Signedness, ValueFormat, Width};
use serde::{Deserialize, Serialize};

/// Configuration of one signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Signal name, unique within its frame
    pub name: String,

    /// CAN ID as hex text (`"0x08"`, `"18530902"`)
    pub id: String,

    /// Requested frame format; `Some(false)` limits the ID to 11 bits
    #[serde(default)]
    pub extended: Option<bool>,

    /// Width phrase: `"<n> bit"` or `"<n> byte"`
    pub size: String,

    /// Two's-complement signed value
    #[serde(default)]
    pub signed: bool,

    /// Fixed-length ASCII text (byte sizes only)
    #[serde(default)]
    pub ascii: bool,

    /// Physical value per raw unit (default: 1.0)
    #[serde(default = "default_resolution")]
    pub resolution: f64,

    /// Bit indices (bit sizes) or byte offsets (byte sizes)
    pub positions: Vec<u8>,

    /// Byte receiving a bit-sized signal
    #[serde(default)]
    pub target_byte: u8,

    /// Transmission period in milliseconds (default: 100ms)
    #[serde(default = "default_cycle_time")]
    pub cycle_time_ms: f64,

    /// Initial live value (default: 0, or empty text for ASCII)
    #[serde(default)]
    pub value: Option<LiveValue>,
}

fn default_resolution() -> f64 {
    1.0
}

fn default_cycle_time() -> f64 {
    100.0
}

impl SignalConfig {
    /// Create a configuration with default resolution, cycle time and value
    pub fn new(
        name: impl Into<String>,
        id: impl Into<String>,
        size: impl Into<String>,
        positions: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            extended: None,
            size: size.into(),
            signed: false,
            ascii: false,
            resolution: default_resolution(),
            positions,
            target_byte: 0,
            cycle_time_ms: default_cycle_time(),
            value: None,
        }
    }

    /// Builder method: request standard or extended frame format
    pub fn with_extended(mut self, extended: bool) -> Self {
        self.extended = Some(extended);
        self
    }

    /// Builder method: signed value
    pub fn with_signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    /// Builder method: ASCII text value
    pub fn with_ascii(mut self, ascii: bool) -> Self {
        self.ascii = ascii;
        self
    }

    /// Builder method: resolution
    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    /// Builder method: target byte of a bit signal
    pub fn with_target_byte(mut self, target_byte: u8) -> Self {
        self.target_byte = target_byte;
        self
    }

    /// Builder method: cycle time
    pub fn with_cycle_time_ms(mut self, cycle_time_ms: f64) -> Self {
        self.cycle_time_ms = cycle_time_ms;
        self
    }

    /// Builder method: initial value
    pub fn with_value(mut self, value: impl Into<LiveValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Parse and validate into a [`SignalSpec`]
    pub fn to_spec(&self) -> Result<SignalSpec> {
        let frame_id = parse_can_id(&self.id, self.extended)?;
        let width: Width = self.size.parse()?;

        let mut spec = SignalSpec::new(self.name.clone(), frame_id, width, self.positions.clone())
            .with_signedness(if self.signed { Signedness::Signed } else { Signedness::Unsigned })
            .with_resolution(self.resolution)
            .with_target_byte(self.target_byte)
            .with_cycle_time_ms(self.cycle_time_ms);
        if self.ascii {
            spec.format = ValueFormat::Ascii;
        }

        spec.validate()?;
        Ok(spec)
    }

    /// Initial value, falling back to the format's zero value
    pub fn initial_value(&self) -> LiveValue {
        match &self.value {
            Some(value) => value.clone(),
            None if self.ascii => LiveValue::Text(String::new()),
            None => LiveValue::Number(0.0),
        }
    }

    /// Build a ready-to-enable [`Signal`]
    pub fn to_signal(&self) -> Result<Signal> {
        Signal::new(self.to_spec()?, self.initial_value())
    }
}
