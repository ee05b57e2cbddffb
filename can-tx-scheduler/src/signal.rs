//! Signal definitions
//!
//! A [`SignalSpec`] describes where one signal lives inside a frame and how its
//! value is scaled. A [`Signal`] pairs a spec with the live value the
//! presentation layer edits; it is the unit the scheduler registers per frame.

use crate::codec;
use crate::types::{
    is_extended_id, is_valid_cycle_time, ConfigError, LiveValue, Payload, Result, Signedness,
    ValueFormat, Width, FRAME_LEN, MAX_EXTENDED_ID,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Encoding rules for one signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSpec {
    /// Signal name, unique within its frame
    pub name: String,
    /// CAN identifier of the frame carrying this signal
    frame_id: u32,
    /// Occupied width (bits inside one byte, or whole bytes)
    pub width: Width,
    /// Numeric or ASCII rendering
    pub format: ValueFormat,
    /// Integer interpretation (ignored for ASCII)
    pub signedness: Signedness,
    /// Physical value per raw unit
    pub resolution: f64,
    /// Target bit indices (`Bits`) or frame byte offsets (`Bytes`)
    pub positions: Vec<u8>,
    /// Frame byte receiving the packed bits (`Bits` only)
    pub target_byte: u8,
    /// Transmission period in milliseconds
    pub cycle_time_ms: f64,
}

impl SignalSpec {
    /// Create a numeric spec with resolution 1, unsigned, 100 ms cycle
    ///
    /// Use the builder methods to refine it and [`SignalSpec::validate`] (or
    /// [`Signal::new`]) to check it.
    pub fn new(name: impl Into<String>, frame_id: u32, width: Width, positions: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            frame_id,
            width,
            format: ValueFormat::Numeric,
            signedness: Signedness::Unsigned,
            resolution: 1.0,
            positions,
            target_byte: 0,
            cycle_time_ms: 100.0,
        }
    }

    /// Create a fixed-length ASCII spec over `positions.len()` bytes
    pub fn ascii(name: impl Into<String>, frame_id: u32, positions: Vec<u8>) -> Self {
        let count = positions.len().min(u8::MAX as usize) as u8;
        let mut spec = Self::new(name, frame_id, Width::Bytes(count), positions);
        spec.format = ValueFormat::Ascii;
        spec
    }

    /// Builder method: set signedness
    pub fn with_signedness(mut self, signedness: Signedness) -> Self {
        self.signedness = signedness;
        self
    }

    /// Builder method: set resolution
    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    /// Builder method: set the byte receiving a bit signal
    pub fn with_target_byte(mut self, target_byte: u8) -> Self {
        self.target_byte = target_byte;
        self
    }

    /// Builder method: set cycle time
    pub fn with_cycle_time_ms(mut self, cycle_time_ms: f64) -> Self {
        self.cycle_time_ms = cycle_time_ms;
        self
    }

    /// CAN identifier of the carrying frame
    pub fn frame_id(&self) -> u32 {
        self.frame_id
    }

    /// True for 29-bit identifiers; always derived from `frame_id`
    pub fn is_extended(&self) -> bool {
        is_extended_id(self.frame_id)
    }

    /// Check the definition without side effects
    pub fn validate(&self) -> Result<()> {
        validate(self)
    }

    /// Absolute cells written by this signal, one bit per `byte * 8 + bit`
    pub fn cell_mask(&self) -> u64 {
        match self.width {
            Width::Bits(_) => self
                .positions
                .iter()
                .fold(0u64, |mask, &bit| {
                    mask | 1u64.checked_shl(self.target_byte as u32 * 8 + bit as u32).unwrap_or(0)
                }),
            Width::Bytes(_) => self
                .positions
                .iter()
                .fold(0u64, |mask, &byte| mask | 0xFFu64.checked_shl(byte as u32 * 8).unwrap_or(0)),
        }
    }
}

/// Validate a signal definition
///
/// Checks identifier range, resolution, cycle time and the position mapping.
pub fn validate(spec: &SignalSpec) -> Result<()> {
    if spec.frame_id > MAX_EXTENDED_ID {
        return Err(ConfigError::InvalidId(format!(
            "0x{:X} exceeds the extended limit 0x{:X}",
            spec.frame_id, MAX_EXTENDED_ID
        )));
    }

    if !(spec.resolution.is_finite() && spec.resolution > 0.0) {
        return Err(ConfigError::InvalidResolution(spec.resolution));
    }

    if !is_valid_cycle_time(spec.cycle_time_ms) {
        return Err(ConfigError::InvalidCycleTime(spec.cycle_time_ms));
    }

    let count = spec.width.count();
    if count == 0 || count as usize > FRAME_LEN {
        return Err(ConfigError::InvalidMapping(format!(
            "signal '{}': width {} must be between 1 and {}",
            spec.name, spec.width, FRAME_LEN
        )));
    }

    if spec.positions.len() != count as usize {
        return Err(ConfigError::InvalidMapping(format!(
            "signal '{}': {} positions given for width {}",
            spec.name,
            spec.positions.len(),
            spec.width
        )));
    }

    if let Some(&bad) = spec.positions.iter().find(|&&p| p as usize >= FRAME_LEN) {
        return Err(ConfigError::InvalidMapping(format!(
            "signal '{}': position {} outside 0..{}",
            spec.name, bad, FRAME_LEN
        )));
    }

    let mut seen = 0u8;
    for &p in &spec.positions {
        if seen & (1 << p) != 0 {
            return Err(ConfigError::InvalidMapping(format!(
                "signal '{}': position {} used twice",
                spec.name, p
            )));
        }
        seen |= 1 << p;
    }

    match spec.width {
        Width::Bits(_) => {
            if spec.target_byte as usize >= FRAME_LEN {
                return Err(ConfigError::InvalidMapping(format!(
                    "signal '{}': target byte {} outside 0..{}",
                    spec.name, spec.target_byte, FRAME_LEN
                )));
            }
            if spec.format == ValueFormat::Ascii {
                return Err(ConfigError::InvalidMapping(format!(
                    "signal '{}': ASCII signals must use a byte width",
                    spec.name
                )));
            }
        }
        Width::Bytes(_) => {}
    }

    Ok(())
}

/// Live value shared between the presentation layer and the scheduler
///
/// Cloning the handle shares the same slot. Every read returns a complete
/// snapshot taken under the lock.
#[derive(Debug, Clone, Default)]
pub struct SharedValue {
    inner: Arc<RwLock<LiveValue>>,
}

impl SharedValue {
    pub fn new(value: impl Into<LiveValue>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value.into())),
        }
    }

    /// Consistent copy of the current value
    pub fn get(&self) -> LiveValue {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the current value
    pub fn set(&self, value: impl Into<LiveValue>) {
        let value = value.into();
        match self.inner.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }
}

/// A validated signal definition together with its live value
#[derive(Debug, Clone)]
pub struct Signal {
    spec: SignalSpec,
    value: SharedValue,
}

impl Signal {
    /// Validate `spec` and attach a fresh live value
    pub fn new(spec: SignalSpec, initial: impl Into<LiveValue>) -> Result<Self> {
        Self::with_shared_value(spec, SharedValue::new(initial))
    }

    /// Validate `spec` and attach an existing live value handle
    pub fn with_shared_value(spec: SignalSpec, value: SharedValue) -> Result<Self> {
        spec.validate()?;
        Ok(Self { spec, value })
    }

    pub fn spec(&self) -> &SignalSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn frame_id(&self) -> u32 {
        self.spec.frame_id
    }

    /// Handle the presentation layer keeps to edit the value
    pub fn value_handle(&self) -> SharedValue {
        self.value.clone()
    }

    /// Snapshot of the live value
    pub fn value(&self) -> LiveValue {
        self.value.get()
    }

    /// Encode the current live value into a partial frame payload
    pub fn encode(&self) -> Result<Payload> {
        codec::encode(&self.spec, &self.value.get())
    }

    pub(crate) fn set_cycle_time_ms(&mut self, cycle_time_ms: f64) {
        self.spec.cycle_time_ms = cycle_time_ms;
    }
}
