//! CAN Transmit Scheduler Library
//!
//! Packs operator-defined signals into classic CAN frames and transmits each
//! frame cyclically. Several independently configured signals may share one
//! frame identifier.
//!
//! # Architecture
//!
//! - [`SignalSpec`] describes where a signal lives in the 8-byte payload
//! - [`codec`] encodes a live value into a partial payload (and back)
//! - [`FrameComposer`] ORs the partial payloads of disjoint signals
//! - [`TransmissionScheduler`] runs one timer per active frame identifier
//!   and dispatches frames to an [`OutboundTransport`]
//! - [`SchedulerHandle`] runs the scheduler on its own thread
//!
//! The library does NOT:
//! - Drive CAN hardware (transports are supplied by the caller)
//! - Receive or decode frames from a live bus
//! - Persist signal definitions
//!
//! # Example Usage
//!
//! ```no_run
//! use can_tx_scheduler::{RecordingTransport, SchedulerHandle, Signal, SignalSpec, Width};
//!
//! let transport = RecordingTransport::new();
//! let scheduler = SchedulerHandle::spawn(transport.clone()).unwrap();
//!
//! let spec = SignalSpec::new("Speed", 0x08, Width::Bytes(1), vec![0]).with_cycle_time_ms(50.0);
//! let signal = Signal::new(spec, 0x11 as f64).unwrap();
//! let speed = signal.value_handle();
//! scheduler.enable(signal).unwrap();
//!
//! // The next tick picks up the new value
//! speed.set(0x12 as f64);
//!
//! scheduler.disable(0x08, "Speed").unwrap();
//! scheduler.shutdown();
//! ```

// Public modules
pub mod clock;
pub mod codec;
pub mod composer;
pub mod config;
pub mod scheduler;
pub mod service;
pub mod signal;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use clock::{Clock, MonotonicClock, SimulatedClock};
pub use codec::{decode, decode_raw, encode};
pub use composer::FrameComposer;
pub use config::SignalConfig;
pub use scheduler::{FrameRegistration, FrameStatus, TransmissionScheduler};
pub use service::SchedulerHandle;
pub use signal::{validate, SharedValue, Signal, SignalSpec};
pub use transport::{OutboundTransport, RecordingTransport, SentFrame};
pub use types::{
    is_extended_id, is_valid_cycle_time, parse_can_id, ConfigError, LiveValue, Payload, Result,
    Signedness, TransportError, ValueFormat, Width, FRAME_LEN, MAX_CYCLE_TIME_MS, MAX_EXTENDED_ID,
    MAX_STANDARD_ID,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
