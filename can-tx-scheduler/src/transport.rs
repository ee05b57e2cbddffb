//! Outbound transport interface
//!
//! The scheduler hands every composed frame to an [`OutboundTransport`].
//! Bus drivers live outside this crate; [`RecordingTransport`] keeps frames in
//! memory for dry runs and tests.

use crate::types::{Payload, TransportError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Destination for composed frames
///
/// Only the scheduler calls into a transport, one frame at a time.
pub trait OutboundTransport: Send {
    /// Send one classic CAN frame
    fn send(&mut self, frame_id: u32, is_extended: bool, payload: Payload) -> Result<(), TransportError>;

    /// Release the connection; called once, after every timer is cancelled
    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

impl<T: OutboundTransport + ?Sized> OutboundTransport for Box<T> {
    fn send(&mut self, frame_id: u32, is_extended: bool, payload: Payload) -> Result<(), TransportError> {
        (**self).send(frame_id, is_extended, payload)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }
}

/// A frame accepted by a [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub frame_id: u32,
    pub is_extended: bool,
    pub payload: Payload,
}

/// In-memory transport
///
/// Clones share the same log, so a caller can keep a copy to inspect what
/// the scheduler sent. It can be switched into a failing mode to simulate a
/// disconnected bus.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    frames: Arc<Mutex<Vec<SentFrame>>>,
    failing: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail with [`TransportError::Disconnected`]
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Whether [`OutboundTransport::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Snapshot of every frame sent so far
    pub fn frames(&self) -> Vec<SentFrame> {
        match self.frames.lock() {
            Ok(frames) => frames.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Frames sent for one identifier
    pub fn frames_for(&self, frame_id: u32) -> Vec<SentFrame> {
        self.frames()
            .into_iter()
            .filter(|frame| frame.frame_id == frame_id)
            .collect()
    }
}

impl OutboundTransport for RecordingTransport {
    fn send(&mut self, frame_id: u32, is_extended: bool, payload: Payload) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) || self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }

        let frame = SentFrame {
            frame_id,
            is_extended,
            payload,
        };
        match self.frames.lock() {
            Ok(mut frames) => frames.push(frame),
            Err(poisoned) => poisoned.into_inner().push(frame),
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
