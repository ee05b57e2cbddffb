//! Console transport
//!
//! Prints every dispatched frame as one line, candump style:
//! `<time> <channel> <id> [8] <bytes>`.

use can_tx_scheduler::{OutboundTransport, Payload, TransportError};
use chrono::Local;
use std::io::Write;

pub struct ConsoleTransport<W: Write + Send> {
    channel: String,
    out: W,
}

impl<W: Write + Send> ConsoleTransport<W> {
    pub fn new(channel: impl Into<String>, out: W) -> Self {
        Self {
            channel: channel.into(),
            out,
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

/// Format identifier and payload; extended IDs use 8 hex digits
pub fn format_frame(frame_id: u32, is_extended: bool, payload: &Payload) -> String {
    let id = if is_extended {
        format!("{:08X}", frame_id)
    } else {
        format!("{:03X}", frame_id)
    };
    let bytes: Vec<String> = payload.iter().map(|b| format!("{:02X}", b)).collect();
    format!("{} [{}] {}", id, payload.len(), bytes.join(" "))
}

impl<W: Write + Send> OutboundTransport for ConsoleTransport<W> {
    fn send(&mut self, frame_id: u32, is_extended: bool, payload: Payload) -> Result<(), TransportError> {
        writeln!(
            self.out,
            "{} {} {}",
            Local::now().format("%H:%M:%S%.3f"),
            self.channel,
            format_frame(frame_id, is_extended, &payload)
        )?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.out.flush()?;
        Ok(())
    }
}
