//! Frame Composition
//!
//! Merges the partial payloads of all signals sharing a frame identifier.
//! Overlap and cycle-time consistency are checked when a signal joins a
//! frame, so composing is a plain byte-wise OR of disjoint payloads.

use crate::signal::Signal;
use crate::types::{ConfigError, Payload, Result, FRAME_LEN};

/// Frame composer - combines signal payloads into one frame payload
pub struct FrameComposer;

impl FrameComposer {
    /// Encode every signal and OR the results together
    ///
    /// # Arguments
    /// * `frame_id` - Identifier every signal must belong to
    /// * `signals` - Enabled signals of that frame, already checked for overlap
    ///
    /// # Returns
    /// * `Ok(payload)` with all signals placed
    /// * `Err` from the first signal that fails to encode
    pub fn compose(frame_id: u32, signals: &[Signal]) -> Result<Payload> {
        let mut payload = [0u8; FRAME_LEN];

        for signal in signals {
            if signal.frame_id() != frame_id {
                return Err(ConfigError::InvalidMapping(format!(
                    "signal '{}' belongs to frame 0x{:X}, not 0x{:X}",
                    signal.name(),
                    signal.frame_id(),
                    frame_id
                )));
            }

            let partial = signal.encode()?;
            for (out, byte) in payload.iter_mut().zip(partial) {
                *out |= byte;
            }
        }

        Ok(payload)
    }

    /// Check that `candidate` may join the signals already enabled on `frame_id`
    ///
    /// Rejects foreign identifiers, duplicate names, overlapping cells and a
    /// cycle time different from the running one.
    pub fn check_compatible(frame_id: u32, existing: &[Signal], candidate: &Signal) -> Result<()> {
        if candidate.frame_id() != frame_id {
            return Err(ConfigError::InvalidMapping(format!(
                "signal '{}' belongs to frame 0x{:X}, not 0x{:X}",
                candidate.name(),
                candidate.frame_id(),
                frame_id
            )));
        }

        let candidate_cells = candidate.spec().cell_mask();
        let candidate_cycle = candidate.spec().cycle_time_ms;

        for signal in existing {
            if signal.name() == candidate.name() {
                return Err(ConfigError::DuplicateSignal {
                    frame_id,
                    signal: candidate.name().to_string(),
                });
            }

            if signal.spec().cell_mask() & candidate_cells != 0 {
                return Err(ConfigError::MappingConflict {
                    frame_id,
                    signal: candidate.name().to_string(),
                    existing: signal.name().to_string(),
                });
            }

            if signal.spec().cycle_time_ms != candidate_cycle {
                return Err(ConfigError::CycleTimeMismatch {
                    frame_id,
                    running_ms: signal.spec().cycle_time_ms,
                    requested_ms: candidate_cycle,
                });
            }
        }

        Ok(())
    }
}
