//! Cyclic transmission scheduler
//!
//! Keeps one [`FrameRegistration`] per active frame identifier. Each
//! registration owns a tick timer; [`TransmissionScheduler::poll`] fires every
//! timer that is due, recomposes the frame from the live signal values and
//! hands it to the transport.
//!
//! The scheduler itself is single-threaded and never sleeps. A caller either
//! polls it from its own event loop or runs it through
//! [`crate::service::SchedulerHandle`].

use crate::clock::{Clock, MonotonicClock};
use crate::composer::FrameComposer;
use crate::signal::Signal;
use crate::transport::OutboundTransport;
use crate::types::{is_extended_id, is_valid_cycle_time, ConfigError, Payload, Result};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::time::Duration;

/// Overdue ticks fired back-to-back before the timer skips ahead
const MAX_CATCH_UP_TICKS: u32 = 16;

/// Pending tick of one registration
#[derive(Debug, Clone, Copy)]
struct TickTimer {
    period: Duration,
    next_due: Duration,
}

impl TickTimer {
    /// First tick fires immediately
    fn start(now: Duration, period: Duration) -> Self {
        Self {
            period,
            next_due: now,
        }
    }

    fn is_due(&self, now: Duration) -> bool {
        self.next_due <= now
    }

    /// Cancel the pending tick and schedule a fresh one a full period out
    fn reschedule(&mut self, now: Duration, period: Duration) {
        self.period = period;
        self.next_due = now.saturating_add(period);
    }

    /// Move to the next deadline after a tick fired
    ///
    /// Returns how many ticks were dropped because the timer fell too far
    /// behind `now`.
    fn advance(&mut self, now: Duration) -> u64 {
        self.next_due = self.next_due.saturating_add(self.period);

        let backlog = now.saturating_sub(self.next_due);
        if backlog > self.period.saturating_mul(MAX_CATCH_UP_TICKS) {
            let period_nanos = self.period.as_nanos().max(1);
            let dropped = backlog.as_nanos() / period_nanos;
            let skip = dropped.saturating_mul(period_nanos);
            // `skip` never exceeds `backlog`, which already fits a Duration
            let skip = Duration::new(
                (skip / 1_000_000_000) as u64,
                (skip % 1_000_000_000) as u32,
            );
            self.next_due = self.next_due.saturating_add(skip);
            return u64::try_from(dropped).unwrap_or(u64::MAX);
        }

        0
    }
}

/// Convert a cycle time in milliseconds to a timer period
fn cycle_period(cycle_time_ms: f64) -> Result<Duration> {
    if !is_valid_cycle_time(cycle_time_ms) {
        return Err(ConfigError::InvalidCycleTime(cycle_time_ms));
    }
    let period = Duration::try_from_secs_f64(cycle_time_ms / 1000.0)
        .map_err(|_| ConfigError::InvalidCycleTime(cycle_time_ms))?;
    // Sub-microsecond periods would let a late poll spin
    Ok(period.max(Duration::from_micros(1)))
}

/// Runtime state of one active frame identifier
#[derive(Debug)]
pub struct FrameRegistration {
    frame_id: u32,
    is_extended: bool,
    cycle_time_ms: f64,
    signals: Vec<Signal>,
    timer: TickTimer,
    frames_sent: u64,
    send_failures: u64,
    skipped_ticks: u64,
    dropped_ticks: u64,
    last_payload: Option<Payload>,
}

impl FrameRegistration {
    fn new(signal: Signal, now: Duration) -> Result<Self> {
        let cycle_time_ms = signal.spec().cycle_time_ms;
        let period = cycle_period(cycle_time_ms)?;
        let frame_id = signal.frame_id();

        Ok(Self {
            frame_id,
            is_extended: is_extended_id(frame_id),
            cycle_time_ms,
            signals: vec![signal],
            timer: TickTimer::start(now, period),
            frames_sent: 0,
            send_failures: 0,
            skipped_ticks: 0,
            dropped_ticks: 0,
            last_payload: None,
        })
    }

    pub fn frame_id(&self) -> u32 {
        self.frame_id
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    /// Read-only snapshot for callers outside the scheduler
    pub fn status(&self) -> FrameStatus {
        FrameStatus {
            frame_id: self.frame_id,
            is_extended: self.is_extended,
            cycle_time_ms: self.cycle_time_ms,
            signals: self.signals.iter().map(|s| s.name().to_string()).collect(),
            frames_sent: self.frames_sent,
            send_failures: self.send_failures,
            skipped_ticks: self.skipped_ticks,
            dropped_ticks: self.dropped_ticks,
            last_payload: self.last_payload,
            next_due: self.timer.next_due,
        }
    }
}

/// Snapshot of a frame registration
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStatus {
    /// CAN identifier
    pub frame_id: u32,
    /// True for 29-bit identifiers
    pub is_extended: bool,
    /// Running period in milliseconds
    pub cycle_time_ms: f64,
    /// Names of the enabled signals, in enable order
    pub signals: Vec<String>,
    /// Frames accepted by the transport
    pub frames_sent: u64,
    /// Frames the transport rejected
    pub send_failures: u64,
    /// Ticks not dispatched because a live value failed to encode
    pub skipped_ticks: u64,
    /// Ticks dropped because the scheduler was polled too late
    pub dropped_ticks: u64,
    /// Last payload handed to the transport successfully
    pub last_payload: Option<Payload>,
    /// Deadline of the pending tick, on the scheduler clock
    pub next_due: Duration,
}

/// Per-identifier cyclic frame scheduler
pub struct TransmissionScheduler<T: OutboundTransport, C: Clock = MonotonicClock> {
    /// Released (set to `None`) only by shutdown
    transport: Option<T>,
    clock: C,
    registrations: BTreeMap<u32, FrameRegistration>,
}

impl<T: OutboundTransport> TransmissionScheduler<T, MonotonicClock> {
    /// Create a scheduler driven by real time
    pub fn new(transport: T) -> Self {
        Self::with_clock(transport, MonotonicClock::new())
    }
}

impl<T: OutboundTransport, C: Clock> TransmissionScheduler<T, C> {
    /// Create a scheduler driven by `clock`
    ///
    /// The transport must already be connected; it is released by
    /// [`TransmissionScheduler::shutdown`].
    pub fn with_clock(transport: T, clock: C) -> Self {
        Self {
            transport: Some(transport),
            clock,
            registrations: BTreeMap::new(),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Enable a signal on its frame
    ///
    /// The first signal of a frame creates its registration and the first
    /// tick is due immediately. Later signals join the running registration
    /// if they neither overlap nor change its cycle time. A value that cannot
    /// be encoded right now rejects the enable.
    pub fn enable(&mut self, signal: Signal) -> Result<()> {
        if self.transport.is_none() {
            return Err(ConfigError::SchedulerStopped);
        }

        signal.spec().validate()?;
        let frame_id = signal.frame_id();
        let now = self.clock.now();

        match self.registrations.entry(frame_id) {
            Entry::Occupied(mut entry) => {
                let registration = entry.get_mut();
                FrameComposer::check_compatible(frame_id, &registration.signals, &signal)?;
                signal.encode()?;

                log::info!(
                    "Signal '{}' joined frame 0x{:X} ({} signals)",
                    signal.name(),
                    frame_id,
                    registration.signals.len() + 1
                );
                registration.signals.push(signal);
            }
            Entry::Vacant(entry) => {
                signal.encode()?;
                let registration = FrameRegistration::new(signal, now)?;

                log::info!(
                    "Frame 0x{:X} active: {} ms cycle, {} frame",
                    frame_id,
                    registration.cycle_time_ms,
                    if registration.is_extended { "extended" } else { "standard" }
                );
                entry.insert(registration);
            }
        }

        Ok(())
    }

    /// Disable one signal; the last signal of a frame stops its timer
    ///
    /// Returns the removed signal so the caller can re-enable it later.
    pub fn disable(&mut self, frame_id: u32, name: &str) -> Result<Signal> {
        let registration = self
            .registrations
            .get_mut(&frame_id)
            .ok_or(ConfigError::NotRegistered(frame_id))?;

        let index = registration
            .signals
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| ConfigError::SignalNotFound {
                frame_id,
                signal: name.to_string(),
            })?;

        let signal = registration.signals.remove(index);
        log::info!("Signal '{}' left frame 0x{:X}", name, frame_id);

        if registration.signals.is_empty() {
            if let Some(stopped) = self.registrations.remove(&frame_id) {
                log::info!(
                    "Frame 0x{:X} inactive after {} frames",
                    frame_id,
                    stopped.frames_sent
                );
            }
        }

        Ok(signal)
    }

    /// Change the period of a running frame
    ///
    /// The pending tick is cancelled and the next one is due one new period
    /// from now.
    pub fn update_cycle_time(&mut self, frame_id: u32, cycle_time_ms: f64) -> Result<()> {
        let period = cycle_period(cycle_time_ms)?;
        let now = self.clock.now();

        let registration = self
            .registrations
            .get_mut(&frame_id)
            .ok_or(ConfigError::NotRegistered(frame_id))?;

        log::info!(
            "Frame 0x{:X} cycle time {} ms -> {} ms",
            frame_id,
            registration.cycle_time_ms,
            cycle_time_ms
        );

        registration.cycle_time_ms = cycle_time_ms;
        for signal in &mut registration.signals {
            signal.set_cycle_time_ms(cycle_time_ms);
        }
        registration.timer.reschedule(now, period);

        Ok(())
    }

    /// Fire every tick that is due at the current clock time
    ///
    /// Ticks fire in deadline order (ties by identifier). Returns the number
    /// of ticks fired.
    pub fn poll(&mut self) -> usize {
        let now = self.clock.now();
        let mut fired = 0;

        while let Some(frame_id) = self.next_due(now) {
            self.fire(frame_id, now);
            fired += 1;
        }

        fired
    }

    fn next_due(&self, now: Duration) -> Option<u32> {
        self.registrations
            .values()
            .filter(|r| r.timer.is_due(now))
            .min_by_key(|r| (r.timer.next_due, r.frame_id))
            .map(|r| r.frame_id)
    }

    /// Compose and dispatch one frame, then advance its timer
    fn fire(&mut self, frame_id: u32, now: Duration) {
        let Some(registration) = self.registrations.get_mut(&frame_id) else {
            return;
        };

        match FrameComposer::compose(frame_id, &registration.signals) {
            Ok(payload) => match self.transport.as_mut() {
                Some(transport) => match transport.send(frame_id, registration.is_extended, payload) {
                    Ok(()) => {
                        registration.frames_sent += 1;
                        registration.last_payload = Some(payload);
                        log::trace!("Frame 0x{:X} sent: {:02X?}", frame_id, payload);
                    }
                    Err(e) => {
                        registration.send_failures += 1;
                        log::error!("Failed to send frame 0x{:X}: {}", frame_id, e);
                    }
                },
                None => log::warn!("Frame 0x{:X} tick without transport", frame_id),
            },
            Err(e) => {
                registration.skipped_ticks += 1;
                log::warn!("Skipping tick of frame 0x{:X}: {}", frame_id, e);
            }
        }

        let dropped = registration.timer.advance(now);
        if dropped > 0 {
            registration.dropped_ticks += dropped;
            log::warn!("Frame 0x{:X} fell behind, dropped {} ticks", frame_id, dropped);
        }
    }

    /// Earliest pending deadline on the scheduler clock
    pub fn next_deadline(&self) -> Option<Duration> {
        self.registrations.values().map(|r| r.timer.next_due).min()
    }

    /// Time left until the earliest pending tick, zero if already due
    pub fn time_until_next_tick(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.next_deadline().map(|deadline| deadline.saturating_sub(now))
    }

    pub fn is_active(&self, frame_id: u32) -> bool {
        self.registrations.contains_key(&frame_id)
    }

    /// Identifiers with a running timer, ascending
    pub fn active_frames(&self) -> Vec<u32> {
        self.registrations.keys().copied().collect()
    }

    pub fn registration(&self, frame_id: u32) -> Option<&FrameRegistration> {
        self.registrations.get(&frame_id)
    }

    pub fn status(&self, frame_id: u32) -> Option<FrameStatus> {
        self.registrations.get(&frame_id).map(FrameRegistration::status)
    }

    pub fn statuses(&self) -> Vec<FrameStatus> {
        self.registrations.values().map(FrameRegistration::status).collect()
    }

    /// Cancel every timer, then release the transport
    ///
    /// Further enables fail with [`ConfigError::SchedulerStopped`]. Calling it
    /// twice is harmless.
    pub fn shutdown(&mut self) {
        let Some(mut transport) = self.transport.take() else {
            return;
        };

        let cancelled = self.registrations.len();
        self.registrations.clear();
        log::info!("Scheduler shutting down, cancelled {} frame timers", cancelled);

        if let Err(e) = transport.close() {
            log::error!("Failed to close transport: {}", e);
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.transport.is_none()
    }
}

impl<T: OutboundTransport, C: Clock> Drop for TransmissionScheduler<T, C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
