//! Scheduler service thread
//!
//! Runs a [`TransmissionScheduler`] on a dedicated thread. Commands from the
//! presentation layer and timer ticks are handled by one loop, so updates to a
//! registration never race with its dispatch and only this thread ever
//! touches the transport.

use crate::clock::{Clock, MonotonicClock};
use crate::scheduler::{FrameStatus, TransmissionScheduler};
use crate::signal::Signal;
use crate::transport::OutboundTransport;
use crate::types::{ConfigError, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};

/// Requests handled by the service loop
enum Command {
    Enable {
        signal: Signal,
        reply: Sender<Result<()>>,
    },
    Disable {
        frame_id: u32,
        name: String,
        reply: Sender<Result<Signal>>,
    },
    UpdateCycleTime {
        frame_id: u32,
        cycle_time_ms: f64,
        reply: Sender<Result<()>>,
    },
    Status {
        reply: Sender<Vec<FrameStatus>>,
    },
    Shutdown,
}

/// Owner handle of a running scheduler thread
///
/// Dropping the handle shuts the scheduler down and joins the thread.
pub struct SchedulerHandle {
    commands: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Start a scheduler on real time
    pub fn spawn<T>(transport: T) -> std::io::Result<Self>
    where
        T: OutboundTransport + 'static,
    {
        Self::spawn_with_clock(transport, MonotonicClock::new())
    }

    /// Start a scheduler driven by `clock`
    pub fn spawn_with_clock<T, C>(transport: T, clock: C) -> std::io::Result<Self>
    where
        T: OutboundTransport + 'static,
        C: Clock + 'static,
    {
        let (commands, inbox) = unbounded();
        let worker = thread::Builder::new()
            .name("can-tx-scheduler".to_string())
            .spawn(move || {
                let scheduler = TransmissionScheduler::with_clock(transport, clock);
                run_loop(scheduler, inbox);
            })?;

        log::debug!("Scheduler thread started");
        Ok(Self {
            commands,
            worker: Some(worker),
        })
    }

    /// See [`TransmissionScheduler::enable`]
    pub fn enable(&self, signal: Signal) -> Result<()> {
        self.request(|reply| Command::Enable { signal, reply })?
    }

    /// See [`TransmissionScheduler::disable`]
    pub fn disable(&self, frame_id: u32, name: &str) -> Result<Signal> {
        let name = name.to_string();
        self.request(|reply| Command::Disable { frame_id, name, reply })?
    }

    /// See [`TransmissionScheduler::update_cycle_time`]
    pub fn update_cycle_time(&self, frame_id: u32, cycle_time_ms: f64) -> Result<()> {
        self.request(|reply| Command::UpdateCycleTime {
            frame_id,
            cycle_time_ms,
            reply,
        })?
    }

    /// Snapshots of every active frame
    pub fn statuses(&self) -> Result<Vec<FrameStatus>> {
        self.request(|reply| Command::Status { reply })
    }

    /// Cancel all timers, release the transport and join the thread
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn request<R>(&self, build: impl FnOnce(Sender<R>) -> Command) -> Result<R> {
        let (reply, response) = bounded(1);
        self.commands
            .send(build(reply))
            .map_err(|_| ConfigError::SchedulerStopped)?;
        response.recv().map_err(|_| ConfigError::SchedulerStopped)
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        // A send error means the loop already exited
        let _ = self.commands.send(Command::Shutdown);
        if worker.join().is_err() {
            log::error!("Scheduler thread panicked");
        }
        log::debug!("Scheduler thread stopped");
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Service loop: fire due ticks, then wait for a command or the next deadline
fn run_loop<T: OutboundTransport, C: Clock>(mut scheduler: TransmissionScheduler<T, C>, inbox: Receiver<Command>) {
    loop {
        scheduler.poll();

        let command = match scheduler.time_until_next_tick() {
            Some(wait) => match inbox.recv_timeout(wait) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match inbox.recv() {
                Ok(command) => command,
                Err(_) => break,
            },
        };

        match command {
            Command::Enable { signal, reply } => {
                let _ = reply.send(scheduler.enable(signal));
            }
            Command::Disable { frame_id, name, reply } => {
                let _ = reply.send(scheduler.disable(frame_id, &name));
            }
            Command::UpdateCycleTime {
                frame_id,
                cycle_time_ms,
                reply,
            } => {
                let _ = reply.send(scheduler.update_cycle_time(frame_id, cycle_time_ms));
            }
            Command::Status { reply } => {
                let _ = reply.send(scheduler.statuses());
            }
            Command::Shutdown => break,
        }
    }

    scheduler.shutdown();
}
