//! The master clock generator.
//!
//! Runs on its own thread and enqueues a single-byte MIDI Clock pulse (0xF8)
//! every `TempoState::pulse_interval`. The interval is re-read each iteration
//! so tempo changes take effect on the next pulse without disturbing an
//! in-flight wait.

use crate::sequencer::{QueueItem, TimedEvent};
use crate::tempo::TempoState;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, trace, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// MIDI real-time Clock status byte
pub const CLOCK_BYTE: u8 = 0xF8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockCommand {
    /// Emit a pulse immediately and restart the interval from now. Sent on
    /// tempo changes and on an incoming Start message.
    Resync,
    /// Exit without emitting a final pulse.
    Stop,
}

/// Cloneable handle for nudging the clock from collectors and the engine.
/// All methods are no-ops once the clock is gone, and when the clock was
/// never started (clock disabled in configuration).
#[derive(Debug, Clone)]
pub struct ClockControl {
    ctrl: Option<Sender<ClockCommand>>,
}

impl ClockControl {
    pub fn disabled() -> Self {
        Self { ctrl: None }
    }

    pub fn resync(&self) {
        if let Some(ctrl) = &self.ctrl {
            let _ = ctrl.try_send(ClockCommand::Resync);
        }
    }

    fn stop(&self) {
        if let Some(ctrl) = &self.ctrl {
            let _ = ctrl.send(ClockCommand::Stop);
        }
    }
}

/// The running clock generator thread and its control endpoint.
pub struct ClockGenerator {
    control: ClockControl,
    thread_handle: Option<JoinHandle<()>>,
}

impl ClockGenerator {
    /// Spawns the pulse thread. `epoch` anchors pulse timestamps to the same
    /// timebase the rest of the engine uses.
    pub fn start(tempo: Arc<TempoState>, queue: Sender<QueueItem>, epoch: Instant) -> Self {
        let (ctrl_tx, ctrl_rx) = bounded(16);
        let handle = thread::spawn(move || run_clock(tempo, queue, ctrl_rx, epoch));
        Self {
            control: ClockControl {
                ctrl: Some(ctrl_tx),
            },
            thread_handle: Some(handle),
        }
    }

    pub fn control(&self) -> ClockControl {
        self.control.clone()
    }

    /// Signals the thread to exit and joins it. No final pulse is emitted.
    pub fn stop(mut self) {
        self.control.stop();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

fn emit_pulse(queue: &Sender<QueueItem>, epoch: Instant) -> bool {
    let timestamp = epoch.elapsed().as_secs_f64();
    trace!("clock pulse at {:.6}", timestamp);
    queue
        .send(QueueItem::Event(TimedEvent::new(
            vec![CLOCK_BYTE],
            timestamp,
        )))
        .is_ok()
}

/// Number of catch-up pulses owed after a wait that took `elapsed` instead of
/// `interval`. Scheduling jitter within one interval is tolerated; an overrun
/// past a full extra interval earns exactly one catch-up pulse so a stall
/// never compounds into a burst.
fn catch_up_pulses(elapsed: Duration, interval: Duration) -> u32 {
    if !interval.is_zero() && elapsed >= interval * 2 {
        1
    } else {
        0
    }
}

fn run_clock(
    tempo: Arc<TempoState>,
    queue: Sender<QueueItem>,
    ctrl: Receiver<ClockCommand>,
    epoch: Instant,
) {
    info!("Clock generator started at {:.1} BPM", tempo.bpm());
    loop {
        // Fresh interval every iteration; tempo changes apply on the next
        // pulse, never mid-wait
        let interval = tempo.pulse_interval();
        let wait_start = Instant::now();
        match ctrl.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                if !emit_pulse(&queue, epoch) {
                    warn!("clock: event queue closed, stopping");
                    break;
                }
                let elapsed = wait_start.elapsed();
                for _ in 0..catch_up_pulses(elapsed, interval) {
                    debug!(
                        "clock overran by {:.3}ms, emitting catch-up pulse",
                        (elapsed - interval).as_secs_f64() * 1000.0
                    );
                    if !emit_pulse(&queue, epoch) {
                        return;
                    }
                }
            }
            Ok(ClockCommand::Resync) => {
                debug!("clock resync");
                if !emit_pulse(&queue, epoch) {
                    break;
                }
            }
            Ok(ClockCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    info!("Clock generator stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_within_one_interval_earns_no_catch_up() {
        let interval = Duration::from_millis(20);
        assert_eq!(catch_up_pulses(Duration::from_millis(20), interval), 0);
        assert_eq!(catch_up_pulses(Duration::from_millis(39), interval), 0);
    }

    #[test]
    fn overrun_earns_exactly_one_catch_up() {
        let interval = Duration::from_millis(20);
        assert_eq!(catch_up_pulses(Duration::from_millis(40), interval), 1);
        // A pathological stall still earns only one, never a burst
        assert_eq!(catch_up_pulses(Duration::from_millis(500), interval), 1);
    }

    #[test]
    fn zero_interval_is_ignored() {
        assert_eq!(catch_up_pulses(Duration::from_millis(5), Duration::ZERO), 0);
    }
}
