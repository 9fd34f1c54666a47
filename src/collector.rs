//! Input collectors: one thread per input port.
//!
//! A collector receives timestamped raw messages from its transport, keeps a
//! running absolute timestamp for the port, intercepts the control-change
//! numbers assigned to tempo/chord/routing, applies the channel mode table
//! and pushes the resulting events onto the shared output queue. Arrival
//! order within the port is preserved end-to-end.

use crate::clock::ClockControl;
use crate::midi::{MidiMessage, MidiSource, RouterError};
use crate::mode::{ChordShape, PortModes};
use crate::sequencer::{QueueItem, TimedEvent};
use crate::tempo::{TapTempo, TempoState};
use crossbeam::channel::Sender;
use log::{debug, error, info, trace};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long a collector blocks on its transport before re-checking the
/// shutdown flag
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Control-change assignments and input filtering, identical for every port.
#[derive(Debug, Clone)]
pub struct ControlMap {
    pub tempo_cc: u8,
    pub chord_cc: Option<u8>,
    pub route_cc: Option<u8>,
    /// When set, a lone tap derives the tempo from the CC value instead:
    /// BPM = offset + value
    pub bpm_offset: Option<u16>,
    pub ignore_program_changes: bool,
    /// Internal clock running; incoming 0xF8 bytes are dropped so two clock
    /// sources never interleave
    pub clock_enabled: bool,
}

/// Handles shared by every collector thread.
#[derive(Clone)]
pub struct CollectorShared {
    pub tempo: Arc<TempoState>,
    pub tap: Arc<Mutex<TapTempo>>,
    pub clock: ClockControl,
    pub queue: Sender<QueueItem>,
    pub running: Arc<AtomicBool>,
    pub fatal: Sender<RouterError>,
    /// Engine start instant; tap timestamps from every port share this base
    pub epoch: Instant,
}

struct Collector {
    source: Box<dyn MidiSource>,
    modes: PortModes,
    controls: ControlMap,
    shared: CollectorShared,
    /// Port-local absolute timestamp, accumulated from transport deltas
    clock_secs: f64,
}

/// Spawns the receive loop for one input port. The collector exclusively
/// owns the port's mode table; no other thread touches it.
pub fn start_collector(
    source: Box<dyn MidiSource>,
    modes: PortModes,
    controls: ControlMap,
    shared: CollectorShared,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut collector = Collector {
            source,
            modes,
            controls,
            shared,
            clock_secs: 0.0,
        };
        collector.run();
    })
}

impl Collector {
    fn run(&mut self) {
        info!("Collector started for '{}'", self.source.port_name());
        while self.shared.running.load(Ordering::SeqCst) {
            match self.source.recv_timeout(POLL_INTERVAL) {
                Ok(Some((bytes, delta))) => {
                    self.clock_secs += delta;
                    self.process(&bytes);
                }
                Ok(None) => continue,
                Err(e) => {
                    if self.shared.running.load(Ordering::SeqCst) {
                        error!("Input '{}' lost: {}", self.source.port_name(), e);
                        let _ = self.shared.fatal.send(e);
                    }
                    break;
                }
            }
        }
        info!("Collector stopped for '{}'", self.source.port_name());
    }

    fn process(&mut self, bytes: &[u8]) {
        trace!(
            "{}: @{:.6} {:02X?}",
            self.source.port_name(),
            self.clock_secs,
            bytes
        );
        let msg = match MidiMessage::parse(bytes) {
            Ok(msg) => msg,
            // Bad data from one port never stops the port, let alone others
            Err(e) => {
                debug!("{}: dropping {}", self.source.port_name(), e);
                return;
            }
        };

        match msg {
            MidiMessage::ControlChange {
                controller, value, ..
            } if controller == self.controls.tempo_cc => {
                // Consumed here; the raw CC is never relayed
                self.handle_tap(value);
            }
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } if Some(controller) == self.controls.chord_cc => {
                let shape = ChordShape::from_cc(value);
                debug!(
                    "{}: channel {} chord -> {:?}",
                    self.source.port_name(),
                    channel,
                    shape
                );
                self.modes.set_chord(channel, shape);
            }
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } if Some(controller) == self.controls.route_cc => {
                let routing = value >> 3;
                debug!(
                    "{}: channel {} routed -> {}",
                    self.source.port_name(),
                    channel,
                    routing
                );
                self.modes.set_routing(channel, routing);
            }
            MidiMessage::ProgramChange { .. } if self.controls.ignore_program_changes => {
                debug!("{}: dropping program change", self.source.port_name());
            }
            MidiMessage::Clock if self.controls.clock_enabled => {
                trace!("{}: dropping incoming clock", self.source.port_name());
            }
            MidiMessage::Start => {
                // Relay the Start and snap the internal clock to it
                self.enqueue(MidiMessage::Start.to_bytes());
                self.shared.clock.resync();
            }
            msg if msg.channel().is_some() => {
                for out in self.modes.transform(msg) {
                    self.enqueue(out.to_bytes());
                }
            }
            // Remaining system messages (SysEx included) pass through as-is
            other => self.enqueue(other.to_bytes()),
        }
    }

    fn handle_tap(&mut self, value: u8) {
        let now = self.shared.epoch.elapsed().as_secs_f64();
        let estimated = match self.shared.tap.lock() {
            Ok(mut tap) => tap.record_tap(now, &self.shared.tempo),
            Err(_) => None,
        };
        if estimated.is_some() {
            self.shared.clock.resync();
            return;
        }
        // No estimate from the window; fall back to the CC value when an
        // offset is configured
        if let Some(offset) = self.controls.bpm_offset {
            let bpm = f64::from(offset) + f64::from(value);
            match self.shared.tempo.set_bpm(bpm) {
                Ok(bpm) => {
                    info!("Tempo from CC value: {:.1} BPM", bpm);
                    self.shared.clock.resync();
                }
                Err(e) => debug!("CC tempo rejected: {}", e),
            }
        }
    }

    fn enqueue(&self, bytes: Vec<u8>) {
        let event = TimedEvent::new(bytes, self.clock_secs);
        if self.shared.queue.send(QueueItem::Event(event)).is_err() {
            debug!("{}: event queue closed", self.source.port_name());
        }
    }
}
