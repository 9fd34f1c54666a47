//! The engine controller: wires queues and threads together and owns the
//! lifecycle of collectors, clock generator and output sequencer.

use crate::clock::{ClockControl, ClockGenerator};
use crate::collector::{start_collector, CollectorShared, ControlMap};
use crate::midi::{MidiSink, MidiSource, Result, RouterError};
use crate::mode::PortModes;
use crate::sequencer::{start_sequencer, QueueItem};
use crate::tempo::{TapTempo, TempoState};
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

/// Runtime parameters for the dispatch engine, distilled from the settings
/// file at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub initial_bpm: f64,
    pub clock_enabled: bool,
    pub tempo_cc: u8,
    pub chord_cc: Option<u8>,
    pub route_cc: Option<u8>,
    pub bpm_offset: Option<u16>,
    pub ignore_program_changes: bool,
    pub tap_min_bpm: f64,
    pub tap_max_bpm: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_bpm: 142.0,
            clock_enabled: true,
            tempo_cc: 10,
            chord_cc: Some(11),
            route_cc: Some(12),
            bpm_offset: None,
            ignore_program_changes: true,
            tap_min_bpm: 80.0,
            tap_max_bpm: 200.0,
        }
    }
}

/// One configured input: its transport and its channel mode table.
pub struct EngineInput {
    pub source: Box<dyn MidiSource>,
    pub modes: PortModes,
}

/// The running dispatch engine.
pub struct Engine {
    tempo: Arc<TempoState>,
    tap: Arc<Mutex<TapTempo>>,
    clock_control: ClockControl,
    running: Arc<AtomicBool>,
    epoch: Instant,
    collectors: Vec<JoinHandle<()>>,
    clock: Option<ClockGenerator>,
    sequencer: Option<JoinHandle<()>>,
    queue_tx: Sender<QueueItem>,
    fatal_rx: Receiver<RouterError>,
}

impl Engine {
    /// Wires the queue and spawns one collector per input, the clock
    /// generator (when enabled) and the output sequencer.
    pub fn start(config: &EngineConfig, inputs: Vec<EngineInput>, sink: Box<dyn MidiSink>) -> Self {
        let epoch = Instant::now();
        let tempo = Arc::new(TempoState::new(config.initial_bpm));
        let tap = Arc::new(Mutex::new(TapTempo::new(
            config.tap_min_bpm,
            config.tap_max_bpm,
        )));
        let running = Arc::new(AtomicBool::new(true));
        let (queue_tx, queue_rx) = unbounded();
        let (fatal_tx, fatal_rx) = unbounded();

        let sequencer = start_sequencer(queue_rx, sink, fatal_tx.clone());

        let clock = if config.clock_enabled {
            Some(ClockGenerator::start(
                tempo.clone(),
                queue_tx.clone(),
                epoch,
            ))
        } else {
            None
        };
        let clock_control = clock
            .as_ref()
            .map(|c| c.control())
            .unwrap_or_else(ClockControl::disabled);

        let controls = ControlMap {
            tempo_cc: config.tempo_cc,
            chord_cc: config.chord_cc,
            route_cc: config.route_cc,
            bpm_offset: config.bpm_offset,
            ignore_program_changes: config.ignore_program_changes,
            clock_enabled: config.clock_enabled,
        };

        let collectors = inputs
            .into_iter()
            .map(|input| {
                let shared = CollectorShared {
                    tempo: tempo.clone(),
                    tap: tap.clone(),
                    clock: clock_control.clone(),
                    queue: queue_tx.clone(),
                    running: running.clone(),
                    fatal: fatal_tx.clone(),
                    epoch,
                };
                start_collector(input.source, input.modes, controls.clone(), shared)
            })
            .collect();

        info!(
            "Engine started: {:.1} BPM, clock {}",
            tempo.bpm(),
            if config.clock_enabled { "on" } else { "off" }
        );

        Self {
            tempo,
            tap,
            clock_control,
            running,
            epoch,
            collectors,
            clock,
            sequencer: Some(sequencer),
            queue_tx,
            fatal_rx,
        }
    }

    pub fn tempo(&self) -> Arc<TempoState> {
        self.tempo.clone()
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// External control surface: set the tempo directly.
    pub fn set_tempo(&self, bpm: f64) -> Result<f64> {
        let accepted = self.tempo.set_bpm(bpm)?;
        self.clock_control.resync();
        Ok(accepted)
    }

    /// External control surface: record a tap at the current instant.
    pub fn record_tap(&self) -> Option<f64> {
        let now = self.epoch.elapsed().as_secs_f64();
        let estimated = match self.tap.lock() {
            Ok(mut tap) => tap.record_tap(now, &self.tempo),
            Err(_) => None,
        };
        if estimated.is_some() {
            self.clock_control.resync();
        }
        estimated
    }

    /// Returns a fatal error reported by any component, if one occurred.
    pub fn poll_fatal(&self) -> Option<RouterError> {
        self.fatal_rx.try_recv().ok()
    }

    /// Ordered shutdown: collectors first, then the clock (no final pulse),
    /// then the sequencer after draining everything already queued. All
    /// threads are joined before the transports are dropped.
    pub fn stop(mut self) {
        info!("Engine stopping");
        self.running.store(false, Ordering::SeqCst);
        for handle in self.collectors.drain(..) {
            let _ = handle.join();
        }
        if let Some(clock) = self.clock.take() {
            clock.stop();
        }
        // Every producer is gone; the sentinel lands behind any queued events
        let _ = self.queue_tx.send(QueueItem::Shutdown);
        if let Some(sequencer) = self.sequencer.take() {
            let _ = sequencer.join();
        }
        info!("Engine stopped");
    }
}
