//! The output sequencer: single consumer draining the shared event queue.

use crate::midi::{MidiSink, RouterError};
use crossbeam::channel::{Receiver, Sender};
use log::{debug, error, info, trace};
use std::thread::{self, JoinHandle};

/// One raw MIDI message with its receive (or emission) timestamp in seconds.
/// Created once by a producer, consumed exactly once by the sequencer.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub bytes: Vec<u8>,
    pub timestamp: f64,
}

impl TimedEvent {
    pub fn new(bytes: Vec<u8>, timestamp: f64) -> Self {
        Self { bytes, timestamp }
    }
}

/// Items on the shared queue. `Shutdown` is enqueued by the engine only after
/// every producer has been joined, so FIFO order guarantees a full drain
/// before the sequencer exits.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueItem {
    Event(TimedEvent),
    Shutdown,
}

/// Spawns the consumer thread. Events are written to the sink strictly in
/// enqueue order; embedded timestamps are never used to reorder. The thread
/// suspends on an empty queue and wakes on the next enqueue.
pub fn start_sequencer(
    rx: Receiver<QueueItem>,
    mut sink: Box<dyn MidiSink>,
    fatal: Sender<RouterError>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        info!("Output sequencer started");
        while let Ok(item) = rx.recv() {
            match item {
                QueueItem::Event(event) => {
                    trace!("sequencer: @{:.6} {:02X?}", event.timestamp, event.bytes);
                    if let Err(e) = sink.send(&event.bytes) {
                        // Output port loss is terminal for the whole engine
                        error!("Output port write failed: {}", e);
                        let _ = fatal.send(e);
                        break;
                    }
                }
                QueueItem::Shutdown => {
                    debug!("sequencer: shutdown sentinel reached, queue drained");
                    break;
                }
            }
        }
        info!("Output sequencer stopped");
    })
}
