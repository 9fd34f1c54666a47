//! Mock transports for exercising the engine without hardware ports.

use super::{MidiSink, MidiSource, Result, RouterError};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays a fixed script of `(bytes, delta_seconds)` events, then reports
/// timeouts forever, like a silent hardware port.
pub struct ScriptedSource {
    events: VecDeque<(Vec<u8>, f64)>,
    name: String,
}

impl ScriptedSource {
    pub fn new(name: &str, events: Vec<(Vec<u8>, f64)>) -> Self {
        Self {
            events: events.into(),
            name: name.to_string(),
        }
    }
}

impl MidiSource for ScriptedSource {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<(Vec<u8>, f64)>> {
        match self.events.pop_front() {
            Some(event) => Ok(Some(event)),
            None => {
                // Script exhausted: behave like a silent port
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}

/// A source fed live from a test through a channel sender, mirroring how the
/// midir callback feeds [`MidirSource`](super::MidirSource).
pub struct ChannelSource {
    rx: Receiver<(Vec<u8>, f64)>,
    name: String,
}

impl ChannelSource {
    /// Returns the feeding sender and the source. Dropping the sender makes
    /// the source report `TransportUnavailable`, like an unplugged device.
    pub fn pair(name: &str) -> (Sender<(Vec<u8>, f64)>, Self) {
        let (tx, rx) = unbounded();
        (
            tx,
            Self {
                rx,
                name: name.to_string(),
            },
        )
    }
}

impl MidiSource for ChannelSource {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<(Vec<u8>, f64)>> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(RouterError::TransportUnavailable(
                format!("input '{}' disconnected", self.name),
            )),
        }
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}

/// Records everything sent to it; tests assert on the captured bytes.
pub struct CapturingSink {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    fail_after: Option<usize>,
    delay: Option<Duration>,
}

impl CapturingSink {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            fail_after: None,
            delay: None,
        }
    }

    /// Makes `send` fail once `n` messages have been captured, to simulate a
    /// port that disappears mid-run.
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::new()
        }
    }

    /// Makes every `send` take `delay`, so tests can pile up a queue backlog.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    /// Shared handle to the captured messages.
    pub fn captured(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        self.sent.clone()
    }
}

impl Default for CapturingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiSink for CapturingSink {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| RouterError::ChannelClosed)?;
        if let Some(limit) = self.fail_after {
            if sent.len() >= limit {
                return Err(RouterError::TransportUnavailable(
                    "mock output gone".to_string(),
                ));
            }
        }
        sent.push(bytes.to_vec());
        Ok(())
    }
}
