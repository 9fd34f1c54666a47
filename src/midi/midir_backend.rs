use super::{MidiSink, MidiSource, Result, RouterError};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError};
use log::{debug, info};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use std::time::Duration;

const CLIENT_NAME: &str = "midimux";

/// Real input port backed by midir. The driver callback pushes timestamped
/// raw messages into a channel; `recv_timeout` pops them.
pub struct MidirSource {
    // Held to keep the connection alive; closed on drop
    _connection: MidiInputConnection<()>,
    rx: Receiver<(Vec<u8>, f64)>,
    name: String,
}

impl MidirSource {
    /// Opens the first input port whose name contains `port_match`.
    pub fn connect(port_match: &str) -> Result<Self> {
        let mut midi_in = MidiInput::new(CLIENT_NAME)
            .map_err(|e| RouterError::TransportUnavailable(format!("{}", e)))?;
        // Clock, sysex and active sensing all flow through the router
        midi_in.ignore(Ignore::None);

        let in_ports = midi_in.ports();
        let in_port = in_ports
            .iter()
            .find(|p| midi_in.port_name(p).unwrap_or_default().contains(port_match))
            .ok_or_else(|| {
                RouterError::TransportUnavailable(format!(
                    "input port '{}' not found",
                    port_match
                ))
            })?;
        let name = midi_in.port_name(in_port).unwrap_or_default();
        info!("Opening input port: {}", name);

        let (tx, rx) = unbounded();
        // midir stamps are microseconds on an arbitrary monotonic base; the
        // engine only consumes deltas, so track the previous stamp here.
        let mut last_stamp: Option<u64> = None;
        let connection = midi_in
            .connect(
                in_port,
                "midimux-input",
                move |stamp, message, _| {
                    let delta = match last_stamp {
                        Some(prev) => (stamp.saturating_sub(prev)) as f64 / 1_000_000.0,
                        None => 0.0,
                    };
                    last_stamp = Some(stamp);
                    if tx.send((message.to_vec(), delta)).is_err() {
                        debug!("input channel closed, dropping message");
                    }
                },
                (),
            )
            .map_err(|e| RouterError::TransportUnavailable(format!("{}", e)))?;

        Ok(MidirSource {
            _connection: connection,
            rx,
            name,
        })
    }
}

impl MidiSource for MidirSource {
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

/// Real output port backed by midir.
pub struct MidirSink {
    connection: MidiOutputConnection,
    name: String,
}

impl MidirSink {
    /// Opens the first output port whose name contains `port_match`.
    pub fn connect(port_match: &str) -> Result<Self> {
        let midi_out = MidiOutput::new(CLIENT_NAME)
            .map_err(|e| RouterError::TransportUnavailable(format!("{}", e)))?;

        let out_ports = midi_out.ports();
        let out_port = out_ports
            .iter()
            .find(|p| {
                midi_out
                    .port_name(p)
                    .unwrap_or_default()
                    .contains(port_match)
            })
            .ok_or_else(|| {
                RouterError::TransportUnavailable(format!(
                    "output port '{}' not found",
                    port_match
                ))
            })?;
        let name = midi_out.port_name(out_port).unwrap_or_default();
        info!("Opening output port: {}", name);

        let connection = midi_out
            .connect(out_port, "midimux-output")
            .map_err(|e| RouterError::TransportUnavailable(format!("{}", e)))?;

        Ok(MidirSink { connection, name })
    }
}

impl MidiSink for MidirSink {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.connection.send(bytes).map_err(|e| {
            RouterError::TransportUnavailable(format!("send on '{}' failed: {}", self.name, e))
        })
    }
}

/// Lists the names of all available MIDI input ports.
pub fn list_input_ports() -> Vec<String> {
    let mut devices = Vec::new();
    if let Ok(midi_in) = MidiInput::new(CLIENT_NAME) {
        for port in midi_in.ports() {
            if let Ok(name) = midi_in.port_name(&port) {
                devices.push(name);
            }
        }
    }
    devices
}

/// Lists the names of all available MIDI output ports.
pub fn list_output_ports() -> Vec<String> {
    let mut devices = Vec::new();
    if let Ok(midi_out) = MidiOutput::new(CLIENT_NAME) {
        for port in midi_out.ports() {
            if let Ok(name) = midi_out.port_name(&port) {
                devices.push(name);
            }
        }
    }
    devices
}
