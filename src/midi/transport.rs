use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Custom error type for router operations
#[derive(Debug, Clone, PartialEq)]
pub enum RouterError {
    /// A port failed to open or disappeared; fatal for the engine
    TransportUnavailable(String),
    /// Truncated or unrecognized byte sequence from an input; logged and dropped
    MalformedMessage(String),
    /// A computed BPM fell outside the accepted range; previous tempo retained
    TempoOutOfRange(f64),
    /// An internal channel endpoint was dropped during teardown
    ChannelClosed,
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::TransportUnavailable(msg) => {
                write!(f, "MIDI transport unavailable: {}", msg)
            }
            RouterError::MalformedMessage(msg) => write!(f, "malformed MIDI message: {}", msg),
            RouterError::TempoOutOfRange(bpm) => write!(f, "tempo out of range: {} BPM", bpm),
            RouterError::ChannelClosed => write!(f, "internal channel closed"),
        }
    }
}

impl Error for RouterError {}

/// Result type for router operations
pub type Result<T> = std::result::Result<T, RouterError>;

/// A source of timestamped raw MIDI messages, one per input port.
///
/// Delta times are in seconds relative to the previously delivered message on
/// the same port; the first message's delta is relative to port-open.
pub trait MidiSource: Send {
    /// Waits up to `timeout` for the next message. Returns `Ok(None)` when the
    /// timeout elapsed with nothing received, so callers can poll a shutdown
    /// flag between waits.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<(Vec<u8>, f64)>>;

    /// Human-readable port name, used for logging.
    fn port_name(&self) -> &str;
}

/// The single outbound MIDI port. Owned and written exclusively by the
/// output sequencer.
pub trait MidiSink: Send {
    fn send(&mut self, bytes: &[u8]) -> Result<()>;
}
