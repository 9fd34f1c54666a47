//! MIDI functionality for midimux
//!
//! This module provides MIDI communication capabilities, including:
//! - Core MIDI message types and error handling
//! - The transport seam between the engine and hardware ports
//! - Real MIDI device communication via midir
//! - Mock implementations for testing
//!
//! The main components are:
//! - [`MidiMessage`] for parsing and encoding raw MIDI bytes
//! - [`MidiSource`] and [`MidiSink`] traits for receiving and sending
//! - [`MidirSource`] and [`MidirSink`] for real MIDI device communication
//! - [`mock`] implementations for testing
//!
mod message;
pub mod midir_backend;
pub mod mock;
mod transport;

// Re-export main types from transport
pub use transport::{MidiSink, MidiSource, Result, RouterError};

// Re-export message parsing
pub use message::MidiMessage;

// Re-export concrete implementations
pub use midir_backend::{list_input_ports, list_output_ports, MidirSink, MidirSource};
