//! midimux is a real-time MIDI clock generator and router.
//!
//! Receives events from up to four MIDI inputs, applies per-channel routing,
//! chord, velocity and mono/legato transforms, merges the result with an
//! internally generated MIDI clock and writes one time-ordered stream to a
//! single output port.

pub mod cli;
pub mod clock;
pub mod collector;
pub mod config;
pub mod configure;
pub mod engine;
pub mod logging;
pub mod midi;
pub mod mode;
pub mod sequencer;
pub mod tempo;
pub mod ui;

pub use engine::{Engine, EngineConfig, EngineInput};
