//! Settings file handling.
//!
//! Settings are read once at startup from a TOML file via the `config` crate
//! and distilled into the engine's runtime parameters. There is no hot
//! reload; the interactive configurator (`--configure`) writes this file.

use crate::engine::EngineConfig;
use crate::mode::{ChordShape, PortModes, VelocityCurve};
use config::{Config, ConfigError, File};
use log::warn;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "midimux.toml";

/// Maximum number of input ports, as on the classic hardware routers
pub const MAX_INPUTS: usize = 4;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub inputs: Vec<InputSettings>,
    pub output: Option<String>,
    pub enable_clock: bool,
    pub ignore_program_changes: bool,
    pub initial_bpm: f64,
    pub tap_min_bpm: f64,
    pub tap_max_bpm: f64,
    /// Enables the CC-value tempo fallback: BPM = offset + value
    pub bpm_offset: Option<u16>,
    pub tempo_cc: u8,
    pub chord_cc: Option<u8>,
    pub route_cc: Option<u8>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            output: None,
            enable_clock: true,
            ignore_program_changes: true,
            initial_bpm: 142.0,
            tap_min_bpm: 80.0,
            tap_max_bpm: 200.0,
            bpm_offset: None,
            tempo_cc: 10,
            chord_cc: Some(11),
            route_cc: Some(12),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct InputSettings {
    /// Substring matched against available port names
    pub name: String,
    /// Collapse every channel of this port to `mono_channel`
    pub mono: bool,
    pub mono_channel: u8,
    /// Sparse per-channel overrides; unlisted channels keep identity routing
    pub channels: Vec<ChannelSettings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    pub channel: u8,
    pub route_to: Option<u8>,
    /// Chord shape name: off, minor, minor-lo, major, major-lo
    pub chord: Option<String>,
    /// Explicit semitone offsets; takes precedence over `chord`
    pub chord_intervals: Option<Vec<i8>>,
    /// Velocity curve name: linear, fixed, soft, hard
    pub velocity: Option<String>,
    pub fixed_velocity: u8,
    pub mono_legato: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            channel: 0,
            route_to: None,
            chord: None,
            chord_intervals: None,
            velocity: None,
            fixed_velocity: 100,
            mono_legato: false,
        }
    }
}

impl Settings {
    /// Loads the settings file. A missing file yields the defaults, so a
    /// fresh install can still run `--device-list` or `--configure`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .build()?
            .try_deserialize()
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            initial_bpm: self.initial_bpm,
            clock_enabled: self.enable_clock,
            tempo_cc: self.tempo_cc,
            chord_cc: self.chord_cc,
            route_cc: self.route_cc,
            bpm_offset: self.bpm_offset,
            ignore_program_changes: self.ignore_program_changes,
            tap_min_bpm: self.tap_min_bpm,
            tap_max_bpm: self.tap_max_bpm,
        }
    }
}

impl InputSettings {
    /// Builds the channel mode table for this port.
    pub fn port_modes(&self) -> PortModes {
        let mut modes = PortModes::new(self.mono, self.mono_channel);
        for ch in &self.channels {
            let mode = modes.mode_mut(ch.channel);
            if let Some(route_to) = ch.route_to {
                mode.routing = route_to & 0x0F;
            }
            if let Some(intervals) = &ch.chord_intervals {
                mode.chord = ChordShape::Custom(intervals.clone());
            } else if let Some(name) = &ch.chord {
                match ChordShape::by_name(name) {
                    Some(shape) => mode.chord = shape,
                    None => warn!("unknown chord shape '{}', ignoring", name),
                }
            }
            match ch.velocity.as_deref() {
                None | Some("linear") => {}
                Some("fixed") => mode.velocity = VelocityCurve::Fixed(ch.fixed_velocity),
                Some("soft") => mode.velocity = VelocityCurve::soft(),
                Some("hard") => mode.velocity = VelocityCurve::hard(),
                Some(other) => warn!("unknown velocity curve '{}', ignoring", other),
            }
            mode.mono_legato = ch.mono_legato;
        }
        modes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_classic_router() {
        let settings = Settings::default();
        assert_eq!(settings.initial_bpm, 142.0);
        assert_eq!(settings.tempo_cc, 10);
        assert_eq!(settings.chord_cc, Some(11));
        assert_eq!(settings.route_cc, Some(12));
        assert!(settings.enable_clock);
        assert!(settings.ignore_program_changes);
        assert!(settings.bpm_offset.is_none());
    }

    #[test]
    fn channel_overrides_apply() {
        let input = InputSettings {
            name: "pads".to_string(),
            channels: vec![ChannelSettings {
                channel: 3,
                route_to: Some(7),
                chord: Some("minor".to_string()),
                velocity: Some("fixed".to_string()),
                fixed_velocity: 90,
                ..Default::default()
            }],
            ..Default::default()
        };
        let modes = input.port_modes();
        let mode = modes.mode(3);
        assert_eq!(mode.routing, 7);
        assert_eq!(mode.chord, ChordShape::Minor);
        assert_eq!(mode.velocity, VelocityCurve::Fixed(90));
        // Unlisted channels keep identity routing
        assert_eq!(modes.mode(5).routing, 5);
    }
}
