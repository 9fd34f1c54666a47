//! Per-channel routing and transformation state.
//!
//! Every input port carries 16 [`ChannelMode`] entries, one per MIDI channel.
//! A mode remaps the channel, shapes Note-On velocity, expands single notes
//! into chords and optionally collapses overlapping notes into a mono/legato
//! line. All state here is owned by the input collector that processes the
//! port; nothing is shared across threads.

use crate::midi::MidiMessage;
use std::collections::BTreeSet;

/// Chord selection for one channel. Shapes follow the classic router presets;
/// `Custom` takes explicit semitone offsets from the played note.
#[derive(Debug, Clone, PartialEq)]
pub enum ChordShape {
    Off,
    Minor,
    MinorLo,
    Major,
    MajorLo,
    Custom(Vec<i8>),
}

impl ChordShape {
    /// Semitone offsets of every sounded note, the played note included.
    pub fn intervals(&self) -> &[i8] {
        match self {
            ChordShape::Off => &[0],
            ChordShape::Minor => &[0, 3, 7],
            ChordShape::MinorLo => &[-5, 0, 3],
            ChordShape::Major => &[0, 4, 7],
            ChordShape::MajorLo => &[-5, 0, 4],
            ChordShape::Custom(intervals) => {
                if intervals.is_empty() {
                    &[0]
                } else {
                    intervals
                }
            }
        }
    }

    /// Maps a chord-select CC value to a shape, in bands of 8.
    pub fn from_cc(value: u8) -> Self {
        match value {
            0..=7 => ChordShape::Off,
            8..=15 => ChordShape::Minor,
            16..=23 => ChordShape::MinorLo,
            24..=31 => ChordShape::Major,
            32..=39 => ChordShape::MajorLo,
            _ => ChordShape::Off,
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "off" => Some(ChordShape::Off),
            "minor" => Some(ChordShape::Minor),
            "minor-lo" => Some(ChordShape::MinorLo),
            "major" => Some(ChordShape::Major),
            "major-lo" => Some(ChordShape::MajorLo),
            _ => None,
        }
    }
}

/// Note-On velocity shaping. Note-Off velocity is never touched.
#[derive(Debug, Clone, PartialEq)]
pub enum VelocityCurve {
    /// Pass velocity through untouched
    Linear,
    /// Substitute a fixed velocity for every Note-On
    Fixed(u8),
    /// 128-entry lookup table, computed once at startup
    Table(Box<[u8; 128]>),
}

impl VelocityCurve {
    /// Gamma-curve table; exponents above 1.0 soften playing, below 1.0
    /// harden it.
    pub fn table_from_gamma(gamma: f64) -> Self {
        let mut table = [0u8; 128];
        for (v, entry) in table.iter_mut().enumerate() {
            let normalized = v as f64 / 127.0;
            *entry = (normalized.powf(gamma) * 127.0).round() as u8;
        }
        VelocityCurve::Table(Box::new(table))
    }

    pub fn soft() -> Self {
        Self::table_from_gamma(1.7)
    }

    pub fn hard() -> Self {
        Self::table_from_gamma(0.6)
    }

    /// Shapes a Note-On velocity. The result is clamped to 1..=127 so shaping
    /// never turns a Note-On into an implicit Note-Off.
    pub fn apply(&self, velocity: u8) -> u8 {
        let shaped = match self {
            VelocityCurve::Linear => velocity,
            VelocityCurve::Fixed(v) => *v,
            VelocityCurve::Table(table) => table[velocity.min(127) as usize],
        };
        shaped.clamp(1, 127)
    }
}

/// Routing and transformation state for one (port, channel) pair.
#[derive(Debug, Clone)]
pub struct ChannelMode {
    pub routing: u8,
    pub chord: ChordShape,
    pub velocity: VelocityCurve,
    pub mono_legato: bool,
    /// Most recent played note; the pitch that owes the final Note-Off in
    /// mono/legato mode
    last_note: Option<u8>,
    /// Notes currently sounding on the output, expanded chord notes included
    held_notes: BTreeSet<u8>,
    /// Keys physically held on the input, original note numbers
    pressed_keys: BTreeSet<u8>,
}

impl ChannelMode {
    pub fn new(routing: u8) -> Self {
        Self {
            routing,
            chord: ChordShape::Off,
            velocity: VelocityCurve::Linear,
            mono_legato: false,
            last_note: None,
            held_notes: BTreeSet::new(),
            pressed_keys: BTreeSet::new(),
        }
    }

    pub fn held_notes(&self) -> &BTreeSet<u8> {
        &self.held_notes
    }

    /// Chord notes for a played note, clipped to the 0..=127 note range.
    /// Out-of-range expansion notes are silently skipped, on Note-Off as well
    /// as Note-On, so the two sides always match.
    fn expansion(&self, note: u8) -> Vec<u8> {
        self.chord
            .intervals()
            .iter()
            .filter_map(|offset| {
                let n = note as i16 + *offset as i16;
                if (0..=127).contains(&n) {
                    Some(n as u8)
                } else {
                    None
                }
            })
            .collect()
    }

    fn note_on(&mut self, note: u8, velocity: u8, out_channel: u8) -> Vec<MidiMessage> {
        let shaped = self.velocity.apply(velocity);
        self.pressed_keys.insert(note);
        self.last_note = Some(note);

        // In mono/legato mode a Note-On over a held note is a pure legato
        // transition: the new pitch starts with no Note-Off for the old one.
        let mut out = Vec::new();
        for n in self.expansion(note) {
            self.held_notes.insert(n);
            out.push(MidiMessage::NoteOn {
                channel: out_channel,
                note: n,
                velocity: shaped,
            });
        }
        out
    }

    fn note_off(&mut self, note: u8, velocity: u8, out_channel: u8) -> Vec<MidiMessage> {
        self.pressed_keys.remove(&note);

        if self.mono_legato {
            if !self.pressed_keys.is_empty() {
                // Still inside the legato phrase; nothing sounds off yet
                return Vec::new();
            }
            // All keys released: only the last sounding pitch gets Note-Offs.
            // Earlier legato pitches were already superseded audibly and a
            // mono voice expects exactly one release.
            let mut out = Vec::new();
            if let Some(last) = self.last_note.take() {
                for n in self.expansion(last) {
                    if self.held_notes.contains(&n) {
                        out.push(MidiMessage::NoteOff {
                            channel: out_channel,
                            note: n,
                            velocity,
                        });
                    }
                }
            }
            self.held_notes.clear();
            return out;
        }

        let mut out = Vec::new();
        for n in self.expansion(note) {
            if self.held_notes.remove(&n) {
                out.push(MidiMessage::NoteOff {
                    channel: out_channel,
                    note: n,
                    velocity,
                });
            }
        }
        out
    }

    /// Applies this mode to one channel voice message, producing the outgoing
    /// messages on `out_channel`.
    pub fn transform(&mut self, msg: MidiMessage, out_channel: u8) -> Vec<MidiMessage> {
        match msg {
            // A Note-On with velocity 0 is a Note-Off by MIDI convention
            MidiMessage::NoteOn {
                note, velocity: 0, ..
            } => self.note_off(note, 0, out_channel),
            MidiMessage::NoteOn { note, velocity, .. } => {
                self.note_on(note, velocity, out_channel)
            }
            MidiMessage::NoteOff { note, velocity, .. } => {
                self.note_off(note, velocity, out_channel)
            }
            other => vec![other.with_channel(out_channel)],
        }
    }
}

/// The 16 channel modes of one input port, plus the port-wide mono collapse.
#[derive(Debug, Clone)]
pub struct PortModes {
    mono: bool,
    mono_channel: u8,
    modes: [ChannelMode; 16],
}

impl Default for PortModes {
    fn default() -> Self {
        Self::new(false, 0)
    }
}

impl PortModes {
    /// Identity routing: every channel maps to itself, no transforms.
    pub fn new(mono: bool, mono_channel: u8) -> Self {
        Self {
            mono,
            mono_channel: mono_channel & 0x0F,
            modes: std::array::from_fn(|channel| ChannelMode::new(channel as u8)),
        }
    }

    pub fn mode(&self, channel: u8) -> &ChannelMode {
        &self.modes[(channel & 0x0F) as usize]
    }

    pub fn mode_mut(&mut self, channel: u8) -> &mut ChannelMode {
        &mut self.modes[(channel & 0x0F) as usize]
    }

    pub fn set_routing(&mut self, channel: u8, routing: u8) {
        self.mode_mut(channel).routing = routing & 0x0F;
    }

    pub fn set_chord(&mut self, channel: u8, chord: ChordShape) {
        self.mode_mut(channel).chord = chord;
    }

    /// Transforms one channel voice message through the mode table. On a mono
    /// port every channel shares the collapse channel's mode entry, so held
    /// note bookkeeping stays consistent across the whole port.
    pub fn transform(&mut self, msg: MidiMessage) -> Vec<MidiMessage> {
        let channel = match msg.channel() {
            Some(c) => c,
            None => return vec![msg],
        };
        let (index, out_channel) = if self.mono {
            (self.mono_channel, self.mono_channel)
        } else {
            let routing = self.mode(channel).routing;
            (channel, routing)
        };
        self.modes[index as usize].transform(msg, out_channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chord_cc_bands() {
        assert_eq!(ChordShape::from_cc(0), ChordShape::Off);
        assert_eq!(ChordShape::from_cc(8), ChordShape::Minor);
        assert_eq!(ChordShape::from_cc(23), ChordShape::MinorLo);
        assert_eq!(ChordShape::from_cc(24), ChordShape::Major);
        assert_eq!(ChordShape::from_cc(39), ChordShape::MajorLo);
        assert_eq!(ChordShape::from_cc(127), ChordShape::Off);
    }

    #[test]
    fn velocity_table_is_monotonic() {
        let curve = VelocityCurve::soft();
        let mut prev = 0;
        for v in 1..=127u8 {
            let shaped = curve.apply(v);
            assert!(shaped >= prev, "curve not monotonic at {}", v);
            prev = shaped;
        }
        assert_eq!(curve.apply(127), 127);
    }

    #[test]
    fn fixed_velocity_never_zero() {
        let curve = VelocityCurve::Fixed(0);
        assert_eq!(curve.apply(64), 1);
    }
}
