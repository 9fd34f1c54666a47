//! Shared tempo state and the tap-tempo estimator.

use crate::midi::{Result, RouterError};
use log::{debug, info};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// MIDI clock resolution, pulses per quarter note
pub const PULSES_PER_BEAT: f64 = 24.0;

/// Number of tap timestamps averaged for an estimate
const TAP_WINDOW: usize = 4;

pub const DEFAULT_MIN_BPM: f64 = 20.0;
pub const DEFAULT_MAX_BPM: f64 = 300.0;

/// Process-wide tempo, written by the tap estimator and read by the clock
/// generator every pulse.
///
/// The BPM is stored as one `AtomicU64` bit pattern; `pulse_interval` is
/// always derived from a single atomic load, so a reader can never observe a
/// BPM and an interval from two different tempos.
#[derive(Debug)]
pub struct TempoState {
    bpm_bits: AtomicU64,
    min_bpm: f64,
    max_bpm: f64,
}

impl TempoState {
    pub fn new(initial_bpm: f64) -> Self {
        Self::with_limits(initial_bpm, DEFAULT_MIN_BPM, DEFAULT_MAX_BPM)
    }

    pub fn with_limits(initial_bpm: f64, min_bpm: f64, max_bpm: f64) -> Self {
        let bpm = initial_bpm.clamp(min_bpm, max_bpm);
        Self {
            bpm_bits: AtomicU64::new(bpm.to_bits()),
            min_bpm,
            max_bpm,
        }
    }

    pub fn bpm(&self) -> f64 {
        f64::from_bits(self.bpm_bits.load(Ordering::Acquire))
    }

    /// Updates the tempo. Out-of-range values are rejected and the previous
    /// tempo is retained.
    pub fn set_bpm(&self, bpm: f64) -> Result<f64> {
        if !bpm.is_finite() || bpm < self.min_bpm || bpm > self.max_bpm {
            return Err(RouterError::TempoOutOfRange(bpm));
        }
        self.bpm_bits.store(bpm.to_bits(), Ordering::Release);
        Ok(bpm)
    }

    /// Interval between two MIDI clock pulses at the current tempo.
    pub fn pulse_interval(&self) -> Duration {
        Duration::from_secs_f64(60.0 / (self.bpm() * PULSES_PER_BEAT))
    }
}

/// Sliding-window beat estimator fed by tap timestamps.
///
/// Keeps the last [`TAP_WINDOW`] taps; once two or more are present the mean
/// interval between consecutive taps becomes the tempo. A tap separated from
/// the previous one by more than `max_interval` means the player paused, so
/// the window resets to that tap alone.
#[derive(Debug)]
pub struct TapTempo {
    taps: VecDeque<f64>,
    min_interval: f64,
    max_interval: f64,
}

impl TapTempo {
    pub fn new(tap_min_bpm: f64, tap_max_bpm: f64) -> Self {
        Self {
            taps: VecDeque::with_capacity(TAP_WINDOW),
            min_interval: 60.0 / tap_max_bpm,
            max_interval: 60.0 / tap_min_bpm,
        }
    }

    /// Records one tap and, when the window allows it, pushes a fresh
    /// estimate into `tempo`. Returns the accepted BPM, if any.
    pub fn record_tap(&mut self, timestamp: f64, tempo: &TempoState) -> Option<f64> {
        if let Some(&last) = self.taps.back() {
            let gap = timestamp - last;
            if gap < self.min_interval || gap > self.max_interval {
                debug!("tap gap {:.3}s out of bounds, resetting window", gap);
                self.taps.clear();
            }
        }
        if self.taps.len() == TAP_WINDOW {
            self.taps.pop_front();
        }
        self.taps.push_back(timestamp);

        if self.taps.len() < 2 {
            return None;
        }
        let span = self.taps.back()? - self.taps.front()?;
        let mean_interval = span / (self.taps.len() - 1) as f64;
        let bpm = 60.0 / mean_interval;
        match tempo.set_bpm(bpm) {
            Ok(bpm) => {
                info!("Tap tempo: {:.1} BPM", bpm);
                Some(bpm)
            }
            Err(e) => {
                debug!("tap estimate rejected: {}", e);
                None
            }
        }
    }
}
