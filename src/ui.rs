//! Terminal status line.
//!
//! A single spinner showing the current tempo, refreshed periodically.
//! Built with indicatif; suppressed by `--quiet`.

use crate::tempo::TempoState;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const REFRESH_INTERVAL: Duration = Duration::from_millis(250);

fn create_status_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {wide_msg}")
            .unwrap(),
    );
    pb.set_prefix("midimux");
    pb
}

/// Spawns the status thread; it exits when `running` goes false.
pub fn start_status_display(
    tempo: Arc<TempoState>,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let spinner = create_status_spinner();
        while running.load(Ordering::SeqCst) {
            spinner.set_message(format!("{:.1} BPM", tempo.bpm()));
            spinner.tick();
            thread::sleep(REFRESH_INTERVAL);
        }
        spinner.finish_and_clear();
    })
}
