//! Interactive configurator.
//!
//! Walks the user through port selection, clock and CC assignments, then
//! writes the TOML settings file read at the next startup. Per-channel mode
//! tables are edited in the file by hand; the prompts cover the common case.

use crate::config::MAX_INPUTS;
use crate::midi::{list_input_ports, list_output_ports};
use dialoguer::{Confirm, Input, Select};
use std::error::Error;
use std::fs;
use std::path::Path;

struct PickedInput {
    name: String,
    mono: bool,
    mono_channel: u8,
}

pub fn run(path: &str) -> Result<(), Box<dyn Error>> {
    if Path::new(path).exists() {
        let overwrite = Confirm::new()
            .with_prompt(format!("'{}' exists, reconfigure it?", path))
            .default(false)
            .interact()?;
        if !overwrite {
            println!("Exiting");
            return Ok(());
        }
    }

    let available_inputs = list_input_ports();
    let available_outputs = list_output_ports();
    if available_outputs.is_empty() {
        return Err("no MIDI output ports available".into());
    }

    let inputs = pick_inputs(&available_inputs)?;

    let output_idx = Select::new()
        .with_prompt("Output port")
        .items(&available_outputs)
        .default(0)
        .interact()?;
    let output = available_outputs[output_idx].clone();

    let enable_clock = Confirm::new()
        .with_prompt("Enable MIDI clock?")
        .default(true)
        .interact()?;

    let ignore_program_changes = Confirm::new()
        .with_prompt("Ignore incoming program change messages?")
        .default(true)
        .interact()?;

    let initial_bpm: f64 = Input::new()
        .with_prompt("Initial MIDI clock BPM")
        .default(142.0)
        .interact_text()?;

    let tap_min_bpm: f64 = Input::new()
        .with_prompt("Tap-tempo minimum BPM")
        .default(80.0)
        .interact_text()?;

    let tap_max_bpm: f64 = Input::new()
        .with_prompt("Tap-tempo maximum BPM")
        .default(200.0)
        .interact_text()?;

    let bpm_offset = if Confirm::new()
        .with_prompt("Derive tempo from the CC value on a single tap (offset + value = BPM)?")
        .default(false)
        .interact()?
    {
        let offset: u16 = Input::new()
            .with_prompt("BPM offset")
            .default(70)
            .interact_text()?;
        Some(offset)
    } else {
        None
    };

    let tempo_cc: u8 = Input::new()
        .with_prompt("Tempo (tap) MIDI CC number")
        .default(10)
        .interact_text()?;

    let chord_cc: u8 = Input::new()
        .with_prompt("Chord mode MIDI CC number")
        .default(11)
        .interact_text()?;

    let route_cc: u8 = Input::new()
        .with_prompt("Channel routing MIDI CC number")
        .default(12)
        .interact_text()?;

    let mut cfg = String::new();
    cfg.push_str(&format!("output = \"{}\"\n", output));
    cfg.push_str(&format!("enable_clock = {}\n", enable_clock));
    cfg.push_str(&format!(
        "ignore_program_changes = {}\n",
        ignore_program_changes
    ));
    cfg.push_str(&format!("initial_bpm = {:.1}\n", initial_bpm));
    cfg.push_str(&format!("tap_min_bpm = {:.1}\n", tap_min_bpm));
    cfg.push_str(&format!("tap_max_bpm = {:.1}\n", tap_max_bpm));
    if let Some(offset) = bpm_offset {
        cfg.push_str(&format!("bpm_offset = {}\n", offset));
    }
    cfg.push_str(&format!("tempo_cc = {}\n", tempo_cc));
    cfg.push_str(&format!("chord_cc = {}\n", chord_cc));
    cfg.push_str(&format!("route_cc = {}\n", route_cc));
    for input in &inputs {
        cfg.push_str(&format!(
            "\n[[inputs]]\nname = \"{}\"\nmono = {}\nmono_channel = {}\n",
            input.name, input.mono, input.mono_channel
        ));
    }

    fs::write(path, cfg)?;
    println!("Wrote {}", path);
    Ok(())
}

fn pick_inputs(available: &[String]) -> Result<Vec<PickedInput>, Box<dyn Error>> {
    let mut remaining: Vec<String> = available.to_vec();
    let mut picked = Vec::new();

    for slot in 0..MAX_INPUTS {
        if remaining.is_empty() {
            break;
        }
        let mut items = vec!["(none)".to_string()];
        items.extend(remaining.iter().cloned());
        let choice = Select::new()
            .with_prompt(format!("Input port {}", slot + 1))
            .items(&items)
            .default(0)
            .interact()?;
        if choice == 0 {
            continue;
        }
        let name = remaining.remove(choice - 1);

        let mono = Confirm::new()
            .with_prompt("Collapse all channels of this input to one (mono)?")
            .default(false)
            .interact()?;
        let mono_channel = if mono {
            let channel: u8 = Input::new()
                .with_prompt("Mono output channel (0-15)")
                .default(0)
                .interact_text()?;
            channel & 0x0F
        } else {
            0
        };

        picked.push(PickedInput {
            name,
            mono,
            mono_channel,
        });
    }

    Ok(picked)
}
