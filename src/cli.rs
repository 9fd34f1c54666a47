use clap::Parser;

use crate::config::DEFAULT_CONFIG_FILE;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// List available MIDI devices
    #[arg(long)]
    pub device_list: bool,

    /// Run the interactive configurator and exit
    #[arg(short = 'c', long)]
    pub configure: bool,

    /// Override the initial clock tempo from the configuration file
    #[arg(long)]
    pub bpm: Option<f64>,

    /// Suppress the terminal status line
    #[arg(long)]
    pub quiet: bool,
}

pub fn validate_device(device_name: &str, devices: &[String]) -> Result<(), String> {
    if !devices.iter().any(|d| d.contains(device_name)) {
        let mut error_msg = format!(
            "Error: Device '{}' not found in available devices:\n",
            device_name
        );
        for device in devices {
            error_msg.push_str(&format!("  - {}\n", device));
        }
        return Err(error_msg);
    }
    Ok(())
}
