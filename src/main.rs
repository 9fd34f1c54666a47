use clap::Parser;
use midimux::{
    cli::{validate_device, Args},
    config::{Settings, MAX_INPUTS},
    configure,
    engine::{Engine, EngineInput},
    logging,
    midi::{list_input_ports, list_output_ports, MidiSink, MidiSource, MidirSink, MidirSource},
    ui,
};
use std::{process, thread, time::Duration};

fn main() {
    initialize_logging();
    let args = Args::parse();

    if args.configure {
        run_configurator(&args.config);
        return;
    }

    if args.device_list {
        list_available_devices();
        return;
    }

    let settings = load_settings(&args);
    let inputs = connect_inputs(&settings);
    let sink = connect_output(&settings);

    let engine = Engine::start(&settings.engine_config(), inputs, sink);
    if !args.quiet {
        ui::start_status_display(engine.tempo(), engine.running_flag());
    }

    run_application_loop(engine);
}

fn initialize_logging() {
    logging::init_logger().expect("Logger initialization failed");
    log::info!("Application starting");
}

fn run_configurator(path: &str) {
    if let Err(e) = configure::run(path) {
        log::error!("Configuration failed: {}", e);
        eprintln!("Configuration failed: {}", e);
        process::exit(1);
    }
}

fn list_available_devices() {
    println!("Available MIDI input ports:");
    for device in list_input_ports() {
        println!("  - {}", device);
    }
    println!("Available MIDI output ports:");
    for device in list_output_ports() {
        println!("  - {}", device);
    }
}

fn load_settings(args: &Args) -> Settings {
    let mut settings = match Settings::load(&args.config) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Failed to read '{}': {}", args.config, e);
            eprintln!("Failed to read '{}': {}", args.config, e);
            process::exit(1);
        }
    };
    if let Some(bpm) = args.bpm {
        settings.initial_bpm = bpm;
    }
    if settings.output.is_none() {
        let msg = format!(
            "No output port configured in '{}'. Run with --configure first.",
            args.config
        );
        log::error!("{}", msg);
        eprintln!("{}", msg);
        process::exit(1);
    }
    if settings.inputs.is_empty() {
        log::warn!("No input ports configured; only the clock will be sent");
    }
    settings
}

fn connect_inputs(settings: &Settings) -> Vec<EngineInput> {
    let devices = list_input_ports();
    settings
        .inputs
        .iter()
        .take(MAX_INPUTS)
        .map(|input| {
            if let Err(error_msg) = validate_device(&input.name, &devices) {
                log::error!("{}", error_msg);
                eprintln!("{}", error_msg);
                process::exit(1);
            }
            match MidirSource::connect(&input.name) {
                Ok(source) => {
                    log::info!("Connected input: {}", source.port_name());
                    EngineInput {
                        source: Box::new(source),
                        modes: input.port_modes(),
                    }
                }
                Err(e) => {
                    log::error!("{}", e);
                    eprintln!("{}", e);
                    process::exit(1);
                }
            }
        })
        .collect()
}

fn connect_output(settings: &Settings) -> Box<dyn MidiSink> {
    // Presence is checked in load_settings
    let name = settings.output.as_deref().unwrap_or_default();
    match MidirSink::connect(name) {
        Ok(sink) => Box::new(sink),
        Err(e) => {
            log::error!("{}", e);
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

fn run_application_loop(engine: Engine) -> ! {
    log::info!("Engine running. Press Ctrl+C to exit...");
    println!("\nPress Ctrl+C to exit...");
    loop {
        thread::sleep(Duration::from_millis(250));
        if let Some(e) = engine.poll_fatal() {
            log::error!("Fatal: {}", e);
            eprintln!("Fatal: {}", e);
            engine.stop();
            process::exit(1);
        }
    }
}
