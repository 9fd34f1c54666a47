use midimux::engine::{Engine, EngineConfig, EngineInput};
use midimux::midi::mock::{CapturingSink, ChannelSource, ScriptedSource};
use midimux::midi::RouterError;
use midimux::mode::{PortModes, VelocityCurve};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Engine config with the clock off, so captured output holds only routed
/// events.
fn quiet_config() -> EngineConfig {
    EngineConfig {
        clock_enabled: false,
        ..EngineConfig::default()
    }
}

fn wait_until<F: Fn(&[Vec<u8>]) -> bool>(captured: &Arc<Mutex<Vec<Vec<u8>>>>, pred: F) -> bool {
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    while Instant::now() < deadline {
        {
            let sent = captured.lock().unwrap();
            if pred(&sent) {
                return true;
            }
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn routes_two_ports_end_to_end() {
    // Port A: channel 0 routed to channel 2 with fixed velocity 100
    let mut modes_a = PortModes::new(false, 0);
    modes_a.set_routing(0, 2);
    modes_a.mode_mut(0).velocity = VelocityCurve::Fixed(100);
    let source_a = ScriptedSource::new("port-a", vec![(vec![0x90, 60, 80], 0.0)]);

    // Port B: mono, every channel collapsed to channel 4
    let modes_b = PortModes::new(true, 4);
    let source_b = ScriptedSource::new("port-b", vec![(vec![0x91, 62, 70], 0.0)]);

    let sink = CapturingSink::new();
    let captured = sink.captured();
    let engine = Engine::start(
        &quiet_config(),
        vec![
            EngineInput {
                source: Box::new(source_a),
                modes: modes_a,
            },
            EngineInput {
                source: Box::new(source_b),
                modes: modes_b,
            },
        ],
        Box::new(sink),
    );

    assert!(wait_until(&captured, |sent| {
        sent.contains(&vec![0x92, 60, 100]) && sent.contains(&vec![0x94, 62, 70])
    }));
    engine.stop();
}

#[test]
fn port_order_is_preserved_end_to_end() {
    let script: Vec<(Vec<u8>, f64)> = (0..16)
        .map(|i| (vec![0x90, 60 + i as u8, 80], 0.01))
        .collect();
    let source = ScriptedSource::new("port-a", script);

    let sink = CapturingSink::new();
    let captured = sink.captured();
    let engine = Engine::start(
        &quiet_config(),
        vec![EngineInput {
            source: Box::new(source),
            modes: PortModes::new(false, 0),
        }],
        Box::new(sink),
    );

    assert!(wait_until(&captured, |sent| sent.len() == 16));
    let sent = captured.lock().unwrap();
    for (i, bytes) in sent.iter().enumerate() {
        assert_eq!(bytes[1], 60 + i as u8, "arrival order broken at {}", i);
    }
    drop(sent);
    engine.stop();
}

#[test]
fn malformed_input_is_dropped_without_killing_the_port() {
    let source = ScriptedSource::new(
        "port-a",
        vec![
            (vec![0x90, 60], 0.0),       // truncated Note-On
            (vec![0x45], 0.0),           // stray data byte
            (vec![0x90, 0x85, 80], 0.0), // status byte inside data
            (vec![0x90, 64, 80], 0.0),   // valid
        ],
    );

    let sink = CapturingSink::new();
    let captured = sink.captured();
    let engine = Engine::start(
        &quiet_config(),
        vec![EngineInput {
            source: Box::new(source),
            modes: PortModes::new(false, 0),
        }],
        Box::new(sink),
    );

    assert!(wait_until(&captured, |sent| {
        sent.contains(&vec![0x90, 64, 80])
    }));
    assert_eq!(captured.lock().unwrap().len(), 1);
    engine.stop();
}

#[test]
fn tap_cc_is_suppressed_and_drives_the_tempo() {
    let (feed, source) = ChannelSource::pair("port-a");
    let sink = CapturingSink::new();
    let captured = sink.captured();
    let engine = Engine::start(
        &quiet_config(),
        vec![EngineInput {
            source: Box::new(source),
            modes: PortModes::new(false, 0),
        }],
        Box::new(sink),
    );

    // Two taps on the tempo CC (default controller 10), ~400ms apart
    feed.send((vec![0xB0, 10, 127], 0.0)).unwrap();
    thread::sleep(Duration::from_millis(400));
    feed.send((vec![0xB0, 10, 127], 0.4)).unwrap();
    // A note afterwards proves the port kept flowing
    feed.send((vec![0x90, 60, 80], 0.0)).unwrap();

    assert!(wait_until(&captured, |sent| {
        sent.contains(&vec![0x90, 60, 80])
    }));
    // The raw CC was consumed, never relayed
    assert_eq!(captured.lock().unwrap().len(), 1);

    // 400ms between taps is 150 BPM; real sleeps make it approximate
    let bpm = engine.tempo().bpm();
    assert!(
        (bpm - 150.0).abs() < 30.0,
        "expected a tempo near 150 BPM, got {}",
        bpm
    );
    engine.stop();
}

#[test]
fn lone_tap_with_offset_sets_tempo_from_cc_value() {
    let config = EngineConfig {
        bpm_offset: Some(70),
        ..quiet_config()
    };
    let (feed, source) = ChannelSource::pair("port-a");
    let sink = CapturingSink::new();
    let captured = sink.captured();
    let engine = Engine::start(
        &config,
        vec![EngineInput {
            source: Box::new(source),
            modes: PortModes::new(false, 0),
        }],
        Box::new(sink),
    );

    // First-ever tap cannot be averaged; the CC value decides: 70 + 58 = 128
    feed.send((vec![0xB0, 10, 58], 0.0)).unwrap();
    feed.send((vec![0x90, 60, 80], 0.0)).unwrap();

    assert!(wait_until(&captured, |sent| {
        sent.contains(&vec![0x90, 60, 80])
    }));
    assert_eq!(engine.tempo().bpm(), 128.0);
    engine.stop();
}

#[test]
fn program_changes_are_filtered_by_default() {
    let source = ScriptedSource::new(
        "port-a",
        vec![(vec![0xC0, 5], 0.0), (vec![0x90, 60, 80], 0.0)],
    );
    let sink = CapturingSink::new();
    let captured = sink.captured();
    let engine = Engine::start(
        &quiet_config(),
        vec![EngineInput {
            source: Box::new(source),
            modes: PortModes::new(false, 0),
        }],
        Box::new(sink),
    );

    assert!(wait_until(&captured, |sent| {
        sent.contains(&vec![0x90, 60, 80])
    }));
    assert_eq!(captured.lock().unwrap().len(), 1);
    engine.stop();
}

#[test]
fn program_changes_pass_through_when_not_ignored() {
    let config = EngineConfig {
        ignore_program_changes: false,
        ..quiet_config()
    };
    let source = ScriptedSource::new("port-a", vec![(vec![0xC0, 5], 0.0)]);
    let sink = CapturingSink::new();
    let captured = sink.captured();
    let engine = Engine::start(
        &config,
        vec![EngineInput {
            source: Box::new(source),
            modes: PortModes::new(false, 0),
        }],
        Box::new(sink),
    );

    assert!(wait_until(&captured, |sent| sent.contains(&vec![0xC0, 5])));
    engine.stop();
}

#[test]
fn sysex_passes_through_unmodified() {
    let payload = vec![0xF0, 0x7E, 0x00, 0x09, 0x01, 0xF7];
    let source = ScriptedSource::new("port-a", vec![(payload.clone(), 0.0)]);
    let sink = CapturingSink::new();
    let captured = sink.captured();
    let engine = Engine::start(
        &quiet_config(),
        vec![EngineInput {
            source: Box::new(source),
            modes: PortModes::new(false, 0),
        }],
        Box::new(sink),
    );

    assert!(wait_until(&captured, |sent| sent.contains(&payload)));
    engine.stop();
}

#[test]
fn chord_cc_reshapes_the_channel_live() {
    // CC 11 value 8 selects the minor shape for channel 0
    let source = ScriptedSource::new(
        "port-a",
        vec![(vec![0xB0, 11, 8], 0.0), (vec![0x90, 60, 80], 0.0)],
    );
    let sink = CapturingSink::new();
    let captured = sink.captured();
    let engine = Engine::start(
        &quiet_config(),
        vec![EngineInput {
            source: Box::new(source),
            modes: PortModes::new(false, 0),
        }],
        Box::new(sink),
    );

    assert!(wait_until(&captured, |sent| sent.len() == 3));
    let sent = captured.lock().unwrap();
    assert_eq!(*sent, vec![
        vec![0x90, 60, 80],
        vec![0x90, 63, 80],
        vec![0x90, 67, 80],
    ]);
    drop(sent);
    engine.stop();
}

#[test]
fn route_cc_redirects_the_channel_live() {
    // CC 12 value 40 routes channel 0 to channel 5 (40 / 8)
    let source = ScriptedSource::new(
        "port-a",
        vec![(vec![0xB0, 12, 40], 0.0), (vec![0x90, 60, 80], 0.0)],
    );
    let sink = CapturingSink::new();
    let captured = sink.captured();
    let engine = Engine::start(
        &quiet_config(),
        vec![EngineInput {
            source: Box::new(source),
            modes: PortModes::new(false, 0),
        }],
        Box::new(sink),
    );

    assert!(wait_until(&captured, |sent| {
        sent.contains(&vec![0x95, 60, 80])
    }));
    engine.stop();
}

#[test]
fn incoming_clock_is_dropped_while_the_internal_clock_runs() {
    let config = EngineConfig {
        initial_bpm: 120.0,
        ..EngineConfig::default()
    };
    // A hundred foreign clock bytes arrive in a burst
    let mut script: Vec<(Vec<u8>, f64)> = (0..100).map(|_| (vec![0xF8], 0.0)).collect();
    script.push((vec![0x90, 60, 80], 0.0));
    let source = ScriptedSource::new("port-a", script);

    let sink = CapturingSink::new();
    let captured = sink.captured();
    let engine = Engine::start(
        &config,
        vec![EngineInput {
            source: Box::new(source),
            modes: PortModes::new(false, 0),
        }],
        Box::new(sink),
    );

    assert!(wait_until(&captured, |sent| {
        sent.contains(&vec![0x90, 60, 80])
    }));
    engine.stop();

    // Only the generator's own pulses may appear: far fewer over this short
    // run than the hundred foreign ones
    let pulses = captured
        .lock()
        .unwrap()
        .iter()
        .filter(|bytes| bytes.as_slice() == [0xF8])
        .count();
    assert!(pulses < 50, "foreign clock bytes leaked through: {}", pulses);
}

#[test]
fn stop_drains_already_queued_events() {
    let script: Vec<(Vec<u8>, f64)> = (0..20)
        .map(|i| (vec![0x90, 40 + i as u8, 80], 0.0))
        .collect();
    let source = ScriptedSource::new("port-a", script);

    // 5ms per write piles the whole script up in the queue
    let sink = CapturingSink::slow(Duration::from_millis(5));
    let captured = sink.captured();
    let engine = Engine::start(
        &quiet_config(),
        vec![EngineInput {
            source: Box::new(source),
            modes: PortModes::new(false, 0),
        }],
        Box::new(sink),
    );

    // Wait for the first write, then stop while the backlog is still queued
    assert!(wait_until(&captured, |sent| !sent.is_empty()));
    thread::sleep(Duration::from_millis(20));
    engine.stop();

    assert_eq!(
        captured.lock().unwrap().len(),
        20,
        "stop must flush every queued event"
    );
}

#[test]
fn output_loss_is_reported_as_fatal() {
    let source = ScriptedSource::new("port-a", vec![(vec![0x90, 60, 80], 0.0)]);
    let sink = CapturingSink::failing_after(0);
    let engine = Engine::start(
        &quiet_config(),
        vec![EngineInput {
            source: Box::new(source),
            modes: PortModes::new(false, 0),
        }],
        Box::new(sink),
    );

    let deadline = Instant::now() + SETTLE_TIMEOUT;
    let mut fatal = None;
    while Instant::now() < deadline {
        if let Some(e) = engine.poll_fatal() {
            fatal = Some(e);
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    match fatal {
        Some(RouterError::TransportUnavailable(_)) => {}
        other => panic!("expected TransportUnavailable, got {:?}", other),
    }
    engine.stop();
}

#[test]
fn external_taps_drive_the_tempo() {
    let sink = CapturingSink::new();
    let engine = Engine::start(&quiet_config(), Vec::new(), Box::new(sink));

    assert_eq!(engine.record_tap(), None);
    thread::sleep(Duration::from_millis(400));
    let bpm = engine.record_tap().expect("estimate after 2 taps");
    assert!(
        (bpm - 150.0).abs() < 30.0,
        "expected a tempo near 150 BPM, got {}",
        bpm
    );
    engine.stop();
}

#[test]
fn set_tempo_control_surface() {
    let sink = CapturingSink::new();
    let engine = Engine::start(&quiet_config(), Vec::new(), Box::new(sink));

    assert!(engine.set_tempo(175.0).is_ok());
    assert_eq!(engine.tempo().bpm(), 175.0);
    assert!(engine.set_tempo(0.0).is_err());
    assert_eq!(engine.tempo().bpm(), 175.0);
    engine.stop();
}
