use midimux::tempo::{TapTempo, TempoState};

const BPM_TOLERANCE: f64 = 1e-9;

#[test]
fn constant_taps_estimate_sixty_over_interval() {
    let tempo = TempoState::new(100.0);
    let mut tap = TapTempo::new(80.0, 200.0);

    assert_eq!(tap.record_tap(0.0, &tempo), None);
    let bpm = tap.record_tap(0.5, &tempo).expect("estimate after 2 taps");
    assert!((bpm - 120.0).abs() < BPM_TOLERANCE, "got {}", bpm);
    assert!((tempo.bpm() - 120.0).abs() < BPM_TOLERANCE);

    // More taps at the same interval keep the estimate stable
    let bpm = tap.record_tap(1.0, &tempo).unwrap();
    assert!((bpm - 120.0).abs() < BPM_TOLERANCE, "got {}", bpm);
}

#[test]
fn window_keeps_only_recent_taps() {
    let tempo = TempoState::new(100.0);
    let mut tap = TapTempo::new(80.0, 200.0);

    // Start at 0.5s intervals, then speed up to 0.4s. Once the 4-slot
    // window holds only 0.4s intervals the old tempo is fully evicted.
    for ts in [0.0, 0.5, 1.0] {
        tap.record_tap(ts, &tempo);
    }
    let mut bpm = 0.0;
    for ts in [1.4, 1.8, 2.2, 2.6] {
        bpm = tap.record_tap(ts, &tempo).unwrap();
    }
    assert!((bpm - 150.0).abs() < BPM_TOLERANCE, "got {}", bpm);
}

#[test]
fn long_pause_resets_the_window() {
    let tempo = TempoState::new(100.0);
    let mut tap = TapTempo::new(80.0, 200.0);

    tap.record_tap(0.0, &tempo);
    tap.record_tap(0.5, &tempo);
    assert!((tempo.bpm() - 120.0).abs() < BPM_TOLERANCE);

    // 9.5s gap: the player stopped tapping; no new estimate, tempo retained
    assert_eq!(tap.record_tap(10.0, &tempo), None);
    assert!((tempo.bpm() - 120.0).abs() < BPM_TOLERANCE);

    // The estimate after the reset depends only on taps from the reset on
    let bpm = tap.record_tap(10.4, &tempo).expect("fresh estimate");
    assert!((bpm - 150.0).abs() < BPM_TOLERANCE, "got {}", bpm);
}

#[test]
fn bounce_taps_reset_the_window() {
    let tempo = TempoState::new(100.0);
    let mut tap = TapTempo::new(80.0, 200.0);

    tap.record_tap(0.0, &tempo);
    tap.record_tap(0.5, &tempo);
    // 0.1s is faster than the 200 BPM ceiling allows; treated as a bounce
    assert_eq!(tap.record_tap(0.6, &tempo), None);
    assert!((tempo.bpm() - 120.0).abs() < BPM_TOLERANCE);
}

#[test]
fn tempo_state_rejects_out_of_range() {
    let tempo = TempoState::with_limits(120.0, 20.0, 300.0);
    assert!(tempo.set_bpm(19.9).is_err());
    assert!(tempo.set_bpm(300.1).is_err());
    assert!(tempo.set_bpm(f64::INFINITY).is_err());
    assert_eq!(tempo.bpm(), 120.0);

    assert!(tempo.set_bpm(180.0).is_ok());
    assert_eq!(tempo.bpm(), 180.0);
}

#[test]
fn pulse_interval_tracks_tempo_changes() {
    let tempo = TempoState::new(120.0);
    let before = tempo.pulse_interval();
    tempo.set_bpm(240.0).unwrap();
    let after = tempo.pulse_interval();
    assert!((before.as_secs_f64() / after.as_secs_f64() - 2.0).abs() < 1e-9);
}
