//! End-to-end lifecycle tests: connect, allocate device objects, commit a
//! config, run, and shut down — all against a [`MockSerialLink`] so no real
//! port is needed.

use mcu_host::stepcompress::QueuedItem;
use mcu_host::{ConfigResponse, McuError, McuEvent, McuSession, McuSessionConfig, MockSerialLink};
use mcu_proto::Dictionary;

fn dict() -> Dictionary {
    Dictionary::stub(1_000_000, "integration-mcu")
}

fn session_with_no_devices() -> McuSession<MockSerialLink> {
    let link = MockSerialLink::new(dict());
    McuSession::connect(link, McuSessionConfig::default()).unwrap()
}

fn commit_with_matching_crc(session: &mut McuSession<MockSerialLink>, move_count: usize) {
    let expected_crc = session.preview_config_crc();
    session
        .link_mut()
        .queue_config_response(ConfigResponse { is_config: true, crc: expected_crc, move_count });
    session.build_config().unwrap();
}

#[test]
fn empty_config_handshake_commits_on_first_crc_match() {
    let mut session = session_with_no_devices();
    commit_with_matching_crc(&mut session, 4);
}

#[test]
fn firmware_requesting_config_twice_gets_the_commands_resent() {
    let mut session = session_with_no_devices();
    session.create_digital_out("PC6", 2.0).unwrap();
    let expected_crc = session.preview_config_crc();
    session
        .link_mut()
        .queue_config_response(ConfigResponse { is_config: false, crc: 0, move_count: 0 });
    session
        .link_mut()
        .queue_config_response(ConfigResponse { is_config: true, crc: expected_crc, move_count: 8 });
    session.build_config().unwrap();
    assert!(session.link().sent().iter().any(|c| c.name == "config_digital_out"));
}

#[test]
fn single_stepper_compresses_a_uniform_move_into_one_command() {
    let mut session = session_with_no_devices();
    let oid = session.create_stepper("PA0", "PA1", 0, 25).unwrap();
    commit_with_matching_crc(&mut session, 10);

    for t in [1000i64, 1500, 2000] {
        session.steppers_mut()[0].step(t);
    }
    // A point far enough away that it can't join the uniform run forces the
    // compressor to commit it as a queue_step command; otherwise it would
    // still be sitting in the open (uncommitted) run.
    session.steppers_mut()[0].step(1_000_000);
    let dispatch = session.flush_moves(0.01).unwrap();
    let step_items: Vec<_> = dispatch
        .iter()
        .filter(|d| d.stepper_oid == oid)
        .filter(|d| matches!(d.item, QueuedItem::Step { .. }))
        .collect();
    assert_eq!(step_items.len(), 1);
}

#[test]
fn direction_change_is_recorded_once_per_transition() {
    let mut session = session_with_no_devices();
    session.create_stepper("PA0", "PA1", 0, 25).unwrap();
    commit_with_matching_crc(&mut session, 10);

    session.steppers_mut()[0].set_next_step_dir(1, 0);
    session.steppers_mut()[0].set_next_step_dir(1, 1000); // same direction, no new command
    session.steppers_mut()[0].set_next_step_dir(0, 2000); // flips

    let dispatch = session.flush_moves(1.0).unwrap();
    let dir_changes = dispatch
        .iter()
        .filter(|d| matches!(&d.item, QueuedItem::Raw { command, .. } if command.name == "set_next_step_dir"))
        .count();
    assert_eq!(dir_changes, 2);
}

#[test]
fn clock_window_overrun_triggers_an_automatic_reset() {
    let mut session = session_with_no_devices();
    session.create_stepper("PA0", "PA1", 0, 25).unwrap();
    commit_with_matching_crc(&mut session, 10);

    // The very first direction set always resets (no prior move clock to
    // compare against), so the overrun below is the *second* reset.
    session.steppers_mut()[0].set_next_step_dir(1, 0);
    session.steppers_mut()[0].set_next_step_dir(1, (1 << 29) + 10);

    let dispatch = session.flush_moves(1000.0).unwrap();
    let resets = dispatch
        .iter()
        .filter(|d| matches!(&d.item, QueuedItem::Raw { command, .. } if command.name == "reset_step_clock"))
        .count();
    assert_eq!(resets, 2);
}

#[test]
fn crc_mismatch_is_reported_as_a_fatal_config_mismatch() {
    let mut session = session_with_no_devices();
    session.create_stepper("PA0", "PA1", 0, 25).unwrap();
    session
        .link_mut()
        .queue_config_response(ConfigResponse { is_config: true, crc: 0x1111_1111, move_count: 10 });
    let err = session.build_config().unwrap_err();
    assert!(matches!(err, McuError::ConfigMismatch { .. }));
}

#[test]
fn shutdown_event_is_observed_exactly_once() {
    let mut session = session_with_no_devices();
    commit_with_matching_crc(&mut session, 10);
    session
        .link_mut()
        .push_event(McuEvent::Shutdown { message: "heater fault".to_string() });
    let err = session.pump().unwrap_err();
    assert!(matches!(err, McuError::FirmwareShutdown { .. }));
    assert!(session.is_shutdown());

    // A second shutdown report doesn't re-log, but pump still reports the
    // mcu as down until the caller tears the session down.
    session
        .link_mut()
        .push_event(McuEvent::Shutdown { message: "heater fault again".to_string() });
    let err = session.pump().unwrap_err();
    assert!(matches!(err, McuError::FirmwareShutdown { .. }));
}

#[test]
fn digital_out_and_pwm_runtime_commands_actually_reach_the_link() {
    let mut session = session_with_no_devices();
    let dout = session.create_digital_out("PC6", 2.0).unwrap();
    let pwm = session.create_pwm("PC7", 1000, 2.0).unwrap();
    commit_with_matching_crc(&mut session, 10);

    session.set_digital_out(dout, 100, 1).unwrap();
    session.set_pwm_out(pwm, 200, 512).unwrap();

    let sent = session.link().sent();
    assert!(sent.iter().any(|c| c.name == "schedule_digital_out"));
    assert!(sent.iter().any(|c| c.name == "schedule_pwm_out"));
}

#[test]
fn homing_sequence_reaches_the_link_and_home_finalize_resets_the_stepper() {
    let mut session = session_with_no_devices();
    let stepper = session.create_stepper("PA0", "PA1", 0, 25).unwrap();
    let endstop = session.create_endstop("^PB3", stepper).unwrap();
    commit_with_matching_crc(&mut session, 10);

    session.steppers_mut()[0].set_next_step_dir(1, 0);
    session.home_endstop(endstop, 0, 10).unwrap();
    assert!(session.poll_endstop(endstop).unwrap());
    assert!(session.link().sent().iter().any(|c| c.name == "end_stop_home"));

    session.home_finalize(endstop).unwrap();
    assert_eq!(session.link().flush_count(), 1);

    // note_stepper_stop forgot the stepper's direction memory, so the same
    // direction requested again still produces a fresh command.
    session.steppers_mut()[0].set_next_step_dir(1, 1000);
    let dispatch = session.flush_moves(1000.0).unwrap();
    assert!(dispatch
        .iter()
        .any(|d| matches!(&d.item, QueuedItem::Raw { command, .. } if command.name == "set_next_step_dir")));
}

#[test]
fn adc_query_reaches_the_link() {
    let mut session = session_with_no_devices();
    let adc = session.create_adc("PA3").unwrap();
    commit_with_matching_crc(&mut session, 10);

    session.query_adc(adc, 5000).unwrap();
    assert!(session.link().sent().iter().any(|c| c.name == "query_analog_in"));
}
