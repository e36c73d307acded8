//! Integration tests: AppService → gas detection → relays → coils.

use gasctl::Error;
use gasctl::app::commands::{AppCommand, ConfigEdit};
use gasctl::app::events::AppEvent;
use gasctl::app::service::AppService;
use gasctl::config::{RelayProperties, Settings};
use gasctl::envelope::{self, IntegrityError};
use gasctl::error::{CommandError, ConfigError};
use gasctl::gas::{AlarmLevel, AlarmState, FaultCode, InhibitKind, OperatingState};
use gasctl::store::LoadOrigin;

use crate::mock_hw::{MockHw, RecordingSink};

/// Defaults without the warm-up delay.
fn quick_settings() -> Settings {
    Settings {
        startup_time_s: 0,
        ..Settings::default()
    }
}

fn boot(settings: &Settings) -> (AppService, MockHw, RecordingSink) {
    let mut hw = MockHw::with_settings(settings);
    let mut sink = RecordingSink::new();
    let svc = AppService::boot(&mut hw, &[], &mut sink);
    (svc, hw, sink)
}

fn run(svc: &mut AppService, hw: &mut MockHw, sink: &mut RecordingSink, ticks: usize) {
    for _ in 0..ticks {
        svc.tick(1, hw, sink);
    }
}

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn blank_flash_boots_on_defaults_quietly() {
    let mut hw = MockHw::new();
    let mut sink = RecordingSink::new();
    let svc = AppService::boot(&mut hw, &[], &mut sink);

    assert_eq!(svc.settings(), &Settings::default());
    assert_eq!(
        svc.store().origin(),
        LoadOrigin::Defaults {
            reason: IntegrityError::Erased
        }
    );
    assert!(!svc.store().is_persisted());
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ConfigurationCorrupt(_))), 0);
    assert_eq!(hw.flash.write_count(), 0);
    assert!(matches!(sink.events.last(), Some(AppEvent::Started { sensors: 4, relays: 5, .. })));
}

#[test]
fn corrupt_flash_is_reported_and_defaults_used() {
    let mut settings = quick_settings();
    settings.nr_of_sensors = 7;
    let mut hw = MockHw::with_settings(&settings);
    hw.flash.contents_mut()[envelope::HEADER_LEN + 100] ^= 0x40;

    let mut sink = RecordingSink::new();
    let svc = AppService::boot(&mut hw, &[], &mut sink);

    assert_eq!(svc.settings(), &Settings::default());
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::ConfigurationCorrupt(IntegrityError::CrcMismatch { .. }))),
        1
    );
}

#[test]
fn stored_configuration_is_loaded() {
    let mut settings = quick_settings();
    settings.nr_of_sensors = 12;
    settings.sensors[11].active = true;
    let (svc, _hw, _sink) = boot(&settings);

    assert_eq!(svc.store().origin(), LoadOrigin::Flash);
    assert_eq!(svc.settings(), &settings);
    assert!(svc.store().is_persisted());
}

// ── Alarms → relays ───────────────────────────────────────────

#[test]
fn rising_gas_drives_alarm_relays_and_buzzer() {
    let (mut svc, mut hw, mut sink) = boot(&quick_settings());
    run(&mut svc, &mut hw, &mut sink, 1);
    assert_eq!(svc.sensor(0).map(|c| c.state()), Some(OperatingState::Active));
    // Fault relay is energized while all is well.
    assert!(hw.coil(0));
    assert!(!hw.coil(1));

    hw.set_value(0, 45);
    run(&mut svc, &mut hw, &mut sink, 1);
    assert!(hw.coil(1) && hw.coil(2));
    assert!(!hw.coil(3) && !hw.coil(4));
    assert!(!hw.buzzer);
    assert_eq!(sink.alarm_transitions(0, AlarmLevel::Level(0)), vec![AlarmState::On]);

    hw.set_value(0, 85);
    run(&mut svc, &mut hw, &mut sink, 1);
    assert!(hw.coil(3) && hw.coil(4));
    assert!(hw.buzzer);

    hw.set_value(0, 10);
    run(&mut svc, &mut hw, &mut sink, 1);
    assert!((1..=4).all(|r| !hw.coil(r)));
    assert!(!hw.buzzer);
    assert_eq!(
        sink.alarm_transitions(0, AlarmLevel::Level(3)),
        vec![AlarmState::On, AlarmState::Off]
    );
}

#[test]
fn startup_delay_suppresses_alarms() {
    let mut settings = quick_settings();
    settings.startup_time_s = 3;
    let (mut svc, mut hw, mut sink) = boot(&settings);
    hw.set_value(0, 90);

    run(&mut svc, &mut hw, &mut sink, 2);
    assert!(svc.in_startup());
    assert_eq!(svc.sensor(0).map(|c| c.state()), Some(OperatingState::Startup));
    assert!(!hw.coil(1));
    // Special-state relay signals startup by dropping the energized coil.
    assert!(!hw.coil(0));

    run(&mut svc, &mut hw, &mut sink, 1);
    assert!(sink.contains(&AppEvent::StartupComplete));
    assert!(hw.coil(1));
    assert!(hw.coil(0));
}

#[test]
fn shorter_startup_time_cuts_running_countdown() {
    let (mut svc, mut hw, mut sink) = boot(&Settings::default());
    hw.set_value(0, 45);
    run(&mut svc, &mut hw, &mut sink, 1);
    assert!(svc.in_startup());

    svc.handle_command(
        AppCommand::Configure(ConfigEdit::StartupTime { seconds: 2 }),
        &mut hw,
        &mut sink,
    )
    .unwrap();
    run(&mut svc, &mut hw, &mut sink, 1);
    assert!(svc.in_startup());
    run(&mut svc, &mut hw, &mut sink, 1);
    assert!(!svc.in_startup());
    assert!(sink.contains(&AppEvent::StartupComplete));
    assert!(hw.coil(1) && hw.coil(2));

    // A longer delay never restarts the warm-up.
    svc.handle_command(
        AppCommand::Configure(ConfigEdit::StartupTime { seconds: 30 }),
        &mut hw,
        &mut sink,
    )
    .unwrap();
    run(&mut svc, &mut hw, &mut sink, 1);
    assert!(!svc.in_startup());
}

#[test]
fn coarse_ticks_keep_delays_and_pulses_in_seconds() {
    let mut settings = quick_settings();
    settings.sensors[0].alarms[0].on_delay = 4;
    settings.relays[1].pulsating = true;
    let (mut svc, mut hw, mut sink) = boot(&settings);
    hw.set_value(0, 25);

    svc.tick(2, &mut hw, &mut sink);
    assert_eq!(svc.sensor(0).and_then(|c| c.alarm(0)), Some(AlarmState::OnDelayed));
    svc.tick(2, &mut hw, &mut sink);
    assert!(!hw.coil(1));

    let mut pattern = Vec::new();
    for _ in 0..4 {
        svc.tick(2, &mut hw, &mut sink);
        pattern.push(hw.coil(1));
    }
    assert_eq!(sink.alarm_transitions(0, AlarmLevel::Level(0)), vec![AlarmState::OnDelayed, AlarmState::On]);
    assert_eq!(pattern, vec![true, false, true, false]);
}

#[test]
fn manual_reset_relay_latches_until_acknowledged() {
    let (mut svc, mut hw, mut sink) = boot(&quick_settings());
    let latch = RelayProperties {
        active: true,
        manual_reset: true,
        ..RelayProperties::default()
    };
    svc.handle_command(
        AppCommand::Configure(ConfigEdit::Relay {
            relay: 1,
            properties: latch,
        }),
        &mut hw,
        &mut sink,
    )
    .unwrap();

    hw.set_value(0, 30);
    run(&mut svc, &mut hw, &mut sink, 1);
    hw.set_value(0, 0);
    run(&mut svc, &mut hw, &mut sink, 3);
    assert!(hw.coil(1), "latched relay must stay on after the alarm clears");

    svc.handle_command(AppCommand::AcknowledgeRelay { relay: 1 }, &mut hw, &mut sink)
        .unwrap();
    run(&mut svc, &mut hw, &mut sink, 1);
    assert!(!hw.coil(1));
}

#[test]
fn unplugged_sensor_trips_fault_relay_after_delay() {
    let (mut svc, mut hw, mut sink) = boot(&quick_settings());
    run(&mut svc, &mut hw, &mut sink, 1);
    hw.unplug(2);

    run(&mut svc, &mut hw, &mut sink, 5);
    assert_eq!(svc.sensor(2).map(|c| c.fault_alarm()), Some(AlarmState::OnDelayed));
    assert!(hw.coil(0));

    run(&mut svc, &mut hw, &mut sink, 10);
    let channel = svc.sensor(2).unwrap();
    assert_eq!(channel.fault_alarm(), AlarmState::On);
    assert_eq!(channel.primary_fault(), Some(FaultCode::SensorOffline));
    // Energized fault relay drops out.
    assert!(!hw.coil(0));
}

// ── Inhibit ───────────────────────────────────────────────────

#[test]
fn temporary_inhibit_releases_outputs() {
    let (mut svc, mut hw, mut sink) = boot(&quick_settings());
    hw.set_value(1, 50);
    run(&mut svc, &mut hw, &mut sink, 1);
    assert!(hw.coil(2));

    svc.handle_command(
        AppCommand::Inhibit {
            sensor: 1,
            kind: InhibitKind::Temporary,
        },
        &mut hw,
        &mut sink,
    )
    .unwrap();
    assert_eq!(svc.sensor(1).map(|c| c.state()), Some(OperatingState::GoingInactive));

    run(&mut svc, &mut hw, &mut sink, 1);
    assert_eq!(
        svc.sensor(1).map(|c| c.state()),
        Some(OperatingState::InactivatedTemporarily)
    );
    assert!(!hw.coil(2));
    // Special state on relay 1 (index 0).
    assert!(!hw.coil(0));
    // Temporary inhibits are not persisted.
    assert!(!svc.user_settings().is_inactive(1));

    svc.handle_command(AppCommand::ReleaseInhibit { sensor: 1 }, &mut hw, &mut sink)
        .unwrap();
    run(&mut svc, &mut hw, &mut sink, 1);
    assert_eq!(svc.sensor(1).map(|c| c.state()), Some(OperatingState::Active));
    assert!(hw.coil(2));
    assert!(hw.coil(0));
}

#[test]
fn permanent_inhibit_survives_reboot() {
    let (mut svc, mut hw, mut sink) = boot(&quick_settings());
    svc.handle_command(
        AppCommand::Inhibit {
            sensor: 3,
            kind: InhibitKind::Permanent,
        },
        &mut hw,
        &mut sink,
    )
    .unwrap();
    assert!(svc.user_settings().is_inactive(3));
    assert_eq!(sink.count(|e| matches!(e, AppEvent::UserSettingsSaved(_))), 1);

    let mut sink = RecordingSink::new();
    let mut svc = AppService::boot(&mut hw, &[], &mut sink);
    run(&mut svc, &mut hw, &mut sink, 1);
    assert_eq!(
        svc.sensor(3).map(|c| c.state()),
        Some(OperatingState::InactivatedPermanently)
    );

    svc.handle_command(AppCommand::ReleaseInhibit { sensor: 3 }, &mut hw, &mut sink)
        .unwrap();
    assert!(!svc.user_settings().is_inactive(3));
}

#[test]
fn commands_for_missing_slots_are_rejected() {
    let (mut svc, mut hw, mut sink) = boot(&quick_settings());
    let err = svc
        .handle_command(
            AppCommand::Inhibit {
                sensor: 4,
                kind: InhibitKind::Temporary,
            },
            &mut hw,
            &mut sink,
        )
        .unwrap_err();
    assert_eq!(err, Error::Command(CommandError::NoSuchSensor(4)));

    let err = svc
        .handle_command(AppCommand::AcknowledgeRelay { relay: 200 }, &mut hw, &mut sink)
        .unwrap_err();
    assert_eq!(err, Error::Command(CommandError::NoSuchRelay(200)));
}

#[test]
fn inhibit_on_inactive_slot_is_rejected() {
    let mut settings = quick_settings();
    settings.sensors[2].active = false;
    let (mut svc, mut hw, mut sink) = boot(&settings);

    let err = svc
        .handle_command(
            AppCommand::Inhibit {
                sensor: 2,
                kind: InhibitKind::Temporary,
            },
            &mut hw,
            &mut sink,
        )
        .unwrap_err();
    assert_eq!(err, Error::Command(CommandError::SensorInactive(2)));
    run(&mut svc, &mut hw, &mut sink, 1);
    assert_eq!(svc.sensor(2).map(|c| c.state()), Some(OperatingState::Off));
}

// ── Configuration changes ─────────────────────────────────────

#[test]
fn configure_commits_and_applies_new_thresholds() {
    let (mut svc, mut hw, mut sink) = boot(&quick_settings());
    hw.set_value(0, 25);
    run(&mut svc, &mut hw, &mut sink, 1);
    assert!(hw.coil(1));

    svc.handle_command(
        AppCommand::Configure(ConfigEdit::AlarmLevels {
            sensor: 0,
            level: 0,
            on_level: 30,
            off_level: 28,
        }),
        &mut hw,
        &mut sink,
    )
    .unwrap();
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ConfigurationCommitted { .. })), 1);

    let stored = envelope::validate(hw.flash.contents()).unwrap();
    assert_eq!(stored.sensors[0].alarms[0].on_level, 30);
    assert_eq!(&stored, svc.settings());

    run(&mut svc, &mut hw, &mut sink, 1);
    assert!(!hw.coil(1));
}

#[test]
fn invalid_configuration_is_rejected_and_old_one_kept() {
    let (mut svc, mut hw, mut sink) = boot(&quick_settings());
    let before = svc.settings().clone();
    let image_before = hw.flash.contents().to_vec();

    let err = svc
        .handle_command(
            AppCommand::Configure(ConfigEdit::AlarmLevels {
                sensor: 0,
                level: 0,
                on_level: 10,
                off_level: 20,
            }),
            &mut hw,
            &mut sink,
        )
        .unwrap_err();

    assert!(matches!(err, Error::Config(ConfigError::ValidationFailed(_))));
    assert_eq!(svc.settings(), &before);
    assert_eq!(hw.flash.contents(), image_before.as_slice());
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::ConfigurationWriteFailed(ConfigError::ValidationFailed(_)))),
        1
    );
}

#[test]
fn flash_failure_keeps_previous_configuration_live() {
    let (mut svc, mut hw, mut sink) = boot(&quick_settings());
    hw.flash.set_fail_writes(true);

    let err = svc
        .handle_command(
            AppCommand::Configure(ConfigEdit::StartupTime { seconds: 30 }),
            &mut hw,
            &mut sink,
        )
        .unwrap_err();

    assert!(matches!(err, Error::Config(ConfigError::WriteFailed(_))));
    assert_eq!(svc.settings().startup_time_s, 0);
}

#[test]
fn replacing_the_whole_configuration_resets_runtime() {
    let (mut svc, mut hw, mut sink) = boot(&quick_settings());
    hw.set_value(0, 45);
    run(&mut svc, &mut hw, &mut sink, 1);
    assert!(hw.coil(2));

    let mut next = quick_settings();
    next.nr_of_sensors = 2;
    for alarm in &mut next.sensors[0].alarms {
        alarm.on_level += 50;
        alarm.off_level += 50;
    }
    next.sensors[0].measuring_range = 200;
    svc.handle_command(
        AppCommand::Configure(ConfigEdit::Replace(Box::new(next.clone()))),
        &mut hw,
        &mut sink,
    )
    .unwrap();
    assert_eq!(svc.settings(), &next);
    assert_eq!(svc.sensor(0).and_then(|c| c.alarm(1)), Some(AlarmState::Off));

    run(&mut svc, &mut hw, &mut sink, 1);
    assert!(!hw.coil(1) && !hw.coil(2));
    assert_eq!(svc.sensor(3).map(|c| c.state()), Some(OperatingState::Off));
}
