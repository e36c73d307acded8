//! Integration tests: configuration store against the flash adapter.

use gasctl::adapters::flash::MemoryFlash;
use gasctl::app::events::AppEvent;
use gasctl::app::ports::FlashPort;
use gasctl::app::service::AppService;
use gasctl::config::Settings;
use gasctl::config::layout::{LayoutError, PAYLOAD_LEN, offsets};
use gasctl::envelope::{self, CONFIGURATION_VERSION, HEADER_LEN, IntegrityError};
use gasctl::error::ConfigError;
use gasctl::store::{ConfigStore, LoadOrigin, Migration, SharedConfigStore};

use crate::mock_hw::{MockHw, RecordingSink};

fn image_with_version(settings: &Settings, version: u32) -> Vec<u8> {
    let mut image = envelope::seal(settings).into_bytes();
    image[4..8].copy_from_slice(&version.to_le_bytes());
    image
}

/// Version 5 used the same payload; only the header word differs.
fn from_v5(raw: &[u8]) -> Option<Settings> {
    let mut image = raw.to_vec();
    image[4..8].copy_from_slice(&CONFIGURATION_VERSION.to_le_bytes());
    envelope::validate(&image).ok()
}

/// Overwrite one payload byte and fix up the CRC, as a foreign tool might.
fn patch_payload(image: &mut [u8], payload_offset: usize, value: u8) {
    image[offsets::descriptor_offset(payload_offset)] = value;
    let crc = envelope::crc32(&image[HEADER_LEN..HEADER_LEN + PAYLOAD_LEN]);
    let at = HEADER_LEN + PAYLOAD_LEN + 4;
    image[at..at + 4].copy_from_slice(&crc.to_le_bytes());
}

const MIGRATIONS: &[Migration] = &[Migration {
    from_version: 5,
    migrate: from_v5,
}];

fn loaded(settings: &Settings) -> (ConfigStore, MemoryFlash) {
    let mut flash = MemoryFlash::with_image(envelope::seal(settings).as_bytes());
    let raw = flash.read_image().unwrap();
    let store = ConfigStore::load(&raw, &[], &mut RecordingSink::new());
    (store, flash)
}

// ── Load ──────────────────────────────────────────────────────

#[test]
fn older_version_is_migrated_and_persisted_at_boot() {
    let mut settings = Settings::default();
    settings.serial_nr = 4711;
    let mut hw = MockHw::new();
    hw.flash = MemoryFlash::with_image(&image_with_version(&settings, 5));

    let mut sink = RecordingSink::new();
    let svc = AppService::boot(&mut hw, MIGRATIONS, &mut sink);

    assert_eq!(svc.store().origin(), LoadOrigin::Migrated { from: 5 });
    assert_eq!(svc.settings().serial_nr, 4711);
    assert!(sink.contains(&AppEvent::VersionMismatch {
        found: 5,
        supported: CONFIGURATION_VERSION
    }));
    assert!(sink.contains(&AppEvent::ConfigurationMigrated { from: 5 }));
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ConfigurationCommitted { .. })), 1);
    assert_eq!(envelope::peek_version(hw.flash.contents()), Some(CONFIGURATION_VERSION));
    assert!(svc.store().is_persisted());
}

#[test]
fn unknown_version_falls_back_without_corruption_report() {
    let mut sink = RecordingSink::new();
    let raw = image_with_version(&Settings::default(), 4);
    let store = ConfigStore::load(&raw, MIGRATIONS, &mut sink);

    assert_eq!(
        store.origin(),
        LoadOrigin::Defaults {
            reason: IntegrityError::VersionMismatch {
                found: 4,
                supported: CONFIGURATION_VERSION
            }
        }
    );
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ConfigurationCorrupt(_))), 0);
    assert!(!store.is_persisted());
}

#[test]
fn truncated_image_is_corrupt() {
    let image = envelope::seal(&Settings::default()).into_bytes();
    let mut sink = RecordingSink::new();
    let store = ConfigStore::load(&image[..100], &[], &mut sink);

    assert!(sink.contains(&AppEvent::ConfigurationCorrupt(IntegrityError::Truncated { len: 100 })));
    assert_eq!(store.get(), &Settings::default());
}

#[test]
fn non_canonical_flag_byte_is_rejected() {
    let mut image = envelope::seal(&Settings::default()).into_bytes();
    let at = offsets::sensor(0) + offsets::sensor_field::ACTIVE;
    patch_payload(&mut image, at, 2);
    let mut flash = MemoryFlash::with_image(&image);

    let mut sink = RecordingSink::new();
    let raw = flash.read_image().unwrap();
    let mut store = ConfigStore::load(&raw, &[], &mut sink);
    assert!(sink.contains(&AppEvent::ConfigurationCorrupt(IntegrityError::Malformed(
        LayoutError::InvalidFlags { offset: at, value: 2 }
    ))));
    assert!(!store.is_persisted());

    // The first commit rewrites the whole image, leaving flash valid.
    store
        .stage_and_commit_delta(&mut flash, |s| s.beeper_frequency = 1234)
        .unwrap();
    assert_eq!(envelope::validate(flash.contents()).unwrap().beeper_frequency, 1234);
}

#[test]
fn out_of_range_settings_fall_back_to_defaults() {
    let mut settings = Settings::default();
    settings.relays[1].max_on_time = 5000;
    let mut sink = RecordingSink::new();
    let store = ConfigStore::load(envelope::seal(&settings).as_bytes(), &[], &mut sink);

    let expected = IntegrityError::OutOfRange("relay max_on_time must be 0–4095");
    assert_eq!(store.origin(), LoadOrigin::Defaults { reason: expected });
    assert!(sink.contains(&AppEvent::ConfigurationCorrupt(expected)));
    assert_eq!(store.get(), &Settings::default());

    let mut settings = Settings::default();
    settings.nr_of_sensors = 900;
    let store = ConfigStore::load(envelope::seal(&settings).as_bytes(), &[], &mut sink);
    assert!(matches!(
        store.origin(),
        LoadOrigin::Defaults {
            reason: IntegrityError::OutOfRange(_)
        }
    ));
}

// ── Commit ────────────────────────────────────────────────────

#[test]
fn delta_commit_after_load_survives_reboot() {
    let mut settings = Settings::default();
    settings.serial_nr = 77;
    let (mut store, mut flash) = loaded(&settings);
    assert!(store.is_persisted());

    store
        .stage_and_commit_delta(&mut flash, |s| s.beeper_frequency = 1234)
        .unwrap();

    let mut sink = RecordingSink::new();
    let raw = flash.read_image().unwrap();
    let reloaded = ConfigStore::load(&raw, &[], &mut sink);
    assert_eq!(reloaded.origin(), LoadOrigin::Flash);
    assert!(reloaded.is_persisted());
    assert_eq!(reloaded.get().beeper_frequency, 1234);
    assert_eq!(reloaded.get().serial_nr, 77);
    assert!(sink.events.is_empty());
}

#[test]
fn delta_commit_programs_only_changed_words_and_trailer() {
    let (mut store, mut flash) = loaded(&Settings::default());
    let writes = flash.write_count();

    store
        .stage_and_commit_delta(&mut flash, |s| s.sensors[3].alarms[2].on_level = 66)
        .unwrap();

    assert_eq!(flash.write_count() - writes, 2);
    let stored = envelope::validate(flash.contents()).unwrap();
    assert_eq!(stored.sensors[3].alarms[2].on_level, 66);
    assert_eq!(&stored, store.get());
}

#[test]
fn unchanged_commit_programs_nothing() {
    let (mut store, mut flash) = loaded(&Settings::default());
    let writes = flash.write_count();
    store.stage_and_commit_delta(&mut flash, |_| {}).unwrap();
    assert_eq!(flash.write_count(), writes);
}

#[test]
fn failed_verify_forces_full_rewrite_next_time() {
    let (mut store, mut flash) = loaded(&Settings::default());
    flash.set_corrupt_at(Some(envelope::HEADER_LEN + 3));

    let err = store
        .stage_and_commit_delta(&mut flash, |s| s.beeper_frequency = 1500)
        .unwrap_err();
    assert_eq!(err, ConfigError::VerifyFailed);
    assert_eq!(store.get().beeper_frequency, Settings::default().beeper_frequency);
    assert!(!store.is_persisted());

    flash.set_corrupt_at(None);
    store
        .stage_and_commit_delta(&mut flash, |s| s.beeper_frequency = 1500)
        .unwrap();
    assert!(store.is_persisted());
    assert_eq!(envelope::validate(flash.contents()).unwrap().beeper_frequency, 1500);
}

#[test]
fn full_commit_replaces_whole_image() {
    let (mut store, mut flash) = loaded(&Settings::default());
    store
        .stage_and_commit(&mut flash, |s| {
            s.nr_of_sensors = 128;
            s.nr_of_relays = 128;
        })
        .unwrap();
    let stored = envelope::validate(flash.contents()).unwrap();
    assert_eq!(stored.sensor_count(), 128);
    assert_eq!(stored.relay_count(), 128);
}

#[test]
fn shared_store_reads_committed_settings() {
    let (store, mut flash) = loaded(&Settings::default());
    let shared = SharedConfigStore::new(store);

    shared
        .stage_and_commit(&mut flash, |s| s.startup_time_s = 120)
        .unwrap();
    assert_eq!(shared.read(|s| s.startup_time_s), 120);

    let err = shared
        .stage_and_commit(&mut flash, |s| s.nr_of_relays = 300)
        .unwrap_err();
    assert!(matches!(err, ConfigError::ValidationFailed(_)));
    assert_eq!(shared.into_inner().get().nr_of_relays, Settings::default().nr_of_relays);
}
