//! Configuration store: the one live [`Settings`] instance.
//!
//! ```text
//!   boot:    flash bytes ──▶ validate ──┬─▶ live settings (Flash)
//!                                       ├─▶ migrate ──▶ live (Migrated)
//!                                       └─▶ defaults ──▶ live (Defaults)
//!
//!   commit:  clone ──▶ mutate ──▶ validate_settings ──▶ seal ──▶ flash
//!                                                        │
//!                                   read-back verify ◀───┘
//!                                          │ ok
//!                                   swap live settings
//! ```
//!
//! Readers borrow the store shared (`get`), a commit needs it exclusively,
//! so a reader can never observe a half-applied change.  The staged copy
//! only replaces the live one after the sealed image is durably written
//! and read back.  Across tasks the same discipline is provided by
//! [`SharedConfigStore`].

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, FlashPort};
use crate::config::layout::changed_spans;
use crate::config::{Settings, validate_settings};
use crate::envelope::{self, IntegrityError, SettingsDescriptor, TRAILER_LEN};
use crate::error::ConfigError;

/// Converts an image of an older layout into current settings.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub from_version: u32,
    /// Receives the complete stored image.  `None` rejects it.
    pub migrate: fn(&[u8]) -> Option<Settings>,
}

/// Where the live settings came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
    Flash,
    Migrated { from: u32 },
    Defaults { reason: IntegrityError },
}

pub struct ConfigStore {
    live: Box<Settings>,
    /// Sealed form of `live`.
    image: SettingsDescriptor,
    /// `image` is known to be the content of flash.
    persisted: bool,
    origin: LoadOrigin,
}

impl ConfigStore {
    /// Store holding compiled-in defaults, not yet persisted.
    pub fn with_defaults(reason: IntegrityError) -> Self {
        let live = Box::new(Settings::default());
        let image = envelope::seal(&live);
        Self {
            live,
            image,
            persisted: false,
            origin: LoadOrigin::Defaults { reason },
        }
    }

    /// Build the store from the raw bytes read at boot.
    ///
    /// Never fails: anything that does not validate (or migrate) is
    /// replaced by defaults and reported through `sink`.
    pub fn load(raw: &[u8], migrations: &[Migration], sink: &mut impl EventSink) -> Self {
        match envelope::validate(raw) {
            Ok(settings) => {
                if let Err(msg) = validate_settings(&settings) {
                    let e = IntegrityError::OutOfRange(msg);
                    error!("configuration rejected ({e}), using defaults");
                    sink.emit(&AppEvent::ConfigurationCorrupt(e));
                    return Self::with_defaults(e);
                }
                info!("configuration loaded from flash");
                let live = Box::new(settings);
                let image = envelope::seal(&live);
                // Delta commits diff against `image`, so it must be exactly
                // what flash holds.
                let persisted = raw.get(..image.as_bytes().len()) == Some(image.as_bytes());
                if !persisted {
                    warn!("stored image is not canonical, next commit rewrites it in full");
                }
                Self {
                    live,
                    image,
                    persisted,
                    origin: LoadOrigin::Flash,
                }
            }
            Err(IntegrityError::VersionMismatch { found, supported }) => {
                warn!("configuration version {found} (supported {supported})");
                sink.emit(&AppEvent::VersionMismatch { found, supported });
                match Self::migrate(raw, found, migrations) {
                    Some(settings) => {
                        info!("configuration migrated from version {found}");
                        sink.emit(&AppEvent::ConfigurationMigrated { from: found });
                        let live = Box::new(settings);
                        let image = envelope::seal(&live);
                        Self {
                            live,
                            image,
                            persisted: false,
                            origin: LoadOrigin::Migrated { from: found },
                        }
                    }
                    None => {
                        warn!("no migration from version {found}, using defaults");
                        Self::with_defaults(IntegrityError::VersionMismatch { found, supported })
                    }
                }
            }
            Err(IntegrityError::Erased) => {
                info!("settings flash blank, using defaults");
                Self::with_defaults(IntegrityError::Erased)
            }
            Err(e) => {
                error!("configuration corrupt ({e}), using defaults");
                sink.emit(&AppEvent::ConfigurationCorrupt(e));
                Self::with_defaults(e)
            }
        }
    }

    fn migrate(raw: &[u8], found: u32, migrations: &[Migration]) -> Option<Settings> {
        let migration = migrations.iter().find(|m| m.from_version == found)?;
        let settings = (migration.migrate)(raw)?;
        match validate_settings(&settings) {
            Ok(()) => Some(settings),
            Err(msg) => {
                warn!("migrated configuration rejected: {msg}");
                None
            }
        }
    }

    /// The live settings.
    pub fn get(&self) -> &Settings {
        &self.live
    }

    pub fn origin(&self) -> LoadOrigin {
        self.origin
    }

    /// Sealed image of the live settings.
    pub fn image(&self) -> &SettingsDescriptor {
        &self.image
    }

    /// `true` once the live settings are known to be in flash.
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Write the live settings as they are (e.g. after a migration).
    pub fn persist(&mut self, flash: &mut impl FlashPort) -> Result<(), ConfigError> {
        let image = self.image.clone();
        self.write_full(flash, &image)?;
        self.persisted = true;
        Ok(())
    }

    /// Apply `mutator` to a copy of the live settings, validate, seal and
    /// write the whole image.  The live settings change only on success.
    pub fn stage_and_commit<F>(&mut self, flash: &mut impl FlashPort, mutator: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut Settings),
    {
        let (staged, sealed) = self.stage(mutator)?;
        self.write_full(flash, &sealed)?;
        self.swap(staged, sealed);
        Ok(())
    }

    /// Like [`stage_and_commit`](Self::stage_and_commit), but programs only
    /// the bytes that differ from the image already in flash.
    pub fn stage_and_commit_delta<F>(
        &mut self,
        flash: &mut impl FlashPort,
        mutator: F,
    ) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut Settings),
    {
        let (staged, sealed) = self.stage(mutator)?;
        if !self.persisted {
            self.write_full(flash, &sealed)?;
            self.swap(staged, sealed);
            return Ok(());
        }

        let old = self.image.as_bytes();
        let new = sealed.as_bytes();
        let mut spans = changed_spans(old, new);
        // Any payload change must also land the trailer.
        let trailer = new.len() - TRAILER_LEN..new.len();
        if let Some(last) = spans.last_mut() {
            if last.end <= trailer.start {
                spans.push(trailer);
            } else if last.end < trailer.end {
                last.end = trailer.end;
            }
        }

        for span in spans {
            if let Err(e) = flash.program(span.start, &new[span.clone()]) {
                self.persisted = false;
                return Err(ConfigError::WriteFailed(e));
            }
        }
        self.verify(flash, &sealed)?;
        self.swap(staged, sealed);
        Ok(())
    }

    fn stage<F>(&self, mutator: F) -> Result<(Box<Settings>, SettingsDescriptor), ConfigError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut staged = self.live.clone();
        mutator(&mut staged);
        validate_settings(&staged).map_err(ConfigError::ValidationFailed)?;
        let sealed = envelope::seal(&staged);
        Ok((staged, sealed))
    }

    fn write_full(&mut self, flash: &mut impl FlashPort, sealed: &SettingsDescriptor) -> Result<(), ConfigError> {
        if let Err(e) = flash.write_image(sealed.as_bytes()) {
            self.persisted = false;
            return Err(ConfigError::WriteFailed(e));
        }
        self.verify(flash, sealed)
    }

    fn verify(&mut self, flash: &mut impl FlashPort, sealed: &SettingsDescriptor) -> Result<(), ConfigError> {
        let readback = flash.read_image().map_err(|_| ConfigError::VerifyFailed);
        match readback {
            Ok(bytes) if bytes.get(..sealed.as_bytes().len()) == Some(sealed.as_bytes()) => Ok(()),
            _ => {
                // Flash now holds neither the old nor the new image.
                self.persisted = false;
                Err(ConfigError::VerifyFailed)
            }
        }
    }

    fn swap(&mut self, staged: Box<Settings>, sealed: SettingsDescriptor) {
        info!("configuration committed (crc 0x{:08X})", sealed.crc());
        self.live = staged;
        self.image = sealed;
        self.persisted = true;
    }
}

/// [`ConfigStore`] shared between tasks.
///
/// Readers and the committing writer exclude each other through a
/// critical-section mutex.  Reads run inside the lock and must stay short.
pub struct SharedConfigStore {
    inner: Mutex<CriticalSectionRawMutex, RefCell<ConfigStore>>,
}

impl SharedConfigStore {
    pub fn new(store: ConfigStore) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(store)),
        }
    }

    /// Run `f` against the live settings.
    pub fn read<R>(&self, f: impl FnOnce(&Settings) -> R) -> R {
        self.inner.lock(|cell| f(cell.borrow().get()))
    }

    pub fn stage_and_commit<F>(&self, flash: &mut impl FlashPort, mutator: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut Settings),
    {
        self.inner
            .lock(|cell| cell.borrow_mut().stage_and_commit(flash, mutator))
    }

    pub fn into_inner(self) -> ConfigStore {
        self.inner.into_inner().into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::FlashError;
    use crate::envelope::{CONFIGURATION_VERSION, DESCRIPTOR_LEN};

    #[derive(Default)]
    struct Events(Vec<AppEvent>);

    impl EventSink for Events {
        fn emit(&mut self, event: &AppEvent) {
            self.0.push(event.clone());
        }
    }

    struct RamFlash {
        bytes: Vec<u8>,
        fail_writes: bool,
        programmed: usize,
    }

    impl RamFlash {
        fn blank() -> Self {
            Self {
                bytes: vec![0xFF; DESCRIPTOR_LEN],
                fail_writes: false,
                programmed: 0,
            }
        }
    }

    impl FlashPort for RamFlash {
        fn read_image(&mut self) -> Result<Vec<u8>, FlashError> {
            Ok(self.bytes.clone())
        }
        fn write_image(&mut self, image: &[u8]) -> Result<(), FlashError> {
            if self.fail_writes {
                return Err(FlashError::WriteFailed);
            }
            self.bytes = image.to_vec();
            self.programmed += image.len();
            Ok(())
        }
        fn program(&mut self, offset: usize, bytes: &[u8]) -> Result<(), FlashError> {
            if self.fail_writes {
                return Err(FlashError::WriteFailed);
            }
            self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
            self.programmed += bytes.len();
            Ok(())
        }
    }

    #[test]
    fn blank_flash_loads_defaults_quietly() {
        let mut ev = Events::default();
        let store = ConfigStore::load(&[0xFF; DESCRIPTOR_LEN], &[], &mut ev);
        assert_eq!(store.get(), &Settings::default());
        assert_eq!(store.origin(), LoadOrigin::Defaults { reason: IntegrityError::Erased });
        assert!(ev.0.is_empty());
    }

    #[test]
    fn corrupt_image_reports_and_falls_back() {
        let mut s = Settings::default();
        s.beeper_frequency = 1234;
        let mut image = envelope::seal(&s).into_bytes();
        image[500] ^= 0x10;

        let mut ev = Events::default();
        let store = ConfigStore::load(&image, &[], &mut ev);
        assert_eq!(store.get().beeper_frequency, Settings::default().beeper_frequency);
        assert!(matches!(
            ev.0.as_slice(),
            [AppEvent::ConfigurationCorrupt(IntegrityError::CrcMismatch { .. })]
        ));
    }

    #[test]
    fn previous_version_without_migration_resets() {
        let mut image = envelope::seal(&Settings::default()).into_bytes();
        image[4..8].copy_from_slice(&(CONFIGURATION_VERSION - 1).to_le_bytes());
        let mut ev = Events::default();
        let store = ConfigStore::load(&image, &[], &mut ev);
        assert_eq!(store.get(), &Settings::default());
        assert_eq!(
            ev.0,
            vec![AppEvent::VersionMismatch {
                found: 5,
                supported: 6
            }]
        );
    }

    #[test]
    fn registered_migration_is_applied() {
        fn from_v5(_raw: &[u8]) -> Option<Settings> {
            let mut s = Settings::default();
            s.beeper_frequency = 3100;
            Some(s)
        }
        let mut image = envelope::seal(&Settings::default()).into_bytes();
        image[4..8].copy_from_slice(&5u32.to_le_bytes());

        let mut ev = Events::default();
        let migrations = [Migration {
            from_version: 5,
            migrate: from_v5,
        }];
        let store = ConfigStore::load(&image, &migrations, &mut ev);
        assert_eq!(store.origin(), LoadOrigin::Migrated { from: 5 });
        assert_eq!(store.get().beeper_frequency, 3100);
        assert!(!store.is_persisted());
    }

    #[test]
    fn commit_swaps_only_after_write() {
        let mut flash = RamFlash::blank();
        let mut store = ConfigStore::with_defaults(IntegrityError::Erased);

        store
            .stage_and_commit(&mut flash, |s| s.startup_time_s = 30)
            .unwrap();
        assert_eq!(store.get().startup_time_s, 30);
        assert_eq!(envelope::validate(&flash.bytes).map(|s| s.startup_time_s), Ok(30));

        flash.fail_writes = true;
        let err = store.stage_and_commit(&mut flash, |s| s.startup_time_s = 45);
        assert_eq!(err, Err(ConfigError::WriteFailed(FlashError::WriteFailed)));
        assert_eq!(store.get().startup_time_s, 30);
    }

    #[test]
    fn invalid_change_is_rejected_before_write() {
        let mut flash = RamFlash::blank();
        let mut store = ConfigStore::with_defaults(IntegrityError::Erased);
        let err = store.stage_and_commit(&mut flash, |s| s.nr_of_sensors = 500);
        assert!(matches!(err, Err(ConfigError::ValidationFailed(_))));
        assert_eq!(flash.programmed, 0);
    }

    #[test]
    fn delta_commit_programs_changed_bytes_only() {
        let mut flash = RamFlash::blank();
        let mut store = ConfigStore::with_defaults(IntegrityError::Erased);
        store.persist(&mut flash).unwrap();
        flash.programmed = 0;

        store
            .stage_and_commit_delta(&mut flash, |s| s.sensors[90].alarms[1].on_delay = 30)
            .unwrap();
        assert!(flash.programmed <= 16, "programmed {} bytes", flash.programmed);
        assert_eq!(flash.bytes, store.image().as_bytes());
        assert_eq!(
            envelope::validate(&flash.bytes).map(|s| s.sensors[90].alarms[1].on_delay),
            Ok(30)
        );
    }

    #[test]
    fn shared_store_reads_and_commits() {
        let mut flash = RamFlash::blank();
        let shared = SharedConfigStore::new(ConfigStore::with_defaults(IntegrityError::Erased));
        shared
            .stage_and_commit(&mut flash, |s| s.relays[7].pulsating = true)
            .unwrap();
        assert!(shared.read(|s| s.relays[7].pulsating));
        assert!(shared.into_inner().is_persisted());
    }
}
