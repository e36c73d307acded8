//! Application service: the hexagonal core.
//!
//! [`AppService`] owns the configuration store, the gas detection runtime
//! and the relay controller.  All I/O flows through port traits injected
//! at call sites, so the whole service runs against mock adapters.
//!
//! ```text
//!  SensorPort ──▶ ┌──────────────────────────┐ ──▶ EventSink
//!   ClockPort ──▶ │        AppService         │
//!   RelayPort ◀── │  Store · Gas · Relays     │ ◀── AppCommand
//!   FlashPort ◀─▶ └──────────────────────────┘
//! ```

use log::{info, warn};

use crate::config::MAX_RELAYS;
use crate::config::Settings;
use crate::config::user::UserSettings;
use crate::error::{CommandError, Result};
use crate::gas::{GasDetection, InhibitKind, SensorChannel};
use crate::relay::{RelayController, RelayOutputs, RelayRuntime};
use crate::store::{ConfigStore, LoadOrigin, Migration};

use super::channels::COMMAND_CHANNEL;
use super::commands::{AppCommand, ConfigEdit, EditTarget};
use super::events::AppEvent;
use super::ports::{ClockPort, EventSink, FlashPort, RelayPort, SensorPort, StoragePort};

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

pub struct AppService {
    store: ConfigStore,
    user: UserSettings,
    gas: GasDetection,
    relays: RelayController,
    tick_count: u64,
}

impl AppService {
    /// Construct the service around an already loaded store.
    pub fn new(store: ConfigStore, user: UserSettings) -> Self {
        let gas = GasDetection::new(store.get());
        Self {
            store,
            user,
            gas,
            relays: RelayController::new(),
            tick_count: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Load configuration and user settings and bring the runtime up.
    ///
    /// A migrated configuration is written back immediately so the next
    /// boot reads the current layout.
    pub fn boot(
        hw: &mut (impl FlashPort + StoragePort),
        migrations: &[Migration],
        sink: &mut impl EventSink,
    ) -> Self {
        let raw = hw.read_image().unwrap_or_else(|e| {
            warn!("settings flash unreadable: {e}");
            Vec::new()
        });
        let mut store = ConfigStore::load(&raw, migrations, sink);

        if let LoadOrigin::Migrated { from } = store.origin() {
            match store.persist(hw) {
                Ok(()) => {
                    info!("migrated configuration (v{from}) persisted");
                    sink.emit(&AppEvent::ConfigurationCommitted {
                        crc: store.image().crc(),
                    });
                }
                Err(e) => {
                    warn!("persisting migrated configuration failed: {e}");
                    sink.emit(&AppEvent::ConfigurationWriteFailed(e));
                }
            }
        }

        let user = UserSettings::load_or(&*hw, UserSettings::from_settings(store.get()));
        let mut service = Self::new(store, user);
        for sensor in user.inactive_sensors() {
            if let Err(e) = service.gas.inhibit(sensor, InhibitKind::Permanent, sink) {
                warn!("stored inhibit not applied: {e}");
            }
        }

        let settings = service.store.get();
        info!(
            "controller started: {} sensors, {} relays, origin {:?}",
            settings.sensor_count(),
            settings.relay_count(),
            service.store.origin()
        );
        sink.emit(&AppEvent::Started {
            origin: service.store.origin(),
            sensors: settings.sensor_count(),
            relays: settings.relay_count(),
        });
        service
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one control cycle of `dt` seconds: read sensors → evaluate
    /// alarms → relays → write coils.
    ///
    /// The `hw` parameter satisfies every runtime port at once, which
    /// avoids a double mutable borrow while keeping the port boundary
    /// explicit.
    pub fn tick(
        &mut self,
        dt: u16,
        hw: &mut (impl SensorPort + RelayPort + ClockPort),
        sink: &mut impl EventSink,
    ) {
        self.tick_count += 1;
        let settings = self.store.get();

        self.gas.tick(settings, hw, dt, sink);
        let demand = self.gas.relay_demand(settings);
        let outputs = self.relays.update(
            settings,
            &demand,
            self.gas.special_state_active(),
            hw.minute_of_day(),
            dt,
            sink,
        );

        hw.write_coils(&outputs.coils);
        hw.set_buzzer(outputs.buzzer);
    }

    // ── Command handling ──────────────────────────────────────

    /// Drain the inter-task command queue.  Returns how many commands
    /// were processed.
    pub fn process_pending_commands(
        &mut self,
        hw: &mut (impl FlashPort + StoragePort),
        sink: &mut impl EventSink,
    ) -> usize {
        let mut handled = 0;
        while let Ok(cmd) = COMMAND_CHANNEL.try_receive() {
            if let Err(e) = self.handle_command(cmd, hw, sink) {
                warn!("command rejected: {e}");
            }
            handled += 1;
        }
        handled
    }

    /// Process one command.
    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        hw: &mut (impl FlashPort + StoragePort),
        sink: &mut impl EventSink,
    ) -> Result<()> {
        match cmd {
            AppCommand::Inhibit { sensor, kind } => {
                self.check_sensor(sensor)?;
                if !self.store.get().sensors[sensor].active {
                    return Err(CommandError::SensorInactive(sensor).into());
                }
                self.gas.inhibit(sensor, kind, sink)?;
                self.mirror_inactive(sensor, kind == InhibitKind::Permanent, hw, sink)?;
            }
            AppCommand::ReleaseInhibit { sensor } => {
                self.check_sensor(sensor)?;
                self.gas.release_inhibit(sensor, sink)?;
                self.mirror_inactive(sensor, false, hw, sink)?;
            }
            AppCommand::AcknowledgeRelay { relay } => self.relays.acknowledge(relay)?,
            AppCommand::AcknowledgeAll => self.relays.acknowledge_all(),
            AppCommand::ClearMaxOnTimeout { relay } => self.relays.clear_max_on_timeout(relay)?,
            AppCommand::SetTestCoil { relay, mode } => self.relays.set_test_coil(relay, mode)?,
            AppCommand::SetServiceInterval { days } => {
                if self.user.service_interval_d != days {
                    self.user.service_interval_d = days;
                    self.save_user(hw, sink)?;
                }
            }
            AppCommand::Configure(edit) => self.configure(edit, hw, sink)?,
        }
        Ok(())
    }

    fn configure(
        &mut self,
        edit: ConfigEdit,
        flash: &mut impl FlashPort,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        edit.check()?;
        let target = edit.target();

        if let Err(e) = self.store.stage_and_commit_delta(flash, |s| edit.apply(s)) {
            warn!("configuration change rejected: {e}");
            sink.emit(&AppEvent::ConfigurationWriteFailed(e));
            return Err(e.into());
        }
        sink.emit(&AppEvent::ConfigurationCommitted {
            crc: self.store.image().crc(),
        });

        let settings = self.store.get();
        match target {
            EditTarget::Sensor(i) => self.gas.reconfigure(settings, i, sink),
            EditTarget::Relay(i) => self.relays.reset(i),
            EditTarget::Startup => self.gas.shorten_startup(settings.startup_time_s, sink),
            EditTarget::Global => {}
            EditTarget::All => {
                self.gas.reconfigure_all(settings, sink);
                for i in 0..MAX_RELAYS {
                    self.relays.reset(i);
                }
            }
        }
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn settings(&self) -> &Settings {
        self.store.get()
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn user_settings(&self) -> &UserSettings {
        &self.user
    }

    pub fn sensor(&self, index: usize) -> Option<&SensorChannel> {
        self.gas.channel(index)
    }

    pub fn relay(&self, index: usize) -> Option<&RelayRuntime> {
        self.relays.runtime(index)
    }

    /// Coil and buzzer state written on the last tick.
    pub fn outputs(&self) -> RelayOutputs {
        self.relays.outputs()
    }

    pub fn in_startup(&self) -> bool {
        self.gas.in_startup()
    }

    /// Total control ticks executed since boot.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    // ── Internal ──────────────────────────────────────────────

    fn check_sensor(&self, sensor: usize) -> core::result::Result<(), CommandError> {
        if sensor < self.store.get().sensor_count() {
            Ok(())
        } else {
            Err(CommandError::NoSuchSensor(sensor))
        }
    }

    fn mirror_inactive(
        &mut self,
        sensor: usize,
        inactive: bool,
        storage: &mut impl StoragePort,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        if self.user.set_inactive(sensor, inactive) {
            self.save_user(storage, sink)?;
        }
        Ok(())
    }

    fn save_user(&mut self, storage: &mut impl StoragePort, sink: &mut impl EventSink) -> Result<()> {
        match self.user.save(storage) {
            Ok(()) => {
                sink.emit(&AppEvent::UserSettingsSaved(self.user));
                Ok(())
            }
            Err(e) => {
                warn!("user settings save failed: {e}");
                sink.emit(&AppEvent::UserSettingsSaveFailed(e));
                Err(e.into())
            }
        }
    }
}
