//! gasctl host simulation.
//!
//! Boots the controller core against in-memory adapters, ramps one gas
//! value up through its alarm thresholds and back down, and logs every
//! resulting event.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  Adapters (outer ring)                   │
//! │                                                          │
//! │  HardwareAdapter  LogEventSink  MemoryFlash  NvsAdapter  │
//! │  (Sensor+Relay)   (EventSink)   (FlashPort)  (Storage)   │
//! │  HostClock (ClockPort)                                   │
//! │                                                          │
//! │  ─────────────── Port Trait Boundary ──────────────────  │
//! │                                                          │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │   AppService: ConfigStore · GasDetection · Relays  │  │
//! │  └────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```

use anyhow::Result;
use log::{info, warn};

use gasctl::adapters::flash::MemoryFlash;
use gasctl::adapters::hardware::HardwareAdapter;
use gasctl::adapters::log_sink::LogEventSink;
use gasctl::adapters::nvs::NvsAdapter;
use gasctl::adapters::time::HostClock;
use gasctl::app::channels;
use gasctl::app::commands::{AppCommand, ConfigEdit};
use gasctl::app::ports::{ClockPort, FlashError, FlashPort, RelayPort, SensorPort, StorageError, StoragePort};
use gasctl::app::service::AppService;
use gasctl::gas::SensorSample;
use gasctl::relay_set::RelaySet;

/// Control loop period in seconds.
const TICK_SECS: u16 = 1;
const STARTUP_SECS: u16 = 5;

// ── Board ─────────────────────────────────────────────────────
//
// Bundles every adapter so the service can borrow them through a single
// `&mut` that satisfies all the port bounds it needs.

struct Board {
    io: HardwareAdapter,
    clock: HostClock,
    flash: MemoryFlash,
    nvs: NvsAdapter,
}

impl SensorPort for Board {
    fn read(&mut self, index: usize) -> Option<SensorSample> {
        self.io.read(index)
    }
}

impl RelayPort for Board {
    fn write_coils(&mut self, coils: &RelaySet) {
        self.io.write_coils(coils);
    }

    fn set_buzzer(&mut self, on: bool) {
        self.io.set_buzzer(on);
    }
}

impl ClockPort for Board {
    fn minute_of_day(&self) -> Option<u16> {
        self.clock.minute_of_day()
    }
}

impl FlashPort for Board {
    fn read_image(&mut self) -> Result<Vec<u8>, FlashError> {
        self.flash.read_image()
    }

    fn write_image(&mut self, image: &[u8]) -> Result<(), FlashError> {
        self.flash.write_image(image)
    }

    fn program(&mut self, offset: usize, bytes: &[u8]) -> Result<(), FlashError> {
        self.flash.program(offset, bytes)
    }
}

impl StoragePort for Board {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.nvs.read(namespace, key, buf)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.nvs.write(namespace, key, data)
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.nvs.delete(namespace, key)
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.nvs.exists(namespace, key)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("gasctl simulation starting");

    let mut board = Board {
        io: HardwareAdapter::new(),
        clock: HostClock::fixed(12 * 60),
        flash: MemoryFlash::new(),
        nvs: NvsAdapter::new(),
    };
    let mut sink = LogEventSink::new();

    // Blank flash: defaults are live until the first commit.
    let mut service = AppService::boot(&mut board, &[], &mut sink);

    // Shorten the warm-up through the same path the front panel uses.
    if channels::submit(AppCommand::Configure(ConfigEdit::StartupTime {
        seconds: STARTUP_SECS,
    }))
    .is_err()
    {
        warn!("command queue full");
    }
    service.process_pending_commands(&mut board, &mut sink);

    let settings = service.settings();
    let alarms = settings.sensors[0].alarms;
    info!(
        "sensor 1 thresholds: {}",
        alarms
            .iter()
            .map(|a| format!("{}/{}", a.on_level, a.off_level))
            .collect::<Vec<_>>()
            .join(" ")
    );
    info!("exported configuration: {} bytes of JSON", settings.to_json()?.len());

    let peak = alarms.iter().map(|a| a.on_level).max().unwrap_or(0) + 5;
    let ramp_up = (0..=peak).step_by(5);
    let ramp_down = (0..=peak).rev().step_by(5);
    let settle = core::iter::repeat_n(0, usize::from(STARTUP_SECS));

    for value in settle.clone().chain(ramp_up).chain(ramp_down).chain(settle) {
        board.io.set_value(0, value);
        service.process_pending_commands(&mut board, &mut sink);
        service.tick(TICK_SECS, &mut board, &mut sink);
    }

    // Alarm relays with manual reset stay latched until acknowledged.
    service.handle_command(AppCommand::AcknowledgeAll, &mut board, &mut sink)?;
    service.tick(TICK_SECS, &mut board, &mut sink);

    let coils: Vec<String> = board.io.coils().iter().map(|r| (r + 1).to_string()).collect();
    info!(
        "simulation done after {} ticks | coils energized: [{}] | buzzer={}",
        service.tick_count(),
        coils.join(", "),
        board.io.buzzer()
    );
    Ok(())
}
