//! Inter-task command channel.
//!
//! Uses an `embassy-sync` bounded channel to carry commands from the
//! front-panel and bus tasks into the synchronous control loop, which
//! drains it once per tick.
//!
//! ```text
//! ┌──────────────┐  AppCommand  ┌──────────────┐
//! │ UI / CAN task│─────────────▶│ Control Loop │
//! └──────────────┘              └──────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};

use super::commands::AppCommand;

/// Channel depth for inbound commands.
pub const COMMAND_DEPTH: usize = 8;

pub static COMMAND_CHANNEL: Channel<CriticalSectionRawMutex, AppCommand, COMMAND_DEPTH> =
    Channel::new();

/// Queue a command for the next tick.  Hands the command back when the
/// queue is full.
pub fn submit(cmd: AppCommand) -> Result<(), AppCommand> {
    COMMAND_CHANNEL.try_send(cmd).map_err(|TrySendError::Full(cmd)| cmd)
}
