//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements   | Connects to                   |
//! |------------|--------------|-------------------------------|
//! | `flash`    | FlashPort    | Settings sector (RAM-backed)  |
//! | `hardware` | SensorPort   | Simulated sensor inputs       |
//! |            | RelayPort    | Simulated coils and buzzer    |
//! | `log_sink` | EventSink    | `log` facade                  |
//! | `nvs`      | StoragePort  | Namespaced key/value store    |
//! | `time`     | ClockPort    | System wall clock             |

pub mod flash;
pub mod hardware;
pub mod log_sink;
pub mod nvs;
pub mod time;
