//! Temporary and permanent sensor inactivation.

use serde::{Deserialize, Serialize};

use crate::config::TIMER_MAX_SECS;

/// Four hours.
pub const DEFAULT_INHIBIT_SECS: u16 = 4 * 60 * 60;

const _: () = assert!(DEFAULT_INHIBIT_SECS <= TIMER_MAX_SECS);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InhibitKind {
    Temporary,
    Permanent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Inhibit {
    #[default]
    None,
    Temporary {
        remaining: u16,
    },
    /// Cleared only by an explicit release.
    Permanent,
}

impl Inhibit {
    pub fn start(kind: InhibitKind) -> Self {
        match kind {
            InhibitKind::Temporary => Self::Temporary {
                remaining: DEFAULT_INHIBIT_SECS,
            },
            InhibitKind::Permanent => Self::Permanent,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn kind(&self) -> Option<InhibitKind> {
        match self {
            Self::None => None,
            Self::Temporary { .. } => Some(InhibitKind::Temporary),
            Self::Permanent => Some(InhibitKind::Permanent),
        }
    }

    /// Count a temporary inhibit down.  Returns `true` on the tick it expires.
    pub fn tick(&mut self, dt: u16) -> bool {
        if let Self::Temporary { remaining } = self {
            *remaining = remaining.saturating_sub(dt);
            if *remaining == 0 {
                *self = Self::None;
                return true;
            }
        }
        false
    }
}
