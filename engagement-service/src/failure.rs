//! Where a failure happened, as shown in error reports.
//!
//! Each kind has one fixed recovery at its call site: `Setup` aborts startup, `Fetch`
//! degrades to empty data, `Mutation` leaves the user for the next cycle, `Notifier`
//! is swallowed and `Loop` sleeps the error backoff before the next iteration.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Target post cannot be resolved or fetched at startup
    Setup,
    /// Reading comments, likes, profiles or feeds
    Fetch,
    /// Creating a like or a reply
    Mutation,
    /// Delivering to the operations channel
    Notifier,
    /// Anything that escaped a cycle
    Loop,
}

impl FailureKind {
    /// Label shown in error reports.
    pub fn label(self) -> &'static str {
        match self {
            FailureKind::Setup => "Startup",
            FailureKind::Fetch => "Fetch",
            FailureKind::Mutation => "Reciprocation",
            FailureKind::Notifier => "Notifier",
            FailureKind::Loop => "Main loop",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
