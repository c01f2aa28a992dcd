//! Scheduled reconciliation of engagement on one post into reciprocal likes and replies.

pub mod failure;
pub mod fetcher;
pub mod reciprocator;
pub mod reconciler;
pub mod report;
pub mod schedule;
pub mod service;
pub mod session;

#[cfg(test)]
mod tests;

pub use failure::FailureKind;
pub use fetcher::{Engagement, EngagementFetcher};
pub use reciprocator::{ReciprocationOutcome, Reciprocator, REPLY_TEXT};
pub use reconciler::{plan_actions, Classification, CycleReport, PlannedAction, Reconciler};
pub use report::{Reporter, SharedClock};
pub use schedule::{
    is_operating_window, next_scheduled_time, Clock, LocalTime, ScheduleGate, SystemClock,
};
pub use service::{resolve_target, EngagementService, ServiceConfig};
pub use session::{ProcessedSet, Session};
