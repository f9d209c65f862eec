//! Hourly request budgets for the ratline API.
//!
//! [`TrafficControl`] is constructed once at startup and shared by the
//! request-dispatch layer. Its reset timer is owned through the
//! [`ResetTask`] handle returned by [`TrafficControl::spawn_reset_task`].

pub mod budget;
pub mod control;

pub use budget::TrafficBudgets;
pub use control::{EPOCH_SECONDS, RateLimitStatus, ResetTask, TrafficControl, next_epoch_boundary};
