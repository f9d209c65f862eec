//! The request budget service.
//!
//! Counters live for one hourly epoch. At every wall-clock hour boundary
//! both tables are discarded and every identity gets its full budget back.
//! Counters are atomics read under a shared lock; clearing the tables takes
//! the lock exclusively, so a reset never interleaves with an increment.

use crate::budget::TrafficBudgets;
use chrono::{DateTime, TimeDelta, Utc};
use ratline_access::Identity;
use ratline_core::UserId;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::task::JoinHandle;

/// Length of one accounting epoch in seconds.
pub const EPOCH_SECONDS: i64 = 3600;

/// Outcome of a budget check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    /// The budget was already spent; the request must be rejected.
    pub exceeded: bool,
    /// Requests left before this one was counted.
    pub remaining: u32,
    /// The identity's budget for the epoch.
    pub total: u32,
    /// When the current epoch ends.
    pub resets_at: DateTime<Utc>,
}

/// Returns the first hour boundary strictly after `now`.
#[must_use]
pub fn next_epoch_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let boundary = (now.timestamp().div_euclid(EPOCH_SECONDS) + 1) * EPOCH_SECONDS;
    DateTime::from_timestamp(boundary, 0).unwrap_or(now + TimeDelta::seconds(EPOCH_SECONDS))
}

#[derive(Debug)]
struct Tables {
    epoch_ends_at: DateTime<Utc>,
    authenticated: HashMap<UserId, AtomicU32>,
    anonymous: HashMap<IpAddr, AtomicU32>,
}

impl Tables {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            epoch_ends_at: next_epoch_boundary(now),
            authenticated: HashMap::new(),
            anonymous: HashMap::new(),
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.epoch_ends_at
    }

    fn clear(&mut self, now: DateTime<Utc>) {
        self.authenticated.clear();
        self.anonymous.clear();
        self.epoch_ends_at = next_epoch_boundary(now);
    }

    fn count(&self, key: TrafficKey) -> u32 {
        let counter = match key {
            TrafficKey::User(id) => self.authenticated.get(&id),
            TrafficKey::Address(address) => self.anonymous.get(&address),
        };
        counter.map_or(0, |counter| counter.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone, Copy)]
enum TrafficKey {
    User(UserId),
    Address(IpAddr),
}

impl From<&Identity> for TrafficKey {
    fn from(identity: &Identity) -> Self {
        match identity {
            Identity::Authenticated(user) => Self::User(user.user_id()),
            Identity::Anonymous(anonymous) => Self::Address(anonymous.remote_address()),
        }
    }
}

/// Hourly request budgets per identity.
///
/// Cloning shares the underlying tables.
#[derive(Debug, Clone)]
pub struct TrafficControl {
    budgets: TrafficBudgets,
    tables: Arc<RwLock<Tables>>,
}

impl TrafficControl {
    /// Creates a service whose first epoch ends at the next hour boundary.
    #[must_use]
    pub fn new(budgets: TrafficBudgets) -> Self {
        Self {
            budgets,
            tables: Arc::new(RwLock::new(Tables::new(Utc::now()))),
        }
    }

    #[must_use]
    pub fn budgets(&self) -> &TrafficBudgets {
        &self.budgets
    }

    /// Checks the caller's budget, counting the request if `increase` is
    /// set and the budget is not yet spent.
    pub fn check(&self, identity: &Identity, increase: bool) -> RateLimitStatus {
        self.check_at(identity, increase, Utc::now())
    }

    /// Like [`check`](Self::check) at an explicit time. A time past the
    /// current epoch end rolls the epoch over first.
    pub fn check_at(&self, identity: &Identity, increase: bool, now: DateTime<Utc>) -> RateLimitStatus {
        let total = self.budgets.for_identity(identity);
        let key = TrafficKey::from(identity);

        {
            let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
            if !tables.is_expired(now) {
                let counter = match key {
                    TrafficKey::User(id) => tables.authenticated.get(&id),
                    TrafficKey::Address(address) => tables.anonymous.get(&address),
                };
                if let Some(counter) = counter {
                    return admit(counter, total, increase, tables.epoch_ends_at);
                }
                if !increase {
                    return status(counted(0, total), total, tables.epoch_ends_at);
                }
            }
        }

        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        if tables.is_expired(now) {
            tables.clear(now);
        }
        let epoch_ends_at = tables.epoch_ends_at;
        if !increase {
            return status(counted(tables.count(key), total), total, epoch_ends_at);
        }
        let counter = match key {
            TrafficKey::User(id) => entry(&mut tables.authenticated, id),
            TrafficKey::Address(address) => entry(&mut tables.anonymous, address),
        };
        admit(counter, total, increase, epoch_ends_at)
    }

    /// Requests counted for the identity in the current epoch.
    #[must_use]
    pub fn used(&self, identity: &Identity) -> u32 {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.count(TrafficKey::from(identity))
    }

    /// End of the current epoch.
    #[must_use]
    pub fn epoch_ends_at(&self) -> DateTime<Utc> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .epoch_ends_at
    }

    /// Discards every counter and starts a new epoch unconditionally.
    pub fn reset(&self) {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear(Utc::now());
    }

    /// Discards every counter if the current epoch has ended at `now`.
    ///
    /// Returns true if the tables were cleared.
    pub fn roll_over(&self, now: DateTime<Utc>) -> bool {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        if !tables.is_expired(now) {
            return false;
        }
        tables.clear(now);
        true
    }

    /// Spawns the hourly reset timer on the current tokio runtime.
    ///
    /// The timer runs until the returned handle is dropped or shut down.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use = "dropping the handle cancels the reset timer"]
    pub fn spawn_reset_task(&self) -> ResetTask {
        let control = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                let boundary = control.epoch_ends_at();
                let wait = (boundary - Utc::now()).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                let now = Utc::now().max(boundary);
                if control.roll_over(now) {
                    tracing::debug!(
                        epoch_ends_at = %control.epoch_ends_at(),
                        "Traffic counters reset"
                    );
                }
            }
        });
        ResetTask {
            handle: Some(handle),
        }
    }
}

impl Default for TrafficControl {
    fn default() -> Self {
        Self::new(TrafficBudgets::default())
    }
}

/// Handle to the running reset timer. Dropping it cancels the timer.
#[derive(Debug)]
pub struct ResetTask {
    handle: Option<JoinHandle<()>>,
}

impl ResetTask {
    /// Cancels the timer and waits for it to stop.
    pub async fn shutdown(mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        handle.abort();
        match handle.await {
            Err(e) if !e.is_cancelled() => {
                tracing::warn!(error = %e, "Traffic reset task failed");
            }
            _ => {}
        }
    }

    /// Returns true once the timer has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for ResetTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn entry<K: Eq + Hash>(table: &mut HashMap<K, AtomicU32>, key: K) -> &AtomicU32 {
    table.entry(key).or_default()
}

/// Counts one request against `counter` unless the budget is spent.
fn admit(counter: &AtomicU32, total: u32, increase: bool, resets_at: DateTime<Utc>) -> RateLimitStatus {
    let before = if increase {
        counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
            (count < total).then_some(count + 1)
        })
    } else {
        counted(counter.load(Ordering::SeqCst), total)
    };
    status(before, total, resets_at)
}

fn counted(count: u32, total: u32) -> Result<u32, u32> {
    if count < total { Ok(count) } else { Err(count) }
}

/// `Ok(count)` is an admissible count before this request, `Err` a spent budget.
fn status(before: Result<u32, u32>, total: u32, resets_at: DateTime<Utc>) -> RateLimitStatus {
    match before {
        Ok(count) => RateLimitStatus {
            exceeded: false,
            remaining: total.saturating_sub(count),
            total,
            resets_at,
        },
        Err(_) => RateLimitStatus {
            exceeded: true,
            remaining: 0,
            total,
            resets_at,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratline_access::{AuthenticatedIdentity, Group};
    use std::thread;

    fn anonymous() -> Identity {
        Identity::anonymous("203.0.113.5".parse().expect("ip"))
    }

    fn user() -> Identity {
        AuthenticatedIdentity::new(UserId::new(), vec![Group::new("rat", 50)]).into()
    }

    fn admin() -> Identity {
        AuthenticatedIdentity::new(UserId::new(), vec![Group::new("admin", 0).administrator()]).into()
    }

    #[test]
    fn first_check_reports_full_budget() {
        let control = TrafficControl::default();
        for (identity, total) in [(anonymous(), 360), (user(), 3600), (admin(), 10000)] {
            let status = control.check(&identity, true);
            assert!(!status.exceeded);
            assert_eq!(status.remaining, total);
            assert_eq!(status.total, total);
        }
    }

    #[test]
    fn anonymous_request_361_is_rejected() {
        let control = TrafficControl::default();
        let caller = anonymous();
        let now = Utc::now();

        for n in 0..360 {
            let status = control.check_at(&caller, true, now);
            assert!(!status.exceeded, "request {} rejected", n + 1);
        }

        let status = control.check_at(&caller, true, now);
        assert!(status.exceeded);
        assert_eq!(status.remaining, 0);
        assert_eq!(status.total, 360);
        assert_eq!(control.used(&caller), 360);
    }

    #[test]
    fn probing_does_not_count() {
        let control = TrafficControl::new(TrafficBudgets {
            anonymous: 2,
            ..TrafficBudgets::default()
        });
        let caller = anonymous();

        assert_eq!(control.check(&caller, false).remaining, 2);
        control.check(&caller, true);
        assert_eq!(control.check(&caller, false).remaining, 1);
        assert_eq!(control.check(&caller, false).remaining, 1);
        control.check(&caller, true);

        let probe = control.check(&caller, false);
        assert!(probe.exceeded);
        assert_eq!(probe.remaining, 0);
        assert_eq!(control.used(&caller), 2);
    }

    #[test]
    fn identities_are_counted_separately() {
        let control = TrafficControl::default();
        let first = anonymous();
        let second = Identity::anonymous("198.51.100.9".parse().expect("ip"));

        control.check(&first, true);
        control.check(&first, true);

        assert_eq!(control.check(&second, false).remaining, 360);
        assert_eq!(control.used(&first), 2);
    }

    #[test]
    fn concurrent_checks_lose_no_increments() {
        let control = TrafficControl::default();
        let caller = user();

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..250 {
                        assert!(!control.check(&caller, true).exceeded);
                    }
                });
            }
        });

        assert_eq!(control.used(&caller), 2000);
    }

    #[test]
    fn concurrent_checks_never_overshoot_budget() {
        let control = TrafficControl::new(TrafficBudgets {
            authenticated: 100,
            ..TrafficBudgets::default()
        });
        let caller = user();

        let admitted: usize = thread::scope(|scope| {
            let workers: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        (0..50)
                            .filter(|_| !control.check(&caller, true).exceeded)
                            .count()
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().expect("worker"))
                .sum()
        });

        assert_eq!(admitted, 100);
        assert_eq!(control.used(&caller), 100);
    }

    #[test]
    fn reset_restores_full_budget() {
        let control = TrafficControl::new(TrafficBudgets {
            anonymous: 3,
            ..TrafficBudgets::default()
        });
        let caller = anonymous();
        for _ in 0..4 {
            control.check(&caller, true);
        }
        assert!(control.check(&caller, false).exceeded);

        control.reset();

        let status = control.check(&caller, true);
        assert!(!status.exceeded);
        assert_eq!(status.remaining, 3);
    }

    #[test]
    fn check_past_epoch_end_rolls_over() {
        let control = TrafficControl::new(TrafficBudgets {
            anonymous: 1,
            ..TrafficBudgets::default()
        });
        let caller = anonymous();
        let ends_at = control.epoch_ends_at();

        control.check_at(&caller, true, ends_at - TimeDelta::seconds(1));
        assert!(control.check_at(&caller, true, ends_at - TimeDelta::seconds(1)).exceeded);

        let status = control.check_at(&caller, true, ends_at);
        assert!(!status.exceeded);
        assert_eq!(status.remaining, 1);
        assert_eq!(status.resets_at, ends_at + TimeDelta::seconds(EPOCH_SECONDS));
    }

    #[test]
    fn roll_over_only_clears_ended_epochs() {
        let control = TrafficControl::default();
        let caller = user();
        control.check(&caller, true);
        let ends_at = control.epoch_ends_at();

        assert!(!control.roll_over(ends_at - TimeDelta::seconds(1)));
        assert_eq!(control.used(&caller), 1);

        assert!(control.roll_over(ends_at));
        assert_eq!(control.used(&caller), 0);
        assert!(!control.roll_over(ends_at));
    }

    #[test]
    fn epoch_boundary_is_next_hour() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T10:15:30Z")
            .expect("parse")
            .with_timezone(&Utc);
        let boundary = next_epoch_boundary(now);
        assert_eq!(boundary.to_rfc3339(), "2024-05-01T11:00:00+00:00");

        let on_boundary = next_epoch_boundary(boundary);
        assert_eq!(on_boundary.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[tokio::test]
    async fn reset_task_shuts_down() {
        let control = TrafficControl::default();
        let task = control.spawn_reset_task();
        assert!(!task.is_finished());
        task.shutdown().await;
    }

    #[tokio::test]
    async fn clones_share_counters() {
        let control = TrafficControl::default();
        let caller = anonymous();
        let shared = control.clone();

        shared.check(&caller, true);
        assert_eq!(control.used(&caller), 1);
    }
}
