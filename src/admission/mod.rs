//! Admission control
//!
//! Excess call volume is rejected per caller before a request reaches
//! authentication. [`Admission`] is the contract the server depends on;
//! [`FixedWindowLimiter`] is the in-process implementation.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default window length (15 minutes)
pub const DEFAULT_WINDOW_SECS: u64 = 15 * 60;

/// Traffic classes, each with its own threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionClass {
    General,
    Authenticated,
    Webhook,
    Signal,
}

impl AdmissionClass {
    /// Error text returned with a 429
    pub fn rejection_text(&self) -> (&'static str, &'static str) {
        match self {
            Self::General => ("Too many requests", "Please try again later"),
            Self::Authenticated => (
                "Too many requests",
                "Rate limit exceeded for authenticated endpoint",
            ),
            Self::Webhook => ("Too many webhook requests", "Webhook rate limit exceeded"),
            Self::Signal => ("Too many signal requests", "Signal rate limit exceeded"),
        }
    }
}

/// Request budget per class within one window
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub general: u32,
    pub authenticated: u32,
    pub webhook: u32,
    pub signal: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            general: 100,
            authenticated: 30,
            webhook: 200,
            signal: 150,
        }
    }
}

impl Thresholds {
    pub fn limit(&self, class: AdmissionClass) -> u32 {
        match class {
            AdmissionClass::General => self.general,
            AdmissionClass::Authenticated => self.authenticated,
            AdmissionClass::Webhook => self.webhook,
            AdmissionClass::Signal => self.signal,
        }
    }
}

/// A rejected call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub class: AdmissionClass,
    /// Time until the caller's window resets
    pub retry_after: Duration,
}

/// Admission-control contract
pub trait Admission: Send + Sync {
    /// Admit one call from `caller` in `class`, counting it against the budget
    fn admit(&self, class: AdmissionClass, caller: &str) -> Result<(), Rejection>;

    /// Forget expired state; returns how many entries were dropped
    fn purge_expired(&self) -> usize {
        0
    }
}

/// Allows every call
pub struct Unlimited;

impl Admission for Unlimited {
    fn admit(&self, _class: AdmissionClass, _caller: &str) -> Result<(), Rejection> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window counter per (class, caller)
pub struct FixedWindowLimiter {
    windows: DashMap<(AdmissionClass, String), Window>,
    window: Duration,
    thresholds: Thresholds,
}

impl FixedWindowLimiter {
    pub fn new(window: Duration, thresholds: Thresholds) -> Self {
        Self {
            windows: DashMap::new(),
            window,
            thresholds,
        }
    }

    /// Admission decision as of `now`
    pub fn admit_at(&self, class: AdmissionClass, caller: &str, now: Instant) -> Result<(), Rejection> {
        let limit = self.thresholds.limit(class);
        let mut entry = self
            .windows
            .entry((class, caller.to_string()))
            .or_insert(Window { started: now, count: 0 });

        if now.duration_since(entry.started) >= self.window {
            *entry = Window { started: now, count: 0 };
        }

        if entry.count >= limit {
            let retry_after = self.window.saturating_sub(now.duration_since(entry.started));
            debug!(?class, %caller, "Admission rejected");
            return Err(Rejection { class, retry_after });
        }

        entry.count += 1;
        Ok(())
    }

    /// Drop windows that have expired; returns how many were removed
    pub fn cleanup(&self) -> usize {
        let before = self.windows.len();
        let now = Instant::now();
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window);
        before - self.windows.len()
    }

    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

impl Admission for FixedWindowLimiter {
    fn admit(&self, class: AdmissionClass, caller: &str) -> Result<(), Rejection> {
        self.admit_at(class, caller, Instant::now())
    }

    fn purge_expired(&self) -> usize {
        self.cleanup()
    }
}

/// Periodically purge expired windows
pub fn spawn_cleanup_task(limiter: Arc<dyn Admission>) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(60);
        loop {
            tokio::time::sleep(interval).await;
            let removed = limiter.purge_expired();
            if removed > 0 {
                debug!("Admission cleanup: removed {} expired windows", removed);
            }
        }
    });
}
