//! Sliding-window request quotas for rate providers.
//!
//! Each provider carries one counter per configured window; entries age out
//! continuously as time passes, there is no fixed-boundary reset.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// One quota window: at most `max_requests` within any span of `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    pub window_secs: u64,
    pub max_requests: u32,
}

impl RateWindow {
    pub fn per_minute(max_requests: u32) -> Self {
        RateWindow { window_secs: 60, max_requests }
    }

    pub fn per_hour(max_requests: u32) -> Self {
        RateWindow { window_secs: 3_600, max_requests }
    }

    pub fn per_day(max_requests: u32) -> Self {
        RateWindow { window_secs: 86_400, max_requests }
    }
}

struct WindowState {
    span: Duration,
    limit: u32,
    hits: VecDeque<Instant>,
}

impl WindowState {
    fn new(window: RateWindow) -> Self {
        WindowState {
            span: Duration::from_secs(window.window_secs),
            limit: window.max_requests,
            hits: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.hits.front() {
            if now.duration_since(*oldest) >= self.span {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    /// Wait until the oldest in-window hit ages out, if the window is full.
    fn required_wait(&mut self, now: Instant) -> Option<Duration> {
        self.prune(now);
        if (self.hits.len() as u32) < self.limit {
            return None;
        }
        self.hits
            .front()
            .map(|oldest| self.span.saturating_sub(now.duration_since(*oldest)))
    }
}

/// Tracks per-provider usage across every configured window. Providers with
/// no configured windows are unlimited.
pub struct RateLimiter {
    providers: Mutex<HashMap<String, Vec<WindowState>>>,
}

impl RateLimiter {
    pub fn new(limits: HashMap<String, Vec<RateWindow>>) -> Self {
        let providers = limits
            .into_iter()
            .map(|(name, windows)| (name, windows.into_iter().map(WindowState::new).collect()))
            .collect();
        RateLimiter {
            providers: Mutex::new(providers),
        }
    }

    pub fn unlimited() -> Self {
        RateLimiter::new(HashMap::new())
    }

    /// Admits a request only if it stays within every window for the
    /// provider. The hit is recorded under the same lock as the check, so
    /// concurrent callers cannot jointly exceed a quota. On deny, returns the
    /// recommended wait derived from the oldest in-window hit.
    pub fn try_acquire(&self, provider: &str) -> Result<(), Duration> {
        let mut providers = self.providers.lock().unwrap();
        let Some(windows) = providers.get_mut(provider) else {
            return Ok(());
        };

        let now = Instant::now();
        let wait = windows
            .iter_mut()
            .filter_map(|w| w.required_wait(now))
            .max();
        if let Some(wait) = wait {
            debug!(provider, ?wait, "quota exceeded");
            return Err(wait);
        }

        for window in windows.iter_mut() {
            window.hits.push_back(now);
        }
        Ok(())
    }

    /// Counts one request against every window for the provider, regardless
    /// of quota. Used for usage that bypassed `try_acquire`.
    pub fn record_usage(&self, provider: &str) {
        let mut providers = self.providers.lock().unwrap();
        if let Some(windows) = providers.get_mut(provider) {
            let now = Instant::now();
            for window in windows.iter_mut() {
                window.prune(now);
                window.hits.push_back(now);
            }
        }
    }
}
