//! Exchange-rate cache with TTL-based freshness and durable JSON snapshots.
//!
//! Current rates go stale once their age exceeds the configured TTL.
//! Historical (date-keyed) rates are immutable facts and never expire.
//! Freshness is always measured from the rate's original `observed_at`, so a
//! snapshot reloaded after a restart keeps its TTL clock.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// One cached exchange rate: 1 unit of `base` = `rate` units of `quote`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRate {
    pub base: String,
    pub quote: String,
    pub rate: Decimal,
    pub observed_at: DateTime<Utc>,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

impl CachedRate {
    /// Freshness of a current-rate entry at `now` under `ttl`.
    pub fn freshness_at(&self, ttl: Duration, now: DateTime<Utc>) -> Freshness {
        if now - self.observed_at > ttl {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoricalEntry {
    date: NaiveDate,
    rate: CachedRate,
}

/// On-disk snapshot. Round-trips every field needed to recompute freshness.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    current: Vec<CachedRate>,
    historical: Vec<HistoricalEntry>,
}

#[derive(Default)]
struct CacheState {
    current: HashMap<(String, String), CachedRate>,
    historical: HashMap<(String, String, NaiveDate), CachedRate>,
}

impl CacheState {
    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            current: self.current.values().cloned().collect(),
            historical: self
                .historical
                .iter()
                .map(|((_, _, date), rate)| HistoricalEntry {
                    date: *date,
                    rate: rate.clone(),
                })
                .collect(),
        }
    }

    fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut state = CacheState::default();
        for rate in snapshot.current {
            state
                .current
                .insert((rate.base.clone(), rate.quote.clone()), rate);
        }
        for entry in snapshot.historical {
            state.historical.insert(
                (entry.rate.base.clone(), entry.rate.quote.clone(), entry.date),
                entry.rate,
            );
        }
        state
    }
}

/// Process-wide rate cache shared by all conversion callers.
pub struct RateCache {
    ttl: Duration,
    path: Option<PathBuf>,
    inner: Mutex<CacheState>,
}

impl RateCache {
    pub fn new(ttl: Duration) -> Self {
        RateCache {
            ttl,
            path: None,
            inner: Mutex::new(CacheState::default()),
        }
    }

    /// A cache backed by a JSON snapshot file: restored at construction,
    /// rewritten on every update.
    pub fn with_persistence(ttl: Duration, path: &Path) -> Self {
        let state = match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Snapshot>(&contents) {
                Ok(snapshot) => {
                    debug!(path = %path.display(), "restored rate cache snapshot");
                    CacheState::from_snapshot(snapshot)
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "discarding unreadable cache snapshot");
                    CacheState::default()
                }
            },
            Err(_) => CacheState::default(),
        };
        RateCache {
            ttl,
            path: Some(path.to_path_buf()),
            inner: Mutex::new(state),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get_current(&self, base: &str, quote: &str) -> Option<(CachedRate, Freshness)> {
        let state = self.inner.lock().unwrap();
        let entry = state
            .current
            .get(&(base.to_string(), quote.to_string()))?
            .clone();
        let freshness = entry.freshness_at(self.ttl, Utc::now());
        debug!(base, quote, ?freshness, "current rate cache hit");
        Some((entry, freshness))
    }

    pub fn get_historical(&self, base: &str, quote: &str, date: NaiveDate) -> Option<CachedRate> {
        let state = self.inner.lock().unwrap();
        state
            .historical
            .get(&(base.to_string(), quote.to_string(), date))
            .cloned()
    }

    /// Inserts or overwrites a current-rate entry.
    pub fn put_current(&self, entry: CachedRate) {
        self.put_current_bulk(vec![entry]);
    }

    /// Inserts a batch of current-rate entries with a single snapshot write.
    pub fn put_current_bulk(&self, entries: Vec<CachedRate>) {
        let mut state = self.inner.lock().unwrap();
        for entry in entries {
            state
                .current
                .insert((entry.base.clone(), entry.quote.clone()), entry);
        }
        self.persist(&state);
    }

    /// Inserts or overwrites a historical entry for `date`.
    pub fn put_historical(&self, date: NaiveDate, entry: CachedRate) {
        let mut state = self.inner.lock().unwrap();
        state
            .historical
            .insert((entry.base.clone(), entry.quote.clone(), date), entry);
        self.persist(&state);
    }

    /// Drops stale current-rate entries. Historical entries are never
    /// evicted. Returns the number of entries removed.
    pub fn evict_expired(&self) -> usize {
        let mut state = self.inner.lock().unwrap();
        let now = Utc::now();
        let before = state.current.len();
        let ttl = self.ttl;
        state
            .current
            .retain(|_, entry| entry.freshness_at(ttl, now) == Freshness::Fresh);
        let evicted = before - state.current.len();
        if evicted > 0 {
            debug!(evicted, "evicted stale current rates");
            self.persist(&state);
        }
        evicted
    }

    // Snapshot persistence is best effort: a failed write must not fail the
    // conversion that triggered it.
    fn persist(&self, state: &CacheState) {
        let Some(path) = &self.path else { return };
        let result = serde_json::to_string_pretty(&state.to_snapshot())
            .map_err(anyhow::Error::from)
            .and_then(|json| fs::write(path, json).map_err(anyhow::Error::from));
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to persist rate cache");
        }
    }
}
