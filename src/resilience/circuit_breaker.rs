//! Session-scoped circuit breaker for metered external calls.
//!
//! # State
//! - Per-key "already fetched this session" flags
//! - One global cooldown deadline (epoch ms, 0 = none)
//!
//! # Admission
//! ```text
//! can_fetch(key):
//!     cooldown active and unexpired → false
//!     cooldown expired              → cleared, continue
//!     key already marked            → false
//!     otherwise                     → true
//! ```
//!
//! # Design Decisions
//! - Global, not per-endpoint: one 429 pauses every key
//! - Flags are never cleared by failures, only by `reset`
//! - No network I/O; callers report 429s via `trigger_cooldown`
//! - State is session-only unless a persistence path is configured

use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::clock::{Clock, SystemClock};

/// Errors from reading or writing a breaker snapshot file.
#[derive(Debug, Error)]
pub enum BreakerPersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serializable breaker state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    /// Keys marked as fetched, sorted.
    pub fetched: Vec<String>,
    /// Cooldown deadline in epoch milliseconds, if one is set.
    pub cooldown_until_ms: Option<u64>,
}

impl BreakerSnapshot {
    pub fn load_from_file(path: &Path) -> Result<Self, BreakerPersistError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), BreakerPersistError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }
}

/// Guard for a rate-limited, metered API shared by every consumer.
pub struct CircuitBreaker {
    fetched: DashSet<String>,
    cooldown_until_ms: AtomicU64,
    last_warn_ms: AtomicU64,
    default_cooldown: Duration,
    warn_interval: Duration,
    clock: Arc<dyn Clock>,
    persistence_path: Option<PathBuf>,
}

impl CircuitBreaker {
    /// Create an empty breaker driven by `clock`.
    pub fn new(config: &CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            fetched: DashSet::new(),
            cooldown_until_ms: AtomicU64::new(0),
            last_warn_ms: AtomicU64::new(0),
            default_cooldown: Duration::from_secs(config.default_cooldown_secs),
            warn_interval: Duration::from_secs(config.warn_interval_secs),
            clock,
            persistence_path: config.persistence_path.as_ref().map(PathBuf::from),
        }
    }

    /// Create a breaker on the system clock, restoring the configured
    /// snapshot file when one exists.
    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        let breaker = Self::new(config, Arc::new(SystemClock));

        if let Some(path) = &breaker.persistence_path {
            if path.exists() {
                match BreakerSnapshot::load_from_file(path) {
                    Ok(snapshot) => {
                        tracing::info!(
                            path = %path.display(),
                            keys = snapshot.fetched.len(),
                            "Restored circuit breaker state"
                        );
                        breaker.restore(snapshot);
                    }
                    Err(e) => tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Ignoring unreadable circuit breaker state"
                    ),
                }
            }
        }

        breaker
    }

    /// May the guarded call for `key` run now?
    pub fn can_fetch(&self, key: &str) -> bool {
        let now = self.clock.now_ms();
        let until = self.cooldown_until_ms.load(Ordering::SeqCst);

        if until != 0 {
            if now < until {
                self.warn_cooldown(now, until);
                metrics::record_breaker_decision("cooldown");
                return false;
            }
            // A newer cooldown set concurrently must survive the cleanup.
            if self
                .cooldown_until_ms
                .compare_exchange(until, 0, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                tracing::debug!("Global cooldown expired");
            }
        }

        if self.fetched.contains(key) {
            metrics::record_breaker_decision("duplicate");
            return false;
        }

        metrics::record_breaker_decision("allowed");
        true
    }

    fn warn_cooldown(&self, now: u64, until: u64) {
        let last = self.last_warn_ms.load(Ordering::Relaxed);
        let interval = self.warn_interval.as_millis() as u64;
        if (last == 0 || now.saturating_sub(last) > interval)
            && self
                .last_warn_ms
                .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            tracing::warn!(
                remaining_secs = (until - now).div_ceil(1000),
                "AI guard: global cooldown active"
            );
        }
    }

    /// Record `key` as fetched for the rest of the session.
    ///
    /// Call before the guarded request starts so a concurrent caller is
    /// already refused.
    pub fn mark_fetched(&self, key: &str) {
        self.try_mark(key);
    }

    /// Mark `key`, returning `false` if it was already marked.
    ///
    /// Exactly one of any number of concurrent callers gets `true`.
    pub fn try_mark(&self, key: &str) -> bool {
        let inserted = self.fetched.insert(key.to_string());
        if inserted {
            tracing::debug!(key, "Marked as fetched");
        }
        inserted
    }

    /// Whether `key` has been marked this session.
    pub fn is_marked(&self, key: &str) -> bool {
        self.fetched.contains(key)
    }

    /// Refuse every key until `seconds` from now.
    pub fn trigger_cooldown(&self, seconds: u64) {
        let until = self.clock.now_ms().saturating_add(seconds.saturating_mul(1000));
        self.cooldown_until_ms.store(until, Ordering::SeqCst);
        metrics::record_cooldown_triggered();
        tracing::error!(seconds, "AI guard: rate limited, AI calls paused");
    }

    /// Apply the configured default cooldown and return its length.
    pub fn trigger_default_cooldown(&self) -> Duration {
        self.trigger_cooldown(self.default_cooldown.as_secs());
        self.default_cooldown
    }

    /// Time left on the global cooldown, if one is active.
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let until = self.cooldown_until_ms.load(Ordering::SeqCst);
        let now = self.clock.now_ms();
        (until != 0 && now < until).then(|| Duration::from_millis(until - now))
    }

    /// Clear every flag and the cooldown.
    pub fn reset(&self) {
        self.fetched.clear();
        self.cooldown_until_ms.store(0, Ordering::SeqCst);
        self.last_warn_ms.store(0, Ordering::Relaxed);
        tracing::info!("AI guard reset");
    }

    /// Current state as a serializable value.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut fetched: Vec<String> = self.fetched.iter().map(|k| k.key().clone()).collect();
        fetched.sort();
        let until = self.cooldown_until_ms.load(Ordering::SeqCst);
        BreakerSnapshot {
            fetched,
            cooldown_until_ms: (until != 0).then_some(until),
        }
    }

    /// Merge a snapshot into the current state.
    pub fn restore(&self, snapshot: BreakerSnapshot) {
        for key in snapshot.fetched {
            self.fetched.insert(key);
        }
        if let Some(until) = snapshot.cooldown_until_ms {
            self.cooldown_until_ms.fetch_max(until, Ordering::SeqCst);
        }
    }

    /// Write the snapshot to the configured path. No-op without one.
    pub fn save_to_file(&self) -> Result<(), BreakerPersistError> {
        if let Some(path) = &self.persistence_path {
            self.snapshot().save_to_file(path)?;
            tracing::debug!(path = %path.display(), "Saved circuit breaker state");
        }
        Ok(())
    }
}
