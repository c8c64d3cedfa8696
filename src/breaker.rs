//! Circuit breaker with a per-process named registry.
//!
//! Breaker state is keyed by name and lives for the process; it is never
//! shared across machines. A breaker opens once `melt_threshold` failure
//! signals land inside the sliding `window`, rejects calls while open, and
//! admits a single trial call after the window elapses again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info};

use crate::error::{HttpClientError, Result};

/// Breaker attachment, decided once at composition time.
///
/// `Disabled` replaces the gating step with a no-op: breaker-related options
/// are still accepted, but nothing is recorded and nothing is rejected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerSetting {
    /// Gate calls through a breaker with the given trip parameters.
    Enabled(BreakerParams),
    /// No gating, no recording.
    Disabled,
}

/// Trip parameters: how many melts within the window open the circuit.
///
/// The window doubles as the reset timeout: an open breaker transitions to
/// half-open once the window has elapsed since it opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakerParams {
    /// Melts within the window that open the circuit. Must be at least 1.
    pub melt_threshold: u32,
    /// Sliding window for counting melts, in milliseconds when sourced from
    /// data.
    #[serde(deserialize_with = "duration_ms")]
    pub window: Duration,
}

impl Default for BreakerParams {
    fn default() -> Self {
        Self {
            melt_threshold: 10,
            window: Duration::from_secs(10),
        }
    }
}

impl BreakerParams {
    /// Validate the cross-field invariant: a breaker configuration is either
    /// a usable parameter pair or the explicit [`BreakerSetting::Disabled`]
    /// marker, never a degenerate pair.
    pub fn validate(&self) -> Result<()> {
        if self.melt_threshold == 0 {
            return Err(HttpClientError::InvalidOption {
                key: "breaker".to_string(),
                reason: "melt_threshold must be at least 1".to_string(),
            });
        }
        if self.window.is_zero() {
            return Err(HttpClientError::InvalidOption {
                key: "breaker".to_string(),
                reason: "window must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

fn duration_ms<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

/// Scope of one breaker's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerMode {
    /// One breaker per profile (or per explicit `breaker_name`).
    #[default]
    PerProfile,
    /// Separate breaker state per target host under the same name.
    PerHost,
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests are allowed.
    Closed,
    /// Requests are rejected.
    Open,
    /// One trial request is allowed to probe recovery.
    HalfOpen,
}

/// Circuit breaker state machine.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    params: BreakerParams,
    verbose: bool,
    state: RwLock<CircuitState>,
    melt_count: AtomicU32,
    half_open_probes: AtomicU32,
    window_start: RwLock<Option<Instant>>,
    opened_at: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    /// Create a new breaker. Usually reached through [`BreakerRegistry::fetch`].
    pub fn new(name: impl Into<String>, params: BreakerParams, verbose: bool) -> Self {
        Self {
            name: name.into(),
            params,
            verbose,
            state: RwLock::new(CircuitState::Closed),
            melt_count: AtomicU32::new(0),
            half_open_probes: AtomicU32::new(0),
            window_start: RwLock::new(None),
            opened_at: RwLock::new(None),
        }
    }

    /// Registry key of this breaker.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current state.
    pub fn state(&self) -> CircuitState {
        self.maybe_transition_to_half_open();
        *self.state.read()
    }

    /// Check if a call is allowed right now.
    pub fn is_allowed(&self) -> bool {
        self.maybe_transition_to_half_open();

        let state = *self.state.read();
        match state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            // Only the first probe gets through in half-open.
            CircuitState::HalfOpen => self.half_open_probes.fetch_add(1, Ordering::SeqCst) == 0,
        }
    }

    /// Record one failure signal.
    pub fn melt(&self) {
        let state = *self.state.read();
        match state {
            CircuitState::Closed => {
                let now = Instant::now();
                let melts = {
                    let mut window_start = self.window_start.write();
                    let in_window = window_start
                        .map(|start| now.duration_since(start) <= self.params.window)
                        .unwrap_or(false);
                    if in_window {
                        self.melt_count.fetch_add(1, Ordering::SeqCst) + 1
                    } else {
                        *window_start = Some(now);
                        self.melt_count.store(1, Ordering::SeqCst);
                        1
                    }
                };
                if melts >= self.params.melt_threshold {
                    self.open();
                }
            }
            // Any failure during the trial reopens the circuit.
            CircuitState::HalfOpen => self.open(),
            CircuitState::Open => {}
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let state = *self.state.read();
        match state {
            CircuitState::Closed => {
                self.melt_count.store(0, Ordering::SeqCst);
                *self.window_start.write() = None;
            }
            CircuitState::HalfOpen => self.close(),
            CircuitState::Open => {}
        }
    }

    /// Force the breaker back to closed.
    pub fn reset(&self) {
        self.close();
    }

    /// Melts recorded in the current window.
    pub fn melt_count(&self) -> u32 {
        self.melt_count.load(Ordering::SeqCst)
    }

    fn open(&self) {
        let mut state = self.state.write();
        if *state != CircuitState::Open {
            if self.verbose {
                info!(breaker = %self.name, "circuit breaker opened");
            } else {
                debug!(breaker = %self.name, "circuit breaker opened");
            }
            *state = CircuitState::Open;
            *self.opened_at.write() = Some(Instant::now());
            self.half_open_probes.store(0, Ordering::SeqCst);
        }
    }

    fn close(&self) {
        let mut state = self.state.write();
        if *state != CircuitState::Closed {
            if self.verbose {
                info!(breaker = %self.name, "circuit breaker closed");
            } else {
                debug!(breaker = %self.name, "circuit breaker closed");
            }
            *state = CircuitState::Closed;
            *self.opened_at.write() = None;
            self.melt_count.store(0, Ordering::SeqCst);
            self.half_open_probes.store(0, Ordering::SeqCst);
            *self.window_start.write() = None;
        }
    }

    fn maybe_transition_to_half_open(&self) {
        if *self.state.read() != CircuitState::Open {
            return;
        }

        let elapsed = self
            .opened_at
            .read()
            .map(|opened| opened.elapsed() >= self.params.window)
            .unwrap_or(false);
        if elapsed {
            let mut state = self.state.write();
            if *state == CircuitState::Open {
                debug!(breaker = %self.name, "circuit breaker half-open");
                *state = CircuitState::HalfOpen;
                self.half_open_probes.store(0, Ordering::SeqCst);
            }
        }
    }
}

/// Per-process registry of named breakers.
///
/// The first fetch of a name fixes its parameters; later fetches under the
/// same name return the existing breaker unchanged.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// The process-wide registry.
    pub fn global() -> &'static BreakerRegistry {
        static REGISTRY: OnceLock<BreakerRegistry> = OnceLock::new();
        REGISTRY.get_or_init(BreakerRegistry::default)
    }

    /// Get or create the breaker registered under `name`.
    pub fn fetch(&self, name: &str, params: BreakerParams, verbose: bool) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(name) {
            return breaker.clone();
        }
        self.breakers
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, params, verbose)))
            .clone()
    }

    /// Look up an existing breaker without creating one.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(name).cloned()
    }

    /// Reset the named breaker if it exists.
    pub fn reset(&self, name: &str) {
        if let Some(breaker) = self.get(name) {
            breaker.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(melt_threshold: u32, window_ms: u64) -> BreakerParams {
        BreakerParams {
            melt_threshold,
            window: Duration::from_millis(window_ms),
        }
    }

    #[test]
    fn opens_after_threshold_melts() {
        let breaker = CircuitBreaker::new("t-open", params(3, 1_000), false);

        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.melt();
        breaker.melt();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.is_allowed());

        breaker.melt();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.is_allowed());
    }

    #[test]
    fn melts_outside_window_do_not_accumulate() {
        let breaker = CircuitBreaker::new("t-window", params(2, 30), false);

        breaker.melt();
        std::thread::sleep(Duration::from_millis(60));
        breaker.melt();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.melt_count(), 1);
    }

    #[test]
    fn success_clears_the_window() {
        let breaker = CircuitBreaker::new("t-success", params(3, 1_000), false);

        breaker.melt();
        breaker.melt();
        breaker.record_success();
        assert_eq!(breaker.melt_count(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_after_window_admits_one_probe() {
        let breaker = CircuitBreaker::new("t-half-open", params(1, 40), false);

        breaker.melt();
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.is_allowed());
        assert!(!breaker.is_allowed());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn failure_during_probe_reopens() {
        let breaker = CircuitBreaker::new("t-reopen", params(1, 40), false);

        breaker.melt();
        std::thread::sleep(Duration::from_millis(80));
        assert!(breaker.is_allowed());
        breaker.melt();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn reset_closes_immediately() {
        let breaker = CircuitBreaker::new("t-reset", params(1, 60_000), false);

        breaker.melt();
        assert!(!breaker.is_allowed());
        breaker.reset();
        assert!(breaker.is_allowed());
    }

    #[test]
    fn registry_first_fetch_wins() {
        let registry = BreakerRegistry::default();
        let first = registry.fetch("svc", params(1, 100), false);
        let second = registry.fetch("svc", params(99, 100), false);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.get("other").is_none());
    }

    #[test]
    fn degenerate_params_rejected() {
        assert!(params(0, 100).validate().is_err());
        assert!(params(1, 0).validate().is_err());
        assert!(params(1, 100).validate().is_ok());
    }
}
