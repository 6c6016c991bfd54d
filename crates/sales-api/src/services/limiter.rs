//! Per-client token bucket limiter with idle eviction.
//!
//! One map from identity to bucket sits behind a single mutex. Lookup,
//! creation, refill and consumption for an identity all happen inside one
//! critical section, so concurrent admissions for the same identity are
//! totally ordered and never exceed the burst.

use crate::config::LimiterConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Period of the eviction sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Buckets idle for longer than this many sweep intervals are evicted.
pub const IDLE_EVICTION_FACTOR: u32 = 3;

#[derive(Debug, Clone)]
struct ClientBucket {
    tokens: f64,
    last_seen: Instant,
}

#[derive(Debug)]
pub struct ClientLimiter {
    config: LimiterConfig,
    clients: Mutex<HashMap<String, ClientBucket>>,
}

impl ClientLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Admit or reject one request from `identity`.
    pub fn allow(&self, identity: &str) -> bool {
        self.allow_at(identity, Instant::now())
    }

    /// [`allow`](Self::allow) against an explicit clock reading.
    pub fn allow_at(&self, identity: &str, now: Instant) -> bool {
        if !self.config.enabled {
            return true;
        }

        let burst = f64::from(self.config.burst);
        let mut clients = self.lock();
        let bucket = clients
            .entry(identity.to_string())
            .or_insert_with(|| ClientBucket {
                tokens: burst,
                last_seen: now,
            });

        let elapsed = now.saturating_duration_since(bucket.last_seen).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.config.rps).min(burst);
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Remove buckets last seen more than `idle` before `now`.
    ///
    /// Returns the number of evicted buckets.
    pub fn sweep(&self, now: Instant, idle: Duration) -> usize {
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) <= idle);
        before - clients.len()
    }

    /// Number of identities currently holding a bucket.
    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    /// Sweep every `interval` until `cancel_token` fires.
    #[instrument(skip_all, name = "sales.task.limiter_sweep")]
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, cancel_token: CancellationToken) {
        let idle = interval * IDLE_EVICTION_FACTOR;
        info!(
            interval_seconds = interval.as_secs(),
            idle_seconds = idle.as_secs(),
            "Starting limiter sweep task"
        );

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.sweep(Instant::now(), idle);
                    if evicted > 0 {
                        debug!(evicted, remaining = self.tracked_clients(), "Evicted idle limiter buckets");
                    }
                }
                _ = cancel_token.cancelled() => {
                    info!("Limiter sweep task received shutdown signal, exiting");
                    break;
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientBucket>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
