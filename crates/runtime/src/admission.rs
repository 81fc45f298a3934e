//! Admission gate — token bucket plus concurrency semaphore at run entry.
//!
//! Both mechanisms are process-wide. The token bucket refills continuously
//! at `rate` tokens/sec up to `burst`; acquisition polls in short steps
//! bounded by the run deadline. The semaphore is a plain non-blocking
//! attempt. Whatever was acquired is returned on run exit, regardless of
//! outcome.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::debug;

use talon_core::{CallContext, Error, Result};

const REFILL_POLL: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Gate configuration.
#[derive(Debug, Clone, Copy)]
pub struct GateConfig {
    /// Token refill rate per second.
    pub rate: f64,
    /// Bucket capacity.
    pub burst: f64,
    /// Maximum concurrent runs.
    pub concurrency: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            rate: 5.0,
            burst: 10.0,
            concurrency: 8,
        }
    }
}

/// The admission gate guarding agent-loop entry.
#[derive(Debug)]
pub struct AdmissionGate {
    config: GateConfig,
    bucket: Mutex<Bucket>,
    semaphore: Arc<Semaphore>,
}

impl AdmissionGate {
    pub fn new(config: GateConfig) -> Self {
        let rate = config.rate.max(f64::MIN_POSITIVE);
        let burst = config.burst.max(1.0);
        let concurrency = config.concurrency.max(1);
        let config = GateConfig {
            rate,
            burst,
            concurrency,
        };
        Self {
            config,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
            semaphore: Arc::new(Semaphore::new(concurrency)),
        }
    }

    pub fn config(&self) -> GateConfig {
        self.config
    }

    /// Tokens currently available (after refill accounting).
    pub fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock().expect("bucket mutex poisoned");
        self.refill(&mut bucket);
        bucket.tokens
    }

    /// Semaphore permits currently available.
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            bucket.tokens = (bucket.tokens + elapsed * self.config.rate).min(self.config.burst);
            bucket.last_refill = now;
        }
    }

    fn try_consume(&self) -> bool {
        let mut bucket = self.bucket.lock().expect("bucket mutex poisoned");
        self.refill(&mut bucket);
        if bucket.tokens < 1.0 {
            return false;
        }
        bucket.tokens -= 1.0;
        true
    }

    fn return_token(&self) {
        let mut bucket = self.bucket.lock().expect("bucket mutex poisoned");
        self.refill(&mut bucket);
        bucket.tokens = (bucket.tokens + 1.0).min(self.config.burst);
    }

    /// Acquire a run slot: token first, then the semaphore.
    ///
    /// Token exhaustion polls until the call deadline, then yields
    /// `RateLimited`. A full semaphore fails immediately with
    /// `ConcurrencyExceeded` and returns the consumed token.
    pub async fn acquire(self: &Arc<Self>, call: &CallContext) -> Result<AdmissionPermit> {
        loop {
            match call.check() {
                Ok(()) => {}
                Err(Error::Timeout) => {
                    return Err(Error::RateLimited("deadline expired waiting for a token".into()))
                }
                Err(e) => return Err(e),
            }
            if self.try_consume() {
                break;
            }
            // A deadline-less caller gets exactly one shot; polling forever
            // with no bound would hide misconfiguration.
            if call.deadline().is_none() {
                return Err(Error::RateLimited("token bucket exhausted".into()));
            }
            tokio::time::sleep(REFILL_POLL).await;
        }

        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => {
                debug!(slots_left = self.semaphore.available_permits(), "run admitted");
                Ok(AdmissionPermit {
                    gate: self.clone(),
                    _permit: permit,
                })
            }
            Err(TryAcquireError::NoPermits) => {
                self.return_token();
                Err(Error::ConcurrencyExceeded(format!(
                    "all {} run slots are busy",
                    self.config.concurrency
                )))
            }
            Err(TryAcquireError::Closed) => {
                self.return_token();
                Err(Error::Internal("admission semaphore closed".into()))
            }
        }
    }
}

/// RAII handle for an admitted run. Dropping it returns both the semaphore
/// slot and the rate token.
#[derive(Debug)]
pub struct AdmissionPermit {
    gate: Arc<AdmissionGate>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.gate.return_token();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn gate(rate: f64, burst: f64, concurrency: usize) -> Arc<AdmissionGate> {
        Arc::new(AdmissionGate::new(GateConfig {
            rate,
            burst,
            concurrency,
        }))
    }

    #[tokio::test]
    async fn burst_exactly_satisfied() {
        let gate = gate(0.001, 3.0, 10);
        let ctx = CallContext::unbounded();
        let mut permits = Vec::new();
        for _ in 0..3 {
            permits.push(gate.acquire(&ctx).await.unwrap());
        }
        // Attempt burst+1 within the same tick.
        let err = gate.acquire(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited(_)));
    }

    #[tokio::test]
    async fn concurrency_exceeded_fails_fast() {
        let gate = gate(100.0, 100.0, 1);
        let ctx = CallContext::unbounded();
        let _held = gate.acquire(&ctx).await.unwrap();
        let err = gate.acquire(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::ConcurrencyExceeded(_)));
    }

    #[tokio::test]
    async fn release_restores_tokens_and_slots() {
        let gate = gate(0.001, 2.0, 2);
        let ctx = CallContext::unbounded();
        {
            let _a = gate.acquire(&ctx).await.unwrap();
            let _b = gate.acquire(&ctx).await.unwrap();
            assert_eq!(gate.available_slots(), 0);
        }
        // Tokens returned = tokens acquired; semaphore back to capacity.
        assert_eq!(gate.available_slots(), 2);
        assert!(gate.available_tokens() >= 2.0 - f64::EPSILON);
    }

    #[tokio::test]
    async fn exhaustion_with_deadline_waits_for_refill() {
        let gate = gate(50.0, 1.0, 4);
        let ctx = CallContext::unbounded();
        let _first = gate.acquire(&ctx).await.unwrap();

        let bounded = CallContext::with_timeout(Duration::from_secs(1), CancellationToken::new());
        // Refill at 50 tokens/sec makes a token available well before the deadline.
        let second = gate.acquire(&bounded).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn exhaustion_past_deadline_is_rate_limited() {
        let gate = gate(0.001, 1.0, 4);
        let ctx = CallContext::unbounded();
        let _first = gate.acquire(&ctx).await.unwrap();

        let bounded =
            CallContext::with_timeout(Duration::from_millis(30), CancellationToken::new());
        let err = gate.acquire(&bounded).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited(_)));
    }

    #[tokio::test]
    async fn cancellation_propagates() {
        let gate = gate(0.001, 1.0, 4);
        let ctx = CallContext::unbounded();
        let _first = gate.acquire(&ctx).await.unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let cancelled = CallContext::new(Some(Instant::now() + Duration::from_secs(5)), token);
        let err = gate.acquire(&cancelled).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
