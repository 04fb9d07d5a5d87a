// Jaskier Shared Pattern — circuit breaker
// Per-target state machine with lock-free transitions. The breaker never
// blocks a caller: `can_execute()` is a fast atomic load/CAS, and callers are
// responsible for raising `CircuitOpen` when it reports false.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Clock abstraction so recovery timing can be faked in tests without real sleeps.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self { start: Instant::now() }
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

struct TargetState {
    state: AtomicU8,
    consecutive_failures: AtomicU32Shim,
    half_open_successes: AtomicU32Shim,
    opened_at_millis: AtomicU64,
}

/// `AtomicUsize` doubles as a `u32` counter — avoids pulling in another atomic
/// width for what is always a small count.
type AtomicU32Shim = AtomicUsize;

impl TargetState {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_CLOSED),
            consecutive_failures: AtomicU32Shim::new(0),
            half_open_successes: AtomicU32Shim::new(0),
            opened_at_millis: AtomicU64::new(0),
        }
    }
}

/// Keyed circuit breaker: one state machine per target (e.g. base URL).
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    targets: RwLock<HashMap<String, Arc<TargetState>>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            clock: Arc::new(MonotonicClock::default()),
            targets: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    async fn target(&self, target: &str) -> Arc<TargetState> {
        if let Some(existing) = self.targets.read().await.get(target) {
            return existing.clone();
        }
        let mut targets = self.targets.write().await;
        targets
            .entry(target.to_string())
            .or_insert_with(|| Arc::new(TargetState::new()))
            .clone()
    }

    /// Evaluates whether a call to `target` should proceed. Eagerly flips
    /// OPEN → HALF_OPEN once the recovery timeout has elapsed, allowing
    /// exactly the call that observes the flip to probe.
    pub async fn can_execute(&self, target: &str) -> bool {
        let t = self.target(target).await;
        match t.state.load(Ordering::Acquire) {
            STATE_CLOSED => true,
            STATE_HALF_OPEN => true,
            STATE_OPEN => {
                let opened_at = t.opened_at_millis.load(Ordering::Acquire);
                let elapsed = self.clock.now_millis().saturating_sub(opened_at);
                if elapsed >= self.config.recovery_timeout.as_millis() as u64 {
                    if t.state
                        .compare_exchange(STATE_OPEN, STATE_HALF_OPEN, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        t.half_open_successes.store(0, Ordering::Release);
                        tracing::info!(target, "circuit_breaker: OPEN -> HALF_OPEN, admitting probe");
                    }
                    true
                } else {
                    false
                }
            }
            _ => unreachable!("invalid circuit breaker state"),
        }
    }

    pub async fn record_success(&self, target: &str) {
        let t = self.target(target).await;
        match t.state.load(Ordering::Acquire) {
            STATE_HALF_OPEN => {
                let successes = t.half_open_successes.fetch_add(1, Ordering::AcqRel) + 1;
                if successes as u32 >= self.config.success_threshold {
                    t.state.store(STATE_CLOSED, Ordering::Release);
                    t.consecutive_failures.store(0, Ordering::Release);
                    t.half_open_successes.store(0, Ordering::Release);
                    tracing::info!(target, "circuit_breaker: HALF_OPEN -> CLOSED");
                }
            }
            _ => {
                t.consecutive_failures.store(0, Ordering::Release);
            }
        }
    }

    pub async fn record_failure(&self, target: &str) {
        let t = self.target(target).await;
        match t.state.load(Ordering::Acquire) {
            STATE_HALF_OPEN => {
                t.state.store(STATE_OPEN, Ordering::Release);
                t.opened_at_millis.store(self.clock.now_millis(), Ordering::Release);
                t.half_open_successes.store(0, Ordering::Release);
                tracing::warn!(target, "circuit_breaker: HALF_OPEN probe failed -> OPEN");
            }
            STATE_CLOSED => {
                let failures = t.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures as u32 >= self.config.failure_threshold {
                    t.state.store(STATE_OPEN, Ordering::Release);
                    t.opened_at_millis.store(self.clock.now_millis(), Ordering::Release);
                    tracing::error!(
                        target,
                        failures,
                        "circuit_breaker: CLOSED -> OPEN after consecutive failures"
                    );
                }
            }
            STATE_OPEN => {}
            _ => unreachable!("invalid circuit breaker state"),
        }
    }

    pub async fn state(&self, target: &str) -> CircuitState {
        match self.target(target).await.state.load(Ordering::Acquire) {
            STATE_CLOSED => CircuitState::Closed,
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64 as StdAtomicU64;

    #[derive(Debug)]
    struct FakeClock(StdAtomicU64);

    impl FakeClock {
        fn new() -> Self {
            Self(StdAtomicU64::new(0))
        }
        fn advance(&self, millis: u64) {
            self.0.fetch_add(millis, Ordering::SeqCst);
        }
    }

    impl Clock for Arc<FakeClock> {
        fn now_millis(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn opens_after_failure_threshold() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 1,
        });

        for _ in 0..3 {
            assert!(breaker.can_execute("svc").await);
            breaker.record_failure("svc").await;
        }

        assert!(!breaker.can_execute("svc").await);
        assert_eq!(breaker.state("svc").await, CircuitState::Open);
    }

    #[tokio::test]
    async fn half_open_after_recovery_then_closes_on_success() {
        let clock = Arc::new(FakeClock::new());
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(100),
            success_threshold: 2,
        })
        .with_clock(clock.clone());

        breaker.record_failure("svc").await;
        assert!(!breaker.can_execute("svc").await);

        clock.advance(150);
        assert!(breaker.can_execute("svc").await);
        assert_eq!(breaker.state("svc").await, CircuitState::HalfOpen);

        breaker.record_success("svc").await;
        assert_eq!(breaker.state("svc").await, CircuitState::HalfOpen);
        breaker.record_success("svc").await;
        assert_eq!(breaker.state("svc").await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let clock = Arc::new(FakeClock::new());
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(50),
            success_threshold: 1,
        })
        .with_clock(clock.clone());

        breaker.record_failure("svc").await;
        clock.advance(100);
        assert!(breaker.can_execute("svc").await);
        breaker.record_failure("svc").await;
        assert_eq!(breaker.state("svc").await, CircuitState::Open);
    }

    #[tokio::test]
    async fn independent_targets_do_not_share_state() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 1,
        });
        breaker.record_failure("a").await;
        assert_eq!(breaker.state("a").await, CircuitState::Open);
        assert_eq!(breaker.state("b").await, CircuitState::Closed);
    }
}
