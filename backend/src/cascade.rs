//! Cascading fallback across redundant providers.
//!
//! A [`Cascade`] owns an ordered list of capability-equivalent [`Source`]s for
//! one data type. Sources are tried strictly in order; each attempt is bounded
//! by a hard timeout and any failure (transport, parse, timeout, rejected
//! value) is soft: the cascade logs it, records it and moves on. The first
//! value accepted by the caller's validator wins and no later source is called.
//!
//! ```text
//! Kraken ──✗──► Binance ──✗──► CoinGecko ──✓──► quote
//!                                          (Blockchain.info never called)
//! ```

use crate::error::{Result, SignalError};
use crate::types::ProviderHealth;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// One provider's implementation of a logical fetch.
///
/// `R` is the request (`()` for spot data, a day count for history).
#[async_trait]
pub trait Source<R, T>: Send + Sync {
    /// Stable provider id, also used in configuration
    fn id(&self) -> &'static str;

    async fn fetch(&self, request: &R) -> Result<T>;
}

/// Per-provider attempt counters shared by every cascade of a gateway
#[derive(Default)]
pub struct ProviderStats {
    health: Mutex<HashMap<&'static str, ProviderHealth>>,
}

impl ProviderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, provider: &'static str) {
        let mut health = self.health.lock().unwrap_or_else(|e| e.into_inner());
        let entry = health.entry(provider).or_insert_with(|| ProviderHealth {
            provider: provider.to_string(),
            ..Default::default()
        });
        entry.successes += 1;
        entry.last_success = Some(Utc::now());
    }

    pub fn record_failure(&self, provider: &'static str, error: &SignalError) {
        let mut health = self.health.lock().unwrap_or_else(|e| e.into_inner());
        let entry = health.entry(provider).or_insert_with(|| ProviderHealth {
            provider: provider.to_string(),
            ..Default::default()
        });
        entry.failures += 1;
        entry.last_failure = Some(Utc::now());
        entry.last_error = Some(error.to_string());
    }

    /// Snapshot of all counters, sorted by provider id
    pub fn report(&self) -> Vec<ProviderHealth> {
        let health = self.health.lock().unwrap_or_else(|e| e.into_inner());
        let mut report: Vec<ProviderHealth> = health.values().cloned().collect();
        report.sort_by(|a, b| a.provider.cmp(&b.provider));
        report
    }
}

/// Ordered providers for one data type
pub struct Cascade<R, T> {
    operation: &'static str,
    sources: Vec<Arc<dyn Source<R, T>>>,
    attempt_timeout: Duration,
    stats: Arc<ProviderStats>,
}

impl<R, T> Cascade<R, T>
where
    R: Sync,
    T: Send,
{
    pub fn new(
        operation: &'static str,
        sources: Vec<Arc<dyn Source<R, T>>>,
        attempt_timeout: Duration,
        stats: Arc<ProviderStats>,
    ) -> Self {
        Self {
            operation,
            sources,
            attempt_timeout,
            stats,
        }
    }

    pub fn source_ids(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.id()).collect()
    }

    /// Try every source in order and return the first accepted value with
    /// the id of the provider that produced it.
    ///
    /// # Errors
    /// * `Exhausted` - no source produced an accepted value
    pub async fn first_accepted<F>(&self, request: &R, accept: F) -> Result<(T, &'static str)>
    where
        F: Fn(&T) -> bool,
    {
        for source in &self.sources {
            let provider = source.id();

            let outcome = match tokio::time::timeout(self.attempt_timeout, source.fetch(request)).await
            {
                Ok(result) => result,
                Err(_) => Err(SignalError::Timeout {
                    provider: provider.to_string(),
                }),
            };

            match outcome {
                Ok(value) if accept(&value) => {
                    debug!("[{}] {} succeeded", self.operation, provider);
                    self.stats.record_success(provider);
                    return Ok((value, provider));
                }
                Ok(_) => {
                    let err = SignalError::provider(provider, "value rejected by validation");
                    warn!("[{}] {} returned an unusable value, trying next", self.operation, provider);
                    self.stats.record_failure(provider, &err);
                }
                Err(e) => {
                    warn!("[{}] {} failed: {}, trying next", self.operation, provider, e);
                    self.stats.record_failure(provider, &e);
                }
            }
        }

        warn!("[{}] ALL SOURCES FAILED", self.operation);
        Err(SignalError::Exhausted(self.operation.to_string()))
    }

    /// Like [`first_accepted`](Self::first_accepted) but falls back to
    /// `default` on exhaustion.
    pub async fn first_accepted_or<F>(&self, request: &R, accept: F, default: T) -> T
    where
        F: Fn(&T) -> bool,
    {
        match self.first_accepted(request, accept).await {
            Ok((value, _)) => value,
            Err(_) => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Value(f64),
        Malformed,
        Hang,
    }

    struct MockSource {
        id: &'static str,
        behaviour: Behaviour,
        call_count: AtomicUsize,
    }

    impl MockSource {
        fn new(id: &'static str, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                id,
                behaviour,
                call_count: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Source<(), f64> for MockSource {
        fn id(&self) -> &'static str {
            self.id
        }

        async fn fetch(&self, _request: &()) -> Result<f64> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Value(v) => Ok(v),
                Behaviour::Malformed => Err(SignalError::ParseError("malformed JSON".into())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(1.0)
                }
            }
        }
    }

    fn cascade(sources: Vec<Arc<MockSource>>, stats: Arc<ProviderStats>) -> Cascade<(), f64> {
        let sources = sources
            .into_iter()
            .map(|s| s as Arc<dyn Source<(), f64>>)
            .collect();
        Cascade::new("test", sources, Duration::from_millis(50), stats)
    }

    #[tokio::test]
    async fn test_falls_through_malformed_provider() {
        let first = MockSource::new("first", Behaviour::Malformed);
        let second = MockSource::new("second", Behaviour::Value(42.0));
        let third = MockSource::new("third", Behaviour::Value(7.0));
        let stats = Arc::new(ProviderStats::new());

        let chain = cascade(vec![first.clone(), second.clone(), third.clone()], stats.clone());
        let (value, provider) = chain.first_accepted(&(), |v| *v > 0.0).await.unwrap();

        assert_eq!(value, 42.0);
        assert_eq!(provider, "second");
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 1);
        assert_eq!(third.calls(), 0);

        let report = stats.report();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].provider, "first");
        assert_eq!(report[0].failures, 1);
        assert_eq!(report[1].successes, 1);
    }

    #[tokio::test]
    async fn test_rejected_value_moves_on() {
        let zero = MockSource::new("zero", Behaviour::Value(0.0));
        let good = MockSource::new("good", Behaviour::Value(3.0));

        let chain = cascade(vec![zero.clone(), good], Arc::new(ProviderStats::new()));
        let (value, _) = chain.first_accepted(&(), |v| *v > 0.0).await.unwrap();

        assert_eq!(value, 3.0);
        assert_eq!(zero.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_soft_failure() {
        let slow = MockSource::new("slow", Behaviour::Hang);
        let fast = MockSource::new("fast", Behaviour::Value(1.5));

        let chain = cascade(vec![slow, fast], Arc::new(ProviderStats::new()));
        let (value, provider) = chain.first_accepted(&(), |_| true).await.unwrap();

        assert_eq!(value, 1.5);
        assert_eq!(provider, "fast");
    }

    #[tokio::test]
    async fn test_exhaustion_returns_default() {
        let a = MockSource::new("a", Behaviour::Malformed);
        let b = MockSource::new("b", Behaviour::Value(-1.0));

        let chain = cascade(vec![a.clone(), b.clone()], Arc::new(ProviderStats::new()));
        assert!(matches!(
            chain.first_accepted(&(), |v| *v > 0.0).await,
            Err(SignalError::Exhausted(_))
        ));

        let value = chain.first_accepted_or(&(), |v| *v > 0.0, 56.0).await;
        assert_eq!(value, 56.0);
        // Each call tries each provider exactly once
        assert_eq!(a.calls(), 2);
        assert_eq!(b.calls(), 2);
    }
}
