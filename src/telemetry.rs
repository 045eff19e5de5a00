//! Rate-limit events and the sinks that consume them.
//!
//! The middleware emits one [`RateLimitEvent`] per request. Sinks are
//! `tower::Service<RateLimitEvent>` implementations so they compose like any other
//! service; emission is best-effort and never affects the request.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

/// What the guard did with one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitEvent {
    /// The request was within budget and forwarded.
    Allowed {
        scope: String,
        /// Window total before this request.
        total: u64,
        limit: u64,
    },
    /// The request was over budget and answered by the rejection handler.
    Rejected {
        scope: String,
        /// Window total before this request.
        total: u64,
        limit: u64,
    },
    /// The policy did not apply; no counters were touched.
    Bypassed,
}

impl fmt::Display for RateLimitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitEvent::Allowed { scope, total, limit } => {
                write!(f, "Allowed(scope={}, total={}, limit={})", scope, total, limit)
            }
            RateLimitEvent::Rejected { scope, total, limit } => {
                write!(f, "Rejected(scope={}, total={}, limit={})", scope, total, limit)
            }
            RateLimitEvent::Bypassed => write!(f, "Bypassed"),
        }
    }
}

/// A telemetry sink that consumes rate-limit events.
pub trait TelemetrySink:
    Service<RateLimitEvent, Response = (), Error = Self::SinkError> + Clone + Send + 'static
{
    /// The error type for this sink.
    type SinkError: std::error::Error + Send + 'static;
}

/// Best-effort emit helper that honors `poll_ready` and swallows errors.
pub async fn emit_best_effort<S>(sink: S, event: RateLimitEvent)
where
    S: Service<RateLimitEvent, Response = ()> + Send + Clone + 'static,
    S::Error: std::error::Error + Send + 'static,
    S::Future: Send + 'static,
{
    use tower::ServiceExt;

    if let Ok(mut ready_sink) = sink.ready_oneshot().await {
        let _ = ready_sink.call(event).await;
    }
}

type SinkFuture = Pin<Box<dyn Future<Output = Result<(), Infallible>> + Send>>;

/// A no-op telemetry sink that discards all events.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl Service<RateLimitEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: RateLimitEvent) -> Self::Future {
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for NullSink {
    type SinkError = Infallible;
}

/// A telemetry sink that logs each decision under the `ratelimitcache::events` target
/// with `outcome`, `scope`, `total` and `limit` fields. Bypasses log at `debug`.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<RateLimitEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: RateLimitEvent) -> Self::Future {
        match &event {
            RateLimitEvent::Allowed { scope, total, limit } => {
                tracing::info!(
                    target: "ratelimitcache::events",
                    outcome = "allowed",
                    scope = %scope,
                    total,
                    limit,
                    "rate_limit_event"
                );
            }
            RateLimitEvent::Rejected { scope, total, limit } => {
                tracing::info!(
                    target: "ratelimitcache::events",
                    outcome = "rejected",
                    scope = %scope,
                    total,
                    limit,
                    "rate_limit_event"
                );
            }
            RateLimitEvent::Bypassed => {
                tracing::debug!(
                    target: "ratelimitcache::events",
                    outcome = "bypassed",
                    "rate_limit_event"
                );
            }
        }
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for LogSink {
    type SinkError = Infallible;
}

/// A telemetry sink that keeps the most recent events in memory.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<RateLimitEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn events(&self) -> Vec<RateLimitEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events dropped because the sink was full.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<RateLimitEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: RateLimitEvent) -> Self::Future {
        if let Ok(mut events) = self.events.lock() {
            if events.len() >= self.capacity {
                events.remove(0);
                self.evicted.fetch_add(1, Ordering::Relaxed);
            }
            events.push(event);
        }
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for MemorySink {
    type SinkError = Infallible;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(scope: &str) -> RateLimitEvent {
        RateLimitEvent::Rejected { scope: scope.into(), total: 3, limit: 2 }
    }

    #[tokio::test]
    async fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        emit_best_effort(sink.clone(), RateLimitEvent::Bypassed).await;
        emit_best_effort(sink.clone(), rejected("a")).await;

        assert_eq!(sink.events(), vec![RateLimitEvent::Bypassed, rejected("a")]);
    }

    #[tokio::test]
    async fn memory_sink_evicts_oldest_when_full() {
        let sink = MemorySink::with_capacity(2);
        for scope in ["a", "b", "c"] {
            emit_best_effort(sink.clone(), rejected(scope)).await;
        }

        assert_eq!(sink.events(), vec![rejected("b"), rejected("c")]);
        assert_eq!(sink.evicted(), 1);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn log_sink_records_decision_fields() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            futures::executor::block_on(async {
                emit_best_effort(NullSink, rejected("a")).await;
                emit_best_effort(LogSink, rejected("10.0.0.9")).await;
                emit_best_effort(LogSink, RateLimitEvent::Bypassed).await;
            })
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert_eq!(output.lines().count(), 1, "bypasses log below info: {output}");
        assert!(output.contains("ratelimitcache::events"), "{output}");
        assert!(output.contains("outcome=\"rejected\""), "{output}");
        assert!(output.contains("scope=10.0.0.9"), "{output}");
        assert!(output.contains("total=3"), "{output}");
        assert!(output.contains("limit=2"), "{output}");
    }

    #[test]
    fn event_display() {
        let event = RateLimitEvent::Allowed { scope: "1.2.3.4".into(), total: 0, limit: 20 };
        assert_eq!(event.to_string(), "Allowed(scope=1.2.3.4, total=0, limit=20)");
        assert_eq!(rejected("x").to_string(), "Rejected(scope=x, total=3, limit=2)");
    }
}
