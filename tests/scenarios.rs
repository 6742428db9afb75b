//! End-to-end routing scenarios against scripted mock adapters.

use async_trait::async_trait;
use futures::StreamExt;
use llm_adaptive_router::{
    ChatCall, ChatOutcome, FragmentStream, Message, MemoryStateStore, Priority, ProviderAdapter,
    ProviderConfig, RouteEvent, RouteObserver, Router, RouterConfig, RouterError, RouterRequest,
    StateStore, StreamFragment, TokenUsage,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One scripted adapter outcome. When the script runs dry the adapter
/// answers with a healthy default.
#[derive(Debug, Clone)]
enum Step {
    Ok(&'static str),
    RateLimited,
    Transient,
    Auth,
    StreamOk(&'static [&'static str], TokenUsage),
    StreamFailEarly,
    StreamMidError,
}

struct MockAdapter {
    name: String,
    weight: f64,
    rpm_limit: u32,
    tpm_limit: u32,
    script: Mutex<VecDeque<Step>>,
    calls: Arc<AtomicUsize>,
}

impl MockAdapter {
    fn healthy(name: &str) -> Arc<Self> {
        Self::with_weight(name, 1.0)
    }

    fn with_weight(name: &str, weight: f64) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            weight,
            rpm_limit: 100,
            tpm_limit: 10_000,
            script: Mutex::new(VecDeque::new()),
            calls: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn push(&self, step: Step) {
        self.script.lock().push_back(step);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn rpm_limit(&self) -> u32 {
        self.rpm_limit
    }

    fn tpm_limit(&self) -> u32 {
        self.tpm_limit
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    async fn chat(&self, _call: &ChatCall) -> Result<ChatOutcome, RouterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().pop_front().unwrap_or(Step::Ok("ok"));
        match step {
            Step::Ok(content) => Ok(ChatOutcome {
                content: content.to_string(),
                input_tokens: 10,
                output_tokens: 5,
            }),
            Step::RateLimited => Err(RouterError::rate_limited(&self.name, "429")),
            Step::Transient => Err(RouterError::transient(&self.name, "connection reset")),
            Step::Auth => Err(RouterError::auth(&self.name, "401")),
            other => panic!("chat call hit stream step {other:?}"),
        }
    }

    async fn stream(&self, _call: &ChatCall) -> Result<FragmentStream, RouterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(Step::StreamOk(&["ok"], TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            }));
        match step {
            Step::StreamOk(fragments, usage) => {
                let mut items: Vec<Result<StreamFragment, RouterError>> = fragments
                    .iter()
                    .map(|content| Ok(StreamFragment::content(*content)))
                    .collect();
                items.push(Ok(StreamFragment::done(usage)));
                Ok(futures::stream::iter(items).boxed())
            }
            Step::StreamFailEarly => {
                Err(RouterError::transient(&self.name, "connect failed"))
            }
            Step::StreamMidError => {
                let name = self.name.clone();
                let items: Vec<Result<StreamFragment, RouterError>> = vec![
                    Ok(StreamFragment::content("partial")),
                    Err(RouterError::server_error(name, "mid-stream abort")),
                ];
                Ok(futures::stream::iter(items).boxed())
            }
            other => panic!("stream call hit chat step {other:?}"),
        }
    }
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<RouteEvent>>,
}

#[async_trait]
impl RouteObserver for RecordingObserver {
    async fn on_route(
        &self,
        event: RouteEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.events.lock().push(event);
        Ok(())
    }
}

struct FailingObserver;

#[async_trait]
impl RouteObserver for FailingObserver {
    async fn on_route(
        &self,
        _event: RouteEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err("observer blew up".into())
    }
}

fn provider(name: &str) -> ProviderConfig {
    serde_json::from_value(serde_json::json!({
        "name": name,
        "model": "mock-model",
        "rpm_limit": 100,
        "tpm_limit": 10_000,
    }))
    .expect("provider config")
}

fn config(names: &[&str], failure_threshold: u32) -> RouterConfig {
    let mut config = RouterConfig::with_providers(names.iter().map(|n| provider(n)).collect());
    config.circuit_breaker.failure_threshold = failure_threshold;
    config
}

fn request(priority: Priority) -> RouterRequest {
    RouterRequest::builder()
        .message(Message::user("Hello"))
        .priority(priority)
        .build()
        .expect("request")
}

async fn seed_usage(store: &Arc<MemoryStateStore>, provider: &str, requests: u64, tokens_each: u64) {
    for _ in 0..requests {
        store
            .record_request(provider, tokens_each, Duration::from_secs(60))
            .await
            .expect("seed");
    }
}

// Scenario: two equal providers, A near quota, B mostly idle; the
// less-loaded provider serves a normal-priority request.
#[tokio::test]
async fn scenario_least_loaded_provider_selected() {
    let store = Arc::new(MemoryStateStore::new());
    let a = MockAdapter::healthy("a");
    let b = MockAdapter::healthy("b");
    let router = Router::builder(config(&["a", "b"], 5))
        .state_store(store.clone() as Arc<dyn StateStore>)
        .adapter(a.clone())
        .adapter(b.clone())
        .build()
        .await
        .expect("build");

    seed_usage(&store, "a", 90, 100).await; // rpm 90, tpm 9000
    seed_usage(&store, "b", 10, 100).await; // rpm 10, tpm 1000

    let response = router.chat(request(Priority::Normal)).await.expect("chat");
    assert_eq!(response.provider, "b");
    assert_eq!(response.attempts, 1);
    assert_eq!(a.calls(), 0);
}

// Scenario: A's circuit is open; the request routes to B and the skipped
// candidate does not count as an attempt.
#[tokio::test]
async fn scenario_open_circuit_skipped_without_attempt() {
    let a = MockAdapter::with_weight("a", 2.0);
    let b = MockAdapter::healthy("b");
    let router = Router::builder(config(&["a", "b"], 1))
        .adapter(a.clone())
        .adapter(b.clone())
        .build()
        .await
        .expect("build");

    // Trip A: one transient failure with threshold 1, falling back to B.
    a.push(Step::Transient);
    let response = router.chat(request(Priority::Normal)).await.expect("chat");
    assert_eq!(response.provider, "b");
    assert_eq!(response.attempts, 2);

    // A is now skipped by the guard entirely.
    let response = router.chat(request(Priority::Normal)).await.expect("chat");
    assert_eq!(response.provider, "b");
    assert_eq!(response.attempts, 1);
    assert_eq!(a.calls(), 1);
}

// Scenario: a single provider fails transiently until its breaker trips;
// the next call finds no usable candidate and the breaker reports open.
#[tokio::test]
async fn scenario_breaker_trips_after_threshold() {
    let a = MockAdapter::healthy("a");
    let router = Router::builder(config(&["a"], 3))
        .adapter(a.clone())
        .build()
        .await
        .expect("build");

    for _ in 0..3 {
        a.push(Step::Transient);
        let err = router.chat(request(Priority::Normal)).await.expect_err("fail");
        match err {
            RouterError::AllProvidersFailed { attempts } => assert_eq!(attempts.len(), 1),
            other => panic!("unexpected error {other}"),
        }
    }

    // Circuit open: the candidate is skipped, so the attempt list is empty.
    let err = router.chat(request(Priority::Normal)).await.expect_err("fail");
    match err {
        RouterError::AllProvidersFailed { attempts } => assert!(attempts.is_empty()),
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(a.calls(), 3);

    let status = router.status().await;
    assert!(status[0].circuit_open);
}

// Scenario: session affinity binds lazily, sticks while the provider is
// healthy, and re-points after a failover.
#[tokio::test]
async fn scenario_session_affinity_rebinds_on_failover() {
    let store = Arc::new(MemoryStateStore::new());
    let a = MockAdapter::with_weight("a", 2.0);
    let b = MockAdapter::healthy("b");
    let router = Router::builder(config(&["a", "b"], 1))
        .state_store(store.clone() as Arc<dyn StateStore>)
        .adapter(a.clone())
        .adapter(b.clone())
        .build()
        .await
        .expect("build");

    let with_session = || {
        RouterRequest::builder()
            .message(Message::user("Hello"))
            .session_id("s1")
            .build()
            .expect("request")
    };

    // First call binds s1 to the top-scored provider.
    let response = router.chat(with_session()).await.expect("chat");
    assert_eq!(response.provider, "a");
    assert_eq!(
        store.get_session_provider("s1").await.expect("get"),
        Some("a".to_string())
    );

    // Sticky while healthy.
    let response = router.chat(with_session()).await.expect("chat");
    assert_eq!(response.provider, "a");

    // A fails and trips; the failover overwrites the binding.
    a.push(Step::Transient);
    let response = router.chat(with_session()).await.expect("chat");
    assert_eq!(response.provider, "b");
    assert_eq!(response.attempts, 2);
    assert_eq!(
        store.get_session_provider("s1").await.expect("get"),
        Some("b".to_string())
    );

    // With A's circuit still open, the bound provider serves directly.
    let response = router.chat(with_session()).await.expect("chat");
    assert_eq!(response.provider, "b");
    assert_eq!(response.attempts, 1);
}

// Scenario: the high-priority reserve keeps a provider above the
// unreserved share eligible for high traffic only.
#[tokio::test]
async fn scenario_reserve_blocks_low_priority_only() {
    let store = Arc::new(MemoryStateStore::new());
    let a = MockAdapter::healthy("a");
    let router = Router::builder(config(&["a"], 5))
        .state_store(store.clone() as Arc<dyn StateStore>)
        .adapter(a.clone())
        .build()
        .await
        .expect("build");

    seed_usage(&store, "a", 85, 10).await; // rpm 85/100, above the 80 reserve line

    let response = router.chat(request(Priority::High)).await.expect("chat");
    assert_eq!(response.provider, "a");

    let err = router.chat(request(Priority::Low)).await.expect_err("fail");
    match err {
        RouterError::AllProvidersFailed { attempts } => assert!(attempts.is_empty()),
        other => panic!("unexpected error {other}"),
    }
}

// Scenario: a pinned provider that rate-limits falls back to the rest of
// the pool by default.
#[tokio::test]
async fn scenario_forced_provider_falls_back() {
    let a = MockAdapter::healthy("a");
    let b = MockAdapter::healthy("b");
    let router = Router::builder(config(&["a", "b"], 5))
        .adapter(a.clone())
        .adapter(b.clone())
        .build()
        .await
        .expect("build");

    a.push(Step::RateLimited);
    let pinned = RouterRequest::builder()
        .message(Message::user("Hello"))
        .force_provider("a")
        .build()
        .expect("request");

    let response = router.chat(pinned).await.expect("chat");
    assert_eq!(response.provider, "b");
    assert_eq!(response.attempts, 2);
}

#[tokio::test]
async fn forced_provider_healthy_routes_in_one_attempt() {
    let a = MockAdapter::healthy("a");
    let b = MockAdapter::with_weight("b", 5.0);
    let router = Router::builder(config(&["a", "b"], 5))
        .adapter(a.clone())
        .adapter(b.clone())
        .build()
        .await
        .expect("build");

    let pinned = RouterRequest::builder()
        .message(Message::user("Hello"))
        .force_provider("a")
        .build()
        .expect("request");

    let response = router.chat(pinned).await.expect("chat");
    assert_eq!(response.provider, "a");
    assert_eq!(response.attempts, 1);
    assert_eq!(b.calls(), 0);
}

#[tokio::test]
async fn forced_fallback_disabled_pins_hard() {
    let a = MockAdapter::healthy("a");
    let b = MockAdapter::healthy("b");
    let mut cfg = config(&["a", "b"], 5);
    cfg.forced_fallback = false;
    let router = Router::builder(cfg)
        .adapter(a.clone())
        .adapter(b.clone())
        .build()
        .await
        .expect("build");

    a.push(Step::Transient);
    let pinned = RouterRequest::builder()
        .message(Message::user("Hello"))
        .force_provider("a")
        .build()
        .expect("request");

    let err = router.chat(pinned).await.expect_err("fail");
    assert!(matches!(err, RouterError::AllProvidersFailed { .. }));
    assert_eq!(b.calls(), 0);
}

#[tokio::test]
async fn non_retriable_failure_short_circuits() {
    let a = MockAdapter::with_weight("a", 2.0);
    let b = MockAdapter::healthy("b");
    let router = Router::builder(config(&["a", "b"], 5))
        .adapter(a.clone())
        .adapter(b.clone())
        .build()
        .await
        .expect("build");

    a.push(Step::Auth);
    let err = router.chat(request(Priority::Normal)).await.expect_err("fail");
    assert!(matches!(err, RouterError::AuthError { .. }));
    assert_eq!(b.calls(), 0);
}

#[tokio::test]
async fn success_records_usage_sample() {
    let store = Arc::new(MemoryStateStore::new());
    let a = MockAdapter::healthy("a");
    let router = Router::builder(config(&["a"], 5))
        .state_store(store.clone() as Arc<dyn StateStore>)
        .adapter(a.clone())
        .build()
        .await
        .expect("build");

    router.chat(request(Priority::Normal)).await.expect("chat");

    let usage = store
        .get_usage("a", Duration::from_secs(60))
        .await
        .expect("usage");
    assert_eq!(usage.rpm, 1);
    assert_eq!(usage.tpm, 15); // 10 input + 5 output
}

#[tokio::test]
async fn route_events_emitted_and_observer_errors_swallowed() {
    let observer = Arc::new(RecordingObserver::default());
    let a = MockAdapter::healthy("a");
    let router = Router::builder(config(&["a"], 5))
        .adapter(a.clone())
        .observer(observer.clone())
        .build()
        .await
        .expect("build");

    router.chat(request(Priority::Normal)).await.expect("chat");
    {
        let events = observer.events.lock();
        assert_eq!(events.len(), 1);
        assert!(events[0].success);
        assert_eq!(events[0].provider, "a");
        assert_eq!(events[0].attempts, 1);
    }

    // A failing observer must not fail the request.
    let b = MockAdapter::healthy("b");
    let router = Router::builder(config(&["b"], 5))
        .adapter(b.clone())
        .observer(Arc::new(FailingObserver))
        .build()
        .await
        .expect("build");
    router.chat(request(Priority::Normal)).await.expect("chat");
}

#[tokio::test]
async fn stream_falls_back_before_first_fragment() {
    let store = Arc::new(MemoryStateStore::new());
    let a = MockAdapter::with_weight("a", 2.0);
    let b = MockAdapter::healthy("b");
    let router = Router::builder(config(&["a", "b"], 5))
        .state_store(store.clone() as Arc<dyn StateStore>)
        .adapter(a.clone())
        .adapter(b.clone())
        .build()
        .await
        .expect("build");

    a.push(Step::StreamFailEarly);
    b.push(Step::StreamOk(
        &["Hello", " world"],
        TokenUsage {
            input_tokens: 12,
            output_tokens: 34,
        },
    ));

    let mut stream = router.stream(request(Priority::Normal)).await.expect("stream");
    let mut content = String::new();
    while let Some(fragment) = stream.next().await {
        content.push_str(&fragment.expect("fragment").content);
    }
    assert_eq!(content, "Hello world");

    // The completion signal's actual counts land in the usage window.
    let usage = store
        .get_usage("b", Duration::from_secs(60))
        .await
        .expect("usage");
    assert_eq!(usage.rpm, 1);
    assert_eq!(usage.tpm, 46);
    assert_eq!(a.calls(), 1);
}

#[tokio::test]
async fn stream_mid_error_surfaces_without_fallback() {
    let a = MockAdapter::with_weight("a", 2.0);
    let b = MockAdapter::healthy("b");
    let router = Router::builder(config(&["a", "b"], 5))
        .adapter(a.clone())
        .adapter(b.clone())
        .build()
        .await
        .expect("build");

    a.push(Step::StreamMidError);
    let mut stream = router.stream(request(Priority::Normal)).await.expect("stream");

    let first = stream.next().await.expect("first").expect("fragment");
    assert_eq!(first.content, "partial");

    let second = stream.next().await.expect("second");
    assert!(matches!(second, Err(RouterError::ServerError { .. })));

    // No cross-provider resumption once streaming has started.
    assert_eq!(b.calls(), 0);
}
