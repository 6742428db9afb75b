//! The routing pipeline.
//!
//! Per request: estimate tokens, resolve an ordered candidate list
//! (forced pinning, then session affinity, then the scorer), and walk it
//! with the circuit breaker guarding each attempt. Success feeds the
//! usage window, latency EMA, predictor, breaker, and session binding;
//! retriable failures advance to the next candidate.

use chrono::Utc;
use futures::StreamExt;
use router_config::RouterConfig;
use router_core::{
    ChatCall, ErrorKind, FragmentStream, Priority, ProviderAdapter, RouteEvent, RouteObserver,
    RouterError, RouterRequest, RouterResponse, RouterResult, StreamFragment, TokenUsage,
};
use router_providers::{AdapterFactory, ProviderRegistry};
use router_resilience::{CircuitBreaker, CircuitBreakerConfig};
use router_state::{LatencyTracker, MemoryStateStore, RedisStateStore, StateStore};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::estimator::estimate_tokens;
use crate::predictor::ExhaustionPredictor;
use crate::scorer::{rank_providers, ProviderSnapshot, WeightProfiles};

/// Top-level orchestrator wiring registry, state, scoring, prediction,
/// and circuit breaking into the per-request fallback loop.
pub struct Router {
    registry: Arc<ProviderRegistry>,
    state: Arc<dyn StateStore>,
    latency: Arc<LatencyTracker>,
    breaker: Arc<CircuitBreaker>,
    predictor: Arc<ExhaustionPredictor>,
    profiles: WeightProfiles,
    reserve_fraction: f64,
    window: Duration,
    session_ttl: Duration,
    forced_fallback: bool,
    fallback_budget: Option<Duration>,
    observer: Option<Arc<dyn RouteObserver>>,
}

impl Router {
    /// Start building a router over the given configuration.
    #[must_use]
    pub fn builder(config: RouterConfig) -> RouterBuilder {
        RouterBuilder {
            config,
            registry: Arc::new(ProviderRegistry::new()),
            prebuilt: Vec::new(),
            state: None,
            factory: None,
            observer: None,
        }
    }

    /// The provider registry backing this router.
    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Route one chat request.
    ///
    /// # Errors
    /// [`RouterError::NoProvidersConfigured`] when the registry is empty,
    /// [`RouterError::AllProvidersFailed`] when every candidate was tried
    /// or none was eligible, or the non-retriable error of the provider
    /// that rejected the request.
    pub async fn chat(&self, request: RouterRequest) -> RouterResult<RouterResponse> {
        request.validate()?;
        if self.registry.is_empty().await {
            return Err(RouterError::NoProvidersConfigured);
        }

        let estimated = estimate_tokens(&request.messages);
        let (candidates, prior_binding) = self.resolve_candidates(&request, estimated).await?;
        let call = ChatCall::from_request(&request);
        let deadline = self.fallback_budget.map(|budget| Instant::now() + budget);

        let mut attempt_errors = Vec::new();
        let mut attempts: u32 = 0;
        let mut last_provider = String::new();

        for adapter in candidates {
            let provider = adapter.name().to_string();
            if deadline.is_some_and(|d| Instant::now() >= d) {
                debug!(provider = %provider, "fallback budget exhausted");
                break;
            }
            if self.breaker.guard(&provider).await.is_err() {
                debug!(provider = %provider, "circuit open; skipping candidate");
                continue;
            }

            attempts += 1;
            last_provider.clone_from(&provider);
            let started = Instant::now();
            match adapter.chat(&call).await {
                Ok(outcome) => {
                    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                    self.commit_success(
                        &provider,
                        outcome.input_tokens + outcome.output_tokens,
                        latency_ms,
                        request.session_id.as_deref(),
                        prior_binding.as_deref(),
                    )
                    .await;
                    self.emit(RouteEvent {
                        provider: provider.clone(),
                        latency_ms,
                        attempts,
                        priority: request.priority,
                        session_id: request.session_id.clone(),
                        success: true,
                        error_kind: None,
                        timestamp: Utc::now(),
                    })
                    .await;
                    return Ok(RouterResponse {
                        content: outcome.content,
                        provider,
                        model: adapter.model().to_string(),
                        latency_ms,
                        attempts,
                        input_tokens: outcome.input_tokens,
                        output_tokens: outcome.output_tokens,
                    });
                }
                Err(err) => {
                    self.breaker.record_failure(&provider).await;
                    if err.is_retryable() {
                        warn!(provider = %provider, error = %err, "provider failed; trying next candidate");
                        attempt_errors.push(err.into_attempt(&provider));
                    } else {
                        warn!(provider = %provider, error = %err, "non-retriable provider failure");
                        self.emit(RouteEvent {
                            provider,
                            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
                            attempts,
                            priority: request.priority,
                            session_id: request.session_id.clone(),
                            success: false,
                            error_kind: Some(err.kind()),
                            timestamp: Utc::now(),
                        })
                        .await;
                        return Err(err);
                    }
                }
            }
        }

        self.emit(RouteEvent {
            provider: last_provider,
            latency_ms: 0.0,
            attempts,
            priority: request.priority,
            session_id: request.session_id.clone(),
            success: false,
            error_kind: Some(ErrorKind::AllProvidersFailed),
            timestamp: Utc::now(),
        })
        .await;
        Err(RouterError::AllProvidersFailed {
            attempts: attempt_errors,
        })
    }

    /// Route one streaming request.
    ///
    /// Fallback is only possible before the first fragment has been
    /// produced; once streaming has started, mid-stream errors surface to
    /// the caller as-is. The usage sample is recorded when the stream
    /// completes, from the adapter's completion signal when present.
    ///
    /// # Errors
    /// Same taxonomy as [`Router::chat`].
    pub async fn stream(&self, request: RouterRequest) -> RouterResult<FragmentStream> {
        request.validate()?;
        if self.registry.is_empty().await {
            return Err(RouterError::NoProvidersConfigured);
        }

        let estimated = estimate_tokens(&request.messages);
        let (candidates, prior_binding) = self.resolve_candidates(&request, estimated).await?;
        let call = ChatCall::from_request(&request);
        let deadline = self.fallback_budget.map(|budget| Instant::now() + budget);

        let mut attempt_errors = Vec::new();
        let mut attempts: u32 = 0;
        let mut last_provider = String::new();

        for adapter in candidates {
            let provider = adapter.name().to_string();
            if deadline.is_some_and(|d| Instant::now() >= d) {
                debug!(provider = %provider, "fallback budget exhausted");
                break;
            }
            if self.breaker.guard(&provider).await.is_err() {
                debug!(provider = %provider, "circuit open; skipping candidate");
                continue;
            }

            attempts += 1;
            last_provider.clone_from(&provider);
            let started = Instant::now();
            let mut inner = match adapter.stream(&call).await {
                Ok(stream) => stream,
                Err(err) => {
                    self.breaker.record_failure(&provider).await;
                    if err.is_retryable() {
                        warn!(provider = %provider, error = %err, "stream open failed; trying next candidate");
                        attempt_errors.push(err.into_attempt(&provider));
                        continue;
                    }
                    warn!(provider = %provider, error = %err, "non-retriable provider failure");
                    self.emit_failure(&provider, attempts, &request, err.kind()).await;
                    return Err(err);
                }
            };

            match inner.next().await {
                Some(Ok(first)) => {
                    let ttfb_ms = started.elapsed().as_secs_f64() * 1000.0;
                    self.latency.record(&provider, ttfb_ms);
                    self.breaker.record_success(&provider);
                    if let Some(session_id) = request.session_id.as_deref() {
                        if prior_binding.as_deref() != Some(provider.as_str()) {
                            if let Err(err) = self
                                .state
                                .set_session_provider(session_id, &provider, self.session_ttl)
                                .await
                            {
                                warn!(session = %session_id, error = %err, "session binding write failed");
                            }
                        }
                    }
                    return Ok(self.accounted_stream(
                        inner,
                        first,
                        provider,
                        ttfb_ms,
                        attempts,
                        estimated,
                        &request,
                    ));
                }
                Some(Err(err)) => {
                    self.breaker.record_failure(&provider).await;
                    if err.is_retryable() {
                        warn!(provider = %provider, error = %err, "stream failed before first fragment");
                        attempt_errors.push(err.into_attempt(&provider));
                    } else {
                        warn!(provider = %provider, error = %err, "non-retriable provider failure");
                        self.emit_failure(&provider, attempts, &request, err.kind()).await;
                        return Err(err);
                    }
                }
                None => {
                    self.breaker.record_failure(&provider).await;
                    let err = RouterError::transient(&provider, "stream ended before first fragment");
                    warn!(provider = %provider, "empty stream; trying next candidate");
                    attempt_errors.push(err.into_attempt(&provider));
                }
            }
        }

        self.emit(RouteEvent {
            provider: last_provider,
            latency_ms: 0.0,
            attempts,
            priority: request.priority,
            session_id: request.session_id.clone(),
            success: false,
            error_kind: Some(ErrorKind::AllProvidersFailed),
            timestamp: Utc::now(),
        })
        .await;
        Err(RouterError::AllProvidersFailed {
            attempts: attempt_errors,
        })
    }

    /// Per-provider snapshot of usage, headroom, breaker, and latency.
    pub async fn status(&self) -> Vec<ProviderStatus> {
        let mut statuses = Vec::new();
        for adapter in self.registry.get_all_enabled().await {
            let name = adapter.name().to_string();
            let usage = match self.state.get_usage(&name, self.window).await {
                Ok(usage) => usage,
                Err(err) => {
                    warn!(provider = %name, error = %err, "usage unavailable for status");
                    router_state::Usage::default()
                }
            };
            let rpm_headroom = (1.0 - usage.rpm as f64 / f64::from(adapter.rpm_limit())).max(0.0);
            let tpm_headroom = (1.0 - usage.tpm as f64 / f64::from(adapter.tpm_limit())).max(0.0);
            statuses.push(ProviderStatus {
                provider: name.clone(),
                rpm_used: usage.rpm,
                rpm_limit: adapter.rpm_limit(),
                tpm_used: usage.tpm,
                tpm_limit: adapter.tpm_limit(),
                headroom_pct: rpm_headroom.min(tpm_headroom) * 100.0,
                circuit_open: self.breaker.is_open(&name).await,
                avg_latency_ms: self.latency.get(&name),
            });
        }
        statuses
    }

    /// Close every adapter and release backend resources.
    pub async fn close(&self) {
        self.registry.close_all().await;
        if let Err(err) = self.state.close().await {
            warn!(error = %err, "state backend close failed");
        }
    }

    /// Ordered candidate list plus the session binding observed while
    /// resolving it.
    async fn resolve_candidates(
        &self,
        request: &RouterRequest,
        estimated: u64,
    ) -> RouterResult<(Vec<Arc<dyn ProviderAdapter>>, Option<String>)> {
        let enabled = self.registry.get_all_enabled().await;

        if let Some(forced) = &request.force_provider {
            if let Some(adapter) = self.registry.get(forced).await.filter(|a| a.enabled()) {
                let mut candidates = vec![adapter];
                if self.forced_fallback {
                    let scored = self.scored(&enabled, estimated, request.priority).await;
                    candidates.extend(scored.into_iter().filter(|a| a.name() != forced.as_str()));
                }
                return Ok((candidates, None));
            }
            debug!(provider = %forced, "forced provider not mounted; scoring normally");
        }

        let prior_binding = match request.session_id.as_deref() {
            Some(session_id) => match self.state.get_session_provider(session_id).await {
                Ok(binding) => binding,
                Err(err) => {
                    warn!(session = %session_id, error = %err, "session lookup failed");
                    None
                }
            },
            None => None,
        };

        let mut candidates = self.scored(&enabled, estimated, request.priority).await;
        if let Some(bound) = prior_binding.as_deref() {
            if let Some(position) = candidates.iter().position(|a| a.name() == bound) {
                let bound_adapter = candidates.remove(position);
                candidates.insert(0, bound_adapter);
            }
        }
        Ok((candidates, prior_binding))
    }

    async fn scored(
        &self,
        enabled: &[Arc<dyn ProviderAdapter>],
        estimated: u64,
        priority: Priority,
    ) -> Vec<Arc<dyn ProviderAdapter>> {
        let mut snapshots = Vec::with_capacity(enabled.len());
        let mut at_risk = HashSet::new();
        for adapter in enabled {
            let name = adapter.name().to_string();
            let usage = match self.state.get_usage(&name, self.window).await {
                Ok(usage) => Some(usage),
                Err(err) => {
                    warn!(provider = %name, error = %err, "usage unavailable; scoring with reduced visibility");
                    None
                }
            };
            if self
                .predictor
                .at_risk(&name, adapter.rpm_limit(), adapter.tpm_limit())
            {
                at_risk.insert(name.clone());
            }
            snapshots.push(ProviderSnapshot {
                latency_ema_ms: self.latency.get(&name),
                rpm_limit: adapter.rpm_limit(),
                tpm_limit: adapter.tpm_limit(),
                weight: adapter.weight(),
                usage,
                name,
            });
        }

        let ranked = rank_providers(
            &snapshots,
            estimated,
            priority,
            &at_risk,
            &self.profiles,
            self.reserve_fraction,
        );
        ranked
            .iter()
            .filter_map(|scored| {
                enabled
                    .iter()
                    .find(|adapter| adapter.name() == scored.name)
                    .cloned()
            })
            .collect()
    }

    async fn commit_success(
        &self,
        provider: &str,
        tokens: u64,
        latency_ms: f64,
        session_id: Option<&str>,
        prior_binding: Option<&str>,
    ) {
        // A store fault never fails the call: retry the sample write once,
        // then drop it.
        if let Err(err) = self.state.record_request(provider, tokens, self.window).await {
            warn!(provider = %provider, error = %err, "usage sample write failed; retrying once");
            if let Err(err) = self.state.record_request(provider, tokens, self.window).await {
                warn!(provider = %provider, error = %err, "usage sample dropped");
            }
        }
        self.predictor.record(provider, tokens);
        self.latency.record(provider, latency_ms);
        self.breaker.record_success(provider);

        if let Some(session_id) = session_id {
            if prior_binding != Some(provider) {
                if let Err(err) = self
                    .state
                    .set_session_provider(session_id, provider, self.session_ttl)
                    .await
                {
                    warn!(session = %session_id, error = %err, "session binding write failed");
                }
            }
        }
    }

    /// Wrap a live stream so completion records the usage sample and
    /// emits the route event. Dropping the stream mid-flight abandons
    /// both, matching cancellation semantics.
    #[allow(clippy::too_many_arguments)]
    fn accounted_stream(
        &self,
        mut inner: FragmentStream,
        first: StreamFragment,
        provider: String,
        ttfb_ms: f64,
        attempts: u32,
        estimated: u64,
        request: &RouterRequest,
    ) -> FragmentStream {
        let state = Arc::clone(&self.state);
        let predictor = Arc::clone(&self.predictor);
        let observer = self.observer.clone();
        let window = self.window;
        let session_id = request.session_id.clone();
        let priority = request.priority;

        Box::pin(async_stream::stream! {
            let mut usage: Option<TokenUsage> = first.usage;
            let mut stream_error: Option<ErrorKind> = None;
            yield Ok(first);

            while let Some(item) = inner.next().await {
                match item {
                    Ok(fragment) => {
                        if let Some(reported) = fragment.usage {
                            usage = Some(reported);
                        }
                        yield Ok(fragment);
                    }
                    Err(err) => {
                        stream_error = Some(err.kind());
                        yield Err(err);
                        break;
                    }
                }
            }

            let usage = usage.unwrap_or(TokenUsage {
                input_tokens: estimated,
                output_tokens: 0,
            });
            let tokens = usage.total();
            if let Err(err) = state.record_request(&provider, tokens, window).await {
                warn!(provider = %provider, error = %err, "usage sample write failed; retrying once");
                if let Err(err) = state.record_request(&provider, tokens, window).await {
                    warn!(provider = %provider, error = %err, "usage sample dropped");
                }
            }
            predictor.record(&provider, tokens);

            if let Some(observer) = &observer {
                let event = RouteEvent {
                    provider: provider.clone(),
                    latency_ms: ttfb_ms,
                    attempts,
                    priority,
                    session_id: session_id.clone(),
                    success: stream_error.is_none(),
                    error_kind: stream_error,
                    timestamp: Utc::now(),
                };
                if let Err(err) = observer.on_route(event).await {
                    debug!(error = %err, "route observer error discarded");
                }
            }
        })
    }

    async fn emit_failure(
        &self,
        provider: &str,
        attempts: u32,
        request: &RouterRequest,
        kind: ErrorKind,
    ) {
        self.emit(RouteEvent {
            provider: provider.to_string(),
            latency_ms: 0.0,
            attempts,
            priority: request.priority,
            session_id: request.session_id.clone(),
            success: false,
            error_kind: Some(kind),
            timestamp: Utc::now(),
        })
        .await;
    }

    async fn emit(&self, event: RouteEvent) {
        if let Some(observer) = &self.observer {
            if let Err(err) = observer.on_route(event).await {
                debug!(error = %err, "route observer error discarded");
            }
        }
    }
}

/// Per-provider entry in the [`Router::status`] snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    /// Provider name.
    pub provider: String,
    /// Samples in the current window.
    pub rpm_used: u64,
    /// RPM quota.
    pub rpm_limit: u32,
    /// Tokens in the current window.
    pub tpm_used: u64,
    /// TPM quota.
    pub tpm_limit: u32,
    /// Remaining min-headroom as a percentage.
    pub headroom_pct: f64,
    /// Whether the circuit is currently open.
    pub circuit_open: bool,
    /// Current latency EMA in milliseconds.
    pub avg_latency_ms: f64,
}

/// Builder assembling a [`Router`] from configuration plus optional
/// collaborators.
pub struct RouterBuilder {
    config: RouterConfig,
    registry: Arc<ProviderRegistry>,
    prebuilt: Vec<Arc<dyn ProviderAdapter>>,
    state: Option<Arc<dyn StateStore>>,
    factory: Option<Arc<dyn AdapterFactory>>,
    observer: Option<Arc<dyn RouteObserver>>,
}

impl RouterBuilder {
    /// Use a caller-supplied state backend instead of the one selected
    /// by the configuration.
    #[must_use]
    pub fn state_store(mut self, state: Arc<dyn StateStore>) -> Self {
        self.state = Some(state);
        self
    }

    /// Mount a prebuilt adapter at build time.
    #[must_use]
    pub fn adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.prebuilt.push(adapter);
        self
    }

    /// Factory used to build adapters from the configured provider
    /// declarations.
    #[must_use]
    pub fn adapter_factory(mut self, factory: Arc<dyn AdapterFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Attach the route-event observer.
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn RouteObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Validate the configuration, connect the state backend, and mount
    /// the configured providers.
    ///
    /// # Errors
    /// Configuration errors, shared-store connection failures, and
    /// adapter factory failures.
    pub async fn build(self) -> RouterResult<Router> {
        self.config.validate_config().map_err(RouterError::from)?;

        let state: Arc<dyn StateStore> = match self.state {
            Some(state) => state,
            None => match self.config.shared_store_url.as_deref() {
                Some(url) => Arc::new(
                    RedisStateStore::connect(url)
                        .await
                        .map_err(|err| RouterError::state_backend(err.to_string()))?,
                ),
                None => Arc::new(MemoryStateStore::new()),
            },
        };

        let breaker_config = CircuitBreakerConfig {
            failure_threshold: self.config.circuit_breaker.failure_threshold,
            cooldown: self.config.circuit_breaker.cooldown(),
        };
        let breaker = if self.config.shared_store_url.is_some() {
            CircuitBreaker::with_shared_store(breaker_config, Arc::clone(&state))
        } else {
            CircuitBreaker::new(breaker_config)
        };

        if let Some(factory) = &self.factory {
            for provider in &self.config.providers {
                self.registry
                    .register_from_config(provider, factory.as_ref())
                    .await?;
            }
        }
        for adapter in self.prebuilt {
            self.registry.register_adapter(adapter).await;
        }

        Ok(Router {
            predictor: Arc::new(ExhaustionPredictor::new(
                self.config.exhaustion.clone(),
                self.config.window(),
            )),
            latency: Arc::new(LatencyTracker::new(self.config.ema_alpha)),
            breaker: Arc::new(breaker),
            profiles: WeightProfiles::with_overrides(self.config.routing_weights.as_ref()),
            reserve_fraction: self.config.high_priority_reserve_fraction,
            window: self.config.window(),
            session_ttl: self.config.session_ttl(),
            forced_fallback: self.config.forced_fallback,
            fallback_budget: self.config.fallback_budget(),
            registry: self.registry,
            state,
            observer: self.observer,
        })
    }
}
