//! Engine facade.
//!
//! `NotificationEngine` wires the scheduler, dispatcher, and stats
//! aggregator around injected collaborators: the record store, the rule
//! evaluator, an HTTP client, and a clock. Everything the surrounding
//! system calls lives here.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::channels::AdapterSet;
use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry, CircuitSnapshot};
use crate::clock::{Clock, SystemClock};
use crate::dispatcher::{Dispatcher, DispatcherConfig};
use crate::error::DeliveryError;
use crate::models::DeliveryStats;
use crate::scheduler::{RuleEvaluator, Scheduler};
use crate::stats::StatsAggregator;
use crate::store::RecordStore;

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the outbound relay for email/whatsapp/slack sends.
    pub relay_base_url: String,
    /// Per-request timeout on the default HTTP client.
    pub http_timeout: Duration,
    pub dispatcher: DispatcherConfig,
    pub breaker: CircuitBreakerConfig,
}

impl EngineConfig {
    #[must_use]
    pub fn new(relay_base_url: impl Into<String>) -> Self {
        Self {
            relay_base_url: relay_base_url.into(),
            http_timeout: Duration::from_secs(10),
            dispatcher: DispatcherConfig::default(),
            breaker: CircuitBreakerConfig::default(),
        }
    }

    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: DispatcherConfig) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    #[must_use]
    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }
}

/// The alert notification delivery engine.
pub struct NotificationEngine {
    store: Arc<dyn RecordStore>,
    evaluator: Arc<dyn RuleEvaluator>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    client: reqwest::Client,
    dispatcher: Dispatcher,
    scheduler: Scheduler,
    stats: StatsAggregator,
}

impl NotificationEngine {
    /// Create an engine with the system clock and a default HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::InvalidConfig` if the HTTP client cannot be
    /// built.
    pub fn new(
        store: Arc<dyn RecordStore>,
        evaluator: Arc<dyn RuleEvaluator>,
        config: EngineConfig,
    ) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("alert-delivery/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| DeliveryError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self::assemble(
            store,
            evaluator,
            config,
            Arc::new(SystemClock),
            client,
        ))
    }

    /// Substitute the clock. Intended for tests; resets in-memory circuit
    /// breaker state.
    #[must_use]
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self::assemble(self.store, self.evaluator, self.config, clock, self.client)
    }

    /// Substitute the HTTP client. Resets in-memory circuit breaker state.
    #[must_use]
    pub fn with_http_client(self, client: reqwest::Client) -> Self {
        Self::assemble(self.store, self.evaluator, self.config, self.clock, client)
    }

    fn assemble(
        store: Arc<dyn RecordStore>,
        evaluator: Arc<dyn RuleEvaluator>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        client: reqwest::Client,
    ) -> Self {
        let adapters = Arc::new(AdapterSet::new(
            client.clone(),
            config.relay_base_url.clone(),
        ));
        let breakers = CircuitBreakerRegistry::new(config.breaker.clone(), Arc::clone(&clock));
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            adapters,
            breakers,
            Arc::clone(&clock),
            config.dispatcher.clone(),
        );
        let scheduler = Scheduler::new(
            Arc::clone(&store),
            Arc::clone(&evaluator),
            Arc::clone(&clock),
        );
        let stats = StatsAggregator::new(Arc::clone(&store), Arc::clone(&clock));

        Self {
            store,
            evaluator,
            config,
            clock,
            client,
            dispatcher,
            scheduler,
            stats,
        }
    }

    /// Process one batch of due deliveries; returns the number of records
    /// claimed. Safe to call from overlapping triggers.
    pub async fn process_pending_deliveries(&self) -> usize {
        self.dispatcher.process_pending_deliveries().await
    }

    /// Queue delivery records for a newly raised alert. Returns the count
    /// created; never fails.
    pub async fn schedule_alert_notifications(&self, alert_id: Uuid) -> usize {
        self.scheduler.schedule_alert_notifications(alert_id).await
    }

    /// Delivery breakdown over a trailing window such as `"1h"` or
    /// `"24h"`.
    pub async fn delivery_stats(&self, window: &str) -> Result<DeliveryStats, DeliveryError> {
        self.stats.delivery_stats(window).await
    }

    /// Circuit breaker state for one channel, if it has seen traffic.
    pub async fn circuit_snapshot(&self, channel_id: Uuid) -> Option<CircuitSnapshot> {
        self.dispatcher.circuit_snapshot(channel_id).await
    }

    /// Circuit breaker state for every channel seen this process.
    pub async fn circuit_snapshots(&self) -> Vec<CircuitSnapshot> {
        self.dispatcher.circuit_snapshots().await
    }
}
