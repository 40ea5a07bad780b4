//! Alert notification delivery engine.
//!
//! Fans priority alerts out across heterogeneous channels (email relay,
//! chat relay, generic webhook, team chat) with bounded exponential-backoff
//! retries, per-channel circuit breaking and hourly rate limiting, and
//! time-windowed delivery statistics. Persistence and alert detection live
//! in the surrounding system and are consumed through the `RecordStore`
//! and `RuleEvaluator` traits.

pub mod backoff;
pub mod channels;
pub mod circuit_breaker;
pub mod clock;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod models;
pub mod retry;
pub mod scheduler;
pub mod stats;
pub mod store;

pub use backoff::BackoffPolicy;
pub use channels::{AdapterSet, ChannelAdapter, NotificationMessage};
pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitSnapshot, CircuitState,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use engine::{EngineConfig, NotificationEngine};
pub use error::{DeliveryError, ErrorClass};
pub use models::{
    Alert, AlertStatus, AlertType, ChannelConfig, ChannelKind, DeliveryRecord, DeliveryStats,
    DeliveryStatus, NotificationChannel,
};
pub use retry::{RetryOutcome, RetryPolicy};
pub use scheduler::{RuleEvaluator, Scheduler};
pub use stats::StatsAggregator;
pub use store::{DeliveryUpdate, RecordStore, StoreError};
