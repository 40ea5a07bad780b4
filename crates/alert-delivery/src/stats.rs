//! Time-windowed delivery statistics.
//!
//! Purely computed from delivery records; nothing here mutates state.

use std::sync::Arc;

use chrono::Duration;

use crate::clock::Clock;
use crate::error::DeliveryError;
use crate::models::{DeliveryStats, DeliveryStatus};
use crate::store::RecordStore;

/// Parse a trailing-window spec like `"30m"`, `"1h"`, `"24h"`, `"7d"`.
pub fn parse_window(window: &str) -> Result<Duration, DeliveryError> {
    let window = window.trim();
    if !window.is_ascii() || window.len() < 2 {
        return Err(DeliveryError::InvalidWindow(window.to_string()));
    }
    let (value, unit) = window.split_at(window.len() - 1);
    let amount: i64 = value
        .parse()
        .map_err(|_| DeliveryError::InvalidWindow(window.to_string()))?;
    if amount <= 0 {
        return Err(DeliveryError::InvalidWindow(window.to_string()));
    }

    match unit {
        "m" => Ok(Duration::minutes(amount)),
        "h" => Ok(Duration::hours(amount)),
        "d" => Ok(Duration::days(amount)),
        _ => Err(DeliveryError::InvalidWindow(window.to_string())),
    }
}

/// Computes delivery breakdowns over a trailing window.
#[derive(Clone)]
pub struct StatsAggregator {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl StatsAggregator {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Success/failure/method breakdown for records created inside the
    /// window. `success_rate` is a rounded percentage and 0 when the
    /// window is empty.
    pub async fn delivery_stats(&self, window: &str) -> Result<DeliveryStats, DeliveryError> {
        let duration = parse_window(window)?;
        let since = self.clock.now() - duration;
        let records = self.store.deliveries_since(since).await?;

        let mut stats = DeliveryStats::default();
        for record in &records {
            stats.total += 1;
            match record.status {
                DeliveryStatus::Sent => stats.sent += 1,
                DeliveryStatus::Failed => stats.failed += 1,
                DeliveryStatus::Pending | DeliveryStatus::Sending => stats.pending += 1,
                DeliveryStatus::Retrying => stats.retrying += 1,
            }
            *stats
                .by_method
                .entry(record.method.as_str().to_string())
                .or_insert(0) += 1;
        }

        stats.success_rate = if stats.total == 0 {
            0
        } else {
            ((stats.sent as f64 / stats.total as f64) * 100.0).round() as u32
        };

        Ok(stats)
    }
}
