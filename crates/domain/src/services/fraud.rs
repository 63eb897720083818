//! Per-order bookkeeping of forged capture callbacks.

use std::time::Duration;

use metrics::counter;
use moka::sync::Cache;
use tracing::warn;

use crate::model::OrderId;

pub const DEFAULT_FRAUD_THRESHOLD: u16 = 5;
pub const DEFAULT_FRAUD_WINDOW: Duration = Duration::from_secs(60 * 60);
const DEFAULT_TRACKED_ORDERS: u64 = 10_000;

/// When an order is escalated and how long its mismatch count is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FraudPolicy {
    pub threshold: u16,
    /// A count is dropped once the order has gone this long without a new
    /// mismatch.
    pub window: Duration,
    pub max_tracked_orders: u64,
}

impl Default for FraudPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_FRAUD_THRESHOLD,
            window: DEFAULT_FRAUD_WINDOW,
            max_tracked_orders: DEFAULT_TRACKED_ORDERS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FraudSignal {
    None,
    Escalated { attempts: u16 },
}

/// Counts signature mismatches against orders that exist in the store.
/// Callers record only after the order has been looked up, so the key space
/// is bounded by real orders as well as by the cache capacity.
#[derive(Clone)]
pub struct FraudTracker {
    threshold: u16,
    mismatches: Cache<OrderId, u16>,
}

impl FraudTracker {
    pub fn new(policy: FraudPolicy) -> Self {
        Self {
            threshold: policy.threshold.max(1),
            mismatches: Cache::builder()
                .time_to_live(policy.window)
                .max_capacity(policy.max_tracked_orders)
                .build(),
        }
    }

    pub fn record_mismatch(&self, order_id: &OrderId) -> FraudSignal {
        let attempts = self
            .mismatches
            .entry(order_id.clone())
            .and_upsert_with(|current| {
                current.map_or(1, |entry| entry.into_value().saturating_add(1))
            })
            .into_value();
        counter!("payment_signature_mismatch_total", "state" => "recorded").increment(1);

        if attempts < self.threshold {
            return FraudSignal::None;
        }
        counter!("payment_signature_mismatch_total", "state" => "escalated").increment(1);
        warn!(
            order_id = order_id.as_str(),
            attempts, "repeated forged callbacks for order"
        );
        FraudSignal::Escalated { attempts }
    }

    pub fn attempts(&self, order_id: &OrderId) -> u16 {
        self.mismatches.get(order_id).unwrap_or(0)
    }

    pub fn tracked_orders(&self) -> u64 {
        self.mismatches.run_pending_tasks();
        self.mismatches.entry_count()
    }
}

impl Default for FraudTracker {
    fn default() -> Self {
        Self::new(FraudPolicy::default())
    }
}
