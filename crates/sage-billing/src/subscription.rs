//! Subscription Status Store
//!
//! Keeps the latest subscription status reported by webhooks, per customer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{BillingError, Result};

/// Status recorded when a checkout completes
pub const STATUS_ACTIVE: &str = "active";

/// Latest known status for one customer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub customer_id: String,

    /// Provider status string (`active`, `past_due`, `canceled`, ...)
    pub status: String,

    pub updated_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    pub fn new(customer_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            status: status.into(),
            updated_at: Utc::now(),
        }
    }

    /// Whether the subscription currently grants access
    pub fn is_active(&self) -> bool {
        matches!(self.status.as_str(), "active" | "trialing")
    }
}

/// Subscription storage trait
pub trait SubscriptionStore: Send + Sync {
    /// Insert or replace the status for a customer
    fn upsert(&self, customer_id: &str, status: &str) -> Result<SubscriptionRecord>;

    /// Current status for a customer
    fn get(&self, customer_id: &str) -> Result<Option<SubscriptionRecord>>;
}

/// In-memory subscription store (for development)
#[derive(Default)]
pub struct MemorySubscriptionStore {
    records: RwLock<HashMap<String, SubscriptionRecord>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of customers with a recorded status
    pub fn len(&self) -> Result<usize> {
        let records = self
            .records
            .read()
            .map_err(|e| BillingError::Storage(e.to_string()))?;
        Ok(records.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl SubscriptionStore for MemorySubscriptionStore {
    fn upsert(&self, customer_id: &str, status: &str) -> Result<SubscriptionRecord> {
        let record = SubscriptionRecord::new(customer_id, status);
        let mut records = self
            .records
            .write()
            .map_err(|e| BillingError::Storage(e.to_string()))?;
        records.insert(customer_id.to_string(), record.clone());
        Ok(record)
    }

    fn get(&self, customer_id: &str) -> Result<Option<SubscriptionRecord>> {
        let records = self
            .records
            .read()
            .map_err(|e| BillingError::Storage(e.to_string()))?;
        Ok(records.get(customer_id).cloned())
    }
}
