//! Usage accounting: prepaid balances and call history
//!
//! The manager only ever calls `record` and `decrement`; the remaining
//! operations back the HTTP API.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::InMemoryUsageStore;

use crate::call::CallRecord;
use crate::error::CallError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seconds granted to a caller on first sign-in (7 minutes)
pub const DEFAULT_SECONDS: u64 = 420;

/// A caller's remaining allotted seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub caller_id: String,
    pub seconds: u64,
    pub last_updated: DateTime<Utc>,
}

impl Balance {
    pub fn new(caller_id: impl Into<String>, seconds: u64) -> Self {
        Self {
            caller_id: caller_id.into(),
            seconds,
            last_updated: Utc::now(),
        }
    }

    /// Subtract used seconds, flooring at zero
    pub fn debit(&mut self, seconds: u64) {
        self.seconds = self.seconds.saturating_sub(seconds);
        self.last_updated = Utc::now();
    }
}

/// Persists finished calls and charges them against the caller's balance
#[async_trait::async_trait]
pub trait UsageRecorder: Send + Sync {
    /// Append a finished call to the history
    async fn record(&self, record: &CallRecord) -> Result<(), CallError>;

    /// Charge used seconds; the balance never drops below zero
    async fn decrement(&self, caller_id: &str, seconds: u64) -> Result<Balance, CallError>;

    async fn balance(&self, caller_id: &str) -> Result<Option<Balance>, CallError>;

    /// Return the caller's wallet, provisioning the default grant if missing
    async fn ensure_account(&self, caller_id: &str) -> Result<Balance, CallError>;

    /// Calls of one caller, newest first
    async fn history(&self, caller_id: &str) -> Result<Vec<CallRecord>, CallError>;
}

/// Newest-first ordering shared by the stores
fn newest_first(mut records: Vec<CallRecord>) -> Vec<CallRecord> {
    records.reverse();
    records.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    records
}
