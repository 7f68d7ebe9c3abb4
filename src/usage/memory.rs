use super::{newest_first, Balance, UsageRecorder, DEFAULT_SECONDS};
use crate::call::CallRecord;
use crate::error::CallError;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local usage store
pub struct InMemoryUsageStore {
    default_seconds: u64,
    wallets: RwLock<HashMap<String, Balance>>,
    records: RwLock<Vec<CallRecord>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::with_default_seconds(DEFAULT_SECONDS)
    }

    pub fn with_default_seconds(default_seconds: u64) -> Self {
        Self {
            default_seconds,
            wallets: RwLock::new(HashMap::new()),
            records: RwLock::new(Vec::new()),
        }
    }

    /// Overwrite a caller's balance
    pub async fn set_balance(&self, caller_id: &str, seconds: u64) {
        let mut wallets = self.wallets.write().await;
        wallets.insert(caller_id.to_string(), Balance::new(caller_id, seconds));
    }

    /// Every record written so far, in write order
    pub async fn records(&self) -> Vec<CallRecord> {
        self.records.read().await.clone()
    }
}

impl Default for InMemoryUsageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl UsageRecorder for InMemoryUsageStore {
    async fn record(&self, record: &CallRecord) -> Result<(), CallError> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn decrement(&self, caller_id: &str, seconds: u64) -> Result<Balance, CallError> {
        let mut wallets = self.wallets.write().await;
        let wallet = wallets
            .get_mut(caller_id)
            .ok_or_else(|| CallError::Persistence(format!("Wallet not found for {}", caller_id)))?;
        wallet.debit(seconds);
        Ok(wallet.clone())
    }

    async fn balance(&self, caller_id: &str) -> Result<Option<Balance>, CallError> {
        Ok(self.wallets.read().await.get(caller_id).cloned())
    }

    async fn ensure_account(&self, caller_id: &str) -> Result<Balance, CallError> {
        let mut wallets = self.wallets.write().await;
        let wallet = wallets
            .entry(caller_id.to_string())
            .or_insert_with(|| Balance::new(caller_id, self.default_seconds));
        Ok(wallet.clone())
    }

    async fn history(&self, caller_id: &str) -> Result<Vec<CallRecord>, CallError> {
        let records = self.records.read().await;
        let mine = records
            .iter()
            .filter(|r| r.caller_id == caller_id)
            .cloned()
            .collect();
        Ok(newest_first(mine))
    }
}
