use super::{newest_first, Balance, UsageRecorder, DEFAULT_SECONDS};
use crate::call::CallRecord;
use crate::error::CallError;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

const WALLETS_FILE: &str = "wallets.json";
const CALLS_FILE: &str = "calls.jsonl";

/// Usage store persisted as JSON files in a data directory
///
/// - `wallets.json` - caller id → balance
/// - `calls.jsonl` - one call record per line, append-only
pub struct JsonFileStore {
    dir: PathBuf,
    default_seconds: u64,
    /// Serializes read-modify-write cycles on the files
    io: Mutex<()>,
}

impl JsonFileStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_default_seconds(dir, DEFAULT_SECONDS)
    }

    pub fn with_default_seconds(dir: impl AsRef<Path>, default_seconds: u64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).context("Failed to create usage data directory")?;

        info!("Usage store opened at {}", dir.display());

        Ok(Self {
            dir,
            default_seconds,
            io: Mutex::new(()),
        })
    }

    fn wallets_path(&self) -> PathBuf {
        self.dir.join(WALLETS_FILE)
    }

    fn calls_path(&self) -> PathBuf {
        self.dir.join(CALLS_FILE)
    }

    async fn load_wallets(&self) -> Result<HashMap<String, Balance>> {
        match tokio::fs::read(self.wallets_path()).await {
            Ok(bytes) => serde_json::from_slice(&bytes).context("Corrupt wallets file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e).context("Failed to read wallets file"),
        }
    }

    async fn save_wallets(&self, wallets: &HashMap<String, Balance>) -> Result<()> {
        let tmp = self.dir.join(format!("{}.tmp", WALLETS_FILE));
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(wallets)?)
            .await
            .context("Failed to write wallets file")?;
        tokio::fs::rename(&tmp, self.wallets_path())
            .await
            .context("Failed to replace wallets file")?;
        Ok(())
    }

    async fn load_calls(&self) -> Result<Vec<CallRecord>> {
        let text = match tokio::fs::read_to_string(self.calls_path()).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context("Failed to read call history"),
        };

        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).context("Corrupt call history line"))
            .collect()
    }
}

#[async_trait::async_trait]
impl UsageRecorder for JsonFileStore {
    async fn record(&self, record: &CallRecord) -> Result<(), CallError> {
        let _guard = self.io.lock().await;

        let mut line = serde_json::to_vec(record).map_err(CallError::persistence)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.calls_path())
            .await
            .map_err(CallError::persistence)?;
        file.write_all(&line).await.map_err(CallError::persistence)?;
        file.flush().await.map_err(CallError::persistence)?;

        Ok(())
    }

    async fn decrement(&self, caller_id: &str, seconds: u64) -> Result<Balance, CallError> {
        let _guard = self.io.lock().await;

        let mut wallets = self
            .load_wallets()
            .await
            .map_err(|e| CallError::persistence(format!("{:#}", e)))?;
        let wallet = wallets
            .get_mut(caller_id)
            .ok_or_else(|| CallError::Persistence(format!("Wallet not found for {}", caller_id)))?;
        wallet.debit(seconds);
        let updated = wallet.clone();

        self.save_wallets(&wallets)
            .await
            .map_err(|e| CallError::persistence(format!("{:#}", e)))?;

        Ok(updated)
    }

    async fn balance(&self, caller_id: &str) -> Result<Option<Balance>, CallError> {
        let _guard = self.io.lock().await;
        let wallets = self
            .load_wallets()
            .await
            .map_err(|e| CallError::persistence(format!("{:#}", e)))?;
        Ok(wallets.get(caller_id).cloned())
    }

    async fn ensure_account(&self, caller_id: &str) -> Result<Balance, CallError> {
        let _guard = self.io.lock().await;

        let mut wallets = self
            .load_wallets()
            .await
            .map_err(|e| CallError::persistence(format!("{:#}", e)))?;
        if let Some(existing) = wallets.get(caller_id) {
            return Ok(existing.clone());
        }

        let wallet = Balance::new(caller_id, self.default_seconds);
        wallets.insert(caller_id.to_string(), wallet.clone());
        self.save_wallets(&wallets)
            .await
            .map_err(|e| CallError::persistence(format!("{:#}", e)))?;

        info!(
            "Provisioned wallet for {} with {} seconds",
            caller_id, self.default_seconds
        );
        Ok(wallet)
    }

    async fn history(&self, caller_id: &str) -> Result<Vec<CallRecord>, CallError> {
        let _guard = self.io.lock().await;
        let calls = self
            .load_calls()
            .await
            .map_err(|e| CallError::persistence(format!("{:#}", e)))?;
        let mine = calls
            .into_iter()
            .filter(|r| r.caller_id == caller_id)
            .collect();
        Ok(newest_first(mine))
    }
}
