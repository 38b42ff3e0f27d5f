//! Token persistence.
//!
//! The store keeps a history of snapshots; only the most recent one is
//! authoritative. Writers are serialized by the lifecycle manager, not here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::RwLock;

use super::types::TokenRecord;
use crate::error::{StoreError, StoreResult};

/// Persistence for the current token record.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist a newly issued record.
    async fn create(&self, record: &TokenRecord) -> StoreResult<()>;

    /// Fetch the most recently issued record.
    async fn latest(&self) -> StoreResult<Option<TokenRecord>>;

    /// Replace the stored snapshot of an existing record (matched by id).
    async fn update(&self, record: &TokenRecord) -> StoreResult<()>;
}

// ─── In-memory ───────────────────────────────────────────────────────────────

/// In-memory token store for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    records: Arc<RwLock<Vec<TokenRecord>>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with one record.
    #[must_use]
    pub fn with_record(record: TokenRecord) -> Self {
        Self { records: Arc::new(RwLock::new(vec![record])) }
    }

    /// Number of records ever created.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn create(&self, record: &TokenRecord) -> StoreResult<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn latest(&self) -> StoreResult<Option<TokenRecord>> {
        Ok(self.records.read().await.last().cloned())
    }

    async fn update(&self, record: &TokenRecord) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let slot = records
            .iter_mut()
            .rev()
            .find(|r| r.id == record.id)
            .ok_or(StoreError::NotFound(record.id))?;
        *slot = record.clone();
        Ok(())
    }
}

impl std::fmt::Debug for MemoryTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTokenStore").finish()
    }
}

// ─── JSON-lines log ──────────────────────────────────────────────────────────

/// Append-only JSON-lines token log.
///
/// Every `create` and `update` appends one snapshot; the last well-formed
/// line is the current record.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Open (creating if needed) the log at `path`.
    ///
    /// # Errors
    ///
    /// Returns error if the file or its parent directory cannot be created.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;

        tracing::debug!(path = %path.display(), "Opened token log");
        Ok(Self { path })
    }

    /// Location of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> StoreResult<Vec<TokenRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TokenRecord>(line) {
                Ok(record) => records.push(record),
                // A torn final write must not hide the earlier history.
                Err(e) => {
                    tracing::warn!(
                        line = index + 1,
                        error = %e,
                        "Skipping corrupt token log entry"
                    );
                }
            }
        }
        Ok(records)
    }

    async fn append(&self, record: &TokenRecord) -> StoreResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await?;

        // Terminate a torn trailing fragment so this entry starts on its own line.
        if file.metadata().await?.len() > 0 {
            let mut last = [0u8; 1];
            file.seek(std::io::SeekFrom::End(-1)).await?;
            file.read_exact(&mut last).await?;
            if last[0] != b'\n' {
                line.insert(0, b'\n');
            }
        }

        file.write_all(&line).await?;
        file.sync_data().await?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn create(&self, record: &TokenRecord) -> StoreResult<()> {
        self.append(record).await
    }

    async fn latest(&self) -> StoreResult<Option<TokenRecord>> {
        Ok(self.read_all().await?.pop())
    }

    async fn update(&self, record: &TokenRecord) -> StoreResult<()> {
        if !self.read_all().await?.iter().any(|r| r.id == record.id) {
            return Err(StoreError::NotFound(record.id));
        }
        self.append(record).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::token::TokenResponse;

    fn record(access: &str) -> TokenRecord {
        TokenRecord::issue(
            TokenResponse {
                access_token: access.to_string(),
                refresh_token: Some("RT".to_string()),
                expires_in: 3600,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_memory_latest_is_last_created() {
        let store = MemoryTokenStore::new();
        assert!(store.latest().await.unwrap().is_none());

        store.create(&record("AT1")).await.unwrap();
        store.create(&record("AT2")).await.unwrap();

        assert_eq!(store.latest().await.unwrap().unwrap().access_token, "AT2");
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_memory_update_in_place() {
        let original = record("AT1");
        let store = MemoryTokenStore::with_record(original.clone());

        let mut updated = original.clone();
        updated.access_token = "AT2".to_string();
        store.update(&updated).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.latest().await.unwrap().unwrap().access_token, "AT2");
    }

    #[tokio::test]
    async fn test_memory_update_unknown_record_fails() {
        let store = MemoryTokenStore::new();
        let result = store.update(&record("AT")).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tokens.jsonl");

        let first = record("AT1");
        {
            let store = FileTokenStore::open(&path).await.unwrap();
            store.create(&first).await.unwrap();
            let mut refreshed = first.clone();
            refreshed.access_token = "AT1-refreshed".to_string();
            store.update(&refreshed).await.unwrap();
        }

        let store = FileTokenStore::open(&path).await.unwrap();
        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest.id, first.id);
        assert_eq!(latest.access_token, "AT1-refreshed");
    }

    #[tokio::test]
    async fn test_file_store_skips_torn_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.jsonl");
        let store = FileTokenStore::open(&path).await.unwrap();
        store.create(&record("AT1")).await.unwrap();

        let mut file = tokio::fs::OpenOptions::new().append(true).open(&path).await.unwrap();
        file.write_all(b"{\"id\":\"trunc").await.unwrap();

        assert_eq!(store.latest().await.unwrap().unwrap().access_token, "AT1");
    }

    #[tokio::test]
    async fn test_file_write_after_torn_line_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.jsonl");
        let store = FileTokenStore::open(&path).await.unwrap();
        let first = record("AT1");
        store.create(&first).await.unwrap();

        let mut file = tokio::fs::OpenOptions::new().append(true).open(&path).await.unwrap();
        file.write_all(b"{\"id\":\"trunc").await.unwrap();
        drop(file);

        store.create(&record("AT2")).await.unwrap();
        assert_eq!(store.latest().await.unwrap().unwrap().access_token, "AT2");

        let mut refreshed = first.clone();
        refreshed.access_token = "AT1-refreshed".to_string();
        store.update(&refreshed).await.unwrap();

        let reopened = FileTokenStore::open(&path).await.unwrap();
        assert_eq!(reopened.latest().await.unwrap().unwrap().access_token, "AT1-refreshed");
        assert_eq!(reopened.read_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_file_update_unknown_record_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::open(dir.path().join("t.jsonl")).await.unwrap();
        assert!(matches!(store.update(&record("AT")).await, Err(StoreError::NotFound(_))));
    }
}
