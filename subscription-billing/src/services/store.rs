//! JSON-file subscription store.
//!
//! The whole subscription list lives in one JSON document. Every write goes
//! through a single writer lock and lands via write-to-temp-then-rename, so a
//! reader never observes a half-written file.

use crate::error::StoreError;
use crate::models::{Subscription, SubscriptionKey};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub struct SubscriptionStore {
    path: PathBuf,
    writer: Mutex<()>,
}

impl SubscriptionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every subscription. A missing file is an empty store.
    pub async fn load_all(&self) -> Result<Vec<Subscription>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the whole document.
    pub async fn save_all(&self, subscriptions: &[Subscription]) -> Result<(), StoreError> {
        let _guard = self.writer.lock().await;
        self.write(subscriptions).await
    }

    /// Read-modify-write the first record with `key`. Returns the updated
    /// record, or `None` when no record has `key`.
    pub async fn update<F>(
        &self,
        key: &SubscriptionKey,
        mutate: F,
    ) -> Result<Option<Subscription>, StoreError>
    where
        F: FnOnce(&mut Subscription),
    {
        self.modify(|records| records.iter().position(|s| s.key() == *key), mutate)
            .await
    }

    /// Read-modify-write the record at `index` of the document, provided it
    /// still carries `key`.
    ///
    /// Keys are not unique in hand-maintained files; the position is what
    /// tells apart two records sharing one.
    pub async fn update_at<F>(
        &self,
        index: usize,
        key: &SubscriptionKey,
        mutate: F,
    ) -> Result<Option<Subscription>, StoreError>
    where
        F: FnOnce(&mut Subscription),
    {
        self.modify(
            |records| {
                records
                    .get(index)
                    .filter(|s| s.key() == *key)
                    .map(|_| index)
            },
            mutate,
        )
        .await
    }

    async fn modify<L, F>(&self, locate: L, mutate: F) -> Result<Option<Subscription>, StoreError>
    where
        L: FnOnce(&[Subscription]) -> Option<usize>,
        F: FnOnce(&mut Subscription),
    {
        let _guard = self.writer.lock().await;
        let mut subscriptions = self.load_all().await?;

        let Some(index) = locate(subscriptions.as_slice()) else {
            return Ok(None);
        };
        let record = &mut subscriptions[index];
        mutate(record);
        let updated = record.clone();

        self.write(&subscriptions).await?;
        Ok(Some(updated))
    }

    /// Append a new record, rejecting a duplicate key.
    pub async fn insert(&self, subscription: Subscription) -> Result<(), StoreError> {
        let _guard = self.writer.lock().await;
        let mut subscriptions = self.load_all().await?;

        let key = subscription.key();
        if subscriptions.iter().any(|s| s.key() == key) {
            return Err(StoreError::Duplicate(key.to_string()));
        }
        subscriptions.push(subscription);

        self.write(&subscriptions).await
    }

    /// Caller must hold the writer lock.
    async fn write(&self, subscriptions: &[Subscription]) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        let body = serde_json::to_vec_pretty(subscriptions).map_err(StoreError::Encode)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &body).await.map_err(io_err)?;
        if let Err(source) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(source));
        }

        tracing::debug!(
            path = %self.path.display(),
            count = subscriptions.len(),
            "Subscription file written"
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "subscriptions.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
