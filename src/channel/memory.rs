//! In-memory storage accounts.
//!
//! A [`MemoryStore`] holds any number of accounts, each a map of
//! containers to blobs behind its own `tokio::sync::RwLock`.  Channels
//! opened on the store see the account named by the context.
//!
//! Two knobs exist for tests:
//! - a visibility lag, so blobs written by a copy only become visible to
//!   lookups after a delay (emulating eventually consistent listings)
//! - a request counter incremented by every channel lookup and every copy

use bytes::Bytes;
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

use super::backend::{ChannelFactory, StorageChannel};
use crate::errors::CopyError;
use crate::model::{AccountRef, BlobProperties, BlobReference, BlobType, ContainerReference};

/// Containers of one account: container -> blob name -> blob.
pub(crate) type AccountData = HashMap<String, HashMap<String, StoredBlob>>;

/// A blob held in memory.
#[derive(Debug, Clone)]
pub(crate) struct StoredBlob {
    pub(crate) data: Bytes,
    pub(crate) properties: BlobProperties,
    /// Lookups before this instant report the blob as absent.
    pub(crate) visible_at: Instant,
}

impl StoredBlob {
    pub(crate) fn is_visible(&self) -> bool {
        Instant::now() >= self.visible_at
    }
}

/// Shared in-memory accounts.
#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<String, Arc<tokio::sync::RwLock<AccountData>>>>,
    /// Visibility lag in milliseconds.
    visibility_lag_ms: AtomicU64,
    requests: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // ── ETag helpers ────────────────────────────────────────────────

    /// A fresh opaque quoted ETag, as the service issues on every write.
    pub(crate) fn new_etag() -> String {
        let bytes: [u8; 8] = rand::random();
        format!("\"0x{}\"", hex::encode_upper(bytes))
    }

    /// Base64 MD5 of the content, as reported in `Content-MD5`.
    pub(crate) fn content_md5(data: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(data);
        BASE64_STANDARD.encode(hasher.finalize())
    }

    // ── Setup ───────────────────────────────────────────────────────

    /// Register an account.  Idempotent.
    pub fn create_account(&self, name: &str) {
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        accounts
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::RwLock::new(HashMap::new())));
    }

    /// Create a container in an existing account.  Idempotent.
    pub async fn create_container(&self, account: &str, container: &str) -> anyhow::Result<()> {
        let data = self
            .account_data(account)
            .ok_or_else(|| anyhow::anyhow!("No such account: {account}"))?;
        data.write()
            .await
            .entry(container.to_string())
            .or_default();
        Ok(())
    }

    /// Write a block blob directly, returning its ETag.  Uploads are
    /// visible immediately.
    pub async fn put_blob(
        &self,
        account: &str,
        container: &str,
        name: &str,
        data: Bytes,
    ) -> anyhow::Result<String> {
        let account_data = self
            .account_data(account)
            .ok_or_else(|| anyhow::anyhow!("No such account: {account}"))?;
        let mut containers = account_data.write().await;
        let blobs = containers
            .get_mut(container)
            .ok_or_else(|| anyhow::anyhow!("No such container: {account}/{container}"))?;

        let etag = Self::new_etag();
        let properties = BlobProperties {
            size: data.len() as u64,
            etag: etag.clone(),
            blob_type: BlobType::BlockBlob,
            content_type: Some("application/octet-stream".to_string()),
            content_md5: Some(Self::content_md5(&data)),
            last_modified: Some(httpdate::fmt_http_date(SystemTime::now())),
            copy: None,
        };
        blobs.insert(
            name.to_string(),
            StoredBlob {
                data,
                properties,
                visible_at: Instant::now(),
            },
        );
        Ok(etag)
    }

    /// Delay before blobs written by a copy become visible to lookups.
    pub fn set_visibility_lag(&self, lag: Duration) {
        self.visibility_lag_ms
            .store(lag.as_millis() as u64, Ordering::Relaxed);
    }

    pub(crate) fn visibility_lag(&self) -> Duration {
        Duration::from_millis(self.visibility_lag_ms.load(Ordering::Relaxed))
    }

    /// Number of lookups and copies served so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub(crate) fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn account_data(&self, name: &str) -> Option<Arc<tokio::sync::RwLock<AccountData>>> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts.get(name).cloned()
    }

    /// Read a blob's bytes regardless of visibility.
    pub async fn read_blob(&self, account: &str, container: &str, name: &str) -> Option<Bytes> {
        let account_data = self.account_data(account)?;
        let containers = account_data.read().await;
        containers
            .get(container)
            .and_then(|blobs| blobs.get(name))
            .map(|blob| blob.data.clone())
    }
}

impl ChannelFactory for Arc<MemoryStore> {
    fn open(&self, context: &str) -> Result<Arc<dyn StorageChannel>, CopyError> {
        let data = self.account_data(context).ok_or_else(|| CopyError::Channel {
            context: context.to_string(),
            reason: "no such account in memory store".to_string(),
        })?;
        let account = AccountRef::memory(context).map_err(|e| CopyError::Channel {
            context: context.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Arc::new(MemoryChannel {
            store: Arc::clone(self),
            account,
            data,
        }))
    }
}

/// Channel bound to one account of a [`MemoryStore`].
pub struct MemoryChannel {
    store: Arc<MemoryStore>,
    account: AccountRef,
    data: Arc<tokio::sync::RwLock<AccountData>>,
}

impl MemoryChannel {
    async fn lookup(&self, container: &str, name: &str) -> Option<BlobProperties> {
        self.store.record_request();
        let containers = self.data.read().await;
        containers
            .get(container)
            .and_then(|blobs| blobs.get(name))
            .filter(|blob| blob.is_visible())
            .map(|blob| blob.properties.clone())
    }
}

impl StorageChannel for MemoryChannel {
    fn account(&self) -> &AccountRef {
        &self.account
    }

    fn resolve_blob(
        &self,
        container: &ContainerReference,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<BlobReference>>> + Send + '_>> {
        let container = container.clone();
        let name = name.to_string();
        Box::pin(async move {
            if container.account != self.account {
                anyhow::bail!(
                    "Container {} belongs to account {}, not {}",
                    container.name,
                    container.account.name,
                    self.account.name
                );
            }
            let found = self.lookup(&container.name, &name).await;
            Ok(found.map(|properties| container.blob(&name).with_properties(properties)))
        })
    }

    fn fetch_properties(
        &self,
        blob: &BlobReference,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<BlobProperties>> + Send + '_>> {
        let blob = blob.clone();
        Box::pin(async move {
            self.lookup(&blob.container.name, &blob.name)
                .await
                .ok_or_else(|| {
                    anyhow::anyhow!("Blob not found: {}/{}", blob.container.name, blob.name)
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_blob() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store.create_account("acct");
        store.create_container("acct", "src").await.unwrap();
        store
            .put_blob("acct", "src", "a.txt", Bytes::from("hello world"))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_put_and_resolve_blob() {
        let store = store_with_blob().await;
        let channel = store.open("acct").unwrap();
        let container = channel.resolve_container("src");

        let blob = channel
            .resolve_blob(&container, "a.txt")
            .await
            .unwrap()
            .expect("blob should exist");
        let props = blob.properties.as_ref().unwrap();
        assert_eq!(props.size, 11);
        assert!(props.etag.starts_with("\"0x"));
        assert_eq!(props.content_md5.as_deref(), Some("XrY7u+Ae7tCTyyK7j1rNww=="));
        assert_eq!(blob.uri(), "memory://acct/src/a.txt");
    }

    #[tokio::test]
    async fn test_resolve_missing_blob() {
        let store = store_with_blob().await;
        let channel = store.open("acct").unwrap();
        let container = channel.resolve_container("src");
        assert!(channel.resolve_blob(&container, "nope").await.unwrap().is_none());
        let missing_container = channel.resolve_container("other");
        assert!(channel
            .resolve_blob(&missing_container, "a.txt")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_fetch_properties_missing_fails() {
        let store = store_with_blob().await;
        let channel = store.open("acct").unwrap();
        let blob = channel.resolve_container("src").blob("nope");
        assert!(channel.fetch_properties(&blob).await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_rejects_foreign_container() {
        let store = store_with_blob().await;
        store.create_account("other");
        let channel = store.open("acct").unwrap();
        let foreign = store.open("other").unwrap().resolve_container("src");
        assert!(channel.resolve_blob(&foreign, "a.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_request_count() {
        let store = store_with_blob().await;
        let channel = store.open("acct").unwrap();
        assert_eq!(store.request_count(), 0);
        let container = channel.resolve_container("src");
        assert_eq!(store.request_count(), 0);
        channel.resolve_blob(&container, "a.txt").await.unwrap();
        assert_eq!(store.request_count(), 1);
    }

    #[test]
    fn test_open_unknown_account() {
        let store = MemoryStore::new();
        match store.open("ghost") {
            Err(CopyError::Channel { context, .. }) => assert_eq!(context, "ghost"),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("expected channel error"),
        }
    }

    #[test]
    fn test_new_etag_is_fresh() {
        assert_ne!(MemoryStore::new_etag(), MemoryStore::new_etag());
    }

    #[tokio::test]
    async fn test_put_blob_requires_container() {
        let store = MemoryStore::new();
        store.create_account("acct");
        assert!(store
            .put_blob("acct", "missing", "a", Bytes::from("x"))
            .await
            .is_err());
    }
}
