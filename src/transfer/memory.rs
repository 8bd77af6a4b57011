//! Copy starter for the in-memory store.
//!
//! Copies complete synchronously: the destination is written with the
//! source bytes and a `success` copy state in the same call.  The store's
//! visibility lag still applies, so lookups right after the copy can miss
//! the destination.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use tracing::debug;
use url::Url;

use super::engine::{CopyAcceptance, CopyStarter, TransferError};
use crate::channel::memory::{MemoryStore, StoredBlob};
use crate::model::{BlobReference, CopyEndpoint, CopyRequest, CopyState, CopyStatus};

/// [`CopyStarter`] that copies between accounts of one [`MemoryStore`].
pub struct MemoryCopyStarter {
    store: Arc<MemoryStore>,
}

impl MemoryCopyStarter {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    async fn copy(&self, request: &CopyRequest) -> Result<CopyAcceptance, TransferError> {
        self.store.record_request();

        let source = match &request.source {
            CopyEndpoint::Blob(blob) => blob.clone(),
            CopyEndpoint::Uri(uri) => source_from_uri(uri)?,
        };
        let source_uri = request.source.uri();
        let not_found = || {
            TransferError::rejected(format!(
                "CannotVerifyCopySource: The specified blob does not exist: {source_uri}"
            ))
        };

        let stored = {
            let account = self
                .store
                .account_data(&source.container.account.name)
                .ok_or_else(not_found)?;
            let containers = account.read().await;
            let found = containers
                .get(&source.container.name)
                .and_then(|blobs| blobs.get(&source.name))
                .filter(|blob| blob.is_visible())
                .cloned();
            found.ok_or_else(not_found)?
        };

        let destination = &request.destination;
        let dest_account = self
            .store
            .account_data(&destination.container.account.name)
            .ok_or_else(|| {
                TransferError::rejected(format!(
                    "AccountNotFound: {}",
                    destination.container.account.name
                ))
            })?;
        let mut containers = dest_account.write().await;
        let blobs = containers.get_mut(&destination.container.name).ok_or_else(|| {
            TransferError::rejected(format!(
                "ContainerNotFound: The specified container does not exist: {}",
                destination.container.name
            ))
        })?;

        let copy_id = uuid::Uuid::new_v4().to_string();
        let size = stored.properties.size;
        let mut properties = stored.properties.clone();
        properties.etag = MemoryStore::new_etag();
        properties.last_modified = Some(httpdate::fmt_http_date(SystemTime::now()));
        properties.copy = Some(CopyState {
            id: Some(copy_id.clone()),
            status: CopyStatus::Success,
            progress: Some(format!("{size}/{size}")),
            source: Some(source_uri.clone()),
            status_description: None,
        });

        blobs.insert(
            destination.blob_name.clone(),
            StoredBlob {
                data: stored.data,
                properties,
                visible_at: Instant::now() + self.store.visibility_lag(),
            },
        );
        debug!(
            copy_id = %copy_id,
            source = %source_uri,
            destination = %destination.blob().uri(),
            "Memory copy completed"
        );

        Ok(CopyAcceptance {
            copy_id: Some(copy_id),
            status: CopyStatus::Success,
        })
    }
}

fn source_from_uri(uri: &Url) -> Result<BlobReference, TransferError> {
    if uri.scheme() != "memory" {
        return Err(TransferError::rejected(format!(
            "CannotVerifyCopySource: {uri} is not reachable from the memory store"
        )));
    }
    BlobReference::from_uri(uri)
        .map_err(|e| TransferError::rejected(format!("CannotVerifyCopySource: {e}")))
}

impl CopyStarter for MemoryCopyStarter {
    fn start_copy(
        &self,
        request: &CopyRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CopyAcceptance, TransferError>> + Send + '_>> {
        let request = request.clone();
        Box::pin(async move { self.copy(&request).await })
    }
}
