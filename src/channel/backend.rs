//! Abstract storage channel trait.
//!
//! A [`StorageChannel`] is bound to exactly one account.  The copy core
//! may hold two of them at once (source and destination) when the two
//! ends of a copy live under different credentials.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::errors::CopyError;
use crate::model::{AccountRef, BlobProperties, BlobReference, ContainerReference};

/// Name and metadata lookups against one account.
pub trait StorageChannel: Send + Sync + 'static {
    /// The account this channel is bound to.
    fn account(&self) -> &AccountRef;

    /// Reference a container by name.  Performs no I/O.
    fn resolve_container(&self, name: &str) -> ContainerReference {
        ContainerReference::new(self.account().clone(), name)
    }

    /// Look a blob up on the service.  `Ok(None)` when it does not exist
    /// (or is not yet visible).
    fn resolve_blob(
        &self,
        container: &ContainerReference,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<BlobReference>>> + Send + '_>>;

    /// Fetch the current properties of a blob.  Fails if it does not exist.
    fn fetch_properties(
        &self,
        blob: &BlobReference,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<BlobProperties>> + Send + '_>>;
}

/// Opens channels for named storage contexts.
pub trait ChannelFactory: Send + Sync {
    /// Open the channel for `context`.  Unknown contexts and unusable
    /// credentials fail with [`CopyError::Channel`].
    fn open(&self, context: &str) -> Result<Arc<dyn StorageChannel>, CopyError>;
}
