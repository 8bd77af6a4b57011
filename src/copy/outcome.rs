//! Post-submission result resolution.
//!
//! After the engine accepts a copy the destination is probed once.  A
//! visible destination becomes a [`DestinationBlob`] record; an invisible
//! one (not written yet, or not yet visible to listings) becomes a
//! [`PendingCopy`] notice.  Neither case polls.

use std::fmt;

use serde::Serialize;
use tracing::info;

use crate::channel::backend::StorageChannel;
use crate::errors::CopyError;
use crate::model::{BlobReference, BlobType, CopyStatus};
use crate::transfer::engine::CopyTicket;

/// What a copy invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CopyOutcome {
    Copied(DestinationBlob),
    Pending(PendingCopy),
}

impl CopyOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            CopyOutcome::Copied(_) => "copied",
            CopyOutcome::Pending(_) => "pending",
        }
    }
}

/// Destination blob as observed right after the copy was accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DestinationBlob {
    pub container: String,
    pub name: String,
    pub uri: String,
    pub size: u64,
    pub etag: String,
    pub blob_type: BlobType,
    pub content_type: Option<String>,
    pub last_modified: Option<String>,
    pub copy_id: Option<String>,
    pub copy_status: Option<CopyStatus>,
    pub copy_progress: Option<String>,
    /// Storage context the destination was read through.
    pub context: String,
}

impl DestinationBlob {
    fn from_blob(blob: &BlobReference, ticket: &CopyTicket, context: &str) -> Self {
        let properties = blob.properties.clone().unwrap_or_default();
        let copy = properties.copy.as_ref();
        Self {
            container: blob.container.name.clone(),
            name: blob.name.clone(),
            uri: blob.uri(),
            size: properties.size,
            etag: properties.etag.clone(),
            blob_type: properties.blob_type,
            content_type: properties.content_type.clone(),
            last_modified: properties.last_modified.clone(),
            copy_id: copy
                .and_then(|c| c.id.clone())
                .or_else(|| ticket.copy_id.clone()),
            copy_status: copy.map(|c| c.status).or(Some(ticket.status)),
            copy_progress: copy.and_then(|c| c.progress.clone()),
            context: context.to_string(),
        }
    }
}

/// A copy that was accepted but whose destination is not visible yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCopy {
    pub container: String,
    pub blob: String,
    pub copy_id: Option<String>,
}

impl fmt::Display for PendingCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Copy destination blob pending: {} in {}",
            self.blob, self.container
        )
    }
}

/// Probe the destination of an accepted copy through `channel`.
pub async fn resolve_outcome(
    channel: &dyn StorageChannel,
    context: &str,
    ticket: &CopyTicket,
) -> Result<CopyOutcome, CopyError> {
    let destination = &ticket.destination;
    let found = channel
        .resolve_blob(&destination.container, &destination.blob_name)
        .await?;

    match found {
        Some(blob) => {
            let properties = channel.fetch_properties(&blob).await?;
            let blob = blob.with_properties(properties);
            Ok(CopyOutcome::Copied(DestinationBlob::from_blob(
                &blob, ticket, context,
            )))
        }
        None => {
            let pending = PendingCopy {
                container: destination.container.name.clone(),
                blob: destination.blob_name.clone(),
                copy_id: ticket.copy_id.clone(),
            };
            info!("{}", pending);
            Ok(CopyOutcome::Pending(pending))
        }
    }
}
