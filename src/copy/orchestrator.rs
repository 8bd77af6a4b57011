//! The copy-blob operation.
//!
//! Resolve, validate, initiate, then resolve the result.  Each step runs at
//! most once and nothing is retried.

use std::sync::Arc;

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::initiator::CopyInitiator;
use super::input::CopyInput;
use super::outcome::{self, CopyOutcome};
use super::resolver;
use crate::channel::backend::{ChannelFactory, StorageChannel};
use crate::errors::CopyError;
use crate::metrics::COPY_REQUESTS_TOTAL;
use crate::transfer::engine::TransferEngine;

/// Source and destination channels for one invocation.
///
/// Opened once, up front.  Without a destination context both ends share
/// the source channel.
#[derive(Clone)]
pub struct CopyChannels {
    pub source: Arc<dyn StorageChannel>,
    pub destination: Arc<dyn StorageChannel>,
    pub source_context: String,
    pub destination_context: String,
}

impl CopyChannels {
    pub fn open(
        factory: &dyn ChannelFactory,
        source_context: &str,
        destination_context: Option<&str>,
    ) -> Result<Self, CopyError> {
        let source = factory.open(source_context)?;
        let (destination, destination_context) = match destination_context {
            Some(context) => (factory.open(context)?, context.to_string()),
            None => (Arc::clone(&source), source_context.to_string()),
        };
        debug!(
            source_context,
            source_account = %source.account().name,
            destination_context = %destination_context,
            destination_account = %destination.account().name,
            "Copy channels opened"
        );
        Ok(Self {
            source,
            destination,
            source_context: source_context.to_string(),
            destination_context,
        })
    }
}

/// Per-invocation options.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOptions {
    /// Accepted for command-line compatibility.  Has no effect.
    pub force: bool,
}

pub struct CopyOrchestrator {
    channels: CopyChannels,
    initiator: CopyInitiator,
}

impl CopyOrchestrator {
    pub fn new(channels: CopyChannels, engine: Arc<dyn TransferEngine>) -> Self {
        Self {
            channels,
            initiator: CopyInitiator::new(engine),
        }
    }

    pub fn channels(&self) -> &CopyChannels {
        &self.channels
    }

    /// Copy one blob server-side and report what the destination looks like
    /// right after the service accepted the copy.
    pub async fn copy_blob(
        &self,
        input: CopyInput,
        options: CopyOptions,
        cancel: &CancellationToken,
    ) -> Result<CopyOutcome, CopyError> {
        let shape = input.shape();
        if options.force {
            debug!("force has no effect on copy-blob");
        }
        info!(
            shape = %shape,
            source_context = %self.channels.source_context,
            destination_context = %self.channels.destination_context,
            "Starting blob copy"
        );

        let result = self.run(input, cancel).await;
        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(e) => e.code(),
        };
        counter!(COPY_REQUESTS_TOTAL, "shape" => shape.as_str(), "outcome" => label).increment(1);
        result
    }

    async fn run(
        &self,
        input: CopyInput,
        cancel: &CancellationToken,
    ) -> Result<CopyOutcome, CopyError> {
        let request = resolver::resolve(&self.channels, input).await?;
        let ticket = self.initiator.initiate(&request, cancel).await?;
        outcome::resolve_outcome(
            self.channels.destination.as_ref(),
            &self.channels.destination_context,
            &ticket,
        )
        .await
    }
}
