//! Copy submission.
//!
//! Hands a validated request to the transfer engine and waits until the
//! engine reports acceptance, bounded by the engine's accept timeout and a
//! caller cancellation token.  Dropping the wait does not abort a copy the
//! service already accepted.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::CopyError;
use crate::metrics::ACCEPT_WAIT_SECONDS;
use crate::model::CopyRequest;
use crate::transfer::engine::{CompletionCallback, CopyTicket, TransferEngine, TransferError};

pub struct CopyInitiator {
    engine: Arc<dyn TransferEngine>,
}

impl CopyInitiator {
    pub fn new(engine: Arc<dyn TransferEngine>) -> Self {
        Self { engine }
    }

    /// Submit `request` and wait for acceptance.
    pub async fn initiate(
        &self,
        request: &CopyRequest,
        cancel: &CancellationToken,
    ) -> Result<CopyTicket, CopyError> {
        let container = request.destination.container.name.clone();
        let blob = request.destination.blob_name.clone();
        let accept_timeout = self.engine.accept_timeout();
        let started = Instant::now();

        let submit = self
            .engine
            .submit_copy(request.clone(), Some(log_completion()));

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(container = %container, blob = %blob, "Copy cancelled before acceptance");
                return Err(CopyError::Cancelled { container, blob });
            }
            result = tokio::time::timeout(accept_timeout, submit) => result,
        };
        histogram!(ACCEPT_WAIT_SECONDS).record(started.elapsed().as_secs_f64());

        match result {
            Err(_) => Err(CopyError::AcceptTimeout {
                container,
                blob,
                seconds: accept_timeout.as_secs(),
            }),
            Ok(Err(TransferError::Rejected { reason })) => Err(CopyError::TransferRejected {
                container,
                blob,
                reason,
            }),
            Ok(Err(e @ TransferError::Closed)) => Err(CopyError::TransferRejected {
                container,
                blob,
                reason: e.to_string(),
            }),
            Ok(Ok(ticket)) => {
                info!(
                    container = %container,
                    blob = %blob,
                    copy_id = ticket.copy_id.as_deref().unwrap_or(""),
                    status = %ticket.status,
                    "Copy accepted"
                );
                Ok(ticket)
            }
        }
    }
}

fn log_completion() -> CompletionCallback {
    Box::new(|request, result| match result {
        Ok(acceptance) => debug!(
            source = %request.source.uri(),
            destination = %request.destination.blob().uri(),
            copy_id = acceptance.copy_id.as_deref().unwrap_or(""),
            status = %acceptance.status,
            "Start copy finished"
        ),
        Err(e) => debug!(
            source = %request.source.uri(),
            destination = %request.destination.blob().uri(),
            error = %e,
            "Start copy failed"
        ),
    })
}
