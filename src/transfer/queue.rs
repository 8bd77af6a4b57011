//! Bounded in-process transfer queue.
//!
//! Submissions go onto a bounded `mpsc` queue drained by a single
//! dispatcher task.  Each job runs on its own task once a semaphore
//! permit is free, so at most `transfer.concurrency` start-copy calls are
//! in flight.  Results travel back to the submitter over a `oneshot`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::engine::{
    CompletionCallback, CopyAcceptance, CopyStarter, CopyTicket, TransferEngine, TransferError,
};
use crate::config::TransferConfig;
use crate::metrics::{TRANSFER_JOBS_TOTAL, TRANSFER_QUEUE_DEPTH};
use crate::model::CopyRequest;

/// A queued copy waiting for a worker.
struct Job {
    request: CopyRequest,
    on_complete: Option<CompletionCallback>,
    reply: oneshot::Sender<Result<CopyAcceptance, TransferError>>,
}

impl Job {
    /// Deliver the result to the callback and then the submitter.
    fn finish(self, result: Result<CopyAcceptance, TransferError>) {
        if let Some(callback) = self.on_complete {
            callback(&self.request, &result);
        }
        // The submitter may have stopped waiting (cancelled or timed out).
        let _ = self.reply.send(result);
    }
}

/// [`TransferEngine`] backed by a bounded queue and a worker pool.
pub struct QueuedTransferEngine {
    sender: mpsc::Sender<Job>,
    accept_timeout: Duration,
    shutdown: CancellationToken,
}

impl QueuedTransferEngine {
    /// Spawn the dispatcher.  Must be called inside a Tokio runtime.
    pub fn start(starter: Arc<dyn CopyStarter>, config: &TransferConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_depth.max(1));
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
        let shutdown = CancellationToken::new();

        info!(
            concurrency = config.concurrency,
            queue_depth = config.queue_depth,
            "Transfer engine started"
        );
        tokio::spawn(run_dispatcher(
            starter,
            receiver,
            semaphore,
            shutdown.clone(),
        ));

        Self {
            sender,
            accept_timeout: Duration::from_secs(config.accept_timeout_seconds),
            shutdown,
        }
    }

    /// Stop dispatching.  Jobs still queued fail with [`TransferError::Closed`];
    /// jobs already running finish.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for QueuedTransferEngine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_dispatcher(
    starter: Arc<dyn CopyStarter>,
    mut receiver: mpsc::Receiver<Job>,
    semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = receiver.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        gauge!(TRANSFER_QUEUE_DEPTH).decrement(1.0);

        let permit = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                job.finish(Err(TransferError::Closed));
                break;
            }
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    job.finish(Err(TransferError::Closed));
                    break;
                }
            },
        };

        let starter = Arc::clone(&starter);
        tokio::spawn(async move {
            let _permit = permit;
            let result = starter.start_copy(&job.request).await;
            let label = match &result {
                Ok(_) => "accepted",
                Err(e) => {
                    warn!(
                        container = %job.request.destination.container.name,
                        blob = %job.request.destination.blob_name,
                        error = %e,
                        "Start copy refused"
                    );
                    "rejected"
                }
            };
            counter!(TRANSFER_JOBS_TOTAL, "result" => label).increment(1);
            job.finish(result);
        });
    }

    receiver.close();
    let mut drained = 0usize;
    while let Ok(job) = receiver.try_recv() {
        gauge!(TRANSFER_QUEUE_DEPTH).decrement(1.0);
        job.finish(Err(TransferError::Closed));
        drained += 1;
    }
    debug!(drained, "Transfer dispatcher stopped");
}

impl TransferEngine for QueuedTransferEngine {
    fn accept_timeout(&self) -> Duration {
        self.accept_timeout
    }

    fn submit_copy(
        &self,
        request: CopyRequest,
        on_complete: Option<CompletionCallback>,
    ) -> Pin<Box<dyn Future<Output = Result<CopyTicket, TransferError>> + Send + '_>> {
        Box::pin(async move {
            let destination = request.destination.clone();
            let (reply, response) = oneshot::channel();
            let job = Job {
                request,
                on_complete,
                reply,
            };

            gauge!(TRANSFER_QUEUE_DEPTH).increment(1.0);
            if let Err(mpsc::error::SendError(job)) = self.sender.send(job).await {
                gauge!(TRANSFER_QUEUE_DEPTH).decrement(1.0);
                job.finish(Err(TransferError::Closed));
                return Err(TransferError::Closed);
            }

            let acceptance = response.await.map_err(|_| TransferError::Closed)??;
            Ok(CopyTicket {
                destination,
                copy_id: acceptance.copy_id,
                status: acceptance.status,
            })
        })
    }
}
