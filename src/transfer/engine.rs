//! Transfer engine traits.
//!
//! The copy core hands a resolved [`CopyRequest`] to a [`TransferEngine`]
//! and waits only until the service has *accepted* the copy.  Completion
//! of the byte transfer happens server-side and is observed later through
//! the destination blob's copy state.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use crate::model::{CopyDestination, CopyRequest, CopyStatus};

/// Why a copy was not accepted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// The service (or the engine) refused the copy.
    #[error("{reason}")]
    Rejected { reason: String },

    /// The engine has shut down and accepts no more work.
    #[error("transfer engine is closed")]
    Closed,
}

impl TransferError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        TransferError::Rejected {
            reason: reason.into(),
        }
    }
}

/// What the service reported when it accepted a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyAcceptance {
    pub copy_id: Option<String>,
    /// `Success` for copies the service finished synchronously.
    pub status: CopyStatus,
}

/// Proof that a copy was accepted.  Does not mean the bytes have landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTicket {
    pub destination: CopyDestination,
    pub copy_id: Option<String>,
    pub status: CopyStatus,
}

/// Invoked exactly once when a submitted copy is accepted or refused.
pub type CompletionCallback =
    Box<dyn FnOnce(&CopyRequest, &Result<CopyAcceptance, TransferError>) + Send>;

/// Schedules server-side copies.
pub trait TransferEngine: Send + Sync {
    /// How long callers should wait for acceptance.
    fn accept_timeout(&self) -> Duration;

    /// Queue a copy and wait for the service to accept it.
    fn submit_copy(
        &self,
        request: CopyRequest,
        on_complete: Option<CompletionCallback>,
    ) -> Pin<Box<dyn Future<Output = Result<CopyTicket, TransferError>> + Send + '_>>;
}

/// Issues the start-copy call for one request.
pub trait CopyStarter: Send + Sync + 'static {
    fn start_copy(
        &self,
        request: &CopyRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CopyAcceptance, TransferError>> + Send + '_>>;
}
