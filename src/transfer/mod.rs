//! Server-side copy scheduling.
//!
//! [`engine::TransferEngine`] is what the copy core talks to.  The
//! [`queue::QueuedTransferEngine`] implementation drives any
//! [`engine::CopyStarter`]; [`azure`] and [`memory`] provide starters for
//! the two channel kinds.

pub mod azure;
pub mod engine;
pub mod memory;
pub mod queue;
