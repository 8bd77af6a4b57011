//! Copy orchestration.
//!
//! [`input`] decides which of the five input shapes a request uses,
//! [`resolver`] turns it into a validated request, [`initiator`] submits
//! it to the transfer engine and [`outcome`] probes the destination.
//! [`orchestrator`] runs the steps in order.

pub mod initiator;
pub mod input;
pub mod orchestrator;
pub mod outcome;
pub mod resolver;

pub use input::{CopyArgs, CopyInput, CopyShape};
pub use orchestrator::{CopyChannels, CopyOptions, CopyOrchestrator};
pub use outcome::{CopyOutcome, DestinationBlob, PendingCopy};
