//! Storage channels.
//!
//! A channel is the authenticated handle the copy core uses to look
//! containers and blobs up in one storage account.  [`azure`] talks to the
//! Blob service over REST; [`memory`] keeps accounts in process for tests
//! and local runs.

pub mod azure;
pub mod backend;
pub mod memory;
