//! blobcopy library: server-side blob copy orchestration.
//!
//! This crate resolves the several ways a caller can name a copy's source
//! and destination into validated blob references, submits the copy to a
//! transfer engine, and reports the destination's state once the service
//! has accepted the copy.  Storage channels exist for Azure Blob Storage
//! and for an in-process memory store.

pub mod auth;
pub mod channel;
pub mod config;
pub mod copy;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod naming;
pub mod transfer;
pub mod xml;
