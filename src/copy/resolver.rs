//! Reference resolution: turns a [`CopyInput`] into a [`CopyRequest`].
//!
//! Only the `Names` and `SourceContainer` shapes touch the service, with a
//! single source lookup.  Names are validated before that lookup, so an
//! invalid name never costs a round-trip.

use tracing::debug;

use super::input::CopyInput;
use super::orchestrator::CopyChannels;
use crate::channel::backend::StorageChannel;
use crate::errors::CopyError;
use crate::model::{
    BlobReference, ContainerReference, CopyDestination, CopyEndpoint, CopyRequest,
};
use crate::naming::{validate_blob_name, validate_container_name};

/// Resolve `input` against the source and destination channels.
pub async fn resolve(channels: &CopyChannels, input: CopyInput) -> Result<CopyRequest, CopyError> {
    let request = match input {
        CopyInput::Names {
            src_container,
            src_blob,
            dest_container,
            dest_blob,
        } => {
            let dest_blob = default_dest_name(dest_blob, &src_blob);
            validate_tuple(&src_container, &src_blob, &dest_container, &dest_blob)?;

            let container = channels.source.resolve_container(&src_container);
            let source = lookup_source(channels.source.as_ref(), &container, &src_blob).await?;
            CopyRequest {
                source: CopyEndpoint::Blob(source),
                destination: destination(channels, &dest_container, dest_blob),
            }
        }

        CopyInput::Uri {
            src_uri,
            dest_container,
            dest_blob,
        } => {
            let request = CopyRequest {
                source: CopyEndpoint::Uri(src_uri),
                destination: destination(channels, &dest_container, dest_blob),
            };
            validate_request(&request)?;
            request
        }

        CopyInput::SourceBlob {
            source,
            dest_container,
            dest_blob,
        } => {
            let dest_blob = default_dest_name(dest_blob, &source.name);
            let request = CopyRequest {
                source: CopyEndpoint::Blob(source),
                destination: destination(channels, &dest_container, dest_blob),
            };
            validate_request(&request)?;
            request
        }

        CopyInput::SourceContainer {
            container,
            src_blob,
            dest_container,
            dest_blob,
        } => {
            let source_account = channels.source.account();
            if container.account != *source_account {
                return Err(CopyError::configuration(format!(
                    "Container '{}' belongs to account '{}', not to the source context's account '{}'",
                    container.name, container.account.name, source_account.name
                )));
            }
            let dest_blob = default_dest_name(dest_blob, &src_blob);
            validate_tuple(&container.name, &src_blob, &dest_container, &dest_blob)?;

            let source = lookup_source(channels.source.as_ref(), &container, &src_blob).await?;
            CopyRequest {
                source: CopyEndpoint::Blob(source),
                destination: destination(channels, &dest_container, dest_blob),
            }
        }

        CopyInput::BlobPair {
            source,
            destination,
        } => {
            let dest_account = channels.destination.account();
            if destination.container.account != *dest_account {
                return Err(CopyError::configuration(format!(
                    "Destination blob '{}' belongs to account '{}', not to the destination context's account '{}'",
                    destination.uri(),
                    destination.container.account.name,
                    dest_account.name
                )));
            }
            let request = CopyRequest {
                source: CopyEndpoint::Blob(source),
                destination: CopyDestination {
                    container: destination.container,
                    blob_name: destination.name,
                },
            };
            validate_request(&request)?;
            request
        }
    };

    debug!(
        source = %request.source.uri(),
        destination = %request.destination.blob().uri(),
        "Copy request resolved"
    );
    Ok(request)
}

/// Validate every name in a resolved request.
pub fn validate_request(request: &CopyRequest) -> Result<(), CopyError> {
    if let CopyEndpoint::Blob(source) = &request.source {
        validate_blob_name(&source.name)?;
        validate_container_name(&source.container.name)?;
    }
    validate_container_name(&request.destination.container.name)?;
    validate_blob_name(&request.destination.blob_name)
}

fn validate_tuple(
    src_container: &str,
    src_blob: &str,
    dest_container: &str,
    dest_blob: &str,
) -> Result<(), CopyError> {
    validate_blob_name(src_blob)?;
    validate_container_name(src_container)?;
    validate_container_name(dest_container)?;
    validate_blob_name(dest_blob)
}

fn default_dest_name(dest_blob: Option<String>, src_blob: &str) -> String {
    match dest_blob {
        Some(name) if !name.is_empty() => name,
        _ => src_blob.to_string(),
    }
}

fn destination(channels: &CopyChannels, container: &str, blob_name: String) -> CopyDestination {
    CopyDestination {
        container: channels.destination.resolve_container(container),
        blob_name,
    }
}

async fn lookup_source(
    channel: &dyn StorageChannel,
    container: &ContainerReference,
    name: &str,
) -> Result<BlobReference, CopyError> {
    channel
        .resolve_blob(container, name)
        .await?
        .ok_or_else(|| CopyError::ResourceNotFound {
            container: container.name.clone(),
            blob: name.to_string(),
        })
}
