//! Copy orchestration error types.
//!
//! Every variant maps to a stable error code and a process exit code so
//! the CLI can report failures without inspecting messages.  Collaborator
//! I/O failures arrive as `anyhow::Error` and become [`CopyError::Internal`].

use std::fmt;

use thiserror::Error;

/// What kind of name failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Container,
    Blob,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::Container => f.write_str("container"),
            NameKind::Blob => f.write_str("blob"),
        }
    }
}

/// Errors surfaced by a copy invocation.
#[derive(Debug, Error)]
pub enum CopyError {
    /// Zero or several input shapes were satisfied, or a handle does not
    /// belong to the channel it must be used with.
    #[error("{message}")]
    Configuration { message: String },

    /// A container or blob name does not follow the service naming rules.
    #[error("Invalid {kind} name '{name}': {rule}")]
    InvalidName {
        kind: NameKind,
        name: String,
        rule: String,
    },

    /// The source blob does not exist.
    #[error("Can not find blob '{blob}' in container '{container}'")]
    ResourceNotFound { container: String, blob: String },

    /// The transfer engine refused the copy.
    #[error("Copy to blob '{blob}' in container '{container}' was rejected: {reason}")]
    TransferRejected {
        container: String,
        blob: String,
        reason: String,
    },

    /// A storage channel could not be constructed.
    #[error("Can not open storage context '{context}': {reason}")]
    Channel { context: String, reason: String },

    /// The transfer engine did not accept the copy in time.
    #[error("Copy to blob '{blob}' in container '{container}' was not accepted within {seconds}s")]
    AcceptTimeout {
        container: String,
        blob: String,
        seconds: u64,
    },

    /// The caller cancelled while waiting for acceptance.
    #[error("Copy to blob '{blob}' in container '{container}' was cancelled before it was accepted")]
    Cancelled { container: String, blob: String },

    /// Catch-all for channel I/O and other unexpected failures.
    #[error("Storage request failed: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CopyError {
    /// Shorthand for a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        CopyError::Configuration {
            message: message.into(),
        }
    }

    /// Stable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            CopyError::Configuration { .. } => "ConfigurationError",
            CopyError::InvalidName { .. } => "InvalidName",
            CopyError::ResourceNotFound { .. } => "ResourceNotFound",
            CopyError::TransferRejected { .. } => "TransferRejected",
            CopyError::Channel { .. } => "ChannelError",
            CopyError::AcceptTimeout { .. } => "AcceptTimeout",
            CopyError::Cancelled { .. } => "Cancelled",
            CopyError::Internal(_) => "InternalError",
        }
    }

    /// Process exit status for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            CopyError::Configuration { .. } | CopyError::InvalidName { .. } => 2,
            CopyError::ResourceNotFound { .. } => 3,
            CopyError::TransferRejected { .. } | CopyError::AcceptTimeout { .. } => 4,
            CopyError::Channel { .. } => 5,
            CopyError::Cancelled { .. } => 130,
            CopyError::Internal(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_container_and_blob() {
        let err = CopyError::ResourceNotFound {
            container: "src".to_string(),
            blob: "a.txt".to_string(),
        };
        assert_eq!(err.to_string(), "Can not find blob 'a.txt' in container 'src'");
        assert_eq!(err.code(), "ResourceNotFound");
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_invalid_name_message() {
        let err = CopyError::InvalidName {
            kind: NameKind::Container,
            name: "ab".to_string(),
            rule: "must be 3-63 characters long".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid container name 'ab': must be 3-63 characters long"
        );
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_internal_from_anyhow() {
        let err: CopyError = anyhow::anyhow!("connection reset").into();
        assert_eq!(err.code(), "InternalError");
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            CopyError::configuration("x"),
            CopyError::Channel {
                context: "c".into(),
                reason: "r".into(),
            },
            CopyError::Cancelled {
                container: "c".into(),
                blob: "b".into(),
            },
            CopyError::AcceptTimeout {
                container: "c".into(),
                blob: "b".into(),
                seconds: 1,
            },
        ];
        let codes: std::collections::HashSet<_> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), errors.len());
    }
}
