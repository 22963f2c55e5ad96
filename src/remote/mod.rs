//! Jira / Zephyr Squad REST access.
//!
//! [`client::RemoteClient`] is the authenticated request primitive;
//! [`gateway::Gateway`] turns domain operations into REST calls.

pub mod client;
pub mod gateway;

use thiserror::Error;

pub use self::client::{JsonResponse, RemoteClient};
pub use self::gateway::Gateway;

/// Why a remote step could not be completed.
///
/// The uploader only cares *that* a step failed; the variants exist so the
/// failure can be logged with the operation and status involved.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{operation}: request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation}: remote returned status {status}")]
    Status { operation: &'static str, status: u16 },

    #[error("{operation}: unexpected response: {reason}")]
    Decode {
        operation: &'static str,
        reason: String,
    },

    #[error("{operation}: {what} not found")]
    NotFound {
        operation: &'static str,
        what: String,
    },

    #[error("{operation}: no {kind} labelled {name:?}")]
    ConfigurationMissing {
        operation: &'static str,
        kind: &'static str,
        name: String,
    },
}

impl GatewayError {
    pub fn operation(&self) -> &'static str {
        match self {
            GatewayError::Transport { operation, .. }
            | GatewayError::Status { operation, .. }
            | GatewayError::Decode { operation, .. }
            | GatewayError::NotFound { operation, .. }
            | GatewayError::ConfigurationMissing { operation, .. } => operation,
        }
    }

    /// HTTP status of the failed call, when there was a response at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Status { status, .. } => Some(*status),
            GatewayError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
