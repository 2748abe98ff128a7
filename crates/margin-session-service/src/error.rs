// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Request failures (answered with an error ack) and connection-level
//! failures (the connection is dropped).

use margin_app_core::StoreError;
use margin_session_proto::{wire::WireError, AckPayload, ConnId};
use thiserror::Error;
use tracing::error;

/// Failure answered with an error ack; nothing was mutated or broadcast.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    /// Caller may not perform this request.
    #[error("{0}")]
    AuthorizationDenied(String),
    /// Missing or ill-formed input, unknown ids, or no hello yet.
    #[error("{0}")]
    BadInput(String),
    /// Backend failure; details stay in the log.
    #[error("{0}")]
    Internal(String),
}

impl RequestError {
    /// Stable error name carried on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthorizationDenied(_) => "AuthorizationDenied",
            Self::BadInput(_) => "BadInput",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Error ack for this failure.
    pub fn to_ack(&self) -> AckPayload {
        let message = match self {
            Self::AuthorizationDenied(m) | Self::BadInput(m) => m.as_str(),
            Self::Internal(_) => "internal error",
        };
        AckPayload::error(self.name(), message)
    }

    /// Map a store failure, logging backend errors.
    pub fn from_store(pad: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotAuthor { .. } => Self::AuthorizationDenied(err.to_string()),
            StoreError::NotFound { .. } => Self::BadInput(err.to_string()),
            StoreError::Backend(ref detail) => {
                error!(pad, detail = %detail, "comment store failure");
                Self::Internal(err.to_string())
            }
        }
    }
}

/// Failure that terminates the connection.
#[derive(Debug, Error)]
pub enum HubError {
    /// A creation request the caller is not permitted to make.
    #[error("connection {conn} may not comment on pad {pad:?}")]
    CommentDenied {
        /// Offending connection.
        conn: ConnId,
        /// Canonical pad id.
        pad: String,
    },
    /// Outbound packet could not be encoded.
    #[error(transparent)]
    Wire(#[from] WireError),
}
