use thiserror::Error;
use wca_gateway_sdk::{GatewayError, ResourceIdentity, ShapingPolicy};

use crate::config::ConfigError;

/// Internal error of the gateway. Carries upstream detail (path, status, attempts)
/// that is folded into a [`GatewayError`] at the API boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("upstream has no document at '{path}'")]
    NotFound { path: String },

    #[error("upstream rejected '{path}' with HTTP {status}")]
    Rejected { path: String, status: u16 },

    #[error("cannot request '{path}': {reason}")]
    InvalidRequest { path: String, reason: String },

    #[error("upstream unavailable for '{path}' after {attempts} attempt(s): {reason}")]
    Unavailable {
        path: String,
        attempts: u32,
        reason: String,
    },

    #[error("malformed upstream data: {reason}")]
    Malformed { reason: String },

    #[error("round '{round}' not found")]
    RoundNotFound { round: String },

    #[error("class mismatch: {reason}")]
    ClassMismatch { reason: String },

    #[error("background fetch failed: {0}")]
    Task(String),
}

impl DomainError {
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    /// Outcomes that may be remembered by the negative cache.
    #[must_use]
    pub fn is_negative_cacheable(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Unavailable { .. })
    }

    /// Convert into the public error, naming the offending identity and policy.
    #[must_use]
    pub fn into_gateway_error(
        self,
        identity: &ResourceIdentity,
        policy: &ShapingPolicy,
    ) -> GatewayError {
        let resource = identity.canonical().to_owned();
        match self {
            Self::NotFound { .. } => GatewayError::NotFound { resource },
            Self::Rejected { status, .. } => GatewayError::BadRequest {
                resource,
                reason: format!("upstream rejected the request with HTTP {status}"),
            },
            Self::InvalidRequest { reason, .. } | Self::ClassMismatch { reason } => {
                GatewayError::BadRequest { resource, reason }
            }
            e @ (Self::Unavailable { .. } | Self::Task(_)) => GatewayError::UpstreamUnavailable {
                resource,
                reason: e.to_string(),
            },
            Self::Malformed { reason } => GatewayError::MalformedUpstreamData { resource, reason },
            Self::RoundNotFound { round } => GatewayError::RoundNotFound {
                resource,
                round,
                policy: policy.canonical(),
            },
        }
    }
}

impl From<tokio::task::JoinError> for DomainError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}

/// Failure to construct a gateway.
#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] rustls::Error),

    #[error("invalid user agent: {0}")]
    UserAgent(#[from] http::header::InvalidHeaderValue),
}
