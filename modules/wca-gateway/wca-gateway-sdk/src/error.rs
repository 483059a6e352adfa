//! Error types for the WCA gateway.

use thiserror::Error;

/// Errors surfaced by [`crate::WcaGatewayClient::resolve`].
///
/// Every variant names the offending resource (its canonical identity) so a caller
/// can tell "this competition does not exist" apart from "try again later".
/// The type is `Clone` because a single upstream outcome is handed to every
/// caller that was coalesced onto the same fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The upstream has no document for this resource.
    #[error("resource not found: {resource}")]
    NotFound {
        /// Canonical resource identity.
        resource: String,
    },

    /// The request itself is invalid (caller input or an upstream 4xx other than 404/429).
    #[error("bad request for {resource}: {reason}")]
    BadRequest {
        /// Canonical resource identity, or the raw input when no identity could be built.
        resource: String,
        /// Human readable reason.
        reason: String,
    },

    /// The upstream could not be reached after exhausting retries. Safe to retry later.
    #[error("upstream unavailable for {resource}: {reason}")]
    UpstreamUnavailable {
        /// Canonical resource identity.
        resource: String,
        /// Last failure observed.
        reason: String,
    },

    /// The upstream document does not match the schema of its resource class.
    #[error("malformed upstream data for {resource}: {reason}")]
    MalformedUpstreamData {
        /// Canonical resource identity.
        resource: String,
        /// Which field or shape was unexpected.
        reason: String,
    },

    /// The shaping policy asked for a round that the document does not contain.
    #[error("round '{round}' not found in {resource} (policy {policy})")]
    RoundNotFound {
        /// Canonical resource identity.
        resource: String,
        /// Requested round.
        round: String,
        /// Canonical form of the shaping policy.
        policy: String,
    },
}

impl GatewayError {
    /// Create a bad-request error.
    #[must_use]
    pub fn bad_request(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadRequest {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Canonical identity of the resource the error is about.
    #[must_use]
    pub fn resource(&self) -> &str {
        match self {
            Self::NotFound { resource }
            | Self::BadRequest { resource, .. }
            | Self::UpstreamUnavailable { resource, .. }
            | Self::MalformedUpstreamData { resource, .. }
            | Self::RoundNotFound { resource, .. } => resource,
        }
    }

    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable { .. })
    }
}
