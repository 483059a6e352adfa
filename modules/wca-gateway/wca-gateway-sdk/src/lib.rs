//! WCA gateway SDK
//!
//! Public contract of the WCA gateway module:
//! - [`WcaGatewayClient`]: the async API used by query dispatchers
//! - [`ResourceIdentity`], [`ResourceKind`], [`ResourceClass`]: what to fetch
//! - [`ShapingPolicy`], [`RoundSelector`], [`DetailLevel`]: how to reduce it
//! - [`ShapedResult`]: the reduced document and what was omitted
//! - [`GatewayError`]: the error taxonomy

#![forbid(unsafe_code)]

pub mod api;
pub mod error;
pub mod identity;
pub mod models;

pub use api::WcaGatewayClient;
pub use error::GatewayError;
pub use identity::{
    FILTER_COMPETITION, FILTER_REGION, ResourceClass, ResourceIdentity, ResourceKind,
};
pub use models::{DetailLevel, RoundSelector, ShapedResult, ShapingPolicy};
