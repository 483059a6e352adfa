//! WCA Gateway Core
//!
//! Sits between a query dispatch layer and the static WCA REST API. It provides:
//!
//! - a fetch client with per-attempt timeouts, retry with exponential backoff and jitter
//! - a shaped-result cache with per-class TTL and LRU eviction
//! - single-flight coalescing of identical concurrent requests
//! - a deterministic result shaping engine (round selection, truncation, detail level)
//!
//! ## Architecture
//!
//! ```text
//!        dispatch layer
//!              │
//!              ▼ WcaGatewayClient
//! ┌──────────────────────────────┐
//! │  Service                     │
//! │   cache ──► single-flight    │
//! │               │              │
//! │               ▼              │
//! │   fetch client ──► shaping   │
//! └──────────────────────────────┘
//!              │
//!              ▼ HTTPS GET
//!        WCA REST API
//! ```
//!
//! The public contract lives in `wca-gateway-sdk` and is re-exported here.

// === PUBLIC API (from SDK) ===
pub use wca_gateway_sdk::{
    DetailLevel, GatewayError, ResourceClass, ResourceIdentity, ResourceKind, RoundSelector,
    ShapedResult, ShapingPolicy, WcaGatewayClient,
};

// === LOCAL CLIENT ===
pub mod local_client;
pub use local_client::WcaGatewayLocalClient;

// === INTERNAL MODULES ===
pub mod config;
pub mod domain;
pub mod infra;

pub use config::GatewayConfig;
pub use domain::error::{DomainError, InitError};
pub use domain::service::{CacheStats, Service};

#[cfg(test)]
mod config_tests;
