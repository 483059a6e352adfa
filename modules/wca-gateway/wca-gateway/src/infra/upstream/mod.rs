//! Upstream fetch client: hyper over rustls, with a retry state machine.

mod client;
pub mod retry;

pub use client::HttpFetcher;
