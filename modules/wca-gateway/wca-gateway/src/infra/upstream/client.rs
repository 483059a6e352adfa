//! HTTP fetcher for the upstream static JSON API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCEPT, HeaderValue, USER_AGENT};
use http::{Request, StatusCode, Uri};
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};

use crate::config::{GatewayConfig, RetryConfig};
use crate::domain::error::{DomainError, InitError};
use crate::domain::ports::{RawDocument, UpstreamFetcher};
use crate::infra::upstream::retry::{AttemptOutcome, RetryMachine, RetryState};

type HyperClient = Client<HttpsConnector<HttpConnector>, Empty<Bytes>>;

/// Failure of a single attempt, before retry classification.
#[derive(Debug)]
enum AttemptError {
    Status(StatusCode),
    Transport(String),
    Timeout(Duration),
    BodyTooLarge { limit: usize },
    InvalidJson(String),
}

impl AttemptError {
    fn outcome(&self) -> AttemptOutcome {
        match self {
            Self::Status(status)
                if *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() =>
            {
                AttemptOutcome::Retryable
            }
            Self::Transport(_) | Self::Timeout(_) => AttemptOutcome::Retryable,
            Self::Status(_) | Self::BodyTooLarge { .. } | Self::InvalidJson(_) => {
                AttemptOutcome::Terminal
            }
        }
    }

    fn into_domain(self, path: &str, attempts: u32) -> DomainError {
        let path = path.to_owned();
        match self {
            Self::Status(StatusCode::NOT_FOUND) => DomainError::NotFound { path },
            Self::Status(status)
                if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS =>
            {
                DomainError::Rejected {
                    path,
                    status: status.as_u16(),
                }
            }
            Self::Status(status) => DomainError::Unavailable {
                path,
                attempts,
                reason: format!("HTTP {status}"),
            },
            Self::Transport(reason) => DomainError::Unavailable {
                path,
                attempts,
                reason,
            },
            Self::Timeout(timeout) => DomainError::Unavailable {
                path,
                attempts,
                reason: format!("timed out after {timeout:?}"),
            },
            Self::BodyTooLarge { limit } => {
                DomainError::malformed(format!("'{path}' body exceeds {limit} bytes"))
            }
            Self::InvalidJson(reason) => {
                DomainError::malformed(format!("'{path}' is not valid JSON: {reason}"))
            }
        }
    }
}

/// [`UpstreamFetcher`] over a pooled hyper client with rustls.
pub struct HttpFetcher {
    client: HyperClient,
    base_url: String,
    user_agent: HeaderValue,
    max_body_bytes: usize,
    retry: RetryConfig,
}

impl HttpFetcher {
    /// Build a fetcher for `config.base_url`.
    ///
    /// # Errors
    /// Returns [`InitError`] when TLS cannot be set up or the user agent is not a valid header.
    pub fn new(config: &GatewayConfig) -> Result<Self, InitError> {
        let provider = get_crypto_provider();
        let builder = hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(provider)?;
        let connector = if config.allow_insecure_http {
            builder.https_or_http().enable_all_versions().build()
        } else {
            builder.https_only().enable_all_versions().build()
        };

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .build(connector);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            user_agent: HeaderValue::from_str(&config.user_agent)?,
            max_body_bytes: config.max_body_bytes,
            retry: config.retry.clone(),
        })
    }

    fn uri_for(&self, path: &str) -> Result<Uri, DomainError> {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
            .parse()
            .map_err(|e: http::uri::InvalidUri| DomainError::InvalidRequest {
                path: path.to_owned(),
                reason: e.to_string(),
            })
    }

    async fn attempt(&self, uri: &Uri) -> Result<RawDocument, AttemptError> {
        let request = Request::get(uri.clone())
            .header(USER_AGENT, self.user_agent.clone())
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .body(Empty::<Bytes>::new())
            .map_err(|e| AttemptError::Transport(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Status(status));
        }

        let body = read_body_limited(response.into_body(), self.max_body_bytes).await?;
        let value = serde_json::from_slice(&body)
            .map_err(|e| AttemptError::InvalidJson(e.to_string()))?;
        Ok(RawDocument::new(value, body.len()))
    }
}

#[async_trait]
impl UpstreamFetcher for HttpFetcher {
    #[tracing::instrument(skip(self), fields(attempts = tracing::field::Empty))]
    async fn fetch(&self, path: &str, timeout: Duration) -> Result<RawDocument, DomainError> {
        let uri = self.uri_for(path)?;
        let mut machine = RetryMachine::new(&self.retry);

        while let Some(attempt) = machine.begin() {
            tracing::debug!(attempt, %uri, "fetching upstream document");
            let result = tokio::time::timeout(timeout, self.attempt(&uri))
                .await
                .unwrap_or(Err(AttemptError::Timeout(timeout)));

            let error = match result {
                Ok(document) => {
                    machine.record(AttemptOutcome::Success, &mut rand::rng());
                    tracing::Span::current().record("attempts", attempt);
                    tracing::debug!(attempt, bytes = document.size_bytes, "upstream document fetched");
                    return Ok(document);
                }
                Err(error) => error,
            };

            let state = machine.record(error.outcome(), &mut rand::rng());
            match state {
                RetryState::RetryScheduled { delay, .. } => {
                    tracing::warn!(attempt, ?error, ?delay, "upstream attempt failed; retrying");
                    tokio::time::sleep(delay).await;
                }
                _ => {
                    tracing::Span::current().record("attempts", attempt);
                    return Err(error.into_domain(path, attempt));
                }
            }
        }

        Err(DomainError::Unavailable {
            path: path.to_owned(),
            attempts: 0,
            reason: "retry budget exhausted".to_owned(),
        })
    }
}

async fn read_body_limited(body: Incoming, limit: usize) -> Result<Bytes, AttemptError> {
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| AttemptError::Transport(e.to_string()))?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(AttemptError::BodyTooLarge { limit });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}

/// Use the process-wide rustls provider when one is installed, else aws-lc-rs.
fn get_crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}
