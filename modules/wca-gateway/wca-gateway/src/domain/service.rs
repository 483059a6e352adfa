//! Domain service of the WCA gateway.
//!
//! Orchestrates a resolve: cache lookup, coalesced upstream fetch, shaping and
//! population. Views of one identity under different policies share a single raw
//! fetch; identical concurrent requests share a single population.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::instrument;
use wca_gateway_sdk::{ResourceClass, ResourceIdentity, ShapedResult, ShapingPolicy};

use super::cache::{CacheKey, CacheStore, document_key, view_key};
use super::error::{DomainError, InitError};
use super::ports::{RawDocument, UpstreamFetcher};
use super::shaping::{self, Filters};
use super::single_flight::{FlightRole, SingleFlight};
use crate::config::{GatewayConfig, MAX_TTL};
use crate::infra::upstream::HttpFetcher;

/// Cache diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: u64,
    /// Cache populations currently running.
    pub in_flight: usize,
}

/// Raw-document side of a resolve, shared with population tasks.
struct Upstream {
    fetcher: Arc<dyn UpstreamFetcher>,
    request_timeout: Duration,
    documents: SingleFlight<CacheKey, Arc<RawDocument>, DomainError>,
    /// Remembered failures, when `cache.negative_ttl` is set.
    negative: Option<Cache<CacheKey, DomainError>>,
}

impl Upstream {
    async fn document(&self, identity: &ResourceIdentity) -> Result<Arc<RawDocument>, DomainError> {
        let key = document_key(identity);
        if let Some(negative) = &self.negative
            && let Some(error) = negative.get(&key).await
        {
            tracing::debug!(identity = %identity, %error, "answered from negative cache");
            return Err(error);
        }

        let fetcher = Arc::clone(&self.fetcher);
        let path = identity.upstream_path();
        let timeout = self.request_timeout;
        let (result, role) = self
            .documents
            .run(key, move || async move {
                fetcher.fetch(&path, timeout).await.map(Arc::new)
            })
            .await;

        if let (Err(error), FlightRole::Leader, Some(negative)) = (&result, role, &self.negative)
            && error.is_negative_cacheable()
        {
            negative.insert(key, error.clone()).await;
        }
        result
    }
}

/// Gateway Core service.
pub struct Service {
    upstream: Arc<Upstream>,
    cache: CacheStore,
}

impl Service {
    /// Create a service over `fetcher`. `config` is assumed validated.
    #[must_use]
    pub fn new(config: &GatewayConfig, fetcher: Arc<dyn UpstreamFetcher>) -> Self {
        let negative = config.cache.negative_ttl.map(|ttl| {
            Cache::builder()
                .max_capacity(config.cache.capacity)
                .time_to_live(ttl.min(MAX_TTL))
                .build()
        });

        Self {
            upstream: Arc::new(Upstream {
                fetcher,
                request_timeout: config.request_timeout,
                documents: SingleFlight::new(),
                negative,
            }),
            cache: CacheStore::new(config.cache.capacity, config.ttl.clone()),
        }
    }

    /// Validate `config` and build a service over the HTTP fetch client.
    ///
    /// # Errors
    /// [`InitError`] when the configuration is invalid or TLS cannot be set up.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, InitError> {
        config.validate()?;
        let fetcher = HttpFetcher::new(config)?;
        Ok(Self::new(config, Arc::new(fetcher)))
    }

    /// Resolve `identity` into the view described by `policy`.
    ///
    /// # Errors
    /// - [`DomainError::ClassMismatch`] when `class` is not the identity's class
    /// - upstream, validation and round errors of the fetch and shaping steps
    #[instrument(
        skip_all,
        fields(identity = %identity, class = %class, policy = %policy)
    )]
    pub async fn resolve(
        &self,
        identity: &ResourceIdentity,
        class: ResourceClass,
        policy: &ShapingPolicy,
    ) -> Result<ShapedResult, DomainError> {
        if class != identity.class() {
            return Err(DomainError::ClassMismatch {
                reason: format!(
                    "resource class '{class}' does not match '{}' of {}",
                    identity.class(),
                    identity.kind()
                ),
            });
        }

        let upstream = Arc::clone(&self.upstream);
        let owned_identity = identity.clone();
        let owned_policy = policy.clone();
        let (entry, lookup) = self
            .cache
            .get_or_populate(view_key(identity, policy), identity, class, move || {
                async move {
                    let document = upstream.document(&owned_identity).await?;
                    let shaped = shaping::shape(
                        &document.body,
                        class,
                        &owned_policy,
                        &Filters::of(&owned_identity),
                    );
                    if let Err(DomainError::Malformed { reason }) = &shaped {
                        tracing::warn!(%reason, "upstream document failed validation");
                    }
                    shaped
                }
            })
            .await?;

        tracing::debug!(
            ?lookup,
            omitted = entry.value.omitted_count,
            "resource resolved"
        );
        Ok(entry.value.clone())
    }

    /// Drop every cached view and any remembered failure of `identity`.
    pub async fn invalidate(&self, identity: &ResourceIdentity) {
        self.cache.invalidate_identity(identity);
        if let Some(negative) = &self.upstream.negative {
            negative.invalidate(&document_key(identity)).await;
        }
        tracing::info!(identity = %identity, "cache invalidated");
    }

    pub async fn cache_stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.entry_count().await,
            in_flight: self.cache.populating(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use wca_gateway_sdk::RoundSelector;

    use crate::config::CacheConfig;

    /// Serves one fixed document (or error) and counts calls.
    struct StaticFetcher {
        response: Result<Value, DomainError>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl StaticFetcher {
        fn ok(body: Value) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(body),
                delay: Duration::from_millis(50),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(error: DomainError) -> Arc<Self> {
            Self::failing_after(error, Duration::ZERO)
        }

        fn failing_after(error: DomainError, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                response: Err(error),
                delay,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UpstreamFetcher for StaticFetcher {
        async fn fetch(&self, _path: &str, _timeout: Duration) -> Result<RawDocument, DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.response
                .clone()
                .map(|body| RawDocument::new(body, 0))
        }
    }

    fn results() -> Value {
        json!({"items": [
            {"personId": "A", "eventId": "333", "round": "First round", "position": 1},
            {"personId": "A", "eventId": "333", "round": "Final", "position": 1}
        ]})
    }

    fn identity() -> ResourceIdentity {
        ResourceIdentity::competition_results("TestOpen2024").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn different_policies_share_one_fetch() {
        let fetcher = StaticFetcher::ok(results());
        let service = Arc::new(Service::new(&GatewayConfig::default(), fetcher.clone()));
        let identity = identity();

        let finals = ShapingPolicy::default().with_round(RoundSelector::FinalOnly);
        let all = ShapingPolicy::default();
        let (a, b) = tokio::join!(
            service.resolve(&identity, ResourceClass::CompetitionResults, &finals),
            service.resolve(&identity, ResourceClass::CompetitionResults, &all),
        );

        assert_eq!(a.unwrap().omitted_count, 1);
        assert_eq!(b.unwrap().omitted_count, 0);
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(service.cache_stats().await.entries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_failure() {
        let fetcher = StaticFetcher::failing_after(
            DomainError::Unavailable {
                path: "results/TestOpen2024.json".to_owned(),
                attempts: 3,
                reason: "HTTP 503".to_owned(),
            },
            Duration::from_millis(50),
        );
        let service = Arc::new(Service::new(&GatewayConfig::default(), fetcher.clone()));
        let identity = identity();
        let policy = ShapingPolicy::default();

        let outcomes = futures::future::join_all(
            (0..8).map(|_| service.resolve(&identity, ResourceClass::CompetitionResults, &policy)),
        )
        .await;

        assert_eq!(fetcher.calls(), 1);
        let first = outcomes[0].clone().unwrap_err();
        assert!(matches!(first, DomainError::Unavailable { .. }));
        assert!(outcomes.iter().all(|outcome| outcome.as_ref().err() == Some(&first)));
        assert_eq!(service.cache_stats().await.entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn named_round_is_not_served_from_the_all_view() {
        let fetcher = StaticFetcher::ok(results());
        let service = Service::new(&GatewayConfig::default(), fetcher.clone());
        let identity = identity();

        service
            .resolve(&identity, ResourceClass::CompetitionResults, &ShapingPolicy::default())
            .await
            .unwrap();
        let err = service
            .resolve(
                &identity,
                ResourceClass::CompetitionResults,
                &ShapingPolicy::default().with_round(RoundSelector::Named("ALL".to_owned())),
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            DomainError::RoundNotFound {
                round: "ALL".to_owned()
            }
        );
        assert_eq!(service.cache_stats().await.entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn filtered_views_share_the_document_fetch() {
        let fetcher = StaticFetcher::ok(json!({"items": [
            {"id": "EC2024", "name": "European Championship 2024", "region": "_Europe"},
            {"id": "AsC2024", "name": "Asian Championship 2024", "region": "_Asia"}
        ]}));
        let service = Service::new(&GatewayConfig::default(), fetcher.clone());
        let all = ResourceIdentity::championships();
        let europe = all.clone().with_filter("region", "_Europe").unwrap();
        let policy = ShapingPolicy::default();

        let (a, b) = tokio::join!(
            service.resolve(&all, ResourceClass::Championship, &policy),
            service.resolve(&europe, ResourceClass::Championship, &policy),
        );

        assert_eq!(a.unwrap().payload["items"].as_array().unwrap().len(), 2);
        assert_eq!(b.unwrap().payload["items"].as_array().unwrap().len(), 1);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn class_mismatch_is_rejected_without_fetching() {
        let fetcher = StaticFetcher::ok(results());
        let service = Service::new(&GatewayConfig::default(), fetcher.clone());

        let err = service
            .resolve(&identity(), ResourceClass::Ranking, &ShapingPolicy::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::ClassMismatch { .. }));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_refetch() {
        let fetcher = StaticFetcher::ok(results());
        let service = Service::new(&GatewayConfig::default(), fetcher.clone());
        let identity = identity();
        let policy = ShapingPolicy::default();

        service
            .resolve(&identity, ResourceClass::CompetitionResults, &policy)
            .await
            .unwrap();
        service
            .resolve(&identity, ResourceClass::CompetitionResults, &policy)
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), 1);

        service.invalidate(&identity).await;
        service
            .resolve(&identity, ResourceClass::CompetitionResults, &policy)
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_not_cached_by_default() {
        let fetcher = StaticFetcher::failing(DomainError::NotFound {
            path: "results/TestOpen2024.json".to_owned(),
        });
        let service = Service::new(&GatewayConfig::default(), fetcher.clone());

        for _ in 0..2 {
            let err = service
                .resolve(&identity(), ResourceClass::CompetitionResults, &ShapingPolicy::default())
                .await
                .unwrap_err();
            assert!(matches!(err, DomainError::NotFound { .. }));
        }
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(service.cache_stats().await.entries, 0);
    }

    #[tokio::test]
    async fn negative_cache_remembers_not_found() {
        let fetcher = StaticFetcher::failing(DomainError::NotFound {
            path: "results/TestOpen2024.json".to_owned(),
        });
        let config = GatewayConfig {
            cache: CacheConfig {
                negative_ttl: Some(Duration::from_secs(60)),
                ..CacheConfig::default()
            },
            ..GatewayConfig::default()
        };
        let service = Service::new(&config, fetcher.clone());
        let policy = ShapingPolicy::default();

        for _ in 0..3 {
            assert!(
                service
                    .resolve(&identity(), ResourceClass::CompetitionResults, &policy)
                    .await
                    .is_err()
            );
        }
        assert_eq!(fetcher.calls(), 1);

        service.invalidate(&identity()).await;
        assert!(
            service
                .resolve(&identity(), ResourceClass::CompetitionResults, &policy)
                .await
                .is_err()
        );
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_documents_are_reported_and_not_cached() {
        let fetcher = StaticFetcher::ok(json!({"items": [{"position": 1}]}));
        let service = Service::new(&GatewayConfig::default(), fetcher.clone());

        let err = service
            .resolve(&identity(), ResourceClass::CompetitionResults, &ShapingPolicy::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Malformed { .. }));
        assert_eq!(service.cache_stats().await.entries, 0);
    }
}
