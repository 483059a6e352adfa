//! Local client adapter implementing the SDK API trait.
//!
//! Bridges the domain service to [`WcaGatewayClient`], the contract the query
//! dispatch layer is written against.

use std::sync::Arc;

use async_trait::async_trait;
use wca_gateway_sdk::{
    GatewayError, ResourceClass, ResourceIdentity, ShapedResult, ShapingPolicy, WcaGatewayClient,
};

use crate::domain::error::DomainError;
use crate::domain::service::Service;

pub struct WcaGatewayLocalClient {
    service: Arc<Service>,
}

impl WcaGatewayLocalClient {
    #[must_use]
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }
}

fn log_and_convert(
    error: DomainError,
    identity: &ResourceIdentity,
    policy: &ShapingPolicy,
) -> GatewayError {
    let converted = error.into_gateway_error(identity, policy);
    if converted.is_transient() {
        tracing::warn!(error = %converted, "wca gateway call failed");
    } else {
        tracing::debug!(error = %converted, "wca gateway call rejected");
    }
    converted
}

#[async_trait]
impl WcaGatewayClient for WcaGatewayLocalClient {
    async fn resolve(
        &self,
        identity: &ResourceIdentity,
        class: ResourceClass,
        policy: &ShapingPolicy,
    ) -> Result<ShapedResult, GatewayError> {
        self.service
            .resolve(identity, class, policy)
            .await
            .map_err(|e| log_and_convert(e, identity, policy))
    }

    async fn invalidate(&self, identity: &ResourceIdentity) {
        self.service.invalidate(identity).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use wca_gateway_sdk::RoundSelector;

    use crate::config::GatewayConfig;
    use crate::domain::ports::{RawDocument, UpstreamFetcher};

    struct PersonFetcher;

    #[async_trait]
    impl UpstreamFetcher for PersonFetcher {
        async fn fetch(&self, path: &str, _timeout: Duration) -> Result<RawDocument, DomainError> {
            if path != "persons/2003SEAR02.json" {
                return Err(DomainError::NotFound {
                    path: path.to_owned(),
                });
            }
            let body = json!({
                "id": "2003SEAR02",
                "results": {"Open2021": {"333": [{"round": "Final", "position": 1}]}}
            });
            Ok(RawDocument::new(body, 0))
        }
    }

    fn client() -> WcaGatewayLocalClient {
        let service = Service::new(&GatewayConfig::default(), Arc::new(PersonFetcher));
        WcaGatewayLocalClient::new(Arc::new(service))
    }

    #[tokio::test]
    async fn resolves_through_the_trait() {
        let client: &dyn WcaGatewayClient = &client();
        let identity = ResourceIdentity::person(" 2003sear02 ").unwrap();

        let shaped = client
            .resolve(&identity, ResourceClass::PersonProfile, &ShapingPolicy::summary())
            .await
            .unwrap();

        assert_eq!(shaped.payload["id"], "2003SEAR02");
    }

    #[tokio::test]
    async fn errors_name_identity_and_policy() {
        let client = client();
        let identity = ResourceIdentity::person("2003SEAR02").unwrap();
        let policy = ShapingPolicy::default().with_round(RoundSelector::parse("Semi Final"));

        let err = client
            .resolve(&identity, ResourceClass::PersonProfile, &policy)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::RoundNotFound {
                resource: identity.canonical().to_owned(),
                round: "Semi Final".to_owned(),
                policy: policy.canonical(),
            }
        );

        let missing = ResourceIdentity::person("2020NOPE01").unwrap();
        let err = client
            .resolve(&missing, ResourceClass::PersonProfile, &policy)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::NotFound {
                resource: missing.canonical().to_owned()
            }
        );

        let err = client
            .resolve(&identity, ResourceClass::Ranking, &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest { .. }));
    }
}
