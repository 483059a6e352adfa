//! Tests for configuration parsing and layering.

#[cfg(test)]
mod tests {
    use crate::config::{ConfigError, DEFAULT_BASE_URL, GatewayConfig, MAX_TTL};
    use std::io::Write;
    use std::time::Duration;
    use wca_gateway_sdk::ResourceClass;

    #[test]
    fn test_config_default() {
        let config = GatewayConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(!config.allow_insecure_http);
        assert!(config.user_agent.starts_with("wca-gateway/"));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_secs(1));
        assert!((config.retry.jitter - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.cache.capacity, 1000);
        assert_eq!(config.cache.negative_ttl, None);
        assert_eq!(
            config.ttl.for_class(ResourceClass::Reference),
            Duration::from_secs(86_400)
        );
        assert_eq!(
            config.ttl.for_class(ResourceClass::PersonProfile),
            Duration::from_secs(3600)
        );
        assert_eq!(
            config.ttl.for_class(ResourceClass::Championship),
            Duration::from_secs(6 * 3600)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_parse_durations_from_yaml() {
        let yaml = r#"
request_timeout: "5s"
retry:
  max_attempts: 5
  base_delay: "250ms"
cache:
  capacity: 50
  negative_ttl: "30s"
ttl:
  ranking: "10m"
"#;
        let config: GatewayConfig = serde_saphyr::from_str(yaml).unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.retry.max_delay, Duration::from_secs(30)); // default
        assert_eq!(config.cache.capacity, 50);
        assert_eq!(config.cache.negative_ttl, Some(Duration::from_secs(30)));
        assert_eq!(config.ttl.ranking, Duration::from_secs(600));
        assert_eq!(config.ttl.reference, Duration::from_secs(86_400)); // default
    }

    #[test]
    fn test_config_reject_unknown_fields() {
        let yaml = r#"
retry:
  attempts: 4
"#;
        let result: Result<GatewayConfig, _> = serde_saphyr::from_str(yaml);
        assert!(
            result.is_err(),
            "Config should reject unknown fields due to deny_unknown_fields"
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = GatewayConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = GatewayConfig::default();
        config.retry.jitter = 1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = GatewayConfig::default();
        config.cache.capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = GatewayConfig::default();
        config.base_url = "http://127.0.0.1:8080".to_owned();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.allow_insecure_http = true;
        assert!(config.validate().is_ok());

        config.base_url = "not a url".to_owned();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_ttl() {
        let mut config = GatewayConfig::default();
        config.ttl.competition_results = MAX_TTL;
        assert!(config.validate().is_ok());

        config.ttl.competition_results = Duration::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ttl.competition_results"));

        let mut config = GatewayConfig::default();
        config.cache.negative_ttl = Some(MAX_TTL + Duration::from_secs(1));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let yaml = "ttl:\n  ranking: \"500000000000years\"\n";
        let config: GatewayConfig = serde_saphyr::from_str(yaml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_layers_file_then_env() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "request_timeout: \"10s\"\nretry:\n  max_attempts: 4\nttl:\n  person_profile: \"2h\""
        )
        .unwrap();

        temp_env::with_vars(
            [
                ("WCA_RETRY__MAX_ATTEMPTS", Some("6")),
                ("WCA_TTL__PERSON_PROFILE", Some("10m")),
            ],
            || {
                let config = GatewayConfig::load(Some(file.path())).unwrap();
                // file value kept where env is silent
                assert_eq!(config.request_timeout, Duration::from_secs(10));
                // env overrides the file
                assert_eq!(config.retry.max_attempts, 6);
                assert_eq!(config.ttl.person_profile, Duration::from_secs(600));
            },
        );
    }

    #[test]
    fn test_load_rejects_invalid_env() {
        temp_env::with_var("WCA_RETRY__JITTER", Some("1.5"), || {
            let result = GatewayConfig::load(None);
            assert!(matches!(result, Err(ConfigError::Invalid(_))));
        });
    }
}
