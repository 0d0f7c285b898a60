//! Docker Hub provider: the catch-all for references without a registry host

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Url};

use crate::error::{ConfigError, RegistryError};
use crate::image::{ImageDescriptor, registry_host};
use crate::registry::credentials::BasicCredentials;
use crate::registry::provider::{ProviderId, RegistryProvider};
use crate::registry::token::TokenCache;
use crate::registry::v2;

/// Public v2 endpoint of Docker Hub
pub const DEFAULT_REGISTRY_URL: &str = "https://registry-1.docker.io/v2";

/// Docker Hub token service
pub const DEFAULT_AUTH_URL: &str = "https://auth.docker.io/token";

const TOKEN_SERVICE: &str = "registry.docker.io";

/// Organization implied by single-segment repository names
const DEFAULT_ORGANIZATION: &str = "library";

/// Hosts that all refer to Docker Hub
const HUB_HOSTS: &[&str] = &[
    "docker.io",
    "index.docker.io",
    "registry-1.docker.io",
    "registry.hub.docker.com",
];

pub struct HubRegistry {
    client: Client,
    config: BasicCredentials,
    registry_url: String,
    auth_url: String,
    tokens: TokenCache,
}

impl HubRegistry {
    pub fn validate_configuration(raw: serde_json::Value) -> Result<BasicCredentials, ConfigError> {
        let config: BasicCredentials = serde_json::from_value(raw)
            .map_err(|e| ConfigError::registry(ProviderId::Hub.as_str(), e.to_string()))?;
        config.validate(ProviderId::Hub.as_str())
    }

    pub fn new(config: BasicCredentials, timeout: Duration) -> Self {
        Self::with_endpoints(config, DEFAULT_REGISTRY_URL, DEFAULT_AUTH_URL, timeout)
    }

    /// Creates a HubRegistry against custom registry and token endpoints
    pub fn with_endpoints(
        config: BasicCredentials,
        registry_url: &str,
        auth_url: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            client: v2::http_client(timeout),
            config,
            registry_url: registry_url.trim_end_matches('/').to_string(),
            auth_url: auth_url.to_string(),
            tokens: TokenCache::new(),
        }
    }

    fn token_request(&self, repository: &str) -> Result<RequestBuilder, RegistryError> {
        let url = Url::parse_with_params(
            &self.auth_url,
            [
                ("service", TOKEN_SERVICE.to_string()),
                ("scope", format!("repository:{}:pull", repository)),
            ],
        )
        .map_err(|e| RegistryError::Authentication(format!("invalid token URL: {}", e)))?;

        let request = self.client.get(url);
        Ok(match self.auth_credentials() {
            Some(credentials) => request.header(AUTHORIZATION, format!("Basic {}", credentials)),
            None => request,
        })
    }
}

#[async_trait::async_trait]
impl RegistryProvider for HubRegistry {
    fn id(&self) -> ProviderId {
        ProviderId::Hub
    }

    fn matches(&self, image: &ImageDescriptor) -> bool {
        match image.registry_host() {
            None => true,
            Some(host) => {
                HUB_HOSTS.contains(&host.as_str()) || host == registry_host(&self.registry_url)
            }
        }
    }

    fn normalize_image(&self, mut image: ImageDescriptor) -> ImageDescriptor {
        if !image.image.contains('/') {
            image.image = format!("{}/{}", DEFAULT_ORGANIZATION, image.image);
        }
        image.registry = Some(ProviderId::Hub);
        image.registry_url = Some(self.registry_url.clone());
        image
    }

    async fn authenticate(
        &self,
        image: &ImageDescriptor,
        request: RequestBuilder,
    ) -> Result<RequestBuilder, RegistryError> {
        let token = self
            .tokens
            .get_or_refresh(&image.image, || async {
                v2::exchange_token(self.token_request(&image.image)?).await
            })
            .await?;
        Ok(request.bearer_auth(token))
    }

    fn auth_credentials(&self) -> Option<String> {
        self.config.encoded()
    }

    async fn get_tags(&self, image: &ImageDescriptor) -> Result<Vec<String>, RegistryError> {
        v2::list_tags(&self.client, self, image).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn hub() -> HubRegistry {
        HubRegistry::new(BasicCredentials::default(), Duration::from_secs(5))
    }

    #[test]
    fn normalize_image_prefixes_default_organization() {
        let image = ImageDescriptor::new(None, "image", "1.0.0");

        let normalized = hub().normalize_image(image);

        assert_eq!(normalized.registry, Some(ProviderId::Hub));
        assert_eq!(
            normalized.registry_url.as_deref(),
            Some("https://registry-1.docker.io/v2")
        );
        assert_eq!(normalized.image, "library/image");
    }

    #[test]
    fn normalize_image_keeps_organization() {
        let image = ImageDescriptor::new(None, "grafana/grafana", "10.0.0");
        assert_eq!(hub().normalize_image(image).image, "grafana/grafana");
    }

    #[test]
    fn normalize_image_is_idempotent() {
        let hub = hub();
        let once = hub.normalize_image(ImageDescriptor::new(None, "nginx", "1.25.3"));
        let twice = hub.normalize_image(once.clone());

        assert!(hub.matches(&once));
        assert_eq!(once, twice);
    }

    #[test]
    fn matches_missing_and_docker_hosts_only() {
        let hub = hub();
        for url in [None, Some("docker.io"), Some("https://registry-1.docker.io/v2")] {
            let image = ImageDescriptor::new(url.map(String::from), "nginx", "1");
            assert!(hub.matches(&image), "{:?}", url);
        }
        let ghcr = ImageDescriptor::new(Some("ghcr.io".to_string()), "org/app", "1");
        assert!(!hub.matches(&ghcr));
    }

    #[test]
    fn validate_configuration_rejects_login_without_token() {
        let result = HubRegistry::validate_configuration(json!({"login": "user"}));
        assert!(matches!(result, Err(ConfigError::InvalidRegistry { .. })));
    }

    #[tokio::test]
    async fn get_tags_exchanges_token_and_lists_tags() {
        let mut server = Server::new_async().await;

        let token_mock = server
            .mock("GET", "/token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("service".into(), "registry.docker.io".into()),
                Matcher::UrlEncoded("scope".into(), "repository:library/nginx:pull".into()),
            ]))
            .match_header("authorization", "Basic dXNlcjpzZWNyZXQ=")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"token": "hub-token", "expires_in": 300}"#)
            .expect(1)
            .create_async()
            .await;

        let tags_mock = server
            .mock("GET", "/v2/library/nginx/tags/list")
            .match_header("authorization", "Bearer hub-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name": "library/nginx", "tags": ["1.24.0", "1.25.3", "latest"]}"#)
            .expect(2)
            .create_async()
            .await;

        let config = HubRegistry::validate_configuration(json!({"login": "user", "token": "secret"}))
            .unwrap();
        let hub = HubRegistry::with_endpoints(
            config,
            &format!("{}/v2", server.url()),
            &format!("{}/token", server.url()),
            Duration::from_secs(5),
        );
        let image = hub.normalize_image(ImageDescriptor::new(None, "nginx", "1.24.0"));

        let first = hub.get_tags(&image).await.unwrap();
        let second = hub.get_tags(&image).await.unwrap();

        token_mock.assert_async().await;
        tags_mock.assert_async().await;
        assert_eq!(first, vec!["1.24.0", "1.25.3", "latest"]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn get_tags_follows_pagination_links() {
        let mut server = Server::new_async().await;

        let _token = server
            .mock("GET", "/token")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"token": "t"}"#)
            .create_async()
            .await;
        let first_page = server
            .mock("GET", "/v2/library/redis/tags/list")
            .match_query(Matcher::Missing)
            .with_status(200)
            .with_header(
                "link",
                r#"</v2/library/redis/tags/list?last=7.0&n=2>; rel="next""#,
            )
            .with_body(r#"{"tags": ["6.2", "7.0"]}"#)
            .create_async()
            .await;
        let second_page = server
            .mock("GET", "/v2/library/redis/tags/list")
            .match_query(Matcher::UrlEncoded("last".into(), "7.0".into()))
            .with_status(200)
            .with_body(r#"{"tags": ["7.2"]}"#)
            .create_async()
            .await;

        let hub = HubRegistry::with_endpoints(
            BasicCredentials::default(),
            &format!("{}/v2", server.url()),
            &format!("{}/token", server.url()),
            Duration::from_secs(5),
        );
        let image = hub.normalize_image(ImageDescriptor::new(None, "redis", "6.2"));

        let tags = hub.get_tags(&image).await.unwrap();

        first_page.assert_async().await;
        second_page.assert_async().await;
        assert_eq!(tags, vec!["6.2", "7.0", "7.2"]);
    }

    #[tokio::test]
    async fn get_tags_returns_not_found_for_unknown_repository() {
        let mut server = Server::new_async().await;

        let _token = server
            .mock("GET", "/token")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"token": "t"}"#)
            .create_async()
            .await;
        let mock = server
            .mock("GET", "/v2/library/missing/tags/list")
            .with_status(404)
            .create_async()
            .await;

        let hub = HubRegistry::with_endpoints(
            BasicCredentials::default(),
            &format!("{}/v2", server.url()),
            &format!("{}/token", server.url()),
            Duration::from_secs(5),
        );
        let image = hub.normalize_image(ImageDescriptor::new(None, "missing", "1.0"));

        let result = hub.get_tags(&image).await;

        mock.assert_async().await;
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn get_tags_reports_server_errors_as_unavailable() {
        let mut server = Server::new_async().await;

        let _token = server
            .mock("GET", "/token")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let hub = HubRegistry::with_endpoints(
            BasicCredentials::default(),
            &format!("{}/v2", server.url()),
            &format!("{}/token", server.url()),
            Duration::from_secs(5),
        );
        let image = hub.normalize_image(ImageDescriptor::new(None, "nginx", "1.0"));

        let result = hub.get_tags(&image).await;

        assert!(matches!(result, Err(RegistryError::Unavailable(_))));
    }
}
