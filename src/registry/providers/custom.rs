//! Self-hosted registry v2 provider
//!
//! The registry base is asked for a bearer challenge until it gives an answer.
//! Registries that answer with `WWW-Authenticate: Bearer ...` get a token
//! exchange per repository; others receive basic auth when credentials are
//! configured. A challenge returned later by a tag listing replaces the discovered one.

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::debug;
use tokio::sync::{OnceCell, RwLock};

use crate::error::{ConfigError, RegistryError};
use crate::image::{ImageDescriptor, registry_host};
use crate::registry::credentials::BasicCredentials;
use crate::registry::provider::{ProviderId, RegistryProvider};
use crate::registry::token::TokenCache;
use crate::registry::v2::{self, BearerChallenge};

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CustomConfig {
    pub url: String,
    #[serde(flatten)]
    pub credentials: BasicCredentials,
}

pub struct CustomRegistry {
    client: Client,
    config: CustomConfig,
    registry_url: String,
    discovered: OnceCell<()>,
    challenge: RwLock<Option<BearerChallenge>>,
    tokens: TokenCache,
}

impl CustomRegistry {
    pub fn validate_configuration(raw: serde_json::Value) -> Result<CustomConfig, ConfigError> {
        let provider = ProviderId::Custom.as_str();
        let mut config: CustomConfig =
            serde_json::from_value(raw).map_err(|e| ConfigError::registry(provider, e.to_string()))?;

        if registry_host(&config.url).is_empty() {
            return Err(ConfigError::registry(provider, "url must name a registry host"));
        }
        config.credentials = config.credentials.validate(provider)?;

        Ok(config)
    }

    pub fn new(config: CustomConfig, timeout: Duration) -> Self {
        let registry_url = canonical_url(&config.url);
        Self {
            client: v2::http_client(timeout),
            config,
            registry_url,
            discovered: OnceCell::new(),
            challenge: RwLock::new(None),
            tokens: TokenCache::new(),
        }
    }

    /// Failed discovery is not remembered, the next call asks again
    async fn challenge(&self) -> Result<Option<BearerChallenge>, RegistryError> {
        self.discovered
            .get_or_try_init(|| async {
                if let Some(challenge) = v2::discover_challenge(&self.client, &self.registry_url).await? {
                    *self.challenge.write().await = Some(challenge);
                }
                Ok::<_, RegistryError>(())
            })
            .await?;
        Ok(self.challenge.read().await.clone())
    }
}

/// "registry.local:5000" -> "https://registry.local:5000/v2"
fn canonical_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    let with_scheme = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    };
    if with_scheme.ends_with("/v2") {
        with_scheme
    } else {
        format!("{}/v2", with_scheme)
    }
}

#[async_trait::async_trait]
impl RegistryProvider for CustomRegistry {
    fn id(&self) -> ProviderId {
        ProviderId::Custom
    }

    fn matches(&self, image: &ImageDescriptor) -> bool {
        image
            .registry_host()
            .is_some_and(|host| host == registry_host(&self.registry_url))
    }

    fn normalize_image(&self, mut image: ImageDescriptor) -> ImageDescriptor {
        image.registry = Some(ProviderId::Custom);
        image.registry_url = Some(self.registry_url.clone());
        image
    }

    async fn authenticate(
        &self,
        image: &ImageDescriptor,
        request: RequestBuilder,
    ) -> Result<RequestBuilder, RegistryError> {
        let basic = self.auth_credentials();

        let Some(challenge) = self.challenge().await? else {
            return Ok(match basic {
                Some(credentials) => request.header(AUTHORIZATION, format!("Basic {}", credentials)),
                None => request,
            });
        };

        let token = self
            .tokens
            .get_or_refresh(&image.image, || async {
                let token_request = challenge.token_request(&self.client, &image.image)?;
                let token_request = match &basic {
                    Some(credentials) => {
                        token_request.header(AUTHORIZATION, format!("Basic {}", credentials))
                    }
                    None => token_request,
                };
                v2::exchange_token(token_request).await
            })
            .await?;
        Ok(request.bearer_auth(token))
    }

    fn auth_credentials(&self) -> Option<String> {
        self.config.credentials.encoded()
    }

    async fn accept_challenge(
        &self,
        image: &ImageDescriptor,
        challenge: BearerChallenge,
    ) -> Result<bool, RegistryError> {
        debug!("{} issued a bearer challenge for {}", self.registry_url, image.image);
        *self.challenge.write().await = Some(challenge);
        self.tokens.invalidate(&image.image).await;
        Ok(true)
    }

    async fn get_tags(&self, image: &ImageDescriptor) -> Result<Vec<String>, RegistryError> {
        v2::list_tags(&self.client, self, image).await
    }
}
