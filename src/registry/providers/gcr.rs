//! Google Container Registry provider
//!
//! Service account keys are exchanged at the registry's token endpoint using
//! the `_json_key` basic-auth convention, and the returned bearer token is
//! cached per repository.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::json;

use crate::error::{ConfigError, RegistryError};
use crate::image::ImageDescriptor;
use crate::registry::credentials::encode_pair;
use crate::registry::provider::{ProviderId, RegistryProvider};
use crate::registry::token::TokenCache;
use crate::registry::v2;

static GCR_HOST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*\.)?gcr\.io$").expect("GCR host pattern is valid"));

const JSON_KEY_USER: &str = "_json_key";

#[derive(Clone, Deserialize, PartialEq)]
pub struct GcrConfig {
    #[serde(rename = "clientemail")]
    pub client_email: String,
    #[serde(rename = "privatekey")]
    pub private_key: String,
}

impl fmt::Debug for GcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcrConfig")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

pub struct GcrRegistry {
    client: Client,
    credentials: String,
    tokens: TokenCache,
}

impl GcrRegistry {
    pub fn validate_configuration(raw: serde_json::Value) -> Result<GcrConfig, ConfigError> {
        let provider = ProviderId::Gcr.as_str();
        let config: GcrConfig =
            serde_json::from_value(raw).map_err(|e| ConfigError::registry(provider, e.to_string()))?;

        if !config.client_email.contains('@') {
            return Err(ConfigError::registry(
                provider,
                "clientemail must be a service account email",
            ));
        }
        if config.private_key.trim().is_empty() {
            return Err(ConfigError::registry(provider, "privatekey must not be empty"));
        }

        Ok(config)
    }

    pub fn new(config: &GcrConfig, timeout: Duration) -> Self {
        let key = json!({
            "client_email": config.client_email,
            "private_key": config.private_key,
        });
        Self {
            client: v2::http_client(timeout),
            credentials: encode_pair(JSON_KEY_USER, &key.to_string()),
            tokens: TokenCache::new(),
        }
    }

    fn token_request(&self, image: &ImageDescriptor) -> Result<RequestBuilder, RegistryError> {
        let registry_url = image.registry_url.as_deref().ok_or_else(|| {
            RegistryError::Authentication(format!("{} has no registry URL", image.image))
        })?;
        let url = Url::parse_with_params(
            &format!("{}/token", registry_url.trim_end_matches('/')),
            [("scope", format!("repository:{}:pull", image.image))],
        )
        .map_err(|e| RegistryError::Authentication(format!("invalid token URL: {}", e)))?;

        Ok(self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Basic {}", self.credentials)))
    }
}

#[async_trait::async_trait]
impl RegistryProvider for GcrRegistry {
    fn id(&self) -> ProviderId {
        ProviderId::Gcr
    }

    fn matches(&self, image: &ImageDescriptor) -> bool {
        image
            .registry_host()
            .is_some_and(|host| GCR_HOST_RE.is_match(&host))
    }

    fn normalize_image(&self, mut image: ImageDescriptor) -> ImageDescriptor {
        if let Some(host) = image.registry_host() {
            image.registry_url = Some(format!("https://{}/v2", host));
        }
        image.registry = Some(ProviderId::Gcr);
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
                v2::exchange_token(self.token_request(image)?).await
            })
            .await?;
        Ok(request.bearer_auth(token))
    }

    fn auth_credentials(&self) -> Option<String> {
        Some(self.credentials.clone())
    }

    async fn get_tags(&self, image: &ImageDescriptor) -> Result<Vec<String>, RegistryError> {
        v2::list_tags(&self.client, self, image).await
    }
}
