//! Azure Container Registry provider (service principal basic auth)

use std::fmt;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

use crate::error::{ConfigError, RegistryError};
use crate::image::ImageDescriptor;
use crate::registry::credentials::encode_pair;
use crate::registry::provider::{ProviderId, RegistryProvider};
use crate::registry::v2;

const ACR_DOMAIN: &str = ".azurecr.io";

#[derive(Clone, Deserialize, PartialEq)]
pub struct AcrConfig {
    #[serde(rename = "clientid")]
    pub client_id: String,
    #[serde(rename = "clientsecret")]
    pub client_secret: String,
}

impl fmt::Debug for AcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcrConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

pub struct AcrRegistry {
    client: Client,
    credentials: String,
}

impl AcrRegistry {
    pub fn validate_configuration(raw: serde_json::Value) -> Result<AcrConfig, ConfigError> {
        let provider = ProviderId::Acr.as_str();
        let config: AcrConfig =
            serde_json::from_value(raw).map_err(|e| ConfigError::registry(provider, e.to_string()))?;

        if config.client_id.trim().is_empty() || config.client_secret.is_empty() {
            return Err(ConfigError::registry(
                provider,
                "clientid and clientsecret must not be empty",
            ));
        }

        Ok(config)
    }

    pub fn new(config: &AcrConfig, timeout: Duration) -> Self {
        Self {
            client: v2::http_client(timeout),
            credentials: encode_pair(&config.client_id, &config.client_secret),
        }
    }
}

#[async_trait::async_trait]
impl RegistryProvider for AcrRegistry {
    fn id(&self) -> ProviderId {
        ProviderId::Acr
    }

    fn matches(&self, image: &ImageDescriptor) -> bool {
        image
            .registry_host()
            .is_some_and(|host| host.ends_with(ACR_DOMAIN))
    }

    fn normalize_image(&self, mut image: ImageDescriptor) -> ImageDescriptor {
        if let Some(host) = image.registry_host() {
            image.registry_url = Some(format!("https://{}/v2", host));
        }
        image.registry = Some(ProviderId::Acr);
        image
    }

    async fn authenticate(
        &self,
        _image: &ImageDescriptor,
        request: RequestBuilder,
    ) -> Result<RequestBuilder, RegistryError> {
        Ok(request.header(AUTHORIZATION, format!("Basic {}", self.credentials)))
    }

    fn auth_credentials(&self) -> Option<String> {
        Some(self.credentials.clone())
    }

    async fn get_tags(&self, image: &ImageDescriptor) -> Result<Vec<String>, RegistryError> {
        v2::list_tags(&self.client, self, image).await
    }
}
