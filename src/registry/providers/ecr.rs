//! AWS Elastic Container Registry provider
//!
//! Tags are listed through the registry v2 API. Authorization uses the
//! short-lived token returned by ECR `GetAuthorizationToken`, which is already
//! a base64 `AWS:<password>` pair and is sent as basic auth.

use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_ecr::Client as EcrClient;
#[cfg(test)]
use mockall::automock;
use regex::Regex;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::info;

use crate::error::{ConfigError, RegistryError};
use crate::image::ImageDescriptor;
use crate::registry::provider::{ProviderId, RegistryProvider};
use crate::registry::token::{IssuedToken, TokenCache};
use crate::registry::v2;

static ECR_HOST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.*\.dkr\.ecr\..*\.amazonaws\.com$").expect("ECR host pattern is valid")
});

/// ECR tokens are valid for 12 hours
const ECR_TOKEN_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// The authorization token is account-wide, not per repository
const TOKEN_SCOPE: &str = "ecr";

#[derive(Clone, Deserialize, PartialEq)]
pub struct EcrConfig {
    pub region: String,
    #[serde(rename = "accesskeyid")]
    pub access_key_id: String,
    #[serde(rename = "secretaccesskey")]
    pub secret_access_key: String,
}

impl fmt::Debug for EcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcrConfig")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Source of ECR authorization tokens
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait EcrTokenSource: Send + Sync {
    async fn authorization_token(&self) -> Result<IssuedToken, RegistryError>;
}

/// Token source backed by the AWS SDK with static credentials
pub struct AwsEcrTokenSource {
    client: EcrClient,
}

impl AwsEcrTokenSource {
    pub async fn new(config: &EcrConfig) -> Self {
        let credentials = aws_sdk_ecr::config::Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "static",
        );
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        Self {
            client: EcrClient::new(&aws_config),
        }
    }
}

#[async_trait::async_trait]
impl EcrTokenSource for AwsEcrTokenSource {
    async fn authorization_token(&self) -> Result<IssuedToken, RegistryError> {
        let response = self
            .client
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| {
                RegistryError::Authentication(format!(
                    "ECR GetAuthorizationToken failed: {}",
                    aws_sdk_ecr::error::DisplayErrorContext(&e)
                ))
            })?;

        let auth_data = response.authorization_data().first().ok_or_else(|| {
            RegistryError::Authentication("No authorization data returned from ECR".to_string())
        })?;
        let token = auth_data.authorization_token().ok_or_else(|| {
            RegistryError::Authentication("No authorization token in ECR response".to_string())
        })?;

        let ttl = auth_data
            .expires_at()
            .and_then(|expires_at| {
                let remaining = expires_at.secs() - chrono::Utc::now().timestamp();
                u64::try_from(remaining).ok().map(Duration::from_secs)
            })
            .unwrap_or(ECR_TOKEN_TTL);

        info!("Obtained ECR authorization token");
        Ok(IssuedToken::new(token.to_string(), ttl))
    }
}

pub struct EcrRegistry {
    client: Client,
    token_source: Arc<dyn EcrTokenSource>,
    tokens: TokenCache,
}

impl EcrRegistry {
    pub fn validate_configuration(raw: serde_json::Value) -> Result<EcrConfig, ConfigError> {
        let provider = ProviderId::Ecr.as_str();
        let config: EcrConfig =
            serde_json::from_value(raw).map_err(|e| ConfigError::registry(provider, e.to_string()))?;

        for (field, value) in [
            ("region", &config.region),
            ("accesskeyid", &config.access_key_id),
            ("secretaccesskey", &config.secret_access_key),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::registry(provider, format!("{} must not be empty", field)));
            }
        }

        Ok(config)
    }

    pub async fn new(config: &EcrConfig, timeout: Duration) -> Self {
        let token_source = AwsEcrTokenSource::new(config).await;
        Self::with_token_source(Arc::new(token_source), timeout)
    }

    pub fn with_token_source(token_source: Arc<dyn EcrTokenSource>, timeout: Duration) -> Self {
        Self {
            client: v2::http_client(timeout),
            token_source,
            tokens: TokenCache::new(),
        }
    }
}

#[async_trait::async_trait]
impl RegistryProvider for EcrRegistry {
    fn id(&self) -> ProviderId {
        ProviderId::Ecr
    }

    fn matches(&self, image: &ImageDescriptor) -> bool {
        image
            .registry_host()
            .is_some_and(|host| ECR_HOST_RE.is_match(&host))
    }

    fn normalize_image(&self, mut image: ImageDescriptor) -> ImageDescriptor {
        if let Some(host) = image.registry_host() {
            image.registry_url = Some(format!("https://{}/v2", host));
        }
        image.registry = Some(ProviderId::Ecr);
        image
    }

    async fn authenticate(
        &self,
        _image: &ImageDescriptor,
        request: RequestBuilder,
    ) -> Result<RequestBuilder, RegistryError> {
        let token = self
            .tokens
            .get_or_refresh(TOKEN_SCOPE, || self.token_source.authorization_token())
            .await?;
        Ok(request.header(AUTHORIZATION, format!("Basic {}", token)))
    }

    /// ECR credentials are only available as short-lived tokens
    fn auth_credentials(&self) -> Option<String> {
        None
    }

    async fn get_tags(&self, image: &ImageDescriptor) -> Result<Vec<String>, RegistryError> {
        v2::list_tags(&self.client, self, image).await
    }
}
