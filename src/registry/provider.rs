//! Registry provider capability

use std::fmt;

#[cfg(test)]
use mockall::automock;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::image::ImageDescriptor;
use crate::registry::v2::BearerChallenge;

/// Identity of a registry provider family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Hub,
    Ecr,
    Acr,
    Gcr,
    Custom,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Hub => "hub",
            ProviderId::Ecr => "ecr",
            ProviderId::Acr => "acr",
            ProviderId::Gcr => "gcr",
            ProviderId::Custom => "custom",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "hub" => Some(ProviderId::Hub),
            "ecr" => Some(ProviderId::Ecr),
            "acr" => Some(ProviderId::Acr),
            "gcr" => Some(ProviderId::Gcr),
            "custom" => Some(ProviderId::Custom),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A family of container registries: how to recognize, normalize, authenticate and list tags.
///
/// Providers are built once from validated configuration and shared across
/// concurrent resolutions. The only state mutated after construction is the
/// provider's own token cache.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait RegistryProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Whether this provider is responsible for the descriptor's registry URL
    fn matches(&self, image: &ImageDescriptor) -> bool;

    /// Rewrite registry, registry URL and image path into canonical form.
    ///
    /// Must be idempotent.
    fn normalize_image(&self, image: ImageDescriptor) -> ImageDescriptor;

    /// Attach provider-specific authorization to a registry request
    async fn authenticate(
        &self,
        image: &ImageDescriptor,
        request: RequestBuilder,
    ) -> Result<RequestBuilder, RegistryError>;

    /// Best available base64 `login:secret` pair, None for anonymous access
    fn auth_credentials(&self) -> Option<String>;

    /// A request was refused with this bearer challenge.
    ///
    /// Returns true when the provider adopted it and the request should be retried once.
    async fn accept_challenge(
        &self,
        _image: &ImageDescriptor,
        _challenge: BearerChallenge,
    ) -> Result<bool, RegistryError> {
        Ok(false)
    }

    /// Every tag of the descriptor's repository, in registry order
    async fn get_tags(&self, image: &ImageDescriptor) -> Result<Vec<String>, RegistryError>;
}
