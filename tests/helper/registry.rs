//! Registry test utilities

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::RequestBuilder;

use tagwatch::error::RegistryError;
use tagwatch::image::ImageDescriptor;
use tagwatch::registry::{ProviderId, RegistryProvider};

/// Hub-like provider answering from a fixed tag table.
///
/// Repositories can be given a delay before answering, or a failure.
#[derive(Default)]
pub struct ScriptedRegistry {
    tags: HashMap<String, Vec<String>>,
    delays: HashMap<String, Duration>,
    failures: HashMap<String, String>,
}

impl ScriptedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags(mut self, repository: &str, tags: Vec<&str>) -> Self {
        self.tags.insert(
            repository.to_string(),
            tags.into_iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    pub fn with_delay(mut self, repository: &str, delay: Duration) -> Self {
        self.delays.insert(repository.to_string(), delay);
        self
    }

    pub fn with_failure(mut self, repository: &str, message: &str) -> Self {
        self.failures
            .insert(repository.to_string(), message.to_string());
        self
    }
}

#[async_trait]
impl RegistryProvider for ScriptedRegistry {
    fn id(&self) -> ProviderId {
        ProviderId::Hub
    }

    fn matches(&self, image: &ImageDescriptor) -> bool {
        image.registry_url.is_none() || image.registry == Some(ProviderId::Hub)
    }

    fn normalize_image(&self, mut image: ImageDescriptor) -> ImageDescriptor {
        if !image.image.contains('/') {
            image.image = format!("library/{}", image.image);
        }
        image.registry = Some(ProviderId::Hub);
        image.registry_url = Some("https://registry.test/v2".to_string());
        image
    }

    async fn authenticate(
        &self,
        _image: &ImageDescriptor,
        request: RequestBuilder,
    ) -> Result<RequestBuilder, RegistryError> {
        Ok(request)
    }

    fn auth_credentials(&self) -> Option<String> {
        None
    }

    async fn get_tags(&self, image: &ImageDescriptor) -> Result<Vec<String>, RegistryError> {
        if let Some(delay) = self.delays.get(&image.image) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(message) = self.failures.get(&image.image) {
            return Err(RegistryError::Unavailable(message.clone()));
        }
        self.tags
            .get(&image.image)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(image.image.clone()))
    }
}
