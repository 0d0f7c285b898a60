//! Image resolution: provider lookup, normalization, tag listing and candidate selection

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::ResolutionError;
use crate::image::ImageDescriptor;
use crate::registry::RegistryProvider;
use crate::version::{TagFilters, select_candidates};

/// Outcome of resolving one image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedImage {
    pub image: ImageDescriptor,
    /// False when no provider matched; the descriptor is then unchanged
    pub supported: bool,
    /// Newer tags, most recent first for semver images
    pub candidates: Vec<String>,
}

impl ResolvedImage {
    fn unsupported(image: ImageDescriptor) -> Self {
        Self {
            image,
            supported: false,
            candidates: Vec::new(),
        }
    }

    /// The tag to report as the update, if any
    pub fn new_version(&self) -> Option<&str> {
        self.candidates.first().map(String::as_str)
    }
}

/// Resolves images against an ordered provider list
pub struct ImageResolver {
    providers: Vec<Arc<dyn RegistryProvider>>,
}

impl ImageResolver {
    /// `providers` must already be in priority order, catch-all last
    pub fn new(providers: Vec<Arc<dyn RegistryProvider>>) -> Self {
        Self { providers }
    }

    /// First provider whose `matches` accepts the descriptor
    pub fn find_provider(&self, image: &ImageDescriptor) -> Option<&Arc<dyn RegistryProvider>> {
        self.providers.iter().find(|provider| provider.matches(image))
    }

    pub async fn resolve(&self, image: ImageDescriptor) -> Result<ResolvedImage, ResolutionError> {
        let Some(provider) = self.find_provider(&image) else {
            debug!(
                "No registry provider for {:?}/{}, skipping",
                image.registry_url, image.image
            );
            return Ok(ResolvedImage::unsupported(image));
        };

        let image = provider.normalize_image(image);
        let filters = TagFilters::new(image.include_tags.as_deref(), image.exclude_tags.as_deref())?;

        let tags = provider.get_tags(&image).await?;
        let candidates = select_candidates(&image.version, &tags, &filters);

        debug!(
            "Resolved {} {}:{} -> {} candidates",
            provider.id(),
            image.image,
            image.version,
            candidates.len()
        );

        Ok(ResolvedImage {
            image,
            supported: true,
            candidates,
        })
    }
}
