//! Container runtime capability consumed by the watcher

use std::collections::HashMap;

#[cfg(test)]
use mockall::automock;

use crate::error::RuntimeError;

/// A running container as reported by the runtime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
    /// Image reference the container was started from, e.g. "nginx:1.25"
    pub image: String,
    pub labels: HashMap<String, String>,
}

/// Image metadata copied into descriptors, opaque to resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    pub architecture: Option<String>,
    pub os: Option<String>,
    pub size: Option<i64>,
    pub created_at: Option<String>,
}

/// Which containers to enumerate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerFilter {
    /// Include stopped containers
    pub all: bool,
    /// `key=value` label constraints
    pub labels: HashMap<String, String>,
}

#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn list_containers(
        &self,
        filter: &ContainerFilter,
    ) -> Result<Vec<ContainerRecord>, RuntimeError>;

    async fn inspect_image(&self, image_ref: &str) -> Result<ImageMetadata, RuntimeError>;
}
