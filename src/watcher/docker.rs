//! Docker Engine API runtime (also serves Podman's Docker-compatible socket)

use std::collections::HashMap;

use bollard::Docker;
use bollard::query_parameters::ListContainersOptions;
use tracing::debug;

use crate::error::RuntimeError;
use crate::watcher::runtime::{ContainerFilter, ContainerRecord, ContainerRuntime, ImageMetadata};

/// Request timeout for Docker API calls, in seconds
const DOCKER_TIMEOUT_SECS: u64 = 120;

pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connect to a unix socket, or to the local defaults (`DOCKER_HOST` or the standard socket)
    pub fn connect(socket: Option<&str>) -> Result<Self, RuntimeError> {
        let client = match socket {
            Some(path) => {
                Docker::connect_with_unix(path, DOCKER_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)?
            }
            None => Docker::connect_with_local_defaults()?,
        };
        Ok(Self { client })
    }
}

fn list_filters(filter: &ContainerFilter) -> HashMap<String, Vec<String>> {
    let mut filters: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in &filter.labels {
        filters
            .entry("label".to_string())
            .or_default()
            .push(format!("{}={}", key, value));
    }
    filters
}

#[async_trait::async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(
        &self,
        filter: &ContainerFilter,
    ) -> Result<Vec<ContainerRecord>, RuntimeError> {
        let opts = ListContainersOptions {
            all: filter.all,
            filters: Some(list_filters(filter)),
            ..Default::default()
        };

        let containers = self.client.list_containers(Some(opts)).await?;
        debug!("Docker reported {} containers", containers.len());

        Ok(containers
            .into_iter()
            .map(|c| {
                let name = c
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default();
                ContainerRecord {
                    id: c.id.unwrap_or_default(),
                    name,
                    image: c.image.unwrap_or_default(),
                    labels: c.labels.unwrap_or_default(),
                }
            })
            .collect())
    }

    async fn inspect_image(&self, image_ref: &str) -> Result<ImageMetadata, RuntimeError> {
        let image = self.client.inspect_image(image_ref).await?;
        Ok(ImageMetadata {
            architecture: image.architecture,
            os: image.os,
            size: image.size,
            created_at: image.created.map(|created| created.to_string()),
        })
    }
}
