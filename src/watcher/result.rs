//! Per-cycle watch results

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{ErrorKind, ResolutionError};
use crate::image::ImageDescriptor;
use crate::resolver::ResolvedImage;
use crate::watcher::runtime::ContainerRecord;

/// What happened to one watched container during a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ImageOutcome {
    #[serde(rename_all = "camelCase")]
    UpdateAvailable {
        new_version: String,
        candidates: Vec<String>,
    },
    UpToDate,
    /// No provider handles the registry, or the reference carries no comparable tag
    Unsupported,
    Error { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResult {
    pub container_id: String,
    pub container_name: String,
    pub image: Option<ImageDescriptor>,
    pub outcome: ImageOutcome,
}

impl ContainerResult {
    pub fn resolved(container: &ContainerRecord, resolved: ResolvedImage) -> Self {
        let outcome = match (resolved.supported, resolved.new_version()) {
            (false, _) => ImageOutcome::Unsupported,
            (true, Some(new_version)) => ImageOutcome::UpdateAvailable {
                new_version: new_version.to_string(),
                candidates: resolved.candidates.clone(),
            },
            (true, None) => ImageOutcome::UpToDate,
        };
        Self {
            container_id: container.id.clone(),
            container_name: container.name.clone(),
            image: Some(resolved.image),
            outcome,
        }
    }

    pub fn unsupported(container: &ContainerRecord) -> Self {
        Self {
            container_id: container.id.clone(),
            container_name: container.name.clone(),
            image: None,
            outcome: ImageOutcome::Unsupported,
        }
    }

    pub fn failed(
        container: &ContainerRecord,
        image: Option<ImageDescriptor>,
        error: &ResolutionError,
    ) -> Self {
        Self {
            container_id: container.id.clone(),
            container_name: container.name.clone(),
            image,
            outcome: ImageOutcome::Error {
                kind: error.kind(),
                message: error.to_string(),
            },
        }
    }

    /// `(descriptor, new version)` when this container has an update
    pub fn update(&self) -> Option<(&ImageDescriptor, &str)> {
        match (&self.image, &self.outcome) {
            (Some(image), ImageOutcome::UpdateAvailable { new_version, .. }) => {
                Some((image, new_version.as_str()))
            }
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ImageOutcome::Error { .. })
    }
}

/// Everything one watch cycle produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleResult {
    pub watcher: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub containers: Vec<ContainerResult>,
    /// Set when containers could not be enumerated at all
    pub error: Option<String>,
}

impl CycleResult {
    pub fn updates(&self) -> impl Iterator<Item = (&ImageDescriptor, &str)> {
        self.containers.iter().filter_map(ContainerResult::update)
    }

    pub fn error_count(&self) -> usize {
        self.containers.iter().filter(|c| c.is_error()).count()
    }
}
