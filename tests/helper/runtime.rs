//! Container runtime and result consumer fakes

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use tagwatch::error::RuntimeError;
use tagwatch::image::ImageDescriptor;
use tagwatch::watcher::result::CycleResult;
use tagwatch::watcher::runtime::{ContainerFilter, ContainerRecord, ContainerRuntime, ImageMetadata};
use tagwatch::watcher::sink::{ResultSink, TriggerDispatcher};

pub fn container(name: &str, image: &str) -> ContainerRecord {
    ContainerRecord {
        id: format!("{}-id", name),
        name: name.to_string(),
        image: image.to_string(),
        labels: HashMap::new(),
    }
}

pub fn labelled(name: &str, image: &str, labels: &[(&str, &str)]) -> ContainerRecord {
    ContainerRecord {
        labels: labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        ..container(name, image)
    }
}

/// Runtime serving a fixed container list
#[derive(Default)]
pub struct FakeRuntime {
    containers: Vec<ContainerRecord>,
    list_delay: Duration,
    list_calls: AtomicUsize,
}

impl FakeRuntime {
    pub fn new(containers: Vec<ContainerRecord>) -> Self {
        Self {
            containers,
            ..Default::default()
        }
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = delay;
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_containers(
        &self,
        _filter: &ContainerFilter,
    ) -> Result<Vec<ContainerRecord>, RuntimeError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }
        Ok(self.containers.clone())
    }

    async fn inspect_image(&self, _image_ref: &str) -> Result<ImageMetadata, RuntimeError> {
        Ok(ImageMetadata {
            architecture: Some("amd64".to_string()),
            os: Some("linux".to_string()),
            size: Some(1024),
            created_at: Some("2024-05-01T00:00:00Z".to_string()),
        })
    }
}

/// Keeps every published cycle
#[derive(Default)]
pub struct RecordingSink {
    published: Mutex<Vec<CycleResult>>,
}

impl RecordingSink {
    pub fn published(&self) -> Vec<CycleResult> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn publish(&self, _watcher: &str, result: &CycleResult) {
        self.published.lock().unwrap().push(result.clone());
    }
}

/// Keeps every dispatched `(image, new version)` pair
#[derive(Default)]
pub struct RecordingTrigger {
    dispatched: Mutex<Vec<(String, String)>>,
}

impl RecordingTrigger {
    pub fn dispatched(&self) -> Vec<(String, String)> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait]
impl TriggerDispatcher for RecordingTrigger {
    async fn dispatch(&self, image: &ImageDescriptor, new_version: &str) {
        self.dispatched
            .lock()
            .unwrap()
            .push((image.image.clone(), new_version.to_string()));
    }
}
