//! Consumers of watch results: the result sink and the trigger dispatcher

use std::io::Write;

#[cfg(test)]
use mockall::automock;
use tracing::{error, info, warn};

use crate::image::ImageDescriptor;
use crate::watcher::result::{CycleResult, ImageOutcome};

/// Receives each completed cycle, once per cycle
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ResultSink: Send + Sync {
    async fn publish(&self, watcher: &str, result: &CycleResult);
}

/// Informed of every image with an available update
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait TriggerDispatcher: Send + Sync {
    async fn dispatch(&self, image: &ImageDescriptor, new_version: &str);
}

/// Logs a summary line per cycle and one line per update or failure
pub struct LogSink;

#[async_trait::async_trait]
impl ResultSink for LogSink {
    async fn publish(&self, watcher: &str, result: &CycleResult) {
        if let Some(e) = &result.error {
            error!(watcher, "Watch cycle failed: {}", e);
            return;
        }

        for container in &result.containers {
            if let ImageOutcome::Error { kind, message } = &container.outcome {
                warn!(
                    watcher,
                    container = %container.container_name,
                    ?kind,
                    "Resolution failed: {}",
                    message
                );
            }
        }

        info!(
            watcher,
            containers = result.containers.len(),
            updates = result.updates().count(),
            errors = result.error_count(),
            "Watch cycle finished"
        );
    }
}

/// Writes each cycle as one JSON line on stdout
pub struct JsonSink;

#[async_trait::async_trait]
impl ResultSink for JsonSink {
    async fn publish(&self, watcher: &str, result: &CycleResult) {
        match serde_json::to_string(result) {
            Ok(line) => {
                let mut stdout = std::io::stdout().lock();
                if let Err(e) = writeln!(stdout, "{}", line) {
                    error!(watcher, "Failed to write cycle result: {}", e);
                }
            }
            Err(e) => error!(watcher, "Failed to serialize cycle result: {}", e),
        }
    }
}

/// Trigger that only logs detected updates
pub struct LogTrigger;

#[async_trait::async_trait]
impl TriggerDispatcher for LogTrigger {
    async fn dispatch(&self, image: &ImageDescriptor, new_version: &str) {
        info!(
            registry = ?image.registry,
            image = %image.image,
            current = %image.version,
            new_version,
            "Update available"
        );
    }
}
