//! Watch cycles over a container runtime
//!
//! Each cycle moves through `Idle → Enumerating → Resolving → Aggregating → Idle`.
//! A cycle request that arrives while another cycle of the same watcher is
//! active is dropped, not queued.
//!
//! # Modules
//!
//! - [`runtime`]: container runtime capability
//! - [`docker`]: Docker Engine API implementation of the runtime
//! - [`schedule`]: interval and cron triggers
//! - [`result`]: per-container and per-cycle results
//! - [`sink`]: result sink and trigger dispatcher capabilities

pub mod docker;
pub mod result;
pub mod runtime;
pub mod schedule;
pub mod sink;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ResolutionError, RuntimeError};
use crate::image::{ImageDescriptor, ImageReference};
use crate::resolver::ImageResolver;
use crate::watcher::result::{ContainerResult, CycleResult};
use crate::watcher::runtime::{ContainerFilter, ContainerRecord, ContainerRuntime};
use crate::watcher::schedule::Schedule;
use crate::watcher::sink::{ResultSink, TriggerDispatcher};

/// `true`/`false`: watch this container regardless of the watcher default
pub const WATCH_LABEL: &str = "tagwatch.watch";
/// Include regex for this container's tags
pub const INCLUDE_TAGS_LABEL: &str = "tagwatch.tag.include";
/// Exclude regex for this container's tags
pub const EXCLUDE_TAGS_LABEL: &str = "tagwatch.tag.exclude";

/// Longest accepted cycle timeout (one day)
pub const MAX_CYCLE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub name: String,
    pub schedule: Schedule,
    pub watch_at_start: bool,
    pub watch_by_default: bool,
    pub include_tags: Option<String>,
    pub exclude_tags: Option<String>,
    pub max_concurrency: usize,
    pub cycle_timeout: Duration,
    pub image_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Enumerating,
    Resolving,
    Aggregating,
}

/// Marks a cycle as active; returns the watcher to `Idle` when dropped
struct ActiveCycle<'a> {
    state: &'a Mutex<CycleState>,
}

impl ActiveCycle<'_> {
    fn enter(&self, next: CycleState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

impl Drop for ActiveCycle<'_> {
    fn drop(&mut self) {
        self.enter(CycleState::Idle);
    }
}

pub struct Watcher {
    settings: WatcherSettings,
    runtime: Arc<dyn ContainerRuntime>,
    resolver: Arc<ImageResolver>,
    sink: Arc<dyn ResultSink>,
    trigger: Arc<dyn TriggerDispatcher>,
    state: Mutex<CycleState>,
}

impl Watcher {
    pub fn new(
        settings: WatcherSettings,
        runtime: Arc<dyn ContainerRuntime>,
        resolver: Arc<ImageResolver>,
        sink: Arc<dyn ResultSink>,
        trigger: Arc<dyn TriggerDispatcher>,
    ) -> Self {
        Self {
            settings,
            runtime,
            resolver,
            sink,
            trigger,
            state: Mutex::new(CycleState::Idle),
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn state(&self) -> CycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_cycle(&self) -> Option<ActiveCycle<'_>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != CycleState::Idle {
            return None;
        }
        *state = CycleState::Enumerating;
        Some(ActiveCycle { state: &self.state })
    }

    /// Run the scheduler loop: an optional cycle at start, then one per trigger
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if self.settings.watch_at_start {
                self.trigger_cycle();
            }
            loop {
                let Some(delay) = self.settings.schedule.next_delay(Utc::now()) else {
                    warn!(watcher = %self.settings.name, "Schedule has no upcoming trigger");
                    return;
                };
                debug!(watcher = %self.settings.name, "Next watch cycle in {:?}", delay);
                tokio::time::sleep(delay).await;
                self.trigger_cycle();
            }
        })
    }

    fn trigger_cycle(self: &Arc<Self>) {
        let watcher = Arc::clone(self);
        tokio::spawn(async move {
            watcher.watch_now().await;
        });
    }

    /// Run one cycle now and publish it. Returns None if a cycle was already running.
    pub async fn watch_now(&self) -> Option<CycleResult> {
        let Some(cycle) = self.begin_cycle() else {
            warn!(
                watcher = %self.settings.name,
                "Previous watch cycle still running, dropping request"
            );
            return None;
        };

        let started_at = Utc::now();
        let deadline = Instant::now() + self.settings.cycle_timeout.min(MAX_CYCLE_TIMEOUT);
        info!(watcher = %self.settings.name, "Watch cycle started");

        let (containers, error) = match tokio::time::timeout_at(deadline, self.enumerate()).await {
            Ok(Ok(containers)) => {
                cycle.enter(CycleState::Resolving);
                (self.resolve_all(&containers, deadline).await, None)
            }
            Ok(Err(e)) => (Vec::new(), Some(e.to_string())),
            Err(_) => (
                Vec::new(),
                Some(format!(
                    "Listing containers timed out after {:?}",
                    self.settings.cycle_timeout
                )),
            ),
        };

        cycle.enter(CycleState::Aggregating);
        let result = CycleResult {
            watcher: self.settings.name.clone(),
            started_at,
            finished_at: Utc::now(),
            containers,
            error,
        };

        self.sink.publish(&self.settings.name, &result).await;
        for (image, new_version) in result.updates() {
            self.trigger.dispatch(image, new_version).await;
        }

        Some(result)
    }

    async fn enumerate(&self) -> Result<Vec<ContainerRecord>, RuntimeError> {
        let containers = self
            .runtime
            .list_containers(&ContainerFilter::default())
            .await?;
        let total = containers.len();

        let watched: Vec<ContainerRecord> = containers
            .into_iter()
            .filter(|c| self.is_watched(c))
            .collect();

        debug!(
            watcher = %self.settings.name,
            "Watching {} of {} containers",
            watched.len(),
            total
        );
        Ok(watched)
    }

    fn is_watched(&self, container: &ContainerRecord) -> bool {
        match container.labels.get(WATCH_LABEL) {
            Some(value) if value.eq_ignore_ascii_case("true") => true,
            Some(value) if value.eq_ignore_ascii_case("false") => false,
            Some(value) => {
                warn!(
                    container = %container.name,
                    "Ignoring invalid {} label value {:?}",
                    WATCH_LABEL,
                    value
                );
                self.settings.watch_by_default
            }
            None => self.settings.watch_by_default,
        }
    }

    /// Container labels override the watcher's filters one by one
    fn tag_filters(&self, container: &ContainerRecord) -> (Option<String>, Option<String>) {
        let include = container
            .labels
            .get(INCLUDE_TAGS_LABEL)
            .cloned()
            .or_else(|| self.settings.include_tags.clone());
        let exclude = container
            .labels
            .get(EXCLUDE_TAGS_LABEL)
            .cloned()
            .or_else(|| self.settings.exclude_tags.clone());
        (include, exclude)
    }

    /// Resolve every container with bounded concurrency.
    ///
    /// Containers still pending at the deadline are recorded as timed out.
    async fn resolve_all(
        &self,
        containers: &[ContainerRecord],
        deadline: Instant,
    ) -> Vec<ContainerResult> {
        let mut slots: Vec<Option<ContainerResult>> = containers.iter().map(|_| None).collect();

        let mut pending = stream::iter(containers.to_vec().into_iter().enumerate())
            .map(move |(i, container)| async move { (i, self.watch_container(&container).await) })
            .buffer_unordered(self.settings.max_concurrency.max(1));

        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((i, result))) => slots[i] = Some(result),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        watcher = %self.settings.name,
                        "Watch cycle timed out after {:?}",
                        self.settings.cycle_timeout
                    );
                    break;
                }
            }
        }
        drop(pending);

        let timeout = ResolutionError::Timeout(self.settings.cycle_timeout);
        slots
            .into_iter()
            .zip(containers)
            .map(|(slot, container)| {
                slot.unwrap_or_else(|| ContainerResult::failed(container, None, &timeout))
            })
            .collect()
    }

    async fn watch_container(&self, container: &ContainerRecord) -> ContainerResult {
        let timeout = self.settings.image_timeout;
        match tokio::time::timeout(timeout, self.resolve_container(container)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(container = %container.name, "Resolution timed out after {:?}", timeout);
                ContainerResult::failed(container, None, &ResolutionError::Timeout(timeout))
            }
        }
    }

    async fn resolve_container(&self, container: &ContainerRecord) -> ContainerResult {
        let Some(reference) = ImageReference::parse(&container.image) else {
            debug!(container = %container.name, "No image reference in {:?}", container.image);
            return ContainerResult::unsupported(container);
        };
        let Some(mut image) = ImageDescriptor::from_reference(&reference) else {
            warn!(
                container = %container.name,
                "Image {} is pinned by digest only, nothing to compare",
                container.image
            );
            return ContainerResult::unsupported(container);
        };

        match self.runtime.inspect_image(&container.image).await {
            Ok(metadata) => {
                image.version_date = metadata.created_at;
                image.architecture = metadata.architecture;
                image.os = metadata.os;
                image.size = metadata.size;
            }
            Err(e) => return ContainerResult::failed(container, Some(image), &e.into()),
        }

        let (include, exclude) = self.tag_filters(container);
        let image = image.with_tag_filters(include, exclude);

        match self.resolver.resolve(image.clone()).await {
            Ok(resolved) => {
                if let Some(new_version) = resolved.new_version() {
                    info!(
                        container = %container.name,
                        "{}:{} can be updated to {}",
                        resolved.image.image,
                        resolved.image.version,
                        new_version
                    );
                }
                ContainerResult::resolved(container, resolved)
            }
            Err(e) => {
                warn!(container = %container.name, "Failed to resolve {}: {}", container.image, e);
                ContainerResult::failed(container, Some(image), &e)
            }
        }
    }
}
