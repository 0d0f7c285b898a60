//! Image descriptors and container image reference parsing

use oci_distribution::Reference;
use serde::Serialize;

use crate::registry::ProviderId;
use crate::version::semver::is_semver;

/// Tag assumed when a reference carries none
pub const DEFAULT_TAG: &str = "latest";

/// Registry the reference parser assigns to hostless references
const DOCKER_HUB_DOMAIN: &str = "docker.io";

/// A container's deployed image, as seen by the resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDescriptor {
    /// Matched provider; set by normalization only
    pub registry: Option<ProviderId>,
    /// Registry v2 base URL after normalization, raw registry host before
    pub registry_url: Option<String>,
    /// Repository path, e.g. "library/nginx"
    pub image: String,
    pub version: String,
    pub version_date: Option<String>,
    pub architecture: Option<String>,
    pub os: Option<String>,
    pub size: Option<i64>,
    pub is_semver: bool,
    pub include_tags: Option<String>,
    pub exclude_tags: Option<String>,
}

impl ImageDescriptor {
    pub fn new(registry_url: Option<String>, image: &str, version: &str) -> Self {
        Self {
            registry: None,
            registry_url,
            image: image.to_string(),
            version: version.to_string(),
            version_date: None,
            architecture: None,
            os: None,
            size: None,
            is_semver: is_semver(version),
            include_tags: None,
            exclude_tags: None,
        }
    }

    /// Build a descriptor from a parsed reference, or None for digest-only references
    pub fn from_reference(reference: &ImageReference) -> Option<Self> {
        let version = match (&reference.tag, &reference.digest) {
            (Some(tag), _) => tag.as_str(),
            (None, Some(_)) => return None,
            (None, None) => DEFAULT_TAG,
        };
        Some(Self::new(
            reference.registry.clone(),
            &reference.repository,
            version,
        ))
    }

    pub fn with_tag_filters(mut self, include: Option<String>, exclude: Option<String>) -> Self {
        self.include_tags = include;
        self.exclude_tags = exclude;
        self
    }

    /// Host part of `registry_url`, lowercased
    pub fn registry_host(&self) -> Option<String> {
        self.registry_url.as_deref().map(registry_host)
    }
}

/// Extract the host (with port) from a registry URL or bare host
///
/// "https://registry-1.docker.io/v2" -> "registry-1.docker.io"
pub fn registry_host(url: &str) -> String {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    without_scheme
        .split('/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// A parsed `[registry/]repository[:tag][@digest]` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: Option<String>,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse a reference as reported by the container runtime.
    ///
    /// Hostless references are Docker Hub references: the registry is left unset
    /// and official images get their `library/` namespace.
    /// Returns None for empty input, bare image ids ("sha256:...") and malformed references.
    pub fn parse(reference: &str) -> Option<Self> {
        let reference = reference.trim();
        if reference.is_empty() || reference.starts_with("sha256:") {
            return None;
        }

        let parsed = Reference::try_from(reference).ok()?;
        let registry = match parsed.registry() {
            DOCKER_HUB_DOMAIN => None,
            host => Some(host.to_string()),
        };

        Some(Self {
            registry,
            repository: parsed.repository().to_string(),
            tag: parsed.tag().map(str::to_string),
            digest: parsed.digest().map(str::to_string),
        })
    }
}
