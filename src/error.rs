use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid {provider} registry configuration: {reason}")]
    InvalidRegistry { provider: String, reason: String },

    #[error("Invalid configuration for watcher {watcher}: {reason}")]
    InvalidWatcher { watcher: String, reason: String },
}

impl ConfigError {
    pub(crate) fn registry(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRegistry {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn watcher(watcher: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidWatcher {
            watcher: watcher.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Image not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for RegistryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Unavailable(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Invalid tag filter: {0}")]
    InvalidFilter(#[from] regex::Error),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl ResolutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Registry(RegistryError::Authentication(_)) => ErrorKind::Authentication,
            Self::Registry(RegistryError::Unavailable(_)) => ErrorKind::RegistryUnavailable,
            Self::Registry(RegistryError::NotFound(_)) => ErrorKind::NotFound,
            Self::Registry(RegistryError::InvalidResponse(_)) => ErrorKind::InvalidResponse,
            Self::InvalidFilter(_) => ErrorKind::InvalidFilter,
            Self::Runtime(_) => ErrorKind::Runtime,
            Self::Timeout(_) => ErrorKind::Timeout,
        }
    }
}

/// Coarse classification of a per-image failure, exposed in cycle results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Authentication,
    RegistryUnavailable,
    NotFound,
    InvalidResponse,
    InvalidFilter,
    Runtime,
    Timeout,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Container runtime error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("Container runtime error: {0}")]
    Other(String),
}
