//! Registry provider implementations and their priority order
//!
//! Providers are tried in this fixed order, first match wins:
//!
//! 1. `ecr` (`*.dkr.ecr.*.amazonaws.com`)
//! 2. `gcr` (`gcr.io`, `*.gcr.io`)
//! 3. `acr` (`*.azurecr.io`)
//! 4. `custom` (the configured host)
//! 5. `hub` (no registry host, or a Docker Hub host)

pub mod acr;
pub mod custom;
pub mod ecr;
pub mod gcr;
pub mod hub;

pub use acr::AcrRegistry;
pub use custom::CustomRegistry;
pub use ecr::EcrRegistry;
pub use gcr::GcrRegistry;
pub use hub::HubRegistry;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::ConfigError;
use crate::registry::provider::{ProviderId, RegistryProvider};

pub const PROVIDER_PRIORITY: [ProviderId; 5] = [
    ProviderId::Ecr,
    ProviderId::Gcr,
    ProviderId::Acr,
    ProviderId::Custom,
    ProviderId::Hub,
];

/// Build providers in priority order from raw per-provider configuration.
///
/// A provider whose configuration is rejected is logged and left out; the
/// others stay usable. Hub is enabled anonymously when not configured, the
/// remaining providers only when configured.
pub async fn build_providers(
    raw: &BTreeMap<String, serde_json::Value>,
    timeout: Duration,
) -> Vec<Arc<dyn RegistryProvider>> {
    for name in raw.keys() {
        if ProviderId::from_name(name).is_none() {
            warn!("Ignoring configuration for unknown registry provider {}", name);
        }
    }

    let mut providers: Vec<Arc<dyn RegistryProvider>> = Vec::new();
    for id in PROVIDER_PRIORITY {
        let config = raw.get(id.as_str()).cloned();
        match build_provider(id, config, timeout).await {
            Ok(Some(provider)) => {
                info!("Registry provider {} enabled", id);
                providers.push(provider);
            }
            Ok(None) => {}
            Err(e) => error!("Registry provider {} disabled: {}", id, e),
        }
    }
    providers
}

async fn build_provider(
    id: ProviderId,
    config: Option<serde_json::Value>,
    timeout: Duration,
) -> Result<Option<Arc<dyn RegistryProvider>>, ConfigError> {
    let provider: Arc<dyn RegistryProvider> = match (id, config) {
        (ProviderId::Hub, config) => {
            let config = HubRegistry::validate_configuration(
                config.unwrap_or_else(|| serde_json::json!({})),
            )?;
            Arc::new(HubRegistry::new(config, timeout))
        }
        (_, None) => return Ok(None),
        (ProviderId::Ecr, Some(raw)) => {
            let config = EcrRegistry::validate_configuration(raw)?;
            Arc::new(EcrRegistry::new(&config, timeout).await)
        }
        (ProviderId::Gcr, Some(raw)) => {
            let config = GcrRegistry::validate_configuration(raw)?;
            Arc::new(GcrRegistry::new(&config, timeout))
        }
        (ProviderId::Acr, Some(raw)) => {
            let config = AcrRegistry::validate_configuration(raw)?;
            Arc::new(AcrRegistry::new(&config, timeout))
        }
        (ProviderId::Custom, Some(raw)) => {
            let config = CustomRegistry::validate_configuration(raw)?;
            Arc::new(CustomRegistry::new(config, timeout))
        }
    };
    Ok(Some(provider))
}
