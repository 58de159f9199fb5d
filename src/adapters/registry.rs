//! Adapter registry
//!
//! Maps providers to adapter instances. The registry is built once from
//! configuration at startup and injected wherever adapters are needed; only
//! providers with configured client credentials are registered, so a
//! stored integration for an unregistered provider simply fails lookup.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::adapters::google::GoogleAdapter;
use crate::adapters::microsoft::MicrosoftAdapter;
use crate::adapters::trait_::ProviderAdapter;
use crate::adapters::zoom::ZoomAdapter;
use crate::config::AppConfig;
use crate::models::Provider;

/// Errors raised by adapter lookup.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no adapter registered for provider '{0}'")]
    ProviderNotRegistered(Provider),
}

/// Registry of provider adapters.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any existing one for its provider.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    /// Look up the adapter for `provider`.
    pub fn get(&self, provider: Provider) -> Result<Arc<dyn ProviderAdapter>, RegistryError> {
        self.adapters
            .get(&provider)
            .cloned()
            .ok_or(RegistryError::ProviderNotRegistered(provider))
    }

    /// Whether an adapter is registered for `provider`.
    pub fn contains(&self, provider: Provider) -> bool {
        self.adapters.contains_key(&provider)
    }

    /// Providers with a registered adapter, in stable order.
    pub fn registered_providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.adapters.keys().copied().collect();
        providers.sort_by_key(|p| p.as_str());
        providers
    }

    /// Build the registry from configured provider credentials.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::new();

        if let (Some(id), Some(secret)) = (&config.google_client_id, &config.google_client_secret) {
            let adapter = match (&config.google_oauth_base, &config.google_api_base) {
                (Some(oauth), Some(api)) => GoogleAdapter::with_bases(
                    id.clone(),
                    secret.clone(),
                    oauth.clone(),
                    api.clone(),
                ),
                _ => GoogleAdapter::new(id.clone(), secret.clone()),
            };
            registry.register(Arc::new(adapter));
        }

        if let (Some(id), Some(secret)) = (
            &config.microsoft_client_id,
            &config.microsoft_client_secret,
        ) {
            let adapter = match (&config.microsoft_oauth_base, &config.microsoft_api_base) {
                (Some(oauth), Some(api)) => MicrosoftAdapter::with_bases(
                    id.clone(),
                    secret.clone(),
                    oauth.clone(),
                    api.clone(),
                ),
                _ => MicrosoftAdapter::new(id.clone(), secret.clone()),
            };
            registry.register(Arc::new(adapter));
        }

        if let (Some(id), Some(secret)) = (&config.zoom_client_id, &config.zoom_client_secret) {
            let adapter = match (&config.zoom_oauth_base, &config.zoom_api_base) {
                (Some(oauth), Some(api)) => {
                    ZoomAdapter::with_bases(id.clone(), secret.clone(), oauth.clone(), api.clone())
                }
                _ => ZoomAdapter::new(id.clone(), secret.clone()),
            };
            registry.register(Arc::new(adapter));
        }

        info!(
            providers = ?registry.registered_providers(),
            "Initialized adapter registry"
        );
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry_rejects_lookup() {
        let registry = AdapterRegistry::new();
        assert!(matches!(
            registry.get(Provider::Google),
            Err(RegistryError::ProviderNotRegistered(Provider::Google))
        ));
    }

    #[test]
    fn test_from_config_registers_configured_providers_only() {
        let config = AppConfig {
            google_client_id: Some("gid".to_string()),
            google_client_secret: Some("gsecret".to_string()),
            zoom_client_id: Some("zid".to_string()),
            zoom_client_secret: Some("zsecret".to_string()),
            ..AppConfig::default()
        };

        let registry = AdapterRegistry::from_config(&config);
        assert!(registry.contains(Provider::Google));
        assert!(registry.contains(Provider::Zoom));
        assert!(!registry.contains(Provider::Microsoft));
        assert!(!registry.contains(Provider::Caldav));
        assert_eq!(
            registry.registered_providers(),
            vec![Provider::Google, Provider::Zoom]
        );
    }
}
