use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::AuthError;

/// An external OAuth-style authentication provider.
///
/// Providers obtain tokens out-of-band (third-party consent screens, device
/// flows) and hand them to the service through its authentication-response
/// seam; the core never branches on a concrete provider beyond its kind tag.
#[async_trait]
pub trait OauthProvider: Send + Sync {
    /// Stable tag identifying the provider kind, e.g. `"google"`. At most
    /// one provider per kind may be registered.
    fn kind(&self) -> &'static str;

    /// Obtain an encoded token from the external party.
    async fn get_token(&self) -> Result<String>;

    /// Release any resources the provider holds. Called exactly once when
    /// the owning service is disposed.
    fn dispose(&self);
}

/// Registry of external providers, keyed by kind tag.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Mutex<HashMap<&'static str, Arc<dyn OauthProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. Registering a second provider of an already
    /// present kind is a caller error and fails loudly.
    pub fn register(&self, provider: Arc<dyn OauthProvider>) -> Result<(), AuthError> {
        let kind = provider.kind();
        let mut providers = self.lock();
        if providers.contains_key(kind) {
            return Err(AuthError::DuplicateProvider {
                kind: kind.to_string(),
            });
        }
        info!(kind = kind, "Registering oauth provider");
        providers.insert(kind, provider);
        Ok(())
    }

    /// Look up a provider by kind tag.
    pub fn get(&self, kind: &str) -> Option<Arc<dyn OauthProvider>> {
        self.lock().get(kind).cloned()
    }

    /// Dispose and drop every registered provider. Subsequent calls are
    /// no-ops because the registry is drained.
    pub fn dispose_all(&self) {
        let drained: Vec<_> = {
            let mut providers = self.lock();
            providers.drain().collect()
        };
        for (kind, provider) in drained {
            debug!(kind = kind, "Disposing oauth provider");
            provider.dispose();
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<&'static str, Arc<dyn OauthProvider>>> {
        self.providers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        kind: &'static str,
        disposals: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl OauthProvider for CountingProvider {
        fn kind(&self) -> &'static str {
            self.kind
        }

        async fn get_token(&self) -> Result<String> {
            Ok("head.payload".to_string())
        }

        fn dispose(&self) {
            self.disposals.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_duplicate_kind_is_rejected() {
        let registry = ProviderRegistry::new();
        let disposals = Arc::new(AtomicUsize::new(0));

        registry
            .register(Arc::new(CountingProvider {
                kind: "google",
                disposals: Arc::clone(&disposals),
            }))
            .unwrap();

        let err = registry
            .register(Arc::new(CountingProvider {
                kind: "google",
                disposals: Arc::clone(&disposals),
            }))
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateProvider { kind } if kind == "google"));
    }

    #[test]
    fn test_dispose_all_disposes_each_provider_once() {
        let registry = ProviderRegistry::new();
        let disposals = Arc::new(AtomicUsize::new(0));

        for kind in ["google", "facebook"] {
            registry
                .register(Arc::new(CountingProvider {
                    kind,
                    disposals: Arc::clone(&disposals),
                }))
                .unwrap();
        }

        registry.dispose_all();
        registry.dispose_all();
        assert_eq!(disposals.load(Ordering::SeqCst), 2);
        assert!(registry.get("google").is_none());
    }
}
