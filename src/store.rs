use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::storage::{storage_for, TokenPersist, TokenStorage};
use crate::token::Token;

/// Default key template; `{0}` is the site identifier, `{1}` the token name.
pub const DEFAULT_KEY_TEMPLATE: &str = "sn-{0}-{1}";

const ACCESS_TOKEN_NAME: &str = "access";
const REFRESH_TOKEN_NAME: &str = "refresh";

/// Holds the live access/refresh token pair for one site and mirrors every
/// change into the selected storage backend.
///
/// Each slot always holds a parsed `Token` or the empty sentinel, never an
/// absent value. Setting a slot persists synchronously, so a state-change
/// notification fired after a set always observes the committed value.
pub struct TokenStore {
    site: String,
    key_template: String,
    storage: Box<dyn TokenStorage>,
    access: Mutex<Token>,
    refresh: Mutex<Token>,
}

impl TokenStore {
    /// Create a store for `site`, selecting the backend from `persist`, and
    /// restore both tokens from storage.
    pub fn new(site: &str, persist: TokenPersist) -> Self {
        let store_path =
            std::env::temp_dir().join(format!("sn-tokens-{}.json", sanitize_site(site)));
        Self::with_storage(site, DEFAULT_KEY_TEMPLATE, storage_for(persist, store_path))
    }

    /// Create a store over an explicit backend and key template.
    pub fn with_storage(
        site: &str,
        key_template: &str,
        storage: Box<dyn TokenStorage>,
    ) -> Self {
        let store = Self {
            site: site.to_string(),
            key_template: key_template.to_string(),
            storage,
            access: Mutex::new(Token::empty()),
            refresh: Mutex::new(Token::empty()),
        };
        *store.lock(&store.access) = store.restore(ACCESS_TOKEN_NAME);
        *store.lock(&store.refresh) = store.restore(REFRESH_TOKEN_NAME);
        store
    }

    /// The last known access token.
    pub fn access_token(&self) -> Token {
        self.lock(&self.access).clone()
    }

    /// The last known refresh token.
    pub fn refresh_token(&self) -> Token {
        self.lock(&self.refresh).clone()
    }

    /// Replace the access token and persist it.
    pub fn set_access_token(&self, token: Token) {
        self.persist(ACCESS_TOKEN_NAME, &token);
        *self.lock(&self.access) = token;
    }

    /// Replace the refresh token and persist it.
    pub fn set_refresh_token(&self, token: Token) {
        self.persist(REFRESH_TOKEN_NAME, &token);
        *self.lock(&self.refresh) = token;
    }

    /// Clear both slots to the empty sentinel, persisting the removal.
    pub fn clear(&self) {
        self.set_access_token(Token::empty());
        self.set_refresh_token(Token::empty());
    }

    fn storage_key(&self, token_name: &str) -> String {
        self.key_template
            .replace("{0}", sanitize_site(&self.site).as_str())
            .replace("{1}", token_name)
    }

    fn restore(&self, token_name: &str) -> Token {
        let key = self.storage_key(token_name);
        let stored = match self.storage.get(&key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Token restore failed, using empty token");
                return Token::empty();
            }
        };
        match stored.filter(|raw| !raw.is_empty()) {
            Some(raw) => Token::from_head_and_payload(&raw).unwrap_or_else(|e| {
                debug!(key = %key, error = %e, "Stored token is corrupt, using empty token");
                Token::empty()
            }),
            None => Token::empty(),
        }
    }

    fn persist(&self, token_name: &str, token: &Token) {
        let key = self.storage_key(token_name);
        let result = if token.is_empty() {
            // An explicit removal, never a stale value left behind
            self.storage.remove(&key)
        } else {
            self.storage
                .set(&key, &token.to_string(), Some(token.expires_in_secs()))
        };
        if let Err(e) = result {
            warn!(key = %key, error = %e, "Token persistence failed, value kept in memory");
        }
    }

    fn lock<'a>(&self, slot: &'a Mutex<Token>) -> MutexGuard<'a, Token> {
        slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Reduce a site URL to a storage-key-friendly identifier.
fn sanitize_site(site: &str) -> String {
    site.trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .replace(['/', ':'], "-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::storage::SessionStorage;
    use crate::test_support::encode_token;
    use std::sync::Arc;

    /// Backend shared between two store instances, standing in for storage
    /// that outlives the in-memory object.
    struct SharedStorage(Arc<SessionStorage>);

    impl TokenStorage for SharedStorage {
        fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
            self.0.get(key)
        }
        fn set(&self, key: &str, value: &str, ttl_hint: Option<i64>) -> Result<(), AuthError> {
            self.0.set(key, value, ttl_hint)
        }
        fn remove(&self, key: &str) -> Result<(), AuthError> {
            self.0.remove(key)
        }
    }

    fn store_pair() -> (Arc<SessionStorage>, TokenStore) {
        let backend = Arc::new(SessionStorage::new());
        let store = TokenStore::with_storage(
            "https://demo.example.com",
            DEFAULT_KEY_TEMPLATE,
            Box::new(SharedStorage(Arc::clone(&backend))),
        );
        (backend, store)
    }

    #[test]
    fn test_new_store_holds_empty_sentinels() {
        let (_, store) = store_pair();
        assert!(store.access_token().is_empty());
        assert!(store.refresh_token().is_empty());
    }

    #[test]
    fn test_set_persists_under_site_key() {
        let (backend, store) = store_pair();
        let encoded = encode_token("BuiltIn\\Admin", -10, -10, 600);
        store.set_access_token(Token::from_head_and_payload(&encoded).unwrap());

        assert_eq!(
            backend.get("sn-demo.example.com-access").unwrap().as_deref(),
            Some(encoded.as_str())
        );
    }

    #[test]
    fn test_setting_empty_removes_persisted_value() {
        let (backend, store) = store_pair();
        let encoded = encode_token("BuiltIn\\Admin", -10, -10, 600);
        store.set_refresh_token(Token::from_head_and_payload(&encoded).unwrap());
        assert!(backend.get("sn-demo.example.com-refresh").unwrap().is_some());

        store.set_refresh_token(Token::empty());
        assert_eq!(backend.get("sn-demo.example.com-refresh").unwrap(), None);
    }

    #[test]
    fn test_restores_tokens_on_construction() {
        let backend = Arc::new(SessionStorage::new());
        let encoded = encode_token("BuiltIn\\Admin", -10, -10, 600);
        {
            let store = TokenStore::with_storage(
                "https://demo.example.com",
                DEFAULT_KEY_TEMPLATE,
                Box::new(SharedStorage(Arc::clone(&backend))),
            );
            store.set_access_token(Token::from_head_and_payload(&encoded).unwrap());
        }

        let restored = TokenStore::with_storage(
            "https://demo.example.com",
            DEFAULT_KEY_TEMPLATE,
            Box::new(SharedStorage(Arc::clone(&backend))),
        );
        assert_eq!(restored.access_token().to_string(), encoded);
        assert!(restored.refresh_token().is_empty());
    }

    #[test]
    fn test_corrupt_stored_token_restores_as_empty() {
        let backend = Arc::new(SessionStorage::new());
        backend
            .set("sn-demo.example.com-access", "definitely-not-a-token", None)
            .unwrap();

        let store = TokenStore::with_storage(
            "https://demo.example.com",
            DEFAULT_KEY_TEMPLATE,
            Box::new(SharedStorage(backend)),
        );
        assert!(store.access_token().is_empty());
    }

    #[test]
    fn test_clear_empties_both_slots() {
        let (backend, store) = store_pair();
        let encoded = encode_token("BuiltIn\\Admin", -10, -10, 600);
        store.set_access_token(Token::from_head_and_payload(&encoded).unwrap());
        store.set_refresh_token(Token::from_head_and_payload(&encoded).unwrap());

        store.clear();
        assert!(store.access_token().is_empty());
        assert!(store.refresh_token().is_empty());
        assert_eq!(backend.get("sn-demo.example.com-access").unwrap(), None);
        assert_eq!(backend.get("sn-demo.example.com-refresh").unwrap(), None);
    }
}
