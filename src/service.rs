use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::http::{
    endpoint_url, login_headers, refresh_headers, token_type_headers, HttpClient, LoginResponse,
    LOGIN_PATH, LOGOUT_PATH, REFRESH_PATH,
};
use crate::observable::Observable;
use crate::providers::{OauthProvider, ProviderRegistry};
use crate::storage::TokenPersist;
use crate::store::TokenStore;
use crate::token::Token;
use crate::users::{User, UserLoader};

/// Authentication state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    /// Initial state, and re-entered while a login or refresh is in flight
    Pending,
    /// The access token is currently valid
    Authenticated,
    /// No usable token pair
    Unauthenticated,
}

/// Contract the service exposes to its hosting context. The host holds one
/// coordinator reference explicitly; there is no ambient registration.
#[async_trait]
pub trait AuthenticationService: Send + Sync {
    /// Probe whether the session is still authenticated, refreshing the
    /// access token when possible. True iff a refresh round-trip was made.
    async fn check_for_update(&self) -> bool;
    /// Authenticate with credentials. True on success.
    async fn login(&self, username: &str, password: &str) -> bool;
    /// End the session locally and best-effort notify the server. Always
    /// true.
    async fn logout(&self) -> bool;
    /// Current authentication state.
    fn state(&self) -> LoginState;
    /// Currently resolved user, `User::visitor()` while unauthenticated.
    fn current_user(&self) -> User;
}

/// Session-state coordinator over a JWT pair.
///
/// Owns the token store and the observable state/user values, and drives
/// every lifecycle transition: login, logout, refresh, and the periodic
/// validity probe. Expected failures resolve to `false`, never to an error.
///
/// Overlapping `check_for_update` calls are not deduplicated: two flows may
/// both observe a stale access token and both issue refresh requests. Each
/// call is independently consistent; callers wanting a single round-trip
/// must serialize.
pub struct JwtService {
    site: String,
    http: Arc<dyn HttpClient>,
    user_loader: Arc<dyn UserLoader>,
    store: TokenStore,
    state: Observable<LoginState>,
    current_user: Observable<User>,
    providers: ProviderRegistry,
    disposed: AtomicBool,
}

impl JwtService {
    /// Create a service for `site`, restoring any persisted tokens. Call
    /// [`JwtService::initialize`] afterwards to run the initial validity
    /// check.
    pub fn new(
        site: &str,
        http: Arc<dyn HttpClient>,
        user_loader: Arc<dyn UserLoader>,
        persist: TokenPersist,
    ) -> Self {
        let store = TokenStore::new(site, persist);
        Self::with_store(site, http, user_loader, store)
    }

    /// Create a service over an explicit token store.
    pub fn with_store(
        site: &str,
        http: Arc<dyn HttpClient>,
        user_loader: Arc<dyn UserLoader>,
        store: TokenStore,
    ) -> Self {
        Self {
            site: site.to_string(),
            http,
            user_loader,
            store,
            state: Observable::new(LoginState::Pending),
            current_user: Observable::new(User::visitor()),
            providers: ProviderRegistry::new(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Run the initial validity check. Returns the `check_for_update`
    /// result.
    pub async fn initialize(&self) -> bool {
        info!(site = %self.site, "Initializing jwt service");
        self.check_for_update().await
    }

    /// The token store backing this service.
    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    /// Observable authentication state; single-writer, notified after the
    /// corresponding token change is persisted.
    pub fn state_observable(&self) -> &Observable<LoginState> {
        &self.state
    }

    /// Observable current user.
    pub fn user_observable(&self) -> &Observable<User> {
        &self.current_user
    }

    /// Register an external oauth provider. Fails on a duplicate kind or
    /// after dispose.
    pub fn register_oauth_provider(
        &self,
        provider: Arc<dyn OauthProvider>,
    ) -> Result<(), AuthError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(AuthError::Disposed);
        }
        self.providers.register(provider)
    }

    /// Look up a registered provider by kind tag.
    pub fn oauth_provider(&self, kind: &str) -> Option<Arc<dyn OauthProvider>> {
        self.providers.get(kind)
    }

    /// Probe the session state, refreshing when the access token lapsed but
    /// the refresh token is still usable. True iff a refresh round-trip was
    /// attempted.
    pub async fn check_for_update(&self) -> bool {
        if self.store.access_token().is_valid() {
            self.set_state(LoginState::Authenticated).await;
            return false;
        }
        let refresh = self.store.refresh_token();
        if !refresh.is_valid() {
            self.set_state(LoginState::Unauthenticated).await;
            return false;
        }
        self.set_state(LoginState::Pending).await;
        refresh.await_not_before().await;
        self.exec_token_refresh(&refresh).await
    }

    /// One refresh round-trip, no retries. Always reports "attempted".
    async fn exec_token_refresh(&self, refresh: &Token) -> bool {
        let url = endpoint_url(&self.site, REFRESH_PATH);
        debug!(site = %self.site, "Refreshing access token");

        let outcome = self
            .http
            .post(&url, Some(refresh_headers(&refresh.to_string())), None)
            .await;

        match outcome {
            Ok(response) if response.is_success() => {
                match response.json::<LoginResponse>() {
                    Ok(body) => {
                        let access = Token::from_head_and_payload(&body.access)
                            .unwrap_or_else(|e| {
                                debug!(error = %e, "Refresh returned a malformed access token");
                                Token::empty()
                            });
                        let valid = access.is_valid();
                        self.store.set_access_token(access);
                        if valid {
                            self.set_state(LoginState::Authenticated).await;
                        } else {
                            self.set_state(LoginState::Unauthenticated).await;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Refresh response body was not decodable");
                        self.store.set_access_token(Token::empty());
                        self.set_state(LoginState::Unauthenticated).await;
                    }
                }
            }
            Ok(response) => {
                debug!(status = response.status, "Refresh rejected by server");
                self.store.set_access_token(Token::empty());
                self.set_state(LoginState::Unauthenticated).await;
            }
            Err(e) => {
                warn!(error = %e, "Refresh request failed");
                self.store.set_access_token(Token::empty());
                self.set_state(LoginState::Unauthenticated).await;
            }
        }
        true
    }

    /// Authenticate with credentials against the login endpoint. The
    /// credential pair travels only in the request header and is never
    /// logged.
    pub async fn login(&self, username: &str, password: &str) -> bool {
        self.set_state(LoginState::Pending).await;
        let url = endpoint_url(&self.site, LOGIN_PATH);

        let outcome = self
            .http
            .post(&url, Some(login_headers(username, password)), None)
            .await;

        match outcome {
            Ok(response) if response.is_success() => match response.json::<LoginResponse>() {
                Ok(body) => self.handle_authentication_response(&body).await,
                Err(e) => {
                    warn!(error = %e, "Login response body was not decodable");
                    self.set_state(LoginState::Unauthenticated).await;
                    false
                }
            },
            Ok(response) => {
                debug!(status = response.status, "Login rejected by server");
                self.set_state(LoginState::Unauthenticated).await;
                false
            }
            Err(e) => {
                warn!(error = %e, "Login request failed");
                self.set_state(LoginState::Unauthenticated).await;
                false
            }
        }
    }

    /// Install a token pair received from the wire (login response, or a
    /// provider's out-of-band result). True iff the new access token is
    /// valid.
    pub async fn handle_authentication_response(&self, response: &LoginResponse) -> bool {
        let access = Token::from_head_and_payload(&response.access).unwrap_or_else(|e| {
            debug!(error = %e, "Received a malformed access token");
            Token::empty()
        });
        let refresh = Token::from_head_and_payload(&response.refresh).unwrap_or_else(|e| {
            debug!(error = %e, "Received a malformed refresh token");
            Token::empty()
        });

        let valid = access.is_valid();
        self.store.set_access_token(access);
        self.store.set_refresh_token(refresh);

        if valid {
            self.set_state(LoginState::Authenticated).await;
        } else {
            self.set_state(LoginState::Unauthenticated).await;
        }
        valid
    }

    /// End the session: clear both tokens, flip to unauthenticated, then
    /// best-effort notify the logout endpoint. Logout never fails locally.
    pub async fn logout(&self) -> bool {
        self.set_state(LoginState::Unauthenticated).await;

        let url = endpoint_url(&self.site, LOGOUT_PATH);
        if let Err(e) = self.http.post(&url, Some(token_type_headers()), None).await {
            debug!(error = %e, "Logout notification failed, session is already closed locally");
        }
        true
    }

    /// Release the observables and dispose every registered provider. Safe
    /// to call once; later lifecycle calls are undefined except
    /// [`JwtService::register_oauth_provider`], which reports
    /// [`AuthError::Disposed`].
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(site = %self.site, "Disposing jwt service");
        self.state.dispose();
        self.current_user.dispose();
        self.providers.dispose_all();
    }

    /// Commit a state transition: entering `Unauthenticated` clears both
    /// tokens first, so the persisted store is consistent before observers
    /// are notified; the current user is then re-derived.
    async fn set_state(&self, next: LoginState) {
        if next == LoginState::Unauthenticated {
            self.store.clear();
        }
        self.state.set_value(next);
        self.update_user(next).await;
    }

    /// Re-derive the current user from the new state. Unauthenticated
    /// resets to the visitor; Authenticated resolves the token's subject
    /// through the identity-lookup collaborator unless it is unchanged;
    /// Pending leaves the user untouched.
    async fn update_user(&self, state: LoginState) {
        match state {
            LoginState::Unauthenticated => self.current_user.set_value(User::visitor()),
            LoginState::Authenticated => {
                let username = self.store.access_token().username().to_string();
                if username == self.current_user.get().identity() {
                    return;
                }
                let Some((domain, login_name)) = User::parse_identity(&username) else {
                    warn!("Access token carries an unparsable subject identity");
                    return;
                };
                match self.user_loader.load(domain, login_name).await {
                    Ok(users) => match users.into_iter().next() {
                        Some(user) => self.current_user.set_value(user),
                        None => warn!(
                            domain = domain,
                            login_name = login_name,
                            "Identity lookup returned no match"
                        ),
                    },
                    Err(e) => warn!(error = %e, "Identity lookup failed"),
                }
            }
            LoginState::Pending => {}
        }
    }
}

#[async_trait]
impl AuthenticationService for JwtService {
    async fn check_for_update(&self) -> bool {
        JwtService::check_for_update(self).await
    }

    async fn login(&self, username: &str, password: &str) -> bool {
        JwtService::login(self, username, password).await
    }

    async fn logout(&self) -> bool {
        JwtService::logout(self).await
    }

    fn state(&self) -> LoginState {
        self.state.get()
    }

    fn current_user(&self) -> User {
        self.current_user.get()
    }
}
