//! Client-side lifecycle management for a JWT access/refresh token pair.
//!
//! The crate decodes and tracks tokens (never verifying signatures, that is
//! the server's concern), persists them per site through a pluggable storage
//! backend, and runs the session-state machine deciding when to trust,
//! refresh, or discard the pair. Network transport and identity lookup stay
//! behind seams ([`HttpClient`], [`users::UserLoader`]) supplied by the
//! hosting application.

// Export modules
pub mod error;
pub mod http;
pub mod observable;
pub mod providers;
pub mod service;
pub mod storage;
pub mod store;
pub mod token;
pub mod users;

#[cfg(test)]
mod test_support;
#[cfg(test)]
mod tests;

pub use error::AuthError;
pub use http::{HttpClient, HttpResponse, LoginResponse, ReqwestHttpClient};
pub use observable::Observable;
pub use providers::OauthProvider;
pub use service::{AuthenticationService, JwtService, LoginState};
pub use storage::{TokenPersist, TokenStorage};
pub use store::TokenStore;
pub use token::Token;
pub use users::{User, UserLoader};
