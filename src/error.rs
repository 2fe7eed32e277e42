use thiserror::Error;

/// Error taxonomy for the authentication client.
///
/// Expected failure modes of the lifecycle operations (bad credentials,
/// expired session, unreachable endpoint) never surface here; those resolve
/// to a boolean result on the service. This type covers malformed wire data
/// and programmer errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// An encoded token string could not be decoded into claims
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// Persistent storage backend failure detail
    #[error("token storage error: {0}")]
    Storage(String),

    /// A provider of this kind is already registered
    #[error("an oauth provider of kind '{kind}' is already registered")]
    DuplicateProvider { kind: String },

    /// The service has been disposed and no longer accepts calls
    #[error("authentication service has been disposed")]
    Disposed,
}
