use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A resolved user identity: the domain and login name the token's subject
/// claim refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identity domain, e.g. `BuiltIn`
    pub domain: String,
    /// Login name within the domain
    pub login_name: String,
}

impl User {
    pub fn new(domain: &str, login_name: &str) -> Self {
        Self {
            domain: domain.to_string(),
            login_name: login_name.to_string(),
        }
    }

    /// The anonymous sentinel used while nobody is logged in.
    pub fn visitor() -> Self {
        Self::new("BuiltIn", "Visitor")
    }

    /// Identity string in the `Domain\LoginName` form carried by token
    /// subject claims.
    pub fn identity(&self) -> String {
        format!("{}\\{}", self.domain, self.login_name)
    }

    /// Split a `Domain\LoginName` identity string into its parts.
    pub fn parse_identity(identity: &str) -> Option<(&str, &str)> {
        identity
            .split_once('\\')
            .filter(|(domain, login)| !domain.is_empty() && !login.is_empty())
    }
}

/// Identity-lookup collaborator: resolves full user records matching a
/// domain and login name. The service takes the first match.
#[async_trait]
pub trait UserLoader: Send + Sync {
    async fn load(&self, domain: &str, login_name: &str) -> Result<Vec<User>>;
}
