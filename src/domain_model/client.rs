use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        ClientId(s.to_owned())
    }
}

/// A registered API client. Only `is_active` may change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub client_id: ClientId,
    pub name: String,
    pub email: String,
    pub is_active: bool,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Primary and secondary secret of a client. Either one is accepted at login,
/// so the secondary can be handed out before the primary is retired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretPair {
    pub secret: String,
    pub secondary_secret: String,
}

impl SecretPair {
    pub fn matches(&self, presented: &str) -> bool {
        self.secret == presented || self.secondary_secret == presented
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientWithSecrets {
    pub client: Client,
    pub secrets: SecretPair,
}
