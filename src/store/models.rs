//! Entity types stored in the vault database.
//!
//! Types that cross the RPC boundary serialize with camelCase field names
//! to match the wire protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The singleton credential row (`id = 'config'`).
#[derive(Debug, Clone)]
pub struct SystemCredential {
    /// Hex SHA-256 of the master password.
    pub password_hash: String,
    /// Hex salt for the working-key KDF. `None` on legacy rows.
    pub key_salt: Option<String>,
    pub kdf_iterations: u32,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl SystemCredential {
    pub fn profile(&self) -> Profile {
        Profile {
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Optional profile fields returned after a successful verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Access token metadata.  Never carries the raw token or its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// A token whose expiry is at or before `now` is expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub organization_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub slug: String,
}

impl Environment {
    pub fn summary(&self) -> EnvironmentSummary {
        EnvironmentSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            slug: self.slug.clone(),
        }
    }
}

/// Environment as reported over RPC: `{id, name, slug}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSummary {
    pub id: String,
    pub name: String,
    pub slug: String,
}

/// Project as reported by `list_projects`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub organization: Option<String>,
    pub environments: Vec<EnvironmentSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDefinition {
    pub id: String,
    pub project_id: String,
    pub key: String,
    pub description: Option<String>,
    /// Ciphertext (`iv:tag:cipher`) or `None`.
    pub default_value: Option<String>,
    pub is_secret: bool,
}

/// An environment's override of a definition's default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableValue {
    pub id: String,
    pub environment_id: String,
    pub definition_id: String,
    /// Ciphertext (`iv:tag:cipher`).
    pub value: String,
}
