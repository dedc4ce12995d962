//! Merging project defaults with environment overrides.
//!
//! For every variable the environment's override wins over the project
//! default whenever it exists, even when it is an empty string.

use std::collections::BTreeMap;
use std::fmt;

use rusqlite::OptionalExtension;
use serde::Serialize;

use crate::crypto::{self, MasterKey};
use crate::errors::{Result, VaultError};
use crate::store::{Database, VariableDefinition, VariableValue};

/// Marker shown in place of a value that could not be decrypted.
pub const DECRYPTION_FAILED_MARKER: &str = "<<DECRYPTION FAILED>>";

/// The outcome for one variable in a batch resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedValue {
    Plain(String),
    /// Neither an override nor a default exists.
    Missing,
    DecryptionFailed,
}

impl ResolvedValue {
    pub fn as_plain(&self) -> Option<&str> {
        match self {
            Self::Plain(value) => Some(value),
            Self::Missing | Self::DecryptionFailed => None,
        }
    }
}

impl fmt::Display for ResolvedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(value) => f.write_str(value),
            Self::Missing => Ok(()),
            Self::DecryptionFailed => f.write_str(DECRYPTION_FAILED_MARKER),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVariable {
    pub value: ResolvedValue,
    pub is_overridden: bool,
    pub is_secret: bool,
}

/// Metadata-only view of a variable; never carries a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableMetadata {
    pub key: String,
    pub has_value: bool,
    pub is_secret: bool,
}

#[derive(Clone)]
pub struct VariableResolver {
    db: Database,
}

impl VariableResolver {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Resolve a single variable.  `Ok(None)` means it has no value.
    ///
    /// Unlike the batch variants, a value that fails to decrypt is an error.
    pub fn resolve(
        &self,
        project_id: &str,
        environment_id: &str,
        key: &str,
        master_key: &MasterKey,
    ) -> Result<Option<String>> {
        self.db.find_environment(project_id, environment_id)?;
        let definition = self.db.find_definition(project_id, key)?;
        let overridden = self.db.find_value(environment_id, &definition.id)?;

        let ciphertext = match overridden {
            Some(value) => Some(value.value),
            None => definition.default_value,
        };
        ciphertext
            .map(|c| crypto::decrypt(&c, master_key.as_bytes()))
            .transpose()
    }

    /// Resolve every variable of the project (or just `key_filter`).
    ///
    /// A value that fails to decrypt is reported as `DecryptionFailed`
    /// and does not stop the others from resolving.
    pub fn resolve_all(
        &self,
        project_id: &str,
        environment_id: &str,
        key_filter: Option<&str>,
        master_key: &MasterKey,
    ) -> Result<BTreeMap<String, ResolvedVariable>> {
        let (definitions, overrides) = self.load(project_id, environment_id)?;

        let mut resolved = BTreeMap::new();
        for definition in definitions {
            if key_filter.is_some_and(|k| k != definition.key) {
                continue;
            }

            let overridden = overrides.get(definition.id.as_str());
            let ciphertext = overridden
                .map(|v| v.value.as_str())
                .or(definition.default_value.as_deref());

            let value = match ciphertext {
                None => ResolvedValue::Missing,
                Some(c) => match crypto::decrypt(c, master_key.as_bytes()) {
                    Ok(plain) => ResolvedValue::Plain(plain),
                    Err(e) => {
                        tracing::warn!(key = %definition.key, error = %e, "Failed to decrypt value");
                        ResolvedValue::DecryptionFailed
                    }
                },
            };

            resolved.insert(
                definition.key,
                ResolvedVariable {
                    value,
                    is_overridden: overridden.is_some(),
                    is_secret: definition.is_secret,
                },
            );
        }
        Ok(resolved)
    }

    /// `KEY -> value` for every variable that has a readable value.
    ///
    /// Variables without a value, or whose value fails to decrypt, are left out.
    pub fn decrypted_map(
        &self,
        project_id: &str,
        environment_id: &str,
        master_key: &MasterKey,
    ) -> Result<BTreeMap<String, String>> {
        Ok(self
            .resolve_all(project_id, environment_id, None, master_key)?
            .into_iter()
            .filter_map(|(key, var)| match var.value {
                ResolvedValue::Plain(value) => Some((key, value)),
                ResolvedValue::Missing | ResolvedValue::DecryptionFailed => None,
            })
            .collect())
    }

    /// Which variables exist and whether they have a value, without decrypting.
    pub fn describe(&self, project_id: &str, environment_id: &str) -> Result<Vec<VariableMetadata>> {
        let (definitions, overrides) = self.load(project_id, environment_id)?;
        Ok(definitions
            .into_iter()
            .map(|d| VariableMetadata {
                // A default counts too, not just an override for this environment.
                has_value: overrides.contains_key(d.id.as_str()) || d.default_value.is_some(),
                is_secret: d.is_secret,
                key: d.key,
            })
            .collect())
    }

    /// Encrypt and store a project-wide default.
    ///
    /// An empty or absent default clears the default.
    pub fn store_default(
        &self,
        project_id: &str,
        key: &str,
        description: Option<&str>,
        default_value: Option<&str>,
        is_secret: bool,
        master_key: &MasterKey,
    ) -> Result<VariableDefinition> {
        let ciphertext = match default_value {
            Some(plain) if !plain.is_empty() => Some(crypto::encrypt(plain, master_key.as_bytes())?),
            _ => None,
        };
        self.db
            .upsert_definition(project_id, key, description, ciphertext.as_deref(), is_secret)
    }

    /// Encrypt and store an environment override.
    pub fn store_override(
        &self,
        environment_id: &str,
        definition_id: &str,
        plaintext: &str,
        master_key: &MasterKey,
    ) -> Result<VariableValue> {
        let same_project: Option<bool> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT e.project_id = d.project_id
                 FROM environments e, variable_definitions d
                 WHERE e.id = ?1 AND d.id = ?2",
                [environment_id, definition_id],
                |row| row.get(0),
            )
            .optional()
        })?;
        match same_project {
            None => {
                return Err(VaultError::Validation(
                    "unknown environment or variable".into(),
                ))
            }
            Some(false) => {
                return Err(VaultError::Validation(
                    "environment and variable belong to different projects".into(),
                ))
            }
            Some(true) => {}
        }

        let ciphertext = crypto::encrypt(plaintext, master_key.as_bytes())?;
        self.db.upsert_value(environment_id, definition_id, &ciphertext)
    }

    fn load(
        &self,
        project_id: &str,
        environment_id: &str,
    ) -> Result<(Vec<VariableDefinition>, BTreeMap<String, VariableValue>)> {
        self.db.find_environment(project_id, environment_id)?;
        let definitions = self.db.list_definitions(project_id)?;
        let overrides = self
            .db
            .list_values(environment_id)?
            .into_iter()
            .map(|v| (v.definition_id.clone(), v))
            .collect();
        Ok((definitions, overrides))
    }
}
