//! Project, environment and variable repositories.
//!
//! These are the thin CRUD operations the vault host uses to populate the
//! store.  Values passed in and out here are always ciphertext; encryption
//! happens one layer up in the resolver.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use super::models::{
    Environment, Organization, Project, ProjectSummary, VariableDefinition, VariableValue,
};
use super::Database;
use crate::errors::{Result, VaultError};

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Turn a display name into an environment slug: lowercase ASCII
/// alphanumerics separated by single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        organization_id: row.get(2)?,
    })
}

fn environment_from_row(row: &Row<'_>) -> rusqlite::Result<Environment> {
    Ok(Environment {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        slug: row.get(3)?,
    })
}

fn definition_from_row(row: &Row<'_>) -> rusqlite::Result<VariableDefinition> {
    Ok(VariableDefinition {
        id: row.get(0)?,
        project_id: row.get(1)?,
        key: row.get(2)?,
        description: row.get(3)?,
        default_value: row.get(4)?,
        is_secret: row.get(5)?,
    })
}

fn value_from_row(row: &Row<'_>) -> rusqlite::Result<VariableValue> {
    Ok(VariableValue {
        id: row.get(0)?,
        environment_id: row.get(1)?,
        definition_id: row.get(2)?,
        value: row.get(3)?,
    })
}

const PROJECT_COLUMNS: &str = "id, name, organization_id";
const ENVIRONMENT_COLUMNS: &str = "id, project_id, name, slug";
const DEFINITION_COLUMNS: &str = "id, project_id, key, description, default_value, is_secret";
const VALUE_COLUMNS: &str = "id, environment_id, definition_id, value";

impl Database {
    // --- Organizations ---

    /// Return the organization called `name`, creating it if needed.
    pub fn ensure_organization(&self, name: &str) -> Result<Organization> {
        let name = name.trim();
        if name.is_empty() {
            return Err(VaultError::Validation(
                "organization name must not be empty".into(),
            ));
        }
        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO organizations (id, name, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (name) DO NOTHING",
                params![new_id(), name, Utc::now()],
            )?;
            conn.query_row(
                "SELECT id FROM organizations WHERE name = ?1",
                [name],
                |row| row.get::<_, String>(0),
            )
        })?;
        Ok(Organization {
            id,
            name: name.to_string(),
        })
    }

    // --- Projects ---

    pub fn create_project(&self, name: &str, organization_id: Option<&str>) -> Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(VaultError::Validation("project name must not be empty".into()));
        }
        if self.find_project_by_name(name)?.is_some() {
            return Err(VaultError::Validation(format!(
                "a project named \"{name}\" already exists"
            )));
        }

        let project = Project {
            id: new_id(),
            name: name.to_string(),
            organization_id: organization_id.map(str::to_string),
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO projects (id, name, organization_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![project.id, project.name, project.organization_id, Utc::now()],
            )
        })?;
        tracing::debug!(project = %project.name, "Created project");
        Ok(project)
    }

    /// All projects, sorted by name.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY name COLLATE NOCASE"
            ))?;
            let rows = stmt.query_map([], project_from_row)?;
            rows.collect()
        })
    }

    /// Projects with their organization name and environments, as reported
    /// by the `list_projects` RPC.
    pub fn project_summaries(&self) -> Result<Vec<ProjectSummary>> {
        self.with_conn(|conn| {
            let mut projects = conn.prepare(
                "SELECT p.id, p.name, o.name
                 FROM projects p LEFT JOIN organizations o ON o.id = p.organization_id
                 ORDER BY p.name COLLATE NOCASE",
            )?;
            let mut environments = conn.prepare(&format!(
                "SELECT {ENVIRONMENT_COLUMNS} FROM environments
                 WHERE project_id = ?1 ORDER BY created_at, slug"
            ))?;

            let rows = projects.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?;

            let mut summaries = Vec::new();
            for row in rows {
                let (id, name, organization) = row?;
                let envs = environments
                    .query_map([&id], environment_from_row)?
                    .map(|env| env.map(|e| e.summary()))
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                summaries.push(ProjectSummary {
                    id,
                    name,
                    organization,
                    environments: envs,
                });
            }
            Ok(summaries)
        })
    }

    pub fn find_project(&self, id: &str) -> Result<Project> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
                [id],
                project_from_row,
            )
            .optional()
        })?
        .ok_or_else(|| VaultError::ProjectNotFound(id.to_string()))
    }

    /// Case-insensitive lookup by display name.
    pub fn find_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {PROJECT_COLUMNS} FROM projects
                     WHERE name = ?1 COLLATE NOCASE ORDER BY created_at LIMIT 1"
                ),
                [name.trim()],
                project_from_row,
            )
            .optional()
        })
    }

    /// Delete a project together with its environments and variables.
    pub fn delete_project(&self, id: &str) -> Result<()> {
        let deleted =
            self.with_conn(|conn| conn.execute("DELETE FROM projects WHERE id = ?1", [id]))?;
        if deleted == 0 {
            return Err(VaultError::ProjectNotFound(id.to_string()));
        }
        Ok(())
    }

    // --- Environments ---

    /// Create an environment.  The slug defaults to `slugify(name)`.
    pub fn create_environment(
        &self,
        project_id: &str,
        name: &str,
        slug: Option<&str>,
    ) -> Result<Environment> {
        let name = name.trim();
        let slug = slugify(slug.unwrap_or(name));
        if name.is_empty() || slug.is_empty() {
            return Err(VaultError::Validation(
                "environment name must contain at least one letter or digit".into(),
            ));
        }

        // Surfaces ProjectNotFound rather than a foreign key error.
        self.find_project(project_id)?;
        if self.find_environment_by_slug(project_id, &slug)?.is_some() {
            return Err(VaultError::Validation(format!(
                "environment \"{slug}\" already exists in this project"
            )));
        }

        let env = Environment {
            id: new_id(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            slug,
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO environments (id, project_id, name, slug, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![env.id, env.project_id, env.name, env.slug, Utc::now()],
            )
        })?;
        Ok(env)
    }

    pub fn list_environments(&self, project_id: &str) -> Result<Vec<Environment>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENVIRONMENT_COLUMNS} FROM environments
                 WHERE project_id = ?1 ORDER BY created_at, slug"
            ))?;
            let rows = stmt.query_map([project_id], environment_from_row)?;
            rows.collect()
        })
    }

    /// Look up an environment by id, requiring it to belong to `project_id`.
    pub fn find_environment(&self, project_id: &str, environment_id: &str) -> Result<Environment> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {ENVIRONMENT_COLUMNS} FROM environments
                     WHERE id = ?1 AND project_id = ?2"
                ),
                [environment_id, project_id],
                environment_from_row,
            )
            .optional()
        })?
        .ok_or_else(|| VaultError::EnvironmentNotFound(environment_id.to_string()))
    }

    /// Case-insensitive lookup by slug within a project.
    pub fn find_environment_by_slug(
        &self,
        project_id: &str,
        slug: &str,
    ) -> Result<Option<Environment>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {ENVIRONMENT_COLUMNS} FROM environments
                     WHERE project_id = ?1 AND slug = ?2 COLLATE NOCASE"
                ),
                [project_id, slug.trim()],
                environment_from_row,
            )
            .optional()
        })
    }

    /// Delete an environment; its overrides go with it.
    pub fn delete_environment(&self, id: &str) -> Result<()> {
        let deleted =
            self.with_conn(|conn| conn.execute("DELETE FROM environments WHERE id = ?1", [id]))?;
        if deleted == 0 {
            return Err(VaultError::EnvironmentNotFound(id.to_string()));
        }
        Ok(())
    }

    // --- Variable definitions ---

    /// All definitions of a project, sorted by key.
    pub fn list_definitions(&self, project_id: &str) -> Result<Vec<VariableDefinition>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DEFINITION_COLUMNS} FROM variable_definitions
                 WHERE project_id = ?1 ORDER BY key"
            ))?;
            let rows = stmt.query_map([project_id], definition_from_row)?;
            rows.collect()
        })
    }

    pub fn find_definition(&self, project_id: &str, key: &str) -> Result<VariableDefinition> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {DEFINITION_COLUMNS} FROM variable_definitions
                     WHERE project_id = ?1 AND key = ?2"
                ),
                [project_id, key],
                definition_from_row,
            )
            .optional()
        })?
        .ok_or_else(|| VaultError::VariableNotFound(key.to_string()))
    }

    /// Insert or update the definition keyed by `(project_id, key)`.
    ///
    /// `default_value` must already be ciphertext.
    pub fn upsert_definition(
        &self,
        project_id: &str,
        key: &str,
        description: Option<&str>,
        default_value: Option<&str>,
        is_secret: bool,
    ) -> Result<VariableDefinition> {
        if key.is_empty() {
            return Err(VaultError::Validation("variable key must not be empty".into()));
        }
        self.find_project(project_id)?;

        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "INSERT INTO variable_definitions
                         (id, project_id, key, description, default_value, is_secret, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT (project_id, key) DO UPDATE SET
                         description = excluded.description,
                         default_value = excluded.default_value,
                         is_secret = excluded.is_secret,
                         updated_at = excluded.updated_at
                     RETURNING {DEFINITION_COLUMNS}"
                ),
                params![
                    new_id(),
                    project_id,
                    key,
                    description,
                    default_value,
                    is_secret,
                    Utc::now()
                ],
                definition_from_row,
            )
        })
    }

    /// Delete a definition; overrides of it in every environment go with it.
    pub fn delete_definition(&self, project_id: &str, key: &str) -> Result<()> {
        let deleted = self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM variable_definitions WHERE project_id = ?1 AND key = ?2",
                [project_id, key],
            )
        })?;
        if deleted == 0 {
            return Err(VaultError::VariableNotFound(key.to_string()));
        }
        Ok(())
    }

    // --- Variable values (overrides) ---

    pub fn list_values(&self, environment_id: &str) -> Result<Vec<VariableValue>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {VALUE_COLUMNS} FROM variable_values WHERE environment_id = ?1"
            ))?;
            let rows = stmt.query_map([environment_id], value_from_row)?;
            rows.collect()
        })
    }

    pub fn find_value(
        &self,
        environment_id: &str,
        definition_id: &str,
    ) -> Result<Option<VariableValue>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {VALUE_COLUMNS} FROM variable_values
                     WHERE environment_id = ?1 AND definition_id = ?2"
                ),
                [environment_id, definition_id],
                value_from_row,
            )
            .optional()
        })
    }

    /// Insert or update the override keyed by `(environment_id, definition_id)`.
    ///
    /// `value` must already be ciphertext.
    pub fn upsert_value(
        &self,
        environment_id: &str,
        definition_id: &str,
        value: &str,
    ) -> Result<VariableValue> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "INSERT INTO variable_values
                         (id, environment_id, definition_id, value, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (environment_id, definition_id) DO UPDATE SET
                         value = excluded.value,
                         updated_at = excluded.updated_at
                     RETURNING {VALUE_COLUMNS}"
                ),
                params![new_id(), environment_id, definition_id, value, Utc::now()],
                value_from_row,
            )
        })
    }

    /// Remove an override.  Returns `false` if there was none.
    pub fn delete_value(&self, environment_id: &str, definition_id: &str) -> Result<bool> {
        let deleted = self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM variable_values WHERE environment_id = ?1 AND definition_id = ?2",
                [environment_id, definition_id],
            )
        })?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (Database, Project, Environment) {
        let db = Database::open_in_memory().unwrap();
        let org = db.ensure_organization("Acme Corp").unwrap();
        let project = db.create_project("Acme", Some(&org.id)).unwrap();
        let env = db.create_environment(&project.id, "Production", Some("prod")).unwrap();
        (db, project, env)
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Production"), "production");
        assert_eq!(slugify("  Staging  EU / West "), "staging-eu-west");
        assert_eq!(slugify("--dev--"), "dev");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn ensure_organization_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let a = db.ensure_organization("Acme Corp").unwrap();
        let b = db.ensure_organization("Acme Corp").unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn summaries_include_organization_and_environments() {
        let (db, project, env) = seeded();
        db.create_project("Zeta", None).unwrap();

        let summaries = db.project_summaries().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, project.id);
        assert_eq!(summaries[0].organization.as_deref(), Some("Acme Corp"));
        assert_eq!(summaries[0].environments, vec![env.summary()]);
        assert_eq!(summaries[1].organization, None);
        assert!(summaries[1].environments.is_empty());
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let (db, project, env) = seeded();
        assert_eq!(db.find_project_by_name("acme").unwrap().unwrap().id, project.id);
        assert_eq!(
            db.find_environment_by_slug(&project.id, "PROD").unwrap().unwrap().id,
            env.id
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let (db, project, _) = seeded();
        assert!(matches!(
            db.create_project("ACME", None),
            Err(VaultError::Validation(_))
        ));
        assert!(matches!(
            db.create_environment(&project.id, "prod", None),
            Err(VaultError::Validation(_))
        ));
    }

    #[test]
    fn environment_must_belong_to_project() {
        let (db, _, env) = seeded();
        let other = db.create_project("Other", None).unwrap();
        assert!(matches!(
            db.find_environment(&other.id, &env.id),
            Err(VaultError::EnvironmentNotFound(_))
        ));
    }

    #[test]
    fn upsert_definition_updates_in_place() {
        let (db, project, _) = seeded();
        let first = db
            .upsert_definition(&project.id, "API_KEY", None, Some("a:b:c"), false)
            .unwrap();
        let second = db
            .upsert_definition(&project.id, "API_KEY", Some("the key"), None, true)
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.description.as_deref(), Some("the key"));
        assert_eq!(second.default_value, None);
        assert!(second.is_secret);
        assert_eq!(db.list_definitions(&project.id).unwrap().len(), 1);
    }

    #[test]
    fn upsert_value_keeps_one_row_per_pair() {
        let (db, project, env) = seeded();
        let def = db
            .upsert_definition(&project.id, "API_KEY", None, None, true)
            .unwrap();

        let a = db.upsert_value(&env.id, &def.id, "1:1:1").unwrap();
        let b = db.upsert_value(&env.id, &def.id, "2:2:2").unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(db.find_value(&env.id, &def.id).unwrap().unwrap().value, "2:2:2");

        assert!(db.delete_value(&env.id, &def.id).unwrap());
        assert!(!db.delete_value(&env.id, &def.id).unwrap());
    }

    #[test]
    fn deleting_environment_cascades_to_values() {
        let (db, project, env) = seeded();
        let def = db
            .upsert_definition(&project.id, "API_KEY", None, None, true)
            .unwrap();
        db.upsert_value(&env.id, &def.id, "1:1:1").unwrap();

        db.delete_environment(&env.id).unwrap();
        assert!(db.list_values(&env.id).unwrap().is_empty());
        assert_eq!(db.list_definitions(&project.id).unwrap().len(), 1);
    }

    #[test]
    fn deleting_project_cascades() {
        let (db, project, env) = seeded();
        db.upsert_definition(&project.id, "API_KEY", None, None, true)
            .unwrap();

        db.delete_project(&project.id).unwrap();
        assert!(db.list_definitions(&project.id).unwrap().is_empty());
        assert!(db.find_environment_by_slug(&project.id, &env.slug).unwrap().is_none());
        assert!(matches!(
            db.delete_project(&project.id),
            Err(VaultError::ProjectNotFound(_))
        ));
    }

    #[test]
    fn missing_definition_is_not_found() {
        let (db, project, _) = seeded();
        assert!(matches!(
            db.find_definition(&project.id, "NOPE"),
            Err(VaultError::VariableNotFound(k)) if k == "NOPE"
        ));
    }
}
