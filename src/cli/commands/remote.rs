//! Shared plumbing for the client commands: token lookup, the RPC session
//! and the master password hash sent with value requests.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;

use crate::cli::{
    client_runtime, confirm, output, password_from_env, prompt_password, server_addr, Cli,
};
use crate::config::client::TOKEN_ENV;
use crate::config::ClientConfig;
use crate::crypto::hash_password;
use crate::errors::{Result, VaultError};
use crate::rpc::{EnvVariables, RpcClient};
use crate::store::{EnvironmentSummary, ProjectSummary};

/// An RPC connection whose token has already been verified.
pub struct RemoteSession {
    client: RpcClient,
    token_id: String,
}

impl RemoteSession {
    pub async fn open(addr: SocketAddr, token: &str) -> Result<Self> {
        let mut client = RpcClient::connect(addr).await?;
        let token_id = client.verify_token(token).await?;
        Ok(Self { client, token_id })
    }

    pub async fn projects(&mut self) -> Result<Vec<ProjectSummary>> {
        self.client.list_projects(&self.token_id).await
    }

    /// Find a project by name, ignoring case.
    pub async fn project(&mut self, name: &str) -> Result<ProjectSummary> {
        find_project(self.projects().await?, name)
    }

    /// Decrypted `KEY -> value` map for one environment.
    pub async fn values(
        &mut self,
        project_id: &str,
        environment_slug: &str,
        master_key_hash: &str,
    ) -> Result<BTreeMap<String, String>> {
        let reply = self
            .client
            .get_env_variables(
                &self.token_id,
                project_id,
                environment_slug,
                Some(master_key_hash),
            )
            .await?;
        match reply {
            EnvVariables::Decrypted(values) => Ok(values),
            EnvVariables::Metadata(_) => Err(VaultError::Transport(
                "Server returned variable metadata instead of values".into(),
            )),
        }
    }
}

fn available(names: Vec<&str>) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

fn find_project(mut projects: Vec<ProjectSummary>, name: &str) -> Result<ProjectSummary> {
    match projects.iter().position(|p| p.name.eq_ignore_ascii_case(name)) {
        Some(i) => Ok(projects.swap_remove(i)),
        None => Err(VaultError::UnknownProject {
            name: name.to_string(),
            available: available(projects.iter().map(|p| p.name.as_str()).collect()),
        }),
    }
}

/// The project's environment with this slug, ignoring case.
fn find_environment<'a>(project: &'a ProjectSummary, slug: &str) -> Result<&'a EnvironmentSummary> {
    project
        .environments
        .iter()
        .find(|e| e.slug.eq_ignore_ascii_case(slug))
        .ok_or_else(|| VaultError::UnknownEnvironment {
            slug: slug.to_string(),
            project: project.name.clone(),
            available: available(project.environments.iter().map(|e| e.slug.as_str()).collect()),
        })
}

/// Load `~/.geosync/config.json` and pick the token (`GEOSYNC_TOKEN` wins).
pub fn load_token() -> Result<(ClientConfig, String)> {
    let config = ClientConfig::load(&ClientConfig::default_path()?)?;
    let env_token = std::env::var(TOKEN_ENV).ok();
    let token = config.resolve_token(env_token.as_deref())?;
    Ok((config, token))
}

/// The master password hash to send with value requests, trying in order:
/// 1. `GEOSYNC_PASSWORD` env var (CI/CD)
/// 2. `masterKeyHash` saved in the CLI config
/// 3. Interactive prompt, offering to save the hash afterwards
pub fn master_key_hash(config: &mut ClientConfig, config_path: &Path) -> Result<String> {
    if let Some(pw) = password_from_env()? {
        return Ok(hash_password(&pw));
    }
    if let Some(saved) = config.master_key_hash.as_deref().filter(|h| !h.is_empty()) {
        return Ok(saved.to_string());
    }

    let password = prompt_password()?;
    let hash = hash_password(&password);
    if confirm("Save the password hash so you are not asked again?", false)? {
        config.master_key_hash = Some(hash.clone());
        config.save(config_path)?;
        output::notice(&format!("Saved to {}", config_path.display()));
    }
    Ok(hash)
}

/// Fetch an environment's decrypted values from the running vault host.
///
/// The token, project and environment are checked before the password is
/// asked for.
pub fn fetch_values(cli: &Cli, project: &str, env: &str) -> Result<BTreeMap<String, String>> {
    let (mut config, token) = load_token()?;
    let runtime = client_runtime()?;
    let addr = server_addr(cli)?;

    let (mut session, project) = runtime.block_on(async {
        let mut session = RemoteSession::open(addr, &token).await?;
        let project = session.project(project).await?;
        Ok::<_, VaultError>((session, project))
    })?;

    let environment = find_environment(&project, env)?;

    let hash = master_key_hash(&mut config, &ClientConfig::default_path()?)?;
    runtime.block_on(session.values(&project.id, &environment.slug, &hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> ProjectSummary {
        ProjectSummary {
            id: "p1".into(),
            name: "Acme".into(),
            organization: None,
            environments: vec![EnvironmentSummary {
                id: "e1".into(),
                name: "Production".into(),
                slug: "prod".into(),
            }],
        }
    }

    #[test]
    fn project_lookup_ignores_case() {
        let project = find_project(vec![acme()], "ACME").unwrap();
        assert_eq!(project.id, "p1");
    }

    #[test]
    fn unknown_project_lists_the_available_ones() {
        let err = find_project(vec![acme()], "Globex").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Project \"Globex\" not found. Available projects: Acme"
        );

        let err = find_project(Vec::new(), "Globex").unwrap_err();
        assert!(err.to_string().ends_with("Available projects: none"));
    }

    #[test]
    fn environment_lookup_ignores_case() {
        let project = acme();
        assert_eq!(find_environment(&project, "PROD").unwrap().id, "e1");
    }

    #[test]
    fn unknown_environment_lists_the_available_slugs() {
        let project = acme();
        let err = find_environment(&project, "staging").unwrap_err();
        assert!(matches!(err, VaultError::UnknownEnvironment { .. }));
        assert_eq!(
            err.to_string(),
            "Environment \"staging\" not found in project \"Acme\". Available environments: prod"
        );
    }
}
