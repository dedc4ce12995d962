//! CLI module — Clap argument parser, output helpers, and command implementations.
//!
//! The binary plays two roles:
//! - a **client** (`run`, `list-projects`, `get-env`, `config`) that talks to
//!   a running vault host over the loopback RPC;
//! - the **vault host** itself and its admin surface (`serve`, `init`,
//!   `project`, `var`, `token`, ...), which open the database directly.

pub mod commands;
pub mod output;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use zeroize::Zeroizing;

use crate::audit::AuditLog;
use crate::auth::biometric::default_store;
use crate::auth::CredentialGate;
use crate::config::settings::default_data_dir;
use crate::config::Settings;
use crate::crypto::{hash_password, MasterKey};
use crate::errors::{Result, VaultError};
use crate::store::{Database, Environment, Project};

/// Minimum password length to prevent trivially weak passwords.
const MIN_PASSWORD_LEN: usize = 8;

/// Environment variable holding the master password for scripted use.
pub const PASSWORD_ENV: &str = "GEOSYNC_PASSWORD";

/// Port the vault host listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 8765;

/// GeoSync: local secrets vault for project environment variables.
#[derive(Parser)]
#[command(
    name = "geosync",
    about = "Local secrets vault for project environment variables",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Vault host data directory (database and geosync.toml)
    #[arg(long, env = "GEOSYNC_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// RPC server port (default: 8765)
    #[arg(long, env = "GEOSYNC_PORT", global = true)]
    pub port: Option<u16>,

    /// RPC server loopback address (default: 127.0.0.1)
    #[arg(long, env = "GEOSYNC_HOST", global = true)]
    pub host: Option<IpAddr>,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run a command with an environment's variables injected
    Run {
        /// Project name
        #[arg(long)]
        project: String,

        /// Environment slug (e.g. prod)
        #[arg(long)]
        env: String,

        /// Start with a clean environment (only vault variables, no inherited vars)
        #[arg(long)]
        clean_env: bool,

        /// Command and arguments (after --)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// List the projects and environments the vault host knows about
    ListProjects,

    /// Print an environment's variables as KEY=VALUE lines
    GetEnv {
        /// Project name
        #[arg(long)]
        project: String,

        /// Environment slug
        #[arg(long)]
        env: String,
    },

    /// Manage the CLI configuration (~/.geosync/config.json)
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Start the vault host RPC server
    Serve,

    /// Set up the vault with a master password
    Init {
        /// Display name stored with the profile
        #[arg(long)]
        name: Option<String>,

        /// Email stored with the profile
        #[arg(long)]
        email: Option<String>,
    },

    /// Change the master password and re-encrypt every value
    Passwd,

    /// Check the master password and show the profile
    Unlock,

    /// Save the master password to the OS keyring (auto-unlock)
    Keyring {
        /// Remove the password from the keyring instead of saving it
        #[arg(long)]
        delete: bool,
    },

    /// Manage CLI access tokens
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Manage projects
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Manage a project's environments
    Env {
        #[command(subcommand)]
        action: EnvAction,
    },

    /// Manage variables, their defaults and per-environment overrides
    Var {
        #[command(subcommand)]
        action: VarAction,
    },

    /// View the audit log of vault operations
    Audit {
        /// Number of entries to show (default: 50)
        #[arg(long, default_value = "50")]
        last: usize,
        /// Show entries since a duration ago (e.g. 7d, 24h, 30m)
        #[arg(long)]
        since: Option<String>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum, ignore_case = true)]
        shell: clap_complete::Shell,
    },
}

#[derive(clap::Subcommand)]
pub enum ConfigAction {
    /// Save the access token used by `run`, `get-env` and `list-projects`
    SetToken {
        /// Token issued by `geosync token create`
        token: String,
    },

    /// Remove the saved master password hash
    ForgetPassword,
}

#[derive(clap::Subcommand)]
pub enum TokenAction {
    /// Issue a new access token (shown once)
    Create {
        /// Label for the token
        name: String,

        /// Expire the token after this many days
        #[arg(long)]
        expires_in_days: Option<i64>,

        /// Copy the token to the clipboard
        #[arg(long)]
        copy: bool,
    },

    /// List access tokens
    List,

    /// Revoke an access token
    Revoke {
        /// Token id (see `geosync token list`)
        id: String,
    },
}

#[derive(clap::Subcommand)]
pub enum ProjectAction {
    /// Create a project
    Create {
        name: String,

        /// Organization the project belongs to
        #[arg(long)]
        org: Option<String>,
    },

    /// List projects with their environments
    List,

    /// Delete a project with all its environments and variables
    Delete {
        name: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(clap::Subcommand)]
pub enum EnvAction {
    /// Create an environment
    Create {
        /// Project name
        #[arg(long)]
        project: String,

        /// Display name (e.g. Production)
        name: String,

        /// Slug used on the command line (default: derived from the name)
        #[arg(long)]
        slug: Option<String>,
    },

    /// Delete an environment and its overrides
    Delete {
        /// Project name
        #[arg(long)]
        project: String,

        slug: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(clap::Subcommand)]
pub enum VarAction {
    /// Set a project default, or an environment override with --env
    Set {
        /// Project name
        #[arg(long)]
        project: String,

        /// Variable name (e.g. DATABASE_URL)
        key: String,

        /// Value (omit for interactive prompt)
        value: Option<String>,

        /// Environment slug; sets an override instead of the default
        #[arg(long)]
        env: Option<String>,

        /// Mark the variable as secret
        #[arg(long)]
        secret: bool,

        /// Free-text description
        #[arg(long)]
        description: Option<String>,
    },

    /// Remove a variable, or only its override with --env
    Unset {
        /// Project name
        #[arg(long)]
        project: String,

        key: String,

        /// Environment slug; removes only the override
        #[arg(long)]
        env: Option<String>,
    },

    /// Show an environment's resolved variables
    Show {
        /// Project name
        #[arg(long)]
        project: String,

        /// Environment slug
        #[arg(long)]
        env: String,

        /// Print secret values instead of masking them
        #[arg(long)]
        reveal: bool,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Everything a host-side command needs: where the data lives, the host
/// settings and an open database.
pub struct HostContext {
    pub data_dir: PathBuf,
    pub settings: Settings,
    pub db: Database,
}

impl HostContext {
    /// Load `geosync.toml` and open the vault database.
    pub fn open(cli: &Cli) -> Result<Self> {
        let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
        let mut settings = Settings::load(&data_dir)?;
        if let Some(port) = cli.port {
            settings.port = port;
        }
        if let Some(host) = cli.host {
            settings.host = host.to_string();
        }
        let db = Database::open(&settings.database_path(&data_dir))?;
        Ok(Self {
            data_dir,
            settings,
            db,
        })
    }

    pub fn credentials(&self) -> CredentialGate {
        CredentialGate::new(self.db.clone())
    }

    pub fn audit(&self) -> AuditLog {
        AuditLog::new(self.db.clone())
    }

    /// Unlock the vault, trying in order:
    /// 1. `GEOSYNC_PASSWORD` env var (CI/CD)
    /// 2. The OS keyring (if compiled with `keyring-store` feature)
    /// 3. Interactive prompt
    pub fn unlock(&self) -> Result<MasterKey> {
        let gate = self.credentials();
        if !gate.is_configured()? {
            return Err(VaultError::NotConfigured);
        }

        if password_from_env()?.is_none() {
            let store = default_store();
            if let Some(key) = gate.unlock_with_secret_store(store.as_ref())? {
                return Ok(key);
            }
        }

        let password = prompt_password()?;
        gate.unlock(&hash_password(&password))
    }

    /// Look a project up by name, failing with `ProjectNotFound`.
    pub fn project(&self, name: &str) -> Result<Project> {
        self.db
            .find_project_by_name(name)?
            .ok_or_else(|| VaultError::ProjectNotFound(name.to_string()))
    }

    /// Look an environment up by slug, failing with `EnvironmentNotFound`.
    pub fn environment(&self, project: &Project, slug: &str) -> Result<Environment> {
        self.db
            .find_environment_by_slug(&project.id, slug)?
            .ok_or_else(|| VaultError::EnvironmentNotFound(slug.to_string()))
    }
}

/// Address of the vault host the client commands talk to.
///
/// Follows the same `--host`/`--port` the host was started with.
pub fn server_addr(cli: &Cli) -> Result<SocketAddr> {
    let ip = cli.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    if !ip.is_loopback() {
        return Err(VaultError::ConfigError(format!(
            "host '{ip}' is not a loopback address; the vault host only listens locally"
        )));
    }
    Ok(SocketAddr::new(ip, cli.port.unwrap_or(DEFAULT_PORT)))
}

/// A single-threaded runtime for the client commands.
pub fn client_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

pub(crate) fn password_from_env() -> Result<Option<Zeroizing<String>>> {
    match std::env::var(PASSWORD_ENV) {
        Ok(pw) if !pw.is_empty() => Ok(Some(Zeroizing::new(pw))),
        Ok(_) | Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(VaultError::ConfigError(format!(
            "{PASSWORD_ENV} is not valid UTF-8"
        ))),
    }
}

/// Get the master password from `GEOSYNC_PASSWORD` or an interactive prompt.
///
/// Returns `Zeroizing<String>` so the password is wiped from memory on drop.
pub fn prompt_password() -> Result<Zeroizing<String>> {
    if let Some(pw) = password_from_env()? {
        return Ok(pw);
    }

    let pw = dialoguer::Password::new()
        .with_prompt("Enter master password")
        .interact()
        .map_err(|e| VaultError::CommandFailed(format!("password prompt: {e}")))?;
    Ok(Zeroizing::new(pw))
}

/// Prompt for a new password with confirmation (used by `init` and `passwd`).
///
/// Also respects `GEOSYNC_PASSWORD` for scripted/CI usage.
/// Enforces a minimum password length.
pub fn prompt_new_password() -> Result<Zeroizing<String>> {
    if let Some(pw) = password_from_env()? {
        if pw.len() < MIN_PASSWORD_LEN {
            return Err(VaultError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        return Ok(pw);
    }

    loop {
        let password = dialoguer::Password::new()
            .with_prompt("Choose master password")
            .with_confirmation(
                "Confirm master password",
                "Passwords do not match, try again",
            )
            .interact()
            .map_err(|e| VaultError::CommandFailed(format!("password prompt: {e}")))?;

        if password.len() < MIN_PASSWORD_LEN {
            output::warning(&format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters. Try again."
            ));
            continue;
        }

        return Ok(Zeroizing::new(password));
    }
}

/// Ask a yes/no question; `default` is used when the user just hits enter.
pub fn confirm(prompt: &str, default: bool) -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()
        .map_err(|e| VaultError::CommandFailed(format!("confirm prompt: {e}")))
}
