//! One module per subcommand.
//!
//! Client commands (`run`, `get_env`, `list_projects`, `config_cmd`) reach
//! the vault host over RPC through `remote`; the rest open the database
//! through `HostContext`.

pub mod audit_cmd;
pub mod completions;
pub mod config_cmd;
pub mod env_cmd;
pub mod get_env;
pub mod init;
pub mod keyring;
pub mod list_projects;
pub mod passwd;
pub mod project;
pub mod remote;
pub mod run;
pub mod serve;
pub mod token;
pub mod unlock;
pub mod var;
