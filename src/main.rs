use clap::Parser;
use tracing_subscriber::EnvFilter;

use geosync::cli::commands;
use geosync::cli::commands::var::SetArgs;
use geosync::cli::{Cli, Commands, ConfigAction, EnvAction, ProjectAction, TokenAction, VarAction};
use geosync::errors::VaultError;

fn main() {
    // Usage errors exit with 1 like every other failure; --help and
    // --version still exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_tracing(matches!(cli.command, Commands::Serve));

    let result = match cli.command {
        Commands::Run {
            ref project,
            ref env,
            clean_env,
            ref command,
        } => commands::run::execute(&cli, project, env, command, clean_env),
        Commands::ListProjects => commands::list_projects::execute(&cli),
        Commands::GetEnv {
            ref project,
            ref env,
        } => commands::get_env::execute(&cli, project, env),
        Commands::Config { ref action } => match action {
            ConfigAction::SetToken { token } => commands::config_cmd::execute_set_token(token),
            ConfigAction::ForgetPassword => commands::config_cmd::execute_forget_password(),
        },
        Commands::Serve => commands::serve::execute(&cli),
        Commands::Init {
            ref name,
            ref email,
        } => commands::init::execute(&cli, name.as_deref(), email.as_deref()),
        Commands::Passwd => commands::passwd::execute(&cli),
        Commands::Unlock => commands::unlock::execute(&cli),
        Commands::Keyring { delete } => commands::keyring::execute(&cli, delete),
        Commands::Token { ref action } => match action {
            TokenAction::Create {
                name,
                expires_in_days,
                copy,
            } => commands::token::execute_create(&cli, name, *expires_in_days, *copy),
            TokenAction::List => commands::token::execute_list(&cli),
            TokenAction::Revoke { id } => commands::token::execute_revoke(&cli, id),
        },
        Commands::Project { ref action } => match action {
            ProjectAction::Create { name, org } => {
                commands::project::execute_create(&cli, name, org.as_deref())
            }
            ProjectAction::List => commands::project::execute_list(&cli),
            ProjectAction::Delete { name, force } => {
                commands::project::execute_delete(&cli, name, *force)
            }
        },
        Commands::Env { ref action } => match action {
            EnvAction::Create {
                project,
                name,
                slug,
            } => commands::env_cmd::execute_create(&cli, project, name, slug.as_deref()),
            EnvAction::Delete {
                project,
                slug,
                force,
            } => commands::env_cmd::execute_delete(&cli, project, slug, *force),
        },
        Commands::Var { ref action } => match action {
            VarAction::Set {
                project,
                key,
                value,
                env,
                secret,
                description,
            } => commands::var::execute_set(
                &cli,
                &SetArgs {
                    project,
                    key,
                    value: value.as_deref(),
                    env: env.as_deref(),
                    secret: *secret,
                    description: description.as_deref(),
                },
            ),
            VarAction::Unset { project, key, env } => {
                commands::var::execute_unset(&cli, project, key, env.as_deref())
            }
            VarAction::Show {
                project,
                env,
                reveal,
            } => commands::var::execute_show(&cli, project, env, *reveal),
        },
        Commands::Audit { last, ref since } => {
            commands::audit_cmd::execute(&cli, last, since.as_deref())
        }
        Commands::Completions { shell } => commands::completions::execute(shell),
    };

    match result {
        Ok(()) => {}
        // The child already reported its own failure.
        Err(VaultError::ChildProcessFailed(code)) => std::process::exit(code),
        Err(e) => {
            geosync::cli::output::error(&e.to_string());
            std::process::exit(1);
        }
    }
}

/// Diagnostics go to stderr so `get-env` output stays clean.
/// `RUST_LOG` overrides the default level.
fn init_tracing(serving: bool) {
    let default = if serving { "geosync=info" } else { "geosync=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
