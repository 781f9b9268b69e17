use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use std::io;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use vault_loader::output::DOTENV_FILE;
use vault_loader::{CliOverrides, DotenvStyle, VaultLoader};

/// Environment variable holding the log filter, e.g. `VAULT_LOADER_LOG=debug`.
const LOG_ENV: &str = "VAULT_LOADER_LOG";

/// Main CLI structure for the vault-loader application.
#[derive(Parser)]
#[command(name = "vault-loader")]
#[command(about = "Load secrets from Vault and export them as environment variables", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    /// The subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every subcommand.
#[derive(Args)]
struct GlobalArgs {
    /// Comma-separated paths to the KV secrets (repeatable)
    #[arg(short = 'p', long = "path", value_delimiter = ',', global = true)]
    paths: Vec<String>,
    /// Role to use when resolving an ID token (derived from the first path if omitted)
    #[arg(short = 'r', long, global = true)]
    role: Option<String>,
    /// Name of the KV secrets engine [default: kv]
    #[arg(short = 'e', long, global = true)]
    engine: Option<String>,
    /// Role ID for AppRole authentication
    #[arg(long, global = true)]
    role_id: Option<String>,
    /// Secret ID for AppRole authentication
    #[arg(long, global = true)]
    secret_id: Option<String>,
}

impl From<GlobalArgs> for CliOverrides {
    fn from(args: GlobalArgs) -> Self {
        CliOverrides {
            paths: args.paths,
            role: args.role,
            engine: args.engine,
            role_id: args.role_id,
            secret_id: args.secret_id,
        }
    }
}

/// Available commands for the vault-loader CLI.
#[derive(Subcommand)]
enum Commands {
    /// Export secrets as shell commands
    Export,
    /// Create a .env file with the secrets
    Env {
        /// Do not wrap values in quotes
        #[arg(short, long)]
        unquoted: bool,
    },
    /// Run a command with the secrets as environment variables
    Run {
        /// Continue running the command even if secret loading fails
        #[arg(long)]
        ignore_if_fail: bool,
        /// Command and arguments to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();
    let overrides = CliOverrides::from(cli.global);
    let loader = VaultLoader::load(&overrides).wrap_err("Failed to resolve configuration")?;

    match cli.command {
        // Print export statements for the calling shell to eval
        Commands::Export => {
            loader
                .export(io::stdout().lock())
                .wrap_err("Failed to export secrets")?;
            Ok(())
        }
        // Write the secrets to ./.env
        Commands::Env { unquoted } => {
            let style = if unquoted {
                DotenvStyle::Unquoted
            } else {
                DotenvStyle::Quoted
            };
            loader
                .write_env(Path::new(DOTENV_FILE), style)
                .wrap_err("Failed to write .env file")?;
            Ok(())
        }
        // Execute a command with secrets injected, mirroring its exit code
        Commands::Run {
            ignore_if_fail,
            command,
        } => {
            let code = loader
                .run(&command, ignore_if_fail)
                .wrap_err("Failed to run command")?;
            std::process::exit(code);
        }
    }
}
