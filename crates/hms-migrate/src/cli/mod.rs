mod apply;
mod plan;
mod reset;
mod status;

pub use apply::ApplyCommand;
pub use plan::PlanCommand;
pub use reset::ResetCommand;
pub use status::StatusCommand;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use console::style;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use hms_core::catalog::hospital_schema;
use hms_core::config::MigrateConfig;
use hms_core::error::MigrateError;
use hms_core::schema::TargetSchema;
use hms_runtime::Database;

/// Bring the hospital database schema up to date.
///
/// With no command, runs `apply`.
#[derive(Parser)]
#[command(name = "migrate-db")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Create missing tables, columns and indexes (default).
    Apply(ApplyCommand),

    /// Drop every application table and recreate the schema. Destroys data.
    ///
    /// Asks for confirmation first. Without a terminal it refuses (exit 5)
    /// unless `--yes` is given.
    Reset(ResetCommand),

    /// Show what a run would change without changing anything.
    Plan(PlanCommand),

    /// Compare the database against the declared schema.
    Status(StatusCommand),
}

/// Options shared by every command.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Configuration file (TOML).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database URL. Overrides the config file and DATABASE_URL.
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Target schema file (TOML). Defaults to the built-in hospital schema.
    #[arg(long, global = true)]
    pub schema_file: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Everything a command needs, resolved from flags, files and environment.
pub struct Context {
    pub config: MigrateConfig,
    pub target: TargetSchema,
}

impl Context {
    pub async fn connect(&self) -> Result<Database> {
        let db = Database::connect(&self.config.database).await?;
        debug!(url = %self.config.database.redacted_url(), "Connected");
        Ok(db)
    }
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        // Load .env if present
        dotenvy::dotenv().ok();

        init_tracing(self.global.verbose);

        let ctx = self.global.resolve()?;

        match self.command.unwrap_or(Commands::Apply(ApplyCommand {})) {
            Commands::Apply(cmd) => cmd.execute(&ctx).await,
            Commands::Reset(cmd) => cmd.execute(&ctx).await,
            Commands::Plan(cmd) => cmd.execute(&ctx).await,
            Commands::Status(cmd) => cmd.execute(&ctx).await,
        }
    }
}

impl GlobalArgs {
    /// Resolve configuration and the target schema.
    ///
    /// The database URL comes from `--database-url`, then the config file,
    /// then `DATABASE_URL`.
    pub fn resolve(&self) -> Result<Context> {
        let config = match (&self.config, &self.database_url) {
            (Some(path), Some(url)) => {
                MigrateConfig::from_file(path)?.override_database_url(url)?
            }
            (Some(path), None) => MigrateConfig::from_file(path)?,
            (None, Some(url)) => MigrateConfig::with_database_url(url)?,
            (None, None) => MigrateConfig::from_env()?,
        };

        let target = match &self.schema_file {
            Some(path) => TargetSchema::from_file(path)?,
            None => hospital_schema()?,
        };

        debug!(
            url = %config.database.redacted_url(),
            schema = %config.migration.schema,
            tables = target.len(),
            "Resolved configuration"
        );
        Ok(Context { config, target })
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Process exit code for a failed command.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<MigrateError>()
        .map(MigrateError::exit_code)
        .unwrap_or(1)
}

/// Print a failed command's error for the operator.
pub fn report_error(err: &anyhow::Error) {
    eprintln!();
    eprintln!("  {} {}", style("✗").red().bold(), style(err).red());
    for cause in err.chain().skip(1) {
        eprintln!("    {} {}", style("caused by").dim(), cause);
    }

    if let Some(MigrateError::Conflict(conflicts)) = err.downcast_ref::<MigrateError>() {
        eprintln!();
        for conflict in conflicts {
            eprintln!("    {} {}", style("!").red(), conflict);
        }
        eprintln!();
        eprintln!(
            "  {} Existing columns need manual changes, or run {} to rebuild (destroys data).",
            style("ℹ").blue(),
            style("migrate-db reset").cyan()
        );
    }
    eprintln!();
}

/// Print the command banner.
pub(crate) fn banner(title: &str) {
    println!();
    println!(
        "  {}  {} {}",
        style("⚒️").bold(),
        style("HMS").bold().cyan(),
        title
    );
    println!();
}
