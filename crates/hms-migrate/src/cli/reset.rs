use anyhow::Result;
use clap::Parser;
use console::style;
use dialoguer::Confirm;

use hms_core::error::MigrateError;
use hms_runtime::{migrate, MigrationMode};

use super::apply::print_report;
use super::{banner, Context};

/// Drop every application table and recreate the schema.
///
/// Asks for confirmation first. Without a terminal it refuses (exit 5)
/// unless `--yes` is given.
#[derive(Parser, Debug)]
pub struct ResetCommand {
    /// Skip the confirmation prompt. Required when not running in a terminal.
    #[arg(short, long)]
    pub yes: bool,
}

impl ResetCommand {
    pub async fn execute(self, ctx: &Context) -> Result<()> {
        banner("Schema Reset");

        println!(
            "  {} This drops the following tables in {} and ALL of their data:",
            style("⚠").yellow().bold(),
            style(ctx.config.database.redacted_url()).cyan()
        );
        for table in ctx.target.drop_order() {
            println!("    {} {}", style("-").dim(), style(&table.name).yellow());
        }
        println!();

        self.confirm()?;

        let db = ctx.connect().await?;
        let result = migrate(&db, &ctx.target, &ctx.config.migration, MigrationMode::Reset).await;
        db.close().await;

        print_report(&result?);
        Ok(())
    }

    fn confirm(&self) -> Result<()> {
        if self.yes {
            return Ok(());
        }
        if !console::user_attended() {
            return Err(MigrateError::Aborted(
                "reset needs confirmation; pass --yes when not running in a terminal".to_string(),
            )
            .into());
        }

        let confirmed = Confirm::new()
            .with_prompt("Drop and recreate all tables?")
            .default(false)
            .interact()?;
        if !confirmed {
            return Err(MigrateError::Aborted("reset cancelled".to_string()).into());
        }
        Ok(())
    }
}
