use anyhow::Result;
use clap::Parser;
use console::style;

use hms_core::error::MigrateError;
use hms_runtime::migrations::{plan as plan_migration, DiffAction, SchemaDiff};
use hms_runtime::MigrationMode;

use super::{banner, Context};

/// Show pending changes without applying them.
#[derive(Parser, Debug)]
pub struct PlanCommand {
    /// Plan a reset instead of an apply.
    #[arg(long)]
    pub reset: bool,

    /// Print the plan as JSON.
    #[arg(long)]
    pub json: bool,
}

impl PlanCommand {
    pub async fn execute(self, ctx: &Context) -> Result<()> {
        let mode = if self.reset {
            MigrationMode::Reset
        } else {
            MigrationMode::Apply
        };

        let db = ctx.connect().await?;
        let result = plan_migration(&db, &ctx.target, &ctx.config.migration, mode).await;
        db.close().await;
        let diff = result?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&diff)?);
        } else {
            banner(&format!("Migration Plan ({})", mode));
            print_plan(&diff);
        }

        // A reset rebuilds conflicting tables, so only apply is blocked.
        if mode == MigrationMode::Apply && diff.has_conflicts() {
            return Err(MigrateError::Conflict(
                diff.conflicts.iter().map(ToString::to_string).collect(),
            )
            .into());
        }
        Ok(())
    }
}

fn print_plan(diff: &SchemaDiff) {
    if diff.is_empty() && !diff.has_conflicts() {
        println!("  {} Nothing to do, schema is up to date", style("✓").green());
        println!();
        return;
    }

    for entry in &diff.entries {
        let marker = match entry.action() {
            DiffAction::DropTable => style("-").red(),
            _ => style("+").green(),
        };
        println!("  {} {}", marker, entry.details);
        println!("      {}", style(&entry.sql).dim());
    }
    for warning in &diff.warnings {
        println!("  {} {}", style("⚠").yellow(), warning);
    }

    println!();
    println!("  {} {}", style("ℹ").blue(), diff.summary());
    println!();
}
