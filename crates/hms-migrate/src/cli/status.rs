use anyhow::Result;
use clap::Parser;
use console::style;

use hms_core::error::MigrateError;
use hms_core::schema::TargetSchema;
use hms_runtime::migrations::{plan as plan_migration, DiffAction, SchemaDiff};
use hms_runtime::MigrationMode;

use super::{banner, Context};

/// Compare the database against the declared schema.
#[derive(Parser, Debug)]
pub struct StatusCommand {
    /// Exit non-zero when the database is not up to date.
    #[arg(long)]
    pub check: bool,
}

/// How one declared table compares to the database.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TableStatus {
    UpToDate,
    Missing,
    Pending(usize),
    Conflicting(usize),
}

impl StatusCommand {
    pub async fn execute(self, ctx: &Context) -> Result<()> {
        banner("Schema Status");

        let db = ctx.connect().await?;
        let result = plan_migration(
            &db,
            &ctx.target,
            &ctx.config.migration,
            MigrationMode::Apply,
        )
        .await;
        db.close().await;
        let diff = result?;

        for (table, status) in table_statuses(&ctx.target, &diff) {
            let line = match status {
                TableStatus::UpToDate => format!("{} {}", style("✓").green(), table),
                TableStatus::Missing => format!(
                    "{} {} {}",
                    style("○").yellow(),
                    style(&table).yellow(),
                    style("missing").dim()
                ),
                TableStatus::Pending(n) => format!(
                    "{} {} {}",
                    style("○").yellow(),
                    style(&table).yellow(),
                    style(format!("{} pending change(s)", n)).dim()
                ),
                TableStatus::Conflicting(n) => format!(
                    "{} {} {}",
                    style("✗").red(),
                    style(&table).red(),
                    style(format!("{} conflict(s)", n)).dim()
                ),
            };
            println!("  {}", line);
        }

        for conflict in &diff.conflicts {
            println!("    {} {}", style("!").red(), conflict);
        }
        if !diff.untracked.is_empty() {
            println!();
            println!(
                "  {} Untracked column(s): {}",
                style("ℹ").blue(),
                style(diff.untracked.join(", ")).dim()
            );
        }

        let outstanding = diff.entries.len() + diff.conflicts.len();
        println!();
        println!(
            "  {} {} pending change(s), {} conflict(s)",
            style("ℹ").blue(),
            diff.entries.len(),
            diff.conflicts.len()
        );
        println!();

        if self.check && outstanding > 0 {
            return Err(MigrateError::Drift(outstanding).into());
        }
        Ok(())
    }
}

fn table_statuses(target: &TargetSchema, diff: &SchemaDiff) -> Vec<(String, TableStatus)> {
    target
        .tables()
        .iter()
        .map(|table| {
            let conflicts = diff
                .conflicts
                .iter()
                .filter(|c| c.table == table.name)
                .count();
            let entries: Vec<_> = diff
                .entries
                .iter()
                .filter(|e| e.table_name == table.name)
                .collect();

            let status = if conflicts > 0 {
                TableStatus::Conflicting(conflicts)
            } else if entries
                .iter()
                .any(|e| e.action() == DiffAction::CreateTable)
            {
                TableStatus::Missing
            } else if entries.is_empty() {
                TableStatus::UpToDate
            } else {
                TableStatus::Pending(entries.len())
            };
            (table.name.clone(), status)
        })
        .collect()
}
