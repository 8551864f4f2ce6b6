use anyhow::Result;
use clap::Parser;
use console::style;

use hms_runtime::{migrate, MigrationMode, MigrationReport};

use super::{banner, Context};

/// Create missing tables, columns and indexes.
#[derive(Parser, Debug)]
pub struct ApplyCommand {}

impl ApplyCommand {
    pub async fn execute(self, ctx: &Context) -> Result<()> {
        banner("Schema Migration");

        let db = ctx.connect().await?;
        println!(
            "  {} Applying {} table(s) to {}",
            style("→").dim(),
            ctx.target.len(),
            style(ctx.config.database.redacted_url()).cyan()
        );

        let result = migrate(&db, &ctx.target, &ctx.config.migration, MigrationMode::Apply).await;
        db.close().await;

        print_report(&result?);
        Ok(())
    }
}

/// Print what a finished run did.
pub(crate) fn print_report(report: &MigrationReport) {
    for table in &report.dropped_tables {
        println!("  {} Dropped {}", style("✗").red(), style(table).yellow());
    }
    for entry in &report.applied {
        println!("  {} {}", style("✓").green(), entry.details);
    }
    for warning in &report.warnings {
        println!("  {} {}", style("⚠").yellow(), warning);
    }
    if !report.untracked.is_empty() {
        println!(
            "  {} {} column(s) not in the schema were left in place: {}",
            style("ℹ").blue(),
            report.untracked.len(),
            style(report.untracked.join(", ")).dim()
        );
    }

    println!();
    if report.is_noop() {
        println!("  {} Schema is up to date", style("✓").green());
    } else {
        println!(
            "  {} Migration complete: {} ({} ms)",
            style("✓").green(),
            report.summary(),
            report.elapsed.as_millis()
        );
    }
    println!();
}
