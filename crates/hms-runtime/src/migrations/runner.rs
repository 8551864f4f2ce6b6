//! Brings a database into line with a target schema.
//!
//! A run is one unit of work against a [`SchemaStore`]: either every change
//! lands or none does. Apply only ever adds; reset drops the target's tables
//! first and rebuilds them.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use hms_core::config::MigrationConfig;
use hms_core::error::{MigrateError, Result};
use hms_core::schema::TargetSchema;

use super::diff::{DiffEntry, SchemaDiff};
use super::store::{PgSchemaStore, SchemaStore};
use crate::db::Database;

/// What a run is allowed to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationMode {
    /// Create missing tables, columns and indexes. Never drops anything.
    #[default]
    Apply,
    /// Drop every target table, then recreate the target from scratch.
    Reset,
}

impl MigrationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Reset => "reset",
        }
    }

    /// Whether the mode destroys data.
    pub fn is_destructive(&self) -> bool {
        matches!(self, Self::Reset)
    }
}

impl fmt::Display for MigrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationMode {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "apply" => Ok(Self::Apply),
            "reset" => Ok(Self::Reset),
            other => Err(MigrateError::Config(format!(
                "unknown migration mode '{}'",
                other
            ))),
        }
    }
}

/// Where a run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    Start,
    ConnectionVerified,
    /// Reset only.
    AllTablesDropped,
    SchemaDiffed,
    SchemaApplied,
    Done,
    Failed,
}

impl MigrationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ConnectionVerified => "connection_verified",
            Self::AllTablesDropped => "all_tables_dropped",
            Self::SchemaDiffed => "schema_diffed",
            Self::SchemaApplied => "schema_applied",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Check if the run has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `next` may follow this phase. Any live phase may fail.
    pub fn can_advance_to(&self, next: MigrationPhase) -> bool {
        use MigrationPhase::*;

        if self.is_terminal() {
            return false;
        }
        matches!(
            (*self, next),
            (_, Failed)
                | (Start, ConnectionVerified)
                | (ConnectionVerified, AllTablesDropped)
                | (ConnectionVerified, SchemaDiffed)
                | (AllTablesDropped, SchemaDiffed)
                | (SchemaDiffed, SchemaApplied)
                | (SchemaApplied, Done)
        )
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase bookkeeping for one run.
#[derive(Debug)]
struct PhaseTracker {
    mode: MigrationMode,
    phase: MigrationPhase,
    history: Vec<MigrationPhase>,
}

impl PhaseTracker {
    fn new(mode: MigrationMode) -> Self {
        Self {
            mode,
            phase: MigrationPhase::Start,
            history: vec![MigrationPhase::Start],
        }
    }

    fn advance(&mut self, next: MigrationPhase) -> Result<()> {
        let allowed = self.phase.can_advance_to(next)
            && (next != MigrationPhase::AllTablesDropped || self.mode.is_destructive());
        if !allowed {
            return Err(MigrateError::Database(format!(
                "invalid migration phase transition {} -> {} in {} mode",
                self.phase, next, self.mode
            )));
        }

        debug!(mode = %self.mode, from = %self.phase, to = %next, "Migration phase");
        self.phase = next;
        self.history.push(next);
        Ok(())
    }

    fn fail(&mut self, err: &MigrateError) {
        if self.phase.is_terminal() {
            return;
        }
        debug!(mode = %self.mode, from = %self.phase, error = %err, "Migration failed");
        self.phase = MigrationPhase::Failed;
        self.history.push(MigrationPhase::Failed);
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub mode: MigrationMode,
    /// Tables dropped by a reset, dependents first.
    pub dropped_tables: Vec<String>,
    /// Changes applied, in execution order.
    pub applied: Vec<DiffEntry>,
    /// Tolerated differences.
    pub warnings: Vec<String>,
    /// Database columns the target does not declare.
    pub untracked: Vec<String>,
    /// Phases the run went through.
    pub phases: Vec<MigrationPhase>,
    pub elapsed: Duration,
    pub finished_at: DateTime<Utc>,
}

impl MigrationReport {
    /// Whether the run found nothing to do.
    pub fn is_noop(&self) -> bool {
        self.dropped_tables.is_empty() && self.applied.is_empty()
    }

    pub fn summary(&self) -> String {
        let diff = SchemaDiff {
            entries: self.applied.clone(),
            ..SchemaDiff::default()
        };
        if self.dropped_tables.is_empty() {
            return diff.summary();
        }

        let dropped = format!("drop {} table(s)", self.dropped_tables.len());
        if diff.is_empty() {
            dropped
        } else {
            format!("{}, {}", dropped, diff.summary())
        }
    }
}

/// Runs a target schema against a [`SchemaStore`].
pub struct MigrationRunner<'a> {
    target: &'a TargetSchema,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(target: &'a TargetSchema) -> Self {
        Self { target }
    }

    /// Run to completion and commit.
    ///
    /// On error the store is dropped uncommitted, so nothing the run did is
    /// kept.
    pub async fn run<S: SchemaStore>(
        &self,
        store: S,
        mode: MigrationMode,
    ) -> Result<MigrationReport> {
        let started = Instant::now();
        let mut tracker = PhaseTracker::new(mode);

        info!(mode = %mode, tables = self.target.len(), "Starting migration");

        let outcome = self.run_inner(store, &mut tracker).await;
        match outcome {
            Ok((dropped_tables, diff)) => {
                let report = MigrationReport {
                    mode,
                    dropped_tables,
                    applied: diff.entries,
                    warnings: diff.warnings,
                    untracked: diff.untracked,
                    phases: tracker.history,
                    elapsed: started.elapsed(),
                    finished_at: Utc::now(),
                };
                info!(
                    mode = %mode,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Migration complete: {}",
                    report.summary()
                );
                Ok(report)
            }
            Err(e) => {
                tracker.fail(&e);
                Err(e)
            }
        }
    }

    async fn run_inner<S: SchemaStore>(
        &self,
        mut store: S,
        tracker: &mut PhaseTracker,
    ) -> Result<(Vec<String>, SchemaDiff)> {
        store.verify().await?;
        tracker.advance(MigrationPhase::ConnectionVerified)?;

        let names = self.target.table_names();
        let mut dropped = Vec::new();

        if tracker.mode.is_destructive() {
            let before = store.introspect(&names).await?;
            dropped = SchemaDiff::reset_drops(self.target, &before)
                .into_iter()
                .map(|entry| entry.table_name)
                .collect();

            warn!(tables = ?dropped, "Dropping all target tables");
            store.drop_tables(&dropped).await?;
            tracker.advance(MigrationPhase::AllTablesDropped)?;
        }

        let actual = store.introspect(&names).await?;
        let diff = SchemaDiff::from_comparison(self.target, &actual);
        tracker.advance(MigrationPhase::SchemaDiffed)?;

        for warning in &diff.warnings {
            warn!("{}", warning);
        }
        if !diff.untracked.is_empty() {
            debug!(columns = ?diff.untracked, "Leaving untracked columns in place");
        }
        if diff.has_conflicts() {
            return Err(MigrateError::Conflict(
                diff.conflicts.iter().map(ToString::to_string).collect(),
            ));
        }

        for entry in &diff.entries {
            store.execute(entry).await?;
            info!("{}", entry.details);
        }
        tracker.advance(MigrationPhase::SchemaApplied)?;

        store.commit().await?;
        tracker.advance(MigrationPhase::Done)?;

        Ok((dropped, diff))
    }

    /// Work out what a run would do without changing anything.
    ///
    /// Conflicts are returned in the diff rather than as an error so they can
    /// be shown alongside the rest of the plan.
    pub async fn plan<S: SchemaStore>(
        &self,
        store: &mut S,
        mode: MigrationMode,
    ) -> Result<SchemaDiff> {
        store.verify().await?;

        let actual = store.introspect(&self.target.table_names()).await?;
        let diff = match mode {
            MigrationMode::Apply => SchemaDiff::from_comparison(self.target, &actual),
            MigrationMode::Reset => SchemaDiff::from_reset(self.target, &actual),
        };

        debug!(mode = %mode, "Planned: {}", diff.summary());
        Ok(diff)
    }
}

/// Migrate `db` to `target` in one PostgreSQL transaction.
pub async fn migrate(
    db: &Database,
    target: &TargetSchema,
    config: &MigrationConfig,
    mode: MigrationMode,
) -> Result<MigrationReport> {
    let store = PgSchemaStore::begin(db, config).await?;
    MigrationRunner::new(target).run(store, mode).await
}

/// Dry run of [`migrate`]. The transaction is rolled back.
pub async fn plan(
    db: &Database,
    target: &TargetSchema,
    config: &MigrationConfig,
    mode: MigrationMode,
) -> Result<SchemaDiff> {
    let mut store = PgSchemaStore::begin(db, config).await?;
    MigrationRunner::new(target).plan(&mut store, mode).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use hms_core::catalog::{hospital_schema, USER_PROFILE_COLUMNS};
    use hms_core::schema::{ColumnDef, SqlType, TableDef};

    use crate::migrations::DiffAction;
    use crate::testing::MemoryDatabase;

    fn catalog() -> TargetSchema {
        hospital_schema().unwrap()
    }

    fn catalog_without(table: &str) -> TargetSchema {
        TargetSchema::new(
            catalog()
                .tables()
                .iter()
                .filter(|t| t.name != table)
                .cloned()
                .collect(),
        )
        .unwrap()
    }

    /// The catalog as the first release shipped it: `users` without the
    /// patient-profile columns.
    fn first_release() -> TargetSchema {
        let tables = catalog()
            .tables()
            .iter()
            .map(|t| {
                let mut table = t.clone();
                if table.name == "users" {
                    table
                        .columns
                        .retain(|c| !USER_PROFILE_COLUMNS.contains(&c.name.as_str()));
                }
                table
            })
            .collect();
        TargetSchema::new(tables).unwrap()
    }

    async fn apply(db: &MemoryDatabase, target: &TargetSchema) -> MigrationReport {
        MigrationRunner::new(target)
            .run(db.store(), MigrationMode::Apply)
            .await
            .unwrap()
    }

    async fn reset(db: &MemoryDatabase, target: &TargetSchema) -> MigrationReport {
        MigrationRunner::new(target)
            .run(db.store(), MigrationMode::Reset)
            .await
            .unwrap()
    }

    #[test]
    fn test_mode_default_and_parse() {
        assert_eq!(MigrationMode::default(), MigrationMode::Apply);
        assert_eq!("reset".parse::<MigrationMode>().unwrap(), MigrationMode::Reset);
        assert_eq!(MigrationMode::Apply.to_string(), "apply");
        assert!(MigrationMode::Reset.is_destructive());
        assert!(!MigrationMode::Apply.is_destructive());
        assert!(matches!(
            "drop".parse::<MigrationMode>(),
            Err(MigrateError::Config(_))
        ));
    }

    #[test]
    fn test_phase_transitions() {
        use MigrationPhase::*;

        assert!(Start.can_advance_to(ConnectionVerified));
        assert!(ConnectionVerified.can_advance_to(SchemaDiffed));
        assert!(ConnectionVerified.can_advance_to(AllTablesDropped));
        assert!(AllTablesDropped.can_advance_to(SchemaDiffed));
        assert!(SchemaDiffed.can_advance_to(SchemaApplied));
        assert!(SchemaApplied.can_advance_to(Done));
        assert!(SchemaDiffed.can_advance_to(Failed));

        assert!(!Start.can_advance_to(SchemaApplied));
        assert!(!SchemaDiffed.can_advance_to(AllTablesDropped));
        assert!(!Done.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Start));
        assert!(Done.is_terminal());
    }

    #[test]
    fn test_apply_never_drops_tables() {
        let mut tracker = PhaseTracker::new(MigrationMode::Apply);
        tracker.advance(MigrationPhase::ConnectionVerified).unwrap();
        assert!(tracker.advance(MigrationPhase::AllTablesDropped).is_err());

        let mut tracker = PhaseTracker::new(MigrationMode::Reset);
        tracker.advance(MigrationPhase::ConnectionVerified).unwrap();
        tracker.advance(MigrationPhase::AllTablesDropped).unwrap();
    }

    #[tokio::test]
    async fn test_apply_on_empty_database() {
        let db = MemoryDatabase::new();
        let target = catalog();

        let report = apply(&db, &target).await;

        assert_eq!(report.mode, MigrationMode::Apply);
        assert_eq!(db.table_names(), target.table_names());
        let users = db.table("users").unwrap();
        for column in USER_PROFILE_COLUMNS {
            assert!(users.column(column).unwrap().nullable, "{}", column);
        }
        assert!(report.dropped_tables.is_empty());
        assert_eq!(
            report.phases,
            vec![
                MigrationPhase::Start,
                MigrationPhase::ConnectionVerified,
                MigrationPhase::SchemaDiffed,
                MigrationPhase::SchemaApplied,
                MigrationPhase::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let db = MemoryDatabase::new();
        let target = catalog();

        apply(&db, &target).await;
        let after_first = db.snapshot();
        let statements = db.committed_statements().len();

        let second = apply(&db, &target).await;

        assert!(second.is_noop());
        assert_eq!(second.summary(), "up to date");
        assert_eq!(db.snapshot(), after_first);
        assert_eq!(db.committed_statements().len(), statements);
    }

    #[tokio::test]
    async fn test_apply_adds_profile_columns_without_touching_rows() {
        let db = MemoryDatabase::new();
        apply(&db, &first_release()).await;
        db.insert_row(
            "users",
            &[
                ("phone", "01700000000"),
                ("hashed_password", "hash"),
                ("full_name", "Rahim Uddin"),
            ],
        );

        let report = apply(&db, &catalog()).await;

        assert_eq!(report.applied.len(), USER_PROFILE_COLUMNS.len());
        assert!(report
            .applied
            .iter()
            .all(|e| e.action() == DiffAction::AddColumn && e.table_name == "users"));

        let rows = db.rows("users");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["phone"].as_deref(), Some("01700000000"));
        assert_eq!(rows[0]["full_name"].as_deref(), Some("Rahim Uddin"));
        assert_eq!(rows[0]["is_active"].as_deref(), Some("TRUE"));
        for column in USER_PROFILE_COLUMNS {
            assert_eq!(rows[0][column], None, "{}", column);
        }
    }

    #[tokio::test]
    async fn test_users_without_nid() {
        let db = MemoryDatabase::new();
        let mut tables = catalog().tables().to_vec();
        tables[0].columns.retain(|c| c.name != "nid");
        assert_eq!(tables[0].name, "users");
        apply(&db, &TargetSchema::new(tables).unwrap()).await;
        db.insert_row("users", &[("phone", "01800000000"), ("hashed_password", "hash")]);

        apply(&db, &catalog()).await;

        let nid = db.table("users").unwrap().column("nid").cloned().unwrap();
        assert!(nid.nullable);
        assert!(nid.unique);
        assert_eq!(nid.sql_type, SqlType::Varchar(Some(50)));
        assert_eq!(db.rows("users")[0]["nid"], None);
    }

    #[tokio::test]
    async fn test_missing_ambulance_services_is_created() {
        let db = MemoryDatabase::new();
        apply(&db, &catalog_without("ambulance_services")).await;
        let before = db.snapshot();

        let report = apply(&db, &catalog()).await;

        assert_eq!(report.applied[0].action(), DiffAction::CreateTable);
        assert!(report
            .applied
            .iter()
            .all(|e| e.table_name == "ambulance_services"));
        let created = db.table("ambulance_services").unwrap();
        assert!(created.column("available_24_7").is_some());
        assert_eq!(
            db.snapshot()
                .without_tables(&["ambulance_services".to_string()]),
            before
        );
    }

    #[tokio::test]
    async fn test_missing_eye_products_is_created() {
        let db = MemoryDatabase::new();
        apply(&db, &catalog_without("eye_products")).await;
        db.insert_row("departments", &[("name", "Ophthalmology")]);

        apply(&db, &catalog()).await;

        let created = db.table("eye_products").unwrap();
        assert!(!created.column("stock_quantity").unwrap().nullable);
        assert!(created
            .indexes
            .contains(&"ix_eye_products_category".to_string()));
        assert_eq!(db.row_count("departments"), 1);
    }

    #[tokio::test]
    async fn test_reset_empties_target_tables() {
        let db = MemoryDatabase::new();
        let target = catalog();
        apply(&db, &target).await;
        db.insert_row("users", &[("phone", "01700000000"), ("hashed_password", "hash")]);
        db.insert_row("departments", &[("name", "Cardiology")]);

        let report = reset(&db, &target).await;

        assert_eq!(db.table_names(), target.table_names());
        for table in target.table_names() {
            assert_eq!(db.row_count(&table), 0, "{}", table);
        }
        assert_eq!(report.dropped_tables.len(), target.len());
        assert!(report.phases.contains(&MigrationPhase::AllTablesDropped));

        let pos = |name: &str| {
            report
                .dropped_tables
                .iter()
                .position(|t| t == name)
                .unwrap()
        };
        assert!(pos("appointments") < pos("doctors"));
        assert!(pos("doctors") < pos("users"));
    }

    #[tokio::test]
    async fn test_reset_leaves_other_tables_alone() {
        let db = MemoryDatabase::new();
        let reports = TargetSchema::new(vec![TableDef::new("legacy_reports")
            .column(ColumnDef::id())
            .column(ColumnDef::new("title", SqlType::Text))])
        .unwrap();
        apply(&db, &reports).await;
        db.insert_row("legacy_reports", &[("title", "Q1")]);

        reset(&db, &catalog()).await;

        assert_eq!(db.row_count("legacy_reports"), 1);
    }

    #[tokio::test]
    async fn test_reset_on_empty_database() {
        let db = MemoryDatabase::new();

        let report = reset(&db, &catalog()).await;

        assert!(report.dropped_tables.is_empty());
        assert_eq!(db.table_names().len(), 9);
    }

    #[tokio::test]
    async fn test_unreachable_database() {
        let db = MemoryDatabase::unreachable();

        let err = MigrationRunner::new(&catalog())
            .run(db.store(), MigrationMode::Apply)
            .await
            .unwrap_err();

        assert!(matches!(err, MigrateError::Connection(_)));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(db.statements_attempted(), 0);
    }

    #[tokio::test]
    async fn test_role_without_ddl_privilege() {
        let db = MemoryDatabase::new().without_ddl_privilege();

        let err = MigrationRunner::new(&catalog())
            .run(db.store(), MigrationMode::Reset)
            .await
            .unwrap_err();

        assert!(matches!(err, MigrateError::Permission(_)));
        assert_eq!(db.statements_attempted(), 0);
    }

    #[tokio::test]
    async fn test_conflict_halts_before_any_statement() {
        let db = MemoryDatabase::new();
        let legacy = TargetSchema::new(vec![TableDef::new("users")
            .column(ColumnDef::id())
            .column(ColumnDef::new("phone", SqlType::BigInt).not_null().unique())])
        .unwrap();
        apply(&db, &legacy).await;
        let attempted = db.statements_attempted();

        let err = MigrationRunner::new(&catalog())
            .run(db.store(), MigrationMode::Apply)
            .await
            .unwrap_err();

        match err {
            MigrateError::Conflict(conflicts) => {
                assert_eq!(conflicts.len(), 1);
                assert!(conflicts[0].contains("users.phone"));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(db.statements_attempted(), attempted);
        assert_eq!(db.table_names(), vec!["users".to_string()]);
    }

    #[tokio::test]
    async fn test_new_unique_column_on_populated_table_halts() {
        let db = MemoryDatabase::new();
        let users = TableDef::new("users")
            .column(ColumnDef::id())
            .column(ColumnDef::new("phone", SqlType::Varchar(Some(20))).not_null());
        apply(&db, &TargetSchema::new(vec![users.clone()]).unwrap()).await;
        db.insert_row("users", &[("phone", "01700000000")]);
        db.insert_row("users", &[("phone", "01800000000")]);
        let attempted = db.statements_attempted();

        let target = TargetSchema::new(vec![users.column(
            ColumnDef::new("code", SqlType::Varchar(Some(20)))
                .not_null()
                .unique(),
        )])
        .unwrap();
        let err = MigrationRunner::new(&target)
            .run(db.store(), MigrationMode::Apply)
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), 3);
        match err {
            MigrateError::Conflict(conflicts) => {
                assert_eq!(conflicts.len(), 1);
                assert!(conflicts[0].contains("users.code"));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(db.statements_attempted(), attempted);
        assert!(db.table("users").unwrap().column("code").is_none());
    }

    #[tokio::test]
    async fn test_reset_resolves_conflicts() {
        let db = MemoryDatabase::new();
        let legacy = TargetSchema::new(vec![TableDef::new("users")
            .column(ColumnDef::id())
            .column(ColumnDef::new("phone", SqlType::BigInt).not_null().unique())])
        .unwrap();
        apply(&db, &legacy).await;

        reset(&db, &catalog()).await;

        let phone = db.table("users").unwrap().column("phone").cloned().unwrap();
        assert_eq!(phone.sql_type, SqlType::Varchar(Some(20)));
    }

    #[tokio::test]
    async fn test_failure_mid_run_changes_nothing() {
        let db = MemoryDatabase::new().fail_on_statement(5);
        let target = catalog();

        let err = MigrationRunner::new(&target)
            .run(db.store(), MigrationMode::Apply)
            .await
            .unwrap_err();

        assert!(matches!(err, MigrateError::Database(_)));
        assert!(db.table_names().is_empty());
        assert!(db.committed_statements().is_empty());

        db.clear_failure();
        apply(&db, &target).await;
        assert_eq!(db.table_names(), target.table_names());
    }

    #[tokio::test]
    async fn test_failed_reset_keeps_data() {
        let db = MemoryDatabase::new();
        let target = catalog();
        apply(&db, &target).await;
        db.insert_row("users", &[("phone", "01700000000"), ("hashed_password", "hash")]);

        let db = db.fail_on_statement(12);
        let err = MigrationRunner::new(&target)
            .run(db.store(), MigrationMode::Reset)
            .await
            .unwrap_err();

        assert!(matches!(err, MigrateError::Database(_)));
        assert_eq!(db.row_count("users"), 1);
    }

    #[tokio::test]
    async fn test_untracked_columns_are_kept() {
        let db = MemoryDatabase::new();
        let mut tables = catalog().tables().to_vec();
        tables[0]
            .columns
            .push(ColumnDef::new("legacy_code", SqlType::Text));
        apply(&db, &TargetSchema::new(tables).unwrap()).await;

        let report = apply(&db, &catalog()).await;

        assert!(report.is_noop());
        assert_eq!(report.untracked, vec!["users.legacy_code".to_string()]);
        assert!(db.table("users").unwrap().column("legacy_code").is_some());
    }

    #[tokio::test]
    async fn test_plan_does_not_mutate() {
        let db = MemoryDatabase::new();
        let target = catalog();
        let runner = MigrationRunner::new(&target);

        let diff = runner
            .plan(&mut db.store(), MigrationMode::Apply)
            .await
            .unwrap();
        assert_eq!(diff.count(DiffAction::CreateTable), 9);
        assert!(db.table_names().is_empty());

        apply(&db, &target).await;
        db.insert_row("users", &[("phone", "01700000000"), ("hashed_password", "hash")]);

        let diff = runner
            .plan(&mut db.store(), MigrationMode::Apply)
            .await
            .unwrap();
        assert!(diff.is_empty());

        let diff = runner
            .plan(&mut db.store(), MigrationMode::Reset)
            .await
            .unwrap();
        assert_eq!(diff.count(DiffAction::DropTable), 9);
        assert_eq!(diff.count(DiffAction::CreateTable), 9);
        assert_eq!(db.row_count("users"), 1);
    }

    #[tokio::test]
    async fn test_report_summary() {
        let db = MemoryDatabase::new();
        let target = catalog();
        apply(&db, &target).await;

        let report = reset(&db, &target).await;

        assert!(report.summary().starts_with("drop 9 table(s), create 9 table(s)"));
        assert!(!report.is_noop());
    }

    // PostgreSQL tests. Run with TEST_DATABASE_URL set and `--ignored`.

    #[tokio::test]
    #[ignore]
    async fn test_postgres_apply_then_reapply() {
        use crate::testing::TestDatabase;

        let db = TestDatabase::from_env().await.unwrap();
        let config = db.fresh_schema("apply_then_reapply").await.unwrap();
        let target = catalog();

        let first = migrate(db.database(), &target, &config, MigrationMode::Apply)
            .await
            .unwrap();
        assert!(first.applied.len() > target.len());

        let second = migrate(db.database(), &target, &config, MigrationMode::Apply)
            .await
            .unwrap();
        assert!(second.is_noop(), "{:?}", second.applied);
        assert!(second.untracked.is_empty());

        db.drop_schema(&config).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_postgres_adds_profile_columns_to_populated_users() {
        use crate::testing::TestDatabase;

        let db = TestDatabase::from_env().await.unwrap();
        let config = db.fresh_schema("profile_columns").await.unwrap();

        migrate(db.database(), &first_release(), &config, MigrationMode::Apply)
            .await
            .unwrap();
        db.execute(&format!(
            "INSERT INTO {}.users (phone, hashed_password) VALUES ('01700000000', 'hash')",
            config.schema
        ))
        .await
        .unwrap();

        let report = migrate(db.database(), &catalog(), &config, MigrationMode::Apply)
            .await
            .unwrap();
        assert_eq!(report.applied.len(), USER_PROFILE_COLUMNS.len());

        let (count,): (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {}.users WHERE nid IS NULL",
            config.schema
        ))
        .fetch_one(db.database().pool())
        .await
        .unwrap();
        assert_eq!(count, 1);

        db.drop_schema(&config).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_postgres_reset() {
        use crate::testing::TestDatabase;

        let db = TestDatabase::from_env().await.unwrap();
        let config = db.fresh_schema("reset").await.unwrap();
        let target = catalog();

        migrate(db.database(), &target, &config, MigrationMode::Apply)
            .await
            .unwrap();
        db.execute(&format!(
            "INSERT INTO {}.departments (name) VALUES ('Cardiology')",
            config.schema
        ))
        .await
        .unwrap();

        let report = migrate(db.database(), &target, &config, MigrationMode::Reset)
            .await
            .unwrap();
        assert_eq!(report.dropped_tables.len(), target.len());

        let (count,): (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM {}.departments", config.schema))
                .fetch_one(db.database().pool())
                .await
                .unwrap();
        assert_eq!(count, 0);

        db.drop_schema(&config).await.unwrap();
    }
}
