// dbrestore/src/restore/logic.rs
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::RestoreRequest;
use crate::errors::Result;
use crate::restore::db_admin::{DatabaseServer, PgServer, check_database_exists, create_database};
use crate::restore::events::{Phase, ProgressReporter};
use crate::restore::pg_restore::{PgRestoreProcess, RestoreTool, run_restore};
use crate::restore::preflight;
use crate::restore::scripts::{ScriptSummary, run_scripts};

/// Why a run stopped before touching the server. Not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    MissingFields(Vec<&'static str>),
    BackupFileMissing(PathBuf),
    DatabaseExists(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::MissingFields(fields) => {
                write!(f, "required fields are not filled in: {}", fields.join(", "))
            }
            AbortReason::BackupFileMissing(path) => {
                write!(f, "backup file not found: {}", path.display())
            }
            AbortReason::DatabaseExists(name) => write!(
                f,
                "database '{}' already exists or its existence could not be verified",
                name
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    Completed(ScriptSummary),
    Aborted(AbortReason),
}

/// Drives one restore run from validation to the post-restore scripts.
pub struct RestoreOrchestrator {
    server: Arc<dyn DatabaseServer>,
    tool: Arc<dyn RestoreTool>,
}

impl RestoreOrchestrator {
    pub fn new(server: Arc<dyn DatabaseServer>, tool: Arc<dyn RestoreTool>) -> Self {
        RestoreOrchestrator { server, tool }
    }

    /// PostgreSQL over sqlx plus the `pg_restore` binary.
    pub fn postgres() -> Self {
        Self::new(Arc::new(PgServer), Arc::new(PgRestoreProcess))
    }

    /// Runs every phase in order. Early exits come back as
    /// `Ok(RunReport::Aborted(_))`; faults are logged and returned as `Err`.
    pub async fn run(&self, request: RestoreRequest, reporter: &ProgressReporter) -> Result<RunReport> {
        match self.execute(&request, reporter).await {
            Ok(report) => Ok(report),
            Err(e) => {
                reporter.error(format!("Error during restore: {}", e));
                reporter.phase(Phase::Failed);
                Err(e)
            }
        }
    }

    async fn execute(&self, request: &RestoreRequest, reporter: &ProgressReporter) -> Result<RunReport> {
        let conn = &request.connection;

        begin(reporter, Phase::Validating, "Validating parameters...");
        if let Err(missing) = preflight::validate(request) {
            reporter.info("Required fields are not filled in:");
            for field in &missing {
                reporter.info(format!("- {}", field));
            }
            return Ok(RunReport::Aborted(AbortReason::MissingFields(missing)));
        }

        begin(reporter, Phase::CheckingFile, "Checking backup file...");
        let backup_file = match preflight::check_backup_file(&request.paths.backup_file) {
            Ok(path) => path,
            Err(path) => {
                reporter.info(format!("Backup file not found: {}", path.display()));
                return Ok(RunReport::Aborted(AbortReason::BackupFileMissing(path)));
            }
        };

        begin(
            reporter,
            Phase::CheckingExistence,
            format!("Checking whether database '{}' exists...", conn.database),
        );
        if check_database_exists(self.server.as_ref(), conn, reporter).await {
            return Ok(RunReport::Aborted(AbortReason::DatabaseExists(conn.database.clone())));
        }

        begin(reporter, Phase::CreatingDatabase, "Creating database...");
        create_database(self.server.as_ref(), conn, reporter).await?;

        begin(reporter, Phase::Restoring, "Starting backup restore...");
        run_restore(self.tool.as_ref(), request, &backup_file, reporter).await?;

        begin(reporter, Phase::RunningScripts, "Executing SQL scripts...");
        let summary = run_scripts(self.server.as_ref(), conn, &request.paths.scripts_folder, reporter).await?;

        begin(reporter, Phase::Completed, "Restore process completed successfully!");
        Ok(RunReport::Completed(summary))
    }
}

fn begin(reporter: &ProgressReporter, phase: Phase, message: impl Into<String>) {
    reporter.phase(phase);
    reporter.info(message);
}
