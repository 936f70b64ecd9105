pub(crate) mod controller; // Foreground owner of the log and the run trigger
pub(crate) mod db_admin; // Existence check and database creation
pub(crate) mod events; // Worker -> foreground progress messages
pub(crate) mod logic; // Phase sequencing
pub(crate) mod pg_restore; // pg_restore subprocess
pub(crate) mod preflight; // Field validation and backup file check
pub(crate) mod scripts; // Post-restore SQL scripts

#[cfg(test)]
pub(crate) mod fakes;

pub use controller::{ConsoleSink, ControllerError, LogSink, RestoreController, RunOutcome};
pub use logic::RestoreOrchestrator;
pub use scripts::ScriptSkip;

use crate::config::RestoreRequest;

/// Public entry point for the restore process: runs one restore against
/// PostgreSQL and `pg_restore`, printing progress to `sink`.
pub async fn run_restore_flow<S: LogSink>(
    request: RestoreRequest,
    sink: S,
) -> Result<RunOutcome, ControllerError> {
    let mut controller = RestoreController::new(RestoreOrchestrator::postgres(), sink);
    let run = controller.run(request).await?;
    // A finished run always carries an outcome.
    Ok(run
        .outcome
        .clone()
        .unwrap_or_else(|| RunOutcome::Failed("restore finished without an outcome".to_string())))
}
