// dbrestore/src/restore/scripts.rs
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::ConnectionConfig;
use crate::errors::{RestoreError, Result};
use crate::restore::db_admin::DatabaseServer;
use crate::restore::events::ProgressReporter;
use crate::restore::preflight::absolute_path;

pub const SCRIPT_EXTENSION: &str = "sql";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFile {
    pub path: PathBuf,
    pub name: String,
}

/// Why no script was executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSkip {
    FolderMissing(PathBuf),
    NoScripts(PathBuf),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptSummary {
    pub discovered: usize,
    pub succeeded: Vec<String>,
    /// `(file name, error message)` for every script that failed.
    pub failed: Vec<(String, String)>,
    pub skipped: Option<ScriptSkip>,
}

impl ScriptSummary {
    fn skipped(reason: ScriptSkip) -> Self {
        ScriptSummary {
            skipped: Some(reason),
            ..ScriptSummary::default()
        }
    }
}

/// Lists `*.sql` files directly inside `folder` (the extension check ignores
/// ASCII case), ordered by plain string comparison of their full paths.
pub fn discover_scripts(folder: &Path) -> std::result::Result<Vec<ScriptFile>, walkdir::Error> {
    let mut scripts = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).max_depth(1).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_script = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(SCRIPT_EXTENSION));
        if is_script {
            scripts.push(ScriptFile {
                path: entry.path().to_path_buf(),
                name: entry.file_name().to_string_lossy().into_owned(),
            });
        }
    }
    scripts.sort_by(|a, b| a.path.to_string_lossy().cmp(&b.path.to_string_lossy()));
    Ok(scripts)
}

/// Runs every script of `scripts_folder` against the restored database over
/// one connection. A failing script is logged and the next one still runs.
pub async fn run_scripts(
    server: &dyn DatabaseServer,
    conn: &ConnectionConfig,
    scripts_folder: &str,
    reporter: &ProgressReporter,
) -> Result<ScriptSummary> {
    let folder = absolute_path(scripts_folder);
    if !folder.is_dir() {
        reporter.info(format!("Scripts folder not found: {}", folder.display()));
        return Ok(ScriptSummary::skipped(ScriptSkip::FolderMissing(folder)));
    }

    let scripts = discover_scripts(&folder).map_err(|source| RestoreError::ScriptFolder {
        folder: folder.display().to_string(),
        source,
    })?;
    if scripts.is_empty() {
        reporter.info("No SQL scripts found in the specified folder");
        return Ok(ScriptSummary::skipped(ScriptSkip::NoScripts(folder)));
    }
    reporter.info(format!("Found {} SQL scripts to execute", scripts.len()));

    let mut session = server
        .open_session(conn)
        .await
        .map_err(|source| RestoreError::ScriptConnection {
            database: conn.database.clone(),
            source,
        })?;

    let mut summary = ScriptSummary {
        discovered: scripts.len(),
        ..ScriptSummary::default()
    };
    for script in &scripts {
        reporter.info(format!("Executing script: {}", script.name));
        let outcome = match tokio::fs::read_to_string(&script.path).await {
            Ok(sql) => session.execute_batch(&sql).await.map_err(|e| format!("{:#}", e)),
            Err(e) => Err(format!("failed to read {}: {}", script.path.display(), e)),
        };
        match outcome {
            Ok(()) => {
                reporter.info(format!("Script executed successfully: {}", script.name));
                summary.succeeded.push(script.name.clone());
            }
            Err(message) => {
                tracing::warn!(script = %script.name, error = %message, "script failed");
                reporter.error(format!("Error executing script {}: {}", script.name, message));
                summary.failed.push((script.name.clone(), message));
            }
        }
    }

    if let Err(e) = session.close().await {
        tracing::warn!(error = %format!("{:#}", e), "closing script connection failed");
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restore::events::testing::{drain, errors, messages, reporter};
    use crate::restore::fakes::{FAILING_SQL_MARKER, FakeServer, ServerCall, request};
    use std::fs;

    fn write_scripts(dir: &Path, files: &[(&str, &str)]) {
        for (name, body) in files {
            fs::write(dir.join(name), body).unwrap();
        }
    }

    #[test]
    fn test_discovery_is_lexical_flat_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write_scripts(
            dir.path(),
            &[
                ("b.sql", "select 2;"),
                ("A.sql", "select 1;"),
                ("c.sql", "select 3;"),
                ("D.SQL", "select 4;"),
                ("notes.txt", "not sql"),
                ("10_late.sql", "select 10;"),
            ],
        );
        fs::create_dir(dir.path().join("nested.sql")).unwrap();
        fs::write(dir.path().join("nested.sql").join("inner.sql"), "select 0;").unwrap();

        let scripts = discover_scripts(dir.path()).unwrap();
        let names: Vec<&str> = scripts.iter().map(|s| s.name.as_str()).collect();

        assert_eq!(names, vec!["10_late.sql", "A.sql", "D.SQL", "b.sql", "c.sql"]);
        assert!(scripts.iter().all(|s| s.path.starts_with(dir.path())));
    }

    #[tokio::test]
    async fn test_scripts_run_in_lexical_path_order() {
        let dir = tempfile::tempdir().unwrap();
        write_scripts(
            dir.path(),
            &[("b.sql", "-- b"), ("A.sql", "-- A"), ("c.sql", "-- c")],
        );
        let server = FakeServer::default();
        let request = request("pw");
        let (reporter, _rx) = reporter();

        let summary = run_scripts(&server, &request.connection, dir.path().to_str().unwrap(), &reporter)
            .await
            .unwrap();

        assert_eq!(server.executed(), vec!["-- A", "-- b", "-- c"]);
        assert_eq!(summary.succeeded, vec!["A.sql", "b.sql", "c.sql"]);
        assert_eq!(summary.discovered, 3);
        let calls = server.calls();
        assert_eq!(calls.first(), Some(&ServerCall::OpenSession("restore_target".to_string())));
        assert_eq!(calls.last(), Some(&ServerCall::Close));
    }

    #[tokio::test]
    async fn test_failing_script_does_not_stop_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let failing = format!("SELECT {};", FAILING_SQL_MARKER);
        write_scripts(
            dir.path(),
            &[("01_broken.sql", failing.as_str()), ("02_fine.sql", "SELECT 1;")],
        );
        let server = FakeServer::default();
        let request = request("pw");
        let (reporter, mut rx) = reporter();

        let summary = run_scripts(&server, &request.connection, dir.path().to_str().unwrap(), &reporter)
            .await
            .unwrap();

        assert_eq!(server.executed().len(), 2);
        assert_eq!(summary.succeeded, vec!["02_fine.sql"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "01_broken.sql");

        let events = drain(&mut rx);
        let errors = errors(&events);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Error executing script 01_broken.sql: syntax error"));
        assert!(messages(&events).contains(&"Script executed successfully: 02_fine.sql".to_string()));
        assert_eq!(server.calls().last(), Some(&ServerCall::Close));
    }

    #[tokio::test]
    async fn test_missing_folder_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-folder");
        let server = FakeServer::default();
        let request = request("pw");
        let (reporter, mut rx) = reporter();

        let summary = run_scripts(&server, &request.connection, missing.to_str().unwrap(), &reporter)
            .await
            .unwrap();

        assert_eq!(summary.skipped, Some(ScriptSkip::FolderMissing(missing.clone())));
        assert!(server.calls().is_empty());
        assert_eq!(
            messages(&drain(&mut rx)),
            vec![format!("Scripts folder not found: {}", missing.display())]
        );
    }

    #[tokio::test]
    async fn test_empty_folder_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("readme.md"), "nothing to run").unwrap();
        let server = FakeServer::default();
        let request = request("pw");
        let (reporter, mut rx) = reporter();

        let summary = run_scripts(&server, &request.connection, dir.path().to_str().unwrap(), &reporter)
            .await
            .unwrap();

        assert!(matches!(summary.skipped, Some(ScriptSkip::NoScripts(_))));
        assert!(server.calls().is_empty());
        assert_eq!(
            messages(&drain(&mut rx)),
            vec!["No SQL scripts found in the specified folder"]
        );
    }

    #[tokio::test]
    async fn test_connection_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_scripts(dir.path(), &[("a.sql", "SELECT 1;")]);
        let server = FakeServer {
            session_error: Some("database \"restore_target\" does not exist".to_string()),
            ..FakeServer::default()
        };
        let request = request("pw");
        let (reporter, _rx) = reporter();

        let err = run_scripts(&server, &request.connection, dir.path().to_str().unwrap(), &reporter)
            .await
            .unwrap_err();

        assert!(matches!(err, RestoreError::ScriptConnection { .. }));
        assert!(server.executed().is_empty());
    }
}
