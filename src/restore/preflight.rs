// dbrestore/src/restore/preflight.rs
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};

use crate::config::RestoreRequest;

/// Returns the labels of all blank required fields, in form order.
pub fn validate(request: &RestoreRequest) -> Result<(), Vec<&'static str>> {
    let conn = &request.connection;
    let paths = &request.paths;
    let fields: [(&'static str, &str); 8] = [
        ("Backup File", paths.backup_file.as_str()),
        ("Scripts Folder", paths.scripts_folder.as_str()),
        ("Host", conn.host.as_str()),
        ("Port", conn.port.as_str()),
        ("Username", conn.username.as_str()),
        ("Password", conn.password.expose_secret().as_str()),
        ("Database", conn.database.as_str()),
        ("pg_restore Path", paths.restore_tool.as_str()),
    ];

    let missing: Vec<&'static str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(label, _)| *label)
        .collect();

    if missing.is_empty() { Ok(()) } else { Err(missing) }
}

/// Resolves `path` against the working directory.
pub fn absolute_path(path: &str) -> PathBuf {
    let raw = Path::new(path.trim());
    std::path::absolute(raw).unwrap_or_else(|_| raw.to_path_buf())
}

/// `Ok` with the absolute path when the backup file exists, `Err` with the
/// path that was looked at otherwise.
pub fn check_backup_file(backup_file: &str) -> Result<PathBuf, PathBuf> {
    let resolved = absolute_path(backup_file);
    if resolved.is_file() { Ok(resolved) } else { Err(resolved) }
}
