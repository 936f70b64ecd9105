// dbrestore/src/config/mod.rs
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

#[cfg(windows)]
const DEFAULT_PG_RESTORE_PATH: &str = r"~\AppData\Local\Programs\pgAdmin 4\runtime\pg_restore.exe";
#[cfg(not(windows))]
const DEFAULT_PG_RESTORE_PATH: &str = "pg_restore";

/// Values remembered between runs. The password is deliberately not a field
/// here, so it can never reach the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub backup_file: String,
    pub scripts_folder: String,
    pub host: String,
    pub port: String,
    pub username: String,
    pub database: String,
    pub pg_restore_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            backup_file: "./backups/latest.backup".to_string(),
            scripts_folder: "./scripts".to_string(),
            host: "localhost".to_string(),
            port: "5432".to_string(),
            username: "postgres".to_string(),
            database: "restore_target".to_string(),
            pg_restore_path: DEFAULT_PG_RESTORE_PATH.to_string(),
        }
    }
}

/// Result of reading the settings file. Problems with the file never fail
/// the load; they are reported as warnings and the affected values fall back
/// to defaults.
#[derive(Debug)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub warnings: Vec<String>,
}

impl Settings {
    pub fn load_or_default(path: &Path) -> LoadedSettings {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "settings file not found, using defaults");
            return LoadedSettings {
                settings: Settings::default(),
                warnings: Vec::new(),
            };
        }

        match read_document(path) {
            Ok(document) => Self::from_document(&document),
            Err(e) => LoadedSettings {
                settings: Settings::default(),
                warnings: vec![format!("{:#}. Default settings will be used.", e)],
            },
        }
    }

    fn from_document(document: &Map<String, Value>) -> LoadedSettings {
        let defaults = Settings::default();
        let mut warnings = Vec::new();
        let mut field = |key: &str, default: String| string_field(document, key, default, &mut warnings);

        let settings = Settings {
            backup_file: field("backup_file", defaults.backup_file),
            scripts_folder: field("scripts_folder", defaults.scripts_folder),
            host: field("host", defaults.host),
            port: field("port", defaults.port),
            username: field("username", defaults.username),
            database: field("database", defaults.database),
            pg_restore_path: field("pg_restore_path", defaults.pg_restore_path),
        };

        LoadedSettings { settings, warnings }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write settings file at {}", path.display()))
    }

    /// Builds the immutable input of one restore run.
    pub fn to_request(&self, password: SecretString) -> RestoreRequest {
        RestoreRequest {
            connection: ConnectionConfig {
                host: self.host.clone(),
                port: self.port.clone(),
                username: self.username.clone(),
                password,
                database: self.database.clone(),
            },
            paths: RestorePaths {
                backup_file: self.backup_file.clone(),
                scripts_folder: self.scripts_folder.clone(),
                restore_tool: self.pg_restore_path.clone(),
            },
        }
    }
}

fn read_document(path: &Path) -> Result<Map<String, Value>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file at {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON from settings file at {}", path.display()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(anyhow::anyhow!(
            "Settings file at {} does not contain a JSON object",
            path.display()
        )),
    }
}

fn string_field(
    document: &Map<String, Value>,
    key: &str,
    default: String,
    warnings: &mut Vec<String>,
) -> String {
    match document.get(key) {
        None | Some(Value::Null) => default,
        Some(Value::String(value)) => value.clone(),
        Some(other) => {
            warnings.push(format!(
                "Setting '{}' has unexpected value {}; using default '{}'",
                key, other, default
            ));
            default
        }
    }
}

/// Server connection parameters for one run.
#[derive(Debug)]
pub struct ConnectionConfig {
    pub host: String,
    /// Kept as entered; parsed only when a server connection is built.
    pub port: String,
    pub username: String,
    pub password: SecretString,
    pub database: String,
}

impl ConnectionConfig {
    pub fn port_number(&self) -> Result<u16> {
        self.port
            .trim()
            .parse::<u16>()
            .with_context(|| format!("Invalid port '{}'", self.port))
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestorePaths {
    pub backup_file: String,
    pub scripts_folder: String,
    pub restore_tool: String,
}

/// Everything the worker needs, handed over by value at run start.
#[derive(Debug)]
pub struct RestoreRequest {
    pub connection: ConnectionConfig,
    pub paths: RestorePaths,
}
