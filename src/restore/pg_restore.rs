// dbrestore/src/restore/pg_restore.rs
use async_trait::async_trait;
use regex::{Captures, Regex};
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use which::which;

use crate::config::{ConnectionConfig, RestoreRequest};
use crate::errors::{RestoreError, Result};
use crate::restore::events::{LogLevel, ProgressReporter};

/// Environment variable libpq reads the password from.
pub const PASSWORD_ENV: &str = "PGPASSWORD";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%([A-Za-z_][A-Za-z0-9_()]*)%|\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("placeholder pattern is valid")
});

/// Replaces `%VAR%`, `${VAR}` and `$VAR` with environment values.
/// Unknown variables are kept verbatim.
pub fn expand_env_placeholders(raw: &str) -> String {
    PLACEHOLDER
        .replace_all(raw, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str());
            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Expands a leading `~` to the current user's home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    let rest = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') => rest,
        _ => return PathBuf::from(raw),
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
        None => PathBuf::from(raw),
    }
}

/// Turns the configured restore tool into an executable path. A bare program
/// name that is not a file in the working directory is looked up on `PATH`.
pub fn resolve_tool_path(raw: &str) -> PathBuf {
    let path = expand_home(&expand_env_placeholders(raw.trim()));
    let mut components = path.components();
    let is_bare_name = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if is_bare_name && !path.exists() {
        match which(&path) {
            Ok(found) => return found,
            Err(e) => tracing::debug!(tool = %path.display(), error = %e, "restore tool not found on PATH"),
        }
    }
    path
}

/// `-h <host> -p <port> -U <username> -d <database> -Fc -v <backup>`
pub fn restore_arguments(conn: &ConnectionConfig, backup_file: &Path) -> Vec<String> {
    vec![
        "-h".to_string(),
        conn.host.trim().to_string(),
        "-p".to_string(),
        conn.port.trim().to_string(),
        "-U".to_string(),
        conn.username.trim().to_string(),
        "-d".to_string(),
        conn.database.clone(),
        "-Fc".to_string(),
        "-v".to_string(),
        backup_file.to_string_lossy().into_owned(),
    ]
}

/// Renders a command for the log; arguments with spaces are quoted.
pub fn format_command_line(program: &Path, args: &[String]) -> String {
    let mut line = program.display().to_string();
    for arg in args {
        line.push(' ');
        if arg.is_empty() || arg.chars().any(char::is_whitespace) {
            line.push('"');
            line.push_str(arg);
            line.push('"');
        } else {
            line.push_str(arg);
        }
    }
    line
}

/// One launch of the restore tool. The password travels separately from the
/// argument list and is only ever placed in the child's environment.
pub struct RestoreInvocation<'a> {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub password: &'a str,
}

#[async_trait]
pub trait RestoreTool: Send + Sync {
    /// Runs the tool to completion, forwarding its output, and returns its
    /// exit code (`None` when it was killed by a signal).
    async fn run(
        &self,
        invocation: &RestoreInvocation<'_>,
        reporter: &ProgressReporter,
    ) -> Result<Option<i32>>;
}

/// Runs the real `pg_restore` binary as a child process.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgRestoreProcess;

#[async_trait]
impl RestoreTool for PgRestoreProcess {
    async fn run(
        &self,
        invocation: &RestoreInvocation<'_>,
        reporter: &ProgressReporter,
    ) -> Result<Option<i32>> {
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .env(PASSWORD_ENV, invocation.password)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RestoreError::RestoreToolSpawn {
                tool: invocation.program.display().to_string(),
                source,
            })?;
        tracing::debug!(pid = ?child.id(), "restore tool started");

        let mut forwarders = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(tokio::spawn(forward_lines(stdout, reporter.clone(), LogLevel::Info)));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(tokio::spawn(forward_lines(stderr, reporter.clone(), LogLevel::Error)));
        }

        let status = child.wait().await.map_err(RestoreError::RestoreToolWait)?;
        for forwarder in forwarders {
            if let Err(e) = forwarder.await {
                tracing::warn!(error = %e, "output forwarder stopped abnormally");
            }
        }
        tracing::debug!(%status, "restore tool exited");
        Ok(status.code())
    }
}

/// Relays a child pipe to the log one line at a time as output arrives.
/// Bytes that are not UTF-8 are replaced rather than ending the relay.
async fn forward_lines<R>(reader: R, reporter: ProgressReporter, level: LogLevel)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                match level {
                    LogLevel::Info => reporter.info(line),
                    LogLevel::Error => reporter.error(line),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read restore tool output");
                break;
            }
        }
    }
}

/// Restores `backup_file` into the already created target database.
pub async fn run_restore(
    tool: &dyn RestoreTool,
    request: &RestoreRequest,
    backup_file: &Path,
    reporter: &ProgressReporter,
) -> Result<()> {
    let program = resolve_tool_path(&request.paths.restore_tool);
    let args = restore_arguments(&request.connection, backup_file);
    reporter.info(format!("Starting: {}", format_command_line(&program, &args)));

    let invocation = RestoreInvocation {
        program,
        args,
        password: request.connection.password(),
    };
    match tool.run(&invocation, reporter).await? {
        Some(0) => {
            reporter.info("Restore completed successfully");
            Ok(())
        }
        Some(code) => Err(RestoreError::RestoreToolExit { code }),
        None => Err(RestoreError::RestoreToolKilled),
    }
}
