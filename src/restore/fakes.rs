// dbrestore/src/restore/fakes.rs
//! In-memory stand-ins for the database server and restore tool.

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::{Arc, Mutex};

use crate::config::{ConnectionConfig, RestoreRequest, Settings};
use crate::errors::RestoreError;
use crate::restore::db_admin::{DatabaseServer, ScriptSession};
use crate::restore::events::ProgressReporter;
use crate::restore::pg_restore::{RestoreInvocation, RestoreTool};

/// SQL containing this marker fails in a fake session.
pub const FAILING_SQL_MARKER: &str = "RAISE_FAILURE";

pub fn request(password: &str) -> RestoreRequest {
    Settings::default().to_request(SecretString::new(password.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCall {
    Exists(String),
    Create(String),
    OpenSession(String),
    Execute(String),
    Close,
}

#[derive(Debug)]
pub struct FakeServer {
    pub exists: std::result::Result<bool, String>,
    pub create_error: Option<String>,
    pub session_error: Option<String>,
    pub calls: Arc<Mutex<Vec<ServerCall>>>,
}

impl Default for FakeServer {
    fn default() -> Self {
        FakeServer {
            exists: Ok(false),
            create_error: None,
            session_error: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl FakeServer {
    pub fn existing() -> Self {
        FakeServer {
            exists: Ok(true),
            ..FakeServer::default()
        }
    }

    pub fn unreachable(message: &str) -> Self {
        FakeServer {
            exists: Err(message.to_string()),
            ..FakeServer::default()
        }
    }

    pub fn calls(&self) -> Vec<ServerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ServerCall::Execute(sql) => Some(sql),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ServerCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DatabaseServer for FakeServer {
    async fn database_exists(&self, conn: &ConnectionConfig) -> Result<bool> {
        self.record(ServerCall::Exists(conn.database.clone()));
        self.exists.clone().map_err(|message| anyhow::anyhow!(message))
    }

    async fn create_database(&self, conn: &ConnectionConfig) -> Result<()> {
        self.record(ServerCall::Create(conn.database.clone()));
        match &self.create_error {
            Some(message) => Err(anyhow::anyhow!(message.clone())),
            None => Ok(()),
        }
    }

    async fn open_session(&self, conn: &ConnectionConfig) -> Result<Box<dyn ScriptSession>> {
        self.record(ServerCall::OpenSession(conn.database.clone()));
        if let Some(message) = &self.session_error {
            return Err(anyhow::anyhow!(message.clone()));
        }
        Ok(Box::new(FakeSession {
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct FakeSession {
    calls: Arc<Mutex<Vec<ServerCall>>>,
}

#[async_trait]
impl ScriptSession for FakeSession {
    async fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.calls.lock().unwrap().push(ServerCall::Execute(sql.to_string()));
        if sql.contains(FAILING_SQL_MARKER) {
            anyhow::bail!("syntax error at or near \"{}\"", FAILING_SQL_MARKER);
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.calls.lock().unwrap().push(ServerCall::Close);
        Ok(())
    }
}

/// Restore tool that prints one line on each stream and exits with `exit_code`.
#[derive(Debug, Default)]
pub struct FakeTool {
    pub exit_code: Option<i32>,
    pub invocations: Mutex<Vec<(String, Vec<String>, String)>>,
}

impl FakeTool {
    pub fn exiting_with(code: i32) -> Self {
        FakeTool {
            exit_code: Some(code),
            ..FakeTool::default()
        }
    }

    pub fn invocations(&self) -> Vec<(String, Vec<String>, String)> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl RestoreTool for FakeTool {
    async fn run(
        &self,
        invocation: &RestoreInvocation<'_>,
        reporter: &ProgressReporter,
    ) -> std::result::Result<Option<i32>, RestoreError> {
        self.invocations.lock().unwrap().push((
            invocation.program.display().to_string(),
            invocation.args.clone(),
            invocation.password.to_string(),
        ));
        reporter.info("pg_restore: processing item 1 TABLE public.accounts");
        reporter.error("pg_restore: warning: errors ignored on restore: 0");
        Ok(self.exit_code)
    }
}
