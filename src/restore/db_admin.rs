// dbrestore/src/restore/db_admin.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Executor};

use crate::config::ConnectionConfig;
use crate::errors::RestoreError;
use crate::restore::events::ProgressReporter;

/// Maintenance database every PostgreSQL server has.
pub const ADMIN_DATABASE: &str = "postgres";

/// Server operations needed by a restore run.
#[async_trait]
pub trait DatabaseServer: Send + Sync {
    /// Looks up `conn.database` in `pg_database` through the admin database.
    async fn database_exists(&self, conn: &ConnectionConfig) -> Result<bool>;

    /// Issues `CREATE DATABASE` for `conn.database` through the admin database.
    async fn create_database(&self, conn: &ConnectionConfig) -> Result<()>;

    /// Opens a connection to `conn.database` itself.
    async fn open_session(&self, conn: &ConnectionConfig) -> Result<Box<dyn ScriptSession>>;
}

/// A single open connection that runs SQL text as-is.
#[async_trait]
pub trait ScriptSession: Send {
    async fn execute_batch(&mut self, sql: &str) -> Result<()>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Quotes a name for use as a SQL identifier.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `DatabaseServer` backed by plain sqlx connections, one per operation.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgServer;

impl PgServer {
    fn connect_options(conn: &ConnectionConfig, database: &str) -> Result<PgConnectOptions> {
        Ok(PgConnectOptions::new()
            .host(conn.host.trim())
            .port(conn.port_number()?)
            .username(conn.username.trim())
            .password(conn.password())
            .database(database)
            .application_name(env!("CARGO_PKG_NAME")))
    }

    async fn connect(conn: &ConnectionConfig, database: &str) -> Result<PgConnection> {
        let options = Self::connect_options(conn, database)?;
        tracing::debug!(host = %conn.host, port = %conn.port, database, "connecting");
        PgConnection::connect_with(&options).await.with_context(|| {
            format!(
                "Failed to connect to database '{}' on {}:{}",
                database, conn.host, conn.port
            )
        })
    }
}

#[async_trait]
impl DatabaseServer for PgServer {
    async fn database_exists(&self, conn: &ConnectionConfig) -> Result<bool> {
        let mut admin = Self::connect(conn, ADMIN_DATABASE).await?;
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
                .bind(&conn.database)
                .fetch_one(&mut admin)
                .await
                .with_context(|| format!("Failed to check existence of database '{}'", conn.database))?;
        if let Err(e) = admin.close().await {
            tracing::debug!(error = %e, "closing admin connection failed");
        }
        Ok(exists)
    }

    async fn create_database(&self, conn: &ConnectionConfig) -> Result<()> {
        let mut admin = Self::connect(conn, ADMIN_DATABASE).await?;
        let create_sql = format!("CREATE DATABASE {}", quote_identifier(&conn.database));
        Executor::execute(&mut admin, create_sql.as_str()).await?;
        if let Err(e) = admin.close().await {
            tracing::debug!(error = %e, "closing admin connection failed");
        }
        Ok(())
    }

    async fn open_session(&self, conn: &ConnectionConfig) -> Result<Box<dyn ScriptSession>> {
        let connection = Self::connect(conn, &conn.database).await?;
        Ok(Box::new(PgSession { connection }))
    }
}

struct PgSession {
    connection: PgConnection,
}

#[async_trait]
impl ScriptSession for PgSession {
    async fn execute_batch(&mut self, sql: &str) -> Result<()> {
        // No bound arguments: simple query protocol, so a file may hold any
        // number of statements.
        Executor::execute(&mut self.connection, sql).await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.connection
            .close()
            .await
            .context("Failed to close script connection")
    }
}

/// Decides whether the target database is already present.
///
/// Any failure to find out counts as "exists": the run must never go on to
/// restore over a database it could not see.
pub async fn check_database_exists(
    server: &dyn DatabaseServer,
    conn: &ConnectionConfig,
    reporter: &ProgressReporter,
) -> bool {
    match server.database_exists(conn).await {
        Ok(true) => {
            reporter.info(format!(
                "Database '{}' already exists on the server",
                conn.database
            ));
            true
        }
        Ok(false) => {
            reporter.info(format!(
                "Database '{}' does not exist on the server",
                conn.database
            ));
            false
        }
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "database existence check failed");
            reporter.error(format!("Error checking database existence: {:#}", e));
            true
        }
    }
}

pub async fn create_database(
    server: &dyn DatabaseServer,
    conn: &ConnectionConfig,
    reporter: &ProgressReporter,
) -> crate::errors::Result<()> {
    match server.create_database(conn).await {
        Ok(()) => {
            reporter.info(format!("Database '{}' created", conn.database));
            Ok(())
        }
        Err(source) => {
            reporter.error(format!("Error creating database: {:#}", source));
            Err(RestoreError::CreateDatabase {
                database: conn.database.clone(),
                source,
            })
        }
    }
}
