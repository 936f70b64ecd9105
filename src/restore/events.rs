// dbrestore/src/restore/events.rs
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;

/// Steps of one restore run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Validating,
    CheckingFile,
    CheckingExistence,
    CreatingDatabase,
    Restoring,
    RunningScripts,
    Completed,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Validating => "validating",
            Phase::CheckingFile => "checking backup file",
            Phase::CheckingExistence => "checking database existence",
            Phase::CreatingDatabase => "creating database",
            Phase::Restoring => "restoring",
            Phase::RunningScripts => "running scripts",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
}

/// Messages sent from the restore worker to the task that owns the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreEvent {
    PhaseStarted(Phase),
    Log { level: LogLevel, message: String },
}

/// Worker-side handle on the event channel.
///
/// Send failures are ignored: once the receiving side is gone nobody is
/// left to read the progress anyway.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    sender: UnboundedSender<RestoreEvent>,
}

impl ProgressReporter {
    pub fn new(sender: UnboundedSender<RestoreEvent>) -> Self {
        ProgressReporter { sender }
    }

    pub fn phase(&self, phase: Phase) {
        tracing::debug!(%phase, "phase started");
        let _ = self.sender.send(RestoreEvent::PhaseStarted(phase));
    }

    pub fn info(&self, message: impl Into<String>) {
        let _ = self.sender.send(RestoreEvent::Log {
            level: LogLevel::Info,
            message: message.into(),
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        let _ = self.sender.send(RestoreEvent::Log {
            level: LogLevel::Error,
            message: message.into(),
        });
    }
}
