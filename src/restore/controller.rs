// dbrestore/src/restore/controller.rs
use chrono::Local;
use std::error::Error as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::mpsc::unbounded_channel;

use crate::config::RestoreRequest;
use crate::errors::RestoreError;
use crate::restore::events::{LogLevel, Phase, ProgressReporter, RestoreEvent};
use crate::restore::logic::{AbortReason, RestoreOrchestrator, RunReport};
use crate::restore::scripts::ScriptSummary;

/// Append-only destination of the timestamped progress log.
pub trait LogSink: Send {
    fn append(&mut self, line: &str);

    /// Called when a new run starts.
    fn clear(&mut self) {}
}

/// Prints each line to stdout as it arrives.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn append(&mut self, line: &str) {
        println!("{}", line);
    }
}

/// The "restore" trigger. Disabled while a run holds its permit.
#[derive(Debug, Default)]
pub struct RunGate {
    running: AtomicBool,
}

impl RunGate {
    pub fn try_acquire(self: &Arc<Self>) -> Option<RunPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit { gate: Arc::clone(self) })
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Re-enables the trigger when dropped, however the run ended.
#[derive(Debug)]
pub struct RunPermit {
    gate: Arc<RunGate>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.gate.running.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(ScriptSummary),
    Aborted(AbortReason),
    Failed(String),
}

/// State of the latest run as seen by the foreground owner.
#[derive(Debug, Clone)]
pub struct RestoreRun {
    pub phase: Phase,
    pub log: Vec<String>,
    pub outcome: Option<RunOutcome>,
}

impl RestoreRun {
    fn new() -> Self {
        RestoreRun {
            phase: Phase::Idle,
            log: Vec::new(),
            outcome: None,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ControllerError {
    #[error("A restore is already running")]
    AlreadyRunning,
}

/// Owns the log and the run state. The orchestrator runs on a spawned worker
/// task and reaches this side only through the event channel, so every log
/// write happens here, in arrival order.
pub struct RestoreController<S: LogSink> {
    orchestrator: Arc<RestoreOrchestrator>,
    sink: S,
    gate: Arc<RunGate>,
    last_run: Option<RestoreRun>,
}

impl<S: LogSink> RestoreController<S> {
    pub fn new(orchestrator: RestoreOrchestrator, sink: S) -> Self {
        RestoreController {
            orchestrator: Arc::new(orchestrator),
            sink,
            gate: Arc::new(RunGate::default()),
            last_run: None,
        }
    }

    #[cfg(test)]
    pub fn gate(&self) -> Arc<RunGate> {
        Arc::clone(&self.gate)
    }

    #[cfg(test)]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[cfg(test)]
    pub fn last_run(&self) -> Option<&RestoreRun> {
        self.last_run.as_ref()
    }

    /// Starts a run on a worker task and pumps its events into the sink until
    /// it finishes.
    pub async fn run(&mut self, request: RestoreRequest) -> Result<&RestoreRun, ControllerError> {
        let _permit = self.gate.try_acquire().ok_or(ControllerError::AlreadyRunning)?;
        self.sink.clear();
        let mut run = RestoreRun::new();

        let (tx, mut rx) = unbounded_channel();
        let orchestrator = Arc::clone(&self.orchestrator);
        let worker = tokio::spawn(async move {
            let reporter = ProgressReporter::new(tx);
            orchestrator.run(request, &reporter).await
        });

        // Ends once the worker has dropped every sender.
        while let Some(event) = rx.recv().await {
            self.apply(&mut run, event);
        }

        let outcome = match worker.await {
            Ok(Ok(RunReport::Completed(summary))) => RunOutcome::Completed(summary),
            Ok(Ok(RunReport::Aborted(reason))) => {
                tracing::info!(%reason, "restore aborted");
                RunOutcome::Aborted(reason)
            }
            Ok(Err(e)) => self.fail(&mut run, &e),
            Err(join_error) => self.fail(&mut run, &RestoreError::WorkerPanicked(join_error.to_string())),
        };
        run.outcome = Some(outcome);

        Ok(self.last_run.insert(run))
    }

    fn apply(&mut self, run: &mut RestoreRun, event: RestoreEvent) {
        match event {
            RestoreEvent::PhaseStarted(phase) => run.phase = phase,
            RestoreEvent::Log { level, message } => self.append(run, level, &message),
        }
    }

    fn append(&mut self, run: &mut RestoreRun, level: LogLevel, message: &str) {
        let prefix = match level {
            LogLevel::Info => "",
            LogLevel::Error => "ERROR: ",
        };
        let line = format!("{} - {}{}", Local::now().format("%Y-%m-%d %H:%M:%S"), prefix, message);
        self.sink.append(&line);
        run.log.push(line);
    }

    fn fail(&mut self, run: &mut RestoreRun, error: &RestoreError) -> RunOutcome {
        tracing::error!(error = %error, "restore failed");
        self.append(run, LogLevel::Error, &format!("Error: {}", error));
        if let Some(inner) = source_chain(error) {
            self.append(run, LogLevel::Error, &format!("Inner error: {}", inner));
        }
        run.phase = Phase::Failed;
        RunOutcome::Failed(error.to_string())
    }
}

/// Every cause below `error`, outermost first, joined with `: `.
fn source_chain(error: &RestoreError) -> Option<String> {
    let causes: Vec<String> = std::iter::successors(error.source(), |&cause| cause.source())
        .map(|cause| cause.to_string())
        .collect();
    (!causes.is_empty()).then(|| causes.join(": "))
}
