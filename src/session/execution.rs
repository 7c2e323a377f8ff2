//! Execution trigger — gate and bookkeeping for code runs.
//!
//! One run at a time. A second request while one is in flight is rejected,
//! never queued. A new code result is the exception: it abandons the run
//! in flight and starts its own, and the old completion is dropped. Manual
//! runs and the automatic run after a code result go through the same
//! `begin`/`finish` pair, so they share the gate and the same two output
//! fields (`run_result`, `run_error`).

use crate::backend::{BackendError, RunResult};

use super::editor::{Language, OutputState, OutputView};

/// Identifies one run from `begin` to `finish`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunTicket(u64);

impl std::fmt::Display for RunTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run#{}", self.0)
    }
}

/// Why a run request was turned away.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunRejected {
    #[error("{0} code cannot be run")]
    NotExecutable(Language),

    #[error("nothing to run")]
    EmptyCode,

    #[error("a run is already in progress")]
    AlreadyRunning,

    #[error("superseded by a newer result")]
    Superseded,

    #[error("session is unmounted")]
    Unmounted,
}

/// How a run ended. Transport failure, timeout and nonzero exit stay distinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    /// Exit code 0 within the time limit.
    Completed(RunResult),
    /// The process finished with a nonzero exit code.
    ExitedNonZero(RunResult),
    /// The sandbox killed the process at its time limit.
    TimedOut(RunResult),
    /// The run endpoint could not be reached or answered with an error status.
    TransportFailed(String),
}

impl RunReport {
    pub fn from_outcome(outcome: Result<RunResult, BackendError>) -> Self {
        match outcome {
            Ok(result) if result.timed_out => RunReport::TimedOut(result),
            Ok(result) if result.exit_code != 0 => RunReport::ExitedNonZero(result),
            Ok(result) => RunReport::Completed(result),
            Err(e) => RunReport::TransportFailed(e.to_string()),
        }
    }

    /// The sandbox result, unless the transport failed.
    pub fn result(&self) -> Option<&RunResult> {
        match self {
            RunReport::Completed(r) | RunReport::ExitedNonZero(r) | RunReport::TimedOut(r) => {
                Some(r)
            }
            RunReport::TransportFailed(_) => None,
        }
    }
}

/// The gate. Holds the ticket of the run in flight, if any.
#[derive(Debug, Default)]
pub struct ExecutionTrigger {
    running: Option<RunTicket>,
    issued: u64,
}

impl ExecutionTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a run: clears the previous outcome immediately. When `reveal`
    /// is set the output view switches to the run output.
    pub fn begin(
        &mut self,
        code: &str,
        language: Language,
        output: &mut OutputState,
        reveal: bool,
    ) -> Result<RunTicket, RunRejected> {
        if !language.is_executable() {
            return Err(RunRejected::NotExecutable(language));
        }
        if code.is_empty() {
            return Err(RunRejected::EmptyCode);
        }
        if self.running.is_some() {
            return Err(RunRejected::AlreadyRunning);
        }

        self.issued += 1;
        let ticket = RunTicket(self.issued);
        self.running = Some(ticket);

        output.run_result = None;
        output.run_error = None;
        if reveal {
            output.view = OutputView::Output;
        }
        Ok(ticket)
    }

    /// Record a finished run. Sets exactly one of `run_result`/`run_error`.
    /// Returns `None` for a ticket that is no longer the one in flight.
    pub fn finish(
        &mut self,
        ticket: RunTicket,
        outcome: Result<RunResult, BackendError>,
        output: &mut OutputState,
    ) -> Option<RunReport> {
        if self.running != Some(ticket) {
            return None;
        }
        self.running = None;

        let report = RunReport::from_outcome(outcome);
        match &report {
            RunReport::TransportFailed(message) => {
                output.run_result = None;
                output.run_error = Some(message.clone());
            }
            other => {
                output.run_error = None;
                output.run_result = other.result().cloned();
            }
        }
        Some(report)
    }

    /// Forget the run in flight; its completion will be ignored.
    pub fn abandon(&mut self) -> Option<RunTicket> {
        self.running.take()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}
