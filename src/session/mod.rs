//! Session controller — one consistent view over every event source.
//!
//! Reconciles four producers that know nothing about each other: the
//! transcript log, structured results on the result topics, user edits, and
//! run completions. The controller does no I/O. Each input is a method call
//! carrying `now`; each side effect comes back as an `Effect` for the
//! runtime to perform.
//!
//! ## Architecture
//!
//! - `editor`: editor and output-view state
//! - `tracker`: pending-reply state machine with monotonic log cursors
//! - `debounce`: deadline debouncer behind the sync emitter and persistence writer
//! - `interpreter`: payload decode, legacy normalization, application
//! - `execution`: run gate and three-way run reports
//! - `runtime`: the tokio task that owns a controller, and its handle

pub mod debounce;
pub mod editor;
pub mod execution;
pub mod interpreter;
pub mod runtime;
pub mod tracker;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, ProjectContext, RunResult, SessionTarget};
use crate::channel::Message;
use crate::config::Timing;

use debounce::Debouncer;
use editor::{EditorState, Language, OutputState};
use execution::{ExecutionTrigger, RunRejected, RunReport, RunTicket};
use interpreter::Decoded;
use tracker::{PendingReplyTracker, Transition};

/// Outbound editor snapshot for the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSnapshot {
    pub code: String,
    pub language: Language,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_id: Option<String>,
}

/// Side effect requested by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Publish this snapshot on the session's context topics.
    Publish(ContextSnapshot),
    /// Publish on the turn topic only, as a user turn starts.
    Flush(ContextSnapshot),
    /// Save this editor state to the backend record.
    Save(EditorState),
    /// Execute `code`; report back through `on_run_finished(ticket, ..)`.
    Run { ticket: RunTicket, code: String },
}

/// Read-only copy of everything a renderer needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub name: Option<String>,
    pub editor: EditorState,
    pub output: OutputState,
    pub is_loading: bool,
    pub is_running: bool,
    pub loaded: bool,
    pub connected: bool,
    pub mounted: bool,
}

/// The coordination core of one mounted session.
#[derive(Debug)]
pub struct SessionController {
    target: SessionTarget,
    editor: EditorState,
    output: OutputState,
    tracker: PendingReplyTracker,
    sync: Debouncer,
    persist: Debouncer,
    execution: ExecutionTrigger,
    name: Option<String>,
    loaded: bool,
    /// The editor has been written since mount; a late load must not clobber it.
    edited: bool,
    connected: bool,
    mounted: bool,
}

impl SessionController {
    /// Mount onto a transport whose log currently reads `log`. Nothing
    /// already in the log is ever processed.
    pub fn new(target: SessionTarget, timing: &Timing, log: &[Message]) -> Self {
        Self {
            target,
            editor: EditorState::default(),
            output: OutputState::default(),
            tracker: PendingReplyTracker::attach(log),
            sync: Debouncer::new(timing.sync_quiet()),
            persist: Debouncer::new(timing.persist_quiet()),
            execution: ExecutionTrigger::new(),
            name: None,
            loaded: false,
            edited: false,
            connected: true,
            mounted: true,
        }
    }

    // ── Context load ──

    /// Seed the editor from the loaded record and publish a baseline
    /// snapshot straight away. If the editor was already written, by the
    /// user or by a result, it is kept and only the record's name is taken.
    pub fn on_loaded(&mut self, context: ProjectContext) -> Vec<Effect> {
        if !self.mounted {
            return Vec::new();
        }
        info!(target_id = %self.target.id(), name = %context.name, kept = self.edited, "session context loaded");
        if !self.edited {
            self.editor = context.editor_state();
        }
        self.name = Some(context.name);
        self.loaded = true;
        self.sync.cancel();
        vec![Effect::Publish(self.context_snapshot())]
    }

    // ── Transcript ──

    /// The transcript log changed. `log` is the whole log or the part past
    /// `log_cursor()`. Safe to call with the same log any number of times.
    pub fn on_log(&mut self, log: &[Message], _now: Instant) -> Vec<Effect> {
        if !self.mounted {
            return Vec::new();
        }
        let mut effects = Vec::new();
        for transition in self.tracker.observe(log) {
            match transition {
                Transition::Armed { message_id } => {
                    info!(%message_id, "user turn detected, awaiting reply");
                    self.output.clear_for_turn();
                    self.sync.cancel();
                    effects.push(Effect::Flush(self.context_snapshot()));
                }
                Transition::ClosedByText { message_id } => {
                    info!(%message_id, "conversational reply, no result to apply");
                }
            }
        }
        effects
    }

    // ── Structured results ──

    /// A payload arrived on a result topic. `log` is the transcript as of
    /// now: it is reconciled first, so an utterance that has not been
    /// observed yet cannot clear this result after it lands.
    pub fn on_payload(
        &mut self,
        topic: &str,
        payload: &[u8],
        log: &[Message],
        now: Instant,
    ) -> Vec<Effect> {
        if !self.mounted {
            return Vec::new();
        }
        let mut effects = self.on_log(log, now);

        let result = match interpreter::decode(payload) {
            Ok(Decoded::Result(result)) => result,
            Ok(Decoded::Unrecognized(kind)) => {
                debug!(%topic, %kind, "ignoring unrecognized result type");
                return effects;
            }
            Err(e) => {
                warn!(%topic, error = %e, "malformed result payload");
                self.tracker.close_with_result();
                return effects;
            }
        };

        let kind = result.kind();
        self.tracker.close_with_result();
        let applied = result.apply(&mut self.editor, &mut self.output);
        info!(%topic, %kind, chars = self.editor.code.len(), "structured result applied");

        if applied.editor_changed {
            self.rearm(now);
        }
        if let Some(code) = applied.run {
            // The new code supersedes whatever is still running; its
            // completion will no longer match the gate.
            if let Some(stale) = self.execution.abandon() {
                info!(%stale, "in-flight run superseded by new result");
            }
            match self
                .execution
                .begin(&code, self.editor.language, &mut self.output, false)
            {
                Ok(ticket) => {
                    info!(%ticket, "running generated code");
                    effects.push(Effect::Run { ticket, code });
                }
                Err(e) => info!(reason = %e, "automatic run skipped"),
            }
        }
        effects
    }

    // ── Editor ──

    /// The single entry point for code changes, from the user or a result.
    pub fn set_code(&mut self, code: String, now: Instant) {
        if !self.mounted || code == self.editor.code {
            return;
        }
        self.editor.code = code;
        self.rearm(now);
    }

    pub fn set_language(&mut self, language: Language, now: Instant) {
        if !self.mounted || language == self.editor.language {
            return;
        }
        self.editor.language = language;
        self.rearm(now);
    }

    fn rearm(&mut self, now: Instant) {
        self.edited = true;
        self.sync.arm(now);
        self.persist.arm(now);
    }

    // ── Timers ──

    /// Earliest pending debounce deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.sync.deadline(), self.persist.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fire whichever debouncers are due. State is read here, at fire time.
    pub fn poll_timers(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.sync.fire_if_due(now) {
            debug!(chars = self.editor.code.len(), "debounced context sync");
            effects.push(Effect::Publish(self.context_snapshot()));
        }
        if self.persist.fire_if_due(now) {
            if self.loaded && !self.editor.code.is_empty() {
                debug!(chars = self.editor.code.len(), "debounced save");
                effects.push(Effect::Save(self.editor.clone()));
            } else {
                debug!(loaded = self.loaded, "save skipped: nothing loaded or empty code");
            }
        }
        effects
    }

    // ── Execution ──

    /// A user asked to run the editor's code.
    pub fn request_run(&mut self) -> Result<Effect, RunRejected> {
        if !self.mounted {
            return Err(RunRejected::Unmounted);
        }
        let code = self.editor.code.clone();
        let ticket = self
            .execution
            .begin(&code, self.editor.language, &mut self.output, true)?;
        info!(%ticket, "manual run started");
        Ok(Effect::Run { ticket, code })
    }

    /// A run came back. Ignored after unmount or for a superseded ticket.
    pub fn on_run_finished(
        &mut self,
        ticket: RunTicket,
        outcome: Result<RunResult, BackendError>,
    ) -> Option<RunReport> {
        if !self.mounted {
            debug!(%ticket, "run finished after unmount");
            return None;
        }
        let report = self.execution.finish(ticket, outcome, &mut self.output)?;
        match &report {
            RunReport::Completed(_) => info!(%ticket, "run completed"),
            RunReport::ExitedNonZero(r) => info!(%ticket, exit_code = r.exit_code, "run exited nonzero"),
            RunReport::TimedOut(_) => info!(%ticket, "run timed out"),
            RunReport::TransportFailed(e) => warn!(%ticket, error = %e, "run request failed"),
        }
        Some(report)
    }

    // ── Lifecycle ──

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Tear down: pending debounces are dropped unfired, and anything still
    /// in flight will find nothing to update.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        let sync = self.sync.cancel();
        let persist = self.persist.cancel();
        self.execution.abandon();
        info!(target_id = %self.target.id(), sync, persist, "session unmounted");
    }

    // ── Views ──

    pub fn context_snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            code: self.editor.code.clone(),
            language: self.editor.language,
            book_id: self.target.book_id().map(str::to_string),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            name: self.name.clone(),
            editor: self.editor.clone(),
            output: self.output.clone(),
            is_loading: self.tracker.is_awaiting(),
            is_running: self.execution.is_running(),
            loaded: self.loaded,
            connected: self.connected,
            mounted: self.mounted,
        }
    }

    pub fn target(&self) -> &SessionTarget {
        &self.target
    }

    pub fn editor(&self) -> &EditorState {
        &self.editor
    }

    pub fn output(&self) -> &OutputState {
        &self.output
    }

    /// Highest log `order` already scanned; read only past it.
    pub fn log_cursor(&self) -> Option<u64> {
        self.tracker.cursor()
    }

    pub fn is_loading(&self) -> bool {
        self.tracker.is_awaiting()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use super::editor::{Intent, OutputView, SummaryContent};

    const CODE_PAYLOAD: &str = r#"{"type":"code","language":"python","content":"print(2 + 2)"}"#;
    const SUMMARY_PAYLOAD: &str = r#"{"type":"summary","content":{"what_it_does":"adds","components":"print","flow":"one line"}}"#;

    struct Fixture {
        log: Vec<Message>,
        ctl: SessionController,
        t0: Instant,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_history(Vec::new())
        }

        fn with_history(log: Vec<Message>) -> Self {
            let ctl = SessionController::new(
                SessionTarget::Project("p1".into()),
                &Timing::default(),
                &log,
            );
            Self {
                log,
                ctl,
                t0: Instant::now(),
            }
        }

        fn at(&self, ms: u64) -> Instant {
            self.t0 + Duration::from_millis(ms)
        }

        fn push(&mut self, id: &str, local: bool, text: &str) -> Vec<Effect> {
            let order = self.log.len() as u64;
            self.log.push(Message {
                id: id.into(),
                sender_is_local: local,
                text: text.into(),
                order,
            });
            let now = self.t0;
            self.ctl.on_log(&self.log, now)
        }

        fn payload(&mut self, json: &str) -> Vec<Effect> {
            let now = self.t0;
            self.ctl
                .on_payload("assistant_result", json.as_bytes(), &self.log, now)
        }

        fn load(&mut self, code: &str) -> Vec<Effect> {
            self.ctl.on_loaded(ProjectContext {
                id: "p1".into(),
                name: "Calculator".into(),
                language: Language::Python,
                code: code.into(),
            })
        }
    }

    fn ok_run(stdout: &str) -> Result<RunResult, BackendError> {
        Ok(RunResult {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
            timed_out: false,
        })
    }

    fn run_ticket(effects: &[Effect]) -> Option<RunTicket> {
        effects.iter().find_map(|e| match e {
            Effect::Run { ticket, .. } => Some(*ticket),
            _ => None,
        })
    }

    // ── Scenarios ──

    #[test]
    fn utterance_then_code_result_runs_once() {
        let mut f = Fixture::new();
        f.load("");

        let effects = f.push("m1", true, "build a calculator");
        assert!(f.ctl.is_loading());
        assert_eq!(f.ctl.output().view, OutputView::Output);
        assert!(f.ctl.output().summary.is_none());
        assert!(matches!(effects.as_slice(), [Effect::Flush(_)]));

        let effects = f.payload(CODE_PAYLOAD);
        assert_eq!(f.ctl.editor().code, "print(2 + 2)");
        assert!(!f.ctl.is_loading());
        let runs: Vec<_> = effects
            .iter()
            .filter(|e| matches!(e, Effect::Run { .. }))
            .collect();
        assert_eq!(runs.len(), 1);
        assert!(f.ctl.snapshot().is_running);

        let ticket = run_ticket(&effects).unwrap();
        let report = f.ctl.on_run_finished(ticket, ok_run("4\n")).unwrap();
        assert!(matches!(report, RunReport::Completed(_)));
        assert_eq!(f.ctl.output().run_result.as_ref().unwrap().stdout, "4\n");
        assert!(!f.ctl.snapshot().is_running);
    }

    #[test]
    fn conversational_reply_clears_loading_only() {
        let mut f = Fixture::new();
        f.load("print('hi')");

        f.push("m2", true, "explain this");
        assert!(f.ctl.is_loading());

        let effects = f.push("a1", false, "It prints a greeting.");
        assert!(effects.is_empty());
        assert!(!f.ctl.is_loading());
        assert_eq!(f.ctl.editor().code, "print('hi')");
    }

    #[test]
    fn malformed_payload_clears_loading_and_keeps_run_state() {
        let mut f = Fixture::new();
        f.load("print(1)");
        let ticket = run_ticket(&[f.ctl.request_run().unwrap()]).unwrap();
        f.ctl.on_run_finished(ticket, ok_run("1\n"));

        f.push("m1", true, "do it again");
        let before = f.ctl.output().clone();

        let effects = f.payload("{\"type\": \"code\", oops");
        assert!(!f.ctl.is_loading());
        assert!(effects.is_empty());
        assert_eq!(f.ctl.output().run_result, before.run_result);
        assert_eq!(f.ctl.output().run_error, before.run_error);
    }

    #[test]
    fn code_then_summary_lands_both() {
        let mut f = Fixture::new();
        f.load("");
        f.push("m1", true, "build and explain");

        f.payload(CODE_PAYLOAD);
        f.payload(SUMMARY_PAYLOAD);

        assert_eq!(f.ctl.editor().code, "print(2 + 2)");
        assert_eq!(f.ctl.output().summary.as_ref().unwrap().what_it_does, "adds");
        assert_eq!(f.ctl.output().view, OutputView::Summary);
        assert_eq!(f.ctl.output().intent, Some(Intent::ExplainCode));
        assert!(!f.ctl.is_loading());
    }

    #[test]
    fn unrecognized_type_is_ignored_without_closing() {
        let mut f = Fixture::new();
        f.push("m1", true, "make a plan");
        f.payload(r#"{"type":"plan","steps":["a"]}"#);
        assert!(f.ctl.is_loading());
    }

    // ── Ordering ──

    #[test]
    fn result_before_utterance_detection_is_not_wiped() {
        let mut f = Fixture::new();
        f.load("");
        // The utterance is in the log, but the log subscription has not
        // fired yet when the result arrives.
        f.log.push(Message {
            id: "m1".into(),
            sender_is_local: true,
            text: "build a calculator".into(),
            order: 0,
        });
        f.payload(SUMMARY_PAYLOAD);
        assert!(f.ctl.output().summary.is_some());
        assert!(!f.ctl.is_loading());

        // Late log notification: already seen, nothing to do.
        let now = f.t0;
        assert!(f.ctl.on_log(&f.log, now).is_empty());
        assert!(f.ctl.output().summary.is_some());
        assert!(!f.ctl.is_loading());
    }

    #[test]
    fn reattach_to_history_is_a_no_op() {
        let mut history = Vec::new();
        for (i, (id, local)) in [("m1", true), ("a1", false), ("m2", true)].iter().enumerate() {
            history.push(Message {
                id: (*id).into(),
                sender_is_local: *local,
                text: "something".into(),
                order: i as u64,
            });
        }
        let mut f = Fixture::with_history(history);
        f.load("x = 1");
        f.ctl.output.summary = Some(SummaryContent {
            what_it_does: "kept".into(),
            components: String::new(),
            flow: String::new(),
        });

        let now = f.t0;
        for _ in 0..3 {
            assert!(f.ctl.on_log(&f.log, now).is_empty());
        }
        assert!(!f.ctl.is_loading());
        assert!(f.ctl.output().summary.is_some());

        f.push("m3", true, "new request");
        assert!(f.ctl.is_loading());
    }

    // ── Debouncing ──

    #[test]
    fn burst_of_edits_syncs_last_value_once() {
        let mut f = Fixture::new();
        f.load("");
        for i in 0..5u64 {
            let now = f.at(i * 200);
            f.ctl.set_code(format!("v{i}"), now);
        }

        assert!(f.ctl.poll_timers(f.at(2000)).is_empty());
        let effects = f.ctl.poll_timers(f.at(2300));
        assert_eq!(
            effects,
            vec![Effect::Publish(ContextSnapshot {
                code: "v4".into(),
                language: Language::Python,
                book_id: None,
            })]
        );
        assert!(f.ctl.poll_timers(f.at(2500)).is_empty());
        assert_eq!(
            f.ctl.poll_timers(f.at(2800)),
            vec![Effect::Save(EditorState {
                code: "v4".into(),
                language: Language::Python,
            })]
        );
        assert!(f.ctl.next_deadline().is_none());
    }

    #[test]
    fn debounced_publish_reads_state_at_fire_time() {
        let mut f = Fixture::new();
        f.load("");
        f.ctl.set_code("draft".into(), f.at(0));
        // A result lands inside the window and re-arms with its own code.
        f.push("m1", true, "replace it");
        f.ctl
            .on_payload("assistant_result", br#"{"type":"code","language":"html","content":"<p>x</p>"}"#, &f.log, f.at(100));

        let effects = f.ctl.poll_timers(f.at(1600));
        assert_eq!(
            effects,
            vec![Effect::Publish(ContextSnapshot {
                code: "<p>x</p>".into(),
                language: Language::Html,
                book_id: None,
            })]
        );
    }

    #[test]
    fn unchanged_value_does_not_rearm() {
        let mut f = Fixture::new();
        f.load("same");
        f.ctl.set_code("same".into(), f.at(0));
        f.ctl.set_language(Language::Python, f.at(0));
        assert!(f.ctl.next_deadline().is_none());
    }

    #[test]
    fn saves_wait_for_load_and_skip_empty_code() {
        let mut f = Fixture::new();
        f.ctl.set_code("typed early".into(), f.at(0));
        let effects = f.ctl.poll_timers(f.at(5000));
        assert!(effects.iter().all(|e| !matches!(e, Effect::Save(_))));

        f.load("loaded");
        f.ctl.set_code(String::new(), f.at(6000));
        let effects = f.ctl.poll_timers(f.at(9000));
        assert!(effects.iter().all(|e| !matches!(e, Effect::Save(_))));
    }

    #[test]
    fn utterance_flushes_pending_sync() {
        let mut f = Fixture::new();
        f.load("");
        f.ctl.set_code("latest".into(), f.at(0));
        let effects = f.push("m1", true, "look at my code");
        assert_eq!(
            effects,
            vec![Effect::Flush(ContextSnapshot {
                code: "latest".into(),
                language: Language::Python,
                book_id: None,
            })]
        );
        // The flushed sync does not fire again; the save still does.
        let effects = f.ctl.poll_timers(f.at(3000));
        assert!(matches!(effects.as_slice(), [Effect::Save(_)]));
    }

    #[test]
    fn load_publishes_baseline_with_book_id() {
        let mut ctl = SessionController::new(
            SessionTarget::LearnBook("b1".into()),
            &Timing::default(),
            &[],
        );
        let effects = ctl.on_loaded(ProjectContext {
            id: "b1".into(),
            name: "Loops".into(),
            language: Language::Python,
            code: "for i in range(3): pass".into(),
        });
        assert_eq!(
            effects,
            vec![Effect::Publish(ContextSnapshot {
                code: "for i in range(3): pass".into(),
                language: Language::Python,
                book_id: Some("b1".into()),
            })]
        );
        assert_eq!(ctl.snapshot().name.as_deref(), Some("Loops"));
    }

    // ── Execution ──

    #[test]
    fn manual_run_while_running_is_rejected() {
        let mut f = Fixture::new();
        f.load("print(1)");
        let first = f.ctl.request_run().unwrap();
        assert_eq!(f.ctl.request_run(), Err(RunRejected::AlreadyRunning));

        let ticket = run_ticket(&[first]).unwrap();
        f.ctl.on_run_finished(ticket, ok_run("1\n"));
        assert!(f.ctl.output().run_result.is_some());

        let second = f.ctl.request_run().unwrap();
        assert!(f.ctl.output().run_result.is_none());
        let ticket = run_ticket(&[second]).unwrap();
        f.ctl.on_run_finished(
            ticket,
            Err(BackendError::ApiError {
                status: 500,
                message: "sandbox down".into(),
            }),
        );
        assert!(f.ctl.output().run_result.is_none());
        assert!(f.ctl.output().run_error.as_ref().unwrap().contains("sandbox down"));
    }

    #[test]
    fn new_code_result_supersedes_run_in_flight() {
        let mut f = Fixture::new();
        f.load("print('old')");
        let old = run_ticket(&[f.ctl.request_run().unwrap()]).unwrap();
        f.push("m1", true, "now something else");

        let effects = f.payload(CODE_PAYLOAD);
        let new = run_ticket(&effects).expect("new code runs");
        assert_ne!(new, old);
        assert_eq!(f.ctl.editor().code, "print(2 + 2)");
        assert!(f.ctl.snapshot().is_running);

        // The old run lands late and is dropped.
        assert!(f.ctl.on_run_finished(old, ok_run("old\n")).is_none());
        assert!(f.ctl.output().run_result.is_none());
        assert!(f.ctl.snapshot().is_running);

        f.ctl.on_run_finished(new, ok_run("4\n"));
        assert_eq!(f.ctl.output().run_result.as_ref().unwrap().stdout, "4\n");
        assert!(!f.ctl.snapshot().is_running);
    }

    #[test]
    fn late_load_keeps_generated_code() {
        let mut f = Fixture::new();
        f.push("m1", true, "build a calculator");
        f.payload(CODE_PAYLOAD);

        let effects = f.load("stored");
        assert_eq!(f.ctl.editor().code, "print(2 + 2)");
        assert_eq!(f.ctl.snapshot().name.as_deref(), Some("Calculator"));
        assert_eq!(
            effects,
            vec![Effect::Publish(ContextSnapshot {
                code: "print(2 + 2)".into(),
                language: Language::Python,
                book_id: None,
            })]
        );

        let saves: Vec<_> = f
            .ctl
            .poll_timers(f.at(5000))
            .into_iter()
            .filter(|e| matches!(e, Effect::Save(_)))
            .collect();
        assert_eq!(
            saves,
            vec![Effect::Save(EditorState {
                code: "print(2 + 2)".into(),
                language: Language::Python,
            })]
        );
    }

    #[test]
    fn late_load_keeps_user_edit() {
        let mut f = Fixture::new();
        f.ctl.set_code("typed first".into(), f.at(0));
        f.load("stored");
        assert_eq!(f.ctl.editor().code, "typed first");
        assert!(f.ctl.snapshot().loaded);
    }

    #[test]
    fn markup_run_is_rejected() {
        let mut f = Fixture::new();
        f.ctl.on_loaded(ProjectContext {
            id: "p1".into(),
            name: "Page".into(),
            language: Language::Html,
            code: "<h1>hi</h1>".into(),
        });
        assert_eq!(
            f.ctl.request_run(),
            Err(RunRejected::NotExecutable(Language::Html))
        );
        assert!(!f.ctl.snapshot().is_running);
    }

    // ── Lifecycle ──

    #[test]
    fn unmount_cancels_timers_and_ignores_late_completions() {
        let mut f = Fixture::new();
        f.load("print(1)");
        let ticket = run_ticket(&[f.ctl.request_run().unwrap()]).unwrap();
        f.ctl.set_code("edited".into(), f.at(0));

        f.ctl.unmount();
        assert!(f.ctl.next_deadline().is_none());
        assert!(f.ctl.poll_timers(f.at(10_000)).is_empty());
        assert!(f.ctl.on_run_finished(ticket, ok_run("1\n")).is_none());
        assert!(f.ctl.output().run_result.is_none());
        assert_eq!(f.ctl.request_run(), Err(RunRejected::Unmounted));

        f.push("m1", true, "anyone there?");
        assert!(!f.ctl.is_loading());
        assert!(!f.ctl.snapshot().mounted);
    }
}
