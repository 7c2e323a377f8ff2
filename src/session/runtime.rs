//! Session runtime — the tokio task that owns a `SessionController`.
//!
//! Every event source funnels into one `select!` loop: handle commands,
//! channel events, completions from spawned backend calls, and the nearest
//! debounce deadline. The controller only ever sees one event at a time.
//!
//! Publishes and saves each go through a sequential outbox task so the loop
//! never waits on I/O and their order on the wire matches the order they
//! were produced.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendError, ProjectContext, RunResult, SessionTarget};
use crate::channel::{ChannelEvent, RealtimeChannel};
use crate::config::SessionConfig;

use super::editor::{EditorState, Language};
use super::execution::{RunRejected, RunReport, RunTicket};
use super::{ContextSnapshot, Effect, SessionController, SessionSnapshot};

/// Errors from talking to a session through its handle.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session has been unmounted")]
    Closed,
}

type RunReply = oneshot::Sender<Result<RunReport, RunRejected>>;

enum Command {
    SetCode(String),
    SetLanguage(Language),
    Run(RunReply),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Unmount(oneshot::Sender<()>),
}

/// Completions from tasks spawned by the loop.
enum Completion {
    Loaded(Result<ProjectContext, BackendError>),
    RunFinished(RunTicket, Result<RunResult, BackendError>),
}

/// Cloneable handle to a mounted session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    /// Replace the editor's code.
    pub fn set_code(&self, code: impl Into<String>) -> Result<(), SessionError> {
        self.send(Command::SetCode(code.into()))
    }

    pub fn set_language(&self, language: Language) -> Result<(), SessionError> {
        self.send(Command::SetLanguage(language))
    }

    /// Run the editor's code and wait for the outcome.
    pub async fn run(&self) -> Result<RunReport, RunRejected> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Run(tx))
            .map_err(|_| RunRejected::Unmounted)?;
        rx.await.unwrap_or(Err(RunRejected::Unmounted))
    }

    /// Current state, after every event queued before this call on the
    /// command queue has been handled.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Follow state changes. The latest value is always available with
    /// `borrow()`, even after unmount.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Tear the session down and wait until the loop has stopped.
    pub async fn unmount(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Unmount(tx))?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::Closed)
    }
}

/// Mount a session for `target` and start its loop on the current runtime.
///
/// Events are subscribed before the log is read, so nothing appended in
/// between is missed; rescanning it later is a no-op.
pub fn mount(
    config: &SessionConfig,
    target: SessionTarget,
    channel: Arc<dyn RealtimeChannel>,
    backend: Arc<dyn Backend>,
) -> SessionHandle {
    let events = channel.subscribe();
    let log = channel.messages();
    let mut controller = SessionController::new(target.clone(), &config.timing, &log);
    controller.set_connected(channel.is_connected());
    info!(%target, history = log.len(), "mounting session");

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (completion_tx, completion_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(controller.snapshot());

    {
        let backend = backend.clone();
        let target = target.clone();
        let completion_tx = completion_tx.clone();
        tokio::spawn(async move {
            let outcome = backend.load(&target).await;
            let _ = completion_tx.send(Completion::Loaded(outcome));
        });
    }

    let session = Session {
        publisher: spawn_publisher(channel.clone()),
        saver: spawn_saver(backend.clone(), target),
        result_topics: config
            .topics
            .result_topics(controller.target())
            .to_vec(),
        context_topics: config
            .topics
            .context_topics(controller.target())
            .into_iter()
            .map(str::to_string)
            .collect(),
        turn_topic: config.topics.turn_topic(controller.target()).to_string(),
        learn_context: config.topics.learn_context.clone(),
        controller,
        channel,
        backend,
        commands: command_rx,
        events,
        completions: completion_rx,
        completion_tx,
        snapshots: snapshot_tx,
        waiting_runs: HashMap::new(),
    };
    tokio::spawn(session.run());

    SessionHandle {
        commands: command_tx,
        snapshots: snapshot_rx,
    }
}

struct Session {
    controller: SessionController,
    channel: Arc<dyn RealtimeChannel>,
    backend: Arc<dyn Backend>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    completions: mpsc::UnboundedReceiver<Completion>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    snapshots: watch::Sender<SessionSnapshot>,
    publisher: mpsc::UnboundedSender<(String, Vec<u8>)>,
    saver: mpsc::UnboundedSender<EditorState>,
    result_topics: Vec<String>,
    context_topics: Vec<String>,
    turn_topic: String,
    learn_context: String,
    waiting_runs: HashMap<RunTicket, RunReply>,
}

impl Session {
    async fn run(mut self) {
        loop {
            let deadline = self.controller.next_deadline();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Unmount(ack)) => {
                        self.shutdown();
                        let _ = ack.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("every handle dropped");
                        self.shutdown();
                        break;
                    }
                },
                Some(event) = self.events.recv() => self.handle_event(event),
                Some(completion) = self.completions.recv() => self.handle_completion(completion),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let effects = self.controller.poll_timers(Instant::now());
                    self.perform(effects);
                }
            }
            self.broadcast();
        }
    }

    fn handle_command(&mut self, command: Command) {
        let now = Instant::now();
        match command {
            Command::SetCode(code) => self.controller.set_code(code, now),
            Command::SetLanguage(language) => self.controller.set_language(language, now),
            Command::Run(reply) => match self.controller.request_run() {
                Ok(effect) => {
                    if let Effect::Run { ticket, .. } = &effect {
                        self.waiting_runs.insert(*ticket, reply);
                    }
                    self.perform(vec![effect]);
                }
                Err(rejected) => {
                    debug!(reason = %rejected, "run request rejected");
                    let _ = reply.send(Err(rejected));
                }
            },
            Command::Snapshot(reply) => {
                let _ = reply.send(self.controller.snapshot());
            }
            Command::Unmount(_) => {}
        }
    }

    fn handle_event(&mut self, event: ChannelEvent) {
        let now = Instant::now();
        let effects = match event {
            ChannelEvent::LogAppended => {
                let log = self.channel.messages_since(self.controller.log_cursor());
                self.controller.on_log(&log, now)
            }
            ChannelEvent::Data { topic, payload } => {
                if !self.result_topics.contains(&topic) {
                    debug!(%topic, bytes = payload.len(), "ignoring payload on unrouted topic");
                    return;
                }
                let log = self.channel.messages_since(self.controller.log_cursor());
                self.controller.on_payload(&topic, &payload, &log, now)
            }
            ChannelEvent::Connection(connected) => {
                info!(connected, "connection status changed");
                self.controller.set_connected(connected);
                return;
            }
        };
        self.perform(effects);
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Loaded(Ok(context)) => {
                let effects = self.controller.on_loaded(context);
                self.perform(effects);
            }
            Completion::Loaded(Err(e)) => {
                warn!(session = %self.controller.target(), error = %e, "failed to load session context");
            }
            Completion::RunFinished(ticket, outcome) => {
                let report = self.controller.on_run_finished(ticket, outcome);
                if let Some(reply) = self.waiting_runs.remove(&ticket) {
                    let dropped = if self.controller.is_mounted() {
                        RunRejected::Superseded
                    } else {
                        RunRejected::Unmounted
                    };
                    let _ = reply.send(report.ok_or(dropped));
                }
            }
        }
    }

    fn perform(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Publish(snapshot) => {
                    for topic in &self.context_topics {
                        self.publish(topic, &snapshot);
                    }
                }
                Effect::Flush(snapshot) => self.publish(&self.turn_topic, &snapshot),
                Effect::Save(state) => {
                    if self.saver.send(state).is_err() {
                        warn!("save outbox closed");
                    }
                }
                Effect::Run { ticket, code } => {
                    let backend = self.backend.clone();
                    let completion_tx = self.completion_tx.clone();
                    tokio::spawn(async move {
                        let outcome = backend.run(&code).await;
                        let _ = completion_tx.send(Completion::RunFinished(ticket, outcome));
                    });
                }
            }
        }
    }

    fn publish(&self, topic: &str, snapshot: &ContextSnapshot) {
        // Only the learn context topic carries the book id.
        let body = if topic == self.learn_context {
            serde_json::to_vec(snapshot)
        } else {
            serde_json::to_vec(&ContextSnapshot {
                book_id: None,
                ..snapshot.clone()
            })
        };
        match body {
            Ok(bytes) => {
                if self.publisher.send((topic.to_string(), bytes)).is_err() {
                    warn!(%topic, "publish outbox closed");
                }
            }
            Err(e) => warn!(%topic, error = %e, "failed to encode context snapshot"),
        }
    }

    fn broadcast(&self) {
        let current = self.controller.snapshot();
        self.snapshots.send_if_modified(|shown| {
            if *shown == current {
                false
            } else {
                *shown = current;
                true
            }
        });
    }

    fn shutdown(&mut self) {
        self.controller.unmount();
        self.waiting_runs.clear();
        self.broadcast();
    }
}

fn spawn_publisher(channel: Arc<dyn RealtimeChannel>) -> mpsc::UnboundedSender<(String, Vec<u8>)> {
    let (tx, mut rx) = mpsc::unbounded_channel::<(String, Vec<u8>)>();
    tokio::spawn(async move {
        while let Some((topic, payload)) = rx.recv().await {
            let bytes = payload.len();
            match channel.publish(&topic, payload, true).await {
                Ok(()) => debug!(%topic, bytes, "context published"),
                Err(e) => warn!(%topic, error = %e, "context publish failed"),
            }
        }
    });
    tx
}

fn spawn_saver(backend: Arc<dyn Backend>, target: SessionTarget) -> mpsc::UnboundedSender<EditorState> {
    let (tx, mut rx) = mpsc::unbounded_channel::<EditorState>();
    tokio::spawn(async move {
        while let Some(state) = rx.recv().await {
            match backend.save(&target, &state).await {
                Ok(()) => debug!(%target, chars = state.code.len(), "saved"),
                Err(e) => warn!(%target, error = %e, "save failed"),
            }
        }
    });
    tx
}
