//! Persistence and execution collaborator.
//!
//! The session talks to the backend for three things only: load the record
//! it is editing, save editor snapshots back, and run code. Everything else
//! the backend offers (listing, creating, deleting records) belongs to the
//! dashboard, not the session.

pub mod client;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::session::editor::{EditorState, Language};

/// Errors from backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Which record a session edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTarget {
    Project(String),
    LearnBook(String),
}

impl SessionTarget {
    pub fn id(&self) -> &str {
        match self {
            SessionTarget::Project(id) | SessionTarget::LearnBook(id) => id,
        }
    }

    /// The learning-book id, when this is a learn session.
    pub fn book_id(&self) -> Option<&str> {
        match self {
            SessionTarget::LearnBook(id) => Some(id),
            SessionTarget::Project(_) => None,
        }
    }

    pub fn is_learn(&self) -> bool {
        matches!(self, SessionTarget::LearnBook(_))
    }

    /// REST path of the record, id percent-encoded.
    pub fn path(&self) -> String {
        let collection = match self {
            SessionTarget::Project(_) => "projects",
            SessionTarget::LearnBook(_) => "learn-books",
        };
        format!("/{collection}/{}", urlencoding::encode(self.id()))
    }
}

impl std::fmt::Display for SessionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionTarget::Project(id) => write!(f, "project {id}"),
            SessionTarget::LearnBook(id) => write!(f, "learn book {id}"),
        }
    }
}

/// The record a session starts from. Seeds the editor once, then only
/// receives snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectContext {
    pub id: String,
    pub name: String,
    pub language: Language,
    pub code: String,
}

impl ProjectContext {
    pub fn editor_state(&self) -> EditorState {
        EditorState {
            code: self.code.clone(),
            language: self.language,
        }
    }
}

/// Outcome of one code execution in the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

/// The backend surface a session needs.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch the record being edited.
    async fn load(&self, target: &SessionTarget) -> Result<ProjectContext, BackendError>;

    /// Write an editor snapshot back to the record.
    async fn save(&self, target: &SessionTarget, state: &EditorState) -> Result<(), BackendError>;

    /// Execute code in the sandbox.
    async fn run(&self, code: &str) -> Result<RunResult, BackendError>;
}
