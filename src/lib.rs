//! Voice-coding session controller.
//!
//! Keeps a code editor and a voice agent in agreement: the agent gets a
//! debounced view of the editor, structured results from the agent land in
//! the editor and output panel, generated code runs, and the "waiting for a
//! reply" indicator tracks the conversation.

pub mod backend;
pub mod channel;
pub mod config;
pub mod session;

pub use backend::{Backend, BackendError, ProjectContext, RunResult, SessionTarget};
pub use channel::{ChannelError, ChannelEvent, Message, RealtimeChannel};
pub use config::{ConfigError, SessionConfig};
pub use session::editor::{EditorState, Language, OutputState, OutputView};
pub use session::execution::{RunRejected, RunReport};
pub use session::runtime::{mount, SessionError, SessionHandle};
pub use session::{SessionController, SessionSnapshot};
