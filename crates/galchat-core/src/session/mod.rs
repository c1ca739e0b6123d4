//! Session domain: messages, the session entity, and persistence traits.

pub mod message;
pub mod model;
pub mod repository;

pub use message::{ChatMessage, Feedback, MessageKind, MessageRole, training_weight};
pub use model::{DEFAULT_SESSION_TITLE, Session, SessionSummary};
pub use repository::{SessionRepository, StateRepository};
