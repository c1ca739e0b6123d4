//! Flat-file persistence layer for galchat.

pub mod app_state_repository;
pub mod engagement_store;
pub mod json_session_repository;
pub mod storage;

pub use app_state_repository::FileStateRepository;
pub use engagement_store::JsonEngagementStore;
pub use json_session_repository::JsonSessionRepository;
