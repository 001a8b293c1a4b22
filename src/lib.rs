//! Conversation and session state for the insight chat client.
//!
//! The crate is organised around a central [`models::SessionStore`] that a
//! [`controllers::ChatController`] mutates on behalf of the UI. Persistence
//! sits behind the [`repositories::ChatRepository`] trait with SQLite and
//! in-memory backends, analysis requests go through
//! [`services::AnalysisClient`], and [`views`] turns stored message text
//! into renderable blocks.

pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;
pub mod views;

pub use controllers::{ChatController, ComposerState, ControllerError};
pub use models::{Chat, Message, ModelKind, Role, SessionStore};
pub use repositories::{ChatRepository, ChatSqliteRepository, InMemoryChatRepository};
pub use services::{AnalysisClient, AnalysisConfig};
pub use views::{MessageContent, render};
