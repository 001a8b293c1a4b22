pub mod attachment;
pub mod chat_controller;
pub mod composer;

pub use attachment::AttachmentError;
pub use chat_controller::{ChatController, ControllerError, DEFAULT_CHAT_TITLE};
pub use composer::{ComposerState, StagedAttachment};

#[cfg(test)]
mod chat_controller_test;
