pub mod chat;
pub mod session_store;

pub use chat::{Chat, Message, ModelKind, NewMessage, Role};
pub use session_store::SessionStore;

pub(crate) use chat::now_millis;
