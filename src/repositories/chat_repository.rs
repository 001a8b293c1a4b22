use std::future::Future;
use std::pin::Pin;

use tokio::sync::broadcast;
use tracing::warn;

use super::error::RepositoryResult;
use crate::models::{Chat, Message, NewMessage};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Capacity of the insert-event channel. A consumer that falls further
/// behind than this sees a lag notice and skips ahead.
pub(crate) const FEED_CAPACITY: usize = 256;

/// A live subscription to message-insert events for a single chat.
///
/// Models the persistence collaborator's row-insert push channel as an
/// explicit resource: the feed only yields rows matching its `chat_id`,
/// and dropping it releases the subscription. Events inserted before the
/// feed was opened are never delivered, so subscribers should load their
/// baseline first (the controller does).
pub struct MessageFeed {
    chat_id: String,
    receiver: broadcast::Receiver<Message>,
}

impl MessageFeed {
    pub(crate) fn new(chat_id: String, receiver: broadcast::Receiver<Message>) -> Self {
        Self { chat_id, receiver }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Next insert event for this chat. `None` once the repository side of
    /// the channel is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if message.chat_id == self.chat_id => return Some(message),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(chat_id = %self.chat_id, skipped, "Message feed lagged behind");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Persistence contract for chats and messages.
///
/// Backends must keep `list_chats` ordered by `updated_at` descending and
/// `list_messages` by `created_at` ascending, delete a chat's messages
/// together with the chat row, and publish every inserted message to the
/// feeds returned by `subscribe_messages`.
pub trait ChatRepository: Send + Sync + 'static {
    /// All chats owned by `user_id`, most recently updated first.
    fn list_chats(&self, user_id: &str) -> BoxFuture<'static, RepositoryResult<Vec<Chat>>>;

    /// Insert a chat and return the stored row.
    fn insert_chat(&self, user_id: &str, title: &str)
    -> BoxFuture<'static, RepositoryResult<Chat>>;

    /// Update a chat's title and return the server-confirmed row.
    fn rename_chat(&self, chat_id: &str, title: &str)
    -> BoxFuture<'static, RepositoryResult<Chat>>;

    /// Delete a chat and all of its messages.
    fn delete_chat(&self, chat_id: &str) -> BoxFuture<'static, RepositoryResult<()>>;

    /// The chat's thread, oldest first.
    fn list_messages(&self, chat_id: &str) -> BoxFuture<'static, RepositoryResult<Vec<Message>>>;

    /// Insert a message, bump the parent chat's `updated_at`, publish the
    /// row to subscribers, and return the stored row.
    fn insert_message(&self, message: NewMessage)
    -> BoxFuture<'static, RepositoryResult<Message>>;

    /// Open an insert-event feed scoped to `chat_id`.
    fn subscribe_messages(&self, chat_id: &str) -> MessageFeed;
}
