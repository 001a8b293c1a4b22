use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::chat_repository::{BoxFuture, ChatRepository, FEED_CAPACITY, MessageFeed};
use super::error::{RepositoryError, RepositoryResult};
use crate::models::{Chat, Message, NewMessage, now_millis};

struct StoredChat {
    user_id: String,
    chat: Chat,
}

#[derive(Default)]
struct Inner {
    chats: Vec<StoredChat>,
    messages: Vec<Message>,
}

/// In-memory chat repository. Useful for testing and development.
#[derive(Clone)]
pub struct InMemoryChatRepository {
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<Message>,
}

impl InMemoryChatRepository {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            events,
        }
    }
}

impl Default for InMemoryChatRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatRepository for InMemoryChatRepository {
    fn list_chats(&self, user_id: &str) -> BoxFuture<'static, RepositoryResult<Vec<Chat>>> {
        let inner = self.inner.clone();
        let user_id = user_id.to_string();

        Box::pin(async move {
            let store = inner.lock();
            let mut chats: Vec<Chat> = store
                .chats
                .iter()
                .filter(|c| c.user_id == user_id)
                .map(|c| c.chat.clone())
                .collect();

            chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

            Ok(chats)
        })
    }

    fn insert_chat(
        &self,
        user_id: &str,
        title: &str,
    ) -> BoxFuture<'static, RepositoryResult<Chat>> {
        let inner = self.inner.clone();
        let user_id = user_id.to_string();
        let title = title.to_string();

        Box::pin(async move {
            let now = now_millis();
            let chat = Chat {
                id: Uuid::new_v4().to_string(),
                title,
                created_at: now,
                updated_at: now,
            };

            inner.lock().chats.push(StoredChat {
                user_id,
                chat: chat.clone(),
            });

            Ok(chat)
        })
    }

    fn rename_chat(
        &self,
        chat_id: &str,
        title: &str,
    ) -> BoxFuture<'static, RepositoryResult<Chat>> {
        let inner = self.inner.clone();
        let chat_id = chat_id.to_string();
        let title = title.to_string();

        Box::pin(async move {
            let mut store = inner.lock();
            match store.chats.iter_mut().find(|c| c.chat.id == chat_id) {
                Some(stored) => {
                    stored.chat.title = title;
                    Ok(stored.chat.clone())
                }
                None => Err(RepositoryError::ChatNotFound { chat_id }),
            }
        })
    }

    fn delete_chat(&self, chat_id: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        let inner = self.inner.clone();
        let chat_id = chat_id.to_string();

        Box::pin(async move {
            let mut store = inner.lock();
            store.messages.retain(|m| m.chat_id != chat_id);
            store.chats.retain(|c| c.chat.id != chat_id);
            Ok(())
        })
    }

    fn list_messages(&self, chat_id: &str) -> BoxFuture<'static, RepositoryResult<Vec<Message>>> {
        let inner = self.inner.clone();
        let chat_id = chat_id.to_string();

        Box::pin(async move {
            let store = inner.lock();
            let mut messages: Vec<Message> = store
                .messages
                .iter()
                .filter(|m| m.chat_id == chat_id)
                .cloned()
                .collect();

            // Stable sort keeps insertion order for same-millisecond rows.
            messages.sort_by_key(|m| m.created_at);

            Ok(messages)
        })
    }

    fn insert_message(
        &self,
        message: NewMessage,
    ) -> BoxFuture<'static, RepositoryResult<Message>> {
        let inner = self.inner.clone();
        let events = self.events.clone();

        Box::pin(async move {
            let stored = Message {
                id: Uuid::new_v4().to_string(),
                chat_id: message.chat_id,
                role: message.role,
                text: message.text,
                created_at: now_millis(),
                file_name: message.file_name,
                file_type: message.file_type,
                file_size: message.file_size,
            };

            {
                let mut store = inner.lock();
                if let Some(parent) = store
                    .chats
                    .iter_mut()
                    .find(|c| c.chat.id == stored.chat_id)
                {
                    parent.chat.updated_at = stored.created_at;
                }
                store.messages.push(stored.clone());
            }

            let _ = events.send(stored.clone());

            Ok(stored)
        })
    }

    fn subscribe_messages(&self, chat_id: &str) -> MessageFeed {
        MessageFeed::new(chat_id.to_string(), self.events.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[tokio::test]
    async fn save_and_list_by_owner() {
        let repo = InMemoryChatRepository::new();

        repo.insert_chat("u1", "Mine").await.unwrap();
        repo.insert_chat("u2", "Theirs").await.unwrap();

        let chats = repo.list_chats("u1").await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].title, "Mine");
    }

    #[tokio::test]
    async fn delete_removes_chat_and_messages() {
        let repo = InMemoryChatRepository::new();
        let chat = repo.insert_chat("u1", "New Chat").await.unwrap();
        repo.insert_message(NewMessage::text_only(&chat.id, Role::User, "hi"))
            .await
            .unwrap();

        repo.delete_chat(&chat.id).await.unwrap();

        assert!(repo.list_chats("u1").await.unwrap().is_empty());
        assert!(repo.list_messages(&chat.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn inserting_bumps_parent_updated_at() {
        let repo = InMemoryChatRepository::new();
        let first = repo.insert_chat("u1", "First").await.unwrap();
        let _second = repo.insert_chat("u1", "Second").await.unwrap();

        repo.insert_message(NewMessage::text_only(&first.id, Role::User, "bump"))
            .await
            .unwrap();

        let chats = repo.list_chats("u1").await.unwrap();
        assert_eq!(chats[0].id, first.id);
        assert!(chats[0].updated_at >= chats[1].updated_at);
    }

    #[tokio::test]
    async fn rename_missing_chat_errors() {
        let repo = InMemoryChatRepository::new();
        let result = repo.rename_chat("missing", "title").await;
        assert!(matches!(result, Err(RepositoryError::ChatNotFound { .. })));
    }
}
