use tokio::sync::watch;
use tracing::debug;

use super::chat::{Chat, Message, ModelKind};

/// Transient, per-session UI state: the active chat, the loaded chat list,
/// the active chat's messages, the selected model, and loading flags.
///
/// This is a pure state container. It performs no I/O and no validation;
/// every mutation funnels through the controller's named operations so the
/// invariant that `messages` always belongs to `current_chat_id` is
/// enforced at a single choke point.
pub struct SessionStore {
    current_chat_id: Option<String>,
    chats: Vec<Chat>,
    messages: Vec<Message>,
    selected_model: ModelKind,
    is_loading: bool,
    chats_loading: bool,
    /// Bumped on every mutation so views and tests can await changes.
    changed: watch::Sender<u64>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            current_chat_id: None,
            chats: Vec::new(),
            messages: Vec::new(),
            selected_model: ModelKind::Numerical,
            is_loading: false,
            chats_loading: false,
            changed,
        }
    }

    /// Observe state changes. The received value is a version counter;
    /// any change bumps it.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    fn touch(&self) {
        self.changed.send_modify(|version| *version += 1);
    }

    pub fn current_chat_id(&self) -> Option<&str> {
        self.current_chat_id.as_deref()
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn chat_count(&self) -> usize {
        self.chats.len()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn selected_model(&self) -> ModelKind {
        self.selected_model
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn chats_loading(&self) -> bool {
        self.chats_loading
    }

    /// Switch the active chat. Atomically empties `messages` in the same
    /// mutation so a stale thread is never visible under the new id.
    pub fn set_current_chat(&mut self, chat_id: Option<String>) {
        self.current_chat_id = chat_id;
        self.messages.clear();
        self.touch();
    }

    /// Replace the chat list (already ordered by `updated_at` descending).
    pub fn replace_chats(&mut self, chats: Vec<Chat>) {
        self.chats = chats;
        self.touch();
    }

    /// Put a freshly created chat at the top of the list.
    pub fn prepend_chat(&mut self, chat: Chat) {
        self.chats.insert(0, chat);
        self.touch();
    }

    /// Swap in the server-confirmed record after a rename, preserving the
    /// list order (the list is not re-sorted on rename).
    pub fn replace_chat(&mut self, updated: Chat) {
        if let Some(slot) = self.chats.iter_mut().find(|c| c.id == updated.id) {
            *slot = updated;
            self.touch();
        }
    }

    /// Drop a chat from the list. When it was the active chat, the selection
    /// and its messages are cleared in the same mutation. Returns whether it
    /// was the active chat.
    pub fn remove_chat(&mut self, chat_id: &str) -> bool {
        self.chats.retain(|c| c.id != chat_id);
        let was_current = self.current_chat_id.as_deref() == Some(chat_id);
        if was_current {
            self.current_chat_id = None;
            self.messages.clear();
        }
        self.touch();
        was_current
    }

    /// Replace the active chat's message thread with a fresh baseline load.
    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.touch();
    }

    /// Append a message pushed by the realtime feed.
    ///
    /// The append is idempotent: a message whose id is already present is
    /// dropped, and a message for a chat other than the active one is
    /// ignored rather than leaked into the visible thread.
    pub fn add_message(&mut self, message: Message) {
        if self.current_chat_id.as_deref() != Some(message.chat_id.as_str()) {
            debug!(
                message_id = %message.id,
                chat_id = %message.chat_id,
                "Ignoring message for a non-active chat"
            );
            return;
        }
        if self.messages.iter().any(|m| m.id == message.id) {
            debug!(message_id = %message.id, "Suppressing duplicate message");
            return;
        }
        self.messages.push(message);
        self.touch();
    }

    pub fn set_selected_model(&mut self, model: ModelKind) {
        self.selected_model = model;
        self.touch();
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
        self.touch();
    }

    pub fn set_chats_loading(&mut self, loading: bool) {
        self.chats_loading = loading;
        self.touch();
    }

    /// Clear the active selection, its messages, and the loading flag.
    /// The chat list and the selected model survive a reset.
    pub fn reset(&mut self) {
        self.current_chat_id = None;
        self.messages.clear();
        self.is_loading = false;
        self.touch();
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
