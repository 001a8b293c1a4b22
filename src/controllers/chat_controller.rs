use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::attachment::AttachmentError;
use super::composer::{ComposerState, StagedAttachment};
use crate::models::{Chat, ModelKind, NewMessage, Role, SessionStore};
use crate::repositories::{ChatRepository, RepositoryError};
use crate::services::{AnalysisClient, AnalysisError, AnalysisRequest};

/// Title given to chats on creation.
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("No signed-in user")]
    NotSignedIn,

    #[error(transparent)]
    Attachment(#[from] AttachmentError),

    #[error("Persistence failed: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),
}

struct FeedTask {
    chat_id: String,
    handle: JoinHandle<()>,
}

/// Orchestrates the session: chat CRUD, message sending, and the realtime
/// feed for the active chat.
///
/// All session state lives in the [`SessionStore`] and is mutated only
/// here. At most one feed task is live at a time; it is torn down before a
/// new subscription is opened, on sign-out, and on drop. A selection
/// generation counter suppresses stale message loads when the user switches
/// chats faster than the repository answers.
pub struct ChatController {
    repo: Arc<dyn ChatRepository>,
    analysis: AnalysisClient,
    store: Arc<RwLock<SessionStore>>,
    composer: Mutex<ComposerState>,
    user_id: RwLock<Option<String>>,
    select_generation: AtomicU64,
    feed_task: Mutex<Option<FeedTask>>,
}

impl ChatController {
    pub fn new(
        repo: Arc<dyn ChatRepository>,
        analysis: AnalysisClient,
        user_id: Option<String>,
    ) -> Self {
        Self {
            repo,
            analysis,
            store: Arc::new(RwLock::new(SessionStore::new())),
            composer: Mutex::new(ComposerState::default()),
            user_id: RwLock::new(user_id),
            select_generation: AtomicU64::new(0),
            feed_task: Mutex::new(None),
        }
    }

    /// Shared handle to the session state, for views and tests.
    pub fn store(&self) -> Arc<RwLock<SessionStore>> {
        self.store.clone()
    }

    /// Observe session state changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.store.read().subscribe()
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        *self.user_id.write() = Some(user_id.into());
    }

    /// Drop the feed, clear the session (the chat list and model selection
    /// survive), and forget the user.
    pub fn sign_out(&self) {
        self.invalidate_selection();
        self.teardown_feed();
        *self.user_id.write() = None;
        *self.composer.lock() = ComposerState::default();
        self.store.write().reset();
    }

    fn require_user(&self) -> Result<String, ControllerError> {
        self.user_id
            .read()
            .clone()
            .ok_or(ControllerError::NotSignedIn)
    }

    /// Bump the selection generation, invalidating in-flight loads that
    /// targeted the previous selection.
    fn invalidate_selection(&self) -> u64 {
        self.select_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn selection_is_current(&self, generation: u64) -> bool {
        self.select_generation.load(Ordering::SeqCst) == generation
    }

    /// Load the signed-in user's chats, most recently updated first.
    pub async fn load_chats(&self) -> Result<(), ControllerError> {
        let user_id = self.require_user()?;

        self.store.write().set_chats_loading(true);
        let result = self.repo.list_chats(&user_id).await;

        let mut store = self.store.write();
        store.set_chats_loading(false);
        match result {
            Ok(chats) => {
                debug!(count = chats.len(), "Loaded chat list");
                store.replace_chats(chats);
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "Failed to load chats");
                Err(err.into())
            }
        }
    }

    /// Create a chat, put it at the top of the list, and select it.
    pub async fn create_chat(&self) -> Result<Chat, ControllerError> {
        let user_id = self.require_user()?;

        let chat = self.repo.insert_chat(&user_id, DEFAULT_CHAT_TITLE).await?;
        info!(chat_id = %chat.id, "Created chat");

        let generation = self.invalidate_selection();
        self.teardown_feed();
        {
            let mut store = self.store.write();
            store.prepend_chat(chat.clone());
            store.set_current_chat(Some(chat.id.clone()));
        }
        // A fresh chat has no baseline to load; subscribe immediately.
        self.start_feed(chat.id.clone(), generation);

        Ok(chat)
    }

    /// Select a chat and load its thread. When selections overlap, the most
    /// recently requested chat wins; slower responses for abandoned
    /// selections are discarded.
    pub async fn select_chat(&self, chat_id: &str) -> Result<(), ControllerError> {
        let generation = self.invalidate_selection();
        self.teardown_feed();
        self.store
            .write()
            .set_current_chat(Some(chat_id.to_string()));

        let result = self.repo.list_messages(chat_id).await;

        if !self.selection_is_current(generation) {
            debug!(chat_id, "Discarding stale message load");
            return Ok(());
        }

        let messages = result?;
        {
            let mut store = self.store.write();
            if store.current_chat_id() != Some(chat_id) {
                return Ok(());
            }
            store.replace_messages(messages);
        }

        // Subscribe only once the baseline is in place, so a push can never
        // land ahead of the initial thread.
        self.start_feed(chat_id.to_string(), generation);
        Ok(())
    }

    /// Persist a new title. Whitespace-only titles are a no-op; the stored
    /// title is left untouched.
    pub async fn rename_chat(&self, chat_id: &str, new_title: &str) -> Result<(), ControllerError> {
        if new_title.trim().is_empty() {
            debug!(chat_id, "Ignoring empty rename");
            return Ok(());
        }

        let updated = self.repo.rename_chat(chat_id, new_title).await?;
        self.store.write().replace_chat(updated);
        Ok(())
    }

    /// Delete a chat and its messages. When it was the active chat, the
    /// selection, its thread, and the feed are cleared too.
    pub async fn delete_chat(&self, chat_id: &str) -> Result<(), ControllerError> {
        self.repo.delete_chat(chat_id).await?;
        info!(chat_id, "Deleted chat");

        let was_current = self.store.write().remove_chat(chat_id);
        if was_current {
            self.invalidate_selection();
            self.teardown_feed();
        }
        Ok(())
    }

    /// Submit a message to the active chat.
    ///
    /// A no-op when there is nothing to send (no text and no staged file),
    /// no chat is selected, or a send is already in flight. Otherwise the
    /// user message (with any staged file inlined) is persisted, the
    /// analysis endpoint for the selected model is called, and its verdict
    /// is persisted as the assistant reply. Both rows reach the store
    /// through the realtime feed.
    ///
    /// On failure the typed text is restored to the composer draft and the
    /// staged file stays staged; a user message persisted before an
    /// analysis failure remains persisted.
    pub async fn send_message(&self, text: &str) -> Result<(), ControllerError> {
        let trimmed = text.trim().to_string();

        let (chat_id, model) = {
            let store = self.store.read();
            if store.is_loading() {
                return Ok(());
            }
            if trimmed.is_empty() && !self.composer.lock().has_attachment() {
                return Ok(());
            }
            let Some(chat_id) = store.current_chat_id() else {
                return Ok(());
            };
            (chat_id.to_string(), store.selected_model())
        };

        self.store.write().set_loading(true);
        let outcome = self.send_to_chat(&chat_id, &trimmed, model).await;
        self.store.write().set_loading(false);

        if let Err(err) = &outcome {
            error!(chat_id = %chat_id, error = %err, "Failed to send message");
            // The user keeps what they typed and can retry as-is.
            self.composer.lock().draft = text.to_string();
        }
        outcome
    }

    async fn send_to_chat(
        &self,
        chat_id: &str,
        text: &str,
        model: ModelKind,
    ) -> Result<(), ControllerError> {
        let (content, file_name, file_type, file_size) = {
            let composer = self.composer.lock();
            let meta = composer.attachment().map(|file| {
                (
                    file.file_name.clone(),
                    file.mime_type.clone(),
                    file.size() as i64,
                )
            });
            match meta {
                Some((name, mime, size)) => {
                    (composer.compose(text), Some(name), Some(mime), Some(size))
                }
                None => (composer.compose(text), None, None, None),
            }
        };

        self.repo
            .insert_message(NewMessage {
                chat_id: chat_id.to_string(),
                role: Role::User,
                text: content.clone(),
                file_name: file_name.clone(),
                file_type: file_type.clone(),
                file_size,
            })
            .await?;

        let request = AnalysisRequest {
            text: content,
            file_name,
            file_type,
            has_file: file_size.is_some(),
        };
        let reply = self.analysis.predict(model, &request).await?;

        self.repo
            .insert_message(NewMessage::text_only(
                chat_id,
                Role::Assistant,
                reply.display(),
            ))
            .await?;

        self.composer.lock().clear_attachment();
        Ok(())
    }

    /// Validate and stage a file for the next send, replacing any
    /// previously staged one.
    pub fn stage_attachment(&self, file: StagedAttachment) -> Result<(), ControllerError> {
        self.composer.lock().stage(file)?;
        Ok(())
    }

    pub fn clear_attachment(&self) {
        self.composer.lock().clear_attachment();
    }

    pub fn staged_attachment_name(&self) -> Option<String> {
        self.composer
            .lock()
            .attachment()
            .map(|f| f.file_name.clone())
    }

    /// Draft text restored by a failed send. Taking it empties the draft.
    pub fn take_draft(&self) -> String {
        std::mem::take(&mut self.composer.lock().draft)
    }

    pub fn set_selected_model(&self, model: ModelKind) {
        self.store.write().set_selected_model(model);
    }

    fn start_feed(&self, chat_id: String, generation: u64) {
        let mut slot = self.feed_task.lock();
        // A newer selection may have raced past us while the baseline loaded.
        if !self.selection_is_current(generation) {
            return;
        }
        if let Some(task) = slot.take() {
            task.handle.abort();
        }

        let mut feed = self.repo.subscribe_messages(&chat_id);
        let store = self.store.clone();
        let handle = tokio::spawn(async move {
            while let Some(message) = feed.recv().await {
                store.write().add_message(message);
            }
        });

        debug!(chat_id = %chat_id, "Opened message feed");
        *slot = Some(FeedTask { chat_id, handle });
    }

    fn teardown_feed(&self) {
        if let Some(task) = self.feed_task.lock().take() {
            debug!(chat_id = %task.chat_id, "Closed message feed");
            task.handle.abort();
        }
    }
}

impl Drop for ChatController {
    fn drop(&mut self) {
        self.teardown_feed();
    }
}
