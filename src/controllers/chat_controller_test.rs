use std::collections::HashMap;
use std::sync::{Arc, Once};
use std::time::Duration;

use parking_lot::Mutex;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::chat_controller::{ChatController, ControllerError};
use super::composer::StagedAttachment;
use crate::models::{Chat, Message, NewMessage, Role};
use crate::repositories::chat_repository::{BoxFuture, ChatRepository, MessageFeed};
use crate::repositories::{InMemoryChatRepository, RepositoryResult};
use crate::services::{AnalysisClient, AnalysisConfig};

/// Decorator that delays `list_messages` per chat, for exercising the
/// rapid-switch races.
#[derive(Clone)]
struct DelayedRepository {
    inner: InMemoryChatRepository,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
}

impl DelayedRepository {
    fn new(inner: InMemoryChatRepository) -> Self {
        Self {
            inner,
            delays: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn delay_messages(&self, chat_id: &str, delay: Duration) {
        self.delays.lock().insert(chat_id.to_string(), delay);
    }
}

impl ChatRepository for DelayedRepository {
    fn list_chats(&self, user_id: &str) -> BoxFuture<'static, RepositoryResult<Vec<Chat>>> {
        self.inner.list_chats(user_id)
    }

    fn insert_chat(
        &self,
        user_id: &str,
        title: &str,
    ) -> BoxFuture<'static, RepositoryResult<Chat>> {
        self.inner.insert_chat(user_id, title)
    }

    fn rename_chat(
        &self,
        chat_id: &str,
        title: &str,
    ) -> BoxFuture<'static, RepositoryResult<Chat>> {
        self.inner.rename_chat(chat_id, title)
    }

    fn delete_chat(&self, chat_id: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        self.inner.delete_chat(chat_id)
    }

    fn list_messages(&self, chat_id: &str) -> BoxFuture<'static, RepositoryResult<Vec<Message>>> {
        let delay = self.delays.lock().get(chat_id).copied();
        let load = self.inner.list_messages(chat_id);
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            load.await
        })
    }

    fn insert_message(
        &self,
        message: NewMessage,
    ) -> BoxFuture<'static, RepositoryResult<Message>> {
        self.inner.insert_message(message)
    }

    fn subscribe_messages(&self, chat_id: &str) -> MessageFeed {
        self.inner.subscribe_messages(chat_id)
    }
}

/// Install an env-filtered subscriber once, so `RUST_LOG=debug` surfaces
/// the controller's structured logs during test runs.
fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn analysis_for(server: &MockServer) -> AnalysisClient {
    AnalysisClient::new(AnalysisConfig {
        numerical_url: format!("{}/predictes", server.uri()),
        non_numerical_url: format!("{}/predict", server.uri()),
    })
}

fn offline_analysis() -> AnalysisClient {
    // Nothing listens here; tests that hit this endpoint are asserting the
    // failure path.
    AnalysisClient::new(AnalysisConfig {
        numerical_url: "http://127.0.0.1:9/predictes".to_string(),
        non_numerical_url: "http://127.0.0.1:9/predict".to_string(),
    })
}

async fn mount_verdict(server: &MockServer, sentiment: &str, score: f64) {
    Mock::given(method("POST"))
        .and(path("/predictes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({"sentiment": sentiment, "score": score}),
        ))
        .mount(server)
        .await;
}

/// Wait until the session state satisfies `predicate`, or panic.
async fn wait_until(
    controller: &ChatController,
    what: &str,
    predicate: impl Fn(&crate::models::SessionStore) -> bool,
) {
    let store = controller.store();
    let mut changes = controller.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if predicate(&store.read()) {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for: {what}"));
}

fn csv_attachment(name: &str, content: &[u8]) -> StagedAttachment {
    StagedAttachment {
        file_name: name.to_string(),
        mime_type: "text/csv".to_string(),
        bytes: content.to_vec(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn last_requested_chat_wins_under_rapid_switching() {
    init_tracing();
    let repo = DelayedRepository::new(InMemoryChatRepository::new());
    let slow = repo.inner.insert_chat("u1", "Slow").await.unwrap();
    let fast = repo.inner.insert_chat("u1", "Fast").await.unwrap();
    repo.inner
        .insert_message(NewMessage::text_only(&slow.id, Role::User, "from slow"))
        .await
        .unwrap();
    repo.inner
        .insert_message(NewMessage::text_only(&fast.id, Role::User, "from fast"))
        .await
        .unwrap();
    repo.delay_messages(&slow.id, Duration::from_millis(200));

    let controller = Arc::new(ChatController::new(
        Arc::new(repo),
        offline_analysis(),
        Some("u1".to_string()),
    ));

    let first = {
        let controller = controller.clone();
        let slow_id = slow.id.clone();
        tokio::spawn(async move { controller.select_chat(&slow_id).await })
    };
    // Let the slow selection get in flight before superseding it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    controller.select_chat(&fast.id).await.unwrap();
    first.await.unwrap().unwrap();

    let store = controller.store();
    let store = store.read();
    assert_eq!(store.current_chat_id(), Some(fast.id.as_str()));
    assert_eq!(store.messages().len(), 1);
    assert_eq!(store.messages()[0].text, "from fast");
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_send_is_a_silent_noop() {
    init_tracing();
    let repo = Arc::new(InMemoryChatRepository::new());
    let controller =
        ChatController::new(repo.clone(), offline_analysis(), Some("u1".to_string()));
    let chat = controller.create_chat().await.unwrap();

    controller.send_message("   ").await.unwrap();

    assert!(repo.list_messages(&chat.id).await.unwrap().is_empty());
    assert!(!controller.store().read().is_loading());
}

#[tokio::test(flavor = "multi_thread")]
async fn send_without_a_selected_chat_is_a_noop() {
    init_tracing();
    let repo = Arc::new(InMemoryChatRepository::new());
    let controller =
        ChatController::new(repo.clone(), offline_analysis(), Some("u1".to_string()));

    controller.send_message("hello").await.unwrap();

    assert!(!controller.store().read().is_loading());
}

#[tokio::test(flavor = "multi_thread")]
async fn send_persists_user_then_assistant_in_order() {
    init_tracing();
    let server = MockServer::start().await;
    mount_verdict(&server, "Positive", 0.9).await;

    let repo = Arc::new(InMemoryChatRepository::new());
    let controller =
        ChatController::new(repo.clone(), analysis_for(&server), Some("u1".to_string()));
    let chat = controller.create_chat().await.unwrap();

    controller.send_message("hello").await.unwrap();

    // Both rows arrive in the store through the realtime feed.
    wait_until(&controller, "both messages in store", |s| {
        s.messages().len() == 2
    })
    .await;

    let store = controller.store();
    let store = store.read();
    assert_eq!(store.messages()[0].role, Role::User);
    assert_eq!(store.messages()[0].text, "hello");
    assert_eq!(store.messages()[1].role, Role::Assistant);
    assert_eq!(store.messages()[1].text, "Positive (Score: 0.9)");
    assert!(store.messages().iter().all(|m| m.chat_id == chat.id));
    assert!(!store.is_loading());

    let persisted = repo.list_messages(&chat.id).await.unwrap();
    assert_eq!(persisted.len(), 2);
    assert_eq!(persisted[0].role, Role::User);
    assert_eq!(persisted[1].role, Role::Assistant);
}

#[tokio::test(flavor = "multi_thread")]
async fn analysis_failure_keeps_user_message_and_restores_draft() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predictes"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let repo = Arc::new(InMemoryChatRepository::new());
    let controller =
        ChatController::new(repo.clone(), analysis_for(&server), Some("u1".to_string()));
    let chat = controller.create_chat().await.unwrap();

    let result = controller.send_message("hello").await;

    assert!(matches!(result, Err(ControllerError::Analysis(_))));
    // The user message was written before the call failed and stays put.
    let persisted = repo.list_messages(&chat.id).await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].role, Role::User);
    // Typed input is restored for retry; the session is no longer loading.
    assert_eq!(controller.take_draft(), "hello");
    assert!(!controller.store().read().is_loading());
}

#[tokio::test(flavor = "multi_thread")]
async fn attachment_is_inlined_and_cleared_on_success() {
    init_tracing();
    let server = MockServer::start().await;
    mount_verdict(&server, "Positive", 0.8).await;

    let repo = Arc::new(InMemoryChatRepository::new());
    let controller =
        ChatController::new(repo.clone(), analysis_for(&server), Some("u1".to_string()));
    let chat = controller.create_chat().await.unwrap();

    controller
        .stage_attachment(csv_attachment("data.csv", b"a,b\n1,2"))
        .unwrap();
    controller.send_message("analyze").await.unwrap();

    let persisted = repo.list_messages(&chat.id).await.unwrap();
    assert_eq!(
        persisted[0].text,
        "analyze\n\n--- Uploaded File ---\na,b\n1,2"
    );
    assert_eq!(persisted[0].file_name.as_deref(), Some("data.csv"));
    assert_eq!(persisted[0].file_type.as_deref(), Some("text/csv"));
    assert_eq!(persisted[0].file_size, Some(7));
    assert_eq!(controller.staged_attachment_name(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn attachment_stays_staged_when_the_send_fails() {
    init_tracing();
    let repo = Arc::new(InMemoryChatRepository::new());
    let controller =
        ChatController::new(repo.clone(), offline_analysis(), Some("u1".to_string()));
    controller.create_chat().await.unwrap();

    controller
        .stage_attachment(csv_attachment("data.csv", b"a,b"))
        .unwrap();
    let result = controller.send_message("analyze").await;

    assert!(result.is_err());
    assert_eq!(
        controller.staged_attachment_name().as_deref(),
        Some("data.csv")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn staging_validates_type_and_size() {
    init_tracing();
    let repo = Arc::new(InMemoryChatRepository::new());
    let controller = ChatController::new(repo, offline_analysis(), Some("u1".to_string()));

    let pdf = StagedAttachment {
        file_name: "report.pdf".to_string(),
        mime_type: "application/pdf".to_string(),
        bytes: vec![0; 8],
    };
    assert!(matches!(
        controller.stage_attachment(pdf),
        Err(ControllerError::Attachment(_))
    ));

    let oversized = csv_attachment("big.csv", &vec![b'x'; 6 * 1024 * 1024]);
    assert!(matches!(
        controller.stage_attachment(oversized),
        Err(ControllerError::Attachment(_))
    ));

    assert_eq!(controller.staged_attachment_name(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_current_chat_clears_the_session() {
    init_tracing();
    let repo = Arc::new(InMemoryChatRepository::new());
    let controller =
        ChatController::new(repo.clone(), offline_analysis(), Some("u1".to_string()));
    let chat = controller.create_chat().await.unwrap();
    repo.insert_message(NewMessage::text_only(&chat.id, Role::User, "hi"))
        .await
        .unwrap();
    controller.select_chat(&chat.id).await.unwrap();

    controller.delete_chat(&chat.id).await.unwrap();

    let store = controller.store();
    let store = store.read();
    assert_eq!(store.current_chat_id(), None);
    assert!(store.messages().is_empty());
    assert_eq!(store.chat_count(), 0);
    assert!(repo.list_messages(&chat.id).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn whitespace_rename_leaves_the_title_unchanged() {
    init_tracing();
    let repo = Arc::new(InMemoryChatRepository::new());
    let controller =
        ChatController::new(repo.clone(), offline_analysis(), Some("u1".to_string()));
    let chat = controller.create_chat().await.unwrap();

    controller.rename_chat(&chat.id, "   ").await.unwrap();
    assert_eq!(repo.list_chats("u1").await.unwrap()[0].title, "New Chat");

    controller.rename_chat(&chat.id, "Sales data").await.unwrap();
    assert_eq!(repo.list_chats("u1").await.unwrap()[0].title, "Sales data");
    assert_eq!(controller.store().read().chats()[0].title, "Sales data");
}

#[tokio::test(flavor = "multi_thread")]
async fn feed_only_delivers_the_active_chats_inserts() {
    init_tracing();
    let repo = Arc::new(InMemoryChatRepository::new());
    let controller =
        ChatController::new(repo.clone(), offline_analysis(), Some("u1".to_string()));
    let first = controller.create_chat().await.unwrap();
    let second = controller.create_chat().await.unwrap();

    // `second` is now active; switch back to `first`.
    controller.select_chat(&first.id).await.unwrap();

    repo.insert_message(NewMessage::text_only(&second.id, Role::User, "elsewhere"))
        .await
        .unwrap();
    repo.insert_message(NewMessage::text_only(&first.id, Role::User, "here"))
        .await
        .unwrap();

    wait_until(&controller, "active chat's push", |s| {
        s.messages().len() == 1
    })
    .await;

    let store = controller.store();
    let store = store.read();
    assert_eq!(store.messages().len(), 1);
    assert_eq!(store.messages()[0].text, "here");
    assert_eq!(store.messages()[0].chat_id, first.id);
}

#[tokio::test(flavor = "multi_thread")]
async fn operations_require_a_signed_in_user() {
    init_tracing();
    let repo = Arc::new(InMemoryChatRepository::new());
    let controller = ChatController::new(repo, offline_analysis(), None);

    assert!(matches!(
        controller.create_chat().await,
        Err(ControllerError::NotSignedIn)
    ));
    assert!(matches!(
        controller.load_chats().await,
        Err(ControllerError::NotSignedIn)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn load_chats_fills_the_store_most_recent_first() {
    init_tracing();
    let repo = Arc::new(InMemoryChatRepository::new());
    let older = repo.insert_chat("u1", "Older").await.unwrap();
    let _newer = repo.insert_chat("u1", "Newer").await.unwrap();
    repo.insert_message(NewMessage::text_only(&older.id, Role::User, "bump"))
        .await
        .unwrap();

    let controller =
        ChatController::new(repo.clone(), offline_analysis(), Some("u1".to_string()));
    controller.load_chats().await.unwrap();

    let store = controller.store();
    let store = store.read();
    assert_eq!(store.chat_count(), 2);
    assert_eq!(store.chats()[0].title, "Older");
    assert!(!store.chats_loading());
}

#[tokio::test(flavor = "multi_thread")]
async fn sign_out_resets_the_session_but_keeps_the_chat_list() {
    init_tracing();
    let repo = Arc::new(InMemoryChatRepository::new());
    let controller =
        ChatController::new(repo.clone(), offline_analysis(), Some("u1".to_string()));
    let chat = controller.create_chat().await.unwrap();
    controller.load_chats().await.unwrap();
    controller.select_chat(&chat.id).await.unwrap();

    controller.sign_out();

    let store = controller.store();
    let store = store.read();
    assert_eq!(store.current_chat_id(), None);
    assert!(store.messages().is_empty());
    assert_eq!(store.chat_count(), 1);

    assert!(matches!(
        controller.create_chat().await,
        Err(ControllerError::NotSignedIn)
    ));
}
