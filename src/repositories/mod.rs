pub mod chat_repository;
pub mod chat_sqlite_repository;
pub mod error;
pub mod in_memory_repository;

pub use chat_repository::{BoxFuture, ChatRepository, MessageFeed};
pub use chat_sqlite_repository::ChatSqliteRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use in_memory_repository::InMemoryChatRepository;
