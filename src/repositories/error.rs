use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Repository initialization failed: {message}")]
    Initialization { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Chat not found: {chat_id}")]
    ChatNotFound { chat_id: String },
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
