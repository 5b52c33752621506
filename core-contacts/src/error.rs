use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContactStoreError {
    #[error("Contacts database not found at {}", path.display())]
    DatabaseNotFound { path: PathBuf },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, ContactStoreError>;
