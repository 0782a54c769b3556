use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("image `{id}` not found")]
    ImageNotFound { id: uuid::Uuid },
    #[error("validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn image_not_found(id: uuid::Uuid) -> Self {
        Self::ImageNotFound { id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
