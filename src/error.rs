//! Error types for contact service operations
//!
//! Storage and address-book errors are wrapped as-is; the service adds
//! lookups that found nothing and background tasks that died.

use thiserror::Error;

use crate::db::DbError;
use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Address book error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Contact {0} not found")]
    ContactNotFound(i64),

    #[error("Contact {0} is locked")]
    Locked(i64),

    #[error("Reminder {0} not found")]
    ReminderNotFound(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ServiceError {
    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ServiceError::Db(_) => "Check that ~/.contactbook is writable and not full.",
            ServiceError::Provider(_) => {
                "Check addressBookPath in ~/.contactbook/config.json and the file format."
            }
            ServiceError::ContactNotFound(_) => "Run 'contactbook sync' to refresh contacts.",
            ServiceError::Locked(_) => "Answer the credential prompt to access a locked contact.",
            ServiceError::ReminderNotFound(_) => "List reminders with 'contactbook remind list'.",
            ServiceError::InvalidInput(_) => "Check the command arguments.",
            ServiceError::Join(_) => "Try again.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wraps_lower_layers() {
        let err: ServiceError = DbError::HomeDirNotFound.into();
        assert!(err.to_string().starts_with("Database error"));

        let err: ServiceError = ProviderError::DeleteRejected(3).into();
        assert_eq!(
            err.to_string(),
            "Address book error: Address book rejected deletion of contact 3"
        );
        assert!(err.recovery_suggestion().contains("addressBookPath"));

        let err = ServiceError::Locked(4);
        assert_eq!(err.to_string(), "Contact 4 is locked");
        assert!(err.recovery_suggestion().contains("credential"));
    }
}
