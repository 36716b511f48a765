pub mod biometric;
pub mod cleanup;
pub mod db;
pub mod dedup;
pub mod error;
pub mod lock;
mod migrations;
pub mod notification;
pub mod provider;
pub mod reconcile;
pub mod reminders;
pub mod service;
pub mod state;
pub mod types;
pub mod util;

pub use cleanup::{CleanupHandle, CleanupService};
pub use dedup::CleanupStatus;
pub use error::ServiceError;
pub use service::ContactService;
