//! Session-scoped unlock state for locked ("hidden") contacts.
//!
//! A locked contact shows only its name until the user passes an
//! `Authenticator` challenge. The unlock lasts until another contact is
//! selected or the contact is locked again.

use crate::biometric::{AuthOutcome, AuthRequest, Authenticator};

pub const UNAVAILABLE_MESSAGE: &str = "Set up a fingerprint or device credential to unlock contacts";
pub const FAILED_MESSAGE: &str = "Authentication cancelled or failed";

/// What a lock toggle did. The caller persists `Locked`/`Unlocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Locked,
    Unlocked,
    /// The contact is locked and the session has not been unlocked yet.
    /// Nothing changed; prompt with `unlock` first.
    NeedsUnlock,
    NoSelection,
}

impl ToggleOutcome {
    /// The new persisted flag, if the toggle changed it.
    pub fn new_flag(self) -> Option<bool> {
        match self {
            ToggleOutcome::Locked => Some(true),
            ToggleOutcome::Unlocked => Some(false),
            ToggleOutcome::NeedsUnlock | ToggleOutcome::NoSelection => None,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct LockSession {
    selected: Option<i64>,
    is_locked: bool,
    unlocked: bool,
    in_progress: bool,
    last_error: Option<String>,
}

impl LockSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a contact. Any previous unlock is dropped.
    pub fn select(&mut self, contact_id: i64, is_locked: bool) {
        self.selected = Some(contact_id);
        self.is_locked = is_locked;
        self.unlocked = !is_locked;
        self.in_progress = false;
        self.last_error = None;
    }

    pub fn selected(&self) -> Option<i64> {
        self.selected
    }

    pub fn is_locked(&self) -> bool {
        self.is_locked
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether detail fields (notes, tags, reminders, edit actions) may be shown.
    pub fn details_visible(&self) -> bool {
        self.selected.is_some() && (!self.is_locked || self.unlocked)
    }

    /// Run the challenge for the selected contact. Errors are user-facing text.
    pub async fn unlock(
        &mut self,
        authenticator: &dyn Authenticator,
        contact_name: Option<&str>,
    ) -> Result<(), String> {
        if self.selected.is_none() {
            return Err("No contact selected".to_string());
        }
        if self.details_visible() {
            return Ok(());
        }
        if !authenticator.is_available() {
            self.last_error = Some(UNAVAILABLE_MESSAGE.to_string());
            return Err(UNAVAILABLE_MESSAGE.to_string());
        }

        let request = AuthRequest {
            subtitle: match contact_name {
                Some(name) => format!("Access to contact {name}"),
                None => "Confirm your identity".to_string(),
            },
            ..AuthRequest::default()
        };

        self.in_progress = true;
        let outcome = authenticator.authenticate(&request).await;
        self.in_progress = false;

        match outcome {
            AuthOutcome::Succeeded => {
                self.unlocked = true;
                self.last_error = None;
                Ok(())
            }
            AuthOutcome::Failed(reason) => {
                log::info!("Unlock failed: {}", reason);
                self.last_error = Some(FAILED_MESSAGE.to_string());
                Err(FAILED_MESSAGE.to_string())
            }
            AuthOutcome::Cancelled => {
                self.last_error = Some(FAILED_MESSAGE.to_string());
                Err(FAILED_MESSAGE.to_string())
            }
        }
    }

    /// Flip the lock flag of the selected contact.
    ///
    /// Locking always succeeds and ends the session unlock. Unlocking a
    /// locked contact is only allowed once the session has been unlocked.
    pub fn toggle(&mut self) -> ToggleOutcome {
        if self.selected.is_none() {
            return ToggleOutcome::NoSelection;
        }
        if !self.is_locked {
            self.is_locked = true;
            self.unlocked = false;
            self.last_error = None;
            return ToggleOutcome::Locked;
        }
        if !self.unlocked {
            return ToggleOutcome::NeedsUnlock;
        }
        self.is_locked = false;
        self.unlocked = true;
        self.last_error = None;
        ToggleOutcome::Unlocked
    }
}
