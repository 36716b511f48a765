//! Reminder notification delivery
//!
//! `Notifier` is the seam for whatever actually shows the notification
//! (desktop toast, push, terminal). `LogNotifier` writes it to the log.

use crate::db::{DbReminder, ReminderType};
use crate::util::truncate_chars;

/// Longest body shown in a notification before it is cut.
const MAX_BODY_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub reminder_id: i64,
    pub title: String,
    pub body: String,
}

fn type_label(reminder_type: ReminderType) -> &'static str {
    match reminder_type {
        ReminderType::CallBack => "Call back",
        ReminderType::Birthday => "Birthday",
        ReminderType::Anniversary => "Anniversary",
        ReminderType::Custom => "Reminder",
    }
}

impl Notification {
    /// Build the notification for a due reminder. The body names the
    /// contact, followed by the description when there is one.
    pub fn for_reminder(reminder: &DbReminder, contact_name: Option<&str>) -> Self {
        let title = if reminder.title.trim().is_empty() {
            type_label(reminder.reminder_type).to_string()
        } else {
            reminder.title.clone()
        };

        let description = reminder.description.as_deref().filter(|d| !d.trim().is_empty());
        let body = match (contact_name, description) {
            (Some(name), Some(desc)) => format!("{name}: {desc}"),
            (Some(name), None) => name.to_string(),
            (None, Some(desc)) => desc.to_string(),
            (None, None) => String::new(),
        };

        Self {
            reminder_id: reminder.id,
            title,
            body: truncate_chars(&body, MAX_BODY_CHARS),
        }
    }

    /// Notification for a locked contact's reminder: the type only.
    pub fn hidden(reminder: &DbReminder) -> Self {
        Self {
            reminder_id: reminder.id,
            title: type_label(reminder.reminder_type).to_string(),
            body: String::new(),
        }
    }
}

/// Delivers reminder notifications. Called from a blocking context.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), String> {
        if notification.body.is_empty() {
            log::info!("Reminder {}: {}", notification.reminder_id, notification.title);
        } else {
            log::info!(
                "Reminder {}: {} ({})",
                notification.reminder_id,
                notification.title,
                notification.body
            );
        }
        Ok(())
    }
}
