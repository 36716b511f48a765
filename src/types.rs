use std::path::PathBuf;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// User configuration, read from `~/.contactbook/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// JSON address book the provider reads and deletes from.
    pub address_book_path: String,
    /// IANA timezone used when scheduling call-back and birthday reminders.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Local hour of day call-back reminders fire at.
    #[serde(default = "default_call_back_hour")]
    pub call_back_hour: u32,
    /// How often the reminder loop checks for due reminders.
    #[serde(default = "default_reminder_poll_secs")]
    pub reminder_poll_secs: u64,
    /// Hex SHA-256 of the device credential that unlocks hidden contacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_hash: Option<String>,
    /// Use `contactbook-dev.db` instead of the live database.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_call_back_hour() -> u32 {
    10
}

fn default_reminder_poll_secs() -> u64 {
    60
}

impl Config {
    pub fn new(address_book_path: impl Into<String>) -> Self {
        Self {
            address_book_path: address_book_path.into(),
            timezone: default_timezone(),
            call_back_hour: default_call_back_hour(),
            reminder_poll_secs: default_reminder_poll_secs(),
            credential_hash: None,
            dev_mode: false,
        }
    }

    /// Parsed timezone. Unknown names fall back to UTC with a warning.
    pub fn tz(&self) -> Tz {
        match self.timezone.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                log::warn!("Unknown timezone '{}', using UTC", self.timezone);
                Tz::UTC
            }
        }
    }

    pub fn address_book(&self) -> PathBuf {
        PathBuf::from(&self.address_book_path)
    }
}

/// A contact as read from the address book. Transient: never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: i64,
    pub name: String,
    /// Digits only.
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_uri: Option<String>,
}

impl Contact {
    /// Build a contact, normalizing phone numbers to digits and dropping
    /// numbers that contain none.
    pub fn new<S: AsRef<str>>(id: i64, name: impl Into<String>, phones: &[S]) -> Self {
        Self {
            id,
            name: name.into(),
            phones: phones
                .iter()
                .map(|p| crate::util::digits_only(p.as_ref()))
                .filter(|p| !p.is_empty())
                .collect(),
            photo_uri: None,
        }
    }

    pub fn with_photo(mut self, photo_uri: impl Into<String>) -> Self {
        self.photo_uri = Some(photo_uri.into());
        self
    }

    pub fn first_phone(&self) -> Option<&str> {
        self.phones.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"addressBookPath": "/tmp/book.json"}"#).unwrap();
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.call_back_hour, 10);
        assert_eq!(config.reminder_poll_secs, 60);
        assert!(config.credential_hash.is_none());
        assert_eq!(config.tz(), Tz::UTC);
    }

    #[test]
    fn test_config_unknown_timezone_falls_back() {
        let mut config = Config::new("/tmp/book.json");
        config.timezone = "Mars/Olympus".to_string();
        assert_eq!(config.tz(), Tz::UTC);
        config.timezone = "Europe/Moscow".to_string();
        assert_eq!(config.tz(), Tz::Europe__Moscow);
    }

    #[test]
    fn test_contact_new_normalizes_phones() {
        let contact = Contact::new(1, "Ann", &["555-1234", "n/a", "+7 (900) 000"]);
        assert_eq!(contact.phones, vec!["5551234", "7900000"]);
        assert_eq!(contact.first_phone(), Some("5551234"));
        assert!(Contact::new::<&str>(2, "Bob", &[]).first_phone().is_none());
    }
}
