//! Shared type definitions for the database layer.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Malformed JSON column {column}: {source}")]
    Json {
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A row from the `extended_contacts` table: the user-authored overlay on top
/// of an address-book contact.
///
/// `phones`, `emails`, `social_networks` and `tags` are stored as JSON text.
/// Use the `*_list` / `*_map` accessors to decode them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbExtendedContact {
    pub contact_id: i64,
    pub name: String,
    pub phones: String,
    pub emails: String,
    pub photo_uri: Option<String>,
    /// `YYYY-MM-DD`
    pub birthday: Option<String>,
    pub social_networks: Option<String>,
    /// Denormalized copy; `contact_tags` is the source of truth.
    pub tags: Option<String>,
    pub biography: Option<String>,
    pub notes: Option<String>,
    pub last_call_date: Option<String>,
    pub last_message_date: Option<String>,
    pub last_meeting_date: Option<String>,
    pub reminder_to_call: Option<String>,
    pub reminder_to_congratulate: bool,
    pub reminder_reason: Option<String>,
    pub is_locked: bool,
    pub date_added: String,
    pub date_modified: String,
}

impl DbExtendedContact {
    pub fn phone_list(&self) -> Vec<String> {
        parse_string_list(Some(&self.phones))
    }

    pub fn email_list(&self) -> Vec<String> {
        parse_string_list(Some(&self.emails))
    }

    pub fn social_network_map(&self) -> BTreeMap<String, String> {
        parse_social_networks(self.social_networks.as_deref())
    }
}

/// Decode a JSON array of strings. Blank or malformed input yields an empty list.
pub fn parse_string_list(json: Option<&str>) -> Vec<String> {
    match json {
        Some(s) if !s.trim().is_empty() => serde_json::from_str(s).unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Decode a JSON object of platform → URL. Blank or malformed input yields an empty map.
pub fn parse_social_networks(json: Option<&str>) -> BTreeMap<String, String> {
    match json {
        Some(s) if !s.trim().is_empty() => serde_json::from_str(s).unwrap_or_default(),
        _ => BTreeMap::new(),
    }
}

/// A row from the `contact_tags` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbContactTag {
    pub id: i64,
    pub contact_id: i64,
    pub tag_name: String,
}

/// Kind of reminder. Stored as snake_case text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderType {
    CallBack,
    Birthday,
    Anniversary,
    Custom,
}

impl ReminderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderType::CallBack => "call_back",
            ReminderType::Birthday => "birthday",
            ReminderType::Anniversary => "anniversary",
            ReminderType::Custom => "custom",
        }
    }
}

impl fmt::Display for ReminderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "call_back" | "callback" => Ok(ReminderType::CallBack),
            "birthday" => Ok(ReminderType::Birthday),
            "anniversary" => Ok(ReminderType::Anniversary),
            "custom" => Ok(ReminderType::Custom),
            other => Err(format!("Unknown reminder type: {other}")),
        }
    }
}

/// A row from the `reminders` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbReminder {
    pub id: i64,
    pub contact_id: i64,
    pub reminder_type: ReminderType,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_at: String,
    pub is_completed: bool,
    pub date_created: String,
    /// Set once the reminder has been delivered through a notifier.
    pub notified_at: Option<String>,
}

/// Fields needed to create a reminder. The id and bookkeeping columns are
/// assigned by the database.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReminder {
    pub contact_id: i64,
    pub reminder_type: ReminderType,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string_list_tolerates_garbage() {
        assert!(parse_string_list(None).is_empty());
        assert!(parse_string_list(Some("   ")).is_empty());
        assert!(parse_string_list(Some("{not json")).is_empty());
        assert_eq!(
            parse_string_list(Some(r#"["a","b"]"#)),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_parse_social_networks() {
        let map = parse_social_networks(Some(r#"{"github":"https://github.com/ann"}"#));
        assert_eq!(map.get("github").map(String::as_str), Some("https://github.com/ann"));
        assert!(parse_social_networks(Some("[]")).is_empty());
    }

    #[test]
    fn test_reminder_type_from_str() {
        assert_eq!("call-back".parse::<ReminderType>(), Ok(ReminderType::CallBack));
        assert_eq!("Birthday".parse::<ReminderType>(), Ok(ReminderType::Birthday));
        assert!("weekly".parse::<ReminderType>().is_err());
        assert_eq!(ReminderType::Anniversary.to_string(), "anniversary");
    }
}
