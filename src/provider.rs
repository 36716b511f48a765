//! Address-book access.
//!
//! The address book is owned by something else (a phone's contact store, a
//! synced vCard folder, a JSON export). The rest of the crate only sees the
//! `ContactProvider` capability: read every contact, check that one still
//! exists, delete one.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Contact;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Address book I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Address book at {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize address book for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Address book rejected deletion of contact {0}")]
    DeleteRejected(i64),
}

/// Read/delete capability over an address book.
///
/// Implementations block; async callers go through `spawn_blocking`.
pub trait ContactProvider: Send + Sync {
    /// Every contact, ordered by display name (case-insensitive).
    fn read_contacts(&self) -> Result<Vec<Contact>, ProviderError>;

    fn contact_exists(&self, id: i64) -> Result<bool, ProviderError>;

    /// Delete a contact and everything attached to it.
    /// Returns the number of underlying records removed (0 if none).
    fn delete_contact(&self, id: i64) -> Result<usize, ProviderError>;
}

fn sort_by_name(contacts: &mut [Contact]) {
    contacts.sort_by_key(|c| c.name.to_lowercase());
}

// =============================================================================
// JSON file address book
// =============================================================================

/// On-disk record. Phone numbers are stored as typed by the user and
/// normalized on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressBookEntry {
    id: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    phones: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    photo_uri: Option<String>,
}

/// Address book stored as a JSON array of `{id, name, phones, photoUri}`.
///
/// The same id may appear more than once (one entry per linked account); a
/// delete removes all of them, like deleting every raw contact behind an
/// aggregate. Reads merge them into one contact.
pub struct JsonAddressBook {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonAddressBook {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_entries(&self) -> Result<Vec<AddressBookEntry>, ProviderError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|source| ProviderError::Io {
            path: self.path.clone(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|source| ProviderError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Write through a sibling temp file so a crash never leaves a truncated book.
    fn store_entries(&self, entries: &[AddressBookEntry]) -> Result<(), ProviderError> {
        let io_err = |source: std::io::Error| ProviderError::Io {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_string_pretty(entries).map_err(|source| ProviderError::Serialize {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl ContactProvider for JsonAddressBook {
    fn read_contacts(&self) -> Result<Vec<Contact>, ProviderError> {
        let _guard = self.lock.lock();
        let mut contacts: Vec<Contact> = Vec::new();
        for entry in self.load_entries()? {
            let incoming = Contact::new(entry.id, entry.name.unwrap_or_default(), &entry.phones);
            match contacts.iter_mut().find(|c| c.id == entry.id) {
                Some(existing) => {
                    for phone in incoming.phones {
                        if !existing.phones.contains(&phone) {
                            existing.phones.push(phone);
                        }
                    }
                    if existing.photo_uri.is_none() {
                        existing.photo_uri = entry.photo_uri;
                    }
                }
                None => contacts.push(Contact {
                    photo_uri: entry.photo_uri,
                    ..incoming
                }),
            }
        }
        sort_by_name(&mut contacts);
        Ok(contacts)
    }

    fn contact_exists(&self, id: i64) -> Result<bool, ProviderError> {
        let _guard = self.lock.lock();
        Ok(self.load_entries()?.iter().any(|e| e.id == id))
    }

    fn delete_contact(&self, id: i64) -> Result<usize, ProviderError> {
        let _guard = self.lock.lock();
        let mut entries = self.load_entries()?;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = before - entries.len();
        if removed > 0 {
            self.store_entries(&entries)?;
        }
        Ok(removed)
    }
}

// =============================================================================
// In-memory address book
// =============================================================================

/// Address book held in memory. Used for embedding and tests; individual
/// deletes can be made to fail to exercise partial-failure paths.
#[derive(Default)]
pub struct MemoryAddressBook {
    contacts: Mutex<Vec<Contact>>,
    failing_deletes: Mutex<HashSet<i64>>,
    unreadable: Mutex<bool>,
}

impl MemoryAddressBook {
    pub fn new(contacts: Vec<Contact>) -> Self {
        Self {
            contacts: Mutex::new(contacts),
            ..Default::default()
        }
    }

    /// Make `delete_contact(id)` return an error.
    pub fn fail_delete_for(&self, id: i64) {
        self.failing_deletes.lock().insert(id);
    }

    /// Make `read_contacts` return an error.
    pub fn set_unreadable(&self, unreadable: bool) {
        *self.unreadable.lock() = unreadable;
    }

    pub fn ids(&self) -> Vec<i64> {
        self.contacts.lock().iter().map(|c| c.id).collect()
    }
}

impl ContactProvider for MemoryAddressBook {
    fn read_contacts(&self) -> Result<Vec<Contact>, ProviderError> {
        if *self.unreadable.lock() {
            return Err(ProviderError::Io {
                path: PathBuf::from(":memory:"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "unreadable"),
            });
        }
        Ok(self.contacts.lock().clone())
    }

    fn contact_exists(&self, id: i64) -> Result<bool, ProviderError> {
        Ok(self.contacts.lock().iter().any(|c| c.id == id))
    }

    fn delete_contact(&self, id: i64) -> Result<usize, ProviderError> {
        if self.failing_deletes.lock().contains(&id) {
            return Err(ProviderError::DeleteRejected(id));
        }
        let mut contacts = self.contacts.lock();
        let before = contacts.len();
        contacts.retain(|c| c.id != id);
        Ok(before - contacts.len())
    }
}
