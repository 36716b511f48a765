//! Duplicate contact cleanup.
//!
//! Two contacts are duplicates when their group keys match:
//! `lowercase(trim(name)) + "_" + digits(first phone)`. Within each group the
//! first contact (address-book order) is kept and the rest are deleted through
//! the provider. One failed delete never aborts the batch.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::provider::ContactProvider;
use crate::types::Contact;
use crate::util::digits_only;

/// Outcome of a cleanup run. The integer codes are the cleanup service's
/// wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStatus {
    /// At least one contact was deleted.
    Success,
    /// Duplicates existed but nothing could be removed, or the address book
    /// could not be read.
    Error,
    /// The address book is empty or contains no duplicate groups.
    NoDuplicates,
}

impl CleanupStatus {
    pub fn code(self) -> i32 {
        match self {
            CleanupStatus::Success => 0,
            CleanupStatus::Error => 1,
            CleanupStatus::NoDuplicates => 2,
        }
    }

    /// Unknown codes collapse to `Error`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => CleanupStatus::Success,
            2 => CleanupStatus::NoDuplicates,
            _ => CleanupStatus::Error,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            CleanupStatus::Success => "Duplicate contacts removed.",
            CleanupStatus::Error => "Could not remove duplicate contacts.",
            CleanupStatus::NoDuplicates => "No duplicate contacts found.",
        }
    }
}

impl fmt::Display for CleanupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Grouping key for a contact, or `None` when it has no phone number.
pub fn group_key(contact: &Contact) -> Option<String> {
    let phone = contact.first_phone()?;
    let digits = digits_only(phone);
    if digits.is_empty() {
        return None;
    }
    Some(format!("{}_{}", contact.name.trim().to_lowercase(), digits))
}

/// A set of contacts sharing one group key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    pub key: String,
    pub keep: Contact,
    pub remove: Vec<Contact>,
}

/// Group contacts by key and return only groups with more than one member,
/// in the order their first member appears. Repeated ids collapse into one
/// member so a contact is never its own duplicate.
pub fn find_duplicate_groups(contacts: &[Contact]) -> Vec<DuplicateGroup> {
    let mut order: Vec<String> = Vec::new();
    let mut members: HashMap<String, Vec<&Contact>> = HashMap::new();

    for contact in contacts {
        let Some(key) = group_key(contact) else {
            continue;
        };
        let group = members.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            Vec::new()
        });
        if !group.iter().any(|c| c.id == contact.id) {
            group.push(contact);
        }
    }

    order
        .into_iter()
        .filter_map(|key| {
            let group = members.remove(&key)?;
            if group.len() < 2 {
                return None;
            }
            let mut iter = group.into_iter().cloned();
            let keep = iter.next()?;
            Some(DuplicateGroup {
                key,
                keep,
                remove: iter.collect(),
            })
        })
        .collect()
}

/// What a cleanup run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub contacts_scanned: usize,
    pub duplicate_groups: usize,
    pub attempted: usize,
    pub deleted: usize,
    pub skipped_missing: usize,
    pub failed: usize,
    pub deleted_ids: Vec<i64>,
    /// The address book could not be read; nothing was attempted.
    pub read_failed: bool,
}

impl CleanupReport {
    pub fn status(&self) -> CleanupStatus {
        if self.read_failed {
            CleanupStatus::Error
        } else if self.deleted > 0 {
            CleanupStatus::Success
        } else if self.contacts_scanned == 0 || self.duplicate_groups == 0 {
            CleanupStatus::NoDuplicates
        } else {
            CleanupStatus::Error
        }
    }
}

/// Delete the redundant members of each group through `provider`.
///
/// A contact that no longer exists is skipped. A provider error on one
/// contact is logged and the batch continues.
pub fn delete_duplicates(
    provider: &dyn ContactProvider,
    groups: &[DuplicateGroup],
    report: &mut CleanupReport,
) {
    for group in groups {
        for contact in &group.remove {
            report.attempted += 1;
            match provider.contact_exists(contact.id) {
                Ok(true) => {}
                Ok(false) => {
                    report.skipped_missing += 1;
                    continue;
                }
                Err(e) => {
                    log::error!("Error checking contact {}: {}", contact.id, e);
                    report.failed += 1;
                    continue;
                }
            }
            match provider.delete_contact(contact.id) {
                Ok(rows) if rows > 0 => {
                    report.deleted += 1;
                    report.deleted_ids.push(contact.id);
                }
                Ok(_) => {
                    log::warn!("Contact {} was not removed by the address book", contact.id);
                }
                Err(e) => {
                    log::error!("Error deleting contact {}: {}", contact.id, e);
                    report.failed += 1;
                }
            }
        }
    }
}

/// Read the address book and remove duplicate contacts.
pub fn remove_duplicates(provider: &dyn ContactProvider) -> CleanupReport {
    let contacts = match provider.read_contacts() {
        Ok(contacts) => contacts,
        Err(e) => {
            log::error!("Duplicate cleanup could not read contacts: {}", e);
            return CleanupReport {
                read_failed: true,
                ..Default::default()
            };
        }
    };

    let groups = find_duplicate_groups(&contacts);
    let mut report = CleanupReport {
        contacts_scanned: contacts.len(),
        duplicate_groups: groups.len(),
        ..Default::default()
    };
    delete_duplicates(provider, &groups, &mut report);

    log::info!(
        "Duplicate cleanup: scanned {}, {} groups, deleted {}, missing {}, failed {}",
        report.contacts_scanned,
        report.duplicate_groups,
        report.deleted,
        report.skipped_missing,
        report.failed
    );
    report
}

/// Groups that `remove_duplicates` would act on, without deleting anything.
pub fn preview_duplicates(
    provider: &dyn ContactProvider,
) -> Result<Vec<DuplicateGroup>, crate::provider::ProviderError> {
    Ok(find_duplicate_groups(&provider.read_contacts()?))
}
