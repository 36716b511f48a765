//! Merge freshly read address-book contacts into the extended-contact store.
//!
//! Only name, phones and photo mirror the address book. Every field the user
//! authored (notes, biography, tags, social links, reminder fields, lock flag,
//! original creation date) survives a refresh untouched.

use std::collections::HashMap;

use crate::db::{ContactDb, DbError, DbExtendedContact};
use crate::types::Contact;
use crate::util::now_timestamp;

/// Base overlay row for a contact that has never been seen before.
pub fn base_record(contact: &Contact, now: &str) -> DbExtendedContact {
    DbExtendedContact {
        contact_id: contact.id,
        name: contact.name.clone(),
        phones: serde_json::to_string(&contact.phones).unwrap_or_else(|_| "[]".to_string()),
        emails: "[]".to_string(),
        photo_uri: contact.photo_uri.clone(),
        birthday: None,
        social_networks: None,
        tags: None,
        biography: None,
        notes: None,
        last_call_date: None,
        last_message_date: None,
        last_meeting_date: None,
        reminder_to_call: None,
        reminder_to_congratulate: false,
        reminder_reason: None,
        is_locked: false,
        date_added: now.to_string(),
        date_modified: now.to_string(),
    }
}

/// Carry every user-authored field of `existing` onto `base`.
pub fn merge_user_fields(base: DbExtendedContact, existing: &DbExtendedContact) -> DbExtendedContact {
    DbExtendedContact {
        emails: existing.emails.clone(),
        birthday: existing.birthday.clone(),
        social_networks: existing.social_networks.clone(),
        tags: existing.tags.clone(),
        biography: existing.biography.clone(),
        notes: existing.notes.clone(),
        last_call_date: existing.last_call_date.clone(),
        last_message_date: existing.last_message_date.clone(),
        last_meeting_date: existing.last_meeting_date.clone(),
        reminder_to_call: existing.reminder_to_call.clone(),
        reminder_to_congratulate: existing.reminder_to_congratulate,
        reminder_reason: existing.reminder_reason.clone(),
        is_locked: existing.is_locked,
        date_added: existing.date_added.clone(),
        ..base
    }
}

/// Pure reconciliation: one overlay row per fresh contact.
pub fn reconcile(
    fresh: &[Contact],
    existing: &HashMap<i64, DbExtendedContact>,
    now: &str,
) -> Vec<DbExtendedContact> {
    fresh
        .iter()
        .map(|contact| {
            let base = base_record(contact, now);
            match existing.get(&contact.id) {
                Some(row) => merge_user_fields(base, row),
                None => base,
            }
        })
        .collect()
}

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub created: usize,
    pub refreshed: usize,
    /// Stored rows whose contact is gone from the address book. Left in place.
    pub orphaned: usize,
}

/// Reconcile `fresh` against the store and persist the result in one transaction.
pub fn sync_extended_contacts(
    db: &ContactDb,
    fresh: &[Contact],
) -> Result<ReconcileSummary, DbError> {
    let existing: HashMap<i64, DbExtendedContact> = db
        .get_all_extended_contacts()?
        .into_iter()
        .map(|row| (row.contact_id, row))
        .collect();

    let rows = reconcile(fresh, &existing, &now_timestamp());
    let refreshed = fresh.iter().filter(|c| existing.contains_key(&c.id)).count();
    let summary = ReconcileSummary {
        created: rows.len() - refreshed,
        refreshed,
        orphaned: existing
            .keys()
            .filter(|id| !fresh.iter().any(|c| c.id == **id))
            .count(),
    };

    db.upsert_extended_contacts(&rows)?;
    log::info!(
        "Reconciled contacts: {} new, {} refreshed, {} orphaned",
        summary.created,
        summary.refreshed,
        summary.orphaned
    );
    Ok(summary)
}
