use rusqlite::{params, OptionalExtension, Row};

use super::*;
use crate::util::now_timestamp;

const EXTENDED_CONTACT_COLUMNS: &str = "contact_id, name, phones, emails, photo_uri, birthday,
    social_networks, tags, biography, notes, last_call_date, last_message_date,
    last_meeting_date, reminder_to_call, reminder_to_congratulate, reminder_reason,
    is_locked, date_added, date_modified";

impl ContactDb {
    // =========================================================================
    // Extended contacts
    // =========================================================================

    fn map_extended_contact_row(row: &Row) -> rusqlite::Result<DbExtendedContact> {
        Ok(DbExtendedContact {
            contact_id: row.get(0)?,
            name: row.get(1)?,
            phones: row.get(2)?,
            emails: row.get(3)?,
            photo_uri: row.get(4)?,
            birthday: row.get(5)?,
            social_networks: row.get(6)?,
            tags: row.get(7)?,
            biography: row.get(8)?,
            notes: row.get(9)?,
            last_call_date: row.get(10)?,
            last_message_date: row.get(11)?,
            last_meeting_date: row.get(12)?,
            reminder_to_call: row.get(13)?,
            reminder_to_congratulate: row.get::<_, i32>(14)? != 0,
            reminder_reason: row.get(15)?,
            is_locked: row.get::<_, i32>(16)? != 0,
            date_added: row.get(17)?,
            date_modified: row.get(18)?,
        })
    }

    fn query_extended_contacts<P: rusqlite::Params>(
        &self,
        where_clause: &str,
        params: P,
    ) -> Result<Vec<DbExtendedContact>, DbError> {
        let sql = format!(
            "SELECT {EXTENDED_CONTACT_COLUMNS} FROM extended_contacts {where_clause}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params, Self::map_extended_contact_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// All extended contacts ordered by name.
    pub fn get_all_extended_contacts(&self) -> Result<Vec<DbExtendedContact>, DbError> {
        self.query_extended_contacts("ORDER BY name COLLATE NOCASE ASC", [])
    }

    /// Get an extended contact by address-book id.
    pub fn get_extended_contact(&self, contact_id: i64) -> Result<Option<DbExtendedContact>, DbError> {
        let sql = format!(
            "SELECT {EXTENDED_CONTACT_COLUMNS} FROM extended_contacts WHERE contact_id = ?1"
        );
        Ok(self
            .conn
            .query_row(&sql, params![contact_id], Self::map_extended_contact_row)
            .optional()?)
    }

    /// Contacts whose lock flag equals `is_locked`.
    pub fn get_locked_contacts(&self, is_locked: bool) -> Result<Vec<DbExtendedContact>, DbError> {
        self.query_extended_contacts(
            "WHERE is_locked = ?1 ORDER BY name COLLATE NOCASE ASC",
            params![is_locked as i32],
        )
    }

    /// Contacts carrying `tag`, resolved through `contact_tags`.
    pub fn get_contacts_by_tag(&self, tag: &str) -> Result<Vec<DbExtendedContact>, DbError> {
        self.query_extended_contacts(
            "WHERE contact_id IN (SELECT contact_id FROM contact_tags WHERE tag_name = ?1)
             ORDER BY name COLLATE NOCASE ASC",
            params![tag],
        )
    }

    /// Insert or replace a whole extended-contact row.
    pub fn upsert_extended_contact(&self, contact: &DbExtendedContact) -> Result<(), DbError> {
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO extended_contacts ({EXTENDED_CONTACT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
            ),
            params![
                contact.contact_id,
                contact.name,
                contact.phones,
                contact.emails,
                contact.photo_uri,
                contact.birthday,
                contact.social_networks,
                contact.tags,
                contact.biography,
                contact.notes,
                contact.last_call_date,
                contact.last_message_date,
                contact.last_meeting_date,
                contact.reminder_to_call,
                contact.reminder_to_congratulate as i32,
                contact.reminder_reason,
                contact.is_locked as i32,
                contact.date_added,
                contact.date_modified,
            ],
        )?;
        Ok(())
    }

    /// Insert or replace many rows in one transaction.
    pub fn upsert_extended_contacts(&self, contacts: &[DbExtendedContact]) -> Result<(), DbError> {
        self.with_transaction(|tx| {
            for contact in contacts {
                tx.upsert_extended_contact(contact)
                    .map_err(|e| format!("contact {}: {e}", contact.contact_id))?;
            }
            Ok(())
        })
        .map_err(DbError::Transaction)
    }

    /// Persist an edited row, stamping `date_modified`.
    pub fn update_extended_contact(&self, contact: &DbExtendedContact) -> Result<(), DbError> {
        let mut updated = contact.clone();
        updated.date_modified = now_timestamp();
        self.upsert_extended_contact(&updated)
    }

    /// Set the lock flag. Returns false when no row exists for `contact_id`.
    pub fn set_contact_locked(&self, contact_id: i64, is_locked: bool) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE extended_contacts SET is_locked = ?1, date_modified = ?2 WHERE contact_id = ?3",
            params![is_locked as i32, now_timestamp(), contact_id],
        )?;
        Ok(changed > 0)
    }

    /// Delete the overlay row for a contact. Tags and reminders are removed too.
    pub fn delete_extended_contact(&self, contact_id: i64) -> Result<(), DbError> {
        self.with_transaction(|tx| {
            tx.conn
                .execute(
                    "DELETE FROM contact_tags WHERE contact_id = ?1",
                    params![contact_id],
                )
                .map_err(|e| e.to_string())?;
            tx.conn
                .execute(
                    "DELETE FROM reminders WHERE contact_id = ?1",
                    params![contact_id],
                )
                .map_err(|e| e.to_string())?;
            tx.conn
                .execute(
                    "DELETE FROM extended_contacts WHERE contact_id = ?1",
                    params![contact_id],
                )
                .map_err(|e| e.to_string())?;
            Ok(())
        })
        .map_err(DbError::Transaction)
    }
}
