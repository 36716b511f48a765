use rusqlite::{params, OptionalExtension, Row};

use super::*;
use crate::util::now_timestamp;

const REMINDER_COLUMNS: &str = "id, contact_id, reminder_type, title, description,
    scheduled_at, is_completed, date_created, notified_at";

impl ContactDb {
    // =========================================================================
    // Reminders
    // =========================================================================

    fn map_reminder_row(row: &Row) -> rusqlite::Result<DbReminder> {
        let type_str: String = row.get(2)?;
        let reminder_type = type_str.parse::<ReminderType>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?;
        Ok(DbReminder {
            id: row.get(0)?,
            contact_id: row.get(1)?,
            reminder_type,
            title: row.get(3)?,
            description: row.get(4)?,
            scheduled_at: row.get(5)?,
            is_completed: row.get::<_, i32>(6)? != 0,
            date_created: row.get(7)?,
            notified_at: row.get(8)?,
        })
    }

    fn query_reminders<P: rusqlite::Params>(
        &self,
        where_clause: &str,
        params: P,
    ) -> Result<Vec<DbReminder>, DbError> {
        let sql = format!("SELECT {REMINDER_COLUMNS} FROM reminders {where_clause}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params, Self::map_reminder_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_reminders_for_contact(&self, contact_id: i64) -> Result<Vec<DbReminder>, DbError> {
        self.query_reminders(
            "WHERE contact_id = ?1 ORDER BY scheduled_at ASC",
            params![contact_id],
        )
    }

    pub fn get_reminder(&self, reminder_id: i64) -> Result<Option<DbReminder>, DbError> {
        let sql = format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![reminder_id], Self::map_reminder_row)
            .optional()?)
    }

    /// Uncompleted reminders scheduled at or before `now`.
    pub fn get_due_reminders(&self, now: &str) -> Result<Vec<DbReminder>, DbError> {
        self.query_reminders(
            "WHERE scheduled_at <= ?1 AND is_completed = 0 ORDER BY scheduled_at ASC",
            params![now],
        )
    }

    /// Due reminders that have not been delivered yet.
    pub fn get_undelivered_due_reminders(&self, now: &str) -> Result<Vec<DbReminder>, DbError> {
        self.query_reminders(
            "WHERE scheduled_at <= ?1 AND is_completed = 0 AND notified_at IS NULL
             ORDER BY scheduled_at ASC",
            params![now],
        )
    }

    /// Insert a reminder and return its id.
    pub fn insert_reminder(&self, reminder: &NewReminder) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO reminders (contact_id, reminder_type, title, description, scheduled_at,
                                    is_completed, date_created)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            params![
                reminder.contact_id,
                reminder.reminder_type.as_str(),
                reminder.title,
                reminder.description,
                reminder.scheduled_at,
                now_timestamp(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_reminder_status(&self, reminder_id: i64, is_completed: bool) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE reminders SET is_completed = ?1 WHERE id = ?2",
            params![is_completed as i32, reminder_id],
        )?;
        Ok(changed > 0)
    }

    pub fn mark_reminder_notified(&self, reminder_id: i64, at: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE reminders SET notified_at = ?1 WHERE id = ?2",
            params![at, reminder_id],
        )?;
        Ok(())
    }

    /// Delete a reminder. Returns false when it did not exist.
    pub fn delete_reminder(&self, reminder_id: i64) -> Result<bool, DbError> {
        let changed = self
            .conn
            .execute("DELETE FROM reminders WHERE id = ?1", params![reminder_id])?;
        Ok(changed > 0)
    }
}
