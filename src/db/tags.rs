use rusqlite::params;

use super::*;

impl ContactDb {
    // =========================================================================
    // Tags
    // =========================================================================

    pub fn get_tags_for_contact(&self, contact_id: i64) -> Result<Vec<DbContactTag>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, contact_id, tag_name FROM contact_tags
             WHERE contact_id = ?1 ORDER BY tag_name",
        )?;
        let rows = stmt.query_map(params![contact_id], |row| {
            Ok(DbContactTag {
                id: row.get(0)?,
                contact_id: row.get(1)?,
                tag_name: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Tag names for a contact, sorted.
    pub fn get_tag_names_for_contact(&self, contact_id: i64) -> Result<Vec<String>, DbError> {
        Ok(self
            .get_tags_for_contact(contact_id)?
            .into_iter()
            .map(|t| t.tag_name)
            .collect())
    }

    /// Every distinct tag name in use.
    pub fn get_all_tags(&self) -> Result<Vec<String>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT tag_name FROM contact_tags ORDER BY tag_name")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Attach a tag. Re-adding an existing pair replaces it.
    /// The denormalized `extended_contacts.tags` column is refreshed.
    pub fn add_tag(&self, contact_id: i64, tag_name: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO contact_tags (contact_id, tag_name) VALUES (?1, ?2)",
            params![contact_id, tag_name],
        )?;
        self.refresh_denormalized_tags(contact_id)
    }

    pub fn remove_tag(&self, contact_id: i64, tag_name: &str) -> Result<(), DbError> {
        self.conn.execute(
            "DELETE FROM contact_tags WHERE contact_id = ?1 AND tag_name = ?2",
            params![contact_id, tag_name],
        )?;
        self.refresh_denormalized_tags(contact_id)
    }

    /// Mirror `contact_tags` into the JSON `tags` column of the overlay row.
    fn refresh_denormalized_tags(&self, contact_id: i64) -> Result<(), DbError> {
        let names = self.get_tag_names_for_contact(contact_id)?;
        let json = if names.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&names).map_err(|source| DbError::Json {
                column: "tags",
                source,
            })?)
        };
        self.conn.execute(
            "UPDATE extended_contacts SET tags = ?1 WHERE contact_id = ?2",
            params![json, contact_id],
        )?;
        Ok(())
    }
}
