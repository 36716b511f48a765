//! Contact service: the operations the presentation layer calls.
//!
//! Blocking work (address-book reads, SQLite) runs on `spawn_blocking`;
//! screen changes go through the `StateStore` as `StateAction`s.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::cleanup::CleanupHandle;
use crate::db::{ContactDb, DbExtendedContact, DbReminder, NewReminder, ReminderType};
use crate::dedup::{CleanupReport, CleanupStatus};
use crate::error::ServiceError;
use crate::lock::LockSession;
use crate::provider::ContactProvider;
use crate::reconcile::{sync_extended_contacts, ReconcileSummary};
use crate::reminders;
use crate::state::{group_contacts, StateAction, StateStore};
use crate::types::{Config, Contact};
use crate::util::now_timestamp;

/// Fields a user may edit on a contact. `None` leaves the stored value.
#[derive(Debug, Clone, Default)]
pub struct ExtendedEdit {
    pub biography: Option<String>,
    pub notes: Option<String>,
    pub social_networks: Option<BTreeMap<String, String>>,
    pub birthday: Option<String>,
}

/// Everything the details screen shows for one contact.
///
/// For a locked contact that has not been unlocked this session only the
/// name is filled in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactDetails {
    pub contact_id: i64,
    pub name: String,
    pub is_locked: bool,
    pub hidden: bool,
    pub extended: Option<DbExtendedContact>,
    pub tags: Vec<String>,
    pub reminders: Vec<DbReminder>,
}

fn unlocked_for(session: &LockSession, contact_id: i64) -> bool {
    session.selected() == Some(contact_id) && session.details_visible()
}

pub struct ContactService {
    db: Arc<Mutex<ContactDb>>,
    provider: Arc<dyn ContactProvider>,
    state: StateStore,
    config: Config,
}

impl ContactService {
    pub fn new(db: ContactDb, provider: Arc<dyn ContactProvider>, config: Config) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            provider,
            state: StateStore::new(),
            config,
        }
    }

    /// Shared database handle, for the reminder scheduler.
    pub fn db(&self) -> Arc<Mutex<ContactDb>> {
        Arc::clone(&self.db)
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn with_db<F, T>(&self, f: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&ContactDb) -> Result<T, ServiceError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let db = db.lock();
            f(&db)
        })
        .await?
    }

    async fn require_contact(&self, contact_id: i64) -> Result<DbExtendedContact, ServiceError> {
        self.with_db(move |db| {
            db.get_extended_contact(contact_id)?
                .ok_or(ServiceError::ContactNotFound(contact_id))
        })
        .await
    }

    /// The stored row, provided the session may see and edit its details.
    /// A locked contact needs to be the session's selection and unlocked.
    async fn require_visible(
        &self,
        contact_id: i64,
        session: &LockSession,
    ) -> Result<DbExtendedContact, ServiceError> {
        let contact = self.require_contact(contact_id).await?;
        if contact.is_locked && !unlocked_for(session, contact_id) {
            return Err(ServiceError::Locked(contact_id));
        }
        Ok(contact)
    }

    // =========================================================================
    // Loading and listing
    // =========================================================================

    /// Read the address book, reconcile it with stored metadata and publish
    /// the contact list. On failure only the loading flag is cleared.
    pub async fn load_contacts(&self) -> Result<ReconcileSummary, ServiceError> {
        self.state.dispatch(StateAction::LoadStarted);

        let provider = Arc::clone(&self.provider);
        let db = Arc::clone(&self.db);
        let result = tokio::task::spawn_blocking(move || -> Result<_, ServiceError> {
            let contacts = provider.read_contacts()?;
            let summary = sync_extended_contacts(&db.lock(), &contacts)?;
            Ok((contacts, summary))
        })
        .await
        .map_err(ServiceError::from)
        .and_then(|r| r);

        match result {
            Ok((contacts, summary)) => {
                log::info!("Loaded {} contacts", contacts.len());
                self.state.dispatch(StateAction::ContactsLoaded(contacts));
                Ok(summary)
            }
            Err(e) => {
                log::warn!("Failed to load contacts: {}", e);
                self.state.dispatch(StateAction::LoadFailed);
                Err(e)
            }
        }
    }

    pub fn set_search_query(&self, query: impl Into<String>) {
        self.state.dispatch(StateAction::SetSearchQuery(query.into()));
    }

    pub fn toggle_tag_filter(&self, tag: impl Into<String>) {
        self.state.dispatch(StateAction::ToggleTag(tag.into()));
    }

    pub fn clear_tag_filters(&self) {
        self.state.dispatch(StateAction::ClearTags);
    }

    /// Loaded contacts matching the search query and every selected tag,
    /// grouped by initial. Locked contacts never match a tag filter.
    pub async fn grouped_contacts(&self) -> Result<BTreeMap<char, Vec<Contact>>, ServiceError> {
        let snapshot = self.state.snapshot();
        let tags: Vec<String> = snapshot.selected_tags.iter().cloned().collect();
        if tags.is_empty() {
            return Ok(group_contacts(&snapshot.contacts, &snapshot.search_query));
        }

        let allowed = self
            .with_db(move |db| {
                let mut allowed: Option<HashSet<i64>> = None;
                for tag in &tags {
                    let ids: HashSet<i64> = db
                        .get_contacts_by_tag(tag)?
                        .into_iter()
                        .map(|c| c.contact_id)
                        .collect();
                    allowed = Some(match allowed {
                        Some(prev) => prev.intersection(&ids).copied().collect(),
                        None => ids,
                    });
                }
                let mut allowed = allowed.unwrap_or_default();
                for contact in db.get_locked_contacts(true)? {
                    allowed.remove(&contact.contact_id);
                }
                Ok(allowed)
            })
            .await?;

        let tagged: Vec<Contact> = snapshot
            .contacts
            .into_iter()
            .filter(|c| allowed.contains(&c.id))
            .collect();
        Ok(group_contacts(&tagged, &snapshot.search_query))
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    pub fn select_contact(&self, contact_id: i64) {
        self.state.dispatch(StateAction::SelectContact(contact_id));
    }

    pub fn navigate_back(&self) {
        self.state.dispatch(StateAction::NavigateBack);
    }

    // =========================================================================
    // Extended metadata
    // =========================================================================

    /// Raw stored row with no lock check. Shown to the user only through
    /// `contact_details`.
    pub async fn get_extended_contact(
        &self,
        contact_id: i64,
    ) -> Result<Option<DbExtendedContact>, ServiceError> {
        self.with_db(move |db| Ok(db.get_extended_contact(contact_id)?))
            .await
    }

    /// Details for the selected contact, gated by the lock session.
    pub async fn contact_details(
        &self,
        contact_id: i64,
        session: &LockSession,
    ) -> Result<ContactDetails, ServiceError> {
        let extended = self.require_contact(contact_id).await?;

        if extended.is_locked && !unlocked_for(session, contact_id) {
            return Ok(ContactDetails {
                contact_id,
                name: extended.name,
                is_locked: true,
                hidden: true,
                extended: None,
                tags: Vec::new(),
                reminders: Vec::new(),
            });
        }

        let (tags, reminders) = self
            .with_db(move |db| {
                Ok((
                    db.get_tag_names_for_contact(contact_id)?,
                    db.get_reminders_for_contact(contact_id)?,
                ))
            })
            .await?;

        Ok(ContactDetails {
            contact_id,
            name: extended.name.clone(),
            is_locked: extended.is_locked,
            hidden: false,
            extended: Some(extended),
            tags,
            reminders,
        })
    }

    /// Overwrite only the provided fields and stamp `date_modified`.
    pub async fn update_extended_contact(
        &self,
        contact_id: i64,
        edit: ExtendedEdit,
        session: &LockSession,
    ) -> Result<DbExtendedContact, ServiceError> {
        self.require_visible(contact_id, session).await?;
        self.with_db(move |db| {
            let mut contact = db
                .get_extended_contact(contact_id)?
                .ok_or(ServiceError::ContactNotFound(contact_id))?;

            if let Some(biography) = edit.biography {
                contact.biography = Some(biography);
            }
            if let Some(notes) = edit.notes {
                contact.notes = Some(notes);
            }
            if let Some(social) = edit.social_networks {
                let json = serde_json::to_string(&social)
                    .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;
                contact.social_networks = Some(json);
            }
            if let Some(birthday) = edit.birthday {
                if reminders::parse_month_day(&birthday).is_none() {
                    return Err(ServiceError::InvalidInput(format!(
                        "birthday '{birthday}' is not YYYY-MM-DD or MM-DD"
                    )));
                }
                contact.birthday = Some(birthday);
            }

            db.update_extended_contact(&contact)?;
            Ok(db
                .get_extended_contact(contact_id)?
                .ok_or(ServiceError::ContactNotFound(contact_id))?)
        })
        .await
    }

    /// Set the lock flag on a contact. Locking is always allowed; clearing
    /// the flag needs an unlocked session.
    pub async fn toggle_lock(
        &self,
        contact_id: i64,
        is_locked: bool,
        session: &LockSession,
    ) -> Result<(), ServiceError> {
        if !is_locked {
            self.require_visible(contact_id, session).await?;
        }
        let changed = self
            .with_db(move |db| Ok(db.set_contact_locked(contact_id, is_locked)?))
            .await?;
        if !changed {
            return Err(ServiceError::ContactNotFound(contact_id));
        }
        log::info!(
            "Contact {} {}",
            contact_id,
            if is_locked { "locked" } else { "unlocked" }
        );
        Ok(())
    }

    /// Delete the stored metadata (tags and reminders included) and return to the list.
    pub async fn delete_contact(&self, contact_id: i64, session: &LockSession) -> Result<(), ServiceError> {
        self.require_visible(contact_id, session).await?;
        self.with_db(move |db| Ok(db.delete_extended_contact(contact_id)?))
            .await?;
        self.navigate_back();
        Ok(())
    }

    // =========================================================================
    // Tags
    // =========================================================================

    pub async fn add_tag(
        &self,
        contact_id: i64,
        tag_name: &str,
        session: &LockSession,
    ) -> Result<(), ServiceError> {
        let tag = tag_name.trim().to_string();
        if tag.is_empty() {
            return Err(ServiceError::InvalidInput("tag name is empty".to_string()));
        }
        self.require_visible(contact_id, session).await?;
        self.with_db(move |db| Ok(db.add_tag(contact_id, &tag)?))
            .await
    }

    pub async fn remove_tag(
        &self,
        contact_id: i64,
        tag_name: &str,
        session: &LockSession,
    ) -> Result<(), ServiceError> {
        let tag = tag_name.trim().to_string();
        self.require_visible(contact_id, session).await?;
        self.with_db(move |db| Ok(db.remove_tag(contact_id, &tag)?))
            .await
    }

    pub async fn get_tags_for_contact(
        &self,
        contact_id: i64,
        session: &LockSession,
    ) -> Result<Vec<String>, ServiceError> {
        self.require_visible(contact_id, session).await?;
        self.with_db(move |db| Ok(db.get_tag_names_for_contact(contact_id)?))
            .await
    }

    pub async fn get_all_tags(&self) -> Result<Vec<String>, ServiceError> {
        self.with_db(|db| Ok(db.get_all_tags()?)).await
    }

    // =========================================================================
    // Reminders
    // =========================================================================

    async fn insert_reminder(&self, reminder: NewReminder) -> Result<i64, ServiceError> {
        self.with_db(move |db| Ok(db.insert_reminder(&reminder)?))
            .await
    }

    /// Reminder `days_from_now` days from this instant.
    pub async fn create_reminder(
        &self,
        contact_id: i64,
        reminder_type: ReminderType,
        title: &str,
        description: Option<&str>,
        days_from_now: u32,
        session: &LockSession,
    ) -> Result<i64, ServiceError> {
        self.require_visible(contact_id, session).await?;
        let scheduled_at = Utc::now()
            .checked_add_signed(Duration::days(i64::from(days_from_now)))
            .ok_or_else(|| too_far(days_from_now))?;
        self.insert_reminder(NewReminder {
            reminder_type,
            ..reminders::custom(contact_id, title, description, scheduled_at)
        })
        .await
    }

    /// Call-back reminder at the configured hour, `days` from today.
    pub async fn schedule_call_back(
        &self,
        contact_id: i64,
        days: u32,
        session: &LockSession,
    ) -> Result<i64, ServiceError> {
        self.require_visible(contact_id, session).await?;
        let reminder = reminders::call_back(&self.config, contact_id, days, Utc::now())
            .ok_or_else(|| too_far(days))?;
        self.insert_reminder(reminder).await
    }

    /// Birthday reminder from the stored birthday.
    pub async fn schedule_birthday(
        &self,
        contact_id: i64,
        session: &LockSession,
    ) -> Result<i64, ServiceError> {
        let contact = self.require_visible(contact_id, session).await?;
        let birthday = contact.birthday.as_deref().ok_or_else(|| {
            ServiceError::InvalidInput(format!("contact {contact_id} has no birthday"))
        })?;
        let reminder = reminders::birthday(&self.config, contact_id, birthday, Utc::now())
            .ok_or_else(|| {
                ServiceError::InvalidInput(format!("birthday '{birthday}' is not a valid date"))
            })?;
        self.insert_reminder(reminder).await
    }

    /// Yearly anniversary reminder for `date` (`YYYY-MM-DD` or `MM-DD`).
    pub async fn schedule_anniversary(
        &self,
        contact_id: i64,
        date: &str,
        session: &LockSession,
    ) -> Result<i64, ServiceError> {
        self.require_visible(contact_id, session).await?;
        let reminder = reminders::anniversary(&self.config, contact_id, date, Utc::now())
            .ok_or_else(|| ServiceError::InvalidInput(format!("'{date}' is not YYYY-MM-DD or MM-DD")))?;
        self.insert_reminder(reminder).await
    }

    pub async fn get_reminders_for_contact(
        &self,
        contact_id: i64,
        session: &LockSession,
    ) -> Result<Vec<DbReminder>, ServiceError> {
        self.require_visible(contact_id, session).await?;
        self.with_db(move |db| Ok(db.get_reminders_for_contact(contact_id)?))
            .await
    }

    /// Uncompleted reminders already due. Locked contacts' reminders are left out.
    pub async fn get_due_reminders(&self) -> Result<Vec<DbReminder>, ServiceError> {
        self.with_db(|db| {
            let locked: HashSet<i64> = db
                .get_locked_contacts(true)?
                .into_iter()
                .map(|c| c.contact_id)
                .collect();
            let mut due = db.get_due_reminders(&now_timestamp())?;
            due.retain(|r| !locked.contains(&r.contact_id));
            Ok(due)
        })
        .await
    }

    /// Contact a reminder belongs to, without revealing the reminder itself.
    pub async fn reminder_owner(&self, reminder_id: i64) -> Result<i64, ServiceError> {
        self.with_db(move |db| {
            db.get_reminder(reminder_id)?
                .map(|r| r.contact_id)
                .ok_or(ServiceError::ReminderNotFound(reminder_id))
        })
        .await
    }

    /// A reminder's contact must be visible to the session. Reminders of
    /// contacts with no stored row are not gated.
    async fn require_reminder_visible(
        &self,
        reminder_id: i64,
        session: &LockSession,
    ) -> Result<(), ServiceError> {
        let contact_id = self.reminder_owner(reminder_id).await?;
        match self.require_visible(contact_id, session).await {
            Err(ServiceError::ContactNotFound(_)) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    pub async fn complete_reminder(
        &self,
        reminder_id: i64,
        session: &LockSession,
    ) -> Result<(), ServiceError> {
        self.require_reminder_visible(reminder_id, session).await?;
        let found = self
            .with_db(move |db| Ok(db.update_reminder_status(reminder_id, true)?))
            .await?;
        if found {
            Ok(())
        } else {
            Err(ServiceError::ReminderNotFound(reminder_id))
        }
    }

    pub async fn delete_reminder(
        &self,
        reminder_id: i64,
        session: &LockSession,
    ) -> Result<(), ServiceError> {
        self.require_reminder_visible(reminder_id, session).await?;
        let found = self
            .with_db(move |db| Ok(db.delete_reminder(reminder_id)?))
            .await?;
        if found {
            Ok(())
        } else {
            Err(ServiceError::ReminderNotFound(reminder_id))
        }
    }

    // =========================================================================
    // Duplicate cleanup
    // =========================================================================

    /// Ask the cleanup service to run, publish the outcome and reload the
    /// list when something was deleted.
    pub async fn cleanup_duplicates(&self, handle: &CleanupHandle) -> CleanupReport {
        let report = handle.cleanup_report().await.unwrap_or(CleanupReport {
            read_failed: true,
            ..Default::default()
        });
        let status = report.status();
        self.state.dispatch(StateAction::CleanupFinished(status));

        if status == CleanupStatus::Success {
            if let Err(e) = self.load_contacts().await {
                log::warn!("Reload after cleanup failed: {}", e);
            }
        }
        report
    }
}

fn too_far(days: u32) -> ServiceError {
    ServiceError::InvalidInput(format!("{days} days from now is past the last supported date"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometric::{AuthOutcome, AuthRequest, Authenticator};
    use crate::cleanup::CleanupService;
    use crate::db::test_utils::test_db;
    use crate::provider::MemoryAddressBook;
    use crate::state::Navigation;
    use async_trait::async_trait;

    fn address_book() -> Arc<MemoryAddressBook> {
        Arc::new(MemoryAddressBook::new(vec![
            Contact::new(1, "Ann", &["555-1234"]),
            Contact::new(2, "Bob", &["222"]),
            Contact::new(3, "alex", &["333"]),
        ]))
    }

    async fn loaded_service(book: Arc<MemoryAddressBook>) -> ContactService {
        let service = ContactService::new(test_db(), book, Config::new("/tmp/book.json"));
        service.load_contacts().await.unwrap();
        service
    }

    /// Session that never passed a challenge. Enough for unlocked contacts.
    fn plain() -> LockSession {
        LockSession::new()
    }

    async fn unlocked(contact_id: i64) -> LockSession {
        let mut session = LockSession::new();
        session.select(contact_id, true);
        session.unlock(&AlwaysYes, None).await.unwrap();
        session
    }

    fn notes(text: &str) -> ExtendedEdit {
        ExtendedEdit {
            notes: Some(text.to_string()),
            ..Default::default()
        }
    }

    fn locked<T>(result: Result<T, ServiceError>) -> bool {
        matches!(result, Err(ServiceError::Locked(1)))
    }

    struct AlwaysYes;

    #[async_trait]
    impl Authenticator for AlwaysYes {
        fn is_available(&self) -> bool {
            true
        }
        async fn authenticate(&self, _request: &AuthRequest) -> AuthOutcome {
            AuthOutcome::Succeeded
        }
    }

    #[tokio::test]
    async fn test_load_publishes_contacts_and_creates_rows() {
        let service = loaded_service(address_book()).await;
        let state = service.state().snapshot();
        assert!(!state.is_loading);
        assert_eq!(state.contacts.len(), 3);
        assert!(service.get_extended_contact(2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_load_failure_keeps_previous_list() {
        let book = address_book();
        let service = loaded_service(book.clone()).await;
        book.set_unreadable(true);

        assert!(service.load_contacts().await.is_err());
        let state = service.state().snapshot();
        assert!(!state.is_loading);
        assert_eq!(state.contacts.len(), 3);
    }

    #[tokio::test]
    async fn test_user_edits_survive_reload() {
        let service = loaded_service(address_book()).await;
        service
            .update_extended_contact(1, notes("Met at the conference"), &plain())
            .await
            .unwrap();
        service.add_tag(1, "work", &plain()).await.unwrap();
        service.toggle_lock(1, true, &plain()).await.unwrap();

        service.load_contacts().await.unwrap();
        let ann = service.get_extended_contact(1).await.unwrap().unwrap();
        assert_eq!(ann.notes.as_deref(), Some("Met at the conference"));
        assert!(ann.is_locked);
        assert_eq!(
            service.get_tags_for_contact(1, &unlocked(1).await).await.unwrap(),
            vec!["work"]
        );
    }

    #[tokio::test]
    async fn test_update_only_touches_provided_fields() {
        let service = loaded_service(address_book()).await;
        service
            .update_extended_contact(
                2,
                ExtendedEdit {
                    biography: Some("Chef".to_string()),
                    notes: Some("Call on Fridays".to_string()),
                    ..Default::default()
                },
                &plain(),
            )
            .await
            .unwrap();
        let social = BTreeMap::from([("telegram".to_string(), "https://t.me/bob".to_string())]);
        let updated = service
            .update_extended_contact(
                2,
                ExtendedEdit {
                    social_networks: Some(social.clone()),
                    ..Default::default()
                },
                &plain(),
            )
            .await
            .unwrap();

        assert_eq!(updated.biography.as_deref(), Some("Chef"));
        assert_eq!(updated.notes.as_deref(), Some("Call on Fridays"));
        assert_eq!(updated.social_network_map(), social);
    }

    #[tokio::test]
    async fn test_update_rejects_bad_birthday_and_unknown_contact() {
        let service = loaded_service(address_book()).await;
        let bad = ExtendedEdit {
            birthday: Some("someday".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service.update_extended_contact(1, bad, &plain()).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            service.update_extended_contact(99, ExtendedEdit::default(), &plain()).await,
            Err(ServiceError::ContactNotFound(99))
        ));
    }

    #[tokio::test]
    async fn test_tag_filter_requires_every_selected_tag() {
        let service = loaded_service(address_book()).await;
        service.add_tag(1, "work", &plain()).await.unwrap();
        service.add_tag(1, "vip", &plain()).await.unwrap();
        service.add_tag(2, "work", &plain()).await.unwrap();

        service.toggle_tag_filter("work");
        let groups = service.grouped_contacts().await.unwrap();
        let ids: Vec<i64> = groups.values().flatten().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2]);

        service.toggle_tag_filter("vip");
        let groups = service.grouped_contacts().await.unwrap();
        let ids: Vec<i64> = groups.values().flatten().map(|c| c.id).collect();
        assert_eq!(ids, vec![1]);

        service.clear_tag_filters();
        assert_eq!(service.grouped_contacts().await.unwrap().values().flatten().count(), 3);
        assert_eq!(service.get_all_tags().await.unwrap(), vec!["vip", "work"]);
    }

    #[tokio::test]
    async fn test_search_query_filters_groups() {
        let service = loaded_service(address_book()).await;
        service.set_search_query("a");
        let groups = service.grouped_contacts().await.unwrap();
        let names: Vec<&str> = groups.values().flatten().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alex", "Ann"]);
    }

    #[tokio::test]
    async fn test_reminder_lifecycle() {
        let service = loaded_service(address_book()).await;
        let session = plain();
        let id = service
            .create_reminder(1, ReminderType::Custom, "Send photos", None, 3, &session)
            .await
            .unwrap();
        let call_id = service.schedule_call_back(1, 1, &session).await.unwrap();
        let anniversary_id = service
            .schedule_anniversary(1, "2010-06-20", &session)
            .await
            .unwrap();

        let reminders = service.get_reminders_for_contact(1, &session).await.unwrap();
        assert_eq!(reminders.len(), 3);
        assert!(reminders.iter().any(|r| r.id == call_id && r.title == "Call back"));
        assert!(reminders
            .iter()
            .any(|r| r.id == anniversary_id && r.reminder_type == ReminderType::Anniversary));
        assert_eq!(service.reminder_owner(call_id).await.unwrap(), 1);

        service.complete_reminder(id, &session).await.unwrap();
        service.delete_reminder(call_id, &session).await.unwrap();
        service.delete_reminder(anniversary_id, &session).await.unwrap();
        assert!(matches!(
            service.delete_reminder(call_id, &session).await,
            Err(ServiceError::ReminderNotFound(_))
        ));
        let remaining = service.get_reminders_for_contact(1, &session).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].is_completed);
    }

    #[tokio::test]
    async fn test_reminders_beyond_calendar_are_invalid_input() {
        let service = loaded_service(address_book()).await;
        assert!(matches!(
            service
                .create_reminder(1, ReminderType::Custom, "x", None, 4_000_000_000, &plain())
                .await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            service.schedule_call_back(1, 4_000_000_000, &plain()).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            service.schedule_anniversary(1, "sometime", &plain()).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(service.get_reminders_for_contact(1, &plain()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_birthday_reminder_needs_birthday() {
        let service = loaded_service(address_book()).await;
        assert!(matches!(
            service.schedule_birthday(2, &plain()).await,
            Err(ServiceError::InvalidInput(_))
        ));
        service
            .update_extended_contact(
                2,
                ExtendedEdit {
                    birthday: Some("1985-07-04".to_string()),
                    ..Default::default()
                },
                &plain(),
            )
            .await
            .unwrap();
        let id = service.schedule_birthday(2, &plain()).await.unwrap();
        let reminders = service.get_reminders_for_contact(2, &plain()).await.unwrap();
        assert_eq!(reminders[0].id, id);
        assert_eq!(reminders[0].reminder_type, ReminderType::Birthday);
    }

    #[tokio::test]
    async fn test_delete_contact_removes_metadata_and_navigates_back() {
        let service = loaded_service(address_book()).await;
        service.add_tag(1, "work", &plain()).await.unwrap();
        service
            .create_reminder(1, ReminderType::Custom, "Ping", None, 1, &plain())
            .await
            .unwrap();
        service.select_contact(1);
        assert_eq!(service.state().snapshot().navigation, Navigation::ContactDetails);

        service.delete_contact(1, &plain()).await.unwrap();
        let state = service.state().snapshot();
        assert_eq!(state.navigation, Navigation::ContactsList);
        assert!(state.selected_contact_id.is_none());
        assert!(service.get_extended_contact(1).await.unwrap().is_none());
        let db = service.db();
        let db = db.lock();
        assert!(db.get_tag_names_for_contact(1).unwrap().is_empty());
        assert!(db.get_reminders_for_contact(1).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_locked_details_hidden_until_unlock() {
        let service = loaded_service(address_book()).await;
        service.add_tag(1, "secret", &plain()).await.unwrap();
        service.toggle_lock(1, true, &plain()).await.unwrap();

        let mut session = LockSession::new();
        session.select(1, true);
        let hidden = service.contact_details(1, &session).await.unwrap();
        assert!(hidden.hidden);
        assert_eq!(hidden.name, "Ann");
        assert!(hidden.tags.is_empty());
        assert!(hidden.extended.is_none());

        session.unlock(&AlwaysYes, Some("Ann")).await.unwrap();
        let shown = service.contact_details(1, &session).await.unwrap();
        assert!(!shown.hidden);
        assert_eq!(shown.tags, vec!["secret"]);

        // An unlock for another contact does not carry over.
        session.select(2, false);
        assert!(service.contact_details(1, &session).await.unwrap().hidden);
    }

    #[tokio::test]
    async fn test_locked_contact_refuses_reads_and_writes_without_unlock() {
        let service = loaded_service(address_book()).await;
        service.add_tag(1, "affair", &plain()).await.unwrap();
        let reminder_id = service
            .create_reminder(1, ReminderType::Custom, "Meet Sam", None, 0, &plain())
            .await
            .unwrap();
        service.update_extended_contact(1, notes("private"), &plain()).await.unwrap();
        service.toggle_lock(1, true, &plain()).await.unwrap();

        // Selected but the challenge was never passed.
        let mut session = LockSession::new();
        session.select(1, true);

        assert!(locked(service.get_tags_for_contact(1, &session).await));
        assert!(locked(service.get_reminders_for_contact(1, &session).await));
        assert!(locked(
            service.update_extended_contact(1, notes("overwritten"), &session).await
        ));
        assert!(locked(service.add_tag(1, "other", &session).await));
        assert!(locked(service.remove_tag(1, "affair", &session).await));
        assert!(locked(service.schedule_call_back(1, 1, &session).await));
        assert!(locked(service.delete_contact(1, &session).await));
        assert!(locked(service.toggle_lock(1, false, &session).await));

        assert!(locked(service.complete_reminder(reminder_id, &session).await));
        assert!(locked(service.delete_reminder(reminder_id, &session).await));

        // Due reminders and tag matches of locked contacts are not listed.
        assert!(service.get_due_reminders().await.unwrap().is_empty());
        service.toggle_tag_filter("affair");
        assert!(service.grouped_contacts().await.unwrap().is_empty());

        // Nothing changed, and an unlocked session sees everything.
        let open = unlocked(1).await;
        let ann = service.get_extended_contact(1).await.unwrap().unwrap();
        assert_eq!(ann.notes.as_deref(), Some("private"));
        assert_eq!(service.get_tags_for_contact(1, &open).await.unwrap(), vec!["affair"]);
        assert_eq!(service.get_reminders_for_contact(1, &open).await.unwrap().len(), 1);
        service.toggle_lock(1, false, &open).await.unwrap();
        assert_eq!(service.get_due_reminders().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_toggle_lock_unknown_contact() {
        let service = loaded_service(address_book()).await;
        assert!(matches!(
            service.toggle_lock(42, true, &plain()).await,
            Err(ServiceError::ContactNotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_cleanup_publishes_status_and_reloads() {
        let book = Arc::new(MemoryAddressBook::new(vec![
            Contact::new(1, "Ann", &["5551234"]),
            Contact::new(2, "ann", &["555-1234"]),
        ]));
        let service = loaded_service(book.clone()).await;
        let handle = CleanupService::spawn(book);

        let report = service.cleanup_duplicates(&handle).await;
        assert_eq!(report.status(), CleanupStatus::Success);
        let state = service.state().snapshot();
        assert_eq!(state.cleanup_status, Some(CleanupStatus::Success));
        assert_eq!(state.contacts.len(), 1);

        let again = service.cleanup_duplicates(&handle).await;
        assert_eq!(again.status(), CleanupStatus::NoDuplicates);
    }
}
