use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tokio::sync::watch;

use crate::dedup::CleanupStatus;
use crate::types::{Config, Contact};

/// Which screen the presentation layer shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Navigation {
    #[default]
    ContactsList,
    ContactDetails,
}

/// Immutable snapshot of everything the contacts screen renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenState {
    pub is_loading: bool,
    pub contacts: Vec<Contact>,
    pub search_query: String,
    pub selected_tags: BTreeSet<String>,
    pub navigation: Navigation,
    pub selected_contact_id: Option<i64>,
    /// Outcome of the last duplicate cleanup, if one ran.
    pub cleanup_status: Option<CleanupStatus>,
}

/// The only way to change a `ScreenState`.
#[derive(Debug, Clone, PartialEq)]
pub enum StateAction {
    LoadStarted,
    ContactsLoaded(Vec<Contact>),
    /// Clears the loading flag and nothing else.
    LoadFailed,
    SetSearchQuery(String),
    ToggleTag(String),
    ClearTags,
    SelectContact(i64),
    NavigateBack,
    CleanupFinished(CleanupStatus),
}

impl ScreenState {
    pub fn apply(&mut self, action: StateAction) {
        match action {
            StateAction::LoadStarted => self.is_loading = true,
            StateAction::ContactsLoaded(contacts) => {
                self.contacts = contacts;
                self.is_loading = false;
            }
            StateAction::LoadFailed => self.is_loading = false,
            StateAction::SetSearchQuery(query) => self.search_query = query,
            StateAction::ToggleTag(tag) => {
                if !self.selected_tags.remove(&tag) {
                    self.selected_tags.insert(tag);
                }
            }
            StateAction::ClearTags => self.selected_tags.clear(),
            StateAction::SelectContact(id) => {
                self.selected_contact_id = Some(id);
                self.navigation = Navigation::ContactDetails;
            }
            StateAction::NavigateBack => {
                self.selected_contact_id = None;
                self.navigation = Navigation::ContactsList;
            }
            StateAction::CleanupFinished(status) => self.cleanup_status = Some(status),
        }
    }

    pub fn selected_contact(&self) -> Option<&Contact> {
        let id = self.selected_contact_id?;
        self.contacts.iter().find(|c| c.id == id)
    }
}

/// Filter by `query` (case-insensitive, name or any phone), sort by name and
/// group under the uppercase first letter. Nameless contacts go under `#`.
pub fn group_contacts(contacts: &[Contact], query: &str) -> BTreeMap<char, Vec<Contact>> {
    let needle = query.trim().to_lowercase();
    let mut filtered: Vec<&Contact> = contacts
        .iter()
        .filter(|c| {
            needle.is_empty()
                || c.name.to_lowercase().contains(&needle)
                || c.phones.iter().any(|p| p.contains(&needle))
        })
        .collect();
    filtered.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut groups: BTreeMap<char, Vec<Contact>> = BTreeMap::new();
    for contact in filtered {
        let initial = contact
            .name
            .trim()
            .chars()
            .next()
            .and_then(|c| c.to_uppercase().next())
            .unwrap_or('#');
        groups.entry(initial).or_default().push(contact.clone());
    }
    groups
}

/// Publishes `ScreenState` snapshots. Cloning shares the same channel.
#[derive(Clone)]
pub struct StateStore {
    tx: watch::Sender<ScreenState>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ScreenState::default());
        Self { tx }
    }

    pub fn dispatch(&self, action: StateAction) {
        self.tx.send_modify(|state| state.apply(action));
    }

    pub fn snapshot(&self) -> ScreenState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScreenState> {
        self.tx.subscribe()
    }
}

// =============================================================================
// Config
// =============================================================================

/// `~/.contactbook`
pub fn contactbook_dir() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".contactbook"))
}

/// Load configuration from `~/.contactbook/config.json`
pub fn load_config() -> Result<Config, String> {
    load_config_from(&contactbook_dir()?.join("config.json"))
}

pub fn load_config_from(config_path: &Path) -> Result<Config, String> {
    if !config_path.exists() {
        return Err(format!(
            "Config file not found at {}. Create it with: {{ \"addressBookPath\": \"/path/to/contacts.json\" }}",
            config_path.display()
        ));
    }

    let content =
        fs::read_to_string(config_path).map_err(|e| format!("Failed to read config: {}", e))?;

    let config: Config =
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))?;

    if config.address_book_path.trim().is_empty() {
        return Err("addressBookPath must not be empty".to_string());
    }
    if config.call_back_hour > 23 {
        log::warn!(
            "callBackHour {} is out of range, reminders will use 23:00",
            config.call_back_hour
        );
    }

    Ok(config)
}
