use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use contactbook_lib::biometric::CredentialAuthenticator;
use contactbook_lib::db::{ContactDb, DbReminder, ReminderType};
use contactbook_lib::dedup::preview_duplicates;
use contactbook_lib::lock::{LockSession, ToggleOutcome};
use contactbook_lib::notification::LogNotifier;
use contactbook_lib::provider::{ContactProvider, JsonAddressBook};
use contactbook_lib::reminders::ReminderScheduler;
use contactbook_lib::service::{ContactDetails, ExtendedEdit};
use contactbook_lib::state::{load_config, load_config_from};
use contactbook_lib::types::Config;
use contactbook_lib::{CleanupService, ContactService, ServiceError};

#[derive(Parser)]
#[command(name = "contactbook")]
#[command(about = "Tags, notes, reminders and duplicate cleanup for your address book", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.contactbook/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the isolated development database
    #[arg(long, global = true)]
    dev: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log only warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the address book and refresh stored metadata
    Sync,

    /// List contacts grouped by initial
    List(ListArgs),

    /// Show one contact (prompts for the credential if it is locked)
    Show {
        id: i64,
        #[arg(long)]
        json: bool,
    },

    /// Remove duplicate contacts from the address book
    Cleanup {
        /// Only report what would be deleted
        #[arg(long)]
        dry_run: bool,
    },

    /// Manage tags
    #[command(subcommand)]
    Tag(TagCommand),

    /// Replace a contact's notes
    Note { id: i64, text: String },

    /// Replace a contact's biography
    Bio { id: i64, text: String },

    /// Set a social network link (an empty URL removes it)
    Social {
        id: i64,
        platform: String,
        url: String,
    },

    /// Set a contact's birthday (YYYY-MM-DD or MM-DD)
    Birthday { id: i64, date: String },

    /// Hide a contact behind the unlock challenge
    Lock { id: i64 },

    /// Make a locked contact visible again (requires the credential)
    Unlock { id: i64 },

    /// Forget everything stored about a contact
    Delete { id: i64 },

    /// Manage reminders
    #[command(subcommand)]
    Remind(RemindCommand),

    /// Deliver reminders as they come due until interrupted
    Watch,
}

#[derive(Args)]
struct ListArgs {
    /// Filter by name or phone
    #[arg(long, short)]
    search: Option<String>,

    /// Only contacts carrying this tag (repeatable; all must match)
    #[arg(long = "tag", short)]
    tags: Vec<String>,
}

#[derive(Subcommand)]
enum TagCommand {
    Add { id: i64, tag: String },
    Remove { id: i64, tag: String },
    /// Tags of one contact, or every tag in use
    List { id: Option<i64> },
}

#[derive(Subcommand)]
enum RemindCommand {
    /// Create a reminder some days from now
    Add {
        id: i64,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value_t = 1)]
        days: u32,
        /// call_back, birthday, anniversary or custom
        #[arg(long = "type", default_value = "custom")]
        reminder_type: ReminderType,
    },
    /// Call-back reminder at the configured hour
    CallBack {
        id: i64,
        #[arg(long, default_value_t = 1)]
        days: u32,
    },
    /// Reminder for the contact's next birthday
    Birthday { id: i64 },
    /// Yearly reminder for an anniversary (YYYY-MM-DD or MM-DD)
    Anniversary { id: i64, date: String },
    /// Reminders of one contact, or every due reminder of unlocked contacts
    List { id: Option<i64> },
    Complete { reminder_id: i64 },
    Delete { reminder_id: i64 },
}

fn init_logging(cli: &Cli) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

fn print_reminders(reminders: &[DbReminder]) {
    if reminders.is_empty() {
        println!("No reminders.");
        return;
    }
    for r in reminders {
        let status = if r.is_completed { "done" } else { "open" };
        println!(
            "#{:<4} {:<12} {}  [{}] {}",
            r.id, r.reminder_type, r.scheduled_at, status, r.title
        );
        if let Some(desc) = &r.description {
            println!("      {desc}");
        }
    }
}

fn print_details(details: &ContactDetails) {
    println!("{} (#{})", details.name, details.contact_id);
    if details.hidden {
        println!("  Locked contact. Details are hidden.");
        return;
    }
    if details.is_locked {
        println!("  Locked");
    }
    if let Some(ext) = &details.extended {
        let phones = ext.phone_list();
        if !phones.is_empty() {
            println!("  Phones:    {}", phones.join(", "));
        }
        let emails = ext.email_list();
        if !emails.is_empty() {
            println!("  Emails:    {}", emails.join(", "));
        }
        if let Some(birthday) = &ext.birthday {
            println!("  Birthday:  {birthday}");
        }
        if let Some(bio) = &ext.biography {
            println!("  Biography: {bio}");
        }
        if let Some(notes) = &ext.notes {
            println!("  Notes:     {notes}");
        }
        for (platform, url) in ext.social_network_map() {
            println!("  {platform}: {url}");
        }
    }
    if !details.tags.is_empty() {
        println!("  Tags:      {}", details.tags.join(", "));
    }
    if !details.reminders.is_empty() {
        println!("  Reminders:");
        print_reminders(&details.reminders);
    }
}

/// Select `id` in a fresh session and prompt for the credential if it is locked.
async fn open_session(
    service: &ContactService,
    authenticator: &CredentialAuthenticator,
    id: i64,
) -> Result<LockSession, ServiceError> {
    let contact = service
        .get_extended_contact(id)
        .await?
        .ok_or(ServiceError::ContactNotFound(id))?;
    service.select_contact(id);
    let mut session = LockSession::new();
    session.select(id, contact.is_locked);
    if contact.is_locked {
        if let Err(message) = session.unlock(authenticator, Some(&contact.name)).await {
            eprintln!("{message}");
        }
    }
    Ok(session)
}

/// Session for the contact a reminder belongs to. Reminders whose contact
/// has no stored data need no challenge.
async fn reminder_session(
    service: &ContactService,
    authenticator: &CredentialAuthenticator,
    reminder_id: i64,
) -> Result<LockSession, ServiceError> {
    let owner = service.reminder_owner(reminder_id).await?;
    match open_session(service, authenticator, owner).await {
        Err(ServiceError::ContactNotFound(_)) => Ok(LockSession::new()),
        other => other,
    }
}

async fn edit_contact(
    service: &ContactService,
    authenticator: &CredentialAuthenticator,
    id: i64,
    edit: ExtendedEdit,
) -> Result<(), ServiceError> {
    let session = open_session(service, authenticator, id).await?;
    service.update_extended_contact(id, edit, &session).await?;
    Ok(())
}

/// Lock or unlock a contact. Unlocking asks for the credential first.
async fn set_locked(
    service: &ContactService,
    authenticator: &CredentialAuthenticator,
    id: i64,
    want_locked: bool,
) -> Result<(), ServiceError> {
    let contact = service
        .get_extended_contact(id)
        .await?
        .ok_or(ServiceError::ContactNotFound(id))?;
    if contact.is_locked == want_locked {
        println!("Already {}.", if want_locked { "locked" } else { "unlocked" });
        return Ok(());
    }

    let mut session = LockSession::new();
    session.select(id, contact.is_locked);
    let mut outcome = session.toggle();
    if outcome == ToggleOutcome::NeedsUnlock {
        if let Err(message) = session.unlock(authenticator, Some(&contact.name)).await {
            eprintln!("{message}");
            return Ok(());
        }
        outcome = session.toggle();
    }
    if let Some(flag) = outcome.new_flag() {
        service.toggle_lock(id, flag, &session).await?;
        println!("{} is now {}.", contact.name, if flag { "locked" } else { "unlocked" });
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), ServiceError> {
    let config: Config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
    .map_err(ServiceError::InvalidInput)?;

    if cli.dev || config.dev_mode {
        contactbook_lib::db::set_dev_db_mode(true);
    }

    let provider: Arc<dyn ContactProvider> = Arc::new(JsonAddressBook::new(config.address_book()));
    let authenticator = CredentialAuthenticator::stdin(config.credential_hash.clone());

    if let Commands::Cleanup { dry_run } = &cli.command {
        if *dry_run {
            let provider = Arc::clone(&provider);
            let groups = tokio::task::spawn_blocking(move || preview_duplicates(provider.as_ref()))
                .await??;
            if groups.is_empty() {
                println!("No duplicate contacts found.");
            }
            for group in &groups {
                let ids: Vec<String> = group.remove.iter().map(|c| c.id.to_string()).collect();
                println!(
                    "{}: keep #{}, delete {}",
                    group.keep.name,
                    group.keep.id,
                    ids.join(", ")
                );
            }
            return Ok(());
        }
    }

    let db = tokio::task::spawn_blocking(ContactDb::open).await??;
    let service = ContactService::new(db, Arc::clone(&provider), config.clone());
    service.load_contacts().await?;

    match cli.command {
        Commands::Sync => {
            let count = service.state().snapshot().contacts.len();
            println!("Synced {count} contacts.");
        }
        Commands::List(args) => {
            if let Some(query) = args.search {
                service.set_search_query(query);
            }
            for tag in args.tags {
                service.toggle_tag_filter(tag);
            }
            let groups = service.grouped_contacts().await?;
            if groups.is_empty() {
                println!("No contacts.");
            }
            for (initial, contacts) in groups {
                println!("{initial}");
                for contact in contacts {
                    println!("  #{:<6} {:<30} {}", contact.id, contact.name, contact.phones.join(", "));
                }
            }
        }
        Commands::Show { id, json } => {
            let session = open_session(&service, &authenticator, id).await?;
            let details = service.contact_details(id, &session).await?;
            if json {
                let out = serde_json::to_string_pretty(&details)
                    .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;
                println!("{out}");
            } else {
                print_details(&details);
            }
        }
        Commands::Cleanup { .. } => {
            let handle = CleanupService::spawn(provider);
            let report = service.cleanup_duplicates(&handle).await;
            let status = report.status();
            println!("{} (code {})", status, status.code());
            if report.deleted > 0 {
                println!("Deleted {} contact(s).", report.deleted);
            }
            if report.failed > 0 {
                println!("{} deletion(s) failed, see the log.", report.failed);
            }
        }
        Commands::Tag(TagCommand::Add { id, tag }) => {
            let session = open_session(&service, &authenticator, id).await?;
            service.add_tag(id, &tag, &session).await?;
        }
        Commands::Tag(TagCommand::Remove { id, tag }) => {
            let session = open_session(&service, &authenticator, id).await?;
            service.remove_tag(id, &tag, &session).await?;
        }
        Commands::Tag(TagCommand::List { id }) => {
            let tags = match id {
                Some(id) => {
                    let session = open_session(&service, &authenticator, id).await?;
                    service.get_tags_for_contact(id, &session).await?
                }
                None => service.get_all_tags().await?,
            };
            for tag in tags {
                println!("{tag}");
            }
        }
        Commands::Note { id, text } => {
            let edit = ExtendedEdit {
                notes: Some(text),
                ..Default::default()
            };
            edit_contact(&service, &authenticator, id, edit).await?;
        }
        Commands::Bio { id, text } => {
            let edit = ExtendedEdit {
                biography: Some(text),
                ..Default::default()
            };
            edit_contact(&service, &authenticator, id, edit).await?;
        }
        Commands::Social { id, platform, url } => {
            let session = open_session(&service, &authenticator, id).await?;
            if !session.details_visible() {
                return Err(ServiceError::Locked(id));
            }
            let contact = service
                .get_extended_contact(id)
                .await?
                .ok_or(ServiceError::ContactNotFound(id))?;
            let mut social: BTreeMap<String, String> = contact.social_network_map();
            if url.trim().is_empty() {
                social.remove(&platform);
            } else {
                social.insert(platform, url);
            }
            let edit = ExtendedEdit {
                social_networks: Some(social),
                ..Default::default()
            };
            service.update_extended_contact(id, edit, &session).await?;
        }
        Commands::Birthday { id, date } => {
            let edit = ExtendedEdit {
                birthday: Some(date),
                ..Default::default()
            };
            edit_contact(&service, &authenticator, id, edit).await?;
        }
        Commands::Lock { id } => set_locked(&service, &authenticator, id, true).await?,
        Commands::Unlock { id } => set_locked(&service, &authenticator, id, false).await?,
        Commands::Delete { id } => {
            let session = open_session(&service, &authenticator, id).await?;
            service.delete_contact(id, &session).await?;
            println!("Removed stored data for contact #{id}.");
        }
        Commands::Remind(cmd) => match cmd {
            RemindCommand::Add {
                id,
                title,
                description,
                days,
                reminder_type,
            } => {
                let session = open_session(&service, &authenticator, id).await?;
                let rid = service
                    .create_reminder(id, reminder_type, &title, description.as_deref(), days, &session)
                    .await?;
                println!("Created reminder #{rid}.");
            }
            RemindCommand::CallBack { id, days } => {
                let session = open_session(&service, &authenticator, id).await?;
                let rid = service.schedule_call_back(id, days, &session).await?;
                println!("Created reminder #{rid}.");
            }
            RemindCommand::Birthday { id } => {
                let session = open_session(&service, &authenticator, id).await?;
                let rid = service.schedule_birthday(id, &session).await?;
                println!("Created reminder #{rid}.");
            }
            RemindCommand::Anniversary { id, date } => {
                let session = open_session(&service, &authenticator, id).await?;
                let rid = service.schedule_anniversary(id, &date, &session).await?;
                println!("Created reminder #{rid}.");
            }
            RemindCommand::List { id } => {
                let reminders = match id {
                    Some(id) => {
                        let session = open_session(&service, &authenticator, id).await?;
                        service.get_reminders_for_contact(id, &session).await?
                    }
                    None => service.get_due_reminders().await?,
                };
                print_reminders(&reminders);
            }
            RemindCommand::Complete { reminder_id } => {
                let session = reminder_session(&service, &authenticator, reminder_id).await?;
                service.complete_reminder(reminder_id, &session).await?;
            }
            RemindCommand::Delete { reminder_id } => {
                let session = reminder_session(&service, &authenticator, reminder_id).await?;
                service.delete_reminder(reminder_id, &session).await?;
            }
        },
        Commands::Watch => {
            let scheduler = ReminderScheduler::new(service.db(), Arc::new(LogNotifier), &config);
            tokio::select! {
                _ = scheduler.run() => {}
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Interrupted, stopping reminder delivery");
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("{}", e.recovery_suggestion());
            ExitCode::FAILURE
        }
    }
}
