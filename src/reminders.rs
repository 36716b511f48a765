//! Reminder scheduling and delivery
//!
//! Builders compute `scheduled_at` in the user's timezone and return a
//! `NewReminder` ready to insert. `ReminderScheduler` polls the store and
//! hands due reminders to a `Notifier`, once each.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Days, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;

use crate::db::{ContactDb, DbError, NewReminder, ReminderType};
use crate::error::ServiceError;
use crate::notification::{Notification, Notifier};
use crate::types::Config;
use crate::util::{format_timestamp, now_timestamp};

/// Resolve a local wall-clock time to UTC. Times inside a DST gap are read
/// as UTC wall time rather than dropped.
fn local_to_utc(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => Utc.from_utc_datetime(&naive),
    }
}

fn reminder_hour(config: &Config) -> u32 {
    config.call_back_hour.min(23)
}

/// `days` from now at the configured hour, local time. `None` past the
/// last representable date.
pub fn days_from_now_at_hour(config: &Config, days: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let tz = config.tz();
    let date = now
        .with_timezone(&tz)
        .date_naive()
        .checked_add_days(Days::new(u64::from(days)))?;
    let naive = date.and_hms_opt(reminder_hour(config), 0, 0)?;
    Some(local_to_utc(tz, naive))
}

/// Parse a stored birthday: `YYYY-MM-DD`, `--MM-DD` or `MM-DD`.
pub fn parse_month_day(value: &str) -> Option<(u32, u32)> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some((date.month(), date.day()));
    }
    let rest = value.trim_start_matches('-');
    let (month, day) = rest.split_once('-')?;
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;
    // 2000 is a leap year, so Feb 29 validates.
    NaiveDate::from_ymd_opt(2000, month, day).map(|_| (month, day))
}

fn date_in_year(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).or_else(|| {
        if month == 2 && day == 29 {
            NaiveDate::from_ymd_opt(year, 2, 28)
        } else {
            None
        }
    })
}

/// Next yearly occurrence of `month`/`day` strictly after `now`, at the
/// configured hour. Feb 29 falls on Feb 28 in non-leap years.
pub fn next_yearly_occurrence(
    config: &Config,
    month: u32,
    day: u32,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let tz = config.tz();
    let this_year = now.with_timezone(&tz).year();
    (this_year..=this_year + 1).find_map(|year| {
        let naive = date_in_year(year, month, day)?.and_hms_opt(reminder_hour(config), 0, 0)?;
        let at = local_to_utc(tz, naive);
        (at > now).then_some(at)
    })
}

// Stored titles never carry the contact's name; delivery adds it for
// contacts that are not locked.

pub fn call_back(config: &Config, contact_id: i64, days: u32, now: DateTime<Utc>) -> Option<NewReminder> {
    let at = days_from_now_at_hour(config, days, now)?;
    Some(NewReminder {
        contact_id,
        reminder_type: ReminderType::CallBack,
        title: "Call back".to_string(),
        description: None,
        scheduled_at: format_timestamp(at),
    })
}

/// Birthday reminder from a stored birthday string. `None` if it does not parse.
pub fn birthday(
    config: &Config,
    contact_id: i64,
    birthday: &str,
    now: DateTime<Utc>,
) -> Option<NewReminder> {
    let (month, day) = parse_month_day(birthday)?;
    let at = next_yearly_occurrence(config, month, day, now)?;
    Some(NewReminder {
        contact_id,
        reminder_type: ReminderType::Birthday,
        title: "Birthday".to_string(),
        description: Some("Don't forget to congratulate!".to_string()),
        scheduled_at: format_timestamp(at),
    })
}

pub fn anniversary(config: &Config, contact_id: i64, date: &str, now: DateTime<Utc>) -> Option<NewReminder> {
    let (month, day) = parse_month_day(date)?;
    let at = next_yearly_occurrence(config, month, day, now)?;
    Some(NewReminder {
        contact_id,
        reminder_type: ReminderType::Anniversary,
        title: "Anniversary".to_string(),
        description: None,
        scheduled_at: format_timestamp(at),
    })
}

pub fn custom(
    contact_id: i64,
    title: &str,
    description: Option<&str>,
    at: DateTime<Utc>,
) -> NewReminder {
    NewReminder {
        contact_id,
        reminder_type: ReminderType::Custom,
        title: title.to_string(),
        description: description.map(str::to_string),
        scheduled_at: format_timestamp(at),
    }
}

// =============================================================================
// Delivery
// =============================================================================

/// Notify every due, uncompleted, undelivered reminder and stamp it.
/// A notifier failure leaves the reminder for the next pass.
pub fn deliver_due_reminders(
    db: &ContactDb,
    notifier: &dyn Notifier,
    now: &str,
) -> Result<usize, DbError> {
    let mut delivered = 0;
    for reminder in db.get_undelivered_due_reminders(now)? {
        let notification = match db.get_extended_contact(reminder.contact_id) {
            Ok(Some(contact)) if contact.is_locked => Notification::hidden(&reminder),
            Ok(Some(contact)) => Notification::for_reminder(&reminder, Some(&contact.name)),
            Ok(None) => Notification::for_reminder(&reminder, None),
            Err(e) => {
                log::warn!("Reminder {}: contact lookup failed: {}", reminder.id, e);
                Notification::hidden(&reminder)
            }
        };

        if let Err(e) = notifier.notify(&notification) {
            log::error!("Failed to deliver reminder {}: {}", reminder.id, e);
            continue;
        }
        db.mark_reminder_notified(reminder.id, now)?;
        delivered += 1;
    }
    Ok(delivered)
}

/// Polls the store for due reminders.
pub struct ReminderScheduler {
    db: Arc<Mutex<ContactDb>>,
    notifier: Arc<dyn Notifier>,
    poll_interval: Duration,
}

impl ReminderScheduler {
    pub fn new(db: Arc<Mutex<ContactDb>>, notifier: Arc<dyn Notifier>, config: &Config) -> Self {
        Self {
            db,
            notifier,
            poll_interval: Duration::from_secs(config.reminder_poll_secs.max(1)),
        }
    }

    /// One delivery pass on the blocking pool.
    pub async fn tick(&self) -> Result<usize, ServiceError> {
        let db = Arc::clone(&self.db);
        let notifier = Arc::clone(&self.notifier);
        let delivered = tokio::task::spawn_blocking(move || {
            let db = db.lock();
            deliver_due_reminders(&db, notifier.as_ref(), &now_timestamp())
        })
        .await??;
        Ok(delivered)
    }

    /// Start the delivery loop. Runs until the task is dropped.
    pub async fn run(&self) {
        log::info!(
            "Reminder scheduler started (poll every {}s)",
            self.poll_interval.as_secs()
        );
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            interval.tick().await;
            match self.tick().await {
                Ok(0) => {}
                Ok(count) => log::info!("Delivered {} reminder(s)", count),
                Err(e) => log::warn!("Reminder delivery pass failed: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{sample_contact, test_db};
    use chrono::Timelike;

    fn config(tz: &str) -> Config {
        let mut config = Config::new("/tmp/book.json");
        config.timezone = tz.to_string();
        config
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    struct RecordingNotifier {
        seen: Mutex<Vec<Notification>>,
        fail: bool,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: &Notification) -> Result<(), String> {
            if self.fail {
                return Err("offline".to_string());
            }
            self.seen.lock().push(notification.clone());
            Ok(())
        }
    }

    #[test]
    fn test_call_back_at_configured_hour_in_timezone() {
        let config = config("Europe/Moscow");
        let r = call_back(&config, 1, 2, utc(2025, 3, 10, 20)).unwrap();
        // 20:00 UTC is 23:00 in Moscow on the 10th; two days later at 10:00 MSK = 07:00 UTC.
        assert_eq!(r.scheduled_at, "2025-03-12T07:00:00.000Z");
        assert_eq!(r.reminder_type, ReminderType::CallBack);
        assert_eq!(r.title, "Call back");
    }

    #[test]
    fn test_call_back_beyond_calendar_is_refused() {
        let config = config("UTC");
        let now = utc(2025, 3, 10, 20);
        assert!(days_from_now_at_hour(&config, u32::MAX, now).is_none());
        assert!(call_back(&config, 1, 4_000_000_000, now).is_none());
    }

    #[test]
    fn test_anniversary_uses_yearly_occurrence() {
        let config = config("UTC");
        let r = anniversary(&config, 1, "2015-09-12", utc(2025, 10, 1, 0)).unwrap();
        assert_eq!(r.scheduled_at, "2026-09-12T10:00:00.000Z");
        assert_eq!(r.reminder_type, ReminderType::Anniversary);
        assert!(anniversary(&config, 1, "not a date", utc(2025, 10, 1, 0)).is_none());
    }

    #[test]
    fn test_birthday_next_occurrence_strictly_after_now() {
        let config = config("UTC");
        let upcoming = birthday(&config, 1, "1990-05-17", utc(2025, 5, 1, 0)).unwrap();
        assert_eq!(upcoming.scheduled_at, "2025-05-17T10:00:00.000Z");

        // Exactly at the reminder time rolls to next year.
        let rolled = birthday(&config, 1, "1990-05-17", utc(2025, 5, 17, 10)).unwrap();
        assert_eq!(rolled.scheduled_at, "2026-05-17T10:00:00.000Z");
    }

    #[test]
    fn test_birthday_feb_29_falls_back_in_common_years() {
        let config = config("UTC");
        let r = birthday(&config, 1, "2000-02-29", utc(2025, 1, 1, 0)).unwrap();
        assert_eq!(r.scheduled_at, "2025-02-28T10:00:00.000Z");

        let leap = birthday(&config, 1, "--02-29", utc(2028, 1, 1, 0)).unwrap();
        assert_eq!(leap.scheduled_at, "2028-02-29T10:00:00.000Z");
    }

    #[test]
    fn test_parse_month_day_formats() {
        assert_eq!(parse_month_day("1990-05-17"), Some((5, 17)));
        assert_eq!(parse_month_day("--12-31"), Some((12, 31)));
        assert_eq!(parse_month_day("02-29"), Some((2, 29)));
        assert_eq!(parse_month_day("13-01"), None);
        assert_eq!(parse_month_day("someday"), None);
    }

    #[test]
    fn test_hour_is_clamped() {
        let mut config = config("UTC");
        config.call_back_hour = 99;
        let at = days_from_now_at_hour(&config, 0, utc(2025, 1, 1, 0)).unwrap();
        assert_eq!(at.hour(), 23);
    }

    #[test]
    fn test_deliver_due_reminders_once() {
        let db = test_db();
        db.upsert_extended_contact(&sample_contact(1, "Ann", &["1"])).unwrap();
        let due = custom(1, "Ping", None, utc(2025, 1, 1, 9));
        let later = custom(1, "Later", None, utc(2025, 1, 2, 9));
        let due_id = db.insert_reminder(&due).unwrap();
        db.insert_reminder(&later).unwrap();

        let notifier = RecordingNotifier {
            seen: Mutex::new(Vec::new()),
            fail: false,
        };
        let now = format_timestamp(utc(2025, 1, 1, 12));
        assert_eq!(deliver_due_reminders(&db, &notifier, &now).unwrap(), 1);
        assert_eq!(deliver_due_reminders(&db, &notifier, &now).unwrap(), 0);

        let seen = notifier.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].title, "Ping");
        assert_eq!(seen[0].body, "Ann");
        let stored = db.get_reminder(due_id).unwrap().unwrap();
        assert_eq!(stored.notified_at.as_deref(), Some(now.as_str()));
        assert!(!stored.is_completed);
    }

    #[test]
    fn test_failed_delivery_is_retried() {
        let db = test_db();
        let id = db.insert_reminder(&custom(1, "Ping", None, utc(2025, 1, 1, 9))).unwrap();
        let now = format_timestamp(utc(2025, 1, 1, 12));

        let failing = RecordingNotifier {
            seen: Mutex::new(Vec::new()),
            fail: true,
        };
        assert_eq!(deliver_due_reminders(&db, &failing, &now).unwrap(), 0);
        assert!(db.get_reminder(id).unwrap().unwrap().notified_at.is_none());

        let working = RecordingNotifier {
            seen: Mutex::new(Vec::new()),
            fail: false,
        };
        assert_eq!(deliver_due_reminders(&db, &working, &now).unwrap(), 1);
    }

    #[test]
    fn test_locked_contact_reminders_reveal_nothing() {
        let config = config("UTC");
        let db = test_db();
        let mut row = sample_contact(1, "Secret Sam", &["1"]);
        row.is_locked = true;
        db.upsert_extended_contact(&row).unwrap();
        db.insert_reminder(&custom(1, "Meet Sam", Some("at the pier"), utc(2025, 1, 1, 9)))
            .unwrap();
        db.insert_reminder(&call_back(&config, 1, 0, utc(2025, 1, 1, 0)).unwrap())
            .unwrap();

        let notifier = RecordingNotifier {
            seen: Mutex::new(Vec::new()),
            fail: false,
        };
        let delivered =
            deliver_due_reminders(&db, &notifier, &format_timestamp(utc(2025, 1, 1, 12))).unwrap();
        assert_eq!(delivered, 2);

        let seen = notifier.seen.lock();
        let titles: Vec<&str> = seen.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["Reminder", "Call back"]);
        for n in seen.iter() {
            assert!(!n.title.contains("Sam"));
            assert!(n.body.is_empty());
        }
    }

    #[tokio::test]
    async fn test_scheduler_tick_uses_current_time() {
        let db = test_db();
        db.insert_reminder(&custom(1, "Past", None, utc(2020, 1, 1, 0))).unwrap();
        let db = Arc::new(Mutex::new(db));
        let notifier = Arc::new(RecordingNotifier {
            seen: Mutex::new(Vec::new()),
            fail: false,
        });
        let scheduler = ReminderScheduler::new(db, notifier.clone(), &config("UTC"));
        assert_eq!(scheduler.tick().await.unwrap(), 1);
        assert_eq!(notifier.seen.lock().len(), 1);
    }
}
