//! Duplicate cleanup as a long-lived service.
//!
//! Callers hold a `CleanupHandle` and ask for a cleanup; the service task
//! runs requests one at a time on the blocking pool and answers with the
//! integer status code (0 success, 1 error, 2 no duplicates).

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::dedup::{remove_duplicates, CleanupReport, CleanupStatus};
use crate::provider::ContactProvider;

/// Pending requests beyond the one being served.
const REQUEST_CHANNEL_SIZE: usize = 8;

struct CleanupRequest {
    reply: oneshot::Sender<CleanupReport>,
}

/// Client side of the cleanup service. Cheap to clone.
#[derive(Clone)]
pub struct CleanupHandle {
    sender: mpsc::Sender<CleanupRequest>,
}

impl CleanupHandle {
    /// Run one cleanup and return its full report. `None` if the service is gone.
    pub async fn cleanup_report(&self) -> Option<CleanupReport> {
        let (reply, response) = oneshot::channel();
        if self.sender.send(CleanupRequest { reply }).await.is_err() {
            log::error!("Cleanup service is not running");
            return None;
        }
        response.await.ok()
    }

    /// Run one cleanup and return its status code. A closed service yields 1.
    pub async fn cleanup_duplicate_contacts(&self) -> i32 {
        self.cleanup_report()
            .await
            .map(|report| report.status())
            .unwrap_or(CleanupStatus::Error)
            .code()
    }
}

pub struct CleanupService {
    provider: Arc<dyn ContactProvider>,
}

impl CleanupService {
    /// Start the service on the current runtime.
    pub fn spawn(provider: Arc<dyn ContactProvider>) -> CleanupHandle {
        let (sender, receiver) = mpsc::channel(REQUEST_CHANNEL_SIZE);
        let service = CleanupService { provider };
        tokio::spawn(service.run(receiver));
        CleanupHandle { sender }
    }

    /// Serve requests until every handle is dropped.
    async fn run(self, mut receiver: mpsc::Receiver<CleanupRequest>) {
        log::info!("Cleanup service started");
        while let Some(request) = receiver.recv().await {
            let provider = Arc::clone(&self.provider);
            let report = match tokio::task::spawn_blocking(move || remove_duplicates(provider.as_ref())).await {
                Ok(report) => report,
                Err(e) => {
                    log::error!("Cleanup task failed: {}", e);
                    CleanupReport {
                        read_failed: true,
                        ..Default::default()
                    }
                }
            };
            // The caller may have stopped waiting.
            let _ = request.reply.send(report);
        }
        log::info!("Cleanup service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryAddressBook;
    use crate::types::Contact;

    fn book(contacts: Vec<Contact>) -> Arc<MemoryAddressBook> {
        Arc::new(MemoryAddressBook::new(contacts))
    }

    #[tokio::test]
    async fn test_cleanup_removes_duplicate_and_reports_success() {
        let provider = book(vec![
            Contact::new(1, "Ann", &["5551234"]),
            Contact::new(2, "ann", &["555-1234"]),
        ]);
        let handle = CleanupService::spawn(provider.clone());

        assert_eq!(handle.cleanup_duplicate_contacts().await, 0);
        assert_eq!(provider.ids(), vec![1]);
        // Second run finds nothing.
        assert_eq!(handle.cleanup_duplicate_contacts().await, 2);
    }

    #[tokio::test]
    async fn test_empty_and_single_contact_books() {
        let empty = CleanupService::spawn(book(Vec::new()));
        assert_eq!(empty.cleanup_duplicate_contacts().await, 2);

        let single = CleanupService::spawn(book(vec![Contact::new(1, "Ann", &["1"])]));
        assert_eq!(single.cleanup_duplicate_contacts().await, 2);
    }

    #[tokio::test]
    async fn test_unreadable_book_reports_error() {
        let provider = book(vec![Contact::new(1, "Ann", &["1"])]);
        provider.set_unreadable(true);
        let handle = CleanupService::spawn(provider);
        assert_eq!(handle.cleanup_duplicate_contacts().await, 1);
    }

    #[tokio::test]
    async fn test_closed_service_reports_error() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let handle = CleanupHandle { sender };
        assert_eq!(handle.cleanup_duplicate_contacts().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_served_one_at_a_time() {
        let provider = book(vec![
            Contact::new(1, "Ann", &["1"]),
            Contact::new(2, "Ann", &["1"]),
            Contact::new(3, "Ann", &["1"]),
        ]);
        let handle = CleanupService::spawn(provider.clone());
        let other = handle.clone();

        let (a, b) = tokio::join!(
            handle.cleanup_duplicate_contacts(),
            other.cleanup_duplicate_contacts()
        );
        let mut codes = vec![a, b];
        codes.sort();
        assert_eq!(codes, vec![0, 2]);
        assert_eq!(provider.ids(), vec![1]);
    }

    #[tokio::test]
    async fn test_report_details() {
        let provider = book(vec![
            Contact::new(1, "Ann", &["1"]),
            Contact::new(2, "Ann", &["1"]),
        ]);
        let handle = CleanupService::spawn(provider);
        let report = handle.cleanup_report().await.unwrap();
        assert_eq!(report.deleted_ids, vec![2]);
        assert_eq!(report.duplicate_groups, 1);
    }
}
