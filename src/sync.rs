//! Pushes locally created entries to the Notion records database.
//!
//! A run walks the unsynced entries in store order and creates one page per
//! entry, strictly one request at a time. Results come back as
//! [`PagePatch`]es that the caller commits to the [`EntryStore`].

use crate::config::{NotionConfig, NotionSettings};
use crate::integrations::notion::{NotionClient, NotionError, RecordSink};
use crate::models::TimeEntry;
use crate::storage::{EntryStore, StorageError};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// A Notion page id to attach to a local entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePatch {
    pub entry_id: String,
    pub page_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySyncState {
    Unsynced,
    Synced { page_id: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running,
    Completed,
    Aborted,
}

#[derive(Debug)]
struct SyncItem {
    entry: TimeEntry,
    state: EntrySyncState,
}

/// One sync run over a snapshot of unsynced entries.
#[derive(Debug)]
pub struct SyncBatch {
    state: BatchState,
    items: Vec<SyncItem>,
    abort_error: Option<NotionError>,
}

impl SyncBatch {
    /// Takes every entry without a page id, in the given order.
    pub fn new(entries: &[TimeEntry]) -> Self {
        let items = entries
            .iter()
            .filter(|entry| !entry.is_synced())
            .map(|entry| SyncItem {
                entry: entry.clone(),
                state: EntrySyncState::Unsynced,
            })
            .collect();
        Self {
            state: BatchState::Idle,
            items,
            abort_error: None,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn run<S: RecordSink + ?Sized>(&mut self, sink: &S, delay: Duration) {
        self.run_with_pause(sink, delay, thread::sleep);
    }

    /// Drives the batch to `Completed` or `Aborted`.
    ///
    /// `pause` is called with `delay` after a successful submission when
    /// another entry follows. A transport failure stops the batch and leaves
    /// the remaining entries `Unsynced`.
    pub fn run_with_pause<S, P>(&mut self, sink: &S, delay: Duration, mut pause: P)
    where
        S: RecordSink + ?Sized,
        P: FnMut(Duration),
    {
        if self.state != BatchState::Idle {
            return;
        }
        self.state = BatchState::Running;

        let total = self.items.len();
        for idx in 0..total {
            let item = &mut self.items[idx];
            info!(task = %item.entry.task, position = idx + 1, total, "syncing entry");

            match sink.create_record(&item.entry) {
                Ok(page_id) => {
                    info!(task = %item.entry.task, %page_id, "entry synced");
                    item.state = EntrySyncState::Synced { page_id };
                    if idx + 1 < total && !delay.is_zero() {
                        pause(delay);
                    }
                }
                Err(err) => {
                    error!(task = %item.entry.task, error = %err, "failed to sync entry");
                    item.state = EntrySyncState::Failed {
                        reason: err.to_string(),
                    };
                    if err.is_transport() {
                        warn!(
                            remaining = total - idx - 1,
                            "transport failure, aborting sync batch"
                        );
                        self.abort_error = Some(err);
                        self.state = BatchState::Aborted;
                        return;
                    }
                }
            }
        }

        self.state = BatchState::Completed;
    }

    pub fn patches(&self) -> Vec<PagePatch> {
        self.items
            .iter()
            .filter_map(|item| match &item.state {
                EntrySyncState::Synced { page_id } => Some(PagePatch {
                    entry_id: item.entry.id.clone(),
                    page_id: page_id.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn report(&self) -> SyncReport {
        let mut report = SyncReport {
            patches: self.patches(),
            ..SyncReport::default()
        };
        for item in &self.items {
            match &item.state {
                EntrySyncState::Synced { .. } => report.succeeded += 1,
                EntrySyncState::Failed { reason } => {
                    report.failed += 1;
                    report
                        .failures
                        .push((item.entry.task.clone(), reason.clone()));
                }
                EntrySyncState::Unsynced => report.not_attempted += 1,
            }
        }
        report
    }

    fn into_outcome(mut self) -> SyncOutcome {
        let report = self.report();
        match (self.state(), self.abort_error.take()) {
            (BatchState::Aborted, Some(error)) => SyncOutcome::Aborted { report, error },
            _ => SyncOutcome::Completed(report),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub succeeded: usize,
    pub failed: usize,
    pub not_attempted: usize,
    pub patches: Vec<PagePatch>,
    /// `(task, reason)` for every failed entry.
    pub failures: Vec<(String, String)>,
}

impl SyncReport {
    pub fn summary(&self) -> String {
        if self.failed > 0 {
            format!(
                "Sync finished: {} succeeded, {} failed.",
                self.succeeded, self.failed
            )
        } else {
            format!("Synced {} entries to Notion.", self.succeeded)
        }
    }
}

#[derive(Debug)]
pub enum SyncOutcome {
    /// Credentials or the records database id are missing; nothing was sent.
    NotConfigured { missing: Vec<&'static str> },
    NothingToSync,
    /// The HTTP client could not be set up; nothing was sent.
    Unavailable { error: NotionError },
    Completed(SyncReport),
    /// Stopped on a transport failure. `report` holds the progress made.
    Aborted { report: SyncReport, error: NotionError },
}

impl SyncOutcome {
    pub fn patches(&self) -> &[PagePatch] {
        match self {
            SyncOutcome::Completed(report) | SyncOutcome::Aborted { report, .. } => {
                &report.patches
            }
            _ => &[],
        }
    }

    pub fn message(&self) -> String {
        match self {
            SyncOutcome::NotConfigured { missing } => format!(
                "Notion settings incomplete (missing {}). Run `lifestream notion set`.",
                missing.join(", ")
            ),
            SyncOutcome::NothingToSync => "All entries are already synced to Notion.".to_string(),
            SyncOutcome::Unavailable { error } => format!("{error}. No entries were sent."),
            SyncOutcome::Completed(report) => report.summary(),
            SyncOutcome::Aborted { report, error } => format!(
                "{error}. Sync stopped after {} succeeded; {} entries left for the next sync.",
                report.succeeded,
                report.not_attempted + report.failed
            ),
        }
    }

    /// The message followed by one line per failed entry.
    pub fn details(&self) -> String {
        let mut text = self.message();
        if let SyncOutcome::Completed(report) | SyncOutcome::Aborted { report, .. } = self
            && !report.failures.is_empty()
        {
            text.push_str("\n\nFailed entries:");
            for (task, reason) in &report.failures {
                text.push_str(&format!("\n- {task}: {reason}"));
            }
        }
        text
    }

    /// True when any entry failed or the run could not finish.
    pub fn has_failures(&self) -> bool {
        match self {
            SyncOutcome::NotConfigured { .. } | SyncOutcome::Unavailable { .. } => true,
            SyncOutcome::NothingToSync => false,
            SyncOutcome::Completed(report) => report.failed > 0,
            SyncOutcome::Aborted { .. } => true,
        }
    }
}

/// Runs one sync over `entries` without touching any store.
pub fn run_sync<S: RecordSink + ?Sized>(
    entries: &[TimeEntry],
    notion: &NotionConfig,
    sink: &S,
    delay: Duration,
) -> SyncOutcome {
    let missing = notion.missing_sync_fields();
    if !missing.is_empty() {
        warn!(?missing, "notion configuration incomplete");
        return SyncOutcome::NotConfigured { missing };
    }

    let mut batch = SyncBatch::new(entries);
    if batch.is_empty() {
        info!("no unsynced entries");
        return SyncOutcome::NothingToSync;
    }

    info!(count = batch.items.len(), "starting notion sync");
    batch.run(sink, delay);
    batch.into_outcome()
}

/// Runs a sync against the store and commits whatever succeeded, including
/// the partial progress of an aborted run.
pub fn sync_store<S: RecordSink + ?Sized>(
    store: &mut EntryStore,
    notion: &NotionConfig,
    sink: &S,
    delay: Duration,
) -> Result<SyncOutcome, StorageError> {
    let outcome = run_sync(store.entries(), notion, sink, delay);
    store.commit_sync(outcome.patches())?;
    Ok(outcome)
}

/// Runs a sync over a snapshot on a worker thread. The receiver yields the
/// outcome; committing its patches is left to the owner of the store.
pub fn spawn_sync(
    snapshot: Vec<TimeEntry>,
    notion: NotionConfig,
    settings: NotionSettings,
    delay: Duration,
) -> Receiver<SyncOutcome> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let outcome = match NotionClient::new(&notion, &settings) {
            Ok(client) => run_sync(&snapshot, &notion, &client, delay),
            Err(error) => {
                error!(%error, "could not set up notion client");
                SyncOutcome::Unavailable { error }
            }
        };
        let _ = sender.send(outcome);
    });
    receiver
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::{sample_entry, temp_data_dir};
    use std::cell::RefCell;
    use std::collections::HashMap;

    enum Reply {
        Page(&'static str),
        Transport,
        Rejected(u16),
    }

    /// Answers per task name; unscripted tasks get a page id derived from the task.
    struct ScriptedSink {
        replies: RefCell<HashMap<String, Reply>>,
        calls: RefCell<Vec<String>>,
    }

    impl ScriptedSink {
        fn new(replies: Vec<(&str, Reply)>) -> Self {
            Self {
                replies: RefCell::new(
                    replies
                        .into_iter()
                        .map(|(task, reply)| (task.to_string(), reply))
                        .collect(),
                ),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl RecordSink for ScriptedSink {
        fn create_record(&self, entry: &TimeEntry) -> Result<String, NotionError> {
            self.calls.borrow_mut().push(entry.task.clone());
            match self.replies.borrow_mut().remove(&entry.task) {
                Some(Reply::Page(id)) => Ok(id.to_string()),
                Some(Reply::Transport) => {
                    Err(NotionError::Transport("connection refused".to_string()))
                }
                Some(Reply::Rejected(status)) => Err(NotionError::Rejected {
                    status,
                    body: r#"{"code":"validation_error"}"#.to_string(),
                }),
                None => Ok(format!("page-{}", entry.task)),
            }
        }
    }

    fn notion() -> NotionConfig {
        NotionConfig {
            api_key: "secret".to_string(),
            records_database_id: "records".to_string(),
            goals_database_id: String::new(),
            proxy_url: None,
        }
    }

    fn three_entries() -> Vec<TimeEntry> {
        vec![
            sample_entry("e1", "one"),
            sample_entry("e2", "two"),
            sample_entry("e3", "three"),
        ]
    }

    fn store_with(entries: Vec<TimeEntry>) -> EntryStore {
        let mut store = EntryStore::load(&temp_data_dir()).expect("load");
        store.append(entries).expect("append");
        store
    }

    #[test]
    fn transport_failure_aborts_and_keeps_progress() {
        let sink = ScriptedSink::new(vec![("two", Reply::Transport)]);
        let mut store = store_with(three_entries());

        let outcome = sync_store(&mut store, &notion(), &sink, Duration::ZERO).expect("sync");

        assert_eq!(sink.calls(), vec!["one", "two"]);
        match &outcome {
            SyncOutcome::Aborted { report, error } => {
                assert!(error.is_transport());
                assert_eq!(report.succeeded, 1);
                assert_eq!(report.failed, 1);
                assert_eq!(report.not_attempted, 1);
            }
            other => panic!("expected abort, got {other:?}"),
        }
        assert_eq!(
            store.get("e1").unwrap().notion_page_id.as_deref(),
            Some("page-one")
        );
        assert!(store.get("e2").unwrap().notion_page_id.is_none());
        assert!(store.get("e3").unwrap().notion_page_id.is_none());
    }

    #[test]
    fn rejection_does_not_abort() {
        let sink = ScriptedSink::new(vec![("two", Reply::Rejected(400))]);
        let mut store = store_with(three_entries());

        let outcome = sync_store(&mut store, &notion(), &sink, Duration::ZERO).expect("sync");

        assert_eq!(sink.calls(), vec!["one", "two", "three"]);
        match &outcome {
            SyncOutcome::Completed(report) => {
                assert_eq!(report.succeeded, 2);
                assert_eq!(report.failed, 1);
                assert_eq!(report.summary(), "Sync finished: 2 succeeded, 1 failed.");
                assert_eq!(report.failures[0].0, "two");
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(store.unsynced_count(), 1);
        assert!(store.get("e2").unwrap().notion_page_id.is_none());
    }

    #[test]
    fn rerun_only_submits_remaining_entries() {
        let mut store = store_with(three_entries());
        let first = ScriptedSink::new(vec![("two", Reply::Transport)]);
        sync_store(&mut store, &notion(), &first, Duration::ZERO).expect("first");

        let second = ScriptedSink::new(vec![]);
        let outcome = sync_store(&mut store, &notion(), &second, Duration::ZERO).expect("second");
        assert_eq!(second.calls(), vec!["two", "three"]);
        assert!(matches!(outcome, SyncOutcome::Completed(ref r) if r.succeeded == 2 && r.failed == 0));
        assert_eq!(
            store.get("e1").unwrap().notion_page_id.as_deref(),
            Some("page-one")
        );

        let after_second = store.entries().to_vec();
        let third = ScriptedSink::new(vec![]);
        let outcome = sync_store(&mut store, &notion(), &third, Duration::ZERO).expect("third");
        assert!(matches!(outcome, SyncOutcome::NothingToSync));
        assert!(third.calls().is_empty());
        assert_eq!(store.entries(), &after_second[..]);
    }

    #[test]
    fn incomplete_config_sends_nothing() {
        let sink = ScriptedSink::new(vec![]);
        let config = NotionConfig {
            records_database_id: String::new(),
            ..notion()
        };
        let outcome = run_sync(&three_entries(), &config, &sink, Duration::ZERO);
        match outcome {
            SyncOutcome::NotConfigured { missing } => {
                assert_eq!(missing, vec!["records database id"]);
            }
            other => panic!("expected NotConfigured, got {other:?}"),
        }
        assert!(sink.calls().is_empty());
    }

    #[test]
    fn already_synced_entries_are_skipped() {
        let mut entries = three_entries();
        for entry in &mut entries {
            entry.notion_page_id = Some(format!("existing-{}", entry.id));
        }
        let sink = ScriptedSink::new(vec![]);
        let outcome = run_sync(&entries, &notion(), &sink, Duration::ZERO);
        assert!(matches!(outcome, SyncOutcome::NothingToSync));
        assert!(sink.calls().is_empty());
    }

    #[test]
    fn pauses_only_between_successes() {
        let sink = ScriptedSink::new(vec![("two", Reply::Rejected(500))]);
        let mut entries = three_entries();
        entries.push(sample_entry("e4", "four"));
        let mut batch = SyncBatch::new(&entries);
        let mut pauses = Vec::new();

        batch.run_with_pause(&sink, Duration::from_millis(400), |d| pauses.push(d));

        // After "one" and "three"; none after the failure or the last entry.
        assert_eq!(pauses, vec![Duration::from_millis(400); 2]);
        assert_eq!(batch.state(), BatchState::Completed);
    }

    #[test]
    fn batch_states_follow_the_run() {
        let entries = three_entries();
        let mut batch = SyncBatch::new(&entries);
        assert_eq!(batch.state(), BatchState::Idle);
        assert_eq!(batch.report().not_attempted, 3);

        let sink = ScriptedSink::new(vec![("one", Reply::Transport)]);
        batch.run_with_pause(&sink, Duration::ZERO, |_| {});
        assert_eq!(batch.state(), BatchState::Aborted);

        let report = batch.report();
        assert_eq!(report.failed, 1);
        assert_eq!(report.not_attempted, 2);
        assert!(report.patches.is_empty());
        assert_eq!(report.failures[0].0, "one");

        // A finished batch is not restarted.
        let calls_before = sink.calls().len();
        batch.run_with_pause(&sink, Duration::ZERO, |_| {});
        assert_eq!(sink.calls().len(), calls_before);
    }

    #[test]
    fn outcome_messages() {
        let aborted = SyncOutcome::Aborted {
            report: SyncReport {
                succeeded: 1,
                failed: 1,
                not_attempted: 1,
                ..SyncReport::default()
            },
            error: NotionError::Transport("dns error".to_string()),
        };
        let message = aborted.message();
        assert!(message.contains("Network error"));
        assert!(message.contains("2 entries left"));

        let full = SyncOutcome::Completed(SyncReport {
            succeeded: 3,
            ..SyncReport::default()
        });
        assert_eq!(full.message(), "Synced 3 entries to Notion.");
        assert!(!full.has_failures());
    }

    #[test]
    fn details_list_failed_entries() {
        let sink = ScriptedSink::new(vec![("two", Reply::Rejected(400))]);
        let outcome = run_sync(&three_entries(), &notion(), &sink, Duration::ZERO);
        let details = outcome.details();
        assert!(details.starts_with("Sync finished: 2 succeeded, 1 failed."));
        assert!(details.contains("- two: Notion rejected the request (400)"));
        assert!(outcome.has_failures());
    }

    #[test]
    fn client_setup_failure_is_not_a_transport_abort() {
        let outcome = SyncOutcome::Unavailable {
            error: NotionError::Client("no TLS backend".to_string()),
        };
        match &outcome {
            SyncOutcome::Unavailable { error } => assert!(!error.is_transport()),
            other => panic!("unexpected {other:?}"),
        }
        assert!(outcome.patches().is_empty());
        assert!(outcome.has_failures());
        assert_eq!(
            outcome.message(),
            "Failed to create HTTP client: no TLS backend. No entries were sent."
        );
    }
}
