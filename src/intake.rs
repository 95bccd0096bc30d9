//! Free text in, enriched entries out: extraction followed by goal matching.

use crate::config::{GeminiConfig, NotionConfig, NotionSettings};
use crate::goals::enrich_entries;
use crate::integrations::gemini::{GeminiClient, GeminiError};
use crate::integrations::notion::NotionClient;
use crate::models::TimeEntry;
use chrono::{DateTime, Local};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use tracing::{info, warn};

pub type IntakeOutcome = Result<Vec<TimeEntry>, String>;

/// Extracts entries from `input` and attaches goals when a goals database is
/// configured. The result is ready to be appended to the store.
pub fn prepare_entries(
    gemini: &GeminiConfig,
    notion: &NotionConfig,
    notion_settings: &NotionSettings,
    input: &str,
    now: DateTime<Local>,
) -> Result<Vec<TimeEntry>, GeminiError> {
    let client = GeminiClient::from_config(gemini)?;
    let entries = client.extract_entries(input, now)?;
    if entries.is_empty() || !notion.has_goals_database() {
        return Ok(entries);
    }

    match NotionClient::new(notion, notion_settings) {
        Ok(goals) => Ok(enrich_entries(entries, notion, &goals)),
        Err(err) => {
            warn!(error = %err, "skipping goal matching");
            Ok(entries)
        }
    }
}

/// Runs [`prepare_entries`] on a worker thread.
pub fn spawn_prepare_entries(
    gemini: GeminiConfig,
    notion: NotionConfig,
    notion_settings: NotionSettings,
    input: String,
) -> Receiver<IntakeOutcome> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let result = prepare_entries(&gemini, &notion, &notion_settings, &input, Local::now())
            .map(|entries| {
                info!(count = entries.len(), "prepared entries");
                entries
            })
            .map_err(|err| {
                warn!(error = %err, "entry extraction failed");
                err.to_string()
            });
        let _ = sender.send(result);
    });
    receiver
}
