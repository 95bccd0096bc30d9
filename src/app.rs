use crate::config::{Config, NotionConfig};
use crate::integrations::gemini::ReportOutcome;
use crate::intake::IntakeOutcome;
use crate::models::{InputMode, Period, TimeEntry};
use crate::stats::{Summary, summarize};
use crate::storage::{self, EntryStore, StorageError};
use crate::sync::SyncOutcome;
use chrono::{DateTime, Duration, Local};
use ratatui::widgets::ListState;
use std::sync::mpsc::Receiver;
use tui_textarea::TextArea;

pub const PLACEHOLDER_COMPOSE: &str = "昨天下午2点到4点写代码，然后跑步半小时… (Enter to submit, Esc to cancel)";

/// A message that stays on screen until the user dismisses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub body: String,
    pub failed: bool,
}

pub struct App<'a> {
    pub config: Config,
    pub notion: NotionConfig,
    pub store: EntryStore,
    pub summary: Summary,
    /// Store indices, newest start time first.
    pub visible: Vec<usize>,
    pub entries_state: ListState,

    pub input_mode: InputMode,
    pub textarea: TextArea<'a>,
    pub period: Period,

    pub show_help_popup: bool,
    pub show_delete_popup: bool,
    pub show_clear_popup: bool,
    pub show_report_popup: bool,
    pub report_text: Option<String>,
    pub report_scroll: u16,

    pub intake_receiver: Option<Receiver<IntakeOutcome>>,
    pub pending_input: Option<String>,
    pub sync_receiver: Option<Receiver<SyncOutcome>>,
    pub report_receiver: Option<Receiver<ReportOutcome>>,

    pub notice: Option<Notice>,
    pub toast_message: Option<String>,
    pub toast_expiry: Option<DateTime<Local>>,
    pub should_quit: bool,
}

impl<'a> App<'a> {
    pub fn new(config: Config) -> Result<Self, StorageError> {
        let data_dir = config.data.data_dir.clone();
        let store = EntryStore::load(&data_dir)?;
        let notion = storage::effective_notion_config(&data_dir)?;

        let mut app = App {
            config,
            notion,
            store,
            summary: Summary::default(),
            visible: Vec::new(),
            entries_state: ListState::default(),
            input_mode: InputMode::Navigate,
            textarea: new_composer(),
            period: Period::Week,
            show_help_popup: false,
            show_delete_popup: false,
            show_clear_popup: false,
            show_report_popup: false,
            report_text: None,
            report_scroll: 0,
            intake_receiver: None,
            pending_input: None,
            sync_receiver: None,
            report_receiver: None,
            notice: None,
            toast_message: None,
            toast_expiry: None,
            should_quit: false,
        };
        app.refresh();
        Ok(app)
    }

    /// Recomputes stats and the list order after the store changed.
    pub fn refresh(&mut self) {
        let entries = self.store.entries();
        self.summary = summarize(entries);

        let mut visible: Vec<usize> = (0..entries.len()).collect();
        visible.sort_by(|&a, &b| entries[b].timestamp.cmp(&entries[a].timestamp));
        self.visible = visible;

        let selected = match self.entries_state.selected() {
            _ if self.visible.is_empty() => None,
            Some(i) => Some(i.min(self.visible.len() - 1)),
            None => Some(0),
        };
        self.entries_state.select(selected);
    }

    pub fn selected_entry(&self) -> Option<&TimeEntry> {
        let i = self.entries_state.selected()?;
        let idx = *self.visible.get(i)?;
        self.store.entries().get(idx)
    }

    pub fn select_next(&mut self) {
        if self.visible.is_empty() {
            return;
        }
        let next = match self.entries_state.selected() {
            Some(i) if i + 1 < self.visible.len() => i + 1,
            Some(i) => i,
            None => 0,
        };
        self.entries_state.select(Some(next));
    }

    pub fn select_prev(&mut self) {
        if self.visible.is_empty() {
            return;
        }
        let prev = self
            .entries_state
            .selected()
            .map(|i| i.saturating_sub(1))
            .unwrap_or(0);
        self.entries_state.select(Some(prev));
    }

    pub fn transition_to(&mut self, mode: InputMode) {
        if mode == InputMode::Composing {
            self.textarea = new_composer();
        }
        self.input_mode = mode;
    }

    pub fn is_extracting(&self) -> bool {
        self.intake_receiver.is_some()
    }

    pub fn is_syncing(&self) -> bool {
        self.sync_receiver.is_some()
    }

    pub fn is_reporting(&self) -> bool {
        self.report_receiver.is_some()
    }

    pub fn toast(&mut self, message: impl Into<String>) {
        self.toast_message = Some(message.into());
        let seconds = self.config.ui.toast_seconds.max(1) as i64;
        self.toast_expiry = Some(Local::now() + Duration::seconds(seconds));
    }

    pub fn notify(&mut self, title: impl Into<String>, body: impl Into<String>) {
        self.notice = Some(Notice {
            title: title.into(),
            body: body.into(),
            failed: false,
        });
    }

    pub fn notify_failure(&mut self, title: impl Into<String>, body: impl Into<String>) {
        self.notice = Some(Notice {
            title: title.into(),
            body: body.into(),
            failed: true,
        });
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn new_composer<'a>() -> TextArea<'a> {
    let mut textarea = TextArea::default();
    textarea.set_placeholder_text(PLACEHOLDER_COMPOSE);
    textarea
}
