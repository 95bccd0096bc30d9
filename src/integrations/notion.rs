use crate::config::{NotionConfig, NotionSettings};
use crate::models::{DurationType, Goal, GoalStatus, Priority, TimeEntry};
use chrono::{NaiveDate, SecondsFormat};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const NOTION_PUBLIC_BASE: &str = "https://api.notion.com";

// Property names of the Notion databases.
const PROP_TASK: &str = "Task";
const PROP_DURATION: &str = "Duration (Minutes)";
const PROP_START: &str = "Start Time";
const PROP_END: &str = "End Time";
const PROP_ACTIVITY: &str = "支出项";
const PROP_GOAL: &str = "Goal";
const PROP_GOAL_TITLE: &str = "Goal Title";
const PROP_DEADLINE: &str = "Deadline";
const PROP_PRIORITY: &str = "Priority";
const PROP_STATUS: &str = "Status";
const PROP_ESTIMATED: &str = "Estimated Time";
const PROP_PROGRESS: &str = "Progress";
const PROP_DURATION_TYPE: &str = "Duration Type";

/// Failure of a Notion call.
///
/// `Transport` means a request went out and no HTTP response came back.
/// `Config` and `Client` fail before anything is sent; `Rejected` and
/// `Decode` happen after the server answered.
#[derive(Debug, Error)]
pub enum NotionError {
    #[error("Notion configuration incomplete: missing {0}")]
    Config(String),
    #[error("Failed to create HTTP client: {0}")]
    Client(String),
    #[error("Network error, request never completed: {0}")]
    Transport(String),
    #[error("Notion rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Unexpected Notion response: {0}")]
    Decode(String),
}

impl NotionError {
    pub fn is_transport(&self) -> bool {
        matches!(self, NotionError::Transport(_))
    }
}

/// Creates one Notion page per time entry.
pub trait RecordSink {
    fn create_record(&self, entry: &TimeEntry) -> Result<String, NotionError>;
}

/// Supplies goals that are not completed and due on or after a date.
pub trait GoalSource {
    fn active_goals(&self, on_or_after: NaiveDate) -> Result<Vec<Goal>, NotionError>;
}

pub struct NotionClient {
    http: Client,
    config: NotionConfig,
    api_base: String,
    api_version: String,
}

impl NotionClient {
    pub fn new(config: &NotionConfig, settings: &NotionSettings) -> Result<Self, NotionError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds.max(5)))
            .build()
            .map_err(|e| NotionError::Client(e.to_string()))?;
        Ok(Self {
            http,
            config: config.clone(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_version: settings.api_version.clone(),
        })
    }

    fn endpoint(&self, api_path: &str) -> String {
        resolve_endpoint(self.config.proxy(), &self.api_base, api_path)
    }

    fn post(&self, url: &str, body: &Value) -> Result<Value, NotionError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(self.config.api_key.trim())
            .header("Notion-Version", &self.api_version)
            .json(body)
            .send()
            .map_err(|e| NotionError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response.text().map_err(|e| {
            // The status line arrived, so this is not a transport failure.
            NotionError::Decode(format!("failed to read response body ({status}): {e}"))
        })?;
        debug!(%url, status = status.as_u16(), "notion response");

        if !status.is_success() {
            return Err(NotionError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| NotionError::Decode(e.to_string()))
    }
}

impl RecordSink for NotionClient {
    fn create_record(&self, entry: &TimeEntry) -> Result<String, NotionError> {
        let missing = self.config.missing_sync_fields();
        if !missing.is_empty() {
            return Err(NotionError::Config(missing.join(", ")));
        }

        let url = self.endpoint("v1/pages");
        let body = create_page_body(&self.config.records_database_id, entry);
        debug!(
            %url,
            proxied = self.config.proxy().is_some(),
            task = %entry.task,
            activity = %entry.activity,
            "creating notion page"
        );

        let response = self.post(&url, &body)?;
        let created: CreatedPage =
            serde_json::from_value(response).map_err(|e| NotionError::Decode(e.to_string()))?;
        if created.id.trim().is_empty() {
            return Err(NotionError::Decode("page id is empty".to_string()));
        }
        Ok(created.id)
    }
}

impl GoalSource for NotionClient {
    fn active_goals(&self, on_or_after: NaiveDate) -> Result<Vec<Goal>, NotionError> {
        if !self.config.has_goals_database() {
            return Err(NotionError::Config("goals database id".to_string()));
        }

        let url = self.endpoint(&format!(
            "v1/databases/{}/query",
            self.config.goals_database_id.trim()
        ));
        let response = self.post(&url, &goals_query_body(on_or_after))?;
        parse_goals_response(response)
    }
}

/// Builds the request URL for an API path such as `v1/pages`.
///
/// A relay whose address contains `/notion` (the local relay or a
/// `/api/notion-proxy` function) forwards paths verbatim. Any other proxy is a
/// prefix proxy that expects the full public URL appended.
pub fn resolve_endpoint(proxy: Option<&str>, api_base: &str, api_path: &str) -> String {
    let api_path = api_path.trim_start_matches('/');
    match proxy.map(|p| p.trim().trim_end_matches('/')).filter(|p| !p.is_empty()) {
        Some(proxy) if proxy.contains("/notion") => format!("{proxy}/{api_path}"),
        Some(proxy) => format!("{proxy}/{NOTION_PUBLIC_BASE}/{api_path}"),
        None => format!("{}/{api_path}", api_base.trim_end_matches('/')),
    }
}

pub fn page_properties(entry: &TimeEntry) -> Value {
    let mut properties = json!({
        PROP_TASK: {
            "title": [{ "text": { "content": entry.task } }]
        },
        PROP_DURATION: { "number": entry.duration_minutes },
        PROP_START: {
            "date": { "start": entry.start_time.to_rfc3339_opts(SecondsFormat::Millis, true) }
        },
        PROP_END: {
            "date": { "start": entry.end_time.to_rfc3339_opts(SecondsFormat::Millis, true) }
        },
        PROP_ACTIVITY: { "select": { "name": entry.activity } }
    });
    // The category column is a formula in Notion and is never written.
    if let Some(goal_id) = entry.goal_id.as_deref()
        && let Some(map) = properties.as_object_mut()
    {
        map.insert(
            PROP_GOAL.to_string(),
            json!({ "relation": [{ "id": goal_id }] }),
        );
    }
    properties
}

pub fn create_page_body(database_id: &str, entry: &TimeEntry) -> Value {
    json!({
        "parent": { "database_id": database_id.trim() },
        "properties": page_properties(entry),
    })
}

pub fn goals_query_body(on_or_after: NaiveDate) -> Value {
    json!({
        "filter": {
            "and": [
                {
                    "property": PROP_STATUS,
                    "status": { "does_not_equal": GoalStatus::Completed.as_str() }
                },
                {
                    "property": PROP_DEADLINE,
                    "date": { "on_or_after": on_or_after.format("%Y-%m-%d").to_string() }
                }
            ]
        }
    })
}

#[derive(Deserialize)]
struct CreatedPage {
    id: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    results: Vec<RawPage>,
}

#[derive(Deserialize)]
struct RawPage {
    id: String,
    #[serde(default)]
    properties: HashMap<String, Value>,
}

/// Maps a database query response into goals. The envelope must be
/// well-formed; individual properties fall back to empty values.
pub fn parse_goals_response(response: Value) -> Result<Vec<Goal>, NotionError> {
    let parsed: QueryResponse =
        serde_json::from_value(response).map_err(|e| NotionError::Decode(e.to_string()))?;
    Ok(parsed.results.into_iter().map(goal_from_page).collect())
}

fn goal_from_page(page: RawPage) -> Goal {
    let prop = |name: &str| page.properties.get(name);
    let title = prop(PROP_GOAL_TITLE)
        .and_then(|v| v.pointer("/title/0/plain_text"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let deadline = prop(PROP_DEADLINE)
        .and_then(|v| v.pointer("/date/start"))
        .and_then(Value::as_str)
        .and_then(parse_notion_date);
    let select_name = |name: &str| {
        prop(name)
            .and_then(|v| v.pointer("/select/name"))
            .and_then(Value::as_str)
    };
    let status = match prop(PROP_STATUS)
        .and_then(|v| v.pointer("/status/name"))
        .and_then(Value::as_str)
    {
        Some(name) => GoalStatus::parse(name).unwrap_or_else(|| {
            warn!(goal = %page.id, status = name, "unknown goal status, treating as planned");
            GoalStatus::Planned
        }),
        None => GoalStatus::Planned,
    };
    let number = |name: &str| prop(name).and_then(|v| v.get("number")).and_then(Value::as_f64);

    Goal {
        deadline,
        priority: select_name(PROP_PRIORITY).and_then(Priority::parse),
        status,
        estimated_time: number(PROP_ESTIMATED),
        progress: number(PROP_PROGRESS),
        duration_type: select_name(PROP_DURATION_TYPE).and_then(DurationType::parse),
        ..Goal::new(page.id.clone(), title)
    }
}

/// Notion dates are either `YYYY-MM-DD` or a full timestamp.
fn parse_notion_date(value: &str) -> Option<NaiveDate> {
    let day = value.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}
