use crate::config::GeminiConfig;
use crate::models::{Category, Period, TimeEntry, category_context, category_for_activity};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::OnceLock;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("Missing Gemini API key. Set GEMINI_API_KEY or [gemini].api_key in config.toml.")]
    MissingApiKey,
    #[error("Failed to create HTTP client: {0}")]
    Client(String),
    #[error("Gemini request failed: {0}")]
    Request(String),
    #[error("Gemini error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Gemini returned an empty response.")]
    Empty,
    #[error("Could not parse entries from model output: {0}")]
    Parse(String),
}

pub type ReportOutcome = Result<String, String>;

pub struct GeminiClient {
    http: Client,
    api_key: String,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn from_config(config: &GeminiConfig) -> Result<Self, GeminiError> {
        let api_key = config.resolve_api_key();
        if api_key.is_empty() {
            return Err(GeminiError::MissingApiKey);
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(5)))
            .build()
            .map_err(|e| GeminiError::Client(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            config: config.clone(),
        })
    }

    /// Turns a free-text activity description into hydrated time entries.
    pub fn extract_entries(
        &self,
        input: &str,
        now: DateTime<Local>,
    ) -> Result<Vec<TimeEntry>, GeminiError> {
        let prompt = extraction_prompt(input.trim(), now);
        let model = resolve_model(&self.config.model, "gemini-2.0-flash");
        let text = self.generate_text(&model, &prompt, Some(entry_response_schema()))?;
        let entries = parse_extracted_entries(&text)?;
        info!(count = entries.len(), "extracted entries");
        Ok(entries)
    }

    /// Produces a Markdown analysis of the given entries.
    pub fn generate_report(
        &self,
        entries: &[TimeEntry],
        period: Period,
    ) -> Result<String, GeminiError> {
        let prompt = report_prompt(entries, period);
        let fallback = resolve_model(&self.config.model, "gemini-2.0-flash");
        let model = resolve_model(&self.config.report_model, &fallback);
        self.generate_text(&model, &prompt, None)
    }

    fn generate_text(
        &self,
        model: &str,
        prompt: &str,
        response_schema: Option<Value>,
    ) -> Result<String, GeminiError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            model
        );
        let mut body = json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [{"text": prompt}]
                }
            ]
        });
        if let Some(schema) = response_schema
            && let Some(map) = body.as_object_mut()
        {
            map.insert(
                "generationConfig".to_string(),
                json!({
                    "responseMimeType": "application/json",
                    "responseSchema": schema
                }),
            );
        }

        debug!(model, "gemini request");
        let response = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .map_err(|e| GeminiError::Request(e.without_url().to_string()))?;
        let status = response.status();
        let body_text = response
            .text()
            .map_err(|e| GeminiError::Request(e.without_url().to_string()))?;
        if !status.is_success() {
            return Err(GeminiError::Api {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let parsed: GeminiResponse =
            serde_json::from_str(&body_text).map_err(|e| GeminiError::Parse(e.to_string()))?;
        parsed
            .candidates
            .iter()
            .filter_map(|candidate| candidate.content.as_ref())
            .flat_map(|content| content.parts.iter())
            .filter_map(|part| part.text.as_ref())
            .find(|text| !text.trim().is_empty())
            .map(|text| text.trim().to_string())
            .ok_or(GeminiError::Empty)
    }
}

/// Runs a report request off the UI thread.
pub fn spawn_report(
    config: GeminiConfig,
    entries: Vec<TimeEntry>,
    period: Period,
) -> Receiver<ReportOutcome> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let result = GeminiClient::from_config(&config)
            .and_then(|client| client.generate_report(&entries, period))
            .map_err(|err| {
                warn!(error = %err, "report generation failed");
                err.to_string()
            });
        let _ = sender.send(result);
    });
    receiver
}

fn resolve_model(configured: &str, fallback: &str) -> String {
    let trimmed = configured.trim();
    let name = if trimmed.is_empty() { fallback } else { trimmed };
    name.strip_prefix("models/").unwrap_or(name).to_string()
}

fn extraction_prompt(input: &str, now: DateTime<Local>) -> String {
    format!(
        "User Input: \"{input}\"\n\
Current Date/Time: {now}\n\n\
Task: Analyze the user's input describing their activities.\n\
1. Break down distinct activities.\n\
2. Map each activity to the closest Standard Activity from the provided list.\n\
3. Assign the correct Category (PRODUCTION, INVESTMENT, EXPENSE).\n\
4. Parse time ranges:\n\
   - If user says \"9点到10点\" or \"9:00-10:00\", extract start and end times\n\
   - If no time specified, use current time and calculate end time from duration\n\
   - If only duration given (e.g., \"1小时\"), estimate reasonable start time\n\
5. Extract keywords from the task description for goal matching (e.g., \"学习编程\" -> [\"学习\", \"编程\"])\n\
6. If the input implies a date (e.g., \"yesterday\", \"昨天\"), use that date. Otherwise use today.\n\n\
{context}\n\
Important: Return ISO datetime strings for startTime and endTime (e.g., \"2025-12-02T09:00:00.000Z\"), \
and dateStr as the local calendar date (YYYY-MM-DD) of startTime.",
        now = now.to_rfc3339_opts(SecondsFormat::Secs, false),
        context = category_context(),
    )
}

fn entry_response_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "task": { "type": "STRING", "description": "The task description" },
                "activity": { "type": "STRING", "description": "The standardized activity name from the list" },
                "category": { "type": "STRING", "enum": ["INVESTMENT", "PRODUCTION", "EXPENSE"] },
                "startTime": { "type": "STRING", "description": "ISO datetime string for start time" },
                "endTime": { "type": "STRING", "description": "ISO datetime string for end time" },
                "durationMinutes": { "type": "INTEGER", "description": "Duration in minutes" },
                "dateStr": { "type": "STRING", "description": "YYYY-MM-DD format date" },
                "keywords": {
                    "type": "ARRAY",
                    "items": { "type": "STRING" },
                    "description": "Keywords extracted from task for goal matching"
                }
            },
            "required": ["task", "activity", "category", "startTime", "endTime", "durationMinutes", "dateStr", "keywords"]
        }
    })
}

fn report_prompt(entries: &[TimeEntry], period: Period) -> String {
    let summary = entries
        .iter()
        .map(report_line)
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a high-level productivity consultant.\n\
Analyze the following time logs for a {period} period.\n\n\
The Philosophy:\n\
- Investment: Improves quality of life long-term.\n\
- Production: Creates direct value.\n\
- Expense: Maintenance costs of living.\n\n\
Data:\n{summary}\n\n\
{context}\n\
Task:\n\
Provide a concise but deep analysis in Markdown format.\n\
1. **Overview**: Brief summary of how time was spent.\n\
2. **Balance Analysis**: Are they spending too much on Expense? Is Investment sufficient?\n\
3. **Pattern Recognition**: Point out any good or bad habits visible in the logs.\n\
4. **Recommendations**: Give 3 specific, actionable tips to improve their structure based on this data.\n\n\
Keep the tone professional, encouraging, and insightful. Use Chinese language for the response.",
        period = period.as_str(),
        summary = summary,
        context = category_context(),
    )
}

/// `2025-12-02 09:00-10:00: task [activity] (CATEGORY) - 60分钟`
pub fn report_line(entry: &TimeEntry) -> String {
    let start = entry.start_time.with_timezone(&Local);
    let end = entry.end_time.with_timezone(&Local);
    format!(
        "{} {}-{}: {} [{}] ({}) - {}分钟",
        entry.date_str.format("%Y-%m-%d"),
        start.format("%H:%M"),
        end.format("%H:%M"),
        entry.task,
        entry.activity,
        entry.category.as_str(),
        entry.duration_minutes
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    task: String,
    activity: String,
    category: String,
    start_time: String,
    end_time: String,
    duration_minutes: i64,
    date_str: String,
    #[serde(default)]
    keywords: Option<Vec<String>>,
}

/// Validates the model's JSON output and hydrates ids and sort timestamps.
///
/// A single invalid entry rejects the whole batch.
pub fn parse_extracted_entries(text: &str) -> Result<Vec<TimeEntry>, GeminiError> {
    let json_text = strip_code_fence(text);
    if json_text.is_empty() {
        return Ok(Vec::new());
    }
    let raw: Vec<RawEntry> =
        serde_json::from_str(json_text).map_err(|e| GeminiError::Parse(e.to_string()))?;

    raw.into_iter()
        .enumerate()
        .map(|(idx, entry)| {
            hydrate(entry).map_err(|msg| GeminiError::Parse(format!("entry {}: {msg}", idx + 1)))
        })
        .collect()
}

fn hydrate(raw: RawEntry) -> Result<TimeEntry, String> {
    let task = raw.task.trim().to_string();
    if task.is_empty() {
        return Err("task is empty".to_string());
    }
    let activity = raw.activity.trim().to_string();
    let category = Category::parse(&raw.category).unwrap_or_else(|| {
        let fallback = category_for_activity(&activity);
        warn!(category = %raw.category, %activity, fallback = %fallback, "unknown category from model");
        fallback
    });
    let start_time = parse_instant(&raw.start_time)
        .ok_or_else(|| format!("invalid startTime '{}'", raw.start_time))?;
    let end_time = parse_instant(&raw.end_time)
        .ok_or_else(|| format!("invalid endTime '{}'", raw.end_time))?;
    if end_time < start_time {
        return Err(format!(
            "endTime {} is before startTime {}",
            raw.end_time, raw.start_time
        ));
    }
    let duration_minutes = u32::try_from(raw.duration_minutes)
        .map_err(|_| format!("invalid durationMinutes {}", raw.duration_minutes))?;
    let date_str = NaiveDate::parse_from_str(raw.date_str.trim(), "%Y-%m-%d")
        .map_err(|_| format!("invalid dateStr '{}'", raw.date_str))?;
    let keywords = raw.keywords.map(|list| {
        list.into_iter()
            .map(|keyword| keyword.trim().to_string())
            .filter(|keyword| !keyword.is_empty())
            .collect::<Vec<_>>()
    });

    Ok(TimeEntry {
        id: Uuid::new_v4().to_string(),
        task,
        activity,
        category,
        duration_minutes,
        start_time,
        end_time,
        timestamp: start_time.timestamp_millis(),
        date_str,
        keywords,
        goal_id: None,
        goal_title: None,
        notion_page_id: None,
    })
}

/// Accepts RFC 3339 instants; naive datetimes are read as local time.
fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Some(instant.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

fn strip_code_fence(text: &str) -> &str {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let re = FENCE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("valid fence regex")
    });
    match re.captures(text).and_then(|caps| caps.get(1)) {
        Some(inner) => inner.as_str(),
        None => text.trim(),
    }
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}
