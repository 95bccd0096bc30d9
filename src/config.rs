use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

pub fn key_match(key: &KeyEvent, bindings: &[String]) -> bool {
    bindings.iter().any(|binding| is_match(key, binding))
}

fn is_match(key: &KeyEvent, binding: &str) -> bool {
    let binding = binding.to_lowercase();
    let parts: Vec<&str> = binding.split('+').collect();

    let mut target_modifiers = KeyModifiers::NONE;
    let mut target_code = KeyCode::Null;

    for part in parts {
        match part {
            "ctrl" => target_modifiers.insert(KeyModifiers::CONTROL),
            "opt" | "alt" => target_modifiers.insert(KeyModifiers::ALT),
            "shift" => target_modifiers.insert(KeyModifiers::SHIFT),
            "enter" => target_code = KeyCode::Enter,
            "esc" => target_code = KeyCode::Esc,
            "backspace" => target_code = KeyCode::Backspace,
            "tab" => target_code = KeyCode::Tab,
            "space" => target_code = KeyCode::Char(' '),
            "up" => target_code = KeyCode::Up,
            "down" => target_code = KeyCode::Down,
            "pageup" => target_code = KeyCode::PageUp,
            "pagedown" => target_code = KeyCode::PageDown,
            "home" => target_code = KeyCode::Home,
            "end" => target_code = KeyCode::End,
            "delete" => target_code = KeyCode::Delete,
            c if c.chars().count() == 1 => {
                if let Some(ch) = c.chars().next() {
                    target_code = KeyCode::Char(ch);
                }
            }
            _ => {}
        }
    }

    // A shift binding needs a shifted key, whether the terminal reports it as
    // an uppercase char, a SHIFT modifier, or both.
    let code_matches = match (key.code, target_code) {
        (KeyCode::Char(c), KeyCode::Char(tc)) => {
            let shifted = c.is_uppercase() || key.modifiers.contains(KeyModifiers::SHIFT);
            c.to_lowercase().next() == Some(tc)
                && if target_modifiers.contains(KeyModifiers::SHIFT) {
                    shifted
                } else {
                    !c.is_uppercase()
                }
        }
        (code, target) => code == target,
    };
    if !code_matches {
        return false;
    }

    // Enter must match exactly so `enter` and `alt+enter` can coexist.
    if target_code == KeyCode::Enter {
        return key.modifiers == target_modifiers;
    }

    let mut key_mods = key.modifiers;
    if !target_modifiers.contains(KeyModifiers::SHIFT) {
        key_mods.remove(KeyModifiers::SHIFT);
    }
    let mut target_mods = target_modifiers;
    if matches!(target_code, KeyCode::Char(_)) {
        // Terminals report uppercase chars with or without SHIFT.
        target_mods.remove(KeyModifiers::SHIFT);
        key_mods.remove(KeyModifiers::SHIFT);
    }

    key_mods == target_mods
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "lifestream", "lifestream")
}

pub fn default_data_dir() -> PathBuf {
    if let Some(dirs) = project_dirs() {
        return dirs.data_dir().to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".lifestream")
}

pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os("LIFESTREAM_CONFIG") {
        return PathBuf::from(path);
    }
    if let Some(dirs) = project_dirs() {
        return dirs.config_dir().join("config.toml");
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".lifestream-config.toml")
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub gemini: GeminiConfig,
    pub notion: NotionSettings,
    pub sync: SyncConfig,
    pub ui: UiConfig,
    pub keybindings: KeyBindings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub report_model: String,
    pub timeout_seconds: u64,
    pub api_base: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.0-flash".to_string(),
            report_model: String::new(),
            timeout_seconds: 60,
            api_base: "https://generativelanguage.googleapis.com".to_string(),
        }
    }
}

impl GeminiConfig {
    pub fn resolve_api_key(&self) -> String {
        if !self.api_key.trim().is_empty() {
            return self.api_key.trim().to_string();
        }
        std::env::var("GEMINI_API_KEY").unwrap_or_default()
    }
}

/// Transport settings for the Notion API. Credentials live in [`NotionConfig`].
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct NotionSettings {
    pub api_base: String,
    pub api_version: String,
    pub timeout_seconds: u64,
}

impl Default for NotionSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.notion.com".to_string(),
            api_version: "2022-06-28".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SyncConfig {
    /// Pause between successful page creations. Notion allows ~3 requests/s.
    pub delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { delay_ms: 400 }
    }
}

impl SyncConfig {
    pub fn delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct UiConfig {
    pub top_activities: usize,
    pub toast_seconds: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            top_activities: 10,
            toast_seconds: 4,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KeyBindings {
    pub quit: Vec<String>,
    pub help: Vec<String>,
    pub up: Vec<String>,
    pub down: Vec<String>,
    pub compose: Vec<String>,
    pub submit: Vec<String>,
    pub cancel: Vec<String>,
    pub delete: Vec<String>,
    pub clear_all: Vec<String>,
    pub sync: Vec<String>,
    pub report: Vec<String>,
    pub cycle_period: Vec<String>,
    pub confirm: Vec<String>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            quit: vec!["q".to_string(), "ctrl+c".to_string()],
            help: vec!["?".to_string()],
            up: vec!["k".to_string(), "up".to_string()],
            down: vec!["j".to_string(), "down".to_string()],
            compose: vec!["i".to_string(), "a".to_string()],
            submit: vec!["enter".to_string()],
            cancel: vec!["esc".to_string()],
            delete: vec!["d".to_string(), "delete".to_string()],
            clear_all: vec!["shift+c".to_string()],
            sync: vec!["s".to_string()],
            report: vec!["r".to_string()],
            cycle_period: vec!["p".to_string()],
            confirm: vec!["y".to_string(), "enter".to_string()],
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let config_path = config_path();

        let mut config = if let Ok(content) = fs::read_to_string(&config_path) {
            match toml::from_str::<Config>(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = ?config_path, error = %e, "failed to parse config.toml, using defaults");
                    Config::default()
                }
            }
        } else {
            Config::default()
        };

        let changed = config.normalize_paths();
        if (changed || !config_path.exists())
            && let Err(e) = config.save_to_path(&config_path)
        {
            warn!(path = ?config_path, error = %e, "failed to write config.toml");
        }

        // Env override, never written back to config.toml.
        if let Some(dir) = std::env::var_os("LIFESTREAM_DATA_DIR") {
            config.data.data_dir = PathBuf::from(dir);
        }

        config
    }

    pub fn save_to_path(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, content)
    }

    fn normalize_paths(&mut self) -> bool {
        let mut changed = false;

        if self.data.data_dir.as_os_str().is_empty() {
            self.data.data_dir = default_data_dir();
            changed = true;
        }

        if self.data.data_dir.is_relative() {
            self.data.data_dir = default_data_dir().join(&self.data.data_dir);
            changed = true;
        }

        changed
    }
}

/// Notion credentials and database ids. Persisted as a JSON blob next to the
/// entries, not in config.toml.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotionConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub records_database_id: String,
    #[serde(default)]
    pub goals_database_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
}

impl NotionConfig {
    /// Fills empty fields from `NOTION_API_KEY` / `NOTION_PROXY_URL`.
    pub fn with_env_fallbacks(mut self) -> Self {
        if self.api_key.trim().is_empty()
            && let Ok(key) = std::env::var("NOTION_API_KEY")
        {
            self.api_key = key;
        }
        if self.proxy_url.as_deref().is_none_or(|url| url.trim().is_empty()) {
            self.proxy_url = std::env::var("NOTION_PROXY_URL")
                .ok()
                .filter(|url| !url.trim().is_empty());
        }
        self
    }

    /// Fields required before records can be created. Empty when sync may start.
    pub fn missing_sync_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.api_key.trim().is_empty() {
            missing.push("api key");
        }
        if self.records_database_id.trim().is_empty() {
            missing.push("records database id");
        }
        missing
    }

    pub fn has_goals_database(&self) -> bool {
        !self.goals_database_id.trim().is_empty()
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Shows the first and last few characters of a credential.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.trim().chars().collect();
    if chars.is_empty() {
        return "(not set)".to_string();
    }
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
