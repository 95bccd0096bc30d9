use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(PartialEq)]
pub enum InputMode {
    Navigate,
    Composing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Investment,
    Production,
    Expense,
}

pub struct CategoryDefinition {
    pub label: &'static str,
    pub description: &'static str,
    pub color: (u8, u8, u8),
    pub activities: &'static [&'static str],
}

// Activity vocabulary mirrors the "性质" formula of the Notion records database.
const PRODUCTION: CategoryDefinition = CategoryDefinition {
    label: "生产 (Production)",
    description: "创造价值",
    color: (0x8b, 0x5c, 0xf6),
    activities: &[
        "沟通", "管理", "输出", "总结", "目标", "吉他", "家庭", "助人", "分享", "商业", "写作",
        "组织", "执行", "创新", "规划",
    ],
};

const INVESTMENT: CategoryDefinition = CategoryDefinition {
    label: "投资 (Investment)",
    description: "让生命有更多质量",
    color: (0x10, 0xb9, 0x81),
    activities: &[
        "健康", "旅行", "人脉", "交易", "运动", "冥想", "阅读", "恋爱", "学习", "朋友", "播客",
        "健身",
    ],
};

const EXPENSE: CategoryDefinition = CategoryDefinition {
    label: "支出 (Expense)",
    description: "为了维持生命需要付出的",
    color: (0xf5, 0x9e, 0x0b),
    activities: &[
        "休息", "睡觉", "吃饭", "购物", "娱乐", "社交", "视频", "游戏", "通勤", "杂事", "情绪",
        "无意识",
    ],
};

impl Category {
    pub fn all() -> [Category; 3] {
        [Category::Production, Category::Investment, Category::Expense]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Investment => "INVESTMENT",
            Category::Production => "PRODUCTION",
            Category::Expense => "EXPENSE",
        }
    }

    pub fn definition(&self) -> &'static CategoryDefinition {
        match self {
            Category::Investment => &INVESTMENT,
            Category::Production => &PRODUCTION,
            Category::Expense => &EXPENSE,
        }
    }

    /// Short label used in narrow columns, e.g. "投资".
    pub fn short_label(&self) -> &'static str {
        self.definition()
            .label
            .split_whitespace()
            .next()
            .unwrap_or(self.as_str())
    }

    pub fn parse(value: &str) -> Option<Category> {
        match value.trim().to_ascii_uppercase().as_str() {
            "INVESTMENT" => Some(Category::Investment),
            "PRODUCTION" => Some(Category::Production),
            "EXPENSE" => Some(Category::Expense),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown activities count as maintenance time.
pub fn category_for_activity(activity: &str) -> Category {
    let activity = activity.trim();
    Category::all()
        .into_iter()
        .find(|category| category.definition().activities.contains(&activity))
        .unwrap_or(Category::Expense)
}

/// Prompt fragment describing the activity vocabulary of every category.
pub fn category_context() -> String {
    let mut context =
        "We classify time into three categories based on these specific activities:\n".to_string();
    for category in Category::all() {
        let def = category.definition();
        context.push_str(&format!(
            "- {} ({}): {}\n",
            category.as_str(),
            def.description,
            def.activities.join(", ")
        ));
    }
    context
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub id: String,
    pub task: String,
    pub activity: String,
    pub category: Category,
    pub duration_minutes: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Epoch milliseconds of `start_time`, used for ordering.
    pub timestamp: i64,
    pub date_str: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notion_page_id: Option<String>,
}

impl TimeEntry {
    pub fn is_synced(&self) -> bool {
        self.notion_page_id.is_some()
    }

    pub fn keywords(&self) -> &[String] {
        self.keywords.as_deref().unwrap_or(&[])
    }

    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(8)
            .map(|(idx, _)| idx)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalStatus {
    Planned,
    InProgress,
    Completed,
}

impl GoalStatus {
    pub fn parse(name: &str) -> Option<GoalStatus> {
        match name.trim() {
            "Planned" => Some(GoalStatus::Planned),
            "In Progress" => Some(GoalStatus::InProgress),
            "Completed" => Some(GoalStatus::Completed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Planned => "Planned",
            GoalStatus::InProgress => "In Progress",
            GoalStatus::Completed => "Completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn parse(name: &str) -> Option<Priority> {
        match name.trim() {
            "High" => Some(Priority::High),
            "Medium" => Some(Priority::Medium),
            "Low" => Some(Priority::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationType {
    Week,
    Month,
    Quarter,
}

impl DurationType {
    pub fn parse(name: &str) -> Option<DurationType> {
        match name.trim() {
            "Week" => Some(DurationType::Week),
            "Month" => Some(DurationType::Month),
            "Quarter" => Some(DurationType::Quarter),
            _ => None,
        }
    }
}

/// A goal page from the Notion goals database. Never persisted locally.
#[derive(Debug, Clone, PartialEq)]
pub struct Goal {
    pub id: String,
    pub title: String,
    pub deadline: Option<NaiveDate>,
    pub priority: Option<Priority>,
    pub status: GoalStatus,
    pub estimated_time: Option<f64>,
    pub progress: Option<f64>,
    pub duration_type: Option<DurationType>,
}

impl Goal {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            deadline: None,
            priority: None,
            status: GoalStatus::Planned,
            estimated_time: None,
            progress: None,
            duration_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalMatch {
    pub goal_id: String,
    pub goal_title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Week,
    Month,
    Quarter,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Week => "WEEK",
            Period::Month => "MONTH",
            Period::Quarter => "QUARTER",
        }
    }

    pub fn days(&self) -> i64 {
        match self {
            Period::Week => 7,
            Period::Month => 30,
            Period::Quarter => 90,
        }
    }

    pub fn next(&self) -> Period {
        match self {
            Period::Week => Period::Month,
            Period::Month => Period::Quarter,
            Period::Quarter => Period::Week,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "week" | "w" => Ok(Period::Week),
            "month" | "m" => Ok(Period::Month),
            "quarter" | "q" => Ok(Period::Quarter),
            other => Err(format!(
                "unknown period '{other}' (expected week, month or quarter)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_activities_map_to_their_category() {
        assert_eq!(category_for_activity("学习"), Category::Investment);
        assert_eq!(category_for_activity("写作"), Category::Production);
        assert_eq!(category_for_activity("通勤"), Category::Expense);
    }

    #[test]
    fn unknown_activity_falls_back_to_expense() {
        assert_eq!(category_for_activity("冲浪"), Category::Expense);
        assert_eq!(category_for_activity(""), Category::Expense);
    }

    #[test]
    fn category_serializes_as_uppercase_tag() {
        let json = serde_json::to_string(&Category::Investment).unwrap();
        assert_eq!(json, "\"INVESTMENT\"");
        let parsed: Category = serde_json::from_str("\"EXPENSE\"").unwrap();
        assert_eq!(parsed, Category::Expense);
        assert_eq!(Category::parse(" production "), Some(Category::Production));
        assert_eq!(Category::parse("leisure"), None);
    }

    #[test]
    fn category_context_lists_every_category() {
        let context = category_context();
        for category in Category::all() {
            assert!(context.contains(category.as_str()));
        }
        assert!(context.contains("冥想"));
    }

    #[test]
    fn period_parses_from_cli_values() {
        assert_eq!("week".parse::<Period>(), Ok(Period::Week));
        assert_eq!("Quarter".parse::<Period>(), Ok(Period::Quarter));
        assert!("year".parse::<Period>().is_err());
        assert_eq!(Period::Quarter.next(), Period::Week);
    }

    #[test]
    fn short_id_handles_short_ids() {
        let entry: TimeEntry = serde_json::from_str(
            r#"{"id":"abc","task":"t","activity":"学习","category":"INVESTMENT",
                "durationMinutes":5,"startTime":"2025-01-01T00:00:00Z",
                "endTime":"2025-01-01T00:05:00Z","timestamp":1735689600000,
                "dateStr":"2025-01-01"}"#,
        )
        .unwrap();
        assert_eq!(entry.short_id(), "abc");
        assert!(!entry.is_synced());
        assert!(entry.keywords().is_empty());
    }
}
