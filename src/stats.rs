use crate::models::{Category, Period, TimeEntry};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Aggregated minutes for the dashboard and `lifestream stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub total_minutes: u64,
    pub entry_count: usize,
    pub unsynced_count: usize,
    /// In `Category::all()` order, zero totals included.
    pub by_category: Vec<(Category, u64)>,
    /// Sorted by minutes descending, then by first appearance.
    pub by_activity: Vec<ActivityTotal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityTotal {
    pub activity: String,
    pub category: Category,
    pub minutes: u64,
}

impl Summary {
    pub fn top_activities(&self, limit: usize) -> &[ActivityTotal] {
        &self.by_activity[..self.by_activity.len().min(limit)]
    }

    pub fn category_minutes(&self, category: Category) -> u64 {
        self.by_category
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, minutes)| *minutes)
            .unwrap_or(0)
    }

    /// Whole-number share of the total, 0 when nothing is logged.
    pub fn category_percent(&self, category: Category) -> u64 {
        if self.total_minutes == 0 {
            return 0;
        }
        (self.category_minutes(category) * 100 + self.total_minutes / 2) / self.total_minutes
    }
}

pub fn summarize(entries: &[TimeEntry]) -> Summary {
    let mut by_category: HashMap<Category, u64> = HashMap::new();
    let mut by_activity: Vec<ActivityTotal> = Vec::new();
    let mut activity_index: HashMap<&str, usize> = HashMap::new();
    let mut total_minutes = 0u64;

    for entry in entries {
        let minutes = u64::from(entry.duration_minutes);
        total_minutes += minutes;
        *by_category.entry(entry.category).or_default() += minutes;

        match activity_index.get(entry.activity.as_str()) {
            Some(&idx) => by_activity[idx].minutes += minutes,
            None => {
                activity_index.insert(entry.activity.as_str(), by_activity.len());
                by_activity.push(ActivityTotal {
                    activity: entry.activity.clone(),
                    category: entry.category,
                    minutes,
                });
            }
        }
    }

    // Stable sort keeps first-seen order among equal totals.
    by_activity.sort_by(|a, b| b.minutes.cmp(&a.minutes));

    Summary {
        total_minutes,
        entry_count: entries.len(),
        unsynced_count: entries.iter().filter(|entry| !entry.is_synced()).count(),
        by_category: Category::all()
            .into_iter()
            .map(|category| (category, by_category.get(&category).copied().unwrap_or(0)))
            .collect(),
        by_activity,
    }
}

/// Entries that started within the period ending at `now`.
pub fn entries_in_period(entries: &[TimeEntry], period: Period, now: DateTime<Utc>) -> Vec<TimeEntry> {
    let cutoff = (now - Duration::days(period.days())).timestamp_millis();
    entries
        .iter()
        .filter(|entry| entry.timestamp >= cutoff)
        .cloned()
        .collect()
}

/// `2h 5m`, `2h`, or `45m`.
pub fn format_duration(minutes: u64) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    match (hours, mins) {
        (0, _) => format!("{mins}m"),
        (_, 0) => format!("{hours}h"),
        _ => format!("{hours}h {mins}m"),
    }
}
