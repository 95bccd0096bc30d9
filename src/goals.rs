use crate::config::NotionConfig;
use crate::integrations::notion::GoalSource;
use crate::models::{Goal, GoalMatch, GoalStatus, TimeEntry};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

/// Fetches goals for matching. Failures degrade to an empty list.
pub fn fetch_active_goals<S: GoalSource + ?Sized>(source: &S, reference: NaiveDate) -> Vec<Goal> {
    match source.active_goals(reference) {
        Ok(mut goals) => {
            goals.retain(|goal| goal.status != GoalStatus::Completed);
            goals
        }
        Err(err) => {
            warn!(error = %err, %reference, "failed to fetch goals, continuing without goal matching");
            Vec::new()
        }
    }
}

/// Picks the goal whose title contains the most entry keywords.
///
/// Matching is case-insensitive substring containment. Only a strictly
/// higher score replaces the current best, so the earliest goal wins ties.
pub fn match_goal(keywords: &[String], goals: &[Goal]) -> Option<GoalMatch> {
    let keywords: Vec<String> = keywords
        .iter()
        .map(|keyword| keyword.trim().to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .collect();
    if keywords.is_empty() || goals.is_empty() {
        return None;
    }

    let mut best: Option<(&Goal, usize)> = None;
    for goal in goals {
        let title = goal.title.to_lowercase();
        let score = keywords
            .iter()
            .filter(|keyword| title.contains(keyword.as_str()))
            .count();
        if score > 0 && best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((goal, score));
        }
    }

    best.map(|(goal, _)| GoalMatch {
        goal_id: goal.id.clone(),
        goal_title: goal.title.clone(),
    })
}

/// Attaches a best-matching goal to each entry of a freshly extracted batch.
///
/// The batch keeps its size and order. Without a goals database, or for an
/// empty batch, nothing is fetched and the batch is returned as is.
pub fn enrich_entries<S: GoalSource + ?Sized>(
    entries: Vec<TimeEntry>,
    notion: &NotionConfig,
    source: &S,
) -> Vec<TimeEntry> {
    if !notion.has_goals_database() || entries.is_empty() {
        return entries;
    }

    // Fixed-width dates, so the minimum is also the earliest day.
    let Some(earliest) = entries.iter().map(|entry| entry.date_str).min() else {
        return entries;
    };

    let goals = fetch_active_goals(source, earliest);
    if goals.is_empty() {
        info!("no active goals found");
        return entries;
    }
    debug!(count = goals.len(), "found active goals");

    entries
        .into_iter()
        .map(|mut entry| {
            if entry.goal_id.is_some() {
                return entry;
            }
            if let Some(matched) = match_goal(entry.keywords(), &goals) {
                info!(task = %entry.task, goal = %matched.goal_title, "matched entry to goal");
                entry.goal_id = Some(matched.goal_id);
                entry.goal_title = Some(matched.goal_title);
            }
            entry
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::notion::NotionError;
    use crate::storage::tests::sample_entry;
    use std::cell::RefCell;

    struct FakeGoals {
        result: RefCell<Option<Result<Vec<Goal>, NotionError>>>,
        calls: RefCell<Vec<NaiveDate>>,
    }

    impl FakeGoals {
        fn returning(goals: Vec<Goal>) -> Self {
            Self {
                result: RefCell::new(Some(Ok(goals))),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn failing(err: NotionError) -> Self {
            Self {
                result: RefCell::new(Some(Err(err))),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl GoalSource for FakeGoals {
        fn active_goals(&self, on_or_after: NaiveDate) -> Result<Vec<Goal>, NotionError> {
            self.calls.borrow_mut().push(on_or_after);
            self.result
                .borrow_mut()
                .take()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn goals_config() -> NotionConfig {
        NotionConfig {
            api_key: "secret".to_string(),
            records_database_id: "records".to_string(),
            goals_database_id: "goals".to_string(),
            proxy_url: None,
        }
    }

    fn entry_with(id: &str, date: &str, words: &[&str]) -> TimeEntry {
        let mut entry = sample_entry(id, id);
        entry.date_str = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        entry.keywords = Some(keywords(words));
        entry
    }

    #[test]
    fn highest_overlap_wins() {
        let goals = vec![Goal::new("g1", "学习Rust编程"), Goal::new("g2", "学习英语")];
        let matched = match_goal(&keywords(&["学习", "编程"]), &goals).expect("match");
        assert_eq!(matched.goal_id, "g1");
        assert_eq!(matched.goal_title, "学习Rust编程");
    }

    #[test]
    fn later_goal_with_higher_score_replaces_earlier() {
        let goals = vec![Goal::new("g1", "学习英语"), Goal::new("g2", "学习Rust编程")];
        let matched = match_goal(&keywords(&["学习", "编程"]), &goals).expect("match");
        assert_eq!(matched.goal_id, "g2");
    }

    #[test]
    fn ties_keep_the_earlier_goal() {
        let goals = vec![
            Goal::new("g1", "Read more books"),
            Goal::new("g2", "Read research papers"),
        ];
        let matched = match_goal(&keywords(&["read"]), &goals).expect("match");
        assert_eq!(matched.goal_id, "g1");
    }

    #[test]
    fn matching_ignores_case() {
        let goals = vec![Goal::new("g1", "Ship the RUST rewrite")];
        assert!(match_goal(&keywords(&["rust"]), &goals).is_some());
    }

    #[test]
    fn stored_keywords_are_trimmed_before_matching() {
        let goals = vec![Goal::new("g2", "学习英语"), Goal::new("g1", "学习Rust编程")];
        // A blank keyword would otherwise score a point for every title.
        let matched = match_goal(&keywords(&["", " 编程 "]), &goals).expect("match");
        assert_eq!(matched.goal_id, "g1");
    }

    #[test]
    fn empty_keywords_never_match() {
        let goals = vec![Goal::new("g1", "学习Rust编程")];
        assert_eq!(match_goal(&[], &goals), None);
        assert_eq!(match_goal(&keywords(&["", "  "]), &goals), None);
    }

    #[test]
    fn zero_score_is_no_match() {
        let goals = vec![Goal::new("g1", "学习英语")];
        assert_eq!(match_goal(&keywords(&["跑步"]), &goals), None);
        assert_eq!(match_goal(&keywords(&["跑步"]), &[]), None);
    }

    #[test]
    fn enrichment_without_goals_database_makes_no_call() {
        let source = FakeGoals::returning(vec![Goal::new("g1", "学习Rust编程")]);
        let notion = NotionConfig {
            goals_database_id: String::new(),
            ..goals_config()
        };
        let batch = vec![entry_with("a", "2025-12-02", &["学习"])];

        let enriched = enrich_entries(batch.clone(), &notion, &source);
        assert_eq!(enriched, batch);
        assert!(source.calls.borrow().is_empty());
    }

    #[test]
    fn enrichment_of_empty_batch_makes_no_call() {
        let source = FakeGoals::returning(vec![Goal::new("g1", "x")]);
        assert!(enrich_entries(Vec::new(), &goals_config(), &source).is_empty());
        assert!(source.calls.borrow().is_empty());
    }

    #[test]
    fn enrichment_queries_once_with_earliest_date() {
        let source = FakeGoals::returning(vec![
            Goal::new("g1", "学习Rust编程"),
            Goal::new("g2", "每周跑步三次"),
        ]);
        let batch = vec![
            entry_with("a", "2025-12-03", &["学习", "编程"]),
            entry_with("b", "2025-11-30", &["跑步"]),
            entry_with("c", "2025-12-01", &["编程"]),
            entry_with("d", "2025-12-02", &["吃饭"]),
        ];

        let enriched = enrich_entries(batch, &goals_config(), &source);
        assert_eq!(
            *source.calls.borrow(),
            vec![NaiveDate::from_ymd_opt(2025, 11, 30).unwrap()]
        );

        let ids: Vec<&str> = enriched.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(enriched[0].goal_id.as_deref(), Some("g1"));
        assert_eq!(enriched[1].goal_id.as_deref(), Some("g2"));
        // Goals are not consumed by earlier matches.
        assert_eq!(enriched[2].goal_id.as_deref(), Some("g1"));
        assert_eq!(enriched[2].goal_title.as_deref(), Some("学习Rust编程"));
        assert_eq!(enriched[3].goal_id, None);
    }

    #[test]
    fn lookup_failure_returns_batch_unchanged() {
        let source = FakeGoals::failing(NotionError::Transport("connection refused".to_string()));
        let batch = vec![entry_with("a", "2025-12-02", &["学习"])];

        let enriched = enrich_entries(batch.clone(), &goals_config(), &source);
        assert_eq!(enriched, batch);
        assert_eq!(source.calls.borrow().len(), 1);
    }

    #[test]
    fn completed_goals_are_never_matched() {
        let mut done = Goal::new("g1", "学习Rust编程");
        done.status = GoalStatus::Completed;
        let source = FakeGoals::returning(vec![done, Goal::new("g2", "学习英语")]);
        let batch = vec![entry_with("a", "2025-12-02", &["学习", "编程"])];

        let enriched = enrich_entries(batch, &goals_config(), &source);
        assert_eq!(enriched[0].goal_id.as_deref(), Some("g2"));
    }

    #[test]
    fn existing_goal_is_not_replaced() {
        let source = FakeGoals::returning(vec![Goal::new("g2", "学习Rust编程")]);
        let mut entry = entry_with("a", "2025-12-02", &["学习"]);
        entry.goal_id = Some("g1".to_string());
        entry.goal_title = Some("earlier".to_string());

        let enriched = enrich_entries(vec![entry], &goals_config(), &source);
        assert_eq!(enriched[0].goal_id.as_deref(), Some("g1"));
    }
}
