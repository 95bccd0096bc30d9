use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use unicode_width::UnicodeWidthStr;

use crate::config::{Config, config_path, mask_secret};
use crate::integrations::gemini::GeminiClient;
use crate::integrations::notion::{GoalSource, NotionClient};
use crate::intake::prepare_entries;
use crate::models::{Category, Period, TimeEntry};
use crate::stats::{entries_in_period, format_duration, summarize};
use crate::storage::{self, EntryStore};
use crate::sync::{SyncOutcome, sync_store};

#[derive(Parser, Debug)]
#[command(name = "lifestream", version)]
#[command(
    about = "Log what you did in plain words, see where the time went, sync it to Notion",
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(long, global = true, help = "Mirror trace-level logs to stderr")]
    pub log: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Turn a free-text description into time entries and store them")]
    Log {
        #[arg(required = true, help = "What you did, e.g. \"9点到10点学习Rust\"")]
        text: Vec<String>,
    },
    #[command(about = "List stored entries")]
    List {
        #[arg(long, help = "Only entries of this day (YYYY-MM-DD)")]
        date: Option<NaiveDate>,
    },
    #[command(about = "Delete one entry by id or unique id prefix")]
    Delete { id: String },
    #[command(about = "Delete every local entry")]
    Clear {
        #[arg(long, help = "Skip the confirmation prompt")]
        yes: bool,
    },
    #[command(about = "Create Notion pages for entries that have none yet")]
    Sync,
    #[command(about = "Generate an AI analysis of recent entries")]
    Report {
        #[arg(long, short, default_value = "week", help = "week, month or quarter")]
        period: Period,
    },
    #[command(about = "Show time totals by category and activity")]
    Stats {
        #[arg(long, short, help = "Limit to week, month or quarter")]
        period: Option<Period>,
    },
    #[command(about = "List open goals from the Notion goals database")]
    Goals,
    #[command(about = "Show or change the Notion connection")]
    Notion {
        #[command(subcommand)]
        command: NotionCommand,
    },
    #[command(about = "Configuration file helpers")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum NotionCommand {
    #[command(about = "Print the current Notion settings with the key masked")]
    Show,
    #[command(about = "Update Notion settings; omitted flags keep their value")]
    Set {
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        records_db: Option<String>,
        #[arg(long)]
        goals_db: Option<String>,
        #[arg(long, help = "Relay address; pass an empty string to remove it")]
        proxy_url: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    #[command(about = "Print the config.toml location")]
    Path,
}

pub fn run_command(config: &Config, command: Commands) -> Result<()> {
    let data_dir = &config.data.data_dir;
    match command {
        Commands::Log { text } => log_entries(config, &text.join(" ")),
        Commands::List { date } => {
            let store = EntryStore::load(data_dir)?;
            let entries: Vec<&TimeEntry> = store
                .entries()
                .iter()
                .filter(|entry| date.is_none_or(|day| entry.date_str == day))
                .collect();
            if entries.is_empty() {
                println!("No entries.");
            } else {
                print_entries(&entries);
            }
            Ok(())
        }
        Commands::Delete { id } => {
            let mut store = EntryStore::load(data_dir)?;
            let Some(full_id) = store.resolve_id(&id).map(str::to_string) else {
                bail!("no entry matches '{id}' (or the prefix is ambiguous)");
            };
            store.delete(&full_id)?;
            println!("Deleted {full_id}.");
            Ok(())
        }
        Commands::Clear { yes } => {
            let mut store = EntryStore::load(data_dir)?;
            if store.is_empty() {
                println!("Nothing to clear.");
                return Ok(());
            }
            if !yes && !confirm(&format!("Delete all {} entries?", store.len()))? {
                println!("Aborted.");
                return Ok(());
            }
            store.clear()?;
            println!("All entries deleted.");
            Ok(())
        }
        Commands::Sync => {
            let notion = storage::effective_notion_config(data_dir)?;
            let mut store = EntryStore::load(data_dir)?;
            let client = NotionClient::new(&notion, &config.notion)?;
            let outcome = sync_store(&mut store, &notion, &client, config.sync.delay())?;
            println!("{}", outcome.details());
            ensure_synced(&outcome)
        }
        Commands::Report { period } => {
            let store = EntryStore::load(data_dir)?;
            let entries = entries_in_period(store.entries(), period, Utc::now());
            if entries.is_empty() {
                println!("No entries in the last {} days.", period.days());
                return Ok(());
            }
            let client = GeminiClient::from_config(&config.gemini)?;
            println!("Analyzing {} entries ({period})...", entries.len());
            let report = client.generate_report(&entries, period)?;
            println!();
            print_wrapped(&report);
            Ok(())
        }
        Commands::Stats { period } => {
            let store = EntryStore::load(data_dir)?;
            let entries = match period {
                Some(period) => entries_in_period(store.entries(), period, Utc::now()),
                None => store.entries().to_vec(),
            };
            print_stats(&entries, config.ui.top_activities);
            Ok(())
        }
        Commands::Goals => list_goals(config),
        Commands::Notion { command } => run_notion_command(config, command),
        Commands::Config {
            command: ConfigCommand::Path,
        } => {
            println!("{}", config_path().display());
            Ok(())
        }
    }
}

/// Turns an incomplete sync into an error so the exit status reflects it.
fn ensure_synced(outcome: &SyncOutcome) -> Result<()> {
    match outcome {
        SyncOutcome::Aborted { report, .. } => bail!(
            "sync aborted; {} entries left unsynced",
            report.failed + report.not_attempted
        ),
        SyncOutcome::Completed(report) if report.failed > 0 => {
            bail!("{} entries failed to sync", report.failed)
        }
        SyncOutcome::NotConfigured { .. } | SyncOutcome::Unavailable { .. } => {
            bail!("sync did not run")
        }
        _ => Ok(()),
    }
}

fn log_entries(config: &Config, text: &str) -> Result<()> {
    let data_dir = &config.data.data_dir;
    let notion = storage::effective_notion_config(data_dir)?;
    let entries = prepare_entries(&config.gemini, &notion, &config.notion, text, Local::now())?;
    if entries.is_empty() {
        println!("No activities recognized.");
        return Ok(());
    }

    let mut store = EntryStore::load(data_dir)?;
    let refs: Vec<&TimeEntry> = entries.iter().collect();
    print_entries(&refs);
    let added = store.append(entries)?;
    println!("Added {added} entries ({} waiting for sync).", store.unsynced_count());
    Ok(())
}

fn list_goals(config: &Config) -> Result<()> {
    let notion = storage::effective_notion_config(&config.data.data_dir)?;
    if !notion.has_goals_database() {
        bail!("no goals database configured; run `lifestream notion set --goals-db <id>`");
    }
    let client = NotionClient::new(&notion, &config.notion)?;
    let goals = client.active_goals(Local::now().date_naive())?;
    if goals.is_empty() {
        println!("No open goals.");
        return Ok(());
    }

    let title_width = goals.iter().map(|g| g.title.width()).max().unwrap_or(0).min(36);
    for goal in &goals {
        let deadline = goal
            .deadline
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        let mut extras = Vec::new();
        if let Some(priority) = goal.priority {
            extras.push(format!("{priority:?}"));
        }
        if let Some(kind) = goal.duration_type {
            extras.push(format!("{kind:?}"));
        }
        if let Some(progress) = goal.progress {
            extras.push(format!("progress {progress}"));
        }
        if let Some(hours) = goal.estimated_time {
            extras.push(format!("est. {hours}h"));
        }
        println!(
            "{}  {:<11}  due {deadline}  {}",
            pad(&goal.title, title_width),
            goal.status.as_str(),
            extras.join(" · ")
        );
    }
    Ok(())
}

fn run_notion_command(config: &Config, command: NotionCommand) -> Result<()> {
    let data_dir = &config.data.data_dir;
    match command {
        NotionCommand::Show => {
            let notion = storage::effective_notion_config(data_dir)?;
            println!("API key:           {}", mask_secret(&notion.api_key));
            println!("Records database:  {}", or_unset(&notion.records_database_id));
            println!("Goals database:    {}", or_unset(&notion.goals_database_id));
            println!("Proxy:             {}", notion.proxy().unwrap_or("(direct)"));
            let missing = notion.missing_sync_fields();
            if !missing.is_empty() {
                println!("Sync disabled until set: {}", missing.join(", "));
            }
            Ok(())
        }
        NotionCommand::Set {
            api_key,
            records_db,
            goals_db,
            proxy_url,
        } => {
            let mut notion = storage::load_notion_config(data_dir)?.unwrap_or_default();
            if let Some(key) = api_key {
                notion.api_key = key.trim().to_string();
            }
            if let Some(id) = records_db {
                notion.records_database_id = id.trim().to_string();
            }
            if let Some(id) = goals_db {
                notion.goals_database_id = id.trim().to_string();
            }
            if let Some(url) = proxy_url {
                let url = url.trim();
                notion.proxy_url = (!url.is_empty()).then(|| url.to_string());
            }
            storage::save_notion_config(data_dir, &notion)
                .with_context(|| format!("failed to save Notion settings in {data_dir:?}"))?;
            println!("Notion settings saved.");
            Ok(())
        }
    }
}

fn or_unset(value: &str) -> &str {
    if value.trim().is_empty() {
        "(not set)"
    } else {
        value
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_entries(entries: &[&TimeEntry]) {
    let task_width = entries
        .iter()
        .map(|entry| entry.task.width())
        .max()
        .unwrap_or(0)
        .min(40);

    for entry in entries {
        let start = entry.start_time.with_timezone(&Local);
        let end = entry.end_time.with_timezone(&Local);
        let sync_mark = if entry.is_synced() { "✓" } else { "·" };
        let goal = entry
            .goal_title
            .as_deref()
            .map(|title| format!("  → {title}"))
            .unwrap_or_default();
        println!(
            "{sync_mark} {id}  {date} {start}-{end}  {duration:>6}  {category}  {activity}  {task}{goal}",
            id = entry.short_id(),
            date = entry.date_str.format("%Y-%m-%d"),
            start = start.format("%H:%M"),
            end = end.format("%H:%M"),
            duration = format_duration(u64::from(entry.duration_minutes)),
            category = pad(entry.category.short_label(), 4),
            activity = pad(&entry.activity, 6),
            task = pad(&entry.task, task_width),
        );
    }
}

fn print_stats(entries: &[TimeEntry], top: usize) {
    let summary = summarize(entries);
    println!(
        "Total: {} across {} entries ({} unsynced)",
        format_duration(summary.total_minutes),
        summary.entry_count,
        summary.unsynced_count
    );
    println!();
    for category in Category::all() {
        println!(
            "  {}  {:>8}  {:>3}%",
            pad(category.definition().label, 18),
            format_duration(summary.category_minutes(category)),
            summary.category_percent(category)
        );
    }

    let top_activities = summary.top_activities(top);
    if top_activities.is_empty() {
        return;
    }
    println!();
    println!("Top activities:");
    let max = top_activities[0].minutes.max(1);
    for activity in top_activities {
        let bar = "█".repeat(((activity.minutes * 24) / max).max(1) as usize);
        println!(
            "  {}  {:>8}  {bar}",
            pad(&activity.activity, 8),
            format_duration(activity.minutes)
        );
    }
}

/// Pads by display width so CJK text lines up.
fn pad(text: &str, width: usize) -> String {
    let current = text.width();
    if current >= width {
        return text.to_string();
    }
    format!("{text}{}", " ".repeat(width - current))
}

fn print_wrapped(text: &str) {
    let width = terminal_width();
    for line in text.lines() {
        if line.trim().is_empty() {
            println!();
            continue;
        }
        for wrapped in textwrap::wrap(line, width) {
            println!("{wrapped}");
        }
    }
}

fn terminal_width() -> usize {
    crossterm::terminal::size()
        .map(|(cols, _)| cols as usize)
        .unwrap_or(100)
        .clamp(40, 120)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_uses_display_width() {
        assert_eq!(pad("学习", 6), "学习  ");
        assert_eq!(pad("read", 6), "read  ");
        assert_eq!(pad("toolongvalue", 4), "toolongvalue");
    }

    #[test]
    fn parses_subcommands() {
        let args = Args::try_parse_from(["lifestream", "report", "--period", "quarter"]).unwrap();
        assert!(matches!(
            args.command,
            Some(Commands::Report {
                period: Period::Quarter
            })
        ));

        let args = Args::try_parse_from(["lifestream", "log", "9点到10点", "学习Rust"]).unwrap();
        match args.command {
            Some(Commands::Log { text }) => assert_eq!(text.join(" "), "9点到10点 学习Rust"),
            other => panic!("unexpected {other:?}"),
        }

        let args = Args::try_parse_from(["lifestream"]).unwrap();
        assert!(args.command.is_none());

        let args = Args::try_parse_from(["lifestream", "list", "--date", "2025-12-02"]).unwrap();
        assert!(matches!(args.command, Some(Commands::List { date: Some(_) })));

        assert!(Args::try_parse_from(["lifestream", "report", "--period", "year"]).is_err());
    }

    #[test]
    fn incomplete_sync_is_an_error() {
        use crate::integrations::notion::NotionError;
        use crate::sync::SyncReport;

        let aborted = SyncOutcome::Aborted {
            report: SyncReport {
                succeeded: 1,
                failed: 1,
                not_attempted: 1,
                ..SyncReport::default()
            },
            error: NotionError::Transport("connection reset".to_string()),
        };
        let err = ensure_synced(&aborted).unwrap_err();
        assert!(err.to_string().contains("2 entries left"));

        let partial = SyncOutcome::Completed(SyncReport {
            succeeded: 2,
            failed: 1,
            ..SyncReport::default()
        });
        assert!(ensure_synced(&partial).is_err());
        assert!(ensure_synced(&SyncOutcome::NotConfigured { missing: vec!["api key"] }).is_err());

        let clean = SyncOutcome::Completed(SyncReport {
            succeeded: 3,
            ..SyncReport::default()
        });
        assert!(ensure_synced(&clean).is_ok());
        assert!(ensure_synced(&SyncOutcome::NothingToSync).is_ok());
    }

    #[test]
    fn notion_set_flags_parse() {
        let args = Args::try_parse_from([
            "lifestream",
            "notion",
            "set",
            "--records-db",
            "abc",
            "--proxy-url",
            "",
        ])
        .unwrap();
        match args.command {
            Some(Commands::Notion {
                command:
                    NotionCommand::Set {
                        records_db,
                        proxy_url,
                        api_key,
                        ..
                    },
            }) => {
                assert_eq!(records_db.as_deref(), Some("abc"));
                assert_eq!(proxy_url.as_deref(), Some(""));
                assert!(api_key.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
