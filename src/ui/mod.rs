use chrono::Local;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Bar, BarChart, BarGroup, Block, BorderType, Borders, Gauge, List, ListItem, Paragraph},
};
use unicode_width::UnicodeWidthStr;

use crate::app::App;
use crate::models::{Category, InputMode, TimeEntry};
use crate::stats::format_duration;

pub mod components;
pub mod popups;

use components::{
    ACCENT, BORDER, BORDER_ACTIVE, MUTED, PENDING, SYNCED, category_color, truncate,
};
use popups::{
    render_busy_popup, render_clear_popup, render_composer_popup, render_delete_popup,
    render_help_popup, render_notice_popup, render_report_popup,
};

pub fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(f.area());

    render_header(f, chunks[0], app);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[1]);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(4)])
        .split(body[0]);
    render_categories(f, left[0], app);
    render_top_activities(f, left[1], app);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(4), Constraint::Length(7)])
        .split(body[1]);
    render_entries(f, right[0], app);
    render_detail(f, right[1], app);

    render_status_bar(f, chunks[2], app);

    if app.input_mode == InputMode::Composing {
        render_composer_popup(f, app);
    } else if app.is_extracting() {
        render_busy_popup(f, " Analyzing ", app.pending_input.as_deref().unwrap_or(""));
    }
    if app.show_report_popup {
        render_report_popup(f, app);
    }
    if app.show_delete_popup {
        render_delete_popup(f, app);
    }
    if app.show_clear_popup {
        render_clear_popup(f, app);
    }
    if app.show_help_popup {
        render_help_popup(f, app);
    }
    if let Some(notice) = &app.notice {
        render_notice_popup(f, notice);
    }
}

fn panel(title: &str) -> Block<'_> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER))
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let summary = &app.summary;
    let unsynced_style = if summary.unsynced_count > 0 {
        Style::default().fg(PENDING)
    } else {
        Style::default().fg(SYNCED)
    };
    let line = Line::from(vec![
        Span::styled(
            " LifeStream ",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(
            format!(
                "{} logged · {} entries",
                format_duration(summary.total_minutes),
                summary.entry_count
            ),
            Style::default().fg(MUTED),
        ),
        Span::raw(" · "),
        Span::styled(format!("{} unsynced", summary.unsynced_count), unsynced_style),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn render_categories(f: &mut Frame, area: Rect, app: &App) {
    let block = panel(" Categories ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(2); 3])
        .split(inner);

    for (row, category) in rows.iter().zip(Category::all()) {
        let minutes = app.summary.category_minutes(category);
        let percent = app.summary.category_percent(category);
        let def = category.definition();
        let parts = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Length(1)])
            .split(*row);

        let title = Line::from(vec![
            Span::styled(
                def.label,
                Style::default()
                    .fg(category_color(category))
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("  {}", def.description), Style::default().fg(MUTED)),
        ]);
        f.render_widget(Paragraph::new(title), parts[0]);

        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(category_color(category)))
            .percent(percent.min(100) as u16)
            .label(format!("{} · {percent}%", format_duration(minutes)));
        f.render_widget(gauge, parts[1]);
    }
}

fn render_top_activities(f: &mut Frame, area: Rect, app: &App) {
    let limit = app.config.ui.top_activities.max(1);
    let block = panel(" Top Activities ");
    let top = app.summary.top_activities(limit);
    if top.is_empty() {
        let empty = Paragraph::new("No data yet.")
            .style(Style::default().fg(MUTED))
            .block(block);
        f.render_widget(empty, area);
        return;
    }

    let bars: Vec<Bar> = top
        .iter()
        .map(|activity| {
            Bar::default()
                .value(activity.minutes)
                .label(Line::from(activity.activity.clone()))
                .text_value(format_duration(activity.minutes))
                .style(Style::default().fg(category_color(activity.category)))
                .value_style(Style::default().fg(Color::Black).bg(category_color(activity.category)))
        })
        .collect();

    let chart = BarChart::default()
        .block(block)
        .direction(Direction::Horizontal)
        .bar_width(1)
        .bar_gap(0)
        .data(BarGroup::default().bars(&bars));
    f.render_widget(chart, area);
}

fn render_entries(f: &mut Frame, area: Rect, app: &mut App) {
    let title = format!(" Entries ({}) ", app.visible.len());
    let block = panel(&title).border_style(Style::default().fg(BORDER_ACTIVE));
    let inner_width = block.inner(area).width as usize;

    if app.visible.is_empty() {
        let hint = Paragraph::new("No entries yet. Press i to describe what you did.")
            .style(Style::default().fg(MUTED))
            .block(block);
        f.render_widget(hint, area);
        return;
    }

    let entries = app.store.entries();
    let items: Vec<ListItem> = app
        .visible
        .iter()
        .map(|&idx| ListItem::new(entry_line(&entries[idx], inner_width)))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("▶ ");
    f.render_stateful_widget(list, area, &mut app.entries_state);
}

fn entry_line(entry: &TimeEntry, width: usize) -> Line<'static> {
    let start = entry.start_time.with_timezone(&Local);
    let end = entry.end_time.with_timezone(&Local);
    let (mark, mark_color) = if entry.is_synced() {
        ("✓", SYNCED)
    } else {
        ("●", PENDING)
    };
    let prefix = format!(
        "{} {}-{} {:>6} ",
        start.format("%m-%d"),
        start.format("%H:%M"),
        end.format("%H:%M"),
        format_duration(u64::from(entry.duration_minutes))
    );
    let activity = format!("[{}] ", entry.activity);
    // 2 for the highlight symbol, 2 for the sync mark.
    let used = 4 + prefix.width() + activity.width();
    let task = truncate(&entry.task, width.saturating_sub(used));

    Line::from(vec![
        Span::styled(format!("{mark} "), Style::default().fg(mark_color)),
        Span::styled(prefix, Style::default().fg(MUTED)),
        Span::styled(activity, Style::default().fg(category_color(entry.category))),
        Span::raw(task),
    ])
}

fn render_detail(f: &mut Frame, area: Rect, app: &App) {
    let block = panel(" Detail ");
    let Some(entry) = app.selected_entry() else {
        f.render_widget(block, area);
        return;
    };

    let label = Style::default().fg(MUTED);
    let mut lines = vec![
        Line::from(vec![
            Span::styled("Task      ", label),
            Span::styled(
                entry.task.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::styled("Category  ", label),
            Span::styled(
                format!("{} / {}", entry.category.definition().label, entry.activity),
                Style::default().fg(category_color(entry.category)),
            ),
        ]),
        Line::from(vec![
            Span::styled("Goal      ", label),
            Span::raw(entry.goal_title.clone().unwrap_or_else(|| "-".to_string())),
        ]),
    ];
    let keywords = entry.keywords();
    if !keywords.is_empty() {
        lines.push(Line::from(vec![
            Span::styled("Keywords  ", label),
            Span::raw(keywords.join(", ")),
        ]));
    }
    lines.push(Line::from(vec![
        Span::styled("Notion    ", label),
        match entry.notion_page_id.as_deref() {
            Some(page) => Span::styled(page.to_string(), Style::default().fg(SYNCED)),
            None => Span::styled("not synced", Style::default().fg(PENDING)),
        },
    ]));

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    if area.height == 0 || area.width == 0 {
        return;
    }

    let mode_label = match app.input_mode {
        InputMode::Navigate => "NAV",
        InputMode::Composing => "INPUT",
    };
    let mut left_spans = vec![
        Span::styled(
            format!(" {mode_label} "),
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(" report: {} ", app.period),
            Style::default().fg(MUTED),
        ),
    ];
    if app.is_syncing() {
        left_spans.push(Span::styled(
            " syncing… ",
            Style::default().fg(PENDING).add_modifier(Modifier::BOLD),
        ));
    }

    let right_text = app
        .toast_message
        .clone()
        .unwrap_or_else(|| "i log · s sync · r report · ? help".to_string());
    let right_width = (right_text.width() as u16).min(area.width.saturating_sub(10));

    let status_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(right_width)])
        .split(area);

    f.render_widget(Paragraph::new(Line::from(left_spans)), status_chunks[0]);
    let right_style = if app.toast_message.is_some() {
        Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(MUTED)
    };
    let right = Paragraph::new(Span::styled(right_text, right_style)).alignment(Alignment::Right);
    f.render_widget(right, status_chunks[1]);
}
