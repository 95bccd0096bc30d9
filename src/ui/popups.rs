use chrono::Local;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, BorderType, Borders, Clear, Paragraph, Wrap},
};

use super::components::{ACCENT, BORDER, BORDER_ACTIVE, DANGER, MUTED, centered_rect, wrap_lines};
use crate::app::{App, Notice};

fn popup_block(title: &str, color: ratatui::style::Color) -> Block<'_> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(color))
}

/// Clears `area` and draws the frame, returning the inner area.
fn open_popup(f: &mut Frame, area: Rect, block: Block) -> Rect {
    let inner = block.inner(area);
    f.render_widget(Clear, area);
    f.render_widget(block, area);
    inner
}

pub fn render_composer_popup(f: &mut Frame, app: &App) {
    let area = centered_rect(70, 35, f.area());
    let inner = open_popup(
        f,
        area,
        popup_block(" What did you do? ", BORDER_ACTIVE),
    );

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(inner);

    f.render_widget(&app.textarea, chunks[0]);
    let footer = Paragraph::new("Enter submit · Shift+Enter newline · Esc cancel")
        .style(Style::default().fg(MUTED));
    f.render_widget(footer, chunks[1]);
}

pub fn render_busy_popup(f: &mut Frame, title: &str, detail: &str) {
    let area = centered_rect(60, 25, f.area());
    let inner = open_popup(f, area, popup_block(title, BORDER));

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(2), Constraint::Min(1)])
        .split(inner);

    let heading = Line::from(vec![
        Span::styled(loading_spinner(), Style::default().fg(ACCENT)),
        Span::raw(" "),
        Span::raw("Extracting activities and matching goals..."),
    ]);
    f.render_widget(Paragraph::new(heading), chunks[0]);
    f.render_widget(
        Paragraph::new(detail.to_string())
            .style(Style::default().fg(MUTED))
            .wrap(Wrap { trim: true }),
        chunks[1],
    );
}

pub fn render_report_popup(f: &mut Frame, app: &App) {
    let title = format!(" AI Report · {} ", app.period);
    let area = centered_rect(85, 80, f.area());
    let inner = open_popup(f, area, popup_block(&title, BORDER_ACTIVE));

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(inner);

    let Some(report) = app.report_text.as_deref() else {
        let waiting = Line::from(vec![
            Span::styled(loading_spinner(), Style::default().fg(ACCENT)),
            Span::raw(format!(
                " Analyzing the last {} days...",
                app.period.days()
            )),
        ]);
        f.render_widget(Paragraph::new(waiting), chunks[0]);
        f.render_widget(
            Paragraph::new("Esc hide").style(Style::default().fg(MUTED)),
            chunks[1],
        );
        return;
    };

    let width = chunks[0].width.saturating_sub(1) as usize;
    let lines: Vec<Line> = wrap_lines(report, width)
        .into_iter()
        .map(|line| {
            if line.starts_with('#') {
                Line::from(Span::styled(
                    line.trim_start_matches('#').trim().to_string(),
                    Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
                ))
            } else {
                Line::from(line)
            }
        })
        .collect();

    let max_scroll = lines.len().saturating_sub(chunks[0].height as usize) as u16;
    let scroll = app.report_scroll.min(max_scroll);
    f.render_widget(
        Paragraph::new(Text::from(lines)).scroll((scroll, 0)),
        chunks[0],
    );
    f.render_widget(
        Paragraph::new("Esc close · j/k scroll · r regenerate · p next period")
            .style(Style::default().fg(MUTED)),
        chunks[1],
    );
}

pub fn render_delete_popup(f: &mut Frame, app: &App) {
    let Some(entry) = app.selected_entry() else {
        return;
    };
    let mut body = vec![
        Line::from(format!("Delete \"{}\"?", entry.task)),
        Line::from(""),
    ];
    if entry.is_synced() {
        body.push(Line::from(Span::styled(
            "The Notion page stays; only the local entry is removed.",
            Style::default().fg(MUTED),
        )));
    }
    body.push(Line::from(Span::styled(
        "y confirm · n/Esc cancel",
        Style::default().fg(MUTED),
    )));
    render_confirm(f, " Delete entry ", body);
}

pub fn render_clear_popup(f: &mut Frame, app: &App) {
    let body = vec![
        Line::from(format!(
            "Delete all {} local entries? This cannot be undone.",
            app.store.len()
        )),
        Line::from(""),
        Line::from(Span::styled(
            "y confirm · n/Esc cancel",
            Style::default().fg(MUTED),
        )),
    ];
    render_confirm(f, " Clear all ", body);
}

fn render_confirm(f: &mut Frame, title: &str, body: Vec<Line>) {
    let area = centered_rect(50, 25, f.area());
    let inner = open_popup(f, area, popup_block(title, DANGER));
    f.render_widget(
        Paragraph::new(body)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true }),
        inner,
    );
}

pub fn render_notice_popup(f: &mut Frame, notice: &Notice) {
    let title = format!(" {} ", notice.title);
    let color = if notice.failed { DANGER } else { BORDER_ACTIVE };
    let area = centered_rect(70, 50, f.area());
    let inner = open_popup(f, area, popup_block(&title, color));

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(inner);

    let lines: Vec<Line> = wrap_lines(&notice.body, chunks[0].width as usize)
        .into_iter()
        .map(Line::from)
        .collect();
    f.render_widget(Paragraph::new(Text::from(lines)), chunks[0]);
    f.render_widget(
        Paragraph::new("Enter/Esc dismiss").style(Style::default().fg(MUTED)),
        chunks[1],
    );
}

pub fn render_help_popup(f: &mut Frame, app: &App) {
    let keys = &app.config.keybindings;
    let rows = [
        (&keys.compose, "describe what you did"),
        (&keys.down, "next entry"),
        (&keys.up, "previous entry"),
        (&keys.delete, "delete selected entry"),
        (&keys.clear_all, "delete all entries"),
        (&keys.sync, "sync unsynced entries to Notion"),
        (&keys.report, "AI report for the selected period"),
        (&keys.cycle_period, "switch period (week/month/quarter)"),
        (&keys.quit, "quit"),
    ];

    let lines: Vec<Line> = rows
        .iter()
        .map(|(binding, description)| {
            Line::from(vec![
                Span::styled(
                    format!("{:<14}", binding.join(", ")),
                    Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
                ),
                Span::raw(*description),
            ])
        })
        .collect();

    let area = centered_rect(60, 50, f.area());
    let inner = open_popup(f, area, popup_block(" Help ", BORDER));
    f.render_widget(Paragraph::new(lines), inner);
}

fn loading_spinner() -> &'static str {
    const FRAMES: [&str; 4] = ["-", "\\", "|", "/"];
    let idx = (Local::now().timestamp_subsec_millis() / 250) as usize % FRAMES.len();
    FRAMES[idx]
}
