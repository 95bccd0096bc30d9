use crate::{actions, app::App, config::key_match};
use crossterm::event::{KeyCode, KeyEvent};

pub fn handle_popup_events(app: &mut App, key: KeyEvent) -> bool {
    if app.notice.is_some() {
        let bindings = &app.config.keybindings;
        if key_match(&key, &bindings.submit)
            || key_match(&key, &bindings.cancel)
            || key_match(&key, &bindings.confirm)
        {
            app.notice = None;
        }
        return true;
    }
    if app.show_help_popup {
        if key.code == KeyCode::Esc || key_match(&key, &app.config.keybindings.help) {
            app.show_help_popup = false;
        }
        return true;
    }
    if app.show_delete_popup {
        handle_confirm(app, key, actions::delete_selected, |app| {
            app.show_delete_popup = false
        });
        return true;
    }
    if app.show_clear_popup {
        handle_confirm(app, key, actions::clear_all, |app| app.show_clear_popup = false);
        return true;
    }
    if app.show_report_popup {
        handle_report_popup(app, key);
        return true;
    }
    false
}

fn handle_confirm(app: &mut App, key: KeyEvent, accept: fn(&mut App), dismiss: fn(&mut App)) {
    if key_match(&key, &app.config.keybindings.confirm) {
        accept(app);
    } else if key_match(&key, &app.config.keybindings.cancel)
        || matches!(key.code, KeyCode::Char('n') | KeyCode::Char('N'))
    {
        dismiss(app);
    }
}

fn handle_report_popup(app: &mut App, key: KeyEvent) {
    let bindings = &app.config.keybindings;
    if key_match(&key, &bindings.cancel) || key_match(&key, &bindings.quit) {
        // Hiding keeps a running request alive; its result toasts when done.
        app.show_report_popup = false;
    } else if key_match(&key, &bindings.down) {
        app.report_scroll = app.report_scroll.saturating_add(1);
    } else if key_match(&key, &bindings.up) {
        app.report_scroll = app.report_scroll.saturating_sub(1);
    } else if key.code == KeyCode::PageDown {
        app.report_scroll = app.report_scroll.saturating_add(10);
    } else if key.code == KeyCode::PageUp {
        app.report_scroll = app.report_scroll.saturating_sub(10);
    } else if key_match(&key, &bindings.report) && !app.is_reporting() {
        actions::generate_report(app);
    } else if key_match(&key, &bindings.cycle_period) && !app.is_reporting() {
        actions::cycle_period(app);
        actions::generate_report(app);
    }
}
