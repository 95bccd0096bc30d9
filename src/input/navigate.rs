use crate::{actions, app::App, config::key_match, models::InputMode};
use crossterm::event::KeyEvent;

pub fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    let bindings = &app.config.keybindings;
    if key_match(&key, &bindings.quit) {
        app.quit();
    } else if key_match(&key, &bindings.help) {
        app.show_help_popup = true;
    } else if key_match(&key, &bindings.compose) {
        if app.is_extracting() {
            app.toast("Still analyzing the previous input...");
        } else {
            app.transition_to(InputMode::Composing);
        }
    } else if key_match(&key, &bindings.down) {
        app.select_next();
    } else if key_match(&key, &bindings.up) {
        app.select_prev();
    } else if key_match(&key, &bindings.clear_all) {
        actions::request_clear(app);
    } else if key_match(&key, &bindings.delete) {
        actions::request_delete(app);
    } else if key_match(&key, &bindings.sync) {
        actions::start_sync(app);
    } else if key_match(&key, &bindings.report) {
        actions::generate_report(app);
    } else if key_match(&key, &bindings.cycle_period) {
        actions::cycle_period(app);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DataConfig};
    use crate::storage::tests::{sample_entry, temp_data_dir};
    use crossterm::event::{KeyCode, KeyModifiers};

    fn app_with_entry() -> App<'static> {
        let config = Config {
            data: DataConfig {
                data_dir: temp_data_dir(),
            },
            ..Config::default()
        };
        let mut app = App::new(config).unwrap();
        app.store.append(vec![sample_entry("a", "one")]).unwrap();
        app.refresh();
        app
    }

    #[test]
    fn lowercase_c_does_not_ask_to_clear() {
        let mut app = app_with_entry();
        handle_normal_mode(&mut app, KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE));
        assert!(!app.show_clear_popup);

        handle_normal_mode(&mut app, KeyEvent::new(KeyCode::Char('C'), KeyModifiers::SHIFT));
        assert!(app.show_clear_popup);
        assert_eq!(app.store.len(), 1);
    }
}
