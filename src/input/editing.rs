use crate::{actions, app::App, config::key_match, models::InputMode};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

pub fn handle_composing_mode(app: &mut App, key: KeyEvent) {
    if key_match(&key, &app.config.keybindings.submit) {
        actions::submit_composer(app);
        return;
    }
    if key_match(&key, &app.config.keybindings.cancel) {
        app.transition_to(InputMode::Navigate);
        return;
    }
    // Enter submits, so a modified Enter adds a line.
    if key.code == KeyCode::Enter
        && key
            .modifiers
            .intersects(KeyModifiers::SHIFT | KeyModifiers::ALT)
    {
        app.textarea.insert_newline();
        return;
    }
    app.textarea.input(key);
}
