pub(crate) mod editing;
pub(crate) mod navigate;
pub(crate) mod popups;

use crate::{app::App, models::InputMode};
use crossterm::event::{Event, KeyEventKind};

pub fn handle_event(app: &mut App, event: Event) {
    if let Event::Key(key) = event
        && key.kind == KeyEventKind::Press
    {
        if popups::handle_popup_events(app, key) {
            return;
        }
        match app.input_mode {
            InputMode::Navigate => navigate::handle_normal_mode(app, key),
            InputMode::Composing => editing::handle_composing_mode(app, key),
        }
    }
}
