use crate::{
    app::App,
    integrations::gemini,
    intake,
    models::InputMode,
    stats::entries_in_period,
    sync,
};
use chrono::Utc;
use tracing::{error, info};

pub fn submit_composer(app: &mut App) {
    let input = app.textarea.lines().join("\n").trim().to_string();
    if input.is_empty() {
        app.toast("Nothing to log.");
        return;
    }
    if app.is_extracting() {
        app.toast("Still analyzing the previous input...");
        return;
    }
    if app.config.gemini.resolve_api_key().is_empty() {
        app.toast("Set gemini.api_key in config.toml or GEMINI_API_KEY.");
        return;
    }

    let receiver = intake::spawn_prepare_entries(
        app.config.gemini.clone(),
        app.notion.clone(),
        app.config.notion.clone(),
        input.clone(),
    );
    app.intake_receiver = Some(receiver);
    app.pending_input = Some(input);
    app.transition_to(InputMode::Navigate);
}

pub fn start_sync(app: &mut App) {
    if app.is_syncing() {
        app.toast("Sync already running.");
        return;
    }
    let missing = app.notion.missing_sync_fields();
    if !missing.is_empty() {
        app.toast(format!(
            "Notion not configured (missing {}). Run `lifestream notion set`.",
            missing.join(", ")
        ));
        return;
    }
    let unsynced = app.store.unsynced_count();
    if unsynced == 0 {
        app.toast("Everything is already synced.");
        return;
    }

    info!(unsynced, "starting sync from dashboard");
    app.sync_receiver = Some(sync::spawn_sync(
        app.store.entries().to_vec(),
        app.notion.clone(),
        app.config.notion.clone(),
        app.config.sync.delay(),
    ));
    app.toast(format!("Syncing {unsynced} entries to Notion..."));
}

pub fn request_delete(app: &mut App) {
    if app.selected_entry().is_some() {
        app.show_delete_popup = true;
    } else {
        app.toast("No entry selected.");
    }
}

pub fn delete_selected(app: &mut App) {
    app.show_delete_popup = false;
    let Some(entry) = app.selected_entry() else {
        return;
    };
    let (id, task) = (entry.id.clone(), entry.task.clone());
    match app.store.delete(&id) {
        Ok(_) => {
            app.refresh();
            app.toast(format!("Deleted \"{task}\"."));
        }
        Err(err) => {
            error!(error = %err, "failed to delete entry");
            app.toast("Failed to delete entry.");
        }
    }
}

pub fn request_clear(app: &mut App) {
    if app.store.is_empty() {
        app.toast("Nothing to clear.");
    } else {
        app.show_clear_popup = true;
    }
}

pub fn clear_all(app: &mut App) {
    app.show_clear_popup = false;
    match app.store.clear() {
        Ok(()) => {
            app.refresh();
            app.toast("All entries deleted.");
        }
        Err(err) => {
            error!(error = %err, "failed to clear entries");
            app.toast("Failed to clear entries.");
        }
    }
}

pub fn cycle_period(app: &mut App) {
    app.period = app.period.next();
    app.toast(format!("Report period: {}", app.period));
}

pub fn generate_report(app: &mut App) {
    if app.is_reporting() {
        app.show_report_popup = true;
        return;
    }
    let entries = entries_in_period(app.store.entries(), app.period, Utc::now());
    if entries.is_empty() {
        app.toast(format!("No entries in the last {} days.", app.period.days()));
        return;
    }
    if app.config.gemini.resolve_api_key().is_empty() {
        app.toast("Set gemini.api_key in config.toml or GEMINI_API_KEY.");
        return;
    }

    app.report_text = None;
    app.report_scroll = 0;
    app.show_report_popup = true;
    app.report_receiver = Some(gemini::spawn_report(
        app.config.gemini.clone(),
        entries,
        app.period,
    ));
}
