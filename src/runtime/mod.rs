use crate::{app::App, intake::IntakeOutcome, models::InputMode, sync::SyncOutcome};
use chrono::Local;
use std::sync::mpsc::TryRecvError;
use tracing::error;

pub fn tick(app: &mut App) {
    handle_intake(app);
    handle_sync(app);
    handle_report(app);

    if let Some(expiry) = app.toast_expiry
        && Local::now() >= expiry
    {
        app.toast_expiry = None;
        app.toast_message = None;
    }
}

fn handle_intake(app: &mut App) {
    let result = {
        let Some(receiver) = app.intake_receiver.as_ref() else {
            return;
        };
        receiver.try_recv()
    };

    match result {
        Ok(outcome) => {
            app.intake_receiver = None;
            apply_intake(app, outcome);
        }
        Err(TryRecvError::Empty) => {}
        Err(TryRecvError::Disconnected) => {
            app.intake_receiver = None;
            app.pending_input = None;
            app.notify_failure("Analysis failed", "Analysis stopped unexpectedly.");
        }
    }
}

fn apply_intake(app: &mut App, outcome: IntakeOutcome) {
    let input = app.pending_input.take();
    match outcome {
        Ok(entries) if entries.is_empty() => {
            app.notify("Nothing logged", "No activities recognized.")
        }
        Ok(entries) => {
            let matched = entries.iter().filter(|e| e.goal_id.is_some()).count();
            match app.store.append(entries) {
                Ok(added) => {
                    app.refresh();
                    app.entries_state.select(Some(0));
                    let body = if matched > 0 {
                        format!("Added {added} entries ({matched} linked to goals).")
                    } else {
                        format!("Added {added} entries.")
                    };
                    app.notify("Entries added", body);
                }
                Err(err) => {
                    error!(error = %err, "failed to store entries");
                    app.notify_failure("Save failed", format!("Failed to save entries: {err}"));
                }
            }
        }
        Err(message) => {
            // Give the text back so it can be fixed and resubmitted.
            if let Some(input) = input {
                app.transition_to(InputMode::Composing);
                app.textarea.insert_str(input);
            }
            app.notify_failure("Analysis failed", message);
        }
    }
}

fn handle_sync(app: &mut App) {
    let result = {
        let Some(receiver) = app.sync_receiver.as_ref() else {
            return;
        };
        receiver.try_recv()
    };

    match result {
        Ok(outcome) => {
            app.sync_receiver = None;
            apply_sync(app, outcome);
        }
        Err(TryRecvError::Empty) => {}
        Err(TryRecvError::Disconnected) => {
            app.sync_receiver = None;
            app.notify_failure("Notion sync", "Sync stopped unexpectedly.");
        }
    }
}

/// Commits page ids on the UI thread, the only writer of the store.
fn apply_sync(app: &mut App, outcome: SyncOutcome) {
    if let Err(err) = app.store.commit_sync(outcome.patches()) {
        error!(error = %err, "failed to save sync results");
        app.notify_failure(
            "Notion sync",
            format!("{}\n\nSaving page ids failed: {err}", outcome.details()),
        );
        return;
    }
    app.refresh();
    if outcome.has_failures() {
        app.notify_failure("Notion sync", outcome.details());
    } else {
        app.notify("Notion sync", outcome.details());
    }
}

fn handle_report(app: &mut App) {
    let result = {
        let Some(receiver) = app.report_receiver.as_ref() else {
            return;
        };
        receiver.try_recv()
    };

    match result {
        Ok(Ok(report)) => {
            app.report_receiver = None;
            app.report_text = Some(report);
            app.report_scroll = 0;
            if !app.show_report_popup {
                app.toast("Report ready. Press r to open it.");
            }
        }
        Ok(Err(message)) => {
            app.report_receiver = None;
            app.show_report_popup = false;
            app.notify_failure("Report failed", message);
        }
        Err(TryRecvError::Empty) => {}
        Err(TryRecvError::Disconnected) => {
            app.report_receiver = None;
            app.show_report_popup = false;
            app.notify_failure("Report failed", "Report stopped unexpectedly.");
        }
    }
}
