use clap::Parser;
use crossterm::{
    event::{
        self, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::{Backend, CrosstermBackend},
};
use std::io;
use tracing::{error, info, level_filters::LevelFilter};

mod actions;
mod app;
mod cli;
mod config;
mod goals;
mod input;
mod intake;
mod integrations;
mod logging;
mod models;
mod runtime;
mod stats;
mod storage;
mod sync;
mod ui;

use app::App;
use cli::Args;
use config::Config;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load();

    let log_level = args.log.then_some(LevelFilter::TRACE);
    if let Err(err) = logging::enable_logging(&config.data.data_dir, log_level, args.log) {
        eprintln!("logging disabled: {err}");
    }

    match args.command {
        Some(command) => cli::run_command(&config, command).inspect_err(|e| {
            error!("command failed: {e:?}");
        }),
        None => run_dashboard(config),
    }
}

fn run_dashboard(config: Config) -> anyhow::Result<()> {
    let mut app = App::new(config)?;
    info!(entries = app.store.len(), "starting dashboard");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    // Unsupported on some terminals (e.g. legacy Windows console); only
    // needed to tell Shift+Enter from Enter.
    let _ = execute!(
        stdout,
        PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
    );

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    let _ = execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags);
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        error!(error = %err, "dashboard terminated");
        eprintln!("{err:?}");
    }

    Ok(())
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        runtime::tick(app);

        terminal.draw(|f| ui::ui(f, app))?;

        if event::poll(std::time::Duration::from_millis(200))? {
            let event = event::read()?;
            input::handle_event(app, event);
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
