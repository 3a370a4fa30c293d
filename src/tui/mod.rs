//! Terminal front end: renders the virtualized feed with ratatui and turns
//! crossterm input into scroll actions

mod app;
mod events;
mod keys;
mod list_view;
mod styles;

pub use app::App;
pub use events::{Event, EventHandler};
pub use keys::{Action, KeyBinding, KeyMap};
pub use list_view::FeedView;
pub use styles::Theme;

use anyhow::Result;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io;
use std::sync::Arc;

use crate::config::Config;

pub type Backend = CrosstermBackend<io::Stdout>;
pub type Frame<'a> = ratatui::Frame<'a>;

/// Initialize the terminal for TUI mode
pub fn init_terminal() -> Result<Terminal<Backend>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// Restore the terminal to normal mode
pub fn restore_terminal(terminal: &mut Terminal<Backend>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Restore the terminal without a handle, e.g. from a panic hook
pub fn force_restore_terminal() -> Result<()> {
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture)?;
    Ok(())
}

/// Main TUI entry point
pub async fn run(config: &Config) -> Result<()> {
    let mut terminal = init_terminal()?;
    let mut event_handler = EventHandler::new(config.tick_rate());
    let source = Arc::new(config.data_source());
    let mut app = App::new(config, source, event_handler.sender());

    let result = run_app(&mut terminal, &mut app, &mut event_handler).await;

    restore_terminal(&mut terminal)?;
    result
}

/// Main application loop
async fn run_app(
    terminal: &mut Terminal<Backend>,
    app: &mut App,
    event_handler: &mut EventHandler,
) -> Result<()> {
    loop {
        terminal.draw(|frame| app.render(frame))?;

        // The viewport may have changed during layout
        app.pump();

        if let Some(event) = event_handler.next().await {
            if app.handle_event(event)? {
                break;
            }
        }
    }
    Ok(())
}
