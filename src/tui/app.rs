use anyhow::Result;
use crossterm::event::{KeyEvent, MouseEvent, MouseEventKind};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::events::Event;
use super::keys::{Action, KeyMap};
use super::list_view::FeedView;
use super::styles::Theme;
use super::Frame;
use crate::config::Config;
use crate::feed::{DataSource, Direction as FetchDirection, FeedError, FeedResult, FetchRequest, FetchResponse};
use crate::scroll::{ListStatus, ScrollCoordinator};

/// Lines scrolled per mouse wheel notch
const WHEEL_LINES: f64 = 3.0;

/// Main application state and controller
pub struct App {
    /// Whether the application should quit
    pub should_quit: bool,

    /// Show the key binding overlay
    pub show_help: bool,

    pub key_map: KeyMap,
    pub theme: Theme,

    coordinator: ScrollCoordinator<String>,
    source: Arc<dyn DataSource<String>>,

    /// Completed fetches are sent back through this channel
    event_sender: mpsc::UnboundedSender<Event>,
}

impl App {
    pub fn new(
        config: &Config,
        source: Arc<dyn DataSource<String>>,
        event_sender: mpsc::UnboundedSender<Event>,
    ) -> Self {
        // The real viewport height is known after the first draw
        let coordinator = ScrollCoordinator::new(config.feed_config(), config.virtualizer_options(0));
        info!(source = source.name(), "feed created");

        Self {
            should_quit: false,
            show_help: false,
            key_map: KeyMap::default(),
            theme: Theme::default(),
            coordinator,
            source,
            event_sender,
        }
    }

    pub fn coordinator(&self) -> &ScrollCoordinator<String> {
        &self.coordinator
    }

    /// Handle incoming events. Returns whether the application should exit.
    pub fn handle_event(&mut self, event: Event) -> Result<bool> {
        match event {
            Event::Key(key_event) => self.handle_key_event(key_event),
            Event::Mouse(mouse_event) => self.handle_mouse_event(mouse_event),
            // The list area is re-measured on the next draw
            Event::Resize(..) | Event::Tick => {}
            Event::FetchCompleted { request, outcome } => self.apply_fetch(request, outcome),
        }

        self.pump();
        Ok(self.should_quit)
    }

    fn handle_key_event(&mut self, key_event: KeyEvent) {
        let Some(action) = self.key_map.action(&key_event) else {
            return;
        };
        let page = (self.coordinator.virtualizer().viewport_size() - 1.0).max(1.0);

        match action {
            Action::Quit => self.should_quit = true,
            Action::ToggleHelp => self.show_help = !self.show_help,
            Action::ScrollUp => self.coordinator.scroll_by(-1.0),
            Action::ScrollDown => self.coordinator.scroll_by(1.0),
            Action::PageUp => self.coordinator.scroll_by(-page),
            Action::PageDown => self.coordinator.scroll_by(page),
            Action::Top => self.coordinator.scroll_to_offset(f64::NEG_INFINITY),
            Action::Bottom => self.coordinator.scroll_to_offset(f64::INFINITY),
            Action::ResumeLive => self.coordinator.resume_live(),
            Action::Retry => self.coordinator.retry(),
        }
    }

    fn handle_mouse_event(&mut self, mouse_event: MouseEvent) {
        match mouse_event.kind {
            MouseEventKind::ScrollUp => self.coordinator.scroll_by(-WHEEL_LINES),
            MouseEventKind::ScrollDown => self.coordinator.scroll_by(WHEEL_LINES),
            _ => {}
        }
    }

    fn apply_fetch(&mut self, request: FetchRequest, outcome: FeedResult<FetchResponse<String>>) {
        match self.coordinator.complete(request, outcome) {
            Ok(report) => debug!(
                direction = %report.direction,
                inserted = report.inserted_len(),
                evicted = report.evicted_len(),
                "fetch applied"
            ),
            Err(FeedError::UnexpectedCompletion(direction)) => {
                warn!(%direction, "dropping completion without a matching request")
            }
            // Already logged by the controller
            Err(_) => {}
        }
    }

    /// Start whatever fetch the current window calls for
    pub fn pump(&mut self) {
        if let Some(request) = self.coordinator.poll() {
            self.spawn_fetch(request);
        }
    }

    fn spawn_fetch(&self, request: FetchRequest) {
        let source = Arc::clone(&self.source);
        let sender = self.event_sender.clone();
        tokio::spawn(async move {
            let outcome = source
                .fetch(request.limit, request.cursor, request.direction)
                .await;
            if sender.send(Event::FetchCompleted { request, outcome }).is_err() {
                debug!("fetch finished after shutdown");
            }
        });
    }

    /// Render the application UI
    pub fn render(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // Header
                Constraint::Min(1),    // Feed
                Constraint::Length(1), // Status bar
            ])
            .split(frame.size());

        self.coordinator.set_viewport_size(f64::from(chunks[1].height));

        self.render_header(frame, chunks[0]);
        frame.render_widget(FeedView::new(&self.coordinator, &self.theme), chunks[1]);
        self.render_status_bar(frame, chunks[2]);

        if self.show_help {
            self.render_help_overlay(frame);
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let following = self.coordinator.is_following_live();
        let mut spans = vec![
            Span::styled(" infiniscroll ", self.theme.header_style()),
            Span::raw(" "),
            Span::styled(
                if following { "● live" } else { "○ paused" },
                self.theme.live_style(following),
            ),
        ];
        if !following {
            if let Some(binding) = self.key_map.binding(Action::ResumeLive) {
                spans.push(Span::styled(
                    format!("  [{}] resume live", binding.label),
                    self.theme.placeholder_style(),
                ));
            }
        }
        // Forward pages show up in the tail loader instead
        if self.coordinator.status() == &ListStatus::Ready
            && self.coordinator.controller().is_fetching(FetchDirection::Backward)
        {
            spans.push(Span::raw("  "));
            spans.push(Span::styled("Background Updating...", self.theme.activity_style()));
        }

        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let paragraph = Paragraph::new(status_text(&self.coordinator)).style(self.theme.status_bar_style());
        frame.render_widget(paragraph, area);
    }

    fn render_help_overlay(&self, frame: &mut Frame) {
        let help_text = self.key_map.help_text();
        let height = help_text.lines().count() as u16 + 2;
        let help_area = centered_rect(48, height, frame.size());

        let help_block = Block::default()
            .borders(Borders::ALL)
            .title("Help")
            .border_style(self.theme.border_style())
            .style(self.theme.help_style());

        frame.render_widget(Clear, help_area);
        frame.render_widget(Paragraph::new(help_text).block(help_block), help_area);
    }
}

/// One-line summary of the feed state
fn status_text(coordinator: &ScrollCoordinator<String>) -> String {
    let snapshot = coordinator.snapshot();
    let ids = snapshot
        .resident_ids
        .as_ref()
        .map_or("-".to_string(), |ids| format!("{}..={}", ids.start(), ids.end()));
    let max_pages = coordinator.controller().config().max_resident_pages;

    let mut text = format!(
        " ids {} | pages {}/{} | fwd {} | back {} | line {:.0}/{:.0}",
        ids,
        snapshot.resident_pages,
        max_pages,
        coordinator.fetch_state(FetchDirection::Forward).label(),
        coordinator.fetch_state(FetchDirection::Backward).label(),
        snapshot.scroll_offset,
        snapshot.total_size,
    );
    if let Some(error) = snapshot.last_error {
        text.push_str(&format!(" | last error: {}", error));
    }
    text.push_str(" | ? help");
    text
}

/// Rectangle of at most `width` x `height` centered in `area`
fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;
    use ratatui::{backend::TestBackend, Terminal};

    fn config() -> Config {
        Config {
            latency_ms: 0,
            overscan: 1,
            ..Config::default()
        }
    }

    fn app() -> (App, mpsc::UnboundedReceiver<Event>) {
        let config = config();
        let (sender, receiver) = mpsc::unbounded_channel();
        let app = App::new(&config, Arc::new(config.data_source()), sender);
        (app, receiver)
    }

    fn draw(app: &mut App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(60, 12)).unwrap();
        terminal.draw(|frame| app.render(frame)).unwrap();
        format!("{:?}", terminal.backend().buffer())
    }

    /// Deliver the next completed fetch
    async fn deliver(app: &mut App, receiver: &mut mpsc::UnboundedReceiver<Event>) {
        let event = receiver.recv().await.unwrap();
        assert!(matches!(event, Event::FetchCompleted { .. }));
        app.handle_event(event).unwrap();
    }

    fn key(code: crossterm::event::KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[tokio::test]
    async fn test_initial_load_through_channel() {
        let (mut app, mut receiver) = app();
        assert!(draw(&mut app).contains("Loading..."));

        app.pump();
        deliver(&mut app, &mut receiver).await;
        assert_eq!(app.coordinator().status(), &ListStatus::Ready);

        let screen = draw(&mut app);
        assert!(screen.contains("Async loaded row #9"));
        assert!(screen.contains("ids 0..=9"));
        assert!(screen.contains("live"));
    }

    #[tokio::test]
    async fn test_only_one_fetch_per_direction_in_flight() {
        let (mut app, mut receiver) = app();
        draw(&mut app);
        app.pump();
        app.pump();
        app.handle_event(Event::Tick).unwrap();

        deliver(&mut app, &mut receiver).await;
        // The first completion triggered the next page, nothing else queued up
        deliver(&mut app, &mut receiver).await;
        assert_eq!(app.coordinator().controller().store().id_range(), Some(0..=19));
    }

    #[tokio::test]
    async fn test_scroll_keys_toggle_live_mode() {
        let (mut app, mut receiver) = app();
        draw(&mut app);
        app.pump();
        deliver(&mut app, &mut receiver).await;
        draw(&mut app);

        app.handle_event(key(crossterm::event::KeyCode::PageUp)).unwrap();
        assert!(!app.coordinator().is_following_live());
        assert!(draw(&mut app).contains("resume live"));

        app.handle_event(key(crossterm::event::KeyCode::Char('l'))).unwrap();
        assert!(app.coordinator().is_following_live());
        assert!(app.coordinator().virtualizer().is_at_end());
    }

    #[tokio::test]
    async fn test_background_indicator_only_for_older_rows() {
        let config = Config {
            initial_cursor: 20,
            ..config()
        };
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut app = App::new(&config, Arc::new(config.data_source()), sender);
        draw(&mut app);
        app.pump();
        deliver(&mut app, &mut receiver).await;

        // At the live edge the next page is already on its way
        assert!(app.coordinator().controller().is_fetching(FetchDirection::Forward));
        assert!(!draw(&mut app).contains("Background Updating..."));

        app.coordinator.begin_fetch(FetchDirection::Backward).unwrap();
        assert!(draw(&mut app).contains("Background Updating..."));
    }

    #[tokio::test]
    async fn test_quit_and_help() {
        let (mut app, _receiver) = app();
        assert!(!app.handle_event(key(crossterm::event::KeyCode::Char('?'))).unwrap());
        assert!(app.show_help);
        assert!(draw(&mut app).contains("Resume live"));

        assert!(app.handle_event(key(crossterm::event::KeyCode::Char('q'))).unwrap());
    }

    #[test]
    fn test_centered_rect_fits_small_areas() {
        let area = Rect::new(0, 0, 20, 6);
        assert_eq!(centered_rect(48, 12, area), area);
        assert_eq!(centered_rect(10, 2, area), Rect::new(5, 2, 10, 2));
    }
}
