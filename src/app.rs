use crate::api::ListFetcher;
use crate::event::{Event, EventHandler};
use crate::listing::{QueryState, Resource};
use crate::ui::{self, RecordListView, View, ViewAction};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tracing::info;

/// Interactive browser for one resource
pub struct App {
  view: RecordListView,
  site_url: String,
  should_quit: bool,
}

impl App {
  pub fn new(fetcher: ListFetcher, site_url: String, resource: Resource, params: QueryState) -> Self {
    Self {
      view: RecordListView::new(fetcher, resource, params),
      site_url,
      should_quit: false,
    }
  }

  pub fn view(&self) -> &RecordListView {
    &self.view
  }

  pub fn view_mut(&mut self) -> &mut RecordListView {
    &mut self.view
  }

  pub fn site_url(&self) -> &str {
    &self.site_url
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    info!(resource = %self.view.query().resource(), "browser started");

    let result = self.event_loop(&mut terminal).await;

    // Restore the terminal even if drawing failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>) -> Result<()> {
    let mut events = EventHandler::new(Duration::from_millis(250));

    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }

    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => self.view.tick(),
      Event::Resize => {}
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    match self.view.handle_key(key) {
      ViewAction::Quit => self.should_quit = true,
      ViewAction::None => {}
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::mock::MockTransport;
  use crate::cache::{NoopStorage, TtlCache};
  use serde_json::json;
  use std::sync::Arc;

  fn app() -> App {
    let transport = MockTransport::always(200, json!({"data": []}));
    let cache = TtlCache::new(NoopStorage);
    let fetcher = ListFetcher::new(Arc::new(transport), Arc::new(cache), 300);
    App::new(
      fetcher,
      "https://zorg.example.nl".to_string(),
      Resource::Appointments,
      QueryState::new(),
    )
  }

  #[tokio::test]
  async fn test_ctrl_c_quits() {
    let mut app = app();
    app.handle_event(Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)));
    assert!(app.should_quit);
  }

  #[tokio::test]
  async fn test_view_quit_is_honoured() {
    let mut app = app();
    app.handle_event(Event::Tick);
    assert!(!app.should_quit);
    app.handle_event(Event::Key(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE)));
    assert!(app.should_quit);
  }
}
