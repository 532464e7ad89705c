mod components;
mod renderfns;
mod view;
mod views;

pub use renderfns::cell_text;
pub use view::{View, ViewAction};
pub use views::RecordListView;

use crate::app::App;
use ratatui::prelude::*;
use ratatui::widgets::{Paragraph, TableState};

/// Main draw function
pub fn draw(frame: &mut Frame, app: &mut App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Status bar
    ])
    .split(frame.area());

  let (resource, trashed) = {
    let query = app.view().query();
    (query.resource(), query.params().trashed)
  };
  renderfns::draw_header(frame, chunks[0], app.site_url(), resource, trashed);

  app.view_mut().render(frame, chunks[1]);

  draw_status_bar(frame, chunks[2], app.view());
}

fn draw_status_bar(frame: &mut Frame, area: Rect, view: &RecordListView) {
  let line = match view.status() {
    Some(status) => Line::from(Span::styled(
      format!(" {}", status),
      Style::default().fg(Color::Yellow),
    )),
    None => {
      let mut spans = vec![Span::raw(" ")];
      for shortcut in view.shortcuts() {
        spans.push(Span::styled(
          format!("<{}>", shortcut.key),
          Style::default().fg(Color::Cyan),
        ));
        spans.push(Span::styled(
          format!(" {}  ", shortcut.label),
          Style::default().fg(Color::DarkGray),
        ));
      }
      Line::from(spans)
    }
  };

  frame.render_widget(Paragraph::new(line), area);
}

/// Keep the selection inside `0..len`, selecting the first row when there is one.
pub fn ensure_valid_selection(state: &mut TableState, len: usize) {
  if len == 0 {
    state.select(None);
    return;
  }
  match state.selected() {
    Some(i) if i < len => {}
    Some(_) => state.select(Some(len - 1)),
    None => state.select(Some(0)),
  }
}
