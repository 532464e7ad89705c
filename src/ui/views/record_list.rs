use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};
use serde_json::Value;
use tracing::warn;

use crate::api::{ListFetcher, ListResult, ListView, Record};
use crate::cache::CacheSource;
use crate::listing::{QueryError, QueryState, Resource};
use crate::query::{ListQuery, LoadState, Mutation};
use crate::ui::components::{KeyResult, SearchEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{cell_text, status_color, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};

/// Paged, filterable table of one resource
pub struct RecordListView {
  query: ListQuery,
  table_state: TableState,
  search: SearchInput,
  /// Last query error (an invalid filter), shown in the status line
  query_error: Option<String>,
}

impl RecordListView {
  pub fn new(fetcher: ListFetcher, resource: Resource, params: QueryState) -> Self {
    let mut view = Self {
      query: ListQuery::new(fetcher, resource, params),
      table_state: TableState::default().with_selected(Some(0)),
      search: SearchInput::new(),
      query_error: None,
    };
    // Start fetching immediately
    let result = view.query.fetch();
    view.record(result);
    view
  }

  pub fn query(&self) -> &ListQuery {
    &self.query
  }

  fn resource(&self) -> Resource {
    self.query.resource()
  }

  fn items(&self) -> &[Record] {
    match self.query.state() {
      LoadState::Success(fetched) => fetched.view.items(),
      _ => &[],
    }
  }

  fn total(&self) -> u64 {
    self
      .query
      .state()
      .data()
      .map(|f| f.view.total())
      .unwrap_or(0)
  }

  fn search_term(&self) -> String {
    self
      .query
      .params()
      .filter("search")
      .and_then(Value::as_str)
      .unwrap_or_default()
      .to_string()
  }

  fn selected_id(&self) -> Option<u64> {
    let idx = self.table_state.selected()?;
    self.items().get(idx).and_then(ListResult::record_id)
  }

  fn has_next_page(&self) -> bool {
    let params = self.query.params();
    u64::from(params.page) * u64::from(params.per_page.get()) < self.total()
  }

  fn record(&mut self, result: Result<(), QueryError>) {
    match result {
      Ok(()) => self.query_error = None,
      Err(e) => {
        warn!(error = %e, "rejected list query");
        self.query_error = Some(e.to_string());
      }
    }
  }

  fn update(&mut self, f: impl FnOnce(&mut QueryState)) {
    let result = self.query.update(f);
    self.table_state.select(Some(0));
    self.record(result);
  }

  fn mutate(&mut self, mutation: Mutation) {
    let result = self.query.mutate(mutation);
    self.record(result);
  }

  fn title(&self) -> String {
    let params = self.query.params();
    let label = self.resource().label();
    let tab = if params.trashed { " (trash)" } else { "" };

    match self.query.state() {
      LoadState::Idle | LoadState::Loading => format!(" {}{} (loading...) ", label, tab),
      LoadState::Error(_) => format!(" {}{} (error) ", label, tab),
      LoadState::Success(fetched) => {
        let offline = if fetched.source == CacheSource::Offline {
          " [offline]"
        } else {
          ""
        };
        format!(
          " {}{} ({} total, page {}, {}/page, {}){} ",
          label,
          tab,
          fetched.view.total(),
          params.page,
          params.per_page.get(),
          params.sort,
          offline
        )
      }
    }
  }

  fn render_table(&mut self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .title(self.title())
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let message = match self.query.state() {
      LoadState::Idle | LoadState::Loading => Some(("Loading...".to_string(), Color::DarkGray)),
      LoadState::Error(e) => Some((
        format!("Failed to load {}: {}. Press 'r' to retry.", self.resource(), e),
        Color::Red,
      )),
      LoadState::Success(fetched) => match &fetched.view {
        ListView::Empty => Some(("No records found.".to_string(), Color::DarkGray)),
        _ => None,
      },
    };

    if let Some((content, color)) = message {
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(color));
      frame.render_widget(paragraph, area);
      return;
    }

    let columns = self.resource().columns();
    let len = self.items().len();
    ensure_valid_selection(&mut self.table_state, len);

    let header = Row::new(
      columns
        .iter()
        .map(|c| Cell::from(*c).style(Style::default().fg(Color::Cyan).bold())),
    );

    let rows: Vec<Row> = self
      .items()
      .iter()
      .map(|record| {
        Row::new(columns.iter().map(|column| {
          let text = cell_text(record.get(*column));
          let style = if *column == "status" {
            Style::default().fg(status_color(&text))
          } else {
            Style::default()
          };
          Cell::from(truncate(&text, 40)).style(style)
        }))
      })
      .collect();

    let widths: Vec<Constraint> = columns
      .iter()
      .map(|c| {
        if *c == "id" {
          Constraint::Length(8)
        } else {
          Constraint::Fill(1)
        }
      })
      .collect();

    let table = Table::new(rows, widths)
      .header(header)
      .block(block)
      .row_highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(table, area, &mut self.table_state);
  }
}

impl View for RecordListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    // Let search component try to handle first
    let current = self.search_term();
    match self.search.handle_key(key, &current) {
      KeyResult::Event(SearchEvent::Submitted(term)) => {
        if term != current {
          self.update(|p| p.set_filter("search", term));
        }
        return ViewAction::None;
      }
      KeyResult::Event(SearchEvent::Cancelled) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.table_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.table_state.select_previous(),
      KeyCode::Char('n') | KeyCode::Right => {
        // The total is only known once the current page has loaded
        if !self.query.is_loading() && self.has_next_page() {
          self.update(|p| p.set_page(p.page + 1));
        }
      }
      KeyCode::Char('p') | KeyCode::Left => {
        if self.query.params().page > 1 {
          self.update(|p| p.set_page(p.page - 1));
        }
      }
      KeyCode::Char('s') => self.update(|p| {
        p.sort = p.sort.next();
        p.set_page(1);
      }),
      KeyCode::Char('+') => self.update(|p| {
        p.per_page = p.per_page.next();
        p.set_page(1);
      }),
      KeyCode::Char('t') => self.update(|p| {
        p.trashed = !p.trashed;
        p.set_page(1);
      }),
      KeyCode::Char('d') => {
        if !self.query.params().trashed {
          if let Some(id) = self.selected_id() {
            self.mutate(Mutation::Delete(id));
          }
        }
      }
      KeyCode::Char('u') => {
        if self.query.params().trashed {
          if let Some(id) = self.selected_id() {
            self.mutate(Mutation::Restore(id));
          }
        }
      }
      KeyCode::Char('r') => {
        let result = self.query.refetch();
        self.record(result);
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Quit,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_table(frame, area);
    // Let search component render its overlay
    self.search.render_overlay(frame, area);
  }

  fn tick(&mut self) {
    self.query.poll();
  }

  fn status(&self) -> Option<String> {
    self
      .query_error
      .clone()
      .or_else(|| self.query.notice().map(String::from))
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    if self.search.is_active() {
      return vec![
        ShortcutInfo::new("enter", "apply"),
        ShortcutInfo::new("esc", "cancel"),
      ];
    }

    let mut shortcuts = vec![
      ShortcutInfo::new("/", "search"),
      ShortcutInfo::new("n/p", "page"),
      ShortcutInfo::new("s", "sort"),
      ShortcutInfo::new("+", "per page"),
      ShortcutInfo::new("t", "trash"),
    ];
    if self.query.params().trashed {
      shortcuts.push(ShortcutInfo::new("u", "restore"));
    } else {
      shortcuts.push(ShortcutInfo::new("d", "delete"));
    }
    shortcuts.push(ShortcutInfo::new("r", "refresh"));
    shortcuts.push(ShortcutInfo::new("q", "quit"));
    shortcuts
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::mock::{json_response, MockTransport};
  use crate::api::{FetchError, Method};
  use crate::cache::{SqliteStorage, TtlCache};
  use crossterm::event::KeyModifiers;
  use ratatui::backend::TestBackend;
  use ratatui::Terminal;
  use serde_json::json;
  use std::sync::Arc;
  use std::time::Duration;

  fn fetcher_with(transport: MockTransport) -> ListFetcher {
    let cache = TtlCache::new(SqliteStorage::open_in_memory().unwrap());
    ListFetcher::new(Arc::new(transport), Arc::new(cache), 300)
  }

  fn key(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
  }

  fn screen(view: &mut RecordListView) -> String {
    let mut terminal = Terminal::new(TestBackend::new(80, 10)).unwrap();
    terminal.draw(|frame| view.render(frame, frame.area())).unwrap();
    let buffer = terminal.backend().buffer();
    buffer
      .content()
      .chunks(buffer.area.width as usize)
      .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
      .collect::<Vec<_>>()
      .join("\n")
  }

  async fn settle(view: &mut RecordListView) {
    tokio::time::sleep(Duration::from_millis(20)).await;
    view.tick();
  }

  #[tokio::test]
  async fn test_renders_rows() {
    let transport = MockTransport::always(
      200,
      json!({"data": [{"id": 1, "name": "Acme Care", "type_of_care": "GGZ", "city": "Delft"}], "total": 1}),
    );
    let mut view = RecordListView::new(fetcher_with(transport), Resource::Providers, QueryState::new());
    settle(&mut view).await;

    let text = screen(&mut view);
    assert!(text.contains("Acme Care"));
    assert!(text.contains("Delft"));
    assert!(text.contains("1 total"));
  }

  #[tokio::test]
  async fn test_empty_and_error_are_distinct() {
    let empty = MockTransport::always(200, json!({"data": [], "total": 0}));
    let mut view = RecordListView::new(fetcher_with(empty), Resource::Reviews, QueryState::new());
    settle(&mut view).await;
    assert!(screen(&mut view).contains("No records found."));

    let failing = MockTransport::new(|_| (Duration::ZERO, Err(FetchError::Network("refused".into()))));
    let mut view = RecordListView::new(fetcher_with(failing), Resource::Reviews, QueryState::new());
    settle(&mut view).await;
    let text = screen(&mut view);
    assert!(text.contains("Failed to load reviews"));
    assert!(!text.contains("No records found."));
  }

  #[tokio::test]
  async fn test_paging_keys() {
    let transport = MockTransport::always(200, json!({"data": [{"id": 1}], "total": 25}));
    let mut view = RecordListView::new(fetcher_with(transport), Resource::Clients, QueryState::new());
    settle(&mut view).await;

    view.handle_key(key('p'));
    assert_eq!(view.query().params().page, 1);

    view.handle_key(key('n'));
    settle(&mut view).await;
    view.handle_key(key('n'));
    settle(&mut view).await;
    assert_eq!(view.query().params().page, 3);

    // 25 rows at 10 per page end on page 3
    view.handle_key(key('n'));
    assert_eq!(view.query().params().page, 3);
  }

  #[tokio::test]
  async fn test_search_sets_filter_and_resets_page() {
    let transport = MockTransport::always(200, json!({"data": [{"id": 1}], "total": 40}));
    let mut view = RecordListView::new(
      fetcher_with(transport.clone()),
      Resource::Providers,
      QueryState::new().with_page(3),
    );
    settle(&mut view).await;

    view.handle_key(key('/'));
    for c in "acme".chars() {
      view.handle_key(key(c));
    }
    view.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
    settle(&mut view).await;

    assert_eq!(view.query().params().page, 1);
    assert_eq!(
      transport.calls().last().map(|c| c.path.clone()),
      Some("/providers?search=acme&page=1&per_page=10&sort=newest&trashed=0".to_string())
    );
  }

  #[tokio::test]
  async fn test_delete_only_in_active_tab() {
    let transport = MockTransport::new(|req| {
      let body = match req.method {
        Method::Get => json!({"data": [{"id": "7", "name": "Zorg B.V."}]}),
        _ => json!({"success": true}),
      };
      (Duration::ZERO, Ok(json_response(200, &body)))
    });
    let mut view = RecordListView::new(fetcher_with(transport.clone()), Resource::Providers, QueryState::new());
    settle(&mut view).await;
    screen(&mut view);

    view.handle_key(key('u'));
    view.handle_key(key('d'));
    settle(&mut view).await;

    let writes: Vec<_> = transport
      .calls()
      .into_iter()
      .filter(|c| c.method != Method::Get)
      .collect();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].path, "/providers/7");
    assert_eq!(view.status().as_deref(), Some("Moved #7 to trash"));
  }

  #[tokio::test]
  async fn test_shortcuts_follow_search_overlay() {
    let transport = MockTransport::always(200, json!({"data": []}));
    let mut view = RecordListView::new(fetcher_with(transport), Resource::Clients, QueryState::new());
    assert!(view.shortcuts().iter().any(|s| s.key == "d"));

    view.handle_key(key('/'));
    let keys: Vec<_> = view.shortcuts().iter().map(|s| s.key).collect();
    assert_eq!(keys, vec!["enter", "esc"]);
  }

  #[tokio::test]
  async fn test_quit() {
    let transport = MockTransport::always(200, json!({"data": []}));
    let mut view = RecordListView::new(fetcher_with(transport), Resource::Favourites, QueryState::new());
    assert_eq!(view.handle_key(key('q')), ViewAction::Quit);
  }
}
