use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use crate::listing::Resource;

/// Draw the header bar with logo, site and current list
pub fn draw_header(frame: &mut Frame, area: Rect, site_url: &str, resource: Resource, trashed: bool) {
  let domain = extract_domain(site_url);
  let tab = if trashed { "trash" } else { "active" };

  let header = Line::from(vec![
    Span::styled(" zorg ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", domain), Style::default().fg(Color::White)),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(
      format!(" {} ", resource.label()),
      Style::default().fg(Color::Yellow).bold(),
    ),
    Span::styled(format!("[{}]", tab), Style::default().fg(Color::DarkGray)),
  ]);

  let paragraph = Paragraph::new(header).style(Style::default().bg(Color::Black));

  frame.render_widget(paragraph, area);
}

/// Extract domain from a site URL
fn extract_domain(url: &str) -> &str {
  url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url)
    .split('/')
    .next()
    .unwrap_or(url)
}
