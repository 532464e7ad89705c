use ratatui::prelude::Color;
use serde_json::Value;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Render a record field as table cell text
pub fn cell_text(value: Option<&Value>) -> String {
  match value {
    None | Some(Value::Null) => String::new(),
    Some(Value::String(s)) => s.clone(),
    Some(Value::Bool(b)) => if *b { "yes" } else { "no" }.to_string(),
    Some(Value::Number(n)) => n.to_string(),
    // Nested objects usually carry a display name
    Some(Value::Object(map)) => map
      .get("name")
      .or_else(|| map.get("title"))
      .map(|v| cell_text(Some(v)))
      .unwrap_or_else(|| "{…}".to_string()),
    Some(Value::Array(items)) => items
      .iter()
      .map(|v| cell_text(Some(v)))
      .collect::<Vec<_>>()
      .join(", "),
  }
}

/// Get the display color for a record status
pub fn status_color(status: &str) -> Color {
  match status.to_lowercase().as_str() {
    "approved" | "confirmed" | "completed" | "active" => Color::Green,
    "pending" | "requested" => Color::Yellow,
    "rejected" | "cancelled" | "canceled" | "trashed" => Color::Red,
    _ => Color::White,
  }
}
