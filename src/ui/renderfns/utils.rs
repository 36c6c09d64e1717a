/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Title suffix shown while a query refetches over data it already has
pub fn fetch_indicator(background_fetching: bool) -> &'static str {
  if background_fetching {
    " (background updating...)"
  } else {
    ""
  }
}
