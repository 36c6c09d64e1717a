use crossterm::event::KeyEvent;
use ratatui::prelude::*;

use crate::posts::PostId;

/// A keyboard shortcut hint for display in the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcut {
  pub key: &'static str,
  pub label: &'static str,
}

impl Shortcut {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self { key, label }
  }
}

/// Actions that a view can request in response to user input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAction {
  /// No action needed
  None,
  /// Show the detail view for a post
  Open(PostId),
  /// Return to the post list
  Back,
  /// Exit the application
  Quit,
}

/// Trait for view behavior
///
/// Views own their queries: creating a view subscribes to its cache keys and
/// dropping it unsubscribes, so navigation is what marks cache entries as
/// unused.
pub trait View {
  /// Handle a key event, returning an action for App to execute
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction;

  /// Render the view to the frame
  fn render(&mut self, frame: &mut Frame, area: Rect);

  /// Get the breadcrumb label for this view
  fn breadcrumb_label(&self) -> String;

  /// Called on each tick to allow views to poll async queries.
  /// Returns whether anything changed.
  fn tick(&mut self) -> bool {
    false
  }

  /// One-line status for the footer, if any
  fn status_line(&self) -> Option<(String, Color)> {
    None
  }

  /// Get keyboard shortcuts to display in the header
  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![Shortcut::new("q", "quit")]
  }
}
