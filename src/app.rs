use crate::context::DataContext;
use crate::event::{Event, EventHandler};
use crate::posts::PostId;
use crate::ui;
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{PostDetailView, PostListView};
use chrono::Utc;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::{stdout, Stdout};
use std::time::Duration;
use tracing::{debug, info};

/// Main application state
pub struct App {
  ctx: DataContext,

  /// Navigation state: `None` shows the list, `Some(id)` shows that post
  selected_post: Option<PostId>,

  /// The view for the current navigation state
  view: Box<dyn View>,

  /// Where posts are stored, for the header
  storage_label: String,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  /// Create the app on the post list. Must be called inside a tokio runtime,
  /// since the list view starts fetching immediately.
  pub fn new(ctx: DataContext, storage_label: String) -> Self {
    let view = Box::new(PostListView::new(&ctx));
    Self {
      ctx,
      selected_post: None,
      view,
      storage_label,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = self.event_loop(&mut terminal).await;

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    let mut events = EventHandler::new(Duration::from_millis(100));

    while !self.should_quit() {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }

    info!("exiting");
    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Resize => {} // Redraw happens on the next loop iteration
      Event::Tick => self.tick(),
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let action = self.view.handle_key(key);
    self.apply(action);
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Open(id) => self.navigate(Some(id)),
      ViewAction::Back => self.navigate(None),
      ViewAction::Quit => self.should_quit = true,
    }
  }

  /// Switch to the view for `selected`. The old view is dropped, which
  /// releases its queries.
  fn navigate(&mut self, selected: Option<PostId>) {
    debug!(?selected, "navigate");
    self.selected_post = selected;
    self.view = match selected {
      Some(id) => Box::new(PostDetailView::new(&self.ctx, id)),
      None => Box::new(PostListView::new(&self.ctx)),
    };
  }

  fn tick(&mut self) {
    self.view.tick();
    self.ctx.client.collect_garbage(Utc::now());
  }

  // Accessors for UI rendering
  pub fn view(&self) -> &dyn View {
    self.view.as_ref()
  }

  pub fn view_mut(&mut self) -> &mut dyn View {
    self.view.as_mut()
  }

  pub fn storage_label(&self) -> &str {
    &self.storage_label
  }

  pub fn selected_post(&self) -> Option<PostId> {
    self.selected_post
  }

  pub fn should_quit(&self) -> bool {
    self.should_quit
  }

  pub fn breadcrumb(&self) -> Vec<String> {
    let mut crumbs = vec!["Posts".to_string()];
    if self.selected_post().is_some() {
      crumbs.push(self.view.breadcrumb_label());
    }
    crumbs
  }
}
