use crate::context::DataContext;
use crate::posts::{add_post_mutation, posts_query, Post};
use crate::query::{Mutation, MutationStatus, Query, QueryStatus};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{fetch_indicator, truncate};
use crate::ui::view::{Shortcut, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

/// View for displaying every stored post
pub struct PostListView {
  query: Query<Vec<Post>>,
  add: Mutation<Post, Post>,
  list_state: ListState,
}

impl PostListView {
  pub fn new(ctx: &DataContext) -> Self {
    Self {
      query: posts_query(ctx),
      add: add_post_mutation(ctx),
      list_state: ListState::default(),
    }
  }

  fn posts(&self) -> &[Post] {
    self.query.data().map(|v| v.as_slice()).unwrap_or(&[])
  }

  fn selected_post(&self) -> Option<&Post> {
    self.list_state.selected().and_then(|idx| self.posts().get(idx))
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.posts().len();
    ensure_valid_selection(&mut self.list_state, len);

    let background = self.query.is_fetching() && !self.query.is_pending();
    let title = match self.query.status() {
      QueryStatus::Pending => " Posts ".to_string(),
      _ => format!(" Posts ({}){} ", len, fetch_indicator(background)),
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if self.query.is_pending() {
      let paragraph = Paragraph::new("Loading...")
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    if let Some(error) = self.query.error() {
      let paragraph = Paragraph::new(format!("Error: {}\n\nPress 'r' to retry.", error))
        .block(block)
        .style(Style::default().fg(Color::Red));
      frame.render_widget(paragraph, area);
      return;
    }

    if len == 0 {
      let paragraph = Paragraph::new("No posts yet. Press 'a' to add one.")
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let items: Vec<ListItem> = self
      .posts()
      .iter()
      .map(|post| {
        let line = Line::from(vec![
          Span::styled(
            format!("#{:<6}", post.id),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(" "),
          Span::raw(truncate(&post.title, 60)),
        ]);
        ListItem::new(line)
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

impl View for PostListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => {
        self.list_state.select_next();
      }
      KeyCode::Char('k') | KeyCode::Up => {
        self.list_state.select_previous();
      }
      KeyCode::Char('a') => {
        self.add.mutate(Post::random());
      }
      KeyCode::Char('r') => {
        self.query.refetch();
      }
      KeyCode::Enter => {
        if let Some(post) = self.selected_post() {
          return ViewAction::Open(post.id);
        }
      }
      KeyCode::Char('q') => return ViewAction::Quit,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Posts".to_string()
  }

  fn tick(&mut self) -> bool {
    // Mutation first so its cache update is visible to the query this tick
    let added = self.add.poll();
    let loaded = self.query.poll();
    added || loaded
  }

  fn status_line(&self) -> Option<(String, Color)> {
    match self.add.status() {
      MutationStatus::Idle => None,
      MutationStatus::Pending => Some(("Adding post...".to_string(), Color::Yellow)),
      MutationStatus::Success => self
        .add
        .data()
        .map(|post| (format!("Added post #{}", post.id), Color::Green)),
      MutationStatus::Error => Some((
        format!("Failed to add post: {}", self.add.error().unwrap_or("unknown error")),
        Color::Red,
      )),
    }
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new("enter", "open"),
      Shortcut::new("a", "add post"),
      Shortcut::new("r", "refresh"),
      Shortcut::new("q", "quit"),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::QueryClient;
  use crate::posts::store::POSTS_KEY;
  use crate::posts::{PostId, PostStore};
  use crate::storage::{KeyValueStore, MemoryStore};
  use crossterm::event::KeyModifiers;
  use ratatui::backend::TestBackend;
  use std::sync::Arc;
  use std::time::Duration;

  fn context(initial: Option<&str>) -> DataContext {
    let storage = Arc::new(MemoryStore::new());
    if let Some(text) = initial {
      storage.set(POSTS_KEY, text).unwrap();
    }
    DataContext {
      posts: PostStore::new(storage),
      client: QueryClient::new(Default::default()),
    }
  }

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  async fn settle(view: &mut PostListView) {
    for _ in 0..200 {
      view.tick();
      if !view.query.is_fetching() && !view.add.is_pending() {
        return;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  }

  fn render(view: &mut PostListView) -> String {
    let mut terminal = Terminal::new(TestBackend::new(60, 8)).unwrap();
    terminal.draw(|frame| view.render(frame, frame.area())).unwrap();
    terminal
      .backend()
      .buffer()
      .content()
      .iter()
      .map(|cell| cell.symbol())
      .collect()
  }

  #[tokio::test]
  async fn test_renders_loading_then_posts() {
    let ctx = context(Some(r#"[{"id":1,"title":"first post","body":"b"}]"#));
    let mut view = PostListView::new(&ctx);

    assert!(render(&mut view).contains("Loading..."));

    settle(&mut view).await;
    let screen = render(&mut view);
    assert!(screen.contains("Posts (1)"));
    assert!(screen.contains("first post"));
  }

  #[tokio::test]
  async fn test_renders_error() {
    let ctx = context(Some("garbage"));
    let mut view = PostListView::new(&ctx);
    settle(&mut view).await;

    assert!(render(&mut view).contains("Error:"));
  }

  #[tokio::test]
  async fn test_enter_opens_selected_post() {
    let ctx = context(Some(
      r#"[{"id":1,"title":"a","body":""},{"id":2,"title":"b","body":""}]"#,
    ));
    let mut view = PostListView::new(&ctx);
    settle(&mut view).await;
    render(&mut view);

    assert_eq!(view.handle_key(key(KeyCode::Enter)), ViewAction::Open(PostId(1)));
    view.handle_key(key(KeyCode::Char('j')));
    assert_eq!(view.handle_key(key(KeyCode::Enter)), ViewAction::Open(PostId(2)));
    assert_eq!(view.handle_key(key(KeyCode::Char('q'))), ViewAction::Quit);
  }

  #[tokio::test]
  async fn test_add_key_appends_post() {
    let ctx = context(None);
    let mut view = PostListView::new(&ctx);
    settle(&mut view).await;
    assert!(view.posts().is_empty());

    view.handle_key(key(KeyCode::Char('a')));
    assert_eq!(view.status_line().unwrap().0, "Adding post...");
    settle(&mut view).await;

    assert_eq!(view.posts().len(), 1);
    assert_eq!(ctx.posts.load().unwrap(), view.posts().to_vec());
    let (message, _) = view.status_line().unwrap();
    assert!(message.starts_with("Added post #"));
  }
}
