use crate::context::DataContext;
use crate::posts::{post_query, Post, PostId};
use crate::query::Query;
use crate::ui::renderfns::fetch_indicator;
use crate::ui::view::{Shortcut, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

/// View for displaying a single post
pub struct PostDetailView {
  id: PostId,
  query: Query<Option<Post>>,
}

impl PostDetailView {
  pub fn new(ctx: &DataContext, id: PostId) -> Self {
    Self {
      id,
      query: post_query(ctx, Some(id)),
    }
  }

  fn render_detail(&self, frame: &mut Frame, area: Rect) {
    let background = self.query.is_fetching() && !self.query.is_pending();
    let title = format!(" Post #{}{} ", self.id, fetch_indicator(background));

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(2), // Back hint
        Constraint::Min(1),    // Content
      ])
      .split(inner);

    let back = Paragraph::new(Line::from(vec![
      Span::styled("<q>", Style::default().fg(Color::Cyan)),
      Span::styled(" Back", Style::default().fg(Color::DarkGray)),
    ]));
    frame.render_widget(back, chunks[0]);

    // Show loading or error state
    if self.query.is_pending() {
      let paragraph = Paragraph::new("Loading...").style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, chunks[1]);
      return;
    }

    if let Some(error) = self.query.error() {
      let paragraph = Paragraph::new(format!("Error: {}\n\nPress 'r' to retry.", error))
        .style(Style::default().fg(Color::Red));
      frame.render_widget(paragraph, chunks[1]);
      return;
    }

    let post = match self.query.data() {
      Some(Some(post)) => post,
      _ => {
        let paragraph = Paragraph::new(format!("Post #{} not found.", self.id))
          .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(paragraph, chunks[1]);
        return;
      }
    };

    let content = vec![
      Line::from(Span::styled(
        post.title.as_str(),
        Style::default().add_modifier(Modifier::BOLD),
      )),
      Line::raw(""),
      Line::raw(post.body.as_str()),
    ];
    let paragraph = Paragraph::new(content).wrap(Wrap { trim: true });
    frame.render_widget(paragraph, chunks[1]);
  }
}

impl View for PostDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('r') => {
        self.query.refetch();
        ViewAction::None
      }
      KeyCode::Char('q') | KeyCode::Esc | KeyCode::Backspace => ViewAction::Back,
      _ => ViewAction::None,
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_detail(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    format!("#{}", self.id)
  }

  fn tick(&mut self) -> bool {
    self.query.poll()
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![Shortcut::new("r", "refresh"), Shortcut::new("q", "back")]
  }
}
