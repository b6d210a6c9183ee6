//! Message list widget for displaying the transcript

use crate::theme::Theme;
use crate::widgets::spinner::frame_at;
use edge_api::Role;
use edge_chat::Message;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Modifier,
    text::{Line, Span},
    widgets::{Paragraph, Widget},
};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Longest citation snippet shown inline
const SNIPPET_CHARS: usize = 60;

/// Widget for displaying a list of transcript entries
pub struct MessageList<'a> {
    messages: &'a [Arc<Message>],
    theme: &'a Theme,
    scroll: usize,
    streaming: bool,
}

impl<'a> MessageList<'a> {
    /// Create a new message list
    pub fn new(messages: &'a [Arc<Message>], theme: &'a Theme) -> Self {
        Self {
            messages,
            theme,
            scroll: 0,
            streaming: false,
        }
    }

    /// Set scroll offset
    pub fn scroll(mut self, scroll: usize) -> Self {
        self.scroll = scroll;
        self
    }

    /// Mark the last entry as still receiving tokens
    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

impl Widget for MessageList<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }

        let visible_lines: Vec<Line> =
            transcript_lines(self.messages, self.theme, area.width as usize, self.streaming)
                .into_iter()
                .skip(self.scroll)
                .take(area.height as usize)
                .collect();

        Paragraph::new(visible_lines).render(area, buf);
    }
}

/// Render every entry into wrapped lines
pub fn transcript_lines(
    messages: &[Arc<Message>],
    theme: &Theme,
    width: usize,
    streaming: bool,
) -> Vec<Line<'static>> {
    let last = messages.len().saturating_sub(1);
    messages
        .iter()
        .enumerate()
        .flat_map(|(i, msg)| message_lines(msg, theme, width, streaming && i == last))
        .collect()
}

/// Total height of the transcript at `width`
pub fn calculate_message_height(
    messages: &[Arc<Message>],
    width: usize,
    streaming: bool,
) -> usize {
    transcript_lines(messages, &Theme::dark(), width, streaming).len()
}

fn message_lines(msg: &Message, theme: &Theme, width: usize, streaming: bool) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let content_width = width.saturating_sub(2).max(1);

    let (role_style, prefix) = match msg.role {
        Role::User => (theme.accent_bold(), "▶ "),
        Role::Assistant => (theme.success_style().add_modifier(Modifier::BOLD), "◀ "),
    };
    let header = if streaming {
        format!("{}{} ▌", prefix, msg.role.name())
    } else {
        format!("{}{}", prefix, msg.role.name())
    };
    lines.push(Line::from(Span::styled(header, role_style)));

    if msg.content.is_empty() && streaming {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        lines.push(Line::from(Span::styled(
            format!("  {} thinking...", frame_at(elapsed)),
            theme.warning_style(),
        )));
    } else if !msg.content.is_empty() {
        for line in textwrap::wrap(&msg.content, content_width) {
            lines.push(Line::from(Span::styled(
                format!("  {}", line),
                theme.base_style(),
            )));
        }
    }

    if let Some(error) = &msg.error {
        for line in textwrap::wrap(&format!("⚠ {}", error), content_width) {
            lines.push(Line::from(Span::styled(
                format!("  {}", line),
                theme.error_style(),
            )));
        }
    }

    let citations = msg.citations();
    if !citations.is_empty() {
        lines.push(Line::from(Span::styled("  Sources", theme.dim_style())));
        for (i, citation) in citations.iter().enumerate() {
            let snippet = snippet(&citation.text);
            let label = format!("  [{}] {} p.{}", i + 1, citation.source, citation.page);
            let mut spans = vec![Span::styled(label, theme.citation_style())];
            if !snippet.is_empty() {
                spans.push(Span::styled(format!("  {}", snippet), theme.dim_style()));
            }
            lines.push(Line::from(spans));
        }
    }

    if let Some(meta) = msg.meta {
        lines.push(Line::from(Span::styled(
            format!("  {:.1} tokens/sec · {:.1}s", meta.tps, meta.duration),
            theme.dim_style(),
        )));
    }

    lines.push(Line::from(""));
    lines
}

/// First line of a citation, shortened for display
fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = flat.chars();
    let head: String = chars.by_ref().take(SNIPPET_CHARS).collect();
    if chars.next().is_some() {
        format!("\"{}...\"", head)
    } else if head.is_empty() {
        head
    } else {
        format!("\"{}\"", head)
    }
}
