//! Message composer: single-line input that locks while a reply is streaming

use crate::input::Action;
use crate::theme::Theme;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Style,
    widgets::{Block, Borders, Paragraph, Widget},
};
use unicode_width::UnicodeWidthChar;

/// Single-line text input with a locked state
#[derive(Debug, Default)]
pub struct Composer {
    /// Current input text
    content: String,
    /// Cursor position (character index, not byte index)
    cursor: usize,
    /// Horizontal scroll offset (in display width)
    scroll: usize,
    placeholder: String,
    locked_placeholder: String,
    /// Title shown on the border (scope summary)
    title: Option<String>,
    locked: bool,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set placeholder text
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    /// Text shown while locked
    pub fn with_locked_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.locked_placeholder = placeholder.into();
        self
    }

    pub fn set_placeholder(&mut self, placeholder: impl Into<String>) {
        self.placeholder = placeholder.into();
    }

    pub fn set_title(&mut self, title: Option<String>) {
        self.title = title;
    }

    /// Lock or unlock editing. The draft is kept.
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Get the current content
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Clear the content
    pub fn clear(&mut self) {
        self.content.clear();
        self.cursor = 0;
        self.scroll = 0;
    }

    /// Take the draft, leaving the composer empty
    pub fn take(&mut self) -> String {
        let content = std::mem::take(&mut self.content);
        self.cursor = 0;
        self.scroll = 0;
        content
    }

    fn byte_offset(&self, char_index: usize) -> usize {
        self.content
            .char_indices()
            .nth(char_index)
            .map(|(i, _)| i)
            .unwrap_or(self.content.len())
    }

    fn cursor_display_width(&self) -> usize {
        self.content
            .chars()
            .take(self.cursor)
            .map(|c| c.width().unwrap_or(0))
            .sum()
    }

    /// Handle an editing action. Returns `false` if the action was not
    /// consumed (or the composer is locked).
    pub fn handle_action(&mut self, action: &Action, width: u16) -> bool {
        if self.locked {
            return false;
        }
        let char_count = self.content.chars().count();

        let handled = match action {
            Action::Char(c) => {
                self.insert_char(*c);
                true
            }
            Action::Backspace if self.cursor > 0 => {
                self.cursor -= 1;
                self.remove_char_at(self.cursor);
                true
            }
            Action::Delete if self.cursor < char_count => {
                self.remove_char_at(self.cursor);
                true
            }
            Action::Left if self.cursor > 0 => {
                self.cursor -= 1;
                true
            }
            Action::Right if self.cursor < char_count => {
                self.cursor += 1;
                true
            }
            Action::Home => {
                self.cursor = 0;
                true
            }
            Action::End => {
                self.cursor = char_count;
                true
            }
            Action::ClearLine => {
                self.clear();
                true
            }
            Action::DeleteWord => {
                let chars: Vec<char> = self.content.chars().collect();
                let mut start = self.cursor;
                while start > 0 && chars[start - 1] == ' ' {
                    start -= 1;
                }
                while start > 0 && chars[start - 1] != ' ' {
                    start -= 1;
                }
                let (from, to) = (self.byte_offset(start), self.byte_offset(self.cursor));
                self.content.drain(from..to);
                self.cursor = start;
                true
            }
            Action::Paste(text) => {
                for c in text.chars() {
                    if c == '\n' || c == '\r' {
                        if !self.content.ends_with(' ') && self.cursor > 0 {
                            self.insert_char(' ');
                        }
                    } else {
                        self.insert_char(c);
                    }
                }
                true
            }
            _ => false,
        };

        if handled {
            self.update_scroll(width as usize);
        }
        handled
    }

    fn insert_char(&mut self, c: char) {
        let at = self.byte_offset(self.cursor);
        self.content.insert(at, c);
        self.cursor += 1;
    }

    fn remove_char_at(&mut self, index: usize) {
        let at = self.byte_offset(index);
        self.content.remove(at);
    }

    fn update_scroll(&mut self, width: usize) {
        let visible_width = width.saturating_sub(4).max(1);
        let cursor_pos = self.cursor_display_width();

        if cursor_pos < self.scroll {
            self.scroll = cursor_pos;
        } else if cursor_pos >= self.scroll + visible_width {
            self.scroll = cursor_pos - visible_width + 1;
        }
    }

    /// The slice of the draft that fits in `width` columns after scrolling
    fn visible_text(&self, width: usize) -> String {
        let mut skipped = 0;
        let mut used = 0;
        let mut visible = String::new();
        for c in self.content.chars() {
            let w = c.width().unwrap_or(0);
            if skipped < self.scroll {
                skipped += w;
                continue;
            }
            if used + w > width {
                break;
            }
            visible.push(c);
            used += w;
        }
        visible
    }

    /// Render the composer
    pub fn render(&self, area: Rect, buf: &mut Buffer, theme: &Theme) {
        let mut block = Block::default()
            .borders(Borders::ALL)
            .border_style(if self.locked {
                theme.border_style()
            } else {
                theme.accent_style()
            });
        if let Some(title) = &self.title {
            block = block.title(format!(" {} ", title));
        }

        let inner = block.inner(area);
        block.render(area, buf);

        let (text, style) = if self.locked && self.content.is_empty() {
            (self.locked_placeholder.clone(), theme.dim_style())
        } else if self.content.is_empty() {
            (self.placeholder.clone(), theme.dim_style())
        } else if self.locked {
            (self.visible_text(inner.width as usize), theme.dim_style())
        } else {
            (self.visible_text(inner.width as usize), theme.base_style())
        };
        Paragraph::new(text).style(style).render(inner, buf);

        if !self.locked && inner.width > 0 {
            let cursor_x = self.cursor_display_width().saturating_sub(self.scroll);
            if cursor_x < inner.width as usize {
                let x = inner.x + cursor_x as u16;
                if let Some(cell) = buf.cell_mut((x, inner.y)) {
                    cell.set_style(Style::default().bg(theme.accent));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_str(composer: &mut Composer, s: &str) {
        for c in s.chars() {
            composer.handle_action(&Action::Char(c), 40);
        }
    }

    #[test]
    fn test_typing_and_editing() {
        let mut composer = Composer::new();
        type_str(&mut composer, "héllo");
        assert_eq!(composer.content(), "héllo");

        composer.handle_action(&Action::Left, 40);
        composer.handle_action(&Action::Backspace, 40);
        assert_eq!(composer.content(), "hélo");

        composer.handle_action(&Action::Home, 40);
        composer.handle_action(&Action::Delete, 40);
        assert_eq!(composer.content(), "élo");
    }

    #[test]
    fn test_delete_word() {
        let mut composer = Composer::new();
        type_str(&mut composer, "what is  this");
        composer.handle_action(&Action::DeleteWord, 40);
        assert_eq!(composer.content(), "what is  ");
        composer.handle_action(&Action::DeleteWord, 40);
        assert_eq!(composer.content(), "what ");
    }

    #[test]
    fn test_paste_flattens_newlines() {
        let mut composer = Composer::new();
        composer.handle_action(&Action::Paste("line one\r\nline two".into()), 40);
        assert_eq!(composer.content(), "line one line two");
    }

    #[test]
    fn test_locked_rejects_edits_and_keeps_draft() {
        let mut composer = Composer::new();
        type_str(&mut composer, "draft");
        composer.set_locked(true);
        assert!(!composer.handle_action(&Action::Char('x'), 40));
        assert!(!composer.handle_action(&Action::ClearLine, 40));
        assert_eq!(composer.content(), "draft");

        composer.set_locked(false);
        assert_eq!(composer.take(), "draft");
        assert_eq!(composer.content(), "");
    }

    #[test]
    fn test_scrolls_to_keep_cursor_visible() {
        let mut composer = Composer::new();
        for _ in 0..30 {
            composer.handle_action(&Action::Char('a'), 14);
        }
        let visible = composer.visible_text(10);
        assert!(visible.len() <= 10);
        assert!(composer.cursor_display_width() - composer.scroll < 10);
    }

    #[test]
    fn test_render_placeholder() {
        let theme = Theme::dark();
        let composer = Composer::new()
            .with_placeholder("Ask a question")
            .with_locked_placeholder("Waiting");
        let area = Rect::new(0, 0, 30, 3);
        let mut buf = Buffer::empty(area);
        composer.render(area, &mut buf, &theme);
        let row: String = (1..15).map(|x| buf[(x, 1)].symbol().to_string()).collect();
        assert_eq!(row, "Ask a question");
    }
}
