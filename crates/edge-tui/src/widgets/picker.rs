//! Multi-select popup for choosing which documents to scope a message to

use crate::Theme;
use edge_chat::Scope;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, HighlightSpacing, List, ListItem, ListState, StatefulWidget, Widget},
};
use unicode_width::UnicodeWidthStr;

/// Maximum width for the popup
const MAX_POPUP_WIDTH: u16 = 80;

/// Maximum height for the popup
const MAX_POPUP_HEIGHT: u16 = 20;

/// Compute the popup size for a title and item labels
fn popup_size<'a>(title: &str, labels: impl Iterator<Item = &'a str>, count: usize) -> (u16, u16) {
    let mut max_width = title.width() + 4;
    for label in labels {
        max_width = max_width.max(label.width() + 8);
    }
    let height = (count.max(1) as u16).saturating_add(3);
    let width = (max_width as u16).clamp(24, MAX_POPUP_WIDTH);
    (width, height.min(MAX_POPUP_HEIGHT))
}

/// Popup listing documents with a checkbox per entry
pub struct DocumentPicker<'a> {
    documents: &'a [String],
    scope: &'a Scope,
    selected: usize,
    theme: &'a Theme,
}

impl<'a> DocumentPicker<'a> {
    pub fn new(documents: &'a [String], scope: &'a Scope, theme: &'a Theme) -> Self {
        Self {
            documents,
            scope,
            selected: 0,
            theme,
        }
    }

    /// Set the highlighted index
    pub fn with_selected(mut self, index: usize) -> Self {
        self.selected = index.min(self.documents.len().saturating_sub(1));
        self
    }

    fn item(&self, index: usize, name: &str) -> ListItem<'static> {
        let checked = self.scope.contains(name);
        let mark = if checked { "[x] " } else { "[ ] " };
        let style = if index == self.selected {
            Style::default()
                .bg(self.theme.accent)
                .fg(self.theme.bg)
                .add_modifier(Modifier::BOLD)
        } else if checked {
            self.theme.accent_style()
        } else {
            self.theme.base_style()
        };
        ListItem::new(Line::from(Span::styled(format!("{}{}", mark, name), style)))
    }

    /// Render the picker centered in the given area
    pub fn render_centered(&self, area: Rect, buf: &mut Buffer) {
        let title = " Scope: Space toggles, Enter closes ";
        let (width, height) = popup_size(
            title,
            self.documents.iter().map(String::as_str),
            self.documents.len(),
        );
        let x = area.x + area.width.saturating_sub(width) / 2;
        let y = area.y + area.height.saturating_sub(height) / 2;
        let popup_area = Rect::new(x, y, width.min(area.width), height.min(area.height));

        Clear.render(popup_area, buf);

        let block = Block::default()
            .title(title)
            .title_style(self.theme.accent_bold())
            .borders(Borders::ALL)
            .border_style(self.theme.accent_style());

        if self.documents.is_empty() {
            let inner = block.inner(popup_area);
            block.render(popup_area, buf);
            let span = Span::styled("No documents uploaded", self.theme.dim_style());
            buf.set_span(inner.x + 1, inner.y, &span, inner.width.saturating_sub(1));
            return;
        }

        let items: Vec<ListItem> = self
            .documents
            .iter()
            .enumerate()
            .map(|(i, name)| self.item(i, name))
            .collect();

        let list = List::new(items)
            .block(block)
            .highlight_spacing(HighlightSpacing::Always);

        let mut state = ListState::default();
        state.select(Some(self.selected));
        StatefulWidget::render(list, popup_area, buf, &mut state);
    }
}

/// State for the picker popup
#[derive(Debug, Default)]
pub struct PickerState {
    /// Currently highlighted index
    pub selected: usize,
    /// Whether the picker is visible
    pub visible: bool,
}

impl PickerState {
    pub fn show(&mut self) {
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    /// Move selection up, wrapping
    pub fn up(&mut self, item_count: usize) {
        if item_count == 0 {
            return;
        }
        self.selected = if self.selected == 0 {
            item_count - 1
        } else {
            self.selected - 1
        };
    }

    /// Move selection down, wrapping
    pub fn down(&mut self, item_count: usize) {
        if item_count == 0 {
            return;
        }
        self.selected = (self.selected + 1) % item_count;
    }

    /// Toggle the highlighted document in `scope`
    pub fn toggle(&self, documents: &[String], scope: &mut Scope) -> Option<bool> {
        documents
            .get(self.selected)
            .map(|name| scope.toggle(name))
    }
}
