//! Sidebar listing indexed documents and upload status

use crate::theme::Theme;
use edge_chat::Scope;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
};

/// Sidebar widget
pub struct DocumentList<'a> {
    documents: &'a [String],
    scope: &'a Scope,
    theme: &'a Theme,
    uploading: bool,
    error: Option<&'a str>,
}

impl<'a> DocumentList<'a> {
    pub fn new(documents: &'a [String], scope: &'a Scope, theme: &'a Theme) -> Self {
        Self {
            documents,
            scope,
            theme,
            uploading: false,
            error: None,
        }
    }

    pub fn uploading(mut self, uploading: bool) -> Self {
        self.uploading = uploading;
        self
    }

    pub fn error(mut self, error: Option<&'a str>) -> Self {
        self.error = error;
        self
    }

    fn lines(&self) -> Vec<Line<'static>> {
        let mut lines = Vec::new();

        if self.documents.is_empty() {
            lines.push(Line::from(Span::styled(
                "No documents yet",
                self.theme.dim_style(),
            )));
            lines.push(Line::from(Span::styled(
                "/upload <path>",
                self.theme.dim_style(),
            )));
        }

        for name in self.documents {
            let (marker, style) = if self.scope.contains(name) {
                ("● ", self.theme.accent_bold())
            } else {
                ("  ", self.theme.base_style())
            };
            lines.push(Line::from(Span::styled(format!("{}{}", marker, name), style)));
        }

        if self.uploading {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Uploading...",
                self.theme.warning_style(),
            )));
        }

        if let Some(error) = self.error {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                error.to_string(),
                self.theme.error_style(),
            )));
        }

        lines
    }
}

impl Widget for DocumentList<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let title = if self.scope.is_empty() {
            format!(" Documents ({}) ", self.documents.len())
        } else {
            format!(
                " Documents ({}, {} in scope) ",
                self.documents.len(),
                self.scope.len()
            )
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(self.theme.border_style())
            .title(title);

        Paragraph::new(self.lines())
            .block(block)
            .wrap(Wrap { trim: false })
            .render(area, buf);
    }
}
