//! Full-screen panels shown until the backend is ready

use crate::theme::Theme;
use crate::widgets::spinner::frame_at;
use edge_chat::ReadinessState;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
};
use std::time::Duration;

/// Loading / setup / error screen
pub struct ReadinessPanel<'a> {
    state: ReadinessState,
    backend: &'a str,
    elapsed: Duration,
    timeout: Duration,
    theme: &'a Theme,
}

impl<'a> ReadinessPanel<'a> {
    pub fn new(state: ReadinessState, backend: &'a str, theme: &'a Theme) -> Self {
        Self {
            state,
            backend,
            elapsed: Duration::ZERO,
            timeout: Duration::from_secs(30),
            theme,
        }
    }

    /// Time spent waiting so far, and the budget
    pub fn timing(mut self, elapsed: Duration, timeout: Duration) -> Self {
        self.elapsed = elapsed;
        self.timeout = timeout;
        self
    }

    fn lines(&self) -> Vec<Line<'static>> {
        let dim = self.theme.dim_style();
        match self.state {
            ReadinessState::Loading => vec![
                Line::from(Span::styled(
                    format!("{} Starting AI engine...", frame_at(self.elapsed)),
                    self.theme.accent_bold(),
                )),
                Line::from(""),
                Line::from(Span::styled(
                    format!(
                        "Waiting for {} ({}s / {}s)",
                        self.backend,
                        self.elapsed.as_secs(),
                        self.timeout.as_secs()
                    ),
                    dim,
                )),
                Line::from(Span::styled(
                    "Loading the model can take a while on smaller machines.",
                    dim,
                )),
            ],
            ReadinessState::Setup => vec![
                Line::from(Span::styled("Model not found", self.theme.warning_style())),
                Line::from(""),
                Line::from(Span::styled(
                    "The backend is running but the language model file has not been downloaded.",
                    self.theme.base_style(),
                )),
                Line::from(Span::styled(
                    "Run the backend's model download script, then press r to check again.",
                    self.theme.base_style(),
                )),
                Line::from(""),
                Line::from(Span::styled("r: retry   q: quit", dim)),
            ],
            ReadinessState::Error => vec![
                Line::from(Span::styled(
                    "Backend connection failed",
                    self.theme.error_style(),
                )),
                Line::from(""),
                Line::from(Span::styled(
                    format!(
                        "{} did not become ready within {}s.",
                        self.backend,
                        self.timeout.as_secs()
                    ),
                    self.theme.base_style(),
                )),
                Line::from(Span::styled(
                    "Make sure the backend service is running.",
                    self.theme.base_style(),
                )),
                Line::from(""),
                Line::from(Span::styled("r: retry   q: quit", dim)),
            ],
            ReadinessState::Ready => Vec::new(),
        }
    }
}

impl Widget for ReadinessPanel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(self.theme.border_style())
            .title(" edge ");
        let inner = block.inner(area);
        block.render(area, buf);

        let lines = self.lines();
        let top = inner.height.saturating_sub(lines.len() as u16) / 2;
        let body = Rect::new(
            inner.x,
            inner.y + top,
            inner.width,
            inner.height.saturating_sub(top),
        );

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .render(body, buf);
    }
}
