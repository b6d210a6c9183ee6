//! edge-tui: Terminal UI components
//!
//! Widgets for the chat screen, document sidebar and readiness screens,
//! built on ratatui and crossterm.

pub mod input;
pub mod theme;
pub mod widgets;

pub use theme::Theme;
