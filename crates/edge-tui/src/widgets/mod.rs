//! Custom widgets for the TUI

pub mod composer;
pub mod document_list;
pub mod message_list;
pub mod picker;
pub mod readiness_panel;
pub mod spinner;

pub use composer::Composer;
pub use document_list::DocumentList;
pub use message_list::MessageList;
pub use picker::{DocumentPicker, PickerState};
pub use readiness_panel::ReadinessPanel;
pub use spinner::Spinner;
