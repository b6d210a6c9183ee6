//! TUI implementation for edge

use crate::commands::{CommandResult, execute_command};
use crate::config::Config;
use crate::utils::truncate_chars;
use crossterm::event::{Event, EventStream, MouseEventKind};
use edge_api::{BackendClient, UploadReceipt};
use edge_chat::{
    ChatEvent, DocumentLibrary, ExchangeOutcome, HealthProbe, Message, ReadinessConfig,
    ReadinessMonitor, ReadinessState, Scope, StreamAssembler, extract_mentions,
};
use edge_tui::{
    Theme,
    input::{Action, event_to_action},
    widgets::{
        Composer, DocumentList, DocumentPicker, MessageList, PickerState, ReadinessPanel,
        Spinner, message_list::calculate_message_height,
    },
};
use futures::StreamExt;
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{
        Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap,
    },
};
use std::io::Stdout;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch};

/// Sidebar width on terminals wide enough to show it
const SIDEBAR_WIDTH: u16 = 30;

/// Lines moved per PgUp/PgDn
const PAGE_LINES: usize = 10;

/// Messages sent from the UI and background tasks to the event loop
#[derive(Debug)]
pub enum UiMessage {
    /// User submitted a question
    Submit(String),
    /// Slash command
    Command(String),
    /// Start a fresh readiness monitor
    Retry,
    /// Reload the document list
    RefreshDocuments,
    /// A document list arrived
    Documents(Vec<String>),
    /// An upload finished
    Uploaded(Result<UploadReceipt, String>),
    /// The user confirmed a pending delete
    DeleteConfirmed(String),
    /// A delete finished
    Deleted {
        name: String,
        result: Result<(), String>,
    },
}

/// Everything the loop talks to besides the terminal
struct Services {
    assembler: StreamAssembler,
    library: DocumentLibrary,
    probe: Arc<dyn HealthProbe>,
    readiness: ReadinessConfig,
    ui_tx: mpsc::Sender<UiMessage>,
}

impl Services {
    fn spawn_refresh(&self) {
        let library = self.library.clone();
        let tx = self.ui_tx.clone();
        tokio::spawn(async move {
            let documents = library.refresh().await;
            let _ = tx.send(UiMessage::Documents(documents)).await;
        });
    }

    fn spawn_upload(&self, path: PathBuf) {
        let library = self.library.clone();
        let tx = self.ui_tx.clone();
        tokio::spawn(async move {
            let result = library.upload(&path).await.map_err(|e| e.to_string());
            let _ = tx.send(UiMessage::Uploaded(result)).await;
            let _ = tx.send(UiMessage::Documents(library.documents())).await;
        });
    }

    fn spawn_delete(&self, name: String) {
        let library = self.library.clone();
        let tx = self.ui_tx.clone();
        tokio::spawn(async move {
            let result = library.delete(&name).await.map_err(|e| e.to_string());
            let _ = tx.send(UiMessage::Deleted { name, result }).await;
            let _ = tx.send(UiMessage::Documents(library.documents())).await;
        });
    }
}

/// The current readiness monitor and its subscription
struct ReadinessWatch {
    monitor: ReadinessMonitor,
    rx: watch::Receiver<ReadinessState>,
    /// False once the monitor has settled and dropped its sender
    live: bool,
}

impl ReadinessWatch {
    fn start(services: &Services) -> Self {
        let monitor = ReadinessMonitor::start(services.probe.clone(), services.readiness.clone());
        let rx = monitor.subscribe();
        Self {
            monitor,
            rx,
            live: true,
        }
    }

    async fn changed(&mut self) -> ReadinessState {
        if self.rx.changed().await.is_err() {
            self.live = false;
        }
        *self.rx.borrow_and_update()
    }
}

/// TUI application state
pub struct TuiState {
    /// Transcript snapshot
    messages: Vec<Arc<Message>>,
    /// Message composer
    composer: Composer,
    /// Current scroll position; `usize::MAX` follows the bottom
    scroll: usize,
    /// Largest scroll offset at the last render
    max_scroll: usize,
    /// An exchange is in flight
    is_busy: bool,
    /// Tokens are still arriving
    is_streaming: bool,
    /// Current status message
    status: String,
    /// Theme
    theme: Theme,
    /// Backend readiness
    readiness: ReadinessState,
    readiness_started: Instant,
    startup_timeout: Duration,
    /// Backend base URL, for display
    backend: String,
    /// Indexed documents
    documents: Vec<String>,
    uploading: bool,
    upload_error: Option<String>,
    /// Documents the next question is limited to
    scope: Scope,
    /// Document picker popup
    picker: PickerState,
    /// Popup text (help output and the like)
    notice: Option<String>,
    /// Document waiting on a y/n answer before it is deleted
    confirm_delete: Option<String>,
    /// Channel back to the event loop
    ui_tx: mpsc::Sender<UiMessage>,
    /// Spinner start time for animation
    spinner_start: Instant,
}

impl TuiState {
    pub fn new(
        theme: Theme,
        backend: impl Into<String>,
        startup_timeout: Duration,
        ui_tx: mpsc::Sender<UiMessage>,
    ) -> Self {
        let composer = Composer::new()
            .with_placeholder("Ask about your documents (@name to scope)...")
            .with_locked_placeholder("Waiting for the reply... (Esc to stop)");

        Self {
            messages: Vec::new(),
            composer,
            scroll: usize::MAX,
            max_scroll: 0,
            is_busy: false,
            is_streaming: false,
            status: "Starting".to_string(),
            theme,
            readiness: ReadinessState::Loading,
            readiness_started: Instant::now(),
            startup_timeout,
            backend: backend.into(),
            documents: Vec::new(),
            uploading: false,
            upload_error: None,
            scope: Scope::new(),
            picker: PickerState::default(),
            notice: None,
            confirm_delete: None,
            ui_tx,
            spinner_start: Instant::now(),
        }
    }

    /// Apply a chat event from the assembler
    pub fn handle_chat_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::ExchangeStart { sources, .. } => {
                self.is_busy = true;
                self.spinner_start = Instant::now();
                self.status = match sources {
                    Some(sources) => format!("Searching {} document(s)...", sources.len()),
                    None => "Thinking...".to_string(),
                };
                self.composer.set_locked(true);
                self.scroll_to_bottom();
            }
            ChatEvent::MessageAppended { index, message }
            | ChatEvent::MessageUpdated { index, message } => {
                if index < self.messages.len() {
                    self.messages[index] = message;
                } else if index == self.messages.len() {
                    self.messages.push(message);
                }
            }
            ChatEvent::StreamingChanged { streaming } => {
                self.is_streaming = streaming;
            }
            ChatEvent::DecodeFailed { .. } => {
                self.status = "Skipped a malformed record".to_string();
            }
            ChatEvent::ExchangeEnd { outcome } => {
                self.is_busy = false;
                self.is_streaming = false;
                self.composer.set_locked(false);
                self.status = match outcome {
                    ExchangeOutcome::Completed => "Ready".to_string(),
                    ExchangeOutcome::Cancelled => "Stopped".to_string(),
                    ExchangeOutcome::Failed { reason } => {
                        format!("Request failed: {}", truncate_chars(&reason, 60))
                    }
                };
            }
            ChatEvent::Cleared => {
                self.messages.clear();
                self.scroll_to_bottom();
            }
        }
    }

    /// Apply a broadcast receive result, resyncing from a snapshot after lag
    fn on_chat_recv(
        &mut self,
        event: Result<ChatEvent, broadcast::error::RecvError>,
        assembler: &StreamAssembler,
    ) {
        match event {
            Ok(event) => self.handle_chat_event(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "chat events lagged, resyncing");
                self.messages = assembler.snapshot();
                self.is_streaming = assembler.is_streaming();
            }
            Err(broadcast::error::RecvError::Closed) => {}
        }
    }

    fn set_readiness(&mut self, readiness: ReadinessState, services: &Services) {
        if readiness == self.readiness {
            return;
        }
        tracing::debug!(%readiness, "readiness changed");
        self.readiness = readiness;
        if readiness == ReadinessState::Ready {
            self.status = format!("Connected to {}", self.backend);
            services.spawn_refresh();
        }
    }

    fn set_documents(&mut self, documents: Vec<String>) {
        self.documents = documents;
        self.scope.retain_known(&self.documents);
        self.picker.selected = self
            .picker
            .selected
            .min(self.documents.len().saturating_sub(1));
    }

    fn sync_library(&mut self, library: &DocumentLibrary) {
        self.uploading = library.is_uploading();
        self.upload_error = library.last_error();
    }

    fn toggle_theme(&mut self) {
        self.theme = self.theme.toggled();
        self.status = match Config::persist_theme(self.theme.name) {
            Ok(()) => format!("Theme: {}", self.theme.name),
            Err(e) => format!("Theme: {} (not saved: {})", self.theme.name, e),
        };
    }

    fn set_scope(&mut self, names: Vec<String>, unknown: &[&str]) {
        if names.is_empty() {
            self.scope.clear();
            self.status = "Scope cleared".to_string();
            return;
        }
        if !unknown.is_empty() {
            self.status = format!("Unknown document: {}", unknown.join(", "));
            return;
        }
        self.scope.clear();
        self.status = format!("Next question limited to {}", names.join(", "));
        for name in names {
            self.scope.add(name);
        }
    }

    /// Pull `@name` mentions into the scope and take it for this send
    fn prepare_send(&mut self, content: &str) -> Option<(String, Option<Vec<String>>)> {
        let (text, mentioned) = extract_mentions(content, &self.documents);
        for name in &mentioned {
            self.scope.add(name.clone());
        }
        if text.is_empty() {
            if !mentioned.is_empty() {
                self.status = format!("Scoped to {}, now ask a question", mentioned.join(", "));
            }
            return None;
        }
        Some((text, self.scope.take()))
    }

    fn scroll_to_bottom(&mut self) {
        self.scroll = usize::MAX;
    }

    fn scroll_by(&mut self, delta: isize) {
        let current = self.scroll.min(self.max_scroll);
        self.scroll = current.saturating_add_signed(delta);
    }

    fn overlay_open(&self) -> bool {
        self.picker.visible || self.notice.is_some() || self.confirm_delete.is_some()
    }

    fn on_mouse(&mut self, kind: MouseEventKind) {
        match kind {
            MouseEventKind::ScrollUp => self.scroll_by(-3),
            MouseEventKind::ScrollDown => self.scroll_by(3),
            _ => {}
        }
    }

    fn handle_picker_action(&mut self, action: Action) {
        match action {
            Action::Up => self.picker.up(self.documents.len()),
            Action::Down => self.picker.down(self.documents.len()),
            Action::Char(' ') => {
                self.picker.toggle(&self.documents, &mut self.scope);
            }
            Action::Submit | Action::Escape | Action::PickDocuments | Action::Quit => {
                self.picker.hide();
            }
            _ => {}
        }
    }

    /// Handle a key action. Returns false to quit.
    pub async fn handle_action(&mut self, action: Action, width: u16) -> bool {
        if let Some(name) = self.confirm_delete.take() {
            match action {
                Action::Char('y' | 'Y') => {
                    let _ = self.ui_tx.send(UiMessage::DeleteConfirmed(name)).await;
                }
                Action::Unknown => self.confirm_delete = Some(name),
                _ => self.status = format!("Kept {}", name),
            }
            return true;
        }

        if self.notice.is_some() {
            if action != Action::Unknown {
                self.notice = None;
            }
            return true;
        }

        if self.picker.visible {
            self.handle_picker_action(action);
            return true;
        }

        if action == Action::ToggleTheme {
            self.toggle_theme();
            return true;
        }

        if self.readiness != ReadinessState::Ready {
            match action {
                Action::Char('r') if self.readiness.is_terminal() => {
                    let _ = self.ui_tx.send(UiMessage::Retry).await;
                }
                Action::Char('q') | Action::Quit | Action::Interrupt | Action::Eof => {
                    return false;
                }
                _ => {}
            }
            return true;
        }

        match action {
            Action::Quit => return false,
            Action::Eof | Action::Interrupt if self.composer.content().is_empty() => {
                return false;
            }
            Action::Interrupt => self.composer.clear(),
            Action::Submit => {
                if self.is_busy {
                    return true;
                }
                let content = self.composer.take().trim().to_string();
                if content.is_empty() {
                    return true;
                }
                let message = if content.starts_with('/') {
                    UiMessage::Command(content)
                } else {
                    UiMessage::Submit(content)
                };
                let _ = self.ui_tx.send(message).await;
            }
            Action::Clear => {
                let _ = self.ui_tx.send(UiMessage::Command("/clear".into())).await;
            }
            Action::PickDocuments => {
                self.picker.show();
                let _ = self.ui_tx.send(UiMessage::RefreshDocuments).await;
            }
            Action::Refresh => {
                let _ = self.ui_tx.send(UiMessage::RefreshDocuments).await;
            }
            Action::PageUp => self.scroll_by(-(PAGE_LINES as isize)),
            Action::PageDown => self.scroll_by(PAGE_LINES as isize),
            other => {
                self.composer.handle_action(&other, composer_width(width));
            }
        }
        true
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let size = frame.area();

        if self.readiness != ReadinessState::Ready {
            let panel = ReadinessPanel::new(self.readiness, &self.backend, &self.theme)
                .timing(self.readiness_started.elapsed(), self.startup_timeout);
            frame.render_widget(panel, size);
            self.render_popups(frame, size);
            return;
        }

        // Layout: sidebar | (messages, status bar, composer)
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(sidebar_width(size.width)),
                Constraint::Min(20),
            ])
            .split(size);

        if columns[0].width > 0 {
            let sidebar = DocumentList::new(&self.documents, &self.scope, &self.theme)
                .uploading(self.uploading)
                .error(self.upload_error.as_deref());
            frame.render_widget(sidebar, columns[0]);
        }

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(1),    // Messages
                Constraint::Length(1), // Status
                Constraint::Length(3), // Composer
            ])
            .split(columns[1]);

        self.render_messages(frame, rows[0]);
        self.render_status(frame, rows[1]);

        self.composer.set_title(scope_title(&self.scope));
        self.composer
            .render(rows[2], frame.buffer_mut(), &self.theme);

        if self.picker.visible {
            DocumentPicker::new(&self.documents, &self.scope, &self.theme)
                .with_selected(self.picker.selected)
                .render_centered(size, frame.buffer_mut());
        }

        self.render_popups(frame, size);
    }

    fn render_popups(&self, frame: &mut Frame, area: Rect) {
        if let Some(notice) = &self.notice {
            render_notice(frame, area, notice, " any key to close ", &self.theme);
        }
        if let Some(name) = &self.confirm_delete {
            let text = format!("Delete {}?\nIt is removed from disk and from the index.", name);
            let hint = " y to delete, any other key keeps it ";
            render_notice(frame, area, &text, hint, &self.theme);
        }
    }

    fn render_messages(&mut self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(self.theme.border_style())
            .title(format!(" edge │ {} ", self.backend));

        let inner = block.inner(area);
        frame.render_widget(block, area);

        if inner.height == 0 || self.messages.is_empty() {
            frame.render_widget(Paragraph::new(self.welcome_lines()), inner);
            return;
        }

        let content_height =
            calculate_message_height(&self.messages, inner.width as usize, self.is_streaming);
        self.max_scroll = content_height.saturating_sub(inner.height as usize);

        // Clamp, and resume following once scrolled back to the bottom
        let offset = self.scroll.min(self.max_scroll);
        if offset == self.max_scroll {
            self.scroll = usize::MAX;
        }

        let message_list = MessageList::new(&self.messages, &self.theme)
            .scroll(offset)
            .streaming(self.is_streaming);
        frame.render_widget(message_list, inner);

        if content_height > inner.height as usize {
            let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("↑"))
                .end_symbol(Some("↓"))
                .track_symbol(Some("│"))
                .thumb_symbol("█");

            let mut scrollbar_state = ScrollbarState::new(content_height)
                .position(offset)
                .viewport_content_length(inner.height as usize);

            frame.render_stateful_widget(scrollbar, inner, &mut scrollbar_state);
        }
    }

    fn welcome_lines(&self) -> Vec<Line<'static>> {
        let key = |k: &'static str, what: &'static str| {
            Line::from(vec![
                Span::styled(format!("    {:<10}", k), self.theme.accent_style()),
                Span::styled(what, self.theme.base_style()),
            ])
        };
        vec![
            Line::from(""),
            Line::from(vec![
                Span::styled("  edge", self.theme.accent_bold()),
                Span::styled(" - ask questions about your documents", self.theme.dim_style()),
            ]),
            Line::from(""),
            Line::from(Span::styled(
                format!("  {} document(s) indexed", self.documents.len()),
                self.theme.dim_style(),
            )),
            Line::from(""),
            Line::from(Span::styled("  Keybindings", self.theme.warning_style())),
            Line::from(""),
            key("Enter", "Send message"),
            key("@name", "Limit the question to a document"),
            key("Ctrl+O", "Pick documents to search"),
            key("Ctrl+R", "Reload the document list"),
            key("Ctrl+T", "Switch theme"),
            key("Ctrl+L", "Clear conversation"),
            key("Esc", "Stop the reply"),
            key("Ctrl+Q", "Quit"),
            key("PgUp/Dn", "Scroll history"),
            Line::from(""),
            Line::from(Span::styled(
                "  Type /help for commands, /upload <path> to add a file.",
                self.theme.dim_style(),
            )),
        ]
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        if self.is_busy {
            let spinner =
                Spinner::new(&self.status, &self.theme).with_start_time(self.spinner_start);
            frame.render_widget(spinner, area);
            return;
        }

        let left_content = self.status.clone();
        let right_content = "Ctrl+O: scope │ Ctrl+T: theme │ Ctrl+Q: quit";

        let left_width = left_content.chars().count();
        let right_width = right_content.chars().count();
        let available = area.width as usize;

        let line = if left_width + right_width + 2 <= available {
            let spacing = available - left_width - right_width;
            Line::from(vec![
                Span::styled(left_content, self.theme.dim_style()),
                Span::raw(" ".repeat(spacing)),
                Span::styled(right_content, self.theme.dim_style()),
            ])
        } else {
            Line::from(Span::styled(left_content, self.theme.dim_style()))
        };

        frame.render_widget(Paragraph::new(line), area);
    }
}

fn sidebar_width(total: u16) -> u16 {
    if total >= 80 { SIDEBAR_WIDTH } else { 0 }
}

fn composer_width(total: u16) -> u16 {
    total.saturating_sub(sidebar_width(total)).saturating_sub(2)
}

fn scope_title(scope: &Scope) -> Option<String> {
    if scope.is_empty() {
        None
    } else {
        Some(truncate_chars(&format!("Scope: {}", scope.names().join(", ")), 60))
    }
}

fn render_notice(frame: &mut Frame, area: Rect, text: &str, hint: &str, theme: &Theme) {
    let width = area.width.saturating_sub(4).min(76);
    let height = (text.lines().count() as u16 + 3).min(area.height);
    let popup = Rect::new(
        area.x + area.width.saturating_sub(width) / 2,
        area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    );
    frame.render_widget(Clear, popup);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme.accent_style())
        .title(" edge ")
        .title_bottom(hint.to_string());
    let paragraph = Paragraph::new(text.to_string())
        .style(theme.base_style())
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, popup);
}

/// Execute a slash command. Returns false to quit.
fn run_command(state: &mut TuiState, input: &str, services: &Services) -> bool {
    let Some(result) = execute_command(input) else {
        return true;
    };

    match result {
        CommandResult::Clear => {
            if let Err(e) = services.assembler.clear() {
                state.status = format!("Can't clear: {}", e);
            } else {
                state.status = "Cleared conversation".to_string();
            }
        }
        CommandResult::Message(message) => state.notice = Some(message),
        CommandResult::ListDocuments => {
            state.status = "Refreshing documents...".to_string();
            services.spawn_refresh();
        }
        CommandResult::Upload(path) => {
            state.status = format!("Uploading {}...", path.display());
            services.library.clear_error();
            services.spawn_upload(path);
        }
        CommandResult::Delete(name) => state.confirm_delete = Some(name),
        CommandResult::Scope(names) => {
            let unknown = services.library.unknown(&names);
            state.set_scope(names.clone(), &unknown);
        }
        CommandResult::ToggleTheme => state.toggle_theme(),
        CommandResult::Exit => return false,
        CommandResult::Unknown(command) => {
            state.status = format!("Unknown command: /{} (try /help)", command);
        }
    }
    true
}

/// Handle a queued UI message. Returns false to quit.
fn handle_ui_message(
    state: &mut TuiState,
    message: UiMessage,
    services: &Services,
    readiness: &mut ReadinessWatch,
    pending: &mut Option<(String, Option<Vec<String>>)>,
) -> bool {
    match message {
        UiMessage::Submit(content) => {
            if state.is_busy {
                state.status = "Wait for the current reply to finish".to_string();
            } else {
                *pending = state.prepare_send(&content);
            }
        }
        UiMessage::Command(command) => return run_command(state, &command, services),
        UiMessage::Retry => {
            *readiness = ReadinessWatch::start(services);
            state.readiness = readiness.monitor.state();
            state.readiness_started = Instant::now();
        }
        UiMessage::RefreshDocuments => services.spawn_refresh(),
        UiMessage::DeleteConfirmed(name) => {
            state.status = format!("Deleting {}...", name);
            state.scope.remove(&name);
            services.spawn_delete(name);
        }
        UiMessage::Documents(documents) => state.set_documents(documents),
        UiMessage::Uploaded(Ok(receipt)) => {
            state.status = format!(
                "Indexed {} ({} chunks)",
                receipt.filename, receipt.chunks_count
            );
        }
        UiMessage::Uploaded(Err(e)) => state.status = format!("Upload failed: {}", e),
        UiMessage::Deleted {
            name,
            result: Ok(()),
        } => state.status = format!("Deleted {}", name),
        UiMessage::Deleted {
            name,
            result: Err(e),
        } => state.status = format!("Could not delete {}: {}", name, e),
    }
    true
}

/// Run the TUI application
pub async fn run_tui(
    client: BackendClient,
    assembler: StreamAssembler,
    library: DocumentLibrary,
    readiness: ReadinessConfig,
    theme: Theme,
) -> anyhow::Result<()> {
    use crossterm::{
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    };
    use std::io;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (ui_tx, ui_rx) = mpsc::channel::<UiMessage>(32);
    let state = TuiState::new(theme, client.base_url(), readiness.startup_timeout, ui_tx.clone());
    let services = Services {
        assembler,
        library,
        probe: Arc::new(client),
        readiness,
        ui_tx,
    };

    let result = event_loop(&mut terminal, state, &services, ui_rx).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    mut state: TuiState,
    services: &Services,
    mut ui_rx: mpsc::Receiver<UiMessage>,
) -> anyhow::Result<()> {
    let mut chat_rx = services.assembler.subscribe();
    let mut readiness = ReadinessWatch::start(services);
    let mut event_stream = EventStream::new();

    // Tick interval for animations (80ms for smooth spinner)
    let mut tick_interval = tokio::time::interval(Duration::from_millis(80));

    // Question waiting to be sent, started at the top of the next iteration
    let mut pending: Option<(String, Option<Vec<String>>)> = None;

    loop {
        if let Some((text, sources)) = pending.take() {
            let abort = services.assembler.handle();
            let mut send_future = std::pin::pin!(services.assembler.send(&text, sources));

            // Poll the exchange alongside everything else until it resolves
            loop {
                state.sync_library(&services.library);
                terminal.draw(|frame| state.render(frame))?;
                let width = terminal.size()?.width;

                tokio::select! {
                    biased;

                    result = &mut send_future => {
                        if let Err(e) = result {
                            state.status = e.to_string();
                        }
                        break;
                    }

                    event = chat_rx.recv() => state.on_chat_recv(event, &services.assembler),

                    event = event_stream.next() => match event {
                        Some(Ok(Event::Mouse(mouse))) => state.on_mouse(mouse.kind),
                        Some(Ok(event)) => match event_to_action(event) {
                            Some(Action::Interrupt | Action::Escape) if !state.overlay_open() => {
                                abort.abort();
                                state.status = "Stopping...".to_string();
                            }
                            Some(action) => {
                                if !state.handle_action(action, width).await {
                                    return Ok(());
                                }
                            }
                            None => {}
                        },
                        Some(Err(_)) | None => return Ok(()),
                    },

                    Some(message) = ui_rx.recv() => {
                        if !handle_ui_message(&mut state, message, services, &mut readiness, &mut pending) {
                            return Ok(());
                        }
                    }

                    next = readiness.changed(), if readiness.live => state.set_readiness(next, services),

                    _ = tick_interval.tick() => {}
                }
            }

            // Drain any remaining chat events after the exchange completes
            while let Ok(event) = chat_rx.try_recv() {
                state.handle_chat_event(event);
            }
            continue;
        }

        state.sync_library(&services.library);
        terminal.draw(|frame| state.render(frame))?;
        let width = terminal.size()?.width;

        tokio::select! {
            biased;

            event = chat_rx.recv() => state.on_chat_recv(event, &services.assembler),

            event = event_stream.next() => match event {
                Some(Ok(Event::Mouse(mouse))) => state.on_mouse(mouse.kind),
                Some(Ok(Event::Resize(_, _))) => {}
                Some(Ok(event)) => {
                    if let Some(action) = event_to_action(event) {
                        if !state.handle_action(action, width).await {
                            return Ok(());
                        }
                    }
                }
                Some(Err(_)) | None => return Ok(()),
            },

            Some(message) = ui_rx.recv() => {
                if !handle_ui_message(&mut state, message, services, &mut readiness, &mut pending) {
                    return Ok(());
                }
            }

            next = readiness.changed(), if readiness.live => state.set_readiness(next, services),

            _ = tick_interval.tick() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_api::Role;

    fn state() -> (TuiState, mpsc::Receiver<UiMessage>) {
        let (tx, rx) = mpsc::channel(8);
        let state = TuiState::new(
            Theme::dark(),
            "http://127.0.0.1:8000",
            Duration::from_secs(30),
            tx,
        );
        (state, rx)
    }

    fn ready_state() -> (TuiState, mpsc::Receiver<UiMessage>) {
        let (mut state, rx) = state();
        state.readiness = ReadinessState::Ready;
        (state, rx)
    }

    #[test]
    fn test_chat_events_track_transcript() {
        let (mut state, _rx) = ready_state();
        state.handle_chat_event(ChatEvent::ExchangeStart {
            message: "hi".into(),
            sources: None,
        });
        assert!(state.is_busy);
        assert!(state.composer.is_locked());

        state.handle_chat_event(ChatEvent::MessageAppended {
            index: 0,
            message: Arc::new(Message::user("hi")),
        });
        state.handle_chat_event(ChatEvent::MessageAppended {
            index: 1,
            message: Arc::new(Message::placeholder()),
        });
        state.handle_chat_event(ChatEvent::MessageUpdated {
            index: 1,
            message: Arc::new(Message::assistant("Hello")),
        });
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].role, Role::Assistant);
        assert_eq!(state.messages[1].content, "Hello");

        state.handle_chat_event(ChatEvent::ExchangeEnd {
            outcome: ExchangeOutcome::Completed,
        });
        assert!(!state.is_busy);
        assert!(!state.composer.is_locked());

        state.handle_chat_event(ChatEvent::Cleared);
        assert!(state.messages.is_empty());
    }

    #[test]
    fn test_failed_outcome_sets_status() {
        let (mut state, _rx) = ready_state();
        state.handle_chat_event(ChatEvent::ExchangeEnd {
            outcome: ExchangeOutcome::Failed {
                reason: "connection refused".into(),
            },
        });
        assert_eq!(state.status, "Request failed: connection refused");
    }

    #[test]
    fn test_prepare_send_takes_scope() {
        let (mut state, _rx) = ready_state();
        state.set_documents(vec!["a.pdf".into(), "b.pdf".into()]);
        state.scope.add("b.pdf");

        let (text, sources) = state.prepare_send("what is @a.pdf about").unwrap();
        assert_eq!(text, "what is about");
        assert_eq!(sources, Some(vec!["b.pdf".to_string(), "a.pdf".to_string()]));
        assert!(state.scope.is_empty());
    }

    #[test]
    fn test_prepare_send_mention_only_keeps_scope() {
        let (mut state, _rx) = ready_state();
        state.set_documents(vec!["a.pdf".into()]);
        assert!(state.prepare_send("@a.pdf").is_none());
        assert!(state.scope.contains("a.pdf"));
    }

    #[test]
    fn test_set_scope_rejects_unknown() {
        let (mut state, _rx) = ready_state();
        state.set_documents(vec!["a.pdf".into()]);
        state.set_scope(vec!["nope.pdf".into()], &["nope.pdf"]);
        assert!(state.scope.is_empty());
        assert!(state.status.contains("nope.pdf"));

        state.set_scope(vec!["a.pdf".into()], &[]);
        assert!(state.scope.contains("a.pdf"));
        state.set_scope(vec![], &[]);
        assert!(state.scope.is_empty());
    }

    #[test]
    fn test_documents_prune_scope() {
        let (mut state, _rx) = ready_state();
        state.set_documents(vec!["a.pdf".into(), "b.pdf".into()]);
        state.scope.add("b.pdf");
        state.picker.selected = 1;
        state.set_documents(vec!["a.pdf".into()]);
        assert!(state.scope.is_empty());
        assert_eq!(state.picker.selected, 0);
    }

    #[tokio::test]
    async fn test_submit_routes_commands_and_messages() {
        let (mut state, mut rx) = ready_state();
        for c in "/docs".chars() {
            state.handle_action(Action::Char(c), 120).await;
        }
        assert!(state.handle_action(Action::Submit, 120).await);
        assert!(matches!(rx.recv().await, Some(UiMessage::Command(c)) if c == "/docs"));

        for c in "hello".chars() {
            state.handle_action(Action::Char(c), 120).await;
        }
        state.handle_action(Action::Submit, 120).await;
        assert!(matches!(rx.recv().await, Some(UiMessage::Submit(c)) if c == "hello"));
        assert!(state.composer.content().is_empty());
    }

    #[tokio::test]
    async fn test_submit_ignored_while_busy() {
        let (mut state, mut rx) = ready_state();
        state.handle_action(Action::Char('x'), 120).await;
        state.is_busy = true;
        state.handle_action(Action::Submit, 120).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_retry_only_on_settled_screens() {
        let (mut state, mut rx) = state();
        state.handle_action(Action::Char('r'), 120).await;
        assert!(rx.try_recv().is_err());

        state.readiness = ReadinessState::Error;
        state.handle_action(Action::Char('r'), 120).await;
        assert!(matches!(rx.try_recv(), Ok(UiMessage::Retry)));
        assert!(!state.handle_action(Action::Char('q'), 120).await);
    }

    #[tokio::test]
    async fn test_picker_toggles_scope() {
        let (mut state, _rx) = ready_state();
        state.set_documents(vec!["a.pdf".into(), "b.pdf".into()]);
        state.handle_action(Action::PickDocuments, 120).await;
        assert!(state.picker.visible);

        state.handle_action(Action::Down, 120).await;
        state.handle_action(Action::Char(' '), 120).await;
        assert!(state.scope.contains("b.pdf"));

        state.handle_action(Action::Submit, 120).await;
        assert!(!state.picker.visible);
    }

    #[tokio::test]
    async fn test_delete_waits_for_confirmation() {
        let (mut state, mut rx) = ready_state();
        state.confirm_delete = Some("a.pdf".into());
        assert!(state.overlay_open());

        // Anything but y keeps the document
        assert!(state.handle_action(Action::Char('n'), 120).await);
        assert!(state.confirm_delete.is_none());
        assert_eq!(state.status, "Kept a.pdf");
        assert!(rx.try_recv().is_err());

        state.confirm_delete = Some("a.pdf".into());
        state.handle_action(Action::Unknown, 120).await;
        assert!(state.confirm_delete.is_some());

        state.handle_action(Action::Char('y'), 120).await;
        assert!(state.confirm_delete.is_none());
        assert!(matches!(rx.try_recv(), Ok(UiMessage::DeleteConfirmed(name)) if name == "a.pdf"));
        assert!(state.composer.content().is_empty());
    }

    #[tokio::test]
    async fn test_delete_command_asks_first() {
        let (mut state, _rx) = ready_state();
        let client = BackendClient::new("http://127.0.0.1:9").unwrap();
        let services = Services {
            assembler: StreamAssembler::new(Arc::new(client.clone()), Default::default()),
            library: DocumentLibrary::new(client.clone()),
            probe: Arc::new(client),
            readiness: ReadinessConfig::default(),
            ui_tx: state.ui_tx.clone(),
        };
        state.scope.add("a.pdf");

        assert!(run_command(&mut state, "/delete a.pdf", &services));
        assert_eq!(state.confirm_delete.as_deref(), Some("a.pdf"));
        // Nothing changes until the answer arrives
        assert!(state.scope.contains("a.pdf"));
        assert!(!state.status.starts_with("Deleting"));
    }

    #[tokio::test]
    async fn test_notice_dismissed_by_any_key() {
        let (mut state, _rx) = ready_state();
        state.notice = Some("help".into());
        assert!(state.handle_action(Action::Char('a'), 120).await);
        assert!(state.notice.is_none());
        assert!(state.composer.content().is_empty());
    }

    #[test]
    fn test_scroll_follows_bottom() {
        let (mut state, _rx) = ready_state();
        state.max_scroll = 40;
        state.scroll_by(-(PAGE_LINES as isize));
        assert_eq!(state.scroll, 30);
        state.scroll_by(PAGE_LINES as isize);
        assert_eq!(state.scroll, 40);
    }
}
