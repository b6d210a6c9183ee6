//! edge - terminal client for a local document-grounded AI assistant

mod commands;
mod config;
mod ui;
mod utils;

use clap::Parser;
use edge_api::BackendClient;
use edge_chat::{
    ChatEvent, DocumentLibrary, ExchangeOutcome, Message, ReadinessConfig, ReadinessMonitor,
    ReadinessState, Scope, StreamAssembler, classify, extract_mentions,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// edge - ask questions about your documents
#[derive(Parser, Debug)]
#[command(name = "edge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend host (default: 127.0.0.1)
    #[arg(long)]
    host: Option<String>,

    /// Backend port (default: 8000)
    #[arg(short, long)]
    port: Option<u16>,

    /// Ask a single question and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Limit the question to this document (repeatable)
    #[arg(long = "source", value_name = "NAME")]
    sources: Vec<String>,

    /// List indexed documents and exit
    #[arg(long)]
    docs: bool,

    /// Upload a document and exit
    #[arg(long, value_name = "PATH")]
    upload: Option<PathBuf>,

    /// Delete a document and exit
    #[arg(long, value_name = "NAME")]
    delete: Option<String>,

    /// Print the backend health report and exit
    #[arg(long)]
    health: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Disable TUI mode (use simple stdin/stdout)
    #[arg(long)]
    no_tui: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("edge=debug,edge_api=debug,edge_chat=debug"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    // Load config file
    let cfg = config::Config::load();

    // Merge config with CLI args (CLI takes precedence)
    let host = args.host.clone().unwrap_or_else(|| cfg.host().to_string());
    let port = args.port.unwrap_or_else(|| cfg.port());
    let client = BackendClient::from_host_port(&host, port)?;
    let library = DocumentLibrary::new(client.clone());

    if args.health {
        return show_health(&client).await;
    }

    if args.docs {
        return list_documents(&library).await;
    }

    if let Some(path) = args.upload {
        return upload_document(&library, &path).await;
    }

    if let Some(name) = args.delete {
        library.delete(&name).await?;
        println!("Deleted {}", name);
        return Ok(());
    }

    let assembler = StreamAssembler::new(Arc::new(client.clone()), cfg.assembler());

    // Non-interactive mode
    if let Some(command) = args.command {
        wait_until_ready(&client, cfg.readiness()).await?;
        library.refresh().await;
        return run_command(&assembler, &library, &command, args.sources).await;
    }

    // TUI mode
    let use_tui = !args.no_tui && cfg.tui.unwrap_or(true);
    if use_tui {
        let theme = edge_tui::Theme::from_name(cfg.theme.as_deref().unwrap_or("dark"));
        return ui::run_tui(client, assembler, library, cfg.readiness(), theme).await;
    }

    // Interactive mode (simple stdin/stdout)
    wait_until_ready(&client, cfg.readiness()).await?;
    run_interactive(&assembler, &library).await
}

async fn show_health(client: &BackendClient) -> anyhow::Result<()> {
    let result = client.health().await;
    match &result {
        Ok(report) => println!("{}", serde_json::to_string_pretty(report)?),
        Err(e) if e.is_unreachable() => {
            println!("Nothing is listening at {}", client.base_url())
        }
        Err(e) => println!("{} is not responding: {}", client.base_url(), e),
    }
    let state = classify(&result).unwrap_or(ReadinessState::Loading);
    println!("state: {}", state);
    Ok(())
}

async fn list_documents(library: &DocumentLibrary) -> anyhow::Result<()> {
    let documents = library.refresh().await;
    if documents.is_empty() {
        println!("No documents indexed.");
    }
    for name in documents {
        println!("{}", name);
    }
    Ok(())
}

async fn upload_document(library: &DocumentLibrary, path: &Path) -> anyhow::Result<()> {
    let receipt = library.upload(path).await?;
    println!(
        "Indexed {} ({} chunks, {})",
        receipt.filename, receipt.chunks_count, receipt.status
    );
    Ok(())
}

/// Block until the backend settles; only `ready` lets the caller continue
async fn wait_until_ready(client: &BackendClient, config: ReadinessConfig) -> anyhow::Result<()> {
    let timeout = config.startup_timeout;
    let monitor = ReadinessMonitor::start(Arc::new(client.clone()), config);

    if io::IsTerminal::is_terminal(&io::stderr()) {
        eprintln!("Waiting for {}...", client.base_url());
    }

    match monitor.wait_for_settled().await {
        ReadinessState::Ready => Ok(()),
        ReadinessState::Setup => anyhow::bail!(
            "The backend is running but its model file is missing. \
             Run the backend's model download script, then try again."
        ),
        ReadinessState::Error => anyhow::bail!(
            "Backend connection failed: {} did not become ready within {}s",
            client.base_url(),
            timeout.as_secs()
        ),
        ReadinessState::Loading => anyhow::bail!("Readiness check stopped before the backend settled"),
    }
}

/// Print only the part of `content` not yet shown
fn print_delta(printed: &mut String, content: &str) {
    match content.strip_prefix(printed.as_str()) {
        Some(new_text) => print!("{}", new_text),
        // The reply was replaced (failure text), start a new line
        None => print!("\n{}", content),
    }
    io::stdout().flush().ok();
    printed.clear();
    printed.push_str(content);
}

/// Stream assistant text to stdout until the exchange ends
fn spawn_printer(mut receiver: broadcast::Receiver<ChatEvent>) -> tokio::task::JoinHandle<String> {
    tokio::spawn(async move {
        let mut printed = String::new();
        loop {
            match receiver.recv().await {
                Ok(ChatEvent::MessageAppended { message, .. })
                | Ok(ChatEvent::MessageUpdated { message, .. })
                    if message.is_assistant() =>
                {
                    print_delta(&mut printed, &message.content);
                }
                Ok(ChatEvent::ExchangeEnd { .. }) => break,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "printer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        printed
    })
}

fn print_footer(message: &Message) {
    if let Some(error) = &message.error {
        println!("Error: {}", error);
    }
    let citations = message.citations();
    if !citations.is_empty() {
        println!("\nSources:");
        for (i, citation) in citations.iter().enumerate() {
            println!("  {}", utils::format_citation(i, citation));
        }
    }
    if let Some(meta) = &message.meta {
        println!("\n[{}]", utils::format_meta(meta));
    }
}

/// Send one question, streaming the reply. Ctrl+C stops the reply.
async fn ask(
    assembler: &StreamAssembler,
    text: &str,
    sources: Option<Vec<String>>,
) -> edge_chat::Result<ExchangeOutcome> {
    let printer = spawn_printer(assembler.subscribe());

    let mut send_future = std::pin::pin!(assembler.send(text, sources));
    let result = tokio::select! {
        result = &mut send_future => result,
        _ = tokio::signal::ctrl_c() => {
            assembler.abort();
            send_future.await
        }
    };

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            printer.abort();
            return Err(e);
        }
    };

    let mut printed = printer.await.unwrap_or_default();
    if let Some(last) = assembler.snapshot().last() {
        print_delta(&mut printed, &last.content);
        println!();
        print_footer(last);
    }
    if outcome == ExchangeOutcome::Cancelled {
        println!("[stopped]");
    }
    Ok(outcome)
}

async fn run_command(
    assembler: &StreamAssembler,
    library: &DocumentLibrary,
    command: &str,
    sources: Vec<String>,
) -> anyhow::Result<()> {
    let unknown = library.unknown(&sources);
    if !unknown.is_empty() {
        anyhow::bail!("Unknown document: {}", unknown.join(", "));
    }

    let mut scope = Scope::new();
    for name in sources {
        scope.add(name);
    }
    let (text, mentioned) = extract_mentions(command, &library.documents());
    for name in mentioned {
        scope.add(name);
    }

    println!("edge> {}", text);
    println!();

    match ask(assembler, &text, scope.take()).await? {
        ExchangeOutcome::Failed { reason } => anyhow::bail!("{}", reason),
        _ => Ok(()),
    }
}

async fn run_interactive(
    assembler: &StreamAssembler,
    library: &DocumentLibrary,
) -> anyhow::Result<()> {
    use commands::{CommandResult, execute_command};

    let mut scope = Scope::new();
    let documents = library.refresh().await;

    // Show minimal startup info (only if TTY)
    if io::IsTerminal::is_terminal(&io::stderr()) {
        eprintln!("edge ({} documents) - /help for commands", documents.len());
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        // Handle slash commands
        if let Some(result) = execute_command(input) {
            match result {
                CommandResult::Clear => match assembler.clear() {
                    Ok(()) => println!("Cleared conversation."),
                    Err(e) => println!("Can't clear: {}", e),
                },
                CommandResult::Exit => break,
                CommandResult::Message(msg) => println!("{}", msg),
                CommandResult::ListDocuments => {
                    let documents = library.refresh().await;
                    if documents.is_empty() {
                        println!("No documents indexed.");
                    }
                    for name in &documents {
                        let marker = if scope.contains(name) { "*" } else { " " };
                        println!("{} {}", marker, name);
                    }
                }
                CommandResult::Upload(path) => {
                    println!("Uploading {}...", path.display());
                    match library.upload(&path).await {
                        Ok(receipt) => println!(
                            "Indexed {} ({} chunks)",
                            receipt.filename, receipt.chunks_count
                        ),
                        Err(e) => println!("Upload failed: {}", e),
                    }
                }
                CommandResult::Delete(name) => {
                    print!("Delete {}? [y/N] ", name);
                    io::stdout().flush()?;
                    let mut answer = String::new();
                    io::stdin().read_line(&mut answer)?;
                    if !utils::is_yes(&answer) {
                        println!("Kept {}.", name);
                        continue;
                    }
                    match library.delete(&name).await {
                        Ok(()) => {
                            scope.remove(&name);
                            println!("Deleted {}", name);
                        }
                        Err(e) => println!("Could not delete {}: {}", name, e),
                    }
                }
                CommandResult::Scope(names) => {
                    let unknown = library.unknown(&names);
                    if names.is_empty() {
                        scope.clear();
                        println!("Scope cleared.");
                    } else if !unknown.is_empty() {
                        println!("Unknown document: {}", unknown.join(", "));
                    } else {
                        scope.clear();
                        println!("Next question limited to {}", names.join(", "));
                        for name in names {
                            scope.add(name);
                        }
                    }
                }
                CommandResult::ToggleTheme => {
                    println!("Themes apply to the TUI only.");
                }
                CommandResult::Unknown(cmd) => {
                    println!("Unknown command: /{}", cmd);
                    println!("Type /help for available commands.");
                }
            }
            println!();
            continue;
        }

        let (text, mentioned) = extract_mentions(input, &library.documents());
        for name in &mentioned {
            scope.add(name.clone());
        }
        if text.is_empty() {
            println!("Scoped to {}. Now ask a question.", mentioned.join(", "));
            continue;
        }

        println!();
        if let Err(e) = ask(assembler, &text, scope.take()).await {
            println!("{}", e);
        }
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_repeatable_sources() {
        let args = Args::parse_from([
            "edge",
            "-c",
            "what torque?",
            "--source",
            "a.pdf",
            "--source",
            "b.pdf",
            "--port",
            "9000",
        ]);
        assert_eq!(args.command.as_deref(), Some("what torque?"));
        assert_eq!(args.sources, vec!["a.pdf", "b.pdf"]);
        assert_eq!(args.port, Some(9000));
        assert!(!args.no_tui);
    }

    #[test]
    fn test_print_delta_tracks_printed_text() {
        let mut printed = String::new();
        print_delta(&mut printed, "Hel");
        print_delta(&mut printed, "Hello");
        assert_eq!(printed, "Hello");
        print_delta(&mut printed, "Connection failed. Please retry.");
        assert_eq!(printed, "Connection failed. Please retry.");
    }
}
