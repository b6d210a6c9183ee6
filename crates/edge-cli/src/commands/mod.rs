//! Slash commands for interactive mode

use std::path::PathBuf;

/// Result of parsing a slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Clear the conversation
    Clear,
    /// Show a message to the user (not sent to the backend)
    Message(String),
    /// Refresh and show the document list
    ListDocuments,
    /// Upload a file into the index
    Upload(PathBuf),
    /// Remove a document from the index
    Delete(String),
    /// Replace the pending scope; empty clears it
    Scope(Vec<String>),
    /// Switch between dark and light
    ToggleTheme,
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse a slash command. Returns `None` for ordinary messages.
pub fn execute_command(input: &str) -> Option<CommandResult> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let (command, args) = match rest.split_once(char::is_whitespace) {
        Some((command, args)) => (command.to_lowercase(), args.trim()),
        None => (rest.to_lowercase(), ""),
    };

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "clear" | "c" => CommandResult::Clear,

        "quit" | "exit" | "q" => CommandResult::Exit,

        "docs" | "d" => CommandResult::ListDocuments,

        "upload" | "u" => {
            if args.is_empty() {
                CommandResult::Message("Usage: /upload <path>".to_string())
            } else {
                CommandResult::Upload(PathBuf::from(args))
            }
        }

        "delete" | "rm" => {
            if args.is_empty() {
                CommandResult::Message("Usage: /delete <name>".to_string())
            } else {
                CommandResult::Delete(args.to_string())
            }
        }

        "scope" | "s" => CommandResult::Scope(split_names(args)),

        "theme" => CommandResult::ToggleTheme,

        _ => CommandResult::Unknown(command),
    })
}

/// Names are comma separated when any comma is present, otherwise whitespace separated
fn split_names(args: &str) -> Vec<String> {
    let parts: Vec<&str> = if args.contains(',') {
        args.split(',').collect()
    } else {
        args.split_whitespace().collect()
    };
    parts
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?          Show this help message
  /docs, /d              List indexed documents
  /upload, /u <path>     Upload a PDF or text file
  /delete, /rm <name>    Remove a document from the index
  /scope, /s [names]     Limit the next question to these documents (no names clears)
  /theme                 Switch between dark and light
  /clear, /c             Clear the conversation
  /quit, /exit, /q       Exit edge

Mention a document with @name in a question to scope it as well.

Examples:
  /upload ~/manuals/pump.pdf
  /scope pump.pdf, wiring notes.txt
  What is the rated pressure? @pump.pdf"#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(execute_command("hello"), None);
        assert_eq!(execute_command("  what is /etc?"), None);
    }

    #[test]
    fn test_basic_commands() {
        assert_eq!(execute_command("/clear"), Some(CommandResult::Clear));
        assert_eq!(execute_command("  /Q  "), Some(CommandResult::Exit));
        assert_eq!(execute_command("/docs"), Some(CommandResult::ListDocuments));
        assert_eq!(execute_command("/theme"), Some(CommandResult::ToggleTheme));
        assert!(matches!(
            execute_command("/help"),
            Some(CommandResult::Message(m)) if m.contains("/upload")
        ));
    }

    #[test]
    fn test_upload_and_delete_args() {
        assert_eq!(
            execute_command("/upload /tmp/my file.pdf"),
            Some(CommandResult::Upload(PathBuf::from("/tmp/my file.pdf")))
        );
        assert_eq!(
            execute_command("/delete notes.txt"),
            Some(CommandResult::Delete("notes.txt".into()))
        );
        assert!(matches!(
            execute_command("/upload"),
            Some(CommandResult::Message(m)) if m.starts_with("Usage")
        ));
    }

    #[test]
    fn test_scope_names() {
        assert_eq!(
            execute_command("/scope a.pdf b.pdf"),
            Some(CommandResult::Scope(vec!["a.pdf".into(), "b.pdf".into()]))
        );
        assert_eq!(
            execute_command("/scope pump manual.pdf, notes.txt"),
            Some(CommandResult::Scope(vec![
                "pump manual.pdf".into(),
                "notes.txt".into()
            ]))
        );
        assert_eq!(execute_command("/scope"), Some(CommandResult::Scope(vec![])));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            execute_command("/frobnicate now"),
            Some(CommandResult::Unknown("frobnicate".into()))
        );
    }
}
