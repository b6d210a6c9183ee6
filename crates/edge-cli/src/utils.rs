//! Shared utilities

use edge_api::{Citation, Meta};

/// Truncate a string to `max` characters, appending "..." if truncated.
/// Operates on Unicode char boundaries, not bytes.
pub fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

/// One numbered citation line for plain output
pub fn format_citation(index: usize, citation: &Citation) -> String {
    format!(
        "[{}] {} p.{}  \"{}\"",
        index + 1,
        citation.source,
        citation.page,
        truncate_chars(citation.text.trim(), 80)
    )
}

/// Generation speed summary
pub fn format_meta(meta: &Meta) -> String {
    format!("{:.1} tokens/sec · {:.1}s", meta.tps, meta.duration)
}

/// Whether a confirmation answer means yes. Anything else, including empty, is no.
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
