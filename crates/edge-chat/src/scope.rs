//! Retrieval scope: documents the next message is restricted to

/// Ordered set of document names, cleared after each send
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    names: Vec<String>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a name. Returns `false` if it was already present.
    pub fn add(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.names.push(name);
        true
    }

    /// Remove a name. Returns `false` if it was not present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.names.len();
        self.names.retain(|n| n != name);
        self.names.len() != before
    }

    /// Flip membership. Returns whether the name is now in scope.
    pub fn toggle(&mut self, name: &str) -> bool {
        if self.remove(name) {
            false
        } else {
            self.names.push(name.to_string());
            true
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Drop names that are no longer in `known`
    pub fn retain_known(&mut self, known: &[String]) {
        self.names.retain(|n| known.contains(n));
    }

    /// Take the names as request sources, leaving the scope empty.
    /// An empty scope yields `None`.
    pub fn take(&mut self) -> Option<Vec<String>> {
        if self.names.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.names))
        }
    }
}

/// Strip `@name` mentions of known documents from `text`.
///
/// A mention must start the text or follow whitespace. When several names
/// match at the same spot the longest wins, so `@report 2024.pdf` is not
/// taken as `@report`. Returns the remaining text and the mentioned names in
/// order of first appearance.
pub fn extract_mentions(text: &str, known: &[String]) -> (String, Vec<String>) {
    let mut candidates: Vec<&String> = known.iter().filter(|n| !n.is_empty()).collect();
    candidates.sort_by_key(|n| std::cmp::Reverse(n.len()));

    let mut out = String::with_capacity(text.len());
    let mut mentioned: Vec<String> = Vec::new();
    let mut rest = text;
    let mut at_boundary = true;

    while let Some(c) = rest.chars().next() {
        if c == '@' && at_boundary {
            let after = &rest[1..];
            let hit = candidates.iter().find(|name| {
                after.starts_with(name.as_str())
                    && after[name.len()..]
                        .chars()
                        .next()
                        .is_none_or(|next| next.is_whitespace() || ",.;:!?".contains(next))
            });
            if let Some(name) = hit {
                if !mentioned.iter().any(|m| m == *name) {
                    mentioned.push((*name).clone());
                }
                rest = &after[name.len()..];
                if rest.starts_with(' ') {
                    rest = &rest[1..];
                }
                continue;
            }
        }
        out.push(c);
        at_boundary = c.is_whitespace();
        rest = &rest[c.len_utf8()..];
    }

    (out.trim().to_string(), mentioned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> Vec<String> {
        vec![
            "report.pdf".into(),
            "report 2024.pdf".into(),
            "notes.txt".into(),
        ]
    }

    #[test]
    fn test_scope_set_semantics() {
        let mut scope = Scope::new();
        assert!(scope.add("a.pdf"));
        assert!(!scope.add("a.pdf"));
        assert!(scope.toggle("b.pdf"));
        assert!(!scope.toggle("a.pdf"));
        assert_eq!(scope.names(), &["b.pdf".to_string()]);
        assert!(scope.remove("b.pdf"));
        assert!(!scope.remove("b.pdf"));
        assert!(scope.is_empty());
    }

    #[test]
    fn test_take_clears() {
        let mut scope = Scope::new();
        assert_eq!(scope.take(), None);

        scope.add("a.pdf");
        scope.add("b.pdf");
        assert_eq!(
            scope.take(),
            Some(vec!["a.pdf".to_string(), "b.pdf".to_string()])
        );
        assert!(scope.is_empty());
        assert_eq!(scope.take(), None);
    }

    #[test]
    fn test_retain_known() {
        let mut scope = Scope::new();
        scope.add("report.pdf");
        scope.add("deleted.pdf");
        scope.retain_known(&known());
        assert_eq!(scope.names(), &["report.pdf".to_string()]);
    }

    #[test]
    fn test_extract_mentions() {
        let (text, names) = extract_mentions("@notes.txt what changed?", &known());
        assert_eq!(text, "what changed?");
        assert_eq!(names, vec!["notes.txt"]);
    }

    #[test]
    fn test_extract_longest_match() {
        let (text, names) =
            extract_mentions("compare @report 2024.pdf and @report.pdf", &known());
        assert_eq!(text, "compare and");
        assert_eq!(names, vec!["report 2024.pdf", "report.pdf"]);
    }

    #[test]
    fn test_extract_ignores_unknown_and_inline_at() {
        let (text, names) = extract_mentions("mail me@notes.txt about @other.pdf", &known());
        assert_eq!(text, "mail me@notes.txt about @other.pdf");
        assert!(names.is_empty());
    }

    #[test]
    fn test_extract_dedupes_and_allows_punctuation() {
        let (text, names) = extract_mentions("@notes.txt, then @notes.txt again", &known());
        assert_eq!(text, ", then again");
        assert_eq!(names, vec!["notes.txt"]);
    }
}
