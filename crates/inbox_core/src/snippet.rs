/// Turns raw preview text into what the inbox row shows.
pub trait SnippetFormatter: Send + Sync {
    fn format(&self, raw: &str) -> String;
}

/// Collapses whitespace and caps the preview at `max_chars` characters.
#[derive(Debug, Clone, Copy)]
pub struct PlainSnippet {
    pub max_chars: usize,
}

impl SnippetFormatter for PlainSnippet {
    fn format(&self, raw: &str) -> String {
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        match collapsed.char_indices().nth(self.max_chars) {
            Some((cut, _)) => collapsed[..cut].trim_end().to_string(),
            None => collapsed,
        }
    }
}
