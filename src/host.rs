use async_trait::async_trait;

use crate::error::Result;

/// The editor the assistant is embedded in.
#[async_trait]
pub trait EditorHost: Send + Sync {
    /// Text of the current selection in the active editor, if any.
    async fn selection_text(&self) -> Option<String>;

    /// Full text of the active document, if an editor is open.
    async fn document_text(&self) -> Option<String>;

    /// Insert `snippet` at the cursor using the editor's snippet syntax.
    async fn insert_snippet(&self, snippet: &str) -> Result<()>;

    /// Ask the user for a line of input.  `None` when dismissed.
    async fn request_input(&self, prompt: &str) -> Option<String>;
}

/// Escape `$` so pasted code is not read as snippet placeholders.
///
/// A `$` is escaped when it follows any character other than a backslash and
/// is followed by anything other than `{` or a digit.  Matches are taken left
/// to right without overlap, so the character after an escaped `$` cannot
/// start another match.
pub fn escape_snippet(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    let mut out = String::with_capacity(code.len());
    let mut i = 0;

    while i < chars.len() {
        if i + 2 < chars.len()
            && chars[i] != '\\'
            && chars[i + 1] == '$'
            && chars[i + 2] != '{'
            && !chars[i + 2].is_ascii_digit()
        {
            out.push(chars[i]);
            out.push_str("\\$");
            out.push(chars[i + 2]);
            i += 3;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }

    out
}
