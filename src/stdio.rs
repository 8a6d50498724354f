use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use sk_assist::{EditorHost, PanelMessage, PresentationSurface, Result, SkAssistError};

/// Line range selected in the document, 1-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    /// Parse `START:END` or a single line number.
    pub fn parse(s: &str) -> Option<Self> {
        let (start, end) = match s.split_once(':') {
            Some((a, b)) => (a.trim().parse().ok()?, b.trim().parse().ok()?),
            None => {
                let n = s.trim().parse().ok()?;
                (n, n)
            }
        };
        (start >= 1 && end >= start).then_some(Self { start, end })
    }

    fn slice(self, text: &str) -> String {
        text.lines()
            .skip(self.start.saturating_sub(1))
            .take((self.end + 1).saturating_sub(self.start))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Editor stand-in backed by a file on disk.  The file is re-read on every
/// request so edits between requests are picked up.
pub struct FileHost {
    pub path: Option<PathBuf>,
    pub lines: Option<LineRange>,
    /// Answer given when a command asks the user for input.
    pub input: Option<String>,
}

#[async_trait]
impl EditorHost for FileHost {
    async fn selection_text(&self) -> Option<String> {
        let range = self.lines?;
        let text = self.document_text().await?;
        Some(range.slice(&text))
    }

    async fn document_text(&self) -> Option<String> {
        let path = self.path.as_ref()?;
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(path = %path.display(), err = %e, "failed to read document");
                None
            }
        }
    }

    async fn insert_snippet(&self, snippet: &str) -> Result<()> {
        write_json_line(&HostOutput::InsertSnippet {
            value: snippet.to_string(),
        })
    }

    async fn request_input(&self, _prompt: &str) -> Option<String> {
        self.input.clone()
    }
}

/// Panel stand-in that prints each message as a JSON line on stdout.
pub struct StdoutSurface;

#[async_trait]
impl PresentationSurface for StdoutSurface {
    async fn reveal(&self) -> Result<()> {
        Ok(())
    }

    async fn post(&self, message: PanelMessage) -> Result<()> {
        write_json_line(&message)
    }
}

/// Host-side output that is not a panel message.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum HostOutput {
    InsertSnippet { value: String },
}

/// Host-side input read in `--stdio` mode alongside panel messages.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostEvent {
    /// Settings with these keys changed, e.g. `semanticKernel.apiKey`.
    ConfigChanged { keys: Vec<String> },
}

fn write_json_line<T: Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value)
        .map_err(|e| SkAssistError::Config(format!("failed to encode message: {e}")))?;
    debug!(%line, "output");
    let mut out = std::io::stdout().lock();
    writeln!(out, "{line}")?;
    out.flush()?;
    Ok(())
}
