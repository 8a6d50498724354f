use thiserror::Error;

#[derive(Error, Debug)]
pub enum SkAssistError {
    #[error("Semantic Kernel settings missing")]
    ConfigurationMissing,

    /// The service answered with a non-success status. Displays as the
    /// status text alone so the panel line reads `[ERROR] Internal Server Error`.
    #[error("{status_text}")]
    RemoteInvocation { status: u16, status_text: String },

    #[error("{0}")]
    ResponseFormat(String),

    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a failed request, kept alongside the display
/// string so callers can branch without parsing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigurationMissing,
    RemoteInvocation,
    ResponseFormat,
    Transport,
    Local,
}

impl SkAssistError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigurationMissing => ErrorKind::ConfigurationMissing,
            Self::RemoteInvocation { .. } => ErrorKind::RemoteInvocation,
            Self::ResponseFormat(_) => ErrorKind::ResponseFormat,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Config(_) | Self::Io(_) => ErrorKind::Local,
        }
    }

    /// The string posted to the panel for this failure.
    pub fn panel_text(&self) -> String {
        format!("[ERROR] {self}")
    }
}

pub type Result<T> = std::result::Result<T, SkAssistError>;
