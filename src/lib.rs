//! Editor-side request pipeline for Semantic Kernel code skills.
//!
//! The editor supplies the document, selection and settings; this crate
//! builds the prompt, calls `POST {service}/api/skills/{skill}/invoke/{function}`
//! and reports progress and the answer to the side panel as `{type, value}`
//! messages.

pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod host;
pub mod orchestrator;
pub mod prompt;
pub mod surface;

pub use client::{Ask, AskResult, SkillClient, SkillInvoker, SkillRef};
pub use commands::{handle_panel_message, run_command, EditorCommand};
pub use config::{ConfigSnapshot, ConfigStore, FileSettings, Settings, SettingsSource};
pub use error::{ErrorKind, Result, SkAssistError};
pub use host::EditorHost;
pub use orchestrator::{Exchange, RequestOrchestrator, RequestPhase};
pub use prompt::build_prompt;
pub use surface::{InboundMessage, PanelMessage, PresentationSurface};
