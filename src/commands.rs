use tracing::{debug, info, warn};

use crate::client::SkillRef;
use crate::host::escape_snippet;
use crate::orchestrator::{Exchange, RequestOrchestrator};
use crate::surface::InboundMessage;

/// Editor commands contributed by the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorCommand {
    CodeAsk,
    CodeExplain,
    CodeRefactor,
    CodeOptimize,
    CodeProblem,
}

impl EditorCommand {
    pub const ALL: [EditorCommand; 5] = [
        Self::CodeAsk,
        Self::CodeExplain,
        Self::CodeRefactor,
        Self::CodeOptimize,
        Self::CodeProblem,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::CodeAsk => "semanticKernel.codeAsk",
            Self::CodeExplain => "semanticKernel.codeExplain",
            Self::CodeRefactor => "semanticKernel.codeRefactor",
            Self::CodeOptimize => "semanticKernel.codeOptimize",
            Self::CodeProblem => "semanticKernel.codeProblem",
        }
    }

    /// Accepts the full command id or its short name (`codeExplain`).
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| {
            c.id() == id || c.id().strip_prefix("semanticKernel.") == Some(id)
        })
    }

    pub fn skill(self) -> SkillRef {
        let function = match self {
            Self::CodeAsk => "Ask",
            Self::CodeExplain => "Explain",
            Self::CodeRefactor => "Refactor",
            Self::CodeOptimize => "Optimize",
            Self::CodeProblem => "FindProblem",
        };
        SkillRef::new("Code", function)
    }
}

/// Run an editor command.  `CodeAsk` first asks the user what to do and
/// does nothing if the answer is blank; the others send an empty prompt.
pub async fn run_command(
    orchestrator: &RequestOrchestrator,
    command: EditorCommand,
) -> Option<Exchange> {
    let skill = command.skill();
    let prompt = match command {
        EditorCommand::CodeAsk => {
            let input = orchestrator
                .host()
                .request_input("What do you want to do?")
                .await;
            match input {
                Some(v) if !v.trim().is_empty() => v,
                _ => {
                    debug!(command = command.id(), "no input, command skipped");
                    return None;
                }
            }
        }
        _ => String::new(),
    };

    info!(command = command.id(), skill = %skill, "running command");
    Some(
        orchestrator
            .search(
                Some(&prompt),
                Some(&skill.skill_name),
                Some(&skill.function_name),
            )
            .await,
    )
}

/// Handle a message sent back by the panel.
pub async fn handle_panel_message(
    orchestrator: &RequestOrchestrator,
    message: InboundMessage,
) -> Option<Exchange> {
    match message {
        InboundMessage::CodeSelected { value } => {
            if !orchestrator.behavior().paste_on_click {
                debug!("paste on click disabled, ignoring selected code");
                return None;
            }
            let snippet = escape_snippet(value.as_deref().unwrap_or(""));
            if let Err(e) = orchestrator.host().insert_snippet(&snippet).await {
                warn!(err = %e, "failed to insert snippet");
            }
            None
        }
        InboundMessage::Prompt { value } => Some(
            orchestrator
                .search(value.as_deref(), Some("Code"), Some("Ask"))
                .await,
        ),
    }
}
