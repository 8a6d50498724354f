use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::client::{Ask, SkillInvoker, SkillRef};
use crate::config::{BehaviorFlags, ConfigStore};
use crate::error::{ErrorKind, SkAssistError};
use crate::host::EditorHost;
use crate::prompt::build_prompt;
use crate::surface::{PanelMessage, PresentationSurface, PENDING_RESPONSE};

/// Where a request is in its lifecycle.  Every request starts at `Idle`
/// and ends at `Completed` or `Failed` before the orchestrator is idle again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Idle,
    ConfigValidated,
    PromptBuilt,
    AwaitingRemote,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SkAssistError> for Failure {
    fn from(e: &SkAssistError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Everything one `search` call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Increases by one per request on this orchestrator.
    pub id: u64,
    pub skill: SkillRef,
    /// The prompt as the user typed it.
    pub prompt: Option<String>,
    /// The prompt as sent; `None` when the request never got that far.
    pub full_prompt: Option<String>,
    /// The final text posted to the panel.
    pub response: String,
    pub failure: Option<Failure>,
    /// `Completed` or `Failed`.
    pub phase: RequestPhase,
}

impl Exchange {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Coordinates one editor request: settings check, prompt assembly, the
/// skill call, and the panel notifications around it.
///
/// Requests are not serialized.  Two overlapping `search` calls both post
/// their final response, and whichever finishes last is what the panel
/// shows.  Each request reads its own config snapshot up front, so a reload
/// mid-flight only affects later requests.
pub struct RequestOrchestrator {
    config: Arc<ConfigStore>,
    invoker: Arc<dyn SkillInvoker>,
    host: Arc<dyn EditorHost>,
    surface: Arc<dyn PresentationSurface>,
    next_id: AtomicU64,
    last: Mutex<Option<Exchange>>,
}

impl RequestOrchestrator {
    pub fn new(
        config: Arc<ConfigStore>,
        invoker: Arc<dyn SkillInvoker>,
        host: Arc<dyn EditorHost>,
        surface: Arc<dyn PresentationSurface>,
    ) -> Self {
        Self {
            config,
            invoker,
            host,
            surface,
            next_id: AtomicU64::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn behavior(&self) -> BehaviorFlags {
        self.config.snapshot().behavior.clone()
    }

    pub fn host(&self) -> &Arc<dyn EditorHost> {
        &self.host
    }

    /// The most recently finished exchange, if any.
    pub fn last_exchange(&self) -> Option<Exchange> {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Run `function` of `skill` against the current selection (or the
    /// whole document).  Missing or empty skill/function names default to
    /// `Code`/`Ask`.
    ///
    /// Never fails: errors become an `[ERROR] ...` panel line and are
    /// recorded on the returned exchange.
    pub async fn search(
        &self,
        prompt: Option<&str>,
        skill: Option<&str>,
        function: Option<&str>,
    ) -> Exchange {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let skill = resolve_skill(skill, function);
        let prompt = prompt.map(str::to_string);
        let snapshot = self.config.snapshot();
        trace_phase(id, RequestPhase::Idle);

        self.reveal().await;

        if let Err(e) = snapshot.connection.service_url() {
            warn!(id, skill = %skill, "skill service settings missing, request not sent");
            return self
                .finish(Exchange {
                    id,
                    skill,
                    prompt,
                    full_prompt: None,
                    response: e.panel_text(),
                    failure: Some(Failure::from(&e)),
                    phase: RequestPhase::Failed,
                })
                .await;
        }
        trace_phase(id, RequestPhase::ConfigValidated);

        let selection = self.host.selection_text().await;
        let document = self.host.document_text().await.unwrap_or_default();
        let full_prompt = build_prompt(
            prompt.as_deref(),
            selection.as_deref(),
            &document,
            snapshot.behavior.selected_inside_codeblock,
        );
        trace_phase(id, RequestPhase::PromptBuilt);

        self.post(PanelMessage::SetPrompt(prompt.clone())).await;
        self.post(PanelMessage::AddResponse(PENDING_RESPONSE.to_string()))
            .await;

        trace_phase(id, RequestPhase::AwaitingRemote);
        debug!(
            id,
            skill = %skill,
            prompt_len = full_prompt.len(),
            from_selection = selection.as_deref().is_some_and(|s| !s.is_empty()),
            "sending prompt"
        );

        let ask = Ask {
            value: full_prompt.clone(),
        };
        let timeout = Duration::from_secs(snapshot.behavior.timeout_length);
        let outcome = self
            .invoker
            .invoke(&ask, &skill, &snapshot.connection, timeout)
            .await;

        let exchange = match outcome {
            Ok(result) => Exchange {
                id,
                skill,
                prompt,
                full_prompt: Some(full_prompt),
                response: result.value,
                failure: None,
                phase: RequestPhase::Completed,
            },
            Err(e) => {
                error!(id, skill = %skill, err = %e, kind = ?e.kind(), "skill request failed");
                Exchange {
                    id,
                    skill,
                    prompt,
                    full_prompt: Some(full_prompt),
                    response: e.panel_text(),
                    failure: Some(Failure::from(&e)),
                    phase: RequestPhase::Failed,
                }
            }
        };

        self.finish(exchange).await
    }

    /// Post the final response, remember the exchange, and return it.
    async fn finish(&self, exchange: Exchange) -> Exchange {
        trace_phase(exchange.id, exchange.phase);
        self.reveal().await;
        self.post(PanelMessage::AddResponse(exchange.response.clone()))
            .await;

        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(exchange.clone());

        info!(
            id = exchange.id,
            skill = %exchange.skill,
            ok = exchange.is_success(),
            "request finished"
        );
        trace_phase(exchange.id, RequestPhase::Idle);
        exchange
    }

    async fn reveal(&self) {
        if let Err(e) = self.surface.reveal().await {
            warn!(err = %e, "failed to reveal panel");
        }
    }

    async fn post(&self, message: PanelMessage) {
        if let Err(e) = self.surface.post(message).await {
            error!(err = %e, "failed to post to panel");
        }
    }
}

fn resolve_skill(skill: Option<&str>, function: Option<&str>) -> SkillRef {
    let default = SkillRef::default();
    SkillRef {
        skill_name: skill
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or(default.skill_name),
        function_name: function
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .unwrap_or(default.function_name),
    }
}

fn trace_phase(id: u64, phase: RequestPhase) {
    debug!(id, ?phase, "request phase");
}
