use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Result, SkAssistError};

const DEFAULT_TIMEOUT_LENGTH: u64 = 60;

/// Host setting keys whose change triggers a reload.  `endpoint` is declared
/// by the editor's settings schema and has no field in [`Settings`].
pub const WATCHED_KEYS: [&str; 10] = [
    "semanticKernel.apiKey",
    "semanticKernel.deploymentOrModelId",
    "semanticKernel.endpoint",
    "semanticKernel.isOpenAI",
    "semanticKernel.serviceUrl",
    "semanticKernel.azureOpenAiEndpoint",
    "semanticKernel.selectedInsideCodeblock",
    "semanticKernel.pasteOnClick",
    "semanticKernel.keepConversation",
    "semanticKernel.timeoutLength",
];

/// Raw settings as the host stores them.  Every field is optional; a missing
/// value never raises an error.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Can be overridden with the `SK_API_KEY` env var.
    pub api_key: Option<String>,

    /// Can be overridden with the `SK_DEPLOYMENT_OR_MODEL_ID` env var.
    pub deployment_or_model_id: Option<String>,

    /// `true` targets OpenAI, `false` targets Azure OpenAI.
    pub is_open_ai: bool,

    /// Base URL of the skill service, e.g. "http://localhost:7071".
    /// Can be overridden with the `SK_SERVICE_URL` env var.
    pub service_url: Option<String>,

    /// Only sent when `is_open_ai` is false.
    /// Can be overridden with the `SK_AZURE_OPENAI_ENDPOINT` env var.
    pub azure_open_ai_endpoint: Option<String>,

    pub selected_inside_codeblock: bool,
    pub paste_on_click: bool,
    pub keep_conversation: bool,

    /// Seconds; 0 or missing means 60.
    pub timeout_length: u64,
}

impl Settings {
    /// Load settings from the given path, or the default XDG config location,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path(),
        };

        let settings = if config_path.exists() {
            debug!("loading settings from {}", config_path.display());
            let contents = std::fs::read_to_string(&config_path)?;
            toml::from_str(&contents)
                .map_err(|e| SkAssistError::Config(format!("parse error: {e}")))?
        } else {
            debug!("no config file found, using defaults");
            Settings::default()
        };

        Ok(settings.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Replace file values with non-empty overrides from `lookup`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let pick = |key: &str, current: Option<String>| {
            lookup(key).filter(|v| !v.is_empty()).or(current)
        };
        self.api_key = pick("SK_API_KEY", self.api_key.take());
        self.deployment_or_model_id =
            pick("SK_DEPLOYMENT_OR_MODEL_ID", self.deployment_or_model_id.take());
        self.service_url = pick("SK_SERVICE_URL", self.service_url.take());
        self.azure_open_ai_endpoint =
            pick("SK_AZURE_OPENAI_ENDPOINT", self.azure_open_ai_endpoint.take());
        self
    }

    /// Returns the default config file path: `$XDG_CONFIG_HOME/sk-assist/config.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("sk-assist")
            .join("config.toml")
    }

    /// Generate the default config file contents.
    pub fn default_config_contents() -> &'static str {
        include_str!("../config.example.toml")
    }
}

// -- Snapshot ------------------------------------------------------------

/// Which completion backend family the service should route to.  Sent as
/// its integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionBackend {
    AzureOpenAi = 0,
    OpenAi = 1,
}

impl CompletionBackend {
    pub fn header_value(self) -> String {
        (self as u8).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub api_key: Option<String>,
    pub deployment_or_model_id: Option<String>,
    /// Empty for OpenAI.
    pub endpoint: String,
    pub completion_backend: CompletionBackend,
    pub service_url: Option<String>,
}

impl ConnectionConfig {
    /// The service base URL, or `ConfigurationMissing` when none is set.
    pub fn service_url(&self) -> Result<&str> {
        self.service_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(SkAssistError::ConfigurationMissing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorFlags {
    pub selected_inside_codeblock: bool,
    pub paste_on_click: bool,
    pub keep_conversation: bool,
    pub timeout_length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub connection: ConnectionConfig,
    pub behavior: BehaviorFlags,
}

impl From<Settings> for ConfigSnapshot {
    fn from(s: Settings) -> Self {
        let (endpoint, completion_backend) = if s.is_open_ai {
            (String::new(), CompletionBackend::OpenAi)
        } else {
            (
                s.azure_open_ai_endpoint.unwrap_or_default(),
                CompletionBackend::AzureOpenAi,
            )
        };

        Self {
            connection: ConnectionConfig {
                api_key: s.api_key,
                deployment_or_model_id: s.deployment_or_model_id,
                endpoint,
                completion_backend,
                service_url: s.service_url,
            },
            behavior: BehaviorFlags {
                selected_inside_codeblock: s.selected_inside_codeblock,
                paste_on_click: s.paste_on_click,
                keep_conversation: s.keep_conversation,
                timeout_length: if s.timeout_length == 0 {
                    DEFAULT_TIMEOUT_LENGTH
                } else {
                    s.timeout_length
                },
            },
        }
    }
}

// -- Store ---------------------------------------------------------------

/// Where the store reads settings from.  The editor host owns change
/// detection; the store only rebuilds its snapshot when told to.
pub trait SettingsSource: Send + Sync {
    fn settings(&self) -> Settings;
}

/// Fixed settings, for embedding hosts that push values in directly.
impl SettingsSource for Settings {
    fn settings(&self) -> Settings {
        self.clone()
    }
}

/// Settings re-read from a TOML file (plus env overrides) on every load.
pub struct FileSettings {
    path: Option<PathBuf>,
}

impl FileSettings {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl SettingsSource for FileSettings {
    fn settings(&self) -> Settings {
        match Settings::load(self.path.as_deref()) {
            Ok(s) => s,
            Err(e) => {
                warn!(err = %e, "failed to read settings, using defaults");
                Settings::default().with_overrides(|key| std::env::var(key).ok())
            }
        }
    }
}

/// Holds the current connection/behavior snapshot.  Each reload rebuilds the
/// whole snapshot and swaps it in; readers holding the previous `Arc` keep
/// seeing the values they started with.
pub struct ConfigStore {
    source: Arc<dyn SettingsSource>,
    current: RwLock<Arc<ConfigSnapshot>>,
}

impl ConfigStore {
    pub fn new(source: Arc<dyn SettingsSource>) -> Self {
        let snapshot = Arc::new(ConfigSnapshot::from(source.settings()));
        Self {
            source,
            current: RwLock::new(snapshot),
        }
    }

    /// Build a fresh snapshot from the source without storing it.
    pub fn load(&self) -> ConfigSnapshot {
        ConfigSnapshot::from(self.source.settings())
    }

    /// Rebuild the snapshot from the source and make it current.
    pub fn reload(&self) -> Arc<ConfigSnapshot> {
        let snapshot = Arc::new(self.load());
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = snapshot.clone();
        info!(
            backend = ?snapshot.connection.completion_backend,
            service_url = snapshot.connection.service_url.as_deref().unwrap_or(""),
            timeout_length = snapshot.behavior.timeout_length,
            "configuration reloaded"
        );
        snapshot
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Host hook: reload when any changed key touches a watched setting.
    /// Returns whether a reload happened.
    pub fn on_config_keys_changed<S: AsRef<str>>(&self, keys: &[S]) -> bool {
        let relevant = keys
            .iter()
            .any(|k| WATCHED_KEYS.iter().any(|w| affects(k.as_ref(), w)));
        if relevant {
            self.reload();
        }
        relevant
    }
}

/// A change to `changed` affects `watched` when it is the same key or one of
/// its parent sections.
fn affects(changed: &str, watched: &str) -> bool {
    watched == changed
        || watched
            .strip_prefix(changed)
            .is_some_and(|rest| rest.starts_with('.'))
}
