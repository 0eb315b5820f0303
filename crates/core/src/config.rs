//! Configuration management for Concierge.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config file (`.concierge/config.yaml`, or the path in `CONCIERGE_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! The backend set, classifier threshold and orchestration budget are all
//! read once at startup and treated as immutable afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Apology returned when no backend produced a usable answer.
pub const DEFAULT_FALLBACK_ANSWER: &str = "죄송하지만 관련 정보를 찾을 수 없습니다. \
     서비스와 관련된 구체적인 질문을 해주시면 더 정확한 답변을 드릴 수 있습니다.";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .concierge/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Default cloud project for backends that do not name one
    pub project_id: Option<String>,

    /// Configured search/answer backends
    pub backends: Vec<BackendConfig>,

    /// Discovery Engine request settings shared by all discovery backends
    pub discovery: DiscoveryConfig,

    /// Credential source settings
    pub auth: AuthConfig,

    /// Fan-out budget and merge caps
    pub orchestrator: OrchestratorConfig,

    /// Sensitive-query classifier settings
    pub classifier: ClassifierConfig,

    /// In-memory session settings
    pub session: SessionConfig,

    /// Handoff notification settings
    pub notifier: NotifierConfig,

    /// Conversation log settings
    pub conversation_log: ConversationLogConfig,
}

/// One configured search/answer backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// Unique backend identifier (e.g., "faq", "manuals")
    pub id: String,

    /// Backend implementation ("discovery" or "mock")
    #[serde(default = "default_backend_kind")]
    pub kind: String,

    /// Project override; falls back to the global project id
    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default = "default_location")]
    pub location: String,

    #[serde(default = "default_collection")]
    pub collection_id: String,

    /// Search engine (app) id
    #[serde(default)]
    pub engine_id: String,

    #[serde(default = "default_serving_config")]
    pub serving_config_id: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Page size requested from the search step
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Merge priority; larger values win
    #[serde(default)]
    pub priority: i32,

    /// Marks the backend whose answer is preferred; others are fallbacks
    #[serde(default)]
    pub primary: bool,

    /// Per-call timeout in milliseconds (never exceeds the orchestrator deadline)
    #[serde(default = "default_backend_timeout_ms")]
    pub timeout_ms: u64,
}

impl BackendConfig {
    /// Create a backend config with defaults for everything but the id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: default_backend_kind(),
            project_id: None,
            location: default_location(),
            collection_id: default_collection(),
            engine_id: String::new(),
            serving_config_id: default_serving_config(),
            enabled: true,
            max_results: default_max_results(),
            priority: 0,
            primary: false,
            timeout_ms: default_backend_timeout_ms(),
        }
    }

    /// Set the merge priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Mark this backend as the primary answer source.
    pub fn as_primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Set the backend kind.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Per-call timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Discovery Engine request settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryConfig {
    #[serde(default = "default_discovery_base_url")]
    pub base_url: String,

    #[serde(default = "default_language_code")]
    pub language_code: String,

    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    /// Answer generation model version
    #[serde(default = "default_model_version")]
    pub model_version: String,

    /// Optional file holding the answer-generation preamble
    #[serde(default)]
    pub preamble_path: Option<PathBuf>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            base_url: default_discovery_base_url(),
            language_code: default_language_code(),
            time_zone: default_time_zone(),
            model_version: default_model_version(),
            preamble_path: None,
        }
    }
}

/// Where bearer tokens come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSourceKind {
    /// GCE/Cloud Run metadata server
    Metadata,
    /// `gcloud auth application-default print-access-token`
    Gcloud,
    /// Token read from an environment variable
    Static,
}

/// Credential source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(default = "default_token_source")]
    pub source: TokenSourceKind,

    /// Environment variable holding the token for the `static` source
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Assumed lifetime of tokens whose issuer does not report one
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,

    /// Refresh when the token expires within this many seconds
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            source: default_token_source(),
            token_env: default_token_env(),
            token_ttl_secs: default_token_ttl_secs(),
            refresh_margin_secs: default_refresh_margin_secs(),
        }
    }
}

/// Fan-out budget and merge caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    /// Shared deadline for the whole fan-out
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,

    #[serde(default = "default_max_related_questions")]
    pub max_related_questions: usize,

    /// Answer text used for degraded responses
    #[serde(default = "default_fallback_answer")]
    pub fallback_answer: String,
}

impl OrchestratorConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_deadline_ms(),
            max_search_results: default_max_search_results(),
            max_related_questions: default_max_related_questions(),
            fallback_answer: default_fallback_answer(),
        }
    }
}

/// Sensitive-query classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierConfig {
    /// Confidence at or above which a human handoff is requested
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Optional YAML rule table replacing the built-in one
    #[serde(default)]
    pub rules_path: Option<PathBuf>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            rules_path: None,
        }
    }
}

/// In-memory session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Turns retained per session; older turns are trimmed
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Turns included in a handoff record
    #[serde(default = "default_handoff_turns")]
    pub handoff_turns: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            handoff_turns: default_handoff_turns(),
        }
    }
}

/// Handoff delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    /// Render the handoff and emit it through tracing only
    Log,
    /// Post to a chat webhook
    Webhook,
}

/// Handoff notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifierConfig {
    #[serde(default = "default_notifier_kind")]
    pub kind: NotifierKind,

    /// Environment variable holding the webhook URL
    #[serde(default = "default_webhook_url_env")]
    pub webhook_url_env: String,

    /// Longest history line included in a notification
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,

    #[serde(default = "default_notify_timeout_ms")]
    pub timeout_ms: u64,

    /// Optional YAML file overriding message templates
    #[serde(default)]
    pub templates_path: Option<PathBuf>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: default_notifier_kind(),
            webhook_url_env: default_webhook_url_env(),
            max_text_length: default_max_text_length(),
            timeout_ms: default_notify_timeout_ms(),
            templates_path: None,
        }
    }
}

/// Conversation log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationLogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// SQLite file; relative paths resolve against the workspace
    #[serde(default = "default_log_path")]
    pub path: PathBuf,
}

impl Default for ConversationLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_log_path(),
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    project_id: Option<String>,
    #[serde(default)]
    backends: Vec<BackendConfig>,
    discovery: Option<DiscoveryConfig>,
    auth: Option<AuthConfig>,
    orchestrator: Option<OrchestratorConfig>,
    classifier: Option<ClassifierConfig>,
    session: Option<SessionConfig>,
    notifier: Option<NotifierConfig>,
    conversation_log: Option<ConversationLogConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

fn default_true() -> bool {
    true
}

fn default_backend_kind() -> String {
    "discovery".to_string()
}

fn default_location() -> String {
    "global".to_string()
}

fn default_collection() -> String {
    "default_collection".to_string()
}

fn default_serving_config() -> String {
    "default_search".to_string()
}

fn default_max_results() -> usize {
    5
}

fn default_backend_timeout_ms() -> u64 {
    6_000
}

fn default_discovery_base_url() -> String {
    "https://discoveryengine.googleapis.com/v1alpha".to_string()
}

fn default_language_code() -> String {
    "ko".to_string()
}

fn default_time_zone() -> String {
    "Asia/Seoul".to_string()
}

fn default_model_version() -> String {
    "gemini-2.5-flash/answer_gen/v1".to_string()
}

fn default_token_source() -> TokenSourceKind {
    TokenSourceKind::Gcloud
}

fn default_token_env() -> String {
    "CONCIERGE_ACCESS_TOKEN".to_string()
}

fn default_token_ttl_secs() -> u64 {
    3_600
}

fn default_refresh_margin_secs() -> u64 {
    60
}

fn default_deadline_ms() -> u64 {
    8_000
}

fn default_max_search_results() -> usize {
    5
}

fn default_max_related_questions() -> usize {
    3
}

fn default_fallback_answer() -> String {
    DEFAULT_FALLBACK_ANSWER.to_string()
}

fn default_threshold() -> f32 {
    0.5
}

fn default_max_turns() -> usize {
    20
}

fn default_handoff_turns() -> usize {
    5
}

fn default_notifier_kind() -> NotifierKind {
    NotifierKind::Log
}

fn default_webhook_url_env() -> String {
    "GOOGLE_CHAT_WEBHOOK_URL".to_string()
}

fn default_max_text_length() -> usize {
    500
}

fn default_notify_timeout_ms() -> u64 {
    10_000
}

fn default_log_path() -> PathBuf {
    PathBuf::from(".concierge/conversations.sqlite")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            verbose: false,
            no_color: false,
            project_id: None,
            backends: Vec::new(),
            discovery: DiscoveryConfig::default(),
            auth: AuthConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            classifier: ClassifierConfig::default(),
            session: SessionConfig::default(),
            notifier: NotifierConfig::default(),
            conversation_log: ConversationLogConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, the config file and defaults.
    ///
    /// Environment variables:
    /// - `CONCIERGE_WORKSPACE`: Override workspace path
    /// - `CONCIERGE_CONFIG`: Path to config file
    /// - `CONCIERGE_PROJECT_ID`: Default cloud project
    /// - `CONCIERGE_DEADLINE_MS`: Fan-out deadline
    /// - `CONCIERGE_THRESHOLD`: Handoff confidence threshold
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use concierge_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Backends: {}", config.backends.len());
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("CONCIERGE_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("CONCIERGE_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config.config_path();
        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        config.apply_env()?;

        Ok(config)
    }

    /// Path of the YAML file this configuration reads.
    pub fn config_path(&self) -> PathBuf {
        match self.config_file {
            Some(ref cf) => cf.clone(),
            None => self.concierge_dir().join("config.yaml"),
        }
    }

    /// Environment variables override YAML config.
    fn apply_env(&mut self) -> AppResult<()> {
        if let Ok(project) = std::env::var("CONCIERGE_PROJECT_ID") {
            self.project_id = Some(project);
        }

        if let Ok(deadline) = std::env::var("CONCIERGE_DEADLINE_MS") {
            self.orchestrator.deadline_ms = deadline.parse().map_err(|_| {
                AppError::Config(format!("Invalid CONCIERGE_DEADLINE_MS: {}", deadline))
            })?;
        }

        if let Ok(threshold) = std::env::var("CONCIERGE_THRESHOLD") {
            self.classifier.threshold = threshold.parse().map_err(|_| {
                AppError::Config(format!("Invalid CONCIERGE_THRESHOLD: {}", threshold))
            })?;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            self.no_color = true;
        }

        Ok(())
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(project) = config_file.project_id {
            result.project_id = Some(project);
        }

        if !config_file.backends.is_empty() {
            result.backends = config_file.backends;
        }

        if let Some(discovery) = config_file.discovery {
            result.discovery = discovery;
        }
        if let Some(auth) = config_file.auth {
            result.auth = auth;
        }
        if let Some(orchestrator) = config_file.orchestrator {
            result.orchestrator = orchestrator;
        }
        if let Some(classifier) = config_file.classifier {
            result.classifier = classifier;
        }
        if let Some(session) = config_file.session {
            result.session = session;
        }
        if let Some(notifier) = config_file.notifier {
            result.notifier = notifier;
        }
        if let Some(log) = config_file.conversation_log {
            result.conversation_log = log;
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        tracing::debug!(
            "Loaded {} backend(s) from {:?}",
            result.backends.len(),
            path
        );

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables and
    /// the config file.
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Reload the config file after CLI overrides changed the workspace or file.
    pub fn reload(self) -> AppResult<Self> {
        let path = self.config_path();
        let mut config = if path.exists() {
            self.merge_yaml(&path)?
        } else {
            self
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Get the path to the .concierge directory.
    pub fn concierge_dir(&self) -> PathBuf {
        self.workspace.join(".concierge")
    }

    /// Ensure the .concierge directory exists.
    pub fn ensure_concierge_dir(&self) -> AppResult<()> {
        let dir = self.concierge_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .concierge directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Resolve a configured path against the workspace.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Backends that take part in the fan-out.
    pub fn enabled_backends(&self) -> Vec<BackendConfig> {
        self.backends.iter().filter(|b| b.enabled).cloned().collect()
    }

    /// Project id for a backend, falling back to the global one.
    pub fn project_for(&self, backend: &BackendConfig) -> Option<String> {
        backend.project_id.clone().or_else(|| self.project_id.clone())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> AppResult<()> {
        let mut seen = HashSet::new();
        for backend in &self.backends {
            if backend.id.trim().is_empty() {
                return Err(AppError::Config("Backend id must not be empty".to_string()));
            }
            if !seen.insert(backend.id.as_str()) {
                return Err(AppError::Config(format!(
                    "Duplicate backend id: {}",
                    backend.id
                )));
            }

            match backend.kind.as_str() {
                "discovery" => {
                    if backend.engine_id.is_empty() {
                        return Err(AppError::Config(format!(
                            "Backend '{}' is missing engineId",
                            backend.id
                        )));
                    }
                    if self.project_for(backend).is_none() {
                        return Err(AppError::Config(format!(
                            "Backend '{}' has no projectId and no global projectId is set",
                            backend.id
                        )));
                    }
                }
                "mock" => {}
                other => {
                    return Err(AppError::Config(format!(
                        "Unknown backend kind '{}' for backend '{}'. Supported: discovery, mock",
                        other, backend.id
                    )));
                }
            }

            if backend.timeout_ms > self.orchestrator.deadline_ms {
                tracing::warn!(
                    "Backend '{}' timeout {}ms exceeds the {}ms deadline; the deadline applies",
                    backend.id,
                    backend.timeout_ms,
                    self.orchestrator.deadline_ms
                );
            }
        }

        if self.orchestrator.deadline_ms == 0 {
            return Err(AppError::Config(
                "orchestrator.deadlineMs must be greater than zero".to_string(),
            ));
        }

        let threshold = self.classifier.threshold;
        if threshold.is_nan() || threshold <= 0.0 || threshold > 1.0 {
            return Err(AppError::Config(format!(
                "classifier.threshold must be in (0, 1], got {}",
                threshold
            )));
        }

        if self.session.max_turns == 0 {
            return Err(AppError::Config(
                "session.maxTurns must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.orchestrator.deadline_ms, 8_000);
        assert_eq!(config.orchestrator.max_search_results, 5);
        assert_eq!(config.orchestrator.max_related_questions, 3);
        assert_eq!(config.classifier.threshold, 0.5);
        assert_eq!(config.session.max_turns, 20);
        assert_eq!(config.auth.refresh_margin_secs, 60);
        assert!(config.backends.is_empty());
        assert!(!config.verbose);
    }

    #[test]
    fn test_concierge_dir() {
        let config = AppConfig::default();
        assert!(config.concierge_dir().ends_with(".concierge"));
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default();
        let overridden = config.with_overrides(None, None, None, true, true);

        assert!(overridden.verbose);
        assert!(overridden.no_color);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_merge_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
projectId: demo-project
backends:
  - id: faq
    engineId: faq-engine
    priority: 10
    primary: true
  - id: manuals
    engineId: manuals-engine
    enabled: false
orchestrator:
  deadlineMs: 5000
classifier:
  threshold: 0.7
logging:
  level: warn
  color: false
"#,
        )
        .unwrap();

        let config = AppConfig {
            workspace: temp.path().to_path_buf(),
            ..Default::default()
        };
        let merged = config.merge_yaml(&path).unwrap();

        assert_eq!(merged.project_id.as_deref(), Some("demo-project"));
        assert_eq!(merged.backends.len(), 2);
        assert_eq!(merged.backends[0].priority, 10);
        assert!(merged.backends[0].primary);
        assert_eq!(merged.backends[0].serving_config_id, "default_search");
        assert_eq!(merged.backends[0].collection_id, "default_collection");
        assert_eq!(merged.enabled_backends().len(), 1);
        assert_eq!(merged.orchestrator.deadline_ms, 5_000);
        assert_eq!(merged.orchestrator.max_search_results, 5);
        assert_eq!(merged.classifier.threshold, 0.7);
        assert_eq!(merged.log_level.as_deref(), Some("warn"));
        assert!(merged.no_color);
        assert!(merged.validate().is_ok());
    }

    #[test]
    fn test_validate_duplicate_ids() {
        let mut config = AppConfig::default();
        config.backends = vec![
            BackendConfig::new("a").with_kind("mock"),
            BackendConfig::new("a").with_kind("mock"),
        ];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate backend id"));
    }

    #[test]
    fn test_validate_discovery_requires_engine_and_project() {
        let mut config = AppConfig::default();
        config.backends = vec![BackendConfig::new("faq")];
        assert!(config.validate().is_err());

        config.backends[0].engine_id = "faq-engine".to_string();
        assert!(config.validate().is_err());

        config.project_id = Some("demo".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_threshold_range() {
        let mut config = AppConfig::default();
        config.classifier.threshold = 0.0;
        assert!(config.validate().is_err());
        config.classifier.threshold = 1.5;
        assert!(config.validate().is_err());
        config.classifier.threshold = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_unknown_kind() {
        let mut config = AppConfig::default();
        config.backends = vec![BackendConfig::new("x").with_kind("elastic")];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Unknown backend kind"));
    }

    #[test]
    fn test_resolve_path() {
        let config = AppConfig {
            workspace: PathBuf::from("/srv/concierge"),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_path(Path::new(".concierge/conversations.sqlite")),
            PathBuf::from("/srv/concierge/.concierge/conversations.sqlite")
        );
        assert_eq!(
            config.resolve_path(Path::new("/tmp/log.sqlite")),
            PathBuf::from("/tmp/log.sqlite")
        );
    }
}
