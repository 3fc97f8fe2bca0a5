use crate::adapters::llm::{BackendKind, ModelConfig};
use crate::core::filter::DEFAULT_MAX_FILES;
use crate::core::github::DEFAULT_API_URL;
use crate::core::pipeline::ReviewSettings;
use crate::core::prompt::PromptConfig;
use crate::error::{ReviewError, ReviewResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_FILE_NAMES: [&str; 2] = [".pr-critic.yml", ".pr-critic.yaml"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub github_token: Option<String>,

    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,

    pub backend: Option<BackendKind>,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub api_version: Option<String>,

    #[serde(default = "default_max_files")]
    pub max_files: usize,

    #[serde(default = "default_context_window")]
    pub context_window: usize,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    pub system_prompt: Option<String>,

    #[serde(default)]
    pub attribution: bool,

    pub max_dropped_files: Option<usize>,
}

/// Values given on the command line; `None` leaves the loaded value alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub github_token: Option<String>,
    pub github_api_url: Option<String>,
    pub backend: Option<BackendKind>,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub api_version: Option<String>,
    pub max_files: Option<usize>,
    pub context_window: Option<usize>,
    pub max_tokens: Option<usize>,
    pub system_prompt: Option<String>,
    pub attribution: Option<bool>,
    pub max_dropped_files: Option<usize>,
}

/// Everything a run needs once required inputs are known to be present.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub github_token: String,
    pub github_api_url: String,
    pub model: ModelConfig,
    pub review: ReviewSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github_token: None,
            github_api_url: default_github_api_url(),
            backend: None,
            url: None,
            api_key: None,
            model: None,
            api_version: None,
            max_files: default_max_files(),
            context_window: default_context_window(),
            max_tokens: default_max_tokens(),
            system_prompt: None,
            attribution: false,
            max_dropped_files: None,
        }
    }
}

impl Config {
    /// Loads the first config file found in the working directory or home
    /// directory, falling back to defaults.
    pub fn load() -> ReviewResult<Self> {
        let mut candidates: Vec<PathBuf> = CONFIG_FILE_NAMES.iter().map(PathBuf::from).collect();
        if let Some(home_dir) = dirs::home_dir() {
            candidates.push(home_dir.join(CONFIG_FILE_NAMES[0]));
        }

        for path in candidates {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        Ok(Config::default())
    }

    pub fn load_from(path: &Path) -> ReviewResult<Self> {
        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReviewError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_yaml::from_str(&content)
            .map_err(|e| ReviewError::Config(format!("invalid {}: {e}", path.display())))
    }

    /// Applies action inputs (`INPUT_*` variables) on top of file values.
    pub fn merge_action_inputs<F>(&mut self, lookup: F) -> ReviewResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let input = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = input("github-token") {
            self.github_token = Some(v);
        }
        if let Some(v) = input("url") {
            self.url = Some(v);
        }
        if let Some(v) = input("api-key") {
            self.api_key = Some(v);
        }
        if let Some(v) = input("model") {
            self.model = Some(v);
        }
        if let Some(v) = input("api-version") {
            self.api_version = Some(v);
        }
        if let Some(v) = input("system-prompt") {
            self.system_prompt = Some(v);
        }
        if let Some(v) = input("backend") {
            self.backend = Some(parse_input("backend", &v)?);
        }
        if let Some(v) = input("max-files") {
            self.max_files = parse_input("max-files", &v)?;
        }
        if let Some(v) = input("context-window") {
            self.context_window = parse_input("context-window", &v)?;
        }
        if let Some(v) = input("max-tokens") {
            self.max_tokens = parse_input("max-tokens", &v)?;
        }
        if let Some(v) = input("attribution") {
            self.attribution = parse_input("attribution", &v)?;
        }
        if let Some(v) = input("max-dropped-files") {
            self.max_dropped_files = Some(parse_input("max-dropped-files", &v)?);
        }
        Ok(())
    }

    pub fn merge_with_cli(&mut self, cli: ConfigOverrides) {
        fn set<T>(target: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *target = value;
            }
        }

        set(&mut self.github_api_url, cli.github_api_url);
        set(&mut self.max_files, cli.max_files);
        set(&mut self.context_window, cli.context_window);
        set(&mut self.max_tokens, cli.max_tokens);
        set(&mut self.attribution, cli.attribution);
        if cli.github_token.is_some() {
            self.github_token = cli.github_token;
        }
        if cli.backend.is_some() {
            self.backend = cli.backend;
        }
        if cli.url.is_some() {
            self.url = cli.url;
        }
        if cli.api_key.is_some() {
            self.api_key = cli.api_key;
        }
        if cli.model.is_some() {
            self.model = cli.model;
        }
        if cli.api_version.is_some() {
            self.api_version = cli.api_version;
        }
        if cli.system_prompt.is_some() {
            self.system_prompt = cli.system_prompt;
        }
        if cli.max_dropped_files.is_some() {
            self.max_dropped_files = cli.max_dropped_files;
        }
    }

    /// Checks required inputs and picks the backend. Makes no network calls.
    pub fn validate(&self) -> ReviewResult<ResolvedConfig> {
        let mut missing = Vec::new();
        if self.github_token.is_none() {
            missing.push("github-token");
        }
        if self.model.is_none() {
            missing.push("model");
        }
        if self.url.is_none() && self.api_key.is_none() {
            missing.push("url or api-key");
        }
        if !missing.is_empty() {
            return Err(ReviewError::Config(format!(
                "missing required input(s): {}",
                missing.join(", ")
            )));
        }

        let backend = self
            .backend
            .or_else(|| BackendKind::infer(self.url.as_deref(), self.api_key.as_deref()))
            .ok_or_else(|| ReviewError::Config("cannot determine model backend".into()))?;
        match backend {
            BackendKind::Anthropic if self.api_key.is_none() => {
                return Err(ReviewError::Config(
                    "api-key is required for the anthropic backend".into(),
                ))
            }
            BackendKind::Ollama | BackendKind::OllamaChat if self.url.is_none() => {
                return Err(ReviewError::Config(format!(
                    "url is required for the {} backend",
                    backend
                )))
            }
            _ => {}
        }

        if self.max_files == 0 {
            return Err(ReviewError::Config("max-files must be at least 1".into()));
        }

        let mut prompt = PromptConfig::default();
        if let Some(system_prompt) = &self.system_prompt {
            prompt.system_prompt = system_prompt.clone();
        }

        Ok(ResolvedConfig {
            github_token: self.github_token.clone().unwrap_or_default(),
            github_api_url: self.github_api_url.clone(),
            model: ModelConfig {
                backend,
                model_name: self.model.clone().unwrap_or_default(),
                url: self.url.clone(),
                api_key: self.api_key.clone(),
                api_version: self.api_version.clone(),
                context_window: self.context_window,
                max_tokens: self.max_tokens,
            },
            review: ReviewSettings {
                max_files: self.max_files,
                attribution: self.attribution,
                max_dropped_files: self.max_dropped_files,
                prompt,
            },
        })
    }
}

/// Reads an action input the way the Actions runner exports it.
pub fn action_input(name: &str) -> Option<String> {
    let key = format!("INPUT_{}", name.replace(' ', "_").to_uppercase());
    std::env::var(key).ok()
}

fn parse_input<T>(name: &str, value: &str) -> ReviewResult<T>
where
    T: serde::de::DeserializeOwned,
{
    serde_yaml::from_str(value)
        .map_err(|e| ReviewError::Config(format!("invalid value '{value}' for {name}: {e}")))
}

fn default_github_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_max_files() -> usize {
    DEFAULT_MAX_FILES
}

fn default_context_window() -> usize {
    16384
}

fn default_max_tokens() -> usize {
    4096
}
