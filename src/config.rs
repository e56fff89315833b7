//! Loading agent configuration (model settings + prompts) from TOML.
//!
//! Every field is optional; environment variables override the file and built-in
//! defaults fill the rest (see `llm::ClientSettings::resolve`).
//!
//! ```toml
//! [model]
//! model = "anthropic/claude-3.5-sonnet"
//! timeout_secs = 60
//! max_attempts = 3
//!
//! [prompts]
//! include_examples = true
//! ```

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub model: ModelConfig,
  #[serde(default)]
  pub prompts: Prompts,
}

/// `[model]` section. `None` means "not set in the file".
#[derive(Clone, Debug, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
  pub model: Option<String>,
  pub base_url: Option<String>,
  pub timeout_secs: Option<u64>,
  pub max_attempts: Option<u32>,
  pub initial_backoff_ms: Option<u64>,
  pub referer: Option<String>,
  pub title: Option<String>,
}

/// Prompt knobs for puzzle generation. `{language}` is substituted in the system message.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Prompts {
  pub generation_system: String,
  pub include_examples: bool,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      generation_system: "You are an expert at creating educational programming puzzles. Return ONLY valid JSON.".into(),
      include_examples: true,
    }
  }
}

pub fn parse_agent_config(text: &str) -> Result<AgentConfig, toml::de::Error> {
  toml::from_str::<AgentConfig>(text)
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_agent_config(&s) {
      Ok(cfg) => {
        info!(target: "parsons_forge", %path, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "parsons_forge", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "parsons_forge", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
