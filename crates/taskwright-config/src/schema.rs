// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

/// Instructional text sent as the system prompt when the config file does not
/// supply one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a task assistant for a question bank. Users describe what they want \
done in plain language and you carry it out with the tools provided.

Guidelines:
- Use tools to read or change data; never invent identifiers or records.
- When a tool returns an error, read it, adjust the arguments and try again \
or explain why the task cannot be completed.
- Keep going until the task is done, then reply with a short summary of what \
you did and the identifiers of anything you created or changed.";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

fn default_provider() -> String {
    "anthropic".into()
}
fn default_model_name() -> String {
    "claude-sonnet-4-5".into()
}
fn default_api_key_env() -> Option<String> {
    Some("ANTHROPIC_API_KEY".into())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier: "anthropic" | "mock"
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier forwarded to the provider API
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Explicit API key; prefer api_key_env in config files to avoid secrets
    /// in version-controlled files
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable that holds the API key (read at runtime)
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,
    /// Base URL override, e.g. for a local proxy.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            name: default_model_name(),
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: None,
        }
    }
}

fn default_max_iterations() -> u32 {
    20
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}
fn default_event_buffer() -> usize {
    64
}

/// Settings for one orchestration loop.  Passed to the executor at
/// construction; nothing in the loop reads global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Upper bound on model calls for a single task
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Sampling temperature (0.0 is deterministic)
    #[serde(default)]
    pub temperature: f32,
    /// Maximum tokens requested per model call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Wall-clock budget for the whole loop, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Fixed instructions sent as the system prompt on every call
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Capacity of the channel used by streaming execution
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            system_prompt: default_system_prompt(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl AgentConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

fn default_workers() -> usize {
    2
}
fn default_capacity() -> usize {
    256
}
fn default_retry_delays_secs() -> Vec<u64> {
    vec![5, 15, 30]
}

/// Background queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of workers draining the job channel
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Job channel capacity; `submit` waits when it is full
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Backoff before each retry.  The length is the number of retries.
    #[serde(default = "default_retry_delays_secs")]
    pub retry_delays_secs: Vec<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            capacity: default_capacity(),
            retry_delays_secs: default_retry_delays_secs(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
