// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taskwright_config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "taskwright",
    about = "Run natural-language tasks through a model-driven tool loop",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to an additional config file, merged over the discovered ones
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// User id the task runs as; every tool access is scoped to it
    #[arg(long, env = "TASKWRIGHT_USER", default_value = "local", global = true)]
    pub user: String,

    /// Override the model provider (anthropic, mock)
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Override the model name
    #[arg(long, short = 'M', env = "TASKWRIGHT_MODEL", global = true)]
    pub model: Option<String>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(p) = &self.provider {
            config.model.provider = p.clone();
        }
        if let Some(m) = &self.model {
            config.model.name = m.clone();
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a task synchronously and print the result as JSON
    Run {
        #[arg(value_name = "PROMPT")]
        prompt: String,
    },
    /// Run a task and print each progress event as a JSON line
    Stream {
        #[arg(value_name = "PROMPT")]
        prompt: String,
    },
    /// Queue a task on the in-process worker pool and wait for it to finish.
    /// Each run starts with empty in-memory stores, so the task always gets
    /// a fresh conversation.
    Submit {
        #[arg(value_name = "PROMPT")]
        prompt: String,
        /// Status poll interval in milliseconds
        #[arg(long, default_value = "200")]
        poll_ms: u64,
    },
    /// Print the effective configuration and exit
    ShowConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_globals_after_subcommand() {
        let cli = Cli::parse_from(["taskwright", "run", "list my categories", "--user", "alice", "-vv"]);
        assert_eq!(cli.user, "alice");
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Run { ref prompt } if prompt == "list my categories"));
    }

    #[test]
    fn submit_defaults_poll_interval() {
        let cli = Cli::parse_from(["taskwright", "submit", "more"]);
        match cli.command {
            Commands::Submit { prompt, poll_ms } => {
                assert_eq!(prompt, "more");
                assert_eq!(poll_ms, 200);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn submit_rejects_conversation_flag() {
        let parsed = Cli::try_parse_from(["taskwright", "submit", "more", "--conversation", "c-1"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn overrides_replace_provider_and_model() {
        let cli = Cli::parse_from(["taskwright", "--provider", "mock", "-M", "m2", "show-config"]);
        let mut config = Config::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.model.provider, "mock");
        assert_eq!(config.model.name, "m2");
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
