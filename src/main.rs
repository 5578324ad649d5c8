mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use taskwright_config::Config;
use taskwright_core::{AgentExecutor, TaskRequest};
use taskwright_model::ModelProvider;
use taskwright_queue::{
    BackgroundProcessor, InMemoryConversationRepository, InMemoryTaskRepository,
    RetryPolicy, TaskQueue, TaskStatus,
};
use taskwright_tools::{question_bank_tools, QuestionBank, ToolRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let mut config = taskwright_config::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);

    match &cli.command {
        Commands::ShowConfig => {
            println!("{}", taskwright_config::redacted(&config)?);
            Ok(())
        }
        Commands::Run { prompt } => run_sync(&cli, &config, prompt).await,
        Commands::Stream { prompt } => run_stream(&cli, &config, prompt).await,
        Commands::Submit { prompt, poll_ms } => run_queued(&cli, &config, prompt, *poll_ms).await,
    }
}

fn build_executor(config: &Config) -> anyhow::Result<AgentExecutor> {
    let model: Arc<dyn ModelProvider> = Arc::from(taskwright_model::from_config(&config.model)?);
    let tools = ToolRegistry::from_tools(question_bank_tools(Arc::new(QuestionBank::new())));
    debug!(provider = model.name(), model = model.model_name(), tools = tools.len(), "executor ready");
    Ok(AgentExecutor::new(model, Arc::new(tools), Arc::new(config.agent.clone())))
}

/// Token cancelled on Ctrl-C.
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling");
            trigger.cancel();
        }
    });
    token
}

async fn run_sync(cli: &Cli, config: &Config, prompt: &str) -> anyhow::Result<()> {
    let executor = build_executor(config)?;
    let result = executor
        .execute(TaskRequest::new(cli.user.clone(), prompt), ctrl_c_token())
        .await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        bail!("task did not succeed: {}", result.error.unwrap_or_default());
    }
    Ok(())
}

async fn run_stream(cli: &Cli, config: &Config, prompt: &str) -> anyhow::Result<()> {
    let executor = build_executor(config)?;
    let mut rx = executor.execute_streaming(TaskRequest::new(cli.user.clone(), prompt), ctrl_c_token());
    while let Some(event) = rx.recv().await {
        println!("{}", serde_json::to_string(&event)?);
        if event.is_terminal() {
            break;
        }
    }
    Ok(())
}

async fn run_queued(
    cli: &Cli,
    config: &Config,
    prompt: &str,
    poll_ms: u64,
) -> anyhow::Result<()> {
    let processor = BackgroundProcessor::new(
        build_executor(config)?,
        Arc::new(InMemoryTaskRepository::new()),
        Arc::new(InMemoryConversationRepository::new()),
        RetryPolicy::from_config(&config.queue),
    );
    let queue = TaskQueue::new(Arc::new(processor), config.queue.capacity);
    queue.spawn_workers(config.queue.workers.max(1));

    let task_id = queue
        .submit(&cli.user, prompt, None)
        .await
        .context("submitting task")?;
    info!(task_id = %task_id, "waiting for task");

    let cancel = ctrl_c_token();
    let waited = tokio::select! {
        _ = cancel.cancelled() => None,
        task = queue.wait_for_terminal(&task_id, &cli.user, Duration::from_millis(poll_ms)) => Some(task),
    };
    queue.shutdown().await;

    let task = match waited {
        Some(task) => task?,
        None => queue.get(&task_id, &cli.user).await?,
    };
    println!("{}", serde_json::to_string_pretty(&task)?);
    if task.status != TaskStatus::Completed {
        bail!("task ended in status {}", task.status);
    }
    Ok(())
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
