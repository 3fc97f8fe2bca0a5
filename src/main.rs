mod adapters;
mod config;
mod core;
mod error;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::adapters::llm::BackendKind;
use crate::config::{Config, ConfigOverrides};
use crate::core::event::TriggerInput;
use crate::core::pipeline::{ReviewPipeline, RunOutcome};

#[derive(Parser)]
#[command(name = "pr-critic")]
#[command(about = "Reviews a pull request with a language model and posts the result as a comment", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, help = "Path to a YAML config file (defaults to .pr-critic.yml)")]
    config: Option<PathBuf>,

    #[arg(long)]
    github_token: Option<String>,

    #[arg(long, env = "GITHUB_API_URL")]
    github_api_url: Option<String>,

    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    #[arg(long, help = "Model backend endpoint")]
    url: Option<String>,

    #[arg(long)]
    api_key: Option<String>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    api_version: Option<String>,

    #[arg(long)]
    max_files: Option<usize>,

    #[arg(long)]
    context_window: Option<usize>,

    #[arg(long)]
    max_tokens: Option<usize>,

    #[arg(long)]
    system_prompt: Option<String>,

    #[arg(
        long,
        value_parser = clap::value_parser!(bool),
        help = "Append a footer naming the model to the review (true/false)"
    )]
    attribution: Option<bool>,

    #[arg(long)]
    max_dropped_files: Option<usize>,

    #[arg(long, env = "GITHUB_EVENT_NAME")]
    event_name: Option<String>,

    #[arg(long, env = "GITHUB_EVENT_PATH")]
    event_path: Option<PathBuf>,

    #[arg(long, env = "GITHUB_REPOSITORY", help = "Repository as owner/repo")]
    repo: Option<String>,

    #[arg(long, help = "Review this pull request number instead of the triggering event")]
    pr: Option<u64>,

    #[arg(long)]
    head_sha: Option<String>,

    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            github_token: self.github_token.clone(),
            github_api_url: self.github_api_url.clone(),
            backend: self.backend,
            url: self.url.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            api_version: self.api_version.clone(),
            max_files: self.max_files,
            context_window: self.context_window,
            max_tokens: self.max_tokens,
            system_prompt: self.system_prompt.clone(),
            attribution: self.attribution,
            max_dropped_files: self.max_dropped_files,
        }
    }

    fn trigger(&self) -> TriggerInput {
        TriggerInput {
            event_name: self.event_name.clone(),
            event_path: self.event_path.clone(),
            repository: self.repo.clone(),
            pull_number: self.pr,
            head_sha: self.head_sha.clone(),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = run(cli).await {
        let message = format!("Action failed: {:#}", err);
        error!("{}", message);
        core::actions::annotate_error(&message);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.merge_action_inputs(config::action_input)?;
    config.merge_with_cli(cli.overrides());
    let resolved = config.validate()?;

    let Some(context) = cli.trigger().into_context()? else {
        info!("This action only works on pull requests.");
        return Ok(());
    };

    let github = core::GitHubClient::new(&resolved.github_token, &resolved.github_api_url)?;
    let adapter = adapters::llm::create_adapter(&resolved.model)?;
    info!(
        "Using {} backend with model {}",
        resolved.model.backend,
        adapter.model_name()
    );

    let outcome = ReviewPipeline::new(&github, adapter.as_ref(), resolved.review)
        .run(&context)
        .await?;

    match outcome {
        RunOutcome::Reviewed { files, dropped } if dropped > 0 => {
            info!("Reviewed {} files ({} could not be fetched)", files, dropped)
        }
        RunOutcome::Reviewed { files, .. } => info!("Reviewed {} files", files),
        RunOutcome::ShortCircuited(reason) => info!("Skipped model review: {}", reason),
    }

    Ok(())
}
