#![deny(unsafe_code)]

//! Quorum CLI — command-line front end for the request orchestrator.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use quorum_core::llm::{self, ChatRequest, ProviderClient};
use quorum_core::orchestrator::{
    DedicatedExecutor, Executor, Orchestrator, RequestOptions, TaskKind, TaskOutput, TaskStatus,
    TokioExecutor,
};
use quorum_core::{ProviderKind, ProviderManager, ResponseCache};

/// Quorum — race, broadcast, and batch LLM requests across providers.
#[derive(Parser)]
#[command(name = "quorum", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "quorum.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Per-request timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single provider (the healthiest one by default).
    Ask {
        /// The prompt to send.
        prompt: String,

        /// Provider to use (anthropic, openai, local).
        #[arg(short, long)]
        provider: Option<String>,

        /// Model override.
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Race all capable providers; print the first successful answer.
    Race {
        /// The prompt to send.
        prompt: String,

        /// Model override (applies to every candidate).
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Broadcast to all capable providers; print every successful answer.
    Broadcast {
        /// The prompt to send.
        prompt: String,
    },

    /// Probe and list configured providers.
    Providers,

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up tracing subscriber with verbosity level
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let config = load_config(&cli.config).await?;
    let options = match cli.timeout_ms {
        Some(ms) => RequestOptions::default().with_timeout_ms(ms),
        None => RequestOptions::default(),
    };

    match cli.command {
        Commands::Ask {
            prompt,
            provider,
            model,
        } => cmd_ask(&config, &prompt, provider.as_deref(), model.as_deref(), options).await?,
        Commands::Race { prompt, model } => {
            cmd_race(&config, &prompt, model.as_deref(), options).await?
        }
        Commands::Broadcast { prompt } => cmd_broadcast(&config, &prompt, options).await?,
        Commands::Providers => cmd_providers(&config, options).await?,
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
    }

    Ok(())
}

/// Build the orchestrator and provider manager from config.
fn build_stack(
    config: &quorum_config::AppConfig,
) -> Result<(Orchestrator, Arc<ProviderManager>)> {
    let manager = Arc::new(ProviderManager::new());
    for entry in config.enabled_providers() {
        let client = llm::create_provider(entry);
        let profile = quorum_core::health::ProviderProfile::default_for(entry.kind)
            .with_priority(entry.priority);
        manager.register_with_profile(client, profile);
    }

    let executor: Arc<dyn Executor> = match config.orchestrator.executor.as_str() {
        "dedicated" => Arc::new(
            DedicatedExecutor::new(config.orchestrator.worker_threads)
                .context("failed to start dedicated executor")?,
        ),
        _ => Arc::new(TokioExecutor),
    };

    let mut orchestrator = Orchestrator::new(executor).with_health_manager(Arc::clone(&manager));
    if let Some(cache) = ResponseCache::from_config(&config.cache)? {
        orchestrator = orchestrator.with_cache(Arc::new(cache));
    }

    Ok((orchestrator, manager))
}

fn chat_request(prompt: &str, model: Option<&str>) -> ChatRequest {
    let mut request = ChatRequest::user(prompt);
    if let Some(model) = model {
        request = request.with_model(model);
    }
    request
}

async fn cmd_ask(
    config: &quorum_config::AppConfig,
    prompt: &str,
    provider: Option<&str>,
    model: Option<&str>,
    options: RequestOptions,
) -> Result<()> {
    let (orchestrator, manager) = build_stack(config)?;

    let kind = match provider {
        Some(name) => name
            .parse::<ProviderKind>()
            .map_err(|e| anyhow!("{e}"))?,
        None => manager
            .select_best_provider(TaskKind::ChatCompletion)
            .ok_or_else(|| anyhow!("no providers configured; add [[providers]] entries"))?,
    };
    let client = manager
        .client(kind)
        .ok_or_else(|| anyhow!("provider '{kind}' is not configured"))?;

    info!(provider = %kind, "submitting chat request");
    let id = orchestrator.submit_chat_request(client, chat_request(prompt, model), options);
    let task = orchestrator
        .wait_for_request(id)
        .await
        .map_err(|e| anyhow!(e))?;

    match task.status {
        TaskStatus::Completed => {
            if let Some(TaskOutput::Chat(response)) = task.output {
                println!("{}", response.content);
                print_footer(&response);
            }
            Ok(())
        }
        _ => Err(anyhow!(
            "request failed: {}",
            task.error_info.unwrap_or_else(|| "cancelled".to_string())
        )),
    }
}

async fn cmd_race(
    config: &quorum_config::AppConfig,
    prompt: &str,
    model: Option<&str>,
    options: RequestOptions,
) -> Result<()> {
    let (orchestrator, manager) = build_stack(config)?;
    let candidates = manager.candidates(TaskKind::ChatCompletion);

    info!(candidates = candidates.len(), "racing providers");
    let response = orchestrator
        .race_providers(&candidates, chat_request(prompt, model), options)
        .await
        .map_err(|e| anyhow!(e))?;

    println!("{}", response.content);
    print_footer(&response);
    Ok(())
}

async fn cmd_broadcast(
    config: &quorum_config::AppConfig,
    prompt: &str,
    options: RequestOptions,
) -> Result<()> {
    let (orchestrator, manager) = build_stack(config)?;
    let candidates = manager.candidates(TaskKind::ChatCompletion);

    let responses = orchestrator
        .broadcast_to_providers(&candidates, chat_request(prompt, None), options)
        .await
        .map_err(|e| anyhow!(e))?;

    if responses.is_empty() {
        println!("(no provider produced an answer)");
        return Ok(());
    }
    for response in responses {
        let source = response
            .provider
            .map(|p| p.to_string())
            .unwrap_or_else(|| "cache".to_string());
        println!("── {source} ({})", response.model);
        println!("{}\n", response.content);
    }
    Ok(())
}

async fn cmd_providers(
    config: &quorum_config::AppConfig,
    options: RequestOptions,
) -> Result<()> {
    let (orchestrator, manager) = build_stack(config)?;
    let clients: Vec<Arc<dyn ProviderClient>> = manager.candidates(TaskKind::HealthCheck);
    if clients.is_empty() {
        println!("No providers configured.");
        return Ok(());
    }

    for client in clients {
        let kind = client.provider();
        let id = orchestrator.submit_health_check(client, options);
        let task = orchestrator
            .wait_for_request(id)
            .await
            .map_err(|e| anyhow!(e))?;

        match task.output {
            Some(TaskOutput::Health {
                healthy: true,
                latency_ms,
            }) => println!("{kind:<10} healthy   {latency_ms}ms"),
            Some(TaskOutput::Health {
                healthy: false, ..
            }) => println!("{kind:<10} unhealthy"),
            _ => println!(
                "{kind:<10} error     {}",
                task.error_info.unwrap_or_else(|| "unknown".to_string())
            ),
        }
    }
    Ok(())
}

fn cmd_config(path: &Path, config: &quorum_config::AppConfig, show: bool) -> Result<()> {
    if show {
        let toml_str =
            toml::to_string_pretty(config).map_err(|e| anyhow!("TOML error: {e}"))?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", path.display());
    }
    Ok(())
}

fn print_footer(response: &quorum_core::llm::ChatResponse) {
    let source = response
        .provider
        .map(|p| p.to_string())
        .unwrap_or_else(|| "cache".to_string());
    eprintln!(
        "[{source} · {} · {} tokens]",
        response.model, response.usage.total_tokens
    );
}

async fn load_config(path: &Path) -> Result<quorum_config::AppConfig> {
    if path.exists() {
        quorum_config::AppConfig::load(path)
            .await
            .map_err(|e| anyhow!(e))
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        Ok(quorum_config::AppConfig::default())
    }
}
