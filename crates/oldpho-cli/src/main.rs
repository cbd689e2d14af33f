use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use oldpho_core::{
    classify_message, details_for_code, ErrorCode, Locale, ProcessingResult, UserFacingError,
};
use oldpho_runtime::{
    restoration_key, FallbackOrchestrator, ProviderRegistry, RuntimeConfig, SmartCache,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "oldpho")]
#[command(about = "Restore old photos through a fallback chain of AI providers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML config file; OLDPHO_* variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Restore one or more images
    Restore {
        /// Image files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Queue priority (higher is served first)
        #[arg(short, long, default_value_t = 0)]
        priority: i32,

        /// Locale for error messages (en, vi)
        #[arg(short, long)]
        locale: Option<Locale>,

        /// Print queue, provider and cache statistics afterwards
        #[arg(long)]
        stats: bool,
    },

    /// Classify an error message
    Classify {
        message: String,

        #[arg(short, long, default_value = "en")]
        locale: Locale,
    },

    /// List providers available for dispatch
    Providers,

    /// Print the effective configuration
    Config,
}

#[derive(Serialize)]
#[serde(untagged)]
enum FileOutcome {
    Restored {
        file: String,
        #[serde(flatten)]
        result: ProcessingResult,
    },
    Failed {
        file: String,
        error: UserFacingError,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<RuntimeConfig> {
    let base = match path {
        Some(path) => RuntimeConfig::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    base.merge_lookup(|key| std::env::var(key).ok())
        .context("applying OLDPHO_* environment overrides")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn restore(
    config: RuntimeConfig,
    files: Vec<PathBuf>,
    priority: i32,
    locale: Locale,
    show_stats: bool,
) -> Result<()> {
    let registry = ProviderRegistry::from_config(&config);
    let expected_cost = registry
        .available_providers()
        .first()
        .map(|p| p.cost_per_request)
        .unwrap_or(0.0);

    let orchestrator = FallbackOrchestrator::builder()
        .config(config.clone())
        .registry(registry)
        .provider_retry(config.retry.clone())
        .build()?;
    let cache: Arc<SmartCache<ProcessingResult>> = Arc::new(SmartCache::new(config.cache.clone()));
    let _cleanup = cache.spawn_cleanup();

    let jobs = files.into_iter().map(|path| {
        let orchestrator = &orchestrator;
        let cache = cache.clone();
        async move {
            let file = path.display().to_string();
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    let details = details_for_code(ErrorCode::StorageError, &e.to_string(), locale);
                    return FileOutcome::Failed {
                        file,
                        error: details.to_user_response(),
                    };
                }
            };

            let key = restoration_key(&bytes);
            let outcome = cache
                .get_or_process(&key, None, expected_cost, || {
                    orchestrator.process_with_fallback(bytes, priority)
                })
                .await;

            match outcome {
                Ok(result) => FileOutcome::Restored { file, result },
                Err(err) => FileOutcome::Failed {
                    file,
                    error: err.details(locale).to_user_response(),
                },
            }
        }
    });

    let outcomes = futures::future::join_all(jobs).await;
    let failures = outcomes
        .iter()
        .filter(|o| matches!(o, FileOutcome::Failed { .. }))
        .count();
    print_json(&outcomes)?;

    if show_stats {
        print_json(&serde_json::json!({
            "queue": orchestrator.queue_status(),
            "providers": orchestrator.provider_stats(),
            "cache": cache.get_stats(),
            "errors": orchestrator.error_history().stats(),
        }))?;
    }

    if failures > 0 {
        anyhow::bail!("{} of {} restorations failed", failures, outcomes.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Restore {
            files,
            priority,
            locale,
            stats,
        } => {
            let locale = locale.unwrap_or(config.locale);
            restore(config, files, priority, locale, stats).await
        }
        Commands::Classify { message, locale } => print_json(&classify_message(&message, locale)),
        Commands::Providers => {
            let registry = ProviderRegistry::from_config(&config);
            print_json(&registry.available_providers())
        }
        Commands::Config => {
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
    }
}
