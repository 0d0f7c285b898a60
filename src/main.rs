use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, ValueEnum};
use tracing::{error, info};

use tagwatch::config::{self, AppConfig};
use tagwatch::logging::{self, LogFormat};
use tagwatch::registry::providers::build_providers;
use tagwatch::resolver::ImageResolver;
use tagwatch::watcher::Watcher;
use tagwatch::watcher::docker::DockerRuntime;
use tagwatch::watcher::sink::{JsonSink, LogSink, LogTrigger, ResultSink};

#[derive(Parser)]
#[command(name = "tagwatch")]
#[command(version, about = "Watch running containers for newer image tags")]
struct Cli {
    /// Configuration file (default: $XDG_CONFIG_HOME/tagwatch/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run one cycle per watcher and exit
    #[arg(long)]
    once: bool,

    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value_t)]
    log_format: LogFormat,

    /// Write logs to a daily rolling file in this directory instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Where cycle results go
    #[arg(long, value_enum, default_value_t)]
    output: Output,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum Output {
    #[default]
    Log,
    Json,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init(&cli.log_level, cli.log_format, cli.log_dir.as_deref());

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let path = cli.config.unwrap_or_else(config::default_config_path);
    let config = AppConfig::load(&path)?;
    info!("Loaded configuration from {}", path.display());

    let providers = build_providers(&config.registries, config.registry_timeout()).await;
    let resolver = Arc::new(ImageResolver::new(providers));
    let sink: Arc<dyn ResultSink> = match cli.output {
        Output::Log => Arc::new(LogSink),
        Output::Json => Arc::new(JsonSink),
    };
    let trigger = Arc::new(LogTrigger);

    let mut watchers = Vec::new();
    for (name, watcher_config) in &config.watchers {
        let settings = match watcher_config.validate(name, config.registry_timeout()) {
            Ok(settings) => settings,
            Err(e) => {
                error!("{}", e);
                continue;
            }
        };
        let runtime = match DockerRuntime::connect(watcher_config.socket.as_deref()) {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(watcher = %name, "Failed to connect to container runtime: {}", e);
                continue;
            }
        };
        watchers.push(Arc::new(Watcher::new(
            settings,
            Arc::new(runtime),
            Arc::clone(&resolver),
            Arc::clone(&sink),
            trigger.clone(),
        )));
    }

    if watchers.is_empty() {
        bail!("No usable watcher configured");
    }

    if cli.once {
        futures::future::join_all(watchers.iter().map(|w| w.watch_now())).await;
        return Ok(());
    }

    let handles: Vec<_> = watchers.into_iter().map(Watcher::spawn).collect();
    info!("Started {} watcher(s)", handles.len());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    for handle in handles {
        handle.abort();
    }
    Ok(())
}
