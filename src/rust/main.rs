use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;

use lime_dashboard::server::{self, AppState};
use lime_dashboard::{ClassifierRegistry, DashboardConfig, ModelManager, Overrides};

#[derive(Parser)]
#[command(author, version, about = "LIME explanation dashboard for text classifiers", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "LIME_DASHBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overrides `bind_addr`
    #[arg(short, long, env = "LIME_DASHBOARD_BIND")]
    bind: Option<String>,

    /// Directory holding model files, overrides `models_dir`
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Cache root, models are kept in its `models` subdirectory
    #[arg(long, env = "LIME_DASHBOARD_CACHE")]
    cache_dir: Option<PathBuf>,

    /// Download missing model files before serving
    #[arg(long)]
    fetch: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            bind_addr: self.bind.clone(),
            models_dir: self.models_dir.clone(),
            cache_dir: self.cache_dir.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lime_dashboard::init_logger();
    let args = Args::parse();

    let mut config = DashboardConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;
    config.apply_overrides(args.overrides());

    let models_dir = config.models_dir();
    info!("Using models directory {}", models_dir.display());
    let manager = ModelManager::new(&models_dir)
        .with_context(|| format!("failed to create models directory {}", models_dir.display()))?;

    if args.fetch || config.fetch_missing_models {
        info!("Fetching missing model files...");
        ClassifierRegistry::fetch_missing(&config, &manager).await?;
    }

    let registry = ClassifierRegistry::load(&config, &manager)
        .context("failed to load classifiers")?;
    info!("Loaded {} classifier(s)", registry.len());

    let addr: SocketAddr = config.bind_addr.parse()
        .with_context(|| format!("invalid bind address '{}'", config.bind_addr))?;
    let state = AppState::from_config(&config, registry);
    server::serve(addr, state).await?;
    Ok(())
}
