//! code-browser entry point

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use code_browser::cli::{Cli, Commands, RepoArgs, RepoOperation, ServeArgs};
use code_browser::config::{default_data_dir, ServerConfig, CONFIG_FILE_NAME};
use code_browser::http::{self, AppState};
use code_browser::search::{build_engines, EngineKind, RipgrepEngine};
use code_browser::{IntelligenceService, ResponseCache, SemanticIndexStore, SqliteRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config, cli.verbose);

    match cli.command {
        Commands::Serve(args) => run_serve(config, &args).await,
        Commands::Repo(args) => run_repo(&config, args),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Config file location: `--config`, else `<data dir>/config.toml`.
/// A `--data-dir` flag beats the file's `data_dir`.
fn load_config(cli: &Cli) -> anyhow::Result<ServerConfig> {
    let config_path = cli.config.clone().unwrap_or_else(|| {
        cli.data_dir
            .clone()
            .unwrap_or_else(default_data_dir)
            .join(CONFIG_FILE_NAME)
    });

    let mut config = ServerConfig::load_from(&config_path)?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    Ok(config)
}

fn init_tracing(config: &ServerConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(
        format!("code_browser={}", level)
            .parse()
            .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into()),
    );

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_registry(config: &ServerConfig) -> anyhow::Result<SqliteRegistry> {
    let data_dir = config.data_dir();
    SqliteRegistry::open(&data_dir)
        .with_context(|| format!("Failed to open registry in {}", data_dir.display()))
}

async fn run_serve(mut config: ServerConfig, args: &ServeArgs) -> anyhow::Result<()> {
    args.apply_to(&mut config);
    config.validate()?;

    let registry = Arc::new(open_registry(&config)?);
    let engines = build_engines(&config.search)?;

    if !RipgrepEngine::new(&config.search.rg_binary).is_available() {
        if config.search.engine == EngineKind::Ripgrep {
            tracing::warn!(
                "ripgrep binary '{}' not found on PATH; searches will fail",
                config.search.rg_binary.display()
            );
        } else {
            tracing::debug!("ripgrep not found; engine=ripgrep searches will fail");
        }
    }

    let intelligence = IntelligenceService::new(registry, SemanticIndexStore::new(), engines.default_engine());
    let state = Arc::new(
        AppState::new(intelligence, engines).with_cache(ResponseCache::new(&config.cache)),
    );

    http::serve(
        config.listen,
        state,
        Duration::from_secs(config.request_timeout_secs),
    )
    .await
    .with_context(|| format!("Server on {} failed", config.listen))
}

fn run_repo(config: &ServerConfig, args: RepoArgs) -> anyhow::Result<()> {
    let registry = open_registry(config)?;

    match args.operation {
        RepoOperation::Add { id, name, path } => {
            let repo = registry.add(id, &name, &path)?;
            println!(
                "Added repository {} ({}) from {}",
                repo.repo_id,
                repo.name,
                repo.source_path.display()
            );
        }
        RepoOperation::List => {
            let repos = code_browser::RepoRegistry::list(&registry);
            if repos.is_empty() {
                println!("No repositories registered");
            }
            for repo in repos {
                let index = if repo.index_path().is_file() { "scip" } else { "-" };
                println!(
                    "{:>6}  {:<24}  {:<5}  {}",
                    repo.repo_id,
                    repo.name,
                    index,
                    repo.source_path.display()
                );
            }
        }
        RepoOperation::Remove { id } => {
            registry.remove(id)?;
            println!("Removed repository {}", id);
        }
        RepoOperation::RegisterScip { id, path } => {
            let installed: PathBuf = registry.register_scip(id, &path)?;
            println!("Installed SCIP index for repository {} at {}", id, installed.display());
            println!("A running server picks it up after POST /api/repositories/{}/scip/reload", id);
        }
    }
    Ok(())
}
