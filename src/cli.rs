//! CLI argument definitions using clap with subcommand architecture

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::ServerConfig;
use crate::search::EngineKind;

/// Code browsing service with SCIP-backed go-to-definition
#[derive(Parser, Debug)]
#[command(name = "code-browser")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Data directory (registry database, per-repository index files)
    #[arg(long, global = true, env = "CODE_BROWSER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Config file (default: <data-dir>/config.toml)
    #[arg(long, global = true, env = "CODE_BROWSER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

// ============================================
// Main Commands Enum
// ============================================

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),

    /// Manage registered repositories
    Repo(RepoArgs),

    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Listen address (overrides config)
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Search engine (overrides config)
    #[arg(long, value_enum)]
    pub engine: Option<EngineKind>,

    /// zoekt-webserver URL (overrides config)
    #[arg(long, env = "ZOEKT_URL")]
    pub zoekt_url: Option<String>,
}

impl ServeArgs {
    /// Apply command-line overrides on top of the loaded config
    pub fn apply_to(&self, config: &mut ServerConfig) {
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(engine) = self.engine {
            config.search.engine = engine;
        }
        if let Some(url) = &self.zoekt_url {
            config.search.zoekt_url = url.clone();
        }
    }
}

#[derive(Args, Debug)]
pub struct RepoArgs {
    #[command(subcommand)]
    pub operation: RepoOperation,
}

#[derive(Subcommand, Debug)]
pub enum RepoOperation {
    /// Register a repository
    Add {
        /// Numeric id (also the zoekt repository id)
        #[arg(long)]
        id: u32,

        /// Display name
        #[arg(long)]
        name: String,

        /// Source tree on disk
        #[arg(long)]
        path: PathBuf,
    },

    /// List registered repositories
    List,

    /// Remove a repository and its data directory
    Remove {
        #[arg(long)]
        id: u32,
    },

    /// Install a SCIP index file for a repository
    RegisterScip {
        #[arg(long)]
        id: u32,

        /// Index produced by a SCIP indexer (e.g. index.scip)
        #[arg(long)]
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::parse_from([
            "code-browser",
            "serve",
            "--listen",
            "127.0.0.1:9999",
            "--engine",
            "ripgrep",
        ]);
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };

        let mut config = ServerConfig::default();
        args.apply_to(&mut config);
        assert_eq!(config.listen.port(), 9999);
        assert_eq!(config.search.engine, EngineKind::Ripgrep);
        assert_eq!(config.search.zoekt_url, "http://localhost:6070");
    }

    #[test]
    fn test_repo_subcommands() {
        let cli = Cli::parse_from([
            "code-browser",
            "--data-dir",
            "/tmp/cb",
            "repo",
            "register-scip",
            "--id",
            "4",
            "--path",
            "index.scip",
        ]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/cb")));
        match cli.command {
            Commands::Repo(RepoArgs {
                operation: RepoOperation::RegisterScip { id, path },
            }) => {
                assert_eq!(id, 4);
                assert_eq!(path, PathBuf::from("index.scip"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
