// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! edgerag - on-device retrieval-augmented generation.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod shell;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use edgerag::{App, ConsoleSink, load_image};
use edgerag_config::EdgeRagConfig;
use edgerag_core::EdgeRagError;
use edgerag_core::types::GenerationMode;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// edgerag - on-device retrieval-augmented generation.
#[derive(Parser, Debug)]
#[command(name = "edgerag", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Split a corpus file into chunks and record them in semantic memory.
    Ingest {
        /// Text file whose chunks start at lines beginning with the chunk separator.
        file: PathBuf,
    },
    /// Answer a question from recorded memory.
    Ask {
        query: String,
        /// Attach an image and answer with the vision model.
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Translate text without consulting memory.
    Translate {
        text: String,
        /// Target language, e.g. "French".
        #[arg(long = "to")]
        language: String,
    },
    /// Launch an interactive REPL session.
    Shell,
    /// Show model files, memory size, and backend reachability.
    Status {
        /// Output machine-readable JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => edgerag_config::load_and_validate_path(path),
        None => edgerag_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            edgerag_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.app.log_level);

    let result = match cli.command {
        Some(Commands::Ingest { file }) => run_ingest(config, &file).await,
        Some(Commands::Ask { query, image }) => run_ask(config, &query, image.as_deref()).await,
        Some(Commands::Translate { text, language }) => {
            run_translate(config, &text, &language).await
        }
        Some(Commands::Shell) => shell::run_shell(config).await,
        Some(Commands::Status { json, plain }) => status::run_status(&config, json, plain).await,
        None => {
            println!("edgerag: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {e}", "error".red());
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise edgerag crates log at the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("edgerag={log_level},warn")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run_ingest(config: EdgeRagConfig, file: &std::path::Path) -> Result<(), EdgeRagError> {
    let corpus = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| EdgeRagError::Storage {
            source: Box::new(e),
        })?;
    let app = App::open(config).await?;
    let report = app.ingest_corpus(&corpus).await?;
    info!(file = %file.display(), recorded = report.recorded, "ingestion complete");
    println!(
        "recorded {} chunk(s); memory now holds {}",
        report.recorded,
        app.chunk_count().await
    );
    if let Some(e) = report.snapshot_error {
        return Err(e);
    }
    if app.config().memory.store_path.is_none() {
        eprintln!(
            "{}",
            "note: memory.store_path is unset, chunks are not kept after exit".dimmed()
        );
    }
    Ok(())
}

async fn run_ask(
    config: EdgeRagConfig,
    query: &str,
    image: Option<&std::path::Path>,
) -> Result<(), EdgeRagError> {
    let app = App::open(config).await?;
    let sink = ConsoleSink::stdout();
    let mode = match image {
        Some(path) => GenerationMode::Multimodal(load_image(path).await?),
        None => GenerationMode::TextOnly,
    };
    let ctrl_c = CtrlC::watch();
    app.respond(query, &mode, &sink, ctrl_c.token()).await;
    app.shutdown().await;
    Ok(())
}

async fn run_translate(
    config: EdgeRagConfig,
    text: &str,
    language: &str,
) -> Result<(), EdgeRagError> {
    let app = App::open(config).await?;
    let sink = ConsoleSink::stdout();
    let ctrl_c = CtrlC::watch();
    app.translate(text, language, &sink, ctrl_c.token()).await;
    app.shutdown().await;
    Ok(())
}

/// Cancels its token on Ctrl+C while alive.
pub(crate) struct CtrlC {
    token: CancellationToken,
    watcher: tokio::task::JoinHandle<()>,
}

impl CtrlC {
    pub(crate) fn watch() -> Self {
        let token = CancellationToken::new();
        let cancel = token.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
        Self { token, watcher }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for CtrlC {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Only jemalloc supports advancing the stats epoch.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    #[serial_test::serial]
    fn binary_loads_config_defaults() {
        let config = edgerag_config::load_and_validate().expect("default config should be valid");
        assert_eq!(config.app.name, "edgerag");
    }

    #[test]
    #[serial_test::serial]
    fn env_overrides_reach_the_config() {
        // SAFETY: env-mutating tests are serialized.
        unsafe { std::env::set_var("EDGERAG_BACKEND_MODEL", "llava:7b") };
        let loaded = edgerag_config::load_and_validate();
        unsafe { std::env::remove_var("EDGERAG_BACKEND_MODEL") };

        let config = loaded.expect("config should load");
        assert_eq!(config.backend.model, "llava:7b");
        assert_eq!(config.multimodal_model(), "llava:7b");
    }

    #[test]
    fn cli_parses_ask_with_image() {
        let cli = Cli::try_parse_from(["edgerag", "ask", "what is this?", "--image", "a.png"])
            .unwrap();
        match cli.command {
            Some(Commands::Ask { query, image }) => {
                assert_eq!(query, "what is this?");
                assert_eq!(image, Some(PathBuf::from("a.png")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_requires_translation_target() {
        assert!(Cli::try_parse_from(["edgerag", "translate", "hola"]).is_err());
        let cli = Cli::try_parse_from(["edgerag", "translate", "hola", "--to", "English"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Translate { ref language, .. }) if language == "English"
        ));
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["edgerag", "status", "--config", "x.toml", "--json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }
}
