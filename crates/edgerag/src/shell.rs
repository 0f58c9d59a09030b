// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `edgerag shell` command implementation.
//!
//! Launches an interactive REPL with colored prompt, streaming output,
//! and readline history. Plain lines are questions answered from memory;
//! slash commands attach images, translate, or manage the backend.

use std::path::PathBuf;

use colored::Colorize;
use edgerag::{App, ConsoleSink, load_image};
use edgerag_config::EdgeRagConfig;
use edgerag_core::EdgeRagError;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::warn;

use crate::CtrlC;

/// One parsed line of shell input.
#[derive(Debug, PartialEq, Eq)]
enum ShellCommand {
    Ask(String),
    Image { path: PathBuf, question: String },
    Translate { language: String, text: String },
    Ingest(PathBuf),
    Status,
    Release,
    Reload,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

fn parse_command(line: &str) -> ShellCommand {
    let line = line.trim();
    if line.is_empty() {
        return ShellCommand::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return ShellCommand::Ask(line.to_string());
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    match name {
        "quit" | "exit" => ShellCommand::Quit,
        "help" => ShellCommand::Help,
        "status" => ShellCommand::Status,
        "release" => ShellCommand::Release,
        "reload" => ShellCommand::Reload,
        "ingest" if !args.is_empty() => ShellCommand::Ingest(PathBuf::from(args)),
        "image" => match args.split_once(char::is_whitespace) {
            Some((path, question)) if !question.trim().is_empty() => ShellCommand::Image {
                path: PathBuf::from(path),
                question: question.trim().to_string(),
            },
            _ => ShellCommand::Invalid("usage: /image <path> <question>".to_string()),
        },
        "translate" => match args.split_once(char::is_whitespace) {
            Some((language, text)) if !text.trim().is_empty() => ShellCommand::Translate {
                language: language.to_string(),
                text: text.trim().to_string(),
            },
            _ => ShellCommand::Invalid("usage: /translate <language> <text>".to_string()),
        },
        "ingest" => ShellCommand::Invalid("usage: /ingest <file>".to_string()),
        other => ShellCommand::Invalid(format!("unknown command /{other}, try /help")),
    }
}

const HELP: &str = "\
  <question>                    answer from memory
  /image <path> <question>      answer about an image
  /translate <language> <text>  translate without memory
  /ingest <file>                record a corpus file
  /status                       backend state and counters
  /release                      free the language model
  /reload                       reload the language model
  /quit                         leave the shell";

/// Runs the `edgerag shell` interactive REPL.
pub async fn run_shell(config: EdgeRagConfig) -> Result<(), EdgeRagError> {
    let app = App::open(config).await?;
    if let Err(e) = app.start().await {
        // Requests are rejected until /reload succeeds.
        eprintln!("{}: {e}", "backend failed to load".red());
    }

    let mut rl = DefaultEditor::new()
        .map_err(|e| EdgeRagError::Internal(format!("failed to initialize readline: {e}")))?;

    println!("{}", format!("{} shell", app.config().app.name).bold().green());
    println!(
        "{} chunk(s) in memory. Type {} for commands, {} to exit.\n",
        app.chunk_count().await,
        "/help".yellow(),
        "/quit".yellow()
    );

    let prompt = format!("{}> ", app.config().app.name.green());
    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let command = parse_command(&line);
                if command == ShellCommand::Quit {
                    break;
                }
                if command != ShellCommand::Empty {
                    let _ = rl.add_history_entry(line.trim());
                }
                if let Err(e) = handle_command(&app, command).await {
                    eprintln!("{}: {e}", "error".red());
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        }
    }

    app.shutdown().await;
    println!("{}", "goodbye".dimmed());
    Ok(())
}

async fn handle_command(app: &App, command: ShellCommand) -> Result<(), EdgeRagError> {
    let sink = ConsoleSink::stdout();
    match command {
        ShellCommand::Ask(query) => {
            let ctrl_c = CtrlC::watch();
            app.generate(&query, &sink, ctrl_c.token()).await;
        }
        ShellCommand::Image { path, question } => {
            let image = load_image(&path).await?;
            let ctrl_c = CtrlC::watch();
            let before = app.status().fallbacks;
            app.generate_with_image(&question, &image, &sink, ctrl_c.token())
                .await;
            if app.status().fallbacks > before {
                eprintln!("{}", "(image could not be used, answered from text)".dimmed());
            }
        }
        ShellCommand::Translate { language, text } => {
            let ctrl_c = CtrlC::watch();
            app.translate(&text, &language, &sink, ctrl_c.token()).await;
        }
        ShellCommand::Ingest(path) => {
            let corpus = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| EdgeRagError::Storage {
                    source: Box::new(e),
                })?;
            let report = app.ingest_corpus(&corpus).await?;
            println!("recorded {} chunk(s)", report.recorded);
            if let Some(e) = report.snapshot_error {
                eprintln!("{}: chunks not saved: {e}", "warning".yellow());
            }
        }
        ShellCommand::Status => {
            let status = app.status();
            println!(
                "  state: {}  loaded: {}  answered: {}  fallbacks: {}  chunks: {}",
                status.state,
                status.backend_loaded,
                status.completed,
                status.fallbacks,
                app.chunk_count().await
            );
        }
        ShellCommand::Release => {
            app.shutdown().await;
            println!("{}", "language model released".dimmed());
        }
        ShellCommand::Reload => {
            app.manager().reinitialize().await?;
            println!("{}", "language model loaded".dimmed());
        }
        ShellCommand::Help => println!("{HELP}"),
        ShellCommand::Invalid(message) => {
            warn!(%message, "invalid shell command");
            eprintln!("{}", message.yellow());
        }
        ShellCommand::Quit | ShellCommand::Empty => {}
    }
    Ok(())
}
