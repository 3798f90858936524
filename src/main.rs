mod common;
mod quiz;
mod ui;

use clap::{Parser, ValueHint};
use std::io::IsTerminal;
use std::path::PathBuf;

use crate::quiz::QuizCommands;
use crate::quiz::config::CONFIG_FILE_NAME;
use crate::ui::prelude::*;

/// Narrated vertical quiz videos from a CSV table, uploaded to YouTube on a daily cap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project config file; relative paths inside it resolve against its directory
    #[arg(short, long, global = true, default_value = CONFIG_FILE_NAME, value_hint = ValueHint::FilePath)]
    config: PathBuf,

    /// Activate debug mode
    #[arg(short, long, global = true)]
    debug: bool,

    /// Output format for messages
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    #[command(subcommand)]
    command: QuizCommands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    ui::init(cli.output, std::io::stdout().is_terminal());
    ui::set_debug_mode(cli.debug);
    if cli.debug {
        emit(
            Level::Debug,
            "quizreel.debug",
            &format!("Using config {}", cli.config.display()),
            None,
        );
    }

    if let Err(err) = quiz::handle_quiz_command(cli.command, &cli.config).await {
        emit(Level::Error, "quizreel.error", &format!("Error: {err:#}"), None);
        std::process::exit(1);
    }
}
