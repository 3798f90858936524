use clap::{Args, Subcommand, ValueHint};
use std::path::PathBuf;

#[derive(Subcommand, Debug, Clone)]
pub enum QuizCommands {
    /// Write a default quizreel.toml and create the project directories
    Init(InitArgs),
    /// Render quiz videos for rows of the question table
    Render(RenderArgs),
    /// Render a single preview frame for one row
    Frame(FrameArgs),
    /// Upload rendered videos to YouTube, up to the daily limit
    Upload(UploadArgs),
    /// Show the status of every row
    Status,
    /// Check that external tools and assets are available
    Doctor,
}

#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RenderArgs {
    /// Only render these row numbers (1-based, repeatable)
    #[arg(long = "row", value_name = "N")]
    pub rows: Vec<usize>,

    /// Render at most this many rows
    #[arg(long)]
    pub limit: Option<usize>,

    /// Re-render rows that are already rendered; uploaded rows are never redone
    #[arg(long)]
    pub force: bool,

    /// Number of rows rendered concurrently
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..=16))]
    pub jobs: u16,

    /// Print the ffmpeg command instead of running it
    #[arg(long)]
    pub dry_run: bool,

    /// Always synthesize narration, ignoring the narration cache
    #[arg(long)]
    pub no_cache: bool,

    /// Show ffmpeg output while encoding
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct FrameArgs {
    /// Row number (1-based)
    #[arg(long, value_name = "N")]
    pub row: usize,

    /// Highlight the correct answer
    #[arg(long)]
    pub reveal: bool,

    /// Draw the countdown bar as it looks after this many seconds
    #[arg(long, value_name = "SECONDS", conflicts_with = "reveal")]
    pub countdown: Option<f64>,

    /// Output PNG path; defaults to frame_<n>.png in the output directory
    #[arg(short = 'o', long = "out-file", value_hint = ValueHint::FilePath)]
    pub out_file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct UploadArgs {
    /// Upload at most this many videos in this run
    #[arg(long)]
    pub limit: Option<usize>,

    /// List what would be uploaded without contacting YouTube
    #[arg(long)]
    pub dry_run: bool,
}
