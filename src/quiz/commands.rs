use anyhow::{Context, Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs;
use std::path::{Path, PathBuf};

use super::cli::{FrameArgs, InitArgs, QuizCommands};
use super::config::QuizConfig;
use super::doctor::handle_doctor;
use super::frame::{CountdownBar, FrameCompositor, save_png};
use super::render::handle_render;
use super::rows::{OptionSet, load_rows};
use super::status::handle_status;
use super::upload::handle_upload;
use crate::ui::prelude::{Level, emit};

const CSV_HEADER: &str = "pregunta,correcta,incorrecta1,incorrecta2,incorrecta3\n";

pub async fn handle_quiz_command(command: QuizCommands, config_path: &Path) -> Result<()> {
    if let QuizCommands::Init(args) = &command {
        return handle_init(config_path, args);
    }

    let config = QuizConfig::load_from_path(config_path)?;
    match command {
        QuizCommands::Init(_) => Ok(()),
        QuizCommands::Render(args) => handle_render(&config, args).await,
        QuizCommands::Frame(args) => handle_frame(&config, args),
        QuizCommands::Upload(args) => handle_upload(&config, args).await,
        QuizCommands::Status => handle_status(&config),
        QuizCommands::Doctor => handle_doctor(&config).await,
    }
}

fn handle_init(config_path: &Path, args: &InitArgs) -> Result<()> {
    if config_path.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            config_path.display()
        );
    }

    let root = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let config = QuizConfig::with_root(&root);
    config.save_to_path(config_path)?;

    let mut dirs = vec![config.output_dir(), config.archive_dir()];
    for file in [
        config.csv_path(),
        config.font_path(),
        config.logo_path(),
        config.background_audio(),
        config.clock_audio(),
        config.success_audio(),
    ] {
        if let Some(parent) = file.parent() {
            dirs.push(parent.to_path_buf());
        }
    }
    for dir in &dirs {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let csv = config.csv_path();
    if !csv.exists() {
        fs::write(&csv, CSV_HEADER)
            .with_context(|| format!("Failed to write {}", csv.display()))?;
    }

    emit(
        Level::Success,
        "init.done",
        &format!(
            "Wrote {}; add questions to {} and assets under {}",
            config_path.display(),
            csv.display(),
            root.join("assets").display()
        ),
        None,
    );
    Ok(())
}

fn handle_frame(config: &QuizConfig, args: FrameArgs) -> Result<()> {
    let table = load_rows(&config.csv_path())?;
    if let Some(bad) = table.invalid_row(args.row) {
        bail!("Cannot preview {bad}");
    }
    let Some(row) = table.rows.into_iter().find(|r| r.number == args.row) else {
        bail!("Row {} does not exist in {}", args.row, config.csv_path().display());
    };

    // Seeded by row so repeated previews keep the same answer order
    let mut rng = StdRng::seed_from_u64(row.number as u64);
    let options = OptionSet::shuffled(&row, &mut rng);
    let compositor = FrameCompositor::from_config(config)?;

    let highlight = args.reveal.then(|| options.correct());
    let mut frame = compositor.render(&row.question, options.options(), highlight);
    if let Some(seconds) = args.countdown {
        let bar = CountdownBar::new(config.video.think_seconds, compositor.palette().accent);
        frame = bar.render(&frame, seconds);
    }

    let output = args.out_file.unwrap_or_else(|| {
        let suffix = if args.reveal { "_reveal" } else { "" };
        config
            .output_dir()
            .join(format!("frame_{}{suffix}.png", row.number))
    });
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    save_png(&frame, &output)?;

    emit(
        Level::Success,
        "frame.saved",
        &format!("Row {} frame written to {}", row.number, output.display()),
        None,
    );
    Ok(())
}
