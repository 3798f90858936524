//! Video assembly: narration, frames, audio layers and the final encode.

mod compiler;
mod runner;
pub mod timeline;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::{StreamExt, stream};
use serde_json::json;

pub use self::compiler::FfmpegCompiler;
pub use self::runner::{FfmpegRunOptions, FfmpegRunner, SystemFfmpegRunner};
use self::timeline::{
    AudioBeds, PhaseDurations, PhaseVisual, PhaseVisuals, Timeline, plan_audio_layers,
};
use super::cli::RenderArgs;
use super::config::{AudioSettings, QuizConfig};
use super::frame::{CountdownBar, FrameCompositor, save_png};
use super::ledger::{Ledger, RowStatus};
use super::narration::{NarrationChain, NarrationSource};
use super::rows::{OptionSet, QuizRow, QuizTable, load_rows};
use super::support::ffmpeg::probe_duration_seconds;
use crate::common::shell::format_command;
use crate::ui::prelude::{Level, emit};

/// Measures the length of an audio file in seconds.
pub type DurationProbe = fn(&Path) -> Result<f64>;

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub think_seconds: f64,
    pub reveal_seconds: f64,
    pub fps: u32,
    pub preset: String,
    pub audio: AudioSettings,
    pub beds: AudioBeds,
    pub output_dir: PathBuf,
}

impl RenderSettings {
    pub fn from_config(config: &QuizConfig) -> Self {
        Self {
            think_seconds: config.video.think_seconds,
            reveal_seconds: config.video.reveal_seconds,
            fps: config.video.fps,
            preset: config.video.preset.clone(),
            audio: config.audio.clone(),
            beds: AudioBeds::from_config(config),
            output_dir: config.output_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    pub dry_run: bool,
    pub verbose: bool,
    pub show_progress: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Rendered(PathBuf),
    /// Dry run: the command that would have been executed
    Planned(String),
}

/// Produces one finished MP4 per quiz row.
pub struct VideoAssembler {
    compositor: Arc<FrameCompositor>,
    narration: NarrationChain,
    runner: Arc<dyn FfmpegRunner>,
    probe: DurationProbe,
    settings: RenderSettings,
}

impl VideoAssembler {
    pub fn new(
        compositor: FrameCompositor,
        narration: NarrationChain,
        runner: Arc<dyn FfmpegRunner>,
        settings: RenderSettings,
    ) -> Self {
        Self {
            compositor: Arc::new(compositor),
            narration,
            runner,
            probe: probe_duration_seconds,
            settings,
        }
    }

    #[cfg(test)]
    pub fn with_probe(mut self, probe: DurationProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn output_path(&self, row_number: usize) -> PathBuf {
        self.settings
            .output_dir
            .join(QuizConfig::video_file_name(row_number))
    }

    pub async fn render_row(
        &self,
        row: &QuizRow,
        options: &OptionSet,
        run: RenderOptions,
    ) -> Result<RowOutcome> {
        if row.has_duplicate_options() {
            emit(
                Level::Warn,
                "render.row.duplicate_options",
                &format!(
                    "Row {} repeats an answer; only the first matching box is highlighted",
                    row.number
                ),
                None,
            );
        }

        let scratch = tempfile::Builder::new()
            .prefix(&format!("quizreel-row{}-", row.number))
            .tempdir()
            .context("Failed to create scratch directory")?;

        let narration_path = scratch.path().join("narration.mp3");
        let source = self
            .narration
            .synthesize(&row.question, &narration_path)
            .await
            .with_context(|| format!("Narration failed for row {}", row.number))?;
        if let NarrationSource::Engine(name) = source {
            emit(
                Level::Debug,
                "render.narration.done",
                &format!("Row {} narrated with {name}", row.number),
                None,
            );
        }

        let probe = self.probe;
        let probe_path = narration_path.clone();
        let narration_seconds = tokio::task::spawn_blocking(move || probe(&probe_path))
            .await
            .context("Duration probe task panicked")??;

        let compositor = Arc::clone(&self.compositor);
        let frames = FrameJob {
            question: row.question.clone(),
            options: options.clone(),
            bar: CountdownBar::new(self.settings.think_seconds, compositor.palette().accent),
            fps: self.settings.fps,
            dir: scratch.path().to_path_buf(),
        };
        let visuals = tokio::task::spawn_blocking(move || frames.write(&compositor))
            .await
            .context("Frame rendering task panicked")??;

        let timeline = Timeline::quiz(
            PhaseDurations {
                narration: narration_seconds,
                think: self.settings.think_seconds,
                reveal: self.settings.reveal_seconds,
            },
            visuals,
        );
        let layers = plan_audio_layers(
            &narration_path,
            &timeline,
            &self.settings.beds,
            &self.settings.audio,
        );

        let final_path = self.output_path(row.number);
        let part_path = partial_path(&final_path);
        let compiled = FfmpegCompiler::new(self.settings.fps, self.settings.preset.clone())
            .compile(&part_path, &timeline, &layers)?;

        if run.dry_run {
            // Keep the inputs around so the printed command can be replayed
            let kept = scratch.keep();
            emit(
                Level::Debug,
                "render.dry_run.scratch",
                &format!("Kept scratch files in {}", kept.display()),
                None,
            );
            return Ok(RowOutcome::Planned(format_command("ffmpeg", &compiled.args)));
        }

        tokio::fs::create_dir_all(&self.settings.output_dir)
            .await
            .with_context(|| {
                format!("Failed to create {}", self.settings.output_dir.display())
            })?;

        let runner = Arc::clone(&self.runner);
        let run_options = FfmpegRunOptions::new(
            run.show_progress.then_some(compiled.total_duration),
            run.verbose,
            format!("row {}", row.number),
        );
        let args = compiled.args;
        let encoded = tokio::task::spawn_blocking(move || runner.run(&args, run_options))
            .await
            .context("ffmpeg task panicked")?;

        if let Err(err) = encoded {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(err.context(format!("Encoding failed for row {}", row.number)));
        }

        tokio::fs::rename(&part_path, &final_path)
            .await
            .with_context(|| format!("Failed to move video into {}", final_path.display()))?;

        Ok(RowOutcome::Rendered(final_path))
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// Still and countdown images for one row, written to its scratch dir.
struct FrameJob {
    question: String,
    options: OptionSet,
    bar: CountdownBar,
    fps: u32,
    dir: PathBuf,
}

impl FrameJob {
    fn write(self, compositor: &FrameCompositor) -> Result<PhaseVisuals> {
        let options = self.options.options();

        let question = compositor.render(&self.question, options, None);
        let question_path = self.dir.join("question.png");
        save_png(&question, &question_path)?;

        let reveal = compositor.render(&self.question, options, Some(self.options.correct()));
        let reveal_path = self.dir.join("reveal.png");
        save_png(&reveal, &reveal_path)?;

        let countdown_dir = self.dir.join("countdown");
        std::fs::create_dir_all(&countdown_dir)
            .with_context(|| format!("Failed to create {}", countdown_dir.display()))?;
        for (i, t) in self.bar.frame_times(self.fps).enumerate() {
            let frame = self.bar.render(&question, t);
            save_png(&frame, &countdown_dir.join(format!("frame_{i:05}.png")))?;
        }

        Ok(PhaseVisuals {
            question: PhaseVisual::Still(question_path),
            countdown: PhaseVisual::Frames {
                pattern: countdown_dir.join("frame_%05d.png"),
                fps: self.fps,
            },
            reveal: PhaseVisual::Still(reveal_path),
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RenderSummary {
    pub ok: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Rows to render this run, plus a summary already holding the rows
/// skipped as done and the invalid rows counted as failed.
pub fn select_rows(
    table: &QuizTable,
    args: &RenderArgs,
    ledger: &Ledger,
    config: &QuizConfig,
) -> Result<(Vec<QuizRow>, RenderSummary)> {
    for wanted in &args.rows {
        let known = table.rows.iter().any(|row| row.number == *wanted)
            || table.invalid_row(*wanted).is_some();
        if !known {
            emit(
                Level::Warn,
                "render.row.unknown",
                &format!("Row {wanted} does not exist in the question table"),
                None,
            );
        }
    }

    let mut summary = RenderSummary {
        failed: table.report_invalid(&args.rows),
        ..RenderSummary::default()
    };
    let mut selected = Vec::new();
    for row in &table.rows {
        if !args.rows.is_empty() && !args.rows.contains(&row.number) {
            continue;
        }

        let video = config.output_dir().join(QuizConfig::video_file_name(row.number));
        let done = match ledger.resolve_status(row, config)? {
            RowStatus::Uploaded => true,
            RowStatus::Rendered => !args.force && video.is_file(),
            RowStatus::Pending => false,
        };
        if done {
            summary.skipped += 1;
            continue;
        }

        if args.limit.is_some_and(|limit| selected.len() >= limit) {
            break;
        }
        selected.push(row.clone());
    }

    Ok((selected, summary))
}

fn emit_summary(summary: &RenderSummary) {
    emit(
        Level::Info,
        "render.summary",
        &format!(
            "{} ok, {} skipped, {} failed",
            summary.ok, summary.skipped, summary.failed
        ),
        Some(json!({
            "ok": summary.ok,
            "skipped": summary.skipped,
            "failed": summary.failed,
        })),
    );
}

pub async fn handle_render(config: &QuizConfig, args: RenderArgs) -> Result<()> {
    let table = load_rows(&config.csv_path())?;
    let ledger = Ledger::open(&config.ledger_path())?;
    let (selected, baseline) = select_rows(&table, &args, &ledger, config)?;

    if selected.is_empty() {
        emit(
            Level::Info,
            "render.nothing",
            "Nothing to render; every selected row already has a video",
            None,
        );
        if baseline.failed > 0 {
            emit_summary(&baseline);
        }
        return Ok(());
    }

    let narration = NarrationChain::from_settings(&config.narration, !args.no_cache)?;
    emit(
        Level::Debug,
        "render.narration.engines",
        &format!("Speech engines: {}", narration.engine_names().join(", ")),
        None,
    );
    let assembler = VideoAssembler::new(
        FrameCompositor::from_config(config)?,
        narration,
        Arc::new(SystemFfmpegRunner),
        RenderSettings::from_config(config),
    );
    run_render(&assembler, &ledger, selected, &args, baseline).await?;
    Ok(())
}

pub async fn run_render(
    assembler: &VideoAssembler,
    ledger: &Ledger,
    rows: Vec<QuizRow>,
    args: &RenderArgs,
    baseline: RenderSummary,
) -> Result<RenderSummary> {
    let jobs = usize::from(args.jobs.max(1));
    let run = RenderOptions {
        dry_run: args.dry_run,
        verbose: args.verbose,
        show_progress: jobs == 1 && !args.verbose,
    };

    // Shuffle up front so the RNG never crosses an await
    let work: Vec<(QuizRow, OptionSet)> = {
        let mut rng = rand::thread_rng();
        rows.into_iter()
            .map(|row| {
                let options = OptionSet::shuffled(&row, &mut rng);
                (row, options)
            })
            .collect()
    };

    emit(
        Level::Info,
        "render.start",
        &format!("Rendering {} row(s) with {jobs} job(s)", work.len()),
        None,
    );

    let mut results = stream::iter(work)
        .map(|(row, options)| async move {
            emit(
                Level::Info,
                "render.row.start",
                &format!("Row {}: {}", row.number, row.question),
                None,
            );
            let outcome = assembler.render_row(&row, &options, run).await;
            (row, outcome)
        })
        .buffer_unordered(jobs);

    let mut summary = baseline;
    while let Some((row, outcome)) = results.next().await {
        match outcome {
            Ok(RowOutcome::Rendered(path)) => {
                ledger.mark_rendered(&row, &path)?;
                summary.ok += 1;
                emit(
                    Level::Success,
                    "render.row.done",
                    &format!("Row {} → {}", row.number, path.display()),
                    Some(json!({ "row": row.number, "path": path })),
                );
            }
            Ok(RowOutcome::Planned(command)) => {
                summary.ok += 1;
                emit(
                    Level::Info,
                    "render.dry_run",
                    &format!("Row {}: {command}", row.number),
                    Some(json!({ "row": row.number, "command": command })),
                );
            }
            Err(err) => {
                summary.failed += 1;
                emit(
                    Level::Error,
                    "render.row.failed",
                    &format!("Row {} failed: {err:#}", row.number),
                    Some(json!({ "row": row.number, "error": format!("{err:#}") })),
                );
            }
        }
    }

    emit_summary(&summary);
    Ok(summary)
}
