//! Publishing rendered videos under a daily cap.
//!
//! Rows are visited in table order. A row is uploaded at most once: the
//! ledger records the video id before the file is archived, and rows
//! whose video is missing from the output directory are never sent.

mod archive;
pub mod auth;
mod youtube;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

use self::archive::archive_video;
use self::auth::authenticate;
pub use self::youtube::{VideoHost, VideoMetadata, YouTubeClient};
use super::cli::UploadArgs;
use super::config::QuizConfig;
use super::ledger::{Ledger, RowStatus};
use super::rows::{QuizRow, QuizTable, load_rows};
use crate::common::progress::create_spinner;
use crate::ui::prelude::{Level, emit};

#[derive(Debug, Clone, Copy)]
pub struct UploadPlan {
    /// Extra per-run cap on top of the daily limit
    pub limit: Option<usize>,
    pub now: DateTime<Local>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub quota_reached: bool,
}

enum Eligibility {
    AlreadyUploaded,
    NotRendered,
    /// The ledger says rendered but the file is gone
    Vanished,
    Ready(PathBuf),
}

fn eligibility(ledger: &Ledger, config: &QuizConfig, row: &QuizRow) -> Result<Eligibility> {
    let status = ledger.resolve_status(row, config)?;
    if status == RowStatus::Uploaded {
        return Ok(Eligibility::AlreadyUploaded);
    }

    let video = config
        .output_dir()
        .join(QuizConfig::video_file_name(row.number));
    Ok(match (video.is_file(), status) {
        (true, _) => Eligibility::Ready(video),
        (false, RowStatus::Rendered) => Eligibility::Vanished,
        (false, _) => Eligibility::NotRendered,
    })
}

/// Uploads still allowed today, further lowered by the per-run limit.
pub fn remaining_quota(ledger: &Ledger, config: &QuizConfig, plan: &UploadPlan) -> Result<usize> {
    let used = ledger.uploads_on(plan.now.date_naive())?;
    let daily = (config.upload.daily_limit as usize).saturating_sub(used);
    Ok(plan.limit.map_or(daily, |limit| daily.min(limit)))
}

pub async fn run_uploads(
    host: &dyn VideoHost,
    ledger: &Ledger,
    config: &QuizConfig,
    table: &QuizTable,
    plan: &UploadPlan,
) -> Result<UploadSummary> {
    let quota = remaining_quota(ledger, config, plan)?;
    let archive_dir = config.archive_dir();
    let mut summary = UploadSummary {
        skipped: table.report_invalid(&[]),
        ..UploadSummary::default()
    };

    for row in &table.rows {
        let video = match eligibility(ledger, config, row)? {
            Eligibility::AlreadyUploaded => {
                summary.skipped += 1;
                continue;
            }
            Eligibility::NotRendered => {
                emit(
                    Level::Debug,
                    "upload.row.skip",
                    &format!("Row {}: not rendered", row.number),
                    None,
                );
                summary.skipped += 1;
                continue;
            }
            Eligibility::Vanished => {
                emit(
                    Level::Warn,
                    "upload.row.missing",
                    &format!(
                        "Row {}: video is gone from the output directory, marking it pending",
                        row.number
                    ),
                    None,
                );
                ledger.reset_pending(row.number)?;
                summary.skipped += 1;
                continue;
            }
            Eligibility::Ready(video) => video,
        };

        if summary.uploaded >= quota {
            summary.quota_reached = true;
            emit(
                Level::Info,
                "upload.quota.reached",
                &format!("Upload limit reached ({quota} this run), stopping"),
                None,
            );
            break;
        }

        let metadata = VideoMetadata::for_row(row, &config.upload);
        let pb = create_spinner(format!("Uploading row {}: {}", row.number, metadata.title));
        let result = host.upload(&video, &metadata).await;
        pb.finish_and_clear();

        let video_id = match result {
            Ok(id) => id,
            Err(err) => {
                summary.failed += 1;
                emit(
                    Level::Error,
                    "upload.row.failed",
                    &format!("Row {} failed, video kept for the next run: {err}", row.number),
                    Some(json!({ "row": row.number, "error": err.to_string() })),
                );
                continue;
            }
        };

        ledger.mark_uploaded(row, &video_id, &video, plan.now)?;
        summary.uploaded += 1;
        emit(
            Level::Success,
            "upload.row.done",
            &format!("Row {} uploaded as {video_id}", row.number),
            Some(json!({ "row": row.number, "video_id": video_id })),
        );

        match archive_video(&video, &archive_dir, &video_id) {
            Ok(archived) => ledger.set_video_path(row.number, &archived)?,
            Err(err) => emit(
                Level::Error,
                "upload.archive.failed",
                &format!("Row {} uploaded but not archived: {err:#}", row.number),
                None,
            ),
        }
    }

    Ok(summary)
}

/// Rows the next upload run would send, without contacting YouTube.
pub fn preview_uploads(
    ledger: &Ledger,
    config: &QuizConfig,
    table: &QuizTable,
    plan: &UploadPlan,
) -> Result<Vec<(usize, VideoMetadata)>> {
    let quota = remaining_quota(ledger, config, plan)?;
    table.report_invalid(&[]);
    let mut planned = Vec::new();
    for row in &table.rows {
        if planned.len() >= quota {
            break;
        }
        if let Eligibility::Ready(_) = eligibility(ledger, config, row)? {
            planned.push((row.number, VideoMetadata::for_row(row, &config.upload)));
        }
    }
    Ok(planned)
}

pub async fn handle_upload(config: &QuizConfig, args: UploadArgs) -> Result<()> {
    let table = load_rows(&config.csv_path())?;
    let ledger = Ledger::open(&config.ledger_path())?;
    let plan = UploadPlan {
        limit: args.limit,
        now: Local::now(),
    };

    if args.dry_run {
        let planned = preview_uploads(&ledger, config, &table, &plan)?;
        if planned.is_empty() {
            emit(Level::Info, "upload.dry_run", "Nothing would be uploaded", None);
        }
        for (number, metadata) in planned {
            emit(
                Level::Info,
                "upload.dry_run",
                &format!("Row {number}: {}", metadata.title),
                Some(json!({ "row": number, "title": metadata.title })),
            );
        }
        return Ok(());
    }

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;
    let token = authenticate(config, &client).await?;
    let host = YouTubeClient::new(client, token);

    let summary = run_uploads(&host, &ledger, config, &table, &plan).await?;
    emit(
        Level::Info,
        "upload.summary",
        &format!(
            "{} ok, {} skipped, {} failed",
            summary.uploaded, summary.skipped, summary.failed
        ),
        Some(json!({
            "ok": summary.uploaded,
            "skipped": summary.skipped,
            "failed": summary.failed,
            "quota_reached": summary.quota_reached,
        })),
    );
    Ok(())
}
