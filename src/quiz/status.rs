use anyhow::Result;
use chrono::{DateTime, Local};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};
use serde_json::json;

use super::config::QuizConfig;
use super::ledger::{Ledger, RowStatus};
use super::rows::{QuizRow, load_rows};
use crate::ui::prelude::{Level, OutputFormat, emit, get_output_format, separator};

const QUESTION_PREVIEW_CHARS: usize = 40;

#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub row: usize,
    pub question: String,
    pub status: RowStatus,
    pub video_id: Option<String>,
    pub rendered_at: Option<String>,
    pub uploaded_at: Option<String>,
}

pub fn collect_status(
    ledger: &Ledger,
    config: &QuizConfig,
    rows: &[QuizRow],
) -> Result<Vec<StatusLine>> {
    rows.iter()
        .map(|row| {
            let status = ledger.resolve_status(row, config)?;
            let entry = ledger.entry(row.number)?;
            Ok(StatusLine {
                row: row.number,
                question: row.question.clone(),
                status,
                video_id: entry.as_ref().and_then(|e| e.video_id.clone()),
                rendered_at: entry.as_ref().and_then(|e| e.rendered_at.clone()),
                uploaded_at: entry.and_then(|e| e.uploaded_at),
            })
        })
        .collect()
}

fn preview(text: &str) -> String {
    if text.chars().count() <= QUESTION_PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(QUESTION_PREVIEW_CHARS - 1).collect();
    format!("{cut}…")
}

/// Render an RFC 3339 timestamp as local `YYYY-MM-DD HH:MM`.
fn short_time(value: Option<&str>) -> String {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn status_cell(status: RowStatus) -> Cell {
    let color = match status {
        RowStatus::Pending => Color::DarkGrey,
        RowStatus::Rendered => Color::Yellow,
        RowStatus::Uploaded => Color::Green,
    };
    Cell::new(status.as_str()).fg(color)
}

fn status_table(lines: &[StatusLine]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Row", "Question", "Status", "Video ID", "Rendered", "Uploaded",
        ]);
    for line in lines {
        table.add_row(vec![
            Cell::new(line.row),
            Cell::new(preview(&line.question)),
            status_cell(line.status),
            Cell::new(line.video_id.as_deref().unwrap_or("-")),
            Cell::new(short_time(line.rendered_at.as_deref())),
            Cell::new(short_time(line.uploaded_at.as_deref())),
        ]);
    }
    table
}

pub fn handle_status(config: &QuizConfig) -> Result<()> {
    let table = load_rows(&config.csv_path())?;
    let invalid = table.report_invalid(&[]);
    let ledger = Ledger::open(&config.ledger_path())?;
    let lines = collect_status(&ledger, config, &table.rows)?;
    let today = ledger.uploads_on(Local::now().date_naive())?;

    let count = |wanted: RowStatus| lines.iter().filter(|l| l.status == wanted).count();
    let mut summary = format!(
        "{} pending, {} rendered, {} uploaded",
        count(RowStatus::Pending),
        count(RowStatus::Rendered),
        count(RowStatus::Uploaded),
    );
    if invalid > 0 {
        summary.push_str(&format!(", {invalid} invalid"));
    }
    summary.push_str(&format!("; {today}/{} uploads today", config.upload.daily_limit));

    if matches!(get_output_format(), OutputFormat::Json) {
        let rows: Vec<_> = lines
            .iter()
            .map(|l| {
                json!({
                    "row": l.row,
                    "question": l.question,
                    "status": l.status.as_str(),
                    "video_id": l.video_id,
                    "rendered_at": l.rendered_at,
                    "uploaded_at": l.uploaded_at,
                })
            })
            .collect();
        emit(
            Level::Info,
            "status.rows",
            &summary,
            Some(json!({
                "rows": rows,
                "invalid": table.invalid.iter().map(|bad| bad.number).collect::<Vec<_>>(),
                "uploads_today": today,
            })),
        );
        return Ok(());
    }

    let grid = status_table(&lines);
    println!("{grid}");
    separator(true);
    emit(Level::Info, "status.summary", &summary, None);
    Ok(())
}
