//! Per-row status ledger backed by SQLite.
//!
//! Each CSV row number has at most one entry. Rows without an entry are
//! inferred from what is on disk the first time they are looked at, so
//! output directories produced before the ledger existed keep working.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDate};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::config::QuizConfig;
use super::rows::QuizRow;

const CURRENT_SCHEMA_VERSION: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Pending,
    Rendered,
    Uploaded,
}

impl RowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RowStatus::Pending => "pending",
            RowStatus::Rendered => "rendered",
            RowStatus::Uploaded => "uploaded",
        }
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RowStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(RowStatus::Pending),
            "rendered" => Ok(RowStatus::Rendered),
            "uploaded" => Ok(RowStatus::Uploaded),
            other => bail!("Unknown row status '{other}' in ledger"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub row_number: usize,
    pub question: String,
    pub status: RowStatus,
    pub video_path: Option<PathBuf>,
    pub video_id: Option<String>,
    /// RFC 3339 timestamps
    pub rendered_at: Option<String>,
    pub uploaded_at: Option<String>,
}

pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open ledger {}", path.display()))?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL,
                updated TEXT NOT NULL,
                PRIMARY KEY (version)
            )",
            (),
        )?;

        let version: i32 = conn
            .query_row(
                "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        if version < CURRENT_SCHEMA_VERSION {
            Self::migrate_schema(conn, version)?;
        }
        Ok(())
    }

    fn migrate_schema(conn: &Connection, from_version: i32) -> Result<()> {
        if from_version < 1 {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS rows (
                    row_number INTEGER PRIMARY KEY,
                    question TEXT NOT NULL,
                    status TEXT NOT NULL,
                    video_path TEXT,
                    video_id TEXT,
                    rendered_at TEXT,
                    uploaded_at TEXT,
                    upload_day TEXT
                )",
                (),
            )?;
            conn.execute(
                "INSERT INTO schema_version (version, updated) VALUES (1, datetime('now'))",
                [],
            )?;
        }
        Ok(())
    }

    pub fn entry(&self, row_number: usize) -> Result<Option<LedgerEntry>> {
        self.conn
            .query_row(
                "SELECT row_number, question, status, video_path, video_id, rendered_at, uploaded_at
                 FROM rows WHERE row_number = ?",
                [row_number as i64],
                read_entry,
            )
            .optional()?
            .transpose()
    }

    #[cfg(test)]
    pub fn entries(&self) -> Result<Vec<LedgerEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT row_number, question, status, video_path, video_id, rendered_at, uploaded_at
             FROM rows ORDER BY row_number",
        )?;
        let rows = stmt.query_map([], read_entry)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row??);
        }
        Ok(result)
    }

    pub fn status(&self, row_number: usize) -> Result<Option<RowStatus>> {
        Ok(self.entry(row_number)?.map(|e| e.status))
    }

    pub fn mark_rendered(&self, row: &QuizRow, video_path: &Path) -> Result<()> {
        self.conn.execute(
            "INSERT INTO rows (row_number, question, status, video_path, video_id, rendered_at)
             VALUES (?1, ?2, 'rendered', ?3, NULL, ?4)
             ON CONFLICT(row_number) DO UPDATE SET
                question = excluded.question,
                status = 'rendered',
                video_path = excluded.video_path,
                video_id = NULL,
                rendered_at = excluded.rendered_at,
                uploaded_at = NULL,
                upload_day = NULL",
            params![
                row.number as i64,
                row.question,
                video_path.to_string_lossy().into_owned(),
                Local::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Record a finished upload. `at` decides which day's quota it counts against.
    pub fn mark_uploaded(
        &self,
        row: &QuizRow,
        video_id: &str,
        video_path: &Path,
        at: DateTime<Local>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO rows (row_number, question, status, video_path, video_id, uploaded_at, upload_day)
             VALUES (?1, ?2, 'uploaded', ?3, ?4, ?5, ?6)
             ON CONFLICT(row_number) DO UPDATE SET
                question = excluded.question,
                status = 'uploaded',
                video_path = excluded.video_path,
                video_id = excluded.video_id,
                uploaded_at = excluded.uploaded_at,
                upload_day = excluded.upload_day",
            params![
                row.number as i64,
                row.question,
                video_path.to_string_lossy().into_owned(),
                video_id,
                at.to_rfc3339(),
                at.date_naive().to_string()
            ],
        )?;
        Ok(())
    }

    pub fn set_video_path(&self, row_number: usize, video_path: &Path) -> Result<()> {
        self.conn.execute(
            "UPDATE rows SET video_path = ?1 WHERE row_number = ?2",
            params![video_path.to_string_lossy().into_owned(), row_number as i64],
        )?;
        Ok(())
    }

    pub fn reset_pending(&self, row_number: usize) -> Result<()> {
        self.conn.execute(
            "UPDATE rows SET status = 'pending', video_path = NULL, rendered_at = NULL
             WHERE row_number = ?1",
            [row_number as i64],
        )?;
        Ok(())
    }

    /// Number of uploads recorded on the given local calendar day.
    pub fn uploads_on(&self, day: NaiveDate) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM rows WHERE status = 'uploaded' AND upload_day = ?1",
            [day.to_string()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    fn record_inferred(&self, row: &QuizRow, status: RowStatus, video_path: Option<&Path>) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO rows (row_number, question, status, video_path)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                row.number as i64,
                row.question,
                status.as_str(),
                video_path.map(|p| p.to_string_lossy().into_owned())
            ],
        )?;
        Ok(())
    }

    /// Current status of `row`, inferring and recording it from disk when
    /// the ledger has never seen the row.
    pub fn resolve_status(&self, row: &QuizRow, config: &QuizConfig) -> Result<RowStatus> {
        if let Some(status) = self.status(row.number)? {
            return Ok(status);
        }

        let file_name = QuizConfig::video_file_name(row.number);
        let archived = config.archive_dir().join(&file_name);
        let rendered = config.output_dir().join(&file_name);

        let (status, path) = if archived.is_file() {
            (RowStatus::Uploaded, Some(archived))
        } else if rendered.is_file() {
            (RowStatus::Rendered, Some(rendered))
        } else {
            (RowStatus::Pending, None)
        };

        if status != RowStatus::Pending {
            self.record_inferred(row, status, path.as_deref())?;
        }
        Ok(status)
    }
}

fn read_entry(row: &Row<'_>) -> rusqlite::Result<Result<LedgerEntry>> {
    let row_number: i64 = row.get(0)?;
    let status: String = row.get(2)?;
    let video_path: Option<String> = row.get(3)?;
    let question: String = row.get(1)?;
    let video_id: Option<String> = row.get(4)?;
    let rendered_at: Option<String> = row.get(5)?;
    let uploaded_at: Option<String> = row.get(6)?;

    Ok(status.parse::<RowStatus>().map(|status| LedgerEntry {
        row_number: row_number.max(0) as usize,
        question,
        status,
        video_path: video_path.map(PathBuf::from),
        video_id,
        rendered_at,
        uploaded_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn row(number: usize) -> QuizRow {
        QuizRow {
            number,
            question: format!("Question {number}?"),
            correct: "a".into(),
            distractors: ["b".into(), "c".into(), "d".into()],
        }
    }

    fn noon(day: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn unknown_rows_have_no_entry() {
        let ledger = Ledger::in_memory().unwrap();
        assert!(ledger.entry(1).unwrap().is_none());
        assert!(ledger.entries().unwrap().is_empty());
    }

    #[test]
    fn render_then_upload_lifecycle() {
        let ledger = Ledger::in_memory().unwrap();
        let r = row(3);

        ledger.mark_rendered(&r, Path::new("output/video_3.mp4")).unwrap();
        let entry = ledger.entry(3).unwrap().unwrap();
        assert_eq!(entry.status, RowStatus::Rendered);
        assert!(entry.rendered_at.is_some());
        assert_eq!(entry.video_id, None);

        ledger
            .mark_uploaded(&r, "abc123", Path::new("output/video_3.mp4"), noon(2))
            .unwrap();
        ledger
            .set_video_path(3, Path::new("output/subidos/video_3.mp4"))
            .unwrap();

        let entry = ledger.entry(3).unwrap().unwrap();
        assert_eq!(entry.status, RowStatus::Uploaded);
        assert_eq!(entry.video_id.as_deref(), Some("abc123"));
        assert_eq!(
            entry.video_path,
            Some(PathBuf::from("output/subidos/video_3.mp4"))
        );
        assert!(entry.rendered_at.is_some());
    }

    #[test]
    fn uploads_are_counted_per_day() {
        let ledger = Ledger::in_memory().unwrap();
        for n in 1..=3 {
            ledger
                .mark_uploaded(&row(n), &format!("id{n}"), Path::new("v.mp4"), noon(2))
                .unwrap();
        }
        ledger
            .mark_uploaded(&row(4), "id4", Path::new("v.mp4"), noon(3))
            .unwrap();

        assert_eq!(ledger.uploads_on(noon(2).date_naive()).unwrap(), 3);
        assert_eq!(ledger.uploads_on(noon(3).date_naive()).unwrap(), 1);
        assert_eq!(ledger.uploads_on(noon(4).date_naive()).unwrap(), 0);
    }

    #[test]
    fn reset_returns_row_to_pending() {
        let ledger = Ledger::in_memory().unwrap();
        ledger.mark_rendered(&row(1), Path::new("video_1.mp4")).unwrap();
        ledger.reset_pending(1).unwrap();

        let entry = ledger.entry(1).unwrap().unwrap();
        assert_eq!(entry.status, RowStatus::Pending);
        assert_eq!(entry.video_path, None);
    }

    #[test]
    fn infers_status_from_disk() {
        let dir = tempdir().unwrap();
        let config = QuizConfig::with_root(dir.path());
        std::fs::create_dir_all(config.archive_dir()).unwrap();
        std::fs::write(config.output_dir().join("video_2.mp4"), b"mp4").unwrap();
        std::fs::write(config.archive_dir().join("video_1.mp4"), b"mp4").unwrap();

        let ledger = Ledger::in_memory().unwrap();
        assert_eq!(
            ledger.resolve_status(&row(1), &config).unwrap(),
            RowStatus::Uploaded
        );
        assert_eq!(
            ledger.resolve_status(&row(2), &config).unwrap(),
            RowStatus::Rendered
        );
        assert_eq!(
            ledger.resolve_status(&row(3), &config).unwrap(),
            RowStatus::Pending
        );

        // Recorded rows stop following the disk
        std::fs::remove_file(config.output_dir().join("video_2.mp4")).unwrap();
        assert_eq!(
            ledger.resolve_status(&row(2), &config).unwrap(),
            RowStatus::Rendered
        );
        assert!(ledger.entry(3).unwrap().is_none());
    }

    #[test]
    fn ledger_survives_reopening() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/quizreel.db");
        {
            let ledger = Ledger::open(&path).unwrap();
            ledger.mark_rendered(&row(5), Path::new("video_5.mp4")).unwrap();
        }
        let ledger = Ledger::open(&path).unwrap();
        assert_eq!(ledger.status(5).unwrap(), Some(RowStatus::Rendered));
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [RowStatus::Pending, RowStatus::Rendered, RowStatus::Uploaded] {
            assert_eq!(status.as_str().parse::<RowStatus>().unwrap(), status);
        }
        assert!("archived".parse::<RowStatus>().is_err());
    }
}
