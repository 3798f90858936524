use anyhow::Result;
use async_trait::async_trait;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};
use serde_json::json;
use std::path::PathBuf;

use super::config::QuizConfig;
use crate::ui::prelude::{Level, OutputFormat, emit, get_output_format};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass(String),
    Fail(String),
    Warning(String),
}

impl CheckStatus {
    pub fn message(&self) -> &str {
        match self {
            CheckStatus::Pass(msg) | CheckStatus::Fail(msg) | CheckStatus::Warning(msg) => msg,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CheckStatus::Pass(_) => "PASS",
            CheckStatus::Fail(_) => "FAIL",
            CheckStatus::Warning(_) => "WARN",
        }
    }

    pub fn cell(&self) -> Cell {
        let color = match self {
            CheckStatus::Pass(_) => Color::Green,
            CheckStatus::Fail(_) => Color::Red,
            CheckStatus::Warning(_) => Color::Yellow,
        };
        Cell::new(self.label()).fg(color)
    }
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
}

#[async_trait]
pub trait DoctorCheck: Send + Sync {
    fn name(&self) -> String;

    async fn execute(&self) -> CheckStatus;
}

/// An executable that must be on PATH.
pub struct ToolCheck {
    binary: &'static str,
    /// What breaks without it
    purpose: &'static str,
    required: bool,
}

#[async_trait]
impl DoctorCheck for ToolCheck {
    fn name(&self) -> String {
        format!("{} on PATH", self.binary)
    }

    async fn execute(&self) -> CheckStatus {
        match which::which(self.binary) {
            Ok(path) => CheckStatus::Pass(path.display().to_string()),
            Err(_) if self.required => {
                CheckStatus::Fail(format!("not found; needed for {}", self.purpose))
            }
            Err(_) => CheckStatus::Warning(format!("not found; {}", self.purpose)),
        }
    }
}

/// A file referenced from the config.
pub struct FileCheck {
    label: &'static str,
    path: PathBuf,
    /// Message when missing; `None` makes the file mandatory
    fallback: Option<&'static str>,
}

#[async_trait]
impl DoctorCheck for FileCheck {
    fn name(&self) -> String {
        self.label.to_string()
    }

    async fn execute(&self) -> CheckStatus {
        if self.path.is_file() {
            return CheckStatus::Pass(self.path.display().to_string());
        }
        let missing = format!("missing at {}", self.path.display());
        match self.fallback {
            Some(fallback) => CheckStatus::Warning(format!("{missing}; {fallback}")),
            None => CheckStatus::Fail(missing),
        }
    }
}

pub fn default_checks(config: &QuizConfig) -> Vec<Box<dyn DoctorCheck>> {
    let file = |label: &'static str, path: PathBuf, fallback: Option<&'static str>| -> Box<dyn DoctorCheck> {
        Box::new(FileCheck {
            label,
            path,
            fallback,
        })
    };

    vec![
        Box::new(ToolCheck {
            binary: "ffmpeg",
            purpose: "encoding videos",
            required: true,
        }),
        Box::new(ToolCheck {
            binary: "ffprobe",
            purpose: "measuring narration length",
            required: true,
        }),
        Box::new(ToolCheck {
            binary: "edge-tts",
            purpose: "narration falls back to Google TTS",
            required: false,
        }),
        file("Question table", config.csv_path(), None),
        file(
            "Font",
            config.font_path(),
            Some("system fonts will be tried"),
        ),
        file("Logo", config.logo_path(), Some("frames will have no logo")),
        file(
            "Background music",
            config.background_audio(),
            Some("layer will be skipped"),
        ),
        file(
            "Clock sound",
            config.clock_audio(),
            Some("layer will be skipped"),
        ),
        file(
            "Success sound",
            config.success_audio(),
            Some("layer will be skipped"),
        ),
        file(
            "OAuth token",
            config.token_path(),
            Some("uploads need a token.json from the consent step"),
        ),
        file(
            "Client secrets",
            config.client_secrets_path(),
            Some("token refresh relies on the ids inside token.json"),
        ),
    ]
}

pub async fn run_all_checks(checks: Vec<Box<dyn DoctorCheck>>) -> Vec<CheckResult> {
    let mut results = Vec::with_capacity(checks.len());
    for check in checks {
        results.push(CheckResult {
            name: check.name(),
            status: check.execute().await,
        });
    }
    results
}

fn results_table(results: &[CheckResult]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Check", "Status", "Details"]);
    for result in results {
        table.add_row(vec![
            Cell::new(&result.name),
            result.status.cell(),
            Cell::new(result.status.message()),
        ]);
    }
    table
}

pub fn print_results(results: &[CheckResult]) {
    if matches!(get_output_format(), OutputFormat::Json) {
        for result in results {
            emit(
                Level::Info,
                "doctor.check",
                &format!("{}: {}", result.name, result.status.message()),
                Some(json!({
                    "check": result.name,
                    "status": result.status.label(),
                    "message": result.status.message(),
                })),
            );
        }
        return;
    }

    let table = results_table(results);
    println!("{table}");
}

pub async fn handle_doctor(config: &QuizConfig) -> Result<()> {
    let results = run_all_checks(default_checks(config)).await;
    print_results(&results);

    let failed = results
        .iter()
        .filter(|r| matches!(r.status, CheckStatus::Fail(_)))
        .count();
    if failed > 0 {
        emit(
            Level::Warn,
            "doctor.summary",
            &format!("{failed} required check(s) failed"),
            None,
        );
    } else {
        emit(Level::Success, "doctor.summary", "Ready to render", None);
    }
    Ok(())
}
