use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

struct CommandOutput {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

/// A throwaway project directory with a `quizreel.toml` inside.
struct TestProject {
    dir: TempDir,
}

impl TestProject {
    fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn config(&self) -> PathBuf {
        self.path().join("quizreel.toml")
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::new(env!("CARGO_BIN_EXE_quizreel"))
            .arg("--config")
            .arg(self.config())
            .args(args)
            .current_dir(self.path())
            .output()?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    fn write_questions(&self, body: &str) -> Result<()> {
        std::fs::write(
            self.path().join("data/preguntas.csv"),
            format!("pregunta,correcta,incorrecta1,incorrecta2,incorrecta3\n{body}"),
        )?;
        Ok(())
    }
}

#[test]
fn init_then_status_lists_pending_rows() -> Result<()> {
    let project = TestProject::new()?;

    let output = project.run(&["init"])?;
    assert_eq!(output.exit_code, 0, "init failed: {}", output.stderr);
    assert!(project.config().is_file());

    project.write_questions("Capital of France?,Paris,Lyon,Nice,Rouen\n2+2?,4,3,5,22\n")?;

    let output = project.run(&["--output", "json", "status"])?;
    assert_eq!(output.exit_code, 0, "status failed: {}", output.stderr);

    let event: serde_json::Value = output
        .stdout
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .find(|v: &serde_json::Value| v["code"] == "status.rows")
        .expect("status.rows event");
    let rows = event["data"]["rows"].as_array().expect("rows array");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["status"] == "pending"));
    Ok(())
}

#[test]
fn init_twice_needs_force() -> Result<()> {
    let project = TestProject::new()?;
    assert_eq!(project.run(&["init"])?.exit_code, 0);

    let output = project.run(&["init"])?;
    assert_eq!(output.exit_code, 1);
    assert!(output.stderr.contains("--force") || output.stdout.contains("--force"));

    assert_eq!(project.run(&["init", "--force"])?.exit_code, 0);
    Ok(())
}

#[test]
fn frame_preview_is_written_without_ffmpeg() -> Result<()> {
    let project = TestProject::new()?;
    assert_eq!(project.run(&["init"])?.exit_code, 0);
    project.write_questions("Capital of France?,Paris,Lyon,Nice,Rouen\n")?;

    let target = project.path().join("preview.png");
    let output = project.run(&[
        "frame",
        "--row",
        "1",
        "--countdown",
        "2.5",
        "-o",
        target.to_str().unwrap(),
    ])?;
    assert_eq!(output.exit_code, 0, "frame failed: {}", output.stderr);

    let image = image::open(&target)?;
    assert_eq!((image.width(), image.height()), (1080, 1920));
    Ok(())
}

#[test]
fn upload_dry_run_needs_no_credentials() -> Result<()> {
    let project = TestProject::new()?;
    assert_eq!(project.run(&["init"])?.exit_code, 0);
    project.write_questions("Q?,a,b,c,d\n")?;

    let output = project.run(&["upload", "--dry-run"])?;
    assert_eq!(output.exit_code, 0, "dry run failed: {}", output.stderr);
    assert!(!project.path().join("token.json").exists());
    Ok(())
}

#[test]
fn missing_config_is_an_error() -> Result<()> {
    let project = TestProject::new()?;
    let output = project.run(&["status"])?;
    assert_eq!(output.exit_code, 1);
    Ok(())
}
