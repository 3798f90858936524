use std::io::Read;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};

use crate::ui::prelude::{OutputFormat, get_output_format};

/// Executes a compiled ffmpeg argument list.
pub trait FfmpegRunner: Send + Sync {
    fn run(&self, args: &[String], options: FfmpegRunOptions) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemFfmpegRunner;

#[derive(Debug, Clone, Default)]
pub struct FfmpegRunOptions {
    /// Length of the output, enables the progress bar when set
    pub total_duration: Option<f64>,
    pub verbose: bool,
    pub label: String,
}

impl FfmpegRunOptions {
    pub fn new(total_duration: Option<f64>, verbose: bool, label: impl Into<String>) -> Self {
        Self {
            total_duration,
            verbose,
            label: label.into(),
        }
    }
}

impl FfmpegRunner for SystemFfmpegRunner {
    fn run(&self, args: &[String], options: FfmpegRunOptions) -> Result<()> {
        let mut child = Command::new("ffmpeg")
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg")?;

        let stderr = child
            .stderr
            .take()
            .context("Failed to capture ffmpeg stderr")?;

        let pb = options
            .total_duration
            .filter(|_| matches!(get_output_format(), OutputFormat::Text))
            .map(|duration| progress_bar(duration, &options.label));

        let mut last_line = String::new();
        let mut error_lines: Vec<String> = Vec::new();
        let result = read_ffmpeg_stderr(
            stderr,
            options.verbose,
            pb.as_ref(),
            &mut last_line,
            &mut error_lines,
        );

        let status = child.wait().context("Failed to wait for ffmpeg")?;
        result?;

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        if !status.success() {
            let error_msg = if !error_lines.is_empty() {
                error_lines.join("\n")
            } else {
                last_line
            };
            bail!(
                "ffmpeg exited with status {:?}: {}",
                status.code(),
                error_msg.trim()
            );
        }

        Ok(())
    }
}

fn progress_bar(duration: f64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new((duration * 1000.0) as u64);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}",
    ) {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
    }
    pb.set_prefix(label.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message("encoding");
    pb
}

fn read_ffmpeg_stderr<R: Read>(
    mut stderr: R,
    verbose: bool,
    pb: Option<&ProgressBar>,
    last_line: &mut String,
    error_lines: &mut Vec<String>,
) -> Result<()> {
    let mut buffer = [0u8; 4096];
    let mut accumulated = String::new();

    loop {
        let bytes_read = stderr
            .read(&mut buffer)
            .context("Failed to read ffmpeg stderr")?;
        if bytes_read == 0 {
            break;
        }

        accumulated.push_str(&String::from_utf8_lossy(&buffer[..bytes_read]));

        while let Some(pos) = accumulated.find(['\r', '\n']) {
            let line = accumulated[..pos].to_string();
            accumulated.drain(..=pos);

            if line.is_empty() {
                continue;
            }

            if verbose {
                eprintln!("{line}");
            }

            if line.to_ascii_lowercase().contains("error") {
                error_lines.push(line.clone());
            }

            if let Some(pb) = pb
                && let Some(progress) = parse_ffmpeg_progress(&line)
            {
                pb.set_position((progress * 1000.0) as u64);
                if let Some(speed) = parse_ffmpeg_speed(&line) {
                    pb.set_message(speed);
                }
            }

            *last_line = line;
        }
    }

    Ok(())
}

fn parse_ffmpeg_progress(line: &str) -> Option<f64> {
    let time_start = line.find("time=")?;
    let time_str = &line[time_start + 5..];
    let time_end = time_str.find(' ')?;
    parse_time_to_seconds(&time_str[..time_end])
}

fn parse_time_to_seconds(time_str: &str) -> Option<f64> {
    let mut parts = time_str.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn parse_ffmpeg_speed(line: &str) -> Option<String> {
    let speed_start = line.find("speed=")?;
    let speed_str = line[speed_start + 6..].trim_start();
    let speed_end = speed_str.find('x')?;
    Some(speed_str[..=speed_end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATS: &str = "frame=  120 fps= 48 q=-1.0 size=     256kB time=00:00:05.00 bitrate= 419.4kbits/s speed=1.98x";

    #[test]
    fn parses_progress_time() {
        assert_eq!(parse_ffmpeg_progress(STATS), Some(5.0));
        assert_eq!(parse_ffmpeg_progress("Input #0, mp3"), None);
    }

    #[test]
    fn parses_clock_values() {
        assert_eq!(parse_time_to_seconds("01:02:03.5"), Some(3723.5));
        assert_eq!(parse_time_to_seconds("02:03"), None);
        assert_eq!(parse_time_to_seconds("N/A"), None);
    }

    #[test]
    fn parses_speed() {
        assert_eq!(parse_ffmpeg_speed(STATS).as_deref(), Some("1.98x"));
        assert_eq!(parse_ffmpeg_speed("speed= 0.5x").as_deref(), Some("0.5x"));
    }

    #[test]
    fn collects_error_lines_and_last_line() {
        let stderr = "Input #0\r\nclock.mp3: No such file or directory\nError opening input files\nfinal line\n";
        let mut last = String::new();
        let mut errors = Vec::new();
        read_ffmpeg_stderr(stderr.as_bytes(), false, None, &mut last, &mut errors).unwrap();

        assert_eq!(last, "final line");
        assert_eq!(errors, vec!["Error opening input files".to_string()]);
    }
}
