use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::SpeechEngine;

const EDGE_TTS_BIN: &str = "edge-tts";

/// Microsoft Edge neural voices via the `edge-tts` command line tool.
pub struct EdgeTtsEngine {
    voice: String,
    rate: String,
}

impl EdgeTtsEngine {
    pub fn new(voice: String, rate: String) -> Self {
        Self { voice, rate }
    }

    fn args(&self, text: &str, output: &Path) -> Vec<String> {
        vec![
            "--voice".to_string(),
            self.voice.clone(),
            // `=` form so negative rates such as -10% are not parsed as flags
            format!("--rate={}", self.rate),
            "--text".to_string(),
            text.to_string(),
            "--write-media".to_string(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl SpeechEngine for EdgeTtsEngine {
    fn name(&self) -> &'static str {
        "edge-tts"
    }

    async fn synthesize(&self, text: &str, output: &Path) -> Result<()> {
        let result = Command::new(EDGE_TTS_BIN)
            .args(self.args(text, output))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to spawn {EDGE_TTS_BIN}"))?;

        if !result.status.success() {
            bail!(
                "{EDGE_TTS_BIN} exited with status {:?}: {}",
                result.status.code(),
                String::from_utf8_lossy(&result.stderr).trim()
            );
        }
        Ok(())
    }

    fn is_available(&self) -> bool {
        which::which(EDGE_TTS_BIN).is_ok()
    }
}
