use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{REFERER, USER_AGENT};
use std::path::Path;
use std::time::Duration;

use super::SpeechEngine;
use crate::quiz::frame::wrap_text;

/// The endpoint rejects longer `q` values.
const MAX_CHUNK_CHARS: usize = 100;

/// Google Translate's speech endpoint, the same one the web UI uses.
pub struct GoogleTtsEngine {
    client: Client,
    language: String,
    tld: String,
}

impl GoogleTtsEngine {
    pub fn new(language: String, tld: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            language,
            tld,
        }
    }

    fn endpoint(&self) -> String {
        format!("https://translate.google.{}/translate_tts", self.tld)
    }

    fn query(&self, chunk: &str, idx: usize, total: usize) -> Vec<(&'static str, String)> {
        vec![
            ("ie", "UTF-8".to_string()),
            ("client", "tw-ob".to_string()),
            ("tl", self.language.clone()),
            ("q", chunk.to_string()),
            ("total", total.to_string()),
            ("idx", idx.to_string()),
            ("textlen", chunk.chars().count().to_string()),
        ]
    }

    async fn fetch_chunk(&self, chunk: &str, idx: usize, total: usize) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(self.endpoint())
            .query(&self.query(chunk, idx, total))
            .header(USER_AGENT, "Mozilla/5.0 (X11; Linux x86_64)")
            .header(REFERER, format!("https://translate.google.{}/", self.tld))
            .send()
            .await
            .context("Failed to reach Google TTS")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Google TTS error ({}): {}", status, text.trim());
        }

        let bytes = resp.bytes().await.context("Failed to read Google TTS audio")?;
        Ok(bytes.to_vec())
    }
}

/// Split narration text into request-sized pieces on word boundaries.
pub(super) fn chunk_text(text: &str) -> Vec<String> {
    wrap_text(text, MAX_CHUNK_CHARS)
}

#[async_trait]
impl SpeechEngine for GoogleTtsEngine {
    fn name(&self) -> &'static str {
        "google-tts"
    }

    async fn synthesize(&self, text: &str, output: &Path) -> Result<()> {
        let chunks = chunk_text(text);
        if chunks.is_empty() {
            bail!("Nothing to synthesize");
        }

        // MP3 frames concatenate cleanly, so the pieces are appended as-is
        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            audio.extend(self.fetch_chunk(chunk, idx, chunks.len()).await?);
        }

        tokio::fs::write(output, audio)
            .await
            .with_context(|| format!("Failed to write narration to {}", output.display()))
    }
}
