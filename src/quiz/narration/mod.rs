//! Question narration with ordered engine fallback.
//!
//! Engines are tried in configured order; the first one that leaves a
//! non-empty audio file wins. When every engine fails the caller gets
//! [`NarrationError::Exhausted`] with each engine's reason.

mod edge;
mod google;

pub use edge::EdgeTtsEngine;
pub use google::GoogleTtsEngine;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::config::{EngineKind, NarrationSettings};
use crate::common::paths;
use crate::ui::prelude::{Level, emit};

/// A text-to-speech backend that writes an MP3 to `output`.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Human-readable name of the engine for logging
    fn name(&self) -> &'static str;

    async fn synthesize(&self, text: &str, output: &Path) -> Result<()>;

    /// Whether the engine can run at all; unavailable engines are skipped
    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct EngineFailure {
    pub engine: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum NarrationError {
    #[error("question text is empty, nothing to narrate")]
    EmptyText,
    #[error("every speech engine failed: {}", describe_failures(.0))]
    Exhausted(Vec<EngineFailure>),
}

fn describe_failures(failures: &[EngineFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.engine, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Where the narration for a row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationSource {
    Cache,
    Engine(&'static str),
}

pub struct NarrationChain {
    engines: Vec<Box<dyn SpeechEngine>>,
    cache: Option<NarrationCache>,
}

impl NarrationChain {
    pub fn new(engines: Vec<Box<dyn SpeechEngine>>) -> Self {
        Self {
            engines,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: NarrationCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn from_settings(settings: &NarrationSettings, use_cache: bool) -> Result<Self> {
        let engines = settings
            .engines
            .iter()
            .map(|kind| -> Box<dyn SpeechEngine> {
                match kind {
                    EngineKind::Edge => {
                        Box::new(EdgeTtsEngine::new(settings.voice.clone(), settings.rate.clone()))
                    }
                    EngineKind::Google => Box::new(GoogleTtsEngine::new(
                        settings.language.clone(),
                        settings.tld.clone(),
                    )),
                }
            })
            .collect();

        let chain = Self::new(engines);
        if use_cache && settings.cache {
            let cache = NarrationCache::new(paths::narration_cache_dir()?, settings_fingerprint(settings));
            Ok(chain.with_cache(cache))
        } else {
            Ok(chain)
        }
    }

    pub fn engine_names(&self) -> Vec<&'static str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    /// Produce narration for `text` at `output`.
    pub async fn synthesize(
        &self,
        text: &str,
        output: &Path,
    ) -> Result<NarrationSource, NarrationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(NarrationError::EmptyText);
        }

        if let Some(cache) = &self.cache
            && cache.restore(text, output).await
        {
            emit(
                Level::Debug,
                "narration.cache.hit",
                &format!("Reusing cached narration for \"{text}\""),
                None,
            );
            return Ok(NarrationSource::Cache);
        }

        let mut failures = Vec::new();
        for (attempt, engine) in self.engines.iter().enumerate() {
            if attempt > 0 {
                emit(
                    Level::Info,
                    "narration.fallback",
                    &format!("Falling back to {}", engine.name()),
                    None,
                );
            }

            if !engine.is_available() {
                emit(
                    Level::Warn,
                    "narration.engine.unavailable",
                    &format!("{} is not available, skipping it", engine.name()),
                    None,
                );
                failures.push(EngineFailure {
                    engine: engine.name(),
                    message: "not available on this system".to_string(),
                });
                continue;
            }

            match run_engine(engine.as_ref(), text, output).await {
                Ok(()) => {
                    if let Some(cache) = &self.cache {
                        cache.store(text, output).await;
                    }
                    return Ok(NarrationSource::Engine(engine.name()));
                }
                Err(err) => {
                    emit(
                        Level::Warn,
                        "narration.engine.failed",
                        &format!("{} failed: {err:#}", engine.name()),
                        None,
                    );
                    failures.push(EngineFailure {
                        engine: engine.name(),
                        message: format!("{err:#}"),
                    });
                }
            }
        }

        Err(NarrationError::Exhausted(failures))
    }
}

async fn run_engine(engine: &dyn SpeechEngine, text: &str, output: &Path) -> Result<()> {
    // A stale file from an earlier attempt must not count as success
    let _ = tokio::fs::remove_file(output).await;

    let result = async {
        engine.synthesize(text, output).await?;
        let size = tokio::fs::metadata(output)
            .await
            .map(|m| m.len())
            .with_context(|| format!("{} reported success but wrote no audio", engine.name()))?;
        if size == 0 {
            anyhow::bail!("{} produced an empty audio file", engine.name());
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(output).await;
    }
    result
}

fn settings_fingerprint(settings: &NarrationSettings) -> String {
    let engines = settings
        .engines
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "{engines}|{}|{}|{}|{}",
        settings.voice, settings.rate, settings.language, settings.tld
    )
}

/// Content-addressed store of previously synthesized narration.
pub struct NarrationCache {
    dir: PathBuf,
    fingerprint: String,
}

impl NarrationCache {
    pub fn new(dir: PathBuf, fingerprint: String) -> Self {
        Self { dir, fingerprint }
    }

    fn entry_path(&self, text: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(self.fingerprint.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        self.dir.join(format!("{:x}.mp3", hasher.finalize()))
    }

    async fn restore(&self, text: &str, output: &Path) -> bool {
        let entry = self.entry_path(text);
        match tokio::fs::metadata(&entry).await {
            Ok(meta) if meta.len() > 0 => tokio::fs::copy(&entry, output).await.is_ok(),
            _ => false,
        }
    }

    /// Copy `output` into the cache. Each writer stages under its own
    /// temp name, so concurrent rows with the same text never interleave.
    async fn store(&self, text: &str, output: &Path) {
        let entry = self.entry_path(text);
        let dir = self.dir.clone();
        let source = output.to_path_buf();
        let target = entry.clone();
        let stored = tokio::task::spawn_blocking(move || -> Result<()> {
            std::fs::create_dir_all(&dir)?;
            let mut staging = tempfile::Builder::new()
                .prefix(".narration-")
                .suffix(".part")
                .tempfile_in(&dir)?;
            let mut audio = std::fs::File::open(&source)?;
            std::io::copy(&mut audio, staging.as_file_mut())?;
            staging.persist(&target)?;
            Ok(())
        })
        .await
        .map_err(anyhow::Error::from)
        .and_then(|result| result);

        if let Err(err) = stored {
            emit(
                Level::Debug,
                "narration.cache.store_failed",
                &format!("Could not cache narration at {}: {err:#}", entry.display()),
                None,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct Failing;

    #[async_trait]
    impl SpeechEngine for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn synthesize(&self, _text: &str, _output: &Path) -> Result<()> {
            anyhow::bail!("quota exceeded")
        }
    }

    struct Silent;

    #[async_trait]
    impl SpeechEngine for Silent {
        fn name(&self) -> &'static str {
            "silent"
        }

        async fn synthesize(&self, _text: &str, _output: &Path) -> Result<()> {
            Ok(())
        }
    }

    struct Writing {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SpeechEngine for Writing {
        fn name(&self) -> &'static str {
            "writing"
        }

        async fn synthesize(&self, text: &str, output: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::fs::write(output, format!("mp3:{text}")).await?;
            Ok(())
        }
    }

    /// Installed nowhere; must never be asked to synthesize.
    struct Missing {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SpeechEngine for Missing {
        fn name(&self) -> &'static str {
            "missing"
        }

        async fn synthesize(&self, _text: &str, _output: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("should have been skipped")
        }

        fn is_available(&self) -> bool {
            false
        }
    }

    fn writing() -> (Box<dyn SpeechEngine>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Writing {
                calls: calls.clone(),
            }),
            calls,
        )
    }

    #[tokio::test]
    async fn falls_back_to_the_next_engine() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("narration.mp3");
        let (engine, calls) = writing();
        let chain = NarrationChain::new(vec![Box::new(Failing), engine]);

        let source = chain.synthesize("Capital of France?", &output).await.unwrap();

        assert_eq!(source, NarrationSource::Engine("writing"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "mp3:Capital of France?");
    }

    #[tokio::test]
    async fn unavailable_engines_are_skipped() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("narration.mp3");
        let missing_calls = Arc::new(AtomicUsize::new(0));
        let (engine, calls) = writing();
        let chain = NarrationChain::new(vec![
            Box::new(Missing {
                calls: missing_calls.clone(),
            }),
            engine,
        ]);

        let source = chain.synthesize("Q?", &output).await.unwrap();
        assert_eq!(source, NarrationSource::Engine("writing"));
        assert_eq!(missing_calls.load(Ordering::SeqCst), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let alone = NarrationChain::new(vec![Box::new(Missing {
            calls: missing_calls.clone(),
        })]);
        let NarrationError::Exhausted(failures) = alone.synthesize("Q?", &output).await.unwrap_err()
        else {
            panic!("expected exhaustion");
        };
        assert_eq!(failures[0].engine, "missing");
        assert!(failures[0].message.contains("not available"));
        assert_eq!(missing_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reports_every_failure_when_exhausted() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("narration.mp3");
        let chain = NarrationChain::new(vec![Box::new(Failing), Box::new(Silent)]);

        let err = chain.synthesize("Q?", &output).await.unwrap_err();

        let NarrationError::Exhausted(failures) = err else {
            panic!("expected exhaustion");
        };
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].engine, "failing");
        assert!(failures[1].message.contains("wrote no audio"));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn stale_output_does_not_mask_failure() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("narration.mp3");
        std::fs::write(&output, b"previous row").unwrap();
        let chain = NarrationChain::new(vec![Box::new(Silent)]);

        assert!(chain.synthesize("Q?", &output).await.is_err());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let dir = tempdir().unwrap();
        let (engine, calls) = writing();
        let chain = NarrationChain::new(vec![engine]);

        let err = chain
            .synthesize("   ", &dir.path().join("n.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, NarrationError::EmptyText));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cache_hit_skips_engines() {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let (engine, calls) = writing();
        let chain = NarrationChain::new(vec![engine])
            .with_cache(NarrationCache::new(cache_dir.clone(), "edge|voice".into()));

        let first = dir.path().join("first.mp3");
        let second = dir.path().join("second.mp3");
        assert_eq!(
            chain.synthesize("Q?", &first).await.unwrap(),
            NarrationSource::Engine("writing")
        );
        assert_eq!(
            chain.synthesize("Q?", &second).await.unwrap(),
            NarrationSource::Cache
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(&second).unwrap(), std::fs::read(&first).unwrap());
    }

    #[tokio::test]
    async fn concurrent_stores_of_one_text_stay_whole() {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let cache = NarrationCache::new(cache_dir.clone(), "edge|voice".into());
        let first = dir.path().join("first.mp3");
        let second = dir.path().join("second.mp3");
        std::fs::write(&first, vec![b'a'; 64 * 1024]).unwrap();
        std::fs::write(&second, vec![b'a'; 64 * 1024]).unwrap();

        tokio::join!(cache.store("Q?", &first), cache.store("Q?", &second));

        let stored = std::fs::read(cache.entry_path("Q?")).unwrap();
        assert_eq!(stored.len(), 64 * 1024);
        let leftovers: Vec<_> = std::fs::read_dir(&cache_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn cache_keys_depend_on_voice_settings() {
        let a = NarrationCache::new(PathBuf::from("/c"), "edge|a".into());
        let b = NarrationCache::new(PathBuf::from("/c"), "edge|b".into());
        assert_ne!(a.entry_path("Q?"), b.entry_path("Q?"));
        assert_eq!(a.entry_path("Q?"), a.entry_path("Q?"));
    }

    #[test]
    fn chain_follows_configured_order() {
        let mut settings = NarrationSettings::default();
        settings.engines = vec![EngineKind::Google, EngineKind::Edge];
        let chain = NarrationChain::from_settings(&settings, false).unwrap();
        assert_eq!(chain.engine_names(), vec!["google-tts", "edge-tts"]);
    }
}
