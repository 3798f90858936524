use anyhow::{Context, Result, bail};
use image::Rgb;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "quizreel.toml";

/// Everything the pipelines need, loaded once at startup and passed down by reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizConfig {
    pub paths: PathsConfig,
    pub video: VideoSettings,
    pub audio: AudioSettings,
    pub narration: NarrationSettings,
    pub upload: UploadSettings,
    /// Directory relative paths are resolved against (the config file's directory)
    #[serde(skip)]
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub csv: PathBuf,
    pub output_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub ledger: PathBuf,
    pub font: PathBuf,
    pub logo: PathBuf,
    pub background_audio: PathBuf,
    pub clock_audio: PathBuf,
    pub success_audio: PathBuf,
    pub client_secrets: PathBuf,
    pub token: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            csv: PathBuf::from("data/preguntas.csv"),
            output_dir: PathBuf::from("output"),
            archive_dir: PathBuf::from("output/subidos"),
            ledger: PathBuf::from("output/quizreel.db"),
            font: PathBuf::from("assets/fonts/Montserrat-Bold.ttf"),
            logo: PathBuf::from("assets/images/logo.png"),
            background_audio: PathBuf::from("assets/audio/background.mp3"),
            clock_audio: PathBuf::from("assets/audio/clock.mp3"),
            success_audio: PathBuf::from("assets/audio/success.mp3"),
            client_secrets: PathBuf::from("client_secrets.json"),
            token: PathBuf::from("token.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    /// Seconds the countdown bar runs before the answer is revealed
    pub think_seconds: f64,
    /// Seconds the highlighted answer stays on screen
    pub reveal_seconds: f64,
    pub fps: u32,
    /// x264 preset (ultrafast for drafts, medium for final renders)
    pub preset: String,
    pub background_color: String,
    pub box_color: String,
    pub text_color: String,
    pub highlight_color: String,
    pub highlight_text_color: String,
    pub accent_color: String,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            think_seconds: 5.0,
            reveal_seconds: 2.5,
            fps: 24,
            preset: "ultrafast".to_string(),
            background_color: "#000000".to_string(),
            box_color: "#1E1E1E".to_string(),
            text_color: "#FFFFFF".to_string(),
            highlight_color: "#00CC00".to_string(),
            highlight_text_color: "#000000".to_string(),
            accent_color: "#FFD700".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub clock_volume: f32,
    pub success_volume: f32,
    pub background_volume: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            clock_volume: 0.8,
            success_volume: 0.7,
            background_volume: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Microsoft neural voices through the `edge-tts` executable
    Edge,
    /// Google Translate text-to-speech endpoint
    Google,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::Edge => write!(f, "edge-tts"),
            EngineKind::Google => write!(f, "google-tts"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationSettings {
    /// Engines tried in order until one produces audio
    pub engines: Vec<EngineKind>,
    pub voice: String,
    pub rate: String,
    pub language: String,
    /// Google regional domain suffix (com.mx, es, ...)
    pub tld: String,
    pub cache: bool,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        Self {
            engines: vec![EngineKind::Edge, EngineKind::Google],
            voice: "es-MX-DaliaNeural".to_string(),
            rate: "+10%".to_string(),
            language: "es".to_string(),
            tld: "com.mx".to_string(),
            cache: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// Maximum uploads per calendar day (local time)
    pub daily_limit: u32,
    pub title_suffix: String,
    pub title_max_chars: usize,
    /// `{question}` is replaced with the row's question
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy_status: String,
    pub made_for_kids: bool,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            daily_limit: 6,
            title_suffix: " 🧠 #Trivia #Shorts".to_string(),
            title_max_chars: 99,
            description: "Comenta tu respuesta 👇\n\n🧠 Entrena tu cerebro: [TU_LINK]\n\nPregunta: {question}\n#retomental #quiz".to_string(),
            tags: ["trivia", "quiz", "shorts", "cultura general"]
                .into_iter()
                .map(String::from)
                .collect(),
            category_id: "24".to_string(),
            privacy_status: "private".to_string(),
            made_for_kids: false,
        }
    }
}

impl QuizConfig {
    /// Default config rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            bail!(
                "No config found at {}. Run 'quizreel init' to create one",
                path.display()
            );
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut config: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("video.think_seconds", self.video.think_seconds),
            ("video.reveal_seconds", self.video.reveal_seconds),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value <= 0.0 {
                bail!("{name} must be a positive number of seconds, got {value}");
            }
        }

        if self.video.fps == 0 {
            bail!("video.fps must be greater than zero");
        }

        let volumes = [
            ("audio.clock_volume", self.audio.clock_volume),
            ("audio.success_volume", self.audio.success_volume),
            ("audio.background_volume", self.audio.background_volume),
        ];
        for (name, value) in volumes {
            if !value.is_finite() || !(0.0..=2.0).contains(&value) {
                bail!("{name} must be between 0.0 and 2.0, got {value}");
            }
        }

        if self.narration.engines.is_empty() {
            bail!("narration.engines must list at least one engine");
        }

        if self.upload.title_max_chars == 0 {
            bail!("upload.title_max_chars must be greater than zero");
        }

        self.palette()?;
        Ok(())
    }

    /// Serialize with a short header so a fresh `init` explains itself.
    pub fn to_documented_toml(&self) -> Result<String> {
        let body = toml::to_string_pretty(self).context("serializing quizreel config")?;
        let header = "\
# quizreel configuration
#
# Relative paths are resolved against the directory holding this file.
# [video] think_seconds/reveal_seconds control the countdown and reveal phases.
# [narration] engines are tried in order: \"edge\" (edge-tts executable), \"google\".
# [upload] daily_limit counts uploads per local calendar day, across runs.
";
        Ok(format!("{header}\n{body}"))
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        fs::write(path, self.to_documented_toml()?)
            .with_context(|| format!("writing config to {}", path.display()))
    }

    /// Expand `~` and anchor relative paths at the config root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned());
        if expanded.is_absolute() {
            expanded
        } else {
            self.root.join(expanded)
        }
    }

    pub fn csv_path(&self) -> PathBuf {
        self.resolve(&self.paths.csv)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.paths.output_dir)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.resolve(&self.paths.archive_dir)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.resolve(&self.paths.ledger)
    }

    pub fn font_path(&self) -> PathBuf {
        self.resolve(&self.paths.font)
    }

    pub fn logo_path(&self) -> PathBuf {
        self.resolve(&self.paths.logo)
    }

    pub fn background_audio(&self) -> PathBuf {
        self.resolve(&self.paths.background_audio)
    }

    pub fn clock_audio(&self) -> PathBuf {
        self.resolve(&self.paths.clock_audio)
    }

    pub fn success_audio(&self) -> PathBuf {
        self.resolve(&self.paths.success_audio)
    }

    pub fn token_path(&self) -> PathBuf {
        self.resolve(&self.paths.token)
    }

    pub fn client_secrets_path(&self) -> PathBuf {
        self.resolve(&self.paths.client_secrets)
    }

    /// Output file for a 1-based row number.
    pub fn video_file_name(row_number: usize) -> String {
        format!("video_{row_number}.mp4")
    }

    pub fn palette(&self) -> Result<Palette> {
        Ok(Palette {
            background: parse_hex_color(&self.video.background_color)?,
            box_fill: parse_hex_color(&self.video.box_color)?,
            text: parse_hex_color(&self.video.text_color)?,
            highlight: parse_hex_color(&self.video.highlight_color)?,
            highlight_text: parse_hex_color(&self.video.highlight_text_color)?,
            accent: parse_hex_color(&self.video.accent_color)?,
        })
    }
}

/// Resolved frame colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub background: Rgb<u8>,
    pub box_fill: Rgb<u8>,
    pub text: Rgb<u8>,
    pub highlight: Rgb<u8>,
    pub highlight_text: Rgb<u8>,
    pub accent: Rgb<u8>,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            background: Rgb([0x00, 0x00, 0x00]),
            box_fill: Rgb([0x1E, 0x1E, 0x1E]),
            text: Rgb([0xFF, 0xFF, 0xFF]),
            highlight: Rgb([0x00, 0xCC, 0x00]),
            highlight_text: Rgb([0x00, 0x00, 0x00]),
            accent: Rgb([0xFF, 0xD7, 0x00]),
        }
    }
}

pub fn parse_hex_color(value: &str) -> Result<Rgb<u8>> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("Invalid color '{value}', expected #RRGGBB");
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16).with_context(|| format!("Invalid color '{value}'"))
    };
    Ok(Rgb([channel(0..2)?, channel(2..4)?, channel(4..6)?]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_documented_layout() {
        let config = QuizConfig::default();
        assert_eq!(config.video.think_seconds, 5.0);
        assert_eq!(config.video.reveal_seconds, 2.5);
        assert_eq!(config.video.fps, 24);
        assert_eq!(config.upload.daily_limit, 6);
        assert_eq!(config.palette().unwrap(), Palette::default());
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        QuizConfig::default().save_to_path(&path).unwrap();

        let config = QuizConfig::load_from_path(&path).unwrap();
        assert_eq!(config.csv_path(), dir.path().join("data/preguntas.csv"));
        assert_eq!(config.archive_dir(), dir.path().join("output/subidos"));
    }

    #[test]
    fn absolute_paths_are_kept() {
        let config = QuizConfig::with_root("/project");
        assert_eq!(
            config.resolve(Path::new("/srv/music.mp3")),
            PathBuf::from("/srv/music.mp3")
        );
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[video]\nthink_seconds = 7.5\n").unwrap();

        let config = QuizConfig::load_from_path(&path).unwrap();
        assert_eq!(config.video.think_seconds, 7.5);
        assert_eq!(config.video.reveal_seconds, 2.5);
        assert_eq!(config.narration.engines, vec![EngineKind::Edge, EngineKind::Google]);
    }

    #[test]
    fn rejects_non_positive_durations() {
        let mut config = QuizConfig::default();
        config.video.reveal_seconds = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_colors() {
        assert!(parse_hex_color("#12345").is_err());
        assert!(parse_hex_color("zzzzzz").is_err());
        assert_eq!(parse_hex_color("#FFD700").unwrap(), Rgb([255, 215, 0]));
    }

    #[test]
    fn missing_config_points_at_init() {
        let dir = tempdir().unwrap();
        let err = QuizConfig::load_from_path(dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("quizreel init"));
    }

    #[test]
    fn video_names_are_one_based() {
        assert_eq!(QuizConfig::video_file_name(1), "video_1.mp4");
    }
}
