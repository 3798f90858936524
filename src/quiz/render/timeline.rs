//! Render timeline for a single quiz video.
//!
//! Three visual phases play back to back with no transitions:
//! 1. Question: still frame held while the narration plays
//! 2. Countdown: animated frames while the viewer thinks
//! 3. Reveal: still frame with the correct answer highlighted
//!
//! Audio layers are positioned independently against the same clock.

use std::path::{Path, PathBuf};

use crate::quiz::config::{AudioSettings, QuizConfig};
use crate::ui::prelude::{Level, emit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Question,
    Countdown,
    Reveal,
}

/// What a phase shows on screen.
#[derive(Debug, Clone)]
pub enum PhaseVisual {
    /// One image held for the whole phase
    Still(PathBuf),
    /// Numbered image sequence (printf pattern) played at `fps`
    Frames { pattern: PathBuf, fps: u32 },
}

#[derive(Debug, Clone)]
pub struct Phase {
    pub kind: PhaseKind,
    /// Start time in the final video (in seconds)
    pub start: f64,
    pub duration: f64,
    pub visual: PhaseVisual,
}

impl Phase {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseDurations {
    pub narration: f64,
    pub think: f64,
    pub reveal: f64,
}

/// Images backing each phase.
#[derive(Debug, Clone)]
pub struct PhaseVisuals {
    pub question: PhaseVisual,
    pub countdown: PhaseVisual,
    pub reveal: PhaseVisual,
}

#[derive(Debug, Clone)]
pub struct Timeline {
    phases: Vec<Phase>,
}

impl Timeline {
    pub fn quiz(durations: PhaseDurations, visuals: PhaseVisuals) -> Self {
        let mut timeline = Timeline { phases: Vec::new() };
        timeline.push(PhaseKind::Question, durations.narration, visuals.question);
        timeline.push(PhaseKind::Countdown, durations.think, visuals.countdown);
        timeline.push(PhaseKind::Reveal, durations.reveal, visuals.reveal);
        timeline
    }

    fn push(&mut self, kind: PhaseKind, duration: f64, visual: PhaseVisual) {
        let start = self.total_duration();
        self.phases.push(Phase {
            kind,
            start,
            duration,
            visual,
        });
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn phase(&self, kind: PhaseKind) -> Option<&Phase> {
        self.phases.iter().find(|p| p.kind == kind)
    }

    pub fn total_duration(&self) -> f64 {
        self.phases.last().map(Phase::end).unwrap_or(0.0)
    }

    /// When the countdown begins (end of narration).
    pub fn think_start(&self) -> f64 {
        self.phase(PhaseKind::Countdown).map(|p| p.start).unwrap_or(0.0)
    }

    /// When the answer is revealed.
    pub fn reveal_start(&self) -> f64 {
        self.phase(PhaseKind::Reveal).map(|p| p.start).unwrap_or(0.0)
    }

    pub fn think_duration(&self) -> f64 {
        self.phase(PhaseKind::Countdown).map(|p| p.duration).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Narration,
    Clock,
    Success,
    Background,
}

impl LayerKind {
    pub fn label(self) -> &'static str {
        match self {
            LayerKind::Narration => "narration",
            LayerKind::Clock => "clock",
            LayerKind::Success => "success",
            LayerKind::Background => "background",
        }
    }
}

/// How a source is fitted onto the timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioFit {
    /// Play the source as-is
    Natural,
    /// Cut the source after the given seconds
    Trim(f64),
    /// Loop (or cut) the source to exactly the given seconds
    Loop(f64),
}

#[derive(Debug, Clone)]
pub struct AudioLayer {
    pub kind: LayerKind,
    pub source: PathBuf,
    pub start: f64,
    pub volume: f32,
    pub fit: AudioFit,
}

/// Optional sound beds that exist on disk.
#[derive(Debug, Clone, Default)]
pub struct AudioBeds {
    pub clock: Option<PathBuf>,
    pub success: Option<PathBuf>,
    pub background: Option<PathBuf>,
}

impl AudioBeds {
    pub fn from_config(config: &QuizConfig) -> Self {
        Self {
            clock: existing_bed(LayerKind::Clock, config.clock_audio()),
            success: existing_bed(LayerKind::Success, config.success_audio()),
            background: existing_bed(LayerKind::Background, config.background_audio()),
        }
    }
}

fn existing_bed(kind: LayerKind, path: PathBuf) -> Option<PathBuf> {
    if path.is_file() {
        Some(path)
    } else {
        emit(
            Level::Warn,
            "render.asset.missing",
            &format!(
                "No {} sound at {}, that layer will be left out",
                kind.label(),
                path.display()
            ),
            None,
        );
        None
    }
}

/// Position every available track against the timeline.
pub fn plan_audio_layers(
    narration: &Path,
    timeline: &Timeline,
    beds: &AudioBeds,
    settings: &AudioSettings,
) -> Vec<AudioLayer> {
    let mut layers = vec![AudioLayer {
        kind: LayerKind::Narration,
        source: narration.to_path_buf(),
        start: 0.0,
        volume: 1.0,
        fit: AudioFit::Natural,
    }];

    if let Some(clock) = &beds.clock {
        layers.push(AudioLayer {
            kind: LayerKind::Clock,
            source: clock.clone(),
            start: timeline.think_start(),
            volume: settings.clock_volume,
            fit: AudioFit::Trim(timeline.think_duration()),
        });
    }

    if let Some(success) = &beds.success {
        layers.push(AudioLayer {
            kind: LayerKind::Success,
            source: success.clone(),
            start: timeline.reveal_start(),
            volume: settings.success_volume,
            fit: AudioFit::Natural,
        });
    }

    if let Some(background) = &beds.background {
        layers.push(AudioLayer {
            kind: LayerKind::Background,
            source: background.clone(),
            start: 0.0,
            volume: settings.background_volume,
            fit: AudioFit::Loop(timeline.total_duration()),
        });
    }

    layers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visuals() -> PhaseVisuals {
        PhaseVisuals {
            question: PhaseVisual::Still(PathBuf::from("question.png")),
            countdown: PhaseVisual::Frames {
                pattern: PathBuf::from("countdown/frame_%05d.png"),
                fps: 24,
            },
            reveal: PhaseVisual::Still(PathBuf::from("reveal.png")),
        }
    }

    fn paris_timeline() -> Timeline {
        Timeline::quiz(
            PhaseDurations {
                narration: 3.2,
                think: 5.0,
                reveal: 2.5,
            },
            visuals(),
        )
    }

    #[test]
    fn phases_are_back_to_back() {
        let timeline = paris_timeline();
        let phases = timeline.phases();
        assert_eq!(phases.len(), 3);
        assert_eq!(phases[0].start, 0.0);
        assert_eq!(phases[1].start, phases[0].end());
        assert_eq!(phases[2].start, phases[1].end());
    }

    #[test]
    fn total_is_the_sum_of_phases() {
        let timeline = paris_timeline();
        let summed: f64 = timeline.phases().iter().map(|p| p.duration).sum();
        assert_eq!(timeline.total_duration(), summed);
        assert!((timeline.total_duration() - 10.7).abs() < 1e-9);
    }

    #[test]
    fn layers_follow_the_phase_clock() {
        let timeline = paris_timeline();
        let beds = AudioBeds {
            clock: Some(PathBuf::from("clock.mp3")),
            success: Some(PathBuf::from("success.mp3")),
            background: Some(PathBuf::from("bg.mp3")),
        };
        let layers = plan_audio_layers(
            Path::new("narration.mp3"),
            &timeline,
            &beds,
            &AudioSettings::default(),
        );

        let kinds: Vec<LayerKind> = layers.iter().map(|l| l.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LayerKind::Narration,
                LayerKind::Clock,
                LayerKind::Success,
                LayerKind::Background
            ]
        );

        assert_eq!(layers[1].start, 3.2);
        assert_eq!(layers[1].fit, AudioFit::Trim(5.0));
        assert_eq!(layers[1].volume, 0.8);
        assert!((layers[2].start - 8.2).abs() < 1e-9);
        assert_eq!(layers[2].volume, 0.7);
        assert_eq!(layers[3].start, 0.0);
        assert_eq!(layers[3].fit, AudioFit::Loop(timeline.total_duration()));
        assert_eq!(layers[3].volume, 0.2);
    }

    #[test]
    fn missing_beds_are_simply_omitted() {
        let timeline = paris_timeline();
        let layers = plan_audio_layers(
            Path::new("narration.mp3"),
            &timeline,
            &AudioBeds::default(),
            &AudioSettings::default(),
        );
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].kind, LayerKind::Narration);
    }

    #[test]
    fn beds_are_checked_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets/audio")).unwrap();
        std::fs::write(dir.path().join("assets/audio/clock.mp3"), b"id3").unwrap();

        let config = QuizConfig::with_root(dir.path());
        let beds = AudioBeds::from_config(&config);
        assert!(beds.clock.is_some());
        assert!(beds.success.is_none());
        assert!(beds.background.is_none());
    }
}
