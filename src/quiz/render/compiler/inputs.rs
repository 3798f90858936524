use crate::quiz::render::timeline::{AudioFit, AudioLayer, Phase, PhaseVisual};

use super::util::format_time;

/// Ordered ffmpeg inputs: one per phase, then one per audio layer.
pub struct InputList {
    args: Vec<String>,
    count: usize,
}

impl InputList {
    pub fn new() -> Self {
        Self {
            args: vec!["-y".to_string(), "-hide_banner".to_string()],
            count: 0,
        }
    }

    /// Add the input backing a video phase, returning its index.
    pub fn push_phase(&mut self, phase: &Phase) -> usize {
        match &phase.visual {
            PhaseVisual::Still(image) => {
                self.args.extend([
                    "-loop".to_string(),
                    "1".to_string(),
                    "-t".to_string(),
                    format_time(phase.duration),
                    "-i".to_string(),
                    image.to_string_lossy().into_owned(),
                ]);
            }
            PhaseVisual::Frames { pattern, fps } => {
                self.args.extend([
                    "-framerate".to_string(),
                    fps.to_string(),
                    "-i".to_string(),
                    pattern.to_string_lossy().into_owned(),
                ]);
            }
        }
        self.next_index()
    }

    /// Add the input for an audio layer, returning its index.
    pub fn push_audio(&mut self, layer: &AudioLayer) -> usize {
        if matches!(layer.fit, AudioFit::Loop(_)) {
            self.args.extend(["-stream_loop".to_string(), "-1".to_string()]);
        }
        self.args.extend([
            "-i".to_string(),
            layer.source.to_string_lossy().into_owned(),
        ]);
        self.next_index()
    }

    fn next_index(&mut self) -> usize {
        let index = self.count;
        self.count += 1;
        index
    }

    pub fn into_args(self) -> Vec<String> {
        self.args
    }
}
