mod audio;
mod inputs;
mod util;


use std::path::Path;

use anyhow::{Result, bail};

use self::inputs::InputList;
use self::util::format_time;
use crate::quiz::render::timeline::{AudioLayer, Timeline};

#[derive(Debug, Clone)]
pub struct FfmpegCompileOutput {
    pub args: Vec<String>,
    pub total_duration: f64,
}

#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<String>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: String) {
        self.filters.push(filter);
    }

    pub fn join(&self) -> String {
        self.filters.join("; ")
    }
}

/// Turns a quiz timeline plus its audio layers into one ffmpeg invocation.
pub struct FfmpegCompiler {
    fps: u32,
    preset: String,
}

impl FfmpegCompiler {
    pub fn new(fps: u32, preset: impl Into<String>) -> Self {
        Self {
            fps,
            preset: preset.into(),
        }
    }

    pub fn compile(
        &self,
        output: &Path,
        timeline: &Timeline,
        layers: &[AudioLayer],
    ) -> Result<FfmpegCompileOutput> {
        if timeline.phases().is_empty() {
            bail!("Cannot render an empty timeline");
        }

        let total_duration = timeline.total_duration();
        let mut inputs = InputList::new();
        let mut filters = FilterChain::new();

        let mut concat_inputs = String::new();
        for (idx, phase) in timeline.phases().iter().enumerate() {
            let input_index = inputs.push_phase(phase);
            let label = format!("v{idx}");
            filters.push(self.build_phase_filter(input_index, phase.duration, &label));
            concat_inputs.push_str(&format!("[{label}]"));
        }
        filters.push(format!(
            "{concat_inputs}concat=n={count}:v=1:a=0[outv]",
            count = timeline.phases().len()
        ));

        let audio_inputs: Vec<(usize, &AudioLayer)> = layers
            .iter()
            .map(|layer| (inputs.push_audio(layer), layer))
            .collect();
        self.build_audio_mix_filters(&mut filters, &audio_inputs, total_duration)?;

        let mut args = inputs.into_args();
        args.push("-filter_complex".to_string());
        args.push(filters.join());
        args.extend(self.output_args(total_duration));
        args.push(output.to_string_lossy().into_owned());

        Ok(FfmpegCompileOutput {
            args,
            total_duration,
        })
    }

    /// Normalize one phase to the output rate and cut it to its exact length.
    fn build_phase_filter(&self, input_index: usize, duration: f64, label: &str) -> String {
        format!(
            "[{input}:v]fps={fps},format=yuv420p,setsar=1,trim=duration={duration},setpts=PTS-STARTPTS[{label}]",
            input = input_index,
            fps = self.fps,
            duration = format_time(duration),
        )
    }

    fn output_args(&self, total_duration: f64) -> Vec<String> {
        let fps = self.fps.to_string();
        let duration = format_time(total_duration);
        [
            "-map",
            "[outv]",
            "-map",
            "[outa]",
            "-r",
            &fps,
            "-c:v",
            "libx264",
            "-preset",
            &self.preset,
            "-pix_fmt",
            "yuv420p",
            "-c:a",
            "aac",
            "-b:a",
            "192k",
            "-movflags",
            "+faststart",
            "-t",
            &duration,
            "-f",
            "mp4",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }
}
