use anyhow::{Result, bail};

use super::util::{delay_millis, format_time};
use super::{FfmpegCompiler, FilterChain};
use crate::quiz::render::timeline::{AudioFit, AudioLayer};

const MIX_SAMPLE_RATE: u32 = 48_000;

impl FfmpegCompiler {
    /// Fit, delay and attenuate each layer, then mix them into `[outa]`.
    pub(super) fn build_audio_mix_filters(
        &self,
        filters: &mut FilterChain,
        layers: &[(usize, &AudioLayer)],
        total_duration: f64,
    ) -> Result<()> {
        if layers.is_empty() {
            bail!("A quiz video needs at least the narration track");
        }

        let mut labels = Vec::with_capacity(layers.len());
        for (input_index, layer) in layers {
            let label = format!("a_{}", layer.kind.label());
            filters.push(build_layer_filter(*input_index, layer, &label));
            labels.push(label);
        }

        let mixed = match labels.as_slice() {
            [single] => single.clone(),
            _ => {
                let inputs = labels
                    .iter()
                    .map(|label| format!("[{label}]"))
                    .collect::<String>();
                filters.push(format!(
                    "{inputs}amix=inputs={count}:normalize=0:dropout_transition=0:duration=longest[a_mix]",
                    count = labels.len(),
                ));
                "a_mix".to_string()
            }
        };

        // Pad short mixes with silence and cut long ones to the video length
        filters.push(format!(
            "[{mixed}]apad,atrim=duration={total}[outa]",
            total = format_time(total_duration),
        ));
        Ok(())
    }
}

fn build_layer_filter(input_index: usize, layer: &AudioLayer, label: &str) -> String {
    let fit = match layer.fit {
        AudioFit::Natural => String::new(),
        AudioFit::Trim(duration) | AudioFit::Loop(duration) => {
            format!("atrim=start=0:end={},", format_time(duration))
        }
    };

    format!(
        "[{input}:a]{fit}asetpts=PTS-STARTPTS,aformat=sample_rates={rate}:channel_layouts=stereo,adelay=delays={delay}:all=1,volume={volume:.6}[{label}]",
        input = input_index,
        rate = MIX_SAMPLE_RATE,
        delay = delay_millis(layer.start),
        volume = layer.volume,
    )
}
