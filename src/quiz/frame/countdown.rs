use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use super::{CANVAS_HEIGHT, CANVAS_WIDTH};

const BAR_THICKNESS: u32 = 40;

/// Progress bar along the bottom edge that empties over `duration` seconds.
///
/// The bar is a pure function of elapsed time; the renderer samples it at a
/// fixed frame rate.
#[derive(Debug, Clone, Copy)]
pub struct CountdownBar {
    duration: f64,
    width: u32,
    height: u32,
    thickness: u32,
    color: Rgb<u8>,
}

impl CountdownBar {
    pub fn new(duration: f64, color: Rgb<u8>) -> Self {
        Self {
            duration,
            width: CANVAS_WIDTH,
            height: CANVAS_HEIGHT,
            thickness: BAR_THICKNESS,
            color,
        }
    }

    /// Visible bar width at `t` seconds: full at 0, empty at `duration`.
    pub fn width_at(&self, t: f64) -> u32 {
        if self.duration <= 0.0 {
            return 0;
        }
        let elapsed = t.clamp(0.0, self.duration);
        let progress = 1.0 - elapsed / self.duration;
        (f64::from(self.width) * progress).floor() as u32
    }

    /// Copy of `base` with the bar drawn for time `t`.
    pub fn render(&self, base: &RgbImage, t: f64) -> RgbImage {
        let mut frame = base.clone();
        let bar_width = self.width_at(t).min(frame.width());
        if bar_width > 0 {
            let top = self.height.saturating_sub(self.thickness);
            draw_filled_rect_mut(
                &mut frame,
                Rect::at(0, top as i32).of_size(bar_width, self.thickness),
                self.color,
            );
        }
        frame
    }

    /// Number of frames needed to cover the countdown at `fps`.
    pub fn frame_count(&self, fps: u32) -> usize {
        (self.duration * f64::from(fps)).ceil().max(0.0) as usize
    }

    /// Sample times for each frame at `fps`.
    pub fn frame_times(&self, fps: u32) -> impl Iterator<Item = f64> + use<> {
        let count = self.frame_count(fps);
        let step = f64::from(fps.max(1));
        (0..count).map(move |i| i as f64 / step)
    }
}
