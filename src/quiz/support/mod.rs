pub mod ffmpeg;
pub mod files;
