pub mod ffmpeg_camera;
pub mod simulated_camera;
