pub mod api;
pub mod audio;
pub mod compose;
pub mod config;
pub mod emotion;
pub mod features;
pub mod tts;
pub mod util;
