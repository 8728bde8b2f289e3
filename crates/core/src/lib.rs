#![deny(warnings)]

pub mod analysis;
pub mod asr;
pub mod assistant;
pub mod audio;
pub mod capture;
pub mod config;
pub mod conversation;
pub mod decode;
pub mod llm;
pub mod playback;
pub mod profile;
pub mod session;
pub mod tts;
pub mod turn;
pub mod util;
