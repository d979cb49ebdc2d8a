// 오디오 모듈 - PCM 버퍼 + 리샘플링

pub mod pcm;
pub mod resampler;

pub use pcm::PcmBuffer;
pub use resampler::{resample, select_target_rate};
