// 인코딩 & 내보내기 모듈
// mono PCM → AAC-LC 프레임 → MP4 (M4A/M4B) 컨테이너

pub mod encoder;
pub mod session;
pub mod pipeline;
pub mod exporter;

#[cfg(feature = "ffmpeg")]
pub mod aac;

#[cfg(test)]
pub(crate) mod testing;

pub use encoder::{
    audio_specific_config, sampling_frequency_index, AudioChunk, AudioEncoder, CapabilityCache,
    CodecConfig, CodecProfile, CodecSupport, DecoderConfig, EncodedFrame, AAC_FRAME_SAMPLES,
};
pub use exporter::{ExportJob, ExportStatus};
pub use pipeline::{encode_audiobook, EncodeRequest};
pub use session::{EncodeSession, EncodedAudio, SessionOptions, SessionOutcome};
