// Audiobook 인코딩 엔진
// TTS mono PCM → AAC-LC → 챕터가 있는 MP4 (M4B/M4A) 메모리 버퍼

pub mod audio;
pub mod config;
pub mod encoding;
pub mod error;
pub mod ffi;
pub mod mux;
pub mod progress;
pub mod time;
pub mod timeline;

pub use audio::PcmBuffer;
pub use config::{EncoderConfig, StageWeights};
pub use encoding::{encode_audiobook, EncodeRequest, ExportJob, ExportStatus};
pub use error::{EncodeError, EncodeOutcome, Stage};
pub use mux::ContainerOutput;
pub use progress::{CancellationToken, ProgressCoordinator};
pub use timeline::{ChapterBoundary, ChapterDescriptor};

// FFI 함수들을 최상위에서 재export
pub use ffi::*;
