// 컨테이너 먹싱 모듈
// AAC 프레임 + 챕터 → MP4 (M4A/M4B) 메모리 버퍼

pub mod boxes;
pub mod mp4;

pub use mp4::{mux, ContainerOutput, MuxOptions, MIME_TYPE};
