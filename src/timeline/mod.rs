// 타임라인 모듈 - 텍스트 구조 → 오디오 시간 매핑

pub mod chapters;

pub use chapters::{map_chapters, validate_chapters, ChapterBoundary, ChapterDescriptor};
