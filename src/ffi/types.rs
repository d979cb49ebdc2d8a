// FFI 공통 타입

/// C ABI 반환 코드
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    NullPointer = -1,
    InvalidParam = -2,
    /// AAC 인코더 없음 (ffmpeg feature 미포함 빌드)
    EncoderUnavailable = -3,
    /// 아직 출력 없음 (진행 중, 취소 또는 실패)
    NotReady = -4,
    BufferTooSmall = -5,
}
