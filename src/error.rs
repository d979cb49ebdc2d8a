// 에러 분류 - 인코딩 파이프라인 전 단계 공통
// 취소(Canceled)는 에러가 아니므로 EncodeOutcome으로 분리

use std::fmt;

use thiserror::Error;

use crate::mux::ContainerOutput;

/// 실패가 발생한 파이프라인 단계 (UI에 표시되는 라벨)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resampling,
    Encoding,
    Muxing,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Resampling => "resampling",
            Stage::Encoding => "encoding",
            Stage::Muxing => "muxing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 파이프라인 에러 (모두 치명적, 부분 결과 없음)
#[derive(Debug, Error)]
pub enum EncodeError {
    /// 코덱/샘플레이트/채널 조합 거부 - 작업 시작 전에 발생
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// 입력값 오류 (NaN, 음수, 채널 불일치 등)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("resampling failed: {0}")]
    ResampleFailure(String),

    /// 인코딩 도중 코덱 에러 - 수집된 프레임은 폐기됨
    #[error("codec failure: {0}")]
    CodecFailure(String),

    /// 비어 있거나 손상된 컨테이너 출력
    #[error("muxing failed: {0}")]
    MuxingFailure(String),
}

impl EncodeError {
    /// 에러가 속한 단계
    pub fn stage(&self) -> Stage {
        match self {
            EncodeError::ResampleFailure(_) => Stage::Resampling,
            EncodeError::UnsupportedConfiguration(_)
            | EncodeError::InvalidInput(_)
            | EncodeError::CodecFailure(_) => Stage::Encoding,
            EncodeError::MuxingFailure(_) => Stage::Muxing,
        }
    }
}

/// 파이프라인 결과 - 성공 또는 사용자 취소
#[derive(Debug)]
pub enum EncodeOutcome {
    Completed(ContainerOutput),
    Canceled,
}

impl EncodeOutcome {
    pub fn is_canceled(&self) -> bool {
        matches!(self, EncodeOutcome::Canceled)
    }

    /// 완료된 경우에만 출력 반환
    pub fn into_output(self) -> Option<ContainerOutput> {
        match self {
            EncodeOutcome::Completed(output) => Some(output),
            EncodeOutcome::Canceled => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EncodeError>;
