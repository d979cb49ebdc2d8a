// 인코딩 설정 - 비트레이트, 지원 샘플레이트, 청크 크기, 진행률 가중치

use crate::error::{EncodeError, Result};

/// 단계별 진행률 가중치 (합계 기준 비율)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageWeights {
    pub resample: u32,
    pub encode: u32,
    pub mux: u32,
}

impl Default for StageWeights {
    fn default() -> Self {
        Self { resample: 10, encode: 55, mux: 35 }
    }
}

impl StageWeights {
    /// 리샘플이 필요 없으면 resample 가중치를 0으로
    pub fn without_resample(self) -> Self {
        Self { resample: 0, ..self }
    }

    pub fn total(&self) -> u32 {
        self.resample + self.encode + self.mux
    }
}

/// 인코딩 설정
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// AAC 비트레이트 (bit/s)
    pub bitrate: u32,
    /// 인코더가 받는 샘플레이트 - 입력이 다르면 리샘플
    pub supported_sample_rates: Vec<u32>,
    /// 인코더 제출 단위 (ms)
    pub chunk_duration_ms: u32,
    pub stage_weights: StageWeights,
    /// 컨테이너 chunk 하나에 묶을 오디오 샘플 수 (44 × 1024 ≈ 1초)
    pub audio_samples_per_chunk: u32,
    /// 텍스트 챕터 트랙 외에 Nero chpl도 기록
    pub write_nero_chapters: bool,
    /// 청크 제출 사이 스케줄러 양보
    pub yield_between_chunks: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            bitrate: 64_000,
            supported_sample_rates: vec![44_100, 48_000],
            chunk_duration_ms: 1000,
            stage_weights: StageWeights::default(),
            audio_samples_per_chunk: 44,
            write_nero_chapters: true,
            yield_between_chunks: true,
        }
    }
}

impl EncoderConfig {
    /// 설정값 검증 (작업 시작 전)
    pub fn validate(&self) -> Result<()> {
        if self.bitrate == 0 {
            return Err(EncodeError::UnsupportedConfiguration("bitrate is zero".to_string()));
        }
        if self.supported_sample_rates.is_empty() || self.supported_sample_rates.contains(&0) {
            return Err(EncodeError::UnsupportedConfiguration(
                "no usable encoder sample rate".to_string(),
            ));
        }
        if self.chunk_duration_ms == 0 {
            return Err(EncodeError::UnsupportedConfiguration(
                "chunk duration is zero".to_string(),
            ));
        }
        if self.audio_samples_per_chunk == 0 {
            return Err(EncodeError::UnsupportedConfiguration(
                "container chunk size is zero".to_string(),
            ));
        }
        if self.stage_weights.total() == 0 {
            return Err(EncodeError::UnsupportedConfiguration(
                "stage weights sum to zero".to_string(),
            ));
        }
        Ok(())
    }

    /// 샘플레이트 기준 청크당 frame 수
    pub fn chunk_frames(&self, sample_rate: u32) -> usize {
        ((sample_rate as u64 * self.chunk_duration_ms as u64) / 1000).max(1) as usize
    }
}
