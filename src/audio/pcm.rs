// PCM 버퍼 - TTS 합성 결과 (f32 interleaved)
// 파이프라인은 읽기만 하고 수정하지 않음

use crate::error::{EncodeError, Result};
use crate::time::frame_index_to_timestamp_us;

/// f32 interleaved PCM 버퍼
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl PcmBuffer {
    /// PCM 버퍼 생성 (samples.len() % channels == 0 검증)
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(EncodeError::InvalidInput("sample rate is zero".to_string()));
        }
        if channels == 0 {
            return Err(EncodeError::InvalidInput("channel count is zero".to_string()));
        }
        if samples.len() % channels as usize != 0 {
            return Err(EncodeError::InvalidInput(format!(
                "{} samples is not a multiple of {} channels",
                samples.len(),
                channels
            )));
        }

        Ok(Self { samples, sample_rate, channels })
    }

    /// 모노 버퍼 생성
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::new(samples, sample_rate, 1)
    }

    pub fn samples(&self) -> &[f32] { &self.samples }
    pub fn sample_rate(&self) -> u32 { self.sample_rate }
    pub fn channels(&self) -> u16 { self.channels }

    /// 채널당 샘플 프레임 수
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 전체 길이 (μs)
    pub fn duration_us(&self) -> Result<i64> {
        frame_index_to_timestamp_us(self.frames() as i64, self.sample_rate)
    }

    /// frame 범위 [start, end) 의 interleaved 샘플 슬라이스
    pub fn frame_slice(&self, start: usize, end: usize) -> &[f32] {
        let ch = self.channels as usize;
        let end = end.min(self.frames());
        let start = start.min(end);
        &self.samples[start * ch..end * ch]
    }
}
