// 테스트용 가짜 AAC 인코더
// 1024 샘플 프레임, 출력이 제출보다 한 프레임 늦게 나오는 파이프라인 코덱 흉내

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::encoding::encoder::{
    audio_specific_config, AudioChunk, AudioEncoder, CodecConfig, CodecSupport, DecoderConfig,
    EncodedFrame, AAC_FRAME_SAMPLES,
};
use crate::error::{EncodeError, Result};
use crate::progress::CancellationToken;
use crate::time::frame_index_to_timestamp_us;

/// 호출 횟수 관찰용 카운터 (인코더가 Box로 옮겨진 뒤에도 확인 가능)
#[derive(Debug, Default)]
pub struct MockStats {
    probes: AtomicUsize,
    configures: AtomicUsize,
    encodes: AtomicUsize,
    flushes: AtomicUsize,
    closes: AtomicUsize,
    encode_after_flush: AtomicBool,
}

impl MockStats {
    pub fn probes(&self) -> usize { self.probes.load(Ordering::SeqCst) }
    pub fn configures(&self) -> usize { self.configures.load(Ordering::SeqCst) }
    pub fn encodes(&self) -> usize { self.encodes.load(Ordering::SeqCst) }
    pub fn flushes(&self) -> usize { self.flushes.load(Ordering::SeqCst) }
    pub fn closes(&self) -> usize { self.closes.load(Ordering::SeqCst) }
    pub fn encode_after_flush(&self) -> bool { self.encode_after_flush.load(Ordering::SeqCst) }
}

pub struct MockEncoder {
    stats: Arc<MockStats>,
    sample_rate: u32,
    /// 아직 프레임으로 묶이지 않은 샘플 수
    pending_samples: usize,
    emitted_samples: i64,
    /// 아직 출력되지 않은 프레임 (한 프레임 지연)
    lagged: VecDeque<EncodedFrame>,
    flushed: bool,
    /// 지원 샘플레이트 (그 외는 probe/configure 거부)
    supported_rates: Vec<u32>,
    /// n번째 encode 호출에서 실패
    fail_on_encode: Option<usize>,
    /// n번째 encode 호출 후 취소 토큰 트리거 (사용자 취소 흉내)
    cancel_after: Option<(usize, CancellationToken)>,
    /// 출력 순서를 짝 단위로 뒤집음
    reorder_output: bool,
    empty_description: bool,
}

impl MockEncoder {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(MockStats::default()),
            sample_rate: 0,
            pending_samples: 0,
            emitted_samples: 0,
            lagged: VecDeque::new(),
            flushed: false,
            supported_rates: vec![44100, 48000],
            fail_on_encode: None,
            cancel_after: None,
            reorder_output: false,
            empty_description: false,
        }
    }

    pub fn stats(&self) -> Arc<MockStats> {
        self.stats.clone()
    }

    pub fn with_supported_rates(mut self, rates: &[u32]) -> Self {
        self.supported_rates = rates.to_vec();
        self
    }

    pub fn failing_on_encode(mut self, call: usize) -> Self {
        self.fail_on_encode = Some(call);
        self
    }

    pub fn cancelling_after(mut self, call: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((call, token));
        self
    }

    pub fn reordering_output(mut self) -> Self {
        self.reorder_output = true;
        self
    }

    pub fn with_empty_description(mut self) -> Self {
        self.empty_description = true;
        self
    }

    fn make_frame(&mut self, samples: usize) -> Result<EncodedFrame> {
        let start = self.emitted_samples;
        let end = start + samples as i64;
        let timestamp_us = frame_index_to_timestamp_us(start, self.sample_rate)?;
        let duration_us = frame_index_to_timestamp_us(end, self.sample_rate)? - timestamp_us;
        self.emitted_samples = end;

        // 프레임 번호가 들어간 가짜 페이로드
        let index = (start / AAC_FRAME_SAMPLES as i64) as u32;
        let mut data = vec![0xFF, 0xF1];
        data.extend_from_slice(&index.to_be_bytes());
        Ok(EncodedFrame { timestamp_us, duration_us, data, is_sync_point: true })
    }

    fn release_lagged(&mut self, keep: usize, output: &mut Vec<EncodedFrame>) {
        let mut released = Vec::new();
        while self.lagged.len() > keep {
            if let Some(frame) = self.lagged.pop_front() {
                released.push(frame);
            }
        }
        if self.reorder_output {
            for pair in released.chunks_mut(2) {
                pair.reverse();
            }
        }
        output.extend(released);
    }
}

impl AudioEncoder for MockEncoder {
    fn probe(&mut self, config: &CodecConfig) -> CodecSupport {
        self.stats.probes.fetch_add(1, Ordering::SeqCst);
        if config.channels != 1 {
            return CodecSupport::Unsupported(format!("{} channels", config.channels));
        }
        if !self.supported_rates.contains(&config.sample_rate) {
            return CodecSupport::Unsupported(format!("{}Hz", config.sample_rate));
        }
        CodecSupport::Supported
    }

    fn configure(&mut self, config: &CodecConfig) -> Result<DecoderConfig> {
        if let CodecSupport::Unsupported(reason) = self.probe(config) {
            return Err(EncodeError::UnsupportedConfiguration(reason));
        }
        self.stats.configures.fetch_add(1, Ordering::SeqCst);
        self.sample_rate = config.sample_rate;

        let description = if self.empty_description {
            Vec::new()
        } else {
            audio_specific_config(config.profile, config.sample_rate, config.channels)
                .unwrap_or_default()
        };

        Ok(DecoderConfig {
            profile: config.profile,
            description,
            sample_rate: config.sample_rate,
            channels: config.channels,
            bitrate: config.bitrate,
        })
    }

    fn encode(&mut self, chunk: &AudioChunk<'_>, output: &mut Vec<EncodedFrame>) -> Result<()> {
        if self.flushed {
            self.stats.encode_after_flush.store(true, Ordering::SeqCst);
        }
        let call = self.stats.encodes.fetch_add(1, Ordering::SeqCst) + 1;

        if self.fail_on_encode == Some(call) {
            return Err(EncodeError::CodecFailure(format!("mock failure on call {}", call)));
        }

        self.pending_samples += chunk.frames();
        let frame_samples = AAC_FRAME_SAMPLES as usize;
        while self.pending_samples >= frame_samples {
            self.pending_samples -= frame_samples;
            let frame = self.make_frame(frame_samples)?;
            self.lagged.push_back(frame);
        }
        self.release_lagged(1, output);

        if let Some((after, token)) = &self.cancel_after {
            if call >= *after {
                token.cancel();
            }
        }
        Ok(())
    }

    fn flush(&mut self, output: &mut Vec<EncodedFrame>) -> Result<()> {
        self.stats.flushes.fetch_add(1, Ordering::SeqCst);
        self.flushed = true;

        if self.pending_samples > 0 {
            let remaining = std::mem::take(&mut self.pending_samples);
            let frame = self.make_frame(remaining)?;
            self.lagged.push_back(frame);
        }
        self.release_lagged(0, output);
        Ok(())
    }

    fn close(&mut self) {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
    }
}
