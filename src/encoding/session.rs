// 인코딩 세션 - 코덱 드라이버
// 모든 청크를 순서대로 동기 제출한 뒤에만 flush (예약만 된 제출은 flush 후 유실됨)
// 성공/실패/취소 어느 경로든 close 보장 (Drop에서도)

use log::{debug, info, trace, warn};

use crate::audio::PcmBuffer;
use crate::encoding::encoder::{
    AudioChunk, AudioEncoder, CodecConfig, CodecSupport, DecoderConfig, EncodedFrame,
};
use crate::error::{EncodeError, Result};
use crate::progress::CancellationToken;
use crate::time::frame_index_to_timestamp_us;

/// 인코딩 결과 (디코더 설정은 먹서 트랙 설정에 필수)
#[derive(Debug, Clone)]
pub struct EncodedAudio {
    pub frames: Vec<EncodedFrame>,
    pub decoder_config: DecoderConfig,
}

impl EncodedAudio {
    /// 모든 프레임 duration 합 (μs)
    pub fn total_duration_us(&self) -> i64 {
        self.frames.iter().map(|f| f.duration_us).sum()
    }

    pub fn sample_rate(&self) -> u32 {
        self.decoder_config.sample_rate
    }
}

/// 세션 실행 결과
#[derive(Debug)]
pub enum SessionOutcome {
    Completed(EncodedAudio),
    Canceled,
}

/// 세션 실행 옵션
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// 한 번에 제출할 frame 수
    pub chunk_frames: usize,
    /// 청크 제출 사이 스케줄러 양보 (제출 자체를 미루지는 않음)
    pub yield_between_chunks: bool,
}

/// 인코딩 세션 (encode 호출 1회 수명)
pub struct EncodeSession<'e, E: AudioEncoder + ?Sized> {
    encoder: &'e mut E,
    decoder_config: DecoderConfig,
    frames: Vec<EncodedFrame>,
    /// 다음에 제출할 frame 위치
    cursor: usize,
    closed: bool,
}

impl<'e, E: AudioEncoder + ?Sized> EncodeSession<'e, E> {
    /// 세션 생성 - 지원 여부 확인 결과를 명시적으로 받음
    /// 거부된 설정은 프레임 제출 전에 에러
    pub fn new(encoder: &'e mut E, config: &CodecConfig, support: &CodecSupport) -> Result<Self> {
        if let CodecSupport::Unsupported(reason) = support {
            return Err(EncodeError::UnsupportedConfiguration(format!(
                "{} @ {}Hz x{}: {}",
                config.profile.codec_string(),
                config.sample_rate,
                config.channels,
                reason
            )));
        }
        if config.channels != 1 {
            return Err(EncodeError::UnsupportedConfiguration(format!(
                "only mono is supported, got {} channels",
                config.channels
            )));
        }

        let decoder_config = match encoder.configure(config) {
            Ok(dc) => dc,
            Err(e) => {
                encoder.close();
                return Err(match e {
                    EncodeError::UnsupportedConfiguration(_) => e,
                    other => EncodeError::UnsupportedConfiguration(other.to_string()),
                });
            }
        };

        if decoder_config.description.is_empty() {
            encoder.close();
            return Err(EncodeError::CodecFailure(
                "encoder did not emit a decoder configuration description".to_string(),
            ));
        }

        info!(
            "[ENCODE] 인코더 설정: {} {}Hz mono {}bps",
            config.profile.codec_string(),
            config.sample_rate,
            config.bitrate
        );

        Ok(Self {
            encoder,
            decoder_config,
            frames: Vec::new(),
            cursor: 0,
            closed: false,
        })
    }

    pub fn decoder_config(&self) -> &DecoderConfig {
        &self.decoder_config
    }

    /// 전체 PCM 인코딩
    /// - on_progress: 제출된 위치 기준 0~99, flush 완료 후 100
    pub fn run(
        mut self,
        pcm: &PcmBuffer,
        options: SessionOptions,
        cancel: &CancellationToken,
        on_progress: &mut dyn FnMut(u32),
    ) -> Result<SessionOutcome> {
        let sample_rate = self.decoder_config.sample_rate;
        if pcm.sample_rate() != sample_rate || pcm.channels() != self.decoder_config.channels {
            self.release();
            return Err(EncodeError::InvalidInput(format!(
                "pcm is {}Hz x{}, encoder expects {}Hz x{}",
                pcm.sample_rate(),
                pcm.channels(),
                sample_rate,
                self.decoder_config.channels
            )));
        }

        let total_frames = pcm.frames();
        let total_us = pcm.duration_us()?.max(1);
        let chunk_frames = options.chunk_frames.max(1);
        let mut chunk_count = 0usize;

        debug!(
            "[ENCODE] 시작: {} frames, 청크 {} frames",
            total_frames, chunk_frames
        );

        // 1. 동기 제출 루프 - 모든 청크 제출이 끝나야 flush
        while self.cursor < total_frames {
            if cancel.is_cancelled() {
                info!(
                    "[ENCODE] 취소됨 (frame {}/{})",
                    self.cursor, total_frames
                );
                // 취소여도 flush → close 순서로 리소스 정리
                let mut discard = Vec::new();
                if let Err(e) = self.encoder.flush(&mut discard) {
                    warn!("[ENCODE] 취소 후 flush 실패: {}", e);
                }
                self.frames.clear();
                self.release();
                return Ok(SessionOutcome::Canceled);
            }

            let end = (self.cursor + chunk_frames).min(total_frames);
            let chunk = AudioChunk {
                samples: pcm.frame_slice(self.cursor, end),
                frame_offset: self.cursor as u64,
                timestamp_us: frame_index_to_timestamp_us(self.cursor as i64, sample_rate)?,
                sample_rate,
                channels: pcm.channels(),
            };

            if let Err(e) = self.encoder.encode(&chunk, &mut self.frames) {
                warn!("[ENCODE] 인코딩 실패 (frame {}): {}", self.cursor, e);
                return Err(self.abort(e));
            }

            self.cursor = end;
            chunk_count += 1;

            let submitted_us = frame_index_to_timestamp_us(end as i64, sample_rate)?;
            let percent = ((submitted_us as i128 * 100) / total_us as i128).min(99) as u32;
            on_progress(percent);
            trace!("[ENCODE] 청크 {} 제출: {}μs ({}%)", chunk_count, submitted_us, percent);

            if options.yield_between_chunks {
                std::thread::yield_now();
            }
        }

        // 2. 모든 제출 완료 후 flush
        if let Err(e) = self.encoder.flush(&mut self.frames) {
            warn!("[ENCODE] flush 실패: {}", e);
            return Err(self.abort(e));
        }
        self.release();
        on_progress(100);

        // 3. 콜백 순서와 무관하게 timestamp 기준 정렬
        let mut frames = std::mem::take(&mut self.frames);
        frames.sort_by_key(|f| f.timestamp_us);
        validate_frames(&frames, sample_rate)?;

        if total_frames > 0 && frames.is_empty() {
            return Err(EncodeError::CodecFailure("encoder produced no frames".to_string()));
        }

        info!(
            "[ENCODE] 완료: {} 청크 → {} 프레임",
            chunk_count,
            frames.len()
        );

        Ok(SessionOutcome::Completed(EncodedAudio {
            frames,
            decoder_config: self.decoder_config.clone(),
        }))
    }

    /// 에러 중단 - 수집한 프레임 폐기 + 인코더 해제
    fn abort(&mut self, error: EncodeError) -> EncodeError {
        self.frames.clear();
        self.release();
        match error {
            EncodeError::CodecFailure(_) => error,
            other => EncodeError::CodecFailure(other.to_string()),
        }
    }

    fn release(&mut self) {
        if !self.closed {
            self.encoder.close();
            self.closed = true;
        }
    }
}

impl<E: AudioEncoder + ?Sized> Drop for EncodeSession<'_, E> {
    fn drop(&mut self) {
        self.release();
    }
}

/// 출력 프레임 검증: duration > 0, 겹침 없음, 간격은 한 샘플 주기 이내
fn validate_frames(frames: &[EncodedFrame], sample_rate: u32) -> Result<()> {
    let sample_period_us = (1_000_000 + sample_rate as i64 - 1) / sample_rate.max(1) as i64;

    for (i, frame) in frames.iter().enumerate() {
        if frame.duration_us <= 0 {
            return Err(EncodeError::CodecFailure(format!(
                "frame {} has non-positive duration {}μs",
                i, frame.duration_us
            )));
        }
        if frame.data.is_empty() {
            return Err(EncodeError::CodecFailure(format!("frame {} is empty", i)));
        }
    }

    for pair in frames.windows(2) {
        let gap = pair[1].timestamp_us - (pair[0].timestamp_us + pair[0].duration_us);
        if gap > sample_period_us || gap < 0 {
            warn!(
                "[ENCODE] 프레임 간격 {}μs (at {}μs)",
                gap, pair[1].timestamp_us
            );
            return Err(EncodeError::CodecFailure(format!(
                "frame at {}μs is {}μs off from the previous frame end",
                pair[1].timestamp_us, gap
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::testing::MockEncoder;

    fn options() -> SessionOptions {
        SessionOptions { chunk_frames: 48000, yield_between_chunks: false }
    }

    fn tone(seconds: f64, rate: u32) -> PcmBuffer {
        let frames = (seconds * rate as f64) as usize;
        let samples = (0..frames).map(|i| ((i % 100) as f32 / 100.0) - 0.5).collect();
        PcmBuffer::mono(samples, rate).unwrap()
    }

    fn run(encoder: &mut MockEncoder, pcm: &PcmBuffer, cancel: &CancellationToken) -> Result<SessionOutcome> {
        let config = CodecConfig::aac_mono(pcm.sample_rate(), 64000);
        let support = encoder.probe(&config);
        let session = EncodeSession::new(encoder, &config, &support)?;
        session.run(pcm, options(), cancel, &mut |_| {})
    }

    #[test]
    fn test_no_loss_for_long_input() {
        // 10분 입력 → 인코딩 duration 합이 한 프레임 이내로 일치
        let pcm = tone(600.0, 8000);
        let mut encoder = MockEncoder::new().with_supported_rates(&[8000]);
        let outcome = run(&mut encoder, &pcm, &CancellationToken::new()).unwrap();

        let SessionOutcome::Completed(audio) = outcome else {
            panic!("expected completion");
        };
        let expected = pcm.duration_us().unwrap();
        let frame_us = frame_index_to_timestamp_us(1024, 8000).unwrap();
        assert!((audio.total_duration_us() - expected).abs() <= frame_us);
    }

    #[test]
    fn test_timestamps_monotonic_even_if_output_reordered() {
        let pcm = tone(3.3, 44100);
        let mut encoder = MockEncoder::new().reordering_output();
        let outcome = run(&mut encoder, &pcm, &CancellationToken::new()).unwrap();

        let SessionOutcome::Completed(audio) = outcome else {
            panic!("expected completion");
        };
        assert!(audio
            .frames
            .windows(2)
            .all(|w| w[1].timestamp_us >= w[0].timestamp_us));
        assert!(audio.frames.iter().all(|f| f.duration_us > 0));
    }

    #[test]
    fn test_all_encodes_before_flush_then_close() {
        let pcm = tone(5.5, 48000);
        let mut encoder = MockEncoder::new();
        let stats = encoder.stats();
        run(&mut encoder, &pcm, &CancellationToken::new()).unwrap();

        assert_eq!(stats.encodes(), 6);
        assert_eq!(stats.flushes(), 1);
        assert_eq!(stats.closes(), 1);
        assert!(!stats.encode_after_flush());
    }

    #[test]
    fn test_progress_capped_until_flush() {
        let pcm = tone(4.0, 48000);
        let mut encoder = MockEncoder::new();
        let config = CodecConfig::aac_mono(48000, 64000);
        let session = EncodeSession::new(&mut encoder, &config, &CodecSupport::Supported).unwrap();

        let mut seen = Vec::new();
        session
            .run(&pcm, options(), &CancellationToken::new(), &mut |p| seen.push(p))
            .unwrap();

        assert_eq!(seen, vec![25, 50, 75, 99, 100]);
    }

    #[test]
    fn test_cancel_releases_encoder() {
        let pcm = tone(10.0, 48000);
        let cancel = CancellationToken::new();
        let mut encoder = MockEncoder::new().cancelling_after(3, cancel.clone());
        let stats = encoder.stats();

        let outcome = run(&mut encoder, &pcm, &cancel).unwrap();
        assert!(matches!(outcome, SessionOutcome::Canceled));
        assert_eq!(stats.encodes(), 3);
        assert_eq!(stats.flushes(), 1);
        assert_eq!(stats.closes(), 1);
    }

    #[test]
    fn test_codec_failure_discards_and_closes() {
        let pcm = tone(5.0, 48000);
        let mut encoder = MockEncoder::new().failing_on_encode(2);
        let stats = encoder.stats();

        let err = run(&mut encoder, &pcm, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, EncodeError::CodecFailure(_)));
        assert_eq!(stats.encodes(), 2);
        assert_eq!(stats.flushes(), 0);
        assert_eq!(stats.closes(), 1);
    }

    #[test]
    fn test_unsupported_configuration_before_any_work() {
        let mut encoder = MockEncoder::new().with_supported_rates(&[48000]);
        let stats = encoder.stats();
        let config = CodecConfig::aac_mono(22050, 64000);
        let support = encoder.probe(&config);

        let err = EncodeSession::new(&mut encoder, &config, &support).err().unwrap();
        assert!(matches!(err, EncodeError::UnsupportedConfiguration(_)));
        assert_eq!(stats.configures(), 0);
        assert_eq!(stats.encodes(), 0);
    }

    #[test]
    fn test_stereo_rejected() {
        let mut encoder = MockEncoder::new();
        let config = CodecConfig { channels: 2, ..CodecConfig::aac_mono(48000, 64000) };
        let err = EncodeSession::new(&mut encoder, &config, &CodecSupport::Supported)
            .err()
            .unwrap();
        assert!(matches!(err, EncodeError::UnsupportedConfiguration(_)));
    }

    #[test]
    fn test_missing_description_is_failure() {
        let mut encoder = MockEncoder::new().with_empty_description();
        let stats = encoder.stats();
        let config = CodecConfig::aac_mono(48000, 64000);
        let err = EncodeSession::new(&mut encoder, &config, &CodecSupport::Supported)
            .err()
            .unwrap();
        assert!(matches!(err, EncodeError::CodecFailure(_)));
        assert_eq!(stats.closes(), 1);
    }

    #[test]
    fn test_dropped_session_closes_encoder() {
        let mut encoder = MockEncoder::new();
        let stats = encoder.stats();
        let config = CodecConfig::aac_mono(48000, 64000);
        {
            let _session =
                EncodeSession::new(&mut encoder, &config, &CodecSupport::Supported).unwrap();
        }
        assert_eq!(stats.closes(), 1);
    }

    fn frame(timestamp_us: i64, duration_us: i64) -> EncodedFrame {
        EncodedFrame { timestamp_us, duration_us, data: vec![1], is_sync_point: true }
    }

    #[test]
    fn test_validate_frames_rejects_overlap_and_gap() {
        // 48kHz 한 샘플 주기 = 21μs (올림)
        let contiguous = [frame(0, 21_333), frame(21_333, 21_334), frame(42_667, 21_333)];
        assert!(validate_frames(&contiguous, 48000).is_ok());

        // 한 샘플 주기 이내 간격은 허용
        let within = [frame(0, 21_333), frame(21_354, 21_333)];
        assert!(validate_frames(&within, 48000).is_ok());

        // 겹침
        let overlap = [frame(0, 21_333), frame(21_000, 21_333)];
        assert!(matches!(
            validate_frames(&overlap, 48000),
            Err(EncodeError::CodecFailure(_))
        ));

        // 같은 timestamp 중복
        let duplicate = [frame(0, 21_333), frame(0, 21_333)];
        assert!(matches!(
            validate_frames(&duplicate, 48000),
            Err(EncodeError::CodecFailure(_))
        ));

        // 한 샘플 주기 초과 간격
        let gap = [frame(0, 21_333), frame(21_355, 21_333)];
        assert!(matches!(
            validate_frames(&gap, 48000),
            Err(EncodeError::CodecFailure(_))
        ));
    }
}
