// 오디오북 인코딩 파이프라인
// PCM → (리샘플) → AAC 인코딩 → 챕터 시간 계산 → MP4 먹싱
// 모든 단계 에러는 치명적, 취소는 에러가 아닌 EncodeOutcome::Canceled

use log::{debug, info};

use crate::audio::{resample, select_target_rate, PcmBuffer};
use crate::config::EncoderConfig;
use crate::encoding::encoder::{AudioEncoder, CapabilityCache, CodecConfig};
use crate::encoding::session::{EncodeSession, SessionOptions, SessionOutcome};
use crate::error::{EncodeError, EncodeOutcome, Result, Stage};
use crate::mux::{mux, MuxOptions};
use crate::progress::{CancellationToken, ProgressCoordinator};
use crate::timeline::{map_chapters, validate_chapters, ChapterDescriptor};

/// 인코딩 요청 (합성 단계의 출력)
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub pcm: PcmBuffer,
    /// 원문 텍스트 기준 챕터 (순서대로)
    pub chapters: Vec<ChapterDescriptor>,
    /// 원문 텍스트 전체 길이 (문자 수)
    pub total_text_len: usize,
}

impl EncodeRequest {
    pub fn new(pcm: PcmBuffer) -> Self {
        Self { pcm, chapters: Vec::new(), total_text_len: 0 }
    }

    pub fn with_chapters(mut self, chapters: Vec<ChapterDescriptor>, total_text_len: usize) -> Self {
        self.chapters = chapters;
        self.total_text_len = total_text_len;
        self
    }
}

/// 전체 파이프라인 실행
/// - capabilities: 호출자가 가진 지원 여부 캐시 (None이면 매번 probe)
pub fn encode_audiobook<E: AudioEncoder + ?Sized>(
    request: &EncodeRequest,
    encoder: &mut E,
    config: &EncoderConfig,
    progress: &mut ProgressCoordinator,
    cancel: &CancellationToken,
    capabilities: Option<&mut CapabilityCache>,
) -> Result<EncodeOutcome> {
    config.validate()?;
    // 챕터 입력 오류는 리샘플/인코딩 전에 거부
    validate_chapters(&request.chapters)?;

    let pcm = &request.pcm;
    if pcm.channels() != 1 {
        return Err(EncodeError::UnsupportedConfiguration(format!(
            "only mono input is supported, got {} channels",
            pcm.channels()
        )));
    }

    let target_rate = select_target_rate(pcm.sample_rate(), &config.supported_sample_rates)
        .ok_or_else(|| {
            EncodeError::UnsupportedConfiguration(format!(
                "no encoder rate for {}Hz input",
                pcm.sample_rate()
            ))
        })?;

    // 코덱 지원 여부는 작업 시작 전에 확인
    let codec_config = CodecConfig::aac_mono(target_rate, config.bitrate);
    let support = match capabilities {
        Some(cache) => cache.check(encoder, &codec_config),
        None => encoder.probe(&codec_config),
    };

    info!(
        "[PIPELINE] 시작: {}Hz → {}Hz, {} frames, 챕터 {}개",
        pcm.sample_rate(),
        target_rate,
        pcm.frames(),
        request.chapters.len()
    );

    // 1. 리샘플 (필요할 때만)
    if target_rate == pcm.sample_rate() {
        progress.set_weights(config.stage_weights.without_resample());
    } else {
        progress.set_weights(config.stage_weights);
        progress.begin(Stage::Resampling);
    }
    if cancel.is_cancelled() {
        info!("[PIPELINE] 취소됨 (리샘플 전)");
        return Ok(EncodeOutcome::Canceled);
    }
    let resampled = resample(pcm, target_rate, &mut |f| progress.report(Stage::Resampling, f))?;

    if cancel.is_cancelled() {
        info!("[PIPELINE] 취소됨 (인코딩 전)");
        return Ok(EncodeOutcome::Canceled);
    }

    // 2. 인코딩 (동기 제출 루프)
    progress.begin(Stage::Encoding);
    let session = EncodeSession::new(encoder, &codec_config, &support)?;
    let options = SessionOptions {
        chunk_frames: config.chunk_frames(target_rate),
        yield_between_chunks: config.yield_between_chunks,
    };
    let outcome = session.run(&resampled, options, cancel, &mut |p| {
        progress.report_percent(Stage::Encoding, p)
    })?;
    let audio = match outcome {
        SessionOutcome::Completed(audio) => audio,
        SessionOutcome::Canceled => return Ok(EncodeOutcome::Canceled),
    };
    drop(resampled);

    if cancel.is_cancelled() {
        info!("[PIPELINE] 취소됨 (먹싱 전)");
        return Ok(EncodeOutcome::Canceled);
    }

    // 3. 챕터 경계 (인코딩된 전체 길이 기준)
    let chapters = map_chapters(
        &request.chapters,
        request.total_text_len,
        audio.total_duration_us(),
    )?;
    debug!("[PIPELINE] 챕터 경계 {}개", chapters.len());

    // 4. 먹싱
    progress.begin(Stage::Muxing);
    let mux_options = MuxOptions {
        samples_per_chunk: config.audio_samples_per_chunk,
        write_nero_chapters: config.write_nero_chapters,
    };
    let output = mux(&audio, &chapters, &mux_options, &mut |f| progress.report(Stage::Muxing, f))?;

    progress.complete();
    info!(
        "[PIPELINE] 완료: {} bytes, {}μs, .{}",
        output.len(),
        output.duration_us(),
        output.file_extension()
    );

    Ok(EncodeOutcome::Completed(output))
}
