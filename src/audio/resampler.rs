// 리샘플러 - TTS 출력 샘플레이트 → AAC 인코더가 받는 샘플레이트
// rubato FFT 리샘플러 (대역 제한), 출력 길이 = round(입력 * target / source)

use std::borrow::Cow;

use log::{debug, info};
use rubato::{FftFixedIn, Resampler as RubatoResampler};

use crate::audio::pcm::PcmBuffer;
use crate::error::{EncodeError, Result};
use crate::time::scale_round;

/// rubato 입력 청크 크기 (frame 단위)
const CHUNK_FRAMES: usize = 1024;

/// FFT sub-chunk 수 (품질/지연 트레이드오프)
const SUB_CHUNKS: usize = 2;

/// 입력 샘플레이트에 맞는 인코더 샘플레이트 선택
/// 1) 이미 지원되면 그대로 (리샘플 불필요)
/// 2) 입력의 정수배인 지원 레이트 (24k → 48k, 22.05k → 44.1k)
/// 3) 입력 이상인 가장 작은 지원 레이트
/// 4) 지원 레이트 중 최대값
pub fn select_target_rate(input_rate: u32, supported: &[u32]) -> Option<u32> {
    if supported.contains(&input_rate) {
        return Some(input_rate);
    }

    if input_rate > 0 {
        if let Some(rate) = supported
            .iter()
            .copied()
            .filter(|r| *r > input_rate && r % input_rate == 0)
            .min()
        {
            return Some(rate);
        }
    }

    supported
        .iter()
        .copied()
        .filter(|r| *r >= input_rate)
        .min()
        .or_else(|| supported.iter().copied().max())
}

/// 목표 샘플레이트로 리샘플링
/// - 같은 레이트면 입력을 그대로 빌려서 반환 (복사 없음)
/// - on_progress: 0.0 ~ 1.0
pub fn resample<'a>(
    input: &'a PcmBuffer,
    target_rate: u32,
    on_progress: &mut dyn FnMut(f64),
) -> Result<Cow<'a, PcmBuffer>> {
    if target_rate == 0 {
        return Err(EncodeError::ResampleFailure("target rate is zero".to_string()));
    }

    let source_rate = input.sample_rate();
    if source_rate == target_rate {
        on_progress(1.0);
        return Ok(Cow::Borrowed(input));
    }

    let channels = input.channels() as usize;
    let input_frames = input.frames();
    let expected_frames =
        scale_round(input_frames as i64, target_rate as i64, source_rate as i64) as usize;

    info!(
        "[RESAMPLE] {}Hz → {}Hz, {} → {} frames",
        source_rate, target_rate, input_frames, expected_frames
    );

    if input_frames == 0 {
        on_progress(1.0);
        return Ok(Cow::Owned(PcmBuffer::new(Vec::new(), target_rate, input.channels())?));
    }

    let planes = deinterleave(input.samples(), channels);

    let mut resampler = FftFixedIn::<f32>::new(
        source_rate as usize,
        target_rate as usize,
        CHUNK_FRAMES,
        SUB_CHUNKS,
        channels,
    )
    .map_err(|e| EncodeError::ResampleFailure(format!("resampler init failed: {}", e)))?;

    // 필터 지연만큼 앞부분을 버려야 입력과 정렬됨
    let delay = resampler.output_delay();
    let wanted = delay + expected_frames;
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(wanted + CHUNK_FRAMES); channels];

    let mut pos = 0usize;
    loop {
        let needed = resampler.input_frames_next();
        if pos + needed > input_frames {
            break;
        }

        let chunk: Vec<&[f32]> = planes.iter().map(|p| &p[pos..pos + needed]).collect();
        let resampled = resampler
            .process(&chunk, None)
            .map_err(|e| EncodeError::ResampleFailure(e.to_string()))?;
        append_planes(&mut output, resampled);
        pos += needed;

        on_progress(pos as f64 / input_frames as f64);
    }

    // 남은 입력 (청크보다 짧음) - 내부에서 0으로 패딩
    if pos < input_frames {
        let tail: Vec<&[f32]> = planes.iter().map(|p| &p[pos..]).collect();
        let resampled = resampler
            .process_partial(Some(tail.as_slice()), None)
            .map_err(|e| EncodeError::ResampleFailure(e.to_string()))?;
        append_planes(&mut output, resampled);
    }

    // 필터 지연분 배출
    while output[0].len() < wanted {
        let resampled = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| EncodeError::ResampleFailure(e.to_string()))?;
        if resampled.first().map_or(true, |p| p.is_empty()) {
            break;
        }
        append_planes(&mut output, resampled);
    }

    for plane in &mut output {
        plane.drain(..delay.min(plane.len()));
        plane.resize(expected_frames, 0.0);
    }

    debug!("[RESAMPLE] 완료: delay={} frames", delay);
    on_progress(1.0);

    let samples = interleave(&output, expected_frames);
    Ok(Cow::Owned(PcmBuffer::new(samples, target_rate, input.channels())?))
}

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    if channels == 1 {
        return vec![samples.to_vec()];
    }
    (0..channels)
        .map(|c| samples.iter().skip(c).step_by(channels).copied().collect())
        .collect()
}

fn interleave(planes: &[Vec<f32>], frames: usize) -> Vec<f32> {
    if planes.len() == 1 {
        return planes[0].clone();
    }
    let mut out = Vec::with_capacity(frames * planes.len());
    for i in 0..frames {
        for plane in planes {
            out.push(plane[i]);
        }
    }
    out
}

fn append_planes(output: &mut [Vec<f32>], resampled: Vec<Vec<f32>>) {
    for (dst, src) in output.iter_mut().zip(resampled) {
        dst.extend_from_slice(&src);
    }
}
