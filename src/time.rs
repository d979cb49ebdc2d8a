// 시간 변환 - 샘플 프레임 인덱스 ↔ μs ↔ 컨테이너 timescale tick
// 모든 변환은 반올림 (절삭하면 수천 프레임에 걸쳐 누적 오차 → 긴 파일 재생 시간 단축)

use crate::error::{EncodeError, Result};

pub const MICROS_PER_SECOND: i64 = 1_000_000;

/// 샘플 프레임 인덱스 → 타임스탬프 (μs)
/// round(frame_index * 1_000_000 / sample_rate)
/// 정수 인덱스라 비유한 값은 타입에서 배제됨, 음수만 거부
pub fn frame_index_to_timestamp_us(frame_index: i64, sample_rate: u32) -> Result<i64> {
    if frame_index < 0 {
        return Err(EncodeError::InvalidInput(format!(
            "negative frame index: {}",
            frame_index
        )));
    }
    if sample_rate == 0 {
        return Err(EncodeError::InvalidInput("sample rate is zero".to_string()));
    }

    Ok(div_round(
        frame_index as i128 * MICROS_PER_SECOND as i128,
        sample_rate as i128,
    ))
}

/// μs → timescale tick, 최소 1
/// 컨테이너 샘플 duration 0은 유효하지 않으므로 절대 0을 반환하지 않음
pub fn microseconds_to_timescale_units(us: i64, timescale: u32) -> i64 {
    let ticks = div_round(
        us.max(0) as i128 * timescale as i128,
        MICROS_PER_SECOND as i128,
    );
    ticks.max(1)
}

/// 반올림 정수 나눗셈 (0.5는 올림, 양수 전용)
#[inline]
fn div_round(numerator: i128, denominator: i128) -> i64 {
    ((numerator + denominator / 2) / denominator) as i64
}

/// 반올림 비례 스케일: value * num / den
/// 챕터 매핑 등 정수 비율 계산에 사용 (i128로 오버플로 방지)
pub(crate) fn scale_round(value: i64, num: i64, den: i64) -> i64 {
    if den <= 0 {
        return 0;
    }
    div_round(value.max(0) as i128 * num.max(0) as i128, den as i128)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_index_to_timestamp() {
        assert_eq!(frame_index_to_timestamp_us(0, 48000).unwrap(), 0);
        assert_eq!(frame_index_to_timestamp_us(48000, 48000).unwrap(), 1_000_000);
        // 1024 / 48000 = 21333.33μs → 반올림
        assert_eq!(frame_index_to_timestamp_us(1024, 48000).unwrap(), 21_333);
        // 1024 / 44100 = 23219.95μs → 반올림
        assert_eq!(frame_index_to_timestamp_us(1024, 44100).unwrap(), 23_220);
    }

    #[test]
    fn test_rejects_invalid_input() {
        assert!(frame_index_to_timestamp_us(-1, 48000).is_err());
        assert!(frame_index_to_timestamp_us(10, 0).is_err());
        assert!(frame_index_to_timestamp_us(i64::MIN, 48000).is_err());
    }

    #[test]
    fn test_timescale_clamped_to_one() {
        assert_eq!(microseconds_to_timescale_units(0, 48000), 1);
        assert_eq!(microseconds_to_timescale_units(1, 48000), 1);
        assert_eq!(microseconds_to_timescale_units(-5, 48000), 1);
        assert_eq!(microseconds_to_timescale_units(1_000_000, 48000), 48000);
    }

    #[test]
    fn test_aac_frame_round_trip_is_exact() {
        let frame_us = frame_index_to_timestamp_us(1024, 48000).unwrap()
            - frame_index_to_timestamp_us(0, 48000).unwrap();
        assert_eq!(microseconds_to_timescale_units(frame_us, 48000), 1024);

        let frame_us = frame_index_to_timestamp_us(1024, 44100).unwrap();
        assert_eq!(microseconds_to_timescale_units(frame_us, 44100), 1024);
    }

    #[test]
    fn test_no_drift_over_long_file() {
        // 10분 분량 AAC 프레임 (48kHz) - 각 프레임 tick 합이 정확히 샘플 수와 일치
        let frames = 10 * 60 * 48000 / 1024;
        let mut total_ticks = 0i64;
        for i in 0..frames {
            let start = frame_index_to_timestamp_us(i * 1024, 48000).unwrap();
            let end = frame_index_to_timestamp_us((i + 1) * 1024, 48000).unwrap();
            total_ticks += microseconds_to_timescale_units(end - start, 48000);
        }
        assert_eq!(total_ticks, frames * 1024);
    }

    #[test]
    fn test_scale_round() {
        assert_eq!(scale_round(500, 100_000_000, 1000), 50_000_000);
        assert_eq!(scale_round(1, 2, 3), 1);
        assert_eq!(scale_round(10, 5, 0), 0);
    }
}
