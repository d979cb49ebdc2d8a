// 챕터 타이밍 매퍼 - 텍스트 문자 오프셋 → 오디오 시간 (μs)
// 전체 길이에 대한 선형 보간 (합성 속도가 균일하다는 가정의 근사값)

use log::{debug, warn};

use crate::error::{EncodeError, Result};
use crate::time::scale_round;

/// 챕터 제목 최대 바이트 (chpl / 텍스트 샘플 길이 제한)
pub const MAX_TITLE_BYTES: usize = 255;

/// 챕터 감지 결과 (원문 텍스트 기준 문자 오프셋)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterDescriptor {
    pub title: String,
    pub start_char_offset: usize,
    pub end_char_offset: usize,
}

impl ChapterDescriptor {
    pub fn new(title: impl Into<String>, start_char_offset: usize, end_char_offset: usize) -> Self {
        Self {
            title: title.into(),
            start_char_offset,
            end_char_offset,
        }
    }
}

/// 오디오 시간 기준 챕터 경계
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterBoundary {
    pub title: String,
    pub start_us: i64,
    pub end_us: i64,
}

impl ChapterBoundary {
    pub fn duration_us(&self) -> i64 {
        self.end_us - self.start_us
    }
}

/// 챕터 입력 검증 (인코딩 시작 전에 호출)
/// - start_char_offset 비감소
/// - end_char_offset >= start_char_offset
pub fn validate_chapters(descriptors: &[ChapterDescriptor]) -> Result<()> {
    for (i, pair) in descriptors.windows(2).enumerate() {
        if pair[1].start_char_offset < pair[0].start_char_offset {
            return Err(EncodeError::InvalidInput(format!(
                "chapter {} starts before chapter {} ({} < {})",
                i + 1,
                i,
                pair[1].start_char_offset,
                pair[0].start_char_offset
            )));
        }
    }
    for (i, d) in descriptors.iter().enumerate() {
        if d.end_char_offset < d.start_char_offset {
            return Err(EncodeError::InvalidInput(format!(
                "chapter {} ends before it starts ({} < {})",
                i, d.end_char_offset, d.start_char_offset
            )));
        }
    }

    Ok(())
}

/// 챕터 경계 계산
/// - 챕터가 2개 미만이면 빈 목록 (마커 불필요)
/// - start_us = start_char / total_text_len * total_duration_us
/// - end_us = 다음 챕터 start_us (마지막은 total_duration_us)
pub fn map_chapters(
    descriptors: &[ChapterDescriptor],
    total_text_len: usize,
    total_duration_us: i64,
) -> Result<Vec<ChapterBoundary>> {
    validate_chapters(descriptors)?;
    if descriptors.len() < 2 {
        return Ok(Vec::new());
    }
    if total_text_len == 0 || total_duration_us <= 0 {
        warn!(
            "[CHAPTER] 텍스트 길이 {} / 오디오 길이 {}μs - 챕터 생략",
            total_text_len, total_duration_us
        );
        return Ok(Vec::new());
    }

    let starts: Vec<i64> = descriptors
        .iter()
        .map(|d| {
            let offset = d.start_char_offset.min(total_text_len) as i64;
            scale_round(offset, total_duration_us, total_text_len as i64)
        })
        .collect();

    let mut boundaries = Vec::with_capacity(descriptors.len());
    for (i, d) in descriptors.iter().enumerate() {
        let start_us = starts[i];
        let end_us = starts.get(i + 1).copied().unwrap_or(total_duration_us);
        if end_us <= start_us {
            debug!("[CHAPTER] 길이 0 챕터 제외: {:?}", d.title);
            continue;
        }
        boundaries.push(ChapterBoundary {
            title: normalize_title(&d.title, i + 1),
            start_us,
            end_us,
        });
    }

    if boundaries.len() < 2 {
        return Ok(Vec::new());
    }
    Ok(boundaries)
}

/// 빈 제목은 "Chapter N", 255바이트 초과는 문자 경계에서 자름
fn normalize_title(title: &str, number: usize) -> String {
    let title = title.trim();
    if title.is_empty() {
        return format!("Chapter {}", number);
    }
    if title.len() <= MAX_TITLE_BYTES {
        return title.to_string();
    }
    let mut end = MAX_TITLE_BYTES;
    while !title.is_char_boundary(end) {
        end -= 1;
    }
    title[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midpoint_chapter() {
        let chapters = vec![
            ChapterDescriptor::new("Part One", 0, 500),
            ChapterDescriptor::new("Part Two", 500, 1000),
        ];
        let bounds = map_chapters(&chapters, 1000, 100_000_000).unwrap();

        assert_eq!(bounds.len(), 2);
        assert_eq!(bounds[0].start_us, 0);
        assert_eq!(bounds[0].end_us, 50_000_000);
        assert_eq!(bounds[1].start_us, 50_000_000);
        assert_eq!(bounds[1].end_us, 100_000_000);
    }

    #[test]
    fn test_single_chapter_omitted() {
        let chapters = vec![ChapterDescriptor::new("Only", 0, 1000)];
        assert!(map_chapters(&chapters, 1000, 100_000_000).unwrap().is_empty());
        assert!(map_chapters(&[], 1000, 100_000_000).unwrap().is_empty());
    }

    #[test]
    fn test_zero_text_length_omits() {
        let chapters = vec![
            ChapterDescriptor::new("A", 0, 0),
            ChapterDescriptor::new("B", 0, 0),
        ];
        assert!(map_chapters(&chapters, 0, 1_000_000).unwrap().is_empty());
    }

    #[test]
    fn test_out_of_order_rejected() {
        let chapters = vec![
            ChapterDescriptor::new("A", 500, 1000),
            ChapterDescriptor::new("B", 100, 500),
        ];
        assert!(matches!(
            map_chapters(&chapters, 1000, 1_000_000),
            Err(EncodeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_validate_rejects_end_before_start() {
        assert!(validate_chapters(&[ChapterDescriptor::new("A", 0, 10)]).is_ok());
        assert!(validate_chapters(&[]).is_ok());
        // 챕터 1개여도 입력 오류는 거부
        assert!(matches!(
            validate_chapters(&[ChapterDescriptor::new("A", 20, 10)]),
            Err(EncodeError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_chapters(&[
                ChapterDescriptor::new("A", 0, 10),
                ChapterDescriptor::new("B", 10, 5),
            ]),
            Err(EncodeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_offsets_clamped_and_empty_chapters_dropped() {
        let chapters = vec![
            ChapterDescriptor::new("A", 0, 300),
            ChapterDescriptor::new("B", 300, 300),
            ChapterDescriptor::new("C", 300, 900),
            ChapterDescriptor::new("D", 5000, 6000),
        ];
        let bounds = map_chapters(&chapters, 1000, 10_000_000).unwrap();
        let titles: Vec<&str> = bounds.iter().map(|b| b.title.as_str()).collect();
        // B는 길이 0, D는 텍스트 끝 이후라 길이 0
        assert_eq!(titles, vec!["A", "C"]);
        assert_eq!(bounds[1].end_us, 10_000_000);
    }

    #[test]
    fn test_title_normalization() {
        let chapters = vec![
            ChapterDescriptor::new("   ", 0, 10),
            ChapterDescriptor::new("가".repeat(200), 10, 20),
        ];
        let bounds = map_chapters(&chapters, 20, 2_000_000).unwrap();
        assert_eq!(bounds[0].title, "Chapter 1");
        assert!(bounds[1].title.len() <= MAX_TITLE_BYTES);
        assert_eq!(bounds[1].title.len(), 255);
    }
}
