// Exporter FFI - 호스트 UI 연동
// Export 작업 생성/진행률/상태/출력 복사/취소/파괴

use std::ffi::{c_char, c_void, CStr, CString};

use log::warn;

use crate::audio::PcmBuffer;
use crate::config::EncoderConfig;
use crate::encoding::exporter::ExportJob;
use crate::encoding::pipeline::EncodeRequest;
use crate::encoding::AudioEncoder;
use crate::ffi::types::ErrorCode;
use crate::timeline::ChapterDescriptor;

/// env_logger 초기화 (여러 번 호출해도 안전)
#[no_mangle]
pub extern "C" fn audiobook_init_logging() {
    let _ = env_logger::try_init();
}

/// 실제 AAC 인코더 생성
#[cfg(feature = "ffmpeg")]
fn create_encoder() -> Result<Box<dyn AudioEncoder + Send>, ErrorCode> {
    match crate::encoding::aac::FfmpegAacEncoder::new() {
        Ok(encoder) => Ok(Box::new(encoder)),
        Err(e) => {
            warn!("[EXPORT] 인코더 생성 실패: {}", e);
            Err(ErrorCode::EncoderUnavailable)
        }
    }
}

#[cfg(not(feature = "ffmpeg"))]
fn create_encoder() -> Result<Box<dyn AudioEncoder + Send>, ErrorCode> {
    warn!("[EXPORT] ffmpeg feature 없이 빌드됨 - AAC 인코더 없음");
    Err(ErrorCode::EncoderUnavailable)
}

/// C 배열 → EncodeRequest
unsafe fn build_request(
    samples: *const f32,
    sample_count: usize,
    sample_rate: u32,
    chapter_titles: *const *const c_char,
    chapter_starts: *const u64,
    chapter_ends: *const u64,
    chapter_count: usize,
    total_text_len: u64,
) -> Result<EncodeRequest, ErrorCode> {
    let samples = if sample_count == 0 {
        Vec::new()
    } else if samples.is_null() {
        return Err(ErrorCode::NullPointer);
    } else {
        std::slice::from_raw_parts(samples, sample_count).to_vec()
    };
    let pcm = PcmBuffer::mono(samples, sample_rate).map_err(|_| ErrorCode::InvalidParam)?;

    let mut chapters = Vec::with_capacity(chapter_count);
    if chapter_count > 0 {
        if chapter_titles.is_null() || chapter_starts.is_null() || chapter_ends.is_null() {
            return Err(ErrorCode::NullPointer);
        }
        let titles = std::slice::from_raw_parts(chapter_titles, chapter_count);
        let starts = std::slice::from_raw_parts(chapter_starts, chapter_count);
        let ends = std::slice::from_raw_parts(chapter_ends, chapter_count);

        for i in 0..chapter_count {
            // 제목 null → 빈 제목 ("Chapter N"으로 대체됨)
            let title = if titles[i].is_null() {
                String::new()
            } else {
                CStr::from_ptr(titles[i])
                    .to_str()
                    .map_err(|_| ErrorCode::InvalidParam)?
                    .to_string()
            };
            chapters.push(ChapterDescriptor::new(
                title,
                text_offset(starts[i])?,
                text_offset(ends[i])?,
            ));
        }
    }

    Ok(EncodeRequest::new(pcm).with_chapters(chapters, text_offset(total_text_len)?))
}

/// u64 문자 오프셋 → usize (32비트 대상에서 잘림 대신 에러)
fn text_offset(value: u64) -> Result<usize, ErrorCode> {
    usize::try_from(value).map_err(|_| ErrorCode::InvalidParam)
}

/// Export 시작 (백그라운드 스레드에서 실행)
/// samples: mono f32 PCM (sample_count개)
/// chapter_*: 길이 chapter_count 배열 (0이면 null 허용)
/// bitrate: 0이면 기본값
/// out_job: ExportJob 핸들 반환
#[no_mangle]
pub extern "C" fn audiobook_export_start(
    samples: *const f32,
    sample_count: usize,
    sample_rate: u32,
    chapter_titles: *const *const c_char,
    chapter_starts: *const u64,
    chapter_ends: *const u64,
    chapter_count: usize,
    total_text_len: u64,
    bitrate: u32,
    out_job: *mut *mut c_void,
) -> i32 {
    if out_job.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        *out_job = std::ptr::null_mut();

        let request = match build_request(
            samples,
            sample_count,
            sample_rate,
            chapter_titles,
            chapter_starts,
            chapter_ends,
            chapter_count,
            total_text_len,
        ) {
            Ok(r) => r,
            Err(code) => return code as i32,
        };

        let mut config = EncoderConfig::default();
        if bitrate > 0 {
            config.bitrate = bitrate;
        }

        let encoder = match create_encoder() {
            Ok(e) => e,
            Err(code) => return code as i32,
        };

        // ExportJob 시작 (백그라운드 스레드)
        let job = ExportJob::start(request, config, encoder);
        *out_job = Box::into_raw(Box::new(job)) as *mut c_void;
    }

    ErrorCode::Success as i32
}

/// Export 진행률 가져오기 (0~100)
#[no_mangle]
pub extern "C" fn audiobook_export_get_progress(job: *mut c_void) -> u32 {
    if job.is_null() {
        return 0;
    }

    unsafe {
        let job_ref = &*(job as *const ExportJob);
        job_ref.get_progress()
    }
}

/// Export 완료 여부 확인
/// 반환: 1=완료, 0=진행중
#[no_mangle]
pub extern "C" fn audiobook_export_is_finished(job: *mut c_void) -> i32 {
    if job.is_null() {
        return 1; // null이면 완료로 처리
    }

    unsafe {
        let job_ref = &*(job as *const ExportJob);
        if job_ref.is_finished() { 1 } else { 0 }
    }
}

/// Export 상태
/// 반환: 0=진행중, 1=완료, 2=취소, 3=실패, -1=null
#[no_mangle]
pub extern "C" fn audiobook_export_get_status(job: *mut c_void) -> i32 {
    if job.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let job_ref = &*(job as *const ExportJob);
        job_ref.status() as i32
    }
}

/// Export 에러 메시지 가져오기 ("단계: 내용")
/// out_error: 에러 문자열 포인터 (없으면 null)
/// 반환 후 audiobook_string_free()로 해제 필요
#[no_mangle]
pub extern "C" fn audiobook_export_get_error(
    job: *mut c_void,
    out_error: *mut *mut c_char,
) -> i32 {
    if job.is_null() || out_error.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let job_ref = &*(job as *const ExportJob);

        *out_error = match job_ref.get_error().map(CString::new) {
            Some(Ok(c_str)) => c_str.into_raw(),
            _ => std::ptr::null_mut(),
        };
    }

    ErrorCode::Success as i32
}

/// 완성된 컨테이너 크기 (bytes), 없으면 0
#[no_mangle]
pub extern "C" fn audiobook_export_output_len(job: *mut c_void) -> usize {
    if job.is_null() {
        return 0;
    }

    unsafe {
        let job_ref = &*(job as *const ExportJob);
        job_ref.output_len()
    }
}

/// 완성된 컨테이너 길이 (μs), 없으면 0
#[no_mangle]
pub extern "C" fn audiobook_export_output_duration_us(job: *mut c_void) -> i64 {
    if job.is_null() {
        return 0;
    }

    unsafe {
        let job_ref = &*(job as *const ExportJob);
        job_ref.output_duration_us()
    }
}

/// 컨테이너 바이트 복사 (MIME: audio/mp4)
/// buffer_len은 audiobook_export_output_len() 이상이어야 함
/// out_written: 복사된 바이트 수
#[no_mangle]
pub extern "C" fn audiobook_export_copy_output(
    job: *mut c_void,
    buffer: *mut u8,
    buffer_len: usize,
    out_written: *mut usize,
) -> i32 {
    if job.is_null() || buffer.is_null() || out_written.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let job_ref = &*(job as *const ExportJob);
        *out_written = 0;

        let needed = job_ref.output_len();
        if needed == 0 {
            return ErrorCode::NotReady as i32;
        }
        if buffer_len < needed {
            return ErrorCode::BufferTooSmall as i32;
        }

        let dst = std::slice::from_raw_parts_mut(buffer, buffer_len);
        match job_ref.copy_output(dst) {
            Some(written) => *out_written = written,
            None => return ErrorCode::NotReady as i32,
        }
    }

    ErrorCode::Success as i32
}

/// Export 취소
#[no_mangle]
pub extern "C" fn audiobook_export_cancel(job: *mut c_void) -> i32 {
    if job.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let job_ref = &*(job as *const ExportJob);
        job_ref.cancel();
    }

    ErrorCode::Success as i32
}

/// ExportJob 파괴 (메모리 해제)
/// Export 완료/취소 후 호출
#[no_mangle]
pub extern "C" fn audiobook_export_destroy(job: *mut c_void) -> i32 {
    if job.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let _ = Box::from_raw(job as *mut ExportJob);
    }

    ErrorCode::Success as i32
}

/// Rust에서 할당한 문자열 해제
#[no_mangle]
pub extern "C" fn audiobook_string_free(s: *mut c_char) {
    if s.is_null() {
        return;
    }

    unsafe {
        let _ = CString::from_raw(s);
    }
}
