// Export 작업 관리 - 백그라운드 스레드, 진행률, 취소
// ExportJob: PCM + 챕터 → 오디오북(MP4) 바이트 전체 흐름

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::config::EncoderConfig;
use crate::encoding::encoder::{AudioEncoder, CapabilityCache};
use crate::encoding::pipeline::{encode_audiobook, EncodeRequest};
use crate::error::EncodeOutcome;
use crate::mux::ContainerOutput;
use crate::progress::{CancellationToken, ProgressCallback, ProgressCoordinator};

/// Export 작업 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExportStatus {
    Running = 0,
    Completed = 1,
    /// 사용자 취소 (에러 아님)
    Canceled = 2,
    Failed = 3,
}

impl ExportStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ExportStatus::Completed,
            2 => ExportStatus::Canceled,
            3 => ExportStatus::Failed,
            _ => ExportStatus::Running,
        }
    }
}

/// Export 작업 핸들 (호스트에서 폴링으로 상태 확인)
pub struct ExportJob {
    /// 진행률 (0~100)
    progress: Arc<AtomicU32>,
    cancel: CancellationToken,
    /// 완료 플래그 (성공/취소/실패 모두)
    finished: Arc<AtomicBool>,
    status: Arc<AtomicU8>,
    /// 에러 메시지 ("단계: 내용")
    error: Arc<Mutex<Option<String>>>,
    output: Arc<Mutex<Option<ContainerOutput>>>,
}

impl ExportJob {
    /// Export 시작 (백그라운드 스레드에서 실행)
    pub fn start(
        request: EncodeRequest,
        config: EncoderConfig,
        encoder: Box<dyn AudioEncoder + Send>,
    ) -> Self {
        Self::start_with_cancel(request, config, encoder, CancellationToken::new())
    }

    /// 외부 취소 토큰을 공유하는 Export 시작
    pub fn start_with_cancel(
        request: EncodeRequest,
        config: EncoderConfig,
        mut encoder: Box<dyn AudioEncoder + Send>,
        cancel: CancellationToken,
    ) -> Self {
        let progress = Arc::new(AtomicU32::new(0));
        let finished = Arc::new(AtomicBool::new(false));
        let status = Arc::new(AtomicU8::new(ExportStatus::Running as u8));
        let error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let output: Arc<Mutex<Option<ContainerOutput>>> = Arc::new(Mutex::new(None));

        let p = progress.clone();
        let c = cancel.clone();
        let f = finished.clone();
        let s = status.clone();
        let e = error.clone();
        let o = output.clone();

        std::thread::spawn(move || {
            let reporter = p.clone();
            let callback: ProgressCallback =
                Box::new(move |pct| reporter.store(pct, Ordering::SeqCst));
            let mut coordinator = ProgressCoordinator::new(config.stage_weights, Some(callback));
            let mut capabilities = CapabilityCache::new();

            let result = encode_audiobook(
                &request,
                &mut encoder,
                &config,
                &mut coordinator,
                &c,
                Some(&mut capabilities),
            );

            let final_status = match result {
                Ok(EncodeOutcome::Completed(container)) => {
                    p.store(100, Ordering::SeqCst);
                    info!(
                        "[EXPORT] 완료: {} bytes (.{})",
                        container.len(),
                        container.file_extension()
                    );
                    if let Ok(mut slot) = o.lock() {
                        *slot = Some(container);
                    }
                    ExportStatus::Completed
                }
                Ok(EncodeOutcome::Canceled) => {
                    info!("[EXPORT] 취소됨 ({}%)", p.load(Ordering::SeqCst));
                    ExportStatus::Canceled
                }
                Err(err) => {
                    let msg = format!("{}: {}", err.stage(), err);
                    warn!("[EXPORT] 에러: {}", msg);
                    if let Ok(mut slot) = e.lock() {
                        *slot = Some(msg);
                    }
                    ExportStatus::Failed
                }
            };

            s.store(final_status as u8, Ordering::SeqCst);
            f.store(true, Ordering::SeqCst);
        });

        Self { progress, cancel, finished, status, error, output }
    }

    /// 진행률 가져오기 (0~100)
    pub fn get_progress(&self) -> u32 {
        self.progress.load(Ordering::SeqCst)
    }

    /// 취소 요청
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 완료 여부
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ExportStatus {
        ExportStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    /// 에러 메시지 가져오기 (None이면 성공, 취소 또는 진행 중)
    pub fn get_error(&self) -> Option<String> {
        self.error.lock().ok().and_then(|e| e.clone())
    }

    /// 완성된 컨테이너 꺼내기 (한 번만)
    pub fn take_output(&self) -> Option<ContainerOutput> {
        self.output.lock().ok().and_then(|mut o| o.take())
    }

    /// 출력 크기 (꺼내기 전 확인용)
    pub fn output_len(&self) -> usize {
        self.output
            .lock()
            .ok()
            .and_then(|o| o.as_ref().map(|c| c.len()))
            .unwrap_or(0)
    }

    /// 출력 길이 (μs), 출력이 없으면 0
    pub fn output_duration_us(&self) -> i64 {
        self.output
            .lock()
            .ok()
            .and_then(|o| o.as_ref().map(|c| c.duration_us()))
            .unwrap_or(0)
    }

    /// 출력 바이트를 dst에 복사 (출력 유지)
    /// 출력이 없거나 dst가 작으면 None
    pub fn copy_output(&self, dst: &mut [u8]) -> Option<usize> {
        let guard = self.output.lock().ok()?;
        let bytes = guard.as_ref()?.bytes();
        if dst.len() < bytes.len() {
            return None;
        }
        dst[..bytes.len()].copy_from_slice(bytes);
        Some(bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PcmBuffer;
    use crate::encoding::testing::MockEncoder;
    use crate::timeline::ChapterDescriptor;
    use std::time::{Duration, Instant};

    fn wait(job: &ExportJob) {
        let deadline = Instant::now() + Duration::from_secs(30);
        while !job.is_finished() {
            assert!(Instant::now() < deadline, "export job did not finish");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn request(seconds: usize) -> EncodeRequest {
        let samples = vec![0.1f32; 48000 * seconds];
        EncodeRequest::new(PcmBuffer::mono(samples, 48000).unwrap()).with_chapters(
            vec![ChapterDescriptor::new("Intro", 0, 40), ChapterDescriptor::new("Body", 40, 100)],
            100,
        )
    }

    #[test]
    fn test_job_completes_with_output() {
        let encoder = MockEncoder::new();
        let stats = encoder.stats();
        let job = ExportJob::start(request(2), EncoderConfig::default(), Box::new(encoder));
        wait(&job);

        assert_eq!(job.status(), ExportStatus::Completed);
        assert_eq!(job.get_progress(), 100);
        assert!(job.get_error().is_none());
        assert!(job.output_len() > 0);

        let mut buf = vec![0u8; job.output_len()];
        assert_eq!(job.copy_output(&mut buf), Some(buf.len()));
        assert!(job.copy_output(&mut [0u8; 4]).is_none());
        assert!((job.output_duration_us() - 2_000_000).abs() <= 21_334);

        let output = job.take_output().unwrap();
        assert_eq!(output.bytes(), buf.as_slice());
        assert_eq!(output.file_extension(), "m4b");
        assert!(job.take_output().is_none());
        assert_eq!(stats.closes(), 1);
    }

    #[test]
    fn test_job_cancel_is_not_an_error() {
        let cancel = CancellationToken::new();
        let encoder = MockEncoder::new().cancelling_after(1, cancel.clone());
        let stats = encoder.stats();
        let job = ExportJob::start_with_cancel(
            request(5),
            EncoderConfig::default(),
            Box::new(encoder),
            cancel,
        );
        wait(&job);

        assert_eq!(job.status(), ExportStatus::Canceled);
        assert!(job.get_error().is_none());
        assert!(job.take_output().is_none());
        assert!(job.get_progress() < 100);
        assert_eq!(stats.closes(), 1);
    }

    #[test]
    fn test_job_failure_carries_stage_label() {
        let encoder = MockEncoder::new().failing_on_encode(1);
        let job = ExportJob::start(request(2), EncoderConfig::default(), Box::new(encoder));
        wait(&job);

        assert_eq!(job.status(), ExportStatus::Failed);
        let msg = job.get_error().unwrap();
        assert!(msg.starts_with("encoding: "), "{}", msg);
        assert_eq!(job.output_len(), 0);
    }
}
