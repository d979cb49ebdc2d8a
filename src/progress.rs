// 진행률/취소 코디네이터
// 단계별(리샘플/인코딩/먹싱) 진행률을 가중치로 합산 → 0~100 단일 값, 절대 감소하지 않음

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::StageWeights;
use crate::error::Stage;

/// 진행률 콜백 (0~100)
pub type ProgressCallback = Box<dyn FnMut(u32) + Send>;

/// 협조적 취소 토큰 (청크 단위로 확인)
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 취소 요청
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// 단계 진행률 → 전체 진행률 합산기
pub struct ProgressCoordinator {
    weights: StageWeights,
    /// 마지막으로 보고한 값 (단조 증가 보장)
    last_reported: u32,
    callback: Option<ProgressCallback>,
}

impl ProgressCoordinator {
    pub fn new(weights: StageWeights, callback: Option<ProgressCallback>) -> Self {
        Self { weights, last_reported: 0, callback }
    }

    /// 가중치 교체 (리샘플 불필요 판정 후)
    pub fn set_weights(&mut self, weights: StageWeights) {
        self.weights = weights;
    }

    pub fn last_reported(&self) -> u32 {
        self.last_reported
    }

    /// 단계 진입 (해당 단계 0%)
    pub fn begin(&mut self, stage: Stage) {
        self.report(stage, 0.0);
    }

    /// 단계 내부 진행률 보고 (fraction: 0.0 ~ 1.0)
    /// 완료 전까지 최대 99
    pub fn report(&mut self, stage: Stage, fraction: f64) {
        let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
        let (start, width) = self.stage_span(stage);
        let percent = (start + width * fraction).floor() as u32;
        self.emit(percent.min(99));
    }

    /// 단계 내부 진행률 보고 (percent: 0 ~ 100)
    pub fn report_percent(&mut self, stage: Stage, percent: u32) {
        self.report(stage, percent.min(100) as f64 / 100.0);
    }

    /// 전체 완료 (100)
    pub fn complete(&mut self) {
        self.emit(100);
    }

    /// 단계 시작 위치와 폭 (백분율)
    fn stage_span(&self, stage: Stage) -> (f64, f64) {
        let total = self.weights.total().max(1) as f64;
        let resample = self.weights.resample as f64 * 100.0 / total;
        let encode = self.weights.encode as f64 * 100.0 / total;
        let mux = self.weights.mux as f64 * 100.0 / total;

        match stage {
            Stage::Resampling => (0.0, resample),
            Stage::Encoding => (resample, encode),
            Stage::Muxing => (resample + encode, mux),
        }
    }

    fn emit(&mut self, percent: u32) {
        let percent = percent.min(100).max(self.last_reported);
        self.last_reported = percent;
        if let Some(callback) = self.callback.as_mut() {
            callback(percent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording() -> (Arc<Mutex<Vec<u32>>>, ProgressCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, Box::new(move |p| sink.lock().unwrap().push(p)))
    }

    #[test]
    fn test_weighted_stages() {
        let (seen, callback) = recording();
        let mut progress = ProgressCoordinator::new(StageWeights::default(), Some(callback));

        progress.report(Stage::Resampling, 1.0);
        progress.report(Stage::Encoding, 0.5);
        progress.report(Stage::Encoding, 1.0);
        progress.report(Stage::Muxing, 1.0);
        progress.complete();

        assert_eq!(*seen.lock().unwrap(), vec![10, 37, 65, 99, 100]);
    }

    #[test]
    fn test_never_regresses() {
        let (seen, callback) = recording();
        let mut progress = ProgressCoordinator::new(StageWeights::default(), Some(callback));

        progress.report(Stage::Encoding, 0.8);
        progress.report(Stage::Encoding, 0.2);
        progress.report(Stage::Resampling, 0.5);

        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(*seen.last().unwrap(), progress.last_reported());
    }

    #[test]
    fn test_without_resample_weight() {
        let mut progress =
            ProgressCoordinator::new(StageWeights::default().without_resample(), None);
        progress.report(Stage::Encoding, 1.0);
        // 55 / 90
        assert_eq!(progress.last_reported(), 61);
    }

    #[test]
    fn test_capped_until_complete() {
        let mut progress = ProgressCoordinator::new(StageWeights::default(), None);
        progress.report(Stage::Muxing, 1.0);
        assert_eq!(progress.last_reported(), 99);
        progress.complete();
        assert_eq!(progress.last_reported(), 100);
    }

    #[test]
    fn test_cancellation_token_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
