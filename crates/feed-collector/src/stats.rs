//! 갱신 통계 구조체.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 갱신 작업 한 번의 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshStats {
    /// 상류에서 가져온 레코드 수
    pub fetched: usize,
    /// 기록된 캐시 키 수
    pub written: usize,
    /// lock 경합으로 건너뛴 쓰기 수
    pub skipped: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RefreshStats {
    /// 새 통계 객체 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 쓰기 결과를 반영합니다.
    pub fn record(&mut self, written: bool) {
        if written {
            self.written += 1;
        } else {
            self.skipped += 1;
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            fetched = self.fetched,
            written = self.written,
            skipped = self.skipped,
            elapsed = format!("{:.2}s", self.elapsed.as_secs_f64()),
            "갱신 완료"
        );
    }
}
