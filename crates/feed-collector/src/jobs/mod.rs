//! 캐시 갱신 작업.
//!
//! 각 작업은 상류에서 데이터를 가져와 성공했을 때만 캐시에 기록합니다.
//! 가져오기에 실패하면 아무것도 쓰지 않으므로 캐시는 마지막 정상 값을
//! 계속 제공합니다.

pub mod exchange;
pub mod price;

use async_trait::async_trait;

use crate::{RefreshStats, Result};

pub use exchange::ExchangeRateRefreshJob;
pub use price::PriceRefreshJob;

/// 갱신 작업 한 종류.
#[async_trait]
pub trait RefreshJob: Send + Sync {
    /// 작업 이름 (로그용).
    fn name(&self) -> &'static str;

    /// 한 번 갱신합니다.
    async fn run_once(&self) -> Result<RefreshStats>;
}
