//! 에러 타입 정의.

use feed_core::FeedError;
use feed_data::DataError;
use thiserror::Error;

/// Collector 에러 타입
#[derive(Debug, Error)]
pub enum CollectorError {
    /// 설정 에러
    #[error("Configuration error: {0}")]
    Config(String),

    /// 상류 데이터 소스 에러 (CoinGecko, 환율 API)
    #[error("Data source error: {0}")]
    DataSource(String),

    /// 캐시 저장소 에러
    #[error("Cache error: {0}")]
    Cache(String),
}

impl CollectorError {
    /// 다음 주기에 자연히 재시도되는 오류인지 확인합니다.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DataSource(_))
    }
}

impl From<FeedError> for CollectorError {
    fn from(err: FeedError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<DataError> for CollectorError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::FetchError(_) | DataError::Timeout(_) | DataError::InvalidData(_) => {
                Self::DataSource(err.to_string())
            }
            _ => Self::Cache(err.to_string()),
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;
