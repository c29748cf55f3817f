//! 데이터 모듈 오류 타입.

use thiserror::Error;

/// 저장소 및 상류 데이터 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 공유 저장소 연결 오류
    #[error("Store connection error: {0}")]
    ConnectionError(String),

    /// 캐시 명령 오류
    #[error("Cache error: {0}")]
    CacheError(String),

    /// 직렬화/역직렬화 오류
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// 잘못된 데이터 형식
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// 데이터 가져오기 오류 (외부 소스)
    #[error("Fetch error: {0}")]
    FetchError(String),

    /// 타임아웃 오류
    #[error("Operation timeout: {0}")]
    Timeout(String),
}

impl DataError {
    /// 다음 주기에 재시도하면 회복될 수 있는 오류인지 확인합니다.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DataError::FetchError(_) | DataError::Timeout(_) | DataError::ConnectionError(_)
        )
    }
}

impl From<redis::RedisError> for DataError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            DataError::ConnectionError(err.to_string())
        } else {
            DataError::CacheError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for DataError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DataError::Timeout(err.to_string())
        } else if err.is_decode() {
            DataError::InvalidData(err.to_string())
        } else {
            DataError::FetchError(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(DataError::FetchError("502".to_string()).is_transient());
        assert!(DataError::Timeout("10s".to_string()).is_transient());
        assert!(!DataError::SerializationError("eof".to_string()).is_transient());
    }
}
