//! 예약 메일 구독자와 분 단위 버킷.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 매일 지정된 UTC 시각에 다이제스트를 받는 구독자.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    /// 소문자로 정규화된 이메일
    pub email: String,
    /// 발송 시 (0-23)
    pub hour: u32,
    /// 발송 분 (0-59)
    pub minute: u32,
}

impl Subscriber {
    /// 새 구독자를 생성합니다. 이메일은 앞뒤 공백 제거 후 소문자로 정규화됩니다.
    pub fn new(email: &str, hour: u32, minute: u32) -> Self {
        Self {
            email: normalize_email(email),
            hour,
            minute,
        }
    }

    /// 주어진 분 버킷에 발송 대상인지 확인합니다.
    pub fn is_due(&self, bucket: &MinuteBucket) -> bool {
        self.hour == bucket.hour() && self.minute == bucket.minute()
    }
}

/// 이메일 정규화 (중복 판정 기준).
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// 벽시계 기준 분 단위 버킷 (중복 발송 방지 키).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MinuteBucket(DateTime<Utc>);

impl MinuteBucket {
    /// 시각을 분 단위로 내림합니다.
    pub fn of(at: DateTime<Utc>) -> Self {
        let floored = at
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(at);
        Self(floored)
    }

    /// 현재 시각의 버킷.
    pub fn now() -> Self {
        Self::of(Utc::now())
    }

    /// 시 (UTC).
    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    /// 분.
    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    /// 버킷 시작 시각.
    pub fn start(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for MinuteBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M"))
    }
}
