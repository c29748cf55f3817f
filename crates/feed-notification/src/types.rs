//! 리포트/메일 타입 및 trait 정의.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use feed_core::CryptoCurrency;

/// 렌더러가 생성하는 리포트 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    /// 시세 표 (xlsx)
    Crypto,
    /// 추세 리포트 (docx)
    Trend,
    /// 요약 리포트 (pdf)
    Executive,
    /// 24시간 변화율 막대 그래프 (png)
    Graph,
}

impl ReportKind {
    /// 전체 종류 (메일 첨부 순서).
    pub const ALL: [ReportKind; 4] = [
        ReportKind::Graph,
        ReportKind::Crypto,
        ReportKind::Trend,
        ReportKind::Executive,
    ];

    /// 경로/이름용 문자열.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crypto => "crypto",
            Self::Trend => "trend",
            Self::Executive => "executive",
            Self::Graph => "graph",
        }
    }

    /// 렌더링에 사용할 자산 수.
    pub fn quantity(&self) -> usize {
        match self {
            Self::Crypto | Self::Trend => 50,
            Self::Executive | Self::Graph => 15,
        }
    }

    /// 산출물의 MIME 타입.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Crypto => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Trend => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Executive => "application/pdf",
            Self::Graph => "image/png",
        }
    }

    /// 렌더러가 파일명을 주지 않을 때 사용하는 기본 파일명.
    pub fn default_filename(&self, currency: &str) -> String {
        let ext = match self {
            Self::Crypto => "xlsx",
            Self::Trend => "docx",
            Self::Executive => "pdf",
            Self::Graph => "png",
        };
        format!("{}_report_{}.{}", self.as_str(), currency.to_lowercase(), ext)
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = NotificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "crypto" => Ok(Self::Crypto),
            "trend" => Ok(Self::Trend),
            "executive" => Ok(Self::Executive),
            "graph" => Ok(Self::Graph),
            other => Err(NotificationError::InvalidInput(format!(
                "알 수 없는 리포트 종류: {}",
                other
            ))),
        }
    }
}

/// 렌더링된 리포트.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifact {
    /// 리포트 종류
    pub kind: ReportKind,
    /// 파일명
    pub filename: String,
    /// MIME 타입
    pub content_type: String,
    /// 파일 내용
    pub content: Vec<u8>,
}

/// 메일 첨부 파일 (임시 디렉토리에 기록된 산출물).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    /// 첨부 파일명
    pub filename: String,
    /// MIME 타입
    pub content_type: String,
    /// 파일 경로
    pub path: PathBuf,
    /// 본문에 포함할 이미지의 Content-ID
    pub content_id: Option<String>,
}

/// 발송할 다이제스트 메일.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestMail {
    /// 수신자 목록
    pub recipients: Vec<String>,
    /// 제목
    pub subject: String,
    /// HTML 본문
    pub html_body: String,
    /// 첨부 파일
    pub attachments: Vec<MailAttachment>,
}

/// 알림 작업용 Result 타입.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// 알림 에러.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("리포트 생성 실패: {0}")]
    Render(String),

    #[error("메일 전송 실패: {0}")]
    Delivery(String),

    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    #[error("요청 시간 초과: {0}")]
    Timeout(String),

    #[error("시세 데이터 조회 실패: {0}")]
    Data(#[from] feed_data::DataError),

    #[error("파일 처리 실패: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// 리포트 렌더러.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// 데이터셋을 리포트 파일로 렌더링합니다.
    async fn render(
        &self,
        kind: ReportKind,
        currency: &str,
        records: &[CryptoCurrency],
    ) -> NotificationResult<ReportArtifact>;

    /// 렌더러 이름.
    fn name(&self) -> &str;
}

/// 메일 발송기.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// 다이제스트 메일을 발송합니다.
    async fn send(&self, mail: &DigestMail) -> NotificationResult<()>;

    /// 발송기 이름.
    fn name(&self) -> &str;
}
