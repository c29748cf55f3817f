//! HTTP 리포트 렌더러.
//!
//! 외부 렌더링 서비스에 `POST {base_url}/reports/{kind}`로 데이터셋을
//! 보내고 응답 본문을 파일 내용으로 받습니다. 파일명은
//! `Content-Disposition` 헤더에서 읽고, 없으면 기본 파일명을 씁니다.

use async_trait::async_trait;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

use crate::types::{NotificationError, NotificationResult, ReportArtifact, ReportKind, Renderer};
use feed_core::CryptoCurrency;

#[derive(Serialize)]
struct RenderRequest<'a> {
    currency: &'a str,
    records: &'a [CryptoCurrency],
}

/// HTTP 렌더러.
pub struct HttpRenderer {
    client: Client,
    base_url: String,
}

impl HttpRenderer {
    /// 새 렌더러를 생성합니다.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> NotificationResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Render(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

/// `attachment; filename="x.pdf"` 형태에서 파일명을 꺼냅니다.
fn filename_from_disposition(value: &str) -> Option<String> {
    value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty() && !name.contains(['/', '\\']))
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(
        &self,
        kind: ReportKind,
        currency: &str,
        records: &[CryptoCurrency],
    ) -> NotificationResult<ReportArtifact> {
        let url = format!("{}/reports/{}", self.base_url, kind);
        debug!(%kind, currency, records = records.len(), "Requesting report render");

        let response = self
            .client
            .post(&url)
            .json(&RenderRequest { currency, records })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotificationError::Timeout(format!("renderer: {}", e))
                } else {
                    NotificationError::Render(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%kind, %status, "Renderer rejected request");
            return Err(NotificationError::Render(format!("HTTP {}: {}", status, body)));
        }

        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| kind.default_filename(currency));
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(kind.content_type())
            .to_string();

        let content = response
            .bytes()
            .await
            .map_err(|e| NotificationError::Render(e.to_string()))?
            .to_vec();
        if content.is_empty() {
            return Err(NotificationError::Render(format!("{} 리포트가 비어 있습니다", kind)));
        }

        Ok(ReportArtifact {
            kind,
            filename,
            content_type,
            content,
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}
