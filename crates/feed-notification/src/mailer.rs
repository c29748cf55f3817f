//! HTTP 메일 릴레이 발송기.
//!
//! 첨부 파일을 base64로 인코딩해 JSON 한 건으로 메일 릴레이에 전달합니다.
//! `content_id`가 있는 첨부는 본문의 `cid:` 참조로 표시됩니다.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::types::{DigestMail, Mailer, NotificationError, NotificationResult};

#[derive(Debug, Serialize)]
struct RelayAttachment {
    filename: String,
    content_type: String,
    content_base64: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: &'a str,
    attachments: Vec<RelayAttachment>,
}

/// HTTP 메일 발송기.
pub struct HttpMailer {
    client: Client,
    url: String,
    from: String,
}

impl HttpMailer {
    /// 새 발송기를 생성합니다.
    pub fn new(
        url: impl Into<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> NotificationResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Delivery(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            from: from.into(),
        })
    }

    /// 첨부 파일을 읽어 릴레이 요청 본문을 만듭니다.
    async fn relay_message<'a>(
        &'a self,
        mail: &'a DigestMail,
    ) -> NotificationResult<RelayMessage<'a>> {
        let mut attachments = Vec::with_capacity(mail.attachments.len());
        for attachment in &mail.attachments {
            let bytes = tokio::fs::read(&attachment.path).await?;
            attachments.push(RelayAttachment {
                filename: attachment.filename.clone(),
                content_type: attachment.content_type.clone(),
                content_base64: STANDARD.encode(bytes),
                content_id: attachment.content_id.clone(),
            });
        }

        Ok(RelayMessage {
            from: &self.from,
            to: &mail.recipients,
            subject: &mail.subject,
            html: &mail.html_body,
            attachments,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, mail: &DigestMail) -> NotificationResult<()> {
        if mail.recipients.is_empty() {
            debug!("No recipients, skipping mail");
            return Ok(());
        }

        let message = self.relay_message(mail).await?;

        let response = self
            .client
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotificationError::Timeout(format!("mailer: {}", e))
                } else {
                    NotificationError::Delivery(e.to_string())
                }
            })?;

        if response.status().is_success() {
            info!(recipients = mail.recipients.len(), "Digest mail sent");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, "Mail relay rejected message");
            Err(NotificationError::Delivery(format!("HTTP {}: {}", status, body)))
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MailAttachment;
    use mockito::Matcher;

    fn digest(attachments: Vec<MailAttachment>) -> DigestMail {
        DigestMail {
            recipients: vec!["a@b.com".to_string()],
            subject: "digest".to_string(),
            html_body: "<p>hi</p>".to_string(),
            attachments,
        }
    }

    #[tokio::test]
    async fn test_relay_message_encodes_attachments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.png");
        std::fs::write(&path, b"png").unwrap();

        let mailer =
            HttpMailer::new("http://127.0.0.1:1/send", "reports@example.com", Duration::from_secs(1))
                .unwrap();
        let mail = digest(vec![MailAttachment {
            filename: "graph.png".to_string(),
            content_type: "image/png".to_string(),
            path,
            content_id: Some("bar_graph".to_string()),
        }]);

        let message = mailer.relay_message(&mail).await.unwrap();

        assert_eq!(message.from, "reports@example.com");
        assert_eq!(message.attachments.len(), 1);
        assert_eq!(message.attachments[0].content_base64, "cG5n");
        assert_eq!(message.attachments[0].content_id.as_deref(), Some("bar_graph"));
    }

    #[tokio::test]
    async fn test_send_posts_to_relay() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/send")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "from": "reports@example.com",
                "subject": "digest",
            })))
            .with_status(202)
            .create_async()
            .await;

        let mailer = HttpMailer::new(
            format!("{}/send", server.url()),
            "reports@example.com",
            Duration::from_secs(5),
        )
        .unwrap();

        mailer.send(&digest(Vec::new())).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_attachment_file_is_io_error() {
        let mailer =
            HttpMailer::new("http://127.0.0.1:1/send", "reports@example.com", Duration::from_secs(1))
                .unwrap();
        let mail = digest(vec![MailAttachment {
            filename: "gone.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            path: "/nonexistent/gone.pdf".into(),
            content_id: None,
        }]);

        assert!(matches!(mailer.send(&mail).await, Err(NotificationError::Io(_))));
    }

    #[tokio::test]
    async fn test_relay_error_is_delivery_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/send")
            .with_status(503)
            .create_async()
            .await;

        let mailer = HttpMailer::new(
            format!("{}/send", server.url()),
            "reports@example.com",
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(matches!(
            mailer.send(&digest(Vec::new())).await,
            Err(NotificationError::Delivery(_))
        ));
    }
}
