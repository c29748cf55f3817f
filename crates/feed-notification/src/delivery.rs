//! 예약 다이제스트 발송 큐.
//!
//! `DeliveryCollector`가 주기적으로 현재 UTC 분 버킷의 구독자를 모아 채널에
//! 넣고, `DeliveryWorker`가 배치 단위로 리포트를 렌더링해 메일을 보냅니다.
//! 같은 분 버킷은 폴링 횟수와 관계없이 한 번만 큐에 들어갑니다.

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::subscription::SubscriberRegistry;
use crate::summary::DigestSummary;
use crate::types::{
    DigestMail, MailAttachment, Mailer, NotificationError, NotificationResult, ReportArtifact,
    ReportKind, Renderer,
};
use feed_core::{CryptoCurrency, MinuteBucket, PeriodicTask, Subscriber, BASE_CURRENCY};
use feed_data::MarketDataCache;

/// 발송 큐 용량.
pub const DELIVERY_QUEUE_CAPACITY: usize = 64;

/// 본문에 포함되는 그래프 이미지의 Content-ID.
pub const GRAPH_CONTENT_ID: &str = "bar_graph";

/// 한 분 버킷에 발송할 구독자 묶음.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryBatch {
    /// 대상 분 버킷
    pub bucket: MinuteBucket,
    /// 수신자
    pub subscribers: Vec<Subscriber>,
}

impl DeliveryBatch {
    /// 수신자 이메일 목록.
    pub fn recipients(&self) -> Vec<String> {
        self.subscribers.iter().map(|s| s.email.clone()).collect()
    }
}

/// 발송 대상 수집기.
pub struct DeliveryCollector {
    registry: Arc<SubscriberRegistry>,
    sender: mpsc::Sender<DeliveryBatch>,
    last_bucket: Mutex<Option<MinuteBucket>>,
}

impl DeliveryCollector {
    /// 새 수집기를 생성합니다.
    pub fn new(registry: Arc<SubscriberRegistry>, sender: mpsc::Sender<DeliveryBatch>) -> Self {
        Self {
            registry,
            sender,
            last_bucket: Mutex::new(None),
        }
    }

    /// 한 번 폴링합니다. 큐에 넣은 구독자 수를 반환합니다.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> usize {
        let bucket = MinuteBucket::of(now);

        {
            let mut last = self.last_bucket.lock().await;
            if *last == Some(bucket) {
                return 0;
            }
            *last = Some(bucket);
        }

        let subscribers = self.registry.due(&bucket).await;
        if subscribers.is_empty() {
            debug!(%bucket, "No subscribers due");
            return 0;
        }

        let count = subscribers.len();
        match self.sender.send(DeliveryBatch { bucket, subscribers }).await {
            Ok(()) => {
                info!(%bucket, recipients = count, "Delivery batch enqueued");
                count
            }
            Err(_) => {
                warn!(%bucket, "Delivery queue closed, batch discarded");
                0
            }
        }
    }

    /// 주기 작업으로 실행합니다.
    pub fn start(
        self: Arc<Self>,
        period: Duration,
        shutdown_token: CancellationToken,
    ) -> JoinHandle<()> {
        PeriodicTask::new("delivery_collector", period, shutdown_token).spawn(move || {
            let collector = Arc::clone(&self);
            async move {
                collector.poll_once(Utc::now()).await;
            }
        })
    }
}

/// 다이제스트 발송 워커.
pub struct DeliveryWorker {
    cache: Arc<MarketDataCache>,
    renderer: Arc<dyn Renderer>,
    mailer: Arc<dyn Mailer>,
    temp_dir: PathBuf,
    digest_quantity: usize,
    timeout: Duration,
}

impl DeliveryWorker {
    /// 새 워커를 생성합니다.
    pub fn new(
        cache: Arc<MarketDataCache>,
        renderer: Arc<dyn Renderer>,
        mailer: Arc<dyn Mailer>,
        temp_dir: impl Into<PathBuf>,
        digest_quantity: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            cache,
            renderer,
            mailer,
            temp_dir: temp_dir.into(),
            digest_quantity: digest_quantity.max(1),
            timeout,
        }
    }

    /// 배치 하나를 처리합니다.
    ///
    /// 임시 파일은 성공/실패와 관계없이 삭제됩니다.
    pub async fn process(&self, batch: &DeliveryBatch) -> NotificationResult<()> {
        let records = self.cache.get_snapshot().await?;
        if records.is_empty() {
            return Err(NotificationError::Render(
                "시세 스냅샷이 비어 있습니다".to_string(),
            ));
        }

        let work_dir = self.temp_dir.join(format!("digest-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&work_dir).await?;

        let result = self.deliver(batch, &records, &work_dir).await;

        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            warn!(dir = %work_dir.display(), error = %e, "Failed to remove temp artifacts");
        }

        result
    }

    async fn deliver(
        &self,
        batch: &DeliveryBatch,
        records: &[CryptoCurrency],
        work_dir: &Path,
    ) -> NotificationResult<()> {
        let artifacts = try_join_all(ReportKind::ALL.into_iter().map(|kind| {
            let dataset = &records[..kind.quantity().min(records.len())];
            with_timeout(
                self.timeout,
                "renderer",
                self.renderer.render(kind, BASE_CURRENCY, dataset),
            )
        }))
        .await?;

        let mut attachments = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            attachments.push(write_artifact(work_dir, artifact).await?);
        }

        let digest = &records[..self.digest_quantity.min(records.len())];
        let summary = DigestSummary::from_records(digest, batch.bucket.start().date_naive())
            .ok_or_else(|| {
                NotificationError::Render("요약할 변화율 데이터가 없습니다".to_string())
            })?;

        let mail = DigestMail {
            recipients: batch.recipients(),
            subject: summary.subject(),
            html_body: summary.render_html(GRAPH_CONTENT_ID),
            attachments,
        };

        with_timeout(self.timeout, "mailer", self.mailer.send(&mail)).await?;

        info!(
            bucket = %batch.bucket,
            recipients = mail.recipients.len(),
            attachments = mail.attachments.len(),
            "Digest delivered"
        );
        Ok(())
    }

    /// 채널이 닫히거나 취소될 때까지 배치를 처리합니다.
    ///
    /// 실패한 배치는 로그만 남기고 버립니다.
    pub async fn run(
        self,
        mut receiver: mpsc::Receiver<DeliveryBatch>,
        shutdown_token: CancellationToken,
    ) {
        info!("Delivery worker started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_token.cancelled() => {
                    debug!("Delivery worker received shutdown signal");
                    break;
                }
                batch = receiver.recv() => {
                    let Some(batch) = batch else {
                        debug!("Delivery queue closed");
                        break;
                    };
                    if let Err(e) = self.process(&batch).await {
                        error!(
                            bucket = %batch.bucket,
                            recipients = batch.subscribers.len(),
                            error = %e,
                            "Digest delivery failed, batch dropped"
                        );
                    }
                }
            }
        }

        info!("Delivery worker stopped");
    }

    /// 런타임에 워커를 spawn합니다.
    pub fn spawn(
        self,
        receiver: mpsc::Receiver<DeliveryBatch>,
        shutdown_token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(receiver, shutdown_token))
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    what: &str,
    fut: impl Future<Output = NotificationResult<T>>,
) -> NotificationResult<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| NotificationError::Timeout(format!("{} ({:?})", what, timeout)))?
}

async fn write_artifact(dir: &Path, artifact: ReportArtifact) -> NotificationResult<MailAttachment> {
    let path = dir.join(&artifact.filename);
    tokio::fs::write(&path, &artifact.content).await?;

    Ok(MailAttachment {
        content_id: (artifact.kind == ReportKind::Graph).then(|| GRAPH_CONTENT_ID.to_string()),
        filename: artifact.filename,
        content_type: artifact.content_type,
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use feed_data::{CacheSettings, MemoryStore};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, second).unwrap()
    }

    fn record(id: &str, price: Decimal, pct: Decimal) -> CryptoCurrency {
        CryptoCurrency {
            id: id.to_string(),
            symbol: id.to_string(),
            name: id.to_string(),
            image: String::new(),
            current_price: price,
            market_cap: None,
            market_cap_rank: None,
            fully_diluted_valuation: None,
            total_volume: None,
            high_24h: None,
            low_24h: None,
            price_change_24h: None,
            price_change_percentage_24h: Some(pct),
            last_updated: None,
        }
    }

    #[tokio::test]
    async fn test_one_enqueue_per_matching_minute() {
        let registry = Arc::new(SubscriberRegistry::new());
        registry.add(Subscriber::new("a@b.com", 9, 30)).await;
        let (tx, mut rx) = mpsc::channel(8);
        let collector = DeliveryCollector::new(registry, tx);

        // 같은 분에 여러 번 폴링
        assert_eq!(collector.poll_once(at(9, 30, 0)).await, 1);
        assert_eq!(collector.poll_once(at(9, 30, 10)).await, 0);
        assert_eq!(collector.poll_once(at(9, 30, 50)).await, 0);
        // 다음 분에는 대상 없음
        assert_eq!(collector.poll_once(at(9, 31, 0)).await, 0);

        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.bucket, MinuteBucket::of(at(9, 30, 0)));
        assert_eq!(batch.recipients(), vec!["a@b.com".to_string()]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_queue_discards_batch() {
        let registry = Arc::new(SubscriberRegistry::new());
        registry.add(Subscriber::new("a@b.com", 9, 30)).await;
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let collector = DeliveryCollector::new(registry, tx);
        assert_eq!(collector.poll_once(at(9, 30, 0)).await, 0);
    }

    struct StubRenderer {
        fail: bool,
    }

    #[async_trait]
    impl Renderer for StubRenderer {
        async fn render(
            &self,
            kind: ReportKind,
            currency: &str,
            records: &[CryptoCurrency],
        ) -> NotificationResult<ReportArtifact> {
            if self.fail && kind == ReportKind::Trend {
                return Err(NotificationError::Render("trend failed".to_string()));
            }
            Ok(ReportArtifact {
                kind,
                filename: kind.default_filename(currency),
                content_type: kind.content_type().to_string(),
                content: format!("{}:{}", kind, records.len()).into_bytes(),
            })
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    /// 발송 시점에 첨부 파일 내용을 읽어 기록합니다.
    #[derive(Default)]
    struct RecordingMailer {
        sent: StdMutex<Vec<(DigestMail, Vec<Vec<u8>>)>>,
        calls: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, mail: &DigestMail) -> NotificationResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && call == 0 {
                return Err(NotificationError::Delivery("relay down".to_string()));
            }
            let contents = mail
                .attachments
                .iter()
                .map(|a| std::fs::read(&a.path).unwrap())
                .collect();
            self.sent.lock().unwrap().push((mail.clone(), contents));
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    async fn seeded_cache() -> Arc<MarketDataCache> {
        let cache = MarketDataCache::new(Arc::new(MemoryStore::new()), CacheSettings::default());
        let records: Vec<CryptoCurrency> = (0..20)
            .map(|i| record(&format!("coin{}", i), Decimal::from(100 - i), Decimal::from(i) - dec!(5)))
            .collect();
        cache.save_snapshot(&records).await.unwrap();
        Arc::new(cache)
    }

    fn batch() -> DeliveryBatch {
        DeliveryBatch {
            bucket: MinuteBucket::of(at(9, 30, 0)),
            subscribers: vec![Subscriber::new("a@b.com", 9, 30), Subscriber::new("c@d.com", 9, 30)],
        }
    }

    fn dir_is_empty(path: &Path) -> bool {
        std::fs::read_dir(path).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_worker_sends_digest_and_cleans_up() {
        let temp = tempfile::tempdir().unwrap();
        let mailer = Arc::new(RecordingMailer::default());
        let worker = DeliveryWorker::new(
            seeded_cache().await,
            Arc::new(StubRenderer { fail: false }),
            mailer.clone(),
            temp.path(),
            15,
            Duration::from_secs(5),
        );

        worker.process(&batch()).await.unwrap();

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (mail, contents) = &sent[0];
        assert_eq!(mail.recipients, vec!["a@b.com".to_string(), "c@d.com".to_string()]);
        assert_eq!(mail.attachments.len(), 4);
        assert_eq!(mail.attachments[0].content_id.as_deref(), Some(GRAPH_CONTENT_ID));
        assert!(mail.attachments[1..].iter().all(|a| a.content_id.is_none()));
        // 그래프는 15개, 시세 표는 스냅샷 전체(20개)
        assert_eq!(contents[0], b"graph:15");
        assert_eq!(contents[1], b"crypto:20");
        assert!(mail.html_body.contains("cid:bar_graph"));
        assert!(mail.subject.contains("01 May 2024"));

        assert!(dir_is_empty(temp.path()));
    }

    #[tokio::test]
    async fn test_render_failure_cleans_up_and_skips_mail() {
        let temp = tempfile::tempdir().unwrap();
        let mailer = Arc::new(RecordingMailer::default());
        let worker = DeliveryWorker::new(
            seeded_cache().await,
            Arc::new(StubRenderer { fail: true }),
            mailer.clone(),
            temp.path(),
            15,
            Duration::from_secs(5),
        );

        let err = worker.process(&batch()).await.unwrap_err();

        assert!(matches!(err, NotificationError::Render(_)));
        assert_eq!(mailer.calls.load(Ordering::SeqCst), 0);
        assert!(dir_is_empty(temp.path()));
    }

    #[tokio::test]
    async fn test_empty_snapshot_is_error() {
        let temp = tempfile::tempdir().unwrap();
        let cache = Arc::new(MarketDataCache::new(
            Arc::new(MemoryStore::new()),
            CacheSettings::default(),
        ));
        let worker = DeliveryWorker::new(
            cache,
            Arc::new(StubRenderer { fail: false }),
            Arc::new(RecordingMailer::default()),
            temp.path(),
            15,
            Duration::from_secs(5),
        );

        assert!(worker.process(&batch()).await.is_err());
        assert!(dir_is_empty(temp.path()));
    }

    #[tokio::test]
    async fn test_run_drops_failed_batch_and_continues() {
        let temp = tempfile::tempdir().unwrap();
        let mailer = Arc::new(RecordingMailer {
            fail_first: true,
            ..Default::default()
        });
        let worker = DeliveryWorker::new(
            seeded_cache().await,
            Arc::new(StubRenderer { fail: false }),
            mailer.clone(),
            temp.path(),
            15,
            Duration::from_secs(5),
        );

        let (tx, rx) = mpsc::channel(4);
        tx.send(batch()).await.unwrap();
        tx.send(batch()).await.unwrap();
        drop(tx);

        worker.run(rx, CancellationToken::new()).await;

        assert_eq!(mailer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
        assert!(dir_is_empty(temp.path()));
    }
}
