//! 환율 Provider.
//!
//! `{"date": "...", "usd": {"eur": 0.92, ...}}` 형태의 공개 환율 JSON을
//! 읽습니다. 숫자가 아닌 항목은 건너뜁니다.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::ExchangeRateProvider;
use crate::error::{DataError, Result};
use feed_core::{ExchangeRateTable, BASE_CURRENCY};

/// 환율 API 클라이언트.
pub struct ExchangeRateApiProvider {
    client: Client,
    url: String,
}

impl ExchangeRateApiProvider {
    /// 새 Provider를 생성합니다.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataError::FetchError(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ExchangeRateProvider for ExchangeRateApiProvider {
    fn name(&self) -> &str {
        "ExchangeRateApi"
    }

    #[instrument(skip(self))]
    async fn fetch_rates(&self) -> Result<ExchangeRateTable> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DataError::FetchError(format!("Exchange rate API returned {}", status)));
        }

        let body: Value = response.json().await?;
        let Some(rates) = body.get(BASE_CURRENCY).and_then(Value::as_object) else {
            return Err(DataError::InvalidData(format!(
                "missing '{}' rate map",
                BASE_CURRENCY
            )));
        };

        let table = ExchangeRateTable::new(rates.iter().filter_map(|(code, value)| {
            match serde_json::from_value::<Decimal>(value.clone()) {
                Ok(rate) => Some((code.clone(), rate)),
                Err(e) => {
                    warn!(currency = %code, error = %e, "Skipping non-numeric rate");
                    None
                }
            }
        }));

        debug!(count = table.len(), "Fetched exchange rates");
        Ok(table)
    }
}
