//! CoinGecko 시세 Provider.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::MarketDataProvider;
use crate::error::{DataError, Result};
use feed_core::CryptoCurrency;

/// CoinGecko `coins/markets` 클라이언트.
pub struct CoinGeckoProvider {
    client: Client,
    base_url: String,
}

impl CoinGeckoProvider {
    /// 새 Provider를 생성합니다.
    ///
    /// # Arguments
    /// * `base_url` - API 기본 URL (예: "https://api.coingecko.com/api/v3")
    /// * `timeout` - 요청 타임아웃
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("crypto-feed/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DataError::FetchError(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MarketDataProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        "CoinGecko"
    }

    #[instrument(skip(self))]
    async fn fetch_top(&self, currency: &str, quantity: usize) -> Result<Vec<CryptoCurrency>> {
        let url = format!("{}/coins/markets", self.base_url);
        let per_page = quantity.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("vs_currency", currency),
                ("order", "market_cap_desc"),
                ("per_page", per_page.as_str()),
                ("page", "1"),
                ("sparkline", "false"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(DataError::FetchError("CoinGecko rate limit exceeded".to_string()));
        }
        if !status.is_success() {
            return Err(DataError::FetchError(format!("CoinGecko returned {}", status)));
        }

        let items: Vec<Value> = response.json().await?;

        let records: Vec<CryptoCurrency> = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<CryptoCurrency>(item) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed market record");
                    None
                }
            })
            .take(quantity)
            .collect();

        debug!(count = records.len(), "Fetched market records");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use rust_decimal_macros::dec;

    const MARKETS_BODY: &str = r#"[
        {"id":"bitcoin","symbol":"btc","name":"Bitcoin","image":"https://img/btc.png",
         "current_price":65000.5,"market_cap":1280000000000,"market_cap_rank":1,
         "fully_diluted_valuation":null,"total_volume":31000000000,"high_24h":66000,
         "low_24h":64000,"price_change_24h":-120.5,"price_change_percentage_24h":-0.18,
         "last_updated":"2024-05-01T12:00:00.000Z"},
        {"id":"broken","symbol":"brk","name":"Broken","current_price":null},
        {"id":"ethereum","symbol":"eth","name":"Ethereum","image":"https://img/eth.png",
         "current_price":3200,"market_cap":384000000000,"market_cap_rank":2,
         "total_volume":15000000000,"price_change_percentage_24h":1.25}
    ]"#;

    #[tokio::test]
    async fn test_fetch_top_parses_and_skips_malformed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/coins/markets")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("vs_currency".into(), "usd".into()),
                Matcher::UrlEncoded("per_page".into(), "50".into()),
                Matcher::UrlEncoded("order".into(), "market_cap_desc".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(MARKETS_BODY)
            .create_async()
            .await;

        let provider = CoinGeckoProvider::new(server.url(), Duration::from_secs(5)).unwrap();
        let records = provider.fetch_top("usd", 50).await.unwrap();

        mock.assert_async().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "bitcoin");
        assert_eq!(records[0].current_price, dec!(65000.5));
        assert_eq!(records[0].fully_diluted_valuation, None);
        assert_eq!(records[1].market_cap_rank, Some(2));
    }

    #[tokio::test]
    async fn test_rate_limit_is_fetch_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/coins/markets")
            .match_query(Matcher::Any)
            .with_status(429)
            .create_async()
            .await;

        let provider = CoinGeckoProvider::new(server.url(), Duration::from_secs(5)).unwrap();
        let err = provider.fetch_top("usd", 50).await.unwrap_err();

        assert!(matches!(err, DataError::FetchError(_)));
        assert!(err.is_transient());
    }
}
