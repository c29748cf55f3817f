//! 시세 스냅샷과 가격 히스토리 타입.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 시세 스냅샷의 자산 한 건.
///
/// 필드 구성은 CoinGecko `coins/markets` 응답을 따릅니다. 상류 API가
/// `null`을 보내는 금액 필드는 `Option`입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoCurrency {
    /// 자산 ID (예: "bitcoin")
    pub id: String,
    /// 티커 심볼 (예: "btc")
    pub symbol: String,
    /// 표시 이름
    pub name: String,
    /// 아이콘 URL
    #[serde(default)]
    pub image: String,
    /// 현재가
    pub current_price: Decimal,
    /// 시가총액
    #[serde(default)]
    pub market_cap: Option<Decimal>,
    /// 시가총액 순위
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
    /// 완전 희석 가치
    #[serde(default)]
    pub fully_diluted_valuation: Option<Decimal>,
    /// 24시간 거래대금
    #[serde(default)]
    pub total_volume: Option<Decimal>,
    /// 24시간 최고가
    #[serde(default)]
    pub high_24h: Option<Decimal>,
    /// 24시간 최저가
    #[serde(default)]
    pub low_24h: Option<Decimal>,
    /// 24시간 가격 변화
    #[serde(default)]
    pub price_change_24h: Option<Decimal>,
    /// 24시간 변화율 (%)
    #[serde(default)]
    pub price_change_percentage_24h: Option<Decimal>,
    /// 상류 기준 마지막 갱신 시각 (ISO-8601)
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl CryptoCurrency {
    /// 금액 필드 전부에 환율 계수를 곱한 사본을 반환합니다.
    ///
    /// 변화율과 순위는 통화와 무관하므로 그대로 둡니다.
    pub fn converted(&self, factor: Decimal) -> Self {
        let scale = |v: Option<Decimal>| v.map(|d| d * factor);

        Self {
            current_price: self.current_price * factor,
            market_cap: scale(self.market_cap),
            fully_diluted_valuation: scale(self.fully_diluted_valuation),
            total_volume: scale(self.total_volume),
            high_24h: scale(self.high_24h),
            low_24h: scale(self.low_24h),
            price_change_24h: scale(self.price_change_24h),
            ..self.clone()
        }
    }

    /// 이 자산의 히스토리 포인트를 만듭니다.
    pub fn history_point(&self, timestamp: i64) -> HistoryPoint {
        HistoryPoint {
            id: self.id.clone(),
            timestamp,
            price: self.current_price,
        }
    }
}

/// 특정 시점의 자산 가격.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// 자산 ID
    pub id: String,
    /// Unix timestamp (초)
    pub timestamp: i64,
    /// 기준 통화 가격
    pub price: Decimal,
}

impl HistoryPoint {
    /// 환율 계수를 적용한 사본을 반환합니다.
    pub fn converted(&self, factor: Decimal) -> Self {
        Self {
            price: self.price * factor,
            ..self.clone()
        }
    }
}

/// 스냅샷 전체에서 갱신 한 번 분량의 히스토리 배치를 만듭니다.
pub fn history_batch(records: &[CryptoCurrency], timestamp: i64) -> Vec<HistoryPoint> {
    records.iter().map(|c| c.history_point(timestamp)).collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::record;
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_converted_scales_monetary_fields_only() {
        let btc = record("bitcoin", dec!(100));
        let eur = btc.converted(dec!(0.9));

        assert_eq!(eur.current_price, dec!(90.0));
        assert_eq!(eur.market_cap, Some(dec!(90000.0)));
        assert_eq!(eur.total_volume, Some(dec!(900.0)));
        assert_eq!(eur.price_change_24h, Some(dec!(0.9)));
        assert_eq!(eur.fully_diluted_valuation, None);
        // 비율/순위는 통화와 무관
        assert_eq!(eur.price_change_percentage_24h, btc.price_change_percentage_24h);
        assert_eq!(eur.market_cap_rank, btc.market_cap_rank);
    }

    #[test]
    fn test_deserialize_coingecko_shape() {
        let json = r#"{
            "id": "bitcoin", "symbol": "btc", "name": "Bitcoin",
            "image": "https://example.com/btc.png",
            "current_price": 67000.5, "market_cap": 1320000000000,
            "market_cap_rank": 1, "fully_diluted_valuation": null,
            "total_volume": 25000000000, "high_24h": 68000, "low_24h": 66000,
            "price_change_24h": -120.4, "price_change_percentage_24h": -0.18,
            "last_updated": "2024-05-01T12:00:00.000Z",
            "roi": null
        }"#;

        let parsed: CryptoCurrency = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.id, "bitcoin");
        assert_eq!(parsed.current_price, dec!(67000.5));
        assert_eq!(parsed.fully_diluted_valuation, None);
        assert_eq!(parsed.market_cap_rank, Some(1));
    }

    #[test]
    fn test_history_batch() {
        let records = vec![record("bitcoin", dec!(100)), record("ethereum", dec!(10))];
        let batch = history_batch(&records, 42);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].id, "ethereum");
        assert_eq!(batch[1].timestamp, 42);
        assert_eq!(batch[1].price, dec!(10));
    }
}
