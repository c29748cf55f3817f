//! 환율 테이블과 통화 변환.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{FeedError, FeedResult};

/// 모든 가격이 저장되는 기준 통화.
pub const BASE_CURRENCY: &str = "usd";

/// 기준 통화 대비 환율 테이블 (소문자 통화 코드 → 환율).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeRateTable(BTreeMap<String, Decimal>);

impl ExchangeRateTable {
    /// 새 테이블을 생성합니다. 키는 소문자로 정규화됩니다.
    pub fn new(rates: impl IntoIterator<Item = (String, Decimal)>) -> Self {
        Self(
            rates
                .into_iter()
                .map(|(code, rate)| (code.to_lowercase(), rate))
                .collect(),
        )
    }

    /// 통화의 환율 계수를 조회합니다.
    ///
    /// 기준 통화는 테이블 내용과 무관하게 항상 1입니다.
    pub fn factor(&self, currency: &str) -> FeedResult<Decimal> {
        let code = currency.to_lowercase();
        if code == BASE_CURRENCY {
            return Ok(Decimal::ONE);
        }

        self.0
            .get(&code)
            .copied()
            .ok_or(FeedError::UnknownCurrency(code))
    }

    /// 테이블이 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 등록된 통화 수.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// 목록 형태로 변환합니다 (통화 코드 순).
    pub fn to_rates(&self) -> Vec<ExchangeRate> {
        self.0
            .iter()
            .map(|(currency, rate)| ExchangeRate {
                currency: currency.clone(),
                rate: *rate,
            })
            .collect()
    }
}

/// 환율 한 건.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// 통화 코드 (소문자)
    pub currency: String,
    /// 기준 통화 1단위 대비 환율
    pub rate: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn table() -> ExchangeRateTable {
        ExchangeRateTable::new([
            ("EUR".to_string(), dec!(0.92)),
            ("jpy".to_string(), dec!(151.3)),
        ])
    }

    #[test]
    fn test_factor_lookup() {
        let table = table();
        assert_eq!(table.factor("eur").unwrap(), dec!(0.92));
        assert_eq!(table.factor("JPY").unwrap(), dec!(151.3));
        assert_eq!(table.factor("USD").unwrap(), Decimal::ONE);
    }

    #[test]
    fn test_base_currency_without_table() {
        let empty = ExchangeRateTable::default();
        assert_eq!(empty.factor("usd").unwrap(), Decimal::ONE);
        assert!(matches!(
            empty.factor("eur"),
            Err(FeedError::UnknownCurrency(code)) if code == "eur"
        ));
    }

    #[test]
    fn test_transparent_serde() {
        let json = r#"{"eur": 0.92, "gbp": 0.79}"#;
        let parsed: ExchangeRateTable = serde_json::from_str(json).unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.to_rates()[0].currency, "eur");
        assert_eq!(parsed.to_rates()[1].rate, dec!(0.79));
    }
}
