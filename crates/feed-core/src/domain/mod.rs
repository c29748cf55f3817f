//! 도메인 모델.

pub mod exchange;
pub mod market;
pub mod subscriber;

pub use exchange::{ExchangeRate, ExchangeRateTable, BASE_CURRENCY};
pub use market::{history_batch, CryptoCurrency, HistoryPoint};
pub use subscriber::{normalize_email, MinuteBucket, Subscriber};
