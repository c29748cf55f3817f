//! 다이제스트 메일 본문 요약.
//!
//! 24시간 변화율의 평균, 최고/최저 자산, 데이터 표를 계산해 HTML 본문을
//! 만듭니다. 변화율이 없는 자산은 통계에서 제외되지만 표에는 포함됩니다.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use feed_core::CryptoCurrency;

/// 평균 변화율이 양수일 때의 색상.
pub const TREND_UP_COLOR: &str = "#28a745";
/// 평균 변화율이 0 이하일 때의 색상.
pub const TREND_DOWN_COLOR: &str = "#dc3545";

/// 24시간 변화율 기준 자산 한 건.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mover {
    /// 자산 이름
    pub name: String,
    /// 24시간 변화율 (%)
    pub change_pct: Decimal,
}

/// 다이제스트 요약.
#[derive(Debug, Clone, PartialEq)]
pub struct DigestSummary {
    /// 기준 날짜
    pub date: NaiveDate,
    /// 평균 24시간 변화율 (소수점 둘째 자리 반올림)
    pub average_change: Decimal,
    /// 가장 많이 오른 자산
    pub winner: Mover,
    /// 가장 많이 내린 자산
    pub loser: Mover,
    /// 표에 들어갈 행 (이름, 현재가, 변화율)
    rows: Vec<(String, Decimal, Option<Decimal>)>,
}

impl DigestSummary {
    /// 레코드로부터 요약을 계산합니다.
    ///
    /// 변화율이 있는 자산이 하나도 없으면 `None`을 반환합니다.
    pub fn from_records(records: &[CryptoCurrency], date: NaiveDate) -> Option<Self> {
        let movers: Vec<(&CryptoCurrency, Decimal)> = records
            .iter()
            .filter_map(|c| c.price_change_percentage_24h.map(|pct| (c, pct)))
            .collect();

        let (first, rest) = movers.split_first()?;
        let mut winner = *first;
        let mut loser = *first;
        let mut total = first.1;
        for &(record, pct) in rest {
            // 동률이면 먼저 나온 자산을 유지
            if pct > winner.1 {
                winner = (record, pct);
            }
            if pct < loser.1 {
                loser = (record, pct);
            }
            total += pct;
        }

        let average_change = (total / Decimal::from(movers.len())).round_dp(2);

        Some(Self {
            date,
            average_change,
            winner: Mover {
                name: winner.0.name.clone(),
                change_pct: winner.1,
            },
            loser: Mover {
                name: loser.0.name.clone(),
                change_pct: loser.1,
            },
            rows: records
                .iter()
                .map(|c| {
                    (
                        c.name.clone(),
                        c.current_price,
                        c.price_change_percentage_24h,
                    )
                })
                .collect(),
        })
    }

    /// 평균 변화율에 따른 추세 색상.
    pub fn trend_color(&self) -> &'static str {
        if self.average_change > Decimal::ZERO {
            TREND_UP_COLOR
        } else {
            TREND_DOWN_COLOR
        }
    }

    /// 메일 제목.
    pub fn subject(&self) -> String {
        format!("Crypto Market Report - {}", self.date.format("%d %B %Y"))
    }

    /// 데이터 표 HTML.
    pub fn table_html(&self) -> String {
        let mut html = String::from(
            "<table class=\"data-table\"><thead><tr>\
             <th>name</th><th>current_price</th><th>price_change_percentage_24h</th>\
             </tr></thead><tbody>",
        );
        for (name, price, pct) in &self.rows {
            let pct = pct.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(name),
                price,
                pct
            ));
        }
        html.push_str("</tbody></table>");
        html
    }

    /// 메일 본문 HTML. `graph_cid`는 첨부된 그래프 이미지의 Content-ID입니다.
    pub fn render_html(&self, graph_cid: &str) -> String {
        format!(
            "<html><body>\
             <h2>Crypto Market Report</h2>\
             <p>{date}</p>\
             <p>Average 24h change: <strong style=\"color:{color}\">{average:.2}%</strong></p>\
             <p>Top gainer: <strong>{winner}</strong> ({winner_pct:.2}%)</p>\
             <p>Top loser: <strong>{loser}</strong> ({loser_pct:.2}%)</p>\
             <img src=\"cid:{cid}\" alt=\"24h change\"/>\
             {table}\
             </body></html>",
            date = self.date.format("%d %B %Y"),
            color = self.trend_color(),
            average = self.average_change,
            winner = escape_html(&self.winner.name),
            winner_pct = self.winner.change_pct,
            loser = escape_html(&self.loser.name),
            loser_pct = self.loser.change_pct,
            cid = escape_html(graph_cid),
            table = self.table_html(),
        )
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
