use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ScreenerError;

/// OHLCV bar data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub vwap: Option<f64>,
}

/// Daily price row as returned by the historical price endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub vwap: Option<f64>,
}

impl PriceRecord {
    pub fn to_bar(&self) -> Option<Bar> {
        let timestamp = self.date.and_hms_opt(0, 0, 0)?.and_utc();
        Some(Bar {
            timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            vwap: self.vwap,
        })
    }
}

/// Decode provider price rows into bars ordered oldest first.
pub fn bars_from_records(records: &[serde_json::Value]) -> Result<Vec<Bar>, ScreenerError> {
    let mut bars = Vec::with_capacity(records.len());
    for record in records {
        let row: PriceRecord = serde_json::from_value(record.clone())?;
        if let Some(bar) = row.to_bar() {
            bars.push(bar);
        }
    }
    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

/// Provider endpoints the screener reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Profile,
    IncomeStatement,
    BalanceSheet,
    CashFlow,
    PriceHistory,
}

impl StatementKind {
    pub fn endpoint(&self) -> &'static str {
        match self {
            StatementKind::Profile => "profile",
            StatementKind::IncomeStatement => "income-statement",
            StatementKind::BalanceSheet => "balance-sheet-statement",
            StatementKind::CashFlow => "cash-flow-statement",
            StatementKind::PriceHistory => "historical-price-full",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Quarter,
    Annual,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Quarter => "quarter",
            Period::Annual => "annual",
        }
    }
}

/// One provider request: (ticker, statement type, period granularity, lookback limit).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatementRequest {
    pub ticker: String,
    pub kind: StatementKind,
    pub period: Period,
    pub limit: usize,
}

impl StatementRequest {
    pub fn new(ticker: &str, kind: StatementKind, period: Period, limit: usize) -> Self {
        Self {
            ticker: ticker.trim().to_uppercase(),
            kind,
            period,
            limit,
        }
    }

    pub fn quarterly(ticker: &str, kind: StatementKind, limit: usize) -> Self {
        Self::new(ticker, kind, Period::Quarter, limit)
    }

    pub fn profile(ticker: &str) -> Self {
        Self::new(ticker, StatementKind::Profile, Period::Annual, 1)
    }

    pub fn prices(ticker: &str, days: usize) -> Self {
        Self::new(ticker, StatementKind::PriceHistory, Period::Annual, days)
    }

    /// Query parameters that distinguish this request, sorted by name.
    pub fn params(&self) -> Vec<(String, String)> {
        match self.kind {
            StatementKind::Profile => vec![],
            StatementKind::PriceHistory => vec![("timeseries".to_string(), self.limit.to_string())],
            _ => vec![
                ("limit".to_string(), self.limit.to_string()),
                ("period".to_string(), self.period.as_str().to_string()),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompanyProfile {
    pub symbol: Option<String>,
    pub company_name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub country: Option<String>,
    pub mkt_cap: Option<f64>,
    pub price: Option<f64>,
    pub last_div: Option<f64>,
    pub is_etf: Option<bool>,
    pub is_fund: Option<bool>,
}

/// Quarterly income statement
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IncomeStatement {
    pub date: Option<NaiveDate>,
    pub revenue: Option<f64>,
    pub cost_of_revenue: Option<f64>,
    pub gross_profit: Option<f64>,
    pub operating_expenses: Option<f64>,
    pub research_and_development_expenses: Option<f64>,
    pub selling_general_and_administrative_expenses: Option<f64>,
    pub operating_income: Option<f64>,
    pub ebitda: Option<f64>,
    pub interest_expense: Option<f64>,
    pub income_before_tax: Option<f64>,
    pub income_tax_expense: Option<f64>,
    pub net_income: Option<f64>,
    pub weighted_average_shs_out: Option<f64>,
    pub weighted_average_shs_out_dil: Option<f64>,
}

/// Quarterly balance sheet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BalanceSheet {
    pub date: Option<NaiveDate>,
    pub cash_and_cash_equivalents: Option<f64>,
    pub short_term_investments: Option<f64>,
    pub net_receivables: Option<f64>,
    pub total_current_assets: Option<f64>,
    pub property_plant_equipment_net: Option<f64>,
    pub goodwill: Option<f64>,
    pub intangible_assets: Option<f64>,
    pub total_assets: Option<f64>,
    pub total_current_liabilities: Option<f64>,
    pub short_term_debt: Option<f64>,
    pub tax_payables: Option<f64>,
    pub total_debt: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub retained_earnings: Option<f64>,
    pub total_stockholders_equity: Option<f64>,
    pub weighted_average_shs_out: Option<f64>,
    pub common_stock_shares_outstanding: Option<f64>,
    pub weighted_average_shs_out_dil: Option<f64>,
}

/// Quarterly cash-flow statement
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CashFlowStatement {
    pub date: Option<NaiveDate>,
    pub net_income: Option<f64>,
    pub depreciation_and_amortization: Option<f64>,
    pub operating_cash_flow: Option<f64>,
    pub capital_expenditure: Option<f64>,
    pub free_cash_flow: Option<f64>,
    pub dividends_paid: Option<f64>,
    pub common_stock_issued: Option<f64>,
    pub common_stock_repurchased: Option<f64>,
}

/// Everything fetched for one ticker, statements ordered most recent first.
/// Lives only until metrics are derived from it.
#[derive(Debug, Clone, Default)]
pub struct RawFinancialRecord {
    pub ticker: String,
    pub profile: CompanyProfile,
    pub income: Vec<IncomeStatement>,
    pub balance: Vec<BalanceSheet>,
    pub cashflow: Vec<CashFlowStatement>,
}

impl RawFinancialRecord {
    /// Decode provider payloads. Statements are re-sorted newest first in case
    /// the provider returns them in another order.
    pub fn from_payloads(
        ticker: &str,
        profile: &[serde_json::Value],
        income: &[serde_json::Value],
        balance: &[serde_json::Value],
        cashflow: &[serde_json::Value],
    ) -> Result<Self, ScreenerError> {
        let profile = match profile.first() {
            Some(v) => serde_json::from_value(v.clone())?,
            None => CompanyProfile::default(),
        };
        let mut income: Vec<IncomeStatement> = decode_all(income)?;
        let mut balance: Vec<BalanceSheet> = decode_all(balance)?;
        let mut cashflow: Vec<CashFlowStatement> = decode_all(cashflow)?;
        income.sort_by(|a, b| b.date.cmp(&a.date));
        balance.sort_by(|a, b| b.date.cmp(&a.date));
        cashflow.sort_by(|a, b| b.date.cmp(&a.date));

        Ok(Self {
            ticker: ticker.to_uppercase(),
            profile,
            income,
            balance,
            cashflow,
        })
    }

    /// Date of the most recent statement on file.
    pub fn as_of(&self) -> Option<NaiveDate> {
        [
            self.income.first().and_then(|s| s.date),
            self.balance.first().and_then(|s| s.date),
            self.cashflow.first().and_then(|s| s.date),
        ]
        .into_iter()
        .flatten()
        .max()
    }

    /// Quarters for which all three statements are present.
    pub fn quarters_available(&self) -> usize {
        self.income
            .len()
            .min(self.balance.len())
            .min(self.cashflow.len())
    }

    /// True when at least one statement family returned rows.
    pub fn has_statements(&self) -> bool {
        !(self.income.is_empty() && self.balance.is_empty() && self.cashflow.is_empty())
    }
}

fn decode_all<T: serde::de::DeserializeOwned>(
    values: &[serde_json::Value],
) -> Result<Vec<T>, ScreenerError> {
    values
        .iter()
        .map(|v| serde_json::from_value(v.clone()).map_err(ScreenerError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_normalizes_ticker() {
        let req = StatementRequest::quarterly(" aapl ", StatementKind::BalanceSheet, 12);
        assert_eq!(req.ticker, "AAPL");
        assert_eq!(
            req.params(),
            vec![
                ("limit".to_string(), "12".to_string()),
                ("period".to_string(), "quarter".to_string())
            ]
        );
    }

    #[test]
    fn test_decode_sorts_newest_first() {
        let income = vec![
            json!({"date": "2023-12-31", "revenue": 90.0}),
            json!({"date": "2024-03-31", "revenue": 100.0, "weightedAverageShsOut": 1000}),
        ];
        let record = RawFinancialRecord::from_payloads(
            "abc",
            &[json!({"symbol": "ABC", "mktCap": 5.0e9, "sector": "Industrials"})],
            &income,
            &[],
            &[],
        )
        .unwrap();

        assert_eq!(record.ticker, "ABC");
        assert_eq!(record.income[0].revenue, Some(100.0));
        assert_eq!(record.income[0].weighted_average_shs_out, Some(1000.0));
        assert_eq!(record.profile.mkt_cap, Some(5.0e9));
        assert_eq!(record.quarters_available(), 0);
        assert!(record.has_statements());
        assert!(!RawFinancialRecord::default().has_statements());
        assert_eq!(record.as_of(), NaiveDate::from_ymd_opt(2024, 3, 31));
    }

    #[test]
    fn test_bars_from_records_oldest_first() {
        let rows = vec![
            json!({"date": "2024-01-03", "open": 2.0, "high": 2.0, "low": 2.0, "close": 2.0, "volume": 10.0}),
            json!({"date": "2024-01-02", "open": 1.0, "high": 1.0, "low": 1.0, "close": 1.0, "volume": 10.0}),
        ];
        let bars = bars_from_records(&rows).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 1.0);
        assert_eq!(bars[1].close, 2.0);
    }
}
