use super::*;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate};
use fundamental_analysis::Scope;
use screener_core::{Decision, MetricId};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;

const QUARTER_ENDS: [&str; 12] = [
    "2024-12-31", "2024-09-30", "2024-06-30", "2024-03-31", "2023-12-31", "2023-09-30", "2023-06-30",
    "2023-03-31", "2022-12-31", "2022-09-30", "2022-06-30", "2022-03-31",
];

const INDUSTRIES: [(&str, &str); 4] = [
    ("Industrials", "Specialty Industrial Machinery"),
    ("Technology", "Software - Application"),
    ("Consumer Defensive", "Packaged Foods"),
    ("Healthcare", "Medical Devices"),
];

/// Deterministic fake provider. Ticker `Tnn` gets fundamentals shaped by `nn`.
#[derive(Default)]
struct MockProvider {
    permanent: HashSet<String>,
    slow: HashSet<String>,
    etfs: HashSet<String>,
    no_balance: HashSet<String>,
    prices_fail: bool,
    calls: AtomicUsize,
    price_requests: Mutex<HashMap<String, usize>>,
}

impl MockProvider {
    fn failing(mut self, tickers: &[&str]) -> Self {
        self.permanent = tickers.iter().map(|t| t.to_string()).collect();
        self
    }

    fn slow(mut self, tickers: &[&str]) -> Self {
        self.slow = tickers.iter().map(|t| t.to_string()).collect();
        self
    }

    fn etf(mut self, tickers: &[&str]) -> Self {
        self.etfs = tickers.iter().map(|t| t.to_string()).collect();
        self
    }

    fn without_balance_sheet(mut self, tickers: &[&str]) -> Self {
        self.no_balance = tickers.iter().map(|t| t.to_string()).collect();
        self
    }

    fn price_requests_for(&self, ticker: &str) -> usize {
        self.price_requests.lock().unwrap().get(ticker).copied().unwrap_or(0)
    }

    fn index(ticker: &str) -> f64 {
        ticker.trim_start_matches('T').parse::<f64>().unwrap_or(0.0)
    }

    fn profile(ticker: &str, is_etf: bool) -> Vec<Value> {
        let i = Self::index(ticker);
        let (sector, industry) = INDUSTRIES[i as usize % INDUSTRIES.len()];
        vec![json!({
            "symbol": ticker,
            "companyName": format!("{} Corp", ticker),
            "sector": sector,
            "industry": industry,
            "country": "US",
            "mktCap": 5_000.0 + 150.0 * i,
            "price": 50.0 + i,
            "isEtf": is_etf,
            "isFund": false,
        })]
    }

    fn income(ticker: &str) -> Vec<Value> {
        let i = Self::index(ticker);
        QUARTER_ENDS
            .iter()
            .enumerate()
            .map(|(q, date)| {
                let revenue = 1_000.0 + 10.0 * i - 8.0 * q as f64;
                let operating_income = revenue * (0.10 + 0.002 * i);
                let pretax = operating_income - 5.0;
                json!({
                    "date": date,
                    "revenue": revenue,
                    "costOfRevenue": revenue * (0.70 - 0.004 * i),
                    "grossProfit": revenue * (0.30 + 0.004 * i),
                    "sellingGeneralAndAdministrativeExpenses": revenue * 0.12,
                    "operatingIncome": operating_income,
                    "ebitda": operating_income + 20.0,
                    "interestExpense": 5.0,
                    "incomeBeforeTax": pretax,
                    "incomeTaxExpense": pretax * 0.21,
                    "netIncome": pretax * 0.79,
                    "weightedAverageShsOut": 100.0,
                    "weightedAverageShsOutDil": 101.0,
                })
            })
            .collect()
    }

    fn balance(ticker: &str) -> Vec<Value> {
        let i = Self::index(ticker);
        QUARTER_ENDS
            .iter()
            .map(|date| {
                json!({
                    "date": date,
                    "cashAndCashEquivalents": 200.0 + 3.0 * i,
                    "shortTermInvestments": 20.0,
                    "netReceivables": 300.0,
                    "totalCurrentAssets": 1_500.0,
                    "propertyPlantEquipmentNet": 1_000.0,
                    "goodwill": 100.0,
                    "intangibleAssets": 50.0,
                    "totalAssets": 4_000.0 + 20.0 * i,
                    "totalCurrentLiabilities": 800.0,
                    "shortTermDebt": 50.0,
                    "taxPayables": 10.0,
                    "totalDebt": 300.0 + 5.0 * i,
                    "totalLiabilities": 1_800.0,
                    "retainedEarnings": 1_000.0,
                    "totalStockholdersEquity": 2_000.0 + 10.0 * i,
                    "weightedAverageShsOut": 100.0,
                    "commonStockSharesOutstanding": 100.0,
                })
            })
            .collect()
    }

    fn cashflow(ticker: &str) -> Vec<Value> {
        let i = Self::index(ticker);
        QUARTER_ENDS
            .iter()
            .enumerate()
            .map(|(q, date)| {
                let revenue = 1_000.0 + 10.0 * i - 8.0 * q as f64;
                let net_income = (revenue * (0.10 + 0.002 * i) - 5.0) * 0.79;
                json!({
                    "date": date,
                    "netIncome": net_income,
                    "depreciationAndAmortization": 20.0,
                    "operatingCashFlow": net_income * 1.1,
                    "capitalExpenditure": -30.0,
                    "freeCashFlow": net_income * 1.1 - 30.0,
                    "dividendsPaid": -10.0,
                    "commonStockIssued": 0.0,
                    "commonStockRepurchased": -5.0,
                })
            })
            .collect()
    }

    fn prices(ticker: &str, days: usize) -> Vec<Value> {
        let slope = 0.05 + 0.01 * (Self::index(ticker) % 5.0);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
        (0..days)
            .rev()
            .map(|d| {
                let close = 40.0 + slope * d as f64;
                json!({
                    "date": (start + ChronoDuration::days(d as i64)).to_string(),
                    "open": close,
                    "high": close * 1.01,
                    "low": close * 0.99,
                    "close": close,
                    "volume": 1_000_000.0,
                })
            })
            .collect()
    }
}

#[async_trait]
impl StatementProvider for MockProvider {
    async fn fetch(&self, request: &StatementRequest) -> Result<Vec<Value>, ScreenerError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        let ticker = request.ticker.as_str();

        if self.slow.contains(ticker) {
            tokio::time::sleep(Duration::from_secs(3)).await;
        }
        if self.permanent.contains(ticker) {
            return Err(ScreenerError::Permanent(format!("unknown symbol {}", ticker)));
        }

        Ok(match request.kind {
            StatementKind::Profile => Self::profile(ticker, self.etfs.contains(ticker)),
            StatementKind::IncomeStatement => Self::income(ticker),
            StatementKind::BalanceSheet if self.no_balance.contains(ticker) => Vec::new(),
            StatementKind::BalanceSheet => Self::balance(ticker),
            StatementKind::CashFlow => Self::cashflow(ticker),
            StatementKind::PriceHistory => {
                *self.price_requests.lock().unwrap().entry(ticker.to_string()).or_insert(0) += 1;
                if self.prices_fail {
                    return Err(ScreenerError::Transient("503 Service Unavailable".into()));
                }
                Self::prices(ticker, request.limit)
            }
        })
    }
}

fn universe(n: usize) -> Vec<UniverseEntry> {
    (0..n).map(|i| UniverseEntry::new(&format!("T{:02}", i))).collect()
}

fn config() -> Arc<ScreenerConfig> {
    let mut config = ScreenerConfig::default();
    config.ingestion.max_concurrency = 4;
    config.ingestion.ticker_timeout_secs = 10;
    Arc::new(config)
}

#[tokio::test]
async fn test_full_run_with_permanent_failures() {
    let provider = Arc::new(MockProvider::default().failing(&["T03", "T17", "T41"]));
    let orchestrator = ScreeningOrchestrator::new(provider.clone(), config());

    let report = tokio_test::assert_ok!(orchestrator.run(universe(50)).await);

    assert_eq!(report.rows.len(), 50);
    assert_eq!(report.failures.total, 50);
    assert_eq!(report.failures.succeeded, 47);
    assert_eq!(report.failures.failed, 3);
    assert_eq!(report.failures.by_reason.get("permanent"), Some(&3));
    assert_eq!(report.count_decision(Decision::Error), 3);
    assert!(!report.cancelled);

    // Failures sink to the bottom, sorted by ticker
    let tail: Vec<&str> = report.rows[47..].iter().map(|r| r.ticker.as_str()).collect();
    assert_eq!(tail, vec!["T03", "T17", "T41"]);
    assert!(report.rows[47..].iter().all(|r| r.rank.is_none() && r.composite_score.is_none()));
    assert!(report.row("T17").unwrap().error.as_deref().unwrap().contains("unknown symbol"));

    // Failed tickers never enter the peer statistics
    let pe = report.normalized.universe_stats(MetricId::Pe).unwrap();
    assert_eq!(pe.population, 47);
    assert!(report.normalized.for_ticker("T03").is_none());

    // Ranked by composite, descending
    let scored = &report.rows[..47];
    for (i, pair) in scored.windows(2).enumerate() {
        let (a, b) = (pair[0].composite_score.unwrap(), pair[1].composite_score.unwrap());
        assert!(a >= b, "row {} out of order: {} < {}", i, a, b);
    }
    assert_eq!(scored[0].rank, Some(1));
    assert_eq!(scored[46].rank, Some(47));
    assert!(scored.iter().all(|r| r.technical_signal.is_some()));
}

#[tokio::test]
async fn test_industry_groups_are_used_when_large_enough() {
    let provider = Arc::new(MockProvider::default());
    let orchestrator = ScreeningOrchestrator::new(provider, config());

    let report = orchestrator.run(universe(20)).await.unwrap();

    // 20 tickers over 4 industries: 5 peers each
    let counts = report.normalized.scope_counts();
    assert!(counts.get(&Scope::Industry).copied().unwrap_or(0) > 0);
    let stats = report
        .normalized
        .group_stats(MetricId::Roe, "Software - Application")
        .unwrap();
    assert_eq!(stats.population, 5);
}

#[tokio::test]
async fn test_cancel_before_run_fails_every_ticker() {
    let provider = Arc::new(MockProvider::default());
    let orchestrator = ScreeningOrchestrator::new(provider.clone(), config());
    orchestrator.cancel_handle().cancel();

    let report = orchestrator.run(universe(10)).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.rows.len(), 10);
    assert_eq!(report.failures.succeeded, 0);
    assert_eq!(report.failures.by_reason.get("cancelled"), Some(&10));
    assert!(report.rows.iter().all(|r| r.decision == "ERROR"));
    assert_eq!(provider.calls.load(AtomicOrdering::SeqCst), 0);
}

#[tokio::test]
async fn test_shared_cancel_handle_is_honoured() {
    let provider = Arc::new(MockProvider::default());
    let cancel = CancelHandle::default();
    let orchestrator = ScreeningOrchestrator::new(provider.clone(), config()).with_cancel_handle(cancel.clone());
    cancel.cancel();

    let report = orchestrator.run(universe(3)).await.unwrap();

    assert!(report.cancelled);
    assert!(orchestrator.cancel_handle().is_cancelled());
    assert_eq!(report.failures.by_reason.get("cancelled"), Some(&3));
    assert_eq!(provider.calls.load(AtomicOrdering::SeqCst), 0);
}

#[tokio::test]
async fn test_slow_ticker_times_out() {
    let provider = Arc::new(MockProvider::default().slow(&["T02"]));
    let mut config = ScreenerConfig::default();
    config.ingestion.ticker_timeout_secs = 1;
    let orchestrator = ScreeningOrchestrator::new(provider, Arc::new(config));

    let report = orchestrator.run(universe(6)).await.unwrap();

    assert_eq!(report.failures.failed, 1);
    assert_eq!(report.failures.by_reason.get("timeout"), Some(&1));
    let slow = report.rows.last().unwrap();
    assert_eq!(slow.ticker, "T02");
    assert_eq!(slow.error.as_deref(), Some("Timed out after 1s"));
}

#[tokio::test]
async fn test_etf_profile_is_rejected() {
    let provider = Arc::new(MockProvider::default().etf(&["T04"]));
    let orchestrator = ScreeningOrchestrator::new(provider, config());

    let report = orchestrator.run(universe(8)).await.unwrap();

    assert_eq!(report.failures.by_reason.get("invalid_data"), Some(&1));
    let row = report.row("T04").unwrap();
    assert!(row.error.as_deref().unwrap().contains("ETF"));
}

#[tokio::test]
async fn test_empty_balance_sheet_is_scored_with_warnings() {
    let provider = Arc::new(MockProvider::default().without_balance_sheet(&["T05"]));
    let orchestrator = ScreeningOrchestrator::new(provider, config());

    let report = orchestrator.run(universe(8)).await.unwrap();

    assert_eq!(report.failures.failed, 0);
    let row = report.row("T05").unwrap();
    assert!(!row.is_error());
    assert_ne!(row.decision, "ERROR");
    assert_eq!(row.guardrail_status, "WARN");
    assert!(row.guardrail_reasons.contains("Dilution: insufficient data"));
    assert!(row.guardrail_reasons.contains("Data quality: only 0 quarters"));
    assert_eq!(row.dilution_pct, None);
    assert_eq!(row.piotroski_fscore, None);
    assert!(row.pe.is_some());
    assert!(row.rank.is_some());
}

#[tokio::test]
async fn test_quality_degradation_columns_are_filled() {
    let provider = Arc::new(MockProvider::default());
    let orchestrator = ScreeningOrchestrator::new(provider, config());

    let report = orchestrator.run(universe(4)).await.unwrap();

    for row in &report.rows {
        // P/B is about 2.5 across the fixture universe
        assert_eq!(row.quality_degradation_type.as_deref(), Some("GROWTH"));
        assert!(row.piotroski_fscore.is_some());
        assert!(row.mohanram_gscore_delta.is_some());
        assert_eq!(row.quality_degradation_score, row.mohanram_gscore);
    }
}

#[tokio::test]
async fn test_missing_prices_degrade_to_neutral_technical() {
    let provider = Arc::new(MockProvider {
        prices_fail: true,
        ..Default::default()
    });
    let orchestrator = ScreeningOrchestrator::new(provider, config());

    let report = orchestrator.run(universe(5)).await.unwrap();

    assert_eq!(report.failures.failed, 0);
    for row in &report.rows {
        assert_eq!(row.technical_score, Some(50.0));
        assert_eq!(row.technical_signal.as_deref(), Some("HOLD"));
        assert!(row.composite_score.is_some());
    }
}

#[tokio::test]
async fn test_sector_etf_fetched_once_per_sector() {
    let provider = Arc::new(MockProvider::default());
    let orchestrator = ScreeningOrchestrator::new(provider.clone(), config());

    orchestrator.run(universe(12)).await.unwrap();

    assert_eq!(provider.price_requests_for("XLI"), 1);
    assert_eq!(provider.price_requests_for("XLK"), 1);
    assert_eq!(provider.price_requests_for("XLP"), 1);
    assert_eq!(provider.price_requests_for("XLV"), 1);
    assert_eq!(provider.price_requests_for("T05"), 1);
}

#[tokio::test]
async fn test_technical_disabled_skips_prices() {
    let provider = Arc::new(MockProvider::default());
    let mut config = ScreenerConfig::default();
    config.technical.enabled = false;
    let orchestrator = ScreeningOrchestrator::new(provider.clone(), Arc::new(config));

    let report = orchestrator.run(universe(4)).await.unwrap();

    assert!(report.rows.iter().all(|r| r.technical_score.is_none()));
    assert_eq!(provider.price_requests.lock().unwrap().len(), 0);
}

#[tokio::test]
async fn test_qualitative_summaries_merge_by_ticker() {
    let provider = Arc::new(MockProvider::default());
    let source = StaticQualitativeSource::new(vec![QualitativeSummary {
        ticker: "T01".to_string(),
        premium: PremiumSignals {
            moat_assessment: Some("Wide".to_string()),
            ..Default::default()
        },
    }]);
    let orchestrator = ScreeningOrchestrator::new(provider, config()).with_qualitative(Arc::new(source));

    let report = orchestrator.run(universe(4)).await.unwrap();

    assert_eq!(report.row("T01").unwrap().moat_assessment.as_deref(), Some("Wide"));
    assert!(report.row("T02").unwrap().moat_assessment.is_none());
}

#[tokio::test]
async fn test_universe_hints_fill_missing_classification() {
    let entry = UniverseEntry::new("T00").with_classification("Industrials", "Machinery");
    let mut raw = RawFinancialRecord::default();
    raw.profile.sector = Some("Unknown".to_string());
    fill_classification(&mut raw, &entry);

    assert_eq!(raw.profile.sector.as_deref(), Some("Industrials"));
    assert_eq!(raw.profile.industry.as_deref(), Some("Machinery"));

    let mut raw = RawFinancialRecord::default();
    raw.profile.industry = Some("Banks - Regional".to_string());
    fill_classification(&mut raw, &UniverseEntry::new("T01"));
    assert_eq!(raw.profile.sector.as_deref(), Some("Financial Services"));
}

#[test]
fn test_rank_rows_ties_break_on_ticker() {
    let row = |ticker: &str, composite: Option<f64>| ScreenerRow {
        ticker: ticker.to_string(),
        composite_score: composite,
        ..Default::default()
    };
    let mut rows = vec![row("BBB", Some(60.0)), row("CCC", None), row("AAA", Some(60.0)), row("DDD", Some(75.0))];
    rank_rows(&mut rows);

    let order: Vec<&str> = rows.iter().map(|r| r.ticker.as_str()).collect();
    assert_eq!(order, vec!["DDD", "AAA", "BBB", "CCC"]);
    assert_eq!(rows[3].rank, Some(4));
}
