//! Quality-degradation checklists over trailing four-quarter windows.
//!
//! The Piotroski F-score (0-9) tracks value names, the Mohanram G-score (0-8)
//! tracks growth names. Each score is reported with its change against the
//! same score one year earlier. Neither feeds the composite score.
use screener_core::stats::{mean, population_std_dev};
use screener_core::{BalanceSheet, CashFlowStatement, DegradationType, IncomeStatement, MetricRecord};

use crate::metrics::share_count;

/// P/B under which a non-utility is treated as a value name.
pub const VALUE_PB_THRESHOLD: f64 = 1.5;

const GROWTH_ROA_PCT: f64 = 15.0;
const GROWTH_CFO_TO_ASSETS_PCT: f64 = 10.0;
const GROWTH_ROA_MAX_CV: f64 = 0.15;
const GROWTH_RND_PCT: f64 = 5.0;
const GROWTH_CAPEX_PCT: f64 = 5.0;
const GROWTH_REVENUE_PCT: f64 = 10.0;

/// Sums over four quarters plus the balance sheet at the start of the window.
/// Missing quarterly values count as zero.
#[derive(Debug, Clone)]
struct Window {
    net_income: f64,
    cfo: f64,
    revenue: f64,
    gross_profit: f64,
    research: f64,
    capex: f64,
    assets: f64,
    debt: f64,
    current_assets: f64,
    current_liabilities: f64,
    shares: Option<f64>,
    quarterly_roa: Vec<f64>,
}

impl Window {
    fn at(
        income: &[IncomeStatement],
        balance: &[BalanceSheet],
        cashflow: &[CashFlowStatement],
        start: usize,
    ) -> Option<Self> {
        let inc = income.get(start..start + 4)?;
        let bal = balance.get(start..start + 4)?;
        let cf = cashflow.get(start..start + 4)?;
        let b0 = &bal[0];

        let quarterly_roa = inc
            .iter()
            .zip(bal)
            .filter_map(|(q, b)| {
                let assets = b.total_assets.filter(|a| *a > 0.0)?;
                Some(q.net_income.unwrap_or(0.0) / assets * 100.0)
            })
            .collect();

        Some(Self {
            net_income: inc.iter().filter_map(|q| q.net_income).sum(),
            cfo: cf.iter().filter_map(|c| c.operating_cash_flow).sum(),
            revenue: inc.iter().filter_map(|q| q.revenue).sum(),
            gross_profit: inc.iter().filter_map(|q| q.gross_profit).sum(),
            research: inc.iter().filter_map(|q| q.research_and_development_expenses).sum(),
            capex: cf.iter().filter_map(|c| c.capital_expenditure).sum(),
            assets: b0.total_assets.unwrap_or(0.0),
            debt: b0.total_debt.unwrap_or(0.0),
            current_assets: b0.total_current_assets.unwrap_or(0.0),
            current_liabilities: b0.total_current_liabilities.unwrap_or(0.0),
            shares: share_count(Some(b0), None),
            quarterly_roa,
        })
    }

    fn roa(&self) -> Option<f64> {
        (self.assets > 0.0).then(|| self.net_income / self.assets)
    }

    fn current_ratio(&self) -> Option<f64> {
        (self.current_liabilities > 0.0).then(|| self.current_assets / self.current_liabilities)
    }

    fn gross_margin(&self) -> Option<f64> {
        (self.revenue > 0.0).then(|| self.gross_profit / self.revenue * 100.0)
    }

    fn asset_turnover(&self) -> Option<f64> {
        (self.revenue > 0.0 && self.assets > 0.0).then(|| self.revenue / self.assets)
    }
}

/// True when both sides are known and `now` beats `then`.
fn improved(now: Option<f64>, then: Option<f64>) -> bool {
    matches!((now, then), (Some(n), Some(t)) if n > t)
}

fn fscore(cur: &Window, prev: Option<&Window>) -> u8 {
    let mut signals = vec![
        cur.roa().is_some_and(|r| r > 0.0),
        cur.cfo > 0.0,
        cur.cfo > cur.net_income,
    ];
    if let Some(prev) = prev {
        signals.extend([
            improved(cur.roa(), prev.roa()),
            cur.debt < prev.debt,
            improved(cur.current_ratio(), prev.current_ratio()),
            matches!((cur.shares, prev.shares), (Some(n), Some(t)) if n <= t),
            improved(cur.gross_margin(), prev.gross_margin()),
            improved(cur.asset_turnover(), prev.asset_turnover()),
        ]);
    }
    signals.into_iter().filter(|s| *s).count() as u8
}

fn gscore(cur: &Window, prev: Option<&Window>) -> u8 {
    let mut signals = vec![
        cur.roa().is_some_and(|r| r * 100.0 > GROWTH_ROA_PCT),
        cur.assets > 0.0 && cur.cfo / cur.assets * 100.0 > GROWTH_CFO_TO_ASSETS_PCT,
        cur.revenue > 0.0 && cur.research / cur.revenue * 100.0 > GROWTH_RND_PCT,
        cur.revenue > 0.0 && cur.capex.abs() / cur.revenue * 100.0 > GROWTH_CAPEX_PCT,
        cur.cfo > cur.net_income,
    ];
    if let Some(prev) = prev {
        signals.extend([
            stable_roa(&cur.quarterly_roa),
            cur.revenue > 0.0
                && prev.revenue > 0.0
                && (cur.revenue / prev.revenue - 1.0) * 100.0 > GROWTH_REVENUE_PCT,
            improved(cur.gross_margin(), prev.gross_margin()),
        ]);
    }
    signals.into_iter().filter(|s| *s).count() as u8
}

/// Coefficient of variation of quarterly ROA under the growth threshold.
fn stable_roa(quarterly: &[f64]) -> bool {
    if quarterly.len() < 3 {
        return false;
    }
    let m = mean(quarterly);
    m != 0.0 && population_std_dev(quarterly) / m.abs() < GROWTH_ROA_MAX_CV
}

/// Score the latest year against the prior one, then the prior year against
/// the year before it (when on file). Needs eight quarters of every statement.
fn score_with_delta(
    income: &[IncomeStatement],
    balance: &[BalanceSheet],
    cashflow: &[CashFlowStatement],
    score: fn(&Window, Option<&Window>) -> u8,
) -> (Option<u8>, Option<i8>) {
    let (Some(year0), Some(year1)) = (
        Window::at(income, balance, cashflow, 0),
        Window::at(income, balance, cashflow, 4),
    ) else {
        return (None, None);
    };
    let year2 = Window::at(income, balance, cashflow, 8);

    let now = score(&year0, Some(&year1));
    let then = score(&year1, year2.as_ref());
    (Some(now), Some(now as i8 - then as i8))
}

/// Piotroski F-score and its change over one year.
pub fn piotroski(
    income: &[IncomeStatement],
    balance: &[BalanceSheet],
    cashflow: &[CashFlowStatement],
) -> (Option<u8>, Option<i8>) {
    score_with_delta(income, balance, cashflow, fscore)
}

/// Mohanram G-score and its change over one year.
pub fn mohanram(
    income: &[IncomeStatement],
    balance: &[BalanceSheet],
    cashflow: &[CashFlowStatement],
) -> (Option<u8>, Option<i8>) {
    score_with_delta(income, balance, cashflow, gscore)
}

/// Value names (cheap on book, or utilities) follow Piotroski, the rest Mohanram.
pub fn classify(pb: Option<f64>, is_utility: bool) -> DegradationType {
    if is_utility || pb.is_some_and(|pb| pb < VALUE_PB_THRESHOLD) {
        DegradationType::Value
    } else {
        DegradationType::Growth
    }
}

/// Fill every quality-degradation field on `record`. Reads `record.pb` and the
/// utility flag, so valuation must already be computed.
pub fn apply(
    record: &mut MetricRecord,
    income: &[IncomeStatement],
    balance: &[BalanceSheet],
    cashflow: &[CashFlowStatement],
) {
    (record.piotroski_fscore, record.piotroski_fscore_delta) = piotroski(income, balance, cashflow);
    (record.mohanram_gscore, record.mohanram_gscore_delta) = mohanram(income, balance, cashflow);

    let kind = classify(record.pb, record.flags.is_utility);
    record.quality_degradation_type = Some(kind);
    (record.quality_degradation_score, record.quality_degradation_delta) = match kind {
        DegradationType::Value => (record.piotroski_fscore, record.piotroski_fscore_delta),
        DegradationType::Growth => (record.mohanram_gscore, record.mohanram_gscore_delta),
    };
}
