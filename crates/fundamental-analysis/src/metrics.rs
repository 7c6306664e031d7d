use screener_core::stats::{cagr, mean, population_std_dev};
use screener_core::{
    BalanceSheet, CashFlowStatement, CompanyType, IncomeStatement, MetricRecord, RawFinancialRecord,
    SectorFlags,
};

use crate::degradation;
use crate::moat::{self, MoatTrends};

const DEFAULT_TAX_RATE: f64 = 0.21;
const DILUTION_CAP: f64 = 100.0;

/// Derives per-ticker ratios from raw statements. Pure and stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricComputer;

/// `num / den`, or `None` when the denominator is zero or negative.
fn ratio(num: Option<f64>, den: Option<f64>) -> Option<f64> {
    match (num, den) {
        (Some(n), Some(d)) if d > 0.0 && n.is_finite() && d.is_finite() => Some(n / d),
        _ => None,
    }
}

fn pct(value: Option<f64>) -> Option<f64> {
    value.map(|v| v * 100.0)
}

/// Trailing-twelve-month sum over the four most recent quarters.
/// Any missing quarter makes the sum not computable.
fn ttm<T>(rows: &[T], field: impl Fn(&T) -> Option<f64>) -> Option<f64> {
    if rows.len() < 4 {
        return None;
    }
    rows[..4].iter().map(field).sum()
}

/// TTM sum where a missing quarter counts as zero (cash returned to holders).
fn ttm_or_zero<T>(rows: &[T], field: impl Fn(&T) -> Option<f64>) -> Option<f64> {
    if rows.len() < 4 {
        return None;
    }
    Some(rows[..4].iter().map(|r| field(r).unwrap_or(0.0)).sum())
}

fn positive(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite() && *x > 0.0)
}

/// Effective tax rate from one quarter, 21% when it cannot be estimated.
fn tax_rate(q: Option<&IncomeStatement>) -> f64 {
    let Some(q) = q else {
        return DEFAULT_TAX_RATE;
    };
    match (q.income_tax_expense, q.income_before_tax) {
        (Some(tax), Some(pre)) if pre > 0.0 => {
            let rate = tax / pre;
            if (0.0..=1.0).contains(&rate) {
                rate
            } else {
                DEFAULT_TAX_RATE
            }
        }
        _ => DEFAULT_TAX_RATE,
    }
}

/// Net operating assets: total assets - cash - (total liabilities - total debt).
fn net_operating_assets(b: &BalanceSheet) -> Option<f64> {
    let assets = b.total_assets?;
    let liabilities = b.total_liabilities?;
    let cash = b.cash_and_cash_equivalents.unwrap_or(0.0);
    let debt = b.total_debt.unwrap_or(0.0);
    Some(assets - cash - (liabilities - debt))
}

fn free_cash_flow(c: &CashFlowStatement) -> Option<f64> {
    c.free_cash_flow.or_else(|| Some(c.operating_cash_flow? + c.capital_expenditure.unwrap_or(0.0)))
}

/// Share count at one point in time. First positive value of weighted-average
/// shares, then reported outstanding shares, then diluted weighted-average.
pub fn share_count(balance: Option<&BalanceSheet>, income: Option<&IncomeStatement>) -> Option<f64> {
    positive(balance.and_then(|b| b.weighted_average_shs_out))
        .or_else(|| positive(income.and_then(|i| i.weighted_average_shs_out)))
        .or_else(|| positive(balance.and_then(|b| b.common_stock_shares_outstanding)))
        .or_else(|| positive(balance.and_then(|b| b.weighted_average_shs_out_dil)))
        .or_else(|| positive(income.and_then(|i| i.weighted_average_shs_out_dil)))
}

/// Clamp a raw dilution percentage to [-100, 100].
pub fn cap_dilution(raw: f64) -> f64 {
    raw.clamp(-DILUTION_CAP, DILUTION_CAP)
}

impl MetricComputer {
    pub fn new() -> Self {
        Self
    }

    pub fn compute(&self, raw: &RawFinancialRecord) -> MetricRecord {
        let profile = &raw.profile;
        let sector = profile.sector.clone().unwrap_or_default();
        let industry = profile.industry.clone().unwrap_or_default();
        let flags = SectorFlags::classify(&sector, &industry);

        let income = raw.income.as_slice();
        let balance = raw.balance.as_slice();
        let cashflow = raw.cashflow.as_slice();
        let bal0 = balance.first();

        let market_cap = positive(profile.mkt_cap);
        let cash = bal0.and_then(|b| b.cash_and_cash_equivalents);
        let total_debt = bal0.and_then(|b| b.total_debt);
        let total_assets = bal0.and_then(|b| b.total_assets);
        let equity = bal0.and_then(|b| b.total_stockholders_equity);

        let ebit = ttm(income, |q| q.operating_income);
        let ebitda = ttm(income, |q| q.ebitda);
        let revenue = ttm(income, |q| q.revenue);
        let gross_profit = ttm(income, |q| q.gross_profit);
        let net_income = ttm(income, |q| q.net_income);
        let interest = ttm(income, |q| q.interest_expense).map(f64::abs);
        let fcf = ttm(cashflow, free_cash_flow);
        let cfo = ttm(cashflow, |c| c.operating_cash_flow);
        let depreciation = ttm(cashflow, |c| c.depreciation_and_amortization);

        // EV = market cap + debt - cash - short-term investments
        let enterprise_value = market_cap.map(|mc| {
            let sti = bal0.and_then(|b| b.short_term_investments).unwrap_or(0.0);
            mc + total_debt.unwrap_or(0.0) - cash.unwrap_or(0.0) - sti
        });
        let ev = positive(enterprise_value);

        let mut record = MetricRecord {
            ticker: raw.ticker.clone(),
            name: profile.company_name.clone().unwrap_or_default(),
            sector,
            industry,
            country: profile.country.clone().unwrap_or_default(),
            as_of: raw.as_of(),
            flags,
            quarters_available: raw.quarters_available(),
            market_cap,
            ..Default::default()
        };

        // Valuation
        record.ev_ebit = ratio(ev, ebit);
        record.ev_fcf = ratio(ev, fcf);
        record.pe = ratio(market_cap, net_income);
        record.pb = ratio(market_cap, equity);
        let tangible_book = equity.map(|e| {
            e - bal0.and_then(|b| b.goodwill).unwrap_or(0.0) - bal0.and_then(|b| b.intangible_assets).unwrap_or(0.0)
        });
        record.p_tangible_book = ratio(market_cap, tangible_book);
        if flags.is_reit {
            let ffo = net_income.zip(depreciation).map(|(ni, da)| ni + da);
            record.p_ffo = ratio(market_cap, ffo);
        }

        let dividends = ttm_or_zero(cashflow, |c| c.dividends_paid).map(f64::abs);
        let buybacks = ttm_or_zero(cashflow, |c| c.common_stock_repurchased.map(|v| v.min(0.0))).map(f64::abs);
        let issued = ttm_or_zero(cashflow, |c| c.common_stock_issued.map(|v| v.max(0.0)));
        record.dividend_yield = pct(ratio(dividends, market_cap));
        let returned = match (dividends, buybacks, issued) {
            (Some(d), Some(b), Some(i)) => Some(d + b - i),
            _ => None,
        };
        record.shareholder_yield = pct(ratio(returned, market_cap));

        // Profitability
        let nopat = ebit.map(|e| e * (1.0 - tax_rate(income.first())));
        record.roic = pct(ratio(nopat, bal0.and_then(net_operating_assets)));

        let roic_quarterly = quarterly_roic(income, balance);
        if roic_quarterly.len() >= 3 {
            let recent = &roic_quarterly[..roic_quarterly.len().min(4)];
            record.roic_persistence = Some(population_std_dev(recent));
        }
        record.fcf_margin = pct(ratio(fcf, revenue));
        record.gross_profit_to_assets = pct(ratio(gross_profit, total_assets));
        record.cfo_to_net_income = ratio(cfo, net_income);
        if income.len() >= 12 {
            record.revenue_growth_3y = match (income[0].revenue, income[11].revenue) {
                (Some(latest), Some(earliest)) => cagr(latest, earliest, 3.0),
                _ => None,
            };
        }
        record.roe = pct(ratio(net_income, equity));
        record.roa = pct(ratio(net_income, total_assets));

        // Leverage
        let net_debt = total_debt.map(|d| d - cash.unwrap_or(0.0));
        record.net_debt_ebitda = ratio(net_debt, ebitda);
        record.interest_coverage = ratio(ebit, interest);

        record.dilution_pct = dilution_pct(income, balance);

        // Accounting quality
        if flags.company_type() == CompanyType::NonFinancial {
            record.altman_z = altman_z(bal0, revenue, ebit);
            record.accruals_noa = accruals_noa(balance, cashflow);
        }
        record.beneish_m = beneish_m(income, balance, cashflow);
        let (goodwill_growth, goodwill_to_assets) = acquisition_intensity(balance);
        record.goodwill_growth = goodwill_growth;
        record.goodwill_to_assets = goodwill_to_assets;

        degradation::apply(&mut record, income, balance, cashflow);

        let trends = MoatTrends {
            revenue_growth_3y: record.revenue_growth_3y,
            roic_trend: half_over_half_change(&roic_quarterly),
            margin_trend: half_over_half_change(&gross_margins(income)),
        };
        let roic_recent: Vec<f64> = roic_quarterly.iter().take(4).copied().collect();
        record.moat_score = moat::moat_score(
            moat::pricing_power(income),
            moat::operating_leverage(income),
            moat::roic_persistence_score(&roic_recent),
            trends,
        );

        record
    }
}

/// Quarterly ROIC (%) for up to eight quarters, newest first. Quarters with
/// non-positive NOA are skipped.
fn quarterly_roic(income: &[IncomeStatement], balance: &[BalanceSheet]) -> Vec<f64> {
    income
        .iter()
        .zip(balance.iter())
        .take(8)
        .filter_map(|(q, b)| {
            let nopat = q.operating_income? * (1.0 - tax_rate(Some(q)));
            pct(ratio(Some(nopat), net_operating_assets(b)))
        })
        .collect()
}

fn gross_margins(income: &[IncomeStatement]) -> Vec<f64> {
    income
        .iter()
        .take(8)
        .filter_map(|q| pct(ratio(q.gross_profit, q.revenue)))
        .collect()
}

/// Percent change of the recent four-quarter mean over the prior four.
fn half_over_half_change(series: &[f64]) -> Option<f64> {
    if series.len() < 8 {
        return None;
    }
    let recent = mean(&series[..4]);
    let prior = mean(&series[4..8]);
    if prior == 0.0 {
        return None;
    }
    Some((recent - prior) / prior.abs() * 100.0)
}

/// Share-count change between the latest quarter and four quarters back, capped.
fn dilution_pct(income: &[IncomeStatement], balance: &[BalanceSheet]) -> Option<f64> {
    // Needs five balance-sheet quarters even when the income statement carries share counts
    let now = share_count(Some(balance.first()?), income.first())?;
    let then = share_count(Some(balance.get(4)?), income.get(4))?;
    Some(cap_dilution((now - then) / then * 100.0))
}

/// Altman Z with book equity standing in for market value, on TTM EBIT and sales.
fn altman_z(bal: Option<&BalanceSheet>, revenue_ttm: Option<f64>, ebit_ttm: Option<f64>) -> Option<f64> {
    let b = bal?;
    let ta = positive(b.total_assets)?;
    let working_capital = b.total_current_assets? - b.total_current_liabilities?;
    let retained = b.retained_earnings.unwrap_or(0.0);
    let liabilities = b.total_liabilities.unwrap_or(0.0);
    let equity = b.total_stockholders_equity.unwrap_or(0.0);

    let x1 = working_capital / ta;
    let x2 = retained / ta;
    let x3 = ebit_ttm? / ta;
    let x4 = if liabilities > 0.0 { equity / liabilities } else { 0.0 };
    let x5 = revenue_ttm? / ta;
    Some(1.2 * x1 + 1.4 * x2 + 3.3 * x3 + 0.6 * x4 + 1.0 * x5)
}

/// Beneish M-score comparing the latest quarter with the same quarter a year earlier.
fn beneish_m(income: &[IncomeStatement], balance: &[BalanceSheet], cashflow: &[CashFlowStatement]) -> Option<f64> {
    let (inc_t, inc_p) = (income.first()?, income.get(4)?);
    let (bal_t, bal_p) = (balance.first()?, balance.get(4)?);
    let cf_t = cashflow.first()?;
    let cf_p = cashflow.get(4)?;

    let sales_t = positive(inc_t.revenue)?;
    let sales_p = positive(inc_p.revenue)?;
    let ta_t = positive(bal_t.total_assets)?;
    let ta_p = positive(bal_p.total_assets)?;
    let v = |x: Option<f64>| x.unwrap_or(0.0);

    let rec_t = v(bal_t.net_receivables);
    let rec_p = v(bal_p.net_receivables);
    let dsri = if rec_p > 0.0 { (rec_t / sales_t) / (rec_p / sales_p) } else { 1.0 };

    let gm_t = v(inc_t.gross_profit) / sales_t;
    let gm_p = v(inc_p.gross_profit) / sales_p;
    let gmi = if gm_t > 0.0 { gm_p / gm_t } else { 1.0 };

    let aq = |b: &BalanceSheet, ta: f64| 1.0 - (v(b.total_current_assets) + v(b.property_plant_equipment_net)) / ta;
    let aq_t = aq(bal_t, ta_t);
    let aq_p = aq(bal_p, ta_p);
    let aqi = if aq_p != 0.0 { aq_t / aq_p } else { 1.0 };

    let sgi = sales_t / sales_p;

    let dep_rate = |c: &CashFlowStatement, b: &BalanceSheet| {
        let d = v(c.depreciation_and_amortization);
        let base = v(b.property_plant_equipment_net) + d;
        if base > 0.0 { d / base } else { 0.0 }
    };
    let dep_t = dep_rate(cf_t, bal_t);
    let dep_p = dep_rate(cf_p, bal_p);
    let depi = if dep_t > 0.0 { dep_p / dep_t } else { 1.0 };

    let sga = |q: &IncomeStatement| q.selling_general_and_administrative_expenses.or(q.operating_expenses).unwrap_or(0.0);
    let sga_p = sga(inc_p);
    let sgai = if sga_p > 0.0 { (sga(inc_t) / sales_t) / (sga_p / sales_p) } else { 1.0 };

    let tata = (v(inc_t.net_income) - v(cf_t.operating_cash_flow) - v(cf_t.capital_expenditure)) / ta_t;

    let tl_p = v(bal_p.total_liabilities);
    let lvgi = if tl_p > 0.0 { (v(bal_t.total_liabilities) / ta_t) / (tl_p / ta_p) } else { 1.0 };

    Some(
        -4.84 + 0.920 * dsri + 0.528 * gmi + 0.404 * aqi + 0.892 * sgi + 0.115 * depi - 0.172 * sgai
            + 4.679 * tata
            - 0.327 * lvgi,
    )
}

/// Sloan accruals over net operating assets (%), quarter over quarter.
fn accruals_noa(balance: &[BalanceSheet], cashflow: &[CashFlowStatement]) -> Option<f64> {
    let (b0, b1) = (balance.first()?, balance.get(1)?);
    let cf = cashflow.first()?;
    let d = |f: fn(&BalanceSheet) -> Option<f64>| f(b0).unwrap_or(0.0) - f(b1).unwrap_or(0.0);

    let accruals = d(|b| b.total_current_assets) - d(|b| b.cash_and_cash_equivalents) - d(|b| b.total_current_liabilities)
        + d(|b| b.short_term_debt)
        + d(|b| b.tax_payables)
        - cf.depreciation_and_amortization.unwrap_or(0.0);

    pct(ratio(Some(accruals), net_operating_assets(b0)))
}

/// (goodwill+intangibles growth over four quarters %, goodwill+intangibles share of assets %).
fn acquisition_intensity(balance: &[BalanceSheet]) -> (Option<f64>, Option<f64>) {
    let intangibles = |b: &BalanceSheet| b.goodwill.unwrap_or(0.0) + b.intangible_assets.unwrap_or(0.0);
    let Some(b0) = balance.first() else {
        return (None, None);
    };
    let share = pct(ratio(Some(intangibles(b0)), b0.total_assets));
    let growth = balance
        .get(4)
        .and_then(|b4| pct(ratio(Some(intangibles(b0) - intangibles(b4)), Some(intangibles(b4)))));
    (growth, share)
}
