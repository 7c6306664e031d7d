use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Every metric that can feed a value or quality sub-score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricId {
    EvEbit,
    EvFcf,
    Pe,
    Pb,
    PTangibleBook,
    PFfo,
    DividendYield,
    ShareholderYield,
    Roic,
    RoicPersistence,
    FcfMargin,
    GrossProfitToAssets,
    CfoToNetIncome,
    RevenueGrowth3y,
    Roe,
    Roa,
    NetDebtEbitda,
    InterestCoverage,
    DilutionPct,
    MoatScore,
}

impl MetricId {
    pub const ALL: [MetricId; 20] = [
        MetricId::EvEbit,
        MetricId::EvFcf,
        MetricId::Pe,
        MetricId::Pb,
        MetricId::PTangibleBook,
        MetricId::PFfo,
        MetricId::DividendYield,
        MetricId::ShareholderYield,
        MetricId::Roic,
        MetricId::RoicPersistence,
        MetricId::FcfMargin,
        MetricId::GrossProfitToAssets,
        MetricId::CfoToNetIncome,
        MetricId::RevenueGrowth3y,
        MetricId::Roe,
        MetricId::Roa,
        MetricId::NetDebtEbitda,
        MetricId::InterestCoverage,
        MetricId::DilutionPct,
        MetricId::MoatScore,
    ];

    /// Column name used in the output dataset.
    pub fn name(&self) -> &'static str {
        match self {
            MetricId::EvEbit => "ev_ebit",
            MetricId::EvFcf => "ev_fcf",
            MetricId::Pe => "pe",
            MetricId::Pb => "pb",
            MetricId::PTangibleBook => "p_tangible_book",
            MetricId::PFfo => "p_ffo",
            MetricId::DividendYield => "dividend_yield_pct",
            MetricId::ShareholderYield => "shareholder_yield_pct",
            MetricId::Roic => "roic_pct",
            MetricId::RoicPersistence => "roic_persistence",
            MetricId::FcfMargin => "fcf_margin_pct",
            MetricId::GrossProfitToAssets => "gross_profit_to_assets_pct",
            MetricId::CfoToNetIncome => "cfo_to_net_income",
            MetricId::RevenueGrowth3y => "revenue_growth_3y_pct",
            MetricId::Roe => "roe_pct",
            MetricId::Roa => "roa_pct",
            MetricId::NetDebtEbitda => "net_debt_ebitda",
            MetricId::InterestCoverage => "interest_coverage",
            MetricId::DilutionPct => "dilution_pct",
            MetricId::MoatScore => "moat_score",
        }
    }

    /// Valuation multiples, leverage, ROIC volatility and dilution are "lower is better".
    pub fn higher_is_better(&self) -> bool {
        !matches!(
            self,
            MetricId::EvEbit
                | MetricId::EvFcf
                | MetricId::Pe
                | MetricId::Pb
                | MetricId::PTangibleBook
                | MetricId::PFfo
                | MetricId::RoicPersistence
                | MetricId::NetDebtEbitda
                | MetricId::DilutionPct
        )
    }

    /// EV-based metrics have no meaning for banks and insurers.
    pub fn is_enterprise_value_based(&self) -> bool {
        matches!(self, MetricId::EvEbit | MetricId::EvFcf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyType {
    NonFinancial,
    Financial,
    Reit,
    Utility,
}

const FINANCIAL_INDUSTRY_KEYWORDS: [&str; 7] = [
    "bank",
    "insurance",
    "asset management",
    "brokerage",
    "diversified financial",
    "credit services",
    "capital markets",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorFlags {
    pub is_financial: bool,
    pub is_reit: bool,
    pub is_utility: bool,
}

impl SectorFlags {
    /// Classify from the provider's free-text sector and industry labels.
    pub fn classify(sector: &str, industry: &str) -> Self {
        let sector = sector.to_lowercase();
        let industry = industry.to_lowercase();

        let is_reit = industry.contains("reit");
        let is_financial = !is_reit
            && (sector.contains("financial")
                || FINANCIAL_INDUSTRY_KEYWORDS
                    .iter()
                    .any(|kw| industry.contains(kw)));
        let is_utility = sector.contains("utilit");

        Self {
            is_financial,
            is_reit,
            is_utility,
        }
    }

    pub fn company_type(&self) -> CompanyType {
        if self.is_reit {
            CompanyType::Reit
        } else if self.is_financial {
            CompanyType::Financial
        } else if self.is_utility {
            CompanyType::Utility
        } else {
            CompanyType::NonFinancial
        }
    }
}

/// Derived per-ticker ratios. `None` means "not computable" (missing input or
/// a zero/negative denominator), never a placeholder number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricRecord {
    pub ticker: String,
    pub name: String,
    pub sector: String,
    pub industry: String,
    pub country: String,
    pub as_of: Option<NaiveDate>,
    pub flags: SectorFlags,
    pub quarters_available: usize,
    pub market_cap: Option<f64>,

    // Valuation
    pub ev_ebit: Option<f64>,
    pub ev_fcf: Option<f64>,
    pub pe: Option<f64>,
    pub pb: Option<f64>,
    pub p_tangible_book: Option<f64>,
    pub p_ffo: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub shareholder_yield: Option<f64>,

    // Profitability
    pub roic: Option<f64>,
    pub roic_persistence: Option<f64>,
    pub fcf_margin: Option<f64>,
    pub gross_profit_to_assets: Option<f64>,
    pub cfo_to_net_income: Option<f64>,
    pub revenue_growth_3y: Option<f64>,
    pub roe: Option<f64>,
    pub roa: Option<f64>,

    // Leverage
    pub net_debt_ebitda: Option<f64>,
    pub interest_coverage: Option<f64>,

    pub dilution_pct: Option<f64>,
    pub moat_score: Option<f64>,

    // Accounting quality inputs, read by the guardrails only
    pub altman_z: Option<f64>,
    pub beneish_m: Option<f64>,
    pub accruals_noa: Option<f64>,
    pub goodwill_growth: Option<f64>,
    pub goodwill_to_assets: Option<f64>,

    // Quality degradation, reported but not scored
    pub piotroski_fscore: Option<u8>,
    pub piotroski_fscore_delta: Option<i8>,
    pub mohanram_gscore: Option<u8>,
    pub mohanram_gscore_delta: Option<i8>,
    pub quality_degradation_type: Option<DegradationType>,
    pub quality_degradation_score: Option<u8>,
    pub quality_degradation_delta: Option<i8>,
}

/// Which checklist tracks quality degradation for a ticker: Piotroski for
/// value names, Mohanram for growth names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DegradationType {
    Value,
    Growth,
}

impl DegradationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradationType::Value => "VALUE",
            DegradationType::Growth => "GROWTH",
        }
    }
}

impl MetricRecord {
    /// Finite value of `metric`, if computable.
    pub fn get(&self, metric: MetricId) -> Option<f64> {
        self.raw(metric).filter(|v| v.is_finite())
    }

    /// Metric ids whose stored value is present but not a finite number.
    pub fn non_finite_metrics(&self) -> Vec<MetricId> {
        MetricId::ALL
            .iter()
            .copied()
            .filter(|m| self.raw(*m).is_some_and(|v| !v.is_finite()))
            .collect()
    }

    fn raw(&self, metric: MetricId) -> Option<f64> {
        match metric {
            MetricId::EvEbit => self.ev_ebit,
            MetricId::EvFcf => self.ev_fcf,
            MetricId::Pe => self.pe,
            MetricId::Pb => self.pb,
            MetricId::PTangibleBook => self.p_tangible_book,
            MetricId::PFfo => self.p_ffo,
            MetricId::DividendYield => self.dividend_yield,
            MetricId::ShareholderYield => self.shareholder_yield,
            MetricId::Roic => self.roic,
            MetricId::RoicPersistence => self.roic_persistence,
            MetricId::FcfMargin => self.fcf_margin,
            MetricId::GrossProfitToAssets => self.gross_profit_to_assets,
            MetricId::CfoToNetIncome => self.cfo_to_net_income,
            MetricId::RevenueGrowth3y => self.revenue_growth_3y,
            MetricId::Roe => self.roe,
            MetricId::Roa => self.roa,
            MetricId::NetDebtEbitda => self.net_debt_ebitda,
            MetricId::InterestCoverage => self.interest_coverage,
            MetricId::DilutionPct => self.dilution_pct,
            MetricId::MoatScore => self.moat_score,
        }
    }

    pub fn company_type(&self) -> CompanyType {
        self.flags.company_type()
    }
}
