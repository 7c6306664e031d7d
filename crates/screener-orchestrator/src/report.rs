use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use fundamental_analysis::NormalizedMetrics;
use screener_core::{Decision, MetricRecord, ScoreRecord};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use technical_analysis::TechnicalScore;

use crate::qualitative::QualitativeSummary;
use crate::universe::UniverseEntry;

/// One output row. Flat so it maps directly onto CSV columns.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScreenerRow {
    pub rank: Option<usize>,
    pub ticker: String,
    pub name: String,
    pub sector: String,
    pub industry: String,
    pub country: String,
    pub as_of: Option<NaiveDate>,

    pub value_score: Option<f64>,
    pub quality_score: Option<f64>,
    pub composite_score: Option<f64>,
    pub decision: String,
    pub guardrail_status: String,
    pub guardrail_reasons: String,
    pub notes: String,

    pub market_cap: Option<f64>,
    pub ev_ebit: Option<f64>,
    pub ev_fcf: Option<f64>,
    pub pe: Option<f64>,
    pub pb: Option<f64>,
    pub p_tangible_book: Option<f64>,
    pub p_ffo: Option<f64>,
    pub dividend_yield_pct: Option<f64>,
    pub shareholder_yield_pct: Option<f64>,
    pub roic_pct: Option<f64>,
    pub roic_persistence: Option<f64>,
    pub fcf_margin_pct: Option<f64>,
    pub gross_profit_to_assets_pct: Option<f64>,
    pub cfo_to_net_income: Option<f64>,
    pub revenue_growth_3y_pct: Option<f64>,
    pub roe_pct: Option<f64>,
    pub roa_pct: Option<f64>,
    pub moat_score: Option<f64>,
    pub net_debt_ebitda: Option<f64>,
    pub interest_coverage: Option<f64>,
    pub dilution_pct: Option<f64>,
    pub altman_z: Option<f64>,
    pub beneish_m: Option<f64>,

    pub piotroski_fscore: Option<u8>,
    pub piotroski_fscore_delta: Option<i8>,
    pub mohanram_gscore: Option<u8>,
    pub mohanram_gscore_delta: Option<i8>,
    pub quality_degradation_type: Option<String>,
    pub quality_degradation_score: Option<u8>,
    pub quality_degradation_delta: Option<i8>,

    pub is_financial: bool,
    pub is_reit: bool,
    pub is_utility: bool,

    pub technical_score: Option<f64>,
    pub technical_signal: Option<String>,
    pub technical_warnings: String,

    pub moat_assessment: Option<String>,
    pub insider_signal: Option<String>,
    pub earnings_call_sentiment: Option<String>,
    pub backlog_assessment: Option<String>,

    pub error: Option<String>,
}

impl ScreenerRow {
    pub fn scored(
        record: &MetricRecord,
        score: &ScoreRecord,
        technical: Option<&TechnicalScore>,
        qualitative: Option<&QualitativeSummary>,
    ) -> Self {
        let premium = qualitative.map(|q| q.premium.clone()).unwrap_or_default();
        Self {
            rank: None,
            ticker: record.ticker.clone(),
            name: record.name.clone(),
            sector: record.sector.clone(),
            industry: record.industry.clone(),
            country: record.country.clone(),
            as_of: record.as_of,

            value_score: score.value_score.map(round2),
            quality_score: score.quality_score.map(round2),
            composite_score: score.composite_score.map(round2),
            decision: score.decision.as_str().to_string(),
            guardrail_status: score.guardrail_status.as_str().to_string(),
            guardrail_reasons: score.guardrail_reasons.join("; "),
            notes: score.notes.join("; "),

            market_cap: record.market_cap,
            ev_ebit: record.ev_ebit,
            ev_fcf: record.ev_fcf,
            pe: record.pe,
            pb: record.pb,
            p_tangible_book: record.p_tangible_book,
            p_ffo: record.p_ffo,
            dividend_yield_pct: record.dividend_yield,
            shareholder_yield_pct: record.shareholder_yield,
            roic_pct: record.roic,
            roic_persistence: record.roic_persistence,
            fcf_margin_pct: record.fcf_margin,
            gross_profit_to_assets_pct: record.gross_profit_to_assets,
            cfo_to_net_income: record.cfo_to_net_income,
            revenue_growth_3y_pct: record.revenue_growth_3y,
            roe_pct: record.roe,
            roa_pct: record.roa,
            moat_score: record.moat_score,
            net_debt_ebitda: record.net_debt_ebitda,
            interest_coverage: record.interest_coverage,
            dilution_pct: record.dilution_pct,
            altman_z: record.altman_z,
            beneish_m: record.beneish_m,

            piotroski_fscore: record.piotroski_fscore,
            piotroski_fscore_delta: record.piotroski_fscore_delta,
            mohanram_gscore: record.mohanram_gscore,
            mohanram_gscore_delta: record.mohanram_gscore_delta,
            quality_degradation_type: record.quality_degradation_type.map(|t| t.as_str().to_string()),
            quality_degradation_score: record.quality_degradation_score,
            quality_degradation_delta: record.quality_degradation_delta,

            is_financial: record.flags.is_financial,
            is_reit: record.flags.is_reit,
            is_utility: record.flags.is_utility,

            technical_score: technical.map(|t| t.score),
            technical_signal: technical.map(|t| t.signal.as_str().to_string()),
            technical_warnings: technical
                .map(|t| t.warnings.iter().map(|w| w.message.as_str()).collect::<Vec<_>>().join("; "))
                .unwrap_or_default(),

            moat_assessment: premium.moat_assessment,
            insider_signal: premium.insider_signal,
            earnings_call_sentiment: premium.earnings_call_sentiment,
            backlog_assessment: premium.backlog_assessment,

            error: None,
        }
    }

    /// Row for a ticker that never made it through ingestion. Guardrails never
    /// ran, so the status column stays empty.
    pub fn failed(entry: &UniverseEntry, reason: &str) -> Self {
        Self {
            ticker: entry.ticker.clone(),
            name: entry.name.clone().unwrap_or_default(),
            sector: entry.sector.clone().unwrap_or_default(),
            industry: entry.industry.clone().unwrap_or_default(),
            decision: Decision::Error.as_str().to_string(),
            error: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// End-of-run failure counts, bucketed by error kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FailureSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub by_reason: BTreeMap<String, usize>,
}

impl FailureSummary {
    pub fn record_failure(&mut self, kind: &str) {
        self.failed += 1;
        *self.by_reason.entry(kind.to_string()).or_insert(0) += 1;
    }
}

impl std::fmt::Display for FailureSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} tickers scored, {} failed", self.succeeded, self.total, self.failed)?;
        if !self.by_reason.is_empty() {
            let reasons: Vec<String> = self.by_reason.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            write!(f, " ({})", reasons.join(", "))?;
        }
        Ok(())
    }
}

/// Ranked dataset plus what it took to produce it.
#[derive(Debug, Clone)]
pub struct ScreeningReport {
    pub rows: Vec<ScreenerRow>,
    pub failures: FailureSummary,
    pub normalized: NormalizedMetrics,
    pub cancelled: bool,
    pub generated_at: DateTime<Utc>,
}

impl ScreeningReport {
    pub fn row(&self, ticker: &str) -> Option<&ScreenerRow> {
        self.rows.iter().find(|r| r.ticker == ticker)
    }

    pub fn count_decision(&self, decision: Decision) -> usize {
        let label = decision.as_str();
        self.rows.iter().filter(|r| r.decision == label).count()
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer =
            csv::Writer::from_path(path).with_context(|| format!("failed to create {}", path.display()))?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        tracing::info!("Wrote {} rows to {}", self.rows.len(), path.display());
        Ok(())
    }
}
