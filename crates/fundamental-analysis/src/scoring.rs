use screener_core::{
    CompanyType, Decision, GuardrailReport, GuardrailStatus, MetricId, MetricRecord, MetricWeights,
    ScoreRecord, ScoringConfig, WeightedMetric,
};

use crate::normalizer::NormalizedMetrics;

const MAX_NOTES: usize = 3;
const NOTE_REASON_CHARS: usize = 30;

/// Turns normalized percentiles and guardrail results into value, quality and
/// composite scores plus a decision.
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Metric sets for a company type. Utilities share the non-financial set.
    pub fn weights_for(&self, company_type: CompanyType) -> &MetricWeights {
        match company_type {
            CompanyType::Financial => &self.config.financial,
            CompanyType::Reit => &self.config.reit,
            CompanyType::NonFinancial | CompanyType::Utility => &self.config.non_financial,
        }
    }

    pub fn score(
        &self,
        record: &MetricRecord,
        normalized: &NormalizedMetrics,
        guardrails: &GuardrailReport,
    ) -> ScoreRecord {
        let weights = self.weights_for(record.company_type());
        let value_score = sub_score(&weights.value, &record.ticker, normalized);
        let quality_score = sub_score(&weights.quality, &record.ticker, normalized);

        let penalty = self.penalty(guardrails);
        let composite_score = self
            .blend(value_score, quality_score)
            .map(|c| (c - penalty).clamp(0.0, 100.0));
        let decision = self.decide(composite_score, guardrails.status);

        ScoreRecord {
            ticker: record.ticker.clone(),
            value_score,
            quality_score,
            composite_score,
            guardrail_penalty: penalty,
            decision,
            guardrail_status: guardrails.status,
            guardrail_reasons: guardrails.reasons(),
            notes: notes(record, value_score, guardrails),
        }
    }

    /// Weighted blend of the two sub-scores; a missing one drops out.
    fn blend(&self, value: Option<f64>, quality: Option<f64>) -> Option<f64> {
        let parts = [
            value.map(|v| (v, self.config.value_weight)),
            quality.map(|q| (q, self.config.quality_weight)),
        ];
        weighted_mean(parts.into_iter().flatten())
    }

    pub fn penalty(&self, guardrails: &GuardrailReport) -> f64 {
        let raw = guardrails.count(GuardrailStatus::Warn) as f64 * self.config.warn_penalty
            + guardrails.count(GuardrailStatus::Fail) as f64 * self.config.fail_penalty;
        raw.min(self.config.max_penalty)
    }

    pub fn decide(&self, composite: Option<f64>, status: GuardrailStatus) -> Decision {
        if status == GuardrailStatus::Fail {
            return Decision::Avoid;
        }
        let Some(composite) = composite else {
            return Decision::Avoid;
        };
        if composite >= self.config.threshold_buy_warn {
            Decision::Buy
        } else if composite >= self.config.threshold_buy && status == GuardrailStatus::Pass {
            Decision::Buy
        } else if composite >= self.config.threshold_monitor {
            Decision::Monitor
        } else {
            Decision::Avoid
        }
    }
}

/// Weighted mean of the metrics that have a percentile. Missing metrics drop
/// out and the remaining weights are rescaled; `None` if nothing is present.
pub fn sub_score(set: &[WeightedMetric], ticker: &str, normalized: &NormalizedMetrics) -> Option<f64> {
    weighted_mean(
        set.iter()
            .filter(|wm| wm.weight > 0.0)
            .filter_map(|wm| normalized.get(ticker, wm.metric).map(|v| (v.score, wm.weight))),
    )
}

fn weighted_mean(parts: impl Iterator<Item = (f64, f64)>) -> Option<f64> {
    let (sum, total) = parts.fold((0.0, 0.0), |(s, t), (score, w)| (s + score * w, t + w));
    if total > 0.0 {
        Some(sum / total)
    } else {
        None
    }
}

fn percentile_band(pct: f64) -> &'static str {
    if pct < 20.0 {
        "p<20"
    } else if pct < 40.0 {
        "p20-40"
    } else if pct < 60.0 {
        "p40-60"
    } else if pct < 80.0 {
        "p60-80"
    } else {
        "p>80"
    }
}

fn notes(record: &MetricRecord, value_score: Option<f64>, guardrails: &GuardrailReport) -> Vec<String> {
    let mut notes = Vec::new();
    let band = percentile_band(value_score.unwrap_or(50.0));

    if record.flags.is_financial {
        if record.get(MetricId::Pe).is_some() {
            notes.push(format!("P/E {}", band));
        }
        if let Some(roe) = record.get(MetricId::Roe).filter(|r| *r > 12.0) {
            notes.push(format!("ROE {:.1}%", roe));
        }
    } else {
        if record.get(MetricId::EvEbit).is_some() {
            notes.push(format!("EV/EBIT {}", band));
        }
        match record.get(MetricId::Roic) {
            Some(roic) if roic > 15.0 => notes.push(format!("ROIC {:.1}%", roic)),
            Some(roic) => notes.push(format!("ROIC {:.1}% low", roic)),
            None => {}
        }
    }

    if guardrails.status == GuardrailStatus::Pass {
        notes.push("Acct. OK".to_string());
    } else if let Some(first) = guardrails
        .checks
        .iter()
        .find(|c| c.status != GuardrailStatus::Pass)
        .and_then(|c| c.reason.as_deref())
    {
        notes.push(first.chars().take(NOTE_REASON_CHARS).collect());
    }

    notes.truncate(MAX_NOTES);
    notes
}
