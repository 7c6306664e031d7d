use serde::{Deserialize, Serialize};

/// Guardrail outcome. Ordering is severity: `Pass < Warn < Fail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GuardrailStatus {
    Pass,
    Warn,
    Fail,
}

impl GuardrailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardrailStatus::Pass => "PASS",
            GuardrailStatus::Warn => "WARN",
            GuardrailStatus::Fail => "FAIL",
        }
    }
}

/// Result of a single guardrail check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: String,
    pub status: GuardrailStatus,
    pub reason: Option<String>,
}

impl CheckResult {
    pub fn pass(check: &str) -> Self {
        Self {
            check: check.to_string(),
            status: GuardrailStatus::Pass,
            reason: None,
        }
    }

    pub fn pass_with(check: &str, reason: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            status: GuardrailStatus::Pass,
            reason: Some(reason.into()),
        }
    }

    pub fn warn(check: &str, reason: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            status: GuardrailStatus::Warn,
            reason: Some(reason.into()),
        }
    }

    pub fn fail(check: &str, reason: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            status: GuardrailStatus::Fail,
            reason: Some(reason.into()),
        }
    }
}

/// All checks for one ticker plus the aggregated status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailReport {
    pub status: GuardrailStatus,
    pub checks: Vec<CheckResult>,
}

impl GuardrailReport {
    /// FAIL dominates WARN dominates PASS.
    pub fn from_checks(checks: Vec<CheckResult>) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(GuardrailStatus::Pass);
        Self { status, checks }
    }

    /// Non-empty reasons in check order.
    pub fn reasons(&self) -> Vec<String> {
        self.checks.iter().filter_map(|c| c.reason.clone()).collect()
    }

    pub fn count(&self, status: GuardrailStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Buy,
    Monitor,
    Avoid,
    /// Ingestion failed; the ticker was never scored.
    Error,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Buy => "BUY",
            Decision::Monitor => "MONITOR",
            Decision::Avoid => "AVOID",
            Decision::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub ticker: String,
    pub value_score: Option<f64>,
    pub quality_score: Option<f64>,
    pub composite_score: Option<f64>,
    pub guardrail_penalty: f64,
    pub decision: Decision,
    pub guardrail_status: GuardrailStatus,
    pub guardrail_reasons: Vec<String>,
    pub notes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_dominates() {
        let report = GuardrailReport::from_checks(vec![
            CheckResult::pass("a"),
            CheckResult::warn("b", "borderline"),
            CheckResult::fail("c", "breach"),
            CheckResult::warn("d", "thin history"),
        ]);
        assert_eq!(report.status, GuardrailStatus::Fail);
        assert_eq!(report.reasons(), vec!["borderline", "breach", "thin history"]);
        assert_eq!(report.count(GuardrailStatus::Warn), 2);
    }

    #[test]
    fn test_warn_dominates_pass() {
        let report = GuardrailReport::from_checks(vec![
            CheckResult::pass("a"),
            CheckResult::warn("b", "x"),
        ]);
        assert_eq!(report.status, GuardrailStatus::Warn);

        let clean = GuardrailReport::from_checks(vec![CheckResult::pass("a")]);
        assert_eq!(clean.status, GuardrailStatus::Pass);
        assert!(clean.reasons().is_empty());
    }
}
