use anyhow::{Context, Result};
use async_trait::async_trait;
use screener_core::ScreenerError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Narrative signals produced outside the screener. Carried through verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PremiumSignals {
    pub moat_assessment: Option<String>,
    pub insider_signal: Option<String>,
    pub earnings_call_sentiment: Option<String>,
    /// Only meaningful for order-driven industries.
    pub backlog_assessment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualitativeSummary {
    pub ticker: String,
    #[serde(default)]
    pub premium: PremiumSignals,
}

/// External qualitative analysis, merged into the output by ticker only.
#[async_trait]
pub trait QualitativeSource: Send + Sync {
    async fn summarize(&self, ticker: &str, industry: &str) -> Result<Option<QualitativeSummary>, ScreenerError>;
}

/// Summaries prepared ahead of the run, e.g. exported by the analysis service as JSON.
#[derive(Debug, Clone, Default)]
pub struct StaticQualitativeSource {
    summaries: HashMap<String, QualitativeSummary>,
}

impl StaticQualitativeSource {
    pub fn new(summaries: Vec<QualitativeSummary>) -> Self {
        let summaries = summaries
            .into_iter()
            .map(|s| (s.ticker.trim().to_uppercase(), s))
            .collect();
        Self { summaries }
    }

    /// Load a JSON array of summaries.
    pub fn from_json_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
        let summaries: Vec<QualitativeSummary> =
            serde_json::from_str(&raw).with_context(|| format!("invalid qualitative summaries in {}", path))?;
        Ok(Self::new(summaries))
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}

#[async_trait]
impl QualitativeSource for StaticQualitativeSource {
    async fn summarize(&self, ticker: &str, _industry: &str) -> Result<Option<QualitativeSummary>, ScreenerError> {
        Ok(self.summaries.get(ticker).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_source_matches_on_ticker() {
        let source = StaticQualitativeSource::new(vec![QualitativeSummary {
            ticker: "cat ".to_string(),
            premium: PremiumSignals {
                backlog_assessment: Some("Growing".to_string()),
                ..Default::default()
            },
        }]);

        let hit = source.summarize("CAT", "Farm & Heavy Construction Machinery").await.unwrap();
        assert_eq!(hit.unwrap().premium.backlog_assessment.as_deref(), Some("Growing"));
        assert!(source.summarize("DE", "").await.unwrap().is_none());
    }

    #[test]
    fn test_summary_json_shape() {
        let json = r#"[{"ticker": "MSFT", "premium": {"moat_assessment": "Strong", "insider_signal": null,
            "earnings_call_sentiment": "Positive", "backlog_assessment": null}}]"#;
        let summaries: Vec<QualitativeSummary> = serde_json::from_str(json).unwrap();
        assert_eq!(summaries[0].premium.moat_assessment.as_deref(), Some("Strong"));
    }
}
