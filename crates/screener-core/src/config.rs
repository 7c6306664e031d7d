use serde::{Deserialize, Serialize};
use std::env;

use crate::{MetricId, ScreenerError};

/// Run-wide settings. Built once, wrapped in an `Arc` and handed to every component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenerConfig {
    pub client: ClientConfig,
    pub cache: CacheConfig,
    pub ingestion: IngestionConfig,
    pub normalization: NormalizationConfig,
    pub scoring: ScoringConfig,
    pub guardrails: GuardrailConfig,
    pub technical: TechnicalConfig,
}

impl ScreenerConfig {
    /// Load from a JSON file; missing sections keep their defaults.
    pub fn from_json_file(path: &str) -> Result<Self, ScreenerError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ScreenerError::Config(format!("{}: {}", path, e)))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| ScreenerError::Config(format!("{}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ScreenerError> {
        if self.client.rate_limit_per_minute == 0 {
            return Err(ScreenerError::Config("rate_limit_per_minute must be > 0".into()));
        }
        if self.client.max_attempts == 0 {
            return Err(ScreenerError::Config("max_attempts must be >= 1".into()));
        }
        if self.ingestion.max_concurrency == 0 {
            return Err(ScreenerError::Config("max_concurrency must be >= 1".into()));
        }
        if self.normalization.min_group_size == 0 {
            return Err(ScreenerError::Config("min_group_size must be >= 1".into()));
        }
        if self.normalization.z_cap <= 0.0 {
            return Err(ScreenerError::Config("z_cap must be positive".into()));
        }

        let s = &self.scoring;
        if s.value_weight < 0.0 || s.quality_weight < 0.0 || s.value_weight + s.quality_weight <= 0.0 {
            return Err(ScreenerError::Config("value/quality weights must be non-negative and not both zero".into()));
        }
        for set in [&s.non_financial, &s.financial, &s.reit] {
            if set.value.iter().chain(set.quality.iter()).any(|w| w.weight < 0.0) {
                return Err(ScreenerError::Config("metric weights must be non-negative".into()));
            }
        }
        if !(s.threshold_monitor <= s.threshold_buy && s.threshold_buy <= s.threshold_buy_warn) {
            return Err(ScreenerError::Config(
                "thresholds must satisfy monitor <= buy <= buy_warn".into(),
            ));
        }
        if s.max_penalty < 0.0 {
            return Err(ScreenerError::Config("max_penalty must be non-negative".into()));
        }

        let g = &self.guardrails;
        if g.dilution_warn_pct > g.dilution_fail_pct {
            return Err(ScreenerError::Config("dilution warn threshold above fail threshold".into()));
        }
        if g.net_debt_ebitda_warn > g.net_debt_ebitda_fail {
            return Err(ScreenerError::Config("net debt/EBITDA warn threshold above fail threshold".into()));
        }
        Ok(())
    }
}

/// Provider connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(skip_serializing)]
    pub api_key: String,
    pub base_url: String,
    pub rate_limit_per_minute: usize,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://financialmodelingprep.com/api/v3".to_string(),
            rate_limit_per_minute: 480,
            request_timeout_secs: 30,
            max_attempts: 4,
            base_backoff_ms: 1000,
            max_backoff_ms: 16_000,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ScreenerError> {
        let defaults = Self::default();
        let api_key = env::var("FMP_API_KEY")
            .map_err(|_| ScreenerError::Config("FMP_API_KEY is not set".into()))?;

        Ok(Self {
            api_key,
            base_url: env::var("FMP_BASE_URL").unwrap_or(defaults.base_url),
            rate_limit_per_minute: parse_env("FMP_RATE_LIMIT", defaults.rate_limit_per_minute)?,
            request_timeout_secs: parse_env("FMP_TIMEOUT_SECS", defaults.request_timeout_secs)?,
            max_attempts: parse_env("FMP_MAX_ATTEMPTS", defaults.max_attempts)?,
            base_backoff_ms: defaults.base_backoff_ms,
            max_backoff_ms: defaults.max_backoff_ms,
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ScreenerError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ScreenerError::Config(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

/// Durable response cache settings. TTLs are per endpoint family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub database_url: String,
    pub profile_ttl_secs: u64,
    pub statements_ttl_secs: u64,
    pub prices_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_url: "sqlite:screener_cache.db".to_string(),
            profile_ttl_secs: 7 * 24 * 3600,
            statements_ttl_secs: 24 * 3600,
            prices_ttl_secs: 12 * 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub max_concurrency: usize,
    pub ticker_timeout_secs: u64,
    /// Quarterly statements requested per ticker (3 years).
    pub quarters: usize,
    /// Daily bars requested for the technical score.
    pub price_history_days: usize,
    pub fetch_prices: bool,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            ticker_timeout_secs: 120,
            quarters: 12,
            price_history_days: 300,
            fetch_prices: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Smallest eligible population that may define its own statistics.
    pub min_group_size: usize,
    pub z_cap: f64,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            min_group_size: 3,
            z_cap: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedMetric {
    pub metric: MetricId,
    pub weight: f64,
}

impl WeightedMetric {
    pub const fn new(metric: MetricId, weight: f64) -> Self {
        Self { metric, weight }
    }
}

/// Value and quality metric sets for one company type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricWeights {
    pub value: Vec<WeightedMetric>,
    pub quality: Vec<WeightedMetric>,
}

impl MetricWeights {
    fn equal(value: &[MetricId], quality: &[MetricId]) -> Self {
        Self {
            value: value.iter().map(|m| WeightedMetric::new(*m, 1.0)).collect(),
            quality: quality.iter().map(|m| WeightedMetric::new(*m, 1.0)).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub value_weight: f64,
    pub quality_weight: f64,
    /// Also used for utilities.
    pub non_financial: MetricWeights,
    pub financial: MetricWeights,
    pub reit: MetricWeights,
    pub threshold_buy: f64,
    pub threshold_monitor: f64,
    /// Composite above which WARN tickers still qualify as BUY.
    pub threshold_buy_warn: f64,
    pub warn_penalty: f64,
    pub fail_penalty: f64,
    pub max_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        use MetricId::*;
        Self {
            value_weight: 0.5,
            quality_weight: 0.5,
            non_financial: MetricWeights::equal(
                &[EvEbit, EvFcf, Pe, Pb, ShareholderYield],
                &[Roic, GrossProfitToAssets, FcfMargin, CfoToNetIncome, InterestCoverage, NetDebtEbitda],
            ),
            financial: MetricWeights::equal(&[Pe, Pb, PTangibleBook, DividendYield], &[Roa, Roe]),
            reit: MetricWeights::equal(&[PFfo, DividendYield], &[NetDebtEbitda, InterestCoverage, FcfMargin]),
            threshold_buy: 70.0,
            threshold_monitor: 50.0,
            threshold_buy_warn: 80.0,
            warn_penalty: 2.5,
            fail_penalty: 10.0,
            max_penalty: 15.0,
        }
    }
}

/// Guardrail cutoffs. Dilution in percent over four quarters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    pub min_history_quarters: usize,
    pub dilution_warn_pct: f64,
    pub dilution_fail_pct: f64,
    pub net_debt_ebitda_warn: f64,
    pub net_debt_ebitda_fail: f64,
    pub altman_z_fail: f64,
    pub altman_z_warn: f64,
    pub beneish_m_fail: f64,
    pub beneish_m_warn: f64,
    pub accruals_warn_pct: f64,
    pub goodwill_growth_warn_pct: f64,
    pub goodwill_assets_warn_pct: f64,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            min_history_quarters: 5,
            dilution_warn_pct: 5.0,
            dilution_fail_pct: 10.0,
            net_debt_ebitda_warn: 3.0,
            net_debt_ebitda_fail: 5.0,
            altman_z_fail: 1.8,
            altman_z_warn: 2.99,
            beneish_m_fail: -1.78,
            beneish_m_warn: -2.22,
            accruals_warn_pct: 15.0,
            goodwill_growth_warn_pct: 20.0,
            goodwill_assets_warn_pct: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TechnicalConfig {
    pub enabled: bool,
    pub buy_threshold: f64,
    pub excellent_sector_buy_threshold: f64,
    pub hold_threshold: f64,
}

impl Default for TechnicalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buy_threshold: 75.0,
            excellent_sector_buy_threshold: 70.0,
            hold_threshold: 50.0,
        }
    }
}
