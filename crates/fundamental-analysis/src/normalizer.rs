use screener_core::stats::{robust_center_spread, robust_z, z_to_score};
use screener_core::{MetricId, MetricRecord, NormalizationConfig};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Peer group a percentile was computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Industry,
    Sector,
    Universe,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizedValue {
    /// 0-100, higher is always better.
    pub score: f64,
    pub z: f64,
    pub scope: Scope,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroupStats {
    pub population: usize,
    pub center: f64,
    pub spread: f64,
}

impl GroupStats {
    fn from_values(values: &mut [f64]) -> Option<Self> {
        values.sort_by(|a, b| a.total_cmp(b));
        let (center, spread) = robust_center_spread(values)?;
        Some(Self {
            population: values.len(),
            center,
            spread,
        })
    }

    fn usable(&self, min_group_size: usize) -> bool {
        self.population >= min_group_size && self.spread > f64::EPSILON
    }
}

type GroupKey = (MetricId, Scope, String);

/// Percentile scores for every (ticker, metric) that had a value.
#[derive(Debug, Clone, Default)]
pub struct NormalizedMetrics {
    scores: HashMap<String, BTreeMap<MetricId, NormalizedValue>>,
    stats: HashMap<GroupKey, GroupStats>,
}

impl NormalizedMetrics {
    pub fn get(&self, ticker: &str, metric: MetricId) -> Option<&NormalizedValue> {
        self.scores.get(ticker)?.get(&metric)
    }

    pub fn for_ticker(&self, ticker: &str) -> Option<&BTreeMap<MetricId, NormalizedValue>> {
        self.scores.get(ticker)
    }

    /// Statistics of `metric` within one industry, in oriented units.
    pub fn group_stats(&self, metric: MetricId, industry: &str) -> Option<GroupStats> {
        self.stats
            .get(&(metric, Scope::Industry, industry.to_string()))
            .copied()
    }

    pub fn sector_stats(&self, metric: MetricId, sector: &str) -> Option<GroupStats> {
        self.stats.get(&(metric, Scope::Sector, sector.to_string())).copied()
    }

    pub fn universe_stats(&self, metric: MetricId) -> Option<GroupStats> {
        self.stats.get(&(metric, Scope::Universe, String::new())).copied()
    }

    /// How many tickers were scored against each scope, across all metrics.
    pub fn scope_counts(&self) -> BTreeMap<Scope, usize> {
        let mut counts = BTreeMap::new();
        for value in self.scores.values().flat_map(|m| m.values()) {
            *counts.entry(value.scope).or_insert(0) += 1;
        }
        counts
    }
}

/// Cross-sectional robust z-scores against industry peers, falling back to
/// the sector and then the whole universe when a peer group is too small or
/// has no dispersion.
pub struct IndustryNormalizer {
    config: NormalizationConfig,
}

impl IndustryNormalizer {
    pub fn new(config: NormalizationConfig) -> Self {
        Self { config }
    }

    pub fn normalize(&self, records: &[MetricRecord]) -> NormalizedMetrics {
        let mut out = NormalizedMetrics::default();

        for metric in MetricId::ALL {
            let sign = if metric.higher_is_better() { 1.0 } else { -1.0 };
            let oriented: Vec<(&MetricRecord, f64)> = records
                .iter()
                .filter_map(|r| r.get(metric).map(|v| (r, v * sign)))
                .collect();
            if oriented.is_empty() {
                continue;
            }

            let mut industries: HashMap<&str, Vec<f64>> = HashMap::new();
            let mut sectors: HashMap<&str, Vec<f64>> = HashMap::new();
            let mut universe = Vec::with_capacity(oriented.len());
            for (r, v) in &oriented {
                if !r.industry.is_empty() {
                    industries.entry(r.industry.as_str()).or_default().push(*v);
                }
                if !r.sector.is_empty() {
                    sectors.entry(r.sector.as_str()).or_default().push(*v);
                }
                universe.push(*v);
            }

            for (name, mut values) in industries {
                if let Some(stats) = GroupStats::from_values(&mut values) {
                    out.stats.insert((metric, Scope::Industry, name.to_string()), stats);
                }
            }
            for (name, mut values) in sectors {
                if let Some(stats) = GroupStats::from_values(&mut values) {
                    out.stats.insert((metric, Scope::Sector, name.to_string()), stats);
                }
            }
            let Some(universe_stats) = GroupStats::from_values(&mut universe) else {
                continue;
            };
            out.stats.insert((metric, Scope::Universe, String::new()), universe_stats);

            for (record, value) in oriented {
                let (stats, scope) = self.select_scope(&out, metric, record, universe_stats);
                let z = robust_z(value, stats.center, stats.spread, self.config.z_cap);
                out.scores.entry(record.ticker.clone()).or_default().insert(
                    metric,
                    NormalizedValue {
                        score: z_to_score(z),
                        z,
                        scope,
                    },
                );
            }
        }

        tracing::debug!(
            "Normalized {} tickers, scope usage {:?}",
            out.scores.len(),
            out.scope_counts()
        );
        out
    }

    fn select_scope(
        &self,
        out: &NormalizedMetrics,
        metric: MetricId,
        record: &MetricRecord,
        universe: GroupStats,
    ) -> (GroupStats, Scope) {
        let min = self.config.min_group_size;
        if let Some(stats) = out.group_stats(metric, &record.industry).filter(|s| s.usable(min)) {
            return (stats, Scope::Industry);
        }
        if let Some(stats) = out.sector_stats(metric, &record.sector).filter(|s| s.usable(min)) {
            return (stats, Scope::Sector);
        }
        (universe, Scope::Universe)
    }
}
