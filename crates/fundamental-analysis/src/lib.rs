pub mod degradation;
pub mod guardrails;
pub mod metrics;
pub mod moat;
pub mod normalizer;
pub mod scoring;

pub use degradation::{classify as classify_degradation, mohanram, piotroski};
pub use guardrails::GuardrailEvaluator;
pub use metrics::{cap_dilution, share_count, MetricComputer};
pub use normalizer::{GroupStats, IndustryNormalizer, NormalizedMetrics, NormalizedValue, Scope};
pub use scoring::{sub_score, ScoringEngine};
