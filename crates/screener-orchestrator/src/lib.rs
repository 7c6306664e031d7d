pub mod qualitative;
pub mod report;
pub mod universe;

#[cfg(test)]
mod tests;

pub use qualitative::{PremiumSignals, QualitativeSource, QualitativeSummary, StaticQualitativeSource};
pub use report::{FailureSummary, ScreenerRow, ScreeningReport};
pub use universe::UniverseEntry;

use anyhow::Result;
use fundamental_analysis::{GuardrailEvaluator, IndustryNormalizer, MetricComputer, ScoringEngine};
pub use screener_core::CancelHandle;

use screener_core::{
    bars_from_records, Bar, MetricRecord, RawFinancialRecord, ScreenerConfig, ScreenerError, StatementKind,
    StatementProvider, StatementRequest,
};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use technical_analysis::{sector_etf, TechnicalScore, TechnicalScorer};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Per-ticker ingestion result, carried across the barrier.
#[derive(Debug, Clone)]
struct Ingested {
    record: MetricRecord,
    bars: Vec<Bar>,
}

/// Drives one screening run: fetch, barrier, normalize, score, rank.
pub struct ScreeningOrchestrator {
    provider: Arc<dyn StatementProvider>,
    config: Arc<ScreenerConfig>,
    qualitative: Option<Arc<dyn QualitativeSource>>,
    cancel: CancelHandle,
}

impl ScreeningOrchestrator {
    pub fn new(provider: Arc<dyn StatementProvider>, config: Arc<ScreenerConfig>) -> Self {
        Self {
            provider,
            config,
            qualitative: None,
            cancel: CancelHandle::default(),
        }
    }

    pub fn with_qualitative(mut self, source: Arc<dyn QualitativeSource>) -> Self {
        self.qualitative = Some(source);
        self
    }

    /// Share an existing cancellation flag, e.g. the one the HTTP client
    /// checks between retries.
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub async fn run(&self, universe: Vec<UniverseEntry>) -> Result<ScreeningReport> {
        let entries = universe::resolve(universe);
        let total = entries.len();
        tracing::info!("📊 Starting screen of {} tickers", total);

        let semaphore = Arc::new(Semaphore::new(self.config.ingestion.max_concurrency));
        let ticker_timeout = self.config.ingestion.ticker_timeout_secs;
        let mut tasks = JoinSet::new();

        for entry in entries.iter().cloned() {
            let provider = Arc::clone(&self.provider);
            let config = Arc::clone(&self.config);
            let semaphore = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();

            tasks.spawn(async move {
                let ticker = entry.ticker.clone();
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => match tokio::time::timeout(
                        Duration::from_secs(ticker_timeout),
                        ingest_ticker(provider.as_ref(), &config, &entry, &cancel),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(ScreenerError::Timeout(ticker_timeout)),
                    },
                    Err(_) => Err(ScreenerError::Cancelled),
                };
                (ticker, result)
            });
        }

        // Barrier: nothing downstream starts until every ticker has resolved
        let mut outcomes: HashMap<String, Result<Ingested, ScreenerError>> = HashMap::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((ticker, result)) => {
                    if let Err(e) = &result {
                        tracing::warn!("Failed to ingest {}: {}", ticker, e);
                    }
                    outcomes.insert(ticker, result);
                }
                Err(e) => {
                    tracing::error!("Task error: {}", e);
                }
            }
        }

        let mut failures = FailureSummary {
            total,
            ..Default::default()
        };
        let mut ingested = Vec::new();
        let mut failed_rows = Vec::new();

        for entry in &entries {
            match outcomes.remove(&entry.ticker) {
                Some(Ok(item)) => ingested.push(item),
                Some(Err(e)) => {
                    failures.record_failure(e.kind());
                    failed_rows.push(ScreenerRow::failed(entry, &e.to_string()));
                }
                None => {
                    failures.record_failure("panic");
                    failed_rows.push(ScreenerRow::failed(entry, "Task panicked"));
                }
            }
        }
        failures.succeeded = ingested.len();
        tracing::info!("Ingestion complete: {}", failures);

        let records: Vec<MetricRecord> = ingested.iter().map(|i| i.record.clone()).collect();
        let normalized = IndustryNormalizer::new(self.config.normalization.clone()).normalize(&records);
        let guardrails = GuardrailEvaluator::new(self.config.guardrails.clone());
        let scoring = ScoringEngine::new(self.config.scoring.clone());

        let sector_series = if self.config.technical.enabled {
            self.fetch_sector_series(&records).await
        } else {
            HashMap::new()
        };
        let technical = TechnicalScorer::new(self.config.technical.clone());

        let mut rows = Vec::with_capacity(total);
        for item in &ingested {
            let record = &item.record;
            let report = guardrails.evaluate(record);
            let score = scoring.score(record, &normalized, &report);

            let tech = self.config.technical.enabled.then(|| {
                technical_for(&technical, record, &item.bars, &sector_series)
            });
            let summary = self.summarize(record).await;

            rows.push(ScreenerRow::scored(record, &score, tech.as_ref(), summary.as_ref()));
        }

        rank_rows(&mut rows);
        failed_rows.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        rows.extend(failed_rows);

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            tracing::warn!("Screen was cancelled, {} tickers not scored", failures.failed);
        }
        tracing::info!("✅ Screen complete: {}", failures);

        Ok(ScreeningReport {
            rows,
            failures,
            normalized,
            cancelled,
            generated_at: chrono::Utc::now(),
        })
    }

    /// One price series per sector ETF present in the successful set.
    async fn fetch_sector_series(&self, records: &[MetricRecord]) -> HashMap<&'static str, Vec<Bar>> {
        let mut etfs: Vec<&'static str> = records.iter().filter_map(|r| sector_etf(&r.sector)).collect();
        etfs.sort_unstable();
        etfs.dedup();

        let days = self.config.ingestion.price_history_days;
        let timeout = Duration::from_secs(self.config.ingestion.ticker_timeout_secs);
        let mut series = HashMap::new();

        for etf in etfs {
            if self.cancel.is_cancelled() {
                break;
            }
            let request = StatementRequest::prices(etf, days);
            let rows = match tokio::time::timeout(timeout, self.provider.fetch(&request)).await {
                Ok(Ok(rows)) => rows,
                Ok(Err(e)) => {
                    tracing::warn!("Sector ETF {} unavailable: {}", etf, e);
                    continue;
                }
                Err(_) => {
                    tracing::warn!("Sector ETF {} timed out", etf);
                    continue;
                }
            };
            match bars_from_records(&rows) {
                Ok(bars) if !bars.is_empty() => {
                    series.insert(etf, bars);
                }
                Ok(_) => tracing::warn!("Sector ETF {} returned no bars", etf),
                Err(e) => tracing::warn!("Sector ETF {} price data invalid: {}", etf, e),
            }
        }
        tracing::debug!("Loaded {} sector ETF series", series.len());
        series
    }

    async fn summarize(&self, record: &MetricRecord) -> Option<QualitativeSummary> {
        let source = self.qualitative.as_ref()?;
        match source.summarize(&record.ticker, &record.industry).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!("Qualitative summary for {} unavailable: {}", record.ticker, e);
                None
            }
        }
    }
}

fn technical_for(
    scorer: &TechnicalScorer,
    record: &MetricRecord,
    bars: &[Bar],
    sector_series: &HashMap<&'static str, Vec<Bar>>,
) -> TechnicalScore {
    let sector = (!record.sector.is_empty()).then_some(record.sector.as_str());
    let sector_bars = sector
        .and_then(sector_etf)
        .and_then(|etf| sector_series.get(etf))
        .map(Vec::as_slice);
    scorer.score(bars, sector, sector_bars)
}

/// Composite descending, unscored last, ties broken by ticker. Assigns 1-based ranks.
fn rank_rows(rows: &mut [ScreenerRow]) {
    rows.sort_by(|a, b| match (a.composite_score, b.composite_score) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal).then_with(|| a.ticker.cmp(&b.ticker)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.ticker.cmp(&b.ticker),
    });
    for (i, row) in rows.iter_mut().enumerate() {
        row.rank = Some(i + 1);
    }
}

async fn ingest_ticker(
    provider: &dyn StatementProvider,
    config: &ScreenerConfig,
    entry: &UniverseEntry,
    cancel: &CancelHandle,
) -> Result<Ingested, ScreenerError> {
    let ticker = entry.ticker.as_str();
    let quarters = config.ingestion.quarters;

    cancel.check()?;
    let profile = provider.fetch(&StatementRequest::profile(ticker)).await?;
    if profile_flag(&profile, "isEtf") || profile_flag(&profile, "isFund") {
        return Err(ScreenerError::InvalidData(format!("{} is an ETF or fund", ticker)));
    }

    cancel.check()?;
    let income_req = StatementRequest::quarterly(ticker, StatementKind::IncomeStatement, quarters);
    let balance_req = StatementRequest::quarterly(ticker, StatementKind::BalanceSheet, quarters);
    let cashflow_req = StatementRequest::quarterly(ticker, StatementKind::CashFlow, quarters);
    let (income, balance, cashflow) = tokio::try_join!(
        provider.fetch(&income_req),
        provider.fetch(&balance_req),
        provider.fetch(&cashflow_req),
    )?;

    let mut raw = RawFinancialRecord::from_payloads(ticker, &profile, &income, &balance, &cashflow)?;
    if !raw.has_statements() {
        return Err(ScreenerError::InsufficientData(format!("no quarterly statements for {}", ticker)));
    }
    fill_classification(&mut raw, entry);

    let bars = if config.ingestion.fetch_prices && config.technical.enabled {
        cancel.check()?;
        fetch_bars(provider, ticker, config.ingestion.price_history_days).await
    } else {
        Vec::new()
    };

    let record = MetricComputer::new().compute(&raw);
    tracing::debug!(
        "{}: {} quarters, {} bars, {}",
        ticker,
        record.quarters_available,
        bars.len(),
        if record.sector.is_empty() { "no sector" } else { record.sector.as_str() }
    );
    Ok(Ingested { record, bars })
}

/// Price history is optional. A failed fetch degrades the technical score, not the ticker.
async fn fetch_bars(provider: &dyn StatementProvider, ticker: &str, days: usize) -> Vec<Bar> {
    let rows = match provider.fetch(&StatementRequest::prices(ticker, days)).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!("Price history for {} unavailable: {}", ticker, e);
            return Vec::new();
        }
    };
    bars_from_records(&rows).unwrap_or_else(|e| {
        tracing::warn!("Price history for {} invalid: {}", ticker, e);
        Vec::new()
    })
}

fn profile_flag(profile: &[Value], field: &str) -> bool {
    profile
        .first()
        .and_then(|p| p.get(field))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Profile labels win; universe hints and industry inference fill the gaps.
fn fill_classification(raw: &mut RawFinancialRecord, entry: &UniverseEntry) {
    let profile = &mut raw.profile;
    if profile.company_name.as_deref().map_or(true, str::is_empty) {
        profile.company_name = entry.name.clone();
    }
    if profile.industry.as_deref().map_or(true, str::is_empty) {
        profile.industry = entry.industry.clone();
    }
    profile.sector = universe::effective_sector(profile.sector.as_deref(), None)
        .or_else(|| entry.sector.clone())
        .or_else(|| universe::effective_sector(None, profile.industry.as_deref()));
}

