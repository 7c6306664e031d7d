use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One ticker of the screening universe, with optional hints from the source list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UniverseEntry {
    pub ticker: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub is_etf: Option<bool>,
}

impl UniverseEntry {
    pub fn new(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            ..Default::default()
        }
    }

    pub fn with_classification(mut self, sector: &str, industry: &str) -> Self {
        self.sector = Some(sector.to_string());
        self.industry = Some(industry.to_string());
        self
    }
}

const INDEX_ETF_TICKERS: [&str; 24] = [
    "QQQ", "SPY", "IWM", "DIA", "VTI", "VOO", "VEA", "VWO", "EFA", "EEM", "AGG", "BND", "TLT", "GLD", "SLV",
    "XLK", "XLF", "XLE", "XLV", "XLI", "XLC", "XLY", "XLP", "XLRE",
];

const FUND_INDUSTRIES: [&str; 5] = [
    "exchange traded fund",
    "exchange-traded fund",
    "investment trust",
    "closed-end fund",
    "open-end fund",
];

const FUND_NAME_KEYWORDS: [&str; 14] = [
    " etf",
    "etf ",
    " fund",
    "index fund",
    "covered call",
    "money market",
    "aggregate bond",
    "bond index",
    "equity index",
    "total market",
    "ishares",
    "vanguard",
    "global x",
    "betapro",
];

/// Sector inferred from industry keywords, checked in this order.
const SECTOR_KEYWORDS: [(&str, &[&str]); 11] = [
    (
        "Technology",
        &["software", "internet", "semiconductor", "computer", "electronics", "it services", "cloud"],
    ),
    (
        "Consumer Cyclical",
        &["retail", "e-commerce", "automotive", "apparel", "leisure", "hotels", "restaurants", "travel"],
    ),
    (
        "Consumer Defensive",
        &["food", "beverage", "tobacco", "household products", "personal products", "discount stores"],
    ),
    (
        "Healthcare",
        &["pharmaceutical", "biotechnology", "medical", "health care", "diagnostics", "hospital"],
    ),
    (
        "Financial Services",
        &["bank", "insurance", "asset management", "brokerage", "credit services", "capital markets", "mortgage"],
    ),
    (
        "Communication Services",
        &["telecommunication", "media", "entertainment", "publishing", "broadcasting"],
    ),
    (
        "Industrials",
        &["aerospace", "defense", "construction", "machinery", "transportation", "logistics", "engineering"],
    ),
    ("Energy", &["oil", "gas", "petroleum", "coal", "renewable energy"]),
    (
        "Basic Materials",
        &["chemicals", "metals", "mining", "steel", "paper", "packaging"],
    ),
    ("Real Estate", &["reit", "real estate", "property"]),
    ("Utilities", &["electric", "water", "utility", "power generation"]),
];

/// Heuristic ETF / fund detection from the ticker, name and industry.
pub fn is_fund_like(ticker: &str, name: Option<&str>, industry: Option<&str>) -> bool {
    if INDEX_ETF_TICKERS.contains(&ticker) {
        return true;
    }
    let industry = industry.unwrap_or_default().to_lowercase();
    if FUND_INDUSTRIES.iter().any(|k| industry.contains(k)) {
        return true;
    }
    let name = name.unwrap_or_default().to_lowercase();
    if !FUND_NAME_KEYWORDS.iter().any(|k| name.contains(k)) {
        return false;
    }
    // REITs and royalty trusts carry "fund"/"trust" in their names but are operating companies
    !(industry.contains("reit") || name.contains("royalt") || industry.contains("royalt"))
}

/// Sector from industry keywords, or `None` when nothing matches.
pub fn infer_sector(industry: &str) -> Option<&'static str> {
    let industry = industry.to_lowercase();
    SECTOR_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| industry.contains(k)))
        .map(|(sector, _)| *sector)
}

/// A usable sector label: the given one unless blank or a placeholder.
pub fn effective_sector(sector: Option<&str>, industry: Option<&str>) -> Option<String> {
    match sector.map(str::trim) {
        Some(s) if !s.is_empty() && !matches!(s.to_lowercase().as_str(), "unknown" | "n/a") => Some(s.to_string()),
        _ => industry.and_then(infer_sector).map(str::to_string),
    }
}

/// Normalize tickers, drop duplicates and funds, fill missing sectors.
pub fn resolve(entries: Vec<UniverseEntry>) -> Vec<UniverseEntry> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(entries.len());
    let mut funds = 0usize;

    for mut entry in entries {
        entry.ticker = entry.ticker.trim().to_uppercase();
        if entry.ticker.is_empty() || !seen.insert(entry.ticker.clone()) {
            continue;
        }
        if entry.is_etf == Some(true)
            || is_fund_like(&entry.ticker, entry.name.as_deref(), entry.industry.as_deref())
        {
            funds += 1;
            continue;
        }
        entry.sector = effective_sector(entry.sector.as_deref(), entry.industry.as_deref());
        resolved.push(entry);
    }

    if funds > 0 {
        tracing::info!("Filtered {} ETFs/funds from universe, {} tickers remain", funds, resolved.len());
    }
    resolved
}

/// Parse a comma/whitespace separated ticker list.
pub fn from_list(list: &str) -> Vec<UniverseEntry> {
    list.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.trim().is_empty())
        .map(UniverseEntry::new)
        .collect()
}

/// Read a CSV with a `ticker` column and optional `name`, `sector`, `industry`, `is_etf`.
pub fn from_csv_reader<R: std::io::Read>(reader: R) -> Result<Vec<UniverseEntry>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut entries = Vec::new();
    for record in rdr.deserialize() {
        let entry: UniverseEntry = record.context("invalid universe row")?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Load the universe from a CSV path, or treat the argument as an inline list.
pub fn load(source: &str) -> Result<Vec<UniverseEntry>> {
    let path = Path::new(source);
    if path.is_file() {
        let file = std::fs::File::open(path).with_context(|| format!("failed to open {}", source))?;
        from_csv_reader(file)
    } else {
        Ok(from_list(source))
    }
}
