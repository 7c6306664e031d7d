use screener_core::{Bar, TechnicalConfig};
use serde::Serialize;

use crate::indicators::*;

/// Trading days in twelve and six months.
const BARS_12M: usize = 252;
const BARS_6M: usize = 126;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Hold,
    Sell,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "BUY",
            Signal::Hold => "HOLD",
            Signal::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningKind {
    NoData,
    InsufficientHistory,
    ExtremeGain,
    Overextended,
    StrongDowntrend,
    LowVolume,
    ColdSector,
    RelativeWeakness,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnicalWarning {
    pub kind: WarningKind,
    pub severity: Severity,
    pub message: String,
}

impl TechnicalWarning {
    fn new(kind: WarningKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendStatus {
    UptrendEarly,
    Uptrend,
    UptrendExtended,
    UptrendOverextended,
    Neutral,
    Downtrend,
    DowntrendStrong,
    NoData,
}

impl TrendStatus {
    pub fn is_downtrend(&self) -> bool {
        matches!(self, TrendStatus::Downtrend | TrendStatus::DowntrendStrong)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SectorStatus {
    /// Hot sector and the stock outperforms it
    Excellent,
    Good,
    Neutral,
    /// Cold sector
    Avoid,
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ComponentScores {
    pub momentum: u32,
    pub sector: u32,
    pub trend: u32,
    pub volume: u32,
}

impl ComponentScores {
    pub fn total(&self) -> u32 {
        self.momentum + self.sector + self.trend + self.volume
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnicalScore {
    /// 0-100
    pub score: f64,
    pub signal: Signal,
    pub momentum_12m: Option<f64>,
    pub sector_etf: Option<&'static str>,
    pub sector_return_6m: Option<f64>,
    pub relative_strength: Option<f64>,
    pub sector_status: SectorStatus,
    pub trend: TrendStatus,
    pub distance_from_ma200: Option<f64>,
    pub golden_cross: bool,
    pub volume_ratio: Option<f64>,
    pub components: ComponentScores,
    pub warnings: Vec<TechnicalWarning>,
}

/// Sector ETF used as the benchmark for relative strength.
pub fn sector_etf(sector: &str) -> Option<&'static str> {
    let etf = match sector.trim() {
        "Technology" | "Information Technology" => "XLK",
        "Healthcare" | "Health Care" => "XLV",
        "Financials" | "Financial Services" => "XLF",
        "Consumer Cyclical" | "Consumer Discretionary" => "XLY",
        "Consumer Defensive" | "Consumer Staples" => "XLP",
        "Energy" => "XLE",
        "Industrials" => "XLI",
        "Basic Materials" | "Materials" => "XLB",
        "Real Estate" => "XLRE",
        "Communication Services" | "Telecommunication Services" => "XLC",
        "Utilities" => "XLU",
        _ => return None,
    };
    Some(etf)
}

struct SectorReading {
    points: u32,
    etf: Option<&'static str>,
    sector_return: Option<f64>,
    relative_strength: Option<f64>,
    status: SectorStatus,
}

impl SectorReading {
    fn neutral(etf: Option<&'static str>) -> Self {
        Self {
            points: 12,
            etf,
            sector_return: None,
            relative_strength: None,
            status: SectorStatus::Unknown,
        }
    }
}

struct TrendReading {
    points: u32,
    status: TrendStatus,
    distance: Option<f64>,
    golden_cross: bool,
}

/// Momentum (35), sector strength (25), trend vs MA200 (25), volume (15).
pub struct TechnicalScorer {
    config: TechnicalConfig,
}

impl TechnicalScorer {
    pub fn new(config: TechnicalConfig) -> Self {
        Self { config }
    }

    /// Score one daily series (oldest first). `sector_bars` is the sector
    /// ETF series, fetched once per sector by the caller.
    pub fn score(&self, bars: &[Bar], sector: Option<&str>, sector_bars: Option<&[Bar]>) -> TechnicalScore {
        let closes = closes(bars);
        if closes.len() < 2 {
            return Self::null_result("No price history available");
        }
        let mut warnings = Vec::new();
        if closes.len() <= BARS_12M {
            warnings.push(TechnicalWarning::new(
                WarningKind::InsufficientHistory,
                Severity::Medium,
                format!("Only {} bars of price history; need {} for 12M momentum", closes.len(), BARS_12M + 1),
            ));
        }

        let momentum_12m = trailing_return(&closes, BARS_12M);
        let momentum = momentum_points(momentum_12m);

        let stock_6m = trailing_return(&closes, BARS_6M);
        let sector_reading = analyze_sector(sector, stock_6m, sector_bars);

        let price = closes[closes.len() - 1];
        let trend = analyze_trend(price, last_sma(&closes, 50), last_sma(&closes, 200));

        let ratio = volume_ratio(&volumes(bars), 5, 50);
        let volume = volume_points(ratio);

        let components = ComponentScores {
            momentum,
            sector: sector_reading.points,
            trend: trend.points,
            volume,
        };
        let score = components.total().min(100) as f64;

        push_warnings(&mut warnings, momentum_12m, &trend, ratio, &sector_reading, sector);
        let signal = self.signal(score, trend.status, sector_reading.status);

        TechnicalScore {
            score,
            signal,
            momentum_12m,
            sector_etf: sector_reading.etf,
            sector_return_6m: sector_reading.sector_return,
            relative_strength: sector_reading.relative_strength,
            sector_status: sector_reading.status,
            trend: trend.status,
            distance_from_ma200: trend.distance,
            golden_cross: trend.golden_cross,
            volume_ratio: ratio,
            components,
            warnings,
        }
    }

    fn signal(&self, score: f64, trend: TrendStatus, sector: SectorStatus) -> Signal {
        if sector == SectorStatus::Avoid || trend.is_downtrend() {
            return Signal::Sell;
        }
        if sector == SectorStatus::Excellent && score >= self.config.excellent_sector_buy_threshold {
            return Signal::Buy;
        }
        if score >= self.config.buy_threshold {
            Signal::Buy
        } else if score >= self.config.hold_threshold {
            Signal::Hold
        } else {
            Signal::Sell
        }
    }

    /// Neutral HOLD used when there is no usable price data.
    pub fn null_result(reason: &str) -> TechnicalScore {
        TechnicalScore {
            score: 50.0,
            signal: Signal::Hold,
            momentum_12m: None,
            sector_etf: None,
            sector_return_6m: None,
            relative_strength: None,
            sector_status: SectorStatus::Unknown,
            trend: TrendStatus::NoData,
            distance_from_ma200: None,
            golden_cross: false,
            volume_ratio: None,
            components: ComponentScores::default(),
            warnings: vec![TechnicalWarning::new(WarningKind::NoData, Severity::High, reason)],
        }
    }
}

fn momentum_points(change_1y: Option<f64>) -> u32 {
    match change_1y {
        Some(c) if c >= 20.0 => 35,
        Some(c) if c >= 15.0 => 30,
        Some(c) if c >= 10.0 => 22,
        Some(c) if c >= 5.0 => 13,
        Some(c) if c >= 0.0 => 5,
        _ => 0,
    }
}

fn analyze_sector(sector: Option<&str>, stock_6m: Option<f64>, sector_bars: Option<&[Bar]>) -> SectorReading {
    let Some(etf) = sector.and_then(sector_etf) else {
        return SectorReading::neutral(None);
    };
    let sector_6m = sector_bars.and_then(|b| trailing_return(&closes(b), BARS_6M));
    let (Some(sector_return), Some(stock_return)) = (sector_6m, stock_6m) else {
        return SectorReading::neutral(Some(etf));
    };
    let relative_strength = stock_return - sector_return;

    let (sector_points, hot, cold) = if sector_return > 15.0 {
        (10, true, false)
    } else if sector_return > 5.0 {
        (7, false, false)
    } else if sector_return > 0.0 {
        (5, false, false)
    } else if sector_return > -10.0 {
        (2, false, false)
    } else {
        (0, false, true)
    };

    let relative_points = if relative_strength > 10.0 {
        15
    } else if relative_strength > 5.0 {
        12
    } else if relative_strength > 0.0 {
        8
    } else if relative_strength > -5.0 {
        4
    } else if relative_strength > -10.0 {
        2
    } else {
        0
    };

    let outperformer = relative_strength > 0.0;
    let status = if outperformer && hot {
        SectorStatus::Excellent
    } else if outperformer {
        SectorStatus::Good
    } else if cold {
        SectorStatus::Avoid
    } else {
        SectorStatus::Neutral
    };

    SectorReading {
        points: sector_points + relative_points,
        etf: Some(etf),
        sector_return: Some(sector_return),
        relative_strength: Some(relative_strength),
        status,
    }
}

fn analyze_trend(price: f64, ma_50: Option<f64>, ma_200: Option<f64>) -> TrendReading {
    let Some(ma_200) = ma_200.filter(|m| *m > 0.0) else {
        return TrendReading {
            points: 12,
            status: TrendStatus::NoData,
            distance: None,
            golden_cross: false,
        };
    };
    let distance = (price - ma_200) / ma_200 * 100.0;
    let golden_cross = ma_50.is_some_and(|m| m > ma_200);

    let (points, status) = if price > ma_200 {
        let (base, status) = if distance < 5.0 {
            (15, TrendStatus::UptrendEarly)
        } else if distance < 20.0 {
            (25, TrendStatus::Uptrend)
        } else if distance < 30.0 {
            (18, TrendStatus::UptrendExtended)
        } else {
            (10, TrendStatus::UptrendOverextended)
        };
        let bonus = if golden_cross { 3 } else { 0 };
        ((base + bonus).min(25), status)
    } else if price > ma_200 * 0.95 {
        (10, TrendStatus::Neutral)
    } else if price < ma_200 * 0.90 {
        (0, TrendStatus::DowntrendStrong)
    } else {
        (0, TrendStatus::Downtrend)
    };

    TrendReading {
        points,
        status,
        distance: Some(distance),
        golden_cross,
    }
}

fn volume_points(ratio: Option<f64>) -> u32 {
    match ratio {
        None => 7,
        Some(r) if r >= 1.5 => 15,
        Some(r) if r >= 1.2 => 12,
        Some(r) if r >= 0.8 => 8,
        Some(r) if r >= 0.5 => 4,
        Some(_) => 0,
    }
}

fn push_warnings(
    warnings: &mut Vec<TechnicalWarning>,
    momentum_12m: Option<f64>,
    trend: &TrendReading,
    volume_ratio: Option<f64>,
    sector: &SectorReading,
    sector_name: Option<&str>,
) {
    if let Some(change) = momentum_12m.filter(|c| *c > 100.0) {
        warnings.push(TechnicalWarning::new(
            WarningKind::ExtremeGain,
            Severity::High,
            format!("Extreme 1Y gain (+{:.0}%). Possible bubble.", change),
        ));
    }
    if let Some(distance) = trend.distance {
        if distance > 30.0 {
            warnings.push(TechnicalWarning::new(
                WarningKind::Overextended,
                Severity::Medium,
                format!("Price {:.0}% above MA200. Potential pullback risk.", distance),
            ));
        }
        if distance < -15.0 {
            warnings.push(TechnicalWarning::new(
                WarningKind::StrongDowntrend,
                Severity::High,
                "Price >15% below MA200. Strong downtrend.",
            ));
        }
    }
    if volume_ratio.is_some_and(|r| r < 0.5) {
        warnings.push(TechnicalWarning::new(
            WarningKind::LowVolume,
            Severity::Low,
            "Volume 50% below average. Weak signal reliability.",
        ));
    }
    if sector.status == SectorStatus::Avoid {
        warnings.push(TechnicalWarning::new(
            WarningKind::ColdSector,
            Severity::High,
            format!(
                "Sector {} is weak ({:+.0}% 6M).",
                sector_name.unwrap_or_default(),
                sector.sector_return.unwrap_or(0.0)
            ),
        ));
    }
    if let Some(rs) = sector.relative_strength.filter(|rs| *rs <= 0.0) {
        warnings.push(TechnicalWarning::new(
            WarningKind::RelativeWeakness,
            Severity::Medium,
            format!("Underperforming sector by {:.0}%.", rs.abs()),
        ));
    }
}
