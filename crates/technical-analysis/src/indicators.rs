use screener_core::Bar;

/// Latest value of the simple moving average, if there is enough data.
pub fn last_sma(data: &[f64], period: usize) -> Option<f64> {
    if period == 0 || data.len() < period {
        return None;
    }
    let window = &data[data.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Percent return over the last `lookback` bars. Uses the oldest available
/// bar when the series is shorter than `lookback + 1`.
pub fn trailing_return(closes: &[f64], lookback: usize) -> Option<f64> {
    if closes.len() < 2 || lookback == 0 {
        return None;
    }
    let last = *closes.last()?;
    let start_idx = closes.len().saturating_sub(lookback + 1);
    let start = closes[start_idx];
    if start <= 0.0 {
        return None;
    }
    Some((last / start - 1.0) * 100.0)
}

/// Ratio of the short-window average volume to the long-window average.
pub fn volume_ratio(volumes: &[f64], short: usize, long: usize) -> Option<f64> {
    let recent = last_sma(volumes, short)?;
    let baseline = last_sma(volumes, long)?;
    if baseline <= 0.0 {
        return None;
    }
    Some(recent / baseline)
}

pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

pub fn volumes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.volume).collect()
}
