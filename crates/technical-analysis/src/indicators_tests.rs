#[cfg(test)]
mod tests {
    use super::super::indicators::*;
    use chrono::{Duration, TimeZone, Utc};
    use screener_core::Bar;

    // Helper function to create sample price data
    fn sample_prices() -> Vec<f64> {
        vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 45.61, 46.28, 46.28, 46.00, 46.03, 46.41, 46.22, 45.64,
        ]
    }

    fn sample_bars(closes: &[f64], volume: f64) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + Duration::days(i as i64),
                open: close,
                high: close * 1.01,
                low: close * 0.99,
                close,
                volume,
                vwap: None,
            })
            .collect()
    }

    #[test]
    fn test_last_sma_uses_trailing_window() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((last_sma(&data, 3).unwrap() - 4.0).abs() < 1e-9); // (3+4+5)/3
        assert!((last_sma(&data, 5).unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_last_sma_insufficient_data() {
        assert_eq!(last_sma(&[1.0, 2.0], 5), None);
        assert_eq!(last_sma(&[1.0, 2.0], 0), None);
    }

    #[test]
    fn test_last_sma_on_price_series() {
        let prices = sample_prices();
        let expected = (46.00 + 46.03 + 46.41 + 46.22 + 45.64) / 5.0;
        assert!((last_sma(&prices, 5).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_return() {
        let data = vec![100.0, 105.0, 110.0, 120.0];
        // 2 bars back: 105 -> 120
        let r = trailing_return(&data, 2).unwrap();
        assert!((r - (120.0 / 105.0 - 1.0) * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_return_short_series_uses_first_bar() {
        let data = vec![50.0, 60.0, 75.0];
        let r = trailing_return(&data, 252).unwrap();
        assert!((r - 50.0).abs() < 1e-9);
        assert_eq!(trailing_return(&[10.0], 5), None);
    }

    #[test]
    fn test_volume_ratio() {
        let mut volumes = vec![1_000.0; 45];
        volumes.extend(vec![2_000.0; 5]);
        // 5-day 2000, 50-day 1100
        let ratio = volume_ratio(&volumes, 5, 50).unwrap();
        assert!((ratio - 2000.0 / 1100.0).abs() < 1e-9);
        assert_eq!(volume_ratio(&volumes[..10], 5, 50), None);
    }

    #[test]
    fn test_bar_extraction() {
        let bars = sample_bars(&sample_prices(), 1_000_000.0);
        assert_eq!(closes(&bars), sample_prices());
        assert!(volumes(&bars).iter().all(|v| *v == 1_000_000.0));
    }
}
