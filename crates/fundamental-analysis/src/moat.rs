//! Quantitative moat proxy built from margin and return durability.
use screener_core::stats::{linear_slope, mean, population_std_dev};
use screener_core::IncomeStatement;

/// Gross-margin level, trend and stability blended into 0-100.
/// Needs at least four quarters with positive revenue.
pub fn pricing_power(income: &[IncomeStatement]) -> Option<f64> {
    let margins: Vec<f64> = income
        .iter()
        .take(8)
        .filter_map(|q| match (q.gross_profit, q.revenue) {
            (Some(gp), Some(rev)) if rev > 0.0 => Some(gp / rev * 100.0),
            _ => None,
        })
        .collect();
    if margins.len() < 4 {
        return None;
    }

    let avg = mean(&margins);
    let level = if avg >= 40.0 {
        100.0
    } else if avg >= 30.0 {
        70.0 + (avg - 30.0) * 3.0
    } else if avg >= 20.0 {
        40.0 + (avg - 20.0) * 3.0
    } else {
        (avg * 2.0).max(0.0)
    };

    let trend = if margins.len() >= 8 {
        let recent = mean(&margins[..4]);
        let older = mean(&margins[4..8]);
        if older > 0.0 {
            let change = (recent - older) / older * 100.0;
            if change >= 5.0 {
                100.0
            } else if change >= 0.0 {
                70.0 + change * 6.0
            } else if change >= -5.0 {
                40.0 + (change + 5.0) * 6.0
            } else {
                (40.0 + (change + 5.0) * 8.0).max(0.0)
            }
        } else {
            50.0
        }
    } else {
        // Fewer than 8 quarters: slope over time. Input is newest first.
        let chronological: Vec<f64> = margins.iter().rev().copied().collect();
        let slope = linear_slope(&chronological).unwrap_or(0.0);
        if slope >= 0.5 {
            100.0
        } else if slope >= 0.0 {
            70.0 + slope * 60.0
        } else if slope >= -0.5 {
            40.0 + (slope + 0.5) * 60.0
        } else {
            (40.0 + (slope + 0.5) * 80.0).max(0.0)
        }
    };

    let cv = if avg != 0.0 {
        population_std_dev(&margins) / avg.abs()
    } else {
        1.0
    };
    let stability = if cv <= 0.05 {
        100.0
    } else if cv <= 0.15 {
        70.0 + (0.15 - cv) * 300.0
    } else if cv <= 0.30 {
        40.0 + (0.30 - cv) * 200.0
    } else {
        (40.0 - (cv - 0.30) * 100.0).max(0.0)
    };

    Some(level * 0.40 + trend * 0.30 + stability * 0.30)
}

/// Operating income growth relative to revenue growth, scored 0-100.
/// Compares the latest quarter with the one three years back (or the oldest of at least eight).
pub fn operating_leverage(income: &[IncomeStatement]) -> Option<f64> {
    if income.len() < 8 {
        return None;
    }
    let recent = income.first()?;
    let old = if income.len() >= 12 { &income[11] } else { income.last()? };

    let recent_oi = recent.operating_income.filter(|v| *v != 0.0)?;
    let recent_rev = recent.revenue.filter(|v| *v != 0.0)?;
    let old_oi = old.operating_income.filter(|v| *v > 0.0)?;
    let old_rev = old.revenue.filter(|v| *v > 0.0)?;

    let oi_growth = (recent_oi / old_oi - 1.0) * 100.0;
    let rev_growth = (recent_rev / old_rev - 1.0) * 100.0;

    let leverage = if rev_growth > 1.0 {
        oi_growth / rev_growth
    } else if oi_growth > 5.0 {
        2.0
    } else {
        return Some(50.0);
    };

    let score = if leverage >= 1.5 {
        100.0
    } else if leverage >= 1.0 {
        70.0 + (leverage - 1.0) * 60.0
    } else if leverage >= 0.5 {
        40.0 + (leverage - 0.5) * 60.0
    } else {
        (leverage * 80.0).max(0.0)
    };
    Some(score)
}

/// ROIC level and stability blended into 0-100. Needs four quarterly ROIC values.
pub fn roic_persistence_score(roic_quarterly: &[f64]) -> Option<f64> {
    if roic_quarterly.len() < 4 {
        return None;
    }
    let avg = mean(roic_quarterly);
    let level = if avg >= 25.0 {
        100.0
    } else if avg >= 15.0 {
        70.0 + (avg - 15.0) * 3.0
    } else if avg >= 10.0 {
        40.0 + (avg - 10.0) * 6.0
    } else {
        (avg * 4.0).max(0.0)
    };

    let cv = if avg != 0.0 {
        population_std_dev(roic_quarterly) / avg.abs()
    } else {
        1.0
    };
    let stability = if cv <= 0.10 {
        100.0
    } else if cv <= 0.25 {
        70.0 + (0.25 - cv) * 200.0
    } else if cv <= 0.50 {
        40.0 + (0.50 - cv) * 120.0
    } else {
        (40.0 - (cv - 0.50) * 80.0).max(0.0)
    };

    Some(level * 0.50 + stability * 0.50)
}

/// Inputs that push the moat score down when the business is deteriorating.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoatTrends {
    pub revenue_growth_3y: Option<f64>,
    pub roic_trend: Option<f64>,
    pub margin_trend: Option<f64>,
}

/// Blend of the three components. At least two must be known; the missing
/// one and the unallocated quarter of the weight sit at the neutral 50.
pub fn moat_score(
    pricing_power: Option<f64>,
    operating_leverage: Option<f64>,
    roic_persistence: Option<f64>,
    trends: MoatTrends,
) -> Option<f64> {
    let known = [pricing_power, operating_leverage, roic_persistence]
        .iter()
        .filter(|c| c.is_some())
        .count();
    if known < 2 {
        return None;
    }

    let base = pricing_power.unwrap_or(50.0) * 0.30
        + operating_leverage.unwrap_or(50.0) * 0.25
        + roic_persistence.unwrap_or(50.0) * 0.20
        + 50.0 * 0.25;

    let mut multiplier = 1.0;
    if trends.revenue_growth_3y.is_some_and(|g| g < 0.0) {
        multiplier *= 0.80;
    }
    if trends.roic_trend.is_some_and(|t| t < -10.0) {
        multiplier *= 0.85;
    }
    if trends.margin_trend.is_some_and(|t| t < -5.0) {
        multiplier *= 0.85;
    }
    Some(base * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quarter(revenue: f64, gross_profit: f64, operating_income: f64) -> IncomeStatement {
        IncomeStatement {
            revenue: Some(revenue),
            gross_profit: Some(gross_profit),
            operating_income: Some(operating_income),
            ..Default::default()
        }
    }

    #[test]
    fn test_pricing_power_high_stable_margin() {
        let income: Vec<_> = (0..8).map(|_| quarter(100.0, 60.0, 20.0)).collect();
        // level 100, trend 70 (flat), stability 100
        let score = pricing_power(&income).unwrap();
        assert!((score - 91.0).abs() < 1e-9);
    }

    #[test]
    fn test_pricing_power_needs_four_quarters() {
        let income: Vec<_> = (0..3).map(|_| quarter(100.0, 60.0, 20.0)).collect();
        assert_eq!(pricing_power(&income), None);
    }

    #[test]
    fn test_operating_leverage_scale_economies() {
        // newest first: revenue 120 vs 100 (+20%), OI 40 vs 20 (+100%) -> leverage 5
        let mut income = vec![quarter(120.0, 50.0, 40.0)];
        income.extend((0..10).map(|_| quarter(110.0, 50.0, 30.0)));
        income.push(quarter(100.0, 50.0, 20.0));
        assert_eq!(operating_leverage(&income), Some(100.0));
    }

    #[test]
    fn test_roic_persistence_score_stable_high() {
        assert_eq!(roic_persistence_score(&[30.0, 30.0, 30.0, 30.0]), Some(100.0));
        assert_eq!(roic_persistence_score(&[30.0, 30.0]), None);
    }

    #[test]
    fn test_moat_requires_two_components() {
        assert_eq!(moat_score(Some(80.0), None, None, MoatTrends::default()), None);
        let score = moat_score(Some(100.0), Some(100.0), None, MoatTrends::default()).unwrap();
        // 30 + 25 + 10 + 12.5
        assert!((score - 77.5).abs() < 1e-9);
    }

    #[test]
    fn test_moat_penalties_compound() {
        let trends = MoatTrends {
            revenue_growth_3y: Some(-2.0),
            roic_trend: Some(-20.0),
            margin_trend: Some(0.0),
        };
        let score = moat_score(Some(100.0), Some(100.0), Some(100.0), trends).unwrap();
        let expected = 87.5 * 0.80 * 0.85;
        assert!((score - expected).abs() < 1e-9);
    }
}
