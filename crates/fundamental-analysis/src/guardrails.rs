use screener_core::{CheckResult, CompanyType, GuardrailConfig, GuardrailReport, MetricId, MetricRecord};

/// Accounting and balance-sheet red flags, evaluated in a fixed order.
pub struct GuardrailEvaluator {
    config: GuardrailConfig,
}

impl GuardrailEvaluator {
    pub fn new(config: GuardrailConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, record: &MetricRecord) -> GuardrailReport {
        let checks = vec![
            self.check_data_quality(record),
            self.check_dilution(record),
            self.check_leverage(record),
            self.check_altman_z(record),
            self.check_beneish_m(record),
            self.check_accruals(record),
            self.check_acquisitions(record),
            self.check_sector_compatibility(record),
        ];
        GuardrailReport::from_checks(checks)
    }

    fn check_data_quality(&self, record: &MetricRecord) -> CheckResult {
        let mut problems = Vec::new();
        if record.quarters_available < self.config.min_history_quarters {
            problems.push(format!(
                "only {} quarters of history (need {})",
                record.quarters_available, self.config.min_history_quarters
            ));
        }
        let non_finite = record.non_finite_metrics();
        if !non_finite.is_empty() {
            let names: Vec<&str> = non_finite.iter().map(|m| m.name()).collect();
            problems.push(format!("non-finite values: {}", names.join(", ")));
        }

        if problems.is_empty() {
            CheckResult::pass("data_quality")
        } else {
            CheckResult::warn("data_quality", format!("Data quality: {}", problems.join("; ")))
        }
    }

    fn check_dilution(&self, record: &MetricRecord) -> CheckResult {
        let Some(dilution) = record.get(MetricId::DilutionPct) else {
            return CheckResult::warn("dilution", "Dilution: insufficient data");
        };
        if dilution > self.config.dilution_fail_pct {
            CheckResult::fail("dilution", format!("Dilution {:.1}% > {:.0}%", dilution, self.config.dilution_fail_pct))
        } else if dilution > self.config.dilution_warn_pct {
            CheckResult::warn("dilution", format!("Dilution {:.1}% > {:.0}%", dilution, self.config.dilution_warn_pct))
        } else {
            CheckResult::pass("dilution")
        }
    }

    fn check_leverage(&self, record: &MetricRecord) -> CheckResult {
        if record.flags.is_financial {
            return CheckResult::pass_with("leverage", "Leverage: excluded for financial sector");
        }

        if record.interest_coverage.is_some_and(|c| c <= 0.0) {
            return CheckResult::fail("leverage", "Interest coverage <= 0");
        }

        match record.get(MetricId::NetDebtEbitda) {
            Some(nd) if nd > self.config.net_debt_ebitda_fail => CheckResult::fail(
                "leverage",
                format!("NetDebt/EBITDA {:.1}x > {:.1}x", nd, self.config.net_debt_ebitda_fail),
            ),
            Some(nd) if nd > self.config.net_debt_ebitda_warn => CheckResult::warn(
                "leverage",
                format!("NetDebt/EBITDA {:.1}x > {:.1}x", nd, self.config.net_debt_ebitda_warn),
            ),
            Some(_) => CheckResult::pass("leverage"),
            None => CheckResult::warn("leverage", "Leverage: insufficient data"),
        }
    }

    fn check_altman_z(&self, record: &MetricRecord) -> CheckResult {
        if record.company_type() != CompanyType::NonFinancial {
            return CheckResult::pass("altman_z");
        }
        match record.altman_z.filter(|z| z.is_finite()) {
            Some(z) if z < self.config.altman_z_fail => {
                CheckResult::fail("altman_z", format!("Altman Z {:.2} (distress)", z))
            }
            Some(z) if z < self.config.altman_z_warn => {
                CheckResult::warn("altman_z", format!("Altman Z {:.2} (grey zone)", z))
            }
            Some(_) => CheckResult::pass("altman_z"),
            None => CheckResult::pass_with("altman_z", "Altman Z: insufficient data"),
        }
    }

    fn check_beneish_m(&self, record: &MetricRecord) -> CheckResult {
        match record.beneish_m.filter(|m| m.is_finite()) {
            Some(m) if m > self.config.beneish_m_fail => {
                CheckResult::fail("beneish_m", format!("Beneish M {:.2} (likely manipulator)", m))
            }
            Some(m) if m > self.config.beneish_m_warn => {
                CheckResult::warn("beneish_m", format!("Beneish M {:.2} (elevated)", m))
            }
            _ => CheckResult::pass("beneish_m"),
        }
    }

    fn check_accruals(&self, record: &MetricRecord) -> CheckResult {
        if record.company_type() != CompanyType::NonFinancial {
            return CheckResult::pass("accruals");
        }
        match record.accruals_noa.filter(|a| a.is_finite()) {
            Some(a) if a > self.config.accruals_warn_pct => CheckResult::warn(
                "accruals",
                format!("Accruals {:.1}% of NOA > {:.0}%", a, self.config.accruals_warn_pct),
            ),
            _ => CheckResult::pass("accruals"),
        }
    }

    fn check_acquisitions(&self, record: &MetricRecord) -> CheckResult {
        let growth = record.goodwill_growth.filter(|g| g.is_finite());
        let share = record.goodwill_to_assets.filter(|s| s.is_finite());
        match (growth, share) {
            (Some(g), Some(s))
                if g > self.config.goodwill_growth_warn_pct && s > self.config.goodwill_assets_warn_pct =>
            {
                CheckResult::warn(
                    "acquisitions",
                    format!("M&A heavy: goodwill+intangibles +{:.0}% YoY, {:.0}% of assets", g, s),
                )
            }
            (Some(g), _) if g > self.config.goodwill_growth_warn_pct => CheckResult::pass_with(
                "acquisitions",
                format!("Goodwill+intangibles +{:.0}% YoY", g),
            ),
            _ => CheckResult::pass("acquisitions"),
        }
    }

    fn check_sector_compatibility(&self, record: &MetricRecord) -> CheckResult {
        if record.flags.is_financial
            && MetricId::ALL
                .iter()
                .any(|m| m.is_enterprise_value_based() && record.get(*m).is_some())
        {
            return CheckResult::pass_with(
                "sector_compatibility",
                "EV-based metrics excluded for financial sector",
            );
        }
        CheckResult::pass("sector_compatibility")
    }
}
