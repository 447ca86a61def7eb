//! Alert decision for the external notification layer
//!
//! The engine only decides whether to alert and why; formatting and delivery
//! belong to the caller.

use crate::drift::DriftReport;
use crate::drift_trend::DriftTrend;
use crate::regime::{Regime, RegimeReport};
use crate::validator::ValidationReport;
use serde::{Deserialize, Serialize};

/// Monitoring outcome that may warrant an alert
#[derive(Debug, Clone)]
pub enum AlertEvent {
    Drift(DriftReport),
    DriftTrend(DriftTrend),
    Regime(RegimeReport),
    Validation(ValidationReport),
}

/// Whether to alert, with the triggering reasons
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertDecision {
    pub alert: bool,
    pub reason: String,
}

fn trigger(event: &AlertEvent) -> Option<String> {
    match event {
        AlertEvent::Drift(report) if report.drift_detected => Some(format!(
            "Drift severity {} ({} of {} tests failed): {}",
            report.severity,
            report.failed_tests().len(),
            report.tests.len(),
            report.recommendation
        )),
        AlertEvent::DriftTrend(trend) if trend.requires_action() => Some(format!(
            "{} consecutive HIGH drift checks on {}",
            trend.consecutive_high, trend.horizon
        )),
        AlertEvent::Regime(report) if report.regime != Regime::Normal => Some(format!(
            "Regime {} (interval multiplier {:.2})",
            report.regime, report.volatility_multiplier
        )),
        AlertEvent::Validation(report) if !report.is_acceptable() => Some(format!(
            "{} backtest unacceptable: MAPE {:.2}%, CI95 coverage {:.1}%",
            report.horizon,
            report.mape.mean,
            report.ci95_coverage.mean * 100.0
        )),
        _ => None,
    }
}

/// Decide whether any event warrants an alert
pub fn should_alert(events: &[AlertEvent]) -> AlertDecision {
    let reasons: Vec<String> = events.iter().filter_map(trigger).collect();
    if reasons.is_empty() {
        AlertDecision {
            alert: false,
            reason: "No alert conditions met".to_string(),
        }
    } else {
        AlertDecision {
            alert: true,
            reason: reasons.join("; "),
        }
    }
}
