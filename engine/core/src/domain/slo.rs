// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # SLO Burn-Rate Domain Types
//!
//! Burn rate over a window is the observed bad-event ratio divided by the error
//! budget (`1 - objective`). A burn rate of 1.0 exhausts the budget exactly at
//! the end of the SLO period.
//!
//! Each SLO carries two [`BurnRateWindow`] pairs. The warning pair uses a slow
//! burn (default 6x over 30m/6h), the critical pair a fast burn (default 14.4x
//! over 5m/1h). A pair only fires when both of its windows are over threshold
//! at the same tick.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// What counts as a bad event for an SLO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SloKind {
    /// Denied decisions count against the budget.
    DenialRate,
    /// Decisions slower than `threshold_ms` count against the budget.
    Latency { threshold_ms: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurnRateWindow {
    #[serde(with = "humantime_serde")]
    pub short: Duration,
    #[serde(with = "humantime_serde")]
    pub long: Duration,
    pub threshold: f64,
}

impl BurnRateWindow {
    pub fn warning_default() -> Self {
        Self {
            short: Duration::from_secs(30 * 60),
            long: Duration::from_secs(6 * 3600),
            threshold: 6.0,
        }
    }

    pub fn critical_default() -> Self {
        Self {
            short: Duration::from_secs(5 * 60),
            long: Duration::from_secs(3600),
            threshold: 14.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SloDefinition {
    pub name: String,
    #[serde(flatten)]
    pub kind: SloKind,
    /// Target good-event ratio, e.g. `0.999`.
    pub objective: f64,
    #[serde(default = "BurnRateWindow::warning_default")]
    pub warning: BurnRateWindow,
    #[serde(default = "BurnRateWindow::critical_default")]
    pub critical: BurnRateWindow,
}

impl SloDefinition {
    pub fn error_budget(&self) -> f64 {
        1.0 - self.objective
    }

    pub fn longest_window(&self) -> Duration {
        [self.warning.short, self.warning.long, self.critical.short, self.critical.long]
            .into_iter()
            .max()
            .unwrap_or_default()
    }

    pub fn is_bad(&self, allow: bool, evaluation_time_ms: f64) -> bool {
        match &self.kind {
            SloKind::DenialRate => !allow,
            SloKind::Latency { threshold_ms } => evaluation_time_ms > *threshold_ms,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("SLO name cannot be empty".to_string());
        }
        if !(self.objective > 0.0 && self.objective < 1.0) {
            return Err(format!("SLO '{}' objective must be in (0, 1)", self.name));
        }
        for (label, w) in [("warning", &self.warning), ("critical", &self.critical)] {
            if w.short.is_zero() || w.long <= w.short {
                return Err(format!(
                    "SLO '{}' {} windows must satisfy 0 < short < long",
                    self.name, label
                ));
            }
            if w.threshold <= 0.0 {
                return Err(format!("SLO '{}' {} threshold must be positive", self.name, label));
            }
        }
        if self.critical.threshold <= self.warning.threshold {
            return Err(format!(
                "SLO '{}' critical threshold must exceed warning threshold",
                self.name
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SloState {
    Nominal,
    Warning,
    Critical,
}

impl fmt::Display for SloState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Nominal => "nominal",
            Self::Warning => "warning",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Burn rates computed at one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BurnRates {
    pub warning_short: f64,
    pub warning_long: f64,
    pub critical_short: f64,
    pub critical_long: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SloStatus {
    pub name: String,
    pub state: SloState,
    pub burn_rates: BurnRates,
    pub stale_metrics: bool,
    pub events_observed: u64,
}
