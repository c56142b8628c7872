//! Rolling baselines and regression classification.
//!
//! A baseline is a bounded window of per-pulse metric vectors for one
//! (target, url) pair. Its reference vector is the per-metric median of the
//! window. [`fold_baseline`] is the pure step the stores run inside their
//! per-key critical section: compare the new pulse against the current
//! reference, then fold it into the window.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::{Direction, Metric, MetricVector};
use crate::CoreError;

const DEFAULT_WINDOW_SIZE: usize = 5;
const DEFAULT_REGRESSION_THRESHOLD_PCT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselinePolicy {
    /// Maximum number of pulses kept in the window.
    pub window_size: usize,
    /// Percentage change beyond which a metric is a regression or improvement.
    pub regression_threshold_pct: f64,
}

impl Default for BaselinePolicy {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            regression_threshold_pct: DEFAULT_REGRESSION_THRESHOLD_PCT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowEntry {
    pub pulse_id: i64,
    pub metrics: MetricVector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineWindow {
    pub window_size: usize,
    /// Oldest first.
    pub entries: Vec<WindowEntry>,
    pub reference: MetricVector,
    pub last_pulse_id: Option<i64>,
}

impl BaselineWindow {
    #[must_use]
    pub fn seed(pulse_id: i64, metrics: &MetricVector, window_size: usize) -> Self {
        let mut window = Self {
            window_size: window_size.max(1),
            entries: Vec::new(),
            reference: MetricVector::new(),
            last_pulse_id: None,
        };
        window.push(pulse_id, metrics);
        window
    }

    #[must_use]
    pub fn contains(&self, pulse_id: i64) -> bool {
        self.entries.iter().any(|e| e.pulse_id == pulse_id)
    }

    fn push(&mut self, pulse_id: i64, metrics: &MetricVector) {
        self.entries.push(WindowEntry {
            pulse_id,
            metrics: metrics.clone(),
        });
        if self.entries.len() > self.window_size {
            let excess = self.entries.len() - self.window_size;
            self.entries.drain(..excess);
        }
        self.reference = MetricVector::median_of(self.entries.iter().map(|e| &e.metrics));
        self.last_pulse_id = Some(pulse_id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Regression,
    Improvement,
    Neutral,
}

impl Classification {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Regression => "regression",
            Classification::Improvement => "improvement",
            Classification::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Classification {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regression" => Ok(Classification::Regression),
            "improvement" => Ok(Classification::Improvement),
            "neutral" => Ok(Classification::Neutral),
            other => Err(CoreError::UnknownClassification(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub value: f64,
    pub reference: Option<f64>,
    pub delta: Option<f64>,
    /// `None` when there is no reference or the reference is zero.
    pub pct_change: Option<f64>,
    pub classification: Classification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub overall: Classification,
    pub metrics: BTreeMap<Metric, MetricComparison>,
}

impl Comparison {
    fn from_metrics(metrics: BTreeMap<Metric, MetricComparison>) -> Self {
        let any = |c: Classification| metrics.values().any(|m| m.classification == c);
        let overall = if any(Classification::Regression) {
            Classification::Regression
        } else if any(Classification::Improvement) {
            Classification::Improvement
        } else {
            Classification::Neutral
        };
        Self { overall, metrics }
    }
}

/// Compare one metric reading against its reference.
///
/// A metric regresses when it worsens by more than `threshold_pct` percent or
/// falls into a worse quality band, and improves on the mirror conditions.
#[must_use]
pub fn classify_metric(
    metric: Metric,
    value: f64,
    reference: Option<f64>,
    threshold_pct: f64,
) -> MetricComparison {
    let Some(reference) = reference else {
        return MetricComparison {
            value,
            reference: None,
            delta: None,
            pct_change: None,
            classification: Classification::Neutral,
        };
    };

    let delta = value - reference;
    let pct_change = (reference != 0.0).then(|| delta / reference.abs() * 100.0);

    // Positive means "worse" regardless of the metric's direction.
    let worsening_pct = pct_change.map(|pct| match metric.direction() {
        Direction::LowerIsBetter => pct,
        Direction::HigherIsBetter => -pct,
    });

    let band_now = metric.band(value);
    let band_ref = metric.band(reference);

    let classification = match worsening_pct {
        Some(w) if w > threshold_pct => Classification::Regression,
        _ if band_now > band_ref => Classification::Regression,
        Some(w) if w < -threshold_pct => Classification::Improvement,
        _ if band_now < band_ref => Classification::Improvement,
        _ => Classification::Neutral,
    };

    MetricComparison {
        value,
        reference: Some(reference),
        delta: Some(delta),
        pct_change,
        classification,
    }
}

/// Current baseline for one (target, url) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub target_id: i64,
    pub url_id: i64,
    pub window: BaselineWindow,
    pub updated_at: DateTime<Utc>,
}

/// Immutable comparison of one completed pulse against its baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistic {
    pub id: i64,
    pub pulse_id: i64,
    pub target_id: i64,
    pub url_id: i64,
    /// The pulse's aggregated metric vector.
    pub metrics: MetricVector,
    pub comparison: Comparison,
    pub seeded_baseline: bool,
    pub created_at: DateTime<Utc>,
}

/// Result of folding one completed pulse into its baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct Finalization {
    pub window: BaselineWindow,
    pub comparison: Comparison,
    /// True when this pulse created the baseline.
    pub seeded: bool,
}

/// Compare `metrics` against `current` and fold the pulse into the window.
///
/// Returns `None` when `pulse_id` is already part of the window, so a
/// repeated finalize never double-counts a pulse.
#[must_use]
pub fn fold_baseline(
    current: Option<&BaselineWindow>,
    pulse_id: i64,
    metrics: &MetricVector,
    policy: &BaselinePolicy,
) -> Option<Finalization> {
    match current {
        None => {
            let comparison = Comparison::from_metrics(
                metrics
                    .iter()
                    .map(|(m, v)| (m, classify_metric(m, v, None, policy.regression_threshold_pct)))
                    .collect(),
            );
            Some(Finalization {
                window: BaselineWindow::seed(pulse_id, metrics, policy.window_size),
                comparison,
                seeded: true,
            })
        }
        Some(window) if window.contains(pulse_id) => None,
        Some(window) => {
            let comparison = Comparison::from_metrics(
                metrics
                    .iter()
                    .map(|(m, v)| {
                        (
                            m,
                            classify_metric(
                                m,
                                v,
                                window.reference.get(m),
                                policy.regression_threshold_pct,
                            ),
                        )
                    })
                    .collect(),
            );

            let mut next = window.clone();
            next.window_size = policy.window_size.max(1);
            next.push(pulse_id, metrics);

            Some(Finalization {
                window: next,
                comparison,
                seeded: false,
            })
        }
    }
}

#[cfg(test)]
#[path = "baseline_test.rs"]
mod tests;
