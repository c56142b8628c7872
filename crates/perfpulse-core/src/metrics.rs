//! Core Web Vitals and Lighthouse category metrics.
//!
//! Every metric has a fixed direction (whether lower or higher values are
//! better) and a pair of quality-band boundaries matching the published
//! "good / needs improvement / poor" thresholds.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Largest Contentful Paint, milliseconds.
    Lcp,
    /// First Contentful Paint, milliseconds.
    Fcp,
    /// Cumulative Layout Shift, unitless.
    Cls,
    /// Interaction to Next Paint, milliseconds.
    Inp,
    /// Total Blocking Time, milliseconds.
    Tbt,
    /// Time to First Byte, milliseconds.
    Ttfb,
    /// Speed Index, milliseconds.
    SpeedIndex,
    /// Lighthouse performance category score, 0-100.
    Performance,
    Accessibility,
    BestPractices,
    Seo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    LowerIsBetter,
    HigherIsBetter,
}

/// Quality bands ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBand {
    Good,
    NeedsImprovement,
    Poor,
}

impl Metric {
    pub const ALL: [Metric; 11] = [
        Metric::Lcp,
        Metric::Fcp,
        Metric::Cls,
        Metric::Inp,
        Metric::Tbt,
        Metric::Ttfb,
        Metric::SpeedIndex,
        Metric::Performance,
        Metric::Accessibility,
        Metric::BestPractices,
        Metric::Seo,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Lcp => "lcp",
            Metric::Fcp => "fcp",
            Metric::Cls => "cls",
            Metric::Inp => "inp",
            Metric::Tbt => "tbt",
            Metric::Ttfb => "ttfb",
            Metric::SpeedIndex => "speed_index",
            Metric::Performance => "performance",
            Metric::Accessibility => "accessibility",
            Metric::BestPractices => "best_practices",
            Metric::Seo => "seo",
        }
    }

    /// Look up a metric by its wire key.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Metric> {
        Metric::ALL.into_iter().find(|m| m.as_str() == key)
    }

    #[must_use]
    pub fn direction(self) -> Direction {
        match self {
            Metric::Performance | Metric::Accessibility | Metric::BestPractices | Metric::Seo => {
                Direction::HigherIsBetter
            }
            _ => Direction::LowerIsBetter,
        }
    }

    /// `(good, poor)` boundaries. For lower-is-better metrics a value is good
    /// at or below `good` and poor above `poor`; for scores it is good at or
    /// above `good` and poor below `poor`.
    #[must_use]
    pub fn band_boundaries(self) -> (f64, f64) {
        match self {
            Metric::Lcp => (2500.0, 4000.0),
            Metric::Fcp => (1800.0, 3000.0),
            Metric::Cls => (0.1, 0.25),
            Metric::Inp => (200.0, 500.0),
            Metric::Tbt => (200.0, 600.0),
            Metric::Ttfb => (800.0, 1800.0),
            Metric::SpeedIndex => (3400.0, 5800.0),
            Metric::Performance | Metric::Accessibility | Metric::BestPractices | Metric::Seo => {
                (90.0, 50.0)
            }
        }
    }

    #[must_use]
    pub fn band(self, value: f64) -> QualityBand {
        let (good, poor) = self.band_boundaries();
        match self.direction() {
            Direction::LowerIsBetter => {
                if value <= good {
                    QualityBand::Good
                } else if value <= poor {
                    QualityBand::NeedsImprovement
                } else {
                    QualityBand::Poor
                }
            }
            Direction::HigherIsBetter => {
                if value >= good {
                    QualityBand::Good
                } else if value >= poor {
                    QualityBand::NeedsImprovement
                } else {
                    QualityBand::Poor
                }
            }
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sparse set of metric readings. Workers may omit metrics they could not
/// measure, so every operation treats a missing metric as "no observation".
///
/// Deserialization keeps only known keys with finite numeric readings; a
/// `null`, a non-number or an unrecognized key is dropped rather than
/// failing the whole report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricVector(BTreeMap<Metric, f64>);

impl<'de> Deserialize<'de> for MetricVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let readings = Map::<String, Value>::deserialize(deserializer)?;
        Ok(Self::from_readings(&readings))
    }
}

impl MetricVector {
    /// Build a vector from loosely typed worker readings.
    #[must_use]
    pub fn from_readings(readings: &Map<String, Value>) -> Self {
        readings
            .iter()
            .filter_map(|(key, value)| Some((Metric::from_key(key)?, value.as_f64()?)))
            .collect()
    }

    /// Whether every reading in `readings` made it into a vector.
    #[must_use]
    pub fn covers(&self, readings: &Map<String, Value>) -> bool {
        self.len() == readings.len()
    }

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, ignoring non-finite readings.
    #[must_use]
    pub fn with(mut self, metric: Metric, value: f64) -> Self {
        self.insert(metric, value);
        self
    }

    pub fn insert(&mut self, metric: Metric, value: f64) {
        if value.is_finite() {
            self.0.insert(metric, value);
        }
    }

    #[must_use]
    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.0.get(&metric).copied().filter(|v| v.is_finite())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        self.0
            .iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(m, v)| (*m, *v))
    }

    /// Per-metric median across `vectors`. A metric appears in the result
    /// only if at least one vector reports it.
    pub fn median_of<'a, I>(vectors: I) -> Self
    where
        I: IntoIterator<Item = &'a MetricVector>,
    {
        let mut samples: BTreeMap<Metric, Vec<f64>> = BTreeMap::new();
        for vector in vectors {
            for (metric, value) in vector.iter() {
                samples.entry(metric).or_default().push(value);
            }
        }

        let mut out = MetricVector::new();
        for (metric, mut values) in samples {
            if let Some(m) = median(&mut values) {
                out.insert(metric, m);
            }
        }
        out
    }
}

impl FromIterator<(Metric, f64)> for MetricVector {
    fn from_iter<T: IntoIterator<Item = (Metric, f64)>>(iter: T) -> Self {
        let mut out = MetricVector::new();
        for (metric, value) in iter {
            out.insert(metric, value);
        }
        out
    }
}

/// Median of `values`; the mean of the two middle values for an even count.
/// Sorts `values` in place.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_handles_odd_and_even_counts() {
        assert_eq!(median(&mut []), None);
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn lcp_bands_follow_core_web_vitals_thresholds() {
        assert_eq!(Metric::Lcp.band(2500.0), QualityBand::Good);
        assert_eq!(Metric::Lcp.band(2501.0), QualityBand::NeedsImprovement);
        assert_eq!(Metric::Lcp.band(4000.0), QualityBand::NeedsImprovement);
        assert_eq!(Metric::Lcp.band(4001.0), QualityBand::Poor);
    }

    #[test]
    fn inp_and_tbt_have_distinct_poor_boundaries() {
        assert_eq!(Metric::Inp.band_boundaries(), (200.0, 500.0));
        assert_eq!(Metric::Tbt.band_boundaries(), (200.0, 600.0));
        assert_eq!(Metric::Inp.band(550.0), QualityBand::Poor);
        assert_eq!(Metric::Tbt.band(550.0), QualityBand::NeedsImprovement);
    }

    #[test]
    fn score_bands_are_higher_is_better() {
        assert_eq!(Metric::Performance.direction(), Direction::HigherIsBetter);
        assert_eq!(Metric::Performance.band(95.0), QualityBand::Good);
        assert_eq!(Metric::Performance.band(70.0), QualityBand::NeedsImprovement);
        assert_eq!(Metric::Performance.band(49.0), QualityBand::Poor);
    }

    #[test]
    fn vector_ignores_non_finite_values() {
        let v = MetricVector::new()
            .with(Metric::Lcp, f64::NAN)
            .with(Metric::Cls, 0.05);
        assert_eq!(v.len(), 1);
        assert_eq!(v.get(Metric::Lcp), None);
        assert_eq!(v.get(Metric::Cls), Some(0.05));
    }

    #[test]
    fn median_of_skips_missing_metrics_per_slot() {
        let a = MetricVector::new()
            .with(Metric::Lcp, 2000.0)
            .with(Metric::Cls, 0.1);
        let b = MetricVector::new().with(Metric::Lcp, 3000.0);
        let c = MetricVector::new().with(Metric::Lcp, 2500.0);

        let m = MetricVector::median_of([&a, &b, &c]);
        assert_eq!(m.get(Metric::Lcp), Some(2500.0));
        assert_eq!(m.get(Metric::Cls), Some(0.1));
        assert_eq!(m.get(Metric::Fcp), None);
    }

    #[test]
    fn vector_drops_null_and_unknown_readings() {
        let v: MetricVector =
            serde_json::from_str(r#"{"lcp":2100.5,"inp":null,"fid":12.0,"tti":"n/a","cls":0}"#)
                .expect("lenient metrics");
        assert_eq!(v.len(), 2);
        assert_eq!(v.get(Metric::Lcp), Some(2100.5));
        assert_eq!(v.get(Metric::Cls), Some(0.0));
        assert_eq!(v.get(Metric::Inp), None);
    }

    #[test]
    fn vector_still_rejects_a_non_object() {
        assert!(serde_json::from_str::<MetricVector>("[1, 2]").is_err());
    }

    #[test]
    fn metric_keys_round_trip_through_from_key() {
        for metric in Metric::ALL {
            assert_eq!(Metric::from_key(metric.as_str()), Some(metric));
        }
        assert_eq!(Metric::from_key("fid"), None);
    }

    #[test]
    fn vector_serializes_as_snake_case_map() {
        let v = MetricVector::new()
            .with(Metric::SpeedIndex, 3100.0)
            .with(Metric::BestPractices, 92.0);
        let json = serde_json::to_value(&v).expect("serialize");
        assert_eq!(json["speed_index"], 3100.0);
        assert_eq!(json["best_practices"], 92.0);

        let back: MetricVector = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, v);
    }
}
