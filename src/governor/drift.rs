// SPDX-License-Identifier: MIT

//! Column-by-column drift detection between two snapshots
//!
//! Numeric columns use the two-sample Kolmogorov-Smirnov test; every other
//! kind uses a chi-square goodness-of-fit test on normalized frequencies
//! aligned over the union of categories.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use super::dataset::{Column, ColumnKind, Dataset};
use super::error::Result;
use super::stats;

/// Default significance level
pub const DEFAULT_SIGNIFICANCE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatTest {
    #[serde(rename = "Kolmogorov-Smirnov")]
    KolmogorovSmirnov,
    #[serde(rename = "Chi-square")]
    ChiSquare,
}

impl StatTest {
    fn for_kind(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Numeric => StatTest::KolmogorovSmirnov,
            _ => StatTest::ChiSquare,
        }
    }
}

impl fmt::Display for StatTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatTest::KolmogorovSmirnov => write!(f, "Kolmogorov-Smirnov"),
            StatTest::ChiSquare => write!(f, "Chi-square"),
        }
    }
}

/// Outcome of testing one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ColumnDrift {
    Computed {
        test: StatTest,
        /// Infinite when the current sample has a category the reference never saw
        #[serde(with = "unbounded")]
        statistic: f64,
        p_value: f64,
        drift_detected: bool,
    },
    /// Too few non-null values to test
    Skipped { reason: String },
    /// The test was degenerate for these samples
    Failed { test: StatTest, error: String },
}

impl ColumnDrift {
    pub fn p_value(&self) -> Option<f64> {
        match self {
            ColumnDrift::Computed { p_value, .. } => Some(*p_value),
            _ => None,
        }
    }

    pub fn drift_detected(&self) -> bool {
        matches!(
            self,
            ColumnDrift::Computed {
                drift_detected: true,
                ..
            }
        )
    }
}

/// JSON has no infinity, so non-finite statistics travel as null
mod unbounded {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriftSeverity {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl fmt::Display for DriftSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriftSeverity::None => "none",
            DriftSeverity::Low => "low",
            DriftSeverity::Medium => "medium",
            DriftSeverity::High => "high",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftResult {
    pub columns: BTreeMap<String, ColumnDrift>,
    /// Mean of (1 - p) over computed columns
    pub overall_drift_score: f64,
    pub drift_detected: bool,
    /// Columns that contributed to the aggregate
    pub tested_columns: usize,
}

impl DriftResult {
    pub fn severity(&self) -> DriftSeverity {
        if !self.drift_detected {
            DriftSeverity::None
        } else if self.overall_drift_score >= 0.75 {
            DriftSeverity::High
        } else if self.overall_drift_score >= 0.5 {
            DriftSeverity::Medium
        } else {
            DriftSeverity::Low
        }
    }

    /// Columns whose test reported drift, in name order
    pub fn drifted_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|(_, d)| d.drift_detected())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Compares a current snapshot against a reference. Pure and deterministic.
#[derive(Debug, Clone)]
pub struct DriftDetector {
    significance: f64,
}

impl Default for DriftDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNIFICANCE)
    }
}

impl DriftDetector {
    pub fn new(significance: f64) -> Self {
        Self { significance }
    }

    pub fn significance(&self) -> f64 {
        self.significance
    }

    /// Test every column present in both snapshots
    pub fn detect_drift(&self, current: &Dataset, reference: &Dataset) -> Result<DriftResult> {
        current.validate()?;
        reference.validate()?;

        let mut columns = BTreeMap::new();
        for column in &current.columns {
            let Some(baseline) = reference.column(&column.name) else {
                continue;
            };
            columns.insert(column.name.clone(), self.test_column(column, baseline));
        }

        let p_values: Vec<f64> = columns.values().filter_map(ColumnDrift::p_value).collect();
        let overall_drift_score = if p_values.is_empty() {
            0.0
        } else {
            p_values.iter().map(|p| 1.0 - p).sum::<f64>() / p_values.len() as f64
        };
        let drift_detected = columns.values().any(ColumnDrift::drift_detected);

        Ok(DriftResult {
            tested_columns: p_values.len(),
            columns,
            overall_drift_score,
            drift_detected,
        })
    }

    fn test_column(&self, current: &Column, reference: &Column) -> ColumnDrift {
        let test = StatTest::for_kind(current.kind);
        if current.kind != reference.kind {
            return ColumnDrift::Failed {
                test,
                error: format!(
                    "kind mismatch: current is {}, reference is {}",
                    current.kind, reference.kind
                ),
            };
        }

        let outcome = match test {
            StatTest::KolmogorovSmirnov => {
                let (a, b) = (current.numbers(), reference.numbers());
                if let Some(skip) = insufficient(a.len(), b.len()) {
                    return skip;
                }
                stats::ks_2samp(&a, &b)
            }
            StatTest::ChiSquare => {
                let (a, b) = (current.labels(), reference.labels());
                if let Some(skip) = insufficient(a.len(), b.len()) {
                    return skip;
                }
                let (observed, expected) = aligned_frequencies(&a, &b);
                stats::chi_square(&observed, &expected)
            }
        };

        match outcome {
            Ok(result) => ColumnDrift::Computed {
                test,
                statistic: result.statistic,
                p_value: result.p_value,
                drift_detected: result.p_value < self.significance,
            },
            Err(e) => {
                log::warn!("Drift test on column '{}' failed: {}", current.name, e);
                ColumnDrift::Failed {
                    test,
                    error: e.to_string(),
                }
            }
        }
    }
}

fn insufficient(current: usize, reference: usize) -> Option<ColumnDrift> {
    if current < 2 || reference < 2 {
        Some(ColumnDrift::Skipped {
            reason: format!(
                "insufficient data: {} current and {} reference values",
                current, reference
            ),
        })
    } else {
        None
    }
}

/// Normalized frequency vectors over the sorted union of categories
fn aligned_frequencies(current: &[String], reference: &[String]) -> (Vec<f64>, Vec<f64>) {
    fn count(labels: &[String]) -> HashMap<&str, usize> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for label in labels {
            *counts.entry(label.as_str()).or_default() += 1;
        }
        counts
    }
    let (cur, refc) = (count(current), count(reference));
    let categories: BTreeSet<&str> = cur.keys().chain(refc.keys()).copied().collect();

    let normalize = |counts: &HashMap<&str, usize>, total: usize| -> Vec<f64> {
        categories
            .iter()
            .map(|c| counts.get(c).copied().unwrap_or(0) as f64 / total as f64)
            .collect()
    };
    (
        normalize(&cur, current.len()),
        normalize(&refc, reference.len()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn normal_sample(rng: &mut StdRng, mean: f64, std: f64, n: usize) -> Vec<Option<f64>> {
        (0..n)
            .map(|_| {
                // Box-Muller; 1 - u keeps the logarithm finite
                let u1: f64 = 1.0 - rng.random::<f64>();
                let u2: f64 = rng.random::<f64>();
                let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                Some(mean + std * z)
            })
            .collect()
    }

    fn single(column: Column) -> Dataset {
        Dataset::new(None, vec![column]).unwrap()
    }

    #[test]
    fn test_shifted_normal_is_detected() {
        let mut rng = StdRng::seed_from_u64(42);
        let reference = single(Column::numeric("age", normal_sample(&mut rng, 35.0, 10.0, 1000)));
        let current = single(Column::numeric("age", normal_sample(&mut rng, 45.0, 10.0, 1000)));

        let result = DriftDetector::default()
            .detect_drift(&current, &reference)
            .unwrap();
        match &result.columns["age"] {
            ColumnDrift::Computed {
                test,
                p_value,
                drift_detected,
                ..
            } => {
                assert_eq!(*test, StatTest::KolmogorovSmirnov);
                assert!(*p_value < 0.05);
                assert!(*drift_detected);
            }
            other => panic!("Expected computed drift, got {:?}", other),
        }
        assert!(result.drift_detected);
        assert_eq!(result.severity(), DriftSeverity::High);
        assert_eq!(result.drifted_columns(), vec!["age"]);
    }

    #[test]
    fn test_identical_categories_do_not_drift() {
        let labels = vec![Some("a"), Some("b"), Some("b"), Some("c"), None];
        let current = single(Column::categorical("code", labels.clone()));
        let reference = single(Column::categorical("code", labels));

        let result = DriftDetector::default()
            .detect_drift(&current, &reference)
            .unwrap();
        let drift = &result.columns["code"];
        assert!(drift.p_value().unwrap() > 0.05);
        assert!(!result.drift_detected);
        assert_eq!(result.overall_drift_score, 0.0);
        assert_eq!(result.severity(), DriftSeverity::None);
    }

    #[test]
    fn test_unseen_category_is_drift() {
        let current = single(Column::categorical("code", vec![Some("a"), Some("z")]));
        let reference = single(Column::categorical("code", vec![Some("a"), Some("a")]));

        let result = DriftDetector::default()
            .detect_drift(&current, &reference)
            .unwrap();
        assert_eq!(result.columns["code"].p_value(), Some(0.0));
        assert!(result.drift_detected);

        // Infinite statistics survive a JSON round trip
        let json = serde_json::to_string(&result).unwrap();
        let back: DriftResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_skipped_and_failed_columns_are_excluded() {
        let current = Dataset::new(
            None,
            vec![
                Column::numeric("sparse", vec![Some(1.0), None, None]),
                Column::categorical("flat", vec![Some("x"), Some("x"), Some("x")]),
                Column::numeric("changed", vec![Some(1.0), Some(2.0), Some(3.0)]),
                Column::numeric("only_current", vec![Some(1.0), Some(2.0), Some(3.0)]),
            ],
        )
        .unwrap();
        let reference = Dataset::new(
            None,
            vec![
                Column::numeric("sparse", vec![Some(1.0), Some(2.0), Some(3.0)]),
                Column::categorical("flat", vec![Some("x"), Some("x"), None]),
                Column::categorical("changed", vec![Some("1"), Some("2"), Some("3")]),
            ],
        )
        .unwrap();

        let result = DriftDetector::default()
            .detect_drift(&current, &reference)
            .unwrap();

        assert!(matches!(result.columns["sparse"], ColumnDrift::Skipped { .. }));
        assert!(matches!(
            &result.columns["flat"],
            ColumnDrift::Failed { test: StatTest::ChiSquare, error }
                if error.contains("2 categories")
        ));
        assert!(matches!(
            &result.columns["changed"],
            ColumnDrift::Failed { error, .. } if error.contains("kind mismatch")
        ));
        assert!(!result.columns.contains_key("only_current"));
        assert_eq!(result.tested_columns, 0);
        assert_eq!(result.overall_drift_score, 0.0);
        assert!(!result.drift_detected);
    }

    #[test]
    fn test_small_disjoint_samples_are_not_drift() {
        let current = single(Column::numeric("amount", vec![Some(1.0), Some(2.0), Some(3.0)]));
        let reference = single(Column::numeric(
            "amount",
            vec![Some(100.0), Some(101.0), Some(102.0)],
        ));

        let result = DriftDetector::default()
            .detect_drift(&current, &reference)
            .unwrap();
        match &result.columns["amount"] {
            ColumnDrift::Computed {
                statistic,
                p_value,
                drift_detected,
                ..
            } => {
                assert_eq!(*statistic, 1.0);
                assert!((p_value - 0.1).abs() < 1e-12);
                assert!(!drift_detected);
            }
            other => panic!("Expected computed drift, got {:?}", other),
        }
        assert!(!result.drift_detected);
        assert_eq!(result.severity(), DriftSeverity::None);
    }

    #[test]
    fn test_category_counts_cover_both_snapshots() {
        let current = vec!["a".to_string(), "b".to_string(), "b".to_string()];
        let reference = vec!["c".to_string(), "a".to_string()];
        let (cur, refc) = aligned_frequencies(&current, &reference);
        assert_eq!(cur, vec![1.0 / 3.0, 2.0 / 3.0, 0.0]);
        assert_eq!(refc, vec![0.5, 0.0, 0.5]);
    }

    #[test]
    fn test_aggregate_score() {
        let current = Dataset::new(
            None,
            vec![
                Column::numeric("same", vec![Some(1.0), Some(2.0), Some(3.0)]),
                Column::numeric("moved", vec![Some(100.0), Some(101.0), Some(102.0)]),
            ],
        )
        .unwrap();
        let reference = Dataset::new(
            None,
            vec![
                Column::numeric("same", vec![Some(1.0), Some(2.0), Some(3.0)]),
                Column::numeric("moved", vec![Some(1.0), Some(2.0), Some(3.0)]),
            ],
        )
        .unwrap();

        let result = DriftDetector::default()
            .detect_drift(&current, &reference)
            .unwrap();
        let moved = result.columns["moved"].p_value().unwrap();
        assert_eq!(result.tested_columns, 2);
        assert!((result.overall_drift_score - (0.0 + (1.0 - moved)) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_significance_is_strict() {
        let current = single(Column::categorical("code", vec![Some("a"), Some("z")]));
        let reference = single(Column::categorical("code", vec![Some("a"), Some("a")]));

        // p = 0 is never below a zero significance level
        let result = DriftDetector::new(0.0)
            .detect_drift(&current, &reference)
            .unwrap();
        assert!(!result.drift_detected);
    }

    #[test]
    fn test_severity_mapping() {
        let result = |score: f64, detected: bool| DriftResult {
            columns: BTreeMap::new(),
            overall_drift_score: score,
            drift_detected: detected,
            tested_columns: 1,
        };
        assert_eq!(result(0.9, false).severity(), DriftSeverity::None);
        assert_eq!(result(0.75, true).severity(), DriftSeverity::High);
        assert_eq!(result(0.5, true).severity(), DriftSeverity::Medium);
        assert_eq!(result(0.3, true).severity(), DriftSeverity::Low);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(7);
        let current = single(Column::numeric("x", normal_sample(&mut rng, 0.0, 1.0, 200)));
        let reference = single(Column::numeric("x", normal_sample(&mut rng, 0.2, 1.0, 200)));
        let detector = DriftDetector::default();
        assert_eq!(
            detector.detect_drift(&current, &reference).unwrap(),
            detector.detect_drift(&current, &reference).unwrap()
        );
    }
}
