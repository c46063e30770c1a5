// SPDX-License-Identifier: MIT

//! Column and dataset profiling

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::dataset::{CellKey, Column, ColumnKind, Dataset};
use super::error::Result;
use super::stats;

/// Rows copied into the profile as a sample
const SAMPLE_ROWS: usize = 5;
/// Entries kept in a categorical histogram
const TOP_VALUES: usize = 10;
/// Default z-score beyond which a value is an outlier
pub const DEFAULT_OUTLIER_THRESHOLD: f64 = 3.0;

/// z-score outliers of a numeric column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierSummary {
    pub count: usize,
    /// Percentage of non-null values
    pub percentage: f64,
    /// Positions of the flagged values among the non-null values
    pub positions: Vec<usize>,
    /// Table rows of the flagged values
    #[serde(default)]
    pub rows: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std: Option<f64>,
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
    pub zeros: usize,
    pub negatives: usize,
    pub outliers: OutlierSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalStats {
    /// Most frequent value
    pub top: Option<String>,
    pub freq: usize,
    pub unique_count: usize,
    /// Top values by frequency, ties by value ascending
    pub value_counts: Vec<ValueCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnStatistics {
    Numeric(NumericStats),
    Categorical(CategoricalStats),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    pub null_count: usize,
    pub null_percentage: f64,
    pub unique_count: usize,
    pub unique_percentage: f64,
    pub stats: ColumnStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub completeness: f64,
    pub uniqueness: f64,
    pub validity: f64,
    pub consistency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub row_count: usize,
    pub column_count: usize,
    pub duplicate_rows: usize,
    pub memory_bytes: u64,
    pub sample_rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub columns: BTreeMap<String, ColumnProfile>,
    pub quality: QualityMetrics,
}

impl DatasetProfile {
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.get(name)
    }

    /// Column names in sorted order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(|k| k.as_str()).collect()
    }
}

/// Computes dataset profiles. Pure and deterministic.
#[derive(Debug, Clone)]
pub struct Profiler {
    outlier_threshold: f64,
    /// Column kinds of a reference snapshot, for the consistency metric
    reference: Option<BTreeMap<String, ColumnKind>>,
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Profiler {
    pub fn new() -> Self {
        Self {
            outlier_threshold: DEFAULT_OUTLIER_THRESHOLD,
            reference: None,
        }
    }

    pub fn with_outlier_threshold(mut self, threshold: f64) -> Self {
        self.outlier_threshold = threshold;
        self
    }

    /// Compare column kinds against `reference` when scoring consistency
    pub fn with_reference(mut self, reference: &Dataset) -> Self {
        self.reference = Some(
            reference
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.kind))
                .collect(),
        );
        self
    }

    pub fn profile(&self, dataset: &Dataset) -> Result<DatasetProfile> {
        dataset.validate()?;
        let rows = dataset.row_count();

        let columns: BTreeMap<String, ColumnProfile> = dataset
            .columns
            .iter()
            .map(|c| (c.name.clone(), self.profile_column(c, rows)))
            .collect();

        let sample_rows = (0..rows.min(SAMPLE_ROWS))
            .filter_map(|i| dataset.row(i))
            .collect();

        Ok(DatasetProfile {
            row_count: rows,
            column_count: dataset.column_count(),
            duplicate_rows: dataset.duplicate_rows(),
            memory_bytes: dataset.estimated_memory_bytes(),
            sample_rows,
            quality: self.quality(dataset, &columns),
            columns,
        })
    }

    fn profile_column(&self, column: &Column, rows: usize) -> ColumnProfile {
        let null_count = column.null_count();
        let unique_count = column.distinct_count();
        let stats = match column.kind {
            ColumnKind::Numeric => ColumnStatistics::Numeric(self.numeric_stats(column)),
            _ => ColumnStatistics::Categorical(categorical_stats(column)),
        };

        ColumnProfile {
            name: column.name.clone(),
            kind: column.kind,
            null_count,
            null_percentage: ratio(null_count, rows),
            unique_count,
            unique_percentage: ratio(unique_count, rows),
            stats,
        }
    }

    fn numeric_stats(&self, column: &Column) -> NumericStats {
        let values = column.numbers();
        NumericStats {
            min: values.iter().copied().reduce(f64::min),
            max: values.iter().copied().reduce(f64::max),
            mean: stats::mean(&values),
            median: stats::median(&values),
            std: stats::sample_std(&values),
            skewness: stats::skewness(&values),
            kurtosis: stats::kurtosis(&values),
            zeros: values.iter().filter(|&&v| v == 0.0).count(),
            negatives: values.iter().filter(|&&v| v < 0.0).count(),
            outliers: self.outliers(column, &values),
        }
    }

    fn outliers(&self, column: &Column, values: &[f64]) -> OutlierSummary {
        let (Some(mean), Some(std)) = (stats::mean(values), stats::population_std(values)) else {
            return OutlierSummary {
                count: 0,
                percentage: 0.0,
                positions: Vec::new(),
                rows: Vec::new(),
            };
        };

        let (positions, rows): (Vec<usize>, Vec<usize>) = if std == 0.0 {
            (Vec::new(), Vec::new())
        } else {
            column
                .values
                .iter()
                .enumerate()
                .filter_map(|(row, cell)| cell.as_f64().map(|v| (row, v)))
                .enumerate()
                .filter(|(_, (_, v))| ((v - mean) / std).abs() > self.outlier_threshold)
                .map(|(position, (row, _))| (position, row))
                .unzip()
        };

        OutlierSummary {
            count: positions.len(),
            percentage: ratio(positions.len(), values.len()) * 100.0,
            positions,
            rows,
        }
    }

    fn quality(
        &self,
        dataset: &Dataset,
        columns: &BTreeMap<String, ColumnProfile>,
    ) -> QualityMetrics {
        let cells = dataset.cell_count();
        let nulls: usize = columns.values().map(|c| c.null_count).sum();
        let completeness = if cells == 0 {
            0.0
        } else {
            1.0 - nulls as f64 / cells as f64
        };

        let rows = dataset.row_count();
        let uniqueness = if rows == 0 || columns.is_empty() {
            0.0
        } else {
            let unique: usize = columns.values().map(|c| c.unique_count).sum();
            (unique as f64 / columns.len() as f64) / rows as f64
        };

        QualityMetrics {
            completeness,
            uniqueness,
            validity: 1.0,
            consistency: self.consistency(dataset),
        }
    }

    fn consistency(&self, dataset: &Dataset) -> f64 {
        let Some(reference) = &self.reference else {
            return 1.0;
        };
        let matches: Vec<bool> = dataset
            .columns
            .iter()
            .filter_map(|c| reference.get(&c.name).map(|kind| *kind == c.kind))
            .collect();
        if matches.is_empty() {
            1.0
        } else {
            matches.iter().filter(|m| **m).count() as f64 / matches.len() as f64
        }
    }
}

fn categorical_stats(column: &Column) -> CategoricalStats {
    let mut counts: HashMap<CellKey<'_>, (String, usize)> = HashMap::new();
    for cell in column.values.iter().filter(|c| !c.is_null()) {
        counts
            .entry(cell.key())
            .or_insert_with(|| (cell.to_string(), 0))
            .1 += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_values().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let unique_count = ranked.len();
    let (top, freq) = match ranked.first() {
        Some((value, count)) => (Some(value.clone()), *count),
        None => (None, 0),
    };
    let value_counts = ranked
        .into_iter()
        .take(TOP_VALUES)
        .map(|(value, count)| ValueCount { value, count })
        .collect();

    CategoricalStats {
        top,
        freq,
        unique_count,
        value_counts,
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> Dataset {
        Dataset::new(
            Some("claims".to_string()),
            vec![
                Column::numeric(
                    "amount",
                    vec![
                        Some(100.0),
                        None,
                        Some(-5.0),
                        Some(0.0),
                        None,
                        Some(250.0),
                        None,
                        Some(100.0),
                    ],
                ),
                Column::categorical(
                    "status",
                    vec![
                        Some("open"),
                        Some("closed"),
                        Some("open"),
                        None,
                        Some("pending"),
                        Some("closed"),
                        Some("open"),
                        Some("appeal"),
                    ],
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_row_and_null_counts() {
        let profile = Profiler::new().profile(&claims()).unwrap();
        assert_eq!(profile.row_count, 8);
        assert_eq!(profile.column_count, 2);
        assert_eq!(profile.sample_rows.len(), 5);

        let amount = profile.column("amount").unwrap();
        assert_eq!(amount.null_count, 3);
        assert_eq!(
            amount.null_count,
            (amount.null_percentage * profile.row_count as f64).round() as usize
        );
        assert_eq!(amount.unique_count, 4);
        assert!((amount.unique_percentage - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_numeric_statistics() {
        let profile = Profiler::new().profile(&claims()).unwrap();
        let ColumnStatistics::Numeric(stats) = &profile.column("amount").unwrap().stats else {
            panic!("Expected numeric statistics");
        };
        assert_eq!(stats.min, Some(-5.0));
        assert_eq!(stats.max, Some(250.0));
        assert_eq!(stats.mean, Some(89.0));
        assert_eq!(stats.median, Some(100.0));
        assert_eq!(stats.zeros, 1);
        assert_eq!(stats.negatives, 1);
        assert!(stats.std.unwrap() > 0.0);
        assert!(stats.skewness.is_some());
        assert!(stats.kurtosis.is_some());
        assert_eq!(stats.outliers.count, 0);
    }

    #[test]
    fn test_categorical_histogram_is_deterministic() {
        let profile = Profiler::new().profile(&claims()).unwrap();
        let ColumnStatistics::Categorical(stats) = &profile.column("status").unwrap().stats else {
            panic!("Expected categorical statistics");
        };
        assert_eq!(stats.top.as_deref(), Some("open"));
        assert_eq!(stats.freq, 3);
        assert_eq!(stats.unique_count, 4);
        let order: Vec<&str> = stats.value_counts.iter().map(|v| v.value.as_str()).collect();
        // "appeal" and "pending" tie at 1 and sort by value
        assert_eq!(order, vec!["open", "closed", "appeal", "pending"]);
    }

    #[test]
    fn test_histogram_keeps_top_ten() {
        let labels: Vec<String> = (0..15).map(|i| format!("v{:02}", i)).collect();
        let dataset = Dataset::new(
            None,
            vec![Column::categorical(
                "code",
                labels.iter().map(|s| Some(s.as_str())).collect(),
            )],
        )
        .unwrap();
        let profile = Profiler::new().profile(&dataset).unwrap();
        let ColumnStatistics::Categorical(stats) = &profile.column("code").unwrap().stats else {
            panic!("Expected categorical statistics");
        };
        assert_eq!(stats.unique_count, 15);
        assert_eq!(stats.value_counts.len(), 10);
        assert_eq!(stats.value_counts[0].value, "v00");
    }

    #[test]
    fn test_outlier_positions_skip_nulls() {
        let mut values: Vec<Option<f64>> = vec![Some(10.0); 30];
        values[4] = None;
        values[17] = Some(1000.0);
        let dataset = Dataset::new(None, vec![Column::numeric("x", values)]).unwrap();

        let profile = Profiler::new().profile(&dataset).unwrap();
        let ColumnStatistics::Numeric(stats) = &profile.column("x").unwrap().stats else {
            panic!("Expected numeric statistics");
        };
        assert_eq!(stats.outliers.count, 1);
        // Row 4 is null, so row 17 is the 17th non-null value
        assert_eq!(stats.outliers.positions, vec![16]);
        assert_eq!(stats.outliers.rows, vec![17]);
        assert!((stats.outliers.percentage - 100.0 / 29.0).abs() < 1e-9);
    }

    #[test]
    fn test_quality_metrics() {
        let profile = Profiler::new().profile(&claims()).unwrap();
        // 4 nulls in 16 cells
        assert!((profile.quality.completeness - 0.75).abs() < 1e-12);
        // mean(4, 4) / 8
        assert!((profile.quality.uniqueness - 0.5).abs() < 1e-12);
        assert_eq!(profile.quality.validity, 1.0);
        assert_eq!(profile.quality.consistency, 1.0);
    }

    #[test]
    fn test_consistency_against_reference() {
        let reference = Dataset::new(
            None,
            vec![
                Column::categorical("amount", vec![Some("high")]),
                Column::categorical("status", vec![Some("open")]),
                Column::numeric("unrelated", vec![Some(1.0)]),
            ],
        )
        .unwrap();
        let profile = Profiler::new()
            .with_reference(&reference)
            .profile(&claims())
            .unwrap();
        assert!((profile.quality.consistency - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_dataset() {
        let dataset = Dataset::new(None, vec![Column::numeric("x", vec![])]).unwrap();
        let profile = Profiler::new().profile(&dataset).unwrap();
        assert_eq!(profile.row_count, 0);
        assert_eq!(profile.quality.completeness, 0.0);
        assert_eq!(profile.quality.uniqueness, 0.0);

        let column = profile.column("x").unwrap();
        assert_eq!(column.null_percentage, 0.0);
        let ColumnStatistics::Numeric(stats) = &column.stats else {
            panic!("Expected numeric statistics");
        };
        assert_eq!(stats.mean, None);
        assert_eq!(stats.outliers.count, 0);
    }

    #[test]
    fn test_profile_is_deterministic() {
        let profiler = Profiler::new();
        assert_eq!(
            profiler.profile(&claims()).unwrap(),
            profiler.profile(&claims()).unwrap()
        );
    }
}
