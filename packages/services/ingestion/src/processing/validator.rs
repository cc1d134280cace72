use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Config;
use crate::models::*;

static YEAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}(-\d{4})?$").expect("year pattern is valid"));

const MAX_TEMPORAL_SAMPLES: usize = 5;

/// Structural and data-quality contract for a replacement dataset.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    required_columns: Vec<String>,
    numeric_columns: Vec<String>,
    temporal_column: Option<String>,
    max_missing_pct: f64,
}

impl SchemaValidator {
    pub fn new(
        required_columns: Vec<String>,
        numeric_columns: Vec<String>,
        temporal_column: Option<String>,
        max_missing_pct: f64,
    ) -> Self {
        Self { required_columns, numeric_columns, temporal_column, max_missing_pct }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.required_columns.clone(),
            cfg.numeric_columns.clone(),
            cfg.temporal_column.clone(),
            cfg.max_missing_pct,
        )
    }

    pub fn required_columns(&self) -> &[String] {
        &self.required_columns
    }

    /// Runs the checks in order and stops at the first failure:
    /// non-empty, required columns, numeric coercion, temporal format, missing-value ratio.
    pub fn validate(&self, table: &Table) -> ValidationResult {
        if table.row_count() == 0 {
            return ValidationResult::failed(ValidationFailure::EmptyDataset);
        }

        let missing: Vec<String> = self
            .required_columns
            .iter()
            .filter(|c| !table.has_column(c))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return ValidationResult::failed(ValidationFailure::MissingColumns {
                missing,
                expected: self.required_columns.clone(),
                found: table.columns.clone(),
            });
        }

        let missing_counts = self.missing_counts(table);

        if let Some(failure) = self.check_temporal(table) {
            return ValidationResult::failed(failure);
        }

        let rows = table.row_count() as f64;
        let worst = missing_counts
            .iter()
            .enumerate()
            .map(|(i, &count)| (i, count as f64 * 100.0 / rows))
            .fold(None::<(usize, f64)>, |acc, (i, pct)| match acc {
                Some((_, best)) if best >= pct => acc,
                _ => Some((i, pct)),
            });

        let (worst_index, max_pct) = worst.unwrap_or((0, 0.0));
        if max_pct > self.max_missing_pct {
            return ValidationResult::failed(ValidationFailure::TooManyMissing {
                column: table.columns[worst_index].clone(),
                missing_pct: max_pct,
                threshold_pct: self.max_missing_pct,
            });
        }

        ValidationResult::passed(max_pct)
    }

    /// Missing cells per column. In numeric columns anything that does not parse as a
    /// number counts as missing too.
    fn missing_counts(&self, table: &Table) -> Vec<usize> {
        (0..table.column_count())
            .map(|i| {
                let numeric = self.numeric_columns.iter().any(|c| c == &table.columns[i]);
                table
                    .column_values(i)
                    .filter(|value| match value {
                        None => true,
                        Some(v) if numeric => !is_numeric(v),
                        Some(_) => false,
                    })
                    .count()
            })
            .collect()
    }

    fn check_temporal(&self, table: &Table) -> Option<ValidationFailure> {
        let column = self.temporal_column.as_ref()?;
        let index = table.column_index(column)?;

        let mut invalid_count = 0;
        let mut samples = Vec::new();
        for value in table.column_values(index).flatten() {
            if !YEAR_PATTERN.is_match(value) {
                invalid_count += 1;
                if samples.len() < MAX_TEMPORAL_SAMPLES && !samples.iter().any(|s| s == value) {
                    samples.push(value.to_string());
                }
            }
        }

        if invalid_count == 0 {
            return None;
        }
        Some(ValidationFailure::MalformedTemporal {
            column: column.clone(),
            invalid_count,
            samples,
        })
    }
}

fn is_numeric(raw: &str) -> bool {
    raw.trim().parse::<f64>().map(|v| !v.is_nan()).unwrap_or(false)
}
