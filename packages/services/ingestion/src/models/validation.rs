use serde::{Deserialize, Serialize};

use crate::models::RejectionKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValidationFailure {
    EmptyDataset,
    MissingColumns {
        missing: Vec<String>,
        expected: Vec<String>,
        found: Vec<String>,
    },
    MalformedTemporal {
        column: String,
        invalid_count: usize,
        samples: Vec<String>,
    },
    TooManyMissing {
        column: String,
        missing_pct: f64,
        threshold_pct: f64,
    },
}

impl ValidationFailure {
    pub fn kind(&self) -> RejectionKind {
        match self {
            ValidationFailure::MissingColumns { .. } => RejectionKind::SchemaViolation,
            ValidationFailure::EmptyDataset
            | ValidationFailure::MalformedTemporal { .. }
            | ValidationFailure::TooManyMissing { .. } => RejectionKind::QualityViolation,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ValidationFailure::EmptyDataset => "CSV file is empty".to_string(),
            ValidationFailure::MissingColumns { missing, .. } => {
                format!("Missing required columns: {}", missing.join(", "))
            }
            ValidationFailure::MalformedTemporal { column, .. } => {
                format!("{} column contains invalid format", column)
            }
            ValidationFailure::TooManyMissing { missing_pct, .. } => {
                format!("Too many missing values ({:.1}%)", missing_pct)
            }
        }
    }

    /// Detail lines an operator needs to fix the file.
    pub fn diagnostics(&self) -> Vec<String> {
        match self {
            ValidationFailure::EmptyDataset => vec!["The uploaded file has a header but no rows".to_string()],
            ValidationFailure::MissingColumns { missing, expected, found } => vec![
                format!("Missing columns: {}", missing.join(", ")),
                format!("Expected columns: {}", expected.join(", ")),
                format!("Found columns: {}", found.join(", ")),
            ],
            ValidationFailure::MalformedTemporal { column, invalid_count, samples } => vec![
                format!("{} value(s) in {} are neither YYYY nor YYYY-YYYY", invalid_count, column),
                format!("Examples: {}", samples.join(", ")),
            ],
            ValidationFailure::TooManyMissing { column, missing_pct, threshold_pct } => vec![format!(
                "Column {} is {:.1}% missing (allowed: {:.1}%)",
                column, missing_pct, threshold_pct
            )],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub reason: String,
    pub failure: Option<ValidationFailure>,
    /// Highest per-column missing percentage, once the quality check ran.
    pub max_missing_pct: Option<f64>,
}

impl ValidationResult {
    pub fn passed(max_missing_pct: f64) -> Self {
        Self {
            valid: true,
            reason: "Validation passed".to_string(),
            failure: None,
            max_missing_pct: Some(max_missing_pct),
        }
    }

    pub fn failed(failure: ValidationFailure) -> Self {
        let max_missing_pct = match &failure {
            ValidationFailure::TooManyMissing { missing_pct, .. } => Some(*missing_pct),
            _ => None,
        };
        Self {
            valid: false,
            reason: failure.message(),
            failure: Some(failure),
            max_missing_pct,
        }
    }
}
