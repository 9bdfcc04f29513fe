//! Feature and target encoding.
//!
//! Every input column is typed once at `fit` time and mapped to one or more
//! numeric feature columns:
//!
//! | column kind                  | encoding | output columns            |
//! |------------------------------|----------|---------------------------|
//! | all cells parse as `f64`     | numeric  | 1 (as is)                 |
//! | categorical, 2 levels        | label    | 1 (0/1, sorted levels)    |
//! | categorical, 3..=max levels  | one-hot  | one per level             |
//! | `--datetime`                 | datetime | 2 (hour, weekday)         |
//!
//! Constant columns and categoricals above `max_levels` are skipped and reported.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use nalgebra::DMatrix;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::PrepConfig;
use crate::error::AppError;
use crate::io::ingest::IngestedTable;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
];

/// How one source column becomes feature columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ColumnEncoding {
    Numeric,
    /// `levels[0]` -> 0.0, `levels[1]` -> 1.0.
    Label { levels: [String; 2] },
    OneHot { levels: Vec<String> },
    DateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct EncodedColumn {
    pub name: String,
    #[serde(skip)]
    pub index: usize,
    pub encoding: ColumnEncoding,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedColumn {
    pub name: String,
    pub reason: String,
}

/// Fitted column encoder.
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    columns: Vec<EncodedColumn>,
    skipped: Vec<SkippedColumn>,
    feature_names: Vec<String>,
}

impl FeatureEncoder {
    /// Type each of `columns` and decide its encoding.
    pub fn fit(table: &IngestedTable, columns: &[usize], prep: &PrepConfig) -> Result<Self, AppError> {
        let mut encoded = Vec::new();
        let mut skipped = Vec::new();

        for &idx in columns {
            let name = table.headers[idx].clone();

            if prep.datetime_columns.iter().any(|c| c.trim() == name) {
                if let Some(bad) = table.column(idx).find(|cell| parse_datetime(cell).is_none()) {
                    return Err(AppError::data(format!(
                        "Column '{name}' has an unparseable timestamp '{bad}'."
                    )));
                }
                encoded.push(EncodedColumn { name, index: idx, encoding: ColumnEncoding::DateTime });
                continue;
            }

            let numeric = table.column(idx).all(|cell| parse_number(cell).is_some());
            let levels: BTreeSet<&str> = table.column(idx).collect();

            if levels.len() < 2 {
                skipped.push(SkippedColumn { name, reason: "constant column".to_string() });
                continue;
            }

            let encoding = if numeric {
                ColumnEncoding::Numeric
            } else if levels.len() == 2 {
                let levels: Vec<&str> = levels.into_iter().collect();
                ColumnEncoding::Label {
                    levels: [levels[0].to_string(), levels[1].to_string()],
                }
            } else if levels.len() <= prep.max_levels {
                ColumnEncoding::OneHot {
                    levels: levels.into_iter().map(str::to_string).collect(),
                }
            } else {
                warn!(column = %name, levels = levels.len(), "skipping high-cardinality column");
                skipped.push(SkippedColumn {
                    reason: format!("{} distinct levels > max {}", levels.len(), prep.max_levels),
                    name,
                });
                continue;
            };

            encoded.push(EncodedColumn { name, index: idx, encoding });
        }

        if encoded.is_empty() {
            return Err(AppError::data("No usable feature columns remain after encoding."));
        }

        let feature_names = build_feature_names(&encoded);
        debug!(columns = encoded.len(), features = feature_names.len(), "fitted encoder");

        Ok(Self {
            columns: encoded,
            skipped,
            feature_names,
        })
    }

    /// Encode every row of `table` into an `n_rows x n_features` matrix.
    pub fn transform(&self, table: &IngestedTable) -> Result<DMatrix<f64>, AppError> {
        let n = table.n_rows();
        let mut x = DMatrix::<f64>::zeros(n, self.feature_names.len());

        for row in 0..n {
            let mut j = 0usize;
            for col in &self.columns {
                let cell = table.cell(row, col.index);
                match &col.encoding {
                    ColumnEncoding::Numeric => {
                        x[(row, j)] = parse_number(cell).ok_or_else(|| {
                            AppError::data(format!("Column '{}' has a non-numeric value '{cell}'.", col.name))
                        })?;
                        j += 1;
                    }
                    ColumnEncoding::Label { levels } => {
                        x[(row, j)] = if cell == levels[1] {
                            1.0
                        } else if cell == levels[0] {
                            0.0
                        } else {
                            return Err(AppError::data(format!(
                                "Column '{}' has unseen level '{cell}'.",
                                col.name
                            )));
                        };
                        j += 1;
                    }
                    ColumnEncoding::OneHot { levels } => {
                        // unseen levels encode as all zeros
                        if let Some(pos) = levels.iter().position(|l| l == cell) {
                            x[(row, j + pos)] = 1.0;
                        }
                        j += levels.len();
                    }
                    ColumnEncoding::DateTime => {
                        let ts = parse_datetime(cell).ok_or_else(|| {
                            AppError::data(format!("Column '{}' has an unparseable timestamp '{cell}'.", col.name))
                        })?;
                        x[(row, j)] = f64::from(ts.hour());
                        x[(row, j + 1)] = f64::from(ts.weekday().num_days_from_monday());
                        j += 2;
                    }
                }
            }
        }

        Ok(x)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn columns(&self) -> &[EncodedColumn] {
        &self.columns
    }

    pub fn skipped(&self) -> &[SkippedColumn] {
        &self.skipped
    }
}

/// Indices of the feature columns: every column except `exclude` and the
/// `--drop` list. Unknown `--drop`/`--datetime` names are usage errors.
pub fn select_feature_columns(
    table: &IngestedTable,
    exclude: &[usize],
    prep: &PrepConfig,
) -> Result<Vec<usize>, AppError> {
    let mut dropped = Vec::with_capacity(prep.drop_columns.len());
    for name in &prep.drop_columns {
        dropped.push(table.column_index(name)?);
    }
    for name in &prep.datetime_columns {
        let idx = table.column_index(name)?;
        if exclude.contains(&idx) || dropped.contains(&idx) {
            return Err(AppError::usage(format!(
                "Column '{name}' cannot be both a datetime feature and excluded."
            )));
        }
    }

    let columns: Vec<usize> = (0..table.headers.len())
        .filter(|i| !exclude.contains(i) && !dropped.contains(i))
        .collect();
    if columns.is_empty() {
        return Err(AppError::usage("Every column is excluded; nothing left to encode."));
    }
    Ok(columns)
}

fn build_feature_names(columns: &[EncodedColumn]) -> Vec<String> {
    let mut names = Vec::new();
    for col in columns {
        match &col.encoding {
            ColumnEncoding::Numeric | ColumnEncoding::Label { .. } => names.push(col.name.clone()),
            ColumnEncoding::OneHot { levels } => {
                names.extend(levels.iter().map(|l| format!("{}_{l}", col.name)));
            }
            ColumnEncoding::DateTime => {
                names.push(format!("{}_hour", col.name));
                names.push(format!("{}_weekday", col.name));
            }
        }
    }
    names
}

/// The binary target after label encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetEncoding {
    pub column: String,
    pub negative: String,
    pub positive: String,
}

/// Label-encode the target column to 0/1.
///
/// With no explicit `positive` label, numeric targets use the larger value as the
/// positive class and categorical targets use the second level in sorted order.
pub fn encode_target(
    table: &IngestedTable,
    col: usize,
    positive: Option<&str>,
) -> Result<(Vec<u8>, TargetEncoding), AppError> {
    let name = table.headers[col].clone();
    let levels: BTreeSet<&str> = table.column(col).collect();
    if levels.len() != 2 {
        return Err(AppError::data(format!(
            "Target '{name}' must have exactly two classes, found {}.",
            levels.len()
        )));
    }
    let mut levels: Vec<&str> = levels.into_iter().collect();

    if let (Some(a), Some(b)) = (parse_number(levels[0]), parse_number(levels[1])) {
        if a > b {
            levels.swap(0, 1);
        }
    }

    let (neg, pos) = match positive {
        Some(p) if p == levels[1] => (levels[0], levels[1]),
        Some(p) if p == levels[0] => (levels[1], levels[0]),
        Some(p) => {
            return Err(AppError::usage(format!(
                "Positive label '{p}' is not a value of '{name}' ({} / {}).",
                levels[0], levels[1]
            )));
        }
        None => (levels[0], levels[1]),
    };

    let labels = table.column(col).map(|cell| u8::from(cell == pos)).collect();
    Ok((
        labels,
        TargetEncoding {
            column: name,
            negative: neg.to_string(),
            positive: pos.to_string(),
        },
    ))
}

fn parse_number(raw: &str) -> Option<f64> {
    let v = raw.trim().parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}

/// Parse the timestamp layouts commonly found in transaction exports.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ingest::read_table;

    fn table(csv: &str) -> IngestedTable {
        read_table(csv.as_bytes()).unwrap()
    }

    #[test]
    fn feature_columns_skip_target_and_dropped() {
        let t = table("id,a,b,y\n1,2,3,0\n");
        let prep = PrepConfig {
            drop_columns: vec!["id".to_string()],
            ..PrepConfig::default()
        };
        assert_eq!(select_feature_columns(&t, &[3], &prep).unwrap(), vec![1, 2]);

        let bad = PrepConfig {
            drop_columns: vec!["missing".to_string()],
            ..PrepConfig::default()
        };
        assert_eq!(select_feature_columns(&t, &[3], &bad).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn numeric_label_and_one_hot_columns() {
        let t = table(
            "income,married,purpose,const\n\
             100,yes,car,x\n\
             250.5,no,home,x\n\
             80,yes,edu,x\n",
        );
        let enc = FeatureEncoder::fit(&t, &[0, 1, 2, 3], &PrepConfig::default()).unwrap();
        assert_eq!(
            enc.feature_names(),
            &["income", "married", "purpose_car", "purpose_edu", "purpose_home"]
        );
        assert_eq!(enc.skipped().len(), 1);
        assert_eq!(enc.skipped()[0].name, "const");

        let x = enc.transform(&t).unwrap();
        assert_eq!(x.shape(), (3, 5));
        assert_eq!(x[(1, 0)], 250.5);
        // sorted levels: "no" -> 0, "yes" -> 1
        assert_eq!(x[(0, 1)], 1.0);
        assert_eq!(x[(1, 1)], 0.0);
        assert_eq!(x[(1, 4)], 1.0);
        assert_eq!(x.row(2).sum(), 80.0 + 1.0 + 1.0);
    }

    #[test]
    fn high_cardinality_column_is_skipped() {
        let t = table("id,v\na,1\nb,2\nc,3\nd,4\n");
        let prep = PrepConfig { max_levels: 3, ..PrepConfig::default() };
        let enc = FeatureEncoder::fit(&t, &[0, 1], &prep).unwrap();
        assert_eq!(enc.feature_names(), &["v"]);
        assert!(enc.skipped()[0].reason.contains("4 distinct levels"));
    }

    #[test]
    fn datetime_column_expands_to_hour_and_weekday() {
        let t = table("ts,amt\n2024-03-04 13:15:00,1\n2024-03-10T02:00:00Z,2\n");
        let prep = PrepConfig {
            datetime_columns: vec!["ts".to_string()],
            ..PrepConfig::default()
        };
        let enc = FeatureEncoder::fit(&t, &[0, 1], &prep).unwrap();
        assert_eq!(enc.feature_names(), &["ts_hour", "ts_weekday", "amt"]);
        let x = enc.transform(&t).unwrap();
        // 2024-03-04 is a Monday, 2024-03-10 a Sunday
        assert_eq!((x[(0, 0)], x[(0, 1)]), (13.0, 0.0));
        assert_eq!((x[(1, 0)], x[(1, 1)]), (2.0, 6.0));
    }

    #[test]
    fn target_defaults_to_second_sorted_level() {
        let t = table("status\nN\nY\nN\n");
        let (y, enc) = encode_target(&t, 0, None).unwrap();
        assert_eq!(y, vec![0, 1, 0]);
        assert_eq!(enc.positive, "Y");
    }

    #[test]
    fn numeric_target_orders_numerically() {
        let t = table("d\n10\n9\n10\n");
        let (y, enc) = encode_target(&t, 0, None).unwrap();
        assert_eq!(enc.positive, "10");
        assert_eq!(y, vec![1, 0, 1]);
    }

    #[test]
    fn explicit_positive_label_flips_encoding() {
        let t = table("status\nDefault\nPaid\nPaid\n");
        let (y, _) = encode_target(&t, 0, Some("Default")).unwrap();
        assert_eq!(y, vec![1, 0, 0]);
        assert!(encode_target(&t, 0, Some("Late")).is_err());
    }

    #[test]
    fn target_with_three_classes_is_rejected() {
        let t = table("s\na\nb\nc\n");
        let err = encode_target(&t, 0, None).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_DATA);
    }
}
