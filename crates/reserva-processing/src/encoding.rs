//! Label encoding for categorical columns.
//!
//! The encoder is fit once (on the training split) and then applied to any
//! table, so the same category maps to the same code in every split.

use std::collections::HashMap;

use polars::prelude::*;
use reserva_common::{PipelineError, Result, require_column};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Sorted classes of one column; a class's position is its code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnClasses {
    pub column: String,
    pub classes: Vec<String>,
}

/// Maps every value of the fitted columns to `0..k-1`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    columns: Vec<ColumnClasses>,
}

impl CategoricalEncoder {
    /// Learn the classes of each column in `columns`, in the given order.
    pub fn fit(df: &DataFrame, columns: &[String]) -> Result<Self> {
        let mut fitted = Vec::with_capacity(columns.len());
        for column in columns {
            let mut classes = column_values(df, column)?;
            classes.sort();
            classes.dedup();
            sort_classes(&mut classes);
            debug!("Column '{}': {} classes", column, classes.len());
            fitted.push(ColumnClasses {
                column: column.clone(),
                classes,
            });
        }
        Ok(Self { columns: fitted })
    }

    /// Replace each fitted column with its codes.
    ///
    /// A value never seen during fitting gets code `k`, one past the last
    /// known class.
    pub fn transform(&self, mut df: DataFrame) -> Result<DataFrame> {
        for fitted in &self.columns {
            let lookup: HashMap<&str, i64> = fitted
                .classes
                .iter()
                .enumerate()
                .map(|(code, class)| (class.as_str(), code as i64))
                .collect();
            let unseen_code = fitted.classes.len() as i64;

            let values = column_values(&df, &fitted.column)?;
            let mut unseen = 0usize;
            let codes: Vec<i64> = values
                .iter()
                .map(|v| {
                    lookup.get(v.as_str()).copied().unwrap_or_else(|| {
                        unseen += 1;
                        unseen_code
                    })
                })
                .collect();

            if unseen > 0 {
                warn!(
                    "Column '{}': {} values unseen during fitting, encoded as {}",
                    fitted.column, unseen, unseen_code
                );
            }

            df.replace(
                &fitted.column,
                Series::new(fitted.column.as_str().into(), codes),
            )?;
        }
        Ok(df)
    }

    /// Fit on `df` and encode it in one go.
    pub fn fit_transform(df: DataFrame, columns: &[String]) -> Result<(Self, DataFrame)> {
        let encoder = Self::fit(&df, columns)?;
        let encoded = encoder.transform(df)?;
        Ok((encoder, encoded))
    }

    /// Classes learned for `column`, in code order.
    pub fn classes(&self, column: &str) -> Option<&[String]> {
        self.columns
            .iter()
            .find(|c| c.column == column)
            .map(|c| c.classes.as_slice())
    }

    /// Fitted columns, in fit order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.column.as_str())
    }
}

/// Every value of `column` rendered as a string; nulls are rejected.
fn column_values(df: &DataFrame, column: &str) -> Result<Vec<String>> {
    require_column(df, column)?;
    let series = df
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    let values = series.str()?;

    values
        .into_iter()
        .map(|v| {
            v.map(str::to_string).ok_or_else(|| {
                PipelineError::InvalidData(format!("column '{column}' contains missing values"))
            })
        })
        .collect()
}

/// Numeric order when every class parses as a number, lexical otherwise.
fn sort_classes(classes: &mut [String]) {
    let numeric: Option<Vec<f64>> = classes.iter().map(|c| c.trim().parse().ok()).collect();
    if let Some(keys) = numeric {
        let mut pairs: Vec<(f64, String)> = keys.into_iter().zip(classes.iter().cloned()).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        for (slot, (_, class)) in classes.iter_mut().zip(pairs) {
            *slot = class;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn codes(df: &DataFrame, column: &str) -> Vec<i64> {
        df.column(column)
            .unwrap()
            .as_materialized_series()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect()
    }

    #[test]
    fn test_codes_follow_sorted_classes() {
        let df = df![
            "meal" => ["Meal Plan 2", "Not Selected", "Meal Plan 1", "Meal Plan 2"],
        ]
        .unwrap();

        let (encoder, encoded) = CategoricalEncoder::fit_transform(df, &["meal".into()]).unwrap();

        assert_eq!(
            encoder.classes("meal").unwrap(),
            &["Meal Plan 1", "Meal Plan 2", "Not Selected"]
        );
        assert_eq!(codes(&encoded, "meal"), vec![1, 2, 0, 1]);
    }

    #[test]
    fn test_k_distinct_values_give_k_codes() {
        let df = df!["segment" => ["b", "a", "c", "a", "e", "d", "b"]].unwrap();
        let (_, encoded) = CategoricalEncoder::fit_transform(df, &["segment".into()]).unwrap();

        let mut distinct = codes(&encoded, "segment");
        distinct.sort();
        distinct.dedup();
        assert_eq!(distinct, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_numeric_classes_sort_numerically() {
        let df = df!["parking" => [10i64, 2, 1, 2]].unwrap();
        let (encoder, encoded) = CategoricalEncoder::fit_transform(df, &["parking".into()]).unwrap();

        assert_eq!(encoder.classes("parking").unwrap(), &["1", "2", "10"]);
        assert_eq!(codes(&encoded, "parking"), vec![2, 1, 0, 1]);
    }

    #[test]
    fn test_fit_on_train_applies_to_test() {
        let train = df!["room" => ["Room_Type 1", "Room_Type 4"]].unwrap();
        let test = df!["room" => ["Room_Type 4", "Room_Type 7", "Room_Type 1"]].unwrap();

        let encoder = CategoricalEncoder::fit(&train, &["room".into()]).unwrap();
        let encoded = encoder.transform(test).unwrap();

        // unseen "Room_Type 7" lands one past the known codes
        assert_eq!(codes(&encoded, "room"), vec![1, 2, 0]);
    }

    #[test]
    fn test_missing_column_and_nulls() {
        let df = df!["a" => [Some("x"), None]].unwrap();

        let err = CategoricalEncoder::fit(&df, &["b".into()]).unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");

        let err = CategoricalEncoder::fit(&df, &["a".into()]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATA");
    }

    #[test]
    fn test_other_columns_untouched() {
        let df = df![
            "status" => ["Not_Canceled", "Canceled"],
            "lead_time" => [5i64, 80],
        ]
        .unwrap();
        let (_, encoded) = CategoricalEncoder::fit_transform(df, &["status".into()]).unwrap();

        assert_eq!(codes(&encoded, "status"), vec![1, 0]);
        assert_eq!(codes(&encoded, "lead_time"), vec![5, 80]);
        let names: Vec<&str> = encoded
            .get_column_names()
            .into_iter()
            .map(|c| c.as_str())
            .collect();
        assert_eq!(names, vec!["status", "lead_time"]);
    }
}
