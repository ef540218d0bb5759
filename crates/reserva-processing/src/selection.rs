//! Top-K feature selection by random forest importance.

use std::collections::BTreeMap;

use polars::prelude::*;
use reserva_common::{PipelineError, Result, column_as_f64, feature_names, require_column};
use serde::Serialize;
use tracing::{debug, info};

use crate::forest::{ForestConfig, RandomForest};

/// One feature and its importance score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Rank every non-target column of `df` by mean decrease in impurity,
/// most important first. Ties keep table order.
pub fn rank_features(
    df: &DataFrame,
    target: &str,
    config: &ForestConfig,
) -> Result<Vec<FeatureImportance>> {
    require_column(df, target)?;
    let features = feature_names(df, target);
    let columns: Vec<Vec<f64>> = features
        .iter()
        .map(|name| column_as_f64(df, name))
        .collect::<Result<_>>()?;
    let labels = class_indices(df, target)?;

    let forest = RandomForest::fit(&columns, &labels, config)?;
    let mut ranking: Vec<FeatureImportance> = features
        .into_iter()
        .zip(forest.feature_importances())
        .map(|(feature, importance)| FeatureImportance {
            feature,
            importance,
        })
        .collect();
    ranking.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    for entry in &ranking {
        debug!("{:<40} {:.4}", entry.feature, entry.importance);
    }
    Ok(ranking)
}

/// Keep the `k` most important features plus `target`.
pub fn select_features(
    df: &DataFrame,
    target: &str,
    k: usize,
    config: &ForestConfig,
) -> Result<DataFrame> {
    let available = feature_names(df, target).len();
    if k == 0 || k > available {
        return Err(PipelineError::InvalidConfig(format!(
            "cannot select {k} features: {available} available"
        )));
    }

    let ranking = rank_features(df, target, config)?;
    let mut keep: Vec<String> = ranking.into_iter().take(k).map(|f| f.feature).collect();
    info!("Selected features: {:?}", keep);
    keep.push(target.to_string());

    Ok(df.select(keep)?)
}

/// Target values mapped to `0..n_classes` in sorted label order.
fn class_indices(df: &DataFrame, target: &str) -> Result<Vec<usize>> {
    let series = df
        .column(target)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    let labels: Vec<String> = series
        .str()?
        .into_iter()
        .map(|v| {
            v.map(str::to_string).ok_or_else(|| {
                PipelineError::InvalidData(format!("target '{target}' contains missing values"))
            })
        })
        .collect::<Result<_>>()?;

    let mut classes: BTreeMap<&str, usize> = BTreeMap::new();
    for label in &labels {
        classes.entry(label.as_str()).or_insert(0);
    }
    for (index, slot) in classes.values_mut().enumerate() {
        *slot = index;
    }
    Ok(labels.iter().map(|l| classes[l.as_str()]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fixture() -> DataFrame {
        let n = 200;
        let signal: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let weak: Vec<f64> = (0..n).map(|i| ((i * 7) % 13) as f64).collect();
        let constant: Vec<f64> = vec![1.0; n];
        let status: Vec<i64> = (0..n).map(|i| i64::from(i >= n / 2)).collect();
        df![
            "constant" => constant,
            "weak" => weak,
            "lead_time" => signal,
            "booking_status" => status,
        ]
        .unwrap()
    }

    fn config() -> ForestConfig {
        ForestConfig {
            n_estimators: 15,
            ..ForestConfig::default()
        }
    }

    #[test]
    fn test_select_returns_k_plus_target() {
        let selected = select_features(&fixture(), "booking_status", 2, &config()).unwrap();
        let names: Vec<String> = selected
            .get_column_names()
            .into_iter()
            .map(|c| c.to_string())
            .collect();

        assert_eq!(names.len(), 3);
        assert_eq!(names[0], "lead_time");
        assert_eq!(names[2], "booking_status");
    }

    #[test]
    fn test_zero_importance_ties_keep_table_order() {
        let ranking = rank_features(&fixture(), "booking_status", &config()).unwrap();
        let position = |name: &str| ranking.iter().position(|f| f.feature == name).unwrap();

        assert_eq!(ranking[0].feature, "lead_time");
        assert_eq!(ranking[position("constant")].importance, 0.0);
        if ranking[position("weak")].importance == 0.0 {
            assert!(position("constant") < position("weak"));
        }
    }

    #[test]
    fn test_too_many_features_is_invalid_config() {
        let err = select_features(&fixture(), "booking_status", 4, &config()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
        assert!(err.to_string().contains("4 features: 3 available"));
    }

    #[test]
    fn test_select_all_features() {
        let selected = select_features(&fixture(), "booking_status", 3, &config()).unwrap();
        assert_eq!(selected.width(), 4);
    }

    #[test]
    fn test_class_indices_sorted() {
        let df = df!["y" => ["Not_Canceled", "Canceled", "Not_Canceled"]].unwrap();
        assert_eq!(class_indices(&df, "y").unwrap(), vec![1, 0, 1]);
    }
}
