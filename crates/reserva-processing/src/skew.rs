//! Skewness measurement and correction for numerical columns.

use polars::prelude::*;
use reserva_common::{Result, column_as_f64};
use tracing::debug;

/// Adjusted Fisher-Pearson sample skewness.
///
/// `None` for fewer than three values; `0.0` for a constant column.
pub fn skewness(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 3 {
        return None;
    }

    let count = n as f64;
    let mean = values.iter().sum::<f64>() / count;
    let (m2, m3) = values.iter().fold((0.0, 0.0), |(m2, m3), v| {
        let d = v - mean;
        (m2 + d * d, m3 + d * d * d)
    });

    if m2 == 0.0 {
        return Some(0.0);
    }

    Some(count * (count - 1.0).sqrt() / (count - 2.0) * m3 / m2.powf(1.5))
}

/// Transform applied to a skewed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkewTransform {
    Log1p,
    Expm1,
}

/// Skewness of each column, and the transform chosen for it if any.
pub fn plan_corrections(
    df: &DataFrame,
    columns: &[String],
    threshold: f64,
) -> Result<Vec<(String, f64, Option<SkewTransform>)>> {
    let mut plan = Vec::with_capacity(columns.len());
    for column in columns {
        let values = column_as_f64(df, column)?;
        let Some(skew) = skewness(&values) else {
            debug!("Column '{}': too few rows to measure skew", column);
            continue;
        };

        let transform = (skew > threshold).then(|| {
            if skew > 0.0 {
                SkewTransform::Log1p
            } else {
                SkewTransform::Expm1
            }
        });
        plan.push((column.clone(), skew, transform));
    }
    Ok(plan)
}

/// Apply `log1p` (positive skew) or `expm1` (otherwise) to every column in
/// `columns` whose skewness exceeds `threshold`.
pub fn correct_skew(mut df: DataFrame, columns: &[String], threshold: f64) -> Result<DataFrame> {
    for (column, skew, transform) in plan_corrections(&df, columns, threshold)? {
        let Some(transform) = transform else {
            debug!("Column '{}': skewness {:.3} within threshold", column, skew);
            continue;
        };

        let values = column_as_f64(&df, &column)?;
        let corrected: Vec<f64> = match transform {
            SkewTransform::Log1p => values.iter().map(|v| v.ln_1p()).collect(),
            SkewTransform::Expm1 => values.iter().map(|v| v.exp_m1()).collect(),
        };
        debug!(
            "Column '{}': skewness {:.3}, applying {:?}",
            column, skew, transform
        );
        df.replace(&column, Series::new(column.as_str().into(), corrected))?;
    }
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_skewness_matches_pandas() {
        // pandas.Series([1, 2, 3, 10]).skew()
        assert_close(skewness(&[1.0, 2.0, 3.0, 10.0]).unwrap(), 1.763632614803888);
        assert_close(skewness(&[1.0, 2.0, 3.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_skewness_edge_cases() {
        assert_eq!(skewness(&[1.0, 2.0]), None);
        assert_eq!(skewness(&[4.0, 4.0, 4.0, 4.0]), Some(0.0));
    }

    #[test]
    fn test_log1p_above_threshold_only() {
        let df = df![
            "lead_time" => [1.0, 2.0, 3.0, 10.0],
            "price" => [1.0, 2.0, 3.0, 4.0],
        ]
        .unwrap();

        let out = correct_skew(df, &["lead_time".into(), "price".into()], 1.0).unwrap();

        let lead = column_as_f64(&out, "lead_time").unwrap();
        assert_close(lead[3], 10f64.ln_1p());
        assert_eq!(column_as_f64(&out, "price").unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_negative_threshold_reaches_expm1() {
        let df = df!["x" => [10.0, 9.0, 8.0, 0.0]].unwrap();
        let plan = plan_corrections(&df, &["x".into()], -5.0).unwrap();
        assert_eq!(plan[0].2, Some(SkewTransform::Expm1));

        let out = correct_skew(df, &["x".into()], -5.0).unwrap();
        assert_close(column_as_f64(&out, "x").unwrap()[3], 0.0);
        assert_close(column_as_f64(&out, "x").unwrap()[0], 10f64.exp_m1());
    }

    #[test]
    fn test_integer_columns_become_float() {
        let df = df!["nights" => [0i64, 0, 0, 1, 30]].unwrap();
        let out = correct_skew(df, &["nights".into()], 0.5).unwrap();
        assert_eq!(out.column("nights").unwrap().dtype(), &DataType::Float64);
    }

    #[test]
    fn test_missing_column() {
        let df = df!["a" => [1.0, 2.0, 3.0]].unwrap();
        let err = correct_skew(df, &["b".into()], 0.0).unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    }
}
