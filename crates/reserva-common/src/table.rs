//! CSV table IO and column helpers.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::Path;

use polars::prelude::*;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// Load a CSV file with a header row.
///
/// Distinguishes a missing file, an unreadable file, and a file that cannot
/// be parsed, so callers can report each one precisely.
pub fn load_table(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(PipelineError::NotFound(path.to_path_buf()));
    }

    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::PermissionDenied => PipelineError::PermissionDenied(path.to_path_buf()),
        _ => PipelineError::Io(e),
    })?;

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .into_reader_with_file_handle(file)
        .finish()
        .map_err(|source| PipelineError::Load {
            path: path.to_path_buf(),
            source,
        })?;

    info!(
        "Loaded {} rows x {} columns from {}",
        df.height(),
        df.width(),
        path.display()
    );
    Ok(df)
}

/// Write `df` as CSV with a header, creating parent directories.
pub fn save_table(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(df)?;

    info!("Data saved to {}", path.display());
    Ok(())
}

/// Fail with `ColumnNotFound` unless `df` has a column called `name`.
pub fn require_column(df: &DataFrame, name: &str) -> Result<()> {
    if df.get_column_names().iter().any(|c| c.as_str() == name) {
        Ok(())
    } else {
        Err(PipelineError::ColumnNotFound(name.to_string()))
    }
}

/// Read a column as dense `f64` values.
///
/// Non-numeric columns and nulls are rejected.
pub fn column_as_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    require_column(df, name)?;
    let column = df.column(name)?;
    let series = column.as_materialized_series();
    if !is_numeric_dtype(series.dtype()) {
        return Err(PipelineError::InvalidData(format!(
            "column '{}' has non-numeric type {}",
            name,
            series.dtype()
        )));
    }

    let float_series = series.cast(&DataType::Float64)?;
    let values = float_series.f64()?;
    let dense: Option<Vec<f64>> = values.into_iter().collect();
    dense.ok_or_else(|| PipelineError::InvalidData(format!("column '{name}' contains nulls")))
}

/// Integer, float, and boolean columns can be fed to the models directly.
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Boolean
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Names of every column except `exclude`, in table order.
pub fn feature_names(df: &DataFrame, exclude: &str) -> Vec<String> {
    let names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .filter(|c| c.as_str() != exclude)
        .map(|c| c.to_string())
        .collect();
    debug!("{} feature columns besides '{}'", names.len(), exclude);
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_load_missing_file() {
        let err = load_table("/no/such/dir/train.csv").unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[test]
    fn test_directory_is_not_a_table() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_table(dir.path()).unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[test]
    fn test_load_empty_file_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "").unwrap();

        let err = load_table(&path).unwrap_err();
        assert!(matches!(err, PipelineError::Load { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_load_unreadable_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o000)).unwrap();

        // root ignores file modes; nothing to check there
        if File::open(&path).is_ok() {
            return;
        }

        let err = load_table(&path).unwrap_err();
        assert!(matches!(err, PipelineError::PermissionDenied(_)));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        let mut df = df![
            "lead_time" => [10i64, 200, 35],
            "booking_status" => ["Canceled", "Not_Canceled", "Canceled"],
        ]
        .unwrap();

        save_table(&mut df, &path).unwrap();
        let loaded = load_table(&path).unwrap();

        assert_eq!(loaded.shape(), (3, 2));
        assert_eq!(column_as_f64(&loaded, "lead_time").unwrap(), vec![10.0, 200.0, 35.0]);
    }

    #[test]
    fn test_column_as_f64_rejects_strings_and_nulls() {
        let df = df![
            "name" => ["a", "b"],
            "price" => [Some(1.5), None],
        ]
        .unwrap();

        assert_eq!(
            column_as_f64(&df, "name").unwrap_err().error_code(),
            "INVALID_DATA"
        );
        assert_eq!(
            column_as_f64(&df, "price").unwrap_err().error_code(),
            "INVALID_DATA"
        );
        assert_eq!(
            column_as_f64(&df, "missing").unwrap_err().error_code(),
            "COLUMN_NOT_FOUND"
        );
    }

    #[test]
    fn test_feature_names_skip_target() {
        let df = df![
            "a" => [1],
            "booking_status" => [0],
            "b" => [2],
        ]
        .unwrap();
        assert_eq!(feature_names(&df, "booking_status"), vec!["a", "b"]);
    }
}
