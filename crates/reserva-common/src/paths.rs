//! Filesystem layout shared by the pipeline stages.

use std::path::{Path, PathBuf};

/// Default location of the YAML configuration.
pub const CONFIG_PATH: &str = "config/config.yaml";

/// Default artifact root.
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Every file a stage reads or writes, resolved against one artifact root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub root: PathBuf,
    pub raw_dir: PathBuf,
    pub raw_file: PathBuf,
    pub train_file: PathBuf,
    pub test_file: PathBuf,
    pub processed_dir: PathBuf,
    pub processed_train: PathBuf,
    pub processed_test: PathBuf,
    /// SMOTE checkpoint for the train split.
    pub balanced_train: PathBuf,
    /// SMOTE checkpoint for the test split.
    pub balanced_test: PathBuf,
    pub model_dir: PathBuf,
    pub model_file: PathBuf,
}

impl ArtifactPaths {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let raw_dir = root.join("raw");
        let processed_dir = root.join("processed");
        let model_dir = root.join("models");

        Self {
            raw_file: raw_dir.join("raw.csv"),
            train_file: raw_dir.join("train.csv"),
            test_file: raw_dir.join("test.csv"),
            processed_train: processed_dir.join("processed_train.csv"),
            processed_test: processed_dir.join("processed_test.csv"),
            balanced_train: processed_dir.join("balanced_train.csv"),
            balanced_test: processed_dir.join("balanced_test.csv"),
            model_file: model_dir.join("lgbm_model.json"),
            root,
            raw_dir,
            processed_dir,
            model_dir,
        }
    }
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self::new(ARTIFACTS_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let paths = ArtifactPaths::default();
        assert_eq!(paths.raw_file, PathBuf::from("artifacts/raw/raw.csv"));
        assert_eq!(paths.test_file, PathBuf::from("artifacts/raw/test.csv"));
        assert_eq!(
            paths.processed_train,
            PathBuf::from("artifacts/processed/processed_train.csv")
        );
        assert_eq!(
            paths.model_file,
            PathBuf::from("artifacts/models/lgbm_model.json")
        );
    }

    #[test]
    fn test_custom_root() {
        let paths = ArtifactPaths::new("/tmp/run-1");
        assert!(paths.balanced_test.starts_with("/tmp/run-1/processed"));
        assert_eq!(paths.model_file.parent(), Some(paths.model_dir.as_path()));
    }
}
