use std::fs;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::classifier::{BackendKind, ClassifierError};

/// Filesystem locations shared by the prepare, train, predict and update stages.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    pub data_dir: PathBuf,
    pub models_dir: PathBuf,
}

impl ArtifactLayout {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(data_dir: P, models_dir: Q) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            models_dir: models_dir.as_ref().to_path_buf(),
        }
    }

    pub fn train_split(&self) -> PathBuf {
        self.data_dir.join("train.csv")
    }

    pub fn test_split(&self) -> PathBuf {
        self.data_dir.join("test.csv")
    }

    pub fn label_encoder(&self) -> PathBuf {
        self.data_dir.join("label_encoder.json")
    }

    /// Self-labelled (description, predicted category) pairs from interactive sessions
    pub fn side_log(&self) -> PathBuf {
        self.data_dir.join("new_expenses.csv")
    }

    pub fn model_dir(&self, kind: BackendKind) -> PathBuf {
        self.models_dir.join(kind.dir_name())
    }
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self::new("data", "models")
    }
}

/// Writes `bytes` to `path` through a temporary sibling file, so readers see
/// either the previous content or the new content, never a partial file.
pub(crate) fn persist_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    debug!("Wrote {} bytes to {:?}", bytes.len(), path);
    Ok(())
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ClassifierError> {
    Ok(persist_atomic(path, bytes)?)
}

pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ClassifierError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ClassifierError> {
    let file = fs::File::open(path).map_err(|e| {
        ClassifierError::BuildError(format!("Failed to open {:?}: {}", path, e))
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        ClassifierError::DataError(format!("Failed to parse {:?}: {}", path, e))
    })
}

/// Copies `from` into `to` atomically. A no-op when both name the same file.
pub(crate) fn copy_atomic(from: &Path, to: &Path) -> Result<(), ClassifierError> {
    if let (Ok(a), Ok(b)) = (fs::canonicalize(from), fs::canonicalize(to)) {
        if a == b {
            return Ok(());
        }
    }
    let bytes = fs::read(from)?;
    write_atomic(to, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = ArtifactLayout::new("/tmp/data", "/tmp/models");
        assert!(layout.train_split().ends_with("data/train.csv"));
        assert!(layout.test_split().ends_with("data/test.csv"));
        assert!(layout.label_encoder().ends_with("data/label_encoder.json"));
        assert!(layout.model_dir(BackendKind::NaiveBayes).ends_with("models/naive_bayes"));
        assert!(layout.model_dir(BackendKind::Transformer).ends_with("models/transformer"));
    }

    #[test]
    fn test_atomic_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("artifact.json");
        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();
        write_json_atomic(&path, &vec![4]).unwrap();
        let value: Vec<i32> = read_json(&path).unwrap();
        assert_eq!(value, vec![4]);
        // only the artifact remains, no stray temporary files
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_copy_onto_itself() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        fs::write(&path, b"{}").unwrap();
        copy_atomic(&path, &path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"{}");
    }
}
