use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod error;
mod embedding;
mod model;
pub mod builder;
pub mod head;
pub mod naive_bayes;
pub mod vectorizer;
mod utils;

pub use error::ClassifierError;
pub use embedding::TransformerEncoder;
pub use model::{Classifier, Evaluation, Manifest};
pub use builder::{ClassifierBuilder, EncoderSource};

/// Which of the two pipelines a classifier runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// TF-IDF features with multinomial Naive Bayes
    NaiveBayes,
    /// Pretrained sentence encoder with a trained softmax head
    Transformer,
}

impl BackendKind {
    /// Directory under the models root where this backend's artifact lives
    pub fn dir_name(&self) -> &'static str {
        match self {
            BackendKind::NaiveBayes => "naive_bayes",
            BackendKind::Transformer => "transformer",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::NaiveBayes => write!(f, "naive-bayes"),
            BackendKind::Transformer => write!(f, "transformer"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "naive-bayes" | "nb" => Ok(BackendKind::NaiveBayes),
            "transformer" | "bert" => Ok(BackendKind::Transformer),
            other => Err(ClassifierError::ValidationError(format!("Unknown backend '{}'", other))),
        }
    }
}

/// Information about the current state and configuration of a classifier
#[derive(Debug, Clone)]
pub struct ClassifierInfo {
    pub backend: BackendKind,
    /// Number of categories the classifier can predict
    pub num_classes: usize,
    /// Category names in label-encoder order
    pub class_labels: Vec<String>,
    /// Vocabulary size for Naive Bayes, embedding size for the transformer
    pub feature_dimension: usize,
    /// Path to the ONNX encoder, transformer backend only
    pub model_path: Option<String>,
    /// Path to the tokenizer file, transformer backend only
    pub tokenizer_path: Option<String>,
    /// Records seen by initial training plus all incremental updates
    pub samples_seen: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("naive-bayes".parse::<BackendKind>().unwrap(), BackendKind::NaiveBayes);
        assert_eq!("Naive_Bayes".parse::<BackendKind>().unwrap(), BackendKind::NaiveBayes);
        assert_eq!("transformer".parse::<BackendKind>().unwrap(), BackendKind::Transformer);
        assert!("svm".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::NaiveBayes.to_string(), "naive-bayes");
    }
}
