use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::artifacts::read_json;
use crate::classifier::ClassifierError;
use crate::label_encoder::EncodingOrder;

/// Hyperparameters shared by the prepare, train and update stages.
///
/// Any field missing from a JSON config file takes its default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Fraction of records held out for the test split
    pub test_size: f64,
    /// Seed for the train/test shuffle and for mini-batch shuffling
    pub seed: u64,
    pub encoding_order: EncodingOrder,
    /// Vocabulary cap for the TF-IDF vectorizer
    pub max_features: usize,
    /// Additive smoothing for Naive Bayes
    pub alpha: f64,
    /// Token limit for the transformer encoder; longer inputs are truncated
    pub max_sequence_length: usize,
    pub epochs: usize,
    /// Passes over a new batch during incremental update
    pub update_epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
            encoding_order: EncodingOrder::Sorted,
            max_features: 5000,
            alpha: 1.0,
            max_sequence_length: 128,
            epochs: 20,
            update_epochs: 2,
            batch_size: 8,
            learning_rate: 0.5,
            weight_decay: 0.01,
        }
    }
}

impl TrainingConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ClassifierError> {
        let config: TrainingConfig = read_json(path.as_ref())?;
        config.validate()?;
        info!("Loaded training configuration from {:?}", path.as_ref());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ClassifierError> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(ClassifierError::ValidationError(format!(
                "test_size must be between 0 and 1 (exclusive), got {}", self.test_size
            )));
        }
        if self.max_features == 0 {
            return Err(ClassifierError::ValidationError("max_features must be positive".into()));
        }
        if !(self.alpha > 0.0) {
            return Err(ClassifierError::ValidationError(format!(
                "alpha must be positive, got {}", self.alpha
            )));
        }
        if self.max_sequence_length == 0 {
            return Err(ClassifierError::ValidationError("max_sequence_length must be positive".into()));
        }
        if self.epochs == 0 {
            return Err(ClassifierError::ValidationError("epochs must be positive".into()));
        }
        if self.update_epochs == 0 {
            return Err(ClassifierError::ValidationError("update_epochs must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(ClassifierError::ValidationError("batch_size must be positive".into()));
        }
        if !(self.learning_rate > 0.0) {
            return Err(ClassifierError::ValidationError(format!(
                "learning_rate must be positive, got {}", self.learning_rate
            )));
        }
        if self.weight_decay < 0.0 {
            return Err(ClassifierError::ValidationError(format!(
                "weight_decay cannot be negative, got {}", self.weight_decay
            )));
        }
        Ok(())
    }
}
