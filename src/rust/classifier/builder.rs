use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use super::embedding::{TextEmbedding, TransformerEncoder};
use super::error::ClassifierError;
use super::head::SoftmaxHead;
use super::model::{Backend, Classifier};
use super::naive_bayes::MultinomialNb;
use super::vectorizer::TfidfVectorizer;
use super::BackendKind;
use crate::config::TrainingConfig;
use crate::dataset::EncodedRecord;
use crate::label_encoder::LabelEncoder;
use crate::models::BuiltinModel;
use crate::runtime::RuntimeConfig;
use crate::ModelManager;

/// Where the transformer backend gets its pretrained encoder from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderSource {
    Builtin(BuiltinModel),
    Custom {
        model_path: PathBuf,
        tokenizer_path: PathBuf,
        max_sequence_length: Option<usize>,
    },
}

impl EncoderSource {
    /// Token limit the encoder is loaded with under `config`.
    ///
    /// A built-in model never exceeds its own limit; a custom model's explicit
    /// limit overrides the config.
    pub fn max_sequence_length(&self, config: &TrainingConfig) -> usize {
        match self {
            EncoderSource::Builtin(model) => {
                config.max_sequence_length.min(model.characteristics().max_sequence_length)
            }
            EncoderSource::Custom { max_sequence_length, .. } => {
                max_sequence_length.unwrap_or(config.max_sequence_length)
            }
        }
    }
}

/// A builder for training a Classifier with a fluent interface.
#[derive(Debug, Default)]
pub struct ClassifierBuilder {
    backend: Option<BackendKind>,
    encoder_source: Option<EncoderSource>,
    label_encoder: Option<LabelEncoder>,
    records: Vec<EncodedRecord>,
    config: TrainingConfig,
    runtime_config: RuntimeConfig,
}

impl ClassifierBuilder {
    /// Creates a new empty ClassifierBuilder instance with default configuration
    ///
    /// # Example
    /// ```
    /// use expense_classifier::ClassifierBuilder;
    ///
    /// let builder = ClassifierBuilder::new();
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the runtime configuration for ONNX model execution
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    /// Sets the hyperparameters used by [`build`](Self::build) and by later updates
    pub fn with_training_config(mut self, config: TrainingConfig) -> Result<Self, ClassifierError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    fn set_backend(&mut self, kind: BackendKind) -> Result<(), ClassifierError> {
        if let Some(existing) = self.backend {
            return Err(ClassifierError::BuildError(format!(
                "Backend already set to {}", existing
            )));
        }
        self.backend = Some(kind);
        Ok(())
    }

    /// Selects the TF-IDF and Naive Bayes pipeline
    pub fn with_naive_bayes(mut self) -> Result<Self, ClassifierError> {
        self.set_backend(BackendKind::NaiveBayes)?;
        Ok(self)
    }

    /// Selects the transformer pipeline with a downloaded built-in encoder
    ///
    /// # Returns
    /// An error if a backend is already set or the model has not been downloaded
    /// (see [`ModelManager::download_model`]).
    pub fn with_model(mut self, model: BuiltinModel) -> Result<Self, ClassifierError> {
        self.set_backend(BackendKind::Transformer)?;

        let manager = ModelManager::new_default()
            .map_err(|e| ClassifierError::BuildError(format!("Failed to create model manager: {}", e)))?;
        manager.require_downloaded(model)
            .map_err(|e| ClassifierError::BuildError(e.to_string()))?;

        self.encoder_source = Some(EncoderSource::Builtin(model));
        Ok(self)
    }

    /// Selects the transformer pipeline with an ONNX encoder and tokenizer from disk
    ///
    /// `max_sequence_length` overrides the training config's token limit.
    ///
    /// # Example
    /// ```no_run
    /// use expense_classifier::ClassifierBuilder;
    ///
    /// let builder = ClassifierBuilder::new()
    ///     .with_custom_model("path/to/model.onnx", "path/to/tokenizer.json", Some(256));
    /// ```
    pub fn with_custom_model<P: AsRef<Path>, Q: AsRef<Path>>(
        mut self,
        model_path: P,
        tokenizer_path: Q,
        max_sequence_length: Option<usize>,
    ) -> Result<Self, ClassifierError> {
        let (model_path, tokenizer_path) = (model_path.as_ref(), tokenizer_path.as_ref());
        if model_path.as_os_str().is_empty() || tokenizer_path.as_os_str().is_empty() {
            return Err(ClassifierError::BuildError("Model and tokenizer paths cannot be empty".to_string()));
        }
        if !model_path.exists() {
            return Err(ClassifierError::BuildError(format!("Model file not found: {:?}", model_path)));
        }
        if !tokenizer_path.exists() {
            return Err(ClassifierError::BuildError(format!("Tokenizer file not found: {:?}", tokenizer_path)));
        }
        self.set_backend(BackendKind::Transformer)?;

        self.encoder_source = Some(EncoderSource::Custom {
            model_path: model_path.to_path_buf(),
            tokenizer_path: tokenizer_path.to_path_buf(),
            max_sequence_length,
        });
        Ok(self)
    }

    /// Sets the label encoder whose codes the training records use
    pub fn with_label_encoder(mut self, encoder: LabelEncoder) -> Self {
        self.label_encoder = Some(encoder);
        self
    }

    /// Adds encoded training records.
    ///
    /// # Returns
    /// An error if the batch is empty or any description is empty
    pub fn with_training_data(mut self, records: Vec<EncodedRecord>) -> Result<Self, ClassifierError> {
        if records.is_empty() {
            return Err(ClassifierError::ValidationError("Training data cannot be empty".into()));
        }
        if let Some(pos) = records.iter().position(|r| r.description.trim().is_empty()) {
            return Err(ClassifierError::ValidationError(format!(
                "Training record {} has an empty description", pos + 1
            )));
        }
        self.records.extend(records);
        Ok(self)
    }

    /// Fits the selected backend on the training records and returns the Classifier
    ///
    /// # Returns
    /// An error if no backend, label encoder or training data was provided, if a
    /// record's label is outside the encoder's range, or if fitting fails
    pub fn build(self) -> Result<Classifier, ClassifierError> {
        let kind = self.backend
            .ok_or_else(|| ClassifierError::BuildError("A backend must be selected".to_string()))?;
        let label_encoder = self.label_encoder
            .ok_or_else(|| ClassifierError::BuildError("A label encoder must be set".to_string()))?;
        if self.records.is_empty() {
            return Err(ClassifierError::BuildError("Training data must be added".to_string()));
        }
        if let Some(bad) = self.records.iter().find(|r| r.category >= label_encoder.len()) {
            return Err(ClassifierError::ValidationError(format!(
                "Encoded category {} of '{}' is outside the label encoder's {} categories",
                bad.category, bad.description, label_encoder.len()
            )));
        }

        let texts: Vec<&str> = self.records.iter().map(|r| r.description.as_str()).collect();
        let labels: Vec<usize> = self.records.iter().map(|r| r.category).collect();
        let n_classes = label_encoder.len();
        for (code, class) in label_encoder.classes().iter().enumerate() {
            if !labels.contains(&code) {
                warn!("Category '{}' has no training records and will not be predicted", class);
            }
        }

        let mut config = self.config;
        let backend = match kind {
            BackendKind::NaiveBayes => {
                let vectorizer = TfidfVectorizer::fit(&texts, config.max_features)?;
                info!("Vectorizer fitted with {} terms", vectorizer.n_features());
                let features = vectorizer.transform_all(&texts);
                let mut model = MultinomialNb::new(n_classes, vectorizer.n_features(), config.alpha)?;
                model.fit(&features, &labels)?;
                Backend::NaiveBayes { vectorizer, model }
            }
            BackendKind::Transformer => {
                let encoder = Self::load_encoder(self.encoder_source.as_ref(), &config, &self.runtime_config)?;
                // a reload must truncate where training did
                config.max_sequence_length = encoder.max_sequence_length();
                info!("Embedding {} training records", texts.len());
                let embeddings = encoder.embed_all(&texts)?;
                let mut head = SoftmaxHead::new(n_classes, encoder.embedding_size())?;
                head.fit(&embeddings, &labels, &config)?;
                Backend::Transformer { encoder, head }
            }
        };

        info!("Trained {} classifier on {} records across {} categories", kind, labels.len(), n_classes);
        Ok(Classifier {
            label_encoder: Arc::new(label_encoder),
            backend,
            config,
            trained_samples: labels.len(),
            updated_samples: 0,
        })
    }

    fn load_encoder(
        source: Option<&EncoderSource>,
        config: &TrainingConfig,
        runtime_config: &RuntimeConfig,
    ) -> Result<TransformerEncoder, ClassifierError> {
        match source {
            Some(source @ EncoderSource::Builtin(model)) => {
                let manager = ModelManager::new_default()
                    .map_err(|e| ClassifierError::BuildError(format!("Failed to create model manager: {}", e)))?;
                let (model_path, tokenizer_path) = manager.require_downloaded(*model)
                    .map_err(|e| ClassifierError::BuildError(e.to_string()))?;
                TransformerEncoder::load(&model_path, &tokenizer_path, source.max_sequence_length(config), runtime_config)
            }
            Some(source @ EncoderSource::Custom { model_path, tokenizer_path, .. }) => {
                TransformerEncoder::load(model_path, tokenizer_path, source.max_sequence_length(config), runtime_config)
            }
            None => Err(ClassifierError::BuildError("Model and tokenizer paths must be set".to_string())),
        }
    }
}
