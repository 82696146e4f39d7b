use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::embedding::{TextEmbedding, TransformerEncoder};
use super::error::ClassifierError;
use super::head::SoftmaxHead;
use super::naive_bayes::MultinomialNb;
use super::utils::argmax;
use super::vectorizer::TfidfVectorizer;
use super::{BackendKind, ClassifierInfo};
use crate::artifacts::{read_json, write_json_atomic};
use crate::config::TrainingConfig;
use crate::dataset::{validate_batch, EncodedRecord, ExpenseRecord};
use crate::label_encoder::LabelEncoder;
use crate::runtime::RuntimeConfig;

const MANIFEST_FILE: &str = "manifest.json";
const VECTORIZER_FILE: &str = "vectorizer.json";
const NAIVE_BAYES_FILE: &str = "naive_bayes.json";
const HEAD_FILE: &str = "head.json";

#[derive(Debug, Clone)]
pub(crate) enum Backend {
    NaiveBayes {
        vectorizer: TfidfVectorizer,
        model: MultinomialNb,
    },
    Transformer {
        encoder: TransformerEncoder,
        head: SoftmaxHead,
    },
}

impl Backend {
    fn kind(&self) -> BackendKind {
        match self {
            Backend::NaiveBayes { .. } => BackendKind::NaiveBayes,
            Backend::Transformer { .. } => BackendKind::Transformer,
        }
    }

    fn n_classes(&self) -> usize {
        match self {
            Backend::NaiveBayes { model, .. } => model.n_classes(),
            Backend::Transformer { head, .. } => head.n_classes(),
        }
    }

    fn predict_proba(&self, text: &str) -> Result<Array1<f64>, ClassifierError> {
        match self {
            Backend::NaiveBayes { vectorizer, model } => model.predict_proba(&vectorizer.transform(text)),
            Backend::Transformer { encoder, head } => head.predict_proba(&encoder.embed_text(text)?),
        }
    }
}

/// Describes a persisted model directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub backend: BackendKind,
    /// Category names the model's outputs map to, in label-encoder order
    pub classes: Vec<String>,
    pub config: TrainingConfig,
    pub trained_samples: usize,
    pub updated_samples: usize,
}

/// Share of correctly classified records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub correct: usize,
    pub total: usize,
    pub accuracy: f64,
}

/// An expense classifier: a label encoder paired with one trained backend.
///
/// # Thread Safety
///
/// This type is automatically `Send + Sync`: the encoder's tokenizer and ONNX
/// session are shared behind `Arc`, and every other field is plain data.
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use expense_classifier::{Classifier, EncodedRecord, EncodingOrder, LabelEncoder};
///
/// let encoder = LabelEncoder::fit(["Shopping", "Bills"], EncodingOrder::Sorted)?;
/// let records = vec![
///     EncodedRecord { description: "Bought a jacket".into(), category: encoder.transform("Shopping")? },
///     EncodedRecord { description: "Paid electric bill".into(), category: encoder.transform("Bills")? },
/// ];
/// let classifier = Classifier::builder()
///     .with_naive_bayes()?
///     .with_label_encoder(encoder)
///     .with_training_data(records)?
///     .build()?;
///
/// let (label, _scores) = classifier.predict("Bought shoes")?;
/// assert!(label == "Shopping" || label == "Bills");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Classifier {
    pub(crate) label_encoder: Arc<LabelEncoder>,
    pub(crate) backend: Backend,
    pub(crate) config: TrainingConfig,
    pub(crate) trained_samples: usize,
    pub(crate) updated_samples: usize,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Classifier>();
    }
};

impl Classifier {
    /// Creates a new ClassifierBuilder for fluent construction
    pub fn builder() -> super::builder::ClassifierBuilder {
        super::builder::ClassifierBuilder::new()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn label_encoder(&self) -> &LabelEncoder {
        &self.label_encoder
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Returns information about the classifier's current state
    pub fn info(&self) -> ClassifierInfo {
        let (feature_dimension, model_path, tokenizer_path) = match &self.backend {
            Backend::NaiveBayes { vectorizer, .. } => (vectorizer.n_features(), None, None),
            Backend::Transformer { encoder, .. } => (
                encoder.embedding_size(),
                Some(encoder.model_path.to_string_lossy().to_string()),
                Some(encoder.tokenizer_path.to_string_lossy().to_string()),
            ),
        };
        ClassifierInfo {
            backend: self.backend.kind(),
            num_classes: self.label_encoder.len(),
            class_labels: self.label_encoder.classes().to_vec(),
            feature_dimension,
            model_path,
            tokenizer_path,
            samples_seen: self.trained_samples + self.updated_samples,
        }
    }

    /// Predicts the encoded category of `text`. The result is always a valid
    /// label-encoder code.
    pub fn predict_index(&self, text: &str) -> Result<usize, ClassifierError> {
        let proba = self.predict_proba(text)?;
        argmax(&proba).ok_or_else(|| ClassifierError::PredictionError("No class could be scored".into()))
    }

    fn predict_proba(&self, text: &str) -> Result<Array1<f64>, ClassifierError> {
        if text.trim().is_empty() {
            return Err(ClassifierError::ValidationError("Input text cannot be empty".into()));
        }
        self.backend.predict_proba(text)
    }

    /// Makes a prediction for the given text, returning the category name and
    /// the probability of every category.
    pub fn predict(&self, text: &str) -> Result<(String, HashMap<String, f32>), ClassifierError> {
        let proba = self.predict_proba(text)?;
        let best = argmax(&proba)
            .ok_or_else(|| ClassifierError::PredictionError("No class could be scored".into()))?;

        let scores = self.label_encoder.classes().iter()
            .zip(proba.iter())
            .map(|(label, &p)| (label.clone(), p as f32))
            .collect();
        let label = self.label_encoder.inverse_transform(best)?.to_string();
        Ok((label, scores))
    }

    /// Accuracy over records whose categories are already encoded.
    pub fn evaluate(&self, records: &[EncodedRecord]) -> Result<Evaluation, ClassifierError> {
        if records.is_empty() {
            return Err(ClassifierError::ValidationError("Cannot evaluate on an empty set".into()));
        }
        let mut correct = 0;
        for record in records {
            if self.predict_index(&record.description)? == record.category {
                correct += 1;
            }
        }
        Ok(Evaluation {
            correct,
            total: records.len(),
            accuracy: correct as f64 / records.len() as f64,
        })
    }

    /// Runs a short additional training pass on newly labelled records.
    ///
    /// Categories must be known to the label encoder; the encoder is never
    /// re-fitted, since that would invalidate the trained outputs.
    pub fn update(&mut self, records: &[ExpenseRecord]) -> Result<usize, ClassifierError> {
        validate_batch(records)?;
        let categories: Vec<&str> = records.iter().map(|r| r.category.as_str()).collect();
        let labels = self.label_encoder.transform_all(&categories)?;
        let texts: Vec<&str> = records.iter().map(|r| r.description.as_str()).collect();

        match &mut self.backend {
            Backend::NaiveBayes { vectorizer, model } => {
                let features = vectorizer.transform_all(&texts);
                let empty = features.iter().filter(|f| f.is_empty()).count();
                if empty > 0 {
                    warn!("{} of {} update records share no terms with the vocabulary", empty, features.len());
                }
                model.partial_fit(&features, &labels)?;
            }
            Backend::Transformer { encoder, head } => {
                let embeddings = encoder.embed_all(&texts)?;
                head.update(&embeddings, &labels, &self.config)?;
            }
        }

        self.updated_samples += records.len();
        info!("Updated {} classifier with {} records", self.backend.kind(), records.len());
        Ok(records.len())
    }

    pub fn manifest(&self) -> Manifest {
        Manifest {
            backend: self.backend.kind(),
            classes: self.label_encoder.classes().to_vec(),
            config: self.config.clone(),
            trained_samples: self.trained_samples,
            updated_samples: self.updated_samples,
        }
    }

    /// Writes the model into `dir`, overwriting any previous artifact there.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<(), ClassifierError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        match &self.backend {
            Backend::NaiveBayes { vectorizer, model } => {
                write_json_atomic(&dir.join(VECTORIZER_FILE), vectorizer)?;
                write_json_atomic(&dir.join(NAIVE_BAYES_FILE), model)?;
            }
            Backend::Transformer { encoder, head } => {
                encoder.save_to(dir)?;
                write_json_atomic(&dir.join(HEAD_FILE), head)?;
            }
        }
        // written last: a directory with a manifest has all its parts
        write_json_atomic(&dir.join(MANIFEST_FILE), &self.manifest())?;
        info!("Saved {} classifier to {:?}", self.backend.kind(), dir);
        Ok(())
    }

    /// Loads a model written by [`save`](Self::save), pairing it with the label
    /// encoder it was trained against.
    pub fn load<P: AsRef<Path>>(
        dir: P,
        label_encoder: LabelEncoder,
        runtime_config: &RuntimeConfig,
    ) -> Result<Self, ClassifierError> {
        let dir = dir.as_ref();
        let manifest: Manifest = read_json(&dir.join(MANIFEST_FILE))?;

        if manifest.classes != label_encoder.classes() {
            return Err(ClassifierError::BuildError(format!(
                "Model in {:?} was trained on categories [{}] but the label encoder has [{}]",
                dir,
                manifest.classes.join(", "),
                label_encoder.classes().join(", ")
            )));
        }

        let backend = match manifest.backend {
            BackendKind::NaiveBayes => {
                let vectorizer: TfidfVectorizer = read_json(&dir.join(VECTORIZER_FILE))?;
                let model: MultinomialNb = read_json(&dir.join(NAIVE_BAYES_FILE))?;
                if model.n_features() != vectorizer.n_features() {
                    return Err(ClassifierError::ModelError(format!(
                        "Naive Bayes expects {} features but the vectorizer produces {}",
                        model.n_features(), vectorizer.n_features()
                    )));
                }
                Backend::NaiveBayes { vectorizer, model }
            }
            BackendKind::Transformer => {
                let encoder = TransformerEncoder::load_dir(dir, manifest.config.max_sequence_length, runtime_config)?;
                let head: SoftmaxHead = read_json(&dir.join(HEAD_FILE))?;
                if head.embedding_size() != encoder.embedding_size() {
                    return Err(ClassifierError::ModelError(format!(
                        "Head expects {}-dimensional embeddings but the encoder produces {}",
                        head.embedding_size(), encoder.embedding_size()
                    )));
                }
                Backend::Transformer { encoder, head }
            }
        };

        if backend.n_classes() != label_encoder.len() {
            return Err(ClassifierError::BuildError(format!(
                "Model has {} outputs but the label encoder has {} categories",
                backend.n_classes(), label_encoder.len()
            )));
        }

        info!("Loaded {} classifier from {:?}", manifest.backend, dir);
        Ok(Self {
            label_encoder: Arc::new(label_encoder),
            backend,
            config: manifest.config,
            trained_samples: manifest.trained_samples,
            updated_samples: manifest.updated_samples,
        })
    }
}
