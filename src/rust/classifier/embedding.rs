use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info};
use ndarray::{Array1, Array2, ArrayD};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Encoding, Tokenizer, TruncationParams};

use super::error::ClassifierError;
use super::utils::normalize_vector;
use crate::artifacts::copy_atomic;
use crate::runtime::{create_session_builder, RuntimeConfig};

pub(crate) const MODEL_FILE: &str = "model.onnx";
pub(crate) const TOKENIZER_FILE: &str = "tokenizer.json";

/// Provides text embedding functionality using ONNX models.
///
/// This trait handles the conversion of text into numerical embeddings through:
/// 1. Tokenization of input text, truncated to the model's sequence limit
/// 2. Running the ONNX model to generate hidden states
/// 3. Post-processing of the first token's hidden state (normalization)
///
/// The ONNX model is expected to:
/// - Accept `input_ids` and `attention_mask` (shape [batch_size, sequence_length]),
///   and optionally `token_type_ids`
/// - Output hidden states of shape [batch_size, sequence_length, embedding_size]
pub(crate) trait TextEmbedding {
    /// Returns the initialized tokenizer if available
    fn tokenizer(&self) -> Option<&Tokenizer>;

    /// Returns the initialized ONNX session if available
    fn session(&self) -> Option<&Session>;

    /// Counts the tokens the model will see, special tokens included, after truncation.
    fn count_tokens(&self, text: &str) -> Result<usize, ClassifierError> {
        self.tokenize(text).map(|encoding| encoding.len())
    }

    /// Encodes text into model input.
    ///
    /// The tokenizer truncates to the model's sequence limit and keeps the
    /// trailing special tokens, so long inputs are shortened rather than rejected.
    ///
    /// # Errors
    /// - `TokenizerError` if the tokenizer is not initialized or the text cannot be encoded
    /// - `ValidationError` if the text produces no tokens
    fn tokenize(&self, text: &str) -> Result<Encoding, ClassifierError> {
        let tokenizer = self.tokenizer()
            .ok_or_else(|| ClassifierError::TokenizerError("Tokenizer not initialized".into()))?;

        let encoding = tokenizer.encode(text, true)
            .map_err(|e| ClassifierError::TokenizerError(e.to_string()))?;
        if encoding.is_empty() {
            return Err(ClassifierError::ValidationError("Input text produced no tokens".into()));
        }
        if !encoding.get_overflowing().is_empty() {
            debug!("Input truncated to {} tokens", encoding.len());
        }
        Ok(encoding)
    }

    /// Converts text into a normalized embedding vector.
    fn embed_text(&self, text: &str) -> Result<Array1<f32>, ClassifierError> {
        let encoding = self.tokenize(text)?;
        self.get_embedding(&encoding)
    }

    /// Generates embeddings from an encoded input using the ONNX model.
    ///
    /// Uses the first token's hidden state ([0,0,:]) as the sequence embedding.
    ///
    /// # Errors
    /// - `ModelError` if the session is not initialized, tensor creation fails,
    ///   model execution fails or output extraction fails
    fn get_embedding(&self, encoding: &Encoding) -> Result<Array1<f32>, ClassifierError> {
        let session = self.session()
            .ok_or_else(|| ClassifierError::ModelError("Session not initialized".into()))?;

        let input_dyn = to_input_array(encoding.get_ids())
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create input array: {}", e)))?;
        let input_ids = input_dyn.as_standard_layout();

        let mask_dyn = to_input_array(encoding.get_attention_mask())
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create mask array: {}", e)))?;
        let attention_mask = mask_dyn.as_standard_layout();

        let mut input_tensors = HashMap::new();
        input_tensors.insert("input_ids", Tensor::from_array(&input_ids)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create input tensor: {}", e)))?);
        input_tensors.insert("attention_mask", Tensor::from_array(&attention_mask)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create mask tensor: {}", e)))?);

        if session.inputs.iter().any(|input| input.name == "token_type_ids") {
            let type_dyn = to_input_array(encoding.get_type_ids())
                .map_err(|e| ClassifierError::ModelError(format!("Failed to create token type array: {}", e)))?;
            let token_type_ids = type_dyn.as_standard_layout();
            input_tensors.insert("token_type_ids", Tensor::from_array(&token_type_ids)
                .map_err(|e| ClassifierError::ModelError(format!("Failed to create token type tensor: {}", e)))?);
        }

        let outputs = session.run(input_tensors)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to run model: {}", e)))?;
        let output_tensor = outputs[0].try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::ModelError(format!("Failed to extract output tensor: {}", e)))?;

        if output_tensor.ndim() != 3 {
            return Err(ClassifierError::ModelError(format!(
                "Expected hidden states of rank 3, got shape {:?}", output_tensor.shape()
            )));
        }
        let mut embedding = Array1::zeros(output_tensor.shape()[2]);
        let embedding_slice = output_tensor.slice(ndarray::s![0, 0, ..]);
        embedding.assign(&Array1::from_iter(embedding_slice.iter().cloned()));

        Ok(normalize_vector(&embedding))
    }

    /// Embeds every text, failing on the first error.
    fn embed_all<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Array1<f32>>, ClassifierError>
    where
        Self: Sized,
    {
        texts.iter()
            .enumerate()
            .map(|(i, text)| {
                self.embed_text(text.as_ref()).map_err(|e| {
                    error!("Failed to embed text {}: {}", i + 1, e);
                    e
                })
            })
            .collect()
    }
}

/// Lays a single encoded sequence out as a `[1, len]` int64 batch.
fn to_input_array(values: &[u32]) -> Result<ArrayD<i64>, ndarray::ShapeError> {
    Array2::from_shape_vec((1, values.len()), values.iter().map(|&x| x as i64).collect())
        .map(|array| array.into_dyn())
}

/// Loads a tokenizer that truncates to `max_sequence_length` tokens, special tokens included.
pub(crate) fn load_tokenizer(path: &Path, max_sequence_length: usize) -> Result<Tokenizer, ClassifierError> {
    let mut tokenizer = Tokenizer::from_file(path)
        .map_err(|e| {
            error!("Failed to load tokenizer: {}", e);
            ClassifierError::BuildError(format!("Failed to load tokenizer: {}", e))
        })?;
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: max_sequence_length,
            ..Default::default()
        }))
        .map_err(|e| ClassifierError::BuildError(format!("Failed to configure truncation: {}", e)))?;
    Ok(tokenizer)
}

/// A pretrained sentence encoder: tokenizer plus ONNX session, shared behind `Arc`.
#[derive(Debug, Clone)]
pub struct TransformerEncoder {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    tokenizer: Arc<Tokenizer>,
    session: Arc<Session>,
    max_sequence_length: usize,
    embedding_size: usize,
}

impl TextEmbedding for TransformerEncoder {
    fn tokenizer(&self) -> Option<&Tokenizer> {
        Some(&self.tokenizer)
    }

    fn session(&self) -> Option<&Session> {
        Some(&self.session)
    }
}

impl TransformerEncoder {
    /// Loads the tokenizer and ONNX model, validates the model's inputs and
    /// infers the embedding size by embedding a sample input.
    pub fn load(
        model_path: &Path,
        tokenizer_path: &Path,
        max_sequence_length: usize,
        runtime_config: &RuntimeConfig,
    ) -> Result<Self, ClassifierError> {
        if !model_path.exists() {
            return Err(ClassifierError::BuildError(format!("Model file not found: {:?}", model_path)));
        }
        if !tokenizer_path.exists() {
            return Err(ClassifierError::BuildError(format!("Tokenizer file not found: {:?}", tokenizer_path)));
        }
        if max_sequence_length == 0 {
            return Err(ClassifierError::BuildError("Max sequence length must be positive".into()));
        }

        let tokenizer = load_tokenizer(tokenizer_path, max_sequence_length)?;
        info!("Tokenizer loaded successfully");

        let session = create_session_builder(runtime_config)?
            .commit_from_file(model_path)?;
        Self::validate_model(&session)?;
        info!("Model structure validated successfully");

        let mut encoder = Self {
            model_path: model_path.to_path_buf(),
            tokenizer_path: tokenizer_path.to_path_buf(),
            tokenizer: Arc::new(tokenizer),
            session: Arc::new(session),
            max_sequence_length,
            embedding_size: 0,
        };

        let sample = encoder.embed_text("Test input to infer embedding size")?;
        encoder.embedding_size = sample.len();
        info!("Inferred embedding size from model: {}", encoder.embedding_size);
        Ok(encoder)
    }

    /// Loads an encoder previously written by [`save_to`](Self::save_to).
    pub fn load_dir(dir: &Path, max_sequence_length: usize, runtime_config: &RuntimeConfig) -> Result<Self, ClassifierError> {
        Self::load(&dir.join(MODEL_FILE), &dir.join(TOKENIZER_FILE), max_sequence_length, runtime_config)
    }

    /// Copies the model and tokenizer into `dir` so the artifact is self-contained.
    pub fn save_to(&self, dir: &Path) -> Result<(), ClassifierError> {
        copy_atomic(&self.model_path, &dir.join(MODEL_FILE))?;
        copy_atomic(&self.tokenizer_path, &dir.join(TOKENIZER_FILE))?;
        Ok(())
    }

    pub fn embedding_size(&self) -> usize {
        self.embedding_size
    }

    pub fn max_sequence_length(&self) -> usize {
        self.max_sequence_length
    }

    pub fn count_tokens(&self, text: &str) -> Result<usize, ClassifierError> {
        TextEmbedding::count_tokens(self, text)
    }

    /// L2-normalised embedding of `text`.
    pub fn embed(&self, text: &str) -> Result<Array1<f32>, ClassifierError> {
        self.embed_text(text)
    }

    /// Validates that the model has the expected input/output structure
    fn validate_model(session: &Session) -> Result<(), ClassifierError> {
        let inputs = &session.inputs;
        if inputs.len() < 2 {
            return Err(ClassifierError::ModelError(
                format!("Model must have at least 2 inputs (input_ids and attention_mask), found {}", inputs.len())
            ));
        }

        let outputs = &session.outputs;
        if outputs.is_empty() {
            return Err(ClassifierError::ModelError(
                "Model must have at least 1 output for embeddings".to_string()
            ));
        }

        Ok(())
    }
}
