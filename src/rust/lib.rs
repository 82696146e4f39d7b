//! Expense-description classification with two interchangeable pipelines:
//! TF-IDF features with multinomial Naive Bayes, or a pretrained ONNX sentence
//! encoder with a trained softmax head.
//!
//! Both follow the same four stages (prepare, train, predict, update) and
//! communicate only through files described by [`ArtifactLayout`].
//!
//! # Basic Usage
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use expense_classifier::{Classifier, EncodedRecord, EncodingOrder, ExpenseRecord, LabelEncoder};
//!
//! let encoder = LabelEncoder::fit(["Food", "Transport"], EncodingOrder::Sorted)?;
//! let records = vec![
//!     EncodedRecord { description: "Lunch at the noodle bar".into(), category: 0 },
//!     EncodedRecord { description: "Dinner with friends".into(), category: 0 },
//!     EncodedRecord { description: "Taxi to the airport".into(), category: 1 },
//!     EncodedRecord { description: "Monthly bus pass".into(), category: 1 },
//! ];
//!
//! let mut classifier = Classifier::builder()
//!     .with_naive_bayes()?
//!     .with_label_encoder(encoder)
//!     .with_training_data(records)?
//!     .build()?;
//!
//! let (label, scores) = classifier.predict("taxi home")?;
//! println!("Predicted category: {} ({:?})", label, scores);
//!
//! classifier.update(&[ExpenseRecord::new("Train ticket to the coast", "Transport")])?;
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! A trained classifier is immutable until [`Classifier::update`] and can be
//! shared across threads using `Arc`:
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use expense_classifier::{Classifier, EncodedRecord, EncodingOrder, LabelEncoder};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let encoder = LabelEncoder::fit(["Bills", "Shopping"], EncodingOrder::Sorted)?;
//! let classifier = Arc::new(Classifier::builder()
//!     .with_naive_bayes()?
//!     .with_label_encoder(encoder)
//!     .with_training_data(vec![
//!         EncodedRecord { description: "Paid electric bill".into(), category: 0 },
//!         EncodedRecord { description: "Bought a jacket".into(), category: 1 },
//!     ])?
//!     .build()?);
//!
//! let mut handles = vec![];
//! for _ in 0..3 {
//!     let classifier = Arc::clone(&classifier);
//!     handles.push(thread::spawn(move || {
//!         classifier.predict("bought shoes").unwrap();
//!     }));
//! }
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! # Ok(())
//! # }
//! ```

pub mod artifacts;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod label_encoder;
pub mod model_manager;
pub mod models;
pub mod pipeline;
mod runtime;

pub use artifacts::ArtifactLayout;
pub use classifier::{
    BackendKind, Classifier, ClassifierBuilder, ClassifierError, ClassifierInfo, EncoderSource,
    Evaluation, Manifest, TransformerEncoder,
};
pub use config::TrainingConfig;
pub use dataset::{EncodedRecord, ExpenseRecord};
pub use label_encoder::{EncodingOrder, LabelEncoder};
pub use runtime::{RuntimeConfig, create_session_builder};
pub use model_manager::{ModelManager, ModelError};
pub use models::{BuiltinModel, ModelCharacteristics, ModelInfo};

pub fn init_logger() {
    env_logger::init();
}
