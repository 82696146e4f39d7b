//! The four stages (prepare, train, predict, update) and the interactive
//! prompt loop, each communicating with the others only through the files of
//! an [`ArtifactLayout`].

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::artifacts::ArtifactLayout;
use crate::classifier::{BackendKind, Classifier, ClassifierError, EncoderSource, Evaluation};
use crate::config::TrainingConfig;
use crate::dataset::{self, EncodedRecord, ExpenseRecord};
use crate::label_encoder::LabelEncoder;
use crate::models::BuiltinModel;
use crate::runtime::RuntimeConfig;

pub const EXIT_COMMAND: &str = "exit";

/// Outcome of the prepare stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedData {
    pub total: usize,
    pub train: usize,
    pub test: usize,
    pub classes: Vec<String>,
}

/// Outcome of the train stage.
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub backend: BackendKind,
    pub train: Evaluation,
    pub test: Evaluation,
    pub model_dir: PathBuf,
}

/// Outcome of the update stage.
#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub records: usize,
    pub samples_seen: usize,
    pub model_dir: PathBuf,
}

/// Reads a labelled CSV, fits the label encoder, splits the records and
/// writes `train.csv`, `test.csv` and `label_encoder.json`.
pub fn prepare(input: &Path, layout: &ArtifactLayout, config: &TrainingConfig) -> Result<PreparedData, ClassifierError> {
    config.validate()?;
    let records = dataset::load_records(input)?;
    info!("Loaded {} records from {:?}", records.len(), input);

    let encoder = LabelEncoder::fit(records.iter().map(|r| r.category.as_str()), config.encoding_order)?;
    let encoded = records.into_iter()
        .map(|r| {
            Ok(EncodedRecord {
                category: encoder.transform(&r.category)?,
                description: r.description,
            })
        })
        .collect::<Result<Vec<_>, ClassifierError>>()?;
    let total = encoded.len();

    let (train, test) = dataset::train_test_split(encoded, config.test_size, config.seed)?;
    dataset::write_encoded(layout.train_split(), &train)?;
    dataset::write_encoded(layout.test_split(), &test)?;
    encoder.save(layout.label_encoder())?;

    info!(
        "Prepared {} records ({} train / {} test) across {} categories",
        total, train.len(), test.len(), encoder.len()
    );
    Ok(PreparedData {
        total,
        train: train.len(),
        test: test.len(),
        classes: encoder.classes().to_vec(),
    })
}

/// Trains the chosen backend on the prepared splits, evaluates it and saves
/// it under the backend's model directory.
///
/// For the transformer backend `encoder` picks the pretrained encoder and
/// defaults to [`BuiltinModel::MiniLM`]; it is ignored for Naive Bayes.
pub fn train(
    layout: &ArtifactLayout,
    kind: BackendKind,
    encoder: Option<EncoderSource>,
    config: &TrainingConfig,
    runtime_config: &RuntimeConfig,
) -> Result<TrainReport, ClassifierError> {
    let label_encoder = LabelEncoder::load(layout.label_encoder())?;
    let train_records = dataset::load_encoded(layout.train_split())?;
    let test_records = dataset::load_encoded(layout.test_split())?;
    info!(
        "Training {} classifier on {} records ({} held out)",
        kind, train_records.len(), test_records.len()
    );

    let builder = Classifier::builder()
        .with_training_config(config.clone())?
        .with_runtime_config(runtime_config.clone());
    let builder = match kind {
        BackendKind::NaiveBayes => builder.with_naive_bayes()?,
        BackendKind::Transformer => match encoder.unwrap_or(EncoderSource::Builtin(BuiltinModel::MiniLM)) {
            EncoderSource::Builtin(model) => builder.with_model(model)?,
            EncoderSource::Custom { model_path, tokenizer_path, max_sequence_length } => {
                builder.with_custom_model(model_path, tokenizer_path, max_sequence_length)?
            }
        },
    };
    let classifier = builder
        .with_label_encoder(label_encoder)
        .with_training_data(train_records.clone())?
        .build()?;

    let test = classifier.evaluate(&test_records)?;
    let train = classifier.evaluate(&train_records)?;
    info!("Test accuracy: {:.4} ({}/{})", test.accuracy, test.correct, test.total);
    info!("Train accuracy: {:.4} ({}/{})", train.accuracy, train.correct, train.total);

    let model_dir = layout.model_dir(kind);
    classifier.save(&model_dir)?;
    Ok(TrainReport { backend: kind, train, test, model_dir })
}

/// Loads a persisted classifier together with its label encoder.
pub fn load_classifier(
    layout: &ArtifactLayout,
    kind: BackendKind,
    runtime_config: &RuntimeConfig,
) -> Result<Classifier, ClassifierError> {
    let label_encoder = LabelEncoder::load(layout.label_encoder())?;
    let classifier = Classifier::load(layout.model_dir(kind), label_encoder, runtime_config)?;
    if classifier.backend_kind() != kind {
        return Err(ClassifierError::BuildError(format!(
            "{:?} holds a {} model, expected {}",
            layout.model_dir(kind), classifier.backend_kind(), kind
        )));
    }
    Ok(classifier)
}

pub fn predict(
    layout: &ArtifactLayout,
    kind: BackendKind,
    text: &str,
    runtime_config: &RuntimeConfig,
) -> Result<(String, HashMap<String, f32>), ClassifierError> {
    load_classifier(layout, kind, runtime_config)?.predict(text)
}

/// Applies the records in `input` as an incremental update and overwrites the
/// persisted model in place.
pub fn update(
    layout: &ArtifactLayout,
    kind: BackendKind,
    input: &Path,
    runtime_config: &RuntimeConfig,
) -> Result<UpdateReport, ClassifierError> {
    let records = dataset::load_records_or_empty(input)?;
    update_with(layout, kind, &records, runtime_config)
}

pub fn update_with(
    layout: &ArtifactLayout,
    kind: BackendKind,
    records: &[ExpenseRecord],
    runtime_config: &RuntimeConfig,
) -> Result<UpdateReport, ClassifierError> {
    dataset::validate_batch(records)?;
    let mut classifier = load_classifier(layout, kind, runtime_config)?;
    let applied = classifier.update(records)?;

    let model_dir = layout.model_dir(kind);
    classifier.save(&model_dir)?;
    Ok(UpdateReport {
        records: applied,
        samples_seen: classifier.info().samples_seen,
        model_dir,
    })
}

/// Prompts for descriptions on `input` until `exit` (any case) or end of
/// input, printing each prediction to `output`.
///
/// With a `side_log`, every (description, predicted category) pair is
/// appended to it. Returns the number of predictions made.
pub fn interactive_session<R: BufRead, W: Write>(
    classifier: &Classifier,
    input: R,
    mut output: W,
    side_log: Option<&Path>,
) -> Result<usize, ClassifierError> {
    let mut predictions = 0;
    let mut lines = input.lines();

    loop {
        write!(output, "Enter an expense description (or '{}' to quit): ", EXIT_COMMAND)?;
        output.flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        let description = line.trim();
        if description.eq_ignore_ascii_case(EXIT_COMMAND) {
            writeln!(output, "Goodbye.")?;
            break;
        }
        if description.is_empty() {
            continue;
        }

        let (category, _) = classifier.predict(description)?;
        writeln!(output, "Predicted category: {}", category)?;
        predictions += 1;

        if let Some(path) = side_log {
            match dataset::append_record(path, &ExpenseRecord::new(description, category.as_str())) {
                Ok(()) => writeln!(output, "Saved to {}", path.display())?,
                Err(e) => warn!("Could not append to side log {:?}: {}", path, e),
            }
        }
    }

    info!("Interactive session ended after {} predictions", predictions);
    Ok(predictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;

    const RAW: &str = "description,category\n\
        Bought a new jacket,Shopping\n\
        Bought running shoes,Shopping\n\
        Bought a handbag online,Shopping\n\
        Paid electric bill,Bills\n\
        Paid water bill,Bills\n\
        Paid internet bill,Bills\n\
        Lunch at a noodle restaurant,Food\n\
        Dinner at a pizza restaurant,Food\n\
        Coffee and lunch downtown,Food\n\
        Paid phone bill,Bills\n";

    fn prepared() -> (tempfile::TempDir, ArtifactLayout) {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("expenses.csv");
        fs::write(&input, RAW).unwrap();
        let layout = ArtifactLayout::new(dir.path().join("data"), dir.path().join("models"));
        prepare(&input, &layout, &TrainingConfig::default()).unwrap();
        (dir, layout)
    }

    #[test]
    fn test_prepare_writes_splits_and_encoder() {
        let (_dir, layout) = prepared();
        let train = dataset::load_encoded(layout.train_split()).unwrap();
        let test = dataset::load_encoded(layout.test_split()).unwrap();
        assert_eq!(train.len() + test.len(), 10);
        assert!(!test.is_empty() && !train.is_empty());

        let encoder = LabelEncoder::load(layout.label_encoder()).unwrap();
        assert_eq!(encoder.classes(), ["Bills", "Food", "Shopping"]);
    }

    #[test]
    fn test_interactive_session_stops_on_exit() {
        let (dir, layout) = prepared();
        train(&layout, BackendKind::NaiveBayes, None, &TrainingConfig::default(), &RuntimeConfig::default()).unwrap();
        let classifier = load_classifier(&layout, BackendKind::NaiveBayes, &RuntimeConfig::default()).unwrap();

        let side_log = dir.path().join("data").join("side.csv");
        let input = Cursor::new("paid the gas bill\n\nEXIT\nbought socks\n");
        let mut output = Vec::new();
        let n = interactive_session(&classifier, input, &mut output, Some(side_log.as_path())).unwrap();
        assert_eq!(n, 1);

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("Predicted category: Bills"));
        let logged = dataset::load_records(&side_log).unwrap();
        assert_eq!(logged, vec![ExpenseRecord::new("paid the gas bill", "Bills")]);
    }

    #[test]
    fn test_update_from_missing_file_is_rejected() {
        let (dir, layout) = prepared();
        train(&layout, BackendKind::NaiveBayes, None, &TrainingConfig::default(), &RuntimeConfig::default()).unwrap();
        let result = update(&layout, BackendKind::NaiveBayes, &dir.path().join("none.csv"), &RuntimeConfig::default());
        assert!(matches!(result, Err(ClassifierError::ValidationError(_))));
    }
}
