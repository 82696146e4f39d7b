use expense_classifier::{
    BuiltinModel, Classifier, ClassifierError, EncodedRecord, EncodingOrder, ExpenseRecord,
    LabelEncoder, ModelManager, RuntimeConfig, TransformerEncoder,
};
use std::sync::Arc;
use std::thread;

const EXPENSES: &[(&str, &str)] = &[
    ("Bought a new jacket", "Shopping"),
    ("Bought running shoes at the mall", "Shopping"),
    ("Ordered a handbag online", "Shopping"),
    ("Paid electric bill", "Bills"),
    ("Paid the water bill", "Bills"),
    ("Internet bill for March", "Bills"),
    ("Lunch at a noodle restaurant", "Food"),
    ("Dinner at a pizza restaurant", "Food"),
    ("Groceries and fruit at the market", "Food"),
    ("Taxi to the airport", "Transport"),
    ("Monthly bus pass", "Transport"),
    ("Fuel for the car", "Transport"),
];

fn encoded(encoder: &LabelEncoder, rows: &[(&str, &str)]) -> Vec<EncodedRecord> {
    rows.iter()
        .map(|(description, category)| EncodedRecord {
            description: description.to_string(),
            category: encoder.transform(category).unwrap(),
        })
        .collect()
}

fn setup_test_classifier() -> Classifier {
    let encoder = LabelEncoder::fit(EXPENSES.iter().map(|e| e.1), EncodingOrder::Sorted).unwrap();
    let records = encoded(&encoder, EXPENSES);
    Classifier::builder()
        .with_naive_bayes()
        .unwrap()
        .with_label_encoder(encoder)
        .with_training_data(records)
        .unwrap()
        .build()
        .expect("Failed to create classifier")
}

#[test]
fn test_two_record_classifier() -> Result<(), Box<dyn std::error::Error>> {
    let rows = [("Bought a jacket", "Shopping"), ("Paid electric bill", "Bills")];
    let encoder = LabelEncoder::fit(rows.iter().map(|r| r.1), EncodingOrder::Sorted)?;
    let records = encoded(&encoder, &rows);
    let classifier = Classifier::builder()
        .with_naive_bayes()?
        .with_label_encoder(encoder)
        .with_training_data(records)?
        .build()?;

    let (class, scores) = classifier.predict("Bought shoes")?;
    assert!(class == "Shopping" || class == "Bills");
    assert_eq!(scores.len(), 2);
    Ok(())
}

#[test]
fn test_end_to_end_classification() -> Result<(), Box<dyn std::error::Error>> {
    let classifier = setup_test_classifier();

    let (class, scores) = classifier.predict("paid the gas bill")?;
    assert_eq!(class, "Bills");
    assert!(scores["Bills"] > scores["Shopping"]);

    let (class, _) = classifier.predict("taxi home from the airport")?;
    assert_eq!(class, "Transport");
    Ok(())
}

#[test]
fn test_prediction_is_always_a_training_category() -> Result<(), Box<dyn std::error::Error>> {
    let classifier = setup_test_classifier();
    let categories = classifier.label_encoder().classes().to_vec();

    for text in ["something entirely unrelated", "xyz", "Bought fuel for lunch", "ăn phở bò"] {
        let (class, scores) = classifier.predict(text)?;
        assert!(categories.contains(&class), "{} is not a training category", class);
        assert_eq!(scores.len(), categories.len());
    }
    Ok(())
}

#[test]
fn test_evaluate_on_training_data() -> Result<(), Box<dyn std::error::Error>> {
    let classifier = setup_test_classifier();
    let records = encoded(classifier.label_encoder(), EXPENSES);
    let evaluation = classifier.evaluate(&records)?;
    assert_eq!(evaluation.total, EXPENSES.len());
    assert!(evaluation.accuracy >= 0.75);
    assert!(classifier.evaluate(&[]).is_err());
    Ok(())
}

#[test]
fn test_update_shifts_predictions() -> Result<(), Box<dyn std::error::Error>> {
    let mut classifier = setup_test_classifier();
    let batch: Vec<ExpenseRecord> = (0..5)
        .map(|_| ExpenseRecord::new("Parking at the mall", "Transport"))
        .collect();

    assert_eq!(classifier.update(&batch)?, 5);
    let (class, scores) = classifier.predict("the mall")?;
    assert_eq!(class, "Transport");
    assert!(scores["Transport"] > scores["Shopping"]);
    assert_eq!(classifier.info().samples_seen, EXPENSES.len() + 5);
    Ok(())
}

#[test]
fn test_save_and_load_predict_the_same() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let classifier = setup_test_classifier();
    classifier.save(dir.path())?;

    let encoder = classifier.label_encoder().clone();
    let loaded = Classifier::load(dir.path(), encoder, &RuntimeConfig::default())?;
    for text in ["paid the gas bill", "bus to work", "new shoes", "pizza"] {
        let (expected, expected_scores) = classifier.predict(text)?;
        let (label, scores) = loaded.predict(text)?;
        assert_eq!(label, expected);
        for (category, score) in expected_scores {
            assert!((scores[&category] - score).abs() < 1e-5);
        }
    }
    assert_eq!(loaded.manifest(), classifier.manifest());
    Ok(())
}

#[test]
fn test_load_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let encoder = LabelEncoder::fit(["Bills"], EncodingOrder::Sorted).unwrap();
    let result = Classifier::load(dir.path().join("absent"), encoder, &RuntimeConfig::default());
    assert!(matches!(result, Err(ClassifierError::BuildError(_))));
}

#[test]
fn test_thread_safety() {
    let classifier = Arc::new(setup_test_classifier());
    let mut handles = vec![];

    for _ in 0..3 {
        let classifier = Arc::clone(&classifier);
        let handle = thread::spawn(move || {
            let result = classifier.predict("test text");
            assert!(result.is_ok());
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_classifier_thread_safety() {
    let classifier = setup_test_classifier();

    // Test that classifier can be sent to another thread
    thread::spawn(move || {
        classifier.predict("test").unwrap();
    }).join().unwrap();
}

fn minilm_paths() -> (std::path::PathBuf, std::path::PathBuf) {
    ModelManager::new_default()
        .unwrap()
        .require_downloaded(BuiltinModel::MiniLM)
        .expect("run `expense-classifier download` first")
}

#[test]
#[ignore = "requires the downloaded MiniLM encoder"]
fn test_token_length_handling() {
    let (model_path, tokenizer_path) = minilm_paths();
    let encoder = TransformerEncoder::load(&model_path, &tokenizer_path, 128, &RuntimeConfig::default()).unwrap();
    let very_long_text = "paid for groceries, fuel, a jacket and the electric bill ".repeat(40);

    let token_count = encoder.count_tokens(&very_long_text).unwrap();
    assert_eq!(token_count, 128, "Expected tokenizer to truncate at 128 tokens");
    assert_eq!(encoder.embedding_size(), BuiltinModel::MiniLM.characteristics().embedding_size);
}

#[test]
#[ignore = "requires the downloaded MiniLM encoder"]
fn test_transformer_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let encoder = LabelEncoder::fit(EXPENSES.iter().map(|e| e.1), EncodingOrder::Sorted)?;
    let records = encoded(&encoder, EXPENSES);
    let mut classifier = Classifier::builder()
        .with_model(BuiltinModel::MiniLM)?
        .with_label_encoder(encoder)
        .with_training_data(records.clone())?
        .build()?;

    assert!(classifier.evaluate(&records)?.accuracy > 0.5);
    let (class, _) = classifier.predict("Paid the electricity bill")?;
    assert!(classifier.label_encoder().classes().contains(&class));

    classifier.update(&[ExpenseRecord::new("Gym membership", "Bills")])?;

    let dir = tempfile::tempdir()?;
    classifier.save(dir.path())?;
    let loaded = Classifier::load(dir.path(), classifier.label_encoder().clone(), &RuntimeConfig::default())?;
    assert_eq!(classifier.predict("bus ticket")?.0, loaded.predict("bus ticket")?.0);
    Ok(())
}

#[test]
#[ignore = "requires the downloaded MiniLM encoder"]
fn test_saved_token_limit_matches_encoder() -> Result<(), Box<dyn std::error::Error>> {
    let (model_path, tokenizer_path) = minilm_paths();
    let encoder = LabelEncoder::fit(EXPENSES.iter().map(|e| e.1), EncodingOrder::Sorted)?;
    let records = encoded(&encoder, EXPENSES);
    let classifier = Classifier::builder()
        .with_custom_model(&model_path, &tokenizer_path, Some(256))?
        .with_label_encoder(encoder)
        .with_training_data(records)?
        .build()?;
    assert_eq!(classifier.manifest().config.max_sequence_length, 256);

    let dir = tempfile::tempdir()?;
    classifier.save(dir.path())?;
    let loaded = Classifier::load(dir.path(), classifier.label_encoder().clone(), &RuntimeConfig::default())?;
    assert_eq!(loaded.config().max_sequence_length, 256);

    let long_text = "dinner with the whole team at the riverside seafood restaurant ".repeat(20);
    assert_eq!(classifier.predict(&long_text)?.0, loaded.predict(&long_text)?.0);
    Ok(())
}
