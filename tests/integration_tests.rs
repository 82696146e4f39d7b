use expense_classifier::dataset::{self, load_encoded, load_records};
use expense_classifier::pipeline;
use expense_classifier::{
    ArtifactLayout, BackendKind, ClassifierError, EncodingOrder, ExpenseRecord, LabelEncoder,
    RuntimeConfig, TrainingConfig,
};
use env_logger::{Builder, Env};
use std::fs;
use std::io::Cursor;
use std::path::Path;

// Initialize test logger
fn init() {
    let _ = Builder::from_env(Env::default().default_filter_or("warn"))
        .try_init();
}

const EXPENSES: &str = "\
category,description,amount
Food,Lunch at a noodle restaurant,45000
Food,Dinner with friends at a pizza restaurant,320000
Food,Coffee and cake downtown,60000
Food,Groceries at the market,210000
Food,Breakfast pho near the office,40000
Bills,Paid electric bill,850000
Bills,Paid water bill,120000
Bills,Internet bill for the apartment,250000
Bills,Paid phone bill,100000
Bills,Monthly rent for the apartment,5000000
Shopping,Bought a new jacket,700000
Shopping,Bought running shoes,1200000
Shopping,Ordered a handbag online,900000
Shopping,Bought a phone case online,80000
Shopping,New jeans from the mall,500000
Transport,Taxi to the airport,300000
Transport,Monthly bus pass,200000
Transport,Fuel for the motorbike,90000
Transport,Grab bike to the office,35000
Transport,Train ticket to Hue,650000
";

fn setup(dir: &Path) -> ArtifactLayout {
    init();
    let input = dir.join("expenses.csv");
    fs::write(&input, EXPENSES).unwrap();
    let layout = ArtifactLayout::new(dir.join("data"), dir.join("models"));
    pipeline::prepare(&input, &layout, &TrainingConfig::default()).unwrap();
    layout
}

#[test]
fn test_prepare_stage() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("expenses.csv");
    fs::write(&input, EXPENSES)?;
    let layout = ArtifactLayout::new(dir.path().join("data"), dir.path().join("models"));

    let prepared = pipeline::prepare(&input, &layout, &TrainingConfig::default())?;
    assert_eq!(prepared.total, 20);
    assert_eq!(prepared.test, 4);
    assert_eq!(prepared.train, 16);
    assert_eq!(prepared.classes, vec!["Bills", "Food", "Shopping", "Transport"]);

    let train = load_encoded(layout.train_split())?;
    let test = load_encoded(layout.test_split())?;
    assert_eq!(train.len() + test.len(), 20);
    assert!(train.iter().chain(&test).all(|r| r.category < 4));
    assert!(test.iter().all(|t| !train.contains(t)));

    // same seed, same split
    let other = ArtifactLayout::new(dir.path().join("data2"), dir.path().join("models"));
    pipeline::prepare(&input, &other, &TrainingConfig::default())?;
    assert_eq!(load_encoded(other.test_split())?, test);
    Ok(())
}

#[test]
fn test_first_seen_encoding_order() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("expenses.csv");
    fs::write(&input, EXPENSES)?;
    let layout = ArtifactLayout::new(dir.path().join("data"), dir.path().join("models"));
    let config = TrainingConfig { encoding_order: EncodingOrder::FirstSeen, ..Default::default() };

    pipeline::prepare(&input, &layout, &config)?;
    let encoder = LabelEncoder::load(layout.label_encoder())?;
    assert_eq!(encoder.classes(), ["Food", "Bills", "Shopping", "Transport"]);
    Ok(())
}

#[test]
fn test_train_predict_update() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let layout = setup(dir.path());
    let runtime = RuntimeConfig::default();

    let report = pipeline::train(&layout, BackendKind::NaiveBayes, None, &TrainingConfig::default(), &runtime)?;
    assert_eq!(report.test.total, 4);
    assert_eq!(report.train.total, 16);
    assert!(report.train.accuracy > 0.5);
    assert!(report.model_dir.join("manifest.json").exists());
    assert!(report.model_dir.join("vectorizer.json").exists());
    assert!(report.model_dir.join("naive_bayes.json").exists());

    let (label, scores) = pipeline::predict(&layout, BackendKind::NaiveBayes, "paid the gas bill", &runtime)?;
    assert_eq!(label, "Bills");
    assert_eq!(scores.len(), 4);

    let batch = dir.path().join("batch.csv");
    dataset::write_records(&batch, &[
        ExpenseRecord::new("Paid electric bill for June", "Bills"),
        ExpenseRecord::new("Bus ticket to work", "Transport"),
    ])?;
    let updated = pipeline::update(&layout, BackendKind::NaiveBayes, &batch, &runtime)?;
    assert_eq!(updated.records, 2);
    assert_eq!(updated.samples_seen, 18);

    // the update overwrote the persisted model
    let reloaded = pipeline::load_classifier(&layout, BackendKind::NaiveBayes, &runtime)?;
    assert_eq!(reloaded.info().samples_seen, 18);
    assert_eq!(reloaded.manifest().updated_samples, 2);
    Ok(())
}

#[test]
fn test_update_rejects_unseen_category() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let layout = setup(dir.path());
    let runtime = RuntimeConfig::default();
    pipeline::train(&layout, BackendKind::NaiveBayes, None, &TrainingConfig::default(), &runtime)?;

    let result = pipeline::update_with(
        &layout,
        BackendKind::NaiveBayes,
        &[ExpenseRecord::new("Hotel in Da Lat", "Travel")],
        &runtime,
    );
    assert!(matches!(result, Err(ClassifierError::UnseenLabel(_))));

    let reloaded = pipeline::load_classifier(&layout, BackendKind::NaiveBayes, &runtime)?;
    assert_eq!(reloaded.manifest().updated_samples, 0);
    Ok(())
}

#[test]
fn test_predict_without_training() {
    let dir = tempfile::tempdir().unwrap();
    let layout = setup(dir.path());
    let result = pipeline::predict(&layout, BackendKind::NaiveBayes, "coffee", &RuntimeConfig::default());
    assert!(matches!(result, Err(ClassifierError::BuildError(_))));
}

#[test]
fn test_interactive_feeds_update() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let layout = setup(dir.path());
    let runtime = RuntimeConfig::default();
    pipeline::train(&layout, BackendKind::NaiveBayes, None, &TrainingConfig::default(), &runtime)?;
    let classifier = pipeline::load_classifier(&layout, BackendKind::NaiveBayes, &runtime)?;

    let input = Cursor::new("bought new shoes online\npaid the water bill\nExit\n");
    let mut output = Vec::new();
    let side_log = layout.side_log();
    let n = pipeline::interactive_session(&classifier, input, &mut output, Some(side_log.as_path()))?;
    assert_eq!(n, 2);

    let logged = load_records(&side_log)?;
    assert_eq!(logged.len(), 2);
    assert_eq!(logged[0].description, "bought new shoes online");
    assert_eq!(logged[1].category, "Bills");

    // self-labelled pairs go straight back in as an update
    let updated = pipeline::update(&layout, BackendKind::NaiveBayes, &side_log, &runtime)?;
    assert_eq!(updated.records, 2);
    Ok(())
}

#[test]
fn test_interactive_without_side_log() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let layout = setup(dir.path());
    let runtime = RuntimeConfig::default();
    pipeline::train(&layout, BackendKind::NaiveBayes, None, &TrainingConfig::default(), &runtime)?;
    let classifier = pipeline::load_classifier(&layout, BackendKind::NaiveBayes, &runtime)?;

    // end of input also ends the session
    let n = pipeline::interactive_session(&classifier, Cursor::new("coffee\n"), Vec::new(), None)?;
    assert_eq!(n, 1);
    assert!(!layout.side_log().exists());
    Ok(())
}
