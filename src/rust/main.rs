use std::io;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;

use expense_classifier::pipeline;
use expense_classifier::{
    ArtifactLayout, BackendKind, BuiltinModel, EncoderSource, ModelManager, RuntimeConfig, TrainingConfig,
};

#[derive(Parser)]
#[command(author, version, about = "Classify expense descriptions into spending categories", long_about = None)]
struct Cli {
    /// Directory holding the splits, label encoder and side log
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,

    /// Directory holding one trained model per backend
    #[arg(long, global = true, default_value = "models")]
    models_dir: PathBuf,

    /// JSON file with training hyperparameters
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Intra-op threads for ONNX Runtime (0 lets the runtime decide)
    #[arg(long, global = true, default_value_t = 0)]
    threads: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    NaiveBayes,
    Transformer,
}

impl From<Backend> for BackendKind {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::NaiveBayes => BackendKind::NaiveBayes,
            Backend::Transformer => BackendKind::Transformer,
        }
    }
}

#[derive(Args)]
struct BackendArg {
    #[arg(long, value_enum, default_value = "naive-bayes")]
    backend: Backend,
}

#[derive(Subcommand)]
enum Command {
    /// Label-encode a raw CSV and split it into train and test sets
    Prepare {
        /// CSV with `description` and `category` columns
        input: PathBuf,
    },
    /// Train a model on the prepared splits and report its accuracy
    Train {
        #[command(flatten)]
        backend: BackendArg,
        /// Custom ONNX encoder instead of the built-in MiniLM
        #[arg(long, requires = "tokenizer")]
        model: Option<PathBuf>,
        /// Tokenizer for --model
        #[arg(long, requires = "model")]
        tokenizer: Option<PathBuf>,
    },
    /// Predict the category of one description
    Predict {
        #[command(flatten)]
        backend: BackendArg,
        text: String,
    },
    /// Continue training on newly labelled records
    Update {
        #[command(flatten)]
        backend: BackendArg,
        /// CSV of new records; defaults to the side log
        input: Option<PathBuf>,
    },
    /// Predict descriptions typed on stdin until `exit`
    Interactive {
        #[command(flatten)]
        backend: BackendArg,
        /// Do not append predictions to the side log
        #[arg(long)]
        no_log: bool,
    },
    /// Download and verify the built-in encoder
    Download {
        /// Force a fresh download of the model files
        #[arg(short, long)]
        fresh: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<TrainingConfig> {
    match path {
        Some(path) => TrainingConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => Ok(TrainingConfig::default()),
    }
}

async fn download(fresh: bool) -> Result<()> {
    let manager = ModelManager::new_default().context("Failed to create model cache directory")?;
    let model = BuiltinModel::MiniLM;

    if fresh {
        info!("Fresh download requested - removing any existing model files...");
        manager.remove_download(model)?;
    }
    manager.ensure_model_downloaded(model).await?;
    println!("{:?} is ready in {:?}", model, manager.models_dir());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let layout = ArtifactLayout::new(&cli.data_dir, &cli.models_dir);
    let runtime_config = RuntimeConfig::with_threads(cli.threads);
    let start_time = Instant::now();

    match cli.command {
        Command::Prepare { input } => {
            let config = load_config(cli.config.as_ref())?;
            let prepared = pipeline::prepare(&input, &layout, &config)
                .with_context(|| format!("Failed to prepare {:?}", input))?;
            println!(
                "Prepared {} records: {} train, {} test, categories [{}]",
                prepared.total, prepared.train, prepared.test, prepared.classes.join(", ")
            );
        }
        Command::Train { backend, model, tokenizer } => {
            let config = load_config(cli.config.as_ref())?;
            let kind = BackendKind::from(backend.backend);
            let encoder = match (model, tokenizer) {
                (Some(model_path), Some(tokenizer_path)) => {
                    if kind != BackendKind::Transformer {
                        bail!("--model and --tokenizer only apply to the transformer backend");
                    }
                    Some(EncoderSource::Custom { model_path, tokenizer_path, max_sequence_length: None })
                }
                _ => None,
            };
            let report = pipeline::train(&layout, kind, encoder, &config, &runtime_config)
                .with_context(|| format!("Failed to train the {} model", kind))?;
            println!("Test accuracy: {:.4} ({}/{})", report.test.accuracy, report.test.correct, report.test.total);
            println!("Train accuracy: {:.4} ({}/{})", report.train.accuracy, report.train.correct, report.train.total);
            println!("Model saved to {:?}", report.model_dir);
        }
        Command::Predict { backend, text } => {
            let kind = BackendKind::from(backend.backend);
            let (label, scores) = pipeline::predict(&layout, kind, &text, &runtime_config)
                .with_context(|| format!("Failed to predict with the {} model", kind))?;
            println!("Predicted category: {}", label);

            let mut scores: Vec<_> = scores.into_iter().collect();
            scores.sort_by(|a, b| b.1.total_cmp(&a.1));
            for (category, score) in scores {
                println!("  {:<20} {:.4}", category, score);
            }
        }
        Command::Update { backend, input } => {
            let kind = BackendKind::from(backend.backend);
            let input = input.unwrap_or_else(|| layout.side_log());
            let report = pipeline::update(&layout, kind, &input, &runtime_config)
                .with_context(|| format!("Failed to update the {} model from {:?}", kind, input))?;
            println!(
                "Updated with {} records ({} seen in total); model saved to {:?}",
                report.records, report.samples_seen, report.model_dir
            );
        }
        Command::Interactive { backend, no_log } => {
            let kind = BackendKind::from(backend.backend);
            let classifier = pipeline::load_classifier(&layout, kind, &runtime_config)
                .with_context(|| format!("Failed to load the {} model", kind))?;
            let side_log = (!no_log).then(|| layout.side_log());
            pipeline::interactive_session(&classifier, io::stdin().lock(), io::stdout(), side_log.as_deref())?;
        }
        Command::Download { fresh } => download(fresh).await?,
    }

    info!("Done in {:.2?}", start_time.elapsed());
    Ok(())
}
