use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use partclass::{pipeline, PartClass, PipelineConfig, Prediction, SnapshotStore, Split};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a classifier from a CSV file and write a snapshot
    Train {
        /// CSV file with a part-number column and a 0/1/2 label column
        #[arg(short, long)]
        data: PathBuf,
        /// Directory the snapshot is written to
        #[arg(short, long)]
        out: PathBuf,
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the number of epochs
        #[arg(long)]
        epochs: Option<usize>,
        /// Override the random seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Classify one or more strings with a trained snapshot
    Predict {
        #[arg(short, long)]
        snapshot: PathBuf,
        #[arg(required = true)]
        texts: Vec<String>,
    },
    /// Re-score the validation partition stored in a snapshot
    Evaluate {
        #[arg(short, long)]
        snapshot: PathBuf,
        /// Write the cross-category diagram in Graphviz format
        #[arg(long)]
        dot: Option<PathBuf>,
    },
    /// Show how the prediction evolves character by character
    Explain {
        #[arg(short, long)]
        snapshot: PathBuf,
        text: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Train { data, out, config, epochs, seed } => train(data, out, config, epochs, seed),
        Command::Predict { snapshot, texts } => predict(snapshot, &texts),
        Command::Evaluate { snapshot, dot } => evaluate(snapshot, dot),
        Command::Explain { snapshot, text } => explain(snapshot, &text),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(&path).with_context(|| format!("loading {:?}", path)),
        None => Ok(PipelineConfig::default()),
    }
}

fn open_store(dir: PathBuf) -> Result<SnapshotStore> {
    let store = SnapshotStore::open(&dir).with_context(|| format!("opening snapshot {:?}", dir))?;
    if !store.exists() {
        bail!("No snapshot found in {:?}; run `partclass train` first", dir);
    }
    Ok(store)
}

fn train(
    data: PathBuf,
    out: PathBuf,
    config: Option<PathBuf>,
    epochs: Option<usize>,
    seed: Option<u64>,
) -> Result<()> {
    let mut config = load_config(config)?;
    if let Some(epochs) = epochs {
        config.training.epochs = epochs;
    }
    if let Some(seed) = seed {
        config.training.seed = seed;
    }

    let start_time = Instant::now();
    info!("=== Training on {:?} ===", data);
    let output = pipeline::run(&data, &out, &config)?;
    info!("=== Training complete (took {:.2?}) ===", start_time.elapsed());

    let info = output.classifier.info();
    println!("Vocabulary size: {}", info.vocabulary_size);
    println!("Sequence length: {}", info.sequence_length);
    println!("Parameters:      {}", info.parameter_count);
    if let Some(last) = output.history.last() {
        println!("Final training loss {:.4}, accuracy {:.1}%", last.loss, last.accuracy * 100.0);
    }
    match &output.evaluation {
        Some(report) => print_report(report),
        None => println!("No validation samples; evaluation skipped"),
    }
    println!("Snapshot written to {:?}", out);
    Ok(())
}

fn predict(snapshot: PathBuf, texts: &[String]) -> Result<()> {
    let store = open_store(snapshot)?;
    let classifier = store.load(&Default::default())?;

    for text in texts {
        match classifier.predict(text) {
            Ok(prediction) => print_prediction(text, &prediction),
            Err(e) => eprintln!("{}: {}", text, e),
        }
    }
    Ok(())
}

fn evaluate(snapshot: PathBuf, dot: Option<PathBuf>) -> Result<()> {
    let store = open_store(snapshot)?;
    let classifier = store.load(&Default::default())?;
    let dataset = store.load_dataset()?;

    let validation = dataset.encoded(Split::Validation)?;
    if validation.is_empty() {
        bail!("Snapshot has no validation samples");
    }
    let report = partclass::evaluation::evaluate(&classifier, &validation)?;
    print_report(&report);

    if let Some(path) = dot {
        fs::write(&path, report.to_dot()).with_context(|| format!("writing {:?}", path))?;
        println!("Diagram written to {:?}", path);
    }
    Ok(())
}

fn explain(snapshot: PathBuf, text: &str) -> Result<()> {
    let store = open_store(snapshot)?;
    let classifier = store.load(&Default::default())?;
    let steps = classifier.explain(text)?;

    print!("{:<6}", "char");
    for class in PartClass::ALL {
        print!("{:>14}", class.name());
    }
    println!();
    for (c, probabilities) in steps {
        print!("{:<6}", c);
        for p in probabilities.iter() {
            print!("{:>13.1}%", p * 100.0);
        }
        println!();
    }
    Ok(())
}

fn print_prediction(text: &str, prediction: &Prediction) {
    println!("\n{}", text);
    println!("  Predicted class: {}", prediction.label);
    let mut scores: Vec<_> = prediction.scores().into_iter().collect();
    scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    for (class, score) in scores {
        println!("    {}: {:.1}%", class, score * 100.0);
    }
}

fn print_report(report: &partclass::EvaluationReport) {
    println!("\nValidation accuracy: {:.2}% ({} samples)", report.accuracy * 100.0, report.samples);
    for class in &report.per_class {
        match class.accuracy {
            Some(acc) => println!("  {:<14} {:.2}% ({} samples)", class.class.name(), acc * 100.0, class.support),
            None => println!("  {:<14} n/a (no samples)", class.class.name()),
        }
    }
    println!("\nCross-category bleeding (rows: true class, columns: predicted):");
    let bleeding = report.cross_category_bleeding();
    for (class, row) in PartClass::ALL.iter().zip(bleeding.outer_iter()) {
        let cells: Vec<String> = row.iter().map(|v| format!("{:>8.2}%", v * 100.0)).collect();
        println!("  {:<14}{}", class.name(), cells.join(""));
    }
}
