use clap::{Parser, Subcommand, ValueEnum};
use crossterm::style::Stylize;
use keyboard_core::core::audit::AuditTable;
use keyboard_core::corpus::BigramCounter;
use keyboard_core::persistence::{
    load_layout, load_transition_table, load_vocabulary, save_snapshot, save_transition_table, save_vocabulary,
    ModelSnapshot,
};
use keyboard_core::{CorrectionEngine, CorrectionResult, EngineConfig, Identified, KeyboardLayout, ModelPaths, Session};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

const DEFAULT_VOCAB_PATH: &str = "data/vocabulary.txt";
const DEFAULT_MATRIX_PATH: &str = "data/transition_matrix.json";

/// Corrects keyboard typos in sentences with a bigram HMM
#[derive(Parser, Debug)]
#[command(name = "keyboard_engine", version, about)]
struct Args {
    /// Verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides it.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Correct sentences given as arguments, or one per line on stdin
    Decode(DecodeArgs),

    /// Count bigrams in a text corpus and write the smoothed transition matrix
    #[command(name = "build-table")]
    BuildTable(BuildTableArgs),

    /// Bundle vocabulary, layout and matrix into one binary snapshot
    Snapshot(SnapshotArgs),
}

#[derive(clap::Args, Debug)]
struct ModelArgs {
    /// Vocabulary file (JSON array or one word per line)
    #[arg(long, env = "KEYBOARD_VOCAB", default_value = DEFAULT_VOCAB_PATH)]
    vocab: PathBuf,

    /// Transition matrix JSON
    #[arg(long, env = "KEYBOARD_MATRIX", default_value = DEFAULT_MATRIX_PATH)]
    matrix: PathBuf,

    /// Keyboard layout JSON; built-in Spanish QWERTY when omitted
    #[arg(long)]
    layout: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct DecodeArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// Load the models from a snapshot instead of the individual files
    #[arg(long, conflicts_with_all = ["vocab", "matrix", "layout"])]
    snapshot: Option<PathBuf>,

    /// Engine config JSON
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    sentences: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct BuildTableArgs {
    /// Plain-text corpus, one document per line
    #[arg(long)]
    corpus: PathBuf,

    #[arg(long, default_value = DEFAULT_MATRIX_PATH)]
    output: PathBuf,

    /// Also write the most frequent words as a vocabulary file
    #[arg(long)]
    vocab_output: Option<PathBuf>,

    #[arg(long, default_value_t = 20_000)]
    vocab_size: usize,
}

#[derive(clap::Args, Debug)]
struct SnapshotArgs {
    #[command(flatten)]
    model: ModelArgs,

    #[arg(long, default_value = "data/model.bin")]
    output: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Human,
    Json,
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args.command) {
        eprintln!("{} {e}", "[ERROR]".red().bold());
        process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .init();
}

fn run(command: Command) -> keyboard_core::Result<()> {
    match command {
        Command::Decode(args) => decode(args),
        Command::BuildTable(args) => build_table(args),
        Command::Snapshot(args) => snapshot(args),
    }
}

fn decode(args: DecodeArgs) -> keyboard_core::Result<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };
    let engine = match &args.snapshot {
        Some(path) => CorrectionEngine::from_snapshot(path, &config)?,
        None => CorrectionEngine::from_paths(
            &ModelPaths {
                vocabulary: args.model.vocab.clone(),
                transition_table: args.model.matrix.clone(),
                layout: args.model.layout.clone(),
            },
            &config,
        )?,
    };

    let sentences = if args.sentences.is_empty() {
        io::stdin().lock().lines().collect::<io::Result<Vec<String>>>()?
    } else {
        args.sentences
    };

    let mut session = Session::new();
    let results = session.solve_batch(&engine, &sentences);

    match args.format {
        OutputFormat::Json => {
            for result in &results {
                let line = if args.pretty {
                    serde_json::to_string_pretty(result)?
                } else {
                    serde_json::to_string(result)?
                };
                println!("{line}");
            }
        }
        OutputFormat::Human => {
            for (sentence, result) in sentences.iter().zip(&results) {
                print_human(sentence, result);
            }
        }
    }
    Ok(())
}

fn print_human(sentence: &str, result: &Identified<CorrectionResult>) {
    let value = &result.value;
    println!("{} #{}", "Result".bold(), result.id);
    println!("  Original:  {sentence}");
    println!("  Corrected: {}", value.corrected_text.as_str().green().bold());
    println!("  Score:     {:.4}", value.best_score);
    for entry in &value.audit {
        let table = AuditTable(entry).to_string();
        if entry.original == entry.chosen {
            print!("{table}");
        } else {
            print!("{}", table.yellow());
        }
    }
    println!();
}

fn build_table(args: BuildTableArgs) -> keyboard_core::Result<()> {
    let file = File::open(&args.corpus)?;
    let mut counter = BigramCounter::new();
    counter.add_lines(BufReader::new(file))?;

    tracing::info!(
        tokens = counter.token_count(),
        vocab = counter.vocab_size(),
        bigrams = counter.bigram_count(),
        "corpus counted"
    );
    if counter.vocab_size() == 0 {
        return Err(keyboard_core::KeyboardError::invalid_model(format!(
            "no words found in {}",
            args.corpus.display()
        )));
    }

    save_transition_table(&counter.to_transition_table(), &args.output)?;
    if let Some(path) = &args.vocab_output {
        save_vocabulary(&counter.top_words(args.vocab_size), path)?;
    }
    println!("Transition matrix written to '{}'", args.output.display());
    Ok(())
}

fn snapshot(args: SnapshotArgs) -> keyboard_core::Result<()> {
    let layout = match &args.model.layout {
        Some(path) => load_layout(path)?,
        None => KeyboardLayout::qwerty_es(),
    };
    let snapshot = ModelSnapshot {
        vocabulary: load_vocabulary(&args.model.vocab)?,
        layout,
        table: load_transition_table(&args.model.matrix)?,
    };
    save_snapshot(&snapshot, &args.output)?;
    println!("Snapshot written to '{}'", args.output.display());
    Ok(())
}
