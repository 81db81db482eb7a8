use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use letterdrill::{
    app_dirs::AppDirs,
    config::{ConfigStore, FileConfigStore},
    engine::CharacterSummary,
    progress::TimeRange,
    runtime::{FixedRecognizer, RecognitionOutcome, Session},
    storage::{KeyValueStore, SqliteStore},
    Candidate, Engine, Statistics, SupportedAlphabet,
};
use std::{io, path::PathBuf, rc::Rc};
use tracing_subscriber::EnvFilter;

/// adaptive handwriting practice: check recognizer output, track progress, pick the next letter
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    long_about = "Validates handwriting recognizer candidates against the letter being practiced, keeps a confidence-ranked sample history per letter, and recommends the letter that needs the most practice."
)]
pub struct Cli {
    /// database file to use instead of the default state directory
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    /// config file to use instead of the default config directory
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// alphabet to practice (overrides the config file)
    #[clap(short = 'a', long, value_enum, global = true)]
    alphabet: Option<SupportedAlphabet>,

    /// log debug output to stderr (RUST_LOG takes precedence)
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// print the letter to practice next
    Next,

    /// check one drawing of a letter against recognizer candidates
    Submit {
        /// the letter that was supposed to be drawn
        character: char,

        /// recognizer candidate as TEXT:CONFIDENCE, repeatable; none means no recognition result
        #[clap(short = 'c', long = "candidate", value_parser = parse_candidate)]
        candidates: Vec<Candidate>,

        /// file holding the raw drawing payload to store with the sample
        #[clap(long)]
        drawing: Option<PathBuf>,
    },

    /// show success rates, best and weakest letters
    Stats {
        /// only include letters practiced within this window
        #[clap(long, value_enum, default_value_t = TimeRange::All)]
        range: TimeRange,

        /// write per-letter rows as CSV instead of a table
        #[clap(long)]
        csv: bool,
    },

    /// list the stored samples for a letter
    Samples { character: char },

    /// forget all samples and progress
    Reset,
}

fn parse_candidate(s: &str) -> Result<Candidate, String> {
    let (text, confidence) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected TEXT:CONFIDENCE, got {s:?}"))?;
    let confidence: f64 = confidence
        .trim()
        .parse()
        .map_err(|e| format!("invalid confidence {confidence:?}: {e}"))?;
    Ok(Candidate::new(text, confidence))
}

fn uppercase(c: char) -> char {
    c.to_uppercase().next().unwrap_or(c)
}

fn open_engine(cli: &Cli) -> Result<Engine> {
    let config_store = cli
        .config
        .as_ref()
        .map(FileConfigStore::with_path)
        .unwrap_or_default();
    let mut config = config_store.load();
    if let Some(alphabet) = cli.alphabet {
        config.alphabet = alphabet;
    }

    let db_path = cli
        .db
        .clone()
        .or_else(AppDirs::db_path)
        .unwrap_or_else(|| PathBuf::from("letterdrill.db"));
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    let backend: Rc<dyn KeyValueStore> = Rc::new(store);

    Ok(Engine::new(config, backend)?)
}

fn format_confidence(confidence: Option<f64>) -> String {
    confidence.map_or_else(|| "no data".to_string(), |c| format!("{c:.2}"))
}

fn print_statistics(stats: &Statistics) {
    println!(
        "overall success rate: {:.0}%",
        stats.overall_success_rate * 100.0
    );
    println!();
    println!(
        "{:<6} {:>8} {:>8} {:>8} {:>10}  last attempt",
        "letter", "attempts", "success", "rate", "avg conf"
    );
    for p in &stats.per_character {
        println!(
            "{:<6} {:>8} {:>8} {:>7.0}% {:>10}  {}",
            p.character,
            p.attempts,
            p.successful_attempts,
            p.success_rate() * 100.0,
            format_confidence(p.average_confidence),
            p.last_attempt.format("%Y-%m-%d %H:%M")
        );
    }

    let letters = |list: &[CharacterSummary]| -> String {
        list.iter()
            .map(|p| {
                format!(
                    "{} ({:.0}%, avg conf {})",
                    p.character,
                    p.success_rate() * 100.0,
                    format_confidence(p.average_confidence)
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!();
    println!("best: {}", letters(&stats.best_characters));
    println!("weakest: {}", letters(&stats.weakest_characters));
}

fn write_statistics_csv(stats: &Statistics) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(io::stdout());
    wtr.write_record([
        "letter",
        "attempts",
        "successful_attempts",
        "success_rate",
        "average_confidence",
        "last_attempt",
    ])?;
    for p in &stats.per_character {
        wtr.write_record([
            p.character.to_string(),
            p.attempts.to_string(),
            p.successful_attempts.to_string(),
            format!("{:.4}", p.success_rate()),
            p.average_confidence
                .map(|c| format!("{c:.4}"))
                .unwrap_or_default(),
            p.last_attempt.to_rfc3339(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    let mut engine = open_engine(&cli)?;

    match &cli.command {
        Command::Next => println!("{}", engine.next_recommended()),
        Command::Submit {
            character,
            candidates,
            drawing,
        } => {
            let drawing = match drawing {
                Some(path) => std::fs::read(path)
                    .with_context(|| format!("failed to read drawing {}", path.display()))?,
                None => Vec::new(),
            };
            let recognizer = if candidates.is_empty() {
                FixedRecognizer::new(RecognitionOutcome::NoResult)
            } else {
                FixedRecognizer::candidates(candidates.clone())
            };

            let mut session = Session::new(recognizer, engine.config().recognizer_timeout());
            session.check(uppercase(*character), drawing);
            if let Some(outcome) = session.wait(&mut engine)? {
                match (&outcome.recognized_text, outcome.confidence) {
                    (Some(text), Some(confidence)) if outcome.accepted => {
                        println!("accepted {text} ({confidence:.2})")
                    }
                    (Some(text), Some(confidence)) => println!("rejected {text} ({confidence:.2})"),
                    _ => println!("not recognized"),
                }
            }
            println!("next: {}", engine.next_recommended());
        }
        Command::Stats { range, csv } => {
            let stats = engine.statistics_within(*range);
            if *csv {
                write_statistics_csv(&stats)?;
            } else {
                print_statistics(&stats);
            }
        }
        Command::Samples { character } => {
            for sample in engine.samples().samples(uppercase(*character))? {
                println!(
                    "{:.2} {} {} ({} bytes)",
                    sample.confidence,
                    if sample.was_successful { "ok  " } else { "miss" },
                    sample.timestamp.format("%Y-%m-%d %H:%M"),
                    sample.drawing.len()
                );
            }
        }
        Command::Reset => {
            engine.reset_all()?;
            println!("all progress and samples cleared");
        }
    }

    Ok(())
}
