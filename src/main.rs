use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use intelliject::chunker::split_pages;
use intelliject::config::Settings;
use intelliject::excerpt::ExcerptExtractor;
use intelliject::index::SimilarityIndex;
use intelliject::loader;
use intelliject::pipeline::{MatchOptions, MatchOutcome, MatchStatus, Matcher};
use intelliject::record::SubjectFilter;
use intelliject::search::search_timed;
use intelliject::store::SqliteStore;
use intelliject::{completion, embedding};

#[derive(Parser)]
#[command(name = "intelliject")]
#[command(version = "0.1")]
#[command(about = "Match previous-year exam questions to study notes", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the question database
    Init,
    /// Load questions from a JSON file, or every JSON file in a directory
    Load {
        path: PathBuf,
        /// Subject for every row; defaults to the file name
        #[arg(long)]
        subject: Option<String>,
    },
    /// List subjects with their question counts
    Subjects,
    /// Rank questions against a single query
    Search {
        #[arg(long)]
        subject: Option<String>,
        #[arg(short, long)]
        k: Option<usize>,
        query: String,
    },
    /// Match notes against a subject's questions
    Match {
        #[arg(long)]
        subject: Option<String>,
        #[arg(short, long)]
        k: Option<usize>,
        /// Notes file; reads stdin when omitted. Form feeds separate pages.
        #[arg(short, long)]
        input: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Format::Plain)]
        format: Format,
    },
    Config,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Plain,
    Json,
}

fn open_store(settings: &Settings) -> Result<SqliteStore> {
    SqliteStore::open(&settings.database_path)
        .with_context(|| format!("failed to open database at {}", settings.database_path))
}

fn init_command(settings: &Settings) -> Result<()> {
    let store = open_store(settings)?;
    store.ping()?;
    println!("initialized {}", settings.database_path);
    Ok(())
}

fn load_command(settings: &Settings, path: &Path, subject: Option<&str>) -> Result<()> {
    let mut store = open_store(settings)?;
    let reports = if path.is_dir() {
        if subject.is_some() {
            log::warn!("--subject is ignored when loading a directory");
        }
        loader::load_dir(&mut store, path)?
    } else {
        vec![loader::load_file(&mut store, path, subject)
            .with_context(|| format!("failed to load {}", path.display()))?]
    };
    for report in &reports {
        println!(
            "{}: {} loaded, {} skipped ({})",
            report.subject,
            report.inserted,
            report.skipped(),
            report.path.display()
        );
    }
    Ok(())
}

fn subjects_command(settings: &Settings) -> Result<()> {
    let store = open_store(settings)?;
    for (subject, count) in store.subjects()? {
        println!("{}\t{}", subject, count);
    }
    Ok(())
}

fn search_command(settings: &Settings, subject: Option<&str>, k: Option<usize>, query: &str) -> Result<()> {
    let store = open_store(settings)?;
    let embedder = embedding::from_config(&settings.embedding)?;
    let filter = SubjectFilter::from_name(subject);
    let k = k.unwrap_or(settings.top_k);

    let options = MatchOptions::from(settings).index;
    let index = SimilarityIndex::build(&store, &embedder, &filter, options)?;
    let (results, timings) = search_timed(index.as_ref(), &embedder, query, k)?;
    log::debug!("search timings: {:?}", timings);

    let output = serde_json::json!({
        "query": query,
        "subject": filter.name(),
        "indexed_questions": index.as_ref().map_or(0, |i| i.len()),
        "results": results,
        "actual_results_count": results.len(),
        "requested_results_count": k,
    });
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn read_notes(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

fn match_command(
    settings: &Settings,
    subject: Option<&str>,
    k: Option<usize>,
    input: Option<&Path>,
    format: Format,
) -> Result<()> {
    let notes = read_notes(input)?;
    let pages = split_pages(&notes);

    let store = open_store(settings)?;
    let embedder = embedding::from_config(&settings.embedding)?;
    let completer = completion::from_config(&settings.completion)?;
    let extractor = ExcerptExtractor::new(completer, settings.excerpt_policy);

    let mut matcher = Matcher::new(store, embedder, extractor, MatchOptions::from(settings));
    if settings.cache_indices {
        matcher = matcher.with_cache();
    }

    let filter = SubjectFilter::from_name(subject);
    let outcomes = matcher.process_pages(&pages, &filter, k.unwrap_or(settings.top_k));

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&outcomes)?),
        Format::Plain => outcomes.iter().for_each(print_outcome),
    }
    Ok(())
}

fn print_outcome(outcome: &MatchOutcome) {
    println!(
        "== chunk {} (page {}) [{}]",
        outcome.chunk.index + 1,
        outcome.chunk.page + 1,
        outcome.subtopic
    );
    println!("{}", outcome.chunk.text);
    match &outcome.status {
        MatchStatus::NoMatches => println!("  (no matching questions)"),
        MatchStatus::Unavailable { reason } => println!("  (retrieval unavailable: {})", reason),
        MatchStatus::Matched => {
            for m in &outcome.matches {
                let record = &m.result.record;
                let mut meta = Vec::new();
                if let Some(year) = record.year {
                    meta.push(year.to_string());
                }
                if let Some(marks) = record.marks {
                    meta.push(format!("{} marks", marks));
                }
                println!("  {}. {} [{:.3}]", m.result.rank + 1, record.question, m.result.score);
                if !meta.is_empty() {
                    println!("     {}", meta.join(", "));
                }
                if !m.excerpt.is_empty() {
                    println!("     > {}", m.excerpt.text);
                }
            }
        }
    }
    println!();
}

fn config_command(settings: &Settings) -> Result<()> {
    settings.print_config();
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = Settings::new()?;

    let level = if args.verbose || settings.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match args.command {
        Commands::Init => init_command(&settings)?,
        Commands::Load { path, subject } => load_command(&settings, &path, subject.as_deref())?,
        Commands::Subjects => subjects_command(&settings)?,
        Commands::Search { subject, k, query } => search_command(&settings, subject.as_deref(), k, &query)?,
        Commands::Match {
            subject,
            k,
            input,
            format,
        } => match_command(&settings, subject.as_deref(), k, input.as_deref(), format)?,
        Commands::Config => config_command(&settings)?,
    }
    Ok(())
}
