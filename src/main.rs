use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use doc_triager::ai::ClassifierSettings;
use doc_triager::config::{Config, ConfigError};
use doc_triager::extract::{DocumentParser, Extractor};
use doc_triager::ledger::{export, ExportError, ExportFormat, Ledger, LedgerError, Triage};
use doc_triager::logging::{init_logging, LoggingError};
use doc_triager::{Orchestrator, RunOptions, TriageError};

const DEFAULT_CONFIG: &str = "config.toml";

#[derive(Parser)]
#[command(name = "doc-triager", version)]
#[command(about = "Triage documents into evergreen / temporal / unknown", long_about = None)]
struct Cli {
    /// Config file path (default: ./config.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Triage documents in the source directory
    Run {
        /// Source directory (overrides [input] directory)
        #[arg(short, long)]
        source: Option<String>,
        /// Output base directory (overrides [output] directory)
        #[arg(short, long)]
        output: Option<String>,
        /// Classify only, do not move files
        #[arg(long)]
        dry_run: bool,
        /// Max number of files to consider
        #[arg(short, long)]
        limit: Option<usize>,
        /// Target extensions, comma-separated
        #[arg(long, value_delimiter = ',')]
        extensions: Option<Vec<String>>,
    },
    /// Show ledger counts by category
    Status {
        /// List the records of one category
        #[arg(long)]
        triage: Option<Triage>,
        /// Show the record of one scanned file, by its original path
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Re-classify unknown documents with a new threshold
    Reclassify {
        #[arg(long, default_value_t = 0.5)]
        threshold: f64,
        /// Output base directory (overrides [output] directory)
        #[arg(short, long)]
        output: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Export triage results from the ledger
    Export {
        #[arg(long, default_value = "json")]
        format: ExportFormat,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the prompt that would be sent for a file
    Preview { file: PathBuf },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Logging(#[from] LoggingError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Triage(#[from] TriageError),
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Usage(String),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(dispatch(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let CliError::Triage(err) = &e {
                if let Some(summary) = err.summary() {
                    println!("{}", summary);
                }
            }
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Explicit paths must exist; the default falls back to the user config dir, then to defaults
fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = explicit {
        return Config::load(path);
    }

    let local = PathBuf::from(DEFAULT_CONFIG);
    if local.exists() {
        return Config::load(&local);
    }

    if let Some(user) = dirs::config_dir().map(|d| d.join("doc-triager").join(DEFAULT_CONFIG)) {
        if user.exists() {
            return Config::load(&user);
        }
    }

    Ok(Config::default())
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config.as_deref())?;

    let level = config.logging.level.clone();
    let log_file = config.log_file();
    let _guard = init_logging(&level, log_file.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::Run {
            source,
            output,
            dry_run,
            limit,
            extensions,
        } => {
            let config = config.resolve(source.as_deref(), output.as_deref())?;
            let api_key = config.resolve_api_key(Some(Path::new(".env")))?;

            tracing::info!(
                provider = %config.llm.provider,
                model = %config.llm.model,
                mode = %config.llm.mode,
                "Using LLM"
            );

            let orchestrator = Orchestrator::from_config(&config, api_key)?;
            let options = RunOptions {
                source: PathBuf::from(&config.input.directory),
                output: PathBuf::from(&config.output.directory),
                dry_run,
                limit,
                extensions,
            };

            let summary = orchestrator.run(&options).await?;
            println!("{}", summary);
        }

        Commands::Status { triage, path } => {
            let ledger = Ledger::open(&config.database_path())?;
            let counts = ledger.counts()?;
            println!("Total:     {}", counts.total);
            println!("Evergreen: {}", counts.evergreen);
            println!("Temporal:  {}", counts.temporal);
            println!("Unknown:   {}", counts.unknown);

            if let Some(triage) = triage {
                println!();
                for record in ledger.list_by_triage(triage)? {
                    let location = record.destination_path.as_deref().unwrap_or(&record.source_path);
                    match record.confidence {
                        Some(c) => println!("{:.2}  {}", c, location),
                        None => println!("  -   {}", location),
                    }
                }
            }

            if let Some(path) = path {
                let source = std::path::absolute(&path).unwrap_or(path);
                println!();
                match ledger.lookup_by_source(&source.display().to_string())? {
                    Some(record) => {
                        println!("Source:      {}", record.source_path);
                        println!(
                            "Destination: {}",
                            record.destination_path.as_deref().unwrap_or("(not moved)")
                        );
                        println!("Triage:      {}", record.triage);
                        match record.confidence {
                            Some(c) => println!("Confidence:  {:.2}", c),
                            None => println!("Confidence:  -"),
                        }
                        println!("Reason:      {}", record.reason);
                        if let Some(error) = &record.error_message {
                            println!("Error:       {}", error);
                        }
                    }
                    None => println!("No record for {}", source.display()),
                }
            }
        }

        Commands::Reclassify {
            threshold,
            output,
            dry_run,
        } => {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(CliError::Usage(format!(
                    "--threshold must be within [0, 1], got {}",
                    threshold
                )));
            }

            let mut config = config;
            if let Some(output) = output {
                config.output.directory = output;
            }
            if config.output.directory.is_empty() {
                return Err(ConfigError::Missing("output directory (--output or [output] directory)").into());
            }

            let api_key = config.resolve_api_key(Some(Path::new(".env")))?;
            let orchestrator = Orchestrator::from_config(&config, api_key)?;
            let summary = orchestrator
                .reclassify(threshold, Path::new(&config.output.directory), dry_run)
                .await?;
            println!("{}", summary);
        }

        Commands::Export { format, output } => {
            let ledger = Ledger::open(&config.database_path())?;
            let written = match output {
                Some(path) => {
                    let file = File::create(&path)?;
                    let count = export(&ledger, format, BufWriter::new(file))?;
                    eprintln!("Exported {} records to {}", count, path.display());
                    count
                }
                None => {
                    let stdout = io::stdout();
                    let mut handle = stdout.lock();
                    let count = export(&ledger, format, &mut handle)?;
                    handle.flush()?;
                    count
                }
            };
            tracing::debug!(records = written, "Export finished");
        }

        Commands::Preview { file } => {
            if !file.is_file() {
                return Err(CliError::Usage(format!("file not found: {}", file.display())));
            }

            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let extension = file
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
                .unwrap_or_default();

            let (text, truncated) = match DocumentParser::new().extract(&file) {
                Ok(extraction) => (extraction.text, extraction.truncated),
                Err(e) => {
                    eprintln!("Extraction failed ({}), showing a placeholder", e);
                    ("<extracted text goes here>".to_string(), false)
                }
            };

            println!("Mode:     {}", config.llm.mode);
            println!("Provider: {}", config.llm.provider);
            println!("Model:    {}", config.llm.model);
            println!();

            let settings = ClassifierSettings::from_config(&config);
            println!("{}", settings.preview_prompt(&filename, &extension, &text, truncated));
        }
    }

    Ok(())
}
