use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use dtag::config::{self, ConfigError, FileConfig, KeySource, Overrides, Settings};
use dtag::dataset::{self, Dataset, DatasetLimits};
use dtag::engine::{ClassificationJobBuilder, JobControl, JobState, Progress};
use dtag::report::{RunReport, TagCount};
use dtag::taxonomy::{self, ImportError, TagNormalizer};
use dtag::{ClassifierClient, ConfigurationError, ProviderError, Tag, build_prompt};
use thiserror::Error;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

/// dtag - tag free-text CSV columns with an LLM
#[derive(Parser)]
#[command(name = "dtag")]
#[command(about = "Classify each row of a CSV file against a tag list using an LLM")]
#[command(version)]
struct Cli {
    /// Increase log output (-v for info, -vv for debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Classify every row of a CSV file and write the annotated copy
    Run(RunCommand),
    /// Normalize, validate and print a tag list
    Tags(TagsCommand),
    /// Print the prompt that would be sent for a comment
    Prompt(PromptCommand),
    /// Show the config file location and resolved settings
    Config(ConfigCommand),
}

/// Where to read tag definitions from
#[derive(Args)]
#[group(required = true, multiple = false)]
struct TagArgs {
    /// JSON file holding an array of tags (or an object with a "tags" array)
    #[arg(long, value_name = "JSON")]
    tags: Option<PathBuf>,

    /// CSV file with Tag, Description and Example columns
    #[arg(long, value_name = "CSV")]
    tags_csv: Option<PathBuf>,
}

/// Provider selection; each flag overrides its environment variable and the config file
#[derive(Args, Default)]
struct ProviderArgs {
    /// Provider: google, openai or openrouter
    #[arg(long, value_name = "ID")]
    provider: Option<String>,

    /// Model identifier (defaults depend on the provider)
    #[arg(long, value_name = "MODEL")]
    model: Option<String>,

    /// API key (prefer DTAG_API_KEY or the provider's own variable)
    #[arg(long, value_name = "KEY", hide = true)]
    api_key: Option<String>,

    /// Override the provider's API base URL
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Sampling temperature sent with every request
    #[arg(long, value_name = "T")]
    temperature: Option<f32>,

    /// Cap on reply length, in tokens
    #[arg(long, value_name = "N")]
    max_tokens: Option<u32>,

    /// Config file path
    #[arg(long, value_name = "PATH", env = "DTAG_CONFIG")]
    config: Option<PathBuf>,
}

/// Classify a CSV file
#[derive(Parser)]
struct RunCommand {
    /// Input CSV file with a header row
    #[arg(short, long, value_name = "CSV")]
    input: PathBuf,

    /// Name of the column holding the text to classify
    #[arg(short, long, value_name = "NAME")]
    column: String,

    #[command(flatten)]
    tag_args: TagArgs,

    #[command(flatten)]
    provider: ProviderArgs,

    /// Output CSV (defaults to <input>_tagged.csv next to the input)
    #[arg(short, long, value_name = "CSV")]
    output: Option<PathBuf>,

    /// Also write a JSON run report
    #[arg(long, value_name = "JSON")]
    report: Option<PathBuf>,

    /// Pause between provider calls, in milliseconds
    #[arg(long, value_name = "MS")]
    delay_ms: Option<u64>,

    /// Retries for rate-limited calls
    #[arg(long, value_name = "N")]
    max_retries: Option<u32>,

    /// Per-request timeout, in seconds
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Accept inputs over 10 MiB or 10,000 rows
    #[arg(long)]
    no_input_limits: bool,
}

/// Inspect a tag list
#[derive(Parser)]
struct TagsCommand {
    #[command(flatten)]
    tag_args: TagArgs,

    /// Print the cleaned tags as JSON instead of a tree
    #[arg(long)]
    json: bool,
}

/// Render a prompt
#[derive(Parser)]
struct PromptCommand {
    #[command(flatten)]
    tag_args: TagArgs,

    /// The comment to embed in the prompt
    #[arg(long, value_name = "TEXT")]
    comment: String,
}

/// Show settings
#[derive(Parser)]
struct ConfigCommand {
    #[command(flatten)]
    provider: ProviderArgs,
}

/// A problem with the user's input that is not worth a backtrace.
#[derive(Debug, Error)]
#[error("{0}")]
struct UserError(String);

fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Commands::Run(cmd) => handle_run(cmd),
        Commands::Tags(cmd) => handle_tags(cmd),
        Commands::Prompt(cmd) => handle_prompt(cmd),
        Commands::Config(cmd) => handle_config(cmd),
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            // Determine exit code based on error type
            let exit_code = if is_user_error(&e) { 1 } else { 2 };
            eprintln!("Error: {e:#}");
            std::process::exit(exit_code);
        }
    }
}

/// Installs the stderr log subscriber.
///
/// `RUST_LOG` wins when set; otherwise `-v` flags raise the default `warn`.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Determines if an error is a user error (vs internal error).
///
/// User errors are bad input files, flags or settings. Everything else,
/// such as I/O failures while writing output, is internal.
fn is_user_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause.is::<UserError>()
            || cause.is::<ConfigurationError>()
            || cause.is::<ConfigError>()
            || cause.is::<ImportError>()
            || matches!(
                cause.downcast_ref::<ProviderError>(),
                Some(ProviderError::Configuration(_))
            )
    })
}

/// Handles the run command: classify, write output and report.
///
/// Returns the process exit code: 0 when every row was processed, 1 when
/// the user stopped the run, 2 when a provider error ended it.
fn handle_run(cmd: &RunCommand) -> Result<i32> {
    let tags = load_tags(&cmd.tag_args)?;

    let dataset = if cmd.no_input_limits {
        Dataset::read_path(&cmd.input)
    } else {
        Dataset::read_path_limited(&cmd.input, DatasetLimits::default())
    }
    .map_err(|e| UserError(format!("Failed to read dataset {}: {e}", cmd.input.display())))?;
    if !dataset.has_column(&cmd.column) {
        return Err(UserError(format!(
            "Column \"{}\" not found in {}. Available columns: {}",
            cmd.column,
            cmd.input.display(),
            dataset.headers.join(", ")
        ))
        .into());
    }

    let settings = resolve_settings(
        &cmd.provider,
        Overrides {
            inter_row_delay_ms: cmd.delay_ms,
            max_retries: cmd.max_retries,
            request_timeout_secs: cmd.timeout_secs,
            ..Overrides::default()
        },
    )?;
    let client = settings
        .build_client()
        .context("Failed to configure provider")?;
    let client_label = client.describe();

    let output_path = cmd
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cmd.input));

    let (tx, rx) = mpsc::channel();
    let job = ClassificationJobBuilder::new()
        .rows(dataset.rows.clone())
        .target_column(&cmd.column)
        .tags(tags)
        .client(std::sync::Arc::new(client))
        .config(settings.engine)
        .progress(tx)
        .build()
        .context("Failed to start classification")?;
    let control = job.control();

    eprintln!(
        "Classifying {} rows with {client_label}. Type p + Enter to pause/resume, s + Enter to stop.",
        job.total_rows()
    );

    let started_at = OffsetDateTime::now_utc();
    let worker = thread::spawn(move || job.run());
    spawn_control_listener(control);
    render_progress(rx);

    let outcome = worker
        .join()
        .map_err(|_| anyhow::anyhow!("Classification worker panicked"))?;
    let finished_at = OffsetDateTime::now_utc();

    dataset::write_path(&output_path, &dataset.headers, &outcome.rows)
        .with_context(|| format!("Failed to write output: {}", output_path.display()))?;

    if let Some(report_path) = &cmd.report {
        RunReport::new(
            &outcome,
            settings.provider.id(),
            &settings.model,
            started_at,
            finished_at,
        )
        .write_path(report_path)
        .with_context(|| format!("Failed to write report: {}", report_path.display()))?;
    }

    println!("{}", outcome.message);
    println!(
        "Wrote {} of {} rows to {} ({} with errors)",
        outcome.rows.len(),
        outcome.total_rows,
        output_path.display(),
        outcome.rows_failed()
    );
    print_tag_summary(outcome.rows_tagged(), &TagCount::tally(&outcome), outcome.rows.len());

    Ok(match outcome.state {
        JobState::Completed => 0,
        JobState::Fatal => 2,
        _ => 1,
    })
}

/// Prints how many rows were tagged and how often each tag column was set.
fn print_tag_summary(rows_tagged: usize, counts: &[TagCount], total: usize) {
    println!("Rows tagged: {rows_tagged} of {total}");
    let width = counts.iter().map(|c| c.name.chars().count()).max().unwrap_or(0);
    for count in counts {
        println!(
            "  {:<width$}  {:>6}  {:>5.1}%",
            count.name, count.count, count.percentage
        );
    }
}

/// Handles the tags command by printing the cleaned tag tree.
fn handle_tags(cmd: &TagsCommand) -> Result<i32> {
    let tags = load_tags(&cmd.tag_args)?;

    if cmd.json {
        let json = serde_json::to_string_pretty(&tags).context("Failed to serialize tags")?;
        println!("{json}");
        return Ok(0);
    }

    for tag in taxonomy::flatten(&tags) {
        let indent = "  ".repeat(tag.level() - 1);
        let description = if tag.description().is_empty() {
            String::new()
        } else {
            format!(" - {}", tag.description())
        };
        println!("{indent}{}{description}", tag.name());
        for example in tag.examples() {
            println!("{indent}    e.g. \"{example}\"");
        }
    }
    Ok(0)
}

/// Handles the prompt command by printing the rendered prompt.
fn handle_prompt(cmd: &PromptCommand) -> Result<i32> {
    let tags = load_tags(&cmd.tag_args)?;

    if cmd.comment.trim().is_empty() {
        eprintln!("Empty comments are tagged without calling the provider; no prompt is sent.");
        return Ok(0);
    }

    println!("{}", build_prompt(&cmd.comment, &taxonomy::flatten(&tags)));
    Ok(0)
}

/// Handles the config command by printing where settings come from.
fn handle_config(cmd: &ConfigCommand) -> Result<i32> {
    let path = config::config_path(cmd.provider.config.as_deref());
    let settings = resolve_settings(&cmd.provider, Overrides::default())?;

    match &path {
        Some(path) if path.exists() => println!("Config file: {}", path.display()),
        Some(path) => println!("Config file: {} (not found, using defaults)", path.display()),
        None => println!("Config file: none (no config directory on this platform)"),
    }
    println!("Provider:    {} ({})", settings.provider.id(), settings.provider);
    println!("Model:       {}", settings.model);
    println!(
        "API key:     {}",
        match &settings.key_source {
            KeySource::Flag => "set (--api-key)".to_string(),
            KeySource::Env(name) => format!("set ({name})"),
            KeySource::Unset => format!(
                "unset (set {} or {})",
                config::API_KEY_ENV,
                settings.provider.api_key_env_vars().join(" / ")
            ),
        }
    );
    println!(
        "Base URL:    {}",
        settings
            .base_url
            .as_deref()
            .unwrap_or(settings.provider.default_base_url())
    );
    println!("Row delay:   {} ms", settings.engine.inter_row_delay.as_millis());
    println!(
        "Retries:     {} (backoff from {} ms)",
        settings.engine.retry.max_retries,
        settings.engine.retry.base_delay.as_millis()
    );
    println!("Timeout:     {} s", settings.request_timeout.as_secs());
    println!(
        "Generation:  temperature {}, max tokens {}",
        settings
            .temperature
            .map_or_else(|| "provider default".to_string(), |t| t.to_string()),
        settings
            .max_tokens
            .map_or_else(|| "provider default".to_string(), |n| n.to_string())
    );
    Ok(0)
}

/// Loads, normalizes, cleans and validates tags from the selected file.
fn load_tags(args: &TagArgs) -> Result<Vec<Tag>> {
    let tags = match (&args.tags, &args.tags_csv) {
        (Some(path), _) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read tag file: {}", path.display()))?;
            let raw: serde_json::Value = serde_json::from_str(&contents).map_err(|e| {
                UserError(format!("Invalid tag JSON in {}: {e}", path.display()))
            })?;
            let list = raw.get("tags").unwrap_or(&raw);
            TagNormalizer::clean(&TagNormalizer::normalize(list))
        }
        (None, Some(path)) => {
            let imported = taxonomy::import_csv_path(path)
                .with_context(|| format!("Failed to import tags: {}", path.display()))?;
            TagNormalizer::clean(&imported)
        }
        (None, None) => return Err(UserError("Either --tags or --tags-csv is required".into()).into()),
    };

    let issues = taxonomy::validate(&tags);
    if !issues.is_empty() {
        let list: Vec<String> = issues.iter().map(|issue| format!("  - {issue}")).collect();
        return Err(UserError(format!("Invalid tag list:\n{}", list.join("\n"))).into());
    }
    Ok(tags)
}

fn resolve_settings(args: &ProviderArgs, mut overrides: Overrides) -> Result<Settings> {
    overrides.provider = args.provider.clone();
    overrides.model = args.model.clone();
    overrides.api_key = args.api_key.clone();
    overrides.base_url = args.base_url.clone();
    overrides.temperature = args.temperature;
    overrides.max_tokens = args.max_tokens;

    let file = match config::config_path(args.config.as_deref()) {
        Some(path) => FileConfig::load(&path)?,
        None => FileConfig::default(),
    };
    Ok(Settings::resolve(&overrides, &file)?)
}

/// Returns `<dir>/<stem>_tagged.csv` for an input at `<dir>/<stem>.<ext>`.
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}_tagged.csv"))
}

/// Reads pause/stop commands from an interactive stdin on a detached thread.
fn spawn_control_listener(control: JobControl) {
    if !std::io::stdin().is_terminal() {
        return;
    }

    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match line.trim().to_lowercase().as_str() {
                "p" | "pause" | "resume" => {
                    if control.toggle_pause() {
                        eprintln!("Pausing after the current row (p + Enter to resume)...");
                    } else {
                        eprintln!("Resuming...");
                    }
                }
                "s" | "stop" => {
                    control.request_stop();
                    eprintln!("Stopping after the current row...");
                    break;
                }
                _ => {}
            }
        }
    });
}

/// Prints progress events on stderr until the job drops its sender.
fn render_progress(rx: mpsc::Receiver<Progress>) {
    let mut stderr = std::io::stderr();
    for progress in rx {
        let _ = write!(
            stderr,
            "\r[{:>3.0}%] {}/{} {:<60}",
            progress.fraction() * 100.0,
            progress.rows_done,
            progress.total_rows,
            progress.status
        );
        let _ = stderr.flush();
        if progress.state.is_terminal() {
            let _ = writeln!(stderr);
        }
    }
}
