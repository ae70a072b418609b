//! CLI for LLM Locality.
//!
//! This crate provides the `locality` command-line interface: running
//! cold/warm test cases against a load balancer or gateway, analyzing the
//! accumulated results, and maintaining prompt corpora.

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

use anyhow::{bail, Context};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use llm_locality_benchmarks::{aggregate, analyze_file, io, markdown, JsonlSink};
use llm_locality_harness::corpus::{check_corpus, generate_corpus};
use llm_locality_harness::prompts::{parse_delimiter, DEFAULT_CORPUS};
use llm_locality_harness::{ConnectionChoice, Echo, HarnessSettings, HttpChatExecutor, Sequencer};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// LLM Locality CLI.
#[derive(Parser, Debug)]
#[command(name = "locality")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one cold/warm test case and append its record to the sink.
    Run {
        /// 0-based corpus index.
        #[arg(long)]
        index: usize,

        /// Harness settings overrides.
        #[command(flatten)]
        harness: HarnessArgs,
    },

    /// Run consecutive corpus indices one after another.
    ///
    /// A failed call skips that index; the sweep continues with the next.
    Sweep {
        /// First corpus index.
        #[arg(long, default_value_t = 0)]
        start: usize,

        /// Number of test cases to run.
        #[arg(long)]
        count: usize,

        /// Harness settings overrides.
        #[command(flatten)]
        harness: HarnessArgs,
    },

    /// Summarize a results file per mode.
    Analyze {
        /// Results file (JSON Lines).
        #[arg(default_value = io::DEFAULT_SINK)]
        path: PathBuf,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,

        /// Write the report to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate or validate prompt corpora.
    Corpus {
        /// Corpus action.
        #[command(subcommand)]
        action: CorpusCommand,
    },

    /// Print the effective settings as JSON.
    Config {
        /// Harness settings overrides.
        #[command(flatten)]
        harness: HarnessArgs,
    },
}

/// Corpus subcommands.
#[derive(Subcommand, Debug)]
pub enum CorpusCommand {
    /// Append synthetic, validated prompt pairs to a corpus file.
    Generate {
        /// Corpus file to append to.
        #[arg(long, default_value = DEFAULT_CORPUS)]
        out: PathBuf,

        /// Number of pairs to add.
        #[arg(long, default_value_t = 50)]
        pairs: usize,

        /// Field delimiter.
        #[arg(long, default_value = ",")]
        delimiter: String,
    },

    /// Report records that violate the corpus rules.
    Check {
        /// Corpus file to check.
        #[arg(long, default_value = DEFAULT_CORPUS)]
        file: PathBuf,

        /// Field delimiter.
        #[arg(long, default_value = ",")]
        delimiter: String,
    },
}

/// Report format for `analyze`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// One line per mode.
    Text,
    /// Markdown tables.
    Markdown,
}

/// Flags shared by the commands that talk to a backend.
///
/// Every flag is optional; unset flags fall back to the settings file,
/// `LOCALITY_*` variables and built-in defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct HarnessArgs {
    /// Settings file (TOML, YAML or JSON).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Target mode: lb or gw.
    #[arg(long)]
    pub mode: Option<String>,

    /// Plain load balancer base URL.
    #[arg(long)]
    pub lb_url: Option<String>,

    /// Inference gateway base URL.
    #[arg(long)]
    pub gw_url: Option<String>,

    /// Prompt corpus: prompt_cold,prompt_warm[,topic].
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Model identifier.
    #[arg(long)]
    pub model: Option<String>,

    /// Per-call timeout in seconds.
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Untimed warmup calls before the cold call.
    #[arg(long)]
    pub warmup: Option<u32>,

    /// Use SSE streaming to capture first-token latency.
    #[arg(long)]
    pub stream: bool,

    /// File whose contents are prepended to both prompts.
    #[arg(long)]
    pub shared_prefix_file: Option<PathBuf>,

    /// Result sink (JSON Lines).
    #[arg(long)]
    pub jsonl: Option<PathBuf>,

    /// Corpus field delimiter.
    #[arg(long)]
    pub delimiter: Option<String>,

    /// Connection policy: auto, fresh or reuse.
    #[arg(long)]
    pub connection: Option<ConnectionChoice>,

    /// Extra request header as NAME:VALUE (repeatable).
    #[arg(long = "header")]
    pub headers: Vec<String>,

    /// Response header that identifies the serving backend instance.
    #[arg(long)]
    pub upstream_header: Option<String>,
}

impl HarnessArgs {
    /// Load layered settings and apply these flags on top.
    pub fn settings(&self) -> anyhow::Result<HarnessSettings> {
        let mut settings = HarnessSettings::load(self.config.as_deref())
            .context("failed to load settings")?;
        self.apply(&mut settings);
        Ok(settings)
    }

    fn apply(&self, settings: &mut HarnessSettings) {
        if let Some(mode) = &self.mode {
            settings.mode = Some(mode.clone());
        }
        if let Some(url) = &self.lb_url {
            settings.lb_url = Some(url.clone());
        }
        if let Some(url) = &self.gw_url {
            settings.gw_url = Some(url.clone());
        }
        if let Some(file) = &self.file {
            settings.corpus = file.clone();
        }
        if let Some(model) = &self.model {
            settings.model = model.clone();
        }
        if let Some(timeout) = self.timeout {
            settings.timeout_secs = timeout;
        }
        if let Some(warmup) = self.warmup {
            settings.warmup = warmup;
        }
        if self.stream {
            settings.stream = true;
        }
        if let Some(path) = &self.shared_prefix_file {
            settings.shared_prefix_file = Some(path.clone());
        }
        if let Some(path) = &self.jsonl {
            settings.sink = path.clone();
        }
        if let Some(delimiter) = &self.delimiter {
            settings.delimiter = delimiter.clone();
        }
        if let Some(connection) = self.connection {
            settings.connection = connection;
        }
        settings.headers.extend(self.headers.iter().cloned());
        if let Some(header) = &self.upstream_header {
            settings.upstream_header = Some(header.clone());
        }
    }
}

/// Run the CLI with the process arguments.
///
/// # Returns
///
/// Returns `Ok(())` on success, or an error if the command fails.
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Run { index, harness } => run_case(&harness, index).await,
        Commands::Sweep {
            start,
            count,
            harness,
        } => run_sweep(&harness, start, count).await,
        Commands::Analyze {
            path,
            format,
            output,
        } => analyze(&path, format, output.as_deref()),
        Commands::Corpus { action } => corpus(action),
        Commands::Config { harness } => {
            let settings = harness.settings()?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}

/// Install the global subscriber. Logs go to stderr.
///
/// `RUST_LOG` takes precedence over `verbose`.
pub fn init_tracing(verbose: u8, json: bool) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    if installed.is_err() {
        eprintln!("warning: tracing subscriber already installed");
    }
}

async fn run_case(harness: &HarnessArgs, index: usize) -> anyhow::Result<()> {
    let settings = harness.settings()?;
    let plan = settings.plan(index)?;
    let prompts = settings.prompt_source()?;
    let executor = HttpChatExecutor::new()?;
    let sink = JsonlSink::new(&settings.sink);

    let sequencer = Sequencer::new(&executor, &sink, settings.sequencer_options(Echo::Pretty));
    sequencer
        .run(&plan, &prompts)
        .await
        .with_context(|| format!("test case {index} ({}) failed", plan.mode))?;
    Ok(())
}

async fn run_sweep(harness: &HarnessArgs, start: usize, count: usize) -> anyhow::Result<()> {
    let settings = harness.settings()?;
    let plan = settings.plan(start)?;
    let prompts = settings.prompt_source()?;
    let executor = HttpChatExecutor::new()?;
    let sink = JsonlSink::new(&settings.sink);

    let sequencer = Sequencer::new(&executor, &sink, settings.sequencer_options(Echo::Compact));
    let report = sequencer.sweep(&plan, &prompts, count).await?;

    println!(
        "Completed {} of {} test cases ({} failed)",
        report.records.len(),
        count,
        report.failed.len()
    );
    println!("Results appended to {}", settings.sink.display());
    if !report.failed.is_empty() {
        warn!(indices = ?report.failed, "failed test cases");
    }
    if count > 0 && report.records.is_empty() {
        bail!("every test case in the sweep failed");
    }
    Ok(())
}

fn analyze(path: &Path, format: ReportFormat, output: Option<&Path>) -> anyhow::Result<()> {
    let (summaries, skipped) =
        analyze_file(path).with_context(|| format!("failed to read {}", path.display()))?;
    if skipped > 0 {
        warn!(skipped, "skipped unparseable result lines");
    }
    if summaries.is_empty() {
        println!("No records found in {}", path.display());
        return Ok(());
    }

    let report = match format {
        ReportFormat::Text => aggregate::render_text(&summaries),
        ReportFormat::Markdown => markdown::generate_summary(&summaries, &path.display().to_string()),
    };

    match output {
        Some(out) => {
            io::write_report(out, &report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!(path = %out.display(), "report written");
            println!("Report written to {}", out.display());
        }
        None => print!("{report}"),
    }
    Ok(())
}

fn corpus(action: CorpusCommand) -> anyhow::Result<()> {
    match action {
        CorpusCommand::Generate {
            out,
            pairs,
            delimiter,
        } => {
            let delimiter = delimiter_arg(&delimiter)?;
            let written = generate_corpus(&out, delimiter, pairs)?;
            println!("Appended {written} prompt pairs to {}", out.display());
            if written < pairs {
                warn!(requested = pairs, written, "ran out of unused topics");
            }
            Ok(())
        }
        CorpusCommand::Check { file, delimiter } => {
            let delimiter = delimiter_arg(&delimiter)?;
            let (total, issues) = check_corpus(&file, delimiter)?;
            for issue in &issues {
                println!("record {}: {}", issue.index, issue.problem);
            }
            if !issues.is_empty() {
                bail!("{} of {total} records are invalid", issues.len());
            }
            println!("{total} records OK");
            Ok(())
        }
    }
}

fn delimiter_arg(value: &str) -> anyhow::Result<u8> {
    match parse_delimiter(value) {
        Some(delimiter) => Ok(delimiter),
        None => bail!("invalid delimiter '{value}': expected a single ASCII character"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use llm_locality_core::{ConnectionPolicy, Mode, TransportMode};

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "locality",
            "-vv",
            "run",
            "--index",
            "3",
            "--mode",
            "gw",
            "--gw-url",
            "http://gateway/",
            "--stream",
            "--warmup",
            "2",
            "--connection",
            "fresh",
            "--header",
            "x-session-affinity: abc",
            "--delimiter",
            "|",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);

        let Commands::Run { index, harness } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(index, 3);

        let mut settings = HarnessSettings::default();
        harness.apply(&mut settings);
        let plan = settings.plan(index).unwrap();
        assert_eq!(plan.mode, Mode::Gw);
        assert_eq!(plan.base_url, "http://gateway");
        assert_eq!(plan.warmup, 2);
        assert_eq!(plan.call.transport, TransportMode::Streaming);
        assert_eq!(plan.call.connection, ConnectionPolicy::ForceFresh);
        assert_eq!(plan.call.extra_headers["x-session-affinity"], "abc");
        assert_eq!(settings.delimiter_byte().unwrap(), b'|');
    }

    #[test]
    fn test_flags_override_settings() {
        let mut settings = HarnessSettings {
            model: "from-file".into(),
            headers: vec!["x-a: 1".into()],
            ..HarnessSettings::default()
        };
        let args = HarnessArgs {
            model: Some("from-flag".into()),
            headers: vec!["x-b: 2".into()],
            jsonl: Some(PathBuf::from("out.jsonl")),
            ..HarnessArgs::default()
        };
        args.apply(&mut settings);

        assert_eq!(settings.model, "from-flag");
        assert_eq!(settings.headers, vec!["x-a: 1", "x-b: 2"]);
        assert_eq!(settings.sink, PathBuf::from("out.jsonl"));
        assert!(!settings.stream);
    }

    #[test]
    fn test_run_requires_index() {
        assert!(Cli::try_parse_from(["locality", "run", "--mode", "lb"]).is_err());
    }

    #[test]
    fn test_parse_analyze_defaults() {
        let cli = Cli::try_parse_from(["locality", "analyze"]).unwrap();
        match cli.command {
            Commands::Analyze {
                path,
                format,
                output,
            } => {
                assert_eq!(path, PathBuf::from("results.jsonl"));
                assert_eq!(format, ReportFormat::Text);
                assert!(output.is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_analyze_writes_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("results.jsonl");
        std::fs::write(
            &results,
            "{\"mode\":\"gw\",\"delta_total_ms\":-40.0,\"delta_first_token_ms\":-12.5}\n\
             {\"target\":\"lb\",\"delta_full_ms\":3.0}\n",
        )
        .unwrap();
        let report = dir.path().join("summary.md");

        analyze(&results, ReportFormat::Markdown, Some(&report)).unwrap();
        let contents = std::fs::read_to_string(&report).unwrap();
        assert!(contents.contains("| gw | 1 | -40.0 |"));
        assert!(contents.contains("| lb | 1 | 3.0 |"));
    }

    #[test]
    fn test_corpus_generate_then_check() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("prompts.txt");

        corpus(CorpusCommand::Generate {
            out: out.clone(),
            pairs: 4,
            delimiter: "|".into(),
        })
        .unwrap();
        corpus(CorpusCommand::Check {
            file: out,
            delimiter: "|".into(),
        })
        .unwrap();
    }

    #[test]
    fn test_invalid_delimiter() {
        assert!(delimiter_arg(",,").is_err());
        assert_eq!(delimiter_arg("|").unwrap(), b'|');
    }
}
