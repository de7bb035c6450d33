use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use lineage_core::{ChangeType, LineageConfig, LogContext, Snippet, NO_PROMPT};
use lineage_difflens::{compare_snippets, ComparisonResult, LineBreakdown};
use lineage_graph::{evolve, Evolution, LineageReport, SkippedComparison};

#[derive(Parser)]
#[command(
    name = "lineage",
    version,
    about = "Line-level evolution tracking for rewritten code snippets",
    long_about = "Lineage aligns two versions of a snippet line by line, classifies how each\n\
                   aligned pair changed, and folds successive rewrites into evolution graphs.\n\n\
                   Examples:\n  \
                     lineage compare Old.java New.java --details   Annotated line diff\n  \
                     lineage evolve snippets/*.java                Per-lineage evolution summary\n  \
                     lineage init                                  Write a default .lineage.toml"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .lineage.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Log matching decisions (same as LINEAGE_LOG=debug)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Align and classify the lines of two snippet versions
    #[command(long_about = "Align and classify the lines of two snippet versions.\n\n\
        File names of the form <Name>_<Variant>_v<N>[_<prompt>].java supply the snippet\n\
        labels; the flags below override them.\n\n\
        Examples:\n  lineage compare Search_KF0_v0.java Search_KF0_v1_p1.java\n  lineage compare old.java new.java --details --format json")]
    Compare {
        /// Older version
        old: PathBuf,
        /// Newer version
        new: PathBuf,
        /// Snippet group name for both files
        #[arg(long)]
        name: Option<String>,
        /// Variant label for both files
        #[arg(long)]
        variant: Option<String>,
        /// Version of the older file (default: 0)
        #[arg(long)]
        old_version: Option<u32>,
        /// Version of the newer file (default: 1)
        #[arg(long)]
        new_version: Option<u32>,
        /// Name the counterpart, score and change type of every modification
        #[arg(long)]
        details: bool,
    },
    /// Compare every pair of a snippet set and summarize each lineage
    #[command(long_about = "Compare every pair of a snippet set and summarize each lineage.\n\n\
        Every file must be named <Name>_<Variant>_v<N>[_<prompt>].java. Pairs run in\n\
        parallel; ineligible pairs are reported as skipped.\n\n\
        Examples:\n  lineage evolve snippets/*.java\n  lineage evolve snippets/*.java --format json")]
    Evolve {
        /// Snippet files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Create a .lineage.toml configuration file
    #[command(long_about = "Create a .lineage.toml configuration file.\n\n\
        Writes every option with its default value. Fails if .lineage.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable summaries
    Text,
    /// Machine-readable JSON with camelCase keys
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => f.write_str("text"),
            OutputFormat::Json => f.write_str("json"),
        }
    }
}

const DEFAULT_CONFIG: &str = r#"# Lineage Configuration

[matcher]
# Minimum combined score for two lines to be paired
similarity_threshold = 0.6
# Lines that are never paired
skip_lines = ["", "{", "}"]
# Modifier keywords dropped before comparing code tokens
stopwords = ["private", "protected", "public", "final", "static", "abstract",
             "transient", "volatile", "synchronized"]

# Removed line is a whole-line comment
[matcher.weights.comment_only]
sequence = 0.5
tokens = 0.5

# Either line has no parsable structure
[matcher.weights.text_only]
sequence = 0.4
tokens = 0.5
comment = 0.1

[matcher.weights.structural]
sequence = 0.2
tokens = 0.25
structure = 0.5
comment = 0.05

[graph]
# Build evolution graphs from direct-successor comparisons
enabled = true
"#;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EvolveOutput {
    lineages: Vec<LineageReport>,
    skipped: Vec<SkippedComparison>,
    change_types: BTreeMap<ChangeType, usize>,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => LineageConfig::from_file(path)
            .wrap_err_with(|| format!("loading {}", path.display()))?,
        None => {
            let default_path = Path::new(".lineage.toml");
            if default_path.exists() {
                LineageConfig::from_file(default_path)?
            } else {
                LineageConfig::default()
            }
        }
    };
    tracing::debug!(format = %cli.format, threshold = config.matcher.similarity_threshold, "configuration loaded");

    match cli.command {
        None => {
            Cli::command().print_help().into_diagnostic()?;
        }
        Some(Command::Compare {
            ref old,
            ref new,
            ref name,
            ref variant,
            old_version,
            new_version,
            details,
        }) => {
            let labels = Labels {
                name: name.as_deref(),
                variant: variant.as_deref(),
            };
            let old = load_snippet(old, &labels, old_version, 0)?;
            let new = load_snippet(new, &labels, new_version, 1)?;

            let ctx = LogContext::new("compare");
            let result = compare_snippets(&old, &new, &config, &ctx)?;
            ctx.close();

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
                }
                OutputFormat::Text => print_comparison(&result, details),
            }
        }
        Some(Command::Evolve { ref files }) => {
            let snippets = files
                .iter()
                .map(|path| Snippet::from_path(path))
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let ctx = LogContext::new("evolve");
            let evolution = evolve(&snippets, &config, &ctx);
            ctx.close();

            match cli.format {
                OutputFormat::Json => {
                    let output = EvolveOutput {
                        lineages: evolution.reports(),
                        skipped: evolution.skipped.clone(),
                        change_types: evolution.change_types(),
                    };
                    println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
                }
                OutputFormat::Text => print_evolution(&evolution),
            }
        }
        Some(Command::Init) => {
            let path = Path::new(".lineage.toml");
            if path.exists() {
                miette::bail!(".lineage.toml already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created .lineage.toml with default configuration");
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "lineage", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("LINEAGE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

struct Labels<'a> {
    name: Option<&'a str>,
    variant: Option<&'a str>,
}

/// Read a snippet, labeling it from its file name when possible.
fn load_snippet(
    path: &Path,
    labels: &Labels<'_>,
    version: Option<u32>,
    default_version: u32,
) -> Result<Snippet> {
    let mut snippet = match Snippet::from_path(path) {
        Ok(snippet) => snippet,
        Err(lineage_core::LineageError::InvalidSnippetName(_)) => {
            let code = std::fs::read_to_string(path)
                .into_diagnostic()
                .wrap_err_with(|| format!("reading {}", path.display()))?;
            Snippet::new("snippet", "default", default_version, NO_PROMPT, code)
        }
        Err(e) => return Err(e.into()),
    };
    if let Some(name) = labels.name {
        snippet.name = name.to_string();
    }
    if let Some(variant) = labels.variant {
        snippet.variant = variant.to_string();
    }
    if let Some(version) = version {
        snippet.version = version;
    }
    Ok(snippet)
}

fn print_comparison(result: &ComparisonResult, details: bool) {
    let m = &result.metrics;
    println!("{} -> {}", result.old, result.new);
    println!(
        "  modifications: {}  unchanged: {}  avg similarity: {:.2}",
        m.modifications, m.unchanged, m.avg_similarity
    );
    println!("  insertions: {}", breakdown(&m.insertions));
    println!("  deletions:  {}", breakdown(&m.deletions));
    if !m.change_types.is_empty() {
        let changes: Vec<String> = m
            .change_types
            .iter()
            .map(|(change, count)| format!("{change} {count}"))
            .collect();
        println!("  changes: {}", changes.join(", "));
    }
    if !result.mismatches.is_empty() {
        println!("  accounting mismatches: {}", result.mismatches.len());
    }
    println!();
    for line in result.annotated_diff(details) {
        println!("{line}");
    }
}

fn breakdown(b: &LineBreakdown) -> String {
    format!(
        "{} (code {}, comment {}, empty {})",
        b.total, b.code, b.comment, b.empty
    )
}

fn print_evolution(evolution: &Evolution) {
    for report in evolution.reports() {
        let s = &report.summary;
        println!("{}", report.lineage);
        println!(
            "  lines: {}  edges: {}  originals: {}  unchanged: {}",
            s.lines, s.edges, s.originals, s.unchanged_originals
        );
        for line in &report.lines {
            println!("  {:>3}  {}", line.change_count, line.line);
        }
        println!();
    }

    println!(
        "{} comparisons, {} skipped",
        evolution.results.len(),
        evolution.skipped.len()
    );
    for (change, count) in evolution.change_types() {
        println!("  {change:<24}{count}");
    }
}
