mod bytecode;
mod chain;
mod config;
mod error;
mod ir;
mod opcodes;
mod operations;
mod report;
mod scan;
mod sequence;
mod table;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{AnalysisConfig, OperationKind};
use crate::operations::{build_operation, run_operation};
use crate::report::OutputFormat;
use crate::scan::scan_inputs;
use crate::sequence::SequenceKey;
use crate::table::SortOrder;

/// CLI arguments for opchain execution.
#[derive(Parser, Debug)]
#[command(
    name = "opchain",
    about = "Opcode chain statistics and sequence search for JVM class files and JAR files.",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// JAR file, class file or directory to analyze.
    #[arg(long, value_name = "PATH", global = true)]
    input: Vec<PathBuf>,
    /// Maximum number of report rows, 0 for all.
    #[arg(long, value_name = "N", default_value_t = 0, global = true)]
    limit: usize,
    /// Skip methods whose bytecode is shorter than this many bytes.
    #[arg(long, value_name = "BYTES", default_value_t = 0, global = true)]
    min_method_size: u32,
    #[arg(long, value_name = "PATH", global = true)]
    output: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv, global = true)]
    format: OutputFormat,
    #[arg(long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[arg(long, global = true)]
    timing: bool,
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count occurrences of each opcode.
    Histogram,
    /// Count opcode chains of a fixed length along control flow.
    Chains {
        #[arg(long, value_name = "N", default_value_t = 2)]
        length: usize,
        #[arg(long, value_enum, default_value_t = SortOrder::Count)]
        sort: SortOrder,
    },
    /// List the most frequent successors of each opcode.
    Next {
        /// Append the root total and the share of each successor.
        #[arg(long)]
        percent: bool,
    },
    /// Find methods containing an exact opcode sequence.
    Search {
        /// Comma separated mnemonics, e.g. `aload,getfield`.
        #[arg(long, value_name = "OPCODES")]
        pattern: String,
    },
    /// Count allocation sites by allocated type.
    Allocations,
    /// Count invocation sites by invoked method.
    Invocations,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);
    run(cli)
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = analysis_config(&cli)?;
    if cli.input.is_empty() {
        anyhow::bail!("at least one --input is required");
    }
    for entry in &cli.input {
        if !entry.exists() {
            anyhow::bail!("input not found: {}", entry.display());
        }
    }
    let mut operation = build_operation(&config)?;

    let started_at = Instant::now();
    let scan = scan_inputs(&cli.input)?;
    let scan_duration = started_at.elapsed();

    let analysis_started_at = Instant::now();
    let summary = run_operation(operation.as_mut(), &scan.classes, config.min_method_size);
    let report = operation.report(config.result_limit);
    let analysis_duration = analysis_started_at.elapsed();
    if let Some(stats) = operation.walk_stats() {
        info!(?stats, "chain walk finished");
    }

    let rendered = report.render(cli.format)?;
    let mut writer = output_writer(cli.output.as_deref())?;
    writer
        .write_all(rendered.as_bytes())
        .context("failed to write report")?;
    writer.flush().context("failed to flush report")?;

    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} scan_ms={} analysis_ms={} classes={} skipped_classes={} \
             methods={} processed_methods={} small_methods={} failed_methods={} rows={}",
            started_at.elapsed().as_millis(),
            scan_duration.as_millis(),
            analysis_duration.as_millis(),
            scan.class_count,
            scan.skipped_classes,
            scan.method_count(),
            summary.processed_methods,
            summary.small_methods,
            summary.failed_methods,
            report.rows.len()
        );
    }

    Ok(())
}

fn analysis_config(cli: &Cli) -> Result<AnalysisConfig> {
    let mut config = match &cli.command {
        Command::Histogram => AnalysisConfig::new(OperationKind::Histogram),
        Command::Chains { length, sort } => AnalysisConfig {
            chain_length: *length,
            sort: *sort,
            ..AnalysisConfig::new(OperationKind::Chains)
        },
        Command::Next { percent } => AnalysisConfig {
            percentages: *percent,
            ..AnalysisConfig::new(OperationKind::Next)
        },
        Command::Search { pattern } => {
            let wanted = SequenceKey::parse(pattern)
                .with_context(|| format!("invalid search pattern '{pattern}'"))?;
            AnalysisConfig {
                wanted_sequence: Some(wanted),
                ..AnalysisConfig::new(OperationKind::Search)
            }
        }
        Command::Allocations => AnalysisConfig::new(OperationKind::Allocations),
        Command::Invocations => AnalysisConfig::new(OperationKind::Invocations),
    };
    config.result_limit = cli.limit;
    config.min_method_size = cli.min_method_size;
    config.validate().context("invalid arguments")?;
    Ok(config)
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use crate::opcodes::Opcode;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("opchain").chain(args.iter().copied()))
            .expect("parse arguments")
    }

    #[test]
    fn chains_arguments_become_config() {
        let cli = parse(&[
            "chains",
            "--length",
            "3",
            "--sort",
            "key",
            "--input",
            "app.jar",
            "--limit",
            "10",
        ]);

        let config = analysis_config(&cli).expect("config");

        assert_eq!(OperationKind::Chains, config.operation);
        assert_eq!(3, config.chain_length);
        assert_eq!(SortOrder::Key, config.sort);
        assert_eq!(10, config.result_limit);
        assert_eq!(OutputFormat::Csv, cli.format);
    }

    #[test]
    fn search_pattern_is_parsed_before_scanning() {
        let cli = parse(&["search", "--pattern", "aload,getfield", "--input", "a.jar"]);
        let config = analysis_config(&cli).expect("config");
        assert_eq!(
            Some(SequenceKey::new(&[Opcode::ALOAD, Opcode::GETFIELD])),
            config.wanted_sequence
        );

        let cli = parse(&["search", "--pattern", "aload,nope", "--input", "a.jar"]);
        let err = analysis_config(&cli).expect_err("unknown mnemonic");
        assert_eq!(
            Some(&AnalysisError::UnknownMnemonic("nope".to_string())),
            err.downcast_ref::<AnalysisError>()
        );
    }

    #[test]
    fn zero_chain_length_is_a_usage_error() {
        let cli = parse(&["chains", "--length", "0", "--input", "a.jar"]);

        assert!(analysis_config(&cli).is_err());
    }

    #[test]
    fn input_is_required() {
        let cli = parse(&["histogram"]);

        let err = run(cli).expect_err("missing input");
        assert!(err.to_string().contains("--input"));
    }

    #[test]
    fn run_fails_for_missing_input() {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let missing = temp_dir.path().join("missing.jar");
        let cli = parse(&["histogram", "--input", missing.to_str().expect("utf-8 path")]);

        assert!(run(cli).is_err());
    }

    #[test]
    fn run_writes_json_report_for_empty_directory() {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let output = temp_dir.path().join("report.json");
        let input = temp_dir.path().join("classes");
        std::fs::create_dir_all(&input).expect("create input dir");
        let cli = parse(&[
            "invocations",
            "--input",
            input.to_str().expect("utf-8 path"),
            "--format",
            "json",
            "--output",
            output.to_str().expect("utf-8 path"),
        ]);

        run(cli).expect("run analysis");

        let text = std::fs::read_to_string(&output).expect("read report");
        let value: serde_json::Value = serde_json::from_str(&text).expect("parse json");
        assert_eq!(value["title"], "invocations");
        assert!(value["rows"].as_array().expect("rows array").is_empty());
    }
}
