//! p223 CLI - P223 enrollment report extraction tool

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use p223::render::{self, JsonFormat};
use p223::{
    extract_file_for_month, month_from_filename, Batch, BatchEvent, BatchOptions, ExtractOptions,
    GradeRules, LopdfLoader,
};

#[derive(Parser)]
#[command(name = "p223")]
#[command(version)]
#[command(about = "Extract enrollment tables from P223 reports to CSV", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(flatten)]
    batch: BatchArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract every report in a directory (default)
    Batch(BatchArgs),

    /// Extract a single report
    Extract {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "csv")]
        format: OutputFormat,

        /// Reporting month (YYYY-MM); taken from the file name if not specified
        #[arg(long)]
        month: Option<String>,

        #[command(flatten)]
        extract: ExtractArgs,
    },

    /// Show the reporting month of report files
    Month {
        /// Report files named P223_<Mon><YY>.pdf
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },

    /// List the grade correction rules
    Rules {
        /// Additional rules (JSON)
        #[arg(long, value_name = "FILE")]
        rules: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}

#[derive(Args, Clone)]
struct BatchArgs {
    /// Directory holding the report PDFs
    #[arg(short, long, value_name = "DIR", env = "P223_INPUT", default_value = "input")]
    input: PathBuf,

    /// Directory for the per-month CSVs
    #[arg(
        short,
        long,
        value_name = "DIR",
        env = "P223_OUTPUT",
        default_value = "output/p223/month"
    )]
    output: PathBuf,

    /// Path of the combined CSV
    #[arg(
        long,
        value_name = "FILE",
        env = "P223_MASTER",
        default_value = "output/p223/all.csv"
    )]
    master: PathBuf,

    /// Number of worker threads
    #[arg(short, long, env = "P223_WORKERS", default_value = "8")]
    workers: usize,

    /// Reuse month CSVs written by an earlier run
    #[arg(long)]
    skip_existing: bool,

    /// Give up on documents when no worker reports for this many seconds
    #[arg(long, value_name = "SECS")]
    stall_timeout: Option<u64>,

    #[command(flatten)]
    extract: ExtractArgs,
}

#[derive(Args, Clone)]
struct ExtractArgs {
    /// Additional grade rules (JSON)
    #[arg(long, value_name = "FILE")]
    rules: Option<PathBuf>,

    /// Tolerance when reconciling totals
    #[arg(long, default_value = "0.1")]
    tolerance: f64,

    /// Student count from which unrecognized grades are reported
    #[arg(long, default_value = "10")]
    materiality: f64,

    /// Process the pages of a report one at a time
    #[arg(long)]
    sequential: bool,
}

impl ExtractArgs {
    fn to_options(&self) -> Result<ExtractOptions, Box<dyn std::error::Error>> {
        let rules = match &self.rules {
            Some(path) => GradeRules::load(path)?,
            None => GradeRules::builtin(),
        };
        Ok(ExtractOptions::new()
            .with_tolerance(self.tolerance)
            .with_materiality_threshold(self.materiality)
            .with_parallel(!self.sequential)
            .with_grade_rules(rules))
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Month CSV
    Csv,
    /// Rows and diagnostics as JSON
    Json,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Batch(args)) => cmd_batch(&args),
        Some(Commands::Extract {
            input,
            output,
            format,
            month,
            extract,
        }) => cmd_extract(&input, output.as_deref(), format, month, &extract),
        Some(Commands::Month { files }) => cmd_month(&files),
        Some(Commands::Rules { rules, json }) => cmd_rules(rules.as_deref(), json),
        Some(Commands::Version) => {
            cmd_version();
            Ok(())
        }
        None => cmd_batch(&cli.batch),
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn cmd_batch(args: &BatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let options = BatchOptions::new()
        .with_input_dir(&args.input)
        .with_output_dir(&args.output)
        .with_master_path(&args.master)
        .with_workers(args.workers)
        .with_skip_existing(args.skip_existing)
        .with_stall_timeout(args.stall_timeout.map(Duration::from_secs))
        .with_extract_options(args.extract.to_options()?);

    let batch = Batch::plan(options)?;
    if batch.tasks().is_empty() {
        println!(
            "{} {}",
            "No reports found in".yellow(),
            args.input.display()
        );
        return Ok(());
    }

    let pb = ProgressBar::new(batch.total_steps() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut on_event = |event: &BatchEvent, completed: usize, _total: usize| {
        pb.set_position(completed as u64);
        match event {
            BatchEvent::Failed { .. } => pb.println(format!("{} {}", "✗".red(), event)),
            BatchEvent::Extracted { diagnostics, .. } if *diagnostics > 0 => {
                pb.println(format!("{} {}", "!".yellow(), event))
            }
            BatchEvent::Started { .. } => {}
            _ => pb.set_message(event.to_string()),
        }
    };
    let summary = batch.run(Arc::new(LopdfLoader), &mut on_event)?;
    pb.finish_with_message("Done!");

    println!();
    println!("{}", "Summary".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("{}: {}", "Documents".bold(), summary.documents);
    println!("{}: {}", "Extracted".bold(), summary.extracted);
    println!("{}: {}", "Reused".bold(), summary.reused);
    println!("{}: {}", "Warnings".bold(), summary.diagnostics);
    if !summary.failed.is_empty() {
        println!("{}: {}", "Failed".red().bold(), summary.failed.len());
        for (pdf, error) in &summary.failed {
            println!("  {} {}: {}", "├─".dimmed(), pdf.display(), error);
        }
    }
    match summary.master_rows {
        Some(rows) => println!(
            "{} {} ({} rows)",
            "Saved to".green(),
            args.master.display(),
            rows
        ),
        None => println!("{}", "No master CSV written".yellow()),
    }

    Ok(())
}

fn cmd_extract(
    input: &Path,
    output: Option<&Path>,
    format: OutputFormat,
    month: Option<String>,
    extract: &ExtractArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let month = match month {
        Some(month) => month,
        None => month_from_filename(input)?,
    };
    let extraction = extract_file_for_month(input, &month, &extract.to_options()?)?;

    let content = match format {
        OutputFormat::Csv => render::to_csv_string(&extraction.table.rows)?,
        OutputFormat::Json => render::to_json(&extraction, JsonFormat::Pretty)?,
    };

    if let Some(path) = output {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &content)?;
        println!(
            "{} {} ({} rows, {} warnings)",
            "Saved to".green(),
            path.display(),
            extraction.table.row_count(),
            extraction.diagnostics.len()
        );
    } else {
        print!("{}", content);
    }

    Ok(())
}

fn cmd_month(files: &[PathBuf]) -> Result<(), Box<dyn std::error::Error>> {
    for file in files {
        let month = month_from_filename(file)?;
        println!("{} {}", file.display(), month.green());
    }
    Ok(())
}

fn cmd_rules(extra: Option<&Path>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let rules = match extra {
        Some(path) => GradeRules::load(path)?,
        None => GradeRules::builtin(),
    };

    if json {
        println!("{}", render::to_json(&rules, JsonFormat::Pretty)?);
        return Ok(());
    }

    println!("{}", "Grade Rules".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    for rule in rules.iter() {
        let scope = if rule.schools.is_empty() {
            "any school".dimmed().to_string()
        } else {
            rule.schools.join(", ")
        };
        let months = if rule.months.is_empty() {
            String::new()
        } else {
            format!(" [{}]", rule.months.join(", "))
        };
        println!(
            "{:<24} {} {} {}{}",
            format!("{:?}", rule.raw),
            "→".dimmed(),
            format!("{:<10}", rule.grade).bold(),
            scope,
            months
        );
    }
    println!("\n{} rules", rules.len());

    Ok(())
}

fn cmd_version() {
    println!("{} {}", "p223".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("P223 enrollment report extraction tool");
}
