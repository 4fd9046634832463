use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use gradebook::models::{Grade, GradeField, NumericField, Record};
use gradebook::repository::{FilterSpec, SortKey};
use gradebook::stats::Focus;
use gradebook::{report, stats, Config, Session};

#[derive(Parser)]
#[command(name = "gradebook")]
#[command(about = "Grade student rosters from academic, co-curricular and discipline scores", long_about = None)]
struct Cli {
    /// Path to a TOML config file (defaults to $GRADEBOOK_CONFIG, then config/gradebook.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a roster, grade it and export the graded records
    Grade {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
    },
    /// Filter and sort graded records
    Query {
        #[arg(long)]
        input: PathBuf,
        /// Lower bound on a score field, e.g. academic_score=60
        #[arg(long, value_name = "FIELD=VALUE")]
        min: Vec<String>,
        /// Upper bound on a score field, e.g. composite_score=90
        #[arg(long, value_name = "FIELD=VALUE")]
        max: Vec<String>,
        /// Allowed grades for a grade field, e.g. composite_grade=A+,A
        #[arg(long, value_name = "FIELD=GRADES")]
        grade: Vec<String>,
        /// Exact match on an extra column, e.g. section=B
        #[arg(long, value_name = "KEY=VALUE")]
        attr: Vec<String>,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        desc: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print summary statistics
    Stats {
        #[arg(long)]
        input: PathBuf,
    },
    /// Show one student against the class, with recommendations
    Profile {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        id: String,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gradebook=info,warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .compact()
        .init();
}

fn split_pair(raw: &str) -> anyhow::Result<(&str, &str)> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim(), value.trim()))
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got {raw:?}"))
}

fn build_filter(
    min: &[String],
    max: &[String],
    grade: &[String],
    attr: &[String],
) -> anyhow::Result<FilterSpec> {
    let mut spec = FilterSpec::new();
    for raw in min {
        let (field, value) = split_pair(raw)?;
        let field: NumericField = field.parse().map_err(|e: String| anyhow!(e))?;
        let value: f64 = value.parse().with_context(|| format!("bad number in {raw:?}"))?;
        spec = spec.range(field, Some(value), None);
    }
    for raw in max {
        let (field, value) = split_pair(raw)?;
        let field: NumericField = field.parse().map_err(|e: String| anyhow!(e))?;
        let value: f64 = value.parse().with_context(|| format!("bad number in {raw:?}"))?;
        spec = spec.range(field, None, Some(value));
    }
    for raw in grade {
        let (field, grades) = split_pair(raw)?;
        let field: GradeField = field.parse().map_err(|e: String| anyhow!(e))?;
        let grades = grades
            .split(',')
            .map(str::parse::<Grade>)
            .collect::<Result<Vec<_>, _>>()?;
        spec = spec.grades(field, grades);
    }
    for raw in attr {
        let (key, value) = split_pair(raw)?;
        spec = spec.attribute(key, value);
    }
    Ok(spec)
}

fn load_session(config: &Config, input: &Path) -> anyhow::Result<Session> {
    let mut session = Session::new(config).context("invalid grading configuration")?;
    session
        .load_path(input)
        .map_err(|err| anyhow!("{}: {err}", err.kind()))
        .with_context(|| format!("failed to load {}", input.display()))?;
    Ok(session)
}

fn print_record(record: &Record) {
    match record.grading() {
        Some(grading) => println!(
            "- {} ({}) academic {:.2}, co-curricular {:.2}, discipline {:.2}, composite {:.2} [{}]",
            record.name(),
            record.id(),
            record.academic(),
            record.cocurricular(),
            record.discipline(),
            grading.composite_score,
            grading.composite_grade
        ),
        None => println!("- {} ({}) not graded", record.name(), record.id()),
    }
}

fn print_profile(profile: &stats::Profile<'_>) {
    print_record(profile.record);
    if let Some(top) = profile.top_student {
        println!("Top student: {} ({})", top.name(), top.id());
    }
    println!("Compared with the class:");
    for comparison in &profile.comparisons {
        println!(
            "- {}: {:.2} (class average {:.2}, top student {}, percentile {:.1}%)",
            comparison.field.column(),
            comparison.student,
            comparison.class_average,
            comparison
                .top_student
                .map(|score| format!("{score:.2}"))
                .unwrap_or_else(|| "n/a".to_string()),
            comparison.percentile
        );
    }
    println!("Recommendations:");
    for (metric, standing) in &profile.recommendations.standings {
        println!("- {metric}: {}", standing.advice(*metric));
    }
    match profile.recommendations.focus {
        Focus::Gap {
            strongest,
            weakest,
            gap,
        } => println!(
            "Gap of {gap:.1} points between {strongest} and {weakest}; plan focused work on {weakest} while keeping {strongest} strong."
        ),
        Focus::Balanced => println!("Balanced profile; build on it across all three areas."),
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::resolve(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Commands::Grade { input, out, format } => {
            let session = load_session(&config, &input)?;
            let writer: Box<dyn Write> = match &out {
                Some(path) => Box::new(BufWriter::new(
                    File::create(path)
                        .with_context(|| format!("failed to create {}", path.display()))?,
                )),
                None => Box::new(io::stdout().lock()),
            };
            match format {
                ExportFormat::Csv => session.export_csv(writer)?,
                ExportFormat::Json => session.export_json(writer)?,
            }
            if let Some(path) = out {
                eprintln!(
                    "Graded {} students into {}.",
                    session.records().len(),
                    path.display()
                );
            }
        }
        Commands::Query {
            input,
            min,
            max,
            grade,
            attr,
            sort,
            desc,
            limit,
        } => {
            let session = load_session(&config, &input)?;
            let spec = build_filter(&min, &max, &grade, &attr)?;
            let key = sort.as_deref().map(str::parse::<SortKey>).transpose()?;
            let matched = session.repository().query(&spec, key.as_ref(), !desc);

            if matched.is_empty() {
                println!("No students match these filters.");
                return Ok(());
            }

            println!("{} matching students:", matched.len());
            for record in matched.iter().take(limit.unwrap_or(usize::MAX)) {
                print_record(record);
            }
        }
        Commands::Stats { input } => {
            let session = load_session(&config, &input)?;
            let records = session.records();
            println!("Students: {}", records.len());
            for (field, summary) in stats::summarize(records) {
                println!(
                    "- {}: mean {:.2}, median {:.2}, min {:.2}, max {:.2}",
                    field.column(),
                    summary.mean,
                    summary.median,
                    summary.min,
                    summary.max
                );
            }
            println!("Composite grades:");
            for (grade, count) in stats::grade_distribution(
                records,
                GradeField::Composite,
                session.calculator().scale(),
            ) {
                println!("- {grade}: {count}");
            }
            println!("Average composite by grade:");
            for (grade, average) in
                stats::average_score_by_grade(records, session.calculator().scale())
            {
                println!("- {grade}: {average:.2}");
            }
        }
        Commands::Profile { input, id } => {
            let session = load_session(&config, &input)?;
            let profile = stats::profile(session.records(), &id)
                .ok_or_else(|| anyhow!("no student with id {id:?} in {}", input.display()))?;
            print_profile(&profile);
        }
        Commands::Report { input, out } => {
            let session = load_session(&config, &input)?;
            let report = report::build_report(
                &input.display().to_string(),
                session.records(),
                session.calculator().scale(),
                session.improvement_grades(),
                chrono::Utc::now(),
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
