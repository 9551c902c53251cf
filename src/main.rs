use admission_pipeline::aliases::Aliases;
use admission_pipeline::analyzer::{Dimension, Metric, PublishedDataset};
use admission_pipeline::ingest::CsvIngestor;
use admission_pipeline::logging::{self, LogConfig};
use admission_pipeline::models::{Config, DataSourceMode, RawDataset};
use admission_pipeline::normalizer::Normalizer;
use admission_pipeline::{pipeline, report};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const ALL_RANKINGS: [(Metric, Dimension); 4] = [
    (Metric::Competitiveness, Dimension::School),
    (Metric::Competitiveness, Dimension::Program),
    (Metric::Popularity, Dimension::School),
    (Metric::Popularity, Dimension::Program),
];

fn cli() -> Command {
    let input = || {
        Arg::new("input")
            .short('i')
            .long("input")
            .value_name("FILE")
            .value_parser(clap::value_parser!(PathBuf))
    };
    let output = || {
        Arg::new("output")
            .short('o')
            .long("output")
            .value_name("FILE")
            .value_parser(clap::value_parser!(PathBuf))
    };

    Command::new("admission-pipeline")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Normalizes self-reported admission results and ranks schools and programs")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("pipeline.toml")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("More log output (-v debug, -vv trace)")
                .global(true),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Only log warnings and errors")
                .global(true),
        )
        .subcommand(Command::new("init").about("Write the default configuration file"))
        .subcommand(
            Command::new("ingest")
                .about("Stage 1: parse a CSV export into raw JSON records")
                .arg(input().help("CSV file (defaults to the configured source)"))
                .arg(
                    Arg::new("url")
                        .long("url")
                        .value_name("URL")
                        .help("Fetch the CSV export over HTTP instead")
                        .conflicts_with("input"),
                )
                .arg(output().help("Raw JSON output [default: <output_directory>/raw.json]")),
        )
        .subcommand(
            Command::new("normalize")
                .about("Stage 2: canonicalize schools, programs, status, type and average")
                .arg(input().required(true))
                .arg(output().required(true)),
        )
        .subcommand(
            Command::new("clean-averages")
                .about("Stage 3: force every Average to a number or null (backs up the input)")
                .arg(input().required(true))
                .arg(output().help("Output file [default: overwrite the input]")),
        )
        .subcommand(
            Command::new("project")
                .about("Stage 4: narrow records to the published schema")
                .arg(input().required(true))
                .arg(output().required(true)),
        )
        .subcommand(
            Command::new("rank")
                .about("Stage 5: rank schools or programs from a published dataset")
                .arg(input().required(true))
                .arg(
                    Arg::new("metric")
                        .short('m')
                        .long("metric")
                        .value_parser(["competitiveness", "popularity"])
                        .default_value("competitiveness"),
                )
                .arg(
                    Arg::new("by")
                        .short('b')
                        .long("by")
                        .value_parser(["school", "program"])
                        .default_value("school"),
                )
                .arg(
                    Arg::new("min-records")
                        .long("min-records")
                        .value_name("N")
                        .value_parser(clap::value_parser!(usize))
                        .help("Minimum records per group [default: ranking.min_records]"),
                )
                .arg(
                    Arg::new("dashboard")
                        .long("dashboard")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("min-records")
                        .help("Use the dashboard thresholds instead of ranking.min_records"),
                )
                .arg(
                    Arg::new("csv")
                        .long("csv")
                        .value_name("FILE")
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("Also write the ranking as CSV"),
                ),
        )
        .subcommand(Command::new("run").about("Run every stage using the configured paths"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let verbosity = matches.get_count("verbose");
    let quiet = matches.get_flag("quiet");
    logging::init_logging(&LogConfig::from_verbosity(verbosity, quiet));

    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("pipeline.toml");

    if let Some(("init", _)) = matches.subcommand() {
        return init_config(config_file);
    }
    let config = load_config(config_file)?;

    match matches.subcommand() {
        Some(("ingest", args)) => {
            let output = path_arg(args, "output")
                .unwrap_or_else(|| Path::new(config.output_dir()).join("raw.json"));
            let ingestor = CsvIngestor::new(config.skip_title_rows);
            let dataset = match (path_arg(args, "input"), args.get_one::<String>("url")) {
                (Some(input), _) => pipeline::ingest_file(&ingestor, &input, &output)?,
                (None, Some(url)) => pipeline::ingest_url(&ingestor, url, &output).await?,
                (None, None) => ingest_from_config(&config, &ingestor, &output).await?,
            };
            println!("Ingested {} records into {}", dataset.data.len(), output.display());
        }
        Some(("normalize", args)) => {
            let normalizer = build_normalizer(&config)?;
            let output = required_path(args, "output")?;
            let (dataset, _) =
                pipeline::normalize_file(&normalizer, &required_path(args, "input")?, &output)?;
            println!("Normalized {} records into {}", dataset.data.len(), output.display());
        }
        Some(("clean-averages", args)) => {
            let input = required_path(args, "input")?;
            let output = path_arg(args, "output").unwrap_or_else(|| input.clone());
            let stats = pipeline::clean_averages_file(&input, &output)?;
            println!(
                "Cleaned {} averages: {} converted, {} already numeric, {} empty, {} invalid, {} missing",
                stats.total,
                stats.converted,
                stats.already_numeric,
                stats.empty_string,
                stats.invalid,
                stats.null_undefined
            );
        }
        Some(("project", args)) => {
            let output = required_path(args, "output")?;
            let published = pipeline::project_file(&required_path(args, "input")?, &output)?;
            println!("Published {} records into {}", published.data.len(), output.display());
        }
        Some(("rank", args)) => rank(&config, args)?,
        Some(("run", _)) => run_all(&config).await?,
        _ => unreachable!("subcommand_required"),
    }

    Ok(())
}

fn init_config(config_file: &str) -> Result<()> {
    if Path::new(config_file).exists() {
        bail!("{} already exists, not overwriting it", config_file);
    }
    Config::default().save_to_file(config_file)?;
    println!("Wrote default configuration to {}", config_file);
    Ok(())
}

fn load_config(config_file: &str) -> Result<Config> {
    if Path::new(config_file).exists() {
        info!(path = config_file, "loading configuration");
        Config::load_from_file(config_file)
    } else {
        info!(path = config_file, "no configuration file, using defaults");
        Ok(Config::default())
    }
}

fn build_normalizer(config: &Config) -> Result<Normalizer> {
    let aliases = Aliases::load(config.aliases_file.as_deref().map(Path::new))?;
    Ok(Normalizer::new(
        aliases,
        config.columns.clone(),
        &config.normalization,
    ))
}

fn path_arg(args: &ArgMatches, name: &str) -> Option<PathBuf> {
    args.get_one::<PathBuf>(name).cloned()
}

fn required_path(args: &ArgMatches, name: &str) -> Result<PathBuf> {
    path_arg(args, name).ok_or_else(|| anyhow!("--{} is required", name))
}

async fn ingest_from_config(
    config: &Config,
    ingestor: &CsvIngestor,
    output: &Path,
) -> Result<RawDataset> {
    let dataset = match config.data_source_mode {
        DataSourceMode::Local => {
            let input = config
                .input_csv
                .as_deref()
                .context("input_csv is not set in the configuration")?;
            pipeline::ingest_file(ingestor, Path::new(input), output)?
        }
        DataSourceMode::Internet => {
            let url = config
                .input_url
                .as_deref()
                .context("input_url is not set in the configuration")?;
            pipeline::ingest_url(ingestor, url, output).await?
        }
    };
    Ok(dataset)
}

fn rank(config: &Config, args: &ArgMatches) -> Result<()> {
    let input = required_path(args, "input")?;
    let metric: Metric = args
        .get_one::<String>("metric")
        .map(String::as_str)
        .unwrap_or("competitiveness")
        .parse()
        .map_err(|e: String| anyhow!(e))?;
    let dimension: Dimension = args
        .get_one::<String>("by")
        .map(String::as_str)
        .unwrap_or("school")
        .parse()
        .map_err(|e: String| anyhow!(e))?;

    let min_records = match args.get_one::<usize>("min-records") {
        Some(&n) => n,
        None if args.get_flag("dashboard") => match dimension {
            Dimension::School => config.ranking.dashboard_school_min,
            Dimension::Program => config.ranking.dashboard_program_min,
        },
        None => config.ranking.min_records,
    };

    let dataset = PublishedDataset::new(
        pipeline::load_published(&input)?,
        config.ranking.excluded_programs.clone(),
    );
    let ranking = dataset.rank(metric, dimension, min_records);
    print!(
        "{}",
        report::format_ranking(metric, dimension, min_records, &ranking)
    );

    if let Some(csv_path) = path_arg(args, "csv") {
        report::write_ranking_csv(metric, &ranking, &csv_path)?;
        println!("\nCSV written to {}", csv_path.display());
    }
    Ok(())
}

async fn run_all(config: &Config) -> Result<()> {
    let output_dir = Path::new(config.output_dir());
    let raw_path = output_dir.join("raw.json");
    let normalized_path = output_dir.join("normalized.json");
    let published_path = output_dir.join("published.json");
    let reports_dir = output_dir.join("reports");

    fs::create_dir_all(&reports_dir)
        .with_context(|| format!("Failed to create {}", reports_dir.display()))?;

    let ingestor = CsvIngestor::new(config.skip_title_rows);
    ingest_from_config(config, &ingestor, &raw_path).await?;

    let normalizer = build_normalizer(config)?;
    pipeline::normalize_file(&normalizer, &raw_path, &normalized_path)?;
    pipeline::clean_averages_file(&normalized_path, &normalized_path)?;
    let published = pipeline::project_file(&normalized_path, &published_path)?;

    let dataset = PublishedDataset::new(published.data, config.ranking.excluded_programs.clone());
    let min_records = config.ranking.min_records;

    let mut rankings = Vec::new();
    for (metric, dimension) in ALL_RANKINGS {
        let ranking = dataset.rank(metric, dimension, min_records);
        report::write_ranking_report(metric, dimension, min_records, &ranking, &reports_dir)?;
        rankings.push((metric, dimension, ranking));
    }

    report::print_summary(&dataset.summary(), &rankings, 5);
    println!("\nReports written to {}", reports_dir.display());
    Ok(())
}
