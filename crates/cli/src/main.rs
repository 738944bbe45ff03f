use algorithms::{Algorithm, AlgorithmConfig, PredictionAlgorithm};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use dataset::{read_ratings, Rating, RatingScale, ReaderFormat, Trainset};
use evaluation::{top_n, CrossValidation, CvReport, KFold, Measure, Split};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// recsys - rating prediction and evaluation
#[derive(Parser)]
#[command(name = "recsys")]
#[command(
    about = "Collaborative-filtering rating prediction with cross-validation",
    long_about = None
)]
struct Cli {
    /// Path to the ratings file
    #[arg(short, long, default_value = "data/ml-100k/u.data")]
    data: PathBuf,

    /// Layout of the ratings file
    #[arg(long, value_enum, default_value_t = Format::Ml100k)]
    format: Format,

    /// Column separator for `--format custom` (default: whitespace)
    #[arg(long)]
    sep: Option<String>,

    /// Header lines to skip for `--format custom`
    #[arg(long, default_value = "0")]
    skip_lines: usize,

    /// Lowest rating on the scale
    #[arg(long, default_value = "1")]
    scale_min: f64,

    /// Highest rating on the scale
    #[arg(long, default_value = "5")]
    scale_max: f64,

    /// JSON algorithm configuration, e.g. {"algorithm": "knn", "k": 20}
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Algorithm with default options, used when no --config is given
    #[arg(short, long, value_enum, default_value_t = AlgorithmKind::Svd)]
    algorithm: AlgorithmKind,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    /// MovieLens 100k `u.data` (tab separated)
    Ml100k,
    /// MovieLens 1M `ratings.dat` ("::" separated)
    Ml1m,
    /// `user item rating` with --sep and --skip-lines
    Custom,
}

#[derive(Clone, Copy, ValueEnum)]
enum AlgorithmKind {
    Baseline,
    Knn,
    Svd,
}

#[derive(Subcommand)]
enum Commands {
    /// Cross-validate the algorithm
    Evaluate {
        /// Number of folds
        #[arg(long, default_value = "5")]
        folds: usize,

        /// Seed for the fold shuffle
        #[arg(long)]
        seed: Option<u64>,

        /// JSON split configuration, overrides --folds and --seed
        #[arg(long)]
        split: Option<PathBuf>,

        /// Measures to report
        #[arg(long, value_delimiter = ',', default_value = "rmse,mae")]
        measures: Vec<String>,

        /// Evaluate folds in parallel
        #[arg(long)]
        parallel: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Predict one rating after fitting on the whole dataset
    Predict {
        #[arg(long)]
        user: String,

        #[arg(long)]
        item: String,

        /// True rating, shown next to the estimate
        #[arg(long)]
        r_true: Option<f64>,
    },

    /// Recommend the best unrated items for a user
    TopN {
        #[arg(long)]
        user: String,

        /// Number of items to recommend
        #[arg(short, long, default_value = "10")]
        n: usize,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let format = reader_format(&cli)?;
    let start = Instant::now();
    let ratings = read_ratings(&cli.data, &format)
        .with_context(|| format!("Failed to load ratings from {}", cli.data.display()))?;
    println!(
        "{} Loaded {} ratings in {:?}",
        "✓".green(),
        ratings.len(),
        start.elapsed()
    );

    let algorithm = load_algorithm(cli.config.as_deref(), cli.algorithm)?;

    match cli.command {
        Commands::Evaluate {
            folds,
            seed,
            split,
            measures,
            parallel,
            json,
        } => {
            let split = match split {
                Some(path) => load_json::<Split>(&path)?,
                None => {
                    let kfold = KFold::new(folds);
                    match seed {
                        Some(seed) => kfold.with_seed(seed).into(),
                        None => kfold.into(),
                    }
                }
            };
            let measures = parse_measures(&measures)?;
            handle_evaluate(
                &algorithm,
                &ratings,
                split,
                measures,
                format.rating_scale,
                parallel,
                json,
            )?
        }
        Commands::Predict { user, item, r_true } => {
            handle_predict(algorithm, &ratings, format.rating_scale, &user, &item, r_true)?
        }
        Commands::TopN { user, n } => {
            handle_top_n(algorithm, &ratings, format.rating_scale, &user, n)?
        }
    }

    Ok(())
}

fn reader_format(cli: &Cli) -> Result<ReaderFormat> {
    let scale = RatingScale::new(cli.scale_min, cli.scale_max).context("Invalid rating scale")?;
    let format = match cli.format {
        Format::Ml100k => ReaderFormat::ml_100k(),
        Format::Ml1m => ReaderFormat::ml_1m(),
        Format::Custom => {
            let format = ReaderFormat::default().with_skip_lines(cli.skip_lines);
            match &cli.sep {
                Some(sep) => format.with_separator(sep.clone()),
                None => format,
            }
        }
    };
    Ok(format.with_rating_scale(scale))
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn load_algorithm(config: Option<&Path>, kind: AlgorithmKind) -> Result<Algorithm> {
    let config = match config {
        Some(path) => load_json::<AlgorithmConfig>(path)?,
        None => match kind {
            AlgorithmKind::Baseline => AlgorithmConfig::Baseline {
                baseline: Default::default(),
            },
            AlgorithmKind::Knn => AlgorithmConfig::Knn(Default::default()),
            AlgorithmKind::Svd => AlgorithmConfig::Svd(Default::default()),
        },
    };
    info!("Using algorithm configuration {:?}", config);
    Ok(config.build())
}

fn parse_measures(names: &[String]) -> Result<Vec<Measure>> {
    names
        .iter()
        .map(|name| {
            serde_json::from_value(serde_json::Value::String(name.to_lowercase()))
                .map_err(|_| anyhow!("Unknown measure '{}' (expected rmse, mae, mse or fcp)", name))
        })
        .collect()
}

fn fit_full(algorithm: &mut Algorithm, ratings: &[Rating], scale: RatingScale) -> Result<()> {
    let trainset = Arc::new(Trainset::build(ratings, scale).context("Failed to build trainset")?);
    let name = algorithm.name().to_string();
    let start = Instant::now();
    algorithm
        .fit(trainset)
        .with_context(|| format!("Failed to fit {}", name))?;
    println!("{} Fitted {} in {:?}", "✓".green(), name, start.elapsed());
    Ok(())
}

/// Handle the 'evaluate' command
fn handle_evaluate(
    algorithm: &Algorithm,
    ratings: &[Rating],
    split: Split,
    measures: Vec<Measure>,
    scale: RatingScale,
    parallel: bool,
    json: bool,
) -> Result<()> {
    let cv = CrossValidation::new(split)
        .with_measures(measures)
        .with_rating_scale(scale)
        .with_parallel(parallel);
    let report = cv
        .run(algorithm, ratings)
        .with_context(|| format!("Cross-validation of {} failed", algorithm.name()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Handle the 'predict' command
fn handle_predict(
    mut algorithm: Algorithm,
    ratings: &[Rating],
    scale: RatingScale,
    user: &str,
    item: &str,
    r_true: Option<f64>,
) -> Result<()> {
    fit_full(&mut algorithm, ratings, scale)?;
    let prediction = algorithm.predict(user, item, r_true)?;
    println!("{}", prediction);
    Ok(())
}

/// Handle the 'top-n' command
fn handle_top_n(
    mut algorithm: Algorithm,
    ratings: &[Rating],
    scale: RatingScale,
    user: &str,
    n: usize,
) -> Result<()> {
    fit_full(&mut algorithm, ratings, scale)?;
    let trainset = algorithm
        .trainset()
        .cloned()
        .ok_or_else(|| anyhow!("{} has no trainset after fitting", algorithm.name()))?;

    let u = trainset
        .to_inner_uid(user)
        .with_context(|| format!("User {} has no ratings", user))?;
    let candidates = trainset.build_user_anti_testset(u, None)?;
    let predictions = algorithm.test(&candidates)?;
    let top = top_n(&predictions, n);

    println!("{}", format!("Top {} items for user {}:", n, user).bold().blue());
    for (rank, pred) in top.get(user).into_iter().flatten().enumerate() {
        let flag = if pred.was_impossible() {
            " (fallback)".yellow()
        } else {
            "".normal()
        };
        println!(
            "{}. {} - est {:.2}{}",
            (rank + 1).to_string().green(),
            pred.item,
            pred.est,
            flag
        );
    }
    Ok(())
}

/// Helper function to format and print a cross-validation report
fn print_report(report: &CvReport) {
    println!(
        "{}",
        format!("Evaluating {} on {} folds:", report.algorithm, report.folds.len())
            .bold()
            .blue()
    );

    for fold in &report.folds {
        let metrics = fold
            .metrics
            .iter()
            .map(|(measure, value)| format!("{} {:.4}", measure, value))
            .collect::<Vec<_>>()
            .join("  ");
        println!(
            "  Fold {}  train {:>7}  test {:>6}  {}  fit {:.2?}  test {:.2?}",
            (fold.fold + 1).to_string().green(),
            fold.n_train,
            fold.n_test,
            metrics,
            fold.fit_time,
            fold.test_time
        );
    }

    for (measure, mean) in &report.mean {
        let std = report.std.get(measure).copied().unwrap_or(0.0);
        println!(
            "{}{:<5} mean {:.4}  std {:.4}",
            "• ".cyan(),
            measure.to_string(),
            mean,
            std
        );
    }
    println!(
        "{}Impossible predictions: {}",
        "• ".cyan(),
        report.n_impossible
    );
    println!(
        "{}Fit time {:.2?}, test time {:.2?}",
        "• ".cyan(),
        report.total_fit_time(),
        report.total_test_time()
    );
}
