use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

use sleepsync::export::csv::export_merged_series;
use sleepsync::import::{ImportManager, MasterIndex};
use sleepsync::logging::{init_logging, LogFormat, LogLevel};
use sleepsync::merge::NightMerger;
use sleepsync::plot::{load_result_files, load_stage_recording, CorrelationData, StageHistogram};
use sleepsync::quality::MissingDataReport;
use sleepsync::{report, AppConfig, ResultFormat};

/// sleepsync - align bed-pod and ECG-patch recordings over the sleep window
#[derive(Parser)]
#[command(name = "sleepsync")]
#[command(version)]
#[command(about = "Pod / vital patch sleep alignment", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log format (pretty, json, compact)
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge every patch (or one) with the subject's pod nights
    Merge {
        /// Directory holding pod and patch recordings
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Master CSV mapping patch IDs to user IDs
        #[arg(short, long)]
        master: Option<PathBuf>,

        /// Output directory for result files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Only merge this patch key
        #[arg(short, long)]
        patch: Option<String>,

        /// Result encoding (json, bincode)
        #[arg(short = 'f', long)]
        format: Option<ResultFormat>,

        /// Also write each night as CSV
        #[arg(long)]
        csv: bool,
    },

    /// Show the detected sleep window of pod nights
    Detect {
        /// A single pod file; all pod nights of the data directory otherwise
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Directory holding pod and patch recordings
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },

    /// Missing-data statistics of the patch heart rate after outlier removal
    Report {
        /// Directory holding pod and patch recordings
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },

    /// Render charts (requires the `charts` feature)
    Plot {
        #[command(subcommand)]
        chart: PlotCommands,
    },

    /// Show or write the configuration
    Config {
        /// Write the current configuration to the config path
        #[arg(long)]
        init: bool,
    },
}

#[derive(Subcommand)]
enum PlotCommands {
    /// Patch vs. pod heart-rate scatter per merged night
    Correlation {
        /// Directory holding merged result files
        #[arg(short, long)]
        results_dir: Option<PathBuf>,

        /// Directory receiving the SVG charts
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },

    /// Heart-rate histogram per sleep stage of one pod night
    Stages {
        /// Pod night file, or a merged result file carrying one
        #[arg(short, long)]
        file: PathBuf,

        /// Chart title
        #[arg(short, long, default_value = "Heart rate by sleep stage")]
        title: String,

        /// Number of histogram bins
        #[arg(short, long, default_value = "10")]
        bins: usize,

        /// Output SVG path
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(AppConfig::default_config_path);
    let mut config = if cli.config.is_some() {
        AppConfig::load_from_file(&config_path)?
    } else {
        AppConfig::load_or_default()
    };

    let mut log_config = config.logging.clone();
    log_config.level = LogLevel::from_verbosity(log_config.level, cli.verbose);
    if let Some(format) = cli.log_format {
        log_config.format = format;
    }
    init_logging(&log_config)?;

    match cli.command {
        Commands::Merge {
            data_dir,
            master,
            output_dir,
            patch,
            format,
            csv,
        } => {
            if let Some(dir) = data_dir {
                config.paths.data_dir = dir;
            }
            if master.is_some() {
                config.paths.master_file = master;
            }
            if let Some(dir) = output_dir {
                config.paths.output_dir = dir;
            }
            if let Some(format) = format {
                config.output.format = format;
            }
            config.output.write_csv |= csv;
            run_merge(&config, patch.as_deref())?;
        }

        Commands::Detect { file, data_dir } => {
            if let Some(dir) = data_dir {
                config.paths.data_dir = dir;
            }
            run_detect(&config, file.as_deref())?;
        }

        Commands::Report { data_dir } => {
            if let Some(dir) = data_dir {
                config.paths.data_dir = dir;
            }
            run_report(&config)?;
        }

        Commands::Plot { chart } => run_plot(&config, chart)?,

        Commands::Config { init } => {
            if init {
                config.save_to_file(&config_path)?;
                println!(
                    "{}",
                    format!("✓ Configuration written to {}", config_path.display()).green()
                );
            } else {
                println!("{}", format!("# {}", config_path.display()).dimmed());
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

fn run_merge(config: &AppConfig, only_patch: Option<&str>) -> Result<()> {
    println!("{}", "Merging vital patch and pod recordings...".green().bold());

    let dataset = ImportManager::new().load_dataset(&config.paths.data_dir)?;
    let master_path = config.resolve_master_file()?;
    let master = MasterIndex::load(&master_path)
        .with_context(|| format!("Failed to load master file {}", master_path.display()))?;
    let merger = NightMerger::new(config.detector(), config.resampler()?);

    let patch_ids: Vec<&str> = match only_patch {
        Some(id) => vec![id],
        None => dataset.patches.keys().map(String::as_str).collect(),
    };

    let pb = ProgressBar::new(patch_ids.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({msg})")?
            .progress_chars("#>-"),
    );

    let summary = merger.merge_patches(patch_ids, &dataset, &master, |outcome| {
        pb.set_message(outcome.patch_id.clone());
        if let Some(e) = &outcome.error {
            pb.println(format!(
                "{} {}: {} ({} nights kept)",
                "✗".red(),
                outcome.patch_id,
                e.user_message(),
                outcome.nights.len()
            ));
        }
        pb.inc(1);
    });
    pb.finish_with_message("done");

    for night in &summary.nights {
        sleepsync::write_night_result(night, &config.paths.output_dir, config.output.format)?;
        if config.output.write_csv {
            let csv_path = config.paths.output_dir.join(format!(
                "{}_{}_{}.csv",
                night.patch_id,
                night.user_id,
                night.sleep_start.format("%Y-%m-%d_%H-%M-%S")
            ));
            export_merged_series(&night.merged, &csv_path)?;
        }
    }

    if !summary.nights.is_empty() {
        println!("{}", report::nights_table(&summary.nights));
    }
    println!(
        "{}",
        format!(
            "✓ {} nights written to {} ({} patches failed)",
            summary.nights.len(),
            config.paths.output_dir.display(),
            summary.failures.len()
        )
        .green()
    );
    Ok(())
}

fn run_detect(config: &AppConfig, file: Option<&Path>) -> Result<()> {
    let manager = ImportManager::new();
    let recordings = match file {
        Some(path) => vec![manager.read_pod(path)?],
        None => manager
            .load_dataset(&config.paths.data_dir)?
            .pods
            .into_values()
            .flatten()
            .collect(),
    };

    let detector = config.detector();
    let mut subject = String::new();
    let mut windows = Vec::new();

    for recording in &recordings {
        if recording.user_id != subject && !windows.is_empty() {
            println!("{}", format!("Subject {}", subject).cyan().bold());
            println!("{}", report::windows_table(&windows));
            windows.clear();
        }
        subject = recording.user_id.clone();

        let (series, _, user_id) = detector.extract_pod_metrics(recording);
        match detector.window(&series, &user_id) {
            Ok(window) => windows.push((Some(window), detector.is_valid(&window))),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "No usable window");
                windows.push((None, false));
            }
        }
    }
    if !windows.is_empty() {
        println!("{}", format!("Subject {}", subject).cyan().bold());
        println!("{}", report::windows_table(&windows));
    }
    Ok(())
}

fn run_report(config: &AppConfig) -> Result<()> {
    println!("{}", "Computing missing-data statistics...".blue().bold());

    let dataset = ImportManager::new().load_dataset(&config.paths.data_dir)?;
    let report =
        MissingDataReport::build(&dataset, &config.resampler()?, &config.quality)?;

    if report.entries.is_empty() {
        println!("{}", "No vital patch recordings found".yellow());
        return Ok(());
    }
    println!("{}", report::missing_data_table(&report));
    Ok(())
}

fn run_plot(config: &AppConfig, chart: PlotCommands) -> Result<()> {
    match chart {
        PlotCommands::Correlation {
            results_dir,
            out_dir,
        } => {
            let results_dir = results_dir.unwrap_or_else(|| config.paths.output_dir.clone());
            let out_dir = out_dir.unwrap_or_else(|| results_dir.join("charts"));
            std::fs::create_dir_all(&out_dir)?;

            for (subject, night) in load_result_files(&results_dir)? {
                let data = CorrelationData::from_rows(subject.clone(), &night.merged);
                let r = data
                    .pearson_r()
                    .map(|r| format!("{:.2}", r))
                    .unwrap_or_else(|| "n/a".to_string());
                println!("{} r value = {}", subject.cyan(), r);

                let path = out_dir.join(format!(
                    "correlation_{}_{}.svg",
                    night.patch_id,
                    night.sleep_start.format("%Y-%m-%d_%H-%M-%S")
                ));
                draw_correlation(&data, &path)?;
            }
        }

        PlotCommands::Stages {
            file,
            title,
            bins,
            output,
        } => {
            let recording = load_stage_recording(&file)?;
            let histogram = StageHistogram::from_recording(&recording, bins);
            for (stage, stage_bins) in &histogram.stages {
                let total: u32 = stage_bins.iter().map(|b| b.count).sum();
                println!("{}: {} samples", stage.cyan(), total);
            }
            draw_stages(&histogram, &title, &output)?;
        }
    }
    Ok(())
}

#[cfg(feature = "charts")]
fn draw_correlation(data: &CorrelationData, path: &Path) -> Result<()> {
    sleepsync::plot::render_correlation(data, path)?;
    println!("  {}", format!("✓ {}", path.display()).green());
    Ok(())
}

#[cfg(not(feature = "charts"))]
fn draw_correlation(_data: &CorrelationData, _path: &Path) -> Result<()> {
    eprintln!("{}", "Chart rendering disabled; rebuild with --features charts".yellow());
    Ok(())
}

#[cfg(feature = "charts")]
fn draw_stages(histogram: &StageHistogram, title: &str, path: &Path) -> Result<()> {
    sleepsync::plot::render_stage_histogram(histogram, title, path)?;
    println!("{}", format!("✓ {}", path.display()).green());
    Ok(())
}

#[cfg(not(feature = "charts"))]
fn draw_stages(_histogram: &StageHistogram, _title: &str, _path: &Path) -> Result<()> {
    eprintln!("{}", "Chart rendering disabled; rebuild with --features charts".yellow());
    Ok(())
}
