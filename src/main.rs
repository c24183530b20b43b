//! CLI Entry Point for daq-integtest
//!
//! Provides command-line interface for:
//! - Listing and inspecting the declared scenarios
//! - Running a scenario against a live DAQ installation
//! - Running the log and data-file checkers on existing artifacts
//!
//! # Usage
//!
//! Run every configuration of a scenario:
//! ```bash
//! daq-integtest run fake_data_producer --json report.json
//! ```
//!
//! Scan logs left by an earlier run:
//! ```bash
//! daq-integtest check-logs runs/*/log_*.txt --ignore-file ignored.toml
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use daq_integtest::config::{HarnessConfig, HarnessOptions};
use daq_integtest::data_file::{
    check_event_count, check_file_attributes, check_fragment_count, check_fragment_sizes,
    sanity_check, DataFile, FragmentCheckSpec,
};
use daq_integtest::harness::IntegrationRun;
use daq_integtest::log_checks::{report_problems, scan_logs, IgnoredProblems, ScanOptions};
use daq_integtest::logging::{self, OutputFormat, TracingConfig};
use daq_integtest::scenario::{self, Scenario};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "daq-integtest")]
#[command(about = "Integration tests for a distributed DAQ system", long_about = None)]
struct Cli {
    /// Harness configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Compact, global = true)]
    log_format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List declared scenarios
    List,

    /// Show configurations, script and tolerated log problems of a scenario
    Show {
        scenario: String,
    },

    /// Run a scenario and its tests
    Run {
        scenario: String,

        /// Configuration label (repeatable; default: all labels)
        #[arg(long)]
        label: Vec<String>,

        /// Enable software TPG (also MDAPP_INTEGTEST_SWTPG)
        #[arg(long)]
        software_tpg: bool,

        /// Enable DQM (also MDAPP_INTEGTEST_DQM)
        #[arg(long)]
        dqm: bool,

        /// Write the reports as JSON to this file
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Scan log files for errors and warnings
    CheckLogs {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Do not report error lines
        #[arg(long)]
        no_errors: bool,

        /// Do not report warning lines
        #[arg(long)]
        no_warnings: bool,

        /// TOML table of "file pattern" = ["message pattern", ...]
        #[arg(long)]
        ignore_file: Option<PathBuf>,
    },

    /// Check HDF5 data files
    CheckData {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Expected number of records per file
        #[arg(long)]
        expected_events: Option<f64>,

        /// Allowed deviation from --expected-events
        #[arg(long, default_value_t = 0.0)]
        tolerance: f64,

        /// TOML file with [[fragment]] expectations
        #[arg(long)]
        fragment_spec: Option<PathBuf>,

        /// Skip the record-header sanity check (stream files)
        #[arg(long)]
        no_sanity: bool,

        /// Skip the attribute check
        #[arg(long)]
        no_attributes: bool,
    },
}

#[derive(Debug, Default, Deserialize)]
struct FragmentSpecFile {
    #[serde(default, rename = "fragment")]
    fragments: Vec<FragmentCheckSpec>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => HarnessConfig::load_from(path),
        None => HarnessConfig::load(),
    }
    .context("Failed to load harness configuration")?;
    logging::init(TracingConfig::from_harness_config(&config)?.with_format(cli.log_format))?;

    match cli.command {
        Commands::List => list_scenarios(),
        Commands::Show { scenario } => show_scenario(&scenario),
        Commands::Run {
            scenario,
            label,
            software_tpg,
            dqm,
            json,
        } => {
            let env = HarnessOptions::from_env();
            let options = HarnessOptions {
                enable_software_tpg: software_tpg || env.enable_software_tpg,
                enable_dqm: dqm || env.enable_dqm,
            };
            run_scenario(config, &scenario, &label, &options, json.as_deref())
        }
        Commands::CheckLogs {
            files,
            no_errors,
            no_warnings,
            ignore_file,
        } => check_logs(&files, !no_errors, !no_warnings, ignore_file.as_deref()),
        Commands::CheckData {
            files,
            expected_events,
            tolerance,
            fragment_spec,
            no_sanity,
            no_attributes,
        } => {
            let specs = match fragment_spec {
                Some(path) => load_fragment_specs(&path)?,
                None => Vec::new(),
            };
            let checks = DataChecks {
                sanity: !no_sanity,
                attributes: !no_attributes,
                events: expected_events.map(|expected| (expected, tolerance)),
                fragments: specs,
            };
            check_data(&files, &checks)
        }
    }
}

fn list_scenarios() -> Result<()> {
    for scenario in scenario::all() {
        println!("{:<24} {}", scenario.name(), scenario.description());
        println!("{:<24} labels: {}", "", scenario.labels().join(", "));
    }
    Ok(())
}

fn show_scenario(name: &str) -> Result<()> {
    let scenario = scenario::find(name)?;
    let options = HarnessOptions::from_env();

    println!("{}: {}", scenario.name(), scenario.description());
    if let Some(module) = scenario.confgen_module() {
        println!("generator: {}", module);
    }
    for label in scenario.labels() {
        let config = scenario.run_config(label, &options)?;
        println!();
        println!("[{}]", label);
        println!("  session:    {}", config.session);
        println!("  op_env:     {}", config.op_env);
        println!("  config_db:  {}", config.config_db.display());
        println!("  cleanup:    {}", config.attempt_cleanup);
        println!("  arguments:  {}", config.extra_args.join(" "));
    }

    let script = scenario.command_script();
    println!();
    println!("script ({} s of waits):", script.total_wait().as_secs());
    for step in script.steps()? {
        println!("  {}", step);
    }
    let unknown = script.unknown_commands()?;
    if !unknown.is_empty() {
        println!("  (passed through verbatim: {})", unknown.join(", "));
    }
    println!();
    println!(
        "tests: {}",
        scenario.tests().join(", ")
    );
    println!(
        "log error check: {} ({} suppression key(s))",
        if scenario.check_log_errors(&options) { "on" } else { "off" },
        scenario.ignored_problems()?.len()
    );
    Ok(())
}

fn run_scenario(
    config: HarnessConfig,
    name: &str,
    labels: &[String],
    options: &HarnessOptions,
    json: Option<&Path>,
) -> Result<()> {
    let scenario = scenario::find(name)?;
    let labels: Vec<String> = if labels.is_empty() {
        scenario.labels().into_iter().map(str::to_string).collect()
    } else {
        labels.to_vec()
    };

    let run = IntegrationRun::new(config);
    let mut reports = Vec::new();
    for label in &labels {
        let report = run
            .run_and_verify(scenario.as_ref(), label, options)
            .with_context(|| format!("Run of {}[{}] failed", name, label))?;
        report.log_summary();
        reports.push(report);
    }

    if let Some(path) = json {
        let text = serde_json::to_string_pretty(&reports)?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    let failed: usize = reports.iter().map(|report| report.failed_count()).sum();
    if failed > 0 {
        bail!("{} test(s) failed", failed);
    }
    Ok(())
}

fn check_logs(files: &[PathBuf], errors: bool, warnings: bool, ignore_file: Option<&Path>) -> Result<()> {
    let ignored = match ignore_file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            IgnoredProblems::from_toml_str(&text)?
        }
        None => IgnoredProblems::new(),
    };

    let report = scan_logs(files, ScanOptions { errors, warnings }, &ignored)?;
    report_problems(&report);
    if !report.is_clean() {
        bail!(
            "{} problem(s) in {} file(s)",
            report.problem_count(),
            report.files.iter().filter(|scan| !scan.is_clean()).count()
        );
    }
    info!(
        "{} log file(s) clean ({} problem(s) ignored)",
        report.files.len(),
        report.ignored_count()
    );
    Ok(())
}

fn load_fragment_specs(path: &Path) -> Result<Vec<FragmentCheckSpec>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let parsed: FragmentSpecFile = toml::from_str(&text)
        .with_context(|| format!("Invalid fragment spec file {}", path.display()))?;
    Ok(parsed.fragments)
}

struct DataChecks {
    sanity: bool,
    attributes: bool,
    events: Option<(f64, f64)>,
    fragments: Vec<FragmentCheckSpec>,
}

fn check_file(file: &DataFile, checks: &DataChecks) -> bool {
    if checks.sanity && !sanity_check(file) {
        return false;
    }
    if checks.attributes && !check_file_attributes(file) {
        return false;
    }
    if let Some((expected, tolerance)) = checks.events {
        if !check_event_count(file, expected, tolerance) {
            return false;
        }
    }
    checks
        .fragments
        .iter()
        .all(|spec| check_fragment_count(file, spec) && check_fragment_sizes(file, spec))
}

fn check_data(files: &[PathBuf], checks: &DataChecks) -> Result<()> {
    let mut failed = 0;
    for path in files {
        let file = DataFile::open(path)?;
        if check_file(&file, checks) {
            info!("{}: all checks passed", file.name());
        } else {
            error!("{}: checks failed", file.name());
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{} of {} data file(s) failed", failed, files.len());
    }
    Ok(())
}
