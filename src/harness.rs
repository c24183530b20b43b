//! The run fixture.
//!
//! [`IntegrationRun::execute`] performs one scenario run end to end:
//!
//! 1. create `<work_dir>/<scenario>-<label>-<timestamp>`;
//! 2. run the scenario's configuration generator, if it names one, inside that
//!    directory (`<confgen> -m <module> <extra_args...> <config_db>`, output in
//!    `confgen.log`);
//! 3. execute the command script through the [`RunControl`];
//! 4. collect `log_*.txt` files and HDF5 data files into a [`RunResult`].
//!
//! The scenario's test functions then run against the returned [`RunResult`].

use crate::config::{HarnessConfig, HarnessOptions};
use crate::error::{AppResult, IntegtestError};
use crate::executor::{resolve_program, ProcessRunControl, RunControl};
use crate::report::ScenarioReport;
use crate::scenario::{RunConfig, Scenario};
use chrono::Local;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{info, warn};

/// File receiving the configuration generator's output.
pub const CONFGEN_LOG: &str = "confgen.log";

/// Prefix of TP-stream files, which are not trigger-record data files.
pub const TPSTREAM_PREFIX: &str = "tpstream_";

/// Artifacts and status of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    /// Scenario name.
    pub scenario: String,
    /// Configuration label.
    pub label: String,
    /// Run-control session.
    pub session: String,
    /// Exit code of the run-control tool.
    pub returncode: i32,
    /// Absolute directory holding every artifact of the run.
    pub run_dir: PathBuf,
    /// `log_*.txt` files, sorted.
    pub log_files: Vec<PathBuf>,
    /// `*.hdf5` files other than TP-stream files, sorted.
    pub data_files: Vec<PathBuf>,
    /// Arguments given to the configuration generator.
    pub confgen_arguments: Vec<String>,
}

impl RunResult {
    /// The run-control tool exited with 0.
    pub fn succeeded(&self) -> bool {
        self.returncode == 0
    }

    /// True if `argument` is one of the generator arguments (exact element match).
    pub fn has_confgen_argument(&self, argument: &str) -> bool {
        self.confgen_arguments.iter().any(|arg| arg == argument)
    }

    /// True if some log file path contains `fragment`, e.g. `"dfo-test_df-01"`.
    pub fn has_log_file_containing(&self, fragment: &str) -> bool {
        self.log_files
            .iter()
            .any(|path| path.to_string_lossy().contains(fragment))
    }

    /// `tpstream_*.hdf5` files of the run directory.
    pub fn tpstream_files(&self) -> AppResult<Vec<PathBuf>> {
        tpstream_files(&self.run_dir)
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

fn list_files<F>(dir: &Path, keep: F) -> AppResult<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| IntegtestError::path_io(dir, e))? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if file_name(&path).map(|name| keep(&name)).unwrap_or(false) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// `log_*.txt` files in `dir`, sorted.
pub fn collect_log_files(dir: &Path) -> AppResult<Vec<PathBuf>> {
    list_files(dir, |name| name.starts_with("log_") && name.ends_with(".txt"))
}

/// `*.hdf5` files in `dir` that are not TP-stream files, sorted.
pub fn collect_data_files(dir: &Path) -> AppResult<Vec<PathBuf>> {
    list_files(dir, |name| {
        name.ends_with(".hdf5") && !name.starts_with(TPSTREAM_PREFIX)
    })
}

/// `tpstream_*.hdf5` files in `dir`, sorted.
pub fn tpstream_files(dir: &Path) -> AppResult<Vec<PathBuf>> {
    list_files(dir, |name| {
        name.starts_with(TPSTREAM_PREFIX) && name.ends_with(".hdf5")
    })
}

/// Directory name for a run; characters outside `[A-Za-z0-9_-]` in the label become
/// `_`.
pub fn run_dir_name(scenario: &str, label: &str, timestamp: &str) -> String {
    let label: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}-{}-{}", scenario, label, timestamp)
}

/// Drives scenario runs with a [`RunControl`].
pub struct IntegrationRun<R: RunControl = ProcessRunControl> {
    config: HarnessConfig,
    run_control: R,
}

impl IntegrationRun<ProcessRunControl> {
    /// Uses the run-control program from `config.tools`.
    pub fn new(config: HarnessConfig) -> Self {
        let run_control = ProcessRunControl::from_config(&config.tools);
        Self {
            config,
            run_control,
        }
    }
}

impl<R: RunControl> IntegrationRun<R> {
    /// Harness driving `run_control` instead of the external tool.
    pub fn with_run_control(config: HarnessConfig, run_control: R) -> Self {
        Self {
            config,
            run_control,
        }
    }

    /// Loaded configuration.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Creates a fresh, absolute run directory.
    pub fn prepare_run_dir(&self, scenario: &str, label: &str) -> AppResult<PathBuf> {
        let timestamp = Local::now().format("%Y%m%dT%H%M%S%3f").to_string();
        let dir = self
            .config
            .run
            .work_dir
            .join(run_dir_name(scenario, label, &timestamp));
        std::fs::create_dir_all(&dir).map_err(|e| IntegtestError::path_io(&dir, e))?;
        dir.canonicalize().map_err(|e| IntegtestError::path_io(&dir, e))
    }

    /// Anchors a relative `config.config_db`.
    ///
    /// With a generator the database is the generator's output inside the run
    /// directory; otherwise it is a prepared file under `run.config_root`.
    pub fn resolve_config(&self, config: &RunConfig, has_confgen: bool, run_dir: &Path) -> RunConfig {
        let mut resolved = config.clone();
        if resolved.config_db.is_relative() {
            let base = if has_confgen {
                run_dir.to_path_buf()
            } else {
                self.config.run.config_root.clone()
            };
            resolved.config_db = base.join(&config.config_db);
        }
        resolved
    }

    /// Runs `-m <module> <extra_args...> <config_db>` in `run_dir`.
    pub fn run_confgen(&self, module: &str, config: &RunConfig, run_dir: &Path) -> AppResult<()> {
        let program = resolve_program(&self.config.tools.confgen)?;
        let log_path = run_dir.join(CONFGEN_LOG);
        let log = File::create(&log_path).map_err(|e| IntegtestError::path_io(&log_path, e))?;

        info!(
            "Generating configuration: {} -m {} {} {}",
            program.display(),
            module,
            config.extra_args.join(" "),
            config.config_db.display()
        );
        let status = Command::new(&program)
            .arg("-m")
            .arg(module)
            .args(&config.extra_args)
            .arg(&config.config_db)
            .current_dir(run_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log))
            .status()
            .map_err(|source| IntegtestError::Spawn {
                program: program.display().to_string(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(IntegtestError::Confgen {
                module: module.to_string(),
                code: status.code().unwrap_or(crate::executor::SIGNAL_EXIT_CODE),
            })
        }
    }

    /// Runs `scenario` on the configuration labelled `label`.
    pub fn execute(&self, scenario: &dyn Scenario, label: &str, options: &HarnessOptions) -> AppResult<RunResult> {
        let declared = scenario.run_config(label, options)?;
        let script = scenario.command_script();
        let run_dir = self.prepare_run_dir(scenario.name(), label)?;
        info!(
            "Running scenario '{}' [{}] in {}",
            scenario.name(),
            label,
            run_dir.display()
        );

        let config = self.resolve_config(&declared, scenario.confgen_module().is_some(), &run_dir);
        if let Some(module) = scenario.confgen_module() {
            self.run_confgen(module, &config, &run_dir)?;
        }

        let outcome = self.run_control.execute(&config, &script, &run_dir)?;

        Ok(RunResult {
            scenario: scenario.name().to_string(),
            label: label.to_string(),
            session: config.session.clone(),
            returncode: outcome.returncode,
            log_files: collect_log_files(&run_dir)?,
            data_files: collect_data_files(&run_dir)?,
            confgen_arguments: config.extra_args.clone(),
            run_dir,
        })
    }

    /// Runs `scenario`, then its test functions, and removes the run directory
    /// afterwards unless `run.keep_run_dirs` is set.
    pub fn run_and_verify(
        &self,
        scenario: &dyn Scenario,
        label: &str,
        options: &HarnessOptions,
    ) -> AppResult<ScenarioReport> {
        let result = self.execute(scenario, label, options)?;
        let outcomes = scenario.verify(&result, options);
        let report = ScenarioReport {
            scenario: result.scenario.clone(),
            label: result.label.clone(),
            options: *options,
            run_dir: result.run_dir.clone(),
            returncode: result.returncode,
            log_files: result.log_files.len(),
            data_files: result.data_files.len(),
            outcomes,
        };

        if !self.config.run.keep_run_dirs {
            if let Err(e) = std::fs::remove_dir_all(&result.run_dir) {
                warn!("Could not remove {}: {}", result.run_dir.display(), e);
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_dir_name_sanitizes_label() {
        assert_eq!(
            run_dir_name("dfo", "DFO Test", "20220211T101112000"),
            "dfo-DFO_Test-20220211T101112000"
        );
    }

    #[test]
    fn collection_separates_tpstream_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "log_b_dataflow0_3340.txt",
            "log_a_ruemu0_3336.txt",
            "confgen.log",
            "swtest_run000101_0000_dataflow0_datawriter_0_20220211T101112.hdf5",
            "tpstream_run000101_0000_tpswriter_20220211T101112.hdf5",
        ] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let logs = collect_log_files(dir.path()).unwrap();
        let names: Vec<_> = logs.iter().filter_map(|p| file_name(p)).collect();
        assert_eq!(names, vec!["log_a_ruemu0_3336.txt", "log_b_dataflow0_3340.txt"]);

        assert_eq!(collect_data_files(dir.path()).unwrap().len(), 1);
        assert_eq!(tpstream_files(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn config_db_resolution_depends_on_generator() {
        let mut config = HarnessConfig::default();
        config.run.config_root = PathBuf::from("/opt/configs");
        let run = IntegrationRun::new(config);
        let declared = RunConfig::new("dfotest", "test/config/dfo-test.data.xml", "dfo-test");

        let resolved = run.resolve_config(&declared, false, Path::new("/runs/r1"));
        assert_eq!(
            resolved.config_db,
            PathBuf::from("/opt/configs/test/config/dfo-test.data.xml")
        );

        let generated = RunConfig::new("integtest", "json", "integtest");
        let resolved = run.resolve_config(&generated, true, Path::new("/runs/r1"));
        assert_eq!(resolved.config_db, PathBuf::from("/runs/r1/json"));
    }
}
