//! Driving the external run-control tool.
//!
//! [`RunControl`] is the seam between the harness and whatever actually talks to the
//! DAQ. [`ProcessRunControl`] spawns the configured program as a child process, in one
//! of two [`ExecutionMode`]s:
//!
//! - **Batch**: a single invocation `<program> <args> <tokens...>`. The tool itself
//!   sequences the commands and honours `wait N`.
//! - **Stepwise**: one invocation per command step. The harness sleeps on `wait N`,
//!   stops at the first non-zero exit code and then issues the teardown commands
//!   (`scrap`, `terminate`) still pending in the script.
//!
//! stdout and stderr of every invocation are appended to `runcontrol_<session>.log`
//! in the run directory. The name stays outside the `log_*.txt` pattern, so the tool's
//! own status output is never scanned with the DAQ process logs.

use crate::config::{ExecutionMode, ToolsConfig};
use crate::error::{AppResult, IntegtestError};
use crate::scenario::RunConfig;
use crate::script::{pending_teardown, CommandScript, Step};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use strfmt::strfmt;
use tracing::{debug, info, warn};

/// Exit code recorded when the tool was killed by a signal.
pub const SIGNAL_EXIT_CODE: i32 = -1;

/// Result of executing one command script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    /// Process-level exit code: 0 on success, the first failing code otherwise.
    pub returncode: i32,
    /// File holding the tool's stdout and stderr.
    pub log_file: PathBuf,
    /// Command steps that were invoked (stepwise) or 1 (batch).
    pub invocations: usize,
}

impl RunOutcome {
    /// Exit code 0.
    pub fn succeeded(&self) -> bool {
        self.returncode == 0
    }
}

/// Executes a command script against a DAQ system.
pub trait RunControl {
    /// Runs `script` for `config` with `run_dir` as working directory.
    ///
    /// A non-zero tool exit is a normal outcome; `Err` is reserved for failures to
    /// start the tool or to prepare the run directory.
    fn execute(&self, config: &RunConfig, script: &CommandScript, run_dir: &Path) -> AppResult<RunOutcome>;
}

/// Name of the file capturing run-control output for `session`.
pub fn runcontrol_log_name(session: &str) -> String {
    format!("runcontrol_{}.log", session)
}

/// [`RunControl`] backed by an external program.
#[derive(Debug, Clone)]
pub struct ProcessRunControl {
    program: String,
    arg_templates: Vec<String>,
    mode: ExecutionMode,
}

impl ProcessRunControl {
    /// Batch runner for `program` with no leading arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            arg_templates: Vec::new(),
            mode: ExecutionMode::default(),
        }
    }

    /// Program, argument templates and mode from the `[tools]` section.
    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self {
            program: tools.run_control.clone(),
            arg_templates: tools.run_control_args.clone(),
            mode: tools.execution_mode,
        }
    }

    /// Replaces the argument templates.
    pub fn with_args<I, S>(mut self, templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arg_templates = templates.into_iter().map(Into::into).collect();
        self
    }

    /// Sets batch or stepwise execution.
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Current execution mode.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Leading arguments with `{config}`, `{session}`, `{op_env}` and `{run_dir}`
    /// substituted.
    pub fn render_args(&self, config: &RunConfig, run_dir: &Path) -> AppResult<Vec<String>> {
        let mut context = HashMap::new();
        context.insert("config".to_string(), config.config_db.display().to_string());
        context.insert("session".to_string(), config.session.clone());
        context.insert("op_env".to_string(), config.op_env.clone());
        context.insert("run_dir".to_string(), run_dir.display().to_string());

        self.arg_templates
            .iter()
            .map(|template| {
                strfmt(template, &context).map_err(|e| {
                    IntegtestError::Configuration(format!(
                        "Failed to format run-control argument '{}': {}",
                        template, e
                    ))
                })
            })
            .collect()
    }

    fn resolve_program(&self) -> AppResult<PathBuf> {
        resolve_program(&self.program)
    }

    fn invoke(
        &self,
        program: &Path,
        leading: &[String],
        tokens: &[String],
        run_dir: &Path,
        log: &File,
    ) -> AppResult<i32> {
        debug!(
            "Invoking {} {} {}",
            program.display(),
            leading.join(" "),
            tokens.join(" ")
        );
        let status = Command::new(program)
            .args(leading)
            .args(tokens)
            .current_dir(run_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log.try_clone()?))
            .status()
            .map_err(|source| IntegtestError::Spawn {
                program: program.display().to_string(),
                source,
            })?;
        Ok(status.code().unwrap_or(SIGNAL_EXIT_CODE))
    }

    /// Runs `tokens` ignoring failures; used for cleanup.
    fn invoke_best_effort(
        &self,
        program: &Path,
        leading: &[String],
        tokens: &[String],
        run_dir: &Path,
        log: &File,
    ) {
        match self.invoke(program, leading, tokens, run_dir, log) {
            Ok(0) => debug!("Best-effort '{}' succeeded", tokens.join(" ")),
            Ok(code) => warn!("Best-effort '{}' exited with code {}", tokens.join(" "), code),
            Err(e) => warn!("Best-effort '{}' failed: {}", tokens.join(" "), e),
        }
    }

    fn run_stepwise(
        &self,
        program: &Path,
        leading: &[String],
        steps: &[Step],
        run_dir: &Path,
        log: &File,
    ) -> AppResult<(i32, usize)> {
        let mut invocations = 0;
        for (index, step) in steps.iter().enumerate() {
            match step {
                Step::Wait(duration) => {
                    info!("Waiting {} s", duration.as_secs());
                    std::thread::sleep(*duration);
                }
                Step::Command { .. } => {
                    info!("Run control: {}", step);
                    invocations += 1;
                    let code = self.invoke(program, leading, &step.tokens(), run_dir, log)?;
                    if code != 0 {
                        warn!("'{}' exited with code {}; aborting the script", step, code);
                        for teardown in pending_teardown(steps, index) {
                            self.invoke_best_effort(program, leading, &teardown.tokens(), run_dir, log);
                        }
                        return Ok((code, invocations));
                    }
                }
            }
        }
        Ok((0, invocations))
    }
}

impl RunControl for ProcessRunControl {
    fn execute(&self, config: &RunConfig, script: &CommandScript, run_dir: &Path) -> AppResult<RunOutcome> {
        // Also rejects malformed `wait` tokens before anything is spawned.
        let steps = script.steps()?;
        let program = self.resolve_program()?;
        let leading = self.render_args(config, run_dir)?;

        let log_file = run_dir.join(runcontrol_log_name(&config.session));
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .map_err(|e| IntegtestError::path_io(&log_file, e))?;

        info!(
            "Starting run control: {} ({:?} mode, session '{}')",
            program.display(),
            self.mode,
            config.session
        );

        if config.attempt_cleanup {
            info!("Cleaning up processes left by an earlier session");
            self.invoke_best_effort(&program, &leading, &["terminate".to_string()], run_dir, &log);
        }

        let (returncode, invocations) = match self.mode {
            ExecutionMode::Batch => {
                let code = self.invoke(&program, &leading, script.tokens(), run_dir, &log)?;
                (code, 1)
            }
            ExecutionMode::Stepwise => self.run_stepwise(&program, &leading, &steps, run_dir, &log)?,
        };

        if returncode == 0 {
            info!("Run control completed successfully");
        } else {
            warn!("Run control failed with exit code {}", returncode);
        }

        Ok(RunOutcome {
            returncode,
            log_file,
            invocations,
        })
    }
}

/// Resolves a program name through `PATH`; names containing a path separator are
/// used as given, made absolute.
pub fn resolve_program(program: &str) -> AppResult<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        // Children run inside the run directory, so relative paths are anchored here.
        return if candidate.is_absolute() {
            Ok(candidate.to_path_buf())
        } else {
            Ok(std::env::current_dir()?.join(candidate))
        };
    }
    which::which(program).map_err(|e| IntegtestError::Spawn {
        program: program.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RunConfig {
        RunConfig::new("dfotest", "/configs/dfo-test.data.xml", "dfo-test")
    }

    #[test]
    fn args_are_templated() {
        let control = ProcessRunControl::new("drunc-unified-shell").with_args([
            "--config={config}",
            "{session}",
            "{op_env}",
            "{run_dir}/out",
        ]);
        let args = control.render_args(&config(), Path::new("/runs/r1")).unwrap();
        assert_eq!(
            args,
            vec![
                "--config=/configs/dfo-test.data.xml",
                "dfo-test",
                "dfotest",
                "/runs/r1/out"
            ]
        );
    }

    #[test]
    fn unknown_template_key_is_an_error() {
        let control = ProcessRunControl::new("nanorc").with_args(["{partition}"]);
        assert!(control.render_args(&config(), Path::new("/runs")).is_err());
    }

    #[test]
    fn log_name_follows_session() {
        assert_eq!(runcontrol_log_name("dfo-test"), "runcontrol_dfo-test.log");
        assert!(!runcontrol_log_name("dfo-test").starts_with("log_"));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = resolve_program("definitely-not-a-run-control-tool-xyz").unwrap_err();
        assert!(matches!(err, IntegtestError::Spawn { .. }));
    }

    #[test]
    fn explicit_paths_are_not_searched() {
        let path = resolve_program("/opt/daq/bin/nanorc").unwrap();
        assert_eq!(path, PathBuf::from("/opt/daq/bin/nanorc"));

        let relative = resolve_program("bin/nanorc").unwrap();
        assert!(relative.is_absolute());
        assert!(relative.ends_with("bin/nanorc"));
    }
}
