//! Command scripts for the run-control tool.
//!
//! A [`CommandScript`] is the ordered token list a scenario hands to the run-control
//! tool (`boot`, `conf`, `start --run-number 101`, `wait 20`, ...). Tokens are kept
//! verbatim for batch execution and parsed into typed [`Step`]s for stepwise execution
//! and for inspection (total wait time, run numbers, pending teardown commands).
//!
//! Grammar, applied left to right:
//! - `wait N`: a blocking pause of `N` seconds. `N` must be a non-negative integer.
//! - `--flag VALUE`: a flag and its value, attached to the current command. `wait`,
//!   another flag or a known command after a flag is not taken as its value.
//! - a bare integer following a command: positional argument (run number).
//! - anything else: a new command.
//!
//! ```
//! use daq_integtest::script::{CommandScript, Step};
//!
//! let script = CommandScript::new()
//!     .commands("boot conf")
//!     .commands("start --run-number 101")
//!     .wait(20)
//!     .commands("stop scrap terminate");
//! let steps = script.steps()?;
//! assert_eq!(steps[2].command_name(), Some("start"));
//! assert_eq!(script.total_wait().as_secs(), 20);
//! # Ok::<(), daq_integtest::error::IntegtestError>(())
//! ```

use crate::error::{AppResult, IntegtestError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Token introducing a pause.
pub const WAIT: &str = "wait";

/// Commands that tear the system down; issued best-effort after a failure.
pub const TEARDOWN_COMMANDS: [&str; 2] = ["scrap", "terminate"];

/// Commands understood by the run-control tool.
///
/// Unknown words are still accepted as commands and passed through verbatim; this
/// list is used to flag likely typos in diagnostics.
pub const KNOWN_COMMANDS: [&str; 17] = [
    "boot",
    "init",
    "conf",
    "start",
    "enable-triggers",
    "disable-triggers",
    "drain-dataflow",
    "stop-trigger-sources",
    "stop",
    "pause",
    "resume",
    "scrap",
    "terminate",
    "start_run",
    "stop_run",
    "shutdown",
    "exit",
];

/// One executable unit of a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    /// A run-control command with its arguments, in token order.
    Command {
        /// Command word
        name: String,
        /// Flags, flag values and positional arguments
        args: Vec<String>,
    },
    /// A blocking pause.
    Wait(Duration),
}

impl Step {
    /// Command name, or `None` for a wait.
    pub fn command_name(&self) -> Option<&str> {
        match self {
            Step::Command { name, .. } => Some(name),
            Step::Wait(_) => None,
        }
    }

    /// Tokens this step occupies in the script.
    pub fn tokens(&self) -> Vec<String> {
        match self {
            Step::Command { name, args } => {
                let mut tokens = Vec::with_capacity(args.len() + 1);
                tokens.push(name.clone());
                tokens.extend(args.iter().cloned());
                tokens
            }
            Step::Wait(duration) => vec![WAIT.to_string(), duration.as_secs().to_string()],
        }
    }

    fn is_teardown(&self) -> bool {
        self.command_name()
            .map(|name| TEARDOWN_COMMANDS.contains(&name))
            .unwrap_or(false)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tokens().join(" "))
    }
}

/// Ordered token list replayed verbatim against the run-control tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandScript {
    tokens: Vec<String>,
}

impl CommandScript {
    /// Empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a script from an explicit token list.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// Appends whitespace-separated tokens.
    pub fn commands(mut self, words: &str) -> Self {
        self.tokens
            .extend(words.split_whitespace().map(str::to_string));
        self
    }

    /// Appends `wait <seconds>`.
    pub fn wait(mut self, seconds: u64) -> Self {
        self.tokens.push(WAIT.to_string());
        self.tokens.push(seconds.to_string());
        self
    }

    /// Appends another script.
    pub fn then(mut self, other: CommandScript) -> Self {
        self.tokens.extend(other.tokens);
        self
    }

    /// Verbatim tokens.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// No tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Parses the tokens into steps, checking the `wait` invariant.
    pub fn steps(&self) -> AppResult<Vec<Step>> {
        let mut steps: Vec<Step> = Vec::new();
        let mut iter = self.tokens.iter().enumerate().peekable();

        while let Some((index, token)) = iter.next() {
            if token == WAIT {
                let (_, value) = iter.next().ok_or_else(|| {
                    IntegtestError::Script(format!(
                        "'wait' at token {} is missing its duration",
                        index
                    ))
                })?;
                let seconds: u64 = value.parse().map_err(|_| {
                    IntegtestError::Script(format!(
                        "'wait' at token {} has invalid duration '{}'",
                        index, value
                    ))
                })?;
                steps.push(Step::Wait(Duration::from_secs(seconds)));
                continue;
            }

            let is_flag = token.starts_with("--");
            if !is_flag && !is_integer(token) {
                steps.push(Step::Command {
                    name: token.clone(),
                    args: Vec::new(),
                });
                continue;
            }

            let Some(Step::Command { args, .. }) = steps.last_mut() else {
                return Err(IntegtestError::Script(format!(
                    "argument '{}' at token {} does not follow a command",
                    token, index
                )));
            };
            args.push(token.clone());
            if is_flag {
                if let Some((_, value)) = iter.next_if(|(_, next)| is_flag_value(next)) {
                    args.push(value.clone());
                }
            }
        }

        Ok(steps)
    }

    /// Sum of all `wait` durations; malformed waits are ignored.
    pub fn total_wait(&self) -> Duration {
        self.tokens
            .windows(2)
            .filter(|pair| pair[0] == WAIT)
            .filter_map(|pair| pair[1].parse::<u64>().ok())
            .map(Duration::from_secs)
            .sum()
    }

    /// Number of `start`/`start_run` commands.
    pub fn run_count(&self) -> usize {
        self.steps()
            .map(|steps| {
                steps
                    .iter()
                    .filter(|step| matches!(step.command_name(), Some("start" | "start_run")))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Command names not in [`KNOWN_COMMANDS`].
    pub fn unknown_commands(&self) -> AppResult<Vec<String>> {
        Ok(self
            .steps()?
            .into_iter()
            .filter_map(|step| match step {
                Step::Command { name, .. } if !KNOWN_COMMANDS.contains(&name.as_str()) => {
                    Some(name)
                }
                _ => None,
            })
            .collect())
    }
}

impl fmt::Display for CommandScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tokens.join(" "))
    }
}

/// Teardown commands among the steps after `from` (exclusive of `from` itself).
pub fn pending_teardown(steps: &[Step], from: usize) -> Vec<Step> {
    steps
        .iter()
        .skip(from + 1)
        .filter(|step| step.is_teardown())
        .cloned()
        .collect()
}

fn is_integer(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit())
}

/// A flag never takes `wait`, another flag or a known command as its value.
fn is_flag_value(token: &str) -> bool {
    token != WAIT && !token.starts_with("--") && !KNOWN_COMMANDS.contains(&token)
}
