//! # DAQ Integration Test Harness
//!
//! This crate drives end-to-end integration tests of a distributed data-acquisition
//! system. The DAQ applications, the run-control tool and the configuration generator
//! are external programs; the harness only starts them and inspects what they leave
//! behind (log files and HDF5 data files).
//!
//! ## Crate Structure
//!
//! - **`config`**: Harness configuration loaded with `figment` from
//!   `config/integtest.toml` and `DAQ_INTEGTEST_*` environment variables, plus the
//!   explicit [`config::HarnessOptions`] run-variant switches.
//! - **`error`**: The `IntegtestError` enum for infrastructure failures.
//! - **`logging`**: `tracing-subscriber` setup (pretty, compact or JSON output).
//! - **`script`**: `CommandScript`, the token sequence replayed against the run-control
//!   tool, and its typed `Step`s.
//! - **`executor`**: The `RunControl` seam and `ProcessRunControl`, which spawns the
//!   tool in batch or stepwise mode.
//! - **`harness`**: `IntegrationRun`, the fixture that prepares a run directory,
//!   generates the configuration, runs the script and collects artifacts.
//! - **`log_checks`**: Scanning log files for unsuppressed errors and warnings.
//! - **`data_file`**: The read model of HDF5 data files and the checks over them.
//! - **`scenario`**: The declared integration tests.
//! - **`report`**: Test outcomes, banners and JSON run reports.
//!
//! ## Example
//!
//! ```no_run
//! use daq_integtest::config::{HarnessConfig, HarnessOptions};
//! use daq_integtest::harness::IntegrationRun;
//! use daq_integtest::scenario;
//!
//! let config = HarnessConfig::load()?;
//! let options = HarnessOptions::from_env();
//! let scenario = scenario::find("fake_data_producer")?;
//! let run = IntegrationRun::new(config);
//! for label in scenario.labels() {
//!     let report = run.run_and_verify(scenario.as_ref(), label, &options)?;
//!     assert!(report.passed());
//! }
//! # Ok::<(), daq_integtest::error::IntegtestError>(())
//! ```

pub mod config;
pub mod data_file;
pub mod error;
pub mod executor;
pub mod harness;
pub mod log_checks;
pub mod logging;
pub mod report;
pub mod scenario;
pub mod script;

pub use config::{HarnessConfig, HarnessOptions};
pub use error::{AppResult, IntegtestError};
pub use harness::{IntegrationRun, RunResult};
pub use scenario::{RunConfig, Scenario};
pub use script::CommandScript;
