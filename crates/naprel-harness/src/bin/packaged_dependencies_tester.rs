//! Crude dependencies testing on a NAP framework release.
//!
//! Drives an extracted release through generate → build → package → run →
//! editor phases and audits every dynamic library the launched binaries
//! load. Exit code is 0 iff every recorded phase succeeded.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use naprel_harness::interrupt;
use naprel_harness::orchestrator::{Harness, RunOptions};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "packaged_dependencies_tester")]
#[command(about = "Dependency-test a packaged NAP framework release")]
#[command(version)]
struct Cli {
    /// The framework path to test against.
    nap_framework_path: PathBuf,

    /// Directory to test on, relative to the framework root.
    #[arg(long, default_value = "demos")]
    testing_apps_dir: String,

    /// Don't create a JSON report to report.json.
    #[arg(short = 'n', long)]
    no_json_report: bool,

    /// If reporting to JSON, include STDOUT and STDERR even if there has
    /// been no issue.
    #[arg(long)]
    force_log_reporting: bool,

    /// Don't create dummy apps for modules that aren't represented in any
    /// demos.
    #[arg(long)]
    no_dummy_apps: bool,

    /// Apps that are excluded from testing.
    #[arg(long, value_name = "APP", num_args = 1..)]
    exclude_apps: Vec<String>,

    /// Fail the test run if unexpected libraries are encountered.
    #[arg(long)]
    fail_on_unexpected_libs: bool,

    /// JSON file replacing the built-in library-audit policy.
    #[arg(long, value_name = "FILE")]
    library_policy: Option<PathBuf>,

    /// Don't rename the NAP framework while testing packaged apps.
    #[cfg(not(windows))]
    #[arg(long)]
    no_rename_framework: bool,

    /// Don't attempt to rename the Qt library dir pointed to by QT_DIR
    /// while testing packaged apps.
    #[cfg(not(windows))]
    #[arg(long)]
    no_rename_qt: bool,
}

impl Cli {
    fn rename_framework(&self) -> bool {
        #[cfg(not(windows))]
        {
            !self.no_rename_framework
        }
        #[cfg(windows)]
        {
            false
        }
    }

    fn rename_qt(&self) -> bool {
        #[cfg(not(windows))]
        {
            !self.no_rename_qt
        }
        #[cfg(windows)]
        {
            false
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut options = RunOptions::new(cli.nap_framework_path.clone());
    options.testing_apps_dir = cli.testing_apps_dir.clone();
    options.create_json_report = !cli.no_json_report;
    options.force_log_reporting = cli.force_log_reporting;
    options.synthesize_dummy_apps = !cli.no_dummy_apps;
    options.excluded_apps = cli.exclude_apps.clone();
    options.fail_on_unexpected_libs = cli.fail_on_unexpected_libs;
    options.rename_framework = cli.rename_framework();
    options.rename_qt = cli.rename_qt();
    options.library_policy_file = cli.library_policy.clone();

    // Operator-input errors surface here, before any work is done.
    let mut harness = match Harness::new(options) {
        Ok(harness) => harness,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };

    interrupt::install_handler();

    match harness.execute() {
        Ok(report) if report.run.success => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
