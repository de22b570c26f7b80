//! The phase orchestrator: drives a freshly built framework release through
//! the complete user lifecycle.
//!
//! Phases are strictly sequential. Every phase writes into the results
//! tree; every phase skips its work when its declared prerequisite failed.
//! Child failures and audit findings are captured, never propagated: they
//! are the point of the tool. Only external interruption aborts the
//! sequence, and even then the rename scopes and packaged artefacts are
//! cleaned up first.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use naprel_error::{NaprelError, Result};
use naprel_types::{
    DemoResults, PhaseResult, Report, TemplateAppResults, REPORT_FILENAME,
};
use tracing::{error, info, warn};

use crate::apps::{self, APP_FILENAME, DEFAULT_TESTING_APPS_DIR, TEMPLATE_APP_NAME};
use crate::interrupt;
use crate::platform::{CommandSpec, PlatformProfile};
use crate::policy::LibraryPolicy;
use crate::process::{self, RunRequest};
use crate::pulse;
use crate::rename::{self, RenameScope, QT_DIR_ENV};
use crate::report;

/// Build type used for the bulk of the testing.
pub const APP_BUILD_TYPE: &str = "Release";

/// Build-info descriptor expected inside a valid framework release.
const BUILD_INFO_PATH: &[&str] = &["cmake", "build_info.json"];

/// Directory name of the editor inside the framework tree and packages.
const EDITOR_DIR_NAME: &str = "napkin";

/// Prefix of transient staging directories left behind by the packaging
/// script when it fails mid-way.
const PACKAGING_STAGING_PREFIX: &str = "packaging_";

/// Operator-facing knobs for one verification run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub framework_path: PathBuf,
    pub testing_apps_dir: String,
    pub create_json_report: bool,
    pub force_log_reporting: bool,
    pub synthesize_dummy_apps: bool,
    pub excluded_apps: Vec<String>,
    pub fail_on_unexpected_libs: bool,
    pub rename_framework: bool,
    pub rename_qt: bool,
    pub library_policy_file: Option<PathBuf>,
    /// Where packaged artefacts are parked and the report is written.
    /// Defaults to the invocation directory.
    pub output_dir: Option<PathBuf>,
}

impl RunOptions {
    #[must_use]
    pub fn new(framework_path: PathBuf) -> Self {
        Self {
            framework_path,
            testing_apps_dir: DEFAULT_TESTING_APPS_DIR.to_owned(),
            create_json_report: true,
            force_log_reporting: false,
            synthesize_dummy_apps: true,
            excluded_apps: Vec::new(),
            fail_on_unexpected_libs: false,
            rename_framework: true,
            rename_qt: true,
            library_policy_file: None,
            output_dir: None,
        }
    }
}

/// One verification run against one framework release.
pub struct Harness {
    options: RunOptions,
    profile: PlatformProfile,
    policy: LibraryPolicy,
    framework_root: PathBuf,
    root_output_dir: PathBuf,
    timestamp: String,
    build_info: serde_json::Value,
    warnings: Vec<String>,
    phase_counter: u32,
}

impl Harness {
    /// Validate the options and load startup state. All operator-input
    /// errors surface here, before any work is done.
    pub fn new(mut options: RunOptions) -> Result<Self> {
        Self::with_profile(PlatformProfile::host(), &mut options)
    }

    /// Startup with an explicit platform profile.
    fn with_profile(profile: PlatformProfile, options: &mut RunOptions) -> Result<Self> {
        if !options.framework_path.exists() {
            return Err(NaprelError::FrameworkNotFound {
                path: options.framework_path.clone(),
            });
        }
        let framework_root = options.framework_path.canonicalize()?;

        let build_info_path = BUILD_INFO_PATH
            .iter()
            .fold(framework_root.clone(), |p, seg| p.join(seg));
        if !build_info_path.exists() {
            return Err(NaprelError::InvalidFrameworkRelease {
                path: options.framework_path.clone(),
                missing: BUILD_INFO_PATH.join("/"),
            });
        }
        let build_info = apps::read_json(&build_info_path)?;

        if options.testing_apps_dir.trim().is_empty() {
            return Err(NaprelError::InvalidArguments {
                reason: "testing apps directory must not be empty".to_owned(),
            });
        }

        // The rename trick is not available on Windows.
        if !profile.supports_rename_scopes() {
            options.rename_framework = false;
            options.rename_qt = false;
        }

        let policy = match &options.library_policy_file {
            Some(path) => LibraryPolicy::from_file(path)?,
            None => LibraryPolicy::builtin(profile.platform(), profile.arch())?,
        };

        let root_output_dir = match &options.output_dir {
            Some(dir) => dir.clone(),
            None => env::current_dir()?,
        };

        Ok(Self {
            options: options.clone(),
            profile,
            policy,
            framework_root,
            root_output_dir,
            timestamp: chrono::Local::now().format("%Y.%m.%dT%H.%M").to_string(),
            build_info,
            warnings: Vec::new(),
            phase_counter: 0,
        })
    }

    #[must_use]
    pub fn framework_root(&self) -> &Path {
        &self.framework_root
    }

    /// Run all phases, clean up, emit the report, and return the completed
    /// results tree. Returns `Err(Interrupted)` after unwinding when the
    /// operator interrupted the run.
    pub fn execute(&mut self) -> Result<Report> {
        let started = Instant::now();
        let mut report = Report::default();
        report.run.start_time = self.timestamp.clone();
        report.run.framework_path = self.framework_root.display().to_string();
        report.run.excluded = self.options.excluded_apps.clone();
        report.run.framework_build_info = Some(self.build_info.clone());

        self.preflight_warnings();

        let mut qt_scope: Option<RenameScope> = None;
        let mut framework_scope: Option<RenameScope> = None;
        let mut pulse_running = false;

        let outcome = self.run_phases(
            &mut report,
            &mut qt_scope,
            &mut framework_scope,
            &mut pulse_running,
        );

        // Cleanup runs on every path, interruption included.
        self.banner("Clean up");
        self.remove_packaged_artifacts(&report);
        if pulse_running {
            pulse::kill();
        }
        if let Some(scope) = framework_scope.as_mut() {
            info!("* Renaming NAP framework back");
            scope.restore();
        }
        if let Some(scope) = qt_scope.as_mut() {
            info!("* Renaming Qt directory back");
            scope.restore();
        }
        self.sweep_staging_directories(&report);

        let elapsed = started.elapsed().as_secs();
        report.run.duration = format!("{:02}m{:02}s", elapsed / 60, elapsed % 60);
        report.run.success = report.overall_success(self.options.fail_on_unexpected_libs);
        report.run.warnings = self.warnings.clone();

        if self.options.create_json_report {
            self.banner("Creating JSON report");
            let mut document = report.clone();
            document.prune_logs(self.options.force_log_reporting);
            report::write_report(&document, &self.root_output_dir.join(REPORT_FILENAME))?;
        }

        // Even a partial (interrupted) run gets its summary and report.
        info!("============ Summary ============");
        let show_libs = self.profile.audits_live() || self.profile.audits_post_mortem();
        print!("{}", report::render_summary(&report, show_libs));
        if self.options.create_json_report {
            println!("Report: {REPORT_FILENAME}");
        }
        println!("Duration: {}", report.run.duration);
        self.print_epilogue(&report);

        outcome?;
        Ok(report)
    }

    fn print_epilogue(&self, report: &Report) {
        let label = self.options.framework_path.display();
        if report.run.success && self.warnings.is_empty() {
            println!("{label} passed all tests");
        } else if report.run.success {
            println!("{label} passed all tests, with warnings");
            println!("Warnings:");
            for warning in &self.warnings {
                println!("- {warning}");
            }
        } else {
            eprintln!("Error: {label} has issues");
        }
    }

    fn preflight_warnings(&mut self) {
        if self
            .framework_root
            .join("apps")
            .join(TEMPLATE_APP_NAME)
            .exists()
        {
            warn!(
                "Template app already exists at {} and will be replaced",
                self.framework_root
                    .join("apps")
                    .join(TEMPLATE_APP_NAME)
                    .display()
            );
        }

        if !self.profile.supports_rename_scopes() {
            return;
        }

        if !self.options.rename_framework {
            self.record_warning(
                "Not renaming NAP framework may result in missing dependencies not being detected"
                    .to_owned(),
            );
        }
        if !self.options.rename_qt {
            self.record_warning(
                "Not renaming Qt may result in missing dependencies not being detected".to_owned(),
            );
        } else {
            match env::var_os(QT_DIR_ENV) {
                None => self.record_warning(format!(
                    "Env. variable {QT_DIR_ENV} not defined. Not renaming Qt may result in \
                     missing dependencies not being detected."
                )),
                Some(pointer) if !PathBuf::from(&pointer).exists() => self.record_warning(format!(
                    "Qt does not exist at path pointed to by {QT_DIR_ENV} env. variable. Not \
                     renaming Qt may result in missing dependencies not being detected."
                )),
                Some(_) => {}
            }
        }
    }

    fn record_warning(&mut self, warning: String) {
        warn!("{warning}");
        self.warnings.push(warning);
    }

    fn banner(&mut self, label: &str) {
        self.phase_counter += 1;
        info!(
            "============ Phase #{} - {label} ============",
            self.phase_counter
        );
    }

    fn ensure_not_interrupted(&self) -> Result<()> {
        if interrupt::requested() {
            Err(NaprelError::Interrupted)
        } else {
            Ok(())
        }
    }

    fn testing_apps_root(&self) -> PathBuf {
        self.framework_root.join(&self.options.testing_apps_dir)
    }

    fn template_app_dir(&self) -> PathBuf {
        self.framework_root.join("apps").join(TEMPLATE_APP_NAME)
    }

    fn editor_release_dir(&self) -> PathBuf {
        self.framework_root.join("tools").join(EDITOR_DIR_NAME)
    }

    /// Where a packaged app is parked for the duration of the run.
    fn packaged_dir(&self, app_name: &str, with_editor: bool) -> PathBuf {
        self.root_output_dir
            .join(packaged_dir_name(app_name, &self.timestamp, with_editor))
    }

    // ─── Phase sequence ─────────────────────────────────────────────────

    #[allow(clippy::too_many_lines)]
    fn run_phases(
        &mut self,
        report: &mut Report,
        qt_scope: &mut Option<RenameScope>,
        framework_scope: &mut Option<RenameScope>,
        pulse_running: &mut bool,
    ) -> Result<()> {
        let testing_root = self.testing_apps_root();

        // Dummy apps for modules no demo exercises.
        if self.options.synthesize_dummy_apps {
            self.banner("Dummy app creation");
            if let Err(err) = apps::synthesize_dummy_apps(
                &self.profile,
                &self.framework_root,
                &self.options.testing_apps_dir,
                &mut self.warnings,
            ) {
                self.record_warning(format!("Dummy app synthesis failed: {err}"));
            }
        }

        // Configure, build and package every demo.
        self.banner("Building and packaging demos");
        let skip_template = self.options.testing_apps_dir != DEFAULT_TESTING_APPS_DIR;
        let demos =
            apps::discover_demos(&testing_root, &self.options.excluded_apps, skip_template)?;
        for app in &self.options.excluded_apps {
            info!("Excluding app: {app}");
        }
        for name in &demos {
            self.ensure_not_interrupted()?;
            info!("Demo: {name}");
            let app_dir = testing_root.join(name);
            let mut results = DemoResults::default();

            results.generate = Some(self.regenerate_app(&app_dir, APP_BUILD_TYPE));
            if results.generate.as_ref().is_some_and(|p| p.success) {
                results.build = Some(self.build_app(&app_dir, name, APP_BUILD_TYPE));
                if results.built() {
                    results.package = Some(self.package_app(&app_dir, name, true));
                }
            }
            report.demos.insert(name.clone(), results);
        }

        // Package one healthy demo without the editor.
        self.banner("Packaging demo without editor");
        let no_editor_vehicle = report
            .demos
            .iter()
            .find(|(_, demo)| demo.packaged())
            .map(|(name, _)| name.clone());
        match no_editor_vehicle {
            Some(name) => {
                info!("Demo: {name}");
                report.misc.packaged_without_editor.name = Some(name.clone());
                let result = self.package_app(&testing_root.join(&name), &name, false);
                report.misc.packaged_without_editor.package = Some(result);
            }
            None => error!("no demo found to package without the editor"),
        }

        // Scaffold, build and package the template app; each step gates
        // the next.
        self.banner("Creating, building and packaging app from template");
        self.ensure_not_interrupted()?;
        report.template_app = self.template_app_phases();

        // One demo in the non-default configuration.
        let other_build_type = if APP_BUILD_TYPE == "Release" {
            "Debug"
        } else {
            "Release"
        };
        self.banner(&format!(
            "Building demo as {}",
            other_build_type.to_lowercase()
        ));
        // Prefer a demo shipping its own module, to exercise module builds
        // under this configuration too.
        let mut other_vehicle = None;
        for name in &demos {
            other_vehicle = Some(name.clone());
            if testing_root.join(name).join("module").is_dir() {
                break;
            }
        }
        let other = &mut report.misc.other_build_type;
        if let Some(name) = other_vehicle {
            info!("Demo: {name}");
            let app_dir = testing_root.join(&name);
            other.demo_name = Some(name.clone());
            other.build_type = Some(other_build_type.to_owned());
            other.generate = Some(self.regenerate_app(&app_dir, other_build_type));
            if other.generate.as_ref().is_some_and(|p| p.success) {
                other.build = Some(self.build_app(&app_dir, &name, other_build_type));
            }
        } else {
            error!("didn't find a demo for the {other_build_type} build type");
        }

        // Root runs need their own audio server for the run phases.
        if pulse::is_linux_root() {
            pulse::launch();
            *pulse_running = true;
        }

        // Run everything that built, from the build trees.
        self.banner("Running demos from build output directory");
        for (name, demo) in &mut report.demos {
            self.ensure_not_interrupted()?;
            if !demo.built() {
                continue;
            }
            info!("Demo: {name}");
            demo.run_from_build_output =
                Some(self.run_built_app(&testing_root.join(name), name, APP_BUILD_TYPE)?);
        }

        self.banner("Running template app from build output directory");
        if report.template_app.built() {
            report.template_app.run_from_build_output = Some(self.run_built_app(
                &self.template_app_dir(),
                TEMPLATE_APP_NAME,
                APP_BUILD_TYPE,
            )?);
        } else {
            info!("Skipping due to build failure");
        }

        self.banner(&format!(
            "Running {} build type demo",
            other_build_type.to_lowercase()
        ));
        if report.misc.other_build_type.built() {
            let name = report
                .misc
                .other_build_type
                .demo_name
                .clone()
                .unwrap_or_default();
            report.misc.other_build_type.run_from_build_output =
                Some(self.run_built_app(&testing_root.join(&name), &name, other_build_type)?);
        } else {
            info!("Skipping due to build failure");
        }

        // Hide the Qt toolkit for the editor phases onward.
        if self.options.rename_qt {
            match rename::discover_qt_root() {
                Some(qt_root) => {
                    info!("* Renaming Qt directory");
                    let mut scope = RenameScope::new(qt_root);
                    scope.apply(&mut self.warnings);
                    *qt_scope = Some(scope);
                }
                None => {
                    // Unset/dangling pointers were warned about up front;
                    // this is the walk coming up empty.
                    if env::var_os(QT_DIR_ENV).is_some_and(|p| PathBuf::from(p).exists()) {
                        self.record_warning(
                            "Couldn't rename Qt due to inability to determine top-level Qt path"
                                .to_owned(),
                        );
                    }
                }
            }
        }

        // Editor from the framework release.
        self.banner("Opening editor from framework release without app");
        let editor_dir = self.editor_release_dir();
        let framework_root = self.framework_root.clone();
        report.editor.run_from_framework_release =
            Some(self.open_editor(&editor_dir, &framework_root, None, false)?);

        self.banner("Opening demos in editor from framework release");
        for (name, demo) in &mut report.demos {
            if !demo.built() {
                continue;
            }
            info!("Demo: {name}");
            info!("- Open with editor from framework release...");
            let descriptor = testing_root.join(name).join(APP_FILENAME);
            demo.open_with_editor_build_output =
                Some(self.open_editor(&editor_dir, &framework_root, Some(&descriptor), false)?);
        }

        self.banner("Opening template app in editor from framework release");
        if report.template_app.built() {
            let descriptor = self.template_app_dir().join(APP_FILENAME);
            report.template_app.open_with_editor_build_output =
                Some(self.open_editor(&editor_dir, &framework_root, Some(&descriptor), false)?);
        } else {
            info!("Skipping due to build failure");
        }

        // Hide the framework itself: packaged outputs must stand alone.
        if self.options.rename_framework {
            info!("* Renaming NAP framework");
            let mut scope = RenameScope::new(self.framework_root.clone());
            scope.apply(&mut self.warnings);
            *framework_scope = Some(scope);
        }

        // Editor from a packaged app.
        self.banner("Opening editor from packaged app without app");
        let editor_vehicle = report
            .demos
            .iter()
            .find(|(_, demo)| demo.packaged())
            .map(|(name, _)| name.clone());
        match &editor_vehicle {
            Some(name) => {
                let containing = self.packaged_dir(name, true);
                report.editor.run_from_packaged_output = Some(self.open_editor(
                    &containing.join(EDITOR_DIR_NAME),
                    &containing,
                    None,
                    true,
                )?);
            }
            None => info!("Failed to find packaged app to test against"),
        }

        self.banner("Opening demos in editor from packaged apps");
        for (name, demo) in &mut report.demos {
            if !demo.packaged() {
                continue;
            }
            info!("Demo: {name}");
            info!("- Open app with editor from packaged app...");
            let containing = self.packaged_dir(name, true);
            let descriptor = containing.join(APP_FILENAME);
            demo.open_with_editor_packaged_app = Some(self.open_editor(
                &containing.join(EDITOR_DIR_NAME),
                &containing,
                Some(&descriptor),
                true,
            )?);
        }

        self.banner("Opening template app in editor from packaged app");
        if report.template_app.packaged() {
            let containing = self.packaged_dir(TEMPLATE_APP_NAME, true);
            let descriptor = containing.join(APP_FILENAME);
            report.template_app.open_with_editor_packaged_app = Some(self.open_editor(
                &containing.join(EDITOR_DIR_NAME),
                &containing,
                Some(&descriptor),
                true,
            )?);
        } else {
            info!("Skipping due to packaging failure");
        }

        // Run the packaged outputs.
        self.banner("Running packaged demos");
        for (name, demo) in &mut report.demos {
            if !demo.packaged() {
                continue;
            }
            info!("Demo: {name}");
            let containing = self.packaged_dir(name, true);
            demo.run_from_packaged_output = Some(self.run_packaged_app(&containing, name)?);
        }

        self.banner("Running packaged template app");
        if report.template_app.packaged() {
            let containing = self.packaged_dir(TEMPLATE_APP_NAME, true);
            report.template_app.run_from_packaged_output =
                Some(self.run_packaged_app(&containing, TEMPLATE_APP_NAME)?);
        } else {
            info!("Skipping due to package failure");
        }

        self.banner("Running demo packaged without editor");
        if report.misc.packaged_without_editor.packaged() {
            let name = report
                .misc
                .packaged_without_editor
                .name
                .clone()
                .unwrap_or_default();
            let containing = self.packaged_dir(&name, false);
            report.misc.packaged_without_editor.run_from_packaged_output =
                Some(self.run_packaged_app(&containing, &name)?);
        } else {
            info!("Skipping due to package failure");
        }

        Ok(())
    }

    fn template_app_phases(&mut self) -> TemplateAppResults {
        let mut results = TemplateAppResults::default();

        let template_dir = self.template_app_dir();
        if template_dir.exists() {
            info!("- Pre-existing template app found, removing");
            if let Err(err) = fs::remove_dir_all(&template_dir) {
                self.record_warning(format!(
                    "Couldn't remove stale template app at {}: {err}",
                    template_dir.display()
                ));
            }
        }

        info!("- Create app from template...");
        let command = self.profile.create_app_command(TEMPLATE_APP_NAME);
        let framework_root = self.framework_root.clone();
        results.create = Some(self.capture_phase(&command, &framework_root));
        if !results.create.as_ref().is_some_and(|p| p.success) {
            return results;
        }

        results.generate = Some(self.regenerate_app(&template_dir, APP_BUILD_TYPE));
        if !results.generate.as_ref().is_some_and(|p| p.success) {
            return results;
        }

        results.build = Some(self.build_app(&template_dir, TEMPLATE_APP_NAME, APP_BUILD_TYPE));
        if !results.built() {
            return results;
        }

        results.package = Some(self.package_app(&template_dir, TEMPLATE_APP_NAME, true));
        results
    }

    // ─── Individual phase actions ───────────────────────────────────────

    /// Run a capture-only command and fold it into a phase result.
    fn capture_phase(&self, command: &CommandSpec, cwd: &Path) -> PhaseResult {
        match process::run_to_completion(command, cwd) {
            Ok((code, stdout, stderr)) => {
                let success = code == 0;
                if !success {
                    error!(
                        command = %command.display(),
                        exit_code = code,
                        stdout = stdout.as_str(),
                        stderr = stderr.as_str(),
                        "command failed"
                    );
                }
                let mut result = PhaseResult::from_capture(success, stdout, stderr);
                if !success {
                    result.exit_code = Some(code);
                }
                result
            }
            Err(err) => {
                error!(command = %command.display(), error = %err, "couldn't run command");
                PhaseResult::from_failure(err.to_string())
            }
        }
    }

    fn regenerate_app(&self, app_dir: &Path, build_type: &str) -> PhaseResult {
        info!("- Regenerating...");
        self.capture_phase(&self.profile.regenerate_command(build_type), app_dir)
    }

    fn build_app(&self, app_dir: &Path, app_name: &str, build_type: &str) -> PhaseResult {
        info!("- Building...");
        let (build_subdir, command) = self.profile.build_command(app_name, build_type);
        self.capture_phase(&command, &app_dir.join(build_subdir))
    }

    /// Package the app in `app_dir` and park the output next to the report.
    fn package_app(&mut self, app_dir: &Path, app_name: &str, with_editor: bool) -> PhaseResult {
        info!(
            "- Packaging ({} editor)...",
            if with_editor { "with" } else { "without" }
        );

        let pre = match apps::list_dir_names(app_dir) {
            Ok(names) => names,
            Err(err) => return PhaseResult::from_failure(err.to_string()),
        };

        let command = self.profile.package_command(with_editor);
        let mut result = self.capture_phase(&command, app_dir);
        if !result.success {
            return result;
        }

        let post = match apps::list_dir_names(app_dir) {
            Ok(names) => names,
            Err(err) => return PhaseResult::from_failure(err.to_string()),
        };
        let Some(output_name) = apps::find_packaged_output(app_name, &pre, &post) else {
            self.record_warning(format!(
                "Couldn't identify packaging output for {app_name}"
            ));
            result.success = false;
            return result;
        };

        let output_path = app_dir.join(output_name);
        if let Err(err) = apps::patch_audio_service_configuration(
            app_dir,
            &output_path,
            app_name,
            &self.framework_root,
        ) {
            warn!(app = app_name, error = %err, "couldn't patch audio configuration");
        }

        let home = self.packaged_dir(app_name, with_editor);
        info!("  Done. Moving to {}.", home.display());
        if let Err(err) = fs::rename(&output_path, &home) {
            self.record_warning(format!(
                "Couldn't move packaged app {} to {}: {err}",
                output_path.display(),
                home.display()
            ));
            result.success = false;
        }
        result
    }

    /// Convert a launched-binary outcome into a phase result, logging the
    /// failure detail the way the live terminal output expects.
    fn run_phase(&self, request: &RunRequest, label: &str) -> Result<PhaseResult> {
        match process::run_until_deadline(&self.profile, &self.policy, request) {
            Ok(outcome) => {
                if outcome.success {
                    info!("  Done.");
                } else {
                    error!(
                        stdout = outcome.stdout.as_str(),
                        stderr = outcome.stderr.as_str(),
                        unexpected_libraries = ?outcome.unexpected_libraries.as_slice(),
                        exit_code = outcome.exit_code,
                        "{label} failed"
                    );
                }
                let unexpected_library_strings = outcome.unexpected_library_strings();
                Ok(PhaseResult::from_run(
                    outcome.success,
                    outcome.stdout,
                    outcome.stderr,
                    unexpected_library_strings,
                    outcome.exit_code,
                ))
            }
            Err(NaprelError::Interrupted) => Err(NaprelError::Interrupted),
            Err(err) => {
                error!(error = %err, "{label} couldn't launch");
                Ok(PhaseResult::from_failure(err.to_string()))
            }
        }
    }

    /// Launch an app binary from its build tree.
    fn run_built_app(
        &self,
        app_dir: &Path,
        app_name: &str,
        build_type: &str,
    ) -> Result<PhaseResult> {
        info!("- Run from build output...");

        let bin_root = app_dir.join("bin");
        let needle = build_type.to_lowercase();
        let bin_subdir = apps::list_dir_names(&bin_root)
            .ok()
            .and_then(|names| names.into_iter().find(|n| n.to_lowercase().contains(&needle)));
        let Some(bin_subdir) = bin_subdir else {
            return Ok(PhaseResult::from_failure(format!(
                "no {build_type} build output under {}",
                bin_root.display()
            )));
        };

        if let Err(err) = apps::patch_audio_service_configuration(
            app_dir,
            app_dir,
            app_name,
            &self.framework_root,
        ) {
            warn!(app = app_name, error = %err, "couldn't patch audio configuration");
        }

        let binary = self
            .profile
            .run_binary_path(&bin_root.join(bin_subdir), app_name);
        let request = RunRequest::new(
            CommandSpec {
                program: binary,
                args: Vec::new(),
            },
            app_dir.to_path_buf(),
            self.profile.run_wait_window(),
        )
        .accepted_root(self.framework_root.clone());

        self.run_phase(&request, "Run from build output")
    }

    /// Launch a packaged app from its self-contained directory.
    fn run_packaged_app(&self, containing_dir: &Path, app_name: &str) -> Result<PhaseResult> {
        info!("- Run from package...");
        let binary = self.profile.run_binary_path(containing_dir, app_name);
        let request = RunRequest::new(
            CommandSpec {
                program: binary,
                args: Vec::new(),
            },
            containing_dir.to_path_buf(),
            self.profile.run_wait_window(),
        )
        .accepted_root(containing_dir.to_path_buf());

        self.run_phase(&request, "Run from package")
    }

    /// Launch the editor, either free-standing (killed after the wait
    /// window) or against a descriptor (expected to exit cleanly on its
    /// own within the editor window).
    fn open_editor(
        &self,
        editor_dir: &Path,
        accepted_root: &Path,
        descriptor: Option<&Path>,
        from_packaged_app: bool,
    ) -> Result<PhaseResult> {
        let binary = self.profile.editor_binary_path(editor_dir);
        let (args, expect_early_exit, wait) = match descriptor {
            None => (
                vec!["--no-project-reopen".to_owned()],
                false,
                self.profile.run_wait_window(),
            ),
            Some(descriptor) => (
                vec![
                    "-p".to_owned(),
                    descriptor.display().to_string(),
                    "--exit-after-load".to_owned(),
                ],
                true,
                self.profile.editor_wait_window(),
            ),
        };

        let opening_packaged_descriptor = from_packaged_app && descriptor.is_some();
        let request = RunRequest::new(
            CommandSpec {
                program: binary,
                args,
            },
            editor_dir.to_path_buf(),
            wait,
        )
        .accepted_root(accepted_root.to_path_buf())
        .expect_early_exit(expect_early_exit)
        .capture_stdout(self.profile.capture_editor_stdout(opening_packaged_descriptor));

        self.run_phase(&request, "Editor")
    }

    // ─── Cleanup ────────────────────────────────────────────────────────

    fn remove_packaged_artifacts(&mut self, report: &Report) {
        let mut targets: Vec<PathBuf> = Vec::new();
        for (name, demo) in &report.demos {
            if demo.packaged() {
                targets.push(self.packaged_dir(name, true));
            }
        }
        if report.misc.packaged_without_editor.packaged() {
            if let Some(name) = report.misc.packaged_without_editor.name.clone() {
                targets.push(self.packaged_dir(&name, false));
            }
        }
        if report.template_app.packaged() {
            targets.push(self.packaged_dir(TEMPLATE_APP_NAME, true));
        }

        for dir in targets {
            if let Err(err) = fs::remove_dir_all(&dir) {
                self.record_warning(format!(
                    "Couldn't remove packaged app at {} during cleanup: {err}",
                    dir.display()
                ));
            }
        }
    }

    /// Remove `packaging_*` staging directories the packaging script leaves
    /// behind when it fails mid-way. Runs after the rename scopes are
    /// restored so the framework paths are valid again.
    fn sweep_staging_directories(&self, report: &Report) {
        let testing_root = self.testing_apps_root();
        let mut app_dirs: Vec<PathBuf> =
            report.demos.keys().map(|n| testing_root.join(n)).collect();
        app_dirs.push(self.template_app_dir());

        for app_dir in app_dirs {
            let Ok(names) = apps::list_dir_names(&app_dir) else {
                continue;
            };
            for name in names {
                if name.starts_with(PACKAGING_STAGING_PREFIX) {
                    let stale = app_dir.join(&name);
                    if let Err(err) = fs::remove_dir_all(&stale) {
                        warn!(path = %stale.display(), error = %err, "couldn't remove staging directory");
                    }
                }
            }
        }
    }
}

/// Per-demo packaged locations, exposed for tests of the naming scheme.
#[must_use]
pub fn packaged_dir_name(app_name: &str, timestamp: &str, with_editor: bool) -> String {
    let suffix = if with_editor { "editor" } else { "no_editor" };
    format!("{app_name}-{timestamp}-{suffix}")
}
