//! Phase vocabulary and the per-phase outcome record.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single named step in the verification pipeline.
///
/// Which phases a subject records depends on its kind, but every phase is
/// drawn from this fixed vocabulary. The serialized form matches the report
/// keys (`runFromBuildOutput`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Scaffold an app from the project template (TemplateApp only).
    Create,
    /// Regenerate the build tree via the build-system generator.
    Generate,
    /// Build via the native build driver.
    Build,
    /// Package via the framework's packaging script.
    Package,
    /// Launch the binary from the build tree.
    RunFromBuildOutput,
    /// Launch the binary from the packaged output.
    RunFromPackagedOutput,
    /// Open the subject's descriptor with the editor from the framework tree.
    OpenWithEditorBuildOutput,
    /// Open the subject's descriptor with the editor bundled in a packaged app.
    OpenWithEditorPackagedApp,
    /// Launch the editor from the framework release (Editor subject only).
    RunFromFrameworkRelease,
}

impl Phase {
    /// The report key for this phase.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Generate => "generate",
            Self::Build => "build",
            Self::Package => "package",
            Self::RunFromBuildOutput => "runFromBuildOutput",
            Self::RunFromPackagedOutput => "runFromPackagedOutput",
            Self::OpenWithEditorBuildOutput => "openWithEditorBuildOutput",
            Self::OpenWithEditorPackagedApp => "openWithEditorPackagedApp",
            Self::RunFromFrameworkRelease => "runFromFrameworkRelease",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Outcome of one phase against one subject.
///
/// `exit_code` is stored only on failure: successful termination by the
/// harness has no meaningful exit code to preserve. `stdout`/`stderr` are
/// pruned from the final report for successful phases unless the operator
/// requested full logs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unexpected_libraries: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl PhaseResult {
    /// Result of a capture-only phase (generate, build, package, create).
    #[must_use]
    pub fn from_capture(success: bool, stdout: String, stderr: String) -> Self {
        Self {
            success,
            stdout: Some(stdout),
            stderr: Some(stderr),
            unexpected_libraries: None,
            exit_code: None,
        }
    }

    /// Result of a run phase, carrying the audit outcome.
    ///
    /// The exit code is recorded only when the phase failed.
    #[must_use]
    pub fn from_run(
        success: bool,
        stdout: String,
        stderr: String,
        unexpected_libraries: Vec<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self {
            success,
            stdout: Some(stdout),
            stderr: Some(stderr),
            unexpected_libraries: Some(unexpected_libraries),
            exit_code: if success { None } else { exit_code },
        }
    }

    /// A failed phase whose child could not even be spawned.
    #[must_use]
    pub fn from_failure(detail: String) -> Self {
        Self {
            success: false,
            stdout: Some(String::new()),
            stderr: Some(detail),
            unexpected_libraries: None,
            exit_code: None,
        }
    }

    /// Whether the audit found nothing unexpected.
    ///
    /// `None` when this phase carries no audit result at all.
    #[must_use]
    pub fn libs_clean(&self) -> Option<bool> {
        self.unexpected_libraries
            .as_ref()
            .map(|libs| libs.is_empty())
    }

    /// Drop captured logs; applied to successful phases in the final report.
    pub fn prune_logs(&mut self) {
        self.stdout = None;
        self.stderr = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_keys_match_report_vocabulary() {
        assert_eq!(Phase::RunFromBuildOutput.key(), "runFromBuildOutput");
        assert_eq!(
            Phase::OpenWithEditorPackagedApp.key(),
            "openWithEditorPackagedApp"
        );
        assert_eq!(Phase::Create.key(), "create");
    }

    #[test]
    fn phase_serializes_to_key() {
        let json = serde_json::to_string(&Phase::RunFromFrameworkRelease).unwrap();
        assert_eq!(json, "\"runFromFrameworkRelease\"");
    }

    #[test]
    fn exit_code_only_stored_on_failure() {
        let ok = PhaseResult::from_run(true, String::new(), String::new(), vec![], Some(0));
        assert_eq!(ok.exit_code, None);

        let failed = PhaseResult::from_run(false, String::new(), String::new(), vec![], Some(134));
        assert_eq!(failed.exit_code, Some(134));
    }

    #[test]
    fn libs_clean_reflects_audit_result() {
        let no_audit = PhaseResult::from_capture(true, String::new(), String::new());
        assert_eq!(no_audit.libs_clean(), None);

        let clean = PhaseResult::from_run(true, String::new(), String::new(), vec![], None);
        assert_eq!(clean.libs_clean(), Some(true));

        let dirty = PhaseResult::from_run(
            true,
            String::new(),
            String::new(),
            vec!["/opt/vendor/lib/libsecretsauce.so.1".to_owned()],
            None,
        );
        assert_eq!(dirty.libs_clean(), Some(false));
    }

    #[test]
    fn pruned_fields_are_omitted_from_json() {
        let mut result = PhaseResult::from_run(true, "out".into(), "err".into(), vec![], None);
        result.prune_logs();
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("stdout").is_none());
        assert!(json.get("stderr").is_none());
        assert_eq!(json["unexpectedLibraries"], serde_json::json!([]));
    }
}
