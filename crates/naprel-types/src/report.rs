//! The run-level report document and the overall-success predicate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::phase::PhaseResult;
use crate::subjects::{DemoResults, EditorResults, MiscResults, TemplateAppResults};

/// Name of the structured report written at end of run.
pub const REPORT_FILENAME: &str = "report.json";

/// Header carried at the top of the report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunHeader {
    /// Overall success of the run.
    pub success: bool,
    /// Run duration, formatted `MMmSSs`.
    pub duration: String,
    /// Run start timestamp at minute granularity.
    pub start_time: String,
    /// Absolute path to the framework release under test.
    pub framework_path: String,
    /// Build metadata read from the release's build-info descriptor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_build_info: Option<serde_json::Value>,
    /// Non-fatal anomalies accumulated over the run.
    pub warnings: Vec<String>,
    /// Apps excluded from testing by the operator.
    pub excluded: Vec<String>,
}

/// The complete results tree for one verification run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub run: RunHeader,
    pub demos: BTreeMap<String, DemoResults>,
    pub template_app: TemplateAppResults,
    pub editor: EditorResults,
    pub misc: MiscResults,
}

/// Present and successful.
fn phase_ok(slot: &Option<PhaseResult>) -> bool {
    slot.as_ref().is_some_and(|p| p.success)
}

/// Present, successful, and (when the operator opted in) with a clean audit.
fn run_phase_ok(slot: &Option<PhaseResult>, fail_on_unexpected_libs: bool) -> bool {
    let Some(phase) = slot.as_ref() else {
        return false;
    };
    if !phase.success {
        return false;
    }
    if fail_on_unexpected_libs && phase.libs_clean() == Some(false) {
        return false;
    }
    true
}

impl Report {
    /// The overall-success predicate: pure over the results tree.
    ///
    /// Every phase recorded for every subject must have succeeded; absence
    /// of a required phase counts as failure. Unexpected-library findings
    /// are fatal only when `fail_on_unexpected_libs` is set.
    #[must_use]
    pub fn overall_success(&self, fail_on_unexpected_libs: bool) -> bool {
        for demo in self.demos.values() {
            if !phase_ok(&demo.generate)
                || !phase_ok(&demo.build)
                || !phase_ok(&demo.package)
                || !run_phase_ok(&demo.run_from_build_output, fail_on_unexpected_libs)
                || !run_phase_ok(&demo.run_from_packaged_output, fail_on_unexpected_libs)
                || !phase_ok(&demo.open_with_editor_build_output)
                || !phase_ok(&demo.open_with_editor_packaged_app)
            {
                return false;
            }
        }

        let template = &self.template_app;
        if !phase_ok(&template.create)
            || !phase_ok(&template.generate)
            || !phase_ok(&template.build)
            || !phase_ok(&template.package)
            || !run_phase_ok(&template.run_from_build_output, fail_on_unexpected_libs)
            || !run_phase_ok(&template.run_from_packaged_output, fail_on_unexpected_libs)
            || !phase_ok(&template.open_with_editor_build_output)
            || !phase_ok(&template.open_with_editor_packaged_app)
        {
            return false;
        }

        let other = &self.misc.other_build_type;
        if !phase_ok(&other.generate)
            || !phase_ok(&other.build)
            || !run_phase_ok(&other.run_from_build_output, fail_on_unexpected_libs)
        {
            return false;
        }

        let no_editor = &self.misc.packaged_without_editor;
        if !phase_ok(&no_editor.package)
            || !run_phase_ok(&no_editor.run_from_packaged_output, fail_on_unexpected_libs)
        {
            return false;
        }

        let editor = &self.editor;
        if !run_phase_ok(&editor.run_from_framework_release, fail_on_unexpected_libs)
            || !run_phase_ok(&editor.run_from_packaged_output, fail_on_unexpected_libs)
        {
            return false;
        }

        true
    }

    /// Strip captured logs from every successful phase.
    ///
    /// Failing phases always retain their logs. No-op when the operator
    /// forced full log retention.
    pub fn prune_logs(&mut self, force_full_logs: bool) {
        if force_full_logs {
            return;
        }
        for demo in self.demos.values_mut() {
            demo.prune_successful_logs();
        }
        self.template_app.prune_successful_logs();
        self.editor.prune_successful_logs();
        self.misc.other_build_type.prune_successful_logs();
        self.misc.packaged_without_editor.prune_successful_logs();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass() -> Option<PhaseResult> {
        Some(PhaseResult::from_capture(true, String::new(), String::new()))
    }

    fn pass_run(unexpected: Vec<String>) -> Option<PhaseResult> {
        Some(PhaseResult::from_run(
            true,
            String::new(),
            String::new(),
            unexpected,
            None,
        ))
    }

    fn fully_passing_report() -> Report {
        let demo = DemoResults {
            generate: pass(),
            build: pass(),
            package: pass(),
            run_from_build_output: pass_run(vec![]),
            run_from_packaged_output: pass_run(vec![]),
            open_with_editor_build_output: pass(),
            open_with_editor_packaged_app: pass(),
        };
        let mut demos = BTreeMap::new();
        demos.insert("HelloVulkan".to_owned(), demo);

        Report {
            run: RunHeader::default(),
            demos,
            template_app: TemplateAppResults {
                create: pass(),
                generate: pass(),
                build: pass(),
                package: pass(),
                run_from_build_output: pass_run(vec![]),
                run_from_packaged_output: pass_run(vec![]),
                open_with_editor_build_output: pass(),
                open_with_editor_packaged_app: pass(),
            },
            editor: EditorResults {
                run_from_framework_release: pass_run(vec![]),
                run_from_packaged_output: pass_run(vec![]),
            },
            misc: MiscResults {
                other_build_type: crate::subjects::OtherBuildTypeResults {
                    demo_name: Some("HelloVulkan".to_owned()),
                    build_type: Some("Debug".to_owned()),
                    generate: pass(),
                    build: pass(),
                    run_from_build_output: pass_run(vec![]),
                },
                packaged_without_editor: crate::subjects::PackagedWithoutEditorResults {
                    name: Some("HelloVulkan".to_owned()),
                    package: pass(),
                    run_from_packaged_output: pass_run(vec![]),
                },
            },
        }
    }

    #[test]
    fn fully_passing_tree_is_success() {
        assert!(fully_passing_report().overall_success(false));
        assert!(fully_passing_report().overall_success(true));
    }

    #[test]
    fn absent_phase_is_failure() {
        let mut report = fully_passing_report();
        report
            .demos
            .get_mut("HelloVulkan")
            .unwrap()
            .run_from_packaged_output = None;
        assert!(!report.overall_success(false));
    }

    #[test]
    fn success_is_monotone_in_phase_outcomes() {
        // Flipping any single phase to failure can never turn an overall
        // failure into a success.
        let mut report = fully_passing_report();
        assert!(report.overall_success(false));
        report.template_app.build.as_mut().unwrap().success = false;
        assert!(!report.overall_success(false));
        // Flipping a second phase cannot recover success.
        report.editor.run_from_packaged_output.as_mut().unwrap().success = false;
        assert!(!report.overall_success(false));
    }

    #[test]
    fn unexpected_libs_fatal_only_when_opted_in() {
        let mut report = fully_passing_report();
        report
            .demos
            .get_mut("HelloVulkan")
            .unwrap()
            .run_from_build_output =
            pass_run(vec!["/opt/vendor/lib/libsecretsauce.so.1".to_owned()]);

        assert!(report.overall_success(false));
        assert!(!report.overall_success(true));
    }

    #[test]
    fn editor_open_phases_gate_success() {
        let mut report = fully_passing_report();
        report
            .demos
            .get_mut("HelloVulkan")
            .unwrap()
            .open_with_editor_build_output
            .as_mut()
            .unwrap()
            .success = false;
        assert!(!report.overall_success(false));
    }

    #[test]
    fn pruning_respects_force_full_logs() {
        let mut pruned = fully_passing_report();
        pruned.prune_logs(false);
        let demo = &pruned.demos["HelloVulkan"];
        assert_eq!(demo.generate.as_ref().unwrap().stdout, None);

        let mut retained = fully_passing_report();
        retained.prune_logs(true);
        let demo = &retained.demos["HelloVulkan"];
        assert!(demo.generate.as_ref().unwrap().stdout.is_some());
    }

    #[test]
    fn failing_phase_retains_logs_after_pruning() {
        let mut report = fully_passing_report();
        report.demos.get_mut("HelloVulkan").unwrap().build =
            Some(PhaseResult::from_capture(false, "out".into(), "err".into()));
        report.prune_logs(false);
        let build = report.demos["HelloVulkan"].build.as_ref().unwrap();
        assert_eq!(build.stdout, Some("out".to_owned()));
        assert_eq!(build.stderr, Some("err".to_owned()));
    }

    #[test]
    fn report_serializes_with_camel_case_header() {
        let report = fully_passing_report();
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["run"].get("startTime").is_some());
        assert!(json["run"].get("frameworkPath").is_some());
        assert!(json["templateApp"].is_object());
        assert!(json["demos"]["HelloVulkan"]["runFromBuildOutput"].is_object());
    }

    #[test]
    fn empty_demo_map_does_not_vacuously_fail() {
        let mut report = fully_passing_report();
        report.demos.clear();
        // No demos recorded: the remaining subjects decide the outcome.
        assert!(report.overall_success(false));
    }
}
