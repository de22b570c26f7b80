//! Per-subject result records.
//!
//! Each subject kind records a fixed set of phases; absence of a phase is
//! equivalent to failure for that phase. A phase slot is `None` when the
//! phase was never attempted (typically because a prerequisite failed).

use serde::{Deserialize, Serialize};

use crate::phase::PhaseResult;

/// Results for one canned demo application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate: Option<PhaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<PhaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<PhaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_from_build_output: Option<PhaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_from_packaged_output: Option<PhaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_with_editor_build_output: Option<PhaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_with_editor_packaged_app: Option<PhaseResult>,
}

impl DemoResults {
    /// Whether the demo built, and so its run phases should be attempted.
    #[must_use]
    pub fn built(&self) -> bool {
        self.build.as_ref().is_some_and(|p| p.success)
    }

    /// Whether the demo packaged, and so its packaged-run phases should be
    /// attempted.
    #[must_use]
    pub fn packaged(&self) -> bool {
        self.package.as_ref().is_some_and(|p| p.success)
    }

    fn each_phase_mut(&mut self, f: &mut impl FnMut(&mut PhaseResult)) {
        for slot in [
            &mut self.generate,
            &mut self.build,
            &mut self.package,
            &mut self.run_from_build_output,
            &mut self.run_from_packaged_output,
            &mut self.open_with_editor_build_output,
            &mut self.open_with_editor_packaged_app,
        ] {
            if let Some(phase) = slot {
                f(phase);
            }
        }
    }

    pub(crate) fn prune_successful_logs(&mut self) {
        self.each_phase_mut(&mut |phase| {
            if phase.success {
                phase.prune_logs();
            }
        });
    }
}

/// Results for the app scaffolded from the project template during the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateAppResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create: Option<PhaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate: Option<PhaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<PhaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<PhaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_from_build_output: Option<PhaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_from_packaged_output: Option<PhaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_with_editor_build_output: Option<PhaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_with_editor_packaged_app: Option<PhaseResult>,
}

impl TemplateAppResults {
    #[must_use]
    pub fn built(&self) -> bool {
        self.build.as_ref().is_some_and(|p| p.success)
    }

    #[must_use]
    pub fn packaged(&self) -> bool {
        self.package.as_ref().is_some_and(|p| p.success)
    }

    pub(crate) fn prune_successful_logs(&mut self) {
        for slot in [
            &mut self.create,
            &mut self.generate,
            &mut self.build,
            &mut self.package,
            &mut self.run_from_build_output,
            &mut self.run_from_packaged_output,
            &mut self.open_with_editor_build_output,
            &mut self.open_with_editor_packaged_app,
        ] {
            if let Some(phase) = slot {
                if phase.success {
                    phase.prune_logs();
                }
            }
        }
    }
}

/// Results for the single demo built in the non-default configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtherBuildTypeResults {
    /// Which demo was used as the vehicle, if one was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demo_name: Option<String>,
    /// The non-default configuration that was exercised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate: Option<PhaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<PhaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_from_build_output: Option<PhaseResult>,
}

impl OtherBuildTypeResults {
    #[must_use]
    pub fn built(&self) -> bool {
        self.build.as_ref().is_some_and(|p| p.success)
    }

    #[must_use]
    pub fn selected(&self) -> bool {
        self.demo_name.is_some()
    }

    pub(crate) fn prune_successful_logs(&mut self) {
        for slot in [&mut self.generate, &mut self.build, &mut self.run_from_build_output] {
            if let Some(phase) = slot {
                if phase.success {
                    phase.prune_logs();
                }
            }
        }
    }
}

/// Results for the single demo packaged without the editor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagedWithoutEditorResults {
    /// Which demo was used as the vehicle, if one was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<PhaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_from_packaged_output: Option<PhaseResult>,
}

impl PackagedWithoutEditorResults {
    #[must_use]
    pub fn packaged(&self) -> bool {
        self.package.as_ref().is_some_and(|p| p.success)
    }

    pub(crate) fn prune_successful_logs(&mut self) {
        for slot in [&mut self.package, &mut self.run_from_packaged_output] {
            if let Some(phase) = slot {
                if phase.success {
                    phase.prune_logs();
                }
            }
        }
    }
}

/// Results for the editor run standalone.
///
/// Per-app editor results (opening each descriptor) live on the app's own
/// record under the `openWithEditor*` phases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_from_framework_release: Option<PhaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_from_packaged_output: Option<PhaseResult>,
}

impl EditorResults {
    pub(crate) fn prune_successful_logs(&mut self) {
        for slot in [
            &mut self.run_from_framework_release,
            &mut self.run_from_packaged_output,
        ] {
            if let Some(phase) = slot {
                if phase.success {
                    phase.prune_logs();
                }
            }
        }
    }
}

/// The smaller, single-vehicle subjects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiscResults {
    pub other_build_type: OtherBuildTypeResults,
    pub packaged_without_editor: PackagedWithoutEditorResults,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::PhaseResult;

    #[test]
    fn absent_build_means_not_built() {
        let demo = DemoResults::default();
        assert!(!demo.built());
        assert!(!demo.packaged());
    }

    #[test]
    fn failed_build_gates_runs() {
        let demo = DemoResults {
            build: Some(PhaseResult::from_capture(false, String::new(), String::new())),
            ..Default::default()
        };
        assert!(!demo.built());
    }

    #[test]
    fn serialized_keys_are_camel_case() {
        let demo = DemoResults {
            run_from_build_output: Some(PhaseResult::default()),
            ..Default::default()
        };
        let json = serde_json::to_value(&demo).unwrap();
        assert!(json.get("runFromBuildOutput").is_some());
        assert!(json.get("generate").is_none());
    }

    #[test]
    fn pruning_only_touches_successful_phases() {
        let mut demo = DemoResults {
            generate: Some(PhaseResult::from_capture(true, "out".into(), "err".into())),
            build: Some(PhaseResult::from_capture(false, "out".into(), "err".into())),
            ..Default::default()
        };
        demo.prune_successful_logs();
        assert_eq!(demo.generate.as_ref().unwrap().stdout, None);
        assert_eq!(demo.build.as_ref().unwrap().stdout, Some("out".to_owned()));
    }
}
