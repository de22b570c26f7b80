//! Full-pipeline test against a miniature framework release built from
//! shell stubs: generate/build/package scripts, a long-running app
//! payload, and an editor stub honouring `--exit-after-load`.
//!
//! Exercises the complete phase sequence end to end: demo build + package
//! (with and without editor), template-app scaffolding, the non-default
//! configuration build, build-tree and packaged runs, every editor phase
//! under both rename scopes, cleanup, and report emission.

#![cfg(target_os = "linux")]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;

use naprel_harness::orchestrator::{Harness, RunOptions};
use naprel_types::{PhaseResult, Report};

const REGENERATE_SH: &str = r#"#!/bin/sh
bt="${1:-Release}"
case "$bt" in
  -*) bt=Release ;;
esac
mkdir -p build
{
  printf 'all:\n'
  printf '\tmkdir -p ../bin/%s-Linux\n' "$bt"
  printf '\tcp ../app_payload.sh ../bin/%s-Linux/__APP__\n' "$bt"
  printf '\tchmod +x ../bin/%s-Linux/__APP__\n' "$bt"
} > build/Makefile
exit 0
"#;

const PACKAGE_SH: &str = r#"#!/bin/sh
with_editor=1
for arg in "$@"; do
  if [ "$arg" = "-nn" ]; then with_editor=0; fi
done
out="__APP__-0.7.0-Linux"
rm -rf "$out"
mkdir -p "$out"
cp app.json "$out/app.json"
cp app_payload.sh "$out/__APP__"
chmod +x "$out/__APP__"
if [ "$with_editor" = "1" ]; then
  mkdir -p "$out/napkin"
  cp napkin_payload.sh "$out/napkin/napkin"
  chmod +x "$out/napkin/napkin"
fi
exit 0
"#;

const APP_PAYLOAD_SH: &str = "#!/bin/sh\nsleep 60\n";

const NAPKIN_PAYLOAD_SH: &str = r#"#!/bin/sh
mode=run
proj=""
while [ $# -gt 0 ]; do
  case "$1" in
    -p) proj="$2"; shift ;;
    --exit-after-load) mode=load ;;
  esac
  shift
done
if [ "$mode" = "load" ]; then
  if [ -f "$proj" ]; then exit 0; fi
  exit 3
fi
sleep 60
"#;

const CREATE_APP_SH: &str = r#"#!/bin/sh
for arg in "$@"; do name="$arg"; done
dst="apps/$name"
rm -rf "$dst"
mkdir -p "$dst"
for f in app.json regenerate.sh package.sh app_payload.sh napkin_payload.sh; do
  sed "s/__APP__/$name/g" "template_skeleton/$f" > "$dst/$f"
done
chmod +x "$dst"/*.sh
exit 0
"#;

const APP_JSON: &str = r#"{"Title": "__APP__", "RequiredModules": []}"#;

fn write_file(path: &Path, body: &str, executable: bool) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
    if executable {
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }
}

/// Instantiate the app skeleton for a concrete app name.
fn instantiate_app(dir: &Path, name: &str) {
    let fill = |body: &str| body.replace("__APP__", name);
    write_file(&dir.join("app.json"), &fill(APP_JSON), false);
    write_file(&dir.join("regenerate.sh"), &fill(REGENERATE_SH), true);
    write_file(&dir.join("package.sh"), &fill(PACKAGE_SH), true);
    write_file(&dir.join("app_payload.sh"), &fill(APP_PAYLOAD_SH), true);
    write_file(&dir.join("napkin_payload.sh"), &fill(NAPKIN_PAYLOAD_SH), true);
}

fn build_fixture(fw: &Path) {
    fs::create_dir_all(fw.join("cmake")).unwrap();
    fs::write(fw.join("cmake/build_info.json"), r#"{"version": "0.7.0"}"#).unwrap();

    instantiate_app(&fw.join("demos/HelloVulkan"), "HelloVulkan");
    // A demo-local module makes HelloVulkan the preferred vehicle for the
    // non-default configuration build.
    fs::create_dir_all(fw.join("demos/HelloVulkan/module")).unwrap();
    write_file(
        &fw.join("demos/HelloVulkan/module/module.json"),
        r#"{"RequiredModules": []}"#,
        false,
    );

    write_file(&fw.join("tools/napkin/napkin"), NAPKIN_PAYLOAD_SH, true);
    write_file(&fw.join("tools/create_app.sh"), CREATE_APP_SH, true);

    // Skeleton consumed by the scaffolding script.
    let skeleton = fw.join("template_skeleton");
    write_file(&skeleton.join("app.json"), APP_JSON, false);
    write_file(&skeleton.join("regenerate.sh"), REGENERATE_SH, true);
    write_file(&skeleton.join("package.sh"), PACKAGE_SH, true);
    write_file(&skeleton.join("app_payload.sh"), APP_PAYLOAD_SH, true);
    write_file(&skeleton.join("napkin_payload.sh"), NAPKIN_PAYLOAD_SH, true);
}

fn assert_pass(phase: &Option<PhaseResult>, label: &str) {
    let phase = phase
        .as_ref()
        .unwrap_or_else(|| panic!("{label}: phase missing"));
    assert!(
        phase.success,
        "{label}: failed; stdout={:?} stderr={:?} exit={:?}",
        phase.stdout, phase.stderr, phase.exit_code
    );
}

#[test]
fn clean_release_passes_every_phase() {
    // The build phase drives make; skip quietly where it isn't available.
    if Command::new("make").arg("--version").output().is_err() {
        eprintln!("make unavailable; skipping pipeline test");
        return;
    }

    let fw_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    build_fixture(fw_dir.path());

    let mut options = RunOptions::new(fw_dir.path().to_path_buf());
    options.synthesize_dummy_apps = false;
    options.rename_framework = true;
    options.rename_qt = false;
    options.output_dir = Some(out_dir.path().to_path_buf());

    let mut harness = Harness::new(options).unwrap();
    let report = harness.execute().unwrap();

    let demo = &report.demos["HelloVulkan"];
    assert_pass(&demo.generate, "demo generate");
    assert_pass(&demo.build, "demo build");
    assert_pass(&demo.package, "demo package");
    assert_pass(&demo.run_from_build_output, "demo run from build output");
    assert_pass(&demo.run_from_packaged_output, "demo run from package");
    assert_pass(&demo.open_with_editor_build_output, "demo editor open");
    assert_pass(
        &demo.open_with_editor_packaged_app,
        "demo editor open (packaged)",
    );

    let template = &report.template_app;
    assert_pass(&template.create, "template create");
    assert_pass(&template.generate, "template generate");
    assert_pass(&template.build, "template build");
    assert_pass(&template.package, "template package");
    assert_pass(&template.run_from_build_output, "template run");
    assert_pass(&template.run_from_packaged_output, "template packaged run");
    assert_pass(&template.open_with_editor_build_output, "template editor");
    assert_pass(
        &template.open_with_editor_packaged_app,
        "template editor (packaged)",
    );

    let other = &report.misc.other_build_type;
    assert_eq!(other.demo_name.as_deref(), Some("HelloVulkan"));
    assert_eq!(other.build_type.as_deref(), Some("Debug"));
    assert_pass(&other.generate, "debug generate");
    assert_pass(&other.build, "debug build");
    assert_pass(&other.run_from_build_output, "debug run");

    let no_editor = &report.misc.packaged_without_editor;
    assert_eq!(no_editor.name.as_deref(), Some("HelloVulkan"));
    assert_pass(&no_editor.package, "package without editor");
    assert_pass(&no_editor.run_from_packaged_output, "no-editor packaged run");

    assert_pass(&report.editor.run_from_framework_release, "editor release");
    assert_pass(&report.editor.run_from_packaged_output, "editor packaged");

    // Harness-terminated healthy runs carry no exit code.
    assert!(demo
        .run_from_build_output
        .as_ref()
        .unwrap()
        .exit_code
        .is_none());

    assert!(report.run.success, "warnings: {:?}", report.run.warnings);

    // Cleanup removed every packaged artefact; only the report remains.
    let leftovers: Vec<String> = fs::read_dir(out_dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftovers, vec!["report.json".to_owned()]);

    // The framework rename scope was restored.
    assert!(fw_dir.path().exists());
    let renamed_twin = format!("{}-rename", fw_dir.path().display());
    assert!(!Path::new(&renamed_twin).exists());

    // The written document mirrors the tree, with logs pruned on the
    // successful phases.
    let written: Report =
        serde_json::from_str(&fs::read_to_string(out_dir.path().join("report.json")).unwrap())
            .unwrap();
    assert!(written.run.success);
    let written_demo = &written.demos["HelloVulkan"];
    assert!(written_demo.build.as_ref().unwrap().stdout.is_none());
    assert!(written_demo
        .run_from_build_output
        .as_ref()
        .unwrap()
        .stderr
        .is_none());
}
