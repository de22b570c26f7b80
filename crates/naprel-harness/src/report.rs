//! End-of-run report emission: the structured JSON document and the human
//! summary table.

use std::fs;
use std::path::Path;

use naprel_error::{NaprelError, Result};
use naprel_types::{PhaseResult, Report};

/// Serialise the results tree and write it with an atomic-ish overwrite
/// (temp file in the target directory, then rename).
pub fn write_report(report: &Report, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(report).map_err(|source| NaprelError::Serialize {
        what: "report".to_owned(),
        source,
    })?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, text)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn token(slot: &Option<PhaseResult>) -> &'static str {
    match slot {
        Some(phase) if phase.success => "PASS",
        _ => "FAIL",
    }
}

fn libs_token(slot: &Option<PhaseResult>) -> &'static str {
    match slot.as_ref().and_then(PhaseResult::libs_clean) {
        Some(true) => "PASS",
        _ => "FAIL",
    }
}

const SEPARATOR: &str = "----------------------------";

/// One block per subject, one `PASS`/`FAIL` token per phase, with a second
/// token for the library audit where a phase carries one. The audit lines
/// are suppressed on platforms whose auditor is a no-op.
#[must_use]
pub fn render_summary(report: &Report, show_libs_checks: bool) -> String {
    let mut out = String::new();
    let mut line = |text: String| {
        out.push_str(&text);
        out.push('\n');
    };

    let run_line = |lines: &mut dyn FnMut(String), label: &str, slot: &Option<PhaseResult>| {
        let outcome = token(slot);
        lines(format!("- {label}: {outcome}"));
        if outcome == "PASS" && show_libs_checks {
            lines(format!("- {label}, libs. check: {}", libs_token(slot)));
        }
    };

    for (name, demo) in &report.demos {
        line(format!("Demo: {name}"));
        line(format!("- Generate: {}", token(&demo.generate)));
        line(format!("- Build: {}", token(&demo.build)));
        line(format!("- Package: {}", token(&demo.package)));
        run_line(&mut line, "Run from build output", &demo.run_from_build_output);
        run_line(
            &mut line,
            "Run from packaged output",
            &demo.run_from_packaged_output,
        );
        line(format!(
            "- Open with editor (from framework release): {}",
            token(&demo.open_with_editor_build_output)
        ));
        line(format!(
            "- Open with editor (from packaged app): {}",
            token(&demo.open_with_editor_packaged_app)
        ));
        line(SEPARATOR.to_owned());
    }

    let template = &report.template_app;
    line("Template app".to_owned());
    line(format!("- Create: {}", token(&template.create)));
    line(format!("- Generate: {}", token(&template.generate)));
    line(format!("- Build: {}", token(&template.build)));
    line(format!("- Package: {}", token(&template.package)));
    run_line(
        &mut line,
        "Run from build output",
        &template.run_from_build_output,
    );
    run_line(
        &mut line,
        "Run from packaged output",
        &template.run_from_packaged_output,
    );
    line(format!(
        "- Open with editor (from framework release): {}",
        token(&template.open_with_editor_build_output)
    ));
    line(format!(
        "- Open with editor (from packaged app): {}",
        token(&template.open_with_editor_packaged_app)
    ));
    line(SEPARATOR.to_owned());

    let other = &report.misc.other_build_type;
    if other.selected() {
        line(format!(
            "{} build (other results are the default configuration)",
            other.build_type.as_deref().unwrap_or("Other")
        ));
        line(format!("- Generate: {}", token(&other.generate)));
        line(format!("- Build: {}", token(&other.build)));
        run_line(&mut line, "Run from build output", &other.run_from_build_output);
        line(format!(
            "  (was with demo '{}')",
            other.demo_name.as_deref().unwrap_or("?")
        ));
    } else {
        line("Other build type testing".to_owned());
        line("- App selection: FAIL".to_owned());
        line("  (Common cause: the testing looks for a demo with a module to use)".to_owned());
    }
    line(SEPARATOR.to_owned());

    let no_editor = &report.misc.packaged_without_editor;
    line("Demo packaged without editor".to_owned());
    line(format!("- Package: {}", token(&no_editor.package)));
    if let Some(name) = &no_editor.name {
        line(format!("  (was with demo '{name}')"));
    }
    run_line(
        &mut line,
        "Run from packaged output",
        &no_editor.run_from_packaged_output,
    );
    line(SEPARATOR.to_owned());

    let editor = &report.editor;
    line("Editor".to_owned());
    run_line(
        &mut line,
        "Run from framework release without app",
        &editor.run_from_framework_release,
    );
    run_line(
        &mut line,
        "Run from packaged output without app",
        &editor.run_from_packaged_output,
    );
    line(SEPARATOR.to_owned());

    out
}
