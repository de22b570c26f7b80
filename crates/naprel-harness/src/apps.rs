//! App and module discovery, descriptor handling, and dummy-app synthesis.
//!
//! Apps and modules are described by small JSON descriptors (`app.json`,
//! `module.json`) consumed by the framework's loader. The harness reads
//! them to compute deep module requirements, to patch audio configuration
//! for headless test machines, and to scaffold minimal apps for modules no
//! demo exercises.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use naprel_error::{NaprelError, Result};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::platform::PlatformProfile;
use crate::process;

/// Main app structure filename.
pub const APP_FILENAME: &str = "app.json";
/// Module structure filename.
pub const MODULE_FILENAME: &str = "module.json";
/// Modules shipped with the release.
pub const SYSTEM_MODULES_DIR: &str = "system_modules";
/// User modules directory.
pub const USER_MODULES_DIR: &str = "modules";
/// Name for the app created from the project template.
pub const TEMPLATE_APP_NAME: &str = "TemplateApp";
/// Default directory to iterate as the demo corpus.
pub const DEFAULT_TESTING_APPS_DIR: &str = "demos";

/// Read a JSON document.
pub fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|source| NaprelError::MalformedJson {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a JSON document, pretty-printed.
pub fn write_json(path: &Path, value: &Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|source| NaprelError::Serialize {
        what: path.display().to_string(),
        source,
    })?;
    fs::write(path, text)?;
    Ok(())
}

/// Sorted entry names of a directory.
pub fn list_dir_names(path: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// The demos to test: sorted directory names, minus hidden entries, the
/// operator's exclusions, and (when iterating a non-default corpus) a
/// template app left over from a previous run.
pub fn discover_demos(
    testing_apps_root: &Path,
    excluded: &[String],
    skip_template_app: bool,
) -> Result<Vec<String>> {
    let mut demos = Vec::new();
    for name in list_dir_names(testing_apps_root)? {
        if name.starts_with('.') || !testing_apps_root.join(&name).is_dir() {
            continue;
        }
        if skip_template_app && name == TEMPLATE_APP_NAME {
            continue;
        }
        if excluded.contains(&name) {
            continue;
        }
        demos.push(name);
    }
    Ok(demos)
}

/// Required module names from a descriptor, or empty when absent.
fn required_modules(descriptor: &Value) -> Vec<String> {
    descriptor["RequiredModules"]
        .as_array()
        .map(|mods| {
            mods.iter()
                .filter_map(|m| m.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

/// Deep module requirements for an app: the fixed point of following
/// `RequiredModules` through `module.json` descriptors.
///
/// An app-local module is named `nap<AppName>` and lives in the app's
/// `module/` directory; everything else resolves against the release's
/// module directories.
pub fn app_module_closure(
    framework_root: &Path,
    app_name: &str,
    app_dir: &Path,
) -> Result<Vec<String>> {
    let descriptor = read_json(&app_dir.join(APP_FILENAME))?;
    let mut modules = required_modules(&descriptor);
    let mut frontier = modules.clone();

    while !frontier.is_empty() {
        let mut discovered = Vec::new();
        for module in &frontier {
            let module_dir = if *module == format!("nap{app_name}") {
                Some(app_dir.join("module"))
            } else {
                [SYSTEM_MODULES_DIR, USER_MODULES_DIR]
                    .iter()
                    .map(|source| framework_root.join(source).join(module))
                    .find(|candidate| candidate.exists())
            };

            let Some(module_dir) = module_dir.filter(|d| d.exists()) else {
                warn!(module = module.as_str(), "module not found while resolving requirements");
                continue;
            };

            let module_descriptor = read_json(&module_dir.join(MODULE_FILENAME))?;
            for required in required_modules(&module_descriptor) {
                if !modules.contains(&required) && !discovered.contains(&required) {
                    discovered.push(required);
                }
            }
        }
        frontier = discovered;
        modules.extend(frontier.iter().cloned());
    }

    Ok(modules)
}

/// The (non-app) modules shipped in the release, sorted.
pub fn modules_in_release(framework_root: &Path) -> Result<Vec<String>> {
    list_dir_names(&framework_root.join(SYSTEM_MODULES_DIR))
}

/// Every module any demo's closure reaches. Unreadable apps are skipped
/// with a warning; they fail properly in their own build phases.
pub fn modules_used_by_demos(framework_root: &Path, testing_apps_dir: &str) -> Vec<String> {
    let apps_root = framework_root.join(testing_apps_dir);
    let mut used = BTreeSet::new();
    let Ok(names) = list_dir_names(&apps_root) else {
        return Vec::new();
    };
    for app_name in names {
        if app_name.starts_with('.') {
            continue;
        }
        let app_dir = apps_root.join(&app_name);
        if !app_dir.is_dir() {
            continue;
        }
        match app_module_closure(framework_root, &app_name, &app_dir) {
            Ok(modules) => used.extend(modules),
            Err(err) => {
                warn!(app = app_name.as_str(), error = %err, "couldn't resolve app modules");
            }
        }
    }
    used.into_iter().collect()
}

/// Name for the minimal app scaffolded to cover one module.
#[must_use]
pub fn dummy_app_name(module: &str) -> String {
    let mut name = String::from("DummyDemo");
    for segment in module.split('_') {
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            name.extend(first.to_uppercase());
            name.push_str(chars.as_str());
        }
    }
    name
}

/// Scaffold a minimal app for every shipped module not exercised by any
/// demo, so each module receives at least build + run + audit coverage.
///
/// Name collisions with existing apps are resolved by overwriting, with a
/// warning. Scaffolding failures are warnings, not run failures.
pub fn synthesize_dummy_apps(
    profile: &PlatformProfile,
    framework_root: &Path,
    testing_apps_dir: &str,
    warnings: &mut Vec<String>,
) -> Result<()> {
    let shipped = modules_in_release(framework_root)?;
    let used = modules_used_by_demos(framework_root, testing_apps_dir);

    let missing: Vec<&String> = shipped.iter().filter(|m| !used.contains(m)).collect();
    info!(
        modules = %missing
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        "creating dummy apps for modules without demos"
    );

    for module in missing {
        let app_name = dummy_app_name(module);
        let created_path = framework_root.join("apps").join(&app_name);
        let dest_path = framework_root.join(testing_apps_dir).join(&app_name);

        for path in [&created_path, &dest_path] {
            if path.exists() {
                let warning = format!(
                    "App {} already exists and will be replaced",
                    path.display()
                );
                warn!("{warning}");
                warnings.push(warning);
                fs::remove_dir_all(path)?;
            }
        }

        let command = profile.create_app_command(&app_name);
        let (code, _stdout, stderr) = process::run_to_completion(&command, framework_root)?;
        if code != 0 {
            let warning = format!("Failed to create dummy app for module {module}");
            warn!(exit_code = code, stderr = stderr.as_str(), "{warning}");
            warnings.push(warning);
            continue;
        }

        // Point the scaffolded descriptor at the module under test.
        let descriptor_path = created_path.join(APP_FILENAME);
        if descriptor_path.exists() {
            let mut descriptor = read_json(&descriptor_path)?;
            let mut modules = required_modules(&descriptor);
            modules.retain(|m| m != "napaudio");
            modules.push(module.clone());
            descriptor["RequiredModules"] = json!(modules);
            write_json(&descriptor_path, &descriptor)?;
        }

        // Move alongside the demos so it is picked up automatically.
        fs::rename(&created_path, &dest_path)?;
    }

    Ok(())
}

/// Patch the audio service configuration of any app whose module closure
/// pulls in `napaudio`: test machines have no capture device, so audio
/// input is disabled and channel-count failures are tolerated.
pub fn patch_audio_service_configuration(
    app_dir: &Path,
    output_dir: &Path,
    app_name: &str,
    framework_root: &Path,
) -> Result<()> {
    let modules = app_module_closure(framework_root, app_name, app_dir)?;
    if !modules.iter().any(|m| m == "napaudio") {
        return Ok(());
    }

    let config_path = output_dir.join("config.json");
    let mut config = if config_path.exists() {
        let loaded = read_json(&config_path)?;
        if loaded["Objects"].is_array() {
            loaded
        } else {
            json!({ "Objects": [] })
        }
    } else {
        json!({ "Objects": [] })
    };

    if let Some(objects) = config["Objects"].as_array_mut() {
        objects.retain(|obj| obj["Type"] != "nap::audio::AudioServiceConfiguration");
        objects.push(json!({
            "Type": "nap::audio::AudioServiceConfiguration",
            "mID": "AudioServiceConfiguration",
            "SampleRate": 44100,
            "OutputChannelCount": 2,
            "AllowChannelCountFailure": "True",
            "DisableInput": "True",
        }));
    }
    write_json(&config_path, &config)?;

    let descriptor_path = output_dir.join(APP_FILENAME);
    if descriptor_path.exists() {
        let mut descriptor = read_json(&descriptor_path)?;
        descriptor["ServiceConfig"] = json!("config.json");
        write_json(&descriptor_path, &descriptor)?;
    }

    Ok(())
}

/// The directory the packaging script just produced: the new entry whose
/// name starts with the app name (case-insensitive).
#[must_use]
pub fn find_packaged_output(app_name: &str, pre: &[String], post: &[String]) -> Option<PathBuf> {
    let pre_set: BTreeSet<&String> = pre.iter().collect();
    let lowered = app_name.to_lowercase();
    post.iter()
        .filter(|name| !pre_set.contains(name))
        .find(|name| name.to_lowercase().starts_with(&lowered))
        .map(PathBuf::from)
}
