//! Per-platform divergence, collected behind one profile.
//!
//! Library auditing (live vs post-mortem), build-driver invocation, script
//! naming, wait windows and rename restrictions all differ by platform.
//! The orchestrator never branches on the platform; it holds one
//! [`PlatformProfile`] and asks it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audit;
use crate::policy::LibraryPolicy;

/// The platforms a framework release ships for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    /// The platform the harness is running on.
    #[must_use]
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(windows) {
            Self::Windows
        } else {
            Self::Linux
        }
    }
}

/// A fully-constructed command: program plus arguments, relative to some
/// working directory chosen by the caller.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    fn new(program: impl Into<PathBuf>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|&a| a.to_owned()).collect(),
        }
    }

    /// Shell-style rendering for logs and error messages.
    #[must_use]
    pub fn display(&self) -> String {
        let mut out = self.program.display().to_string();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

/// Capability surface for everything platform-specific.
#[derive(Debug, Clone)]
pub struct PlatformProfile {
    platform: Platform,
    arch: String,
    jobs: usize,
}

impl PlatformProfile {
    #[must_use]
    pub fn new(platform: Platform, arch: &str, jobs: usize) -> Self {
        Self {
            platform,
            arch: arch.to_owned(),
            jobs: jobs.max(1),
        }
    }

    /// Profile for the machine the harness is running on.
    #[must_use]
    pub fn host() -> Self {
        let jobs = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self::new(Platform::current(), std::env::consts::ARCH, jobs)
    }

    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    #[must_use]
    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// How long a launched binary is given to initialise before the health
    /// check. A property of the target hardware, not the process: slower
    /// non-x86 boards need far longer.
    #[must_use]
    pub fn run_wait_window(&self) -> Duration {
        if self.platform == Platform::Linux && self.arch != "x86_64" {
            Duration::from_secs(30)
        } else {
            Duration::from_secs(6)
        }
    }

    /// Wait window for the editor's open-project-and-exit phases; project
    /// loading is non-trivial.
    #[must_use]
    pub fn editor_wait_window(&self) -> Duration {
        if self.platform == Platform::Linux && self.arch != "x86_64" {
            Duration::from_secs(40)
        } else {
            Duration::from_secs(30)
        }
    }

    /// Whether the framework/Qt rename scopes may be applied at all.
    ///
    /// Open file handles pin directory names on Windows, so the rename
    /// trick is Unix-only.
    #[must_use]
    pub fn supports_rename_scopes(&self) -> bool {
        self.platform != Platform::Windows
    }

    /// Extra environment for launched binaries. On macOS this turns on the
    /// dynamic linker's load tracing, which the post-mortem audit consumes.
    #[must_use]
    pub fn child_env(&self) -> Vec<(String, String)> {
        match self.platform {
            Platform::MacOs => vec![("DYLD_PRINT_LIBRARIES".to_owned(), "1".to_owned())],
            _ => Vec::new(),
        }
    }

    /// Whether to capture stdout when launching the editor.
    ///
    /// On Windows the editor has been seen to lock up when its stdout is
    /// piped while opening a packaged app's descriptor, so stdout capture is
    /// skipped for exactly that combination. TODO: retest whether newer
    /// editor builds still deadlock and drop the exception.
    #[must_use]
    pub fn capture_editor_stdout(&self, opening_packaged_descriptor: bool) -> bool {
        !(self.platform == Platform::Windows && opening_packaged_descriptor)
    }

    /// An app-local or tools script, named per platform conventions.
    #[must_use]
    pub fn script_command(&self, name: &str, args: &[&str]) -> CommandSpec {
        let program = match self.platform {
            Platform::Windows => PathBuf::from(format!("{name}.bat")),
            _ => PathBuf::from(format!("./{name}.sh")),
        };
        CommandSpec {
            program,
            args: args.iter().map(|&a| a.to_owned()).collect(),
        }
    }

    /// The build-tree regeneration command, run in the app directory.
    #[must_use]
    pub fn regenerate_command(&self, build_type: &str) -> CommandSpec {
        match self.platform {
            // The Linux generator takes the configuration up front.
            Platform::Linux => self.script_command("regenerate", &[build_type]),
            // Multi-config generators pick the configuration at build time;
            // skip the post-generate solution show and pause.
            Platform::MacOs => self.script_command("regenerate", &["-ns", "-np"]),
            Platform::Windows => self.script_command("regenerate", &["-ns", "-np"]),
        }
    }

    /// The native build-driver invocation and the build subdirectory it
    /// runs in.
    #[must_use]
    pub fn build_command(&self, app_name: &str, build_type: &str) -> (&'static str, CommandSpec) {
        match self.platform {
            Platform::Linux => (
                "build",
                CommandSpec::new("make", &["all", ".", &format!("-j{}", self.jobs)]),
            ),
            Platform::MacOs => (
                "xcode",
                CommandSpec::new(
                    "xcodebuild",
                    &[
                        "-configuration",
                        build_type,
                        "-jobs",
                        &self.jobs.to_string(),
                    ],
                ),
            ),
            Platform::Windows => (
                "msvc64",
                CommandSpec::new(
                    "..\\..\\..\\thirdparty\\cmake\\msvc\\x86_64\\bin\\cmake",
                    &["--build", ".", "--target", app_name, "--config", build_type],
                ),
            ),
        }
    }

    /// The packaging-script invocation, run in the app directory.
    ///
    /// Always skips the zip step and the post-package reveal; non-Linux
    /// also suppresses the interactive prompt.
    #[must_use]
    pub fn package_command(&self, with_editor: bool) -> CommandSpec {
        let mut args: Vec<&str> = Vec::new();
        if !with_editor {
            args.push("-nn");
        }
        args.push("-nz");
        args.push("-ns");
        if self.platform != Platform::Linux {
            args.push("-np");
        }
        self.script_command("package", &args)
    }

    /// The app-scaffolding invocation, run in the framework root.
    #[must_use]
    pub fn create_app_command(&self, app_name: &str) -> CommandSpec {
        let program = match self.platform {
            Platform::Windows => PathBuf::from("tools\\create_app.bat"),
            _ => PathBuf::from("./tools/create_app.sh"),
        };
        CommandSpec {
            program,
            args: vec!["-ng".to_owned(), app_name.to_owned()],
        }
    }

    /// Path to a built or packaged binary inside its containing directory.
    #[must_use]
    pub fn run_binary_path(&self, bin_dir: &Path, app_name: &str) -> PathBuf {
        match self.platform {
            Platform::Windows => bin_dir.join(format!("{app_name}.exe")),
            _ => bin_dir.join(app_name),
        }
    }

    /// The editor binary inside an editor directory.
    #[must_use]
    pub fn editor_binary_path(&self, editor_dir: &Path) -> PathBuf {
        self.run_binary_path(editor_dir, "napkin")
    }

    /// Whether the live (while-running) audit applies on this platform.
    #[must_use]
    pub fn audits_live(&self) -> bool {
        self.platform == Platform::Linux
    }

    /// Whether the post-mortem (stderr trace) audit applies.
    #[must_use]
    pub fn audits_post_mortem(&self) -> bool {
        self.platform == Platform::MacOs
    }

    /// Live audit of a still-running child. No-op off Linux.
    ///
    /// The Windows audit is a known gap: verification there relies on
    /// launch-time load failures surfacing via the exit code.
    #[must_use]
    pub fn audit_live(
        &self,
        pid: u32,
        accepted_root: Option<&Path>,
        policy: &LibraryPolicy,
    ) -> Vec<PathBuf> {
        if self.audits_live() {
            audit::audit_live(pid, accepted_root, policy)
        } else {
            Vec::new()
        }
    }

    /// Post-mortem audit over captured stderr. No-op off macOS.
    #[must_use]
    pub fn audit_post_mortem(
        &self,
        stderr: &str,
        accepted_root: Option<&Path>,
        policy: &LibraryPolicy,
    ) -> Vec<PathBuf> {
        if self.audits_post_mortem() {
            audit::audit_post_mortem(stderr, accepted_root, policy)
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_windows_depend_on_architecture() {
        let x86 = PlatformProfile::new(Platform::Linux, "x86_64", 4);
        assert_eq!(x86.run_wait_window(), Duration::from_secs(6));
        assert_eq!(x86.editor_wait_window(), Duration::from_secs(30));

        let arm = PlatformProfile::new(Platform::Linux, "aarch64", 4);
        assert_eq!(arm.run_wait_window(), Duration::from_secs(30));
        assert_eq!(arm.editor_wait_window(), Duration::from_secs(40));

        // Non-Linux platforms use the short window regardless of arch.
        let mac = PlatformProfile::new(Platform::MacOs, "aarch64", 4);
        assert_eq!(mac.run_wait_window(), Duration::from_secs(6));
    }

    #[test]
    fn linux_build_command_uses_make_with_job_count() {
        let profile = PlatformProfile::new(Platform::Linux, "x86_64", 8);
        let (subdir, cmd) = profile.build_command("HelloVulkan", "Release");
        assert_eq!(subdir, "build");
        assert_eq!(cmd.program, PathBuf::from("make"));
        assert_eq!(cmd.args, vec!["all", ".", "-j8"]);
    }

    #[test]
    fn macos_build_command_uses_xcodebuild_configuration() {
        let profile = PlatformProfile::new(Platform::MacOs, "x86_64", 4);
        let (subdir, cmd) = profile.build_command("HelloVulkan", "Debug");
        assert_eq!(subdir, "xcode");
        assert_eq!(cmd.program, PathBuf::from("xcodebuild"));
        assert_eq!(cmd.args, vec!["-configuration", "Debug", "-jobs", "4"]);
    }

    #[test]
    fn windows_build_command_targets_the_app() {
        let profile = PlatformProfile::new(Platform::Windows, "x86_64", 4);
        let (subdir, cmd) = profile.build_command("HelloVulkan", "Release");
        assert_eq!(subdir, "msvc64");
        assert!(cmd.args.contains(&"HelloVulkan".to_owned()));
        assert!(cmd.args.contains(&"--config".to_owned()));
    }

    #[test]
    fn package_command_flags() {
        let linux = PlatformProfile::new(Platform::Linux, "x86_64", 4);
        assert_eq!(linux.package_command(true).args, vec!["-nz", "-ns"]);
        assert_eq!(
            linux.package_command(false).args,
            vec!["-nn", "-nz", "-ns"]
        );

        let mac = PlatformProfile::new(Platform::MacOs, "x86_64", 4);
        assert_eq!(mac.package_command(true).args, vec!["-nz", "-ns", "-np"]);
    }

    #[test]
    fn rename_scopes_are_unix_only() {
        assert!(PlatformProfile::new(Platform::Linux, "x86_64", 1).supports_rename_scopes());
        assert!(PlatformProfile::new(Platform::MacOs, "x86_64", 1).supports_rename_scopes());
        assert!(!PlatformProfile::new(Platform::Windows, "x86_64", 1).supports_rename_scopes());
    }

    #[test]
    fn editor_stdout_capture_quirk_is_windows_packaged_only() {
        let windows = PlatformProfile::new(Platform::Windows, "x86_64", 1);
        assert!(windows.capture_editor_stdout(false));
        assert!(!windows.capture_editor_stdout(true));

        let linux = PlatformProfile::new(Platform::Linux, "x86_64", 1);
        assert!(linux.capture_editor_stdout(true));
    }

    #[test]
    fn dyld_tracing_enabled_only_on_macos() {
        let mac = PlatformProfile::new(Platform::MacOs, "x86_64", 1);
        assert_eq!(
            mac.child_env(),
            vec![("DYLD_PRINT_LIBRARIES".to_owned(), "1".to_owned())]
        );
        assert!(PlatformProfile::new(Platform::Linux, "x86_64", 1)
            .child_env()
            .is_empty());
    }

    #[test]
    fn script_naming_per_platform() {
        let linux = PlatformProfile::new(Platform::Linux, "x86_64", 1);
        assert_eq!(
            linux.regenerate_command("Release").program,
            PathBuf::from("./regenerate.sh")
        );
        assert_eq!(linux.regenerate_command("Release").args, vec!["Release"]);

        let windows = PlatformProfile::new(Platform::Windows, "x86_64", 1);
        assert_eq!(
            windows.regenerate_command("Release").program,
            PathBuf::from("regenerate.bat")
        );
    }
}
