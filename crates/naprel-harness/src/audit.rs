//! Dynamic-library auditing.
//!
//! Two collection modes feed one pure decision procedure:
//!
//! - **live** (Linux): enumerate the child's memory-mapped regular files via
//!   `lsof` while it is still running, keeping only ELF objects (classified
//!   with the `file` utility);
//! - **post-mortem** (macOS): scan the captured stderr for the dynamic
//!   linker's `dyld: loaded:` markers (enabled through
//!   `DYLD_PRINT_LIBRARIES`).
//!
//! A path that cannot be classified is treated as unexpected and logged;
//! the audit never aborts the run.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::warn;

use crate::policy::{LibraryPolicy, TrustMode};

/// Marker printed by dyld for every loaded image.
const DYLD_LOADED_MARKER: &str = "dyld: loaded:";

/// Verdict for a single library path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Under the accepted root, in a trusted directory, or name-matched.
    Accepted,
    /// Inside an accepted system directory but failing the name check.
    UnexpectedSystem,
    /// In neither the accepted root nor any accepted directory.
    AlienOrigin,
}

impl Verdict {
    #[must_use]
    pub fn accepted(self) -> bool {
        self == Self::Accepted
    }
}

/// Decide whether one loaded library is acceptable.
///
/// Pure in (path, accepted root, policy); calling it twice yields the same
/// verdict.
#[must_use]
pub fn evaluate(path: &Path, accepted_root: Option<&Path>, policy: &LibraryPolicy) -> Verdict {
    // Libraries sourced from within the tree we are testing are always fine.
    if let Some(root) = accepted_root {
        if path.starts_with(root) {
            return Verdict::Accepted;
        }
    }

    let Some(dir) = policy.dir_for(path) else {
        return Verdict::AlienOrigin;
    };

    match dir.trust {
        TrustMode::DirectoryAbsolute => Verdict::Accepted,
        TrustMode::NameRestricted => {
            let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            match short_library_name(file_name) {
                Some(short) if policy.name_accepted(short) => Verdict::Accepted,
                Some(_) => Verdict::UnexpectedSystem,
                None => {
                    warn!(path = %path.display(), "library in system path lacks a .so suffix");
                    Verdict::UnexpectedSystem
                }
            }
        }
    }
}

/// Strip the shared-library extension and everything following it.
///
/// `libfoo.so.1.2.3` becomes `libfoo`; `libfoo-1.2.so` becomes `libfoo-1.2`.
/// Returns `None` for names without a `.so` segment.
#[must_use]
pub fn short_library_name(file_name: &str) -> Option<&str> {
    file_name.find(".so").map(|idx| &file_name[..idx])
}

/// Live audit: enumerate the running child's memory-mapped regular files
/// and return the paths of every unexpected shared library.
///
/// Tool failures (`lsof` or `file` missing) degrade the audit: a warning is
/// logged and the affected path is skipped or flagged, but the run goes on.
#[must_use]
pub fn audit_live(pid: u32, accepted_root: Option<&Path>, policy: &LibraryPolicy) -> Vec<PathBuf> {
    let output = match Command::new("lsof")
        .args(["-X", "-p", &pid.to_string()])
        .output()
    {
        Ok(output) => output,
        Err(err) => {
            warn!(pid, error = %err, "couldn't run lsof; skipping live library audit");
            return Vec::new();
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut unexpected = Vec::new();
    for line in stdout.lines() {
        let chunks: Vec<&str> = line.split_whitespace().collect();
        if chunks.len() < 9 || chunks[3] != "mem" || chunks[4] != "REG" {
            continue;
        }
        // The path may contain spaces; it spans the remaining columns.
        let path = PathBuf::from(chunks[8..].join(" "));
        match is_shared_library(&path) {
            Ok(false) => continue,
            Ok(true) => {
                if !evaluate(&path, accepted_root, policy).accepted() {
                    unexpected.push(path);
                }
            }
            Err(detail) => {
                // Unclassifiable mappings are reported rather than ignored.
                warn!(path = %path.display(), detail = detail.as_str(), "couldn't classify mapped file");
                unexpected.push(path);
            }
        }
    }
    unexpected
}

/// Whether `file` identifies the path as an ELF object.
fn is_shared_library(path: &Path) -> std::result::Result<bool, String> {
    let output = Command::new("file")
        .arg(path)
        .output()
        .map_err(|err| format!("file utility failed: {err}"))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let description = stdout
        .split_once(':')
        .map(|(_, rest)| rest)
        .ok_or_else(|| format!("unparseable file output: {stdout}"))?;
    let kind = description.split(',').next().unwrap_or("").trim();
    Ok(kind.starts_with("ELF"))
}

/// Post-mortem audit: parse the dynamic linker's trace out of stderr.
#[must_use]
pub fn audit_post_mortem(
    stderr: &str,
    accepted_root: Option<&Path>,
    policy: &LibraryPolicy,
) -> Vec<PathBuf> {
    let mut unexpected = Vec::new();
    for line in stderr.lines() {
        let Some(rest) = line.strip_prefix(DYLD_LOADED_MARKER) else {
            continue;
        };
        let path = PathBuf::from(rest.trim());
        if path.as_os_str().is_empty() {
            continue;
        }
        if !evaluate(&path, accepted_root, policy).accepted() {
            unexpected.push(path);
        }
    }
    unexpected
}
