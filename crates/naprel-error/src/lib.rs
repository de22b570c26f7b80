use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for the NAP release verification tooling.
///
/// Child-process failures and audit findings are *not* errors: they are
/// recorded in the results tree and the run continues. This type covers the
/// conditions that prevent the harness itself from doing its job.
#[derive(Error, Debug)]
pub enum NaprelError {
    // === Startup validation ===
    /// The framework path given on the command line does not exist.
    #[error("framework release not found: '{path}'")]
    FrameworkNotFound { path: PathBuf },

    /// The framework path exists but lacks the build-info descriptor.
    #[error("'{path}' doesn't look like a valid extracted NAP framework (missing {missing})")]
    InvalidFrameworkRelease { path: PathBuf, missing: String },

    /// Invalid command-line combination, reported before any work is done.
    #[error("invalid arguments: {reason}")]
    InvalidArguments { reason: String },

    // === I/O and descriptors ===
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A descriptor or report document failed to parse.
    #[error("malformed JSON in '{path}': {source}")]
    MalformedJson {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A document failed to serialize.
    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: String,
        source: serde_json::Error,
    },

    // === Library policy ===
    /// The library policy file is structurally invalid.
    #[error("invalid library policy: {detail}")]
    InvalidPolicy { detail: String },

    // === Subprocess plumbing ===
    /// A child process could not be spawned at all.
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    // === Interruption ===
    /// The harness was terminated externally; rename scopes have been
    /// unwound and the run is abandoned.
    #[error("interrupted")]
    Interrupted,
}

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, NaprelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_framework_path() {
        let err = NaprelError::InvalidFrameworkRelease {
            path: PathBuf::from("/tmp/nap"),
            missing: "cmake/build_info.json".to_owned(),
        };
        let text = err.to_string();
        assert!(text.contains("/tmp/nap"));
        assert!(text.contains("cmake/build_info.json"));
    }

    #[test]
    fn io_error_converts() {
        fn fails() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(NaprelError::Io(_))));
    }
}
