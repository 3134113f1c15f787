//! Typed errors for the benchmark library.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while building, measuring or rendering.
///
/// Only [`Error::CommandFailed`] and [`Error::Spawn`] are expected during a
/// normal run; the orchestration loop turns them into per-result failure
/// strings. The rest abort whatever operation produced them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reading or writing a file failed.
    #[error("{}: {source}", path.display())]
    Io {
        /// The file being accessed.
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Socket or other I/O not tied to a particular file.
    #[error(transparent)]
    Net(#[from] io::Error),

    /// Results or catalog JSON could not be (de)serialized.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// An input declares a transform nobody knows how to apply.
    #[error("unknown transform {0}")]
    UnknownTransform(String),

    /// An input identifier is not in the catalog.
    #[error("unknown input {0}")]
    UnknownInput(String),

    /// A filter pattern did not compile.
    #[error("invalid filter: {0}")]
    Regex(#[from] regex::Error),

    /// The shell could not be started at all.
    #[error("could not spawn `{cmd}`: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: io::Error,
    },

    /// The command ran and exited unsuccessfully.
    #[error("Command failed: {cmd} ({status})\n{stderr}")]
    CommandFailed {
        cmd: String,
        status: ExitStatus,
        /// Whatever the command wrote to stderr.
        stderr: String,
    },

    /// Launching or talking to the browser failed.
    #[error("browser: {0}")]
    Browser(String),

    /// The auditing tool produced no usable report.
    #[error("audit: {0}")]
    Audit(String),

    /// The report template is unusable.
    #[error("template: {0}")]
    Template(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
