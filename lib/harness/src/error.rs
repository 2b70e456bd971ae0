use std::io;

use thiserror::Error;

use crucible_vfs::FsError;

// Harness errors.
//
// These cover everything that can go wrong around a compilation. A
// toolchain crash is deliberately not here: it is captured as a
// `CompilationOutcome::Fatal` inside the result instead of surfacing
// as an `Err`.

/// Errors reported by the harness itself.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// The location cannot be resolved by this harness.
    #[error("unsupported location: {0}")]
    UnsupportedLocation(String),

    /// Plain and module-oriented sources were mixed within one
    /// compilation.
    #[error("module topology conflict: {0}")]
    TopologyConflict(String),

    /// Compilation was started without any source to compile.
    #[error("no compilation inputs")]
    NoInputs,

    /// A virtual file system operation failed.
    #[error("file system error: {0}")]
    Fs(#[from] FsError),

    /// A delegate-backed location failed at the host level.
    #[error("delegate error: {0}")]
    Delegate(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
