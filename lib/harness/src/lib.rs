//! An in-memory compilation harness.
//!
//! `crucible-harness` lets a test drive a real compiler toolchain
//! without touching disk: sources go into a private virtual tree, the
//! toolchain resolves every input and output location against that
//! tree (falling back to a delegate for real classpath entries), every
//! diagnostic it reports is captured with a timestamp and the test
//! call-site, and the whole invocation collapses into exactly one of
//! success, failure, or a captured fatal error.
//!
//! One [`Harness`] serves one compilation: configure it, call
//! [`Harness::compile`], assert on the returned [`CompilationResult`].
//! Parallel test cases each build their own harness; nothing is shared
//! between instances.
//!
//! ```
//! use crucible_harness::{BoxError, CompileTask, Harness, Toolchain};
//!
//! struct AcceptEverything;
//!
//! impl Toolchain for AcceptEverything {
//!     fn compile(&self, task: CompileTask<'_>) -> Result<bool, BoxError> {
//!         task.log().append("nothing to do");
//!         Ok(true)
//!     }
//! }
//!
//! let mut harness = Harness::new();
//! harness.add_source("com.example.Hello", "class Hello {}")?;
//!
//! let result = harness.compile(&AcceptEverything)?;
//! assert!(result.succeeded());
//! # Ok::<(), crucible_harness::HarnessError>(())
//! ```

mod compile;
mod diagnostics;
mod error;
mod files;
mod location;
mod result;

pub use compile::{
    BoxError, CompilationUnit, CompileTask, Harness, LogBuffer, ModuleTopology, Processor,
    Toolchain,
};
pub use diagnostics::{
    default_stop_predicate, Diagnostic, DiagnosticRecord, DiagnosticSink, Severity, StopPredicate,
    TraceFrame,
};
pub use error::{HarnessError, Result};
pub use files::{
    DelegateFileManager, FileHandle, FileKind, FileManager, FileOrigin, HostFileManager,
};
pub use location::{Location, LocationRegistry, LocationRole};
pub use result::{CompilationOutcome, CompilationResult, FatalError, FileTree};
