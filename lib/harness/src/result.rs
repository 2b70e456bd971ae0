//! What a compilation leaves behind: the outcome, the toolchain's
//! output, the captured diagnostics, and a read-only view of the
//! virtual output tree.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::path::Path;

use crate::compile::BoxError;
use crate::diagnostics::{DiagnosticRecord, Severity};
use crate::error::Result;
use crate::files::{FileHandle, FileKind, FileManager};
use crate::location::{Location, LocationRole};

/// An unexpected toolchain failure: an error it raised, or a panic it
/// unwound with. Captured inside the result rather than re-thrown, so
/// an expected-to-crash compilation can still be inspected.
#[derive(Debug)]
pub struct FatalError {
    message: String,
    source: Option<BoxError>,
}

impl FatalError {
    pub(crate) fn from_error(error: BoxError) -> Self {
        Self {
            message: error.to_string(),
            source: Some(error),
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&str>() {
                Ok(message) => (*message).to_string(),
                Err(_) => "toolchain panicked with a non-string payload".to_string(),
            },
        };

        Self {
            message,
            source: None,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fatal toolchain error: {}", self.message)
    }
}

impl Error for FatalError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn Error + 'static))
    }
}

/// How one toolchain invocation ended. Exactly one outcome per
/// compilation, immutable once produced.
#[derive(Debug)]
pub enum CompilationOutcome {
    /// The toolchain accepted the inputs.
    Success,
    /// The toolchain ran to completion and rejected the inputs.
    Failure,
    /// The invocation itself failed.
    Fatal(FatalError),
}

impl fmt::Display for CompilationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failure => f.write_str("failure"),
            Self::Fatal(error) => write!(f, "fatal ({})", error.message()),
        }
    }
}

/// A read-only view of the virtual tree after compilation.
///
/// Freezing is by construction: the wrapper only exposes resolution
/// and reads, plus the final `release`. The tree stays alive until
/// released, so assertions can run after the harness itself is gone.
#[derive(Debug)]
pub struct FileTree {
    files: FileManager,
}

impl FileTree {
    pub(crate) fn new(files: FileManager) -> Self {
        Self { files }
    }

    /// Read the artifact for `binary_name` of kind `kind` beneath
    /// `location`.
    pub fn read(&self, location: &Location, binary_name: &str, kind: FileKind) -> Result<Vec<u8>> {
        let path = self.files.path_for(location, binary_name, kind)?;

        Ok(self.files.fs().read_file(&path)?)
    }

    /// Read the file backing `handle`.
    pub fn read_handle(&self, handle: &FileHandle) -> Result<Vec<u8>> {
        self.files.read(handle)
    }

    /// Whether an artifact exists for `binary_name` of kind `kind`.
    pub fn exists(&self, location: &Location, binary_name: &str, kind: FileKind) -> Result<bool> {
        self.files.exists(location, binary_name, kind)
    }

    /// List artifacts the same way the toolchain would.
    pub fn list(
        &self,
        location: &Location,
        package: &str,
        kinds: &[FileKind],
        recurse: bool,
    ) -> Result<Vec<FileHandle>> {
        self.files.list(location, package, kinds, recurse)
    }

    /// Recover the binary name behind a listed artifact.
    pub fn infer_binary_name(&self, location: &Location, path: &Path) -> Result<Option<String>> {
        self.files.infer_binary_name(location, path)
    }

    /// Free the virtual tree. Idempotent; any later read fails.
    pub fn release(&self) -> Result<()> {
        Ok(self.files.fs().release()?)
    }
}

/// Everything one compilation produced, frozen for assertions.
#[derive(Debug)]
pub struct CompilationResult {
    outcome: CompilationOutcome,
    options: Vec<String>,
    modules: Vec<String>,
    processors: Vec<String>,
    log: String,
    diagnostics: Vec<DiagnosticRecord>,
    files: FileTree,
}

impl CompilationResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        outcome: CompilationOutcome,
        options: Vec<String>,
        modules: Vec<String>,
        processors: Vec<String>,
        log: String,
        diagnostics: Vec<DiagnosticRecord>,
        files: FileTree,
    ) -> Self {
        Self {
            outcome,
            options,
            modules,
            processors,
            log,
            diagnostics,
            files,
        }
    }

    pub fn outcome(&self) -> &CompilationOutcome {
        &self.outcome
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, CompilationOutcome::Success)
    }

    pub fn failed(&self) -> bool {
        matches!(self.outcome, CompilationOutcome::Failure)
    }

    /// The fatal error, when the invocation itself fell over.
    pub fn fatal(&self) -> Option<&FatalError> {
        match &self.outcome {
            CompilationOutcome::Fatal(error) => Some(error),
            _ => None,
        }
    }

    /// The options the toolchain was invoked with.
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// The modules that contributed units, in name order. Empty under a
    /// single root.
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// The names of the processors forwarded to the toolchain.
    pub fn processors(&self) -> &[String] {
        &self.processors
    }

    /// The toolchain's buffered textual output.
    pub fn log(&self) -> &str {
        &self.log
    }

    /// Every captured diagnostic, in report order.
    pub fn diagnostics(&self) -> &[DiagnosticRecord] {
        &self.diagnostics
    }

    /// The captured error-severity diagnostics.
    pub fn errors(&self) -> Vec<&DiagnosticRecord> {
        self.with_severity(Severity::Error)
    }

    /// The captured warning-severity diagnostics.
    pub fn warnings(&self) -> Vec<&DiagnosticRecord> {
        self.with_severity(Severity::Warning)
    }

    fn with_severity(&self, severity: Severity) -> Vec<&DiagnosticRecord> {
        self.diagnostics
            .iter()
            .filter(|record| record.severity() == severity)
            .collect()
    }

    /// The captured diagnostics whose message contains `needle`.
    pub fn diagnostics_containing(&self, needle: &str) -> Vec<&DiagnosticRecord> {
        self.diagnostics
            .iter()
            .filter(|record| record.message().contains(needle))
            .collect()
    }

    /// The compiled class artifact for `binary_name` under the
    /// unscoped class output.
    pub fn generated_class(&self, binary_name: &str) -> Result<Vec<u8>> {
        self.files.read(
            &Location::Root(LocationRole::ClassOutput),
            binary_name,
            FileKind::Class,
        )
    }

    /// The compiled class artifact for `binary_name` under the class
    /// output of `module`.
    pub fn generated_module_class(&self, module: &str, binary_name: &str) -> Result<Vec<u8>> {
        self.files.read(
            &Location::Module(LocationRole::ClassOutput, module.to_string()),
            binary_name,
            FileKind::Class,
        )
    }

    /// The frozen output tree.
    pub fn files(&self) -> &FileTree {
        &self.files
    }

    /// Free the virtual tree behind the result. The outcome, log and
    /// diagnostics stay readable afterwards.
    pub fn release(&self) -> Result<()> {
        self.files.release()
    }
}
