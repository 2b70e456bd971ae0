//! The harness itself: source accumulation, the topology guard, and
//! the single compilation step.

use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crucible_vfs::FileSystem;

use crate::diagnostics::{DiagnosticRecord, DiagnosticSink, StopPredicate};
use crate::error::{HarnessError, Result};
use crate::files::{path_below, DelegateFileManager, FileHandle, FileKind, FileManager};
use crate::location::{Location, LocationRegistry, LocationRole};
use crate::result::{CompilationOutcome, CompilationResult, FatalError, FileTree};

/// Errors a toolchain may signal instead of a clean accept/reject.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Whether the harness compiles one source root or a set of named
/// modules. The two are mutually incompatible for the toolchain, so the
/// harness fixes the topology on the first write and refuses the other
/// kind afterwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ModuleTopology {
    #[default]
    Undetermined,
    SingleRoot,
    MultiModule,
}

/// An annotation processor (or equivalent plug-in) forwarded to the
/// toolchain. The harness never interprets processors, it only carries
/// them and reports their names in the result.
pub trait Processor: Send + Sync {
    fn name(&self) -> &str;
}

/// One source artifact handed to the toolchain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilationUnit {
    binary_name: String,
    module: Option<String>,
    handle: FileHandle,
}

impl CompilationUnit {
    pub fn binary_name(&self) -> &str {
        &self.binary_name
    }

    /// The module the unit belongs to; `None` under a single root.
    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub fn handle(&self) -> &FileHandle {
        &self.handle
    }
}

impl fmt::Display for CompilationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{module}/{}", self.binary_name),
            None => f.write_str(&self.binary_name),
        }
    }
}

/// The textual output channel of one compilation. Thread-safe, so the
/// toolchain may write from whatever thread it runs rounds on.
#[derive(Clone, Debug, Default)]
pub struct LogBuffer {
    inner: Arc<Mutex<String>>,
}

impl LogBuffer {
    /// Append one line of toolchain output.
    pub fn append(&self, line: &str) {
        let mut log = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        log.push_str(line);
        if !line.ends_with('\n') {
            log.push('\n');
        }
    }

    fn into_string(self) -> String {
        let log = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        log.clone()
    }
}

/// Everything a toolchain gets for one invocation.
pub struct CompileTask<'a> {
    units: &'a [CompilationUnit],
    options: &'a [String],
    processors: &'a [Box<dyn Processor>],
    files: &'a FileManager,
    diagnostics: &'a DiagnosticSink,
    log: &'a LogBuffer,
}

impl<'a> CompileTask<'a> {
    pub fn units(&self) -> &[CompilationUnit] {
        self.units
    }

    pub fn options(&self) -> &[String] {
        self.options
    }

    pub fn processors(&self) -> &[Box<dyn Processor>] {
        self.processors
    }

    pub fn files(&self) -> &FileManager {
        self.files
    }

    pub fn diagnostics(&self) -> &DiagnosticSink {
        self.diagnostics
    }

    pub fn log(&self) -> &LogBuffer {
        self.log
    }
}

/// The calling contract of the external compiler tool.
///
/// `Ok(true)` means the toolchain accepted the inputs, `Ok(false)` a
/// non-exceptional rejection, `Err` an unexpected failure. Panics are
/// tolerated and classified the same as `Err`.
pub trait Toolchain {
    fn compile(&self, task: CompileTask<'_>) -> std::result::Result<bool, BoxError>;
}

/// One self-contained compilation harness.
///
/// A fresh harness accepts sources, options and processors; `compile`
/// consumes it, so a second compilation cannot reuse stale state: a
/// new scenario starts from a new harness. The virtual tree lives on
/// inside the returned [`CompilationResult`] until it is released.
pub struct Harness {
    fs: FileSystem,
    registry: Arc<LocationRegistry>,
    topology: ModuleTopology,
    options: Vec<String>,
    processors: Vec<Box<dyn Processor>>,
    delegate: Option<Arc<dyn DelegateFileManager>>,
    stop: Option<StopPredicate>,
}

impl Harness {
    pub fn new() -> Self {
        let fs = FileSystem::new();
        let registry = Arc::new(LocationRegistry::default());

        // The owned role roots always exist, even in an empty harness.
        registry
            .ensure_roots(&fs)
            .unwrap_or_else(|_| unreachable!("a fresh tree accepts the role roots"));

        Self {
            fs,
            registry,
            topology: ModuleTopology::Undetermined,
            options: Vec::new(),
            processors: Vec::new(),
            delegate: None,
            stop: None,
        }
    }

    /// The topology the harness has settled on so far.
    pub fn topology(&self) -> ModuleTopology {
        self.topology
    }

    /// Add a source file under the single source root. Fails with
    /// [`HarnessError::TopologyConflict`] once a module source exists.
    pub fn add_source(&mut self, binary_name: &str, source: &str) -> Result<&mut Self> {
        self.settle_topology(ModuleTopology::SingleRoot)?;

        let path = path_below(
            LocationRole::SourceInput.root(),
            binary_name,
            FileKind::Source,
        );
        self.fs.create_file(&path, source.as_bytes())?;

        tracing::debug!(binary_name, path=%path.display(), "added a source file");

        Ok(self)
    }

    /// Add a source file under the named module. Fails with
    /// [`HarnessError::TopologyConflict`] once a plain source exists.
    pub fn add_module_source(
        &mut self,
        module: &str,
        binary_name: &str,
        source: &str,
    ) -> Result<&mut Self> {
        self.settle_topology(ModuleTopology::MultiModule)?;

        let location = self
            .registry
            .module_location_for(LocationRole::ModuleSourceInput, module)?;
        let path = path_below(
            &self.registry.path_of(&location)?,
            binary_name,
            FileKind::Source,
        );
        self.fs.create_file(&path, source.as_bytes())?;

        tracing::debug!(module, binary_name, path=%path.display(), "added a module source file");

        Ok(self)
    }

    /// Add a raw resource at `relative` beneath the root of an owned
    /// role. Resources carry no topology implications. A `relative`
    /// that resolves outside the role's subtree is refused.
    pub fn add_resource(
        &mut self,
        role: LocationRole,
        relative: &str,
        contents: &[u8],
    ) -> Result<&mut Self> {
        if !role.is_virtual() {
            return Err(HarnessError::UnsupportedLocation(format!(
                "cannot write a resource into {role}"
            )));
        }

        let root = role.root();
        let path = self.fs.canonicalize_unchecked(&root.join(relative))?;

        if !path.starts_with(root) {
            return Err(HarnessError::UnsupportedLocation(format!(
                "`{relative}` escapes {role}"
            )));
        }

        self.fs.create_file(&path, contents)?;

        Ok(self)
    }

    /// Add one compiler option.
    pub fn option(&mut self, option: impl Into<String>) -> &mut Self {
        self.options.push(option.into());
        self
    }

    /// Add several compiler options.
    pub fn options(&mut self, options: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.options.extend(options.into_iter().map(Into::into));
        self
    }

    /// Forward a processor to the toolchain.
    pub fn processor(&mut self, processor: Box<dyn Processor>) -> &mut Self {
        self.processors.push(processor);
        self
    }

    /// Install the delegate consulted for locations the harness does
    /// not own.
    pub fn delegate(&mut self, delegate: Arc<dyn DelegateFileManager>) -> &mut Self {
        self.delegate = Some(delegate);
        self
    }

    /// Override where diagnostic call-stack snapshots stop.
    pub fn stop_predicate(&mut self, stop: StopPredicate) -> &mut Self {
        self.stop = Some(stop);
        self
    }

    /// Run the toolchain over everything accumulated so far.
    ///
    /// Consumes the harness: re-running a scenario means building a new
    /// one. The toolchain's verdict, its textual output, every captured
    /// diagnostic and the (still virtual) output tree come back in the
    /// [`CompilationResult`]; a toolchain error or panic is captured as
    /// a [`CompilationOutcome::Fatal`], never re-thrown.
    pub fn compile(self, toolchain: &dyn Toolchain) -> Result<CompilationResult> {
        let files = FileManager::new(
            self.fs.clone(),
            Arc::clone(&self.registry),
            self.delegate.clone(),
        );
        let units = self.gather_units(&files)?;

        let modules: Vec<String> = units
            .iter()
            .filter_map(|unit| unit.module().map(str::to_string))
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();

        let diagnostics = match self.stop {
            Some(stop) => DiagnosticSink::with_stop_predicate(stop),
            None => DiagnosticSink::new(),
        };
        let log = LogBuffer::default();

        tracing::debug!(
            units = units.len(),
            options = self.options.len(),
            topology = ?self.topology,
            "invoking the toolchain",
        );

        let verdict = panic::catch_unwind(AssertUnwindSafe(|| {
            toolchain.compile(CompileTask {
                units: &units,
                options: &self.options,
                processors: &self.processors,
                files: &files,
                diagnostics: &diagnostics,
                log: &log,
            })
        }));

        let outcome = match verdict {
            Ok(Ok(true)) => CompilationOutcome::Success,
            Ok(Ok(false)) => CompilationOutcome::Failure,
            Ok(Err(error)) => CompilationOutcome::Fatal(FatalError::from_error(error)),
            Err(payload) => CompilationOutcome::Fatal(FatalError::from_panic(payload)),
        };

        tracing::debug!(outcome = %outcome, "toolchain returned");

        let processors: Vec<String> = self
            .processors
            .iter()
            .map(|processor| processor.name().to_string())
            .collect();
        let diagnostics: Vec<DiagnosticRecord> = diagnostics.diagnostics();

        Ok(CompilationResult::new(
            outcome,
            self.options,
            modules,
            processors,
            log.into_string(),
            diagnostics,
            FileTree::new(files),
        ))
    }

    /// The virtual tree, for direct inspection.
    pub fn fs(&self) -> &FileSystem {
        &self.fs
    }

    fn settle_topology(&mut self, wanted: ModuleTopology) -> Result<()> {
        match (self.topology, wanted) {
            (ModuleTopology::Undetermined, wanted) => {
                self.topology = wanted;
                Ok(())
            }
            (current, wanted) if current == wanted => Ok(()),
            (current, wanted) => Err(HarnessError::TopologyConflict(format!(
                "harness already compiles {current:?} sources, {wanted:?} sources cannot be mixed in"
            ))),
        }
    }

    fn gather_units(&self, files: &FileManager) -> Result<Vec<CompilationUnit>> {
        let units = match self.topology {
            ModuleTopology::Undetermined => return Err(HarnessError::NoInputs),
            ModuleTopology::SingleRoot => {
                let sources = Location::Root(LocationRole::SourceInput);

                files
                    .list(&sources, "", &[FileKind::Source], true)?
                    .into_iter()
                    .filter_map(|handle| {
                        files
                            .infer_binary_name(&sources, handle.path())
                            .transpose()
                            .map(|name| (name, handle))
                    })
                    .map(|(name, handle)| {
                        Ok(CompilationUnit {
                            binary_name: name?,
                            module: None,
                            handle,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            ModuleTopology::MultiModule => {
                let mut units = Vec::new();

                for location in self
                    .registry
                    .module_locations(LocationRole::ModuleSourceInput)
                {
                    let module = location.module_name().map(str::to_string);

                    for handle in files.list(&location, "", &[FileKind::Source], true)? {
                        let Some(name) = files.infer_binary_name(&location, handle.path())? else {
                            continue;
                        };

                        units.push(CompilationUnit {
                            binary_name: name,
                            module: module.clone(),
                            handle,
                        });
                    }
                }

                units
            }
        };

        if units.is_empty() {
            return Err(HarnessError::NoInputs);
        }

        Ok(units)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Harness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("topology", &self.topology)
            .field("options", &self.options)
            .field("processors", &self.processors.len())
            .field("fs", &self.fs)
            .finish()
    }
}
