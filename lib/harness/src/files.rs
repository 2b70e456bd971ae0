//! The file-access surface handed to the toolchain.
//!
//! [`FileManager`] resolves every location the harness owns purely
//! against the virtual tree, and falls back to a [`DelegateFileManager`]
//! for the rest (typically pre-compiled classpath entries sitting on the
//! real file system).

use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crucible_vfs::FileSystem;

use crate::error::{HarnessError, Result};
use crate::location::{Location, LocationRegistry, LocationRole};

/// The kinds of files a toolchain distinguishes, together with their
/// extensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// A compilable source file.
    Source,
    /// A compiled class artifact.
    Class,
    /// A generated native header.
    Header,
    /// Anything else (resources, manifests, ...).
    Other,
}

impl FileKind {
    /// The file extension of this kind, including the leading dot.
    /// [`FileKind::Other`] carries no extension of its own.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Source => ".java",
            Self::Class => ".class",
            Self::Header => ".h",
            Self::Other => "",
        }
    }

    /// Classify a path by its extension.
    pub fn of(path: &Path) -> Self {
        match path.extension().and_then(|extension| extension.to_str()) {
            Some("java") => Self::Source,
            Some("class") => Self::Class,
            Some("h") => Self::Header,
            _ => Self::Other,
        }
    }
}

/// Where the bytes behind a [`FileHandle`] live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileOrigin {
    /// The harness-owned virtual tree.
    Virtual,
    /// The delegate file manager.
    Delegate,
}

/// A resolved file the toolchain can read (and, for virtual origins,
/// that the harness wrote or the toolchain produced).
///
/// Two handles denote the same file iff their resolved paths, kinds and
/// origins are equal, which the derived `PartialEq` provides.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileHandle {
    path: PathBuf,
    kind: FileKind,
    origin: FileOrigin,
}

impl FileHandle {
    pub(crate) fn new(path: PathBuf, kind: FileKind, origin: FileOrigin) -> Self {
        Self { path, kind, origin }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn origin(&self) -> FileOrigin {
        self.origin
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// The narrow contract the harness needs from a real, file-system
/// backed file manager. Only consulted for locations the registry does
/// not own.
pub trait DelegateFileManager: Send + Sync {
    /// List the files under `package`, filtered down to `kinds`.
    fn list(&self, package: &str, kinds: &[FileKind], recurse: bool)
    -> io::Result<Vec<FileHandle>>;

    /// Read the whole contents of a previously listed file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Whether `path` belongs to this manager.
    fn contains(&self, path: &Path) -> io::Result<bool>;
}

/// A [`DelegateFileManager`] rooted at real directories, in root order.
///
/// Listings are sorted per directory so repeated runs see the same
/// order regardless of the host file system.
#[derive(Debug, Default)]
pub struct HostFileManager {
    roots: Vec<PathBuf>,
}

impl HostFileManager {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
        }
    }

    fn collect(
        dir: &Path,
        kinds: &[FileKind],
        recurse: bool,
        out: &mut Vec<FileHandle>,
    ) -> io::Result<()> {
        let mut entries: Vec<_> = fs::read_dir(dir)?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<io::Result<_>>()?;
        entries.sort();

        for path in entries {
            if path.is_dir() {
                if recurse {
                    Self::collect(&path, kinds, recurse, out)?;
                }
            } else if kinds.contains(&FileKind::of(&path)) {
                out.push(FileHandle::new(
                    path.clone(),
                    FileKind::of(&path),
                    FileOrigin::Delegate,
                ));
            }
        }

        Ok(())
    }
}

impl DelegateFileManager for HostFileManager {
    fn list(
        &self,
        package: &str,
        kinds: &[FileKind],
        recurse: bool,
    ) -> io::Result<Vec<FileHandle>> {
        let relative: PathBuf = package.split('.').filter(|s| !s.is_empty()).collect();
        let mut out = Vec::new();

        for root in &self.roots {
            let dir = root.join(&relative);

            match Self::collect(&dir, kinds, recurse, &mut out) {
                Ok(()) => {}
                // Packages are materialized lazily by writers, so an
                // absent directory means "nothing here yet".
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) => return Err(error),
            }
        }

        Ok(out)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn contains(&self, path: &Path) -> io::Result<bool> {
        Ok(self.roots.iter().any(|root| path.starts_with(root)))
    }
}

/// Turn a binary name into the path of the corresponding file beneath
/// `root`: package separators become path separators and the kind's
/// extension is appended.
pub(crate) fn path_below(root: &Path, binary_name: &str, kind: FileKind) -> PathBuf {
    let mut relative = binary_name.replace('.', "/");
    relative.push_str(kind.extension());

    root.join(relative)
}

/// The file-resolution surface the toolchain compiles against.
///
/// Cloning is cheap; clones share the same virtual tree, registry and
/// delegate.
#[derive(Clone)]
pub struct FileManager {
    fs: FileSystem,
    registry: Arc<LocationRegistry>,
    delegate: Option<Arc<dyn DelegateFileManager>>,
}

impl FileManager {
    pub(crate) fn new(
        fs: FileSystem,
        registry: Arc<LocationRegistry>,
        delegate: Option<Arc<dyn DelegateFileManager>>,
    ) -> Self {
        Self {
            fs,
            registry,
            delegate,
        }
    }

    /// The location of module `name` beneath `role`, recorded lazily.
    pub fn module_location(&self, role: LocationRole, name: &str) -> Result<Location> {
        self.registry.module_location_for(role, name)
    }

    /// The path a file of kind `kind` for `binary_name` resolves to
    /// beneath `location`.
    pub fn path_for(
        &self,
        location: &Location,
        binary_name: &str,
        kind: FileKind,
    ) -> Result<PathBuf> {
        let root = self.registry.path_of(location)?;

        Ok(path_below(&root, binary_name, kind))
    }

    /// The exact inverse of [`FileManager::path_for`]: strip the
    /// location's root prefix and the kind extension, then substitute
    /// the separators back. Total over every kind `path_for` produces;
    /// [`FileKind::Other`] carries no extension, so its stem is the
    /// whole relative path. `None` when `path` does not sit beneath
    /// `location`.
    pub fn infer_binary_name(&self, location: &Location, path: &Path) -> Result<Option<String>> {
        let root = self.registry.path_of(location)?;

        let Ok(relative) = path.strip_prefix(&root) else {
            return Ok(None);
        };

        let relative = relative.to_string_lossy();
        let stem = relative
            .strip_suffix(FileKind::of(path).extension())
            .unwrap_or(&relative);

        if stem.is_empty() {
            return Ok(None);
        }

        Ok(Some(stem.replace('/', ".")))
    }

    /// The module a file beneath a module-oriented `location` belongs
    /// to: the first path segment after the role root.
    pub fn infer_module_name(&self, location: &Location, path: &Path) -> Result<String> {
        let role = location.role();

        if !role.is_module_oriented() {
            return Err(HarnessError::UnsupportedLocation(format!(
                "{role} is not module oriented"
            )));
        }

        let segment = path
            .strip_prefix(role.root())
            .ok()
            .and_then(|relative| relative.components().next())
            .and_then(|component| match component {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            });

        segment.ok_or_else(|| {
            HarnessError::UnsupportedLocation(format!(
                "`{}` does not sit beneath {role}",
                path.display()
            ))
        })
    }

    /// List the files of the given `kinds` beneath `location`, narrowed
    /// to `package`. A package directory that was never written to
    /// yields an empty listing, never an error.
    pub fn list(
        &self,
        location: &Location,
        package: &str,
        kinds: &[FileKind],
        recurse: bool,
    ) -> Result<Vec<FileHandle>> {
        if !self.registry.is_known(location) {
            tracing::trace!(
                %location,
                package,
                "delegating a listing to the real file manager",
            );
            return self.delegate_list(package, kinds, recurse);
        }

        let mut dir = self.registry.path_of(location)?;
        for segment in package.split('.').filter(|s| !s.is_empty()) {
            dir.push(segment);
        }

        match self.fs.walk(&dir, recurse) {
            Ok(walk) => Ok(walk
                .filter(|path| kinds.contains(&FileKind::of(path)))
                .map(|path| {
                    let kind = FileKind::of(&path);
                    FileHandle::new(path, kind, FileOrigin::Virtual)
                })
                .collect()),
            // Lazily created packages may not exist yet.
            Err(crucible_vfs::FsError::NotFound) => Ok(Vec::new()),
            Err(error) => Err(error.into()),
        }
    }

    fn delegate_list(
        &self,
        package: &str,
        kinds: &[FileKind],
        recurse: bool,
    ) -> Result<Vec<FileHandle>> {
        match &self.delegate {
            Some(delegate) => Ok(delegate.list(package, kinds, recurse)?),
            None => Ok(Vec::new()),
        }
    }

    /// Whether two handles denote the same file.
    pub fn is_same_file(&self, a: &FileHandle, b: &FileHandle) -> bool {
        a == b
    }

    /// Whether `handle` belongs to `location`.
    pub fn contains(&self, location: &Location, handle: &FileHandle) -> Result<bool> {
        if !self.registry.is_known(location) {
            return match (&self.delegate, handle.origin()) {
                (Some(delegate), FileOrigin::Delegate) => Ok(delegate.contains(handle.path())?),
                _ => Ok(false),
            };
        }

        if handle.origin() != FileOrigin::Virtual {
            return Ok(false);
        }

        let root = self.registry.path_of(location)?;

        Ok(handle.path().starts_with(&root))
    }

    /// Read the whole contents of `handle`.
    pub fn read(&self, handle: &FileHandle) -> Result<Vec<u8>> {
        match handle.origin() {
            FileOrigin::Virtual => Ok(self.fs.read_file(handle.path())?),
            FileOrigin::Delegate => {
                tracing::trace!(
                    path=%handle.path().display(),
                    "delegating a read to the real file manager",
                );
                match &self.delegate {
                    Some(delegate) => Ok(delegate.read(handle.path())?),
                    None => Err(HarnessError::UnsupportedLocation(format!(
                        "no delegate to read `{}`",
                        handle.path().display()
                    ))),
                }
            }
        }
    }

    /// Write the file of kind `kind` for `binary_name` beneath
    /// `location`, creating every missing package directory. Writes are
    /// only accepted into harness-owned locations.
    pub fn write(
        &self,
        location: &Location,
        binary_name: &str,
        kind: FileKind,
        contents: &[u8],
    ) -> Result<FileHandle> {
        if !self.registry.is_known(location) {
            return Err(HarnessError::UnsupportedLocation(format!(
                "cannot write into {location}"
            )));
        }

        let path = self.path_for(location, binary_name, kind)?;
        self.fs.create_file(&path, contents)?;

        Ok(FileHandle::new(path, kind, FileOrigin::Virtual))
    }

    /// Write a resource at `relative` beneath `location`, bypassing the
    /// binary-name mapping. A `relative` that resolves outside the
    /// location's subtree is refused.
    pub fn write_resource(
        &self,
        location: &Location,
        relative: &str,
        contents: &[u8],
    ) -> Result<FileHandle> {
        if !self.registry.is_known(location) {
            return Err(HarnessError::UnsupportedLocation(format!(
                "cannot write into {location}"
            )));
        }

        let root = self.registry.path_of(location)?;
        let path = self.fs.canonicalize_unchecked(&root.join(relative))?;

        if !path.starts_with(&root) {
            return Err(HarnessError::UnsupportedLocation(format!(
                "`{relative}` escapes {location}"
            )));
        }

        self.fs.create_file(&path, contents)?;

        Ok(FileHandle::new(
            path.clone(),
            FileKind::of(&path),
            FileOrigin::Virtual,
        ))
    }

    /// Whether a file for `binary_name` of kind `kind` exists beneath
    /// `location`.
    pub fn exists(&self, location: &Location, binary_name: &str, kind: FileKind) -> Result<bool> {
        let path = self.path_for(location, binary_name, kind)?;

        Ok(self.fs.exists(&path)?)
    }

    pub(crate) fn fs(&self) -> &FileSystem {
        &self.fs
    }
}

impl fmt::Debug for FileManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileManager")
            .field("fs", &self.fs)
            .field("registry", &self.registry)
            .field("delegate", &self.delegate.is_some())
            .finish()
    }
}
