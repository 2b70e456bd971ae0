//! This module contains the [`FileSystem`] type itself.

use slab::Slab;
use std::ffi::OsString;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::node::{DirectoryNode, FileNode, Inode, Node, ROOT_INODE, time};
use crate::{DirEntry, FileType, FsError, Metadata, ReadDir, Result};

/// An in-memory file system rooted at `/`.
///
/// This `FileSystem` type can be cloned, it's a light copy of the
/// `FileSystemInner` (which is behind an `Arc` + `RwLock`).
#[derive(Clone, Default)]
pub struct FileSystem {
    pub(crate) inner: Arc<RwLock<FileSystemInner>>,
}

impl FileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonicalize a path without validating that it actually exists.
    pub fn canonicalize_unchecked(&self, path: &Path) -> Result<PathBuf> {
        let lock = self.inner.read().map_err(|_| FsError::Lock)?;
        lock.canonicalize_without_inode(path)
    }

    /// Create a directory, along with every missing ancestor. Creating
    /// a directory that already exists is a no-op.
    pub fn create_dir(&self, path: &Path) -> Result<()> {
        // Write lock.
        let mut fs = self.inner.write().map_err(|_| FsError::Lock)?;

        if fs.released {
            return Err(FsError::Closed);
        }

        let path = fs.canonicalize_without_inode(path)?;
        fs.ensure_directory_path(&path)?;

        Ok(())
    }

    /// Write `contents` to the file at `path`, creating the file and
    /// every missing ancestor directory as needed. An existing file is
    /// truncated first.
    pub fn create_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        // Write lock.
        let mut fs = self.inner.write().map_err(|_| FsError::Lock)?;

        if fs.released {
            return Err(FsError::Closed);
        }

        let path = fs.canonicalize_without_inode(path)?;

        // Check the path has a parent, i.e. that it does not name the root.
        let parent_of_path = path.parent().ok_or(FsError::PathConflict)?;

        // Check the file name.
        let name_of_file = path
            .file_name()
            .ok_or(FsError::InvalidPath)?
            .to_os_string();

        let inode_of_parent = fs.ensure_directory_path(parent_of_path)?;

        match fs.as_parent_get_position_and_inode(inode_of_parent, &name_of_file)? {
            // The file already exists: truncate and rewrite it.
            Some((_, inode_of_file)) => match fs.storage.get_mut(inode_of_file) {
                Some(Node::File(FileNode {
                    buffer, metadata, ..
                })) => {
                    buffer.clear();
                    buffer.extend_from_slice(contents);
                    metadata.len = contents.len() as u64;
                    metadata.modified = time();
                }

                _ => return Err(FsError::PathConflict),
            },

            // Creating the file in the storage.
            None => {
                let inode_of_file = fs.storage.vacant_entry().key();
                let real_inode_of_file = fs.storage.insert(Node::File(FileNode {
                    inode: inode_of_file,
                    name: name_of_file,
                    buffer: contents.to_vec(),
                    metadata: {
                        let time = time();

                        Metadata {
                            ft: FileType {
                                file: true,
                                ..Default::default()
                            },
                            accessed: time,
                            created: time,
                            modified: time,
                            len: contents.len() as u64,
                        }
                    },
                }));

                assert_eq!(
                    inode_of_file, real_inode_of_file,
                    "new file inode should have been correctly calculated",
                );

                // Adding the new file to its parent.
                fs.add_child_to_node(inode_of_parent, inode_of_file)?;
            }
        }

        Ok(())
    }

    /// Read the whole contents of the file at `path`.
    pub fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        // Read lock.
        let guard = self.inner.read().map_err(|_| FsError::Lock)?;

        if guard.released {
            return Err(FsError::Closed);
        }

        let (_, inode_of_file) = guard.canonicalize(path)?;

        match guard.storage.get(inode_of_file) {
            Some(Node::File(FileNode { buffer, .. })) => Ok(buffer.clone()),
            _ => Err(FsError::NotFound),
        }
    }

    /// Fetch the metadata of the node at `path`.
    pub fn metadata(&self, path: &Path) -> Result<Metadata> {
        // Read lock.
        let guard = self.inner.read().map_err(|_| FsError::Lock)?;

        if guard.released {
            return Err(FsError::Closed);
        }

        let (_, inode) = guard.canonicalize(path)?;

        guard
            .storage
            .get(inode)
            .map(|node| *node.metadata())
            .ok_or(FsError::NotFound)
    }

    /// Whether a node exists at `path`.
    pub fn exists(&self, path: &Path) -> Result<bool> {
        // Read lock.
        let guard = self.inner.read().map_err(|_| FsError::Lock)?;

        if guard.released {
            return Err(FsError::Closed);
        }

        let path = guard.canonicalize_without_inode(path)?;

        Ok(guard.inode_of(&path).is_ok())
    }

    /// Fetch the immediate children of the directory at `path` as
    /// `DirEntry` values.
    pub fn read_dir(&self, path: &Path) -> Result<ReadDir> {
        // Read lock.
        let guard = self.inner.read().map_err(|_| FsError::Lock)?;

        if guard.released {
            return Err(FsError::Closed);
        }

        let (path, inode_of_directory) = guard.canonicalize(path)?;

        let children = match guard.storage.get(inode_of_directory) {
            Some(Node::Directory(DirectoryNode { children, .. })) => children
                .iter()
                .filter_map(|inode| guard.storage.get(*inode))
                .map(|node| DirEntry {
                    path: {
                        let mut entry_path = path.clone();
                        entry_path.push(node.name());

                        entry_path
                    },
                    metadata: *node.metadata(),
                })
                .collect(),

            _ => return Err(FsError::NotFound),
        };

        Ok(ReadDir::new(children))
    }

    /// Remove the node at `path`, along with everything beneath it when
    /// it is a directory. Returns whether anything was actually
    /// removed, so deleting an absent path is not an error.
    pub fn delete(&self, path: &Path) -> Result<bool> {
        // Write lock.
        let mut fs = self.inner.write().map_err(|_| FsError::Lock)?;

        if fs.released {
            return Err(FsError::Closed);
        }

        let path = fs.canonicalize_without_inode(path)?;

        // The root itself stays, removing it would leave the tree unusable.
        let parent_of_path = path.parent().ok_or(FsError::InvalidPath)?;

        let name = path
            .file_name()
            .ok_or(FsError::InvalidPath)?
            .to_os_string();

        let inode_of_parent = match fs.inode_of(parent_of_path) {
            Ok(inode) => inode,
            Err(FsError::NotFound | FsError::PathConflict) => return Ok(false),
            Err(error) => return Err(error),
        };

        let (position, inode) = match fs.as_parent_get_position_and_inode(inode_of_parent, &name) {
            Ok(Some(found)) => found,
            Ok(None) | Err(FsError::PathConflict) => return Ok(false),
            Err(error) => return Err(error),
        };

        // Remove the child from the parent directory.
        fs.remove_child_from_node(inode_of_parent, position)?;

        // Remove the node and its whole subtree from the storage.
        fs.remove_subtree(inode);

        Ok(true)
    }

    /// Collect the files under `root` as a restartable iterator, depth
    /// first, in a stable order. The snapshot is taken at call time, so
    /// later mutations don't show up in an already-created [`Walk`].
    pub fn walk(&self, root: &Path, recurse: bool) -> Result<Walk> {
        // Read lock.
        let guard = self.inner.read().map_err(|_| FsError::Lock)?;

        if guard.released {
            return Err(FsError::Closed);
        }

        let (path, inode_of_root) = guard.canonicalize(root)?;

        match guard.storage.get(inode_of_root) {
            Some(Node::Directory(DirectoryNode { .. })) => {}
            _ => return Err(FsError::NotFound),
        }

        let mut files = Vec::new();
        guard.collect_files(inode_of_root, &path, recurse, &mut files);

        Ok(Walk {
            entries: files.into_iter(),
        })
    }

    /// Release the file system: all node storage is dropped and any
    /// later operation fails with [`FsError::Closed`]. Releasing twice
    /// is a no-op.
    pub fn release(&self) -> Result<()> {
        // Write lock.
        let mut fs = self.inner.write().map_err(|_| FsError::Lock)?;

        fs.released = true;
        fs.storage.clear();

        Ok(())
    }

    /// Whether [`FileSystem::release`] has been called.
    pub fn is_released(&self) -> bool {
        self.inner.read().map(|fs| fs.released).unwrap_or(true)
    }
}

impl fmt::Debug for FileSystem {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.read() {
            Ok(fs) => fs.fmt(formatter),
            Err(_) => writeln!(formatter, "(poisoned file system lock)"),
        }
    }
}

/// The core of the file system. It contains a collection of `Node`s,
/// indexed by their respective `Inode` in a slab.
pub(crate) struct FileSystemInner {
    pub(crate) storage: Slab<Node>,
    pub(crate) released: bool,
}

impl FileSystemInner {
    /// Get the inode associated to a path if it exists.
    pub(crate) fn inode_of(&self, path: &Path) -> Result<Inode> {
        let mut node = self.storage.get(ROOT_INODE).ok_or(FsError::Closed)?;
        let mut components = path.components();

        match components.next() {
            Some(Component::RootDir) => {}
            _ => return Err(FsError::InvalidPath),
        }

        for component in components {
            node = match node {
                Node::Directory(DirectoryNode { children, .. }) => children
                    .iter()
                    .filter_map(|inode| self.storage.get(*inode))
                    .find(|node| node.name() == component.as_os_str())
                    .ok_or(FsError::NotFound)?,

                // A file sits where a directory was expected.
                _ => return Err(FsError::PathConflict),
            };
        }

        Ok(node.inode())
    }

    /// Walk `path` from the root, creating every missing directory on
    /// the way, and return the inode of the last component. `path` must
    /// already be canonical.
    pub(crate) fn ensure_directory_path(&mut self, path: &Path) -> Result<Inode> {
        let mut inode_of_parent = ROOT_INODE;
        let mut components = path.components();

        match components.next() {
            Some(Component::RootDir) => {}
            _ => return Err(FsError::InvalidPath),
        }

        for component in components {
            let name = component.as_os_str();

            let existing = match self.storage.get(inode_of_parent) {
                Some(Node::Directory(DirectoryNode { children, .. })) => children
                    .iter()
                    .filter_map(|inode| self.storage.get(*inode))
                    .find(|node| node.name() == name)
                    .map(Node::inode),

                _ => return Err(FsError::PathConflict),
            };

            inode_of_parent = match existing {
                Some(inode) => match self.storage.get(inode) {
                    Some(Node::Directory(DirectoryNode { .. })) => inode,

                    // A file sits where the directory should go.
                    _ => return Err(FsError::PathConflict),
                },

                // Creating the directory in the storage.
                None => {
                    let inode_of_directory = self.storage.vacant_entry().key();
                    let real_inode_of_directory =
                        self.storage.insert(Node::Directory(DirectoryNode {
                            inode: inode_of_directory,
                            name: name.to_os_string(),
                            children: Vec::new(),
                            metadata: {
                                let time = time();

                                Metadata {
                                    ft: FileType {
                                        dir: true,
                                        ..Default::default()
                                    },
                                    accessed: time,
                                    created: time,
                                    modified: time,
                                    len: 0,
                                }
                            },
                        }));

                    assert_eq!(
                        inode_of_directory, real_inode_of_directory,
                        "new directory inode should have been correctly calculated",
                    );

                    self.add_child_to_node(inode_of_parent, inode_of_directory)?;

                    inode_of_directory
                }
            };
        }

        Ok(inode_of_parent)
    }

    /// From the inode of a parent node (so, a directory), returns the
    /// child index of `name` along with its inode, whatever the kind of
    /// node is (directory or file).
    pub(crate) fn as_parent_get_position_and_inode(
        &self,
        inode_of_parent: Inode,
        name: &OsString,
    ) -> Result<Option<(usize, Inode)>> {
        match self.storage.get(inode_of_parent) {
            Some(Node::Directory(DirectoryNode { children, .. })) => Ok(children
                .iter()
                .enumerate()
                .filter_map(|(nth, inode)| self.storage.get(*inode).map(|node| (nth, node)))
                .find(|(_, node)| node.name() == name.as_os_str())
                .map(|(nth, node)| (nth, node.inode()))),

            _ => Err(FsError::PathConflict),
        }
    }

    /// Add a child to a directory node represented by `inode`.
    ///
    /// This function also updates the modified time of the directory.
    pub(crate) fn add_child_to_node(&mut self, inode: Inode, new_child: Inode) -> Result<()> {
        match self.storage.get_mut(inode) {
            Some(Node::Directory(DirectoryNode {
                children,
                metadata: Metadata { modified, .. },
                ..
            })) => {
                children.push(new_child);
                *modified = time();

                Ok(())
            }
            _ => Err(FsError::PathConflict),
        }
    }

    /// Remove the child at position `position` of a directory node
    /// represented by `inode`.
    ///
    /// This function also updates the modified time of the directory.
    pub(crate) fn remove_child_from_node(&mut self, inode: Inode, position: usize) -> Result<()> {
        match self.storage.get_mut(inode) {
            Some(Node::Directory(DirectoryNode {
                children,
                metadata: Metadata { modified, .. },
                ..
            })) => {
                children.remove(position);
                *modified = time();

                Ok(())
            }
            _ => Err(FsError::PathConflict),
        }
    }

    /// Remove `inode` and every node reachable beneath it from the
    /// storage.
    pub(crate) fn remove_subtree(&mut self, inode: Inode) {
        let mut remaining = vec![inode];

        while let Some(next) = remaining.pop() {
            if let Some(Node::Directory(DirectoryNode { children, .. })) =
                self.storage.try_remove(next)
            {
                remaining.extend(children);
            }
        }
    }

    /// Collect the paths of the files reachable from the directory
    /// `inode`, in child insertion order.
    fn collect_files(&self, inode: Inode, base: &Path, recurse: bool, out: &mut Vec<PathBuf>) {
        if let Some(Node::Directory(DirectoryNode { children, .. })) = self.storage.get(inode) {
            for child in children.iter().filter_map(|inode| self.storage.get(*inode)) {
                match child {
                    Node::File(FileNode { name, .. }) => out.push(base.join(name)),

                    Node::Directory(DirectoryNode { inode, name, .. }) if recurse => {
                        self.collect_files(*inode, &base.join(name), recurse, out);
                    }

                    Node::Directory(DirectoryNode { .. }) => {}
                }
            }
        }
    }

    /// Canonicalize a path, i.e. try to resolve to a canonical,
    /// absolute form of the path with all intermediate components
    /// normalized:
    ///
    /// * A path must start with a root (`/`),
    /// * A path can contain `..` or `.` components,
    /// * A path must not contain a Windows prefix (`C:` or `\\server`),
    /// * A normalized path exists in the file system.
    pub(crate) fn canonicalize(&self, path: &Path) -> Result<(PathBuf, Inode)> {
        let new_path = self.canonicalize_without_inode(path)?;
        let inode = self.inode_of(&new_path)?;

        Ok((new_path, inode))
    }

    /// Like `Self::canonicalize` but without returning the inode of the
    /// path, which means that there is no guarantee that the path
    /// exists in the file system.
    pub(crate) fn canonicalize_without_inode(&self, path: &Path) -> Result<PathBuf> {
        let mut components = path.components();

        match components.next() {
            Some(Component::RootDir) => {}
            _ => return Err(FsError::InvalidPath),
        }

        let mut new_path = PathBuf::with_capacity(path.as_os_str().len());
        new_path.push("/");

        for component in components {
            match component {
                // That's an error to get a `RootDir` a second time.
                Component::RootDir => return Err(FsError::InvalidPath),

                // Nothing to do on `new_path`.
                Component::CurDir => (),

                // Pop the lastly inserted component on `new_path` if
                // any, otherwise it's an error.
                Component::ParentDir => {
                    if !new_path.pop() {
                        return Err(FsError::InvalidPath);
                    }
                }

                // A normal component.
                Component::Normal(name) => {
                    new_path.push(name);
                }

                // We don't support Windows path prefixes.
                Component::Prefix(_) => return Err(FsError::InvalidPath),
            }
        }

        Ok(new_path)
    }
}

impl fmt::Debug for FileSystemInner {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(root) = self.storage.get(ROOT_INODE) else {
            return writeln!(formatter, "\n(released file system)");
        };

        writeln!(
            formatter,
            "\n{inode:<8}    {ty:<4}    name",
            inode = "inode",
            ty = "type",
        )?;

        fn debug(
            nodes: Vec<&Node>,
            slf: &FileSystemInner,
            formatter: &mut fmt::Formatter<'_>,
            indentation: usize,
        ) -> fmt::Result {
            for node in nodes {
                writeln!(
                    formatter,
                    "{inode:<8}    {ty:<4}   {indentation_symbol:indentation_width$}{name}",
                    inode = node.inode(),
                    ty = match node {
                        Node::File { .. } => "file",
                        Node::Directory { .. } => "dir",
                    },
                    name = node.name().to_string_lossy(),
                    indentation_symbol = " ",
                    indentation_width = indentation * 2 + 1,
                )?;

                if let Node::Directory(DirectoryNode { children, .. }) = node {
                    debug(
                        children
                            .iter()
                            .filter_map(|inode| slf.storage.get(*inode))
                            .collect(),
                        slf,
                        formatter,
                        indentation + 1,
                    )?;
                }
            }

            Ok(())
        }

        debug(vec![root], self, formatter, 0)
    }
}

impl Default for FileSystemInner {
    fn default() -> Self {
        let time = time();

        let mut slab = Slab::new();
        slab.insert(Node::Directory(DirectoryNode {
            inode: ROOT_INODE,
            name: OsString::from("/"),
            children: Vec::new(),
            metadata: Metadata {
                ft: FileType {
                    dir: true,
                    ..Default::default()
                },
                accessed: time,
                created: time,
                modified: time,
                len: 0,
            },
        }));

        Self {
            storage: slab,
            released: false,
        }
    }
}

/// Iterator over the file paths collected by [`FileSystem::walk`].
#[derive(Debug)]
pub struct Walk {
    entries: std::vec::IntoIter<PathBuf>,
}

impl Iterator for Walk {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        self.entries.next()
    }
}

#[cfg(test)]
mod test_filesystem {
    use crate::node::*;
    use crate::{FileSystem, FsError};

    macro_rules! path {
        ($path:expr) => {
            std::path::Path::new($path)
        };

        (buf $path:expr) => {
            std::path::PathBuf::from($path)
        };
    }

    #[test]
    fn test_new_filesystem() {
        let fs = FileSystem::default();
        let fs_inner = fs.inner.read().unwrap();

        assert_eq!(fs_inner.storage.len(), 1, "storage has a root");
        assert!(
            matches!(
                fs_inner.storage.get(ROOT_INODE),
                Some(Node::Directory(DirectoryNode {
                    inode: ROOT_INODE,
                    name,
                    children,
                    ..
                })) if name == "/" && children.is_empty(),
            ),
            "storage has a well-defined root",
        );
    }

    #[test]
    fn test_create_dir() {
        let fs = FileSystem::default();

        assert_eq!(
            fs.create_dir(path!("foo")),
            Err(FsError::InvalidPath),
            "creating a directory from a relative path",
        );

        assert_eq!(
            fs.create_dir(path!("/")),
            Ok(()),
            "creating the root is a no-op",
        );

        assert_eq!(fs.create_dir(path!("/foo")), Ok(()), "creating a directory",);

        {
            let fs_inner = fs.inner.read().unwrap();
            assert_eq!(
                fs_inner.storage.len(),
                2,
                "storage contains the new directory",
            );
            assert!(
                matches!(
                    fs_inner.storage.get(ROOT_INODE),
                    Some(Node::Directory(DirectoryNode {
                        inode: ROOT_INODE,
                        name,
                        children,
                        ..
                    })) if name == "/" && children == &[1]
                ),
                "the root is updated and well-defined",
            );
            assert!(
                matches!(
                    fs_inner.storage.get(1),
                    Some(Node::Directory(DirectoryNode {
                        inode: 1,
                        name,
                        children,
                        ..
                    })) if name == "foo" && children.is_empty(),
                ),
                "the new directory is well-defined",
            );
        }

        assert_eq!(
            fs.create_dir(path!("/foo")),
            Ok(()),
            "creating the same directory again is a no-op",
        );

        {
            let fs_inner = fs.inner.read().unwrap();
            assert_eq!(fs_inner.storage.len(), 2, "storage has not grown");
        }

        assert_eq!(
            fs.create_dir(path!("/bar/baz/qux")),
            Ok(()),
            "creating a nested directory with missing ancestors",
        );

        {
            let fs_inner = fs.inner.read().unwrap();
            assert_eq!(
                fs_inner.storage.len(),
                5,
                "storage contains the whole new branch",
            );
            assert!(
                matches!(
                    fs_inner.storage.get(2),
                    Some(Node::Directory(DirectoryNode {
                        inode: 2,
                        name,
                        children,
                        ..
                    })) if name == "bar" && children == &[3]
                ),
                "the first missing ancestor is well-defined",
            );
        }
    }

    #[test]
    fn test_create_file() {
        let fs = FileSystem::default();

        assert_eq!(
            fs.create_file(path!("/foo/hello.txt"), b"Hello, World!"),
            Ok(()),
            "creating a file with a missing parent",
        );

        {
            let fs_inner = fs.inner.read().unwrap();
            assert_eq!(
                fs_inner.storage.len(),
                3,
                "storage contains the parent and the file",
            );
            assert!(
                matches!(
                    fs_inner.storage.get(2),
                    Some(Node::File(FileNode {
                        inode: 2,
                        name,
                        buffer,
                        ..
                    })) if name == "hello.txt" && buffer == b"Hello, World!",
                ),
                "the new file is well-defined",
            );
        }

        assert_eq!(
            fs.create_file(path!("/foo/hello.txt"), b"Bye!"),
            Ok(()),
            "rewriting an existing file",
        );

        {
            let fs_inner = fs.inner.read().unwrap();
            assert_eq!(fs_inner.storage.len(), 3, "storage has not grown");
            assert!(
                matches!(
                    fs_inner.storage.get(2),
                    Some(Node::File(FileNode {
                        inode: 2,
                        buffer,
                        metadata,
                        ..
                    })) if buffer == b"Bye!" && metadata.len == 4,
                ),
                "the file was truncated and rewritten",
            );
        }

        assert_eq!(
            fs.create_file(path!("/foo"), b""),
            Err(FsError::PathConflict),
            "creating a file where a directory sits",
        );

        assert_eq!(
            fs.create_file(path!("/foo/hello.txt/nested.txt"), b""),
            Err(FsError::PathConflict),
            "creating a file beneath a file",
        );

        assert_eq!(
            fs.create_file(path!("/"), b""),
            Err(FsError::PathConflict),
            "creating a file over the root",
        );
    }

    #[test]
    fn test_read_file() {
        let fs = FileSystem::default();

        assert_eq!(
            fs.create_file(path!("/foo/hello.txt"), b"Hello, World!"),
            Ok(()),
            "creating a file",
        );

        assert_eq!(
            fs.read_file(path!("/foo/hello.txt")).as_deref(),
            Ok(&b"Hello, World!"[..]),
            "reading the file back",
        );

        assert_eq!(
            fs.read_file(path!("/foo/absent.txt")),
            Err(FsError::NotFound),
            "reading a file that does not exist",
        );

        assert_eq!(
            fs.read_file(path!("/foo")),
            Err(FsError::NotFound),
            "reading a directory as a file",
        );
    }

    #[test]
    fn test_exists_and_metadata() {
        let fs = FileSystem::default();

        assert_eq!(
            fs.exists(path!("/foo/hello.txt")),
            Ok(false),
            "an absent path does not exist",
        );

        assert_eq!(
            fs.exists(path!("relative.txt")),
            Err(FsError::InvalidPath),
            "a relative path is refused",
        );

        assert_eq!(
            fs.create_file(path!("/foo/hello.txt"), b"Hello, World!"),
            Ok(()),
            "creating a file",
        );

        assert_eq!(fs.exists(path!("/foo/hello.txt")), Ok(true), "file exists");
        assert_eq!(fs.exists(path!("/foo")), Ok(true), "parent exists");

        let metadata = fs
            .metadata(path!("/foo/hello.txt"))
            .expect("metadata of an existing file");
        assert!(metadata.is_file(), "the node is a file");
        assert_eq!(metadata.len(), 13, "the length tracks the buffer");

        let metadata = fs
            .metadata(path!("/foo"))
            .expect("metadata of an existing directory");
        assert!(metadata.is_dir(), "the node is a directory");

        assert_eq!(
            fs.metadata(path!("/absent")),
            Err(FsError::NotFound),
            "metadata of an absent path",
        );
    }

    #[test]
    fn test_canonicalization() {
        let fs = FileSystem::default();

        assert_eq!(
            fs.create_file(path!("/foo/bar/../hello.txt"), b"dot dot"),
            Ok(()),
            "parent components are resolved before the walk",
        );

        assert_eq!(
            fs.read_file(path!("/foo/./hello.txt")).as_deref(),
            Ok(&b"dot dot"[..]),
            "current-directory components are dropped",
        );

        assert_eq!(
            fs.canonicalize_unchecked(path!("/a/b/../c/./d")),
            Ok(path!(buf "/a/c/d")),
            "canonicalization without existence check",
        );

        assert_eq!(
            fs.canonicalize_unchecked(path!("/..")),
            Err(FsError::InvalidPath),
            "escaping the root is refused",
        );

        assert_eq!(
            fs.canonicalize_unchecked(path!("./relative")),
            Err(FsError::InvalidPath),
            "a relative path is refused",
        );
    }

    #[test]
    fn test_delete() {
        let fs = FileSystem::default();

        assert_eq!(
            fs.delete(path!("/")),
            Err(FsError::InvalidPath),
            "the root cannot be deleted",
        );

        assert_eq!(
            fs.delete(path!("/absent.txt")),
            Ok(false),
            "deleting an absent path reports nothing removed",
        );

        assert_eq!(
            fs.create_file(path!("/foo/bar/hello.txt"), b"Hello, World!"),
            Ok(()),
        );
        assert_eq!(fs.create_file(path!("/foo/bar/bye.txt"), b"Bye!"), Ok(()));
        assert_eq!(fs.create_file(path!("/foo/top.txt"), b"top"), Ok(()));

        {
            let fs_inner = fs.inner.read().unwrap();
            assert_eq!(fs_inner.storage.len(), 6, "storage contains the tree");
        }

        assert_eq!(
            fs.delete(path!("/foo/bar/hello.txt")),
            Ok(true),
            "deleting a single file",
        );

        assert_eq!(
            fs.delete(path!("/foo/bar/hello.txt")),
            Ok(false),
            "deleting the same file twice reports nothing removed",
        );

        assert_eq!(
            fs.delete(path!("/foo")),
            Ok(true),
            "deleting a directory removes the whole subtree",
        );

        {
            let fs_inner = fs.inner.read().unwrap();
            assert_eq!(fs_inner.storage.len(), 1, "only the root is left");
        }

        assert_eq!(
            fs.exists(path!("/foo/top.txt")),
            Ok(false),
            "children of the deleted directory are gone",
        );
    }

    #[test]
    fn test_walk() {
        let fs = FileSystem::default();

        assert_eq!(fs.create_file(path!("/sources/A.java"), b"class A {}"), Ok(()));
        assert_eq!(fs.create_file(path!("/sources/B.java"), b"class B {}"), Ok(()));
        assert_eq!(
            fs.create_file(path!("/sources/pkg/C.java"), b"class C {}"),
            Ok(()),
        );
        assert_eq!(fs.create_dir(path!("/sources/empty")), Ok(()));

        let files: Vec<_> = fs
            .walk(path!("/sources"), true)
            .expect("walking an existing directory")
            .collect();
        assert_eq!(
            files,
            vec![
                path!(buf "/sources/A.java"),
                path!(buf "/sources/B.java"),
                path!(buf "/sources/pkg/C.java"),
            ],
            "a recursive walk lists every file in insertion order",
        );

        let files: Vec<_> = fs
            .walk(path!("/sources"), false)
            .expect("walking without recursion")
            .collect();
        assert_eq!(
            files,
            vec![path!(buf "/sources/A.java"), path!(buf "/sources/B.java")],
            "a flat walk stays at the top level",
        );

        assert_eq!(
            fs.walk(path!("/absent"), true).map(|_| ()),
            Err(FsError::NotFound),
            "walking an absent root",
        );

        assert_eq!(
            fs.walk(path!("/sources/A.java"), true).map(|_| ()),
            Err(FsError::NotFound),
            "walking a file",
        );

        let walk = fs
            .walk(path!("/sources"), true)
            .expect("walking before a mutation");
        assert_eq!(
            fs.create_file(path!("/sources/D.java"), b"class D {}"),
            Ok(()),
        );
        assert_eq!(
            walk.count(),
            3,
            "an already-created walk does not see later mutations",
        );
    }

    #[test]
    fn test_release() {
        let fs = FileSystem::default();

        assert_eq!(
            fs.create_file(path!("/foo/hello.txt"), b"Hello, World!"),
            Ok(()),
        );

        assert!(!fs.is_released(), "a fresh file system is not released");
        assert_eq!(fs.release(), Ok(()), "releasing the file system");
        assert!(fs.is_released(), "the file system reports being released");

        {
            let fs_inner = fs.inner.read().unwrap();
            assert_eq!(fs_inner.storage.len(), 0, "the storage was dropped");
        }

        assert_eq!(
            fs.read_file(path!("/foo/hello.txt")),
            Err(FsError::Closed),
            "reading after release",
        );
        assert_eq!(
            fs.create_file(path!("/foo/new.txt"), b""),
            Err(FsError::Closed),
            "writing after release",
        );
        assert_eq!(
            fs.delete(path!("/foo")),
            Err(FsError::Closed),
            "deleting after release",
        );
        assert_eq!(
            fs.walk(path!("/"), true).map(|_| ()),
            Err(FsError::Closed),
            "walking after release",
        );
        assert_eq!(
            fs.exists(path!("/foo")),
            Err(FsError::Closed),
            "probing after release",
        );

        assert_eq!(fs.release(), Ok(()), "releasing twice is a no-op");
    }

    #[test]
    fn test_read_dir() {
        let fs = FileSystem::default();

        assert_eq!(fs.create_file(path!("/foo/a.txt"), b"a"), Ok(()));
        assert_eq!(fs.create_dir(path!("/foo/sub")), Ok(()));

        let entries: Vec<_> = fs
            .read_dir(path!("/foo"))
            .expect("reading an existing directory")
            .collect();

        assert_eq!(entries.len(), 2, "both children are listed");
        assert_eq!(entries[0].path(), path!(buf "/foo/a.txt"));
        assert!(entries[0].file_type().is_file());
        assert_eq!(entries[1].path(), path!(buf "/foo/sub"));
        assert!(entries[1].file_type().is_dir());

        assert_eq!(
            fs.read_dir(path!("/absent")).map(|_| ()),
            Err(FsError::NotFound),
            "reading an absent directory",
        );
    }

    #[test]
    fn test_debug_rendering() {
        let fs = FileSystem::default();

        assert_eq!(fs.create_file(path!("/foo/hello.txt"), b"Hello"), Ok(()));

        let rendering = format!("{fs:?}");
        assert!(rendering.contains("foo"), "the tree rendering names nodes");
        assert!(
            rendering.contains("hello.txt"),
            "the tree rendering descends into directories",
        );

        assert_eq!(fs.release(), Ok(()));
        let rendering = format!("{fs:?}");
        assert!(
            rendering.contains("released"),
            "a released tree renders as such",
        );
    }
}
