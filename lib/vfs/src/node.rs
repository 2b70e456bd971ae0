use std::ffi::{OsStr, OsString};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::Metadata;

pub(crate) type Inode = usize;
pub(crate) const ROOT_INODE: Inode = 0;

#[derive(Debug)]
pub(crate) struct FileNode {
    pub inode: Inode,
    pub name: OsString,
    pub buffer: Vec<u8>,
    pub metadata: Metadata,
}

#[derive(Debug)]
pub(crate) struct DirectoryNode {
    pub inode: Inode,
    pub name: OsString,
    pub children: Vec<Inode>,
    pub metadata: Metadata,
}

#[derive(Debug)]
pub(crate) enum Node {
    File(FileNode),
    Directory(DirectoryNode),
}

impl Node {
    pub(crate) fn inode(&self) -> Inode {
        *match self {
            Self::File(FileNode { inode, .. }) => inode,
            Self::Directory(DirectoryNode { inode, .. }) => inode,
        }
    }

    pub(crate) fn name(&self) -> &OsStr {
        match self {
            Self::File(FileNode { name, .. }) => name.as_os_str(),
            Self::Directory(DirectoryNode { name, .. }) => name.as_os_str(),
        }
    }

    pub(crate) fn metadata(&self) -> &Metadata {
        match self {
            Self::File(FileNode { metadata, .. }) => metadata,
            Self::Directory(DirectoryNode { metadata, .. }) => metadata,
        }
    }
}

pub(crate) fn time() -> u64 {
    // SAFETY: the system clock is not expected to sit before `UNIX_EPOCH`.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
}
