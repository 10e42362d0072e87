//! Purpose: Open a database file read-only and resolve its top array into tables.
//! Exports: `RealmFile`, `Group`.
//! Role: Owns the byte buffer (memory-mapped or in-memory) every other view borrows.
//! Invariants: The header is validated on open; nothing is ever written back.
//! Invariants: Top array layout is `[tableNamesRef, tablesRef, taggedLogicalFileSize, ...]`.
use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::header::{FileHeader, TopRef};
use crate::core::leaf::ShortStringLeaf;
use crate::core::node::{Node, RefValue};
use crate::core::table::Table;

#[derive(Debug)]
enum Storage {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

#[derive(Debug)]
pub struct RealmFile {
    path: Option<PathBuf>,
    storage: Storage,
    header: FileHeader,
}

impl RealmFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|err| Error::new(ErrorKind::Io).with_path(&path).with_source(err))?;

        // The mapping is read-only; concurrent writers to the file are not supported.
        let mmap = unsafe {
            Mmap::map(&file)
                .map_err(|err| Error::new(ErrorKind::Io).with_path(&path).with_source(err))?
        };

        let header = FileHeader::decode(&mmap).map_err(|err| err.with_path(&path))?;
        debug!(
            path = %path.display(),
            len = mmap.len(),
            top_ref = header.top_ref().top_ref,
            version = header.top_ref().file_format_version,
            "opened database file"
        );
        Ok(Self {
            path: Some(path),
            storage: Storage::Mapped(mmap),
            header,
        })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, Error> {
        let header = FileHeader::decode(&bytes)?;
        Ok(Self {
            path: None,
            storage: Storage::Owned(bytes),
            header,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn header(&self) -> FileHeader {
        self.header
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.storage {
            Storage::Mapped(mmap) => &mmap[..],
            Storage::Owned(bytes) => bytes.as_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    pub fn group(&self) -> Result<Group<'_>, Error> {
        let top = self.header.top_ref();
        let group = Group::open(self.bytes(), top).map_err(|err| match &self.path {
            Some(path) => err.with_path(path),
            None => err,
        })?;
        debug!(tables = group.table_count(), top_ref = top.top_ref, "resolved group");
        Ok(group)
    }
}

/// Table directory reached from the active top ref. A zero top ref is a
/// freshly created file with no tables.
#[derive(Clone, Copy, Debug)]
pub struct Group<'a> {
    buf: &'a [u8],
    top: TopRef,
    inner: Option<GroupNodes<'a>>,
}

#[derive(Clone, Copy, Debug)]
struct GroupNodes<'a> {
    top: Node<'a>,
    names: ShortStringLeaf<'a>,
    tables: Node<'a>,
}

impl<'a> Group<'a> {
    pub fn open(buf: &'a [u8], top: TopRef) -> Result<Self, Error> {
        if top.top_ref == 0 {
            return Ok(Self {
                buf,
                top,
                inner: None,
            });
        }
        let node = Node::open(buf, top.top_ref)?;
        let names = ShortStringLeaf::new(node.child(0)?, false);
        let tables = node.child(1)?;
        if names.len() != tables.len() {
            return Err(Error::format(format!(
                "group lists {} table names but {} tables",
                names.len(),
                tables.len()
            ))
            .with_offset(node.at()));
        }
        Ok(Self {
            buf,
            top,
            inner: Some(GroupNodes {
                top: node,
                names,
                tables,
            }),
        })
    }

    pub fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    pub fn file_format_version(&self) -> u8 {
        self.top.file_format_version
    }

    pub fn top_ref(&self) -> TopRef {
        self.top
    }

    /// Size of the file in use, which may be smaller than the file on disk.
    pub fn logical_file_size(&self) -> Result<Option<u64>, Error> {
        let Some(inner) = &self.inner else {
            return Ok(None);
        };
        if inner.top.len() < 3 {
            return Ok(None);
        }
        match inner.top.get_ref(2)? {
            RefValue::Tagged(size) => Ok(Some(size)),
            _ => Err(Error::format("logical file size is not a tagged integer")
                .with_offset(inner.top.at())),
        }
    }

    pub fn table_count(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.tables.len())
    }

    pub fn table_name(&self, index: usize) -> Result<&'a str, Error> {
        let inner = self.nodes(index)?;
        Ok(inner.names.get(index)?.unwrap_or(""))
    }

    pub fn table_names(&self) -> Result<Vec<&'a str>, Error> {
        (0..self.table_count()).map(|index| self.table_name(index)).collect()
    }

    pub fn table_index(&self, name: &str) -> Result<Option<usize>, Error> {
        for index in 0..self.table_count() {
            if self.table_name(index)? == name {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    pub fn table(&self, index: usize) -> Result<Table<'a>, Error> {
        let inner = self.nodes(index)?;
        let at = inner.tables.child(index)?.at();
        Table::open(self.buf, at)
    }

    pub fn table_by_name(&self, name: &str) -> Result<Table<'a>, Error> {
        match self.table_index(name)? {
            Some(index) => self.table(index),
            None => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("no table named {name:?}"))
                .with_hint("list tables with `realm-reader info <FILE>`")),
        }
    }

    fn nodes(&self, index: usize) -> Result<&GroupNodes<'a>, Error> {
        match &self.inner {
            Some(inner) if index < inner.tables.len() => Ok(inner),
            _ => Err(Error::range(format!(
                "table index {index} out of range for group of {}",
                self.table_count()
            ))),
        }
    }
}
