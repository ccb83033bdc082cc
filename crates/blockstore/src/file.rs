//! Database file access and the file-transaction primitive.
//!
//! [`BlockFile`] is the single open handle to a database file. Reads go
//! straight to the file; all mutation happens through a [`FileTx`], which
//! buffers byte-range writes in memory and applies them to the file as a
//! unit on [`commit`](FileTx::commit). Nothing reaches the file before
//! commit, so dropping a `FileTx` discards the whole write set.
//!
//! Atomicity of a commit with respect to concurrent readers is provided by
//! holding the file lock for the duration of the apply (and, above this
//! layer, by the engine's transaction lock). Crash atomicity mid-apply is
//! explicitly out of scope.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

/// The open database file.
///
/// Wraps the [`File`] in a lock so shared readers and the committing
/// transaction can use one handle (seek-based I/O needs exclusive access
/// per call).
#[derive(Debug)]
pub struct BlockFile {
    file: RwLock<File>,
}

impl BlockFile {
    /// Opens an existing database file for reading and writing.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            file: RwLock::new(file),
        })
    }

    /// Creates a new, empty database file, truncating any existing one.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file: RwLock::new(file),
        })
    }

    /// Fills `buf` from the committed bytes at `offset`.
    ///
    /// # Errors
    ///
    /// Fails with `UnexpectedEof` on a short read, or any underlying I/O
    /// error.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }

    /// The current committed size of the file in bytes.
    pub fn size(&self) -> io::Result<u64> {
        Ok(self.file.read().metadata()?.len())
    }

    /// Flushes file contents to durable storage.
    pub fn sync(&self) -> io::Result<()> {
        self.file.read().sync_all()
    }

    fn apply(&self, writes: &BTreeMap<u64, Vec<u8>>) -> io::Result<()> {
        let mut file = self.file.write();
        for (&offset, bytes) in writes {
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(bytes)?;
        }
        file.sync_all()
    }
}

/// A buffered set of byte-range writes against a [`BlockFile`].
///
/// `write_at` only records the write; the file is untouched until
/// [`commit`](FileTx::commit), which applies every buffered range in
/// ascending offset order and syncs. A later write to the same offset
/// replaces the earlier one.
#[derive(Debug)]
pub struct FileTx {
    file: Arc<BlockFile>,
    writes: BTreeMap<u64, Vec<u8>>,
}

impl FileTx {
    /// Starts an empty write set against `file`.
    pub fn new(file: Arc<BlockFile>) -> Self {
        Self {
            file,
            writes: BTreeMap::new(),
        }
    }

    /// Buffers `bytes` for writing at `offset` on commit.
    pub fn write_at(&mut self, bytes: &[u8], offset: u64) {
        self.writes.insert(offset, bytes.to_vec());
    }

    /// Number of buffered writes.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// `true` if nothing has been buffered.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Applies all buffered writes to the file and syncs.
    ///
    /// Consumes the transaction either way; on error the file may hold a
    /// partial apply (crash atomicity is out of scope — see module docs).
    pub fn commit(self) -> io::Result<()> {
        if self.writes.is_empty() {
            return Ok(());
        }
        self.file.apply(&self.writes)
    }
}
