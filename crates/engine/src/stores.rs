//! The two block stores of the engine: read-only over the committed file,
//! and the per-transaction copy-on-write overlay.

use std::collections::HashMap;
use std::sync::Arc;

use blockstore::{Block, BlockFile, FileTx, Store, StoreError, Word, BLOCK_BYTES};

/// Read-only store over the committed bytes of the database file.
///
/// Cheap to clone — every reader (engine-level cursor, overlay miss-read)
/// holds its own handle to the shared file. All mutators fail with
/// [`StoreError::ReadOnly`].
#[derive(Debug, Clone)]
pub struct FileStore {
    file: Arc<BlockFile>,
}

impl FileStore {
    pub(crate) fn new(file: Arc<BlockFile>) -> Self {
        Self { file }
    }
}

impl Store for FileStore {
    fn read_block(&self, id: Word, block: &mut Block) -> Result<(), StoreError> {
        let mut buf = [0u8; BLOCK_BYTES];
        self.file.read_at(&mut buf, id)?;
        *block = Block::from_bytes(&buf);
        Ok(())
    }

    fn add_block(&mut self, _block: &Block) -> Result<Word, StoreError> {
        Err(StoreError::ReadOnly)
    }

    fn write_block(&mut self, _id: Word, _block: &Block) -> Result<Word, StoreError> {
        Err(StoreError::ReadOnly)
    }

    fn free_block(&mut self, _id: Word) -> Result<(), StoreError> {
        Err(StoreError::ReadOnly)
    }
}

/// Copy-on-write overlay for one transaction.
///
/// Every block touched in the transaction is buffered twice: in the
/// [`FileTx`] write set (for the eventual commit) and in the `updated` map
/// (so reads within the transaction see their own writes). Reads of
/// untouched blocks fall through to the committed file. `add_block`
/// allocates contiguously from the committed end of the file, so nothing
/// moves until commit.
///
/// `write_block` never relocates here — the returned address always equals
/// the one passed in — but callers must still honour the copy-on-write
/// contract. `free_block` is accepted and ignored: deleted blocks leak,
/// the file only grows.
#[derive(Debug)]
pub struct TxStore {
    tx: FileTx,
    next: Word,
    updated: HashMap<Word, Block>,
    old: FileStore,
}

impl TxStore {
    /// Starts an overlay at the current committed end of `file`.
    pub(crate) fn begin(file: Arc<BlockFile>) -> Result<Self, StoreError> {
        let next = file.size()?;
        Ok(Self {
            tx: FileTx::new(file.clone()),
            next,
            updated: HashMap::new(),
            old: FileStore::new(file),
        })
    }

    /// Hands the buffered write set over for committing.
    pub(crate) fn into_file_tx(self) -> FileTx {
        self.tx
    }

    /// Number of distinct blocks dirtied so far.
    pub(crate) fn dirty_blocks(&self) -> usize {
        self.updated.len()
    }
}

impl Store for TxStore {
    fn read_block(&self, id: Word, block: &mut Block) -> Result<(), StoreError> {
        if let Some(updated) = self.updated.get(&id) {
            *block = *updated;
            return Ok(());
        }
        self.old.read_block(id, block)
    }

    fn add_block(&mut self, block: &Block) -> Result<Word, StoreError> {
        let id = self.next;
        self.next += BLOCK_BYTES as Word;
        self.tx.write_at(&block.to_bytes(), id);
        self.updated.insert(id, *block);
        Ok(id)
    }

    fn write_block(&mut self, id: Word, block: &Block) -> Result<Word, StoreError> {
        self.tx.write_at(&block.to_bytes(), id);
        self.updated.insert(id, *block);
        Ok(id)
    }

    fn free_block(&mut self, _id: Word) -> Result<(), StoreError> {
        Ok(())
    }
}
