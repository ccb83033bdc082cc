//! The engine, its transactions and the catalog.

use std::path::Path;
use std::sync::Arc;

use blockstore::{Block, BlockFile, FileTx, Store, Word, BLOCK_BYTES};
use btree::{Tree, TreeError};
use parking_lot::{RwLock, RwLockWriteGuard};

use crate::cursors::EntityCursor;
use crate::stores::{FileStore, TxStore};
use crate::strings::{COUNTERS_TYPE, STRINGS_TYPE, STRING_COUNTER, STRING_LOOKUP_TYPE};
use crate::EngineError;

/// Format version written to and expected in header word 0.
pub const FORMAT_VERSION: Word = 0;

/// Catalog row width: `(type_id, cols, key_cols, depth, root)`.
pub(crate) const META_COLS: usize = 5;
/// Catalog key width: the type id alone.
pub(crate) const META_KEY_COLS: usize = 1;

/// Upper bound on a plausible tree depth; anything larger in the header
/// means the file is damaged.
const MAX_DEPTH: Word = 64;

/// The catalog tree's own descriptor, as persisted in the header block
/// (words 1 and 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CatalogRoot {
    pub depth: usize,
    pub root: Word,
}

/// A decoded catalog row describing one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TableDesc {
    pub id: Word,
    pub cols: usize,
    pub key_cols: usize,
    pub depth: usize,
    pub root: Word,
}

impl TableDesc {
    pub(crate) fn from_row(row: &[Word]) -> Self {
        Self {
            id: row[0],
            cols: row[1] as usize,
            key_cols: row[2] as usize,
            depth: row[3] as usize,
            root: row[4],
        }
    }

    pub(crate) fn to_row(self) -> [Word; META_COLS] {
        [
            self.id,
            self.cols as Word,
            self.key_cols as Word,
            self.depth as Word,
            self.root,
        ]
    }

    /// A table with no blocks allocated yet.
    pub(crate) fn is_empty_table(self) -> bool {
        self.root == 0
    }
}

/// Looks a table up in the catalog.
///
/// A missing row translates to [`EngineError::UnknownTable`].
pub(crate) fn query_metadata<S: Store>(
    catalog: CatalogRoot,
    store: S,
    type_id: Word,
) -> Result<TableDesc, EngineError> {
    let tree = Tree::new(META_COLS, META_KEY_COLS, store, catalog.depth, catalog.root);
    let desc = match tree.get(&[type_id]) {
        Ok(row) => TableDesc::from_row(&row),
        Err(TreeError::NotFound) => return Err(EngineError::UnknownTable(type_id)),
        Err(e) => return Err(e.into()),
    };

    // A descriptor the tree layer cannot host means the catalog is damaged.
    let max_cols = blockstore::BLOCK_WORDS / 2;
    if desc.cols == 0
        || desc.cols > max_cols
        || desc.key_cols == 0
        || desc.key_cols > desc.cols
        || desc.key_cols >= max_cols
    {
        return Err(EngineError::BadDescriptor(type_id));
    }
    Ok(desc)
}

/// Shared read path for the engine and transactions: resolve the table,
/// then hand out a cursor positioned by `key`.
pub(crate) fn entity_cursor<'g, S: Store + Clone>(
    catalog: CatalogRoot,
    store: S,
    type_id: Word,
    key: &[Word],
) -> EntityCursor<'g, S> {
    let desc = match query_metadata(catalog, store.clone(), type_id) {
        Ok(desc) => desc,
        Err(e) => return EntityCursor::failed(e),
    };
    if key.len() > desc.key_cols {
        return EntityCursor::failed(EngineError::BadArity {
            type_id,
            want: desc.key_cols,
            got: key.len(),
        });
    }
    if desc.is_empty_table() {
        return EntityCursor::exhausted();
    }
    let tree = Tree::new(desc.cols, desc.key_cols, store, desc.depth, desc.root);
    EntityCursor::rows(tree.get_range(key))
}

/// An open database: the file handle, the committed catalog descriptor and
/// the single-writer lock guarding both.
///
/// Readers take the lock shared; [`begin`](Engine::begin) takes it
/// exclusive, so at most one transaction is live at a time and readers
/// wait it out.
#[derive(Debug)]
pub struct Engine {
    pub(crate) file: Arc<BlockFile>,
    pub(crate) catalog: RwLock<CatalogRoot>,
}

impl Engine {
    /// Opens an existing database file.
    ///
    /// # Errors
    ///
    /// [`EngineError::BadHeader`] if the header block fails validation,
    /// I/O errors from reading it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let file = Arc::new(BlockFile::open(path)?);
        let size = file.size()?;

        let store = FileStore::new(file.clone());
        let mut header = Block::new();
        store.read_block(0, &mut header)?;

        let version = header[0];
        let depth = header[1];
        let root = header[2];

        if version != FORMAT_VERSION {
            return Err(EngineError::BadHeader {
                reason: format!("unsupported format version {version}"),
            });
        }
        if depth > MAX_DEPTH {
            return Err(EngineError::BadHeader {
                reason: format!("implausible catalog depth {depth}"),
            });
        }
        if root == 0 || root % BLOCK_BYTES as Word != 0 || root >= size {
            return Err(EngineError::BadHeader {
                reason: format!("catalog root {root} outside the file"),
            });
        }

        tracing::debug!(depth, root, "opened database");
        Ok(Self {
            file,
            catalog: RwLock::new(CatalogRoot {
                depth: depth as usize,
                root,
            }),
        })
    }

    /// Creates and opens a fresh database file, truncating any existing
    /// one.
    ///
    /// The new file holds the header, a catalog describing itself and the
    /// three interner tables (strings, string_lookup, counters), and a
    /// counters table seeded so the first interned node id is 1.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let file = Arc::new(BlockFile::create(path)?);
        let catalog_root = BLOCK_BYTES as Word;
        let counters_root = 2 * BLOCK_BYTES as Word;

        let mut rows: Vec<Word> = Vec::new();
        for row in [
            [0, META_COLS as Word, META_KEY_COLS as Word, 0, catalog_root],
            [STRINGS_TYPE, 3, 1, 0, 0],
            [STRING_LOOKUP_TYPE, 3, 2, 0, 0],
            [COUNTERS_TYPE, 2, 1, 0, counters_root],
        ] {
            rows.extend_from_slice(&row);
        }

        let mut tx = FileTx::new(file.clone());
        tx.write_at(
            &Block::from_words(&[FORMAT_VERSION, 0, catalog_root]).to_bytes(),
            0,
        );
        tx.write_at(&Block::from_words(&rows).to_bytes(), catalog_root);
        tx.write_at(
            &Block::from_words(&[STRING_COUNTER, 1]).to_bytes(),
            counters_root,
        );
        tx.commit()?;

        tracing::debug!("created database");
        Ok(Self {
            file,
            catalog: RwLock::new(CatalogRoot {
                depth: 0,
                root: catalog_root,
            }),
        })
    }

    /// Syncs and releases the database file.
    pub fn close(self) -> Result<(), EngineError> {
        self.file.sync()?;
        Ok(())
    }

    pub(crate) fn file_store(&self) -> FileStore {
        FileStore::new(self.file.clone())
    }

    /// Scans table `type_id` from `key` (zero-extended) to the end of the
    /// table, over committed data.
    ///
    /// The cursor holds the engine's lock shared for its lifetime: drop it
    /// before calling [`begin`](Engine::begin) on the same thread.
    /// Failures surface through the cursor: an unknown type id, a too-long
    /// key, or I/O errors set [`EntityCursor::err`].
    pub fn get_entities(&self, type_id: Word, key: &[Word]) -> EntityCursor<'_, FileStore> {
        let guard = self.catalog.read();
        let catalog = *guard;
        entity_cursor(catalog, self.file_store(), type_id, key).hold_read_guard(guard)
    }

    /// Starts a transaction, taking the single-writer lock.
    pub fn begin(&self) -> Result<Transaction<'_>, EngineError> {
        let guard = self.catalog.write();
        let store = TxStore::begin(self.file.clone())?;
        let catalog = *guard;
        Ok(Transaction {
            guard,
            store,
            catalog,
        })
    }
}

/// A single-writer transaction over an [`Engine`].
///
/// The transaction owns a copy-on-write overlay store and a working copy
/// of the catalog descriptor; it sees its own writes, while the engine and
/// the file keep the committed state until [`commit`](Transaction::commit)
/// publishes everything at once. Dropping the transaction (or calling
/// [`rollback`](Transaction::rollback)) discards the overlay and leaves
/// the file untouched.
pub struct Transaction<'e> {
    guard: RwLockWriteGuard<'e, CatalogRoot>,
    pub(crate) store: TxStore,
    pub(crate) catalog: CatalogRoot,
}

impl Transaction<'_> {
    /// Scans table `type_id` from `key`, read-your-writes included.
    pub fn get_entities<'t>(&'t self, type_id: Word, key: &[Word]) -> EntityCursor<'t, &'t TxStore> {
        entity_cursor(self.catalog, &self.store, type_id, key)
    }

    /// Inserts `row` into table `type_id`, overwriting any row with the
    /// same key. Allocates the table's first block if it was empty.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownTable`] if no such table,
    /// [`EngineError::BadArity`] unless `row` is exactly the table's
    /// width, I/O errors from the store.
    pub fn put_entity(&mut self, type_id: Word, row: &[Word]) -> Result<(), EngineError> {
        let mut desc = query_metadata(self.catalog, &self.store, type_id)?;
        if row.len() != desc.cols {
            return Err(EngineError::BadArity {
                type_id,
                want: desc.cols,
                got: row.len(),
            });
        }

        if desc.is_empty_table() {
            desc.root = self.store.add_block(&Block::new())?;
            self.put_catalog_row(desc)?;
        }

        let mut tree = Tree::new(
            desc.cols,
            desc.key_cols,
            &mut self.store,
            desc.depth,
            desc.root,
        );
        tree.put(row)?;
        let (depth, root) = (tree.depth(), tree.root());
        drop(tree);

        if depth != desc.depth || root != desc.root {
            desc.depth = depth;
            desc.root = root;
            self.put_catalog_row(desc)?;
        }
        Ok(())
    }

    /// Deletes the row keyed `key` from table `type_id`. Deleting from an
    /// empty table, or a key that is not there, is a no-op.
    pub fn delete_entity(&mut self, type_id: Word, key: &[Word]) -> Result<(), EngineError> {
        let mut desc = query_metadata(self.catalog, &self.store, type_id)?;
        if key.len() != desc.key_cols {
            return Err(EngineError::BadArity {
                type_id,
                want: desc.key_cols,
                got: key.len(),
            });
        }
        if desc.is_empty_table() {
            return Ok(());
        }

        let mut tree = Tree::new(
            desc.cols,
            desc.key_cols,
            &mut self.store,
            desc.depth,
            desc.root,
        );
        match tree.delete(key) {
            Ok(()) => {}
            Err(TreeError::NotFound) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        let (depth, root) = (tree.depth(), tree.root());
        drop(tree);

        if depth != desc.depth || root != desc.root {
            desc.depth = depth;
            desc.root = root;
            self.put_catalog_row(desc)?;
        }
        Ok(())
    }

    /// Registers a new table of `cols` columns with a `key_cols`-wide key
    /// prefix. The table starts empty; its first block is allocated on
    /// first insert.
    ///
    /// # Errors
    ///
    /// [`EngineError::TableExists`] if the type id is already in the
    /// catalog.
    pub fn create_table(
        &mut self,
        type_id: Word,
        cols: usize,
        key_cols: usize,
    ) -> Result<(), EngineError> {
        match query_metadata(self.catalog, &self.store, type_id) {
            Ok(_) => return Err(EngineError::TableExists(type_id)),
            Err(EngineError::UnknownTable(_)) => {}
            Err(e) => return Err(e),
        }
        // Rows are capped at half a block so every leaf holds at least two;
        // key prefixes stop one short of that so internal entries
        // (key + child address) do too.
        let max_cols = blockstore::BLOCK_WORDS / 2;
        if cols == 0 || cols > max_cols || key_cols == 0 || key_cols > cols || key_cols >= max_cols
        {
            return Err(EngineError::BadArity {
                type_id,
                want: max_cols,
                got: cols,
            });
        }
        self.put_catalog_row(TableDesc {
            id: type_id,
            cols,
            key_cols,
            depth: 0,
            root: 0,
        })
    }

    /// Publishes the overlay's write set and installs the transaction's
    /// catalog descriptor in the engine. Consumes the transaction and
    /// releases the single-writer lock.
    pub fn commit(self) -> Result<(), EngineError> {
        let Transaction {
            mut guard,
            store,
            catalog,
        } = self;
        tracing::debug!(blocks = store.dirty_blocks(), "committing transaction");
        store.into_file_tx().commit()?;
        *guard = catalog;
        Ok(())
    }

    /// Discards the overlay. The file and the engine are untouched.
    pub fn rollback(self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Writes `desc` into the catalog tree, rewriting the header block if
    /// the catalog's own root or depth moved (a catalog split).
    fn put_catalog_row(&mut self, desc: TableDesc) -> Result<(), EngineError> {
        let mut cat = Tree::new(
            META_COLS,
            META_KEY_COLS,
            &mut self.store,
            self.catalog.depth,
            self.catalog.root,
        );
        cat.put(&desc.to_row())?;
        let (depth, root) = (cat.depth(), cat.root());
        drop(cat);

        if depth != self.catalog.depth || root != self.catalog.root {
            self.catalog = CatalogRoot { depth, root };
            let header = Block::from_words(&[FORMAT_VERSION, depth as Word, root]);
            self.store.write_block(0, &header)?;
        }
        Ok(())
    }
}
