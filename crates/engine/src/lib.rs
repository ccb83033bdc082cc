//! # Engine — catalog of tables, transactions, string interning
//!
//! The top layer of the UndertowDB storage engine. An [`Engine`] owns one
//! database file and exposes a catalog-of-tables abstraction over it: every
//! table is a B-tree of fixed-width rows addressed by a 64-bit type id, and
//! a distinguished metadata table, the catalog, describes every other
//! table (and itself).
//!
//! ## Reading and writing
//!
//! Reads ([`Engine::get_entities`]) consult the catalog for the table's
//! descriptor `(type_id, cols, key_cols, depth, root)`, build a tree view
//! over the committed file and return a cursor. Writes happen inside a
//! [`Transaction`]: [`Engine::begin`] takes the engine's single-writer
//! lock and hands out a transaction whose block store is a copy-on-write
//! overlay — dirty blocks buffer in memory, reads are served overlay-first
//! (read-your-writes), and [`Transaction::commit`] publishes the whole
//! write set atomically through the file-transaction primitive. Rolling
//! back (or dropping) a transaction leaves the file byte-identical.
//!
//! ## String interning
//!
//! Strings are not stored inline. [`Transaction::intern`] folds a string
//! into the engine's own tables as a trie of 8-byte chunks and returns a
//! single word; [`Engine::lookup_string`] walks the trie back. The three
//! interner tables live at fixed type ids (1 = strings, 2 = string_lookup,
//! 3 = counters) and must be present in the catalog — [`Engine::create`]
//! sets them up.

mod cursors;
mod engine;
mod stores;
mod strings;

#[cfg(test)]
pub(crate) mod fixtures;

pub use cursors::EntityCursor;
pub use engine::{Engine, Transaction, FORMAT_VERSION};
pub use stores::{FileStore, TxStore};

use blockstore::{StoreError, Word};
use thiserror::Error;

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("read-only store")]
    ReadOnly,
    #[error("row not found")]
    NotFound,
    #[error("unknown table with id {0:#x}")]
    UnknownTable(Word),
    #[error("table {type_id:#x} takes {want} words, got {got}")]
    BadArity {
        type_id: Word,
        want: usize,
        got: usize,
    },
    #[error("bad header: {reason}")]
    BadHeader { reason: String },
    #[error("table with id {0:#x} already exists")]
    TableExists(Word),
    #[error("malformed catalog row for table {0:#x}")]
    BadDescriptor(Word),
    #[error("stored string is not valid utf-8")]
    BadString,
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io(e) => EngineError::Io(e),
            StoreError::ReadOnly => EngineError::ReadOnly,
        }
    }
}

impl From<btree::TreeError> for EngineError {
    fn from(e: btree::TreeError) -> Self {
        match e {
            btree::TreeError::Store(e) => e.into(),
            btree::TreeError::NotFound => EngineError::NotFound,
        }
    }
}
