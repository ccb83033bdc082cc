//! String interning over the engine's own tables.
//!
//! Strings live in a trie of 8-byte chunks. Each trie node is one row in
//! the `strings` table, `(node_id, parent, chunk)`; the `string_lookup`
//! table is the index over the same edges, `(parent, chunk, node_id)`,
//! keyed by `(parent, chunk)` so walking a string forward is a sequence of
//! point lookups. Fresh node ids come from the `counters` table. Node 0 is
//! the trie root and doubles as the id of the empty string.
//!
//! Interning re-enters the engine's own write path: a chunk miss allocates
//! an id via the counters table and inserts into both string tables, all
//! through the same transaction the caller holds.
//!
//! Chunks pack string bytes little-endian with the last chunk zero-padded;
//! reconstruction strips trailing NULs. A string that itself ends in NUL
//! bytes therefore does not round-trip — callers keep such strings out.

use blockstore::{Store, Word};
use btree::{Tree, TreeError};
use byteorder::{ByteOrder, LittleEndian};

use crate::engine::{query_metadata, CatalogRoot, Engine, Transaction};
use crate::EngineError;

/// Type id of the trie-node table.
pub(crate) const STRINGS_TYPE: Word = 1;
/// Type id of the trie-edge index table.
pub(crate) const STRING_LOOKUP_TYPE: Word = 2;
/// Type id of the counter table.
pub(crate) const COUNTERS_TYPE: Word = 3;
/// Counter id allocating string node ids.
pub(crate) const STRING_COUNTER: Word = 1;

/// Packs a string into little-endian 8-byte chunks, zero-padding the last.
fn string_to_parts(s: &str) -> Vec<Word> {
    let bytes = s.as_bytes();
    let mut parts = Vec::with_capacity(bytes.len().div_ceil(8));
    for chunk in bytes.chunks(8) {
        let mut buf = [0u8; 8];
        buf[..chunk.len()].copy_from_slice(chunk);
        parts.push(LittleEndian::read_u64(&buf));
    }
    parts
}

/// Unpacks chunks back into the original string.
fn parts_to_string(parts: &[Word]) -> Result<String, EngineError> {
    let mut bytes = vec![0u8; parts.len() * 8];
    LittleEndian::write_u64_into(parts, &mut bytes);
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    String::from_utf8(bytes).map_err(|_| EngineError::BadString)
}

/// Walks the `strings` table from `value` up to the trie root, then
/// reassembles the chunks in string order.
pub(crate) fn lookup_string<S: Store + Clone>(
    catalog: CatalogRoot,
    store: S,
    value: Word,
) -> Result<String, EngineError> {
    if value == 0 {
        return Ok(String::new());
    }
    let desc = query_metadata(catalog, store.clone(), STRINGS_TYPE)?;
    if desc.is_empty_table() {
        return Err(EngineError::NotFound);
    }
    let tree = Tree::new(desc.cols, desc.key_cols, store, desc.depth, desc.root);

    let mut parts = Vec::new();
    let mut key = value;
    while key != 0 {
        let row = tree.get(&[key])?;
        parts.push(row[2]);
        key = row[1];
    }
    parts.reverse();
    parts_to_string(&parts)
}

/// Walks the `string_lookup` trie without inserting. `Ok(None)` means the
/// string has not been interned.
pub(crate) fn find_string<S: Store + Clone>(
    catalog: CatalogRoot,
    store: S,
    s: &str,
) -> Result<Option<Word>, EngineError> {
    let parts = string_to_parts(s);
    if parts.is_empty() {
        return Ok(Some(0));
    }
    let desc = query_metadata(catalog, store.clone(), STRING_LOOKUP_TYPE)?;
    if desc.is_empty_table() {
        return Ok(None);
    }
    let tree = Tree::new(desc.cols, desc.key_cols, store, desc.depth, desc.root);

    let mut node: Word = 0;
    for p in parts {
        match tree.get(&[node, p]) {
            Ok(row) => node = row[2],
            Err(TreeError::NotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some(node))
}

impl Engine {
    /// Reconstructs the string interned as `value`, over committed data.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] if `value` is not an interned id.
    pub fn lookup_string(&self, value: Word) -> Result<String, EngineError> {
        let guard = self.catalog.read();
        lookup_string(*guard, self.file_store(), value)
    }

    /// Returns the interned id of `s`, if any, over committed data.
    pub fn find_string(&self, s: &str) -> Result<Option<Word>, EngineError> {
        let guard = self.catalog.read();
        find_string(*guard, self.file_store(), s)
    }
}

impl Transaction<'_> {
    /// Interns `s`, inserting any missing trie nodes, and returns its id.
    ///
    /// Idempotent within the transaction: re-interning returns the same
    /// id. The empty string is id 0.
    pub fn intern(&mut self, s: &str) -> Result<Word, EngineError> {
        let mut node: Word = 0;
        for p in string_to_parts(s) {
            match self.lookup_child(node, p)? {
                Some(child) => node = child,
                None => {
                    let fresh = self.next_counter(STRING_COUNTER)?;
                    self.put_entity(STRINGS_TYPE, &[fresh, node, p])?;
                    self.put_entity(STRING_LOOKUP_TYPE, &[node, p, fresh])?;
                    node = fresh;
                }
            }
        }
        Ok(node)
    }

    /// Reconstructs the string interned as `value`, own writes included.
    pub fn lookup_string(&self, value: Word) -> Result<String, EngineError> {
        lookup_string(self.catalog, &self.store, value)
    }

    /// Returns the interned id of `s`, if any, own writes included.
    pub fn find_string(&self, s: &str) -> Result<Option<Word>, EngineError> {
        find_string(self.catalog, &self.store, s)
    }

    fn lookup_child(&self, node: Word, chunk: Word) -> Result<Option<Word>, EngineError> {
        let desc = query_metadata(self.catalog, &self.store, STRING_LOOKUP_TYPE)?;
        if desc.is_empty_table() {
            return Ok(None);
        }
        let tree = Tree::new(desc.cols, desc.key_cols, &self.store, desc.depth, desc.root);
        match tree.get(&[node, chunk]) {
            Ok(row) => Ok(Some(row[2])),
            Err(TreeError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the counter's current value and writes back the increment.
    fn next_counter(&mut self, id: Word) -> Result<Word, EngineError> {
        let current = {
            let desc = query_metadata(self.catalog, &self.store, COUNTERS_TYPE)?;
            if desc.is_empty_table() {
                return Err(EngineError::NotFound);
            }
            let tree = Tree::new(desc.cols, desc.key_cols, &self.store, desc.depth, desc.root);
            tree.get(&[id])?[1]
        };
        self.put_entity(COUNTERS_TYPE, &[id, current + 1])?;
        Ok(current)
    }
}
