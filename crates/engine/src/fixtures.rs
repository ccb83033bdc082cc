//! Hand-built database files for engine tests.
//!
//! Each builder lays blocks out exactly as they would sit on disk: the
//! header at offset 0, then one block per 512 bytes. The word values match
//! the long-standing test databases this engine's behaviour is pinned to.

use std::path::{Path, PathBuf};

use blockstore::{Block, Word, BLOCK_BYTES};

fn write_db(path: &Path, blocks: &[Block]) {
    let mut bytes = Vec::with_capacity(blocks.len() * BLOCK_BYTES);
    for b in blocks {
        bytes.extend_from_slice(&b.to_bytes());
    }
    std::fs::write(path, bytes).unwrap();
}

/// Flattens fixed-width rows into one block.
fn rows(list: &[&[Word]]) -> Block {
    let mut words = Vec::new();
    for row in list {
        words.extend_from_slice(row);
    }
    Block::from_words(&words)
}

/// A database with an arbitrary header and a single catalog block, for
/// header-validation tests.
pub(crate) fn db_with_header(dir: &Path, header: &[Word]) -> PathBuf {
    let path = dir.join("header.db");
    write_db(
        &path,
        &[Block::from_words(header), rows(&[&[0, 5, 1, 0, 512]])],
    );
    path
}

/// Catalog only, describing itself as a 6-column table rooted at 512.
pub(crate) fn empty_db(dir: &Path) -> PathBuf {
    let path = dir.join("empty.db");
    write_db(
        &path,
        &[
            Block::from_words(&[0, 0, 512]),
            rows(&[&[0, 6, 1, 0, 512, 0]]),
        ],
    );
    path
}

/// Catalog holding a descriptor no tree can host (zero columns), type 7.
pub(crate) fn malformed_desc_db(dir: &Path) -> PathBuf {
    let path = dir.join("malformed.db");
    write_db(
        &path,
        &[
            Block::from_words(&[0, 0, 512]),
            rows(&[&[0, 5, 1, 0, 512], &[7, 0, 1, 0, 0]]),
        ],
    );
    path
}

/// Catalog plus a registered but empty (root 0) two-column table, type 1.
pub(crate) fn empty_table_db(dir: &Path) -> PathBuf {
    let path = dir.join("empty-table.db");
    write_db(
        &path,
        &[
            Block::from_words(&[0, 0, 512]),
            rows(&[&[0, 5, 1, 0, 512], &[1, 2, 1, 0, 0]]),
        ],
    );
    path
}

/// Catalog plus a populated two-column table, type 1, with rows
/// `{(0,160), (1,6), (5,69), (16,21845)}` in one leaf at 1024.
pub(crate) fn small_table_db(dir: &Path) -> PathBuf {
    let path = dir.join("small-table.db");
    write_db(
        &path,
        &[
            Block::from_words(&[0, 0, 512]),
            rows(&[&[0, 5, 1, 0, 512], &[1, 2, 1, 0, 1024]]),
            rows(&[&[0, 160], &[1, 6], &[5, 69], &[16, 21845]]),
        ],
    );
    path
}
