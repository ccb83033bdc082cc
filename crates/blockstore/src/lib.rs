//! # Blockstore — words, blocks and block-addressed stores
//!
//! The bottom layer of the UndertowDB storage engine. Everything the engine
//! persists is a sequence of [`Word`]s (unsigned 64-bit integers) grouped
//! into fixed-size [`Block`]s, and every block lives at an address equal to
//! its byte offset in a single database file.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ BLOCK 0 (HEADER, byte offset 0)               │
//! │                                               │
//! │ version (u64) | depth (u64) | root (u64)      │
//! │ remaining words zero                          │
//! ├───────────────────────────────────────────────┤
//! │ BLOCK at byte offset 512                      │
//! ├───────────────────────────────────────────────┤
//! │ BLOCK at byte offset 1024                     │
//! │ ... one B-tree node per block ...             │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! All words are little-endian on disk. A block is 64 words (512 bytes), so
//! block addresses advance in steps of [`BLOCK_BYTES`].
//!
//! ## Stores
//!
//! The [`Store`] trait is the capability set the B-tree layer is written
//! against: `read_block`, `add_block`, `write_block`, `free_block`.
//! `write_block` returns the address the block ended up at: an
//! implementation is allowed to relocate a block (copy-on-write), and
//! callers must use the returned address from then on.
//!
//! Implementations here:
//! - [`MemStore`], an in-memory store for tests and benches.
//! - `FileTx` + `BlockFile`, the file-transaction primitive the engine's
//!   overlay store is built on: writes buffer in memory and are applied to
//!   the file as a unit on commit.

mod file;
mod mem;

pub use file::{BlockFile, FileTx};
pub use mem::MemStore;

use byteorder::{ByteOrder, LittleEndian};
use std::io;
use std::ops::{Index, IndexMut};
use thiserror::Error;

/// Unit of storage: an unsigned 64-bit integer.
pub type Word = u64;

/// Number of words in a block.
pub const BLOCK_WORDS: usize = 64;

/// Number of bytes in a block: 64 words × 8 bytes.
pub const BLOCK_BYTES: usize = BLOCK_WORDS * 8;

/// Errors from block store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("read-only store")]
    ReadOnly,
}

/// A fixed-size array of words; the unit of I/O.
///
/// Blocks are plain value types: reading copies the persistent bytes in,
/// writing copies them out. The all-zero block is the starting state of
/// every freshly allocated block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    words: [Word; BLOCK_WORDS],
}

impl Block {
    /// Returns an all-zero block.
    pub fn new() -> Self {
        Self {
            words: [0; BLOCK_WORDS],
        }
    }

    /// Builds a block from a prefix of words; the tail is zero-filled.
    ///
    /// # Panics
    ///
    /// Panics if `words` is longer than [`BLOCK_WORDS`].
    pub fn from_words(words: &[Word]) -> Self {
        let mut b = Self::new();
        b.words[..words.len()].copy_from_slice(words);
        b
    }

    /// The block's words as a slice.
    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// The block's words as a mutable slice.
    pub fn words_mut(&mut self) -> &mut [Word] {
        &mut self.words
    }

    /// Serializes the block to its on-disk little-endian byte form.
    pub fn to_bytes(&self) -> [u8; BLOCK_BYTES] {
        let mut buf = [0u8; BLOCK_BYTES];
        LittleEndian::write_u64_into(&self.words, &mut buf);
        buf
    }

    /// Deserializes a block from its on-disk little-endian byte form.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is not exactly [`BLOCK_BYTES`] long.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut words = [0u64; BLOCK_WORDS];
        LittleEndian::read_u64_into(bytes, &mut words);
        Self { words }
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<usize> for Block {
    type Output = Word;

    fn index(&self, i: usize) -> &Word {
        &self.words[i]
    }
}

impl IndexMut<usize> for Block {
    fn index_mut(&mut self, i: usize) -> &mut Word {
        &mut self.words[i]
    }
}

/// Capability set of a block-addressed store.
///
/// Addresses are byte offsets in the underlying address space and always
/// multiples of [`BLOCK_BYTES`]. Address 0 is the header block.
pub trait Store {
    /// Fills `block` from the persistent bytes at address `id`.
    fn read_block(&self, id: Word, block: &mut Block) -> Result<(), StoreError>;

    /// Allocates a fresh block at the end of the address space, writes
    /// `block` there and returns its address.
    fn add_block(&mut self, block: &Block) -> Result<Word, StoreError>;

    /// Updates the block at `id`, returning the address the block now
    /// lives at. The returned address may differ from `id` (copy-on-write
    /// relocation); callers must use the returned address thereafter.
    fn write_block(&mut self, id: Word, block: &Block) -> Result<Word, StoreError>;

    /// Marks the block at `id` free for reuse.
    fn free_block(&mut self, id: Word) -> Result<(), StoreError>;
}

/// A shared borrow of a store is a read-only view of it: reads delegate,
/// mutations fail with [`StoreError::ReadOnly`].
impl<S: Store> Store for &S {
    fn read_block(&self, id: Word, block: &mut Block) -> Result<(), StoreError> {
        (**self).read_block(id, block)
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

impl<S: Store> Store for &mut S {
    fn read_block(&self, id: Word, block: &mut Block) -> Result<(), StoreError> {
        (**self).read_block(id, block)
    }

    fn add_block(&mut self, block: &Block) -> Result<Word, StoreError> {
        (**self).add_block(block)
    }

    fn write_block(&mut self, id: Word, block: &Block) -> Result<Word, StoreError> {
        (**self).write_block(id, block)
    }

    fn free_block(&mut self, id: Word) -> Result<(), StoreError> {
        (**self).free_block(id)
    }
}
