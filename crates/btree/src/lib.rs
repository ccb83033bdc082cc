//! # B-tree — fixed-width-row index over a block store
//!
//! The ordering layer of the UndertowDB storage engine. A [`Tree`] maps
//! fixed-width keys to fixed-width rows of [`Word`](blockstore::Word)s,
//! one node per [`Block`](blockstore::Block), over any
//! [`Store`](blockstore::Store).
//!
//! ## Node layout
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ LEAF (depth 0)                                │
//! │                                               │
//! │ row 0 (cols words) | row 1 | ... | zero tail  │
//! │ rows sorted by key = first key_cols words     │
//! ├───────────────────────────────────────────────┤
//! │ INTERNAL (depth > 0)                          │
//! │                                               │
//! │ entry 0 (key_cols words + child addr) | ...   │
//! │ entries sorted; entry 0's key is the minimum  │
//! │ key reachable through its child               │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Node kind is positional — a block reached after `depth` descents is a
//! leaf — so blocks carry no type tag, and no row count either: the live
//! rows are the leading non-zero rows (see [`node`] internals).
//!
//! Writes follow the store's copy-on-write contract: the address returned
//! by `write_block` is the block's address from then on, and parents are
//! rewired when it changes. Deletes never merge; a leaf may become empty
//! and scans simply pass through it.

mod cursor;
mod node;
mod tree;

pub use cursor::Rows;
pub use tree::Tree;

use blockstore::StoreError;
use thiserror::Error;

/// Errors from tree operations.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("row not found")]
    NotFound,
}
