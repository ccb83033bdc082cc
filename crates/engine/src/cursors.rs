//! The entity cursor handed out by the engine and by transactions.

use blockstore::{Store, Word};
use btree::Rows;
use parking_lot::RwLockReadGuard;

use crate::engine::CatalogRoot;
use crate::EngineError;

enum Inner<S> {
    /// Exhausted, failed, or constructed over an empty table.
    Done,
    Rows(Rows<S>),
}

/// A forward scan over one table, with sticky error reporting.
///
/// Three states reach a caller: a live scan, an exhausted scan (no error),
/// and a failed scan — an unknown table id or an I/O failure mid-walk both
/// surface through [`err`](EntityCursor::err) after
/// [`next`](EntityCursor::next) returns `false`.
///
/// Engine-level cursors hold the engine's lock shared until dropped, so a
/// scan never races a commit.
pub struct EntityCursor<'e, S> {
    inner: Inner<S>,
    err: Option<EngineError>,
    _guard: Option<RwLockReadGuard<'e, CatalogRoot>>,
}

impl<S: Store> EntityCursor<'_, S> {
    pub(crate) fn failed(err: EngineError) -> Self {
        Self {
            inner: Inner::Done,
            err: Some(err),
            _guard: None,
        }
    }

    pub(crate) fn exhausted() -> Self {
        Self {
            inner: Inner::Done,
            err: None,
            _guard: None,
        }
    }

    pub(crate) fn rows(rows: Rows<S>) -> Self {
        Self {
            inner: Inner::Rows(rows),
            err: None,
            _guard: None,
        }
    }

    pub(crate) fn hold_read_guard<'g>(
        self,
        guard: RwLockReadGuard<'g, CatalogRoot>,
    ) -> EntityCursor<'g, S> {
        EntityCursor {
            inner: self.inner,
            err: self.err,
            _guard: Some(guard),
        }
    }

    /// Advances to the next row. `false` means end-of-range or failure;
    /// check [`err`](EntityCursor::err) to tell them apart. Once `false`,
    /// always `false`.
    pub fn next(&mut self) -> bool {
        let advanced = match &mut self.inner {
            Inner::Done => return false,
            Inner::Rows(rows) => rows.next(),
        };
        if advanced {
            return true;
        }
        if let Inner::Rows(rows) = std::mem::replace(&mut self.inner, Inner::Done) {
            self.err = rows.into_err().map(EngineError::from);
        }
        false
    }

    /// The current row.
    ///
    /// # Panics
    ///
    /// Panics unless the preceding [`next`](EntityCursor::next) returned
    /// `true`.
    pub fn this(&self) -> &[Word] {
        match &self.inner {
            Inner::Rows(rows) => rows.this(),
            Inner::Done => panic!("cursor is not positioned on a row"),
        }
    }

    /// The sticky error, if the scan failed.
    pub fn err(&self) -> Option<&EngineError> {
        self.err.as_ref()
    }

    /// Moves the sticky error out of the cursor.
    pub fn take_err(&mut self) -> Option<EngineError> {
        self.err.take()
    }
}
