//! Forward-only range cursor over a tree.

use blockstore::{Block, Store, Word};

use crate::tree::Tree;
use crate::TreeError;

struct Frame {
    block: Block,
    idx: usize,
}

/// A forward scan over a [`Tree`], yielding rows in ascending key order
/// from a start key to the end of the table.
///
/// Errors are sticky: once [`next`](Rows::next) returns `false` because of
/// a failure, [`err`](Rows::err) reports it and every further `next`
/// returns `false`.
///
/// The cursor keeps the descent path from root to the current leaf and
/// advances leaf by leaf; leaves emptied by deletes are traversed and
/// yield nothing.
pub struct Rows<S> {
    tree: Tree<S>,
    path: Vec<Frame>,
    leaf: Block,
    leaf_count: usize,
    next_idx: usize,
    current: Vec<Word>,
    err: Option<TreeError>,
    done: bool,
    positioned: bool,
}

impl<S: Store> Rows<S> {
    pub(crate) fn new(tree: Tree<S>, start: &[Word]) -> Self {
        debug_assert!(start.len() <= tree.key_cols());
        let mut ext = vec![0; tree.key_cols()];
        ext[..start.len()].copy_from_slice(start);

        let mut rows = Self {
            tree,
            path: Vec::new(),
            leaf: Block::new(),
            leaf_count: 0,
            next_idx: 0,
            current: Vec::new(),
            err: None,
            done: false,
            positioned: false,
        };
        if rows.tree.root() == 0 {
            rows.done = true;
        } else if let Err(e) = rows.seek(&ext) {
            rows.err = Some(e);
            rows.done = true;
        }
        rows
    }

    /// Positions the cursor just before the first row with key `>= ext`.
    fn seek(&mut self, ext: &[Word]) -> Result<(), TreeError> {
        let node = self.tree.node_layout();
        let leaf = self.tree.leaf_layout();

        let mut block = self.tree.read(self.tree.root())?;
        for _ in 0..self.tree.depth() {
            let i = node.descend_index(&block, ext);
            let child = node.child(&block, i);
            self.path.push(Frame { block, idx: i });
            block = self.tree.read(child)?;
        }

        self.next_idx = match leaf.search(&block, ext) {
            Ok(i) | Err(i) => i,
        };
        self.leaf_count = leaf.count(&block);
        self.leaf = block;
        Ok(())
    }

    /// Advances to the next row. Returns `false` at the end of the table
    /// or on error (then [`err`](Rows::err) is set).
    pub fn next(&mut self) -> bool {
        if self.done {
            return false;
        }
        loop {
            if self.next_idx < self.leaf_count {
                self.current = self
                    .tree
                    .leaf_layout()
                    .row(&self.leaf, self.next_idx)
                    .to_vec();
                self.next_idx += 1;
                self.positioned = true;
                return true;
            }
            match self.advance_leaf() {
                Ok(true) => {}
                Ok(false) => {
                    self.done = true;
                    self.positioned = false;
                    return false;
                }
                Err(e) => {
                    self.err = Some(e);
                    self.done = true;
                    self.positioned = false;
                    return false;
                }
            }
        }
    }

    /// Climbs to the deepest ancestor with an unvisited entry, then
    /// descends along leftmost children to the next leaf. `Ok(false)`
    /// means the scan ran off the end of the table.
    fn advance_leaf(&mut self) -> Result<bool, TreeError> {
        let node = self.tree.node_layout();

        let mut addr;
        loop {
            let Some(frame) = self.path.last_mut() else {
                return Ok(false);
            };
            frame.idx += 1;
            if frame.idx < node.count(&frame.block) {
                addr = node.child(&frame.block, frame.idx);
                break;
            }
            self.path.pop();
        }

        while self.path.len() < self.tree.depth() {
            let block = self.tree.read(addr)?;
            addr = node.child(&block, 0);
            self.path.push(Frame { block, idx: 0 });
        }

        self.leaf = self.tree.read(addr)?;
        self.leaf_count = self.tree.leaf_layout().count(&self.leaf);
        self.next_idx = 0;
        Ok(true)
    }

    /// The current row.
    ///
    /// # Panics
    ///
    /// Panics unless the preceding [`next`](Rows::next) returned `true`.
    pub fn this(&self) -> &[Word] {
        assert!(self.positioned, "cursor is not positioned on a row");
        &self.current
    }

    /// The sticky error, if the scan failed.
    pub fn err(&self) -> Option<&TreeError> {
        self.err.as_ref()
    }

    /// Consumes the cursor, yielding the sticky error if the scan failed.
    pub fn into_err(self) -> Option<TreeError> {
        self.err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockstore::MemStore;

    fn tree_with(rows: &[[Word; 2]]) -> Tree<MemStore> {
        let mut store = MemStore::new();
        let root = store.add_block(&Block::new()).unwrap();
        let mut t = Tree::new(2, 1, store, 0, root);
        for row in rows {
            t.put(row).unwrap();
        }
        t
    }

    fn collect(mut rows: Rows<MemStore>) -> Vec<Vec<Word>> {
        let mut out = Vec::new();
        while rows.next() {
            out.push(rows.this().to_vec());
        }
        assert!(rows.err().is_none(), "scan failed: {:?}", rows.err());
        out
    }

    // -------------------- Range starts --------------------

    #[test]
    fn scan_from_existing_key() {
        let t = tree_with(&[[0, 160], [1, 6], [5, 69], [16, 21845]]);
        let got = collect(t.get_range(&[5]));
        assert_eq!(got, vec![vec![5, 69], vec![16, 21845]]);
    }

    #[test]
    fn scan_from_absent_key_starts_at_next_greater() {
        let t = tree_with(&[[0, 160], [1, 6], [5, 69], [16, 21845]]);
        let got = collect(t.get_range(&[13]));
        assert_eq!(got, vec![vec![16, 21845]]);
    }

    #[test]
    fn empty_start_scans_whole_table() {
        let t = tree_with(&[[5, 69], [0, 160], [16, 21845], [1, 6]]);
        let got = collect(t.get_range(&[]));
        assert_eq!(
            got,
            vec![vec![0, 160], vec![1, 6], vec![5, 69], vec![16, 21845]]
        );
    }

    #[test]
    fn start_past_last_key_yields_nothing() {
        let t = tree_with(&[[1, 6], [5, 69]]);
        let got = collect(t.get_range(&[99]));
        assert!(got.is_empty());
    }

    #[test]
    fn start_equal_to_separator_key() {
        // Enough rows to split; then scan starting exactly at the new
        // sibling's first key.
        let mut store = MemStore::new();
        let root = store.add_block(&Block::new()).unwrap();
        let mut t = Tree::new(2, 1, store, 0, root);
        for k in 1..=33u64 {
            t.put(&[k, k]).unwrap();
        }
        assert_eq!(t.depth(), 1);
        let got = collect(t.get_range(&[17]));
        assert_eq!(got.len(), 17);
        assert_eq!(got[0], vec![17, 17]);
    }

    // -------------------- Multi-leaf walks --------------------

    #[test]
    fn scan_crosses_leaf_boundaries_in_order() {
        let mut store = MemStore::new();
        let root = store.add_block(&Block::new()).unwrap();
        let mut t = Tree::new(2, 1, store, 0, root);
        for k in 0..500u64 {
            t.put(&[k * 3, k]).unwrap();
        }
        let got = collect(t.get_range(&[]));
        assert_eq!(got.len(), 500);
        assert!(got.windows(2).all(|w| w[0][0] < w[1][0]));
    }

    #[test]
    fn emptied_leaf_is_skipped() {
        let mut store = MemStore::new();
        let root = store.add_block(&Block::new()).unwrap();
        let mut t = Tree::new(2, 1, store, 0, root);
        for k in 1..=48u64 {
            t.put(&[k, k]).unwrap();
        }
        assert!(t.depth() >= 1);
        // Hollow out the first leaf entirely.
        for k in 1..=16u64 {
            t.delete(&[k]).unwrap();
        }
        let got = collect(t.get_range(&[]));
        assert_eq!(got.len(), 32);
        assert_eq!(got[0], vec![17, 17]);
    }

    // -------------------- Error and edge states --------------------

    #[test]
    fn empty_root_is_immediately_exhausted() {
        let store = MemStore::new();
        let t: Tree<MemStore> = Tree::new(2, 1, store, 0, 0);
        let mut rows = t.get_range(&[]);
        assert!(!rows.next());
        assert!(rows.err().is_none());
    }

    #[test]
    fn unreadable_root_sets_sticky_error() {
        let store = MemStore::new();
        // Address beyond the store: the seek fails and the error sticks.
        let t: Tree<MemStore> = Tree::new(2, 1, store, 0, 4096);
        let mut rows = t.get_range(&[]);
        assert!(!rows.next());
        assert!(rows.err().is_some());
        assert!(!rows.next());
        assert!(rows.err().is_some());
    }

    #[test]
    #[should_panic(expected = "not positioned")]
    fn this_before_next_panics() {
        let t = tree_with(&[[1, 6]]);
        let rows = t.get_range(&[]);
        let _ = rows.this();
    }

    #[test]
    fn next_after_exhaustion_keeps_returning_false() {
        let t = tree_with(&[[1, 6]]);
        let mut rows = t.get_range(&[]);
        assert!(rows.next());
        assert!(!rows.next());
        assert!(!rows.next());
        assert!(rows.err().is_none());
    }
}
