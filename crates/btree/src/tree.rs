//! The B-tree proper: point lookups, inserts, deletes.

use blockstore::{Block, Store, Word};

use crate::cursor::Rows;
use crate::node::RowLayout;
use crate::TreeError;

/// A fixed-fanout B-tree of fixed-width rows over a block store.
///
/// A tree is a view: it is cheap to construct from a table descriptor
/// `(cols, key_cols, depth, root)` and borrows or owns its store. Keys are
/// the first `key_cols` words of each row, compared lexicographically
/// word-wise unsigned.
///
/// Mutations go through [`Store::write_block`] and honour its copy-on-write
/// contract: whenever a write relocates a block, the parent entry (or the
/// root pointer) is rewritten to the returned address. After a `put` or
/// `delete` the caller must read back [`depth`](Tree::depth) and
/// [`root`](Tree::root) and persist them if they changed — a root split is
/// only recorded here.
///
/// Rows are at most half a block wide (`cols <= 32`) so every node holds at
/// least two rows.
pub struct Tree<S> {
    store: S,
    leaf: RowLayout,
    node: RowLayout,
    depth: usize,
    root: Word,
}

impl<S: Store> Tree<S> {
    /// Builds a tree view from a table descriptor.
    pub fn new(cols: usize, key_cols: usize, store: S, depth: usize, root: Word) -> Self {
        Self {
            store,
            leaf: RowLayout::leaf(cols, key_cols),
            node: RowLayout::node(key_cols),
            depth,
            root,
        }
    }

    /// Row width in words.
    pub fn cols(&self) -> usize {
        self.leaf.cols
    }

    /// Key width in words.
    pub fn key_cols(&self) -> usize {
        self.leaf.key_cols
    }

    /// Internal levels above the leaves; 0 means the root is a leaf.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Root block address.
    pub fn root(&self) -> Word {
        self.root
    }

    /// Consumes the view, releasing the store.
    pub fn into_store(self) -> S {
        self.store
    }

    pub(crate) fn leaf_layout(&self) -> RowLayout {
        self.leaf
    }

    pub(crate) fn node_layout(&self) -> RowLayout {
        self.node
    }

    pub(crate) fn read(&self, id: Word) -> Result<Block, TreeError> {
        let mut b = Block::new();
        self.store.read_block(id, &mut b)?;
        Ok(b)
    }

    /// Returns the full row stored under `key`.
    ///
    /// # Errors
    ///
    /// [`TreeError::NotFound`] if no row has that key; store errors
    /// propagate.
    pub fn get(&self, key: &[Word]) -> Result<Vec<Word>, TreeError> {
        debug_assert_eq!(key.len(), self.leaf.key_cols);
        let mut block = self.read(self.root)?;
        for _ in 0..self.depth {
            let i = self.node.descend_index(&block, key);
            block = self.read(self.node.child(&block, i))?;
        }
        match self.leaf.search(&block, key) {
            Ok(i) => Ok(self.leaf.row(&block, i).to_vec()),
            Err(_) => Err(TreeError::NotFound),
        }
    }

    /// Starts a forward scan at the first row whose key is `>=` `start`
    /// zero-extended to full key width. `start` may be shorter than the key
    /// (an empty `start` scans the whole table); the scan runs to the end
    /// of the table.
    pub fn get_range(self, start: &[Word]) -> Rows<S> {
        Rows::new(self, start)
    }

    /// Inserts `row`, overwriting in place if its key is already present.
    ///
    /// Splits full nodes on the way back up; a root split allocates a new
    /// root and increments the depth.
    pub fn put(&mut self, row: &[Word]) -> Result<(), TreeError> {
        debug_assert_eq!(row.len(), self.leaf.cols);
        let key = &row[..self.leaf.key_cols];

        let (path, addr, mut block) = self.descend(key)?;

        let mut promoted = None;
        match self.leaf.search(&block, key) {
            Ok(i) => self.leaf.set_row(&mut block, i, row),
            Err(i) => {
                if self.leaf.count(&block) < self.leaf.capacity() {
                    self.leaf.insert_row(&mut block, i, row);
                } else {
                    promoted = Some(self.split_insert(self.leaf, &mut block, row)?);
                }
            }
        }
        let new_addr = self.store.write_block(addr, &block)?;

        self.ascend(path, addr, new_addr, promoted)
    }

    /// Removes the row stored under `key`.
    ///
    /// No merging or rebalancing happens on underflow; a leaf may end up
    /// empty and is simply skipped by scans.
    ///
    /// # Errors
    ///
    /// [`TreeError::NotFound`] if no row has that key.
    pub fn delete(&mut self, key: &[Word]) -> Result<(), TreeError> {
        debug_assert_eq!(key.len(), self.leaf.key_cols);

        let (path, addr, mut block) = self.descend(key)?;

        match self.leaf.search(&block, key) {
            Err(_) => Err(TreeError::NotFound),
            Ok(i) => {
                self.leaf.remove_row(&mut block, i);
                let new_addr = self.store.write_block(addr, &block)?;
                self.ascend(path, addr, new_addr, None)
            }
        }
    }

    /// Walks from the root to the leaf for `key`, recording each internal
    /// node and the entry index taken.
    fn descend(&self, key: &[Word]) -> Result<(Vec<(Word, Block, usize)>, Word, Block), TreeError> {
        let mut path = Vec::with_capacity(self.depth);
        let mut addr = self.root;
        let mut block = self.read(addr)?;
        for _ in 0..self.depth {
            let i = self.node.descend_index(&block, key);
            let child = self.node.child(&block, i);
            path.push((addr, block, i));
            addr = child;
            block = self.read(addr)?;
        }
        Ok((path, addr, block))
    }

    /// Splits a full node, inserts `row` into whichever half owns its key,
    /// and returns the separator for the parent: the new sibling's first
    /// key and its address.
    fn split_insert(
        &mut self,
        layout: RowLayout,
        block: &mut Block,
        row: &[Word],
    ) -> Result<(Vec<Word>, Word), TreeError> {
        let key = &row[..layout.key_cols];
        let mut right = layout.split(block);

        let half = if key < layout.key(&right, 0) {
            &mut *block
        } else {
            &mut right
        };
        let i = match layout.search(half, key) {
            Ok(i) | Err(i) => i,
        };
        layout.insert_row(half, i, row);

        let sep = layout.key(&right, 0).to_vec();
        let right_addr = self.store.add_block(&right)?;
        Ok((sep, right_addr))
    }

    /// Walks the recorded path back to the root, rewriting child pointers
    /// for relocated blocks and inserting promoted separators, splitting
    /// internal nodes (and finally the root) as needed.
    fn ascend(
        &mut self,
        path: Vec<(Word, Block, usize)>,
        mut child_old: Word,
        mut child_new: Word,
        mut promoted: Option<(Vec<Word>, Word)>,
    ) -> Result<(), TreeError> {
        for (addr, mut block, idx) in path.into_iter().rev() {
            let mut dirty = false;

            if child_new != child_old {
                self.node.set_child(&mut block, idx, child_new);
                dirty = true;
            }

            if let Some((sep, sep_child)) = promoted.take() {
                let mut entry = sep;
                entry.push(sep_child);
                if self.node.count(&block) < self.node.capacity() {
                    let i = match self.node.search(&block, &entry[..self.node.key_cols]) {
                        Ok(i) | Err(i) => i,
                    };
                    self.node.insert_row(&mut block, i, &entry);
                } else {
                    promoted = Some(self.split_insert(self.node, &mut block, &entry)?);
                }
                dirty = true;
            }

            child_old = addr;
            child_new = if dirty {
                self.store.write_block(addr, &block)?
            } else {
                addr
            };
        }

        if let Some((sep, sep_child)) = promoted {
            // The old root split: the new root holds one entry per half,
            // keyed by each half's minimum key.
            let left = self.read(child_new)?;
            let left_layout = if self.depth == 0 { self.leaf } else { self.node };
            let mut left_entry = left_layout.key(&left, 0).to_vec();
            left_entry.push(child_new);

            let mut right_entry = sep;
            right_entry.push(sep_child);

            let mut root = Block::new();
            self.node.set_row(&mut root, 0, &left_entry);
            self.node.set_row(&mut root, 1, &right_entry);

            self.root = self.store.add_block(&root)?;
            self.depth += 1;
        } else {
            self.root = child_new;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockstore::MemStore;

    /// A width-2, one-key-column tree over a fresh in-memory store with one
    /// allocated (empty) leaf, the way the engine sets tables up.
    fn empty_tree() -> Tree<MemStore> {
        let mut store = MemStore::new();
        let root = store.add_block(&Block::new()).unwrap();
        Tree::new(2, 1, store, 0, root)
    }

    fn collect(rows: &mut Rows<MemStore>) -> Vec<Vec<Word>> {
        let mut out = Vec::new();
        while rows.next() {
            out.push(rows.this().to_vec());
        }
        assert!(rows.err().is_none(), "scan failed: {:?}", rows.err());
        out
    }

    // -------------------- Point reads & writes --------------------

    #[test]
    fn put_then_get() {
        let mut t = empty_tree();
        t.put(&[13, 45]).unwrap();
        assert_eq!(t.get(&[13]).unwrap(), vec![13, 45]);
    }

    #[test]
    fn get_missing_is_not_found() {
        let mut t = empty_tree();
        t.put(&[1, 2]).unwrap();
        assert!(matches!(t.get(&[9]), Err(TreeError::NotFound)));
    }

    #[test]
    fn put_overwrites_existing_key() {
        let mut t = empty_tree();
        t.put(&[7, 1]).unwrap();
        t.put(&[7, 2]).unwrap();
        assert_eq!(t.get(&[7]).unwrap(), vec![7, 2]);
    }

    #[test]
    fn puts_keep_rows_sorted() {
        let mut t = empty_tree();
        for k in [5u64, 1, 16, 0] {
            t.put(&[k, k * 10]).unwrap();
        }
        let got = collect(&mut t.get_range(&[]));
        assert_eq!(
            got,
            vec![vec![0, 0], vec![1, 10], vec![5, 50], vec![16, 160]]
        );
    }

    // -------------------- Deletes --------------------

    #[test]
    fn delete_removes_row() {
        let mut t = empty_tree();
        t.put(&[1, 10]).unwrap();
        t.put(&[2, 20]).unwrap();
        t.delete(&[1]).unwrap();

        assert!(matches!(t.get(&[1]), Err(TreeError::NotFound)));
        assert_eq!(t.get(&[2]).unwrap(), vec![2, 20]);
    }

    #[test]
    fn delete_missing_is_not_found() {
        let mut t = empty_tree();
        t.put(&[1, 10]).unwrap();
        assert!(matches!(t.delete(&[9]), Err(TreeError::NotFound)));
    }

    #[test]
    fn put_delete_get_round_trip() {
        let mut t = empty_tree();
        t.put(&[3, 33]).unwrap();
        t.delete(&[3]).unwrap();
        assert!(matches!(t.get(&[3]), Err(TreeError::NotFound)));
    }

    // -------------------- Splits --------------------

    #[test]
    fn leaf_exactly_full_no_split() {
        // Capacity for 2-word rows is 32.
        let mut t = empty_tree();
        for k in 0..32u64 {
            t.put(&[k + 1, k]).unwrap();
        }
        assert_eq!(t.depth(), 0);
        for k in 0..32u64 {
            assert_eq!(t.get(&[k + 1]).unwrap(), vec![k + 1, k]);
        }
    }

    #[test]
    fn overflow_splits_root_leaf() {
        let mut t = empty_tree();
        for k in 0..33u64 {
            t.put(&[k + 1, k]).unwrap();
        }
        assert_eq!(t.depth(), 1);
        for k in 0..33u64 {
            assert_eq!(t.get(&[k + 1]).unwrap(), vec![k + 1, k]);
        }
        let got = collect(&mut t.get_range(&[]));
        assert_eq!(got.len(), 33);
    }

    #[test]
    fn split_point_becomes_separator_and_stays_reachable() {
        let mut t = empty_tree();
        for k in 0..33u64 {
            t.put(&[k + 1, 0]).unwrap();
        }
        // Rows 17..=33 moved to the new sibling; its first key is the
        // separator in the new root. Keys on both sides of it resolve.
        assert_eq!(t.get(&[17]).unwrap(), vec![17, 0]);
        assert_eq!(t.get(&[16]).unwrap(), vec![16, 0]);
        assert_eq!(t.get(&[18]).unwrap(), vec![18, 0]);
    }

    #[test]
    fn cascading_splits_grow_depth() {
        let mut t = empty_tree();
        for k in 0..2000u64 {
            t.put(&[k, k]).unwrap();
        }
        assert!(t.depth() >= 2, "depth {} after 2000 rows", t.depth());
        for k in (0..2000u64).step_by(97) {
            assert_eq!(t.get(&[k]).unwrap(), vec![k, k]);
        }
        let got = collect(&mut t.get_range(&[]));
        assert_eq!(got.len(), 2000);
        assert!(got.windows(2).all(|w| w[0][0] < w[1][0]));
    }

    #[test]
    fn descending_inserts_split_correctly() {
        let mut t = empty_tree();
        for k in (0..200u64).rev() {
            t.put(&[k, k + 1]).unwrap();
        }
        let got = collect(&mut t.get_range(&[]));
        assert_eq!(got.len(), 200);
        assert_eq!(got[0], vec![0, 1]);
        assert_eq!(got[199], vec![199, 200]);
    }

    #[test]
    fn overwrite_after_split_touches_right_leaf() {
        let mut t = empty_tree();
        for k in 0..40u64 {
            t.put(&[k, 0]).unwrap();
        }
        t.put(&[35, 99]).unwrap();
        assert_eq!(t.get(&[35]).unwrap(), vec![35, 99]);
    }

    #[test]
    fn delete_from_split_tree() {
        let mut t = empty_tree();
        for k in 0..100u64 {
            t.put(&[k, k]).unwrap();
        }
        for k in (0..100u64).step_by(2) {
            t.delete(&[k]).unwrap();
        }
        let got = collect(&mut t.get_range(&[]));
        assert_eq!(got.len(), 50);
        assert!(got.iter().all(|r| r[0] % 2 == 1));
    }

    // -------------------- Composite keys --------------------

    #[test]
    fn composite_key_get_and_range() {
        let mut store = MemStore::new();
        let root = store.add_block(&Block::new()).unwrap();
        let mut t = Tree::new(3, 2, store, 0, root);

        t.put(&[1, 5, 100]).unwrap();
        t.put(&[2, 0, 200]).unwrap();
        t.put(&[1, 9, 300]).unwrap();

        assert_eq!(t.get(&[1, 9]).unwrap(), vec![1, 9, 300]);

        // A one-word start key is zero-extended: scan begins at (2, 0).
        let got = collect(&mut t.get_range(&[2]));
        assert_eq!(got, vec![vec![2, 0, 200]]);
    }
}
