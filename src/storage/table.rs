//! The table facade: owns the pager, bootstraps the root leaf, and exposes
//! insert and scan on top of the tree.

use super::btree;
use super::cursor::Cursor;
use super::node::initialize_leaf_node;
use super::pager::Pager;
use super::row::{Row, ROW_SIZE};
use crate::errors::Error;
use std::path::Path;
use tracing::{error, info};

pub struct Table {
    /// Always 0: the root never moves (see `btree::create_new_root`).
    pub root_page_num: u32,
    pub pager: Pager,
    closed: bool,
}

impl Table {
    /// Opens the database file, initializing page 0 as an empty root leaf
    /// when the file is new.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let mut pager = Pager::open(path)?;

        if pager.num_pages() == 0 {
            let mut root = pager.get_page(0)?;
            initialize_leaf_node(&mut root);
            root.set_root(true);
        }

        info!(path = %path.display(), num_pages = pager.num_pages(), "opened table");
        Ok(Table {
            root_page_num: 0,
            pager,
            closed: false,
        })
    }

    /// Inserts a row keyed by its id. Fails with `DuplicateKey` when the id
    /// is already present, leaving the tree untouched.
    pub fn insert(&mut self, row: &Row) -> Result<(), Error> {
        let key = row.id;
        let mut cursor = Cursor::table_find(self, key)?;

        {
            let node = cursor.table.pager.page(cursor.page_num)?;
            let num_cells = node.leaf_num_cells();
            if cursor.cell_num < num_cells && node.leaf_key(cursor.cell_num)? == key {
                return Err(Error::DuplicateKey);
            }
        }

        btree::leaf_node_insert(&mut cursor, key, row)
    }

    /// All rows in ascending key order.
    pub fn select(&mut self) -> Result<Vec<Row>, Error> {
        let mut rows = Vec::new();
        let mut buf = [0u8; ROW_SIZE];

        let mut cursor = Cursor::table_start(self)?;
        while !cursor.end_of_table {
            cursor.read_value(&mut buf)?;
            rows.push(Row::deserialize(&buf));
            cursor.advance()?;
        }
        Ok(rows)
    }

    /// Pretty-printed tree shape, for the shell's `.btree` command.
    pub fn btree_to_string(&mut self) -> Result<String, Error> {
        let mut out = String::new();
        btree::print_tree(&mut self.pager, self.root_page_num, 0, &mut out)?;
        Ok(out)
    }

    /// Flushes every loaded page. Durability is best-effort on clean close;
    /// there is no write-ahead log and no fsync.
    pub fn close(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        for page_num in 0..self.pager.num_pages() {
            if self.pager.is_loaded(page_num) {
                self.pager.flush(page_num)?;
            }
        }
        self.closed = true;
        info!("closed table");
        Ok(())
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(error = %e, "failed to flush table on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::node::NodeType;

    fn row_for(key: u32) -> Row {
        Row::new(
            key,
            &format!("user{}", key),
            &format!("person{}@example.com", key),
        )
        .unwrap()
    }

    #[test]
    fn fresh_table_is_an_empty_root_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Table::open(&dir.path().join("test.db")).unwrap();

        assert_eq!(table.pager.num_pages(), 1);
        {
            let root = table.pager.page(0).unwrap();
            assert_eq!(root.node_type().unwrap(), NodeType::Leaf);
            assert!(root.is_root());
            assert_eq!(root.leaf_num_cells(), 0);
        }
        assert!(table.select().unwrap().is_empty());
    }

    #[test]
    fn duplicate_key_is_rejected_without_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Table::open(&dir.path().join("test.db")).unwrap();

        table.insert(&Row::new(1, "a", "a@a").unwrap()).unwrap();
        match table.insert(&Row::new(1, "b", "b@b").unwrap()) {
            Err(Error::DuplicateKey) => {}
            other => panic!("expected DuplicateKey, got {:?}", other),
        }

        let rows = table.select().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].username(), "a");
        assert_eq!(rows[0].email(), "a@a");
    }

    #[test]
    fn rows_survive_close_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut table = Table::open(&path).unwrap();
            for key in (1..=20).rev() {
                table.insert(&row_for(key)).unwrap();
            }
            table.close().unwrap();
        }

        let mut table = Table::open(&path).unwrap();
        let rows = table.select().unwrap();
        let ids: Vec<u32> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, (1..=20).collect::<Vec<u32>>());
        assert_eq!(rows[0].username(), "user1");
        assert_eq!(rows[0].email(), "person1@example.com");
    }

    #[test]
    fn reopened_table_keeps_accepting_inserts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut table = Table::open(&path).unwrap();
            for key in 1..=30 {
                table.insert(&row_for(key)).unwrap();
            }
            // Dropped without an explicit close; Drop flushes.
        }

        let mut table = Table::open(&path).unwrap();
        for key in 31..=60 {
            table.insert(&row_for(key)).unwrap();
        }
        let ids: Vec<u32> = table.select().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, (1..=60).collect::<Vec<u32>>());
    }

    #[test]
    fn empty_table_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut table = Table::open(&path).unwrap();
            table.close().unwrap();
        }

        let mut table = Table::open(&path).unwrap();
        assert!(table.select().unwrap().is_empty());
        assert_eq!(table.btree_to_string().unwrap(), "- leaf (size 0)\n");
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Table::open(&dir.path().join("test.db")).unwrap();
        table.insert(&row_for(1)).unwrap();
        table.close().unwrap();
        table.close().unwrap();
    }

    #[test]
    fn file_length_is_whole_pages_after_close() {
        use crate::storage::pager::PAGE_SIZE;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut table = Table::open(&path).unwrap();
            for key in 1..=14 {
                table.insert(&row_for(key)).unwrap();
            }
            table.close().unwrap();
        }

        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, 3 * PAGE_SIZE as u64);
    }
}
