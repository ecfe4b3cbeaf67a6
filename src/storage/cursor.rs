//! Cursor-based navigation: a position within a leaf, used for both scans
//! and insertions.

use super::node::NodeType;
use super::table::Table;
use crate::errors::Error;

/// A position within the table. `page_num` always identifies a leaf;
/// `end_of_table` marks the position one past the last row.
pub struct Cursor<'a> {
    pub table: &'a mut Table,
    pub page_num: u32,
    pub cell_num: u32,
    pub end_of_table: bool,
}

impl<'a> Cursor<'a> {
    /// Position of `key`, or of the slot where it should be inserted.
    ///
    /// Descends from the root with a binary search over separator keys at
    /// each internal node, then binary-searches the leaf.
    pub fn table_find(table: &'a mut Table, key: u32) -> Result<Self, Error> {
        let mut page_num = table.root_page_num;
        loop {
            let node_type = { table.pager.get_page(page_num)?.node_type()? };
            match node_type {
                NodeType::Leaf => break,
                NodeType::Internal => {
                    page_num = {
                        let node = table.pager.page(page_num)?;
                        let child_index = node.internal_find_child(key)?;
                        node.internal_child(child_index)?
                    };
                }
            }
        }
        Self::leaf_find(table, page_num, key)
    }

    /// Position of the first row, with `end_of_table` already set for an
    /// empty table. Key 0 is below every valid key, so searching for it
    /// lands on the leftmost leaf.
    pub fn table_start(table: &'a mut Table) -> Result<Self, Error> {
        let mut cursor = Self::table_find(table, 0)?;
        let num_cells = { cursor.table.pager.page(cursor.page_num)?.leaf_num_cells() };
        cursor.end_of_table = num_cells == 0;
        Ok(cursor)
    }

    fn leaf_find(table: &'a mut Table, page_num: u32, key: u32) -> Result<Self, Error> {
        let cell_num = {
            let node = table.pager.page(page_num)?;

            // Binary search for the smallest index holding a key >= `key`.
            let mut min_index = 0;
            let mut one_past_max_index = node.leaf_num_cells();
            let mut found = None;
            while one_past_max_index != min_index {
                let index = (min_index + one_past_max_index) / 2;
                let key_at_index = node.leaf_key(index)?;
                if key == key_at_index {
                    found = Some(index);
                    break;
                }
                if key < key_at_index {
                    one_past_max_index = index;
                } else {
                    min_index = index + 1;
                }
            }
            found.unwrap_or(min_index)
        };

        Ok(Cursor {
            table,
            page_num,
            cell_num,
            end_of_table: false,
        })
    }

    /// Copies the row payload at the cursor position into `buf`.
    pub fn read_value(&self, buf: &mut [u8]) -> Result<(), Error> {
        let node = self.table.pager.page(self.page_num)?;
        buf.copy_from_slice(node.leaf_value(self.cell_num)?);
        Ok(())
    }

    /// Moves to the next cell, hopping to the sibling leaf when the current
    /// one is exhausted.
    pub fn advance(&mut self) -> Result<(), Error> {
        self.cell_num += 1;

        let next_page_num = {
            let node = self.table.pager.page(self.page_num)?;
            if self.cell_num < node.leaf_num_cells() {
                return Ok(());
            }
            node.leaf_next_leaf()
        };

        if next_page_num == 0 {
            // Rightmost leaf.
            self.end_of_table = true;
        } else {
            self.table.pager.ensure_loaded(next_page_num)?;
            self.page_num = next_page_num;
            self.cell_num = 0;
        }
        Ok(())
    }
}
