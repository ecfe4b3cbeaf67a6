//! B+ tree mutation: leaf insertion, leaf and internal splits, and the
//! root-split protocol.
//!
//! The root always stays on its original page. When it splits, its contents
//! move to a freshly allocated left child and the root page is rebuilt as an
//! internal node over the two halves, so `Table::root_page_num` never
//! changes.
//!
//! Nodes refer to each other by page number and every access goes through
//! the pager, so distinct pages can be mutated through independent guards
//! (a split touches the old node, the new node, and the parent).

use super::cursor::Cursor;
use super::node::{
    initialize_internal_node, initialize_leaf_node, Node, NodeType, INTERNAL_NODE_MAX_KEYS,
    INVALID_PAGE_NUM, LEAF_NODE_LEFT_SPLIT_COUNT, LEAF_NODE_MAX_CELLS,
    LEAF_NODE_RIGHT_SPLIT_COUNT,
};
use super::pager::{Pager, TABLE_MAX_PAGES};
use super::row::Row;
use super::table::Table;
use crate::errors::Error;
use tracing::debug;

/// Claims the next page number, or reports the table full when the
/// append-only allocator has reached the page cap.
fn allocate_page(pager: &mut Pager) -> Result<u32, Error> {
    let page_num = pager.get_unused_page_num();
    if page_num as usize >= TABLE_MAX_PAGES {
        return Err(Error::TableFull);
    }
    pager.ensure_loaded(page_num)?;
    Ok(page_num)
}

/// Inserts `(key, row)` at the cursor position, splitting the leaf when it
/// is already at capacity. The caller has verified the key is not present.
pub fn leaf_node_insert(cursor: &mut Cursor, key: u32, row: &Row) -> Result<(), Error> {
    let num_cells = { cursor.table.pager.page(cursor.page_num)?.leaf_num_cells() };
    if num_cells as usize >= LEAF_NODE_MAX_CELLS {
        return leaf_node_split_and_insert(cursor, key, row);
    }

    let mut node = cursor.table.pager.page(cursor.page_num)?;
    if cursor.cell_num < num_cells {
        // Make room for the new cell.
        for i in ((cursor.cell_num + 1)..=num_cells).rev() {
            let prev = node.leaf_cell(i - 1)?.to_vec();
            node.leaf_cell_mut(i)?.copy_from_slice(&prev);
        }
    }
    node.set_leaf_num_cells(num_cells + 1);
    node.set_leaf_key(cursor.cell_num, key)?;
    row.serialize(node.leaf_value_mut(cursor.cell_num)?);
    Ok(())
}

/// Create a new leaf and move half the cells over, the inserted one
/// included. Then update the parent, or create a new root if the split leaf
/// was the root.
fn leaf_node_split_and_insert(cursor: &mut Cursor, key: u32, row: &Row) -> Result<(), Error> {
    let table = &mut *cursor.table;
    let old_page_num = cursor.page_num;
    let old_max = table.pager.node_max_key(old_page_num)?;
    let new_page_num = allocate_page(&mut table.pager)?;
    debug!(old_page_num, new_page_num, "splitting leaf node");

    let was_root = {
        let mut old_node = table.pager.page(old_page_num)?;
        let mut new_node = table.pager.page(new_page_num)?;

        initialize_leaf_node(&mut new_node);
        new_node.set_parent(old_node.parent());

        // The new leaf takes over whatever used to follow the old leaf, and
        // the old leaf's sibling becomes the new leaf.
        new_node.set_leaf_next_leaf(old_node.leaf_next_leaf());
        old_node.set_leaf_next_leaf(new_page_num);

        // All existing cells plus the new one are divided evenly between
        // the two leaves. Starting from the right, move each cell to its
        // final position; sources are read from a pre-split snapshot so the
        // in-place shuffle cannot clobber them.
        let snapshot = Node {
            data: old_node.data,
        };
        for i in (0..=LEAF_NODE_MAX_CELLS as u32).rev() {
            let destination = if i as usize >= LEAF_NODE_LEFT_SPLIT_COUNT {
                &mut *new_node
            } else {
                &mut *old_node
            };
            let index_within_node = i % LEAF_NODE_LEFT_SPLIT_COUNT as u32;

            if i == cursor.cell_num {
                destination.set_leaf_key(index_within_node, key)?;
                row.serialize(destination.leaf_value_mut(index_within_node)?);
            } else if i > cursor.cell_num {
                destination
                    .leaf_cell_mut(index_within_node)?
                    .copy_from_slice(snapshot.leaf_cell(i - 1)?);
            } else {
                destination
                    .leaf_cell_mut(index_within_node)?
                    .copy_from_slice(snapshot.leaf_cell(i)?);
            }
        }
        old_node.set_leaf_num_cells(LEAF_NODE_LEFT_SPLIT_COUNT as u32);
        new_node.set_leaf_num_cells(LEAF_NODE_RIGHT_SPLIT_COUNT as u32);

        old_node.is_root()
    };

    if was_root {
        return create_new_root(table, new_page_num);
    }

    let (parent_page_num, new_max) = {
        let old_node = table.pager.page(old_page_num)?;
        (old_node.parent(), old_node.leaf_max_key()?)
    };
    {
        let mut parent = table.pager.get_page(parent_page_num)?;
        parent.update_internal_key(old_max, new_max)?;
    }
    internal_node_insert(table, parent_page_num, new_page_num)
}

/// Rebuilds the root page as an internal node over its relocated old
/// contents (the left child) and `right_child_page_num`.
pub fn create_new_root(table: &mut Table, right_child_page_num: u32) -> Result<(), Error> {
    let root_page_num = table.root_page_num;
    let left_child_page_num = allocate_page(&mut table.pager)?;
    debug!(
        root_page_num,
        left_child_page_num, right_child_page_num, "creating new root"
    );

    let left_is_internal = {
        let root = table.pager.page(root_page_num)?;
        let mut left_child = table.pager.page(left_child_page_num)?;

        // The old root is copied wholesale so the root page can be reused.
        left_child.data.copy_from_slice(&root.data);
        left_child.set_root(false);
        matches!(left_child.node_type()?, NodeType::Internal)
    };

    if left_is_internal {
        // The relocated node kept its children; point them at its new home.
        let num_keys = { table.pager.page(left_child_page_num)?.internal_num_keys() };
        for i in 0..=num_keys {
            let child_page_num = { table.pager.page(left_child_page_num)?.internal_child(i)? };
            table
                .pager
                .get_page(child_page_num)?
                .set_parent(left_child_page_num);
        }
    }

    {
        let mut root = table.pager.page(root_page_num)?;
        initialize_internal_node(&mut root);
        root.set_root(true);
        root.set_internal_num_keys(1);
        root.set_internal_child(0, left_child_page_num)?;
        root.set_internal_right_child(right_child_page_num);
    }
    let left_child_max_key = table.pager.node_max_key(left_child_page_num)?;
    {
        let mut root = table.pager.page(root_page_num)?;
        root.set_internal_key(0, left_child_max_key)?;
    }
    table
        .pager
        .page(left_child_page_num)?
        .set_parent(root_page_num);
    table
        .pager
        .page(right_child_page_num)?
        .set_parent(root_page_num);
    Ok(())
}

/// Adds a child/key pair to an internal node, splitting it when full.
///
/// The rightmost child is stored apart from the cell array, so a child whose
/// max key exceeds the current right child's max promotes the right child
/// into the cell array and takes its place.
pub fn internal_node_insert(
    table: &mut Table,
    parent_page_num: u32,
    child_page_num: u32,
) -> Result<(), Error> {
    let child_max_key = table.pager.node_max_key(child_page_num)?;

    let (index, original_num_keys) = {
        let parent = table.pager.page(parent_page_num)?;
        (
            parent.internal_find_child(child_max_key)?,
            parent.internal_num_keys(),
        )
    };

    if original_num_keys as usize >= INTERNAL_NODE_MAX_KEYS {
        return internal_node_split_and_insert(table, parent_page_num, child_page_num);
    }

    let right_child_page_num = { table.pager.page(parent_page_num)?.internal_right_child() };
    // An internal node with a right child of INVALID_PAGE_NUM is empty.
    if right_child_page_num == INVALID_PAGE_NUM {
        table
            .pager
            .page(parent_page_num)?
            .set_internal_right_child(child_page_num);
        return Ok(());
    }

    let right_max = table.pager.node_max_key(right_child_page_num)?;
    {
        let mut parent = table.pager.page(parent_page_num)?;
        // The key slot bound checks against num_keys, so room is made first.
        parent.set_internal_num_keys(original_num_keys + 1);

        if child_max_key > right_max {
            // Replace the right child.
            parent.set_internal_child(original_num_keys, right_child_page_num)?;
            parent.set_internal_key(original_num_keys, right_max)?;
            parent.set_internal_right_child(child_page_num);
        } else {
            // Make room for the new cell.
            for i in ((index + 1)..=original_num_keys).rev() {
                let prev = parent.internal_cell(i - 1)?.to_vec();
                parent.internal_cell_mut(i)?.copy_from_slice(&prev);
            }
            parent.set_internal_child(index, child_page_num)?;
            parent.set_internal_key(index, child_max_key)?;
        }
    }
    table
        .pager
        .get_page(child_page_num)?
        .set_parent(parent_page_num);
    Ok(())
}

/// Splits a full internal node in place and inserts `child_page_num` into
/// whichever half should own it. A new root is created last when the split
/// node was the root.
fn internal_node_split_and_insert(
    table: &mut Table,
    old_page_num: u32,
    child_page_num: u32,
) -> Result<(), Error> {
    let old_max = table.pager.node_max_key(old_page_num)?;
    let child_max = table.pager.node_max_key(child_page_num)?;

    let (splitting_root, old_parent, old_right_child) = {
        let old_node = table.pager.page(old_page_num)?;
        (
            old_node.is_root(),
            old_node.parent(),
            old_node.internal_right_child(),
        )
    };

    let new_page_num = allocate_page(&mut table.pager)?;
    debug!(old_page_num, new_page_num, "splitting internal node");
    {
        let mut new_node = table.pager.page(new_page_num)?;
        initialize_internal_node(&mut new_node);
        new_node.set_parent(old_parent);
    }

    // The old right child moves over first; it slots straight into the new
    // node's (still invalid) right child. The old node's right child stays
    // invalid until the redistribution below restores it.
    internal_node_insert(table, new_page_num, old_right_child)?;
    table
        .pager
        .get_page(old_right_child)?
        .set_parent(new_page_num);
    table
        .pager
        .page(old_page_num)?
        .set_internal_right_child(INVALID_PAGE_NUM);

    // Move the upper half of the cells, one by one, into the new node.
    for i in ((INTERNAL_NODE_MAX_KEYS / 2 + 1)..INTERNAL_NODE_MAX_KEYS).rev() {
        let moved_page_num = { table.pager.page(old_page_num)?.internal_child(i as u32)? };
        internal_node_insert(table, new_page_num, moved_page_num)?;
        table
            .pager
            .get_page(moved_page_num)?
            .set_parent(new_page_num);
        {
            let mut old_node = table.pager.page(old_page_num)?;
            let num_keys = old_node.internal_num_keys();
            old_node.set_internal_num_keys(num_keys - 1);
        }
    }

    // The highest remaining child becomes the old node's right child; its
    // key is the one being promoted to the parent.
    {
        let mut old_node = table.pager.page(old_page_num)?;
        let num_keys = old_node.internal_num_keys();
        let new_right_child = old_node.internal_child(num_keys - 1)?;
        old_node.set_internal_right_child(new_right_child);
        old_node.set_internal_num_keys(num_keys - 1);
    }

    // Insert the pending child into whichever half now covers its key.
    let max_after_split = table.pager.node_max_key(old_page_num)?;
    let destination_page_num = if child_max < max_after_split {
        old_page_num
    } else {
        new_page_num
    };
    internal_node_insert(table, destination_page_num, child_page_num)?;

    if splitting_root {
        create_new_root(table, new_page_num)
    } else {
        let new_old_max = table.pager.node_max_key(old_page_num)?;
        {
            let mut parent = table.pager.get_page(old_parent)?;
            parent.update_internal_key(old_max, new_old_max)?;
        }
        internal_node_insert(table, old_parent, new_page_num)
    }
}

/// Renders the tree rooted at `page_num`, two spaces of indent per level.
pub fn print_tree(
    pager: &mut Pager,
    page_num: u32,
    indentation_level: usize,
    out: &mut String,
) -> Result<(), Error> {
    fn indent(out: &mut String, level: usize) {
        for _ in 0..level {
            out.push_str("  ");
        }
    }

    let node_type = { pager.get_page(page_num)?.node_type()? };
    match node_type {
        NodeType::Leaf => {
            let node = pager.page(page_num)?;
            let num_cells = node.leaf_num_cells();
            indent(out, indentation_level);
            out.push_str(&format!("- leaf (size {})\n", num_cells));
            for i in 0..num_cells {
                indent(out, indentation_level + 1);
                out.push_str(&format!("- {}\n", node.leaf_key(i)?));
            }
        }
        NodeType::Internal => {
            let num_keys = { pager.page(page_num)?.internal_num_keys() };
            indent(out, indentation_level);
            out.push_str(&format!("- internal (size {})\n", num_keys));
            if num_keys > 0 {
                for i in 0..num_keys {
                    let child = { pager.page(page_num)?.internal_child(i)? };
                    print_tree(pager, child, indentation_level + 1, out)?;

                    let key = { pager.page(page_num)?.internal_key(i)? };
                    indent(out, indentation_level + 1);
                    out.push_str(&format!("- key {}\n", key));
                }
                let right_child = { pager.page(page_num)?.internal_right_child() };
                print_tree(pager, right_child, indentation_level + 1, out)?;
            }
        }
    }
    Ok(())
}
