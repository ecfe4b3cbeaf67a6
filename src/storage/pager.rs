//! The pager is the sole gateway to storage: it owns the database file and a
//! bounded write-back cache of page buffers.
//!
//! Pages are faulted in on first access and stay resident until the table is
//! closed; the cache is direct-mapped (slot = page number) and can never
//! outgrow `TABLE_MAX_PAGES`, so there is no eviction. Dirtiness is not
//! tracked: every loaded page is flushed on close.
//!
//! Cache slots are `Arc<Mutex<Node>>` so tree operations can hold mutable
//! guards for two distinct pages at once (a split touches the old node, the
//! new node, and transitively the parent). Requesting a page whose guard is
//! still live is reported as a `Lock` error rather than deadlocking.

use super::node::{Node, NodeType};
use crate::errors::Error;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

/// 4 kilobytes, the page size used by the virtual memory systems of most
/// architectures.
pub const PAGE_SIZE: usize = 4096;

pub const TABLE_MAX_PAGES: usize = 100;

pub struct Pager {
    file: File,
    /// Length of the file at open time; pages beyond it start zeroed.
    file_length: u64,
    /// Count of distinct pages ever allocated, including ones not yet
    /// flushed. New pages are always allocated at this index.
    num_pages: u32,
    pages: heapless::Vec<Option<Arc<Mutex<Node>>>, TABLE_MAX_PAGES>,
}

impl Pager {
    /// Opens (creating if absent) the database file. A file whose length is
    /// not a whole number of pages is rejected.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let file_length = file.metadata()?.len();
        if file_length % PAGE_SIZE as u64 != 0 {
            return Err(err!(
                Corrupt,
                "Db file is not a whole number of pages ({} bytes).",
                file_length
            ));
        }

        let mut pages: heapless::Vec<Option<Arc<Mutex<Node>>>, TABLE_MAX_PAGES> =
            heapless::Vec::new();
        pages
            .resize_default(TABLE_MAX_PAGES)
            .expect("slot count equals capacity");

        debug!(file_length, "opened database file");
        Ok(Pager {
            file,
            file_length,
            num_pages: (file_length / PAGE_SIZE as u64) as u32,
            pages,
        })
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    pub fn is_loaded(&self, page_num: u32) -> bool {
        matches!(self.pages.get(page_num as usize), Some(Some(_)))
    }

    /// Page numbers 0 through N-1 are always the allocated ones, so page N is
    /// free. Pages are never recycled; there is no free list.
    pub fn get_unused_page_num(&self) -> u32 {
        self.num_pages
    }

    fn check_bounds(page_num: u32) -> Result<(), Error> {
        if page_num as usize >= TABLE_MAX_PAGES {
            return Err(err!(
                Storage,
                "Tried to fetch page number out of bounds. {} >= {}",
                page_num,
                TABLE_MAX_PAGES
            ));
        }
        Ok(())
    }

    /// Faults the page into its cache slot without locking it. Use together
    /// with [`Pager::page`] when guards for several pages must coexist.
    pub fn ensure_loaded(&mut self, page_num: u32) -> Result<(), Error> {
        Self::check_bounds(page_num)?;

        if self.pages[page_num as usize].is_none() {
            // Cache miss. Fault the page in, reading it from disk when the
            // file already contains it and leaving it zeroed otherwise.
            let mut node = Node::new_zeroed();
            let pages_on_disk = (self.file_length / PAGE_SIZE as u64) as u32;
            if page_num < pages_on_disk {
                self.file
                    .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
                self.file.read_exact(&mut node.data)?;
                trace!(page_num, "faulted page from disk");
            } else {
                trace!(page_num, "allocated fresh page");
            }
            self.pages[page_num as usize] = Some(Arc::new(Mutex::new(node)));

            if page_num >= self.num_pages {
                self.num_pages = page_num + 1;
            }
        }
        Ok(())
    }

    /// Locks an already-loaded page. Guards for distinct pages may be held
    /// simultaneously.
    pub fn page(&self, page_num: u32) -> Result<MutexGuard<'_, Node>, Error> {
        let slot = self
            .pages
            .get(page_num as usize)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| err!(Storage, "Page {} is not loaded.", page_num))?;
        slot.try_lock()
            .map_err(|_| err!(Lock, "Page {} is already borrowed.", page_num))
    }

    /// Faults the page in if needed, then locks it.
    pub fn get_page(&mut self, page_num: u32) -> Result<MutexGuard<'_, Node>, Error> {
        self.ensure_loaded(page_num)?;
        self.page(page_num)
    }

    /// Writes the page back to disk at its fixed offset.
    pub fn flush(&mut self, page_num: u32) -> Result<(), Error> {
        Self::check_bounds(page_num)?;
        let slot = self.pages[page_num as usize]
            .as_ref()
            .ok_or_else(|| err!(Storage, "Tried to flush unloaded page {}.", page_num))?;
        let node = slot
            .try_lock()
            .map_err(|_| err!(Lock, "Page {} is already borrowed.", page_num))?;

        self.file
            .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
        self.file.write_all(&node.data)?;
        trace!(page_num, "flushed page");
        Ok(())
    }

    /// Largest key in the subtree rooted at `page_num`: the last key of the
    /// rightmost leaf.
    pub fn node_max_key(&mut self, page_num: u32) -> Result<u32, Error> {
        let right_child = {
            let node = self.get_page(page_num)?;
            match node.node_type()? {
                NodeType::Leaf => return node.leaf_max_key(),
                NodeType::Internal => node.internal_right_child(),
            }
        };
        self.node_max_key(right_child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::node::initialize_leaf_node;
    use std::io::Write as _;

    fn temp_db_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
        dir.path().join("test.db")
    }

    #[test]
    fn open_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let pager = Pager::open(&temp_db_path(&dir)).unwrap();
        assert_eq!(pager.num_pages(), 0);
        assert_eq!(pager.get_unused_page_num(), 0);
    }

    #[test]
    fn open_rejects_partial_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_db_path(&dir);
        let mut file = File::create(&path).unwrap();
        file.write_all(&[0u8; PAGE_SIZE + 1]).unwrap();

        match Pager::open(&path) {
            Err(Error::Corrupt(_)) => {}
            other => panic!("expected Corrupt error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn faulting_extends_num_pages() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = Pager::open(&temp_db_path(&dir)).unwrap();

        {
            let page = pager.get_page(0).unwrap();
            assert!(page.data.iter().all(|b| *b == 0));
        }
        assert_eq!(pager.num_pages(), 1);
        assert_eq!(pager.get_unused_page_num(), 1);
    }

    #[test]
    fn rejects_page_numbers_beyond_cap() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = Pager::open(&temp_db_path(&dir)).unwrap();
        assert!(pager.get_page(TABLE_MAX_PAGES as u32).is_err());
    }

    #[test]
    fn flush_requires_a_loaded_page() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = Pager::open(&temp_db_path(&dir)).unwrap();
        assert!(pager.flush(0).is_err());
    }

    #[test]
    fn flushed_pages_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_db_path(&dir);

        {
            let mut pager = Pager::open(&path).unwrap();
            {
                let mut page = pager.get_page(0).unwrap();
                initialize_leaf_node(&mut page);
                page.set_leaf_num_cells(5);
            }
            pager.flush(0).unwrap();
        }

        let mut pager = Pager::open(&path).unwrap();
        assert_eq!(pager.num_pages(), 1);
        let page = pager.get_page(0).unwrap();
        assert_eq!(page.leaf_num_cells(), 5);
    }

    #[test]
    fn same_page_reborrow_is_a_lock_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = Pager::open(&temp_db_path(&dir)).unwrap();

        pager.ensure_loaded(0).unwrap();
        let _guard = pager.page(0).unwrap();
        match pager.page(0) {
            Err(Error::Lock(_)) => {}
            _ => panic!("expected Lock error"),
        };
    }
}
