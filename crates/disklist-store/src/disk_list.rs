//! A linked list whose nodes are records in a single file.
//!
//! A record occupies a contiguous `zone`. Freeing a zone zero-fills it, and new
//! records go into the lowest gap between live zones that is large enough.
//!
//! Inserts and removals touch the file immediately. Relinking a neighbour only
//! marks it dirty; [`DiskList::flush`] writes those nodes out, and also erases
//! records that recovery could not link back in.

use crate::quick_list::{Iter, Node, QuickList};
use crate::record::{self, Record, MAX_RECORD_SIZE};
use crate::recovery::{self, RecoveryReport, StaleZone};
use crate::store::FileStore;
use crate::StoreError;
use disklist_common::{Data, ListConfig};
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::path::Path;
use tracing::{debug, info, warn};

pub struct DiskList {
    store: FileStore,
    list: QuickList<Data>,
    recovery: RecoveryReport,
    /// Marked zones outside the list, erased on the next flush.
    stale: Vec<StaleZone>,
}

impl DiskList {
    /// Opens or creates the list file and rebuilds the list from it.
    pub fn open(path: impl AsRef<Path>, config: &ListConfig) -> Result<Self, StoreError> {
        let store = FileStore::open(path, config)?;
        let mut disk_list = Self {
            store,
            list: QuickList::new(),
            recovery: RecoveryReport::default(),
            stale: Vec::new(),
        };
        disk_list.pull()?;
        Ok(disk_list)
    }

    /// Rebuilds the in-memory list from disk. Writes nothing.
    fn pull(&mut self) -> Result<(), StoreError> {
        let (report, stale) = recovery::rebuild(&mut self.store, &mut self.list)?;
        if self.store.config().strict_recovery && !report.is_consistent() {
            self.list.clear();
            self.stale.clear();
            return Err(StoreError::RecoveryInconsistency(report));
        }
        self.recovery = report;
        self.stale = stale;
        Ok(())
    }

    /// Inserts `value` before the first node and writes its record.
    pub fn add_front(&mut self, value: impl Into<Data>) -> Result<&Node<Data>, StoreError> {
        let data = value.into();
        let size = record::allocate_size(data.len());

        if size > MAX_RECORD_SIZE {
            return Err(StoreError::AllocationTooLarge {
                size,
                max: MAX_RECORD_SIZE,
            });
        }
        if self.list.contains_value(&data) {
            return Err(StoreError::DuplicateValue);
        }

        let offset = self.find_free_zone(size)?;
        self.erase_stale_within(offset, size)?;
        let next = self.list.first().map(Node::offset);
        let record = Record::new(offset, None, next, &data);

        if let Err(e) = record.encode(&mut self.store) {
            // Don't leave a half-written marker in a free zone
            if let Err(erase_err) = record.erase(&mut self.store) {
                warn!(offset, error = %erase_err, "failed to erase partial record");
            }
            return Err(e);
        }
        debug!(offset, size, "allocated record");

        self.list.link_front(offset, data)
    }

    /// First-fit search over zones in offset order, starting at 0.
    fn find_free_zone(&self, size: usize) -> Result<u32, StoreError> {
        let mut gap_start = 0u64;
        for node in self.list.iter_by_offset() {
            if (node.offset() as u64).saturating_sub(gap_start) >= size as u64 {
                return Ok(gap_start as u32);
            }
            gap_start = zone_end(node);
        }

        // No gap: append after the highest zone
        let offset = self.list.highest().map_or(0, zone_end);
        if offset + size as u64 > i32::MAX as u64 {
            return Err(StoreError::FileTooLarge(offset + size as u64));
        }
        Ok(offset as u32)
    }

    /// Stale zones sharing bytes with a new allocation are wiped before it is
    /// written, so no leftover marker survives past the new record's end.
    fn erase_stale_within(&mut self, offset: u32, size: usize) -> Result<(), StoreError> {
        for zone in self.stale.iter().filter(|z| z.overlaps(offset, size)) {
            zone.erase(&mut self.store)?;
        }
        self.stale.retain(|z| !z.overlaps(offset, size));
        Ok(())
    }

    /// Removes the oldest node and frees its zone.
    pub fn remove_last(&mut self) -> Result<Data, StoreError> {
        let offset = self
            .list
            .last()
            .map(Node::offset)
            .ok_or(StoreError::EmptyList)?;
        self.remove(offset)
    }

    /// Removes the node at `offset`, wherever it sits in the chain, and frees its zone.
    pub fn remove(&mut self, offset: u32) -> Result<Data, StoreError> {
        let node = self
            .list
            .get(offset)
            .ok_or(StoreError::NodeNotFound(offset))?;
        record_of(node).erase(&mut self.store)?;

        let node = self
            .list
            .unlink(offset)
            .ok_or(StoreError::NodeNotFound(offset))?;
        debug!(offset, "freed record");
        Ok(node.into_value())
    }

    /// Relinks the node at `offset` as the front. Its record stays where it is.
    pub fn move_to_front(&mut self, offset: u32) -> Result<(), StoreError> {
        if self.list.move_to_front(offset) {
            Ok(())
        } else {
            Err(StoreError::NodeNotFound(offset))
        }
    }

    pub fn lookup<Q>(&self, value: &Q) -> Option<&Node<Data>>
    where
        Data: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.list.lookup_by_value(value)
    }

    /// Erases stale zones, writes every dirty node and syncs the file. Returns the
    /// number of records written.
    ///
    /// Takes `&mut self`, so two flushes on one list never interleave.
    pub fn flush(&mut self) -> Result<usize, StoreError> {
        if !self.stale.is_empty() {
            for zone in &self.stale {
                zone.erase(&mut self.store)?;
            }
            debug!(erased = self.stale.len(), "erased unreachable records");
            self.stale.clear();
        }

        let dirty: Vec<Record> = self.list.dirty_nodes().map(record_of).collect();
        for record in &dirty {
            record.encode(&mut self.store)?;
            self.list.mark_clean(record.offset);
        }
        self.store.sync()?;

        debug!(written = dirty.len(), "flushed");
        Ok(dirty.len())
    }

    /// Rewrites the file with records packed from offset 0 in chain order.
    ///
    /// Every node gets a new offset, so offsets held from before are stale.
    pub fn compact(&mut self) -> Result<(), StoreError> {
        self.flush()?;

        let values: Vec<&Data> = self.list.iter().map(Node::value).collect();
        let mut offsets = Vec::with_capacity(values.len());
        let mut point = 0u64;
        for value in &values {
            offsets.push(u32::try_from(point).map_err(|_| StoreError::FileTooLarge(point))?);
            point += record::allocate_size(value.len()) as u64;
        }

        let mut temp = self.store.temp_for()?;
        for (i, value) in values.iter().enumerate() {
            let prev = i.checked_sub(1).map(|p| offsets[p]);
            let next = offsets.get(i + 1).copied();
            Record::new(offsets[i], prev, next, value).encode(&mut temp)?;
        }

        let records = values.len();
        temp.replace(self.store.path())?;
        self.store.reopen()?;
        self.pull()?;

        info!(path = %self.store.path().display(), records, bytes = point, "compacted list");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Most recently added or moved node.
    pub fn first(&self) -> Option<&Node<Data>> {
        self.list.first()
    }

    /// Oldest node.
    pub fn last(&self) -> Option<&Node<Data>> {
        self.list.last()
    }

    pub fn get(&self, offset: u32) -> Option<&Node<Data>> {
        self.list.get(offset)
    }

    /// Nodes from first to last.
    pub fn iter(&self) -> Iter<'_, Data> {
        self.list.iter()
    }

    /// Nodes in file order.
    pub fn iter_by_offset(&self) -> impl Iterator<Item = &Node<Data>> + '_ {
        self.list.iter_by_offset()
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Outcome of the last rebuild (open or compaction).
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    #[cfg(test)]
    pub(crate) fn quick_list(&self) -> &QuickList<Data> {
        &self.list
    }
}

impl fmt::Display for DiskList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" > ")?;
            }
            write!(f, "{}={}", node.offset(), node.value())?;
        }
        Ok(())
    }
}

fn zone_end(node: &Node<Data>) -> u64 {
    node.offset() as u64 + record::allocate_size(node.value().len()) as u64
}

fn record_of(node: &Node<Data>) -> Record {
    Record::new(node.offset(), node.prev(), node.next(), node.value())
}
