use crate::quick_list::QuickList;
use crate::record::{Record, IN_USE_MARKER, MAX_RECORD_SIZE};
use crate::store::FileStore;
use crate::StoreError;
use disklist_common::Data;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

/// What a rebuild found on disk and how much of it made it into the list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Records decoded by the forward scan.
    pub scanned: usize,
    /// Records linked into the rebuilt list.
    pub rebuilt: usize,
    /// The backward walk revisited an offset.
    pub cycle_detected: bool,
    /// The backward walk hit a `prev` link with no record behind it.
    pub dangling_link: bool,
    /// Records skipped because their value was already linked.
    pub duplicates: usize,
    /// Marker bytes whose header did not decode.
    pub corrupt_headers: usize,
    /// No record looked like a tail, so the first scanned one was used.
    pub tail_fallback: bool,
}

/// Bytes `[offset, offset + len)` that still start with a marker but belong to
/// no node of the rebuilt list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleZone {
    pub offset: u32,
    pub len: usize,
}

impl StaleZone {
    pub fn overlaps(&self, offset: u32, len: usize) -> bool {
        let (start, end) = (self.offset as u64, self.offset as u64 + self.len as u64);
        let (other_start, other_end) = (offset as u64, offset as u64 + len as u64);
        start < other_end && other_start < end
    }

    /// Zero-fills the zone so the next scan no longer finds its marker.
    pub fn erase(&self, store: &mut FileStore) -> Result<(), StoreError> {
        store.seek(self.offset as u64)?;
        store.zero(self.len)
    }
}

impl RecoveryReport {
    /// Every scanned record was linked and the walk ended cleanly.
    pub fn is_consistent(&self) -> bool {
        !self.cycle_detected
            && !self.dangling_link
            && self.duplicates == 0
            && self.corrupt_headers == 0
            && self.rebuilt == self.scanned
    }

    /// Records left on disk but not reachable from the tail.
    pub fn orphaned(&self) -> usize {
        self.scanned - self.rebuilt - self.duplicates
    }
}

impl fmt::Display for RecoveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "buildSize= {}, rawSize= {}, cycle= {}, dangling= {}, duplicates= {}, corrupt= {}",
            self.rebuilt,
            self.scanned,
            self.cycle_detected,
            self.dangling_link,
            self.duplicates,
            self.corrupt_headers
        )
    }
}

/// Scans `store` for records and replaces the contents of `list` with the chain
/// that ends at the tail record.
///
/// The tail is the last tail-shaped record in file order. Scanning gives up once
/// `MAX_RECORD_SIZE` bytes pass without a marker, so trailing filler reads as end
/// of data.
///
/// Also returns the zones of everything scanned but left out of the list:
/// orphans, duplicates and undecodable headers. Nothing is erased here.
pub fn rebuild(
    store: &mut FileStore,
    list: &mut QuickList<Data>,
) -> Result<(RecoveryReport, Vec<StaleZone>), StoreError> {
    let mut report = RecoveryReport::default();
    let mut stale = Vec::new();
    let mut records: BTreeMap<u32, Record> = BTreeMap::new();
    let mut tail: Option<u32> = None;

    store.seek(0)?;
    while let Some(start) = store.find_marker(IN_USE_MARKER, MAX_RECORD_SIZE)? {
        let Ok(offset) = u32::try_from(start) else {
            break;
        };

        match Record::decode(store, offset) {
            Ok(record) => {
                if record.is_tail() {
                    tail = Some(offset);
                }
                records.insert(offset, record);
            }
            Err(StoreError::Corrupt { offset, reason }) => {
                warn!(offset, reason, "skipping undecodable record header");
                report.corrupt_headers += 1;
                stale.push(StaleZone { offset, len: 1 });
                store.seek(offset as u64 + 1)?;
            }
            Err(e) => return Err(e),
        }
    }

    list.clear();
    report.scanned = records.len();

    let Some(&first_scanned) = records.keys().next() else {
        debug!(path = %store.path().display(), "no records found");
        return Ok((report, stale));
    };
    let tail = tail.unwrap_or_else(|| {
        report.tail_fallback = true;
        first_scanned
    });

    let mut visited = HashSet::new();
    let mut cursor = Some(tail);
    while let Some(offset) = cursor {
        let Some(record) = records.remove(&offset) else {
            if visited.contains(&offset) {
                report.cycle_detected = true;
            } else {
                report.dangling_link = true;
            }
            break;
        };
        visited.insert(offset);
        cursor = record.prev;

        let len = record.allocate_size();
        let data = record.into_data();
        if list.contains_value(&data) {
            report.duplicates += 1;
            stale.push(StaleZone { offset, len });
            continue;
        }
        list.link_front(offset, data)?;
        report.rebuilt += 1;
    }

    stale.extend(records.values().map(|record| StaleZone {
        offset: record.offset,
        len: record.allocate_size(),
    }));
    stale.sort_by_key(|zone| zone.offset);

    if report.is_consistent() {
        list.mark_all_clean();
        info!(path = %store.path().display(), %report, "recovered list");
    } else {
        // Disk links disagree with the rebuilt chain; the next flush rewrites all of it
        list.mark_all_dirty();
        warn!(
            path = %store.path().display(),
            %report,
            orphaned = report.orphaned(),
            stale = stale.len(),
            "recovered list is incomplete"
        );
    }

    Ok((report, stale))
}
