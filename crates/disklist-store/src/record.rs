//! On-disk layout of one list node.
//!
//! `1B in_use | 4B prev | 4B next | 4B length | length bytes payload`
//!
//! Integers are big-endian and signed; a negative link means "none".
//! A freed record has every byte of its span set to zero.

use crate::store::FileStore;
use crate::StoreError;
use bytes::{Buf, BufMut, BytesMut};
use disklist_common::Data;

pub const HEADER_SIZE: usize = 1 + 4 + 4 + 4;
pub const MAX_PAYLOAD_SIZE: usize = 1024;
pub const MAX_RECORD_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// First byte of every live record.
pub const IN_USE_MARKER: u8 = 0x01;
pub const NO_LINK: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub offset: u32,
    pub prev: Option<u32>,
    pub next: Option<u32>,
    pub payload: Vec<u8>,
}

/// Bytes a payload of `len` occupies on disk.
pub fn allocate_size(len: usize) -> usize {
    HEADER_SIZE + len
}

impl Record {
    pub fn new(offset: u32, prev: Option<u32>, next: Option<u32>, payload: &Data) -> Self {
        Self {
            offset,
            prev,
            next,
            payload: payload.as_bytes().to_vec(),
        }
    }

    pub fn allocate_size(&self) -> usize {
        allocate_size(self.payload.len())
    }

    /// The oldest element of a chain has a predecessor but no successor.
    pub fn is_tail(&self) -> bool {
        self.prev.is_some() && self.next.is_none()
    }

    pub fn into_data(self) -> Data {
        Data::new(self.payload)
    }

    /// Reads the record starting at `offset`. Leaves the cursor after its payload.
    pub fn decode(store: &mut FileStore, offset: u32) -> Result<Self, StoreError> {
        if offset as u64 + HEADER_SIZE as u64 > store.len()? {
            return Err(StoreError::Corrupt {
                offset,
                reason: "header runs past end of file",
            });
        }
        store.seek(offset as u64)?;

        let mut header = [0u8; HEADER_SIZE];
        store.read_exact(&mut header)?;
        let mut buf = &header[..];

        if buf.get_u8() != IN_USE_MARKER {
            return Err(StoreError::Corrupt {
                offset,
                reason: "missing in-use marker",
            });
        }
        let prev = link_from_disk(buf.get_i32());
        let next = link_from_disk(buf.get_i32());
        let length = buf.get_i32();

        if length < 0 {
            return Err(StoreError::Corrupt {
                offset,
                reason: "negative payload length",
            });
        }
        let length = length as usize;
        if length > MAX_PAYLOAD_SIZE {
            return Err(StoreError::Corrupt {
                offset,
                reason: "payload length above maximum",
            });
        }
        if offset as u64 + allocate_size(length) as u64 > store.len()? {
            return Err(StoreError::Corrupt {
                offset,
                reason: "record runs past end of file",
            });
        }

        let mut payload = vec![0u8; length];
        store.read_exact(&mut payload)?;

        Ok(Self {
            offset,
            prev,
            next,
            payload,
        })
    }

    /// Writes the record at its offset, growing the store if needed.
    pub fn encode(&self, store: &mut FileStore) -> Result<(), StoreError> {
        store.seek(self.offset as u64)?;
        store.prepare(self.allocate_size())?;

        let mut buf = BytesMut::with_capacity(self.allocate_size());
        buf.put_u8(IN_USE_MARKER);
        buf.put_i32(link_to_disk(self.prev));
        buf.put_i32(link_to_disk(self.next));
        buf.put_i32(self.payload.len() as i32);
        buf.put_slice(&self.payload);

        store.write_all(&buf)
    }

    /// Zero-fills the record's whole span.
    pub fn erase(&self, store: &mut FileStore) -> Result<(), StoreError> {
        store.seek(self.offset as u64)?;
        store.zero(self.allocate_size())
    }
}

fn link_from_disk(raw: i32) -> Option<u32> {
    u32::try_from(raw).ok()
}

fn link_to_disk(link: Option<u32>) -> i32 {
    link.map_or(NO_LINK, |offset| offset as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use disklist_common::ListConfig;
    use std::fs;
    use tempfile::tempdir;

    fn open_store(dir: &tempfile::TempDir, initial_size: u64) -> FileStore {
        FileStore::open(dir.path().join("records.dl"), &ListConfig::new(initial_size, 0.5)).unwrap()
    }

    #[test]
    fn test_encode_decode_at_offset() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir, 256);

        let record = Record::new(40, Some(0), None, &Data::from("Second Node"));
        record.encode(&mut store).unwrap();

        let read = Record::decode(&mut store, 40).unwrap();
        assert_eq!(read, record);
        assert!(read.is_tail());

        // Cursor sits right after the record
        assert_eq!(store.position().unwrap(), 40 + record.allocate_size() as u64);
    }

    #[test]
    fn test_byte_layout() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir, 32);

        Record::new(0, None, Some(14), &Data::from("A"))
            .encode(&mut store)
            .unwrap();

        let bytes = fs::read(dir.path().join("records.dl")).unwrap();
        assert_eq!(
            &bytes[..14],
            &[0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 14, 0, 0, 0, 1, b'A']
        );
    }

    #[test]
    fn test_erase_zero_fills_span() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir, 64);

        let record = Record::new(8, None, None, &Data::from("gone"));
        record.encode(&mut store).unwrap();
        record.erase(&mut store).unwrap();

        let bytes = fs::read(dir.path().join("records.dl")).unwrap();
        assert!(bytes[8..8 + record.allocate_size()].iter().all(|&b| b == 0));
        assert_eq!(bytes[7], crate::store::FILLER);
        assert_eq!(bytes[8 + record.allocate_size()], crate::store::FILLER);
    }

    #[test]
    fn test_encode_grows_store() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir, 16);

        let payload = Data::new(vec![7u8; MAX_PAYLOAD_SIZE]);
        let record = Record::new(10, None, None, &payload);
        record.encode(&mut store).unwrap();

        // End of write plus half the initial size
        assert_eq!(store.len().unwrap(), 10 + MAX_RECORD_SIZE as u64 + 8);
        assert_eq!(Record::decode(&mut store, 10).unwrap(), record);
    }

    #[test]
    fn test_decode_rejects_bad_length() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir, 64);

        store.seek(0).unwrap();
        store
            .write_all(&[0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F, 0, 0, 0])
            .unwrap();

        let result = Record::decode(&mut store, 0);
        assert!(matches!(result, Err(StoreError::Corrupt { offset: 0, .. })));
    }

    #[test]
    fn test_decode_requires_marker() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir, 64);

        let record = Record::new(0, None, None, &Data::from("freed"));
        record.encode(&mut store).unwrap();
        record.erase(&mut store).unwrap();

        let result = Record::decode(&mut store, 0);
        assert!(matches!(
            result,
            Err(StoreError::Corrupt {
                offset: 0,
                reason: "missing in-use marker"
            })
        ));
    }

    #[test]
    fn test_tail_predicate() {
        let data = Data::from("x");
        assert!(Record::new(0, Some(14), None, &data).is_tail());
        assert!(!Record::new(0, None, None, &data).is_tail());
        assert!(!Record::new(0, Some(14), Some(28), &data).is_tail());
        assert!(!Record::new(0, None, Some(28), &data).is_tail());
    }
}
