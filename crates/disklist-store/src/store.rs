use crate::StoreError;
use disklist_common::ListConfig;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Byte written into freshly grown regions. Anything but the record marker works.
pub const FILLER: u8 = 0xFF;

const FILL_CHUNK: usize = 4096;

/// A growable random-access file.
///
/// The handle is created and sized once in [`FileStore::open`]; after the
/// backing file is replaced it must be re-established with
/// [`FileStore::reopen`] before the next access.
pub struct FileStore {
    path: PathBuf,
    file: File,
    config: ListConfig,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>, config: &ListConfig) -> Result<Self, StoreError> {
        config.validate()?;

        let path = path.as_ref().to_path_buf();
        let file = Self::open_file(&path)?;

        let mut store = Self {
            path,
            file,
            config: config.clone(),
        };
        store.ensure_initial_size()?;
        Ok(store)
    }

    /// Creates an empty sibling file at `<path>.tmp`, removing a stale one first.
    pub fn temp_for(&self) -> Result<Self, StoreError> {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        let temp_path = PathBuf::from(name);

        match fs::remove_file(&temp_path) {
            Ok(()) => debug!(path = %temp_path.display(), "removed stale temp file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Self::open(temp_path, &self.config)
    }

    /// Durably writes this store, then renames it over `target`.
    pub fn replace(mut self, target: &Path) -> Result<(), StoreError> {
        self.sync()?;
        let Self { path, file, .. } = self;
        drop(file);
        fs::rename(&path, target)?;
        Ok(())
    }

    /// Drops the current handle and opens the file at the same path again.
    pub fn reopen(&mut self) -> Result<(), StoreError> {
        self.file = Self::open_file(&self.path)?;
        self.ensure_initial_size()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &ListConfig {
        &self.config
    }

    pub fn len(&self) -> Result<u64, StoreError> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    pub fn seek(&mut self, pos: u64) -> Result<(), StoreError> {
        self.file.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn position(&mut self) -> Result<u64, StoreError> {
        Ok(self.file.stream_position()?)
    }

    /// Grows the file if writing `len` bytes at the cursor would run past its end.
    ///
    /// The new length is the write's end plus `scale_factor * initial_size`.
    pub fn prepare(&mut self, len: usize) -> Result<(), StoreError> {
        let target = self.position()? + len as u64;
        if self.len()? < target {
            self.grow_to(target + self.config.headroom())?;
        }
        Ok(())
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), StoreError> {
        self.file.read_exact(buf)?;
        Ok(())
    }

    pub fn write_all(&mut self, buf: &[u8]) -> Result<(), StoreError> {
        self.file.write_all(buf)?;
        Ok(())
    }

    /// Writes `len` zero bytes at the cursor.
    pub fn zero(&mut self, len: usize) -> Result<(), StoreError> {
        self.file.write_all(&vec![0u8; len])?;
        Ok(())
    }

    /// Looks for `marker` in the next `window + 1` bytes after the cursor.
    ///
    /// On a hit the cursor is left on the marker and its position returned.
    /// On a miss the cursor is left after the inspected bytes.
    pub fn find_marker(&mut self, marker: u8, window: usize) -> Result<Option<u64>, StoreError> {
        let start = self.position()?;
        let len = self.len()?;
        if start >= len {
            return Ok(None);
        }

        let count = (len - start).min(window as u64 + 1) as usize;
        let mut buf = vec![0u8; count];
        self.file.read_exact(&mut buf)?;

        match buf.iter().position(|&b| b == marker) {
            Some(idx) => {
                let found = start + idx as u64;
                self.seek(found)?;
                Ok(Some(found))
            }
            None => Ok(None),
        }
    }

    /// Forces written bytes and metadata to disk.
    pub fn sync(&mut self) -> Result<(), StoreError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn open_file(path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
    }

    fn ensure_initial_size(&mut self) -> Result<(), StoreError> {
        if self.len()? < self.config.initial_size {
            self.grow_to(self.config.initial_size)?;
        }
        Ok(())
    }

    fn grow_to(&mut self, new_len: u64) -> Result<(), StoreError> {
        let old_len = self.len()?;
        if new_len <= old_len {
            return Ok(());
        }

        let cursor = self.position()?;
        self.file.set_len(new_len)?;

        // Fill the new tail so recovery never mistakes it for a record start
        self.file.seek(SeekFrom::Start(old_len))?;
        let chunk = [FILLER; FILL_CHUNK];
        let mut remaining = new_len - old_len;
        while remaining > 0 {
            let n = remaining.min(FILL_CHUNK as u64) as usize;
            self.file.write_all(&chunk[..n])?;
            remaining -= n as u64;
        }

        self.file.seek(SeekFrom::Start(cursor))?;
        debug!(path = %self.path.display(), old_len, new_len, "grew store");
        Ok(())
    }
}
