use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::common::{
    PageId, PicoError, Result, BINLOG_FILE, DATA_FILE, HEADER_LEN, LOCK_FILE, PAGE_SIZE_UNIT,
};

use super::{IoQueue, IoTicket};

/// Configuration decoded from the data file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub page_size: usize,
}

/// StorageManager owns the database files and exposes a page-granular,
/// queue-serialized view of the data file.
///
/// The data file starts with a 4-byte little-endian page size; page `p`
/// occupies `HEADER_LEN + p * page_size .. HEADER_LEN + (p + 1) * page_size`.
/// Page 0 is reserved. The lock and binary log files are opened and held but
/// carry no behavior in this layer.
pub struct StorageManager {
    dir: PathBuf,
    data_file: Arc<File>,
    page_size: usize,
    queue: IoQueue,
    /// Serializes the stat-then-append sequence of `allocate_page`; queue
    /// workers run up to `IO_QUEUE_DEPTH` tasks at once.
    alloc_lock: Arc<Mutex<()>>,
    num_reads: Arc<AtomicU64>,
    num_writes: Arc<AtomicU64>,
    _lock_file: File,
    _binlog_file: File,
}

impl StorageManager {
    /// Opens an initialized database directory.
    ///
    /// Fails with `NotInitialized` if the data file is absent and with
    /// `ConfigOutOfRange` if the stored page size is zero or not a multiple
    /// of 1024. The I/O queue is started before returning.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let data_path = dir.join(DATA_FILE);

        if !data_path.exists() {
            return Err(PicoError::NotInitialized(dir));
        }

        let data_file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&data_path)
            .map_err(|e| open_error(e, &data_path))?;

        let lock_path = dir.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| open_error(e, &lock_path))?;

        let binlog_path = dir.join(BINLOG_FILE);
        let binlog_file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&binlog_path)
            .map_err(|e| open_error(e, &binlog_path))?;

        let mut header = [0u8; HEADER_LEN as usize];
        data_file.read_exact_at(&mut header, 0)?;
        let page_size = u32::from_le_bytes(header) as usize;
        validate_page_size(page_size)?;

        let queue = IoQueue::new();
        queue.start();

        info!(dir = %dir.display(), page_size, "opened database");

        Ok(Self {
            dir,
            data_file: Arc::new(data_file),
            page_size,
            queue,
            alloc_lock: Arc::new(Mutex::new(())),
            num_reads: Arc::new(AtomicU64::new(0)),
            num_writes: Arc::new(AtomicU64::new(0)),
            _lock_file: lock_file,
            _binlog_file: binlog_file,
        })
    }

    /// Page size recorded in the data file header.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Extends the data file by one zeroed page and returns its id.
    pub fn allocate_page(&self) -> IoTicket<PageId> {
        let file = Arc::clone(&self.data_file);
        let alloc_lock = Arc::clone(&self.alloc_lock);
        let num_writes = Arc::clone(&self.num_writes);
        let page_size = self.page_size;

        self.queue.enqueue(move || {
            let _guard = alloc_lock.lock();

            let len = file.metadata()?.len();
            let page_id = PageId::new(len / page_size as u64);

            let zeros = vec![0u8; page_size];
            file.write_all_at(&zeros, len)?;

            num_writes.fetch_add(1, Ordering::Relaxed);
            trace!(page_id = %page_id, "allocated page");
            Ok(page_id)
        })
    }

    /// Reads one page into a fresh buffer of `page_size` bytes.
    pub fn read_page(&self, page_id: PageId) -> IoTicket<Vec<u8>> {
        let file = Arc::clone(&self.data_file);
        let num_reads = Arc::clone(&self.num_reads);
        let page_size = self.page_size;

        self.queue.enqueue(move || {
            let mut data = vec![0u8; page_size];
            let offset = HEADER_LEN + page_id.as_u64() * page_size as u64;
            file.read_exact_at(&mut data, offset)?;

            num_reads.fetch_add(1, Ordering::Relaxed);
            trace!(page_id = %page_id, "read page");
            Ok(data)
        })
    }

    /// Writes a full page. The buffer must be exactly `page_size` bytes.
    pub fn write_page(&self, page_id: PageId, data: Vec<u8>) -> IoTicket<()> {
        let file = Arc::clone(&self.data_file);
        let num_writes = Arc::clone(&self.num_writes);
        let page_size = self.page_size;

        self.queue.enqueue(move || {
            if data.len() != page_size {
                return Err(PicoError::PageSizeMismatch {
                    expected: page_size,
                    actual: data.len(),
                });
            }

            let offset = HEADER_LEN + page_id.as_u64() * page_size as u64;
            file.write_all_at(&data, offset)?;

            num_writes.fetch_add(1, Ordering::Relaxed);
            trace!(page_id = %page_id, "wrote page");
            Ok(())
        })
    }

    /// Flushes the data file to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.data_file.sync_all()?;
        Ok(())
    }

    pub fn num_reads(&self) -> u64 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u64 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Creates a fresh database directory: the data file with its header and
    /// zero-filled page 0, plus the empty lock and binary log files.
    ///
    /// An existing directory is rejected unless `overwrite` is set, in which
    /// case it is removed and recreated.
    pub fn create<P: AsRef<Path>>(page_size_kb: usize, dir: P, overwrite: bool) -> Result<()> {
        let dir = dir.as_ref();

        if page_size_kb == 0 || page_size_kb > u32::MAX as usize / PAGE_SIZE_UNIT {
            return Err(PicoError::ConfigOutOfRange(format!(
                "page size must be a positive number of KiB, got {page_size_kb}"
            )));
        }
        let page_size = page_size_kb * PAGE_SIZE_UNIT;

        if dir.exists() {
            if !overwrite {
                return Err(PicoError::AlreadyExists(dir.to_path_buf()));
            }
            debug!(dir = %dir.display(), "removing existing database directory");
            fs::remove_dir_all(dir).map_err(|e| open_error(e, dir))?;
        }
        fs::create_dir_all(dir).map_err(|e| open_error(e, dir))?;

        let data_path = dir.join(DATA_FILE);
        let mut data_file = File::create(&data_path).map_err(|e| open_error(e, &data_path))?;
        data_file.write_all(&(page_size as u32).to_le_bytes())?;
        data_file.write_all(&vec![0u8; page_size])?;
        data_file.sync_all()?;

        File::create(dir.join(LOCK_FILE))?;
        File::create(dir.join(BINLOG_FILE))?;

        info!(dir = %dir.display(), page_size, "created database");
        Ok(())
    }

    /// Decodes the data file header without constructing a manager.
    pub fn metadata<P: AsRef<Path>>(dir: P) -> Result<Metadata> {
        let dir = dir.as_ref();
        let data_path = dir.join(DATA_FILE);

        if !data_path.exists() {
            return Err(PicoError::NotInitialized(dir.to_path_buf()));
        }

        let data_file = File::open(&data_path).map_err(|e| open_error(e, &data_path))?;
        let mut header = [0u8; HEADER_LEN as usize];
        data_file.read_exact_at(&mut header, 0)?;

        Ok(Metadata {
            page_size: u32::from_le_bytes(header) as usize,
        })
    }
}

fn validate_page_size(page_size: usize) -> Result<()> {
    if page_size == 0 || page_size % PAGE_SIZE_UNIT != 0 {
        return Err(PicoError::ConfigOutOfRange(format!(
            "page size {page_size} is not a positive multiple of {PAGE_SIZE_UNIT}"
        )));
    }
    Ok(())
}

fn open_error(err: std::io::Error, path: &Path) -> PicoError {
    if err.kind() == std::io::ErrorKind::PermissionDenied {
        PicoError::AccessDenied(path.to_path_buf())
    } else {
        PicoError::Io(err)
    }
}
