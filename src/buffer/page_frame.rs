use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;

/// PageFrame holds one resident page: its buffer plus the pin count and
/// dirty flag the buffer pool coordinates eviction with.
///
/// Frames are handed to callers as `Arc<PageFrame>`; a frame with
/// `pin_count > 0` is never evicted. Pinning and unpinning go through the
/// `BufferPoolManager` protocol, not the frame itself.
pub struct PageFrame {
    page_id: PageId,
    /// Number of outstanding references that keep the page resident.
    pin_count: AtomicU32,
    /// Whether the buffer has changes not yet written back to disk.
    dirty: AtomicBool,
    data: RwLock<Box<[u8]>>,
}

impl PageFrame {
    /// Fresh zero-filled frame, used for newly allocated pages.
    pub(crate) fn zeroed(page_id: PageId, page_size: usize) -> Self {
        Self::with_buffer(page_id, vec![0u8; page_size].into_boxed_slice())
    }

    /// Frame wrapping a buffer just read from disk.
    pub(crate) fn from_data(page_id: PageId, data: Vec<u8>) -> Self {
        Self::with_buffer(page_id, data.into_boxed_slice())
    }

    fn with_buffer(page_id: PageId, buffer: Box<[u8]>) -> Self {
        Self {
            page_id,
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
            data: RwLock::new(buffer),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Adds one pin and returns the updated count.
    pub(crate) fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drops one pin, flooring at zero. Returns the remaining count, or
    /// None when the frame was not pinned.
    pub(crate) fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pins| {
                pins.checked_sub(1)
            })
            .ok()
            .map(|previous| previous - 1)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    /// Returns a read guard to the page buffer.
    pub fn read_data(&self) -> RwLockReadGuard<'_, Box<[u8]>> {
        self.data.read()
    }

    /// Returns a write guard to the page buffer. Callers that modify the
    /// buffer must unpin with `is_dirty = true`.
    pub fn write_data(&self) -> RwLockWriteGuard<'_, Box<[u8]>> {
        self.data.write()
    }

    /// Snapshot of the buffer, used for write-back.
    pub(crate) fn copy_data(&self) -> Vec<u8> {
        self.data.read().to_vec()
    }
}
