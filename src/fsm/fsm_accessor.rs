use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, Result};

/// FsmAccessor encodes per-page used-space percentages into free space map
/// pages.
///
/// Every page whose id is a multiple of the page size is an FSM page: it
/// stores one unsigned byte per page in its aligned range, so the byte for
/// page `p` lives in FSM page `floor(p / page_size) * page_size` at offset
/// `p % page_size`. The accessor is an ordinary buffer pool consumer and
/// follows the pin/unpin protocol for every byte it touches.
pub struct FsmAccessor {
    pool: Arc<BufferPoolManager>,
}

impl FsmAccessor {
    pub fn new(pool: Arc<BufferPoolManager>) -> Self {
        Self { pool }
    }

    /// FSM page and byte offset tracking `page_id`.
    fn locate(&self, page_id: PageId) -> (PageId, usize) {
        let page_size = self.pool.page_size() as u64;
        let fsm_page = PageId::new(page_id.as_u64() / page_size * page_size);
        let offset = (page_id.as_u64() % page_size) as usize;
        (fsm_page, offset)
    }

    /// Reads the used-space byte recorded for `page_id`.
    pub fn used_space_percent(&self, page_id: PageId) -> Result<u8> {
        let (fsm_page, offset) = self.locate(page_id);

        let frame = self.pool.get_page(fsm_page)?;
        let pct = frame.read_data()[offset];
        self.pool.unpin_page(fsm_page, false);

        Ok(pct)
    }

    /// Records the used-space byte for `page_id`, marking the FSM page
    /// dirty.
    pub fn set_used_space_percent(&self, page_id: PageId, pct: u8) -> Result<()> {
        let (fsm_page, offset) = self.locate(page_id);

        let frame = self.pool.get_page(fsm_page)?;
        frame.write_data()[offset] = pct;
        self.pool.unpin_page(fsm_page, true);

        Ok(())
    }

    /// Free bytes a page with the given used percentage still has.
    /// Percentages above 100 clamp to zero free bytes.
    pub fn free_space_left_bytes(&self, pct: u8) -> u64 {
        let free_pct = 100u64.saturating_sub(pct as u64);
        free_pct * self.pool.page_size() as u64 / 100
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageManager;

    fn create_fsm() -> (FsmAccessor, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_dir = temp_dir.path().join("db");
        StorageManager::create(4, &db_dir, false).unwrap();
        let storage = Arc::new(StorageManager::open(&db_dir).unwrap());
        let pool = Arc::new(BufferPoolManager::new(8, storage).unwrap());
        (FsmAccessor::new(pool), temp_dir)
    }

    #[test]
    fn test_locate_addressing() {
        let (fsm, _temp) = create_fsm();

        // page_size = 4096: pages below 4096 map into FSM page 0.
        assert_eq!(fsm.locate(PageId::new(2050)), (PageId::new(0), 2050));
        assert_eq!(fsm.locate(PageId::new(4096)), (PageId::new(4096), 0));
        assert_eq!(fsm.locate(PageId::new(4097)), (PageId::new(4096), 1));
    }

    #[test]
    fn test_set_get_round_trip() {
        let (fsm, _temp) = create_fsm();

        fsm.set_used_space_percent(PageId::new(2050), 75).unwrap();
        assert_eq!(fsm.used_space_percent(PageId::new(2050)).unwrap(), 75);
    }

    #[test]
    fn test_round_trip_full_byte_range() {
        let (fsm, _temp) = create_fsm();

        for value in [0u8, 1, 50, 100, 101, 200, 255] {
            fsm.set_used_space_percent(PageId::new(10), value).unwrap();
            assert_eq!(fsm.used_space_percent(PageId::new(10)).unwrap(), value);
        }
    }

    #[test]
    fn test_unpins_after_access() {
        let (fsm, _temp) = create_fsm();

        fsm.set_used_space_percent(PageId::new(5), 30).unwrap();
        fsm.used_space_percent(PageId::new(5)).unwrap();

        assert_eq!(fsm.pool.pin_count(PageId::new(0)), Some(0));
    }

    #[test]
    fn test_free_space_left_bytes() {
        let (fsm, _temp) = create_fsm();

        assert_eq!(fsm.free_space_left_bytes(0), 4096);
        assert_eq!(fsm.free_space_left_bytes(100), 0);
        assert_eq!(fsm.free_space_left_bytes(75), 1024);
        assert_eq!(fsm.free_space_left_bytes(50), 2048);
        // Stored bytes above 100 have no free space left.
        assert_eq!(fsm.free_space_left_bytes(255), 0);
    }
}
