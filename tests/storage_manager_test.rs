//! Integration tests for the storage manager and I/O queue

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use picodb::{PageId, PicoError, StorageManager};

fn create_db(page_size_kb: usize) -> (StorageManager, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_dir = temp_dir.path().join("db");
    StorageManager::create(page_size_kb, &db_dir, false).unwrap();
    let manager = StorageManager::open(&db_dir).unwrap();
    (manager, temp_dir)
}

#[test]
fn test_create_writes_header_and_reserved_page() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_dir = temp_dir.path().join("db");
    StorageManager::create(4, &db_dir, false).unwrap();

    let raw = std::fs::read(db_dir.join("pico.db")).unwrap();
    assert_eq!(raw.len(), 4 + 4096);
    assert_eq!(u32::from_le_bytes(raw[..4].try_into().unwrap()), 4096);
    assert!(raw[4..].iter().all(|b| *b == 0));
}

#[test]
fn test_open_missing_database() {
    let temp_dir = tempfile::tempdir().unwrap();
    let missing: PathBuf = temp_dir.path().join("nope");

    assert!(matches!(
        StorageManager::open(&missing),
        Err(PicoError::NotInitialized(_))
    ));
}

#[test]
fn test_allocate_write_read_round_trip() {
    let (manager, _temp) = create_db(4);

    let page_id = manager.allocate_page().wait().unwrap();
    assert_eq!(page_id, PageId::new(1));

    let mut data = vec![0u8; manager.page_size()];
    for (i, byte) in data.iter_mut().enumerate() {
        *byte = (i % 256) as u8;
    }
    manager.write_page(page_id, data.clone()).wait().unwrap();

    let read_back = manager.read_page(page_id).wait().unwrap();
    assert_eq!(read_back, data);
}

#[test]
fn test_page_offsets_are_independent() {
    let (manager, _temp) = create_db(4);

    let page_ids: Vec<_> = (0..10)
        .map(|_| manager.allocate_page().wait().unwrap())
        .collect();

    // Write in scrambled order, read back in allocation order.
    let order = [5, 2, 8, 0, 7, 3, 9, 1, 6, 4];
    for &i in &order {
        let mut data = vec![0u8; manager.page_size()];
        data[0] = i as u8;
        manager.write_page(page_ids[i], data).wait().unwrap();
    }

    for (i, &page_id) in page_ids.iter().enumerate() {
        let data = manager.read_page(page_id).wait().unwrap();
        assert_eq!(data[0], i as u8);
    }
}

#[test]
fn test_metadata_round_trip() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_dir = temp_dir.path().join("db");
    StorageManager::create(16, &db_dir, false).unwrap();

    let metadata = StorageManager::metadata(&db_dir).unwrap();
    assert_eq!(metadata.page_size, 16 * 1024);
}

#[test]
fn test_concurrent_reads() {
    let (manager, _temp) = create_db(4);

    let page_ids: Vec<_> = (0..8)
        .map(|_| manager.allocate_page().wait().unwrap())
        .collect();
    for &page_id in &page_ids {
        let mut data = vec![0u8; manager.page_size()];
        data[0] = page_id.as_u64() as u8;
        manager.write_page(page_id, data).wait().unwrap();
    }

    // 32 reads in flight against the 16-task ceiling; all must complete.
    let tickets: Vec<_> = (0..32)
        .map(|i| {
            let page_id = page_ids[i % page_ids.len()];
            (page_id, manager.read_page(page_id))
        })
        .collect();

    for (page_id, ticket) in tickets {
        let data = ticket.wait().unwrap();
        assert_eq!(data[0], page_id.as_u64() as u8);
    }
}

#[test]
fn test_concurrent_allocations_get_distinct_ids() {
    let (manager, _temp) = create_db(4);
    let manager = Arc::new(manager);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                (0..4)
                    .map(|_| manager.allocate_page().wait().unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids: Vec<PageId> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    ids.sort();
    ids.dedup();

    // 32 allocations, all distinct and dense starting at page 1.
    assert_eq!(ids.len(), 32);
    assert_eq!(ids.first(), Some(&PageId::new(1)));
    assert_eq!(ids.last(), Some(&PageId::new(32)));
}

#[test]
fn test_write_error_does_not_poison_queue() {
    let (manager, _temp) = create_db(4);
    let page_id = manager.allocate_page().wait().unwrap();

    let bad = manager.write_page(page_id, vec![0u8; 7]).wait();
    assert!(matches!(bad, Err(PicoError::PageSizeMismatch { .. })));

    // The queue keeps serving after a failed task.
    let data = manager.read_page(page_id).wait().unwrap();
    assert_eq!(data.len(), manager.page_size());
}
