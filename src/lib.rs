//! PicoDB - an embedded, single-file, paged database engine core
//!
//! This crate provides durable, fixed-size page storage backed by a single
//! data file. Higher layers (records, indexes) consume pages through the
//! buffer pool; this crate stops at the page boundary.
//!
//! # Architecture
//!
//! The core is three tiers, leaves first:
//!
//! - **Storage** (`storage`): the paged file abstraction
//!   - `IoQueue`: bounded-concurrency dispatcher for all disk I/O
//!   - `StorageManager`: owns the database files; allocates, reads, and
//!     writes fixed-size pages at known offsets
//!
//! - **Buffer Pool** (`buffer`): in-memory page cache
//!   - `BufferPoolManager`: two-queue (history + cache) residency with pin
//!     counts, dirty tracking, and write-back eviction
//!   - `PageFrame`: per-resident-page buffer and metadata
//!
//! - **Free Space Map** (`fsm`): per-page used-space bytes
//!   - `FsmAccessor`: reads and writes used-space percentages inside
//!     dedicated FSM pages, through the buffer pool
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use picodb::{BufferPoolManager, StorageManager};
//!
//! // Initialize a database directory with 4 KiB pages
//! StorageManager::create(4, "demo-db", false).unwrap();
//! let storage = Arc::new(StorageManager::open("demo-db").unwrap());
//!
//! // Cache up to 8 pages in memory
//! let pool = BufferPoolManager::new(8, storage).unwrap();
//!
//! // Allocate a page, fill it, and persist it
//! let (page_id, frame) = pool.create_page().unwrap();
//! frame.write_data()[..3].copy_from_slice(b"ABC");
//! pool.unpin_page(page_id, true);
//! pool.flush_all().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod fsm;
pub mod storage;

// Re-export commonly used types at the crate root
pub use buffer::{BufferPoolManager, PageFrame};
pub use common::{PageId, PicoError, Residency, Result};
pub use fsm::FsmAccessor;
pub use storage::{IoQueue, IoTicket, Metadata, StorageManager};
