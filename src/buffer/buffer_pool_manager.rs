use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::common::{PageId, PicoError, Residency, Result, MIN_POOL_SIZE};
use crate::storage::StorageManager;

use super::PageFrame;

struct PoolEntry {
    frame: Arc<PageFrame>,
    residency: Residency,
}

/// Residency state: every resident page has one entry and sits in exactly
/// one of the two recency lists, most recently touched at the back.
struct PoolState {
    entries: HashMap<PageId, PoolEntry>,
    history: VecDeque<PageId>,
    cache: VecDeque<PageId>,
    /// Pages whose write-back is in flight with the lock released. They stay
    /// resident but are not eviction candidates until the write commits.
    write_backs: HashSet<PageId>,
}

impl PoolState {
    fn list(&self, tier: Residency) -> &VecDeque<PageId> {
        match tier {
            Residency::History => &self.history,
            Residency::Cache => &self.cache,
        }
    }

    fn list_mut(&mut self, tier: Residency) -> &mut VecDeque<PageId> {
        match tier {
            Residency::History => &mut self.history,
            Residency::Cache => &mut self.cache,
        }
    }

    fn remove(&mut self, page_id: PageId, tier: Residency) {
        remove_id(self.list_mut(tier), page_id);
        self.entries.remove(&page_id);
    }
}

/// BufferPoolManager caches pages in memory under a two-queue residency
/// policy and mediates all page access from higher layers.
///
/// A first reference brings a page into the history list; a second promotes
/// it to the cache list, so single-probe pages never displace hot ones. Of a
/// pool of `pool_size` entries, a quarter is history and three quarters are
/// cache. Callers pin pages through `get_page`/`create_page` and must pair
/// every pin with exactly one `unpin_page`.
///
/// The state mutex is never held across disk I/O: fetches and write-backs
/// run with the lock released and re-acquire it to commit, so reads for
/// unrelated pages overlap up to the I/O queue's concurrency ceiling.
pub struct BufferPoolManager {
    storage: Arc<StorageManager>,
    history_cap: usize,
    cache_cap: usize,
    state: Mutex<PoolState>,
    /// Signaled whenever an in-flight write-back commits or fails.
    write_back_done: Condvar,
}

impl BufferPoolManager {
    /// Creates a pool with room for `pool_size` pages; `pool_size` must be
    /// at least `MIN_POOL_SIZE`.
    pub fn new(pool_size: usize, storage: Arc<StorageManager>) -> Result<Self> {
        if pool_size < MIN_POOL_SIZE {
            return Err(PicoError::ConfigOutOfRange(format!(
                "buffer pool size must be at least {MIN_POOL_SIZE}, got {pool_size}"
            )));
        }

        let quarter = pool_size / 4;
        Ok(Self {
            storage,
            history_cap: quarter,
            cache_cap: 3 * quarter,
            state: Mutex::new(PoolState {
                entries: HashMap::new(),
                history: VecDeque::new(),
                cache: VecDeque::new(),
                write_backs: HashSet::new(),
            }),
            write_back_done: Condvar::new(),
        })
    }

    pub fn page_size(&self) -> usize {
        self.storage.page_size()
    }

    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.storage
    }

    /// Allocates a new page on disk and registers it in the pool.
    ///
    /// The fresh page enters the history list pinned once and dirty, so the
    /// caller can fill the zeroed buffer and unpin when done.
    pub fn create_page(&self) -> Result<(PageId, Arc<PageFrame>)> {
        let page_id = self.storage.allocate_page().wait()?;

        let frame = Arc::new(PageFrame::zeroed(page_id, self.storage.page_size()));
        frame.pin();
        frame.set_dirty(true);

        loop {
            {
                let mut state = self.state.lock();
                if state.history.len() < self.history_cap {
                    state.entries.insert(
                        page_id,
                        PoolEntry {
                            frame: Arc::clone(&frame),
                            residency: Residency::History,
                        },
                    );
                    state.history.push_back(page_id);
                    return Ok((page_id, frame));
                }
            }
            self.evict(Residency::History)?;
        }
    }

    /// Returns the frame for `page_id`, pinned once, fetching it from disk
    /// if it is not resident.
    ///
    /// A cache hit refreshes recency; a history hit promotes the page to the
    /// cache list; a miss admits it to the history list. A resident page is
    /// pinned before any eviction runs, so it can never be selected as the
    /// victim of its own call.
    pub fn get_page(&self, page_id: PageId) -> Result<Arc<PageFrame>> {
        loop {
            let mut room_in_history = false;
            {
                let mut state = self.state.lock();

                let resident = state
                    .entries
                    .get(&page_id)
                    .map(|entry| (Arc::clone(&entry.frame), entry.residency));

                if let Some((frame, residency)) = resident {
                    frame.pin();
                    match residency {
                        Residency::Cache => {
                            touch(&mut state.cache, page_id);
                            return Ok(frame);
                        }
                        Residency::History => {
                            if state.cache.len() < self.cache_cap {
                                promote(&mut state, page_id);
                                return Ok(frame);
                            }
                            drop(state);
                            return self.promote_slow(page_id, frame);
                        }
                    }
                }

                if state.history.len() < self.history_cap {
                    room_in_history = true;
                }
            }

            if room_in_history {
                if let Some(frame) = self.admit(page_id)? {
                    return Ok(frame);
                }
                // lost an admission race; start over
                continue;
            }
            self.evict(Residency::History)?;
        }
    }

    /// Reads an absent page with the lock released and inserts it into the
    /// history list. Returns None when another call admitted the page first
    /// or the history slot was taken meanwhile; the caller retries.
    fn admit(&self, page_id: PageId) -> Result<Option<Arc<PageFrame>>> {
        let data = self.storage.read_page(page_id).wait()?;

        let mut state = self.state.lock();
        if state.entries.contains_key(&page_id) || state.history.len() >= self.history_cap {
            return Ok(None);
        }

        let frame = Arc::new(PageFrame::from_data(page_id, data));
        frame.pin();
        state.entries.insert(
            page_id,
            PoolEntry {
                frame: Arc::clone(&frame),
                residency: Residency::History,
            },
        );
        state.history.push_back(page_id);

        Ok(Some(frame))
    }

    /// Second-access promotion when the cache list is full. The caller
    /// already holds a pin, which keeps the page resident while cache
    /// victims are written back.
    fn promote_slow(&self, page_id: PageId, frame: Arc<PageFrame>) -> Result<Arc<PageFrame>> {
        loop {
            if let Err(err) = self.evict(Residency::Cache) {
                let _ = frame.unpin();
                return Err(err);
            }

            let mut state = self.state.lock();
            match state.entries.get(&page_id).map(|entry| entry.residency) {
                Some(Residency::History) if state.cache.len() < self.cache_cap => {
                    promote(&mut state, page_id);
                    return Ok(frame);
                }
                // another admission refilled the cache; evict again
                Some(Residency::History) => {}
                Some(Residency::Cache) => {
                    // a concurrent call already promoted it
                    touch(&mut state.cache, page_id);
                    return Ok(frame);
                }
                None => return Ok(frame),
            }
        }
    }

    /// Releases one pin on `page_id`; a no-op if the page is not resident or
    /// already unpinned. `is_dirty = true` marks the buffer as modified; the
    /// flag stays set until a successful write-back.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) {
        let state = self.state.lock();

        if let Some(entry) = state.entries.get(&page_id) {
            if is_dirty {
                entry.frame.set_dirty(true);
            }
            let _ = entry.frame.unpin();
        }
    }

    /// Writes every resident dirty page back to disk, clearing each dirty
    /// flag only after its write completes.
    pub fn flush_all(&self) -> Result<()> {
        let resident: Vec<PageId> = {
            let state = self.state.lock();
            state
                .history
                .iter()
                .chain(state.cache.iter())
                .copied()
                .collect()
        };

        let mut flushed = 0usize;
        for page_id in resident {
            let claimed = {
                let mut guard = self.state.lock();
                let state = &mut *guard;
                match state.entries.get(&page_id) {
                    Some(entry)
                        if entry.frame.is_dirty() && !state.write_backs.contains(&page_id) =>
                    {
                        // Clear the flag before writing: a concurrent
                        // modification re-dirties the page and it is flushed
                        // again by a later call.
                        entry.frame.set_dirty(false);
                        state.write_backs.insert(page_id);
                        Some((Arc::clone(&entry.frame), entry.frame.copy_data()))
                    }
                    _ => None,
                }
            };

            if let Some((frame, data)) = claimed {
                let write = self.storage.write_page(page_id, data).wait();

                let mut state = self.state.lock();
                state.write_backs.remove(&page_id);
                self.write_back_done.notify_all();

                if let Err(err) = write {
                    frame.set_dirty(true);
                    return Err(err);
                }
                flushed += 1;
            }
        }

        debug!(flushed, "flushed dirty pages");
        Ok(())
    }

    /// Pin count of a resident page, None if not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        self.state
            .lock()
            .entries
            .get(&page_id)
            .map(|entry| entry.frame.pin_count())
    }

    /// Which list a resident page sits in, None if not resident.
    pub fn residency(&self, page_id: PageId) -> Option<Residency> {
        self.state
            .lock()
            .entries
            .get(&page_id)
            .map(|entry| entry.residency)
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    pub fn cache_len(&self) -> usize {
        self.state.lock().cache.len()
    }

    fn tier_cap(&self, tier: Residency) -> usize {
        match tier {
            Residency::History => self.history_cap,
            Residency::Cache => self.cache_cap,
        }
    }

    /// Evicts the oldest unpinned page from the given list. Clean victims
    /// are removed under the lock; dirty victims are claimed, written back
    /// with the lock released, and removed once the write commits. Fails
    /// with `BufferPoolOverflow` when every entry in the list is pinned.
    fn evict(&self, tier: Residency) -> Result<()> {
        loop {
            // Claim a victim under the lock.
            let (victim_id, frame, data) = {
                let mut guard = self.state.lock();
                loop {
                    let state = &mut *guard;

                    // A concurrent eviction may already have made room.
                    if state.list(tier).len() < self.tier_cap(tier) {
                        return Ok(());
                    }

                    let mut candidate = None;
                    let mut in_flight = false;
                    for &id in state.list(tier).iter() {
                        if state.write_backs.contains(&id) {
                            in_flight = true;
                            continue;
                        }
                        if let Some(entry) = state.entries.get(&id) {
                            if entry.frame.pin_count() == 0 {
                                candidate = Some((id, Arc::clone(&entry.frame)));
                                break;
                            }
                        }
                    }

                    match candidate {
                        Some((id, frame)) => {
                            if !frame.is_dirty() {
                                state.remove(id, tier);
                                debug!(page_id = %id, tier = %tier, "evicted page");
                                return Ok(());
                            }
                            // Clear the flag before writing so a concurrent
                            // modification re-dirties the page and aborts
                            // the removal below.
                            frame.set_dirty(false);
                            state.write_backs.insert(id);
                            let data = frame.copy_data();
                            break (id, frame, data);
                        }
                        None if in_flight => {
                            // Every candidate is mid write-back; one of them
                            // becomes evictable once its write commits.
                            self.write_back_done.wait(&mut guard);
                        }
                        None => return Err(PicoError::BufferPoolOverflow(tier)),
                    }
                }
            };

            // Write back without the pool lock.
            let write = self.storage.write_page(victim_id, data).wait();

            let mut state = self.state.lock();
            state.write_backs.remove(&victim_id);
            self.write_back_done.notify_all();

            match write {
                Err(err) => {
                    // A failed write-back leaves the victim resident and
                    // dirty.
                    frame.set_dirty(true);
                    return Err(err);
                }
                Ok(()) => {
                    if frame.pin_count() == 0 && !frame.is_dirty() {
                        state.remove(victim_id, tier);
                        debug!(page_id = %victim_id, tier = %tier, "evicted page");
                        return Ok(());
                    }
                    // The victim was pinned or re-dirtied during the write;
                    // it stays resident and another victim is chosen.
                }
            }
        }
    }
}

/// Moves `page_id` to the back of the list (most recent position).
fn touch(list: &mut VecDeque<PageId>, page_id: PageId) {
    remove_id(list, page_id);
    list.push_back(page_id);
}

/// Moves a resident page from the history list to the back of the cache
/// list.
fn promote(state: &mut PoolState, page_id: PageId) {
    remove_id(&mut state.history, page_id);
    state.cache.push_back(page_id);
    if let Some(entry) = state.entries.get_mut(&page_id) {
        entry.residency = Residency::Cache;
    }
}

fn remove_id(list: &mut VecDeque<PageId>, page_id: PageId) {
    if let Some(pos) = list.iter().position(|id| *id == page_id) {
        let _ = list.remove(pos);
    }
}
