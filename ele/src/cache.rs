//! Bounded cache of open raster handles.
//!
//! Raster files are opened lazily on first access and kept open for reuse, with
//! at most `max_open` open at any time. When a new tile is needed and the cache
//! is full, exactly one open handle is closed, chosen by an [`EvictionPolicy`].
//!
//! Callers get access inside a closure passed to [`HandleCache::with_raster`].
//! The cache lock is only held for bookkeeping: opening a file and reading from
//! it happen outside it, so queries on different tiles run in parallel. While a
//! closure runs its handle is leased and cannot be evicted. An open in progress
//! holds a reserved slot, so open handles plus pending opens never exceed
//! `max_open`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use lru::LruCache;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, warn};

use crate::error::{EleError, Result};
use crate::raster::{Raster, RasterOpener};
use crate::tile::{TileDescriptor, TileId};

/// Default maximum number of open raster handles.
pub const DEFAULT_MAX_OPEN: usize = 10;

/// Chooses which open handle to close when the cache is full.
///
/// The cache reports every open, access and close so that the policy can keep
/// whatever bookkeeping it needs.
pub trait EvictionPolicy: Send {
    /// A handle was opened.
    fn on_open(&mut self, id: TileId);

    /// An open handle was used.
    fn on_access(&mut self, id: TileId);

    /// A handle was closed.
    fn on_close(&mut self, id: TileId);

    /// Pick a handle to close among those for which `evictable` holds, or
    /// `None` if there is none.
    ///
    /// Handles in use by a caller are not evictable. The victim stays tracked
    /// until the cache reports it closed.
    fn choose_victim(&mut self, evictable: &dyn Fn(TileId) -> bool) -> Option<TileId>;
}

/// Closes the least recently used handle.
pub struct LeastRecentlyUsed {
    order: LruCache<TileId, ()>,
}

impl LeastRecentlyUsed {
    pub fn new() -> Self {
        Self {
            order: LruCache::unbounded(),
        }
    }
}

impl Default for LeastRecentlyUsed {
    fn default() -> Self {
        Self::new()
    }
}

impl EvictionPolicy for LeastRecentlyUsed {
    fn on_open(&mut self, id: TileId) {
        self.order.put(id, ());
    }

    fn on_access(&mut self, id: TileId) {
        self.order.get(&id);
    }

    fn on_close(&mut self, id: TileId) {
        self.order.pop(&id);
    }

    fn choose_victim(&mut self, evictable: &dyn Fn(TileId) -> bool) -> Option<TileId> {
        // Iteration runs most to least recent
        self.order
            .iter()
            .rev()
            .map(|(id, _)| *id)
            .find(|&id| evictable(id))
    }
}

/// Closes a uniformly random open handle.
pub struct RandomEviction {
    open: Vec<TileId>,
    rng: StdRng,
}

impl RandomEviction {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Reproducible victim sequence for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            open: Vec::new(),
            rng,
        }
    }
}

impl Default for RandomEviction {
    fn default() -> Self {
        Self::new()
    }
}

impl EvictionPolicy for RandomEviction {
    fn on_open(&mut self, id: TileId) {
        if !self.open.contains(&id) {
            self.open.push(id);
        }
    }

    fn on_access(&mut self, _id: TileId) {}

    fn on_close(&mut self, id: TileId) {
        if let Some(index) = self.open.iter().position(|&open| open == id) {
            self.open.swap_remove(index);
        }
    }

    fn choose_victim(&mut self, evictable: &dyn Fn(TileId) -> bool) -> Option<TileId> {
        let candidates: Vec<TileId> = self
            .open
            .iter()
            .copied()
            .filter(|&id| evictable(id))
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..candidates.len());
        Some(candidates[index])
    }
}

/// Built-in eviction policies, selectable by name (`lru`, `random`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionKind {
    #[default]
    Lru,
    Random,
}

impl EvictionKind {
    /// Create a fresh policy of this kind.
    pub fn policy(self) -> Box<dyn EvictionPolicy> {
        match self {
            EvictionKind::Lru => Box::new(LeastRecentlyUsed::new()),
            EvictionKind::Random => Box::new(RandomEviction::new()),
        }
    }
}

impl FromStr for EvictionKind {
    type Err = EleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionKind::Lru),
            "random" => Ok(EvictionKind::Random),
            _ => Err(EleError::InvalidArgument(format!(
                "unknown eviction policy {:?} (expected lru or random)",
                s
            ))),
        }
    }
}

impl fmt::Display for EvictionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionKind::Lru => write!(f, "lru"),
            EvictionKind::Random => write!(f, "random"),
        }
    }
}

/// Statistics about handle cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of handles currently open.
    pub open_count: usize,
    /// Maximum number of handles open at once.
    pub capacity: usize,
    /// Accesses served by an already-open handle.
    pub hit_count: u64,
    /// Accesses that had to open a handle.
    pub miss_count: u64,
    /// Handles closed to make room.
    pub eviction_count: u64,
    /// Tiles marked unavailable after a read failure.
    pub unavailable_count: usize,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

struct CacheState {
    open: HashMap<TileId, Arc<dyn Raster>>,
    /// Callers currently holding each handle.
    leases: HashMap<TileId, usize>,
    /// Slots reserved by opens running outside the lock.
    opening: HashSet<TileId>,
    unavailable: HashSet<TileId>,
    policy: Box<dyn EvictionPolicy>,
    hit_count: u64,
    miss_count: u64,
    eviction_count: u64,
}

impl CacheState {
    fn new(max_open: usize, policy: Box<dyn EvictionPolicy>) -> Self {
        Self {
            open: HashMap::with_capacity(max_open),
            leases: HashMap::new(),
            opening: HashSet::new(),
            unavailable: HashSet::new(),
            policy,
            hit_count: 0,
            miss_count: 0,
            eviction_count: 0,
        }
    }

    /// Open handles plus reserved slots. Never exceeds `max_open`.
    fn occupied(&self) -> usize {
        self.open.len() + self.opening.len()
    }

    fn is_idle(&self, id: TileId) -> bool {
        !self.leases.contains_key(&id)
    }

    fn lease(&mut self, id: TileId) {
        *self.leases.entry(id).or_insert(0) += 1;
    }
}

/// Result of [`HandleCache::preload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadOutcome {
    /// The handle was already open or being opened.
    AlreadyOpen,
    /// The handle was opened into a free slot.
    Opened,
    /// No free slot; nothing was evicted.
    NoRoom,
}

/// A handle in use by one caller. Releasing it lets the cache evict it again.
struct Lease<'a> {
    cache: &'a HandleCache,
    id: TileId,
    raster: Arc<dyn Raster>,
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        let mut state = match self.cache.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };

        let released = match state.leases.get_mut(&self.id) {
            Some(count) => {
                *count -= 1;
                *count == 0
            }
            None => false,
        };
        if released {
            state.leases.remove(&self.id);
            // Retire a handle that failed while it was shared
            if state.unavailable.contains(&self.id) && state.open.remove(&self.id).is_some() {
                state.policy.on_close(self.id);
            }
        }

        drop(state);
        self.cache.changed.notify_all();
    }
}

/// Bounded pool of open raster handles, safe to share between threads.
pub struct HandleCache {
    max_open: usize,
    opener: Box<dyn RasterOpener>,
    state: Mutex<CacheState>,
    changed: Condvar,
}

impl HandleCache {
    /// Create a cache that keeps at most `max_open` handles open.
    ///
    /// # Errors
    ///
    /// Returns [`EleError::InvalidArgument`] if `max_open` is zero.
    pub fn new(
        max_open: usize,
        policy: Box<dyn EvictionPolicy>,
        opener: Box<dyn RasterOpener>,
    ) -> Result<Self> {
        if max_open == 0 {
            return Err(EleError::InvalidArgument(
                "maximum open handles must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            max_open,
            opener,
            state: Mutex::new(CacheState::new(max_open, policy)),
            changed: Condvar::new(),
        })
    }

    /// Run `f` with the open raster for `tile`, opening it first if needed.
    ///
    /// If the cache is full, one idle handle is closed before opening; when
    /// every open handle is in use the call waits for one to be released. A
    /// tile whose open or read fails is closed and marked unavailable: later
    /// calls fail with [`EleError::TileUnavailable`] without touching the file
    /// again.
    ///
    /// `f` must not acquire other handles from the same cache.
    pub fn with_raster<T>(
        &self,
        id: TileId,
        tile: &TileDescriptor,
        f: impl FnOnce(&dyn Raster) -> Result<T>,
    ) -> Result<T> {
        let lease = self.acquire(id, tile)?;

        let result = f(lease.raster.as_ref());
        if let Err(EleError::RasterRead { reason, .. }) = &result {
            warn!(tile = %tile.path().display(), %reason, "Read failed, marking tile unavailable");
            self.lock()?.unavailable.insert(id);
        }
        result
    }

    /// Open `tile` into a free slot without evicting anything.
    ///
    /// The free-slot check and the reservation happen under one lock, so a
    /// concurrent query cannot push the preload into evicting.
    pub fn preload(&self, id: TileId, tile: &TileDescriptor) -> Result<PreloadOutcome> {
        let mut state = self.lock()?;

        if state.unavailable.contains(&id) {
            return Err(EleError::TileUnavailable {
                path: tile.path().to_path_buf(),
            });
        }
        if state.open.contains_key(&id) || state.opening.contains(&id) {
            return Ok(PreloadOutcome::AlreadyOpen);
        }
        if state.occupied() >= self.max_open {
            return Ok(PreloadOutcome::NoRoom);
        }

        state.miss_count += 1;
        state.opening.insert(id);
        drop(state);

        self.open_reserved(id, tile, false)?;
        Ok(PreloadOutcome::Opened)
    }

    fn acquire(&self, id: TileId, tile: &TileDescriptor) -> Result<Lease<'_>> {
        let mut state = self.lock()?;

        loop {
            if state.unavailable.contains(&id) {
                return Err(EleError::TileUnavailable {
                    path: tile.path().to_path_buf(),
                });
            }

            if let Some(raster) = state.open.get(&id).cloned() {
                state.hit_count += 1;
                state.policy.on_access(id);
                state.lease(id);
                return Ok(Lease {
                    cache: self,
                    id,
                    raster,
                });
            }

            if !state.opening.contains(&id) {
                if state.occupied() < self.max_open {
                    break;
                }
                if state.open.keys().any(|&open| state.is_idle(open)) {
                    evict_one(&mut state)?;
                    break;
                }
            }

            // Wait for the open in progress, or for a handle to go idle
            state = self
                .changed
                .wait(state)
                .map_err(|_| EleError::CacheLockPoisoned)?;
        }

        state.miss_count += 1;
        state.opening.insert(id);
        drop(state);

        let raster = self.open_reserved(id, tile, true)?;
        Ok(Lease {
            cache: self,
            id,
            raster,
        })
    }

    /// Open a tile whose slot is already reserved, outside the lock.
    fn open_reserved(
        &self,
        id: TileId,
        tile: &TileDescriptor,
        leased: bool,
    ) -> Result<Arc<dyn Raster>> {
        let opened = self.opener.open(tile);

        let mut state = self.lock()?;
        state.opening.remove(&id);
        let result = match opened {
            Ok(raster) => {
                let raster: Arc<dyn Raster> = Arc::from(raster);
                state.open.insert(id, Arc::clone(&raster));
                state.policy.on_open(id);
                if leased {
                    state.lease(id);
                }
                debug!(tile = %tile.path().display(), open = state.open.len(), "Opened raster");
                Ok(raster)
            }
            Err(e) => {
                warn!(tile = %tile.path().display(), error = %e, "Marking tile unavailable");
                state.unavailable.insert(id);
                Err(e)
            }
        };
        drop(state);

        self.changed.notify_all();
        result
    }

    fn lock(&self) -> Result<MutexGuard<'_, CacheState>> {
        self.state.lock().map_err(|_| EleError::CacheLockPoisoned)
    }

    /// Check whether the tile currently has an open handle.
    pub fn is_open(&self, id: TileId) -> bool {
        self.state
            .lock()
            .map(|state| state.open.contains_key(&id))
            .unwrap_or(false)
    }

    /// Number of handles currently open.
    pub fn open_count(&self) -> usize {
        self.state.lock().map(|state| state.open.len()).unwrap_or(0)
    }

    /// Maximum number of handles open at once.
    pub fn capacity(&self) -> usize {
        self.max_open
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        match self.state.lock() {
            Ok(state) => CacheStats {
                open_count: state.open.len(),
                capacity: self.max_open,
                hit_count: state.hit_count,
                miss_count: state.miss_count,
                eviction_count: state.eviction_count,
                unavailable_count: state.unavailable.len(),
            },
            Err(_) => CacheStats {
                capacity: self.max_open,
                ..CacheStats::default()
            },
        }
    }

    /// Close every handle that is not in use.
    ///
    /// Tiles marked unavailable stay unavailable.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.lock()?;
        let idle: Vec<TileId> = state
            .open
            .keys()
            .copied()
            .filter(|&id| state.is_idle(id))
            .collect();
        for id in idle {
            state.open.remove(&id);
            state.policy.on_close(id);
        }
        drop(state);

        self.changed.notify_all();
        Ok(())
    }
}

/// Close the idle handle chosen by the policy.
fn evict_one(state: &mut CacheState) -> Result<()> {
    if state.open.is_empty() {
        let err = EleError::InvariantViolation("eviction requested with no open handles".into());
        error!(error = %err, "Handle cache invariant violated");
        return Err(err);
    }

    let open = &state.open;
    let leases = &state.leases;
    let evictable = |id: TileId| open.contains_key(&id) && !leases.contains_key(&id);
    let victim = state.policy.choose_victim(&evictable).filter(|&id| evictable(id));

    let Some(victim) = victim else {
        let err = EleError::InvariantViolation(
            "eviction policy chose no idle handle while the cache is full".into(),
        );
        error!(error = %err, open = state.open.len(), "Handle cache invariant violated");
        return Err(err);
    };

    state.open.remove(&victim);
    state.policy.on_close(victim);
    state.eviction_count += 1;
    debug!(tile = victim.0, "Evicted raster handle");
    Ok(())
}
