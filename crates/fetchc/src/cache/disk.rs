//! # Disk Cache
//!
//! Two-tier LRU cache: an in-memory index of [`CacheEntry`] records in
//! front of blob + metadata file pairs on disk.
//!
//! Reads consult the index first and lazily warm it from metadata files.
//! Every hit bumps the entry's last access time in memory and queues a
//! metadata rewrite, which a background worker flushes in batches. A second
//! worker, active only when a size cap is configured, walks the cache tree
//! and evicts least-recently-accessed entries once occupancy exceeds
//! `max_size * evict_factor`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use super::key::{self, CacheFile, Layout, MAX_KEY_PROBES};
use super::locks::KeyLocks;
use super::meta;
use super::types::{
    CacheEntry, CacheError, CacheResult, DiskCacheConfig, META_URL, now_millis, system_time_millis,
};

/// Outcome of one eviction pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Occupied bytes found by the walk
    pub scanned_bytes: u64,
    /// Occupied bytes after the pass
    pub remaining_bytes: u64,
    /// Keys removed, in eviction order
    pub evicted: Vec<String>,
    /// Keys that could not be removed
    pub failed: usize,
    /// Whether the pass was skipped because nothing was written since the last one
    pub skipped: bool,
}

/// Persistent two-tier LRU cache
pub struct DiskCache {
    inner: Arc<Inner>,
    workers: Vec<JoinHandle<()>>,
}

struct Inner {
    config: DiskCacheConfig,
    layout: Layout,
    index: Mutex<Index>,
    pending_access: Mutex<HashSet<String>>,
    locks: KeyLocks,
    write_seq: AtomicU64,
    evicted_seq: AtomicU64,
    shutdown: Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    last_access: u64,
    seq: u64,
}

#[derive(Debug, Default)]
struct Index {
    entries: HashMap<String, (CacheEntry, OrderKey)>,
    order: BTreeMap<OrderKey, String>,
    next_seq: u64,
}

impl Index {
    fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key).map(|(entry, _)| entry)
    }

    fn insert(&mut self, entry: CacheEntry) {
        self.next_seq += 1;
        let order = OrderKey {
            last_access: entry.last_access,
            seq: self.next_seq,
        };
        self.order.insert(order, entry.key.clone());
        if let Some((_, previous)) = self.entries.insert(entry.key.clone(), (entry, order)) {
            self.order.remove(&previous);
        }
    }

    fn insert_if_absent(&mut self, entry: CacheEntry) -> CacheEntry {
        if let Some(existing) = self.get(&entry.key) {
            return existing.clone();
        }
        self.insert(entry.clone());
        entry
    }

    fn touch(&mut self, key: &str, now: u64) -> Option<CacheEntry> {
        let mut entry = self.remove(key)?;
        entry.last_access = entry.last_access.max(now);
        self.insert(entry.clone());
        Some(entry)
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let (entry, order) = self.entries.remove(key)?;
        self.order.remove(&order);
        Some(entry)
    }

    /// LRU rank of every indexed key, least recently used first
    fn lru_ranks(&self) -> HashMap<String, (u64, u64)> {
        self.order
            .iter()
            .map(|(order, key)| (key.clone(), (order.last_access, order.seq)))
            .collect()
    }
}

#[derive(Debug, Default)]
struct Shutdown {
    stopped: Mutex<bool>,
    signal: Condvar,
}

impl Shutdown {
    /// Sleep for `period` unless stopped first; returns whether to stop
    fn wait(&self, period: Duration) -> bool {
        let deadline = Instant::now() + period;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.signal.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }

    fn trigger(&self) {
        *self.stopped.lock() = true;
        self.signal.notify_all();
    }
}

enum Slot {
    Free(String),
    Match(CacheEntry),
}

struct Candidate {
    key: String,
    bytes: u64,
    rank: (u64, u64),
}

impl DiskCache {
    /// Open (or create) a cache rooted at `config.root` and start its workers
    pub fn open(config: DiskCacheConfig) -> CacheResult<Self> {
        config.validate()?;
        fs::create_dir_all(&config.root)?;

        let inner = Arc::new(Inner {
            layout: Layout::new(config.root.clone()),
            index: Mutex::new(Index::default()),
            pending_access: Mutex::new(HashSet::new()),
            locks: KeyLocks::new(),
            write_seq: AtomicU64::new(0),
            evicted_seq: AtomicU64::new(0),
            shutdown: Shutdown::default(),
            config,
        });

        let mut workers = Vec::with_capacity(2);
        workers.push(spawn_worker(
            "fetchc-cache-flush",
            inner.clone(),
            inner.config.flush_interval,
            |inner| {
                inner.flush_access_times();
            },
        )?);
        if inner.config.max_size > 0 {
            workers.push(spawn_worker(
                "fetchc-cache-evict",
                inner.clone(),
                inner.config.evict_interval,
                |inner| {
                    if let Err(e) = inner.evict(false) {
                        warn!(error = %e, "Cache eviction pass failed");
                    }
                },
            )?);
        }

        debug!(
            root = %inner.config.root.display(),
            max_size = inner.config.max_size,
            evict_factor = inner.config.evict_factor,
            "Disk cache opened"
        );
        Ok(Self { inner, workers })
    }

    pub fn config(&self) -> &DiskCacheConfig {
        &self.inner.config
    }

    /// Get the entry stored under `key`, recording the access
    pub fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        key::validate(key)?;
        if self.inner.peek(key)?.is_none() {
            return Ok(None);
        }
        Ok(self.inner.touch(key))
    }

    /// Store `data` under `key`, replacing any previous blob
    pub fn set(
        &self,
        key: &str,
        data: &[u8],
        meta: BTreeMap<String, String>,
    ) -> CacheResult<CacheEntry> {
        key::validate(key)?;
        let _guard = self.inner.locks.lock(key);
        self.inner.write_locked(key, data, meta)
    }

    /// Open the blob of `entry`.
    ///
    /// A missing blob or one whose size disagrees with the entry is treated
    /// as corruption: both files are deleted, the key is purged and `None` is
    /// returned.
    pub fn open_stream(&self, entry: &CacheEntry) -> CacheResult<Option<File>> {
        key::validate(&entry.key)?;
        if let Some(file) = self.inner.open_checked(&entry.key, entry.file_size)? {
            return Ok(Some(file));
        }

        let _guard = self.inner.locks.lock(&entry.key);
        // The blob may have been replaced by a newer version since `entry` was read.
        let current = self.inner.index.lock().get(&entry.key).map(|e| e.file_size);
        if let Some(size) = current.filter(|size| *size != entry.file_size) {
            if let Some(file) = self.inner.open_checked(&entry.key, size)? {
                return Ok(Some(file));
            }
        }

        warn!(key = %entry.key, "Corrupted cache file, purging entry");
        if let Err(e) = self.inner.purge_locked(&entry.key) {
            warn!(key = %entry.key, error = %e, "Failed to purge corrupted cache entry");
        }
        Ok(None)
    }

    /// Delete both files of `key` and forget it; removing a missing key is a no-op
    pub fn remove(&self, key: &str) -> CacheResult<()> {
        key::validate(key)?;
        let _guard = self.inner.locks.lock(key);
        self.inner.purge_locked(key)?;
        Ok(())
    }

    /// Merge `updates` into the metadata of `key` without touching its blob.
    ///
    /// The rewrite of the metadata file is deferred to the flush worker.
    pub fn refresh(
        &self,
        key: &str,
        updates: BTreeMap<String, String>,
    ) -> CacheResult<Option<CacheEntry>> {
        key::validate(key)?;
        if self.inner.peek(key)?.is_none() {
            return Ok(None);
        }
        let now = now_millis();
        let refreshed = {
            let mut index = self.inner.index.lock();
            let Some(mut entry) = index.remove(key) else {
                return Ok(None);
            };
            entry.meta.extend(updates);
            entry.last_access = entry.last_access.max(now);
            index.insert(entry.clone());
            entry
        };
        self.inner.pending_access.lock().insert(key.to_string());
        Ok(Some(refreshed))
    }

    /// Find the entry for `identity`, walking its collision chain
    pub fn lookup(&self, identity: &str) -> CacheResult<Option<CacheEntry>> {
        match self.inner.resolve(identity)? {
            Slot::Match(entry) => Ok(self.inner.touch(&entry.key)),
            Slot::Free(_) => Ok(None),
        }
    }

    /// Store `data` for `identity` in its resolved slot.
    ///
    /// The identity is recorded as the `url` metadata field, which is the
    /// marker used to detect collisions.
    pub fn store(
        &self,
        identity: &str,
        data: &[u8],
        mut meta: BTreeMap<String, String>,
    ) -> CacheResult<CacheEntry> {
        meta.insert(META_URL.to_string(), identity.to_string());
        for _ in 0..MAX_KEY_PROBES {
            let key = match self.inner.resolve(identity)? {
                Slot::Match(entry) => entry.key,
                Slot::Free(key) => key,
            };
            let _guard = self.inner.locks.lock(&key);
            // Re-check under the lock: another identity may have claimed the slot.
            let claimable = match self.inner.peek(&key)? {
                None => true,
                Some(entry) => entry.identity() == Some(identity),
            };
            if claimable {
                return self.inner.write_locked(&key, data, meta);
            }
        }
        Err(CacheError::KeyCollision {
            identity: identity.to_string(),
            attempts: MAX_KEY_PROBES,
        })
    }

    /// Remove the entry for `identity`, if any
    pub fn remove_identity(&self, identity: &str) -> CacheResult<()> {
        match self.inner.resolve(identity)? {
            Slot::Match(entry) => self.remove(&entry.key),
            Slot::Free(_) => Ok(()),
        }
    }

    /// Persist queued access times now; returns the number of files written
    pub fn flush_access_times(&self) -> usize {
        self.inner.flush_access_times()
    }

    /// Run an eviction pass now, even if nothing was written since the last one
    pub fn evict_now(&self) -> CacheResult<EvictionReport> {
        self.inner.evict(true)
    }

    /// Number of entries currently held in the memory index
    pub fn indexed_len(&self) -> usize {
        self.inner.index.lock().entries.len()
    }
}

impl Drop for DiskCache {
    fn drop(&mut self) {
        self.inner.shutdown.trigger();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("Cache worker panicked");
            }
        }
        self.inner.flush_access_times();
    }
}

impl Inner {
    /// Index lookup with lazy warm-up from the metadata file; records no access
    fn peek(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        if let Some(entry) = self.index.lock().get(key) {
            return Ok(Some(entry.clone()));
        }

        debug!(key, "Trying to load cache metadata from disk");
        let Some(entry) = self.read_meta(key)? else {
            return Ok(None);
        };
        debug!(key, "Disk hit");
        Ok(Some(self.index.lock().insert_if_absent(entry)))
    }

    fn touch(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.index.lock().touch(key, now_millis())?;
        self.pending_access.lock().insert(key.to_string());
        Some(entry)
    }

    fn read_meta(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let path = self.layout.meta_path(key);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                self.discard_meta(&path, "not valid UTF-8");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match meta::decode(&text) {
            Ok(entry) if entry.key == key => Ok(Some(entry)),
            Ok(entry) => {
                self.discard_meta(&path, &format!("records key {}", entry.key));
                Ok(None)
            }
            Err(e) => {
                self.discard_meta(&path, &format!("{e:?}"));
                Ok(None)
            }
        }
    }

    fn discard_meta(&self, path: &Path, reason: &str) {
        warn!(path = %path.display(), reason, "Invalid cache metadata file, deleting");
        if let Err(e) = remove_if_exists(path) {
            warn!(path = %path.display(), error = %e, "Failed to delete invalid metadata file");
        }
    }

    fn resolve(&self, identity: &str) -> CacheResult<Slot> {
        let mut key = key::key_for(identity);
        for _ in 0..MAX_KEY_PROBES {
            match self.peek(&key)? {
                None => return Ok(Slot::Free(key)),
                Some(entry) if entry.identity() == Some(identity) => {
                    return Ok(Slot::Match(entry));
                }
                Some(entry) => {
                    warn!(
                        identity,
                        cached = entry.identity().unwrap_or_default(),
                        key = %key,
                        "Cache key conflict, probing next slot"
                    );
                    key = key::next_probe(&key, identity);
                }
            }
        }
        Err(CacheError::KeyCollision {
            identity: identity.to_string(),
            attempts: MAX_KEY_PROBES,
        })
    }

    /// Write blob and metadata for `key`; the caller holds the key's lock
    fn write_locked(
        &self,
        key: &str,
        data: &[u8],
        meta: BTreeMap<String, String>,
    ) -> CacheResult<CacheEntry> {
        let now = now_millis();
        let indexed = self.index.lock().get(key).cloned();
        let previous = match indexed {
            Some(entry) => Some(entry),
            None => self.read_meta(key)?,
        };
        let create_time = previous.as_ref().map_or(now, |e| e.create_time);
        let entry = CacheEntry {
            key: key.to_string(),
            file_size: data.len() as u64,
            last_access: now,
            create_time,
            meta,
        };

        fs::create_dir_all(self.layout.dir(key))?;
        let data_path = self.layout.data_path(key);
        write_atomically(&data_path, data)?;
        let meta_path = self.layout.meta_path(key);
        if let Err(e) = write_atomically(&meta_path, meta::encode(&entry).as_bytes()) {
            warn!(key, error = %e, "Failed to write cache metadata file");
            if let Err(cleanup) = remove_if_exists(&data_path) {
                warn!(
                    path = %data_path.display(),
                    error = %cleanup,
                    "Failed to delete orphaned cache file"
                );
            }
            self.index.lock().remove(key);
            return Err(e.into());
        }

        self.index.lock().insert(entry.clone());
        self.pending_access.lock().remove(key);
        self.write_seq.fetch_add(1, Ordering::AcqRel);

        if previous.is_some() {
            debug!(key, size = entry.file_size, "Replaced cache file");
        } else {
            debug!(key, size = entry.file_size, "Cached new file");
        }
        Ok(entry)
    }

    fn open_checked(&self, key: &str, expected: u64) -> CacheResult<Option<File>> {
        let path = self.layout.data_path(key);
        match File::open(&path) {
            Ok(file) => {
                if file.metadata()?.len() == expected {
                    debug!(path = %path.display(), "Reading cache file as stream");
                    Ok(Some(file))
                } else {
                    Ok(None)
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete both files and forget `key`; the caller holds the key's lock
    fn purge_locked(&self, key: &str) -> io::Result<()> {
        self.index.lock().remove(key);
        self.pending_access.lock().remove(key);
        let data = remove_if_exists(&self.layout.data_path(key));
        let meta = remove_if_exists(&self.layout.meta_path(key));
        data.and(meta)
    }

    fn flush_access_times(&self) -> usize {
        let keys: Vec<String> = std::mem::take(&mut *self.pending_access.lock())
            .into_iter()
            .collect();
        if keys.is_empty() {
            return 0;
        }

        let started = Instant::now();
        let mut written = 0;
        let mut failed = Vec::new();
        for key in keys {
            let _guard = self.locks.lock(&key);
            let Some(entry) = self.index.lock().get(&key).cloned() else {
                continue;
            };
            // A vanished blob is handled by the next open; do not recreate its metadata.
            if !self.layout.data_path(&key).exists() {
                continue;
            }
            match write_atomically(&self.layout.meta_path(&key), meta::encode(&entry).as_bytes())
            {
                Ok(()) => written += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "Flushing cache metadata to disk failed");
                    failed.push(key);
                }
            }
        }

        info!(
            count = written,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cache metadata flush done"
        );
        if !failed.is_empty() {
            info!(count = failed.len(), "Re-queueing failed metadata flushes");
            self.pending_access.lock().extend(failed);
        }
        written
    }

    fn evict(&self, force: bool) -> CacheResult<EvictionReport> {
        if self.config.max_size == 0 {
            return Ok(EvictionReport {
                skipped: true,
                ..Default::default()
            });
        }

        let seq = self.write_seq.load(Ordering::Acquire);
        if !force && seq == self.evicted_seq.load(Ordering::Acquire) {
            debug!("No cache writes since last eviction, skipping");
            return Ok(EvictionReport {
                skipped: true,
                ..Default::default()
            });
        }

        let started = Instant::now();
        let (total, mut candidates) = self.scan()?;
        self.evicted_seq.store(seq, Ordering::Release);

        let target = self.config.eviction_target();
        let mut report = EvictionReport {
            scanned_bytes: total,
            remaining_bytes: total,
            ..Default::default()
        };
        if total <= target {
            debug!(total, target, "Cache below eviction target");
            return Ok(report);
        }

        candidates.sort_by(|a, b| a.rank.cmp(&b.rank));
        for candidate in candidates {
            if report.remaining_bytes <= target {
                break;
            }
            let _guard = self.locks.lock(&candidate.key);
            match self.purge_locked(&candidate.key) {
                Ok(()) => {
                    report.remaining_bytes = report.remaining_bytes.saturating_sub(candidate.bytes);
                    report.evicted.push(candidate.key);
                }
                Err(e) => {
                    warn!(key = %candidate.key, error = %e, "Failed to evict cache entry");
                    report.failed += 1;
                }
            }
        }

        info!(
            evicted = report.evicted.len(),
            failed = report.failed,
            before = report.scanned_bytes,
            after = report.remaining_bytes,
            target,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cache eviction done"
        );
        Ok(report)
    }

    /// Walk the cache tree: total occupied bytes plus one candidate per key
    fn scan(&self) -> CacheResult<(u64, Vec<Candidate>)> {
        struct Found {
            bytes: u64,
            data_mtime: Option<SystemTime>,
            meta_mtime: Option<SystemTime>,
            has_meta: bool,
        }

        let mut total = 0;
        let mut found: HashMap<String, Found> = HashMap::new();
        let stale_before = SystemTime::now()
            .checked_sub(self.config.evict_interval)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        for path in walk_files(self.layout.root())? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Ok(metadata) = fs::metadata(&path) else {
                continue;
            };
            let modified = metadata.modified().ok();
            match key::classify(name) {
                CacheFile::Data(key) => {
                    total += metadata.len();
                    let slot = found.entry(key).or_insert(Found {
                        bytes: 0,
                        data_mtime: None,
                        meta_mtime: None,
                        has_meta: false,
                    });
                    slot.bytes += metadata.len();
                    slot.data_mtime = modified;
                }
                CacheFile::Meta(key) => {
                    total += metadata.len();
                    let slot = found.entry(key).or_insert(Found {
                        bytes: 0,
                        data_mtime: None,
                        meta_mtime: None,
                        has_meta: false,
                    });
                    slot.bytes += metadata.len();
                    slot.meta_mtime = modified;
                    slot.has_meta = true;
                }
                CacheFile::Temp => {
                    if modified.is_some_and(|m| m < stale_before) {
                        debug!(path = %path.display(), "Removing stale temporary cache file");
                        if remove_if_exists(&path).is_err() {
                            total += metadata.len();
                        }
                    } else {
                        total += metadata.len();
                    }
                }
                CacheFile::Foreign => {}
            }
        }

        let ranks = self.index.lock().lru_ranks();
        let candidates = found
            .into_iter()
            .map(|(key, slot)| {
                let rank = match ranks.get(&key) {
                    Some(rank) => *rank,
                    None => {
                        let recorded = if slot.has_meta {
                            fs::read_to_string(self.layout.meta_path(&key))
                                .ok()
                                .and_then(|text| meta::scan_last_access(&text))
                        } else {
                            None
                        };
                        let fallback = slot
                            .data_mtime
                            .or(slot.meta_mtime)
                            .map(system_time_millis)
                            .unwrap_or(0);
                        (recorded.unwrap_or(fallback), 0)
                    }
                };
                Candidate {
                    key,
                    bytes: slot.bytes,
                    rank,
                }
            })
            .collect();
        Ok((total, candidates))
    }
}

fn spawn_worker(
    name: &str,
    inner: Arc<Inner>,
    period: Duration,
    task: fn(&Inner),
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            while !inner.shutdown.wait(period) {
                task(&inner);
            }
        })
}

/// All files two directory levels below `root`
fn walk_files(root: &Path) -> io::Result<Vec<std::path::PathBuf>> {
    let mut files = Vec::new();
    for first in fs::read_dir(root)? {
        let first = first?.path();
        if !first.is_dir() {
            continue;
        }
        let Ok(second_level) = fs::read_dir(&first) else {
            warn!(dir = %first.display(), "Failed to read cache directory");
            continue;
        };
        for second in second_level.flatten() {
            let second = second.path();
            if !second.is_dir() {
                continue;
            }
            match fs::read_dir(&second) {
                Ok(entries) => files.extend(
                    entries
                        .flatten()
                        .map(|e| e.path())
                        .filter(|p| p.is_file()),
                ),
                Err(e) => {
                    warn!(dir = %second.display(), error = %e, "Failed to read cache directory");
                }
            }
        }
    }
    Ok(files)
}

fn write_atomically(path: &Path, data: &[u8]) -> io::Result<()> {
    let tmp = Layout::tmp_path(path);
    let result = File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(data)?;
            file.flush()
        })
        .and_then(|()| fs::rename(&tmp, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
