//! Hot-reloadable double-buffered filter of opted-out subscriber identifiers.
//!
//! The filter is read on every packet and written at most once per
//! `refresh_interval`. Rather than locking readers against the writer, two
//! snapshots are kept side by side and a single atomic index says which one
//! is current; the writer only ever touches the other one, then flips the
//! index. This gives readers a wait-free, always-consistent view, at the
//! cost of never freeing either snapshot's backing storage for the life of
//! the process.

use std::cell::UnsafeCell;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use regex::Regex;
use tracing::{error, info, warn};

fn digit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"([[:digit:]]+)").expect("static filter regex is valid"))
}

/// A sorted set of 64-bit subscriber identifiers, reloaded from a text file
/// in the background.
pub struct Filter {
    path: PathBuf,
    slots: [UnsafeCell<Vec<u64>>; 2],
    current: AtomicUsize,
}

// Safety: `slots[current]` is only ever read concurrently by any number of
// `contains` callers. The single writer (the constructor, then the
// refresher thread) only ever mutates `slots[1 - current]`, and only
// publishes it by storing the new index with `Release` — so a reader that
// loads the index with `Acquire` always sees a fully populated, sorted
// snapshot, never a partially written one.
unsafe impl Sync for Filter {}

impl Filter {
    /// Builds the filter, performing the initial synchronous load before
    /// returning. If `refresh_interval` is non-zero, spawns a background
    /// thread that reloads on that cadence for the lifetime of the process.
    pub fn new(path: impl Into<PathBuf>, refresh_interval: Duration) -> Arc<Self> {
        let filter = Arc::new(Self {
            path: path.into(),
            slots: [UnsafeCell::new(Vec::new()), UnsafeCell::new(Vec::new())],
            current: AtomicUsize::new(0),
        });

        filter.reload();

        if !refresh_interval.is_zero() {
            let background = Arc::clone(&filter);
            thread::spawn(move || background.reload_loop(refresh_interval));
        }

        filter
    }

    /// O(log n) membership check against the currently published snapshot.
    pub fn contains(&self, value: u64) -> bool {
        let idx = self.current.load(Ordering::Acquire);
        // Safety: see struct-level comment; `idx` names a published,
        // read-only snapshot for the duration of this call.
        let snapshot = unsafe { &*self.slots[idx].get() };
        snapshot.binary_search(&value).is_ok()
    }

    fn reload_loop(&self, interval: Duration) {
        loop {
            thread::sleep(interval);
            self.reload();
        }
    }

    /// Reloads the filter file. A file that can't be opened leaves the
    /// current snapshot untouched — transient unavailability must never
    /// empty the filter.
    fn reload(&self) {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) => {
                error!(path = %self.path.display(), %err, "could not open filter file, keeping previous snapshot");
                return;
            }
        };

        let staging_idx = 1 - self.current.load(Ordering::Acquire);
        // Safety: `staging_idx` is never the published index, so no reader
        // can observe it while we populate it below.
        let staging = unsafe { &mut *self.slots[staging_idx].get() };
        staging.clear();

        for line in BufReader::new(file).lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!(%err, "failed to read a line of the filter file");
                    continue;
                }
            };
            let Some(captured) = digit_pattern().find(&line) else {
                continue;
            };
            match captured.as_str().parse::<u64>() {
                Ok(value) => staging.push(value),
                Err(err) => warn!(line = %line, %err, "failed to parse filtered identifier"),
            }
        }

        staging.sort_unstable();
        info!(entries = staging.len(), "filter reload complete");
        for value in staging.iter() {
            info!(value, "filtering subscriber");
        }

        self.current.store(staging_idx, Ordering::Release);
    }
}
