//! Authorization cache
//!
//! Holds the last authorized-tag snapshot fetched from the authority, its
//! persisted copy, and the offline-fallback flag. Loading the persisted
//! file into memory is distinct from a refresh: only a refresh writes the
//! file and moves the persisted hash.

use keyward_core::{KeywardResult, TagId};

use crate::{CacheSnapshot, CacheStore, TagSet};

/// What a refresh did to the persisted copy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New snapshot written
    Replaced { tags: usize },
    /// Same hash as the persisted copy, nothing written
    Unchanged,
}

/// Last-known authorized tag set
pub struct AuthorizationCache {
    store: Box<dyn CacheStore>,
    /// Query-ready set
    memory: CacheSnapshot,
    /// Hash of the persisted copy, empty if none
    persisted_hash: String,
    cap: usize,
    offline: bool,
}

impl AuthorizationCache {
    pub fn new(store: Box<dyn CacheStore>, cap: usize) -> Self {
        AuthorizationCache {
            store,
            memory: CacheSnapshot::empty(cap),
            persisted_hash: String::new(),
            cap,
            offline: false,
        }
    }

    /// Boot-time load of the persisted snapshot. On failure the cache stays
    /// empty and denies every tag until a refresh succeeds.
    pub fn load(&mut self) -> KeywardResult<usize> {
        self.memory = CacheSnapshot::empty(self.cap);
        self.persisted_hash.clear();

        let Some(snapshot) = self.persisted()? else {
            tracing::info!("no persisted authorization cache");
            return Ok(0);
        };
        self.persisted_hash = snapshot.hash().to_string();
        self.memory = snapshot;
        tracing::info!(
            tags = self.memory.len(),
            hash = %self.persisted_hash,
            "loaded persisted authorization cache"
        );
        Ok(self.memory.len())
    }

    /// Materialize the persisted file into the query-ready set. The file and
    /// persisted hash are untouched; on failure memory is left as it was.
    pub fn load_into_memory(&mut self) -> KeywardResult<usize> {
        match self.persisted()? {
            Some(snapshot) => self.memory = snapshot,
            None => self.memory = CacheSnapshot::empty(self.cap),
        }
        Ok(self.memory.len())
    }

    /// Replace the snapshot and persist it. A snapshot whose hash matches
    /// the persisted copy is not written again.
    pub fn refresh(&mut self, snapshot: CacheSnapshot) -> KeywardResult<RefreshOutcome> {
        if !self.persisted_hash.is_empty() && snapshot.hash() == self.persisted_hash {
            self.memory = snapshot;
            return Ok(RefreshOutcome::Unchanged);
        }

        // Memory follows the authority even if the write fails; the persisted
        // hash does not, so the next check-in asks for the list again.
        let line = snapshot.to_json_line()?;
        let tags = snapshot.len();
        let hash = snapshot.hash().to_string();
        self.memory = snapshot;
        self.store.write(&line)?;
        self.persisted_hash = hash;

        tracing::info!(tags, hash = %self.persisted_hash, "authorization cache replaced");
        Ok(RefreshOutcome::Replaced { tags })
    }

    /// Hash of the persisted snapshot, empty if never loaded
    pub fn current_hash(&self) -> &str {
        &self.persisted_hash
    }

    pub fn is_authorized(&self, tag: TagId) -> bool {
        !tag.is_none() && self.memory.tags().contains(tag)
    }

    /// Switch to offline fallback, loading the persisted set into memory.
    /// The flag is set even if the load fails.
    pub fn enter_offline(&mut self) -> KeywardResult<usize> {
        self.offline = true;
        let loaded = self.load_into_memory()?;
        tracing::warn!(tags = loaded, "offline fallback: authorizing from local cache");
        Ok(loaded)
    }

    /// Empty the in-memory set and leave offline fallback
    pub fn clear(&mut self) {
        if self.offline {
            tracing::info!("authority reachable again, clearing local tag set");
        }
        self.memory = CacheSnapshot::empty(self.cap);
        self.offline = false;
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// In-memory snapshot
    pub fn snapshot(&self) -> &CacheSnapshot {
        &self.memory
    }

    pub fn tags(&self) -> &TagSet {
        self.memory.tags()
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// The snapshot as stored, without touching memory
    pub fn persisted(&self) -> KeywardResult<Option<CacheSnapshot>> {
        match self.store.read()? {
            Some(contents) => CacheSnapshot::from_json_line(&contents, self.cap).map(Some),
            None => Ok(None),
        }
    }
}
