//! TTL'd resolve cache with precise invalidation and single-flight.
//!
//! Entries are keyed by the resolve fingerprint and remember which scene and
//! prompts they were computed from, so writes can drop exactly the affected
//! entries. Concurrent resolves of the same fingerprint collapse onto one
//! computation behind a mutex sharded by fingerprint hash.

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;
use crate::scene_engine::SceneResolveResult;

const SHARD_COUNT: usize = 16;

struct CacheEntry {
    result: SceneResolveResult,
    scene_id: Uuid,
    prompt_ids: HashSet<Uuid>,
    expires_at: Instant,
}

pub struct ResolveCache {
    shards: Vec<Mutex<()>>,
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for ResolveCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolveCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(())).collect(),
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn shard_for(&self, key: &str) -> &Mutex<()> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }

    fn lookup(&self, key: &str) -> Option<SceneResolveResult> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.result.clone())
    }

    /// Cache-or-compute. The shard lock is held across `compute` so
    /// concurrent resolves of one fingerprint run it once; other shards are
    /// untouched. Errors are never cached.
    pub async fn get_or_compute<F>(
        &self,
        key: &str,
        scene_id: Uuid,
        prompt_ids: HashSet<Uuid>,
        ttl: Duration,
        compute: F,
    ) -> Result<SceneResolveResult>
    where
        F: FnOnce() -> Result<SceneResolveResult>,
    {
        if let Some(found) = self.lookup(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(found);
        }

        let _guard = self.shard_for(key).lock().await;
        // Another resolve may have filled the entry while we waited.
        if let Some(found) = self.lookup(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(found);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let result = compute()?;
        {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            entries.retain(|_, entry| entry.expires_at > now);
            entries.insert(
                key.to_owned(),
                CacheEntry {
                    result: result.clone(),
                    scene_id,
                    prompt_ids,
                    expires_at: now + ttl,
                },
            );
        }
        Ok(result)
    }

    /// Drops every entry whose plan touched this prompt.
    pub fn invalidate_prompt(&self, prompt_id: Uuid) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, entry| !entry.prompt_ids.contains(&prompt_id));
    }

    /// Drops every entry for this scene.
    pub fn invalidate_scene(&self, scene_id: Uuid) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, entry| entry.scene_id != scene_id);
    }

    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
