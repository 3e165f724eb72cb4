//! Prompt KV cache: sistemski prompt je dug i konstantan.
//!
//! KV stanje sistemskog prompta se kešira pod SHA-256 ključem teksta i
//! dijeli među korisnicima: prvi zahtjev računa prefill, svi sljedeći
//! preskaču. Promjena prompta mijenja ključ, pa se cache sam
//! invalidira. Siguran za istovremena čitanja (DashMap), upisi su
//! serijalizirani po ključu.

use dashmap::DashMap;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

/// Keširano KV stanje jednog prompta (opaki bajtovi backenda +
/// broj tokena prefilla).
#[derive(Debug, Clone)]
pub struct CachedKvState {
    pub kv_bytes: Vec<u8>,
    pub token_count: usize,
}

pub struct PromptCache {
    entries: DashMap<String, CachedKvState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for PromptCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// SHA-256 ključ teksta prompta (skraćen na 32 heks znaka).
    pub fn key_for(prompt: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(prompt.as_bytes());
        format!("{:x}", hasher.finalize())[..32].to_string()
    }

    pub fn has(&self, prompt: &str) -> bool {
        self.entries.contains_key(&Self::key_for(prompt))
    }

    pub fn get(&self, prompt: &str) -> Option<CachedKvState> {
        match self.entries.get(&Self::key_for(prompt)) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, prompt: &str, state: CachedKvState) {
        self.entries.insert(Self::key_for(prompt), state);
    }

    pub fn invalidate(&self, prompt: &str) {
        self.entries.remove(&Self::key_for(prompt));
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let total = hits + self.misses.load(Ordering::Relaxed) as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    pub fn stats(&self) -> serde_json::Value {
        json!({
            "entries": self.entries.len(),
            "hits": self.hits.load(Ordering::Relaxed),
            "misses": self.misses.load(Ordering::Relaxed),
            "hit_rate_pct": (self.hit_rate() * 1000.0).round() / 10.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit() {
        let cache = PromptCache::new();
        let prompt = "Ti si računovodstveni asistent za hrvatske propise.";

        assert!(cache.get(prompt).is_none());
        cache.put(
            prompt,
            CachedKvState {
                kv_bytes: vec![1, 2, 3],
                token_count: 2000,
            },
        );
        let state = cache.get(prompt).unwrap();
        assert_eq!(state.token_count, 2000);

        assert_eq!(cache.stats()["hits"], 1);
        assert_eq!(cache.stats()["misses"], 1);
        assert_eq!(cache.hit_rate(), 0.5);
    }

    #[test]
    fn different_prompt_different_key() {
        let a = PromptCache::key_for("prompt A");
        let b = PromptCache::key_for("prompt B");
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        // Isti tekst → isti ključ, dijeli se među korisnicima.
        assert_eq!(a, PromptCache::key_for("prompt A"));
    }

    #[test]
    fn invalidate_and_clear() {
        let cache = PromptCache::new();
        cache.put(
            "p",
            CachedKvState {
                kv_bytes: vec![],
                token_count: 1,
            },
        );
        assert!(cache.has("p"));
        cache.invalidate("p");
        assert!(!cache.has("p"));

        cache.put(
            "q",
            CachedKvState {
                kv_bytes: vec![],
                token_count: 1,
            },
        );
        cache.clear();
        assert!(!cache.has("q"));
        assert_eq!(cache.hit_rate(), 0.0);
    }
}
