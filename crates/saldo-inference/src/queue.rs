//! Čekaonica ispred LLM-a: globalni limit + rate limit po korisniku.
//!
//! Globalni semafor ograničava istovremene generacije (default 3);
//! token-bucket po korisniku propušta 10 zahtjeva u minuti. Prelijevanje
//! NIJE iznimka nego vrijednost s uputom korisniku — chat petlja nastavlja
//! raditi. Permit se vraća semaforu na drop, pa otkazivanje streama
//! automatski oslobađa slot.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Najviše istovremenih generacija na cijelom sustavu.
    pub max_concurrent: usize,
    /// Zahtjeva po korisniku u minuti.
    pub max_per_minute: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            max_per_minute: 10,
        }
    }
}

/// Korisniku vidljiva odbijenica — poruka, ne iznimka.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Previše zahtjeva — pokušajte ponovo za {retry_after_secs} s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Sustav je trenutno zauzet — svi slotovi za generiranje su popunjeni")]
    QueueFull,
}

/// Slot za jednu generaciju. Drop vraća slot u semafor (i kod
/// otkazivanja streama).
pub struct QueuePermit {
    _permit: OwnedSemaphorePermit,
    pub user_id: String,
}

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RequestQueue {
    config: QueueConfig,
    semaphore: Arc<Semaphore>,
    buckets: DashMap<String, TokenBucket>,
}

impl RequestQueue {
    pub fn new(config: QueueConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            config,
            semaphore,
            buckets: DashMap::new(),
        }
    }

    /// Zatraži slot za generaciju. FIFO unutar korisnikova budžeta;
    /// preko budžeta `RateLimited`, bez slobodnog slota `QueueFull`.
    pub fn submit(&self, user_id: &str) -> Result<QueuePermit, QueueError> {
        self.check_rate_limit(user_id)?;

        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => {
                debug!(target: "saldo::queue", "slot dodijeljen korisniku {}", user_id);
                Ok(QueuePermit {
                    _permit: permit,
                    user_id: user_id.to_string(),
                })
            }
            Err(_) => {
                // Slot nije potrošen — vrati token korisniku.
                self.refund_token(user_id);
                Err(QueueError::QueueFull)
            }
        }
    }

    /// Čekaj slot (kooperativna točka) umjesto trenutnog odbijanja.
    /// Rate limit se i dalje primjenjuje prije čekanja.
    pub async fn submit_waiting(&self, user_id: &str) -> Result<QueuePermit, QueueError> {
        self.check_rate_limit(user_id)?;
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| QueueError::QueueFull)?;
        Ok(QueuePermit {
            _permit: permit,
            user_id: user_id.to_string(),
        })
    }

    fn check_rate_limit(&self, user_id: &str) -> Result<(), QueueError> {
        let rate_per_sec = self.config.max_per_minute as f64 / 60.0;
        let capacity = self.config.max_per_minute as f64;

        let mut bucket = self
            .buckets
            .entry(user_id.to_string())
            .or_insert_with(|| TokenBucket {
                tokens: capacity,
                last_refill: Instant::now(),
            });

        let elapsed = bucket.last_refill.elapsed().as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rate_per_sec).min(capacity);
        bucket.last_refill = Instant::now();

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let retry_after_secs = ((1.0 - bucket.tokens) / rate_per_sec).ceil() as u64;
            Err(QueueError::RateLimited { retry_after_secs })
        }
    }

    fn refund_token(&self, user_id: &str) {
        if let Some(mut bucket) = self.buckets.get_mut(user_id) {
            bucket.tokens = (bucket.tokens + 1.0).min(self.config.max_per_minute as f64);
        }
    }

    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }
}
