//! UMA kontroler: budžeti objedinjene memorije za jedan čvor.
//!
//! Budžeti (256 GB cilj): težine modela 50 %, KV cache 15 %, vision
//! 3 %, embeddinzi 3 %, LoRA 2 %, radni bufferi 10 %, prompt cache 5 %,
//! ostatak OS. Wired (pinned) memorija ne smije prijeći 85 % ukupne.

use crate::hardware::PressureLevel;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Vrsta memorijske regije.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryRegionType {
    ModelWeights,
    KvCache,
    VisionModel,
    EmbeddingStore,
    LoraAdapters,
    WorkingBuffer,
    PromptCache,
}

impl MemoryRegionType {
    /// Udio ukupne UMA memorije rezerviran za ovu vrstu.
    pub fn budget_fraction(&self) -> f64 {
        match self {
            Self::ModelWeights => 0.50,
            Self::KvCache => 0.15,
            Self::VisionModel => 0.03,
            Self::EmbeddingStore => 0.03,
            Self::LoraAdapters => 0.02,
            Self::WorkingBuffer => 0.10,
            Self::PromptCache => 0.05,
        }
    }

    pub fn all() -> [Self; 7] {
        [
            Self::ModelWeights,
            Self::KvCache,
            Self::VisionModel,
            Self::EmbeddingStore,
            Self::LoraAdapters,
            Self::WorkingBuffer,
            Self::PromptCache,
        ]
    }
}

/// Prioritet izbacivanja (manji = izbaci prije). Pinned se ne izbacuje.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemoryPriority {
    Low,
    Normal,
    High,
    Pinned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoryRegion {
    region_id: String,
    region_type: MemoryRegionType,
    size_bytes: u64,
    priority: MemoryPriority,
    wired: bool,
    last_accessed_ms: i64,
}

/// Maksimalan udio wired memorije.
const MAX_WIRED_FRACTION: f64 = 0.85;

/// Kontroler UMA budžeta. Interno stanje pod jednim mutexom — operacije
/// su kratke i ne prelaze preko await točaka.
pub struct UmaController {
    total_bytes: u64,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    regions: HashMap<String, MemoryRegion>,
    wired_bytes: u64,
}

impl UmaController {
    pub fn new(total_gb: f64) -> Self {
        Self {
            total_bytes: (total_gb * 1024.0 * 1024.0 * 1024.0) as u64,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn used_bytes(&self) -> u64 {
        self.lock().regions.values().map(|r| r.size_bytes).sum()
    }

    pub fn utilization(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            self.used_bytes() as f64 / self.total_bytes as f64
        }
    }

    pub fn pressure(&self) -> PressureLevel {
        PressureLevel::from_utilization(self.utilization())
    }

    /// Preostali budžet za vrstu regije, u bajtovima.
    pub fn budget_remaining(&self, region_type: MemoryRegionType) -> u64 {
        let budget = (self.total_bytes as f64 * region_type.budget_fraction()) as u64;
        let used: u64 = self
            .lock()
            .regions
            .values()
            .filter(|r| r.region_type == region_type)
            .map(|r| r.size_bytes)
            .sum();
        budget.saturating_sub(used)
    }

    /// Alociraj regiju. `wire = true` pinna memoriju (KV cache) do
    /// granice od 85 % — preko granice alokacija pada na non-wired.
    /// Kad budžet ne stane, izbacuju se regije nižeg prioriteta iste
    /// vrste; neuspjeh vraća `None`.
    pub fn allocate(
        &self,
        region_id: &str,
        region_type: MemoryRegionType,
        size_gb: f64,
        priority: MemoryPriority,
        wire: bool,
    ) -> Option<f64> {
        let size_bytes = (size_gb * 1024.0 * 1024.0 * 1024.0) as u64;
        let mut inner = self.lock();

        if let Some(existing) = inner.regions.get_mut(region_id) {
            existing.last_accessed_ms = now_ms();
            return Some(existing.size_bytes as f64 / (1024.0 * 1024.0 * 1024.0));
        }

        // Budžet po vrsti, s izbacivanjem hladnih regija nižeg prioriteta.
        let budget = (self.total_bytes as f64 * region_type.budget_fraction()) as u64;
        let used: u64 = inner
            .regions
            .values()
            .filter(|r| r.region_type == region_type)
            .map(|r| r.size_bytes)
            .sum();
        if used + size_bytes > budget {
            let freed = Self::evict_for(&mut inner, region_type, used + size_bytes - budget, priority);
            if used.saturating_sub(freed) + size_bytes > budget {
                warn!(
                    target: "saldo::silicon",
                    "UMA: {} ({:.1} GB) ne stane u budžet za {:?}",
                    region_id, size_gb, region_type
                );
                return None;
            }
        }

        let mut wire = wire;
        if wire {
            let max_wired = (self.total_bytes as f64 * MAX_WIRED_FRACTION) as u64;
            if inner.wired_bytes + size_bytes > max_wired {
                warn!(
                    target: "saldo::silicon",
                    "UMA: wired granica dosegnuta — {} pada na non-wired",
                    region_id
                );
                wire = false;
            }
        }

        if wire {
            inner.wired_bytes += size_bytes;
        }
        inner.regions.insert(
            region_id.to_string(),
            MemoryRegion {
                region_id: region_id.to_string(),
                region_type,
                size_bytes,
                priority,
                wired: wire,
                last_accessed_ms: now_ms(),
            },
        );
        debug!(
            target: "saldo::silicon",
            "UMA: alocirano {} ({:.1} GB, {:?}, wired={})",
            region_id, size_gb, region_type, wire
        );
        Some(size_gb)
    }

    pub fn release(&self, region_id: &str) -> bool {
        let mut inner = self.lock();
        if let Some(region) = inner.regions.remove(region_id) {
            if region.wired {
                inner.wired_bytes = inner.wired_bytes.saturating_sub(region.size_bytes);
            }
            true
        } else {
            false
        }
    }

    fn evict_for(
        inner: &mut Inner,
        region_type: MemoryRegionType,
        needed_bytes: u64,
        requester_priority: MemoryPriority,
    ) -> u64 {
        let mut candidates: Vec<(String, u64, MemoryPriority, i64)> = inner
            .regions
            .values()
            .filter(|r| {
                r.region_type == region_type
                    && r.priority < MemoryPriority::Pinned
                    && r.priority <= requester_priority
            })
            .map(|r| (r.region_id.clone(), r.size_bytes, r.priority, r.last_accessed_ms))
            .collect();
        candidates.sort_by(|a, b| a.2.cmp(&b.2).then(a.3.cmp(&b.3)));

        let mut freed = 0;
        for (id, size, _, _) in candidates {
            if freed >= needed_bytes {
                break;
            }
            if let Some(region) = inner.regions.remove(&id) {
                if region.wired {
                    inner.wired_bytes = inner.wired_bytes.saturating_sub(region.size_bytes);
                }
                freed += size;
            }
        }
        freed
    }

    pub fn status(&self) -> serde_json::Value {
        let inner = self.lock();
        let gb = |b: u64| (b as f64 / (1024.0 * 1024.0 * 1024.0) * 10.0).round() / 10.0;
        let used: u64 = inner.regions.values().map(|r| r.size_bytes).sum();
        let by_type: HashMap<String, f64> = MemoryRegionType::all()
            .into_iter()
            .map(|t| {
                let sum: u64 = inner
                    .regions
                    .values()
                    .filter(|r| r.region_type == t)
                    .map(|r| r.size_bytes)
                    .sum();
                (format!("{:?}", t), gb(sum))
            })
            .collect();
        json!({
            "total_gb": gb(self.total_bytes),
            "used_gb": gb(used),
            "wired_gb": gb(inner.wired_bytes),
            "regions": inner.regions.len(),
            "by_type": by_type,
        })
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budgets_sum_below_one() {
        let total: f64 = MemoryRegionType::all()
            .iter()
            .map(|t| t.budget_fraction())
            .sum();
        assert!(total <= 1.0, "budžeti = {:.0} %", total * 100.0);
    }

    #[test]
    fn allocate_within_budget() {
        let uma = UmaController::new(256.0);
        // KV budžet je 15 % od 256 = 38.4 GB.
        assert!(uma
            .allocate("kv-1", MemoryRegionType::KvCache, 30.0, MemoryPriority::High, true)
            .is_some());
        assert!(uma
            .allocate("kv-2", MemoryRegionType::KvCache, 30.0, MemoryPriority::Low, false)
            .is_none());
        assert!(uma.release("kv-1"));
        assert!(uma
            .allocate("kv-2", MemoryRegionType::KvCache, 30.0, MemoryPriority::Low, false)
            .is_some());
    }

    #[test]
    fn eviction_frees_lower_priority() {
        let uma = UmaController::new(256.0);
        uma.allocate("cold", MemoryRegionType::PromptCache, 10.0, MemoryPriority::Low, false);
        // Budžet prompt cachea je 12.8 GB; novih 10 GB traži izbacivanje.
        let got = uma.allocate(
            "hot",
            MemoryRegionType::PromptCache,
            10.0,
            MemoryPriority::High,
            false,
        );
        assert!(got.is_some());
        assert!(!uma.release("cold"), "cold je morao biti izbačen");
    }

    #[test]
    fn pinned_never_evicted() {
        let uma = UmaController::new(256.0);
        uma.allocate(
            "pinned",
            MemoryRegionType::PromptCache,
            10.0,
            MemoryPriority::Pinned,
            false,
        );
        let got = uma.allocate(
            "newcomer",
            MemoryRegionType::PromptCache,
            10.0,
            MemoryPriority::High,
            false,
        );
        assert!(got.is_none());
        assert!(uma.release("pinned"));
    }

    #[test]
    fn wired_limit_falls_back_to_unwired() {
        let uma = UmaController::new(100.0);
        // Popuni wired do 83 GB unutar budžeta pojedinih vrsta.
        for (id, t, gb) in [
            ("w", MemoryRegionType::ModelWeights, 50.0),
            ("kv", MemoryRegionType::KvCache, 15.0),
            ("pc", MemoryRegionType::PromptCache, 5.0),
            ("buf", MemoryRegionType::WorkingBuffer, 10.0),
            ("emb", MemoryRegionType::EmbeddingStore, 3.0),
        ] {
            assert!(uma.allocate(id, t, gb, MemoryPriority::Pinned, true).is_some());
        }
        // Još 3 GB wired bi prešlo 85 % — alokacija prolazi, ali non-wired.
        assert!(uma
            .allocate("vis", MemoryRegionType::VisionModel, 3.0, MemoryPriority::High, true)
            .is_some());
        let status = uma.status();
        assert!(status["wired_gb"].as_f64().unwrap() <= 85.0);
        assert_eq!(status["regions"], 6);
    }

    #[test]
    fn idempotent_allocate_touches() {
        let uma = UmaController::new(256.0);
        uma.allocate("kv", MemoryRegionType::KvCache, 10.0, MemoryPriority::High, false);
        let again = uma.allocate("kv", MemoryRegionType::KvCache, 20.0, MemoryPriority::High, false);
        // Postojeća regija se ne mijenja, vraća se njena veličina.
        assert_eq!(again, Some(10.0));
    }
}
