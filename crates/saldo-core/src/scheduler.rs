//! Noćni scheduler: DPO izvoz, trening adaptera, rotacija backupa.
//!
//! Jedan ciklus po noći. Trening adaptera se pokušava najviše jednom po
//! noći — neuspjeh se logira i sljedeći pokušaj je za 24 sata, nikad
//! ranije. Ciklus je izdvojen u `run_nightly_cycle` pa se testira bez
//! čekanja ponoći.

use crate::config::CoreConfig;
use crate::memory::{MemorySystem, DPO_EXPORT_THRESHOLD};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};

/// Broj backup manifesta koji se čuvaju pri rotaciji.
pub const BACKUPS_TO_KEEP: usize = 14;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
/// Trening adaptera: putanja DPO JSONL-a → putanja novog adaptera.
pub type TrainFn = dyn Fn(PathBuf) -> BoxFuture<Result<PathBuf, String>> + Send + Sync;

/// Ishod jednog noćnog ciklusa.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NightlyReport {
    pub dpo_exported: usize,
    pub training_attempted: bool,
    pub training_succeeded: bool,
    pub backups_rotated: usize,
    pub episodes_purged: usize,
}

pub struct NightlyScheduler {
    config: CoreConfig,
    memory: Arc<MemorySystem>,
    /// Dan (YYYY-MM-DD) zadnjeg pokušaja treninga — jedan po noći.
    last_training_day: std::sync::Mutex<String>,
}

impl NightlyScheduler {
    pub fn new(config: CoreConfig, memory: Arc<MemorySystem>) -> Self {
        Self {
            config,
            memory,
            last_training_day: std::sync::Mutex::new(String::new()),
        }
    }

    /// Beskonačna petlja: jedan ciklus svaka 24 sata.
    pub async fn run(self: Arc<Self>, train: Option<Arc<TrainFn>>) {
        info!(target: "saldo::scheduler", "Noćni scheduler pokrenut (ciklus 24 h)");
        let mut tick = interval(Duration::from_secs(24 * 60 * 60));
        loop {
            tick.tick().await;
            let report = self.run_nightly_cycle(train.as_deref()).await;
            info!(
                target: "saldo::scheduler",
                "Noćni ciklus: {} DPO parova, trening pokušan={}, uspio={}, {} backupa rotirano",
                report.dpo_exported,
                report.training_attempted,
                report.training_succeeded,
                report.backups_rotated
            );
        }
    }

    /// Jedan noćni ciklus. Javno radi testiranja i ručnog pokretanja.
    pub async fn run_nightly_cycle(&self, train: Option<&TrainFn>) -> NightlyReport {
        let mut report = NightlyReport::default();

        // 1. Izvoz preferencijskih parova kad ih je dovoljno.
        let dpo_path = self
            .config
            .dpo_dir()
            .join(format!("dpo_{}.jsonl", Utc::now().format("%Y%m%d")));
        match self.memory.export_preferences(&dpo_path, DPO_EXPORT_THRESHOLD) {
            Ok(n) => {
                report.dpo_exported = n;
                // 2. Trening adaptera — najviše jedan pokušaj po noći.
                if let Some(train) = train {
                    if self.claim_training_slot() {
                        report.training_attempted = true;
                        match train(dpo_path.clone()).await {
                            Ok(adapter) => {
                                report.training_succeeded = true;
                                info!(
                                    target: "saldo::scheduler",
                                    "Adapter treniran: {}",
                                    adapter.display()
                                );
                            }
                            Err(e) => {
                                // Sljedeći pokušaj tek za 24 h.
                                error!(
                                    target: "saldo::scheduler",
                                    "Trening adaptera nije uspio: {} — sljedeći pokušaj za 24 h",
                                    e
                                );
                            }
                        }
                    }
                }
            }
            Err(crate::error::MemoryError::NotEnoughPairs { got, need }) => {
                info!(
                    target: "saldo::scheduler",
                    "DPO izvoz preskočen: {} parova (prag {})",
                    got, need
                );
            }
            Err(e) => {
                warn!(target: "saldo::scheduler", "DPO izvoz nije uspio: {}", e);
            }
        }

        // 3. Rotacija backupa.
        report.backups_rotated = self.rotate_backups();

        // 4. L1 epizodna memorija se roluje po danu.
        report.episodes_purged = self.memory.purge_old_episodes(1).unwrap_or(0);

        report
    }

    fn claim_training_slot(&self) -> bool {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let mut last = self
            .last_training_day
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if *last == today {
            info!(
                target: "saldo::scheduler",
                "Trening je već pokušan danas — preskačem do sutra"
            );
            return false;
        }
        *last = today;
        true
    }

    /// Zadrži zadnjih `BACKUPS_TO_KEEP` datoteka u backup direktoriju.
    fn rotate_backups(&self) -> usize {
        let dir = self.config.backups_dir.clone();
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return 0;
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        let mut removed = 0;
        while files.len() > BACKUPS_TO_KEEP {
            let oldest = files.remove(0);
            if std::fs::remove_file(&oldest).is_ok() {
                removed += 1;
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::PreferencePair;

    fn scheduler(dir: &tempfile::TempDir) -> (Arc<MemorySystem>, NightlyScheduler) {
        let mut config = CoreConfig::default();
        config.data_dir = dir.path().to_path_buf();
        config.backups_dir = dir.path().join("backups");
        let memory = Arc::new(MemorySystem::open(dir.path().join("memory.db")).unwrap());
        let scheduler = NightlyScheduler::new(config, Arc::clone(&memory));
        (memory, scheduler)
    }

    fn seed_pairs(memory: &MemorySystem, n: usize) {
        for i in 0..n {
            memory
                .record_preference(&PreferencePair {
                    prompt: format!("p{}", i),
                    chosen: "4010".to_string(),
                    rejected: "4800".to_string(),
                    correction_kind: "konto".to_string(),
                })
                .unwrap();
        }
    }

    #[tokio::test]
    async fn below_threshold_skips_export_and_training() {
        let dir = tempfile::tempdir().unwrap();
        let (memory, scheduler) = scheduler(&dir);
        seed_pairs(&memory, 10);

        let report = scheduler.run_nightly_cycle(None).await;
        assert_eq!(report.dpo_exported, 0);
        assert!(!report.training_attempted);
        assert_eq!(memory.unused_preference_count().unwrap(), 10);
    }

    #[tokio::test]
    async fn exports_and_trains_once_per_night() {
        let dir = tempfile::tempdir().unwrap();
        let (memory, scheduler) = scheduler(&dir);
        seed_pairs(&memory, 60);

        let train: Box<TrainFn> = Box::new(|dpo| {
            Box::pin(async move {
                assert!(dpo.exists());
                Ok(dpo.with_extension("adapter"))
            })
        });

        let report = scheduler.run_nightly_cycle(Some(&*train)).await;
        assert_eq!(report.dpo_exported, 60);
        assert!(report.training_attempted);
        assert!(report.training_succeeded);
        assert_eq!(memory.unused_preference_count().unwrap(), 0);

        // Isti dan: novi parovi se izvezu, ali trening se NE ponavlja.
        seed_pairs(&memory, 60);
        let report = scheduler.run_nightly_cycle(Some(&*train)).await;
        assert_eq!(report.dpo_exported, 60);
        assert!(!report.training_attempted);
    }

    #[tokio::test]
    async fn training_failure_is_logged_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (memory, scheduler) = scheduler(&dir);
        seed_pairs(&memory, 60);

        let train: Box<TrainFn> =
            Box::new(|_| Box::pin(async { Err("GPU nedostupan".to_string()) }));
        let report = scheduler.run_nightly_cycle(Some(&*train)).await;
        assert!(report.training_attempted);
        assert!(!report.training_succeeded);
    }

    #[tokio::test]
    async fn backup_rotation_keeps_latest() {
        let dir = tempfile::tempdir().unwrap();
        let (_memory, scheduler) = scheduler(&dir);
        let backups = dir.path().join("backups");
        std::fs::create_dir_all(&backups).unwrap();
        for i in 0..20 {
            std::fs::write(backups.join(format!("manifest_{:02}.json", i)), "{}").unwrap();
        }

        let report = scheduler.run_nightly_cycle(None).await;
        assert_eq!(report.backups_rotated, 6);
        let remaining = std::fs::read_dir(&backups).unwrap().count();
        assert_eq!(remaining, BACKUPS_TO_KEEP);
        // Najstariji su obrisani.
        assert!(!backups.join("manifest_00.json").exists());
        assert!(backups.join("manifest_19.json").exists());
    }
}
