//! Knowledge Vault: čuvar naučenog znanja preko zamjene modela.
//!
//! Jamstva:
//!   1. Putanje znanja se NIKAD ne brišu.
//!   2. Svaka zamjena modela stvara SHA-256 manifest prije i provjerava
//!      ga poslije — smiju se promijeniti samo datoteke modela.
//!   3. Kompatibilnost LoRA adaptera se provjerava prije aktivacije;
//!      nekompatibilni se retrenira iz DPO parova (model-neovisnih).
//!   4. Svaki neuspjeh vraća arhivirani model (rollback).
//!   5. Potpun audit trag svake operacije u `data/logs/swaps/`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::future::Future;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Putanje znanja pod zaštitom manifesta. Nikad se ne brišu.
pub const KNOWLEDGE_PATHS: &[&str] = &[
    "data/memory_db/",
    "data/rag_db/",
    "data/dpo_datasets/",
    "data/models/lora/",
    "data/laws/",
    "data/exports/",
    "data/backups/",
    "data/audit/",
    "config.json",
];

/// Putanje modela — očekivano se mijenjaju pri zamjeni.
pub const MODEL_PATHS: &[&str] = &["data/models/primary", "data/models/archive"];

/// Minimalan broj DPO parova za retrening adaptera.
pub const MIN_DPO_PAIRS_FOR_RETRAIN: usize = 10;

/// Test prompt za validaciju novog modela.
pub const COMPATIBILITY_TEST_PROMPT: &str =
    "Kontiranje: Račun za uredski materijal od dobavljača, iznos 1.000,00 EUR \
     + PDV 25% = 1.250,00 EUR. Predloži konto za troškove.";

/// Ključne riječi koje validacijski odgovor mora sadržavati.
pub const EXPECTED_TEST_KEYWORDS: &[&str] = &["4010", "konto", "trošak", "uredski"];

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("I/O greška: {0}")]
    Io(#[from] std::io::Error),

    #[error("Registar adaptera nije čitljiv: {0}")]
    Registry(#[from] serde_json::Error),

    #[error("Narušen integritet znanja: {0:?}")]
    Integrity(Vec<String>),
}

/// Faze zamjene modela.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapPhase {
    PreCheck,
    Snapshot,
    Backup,
    Download,
    Validate,
    LoraCheck,
    DpoRetrain,
    Verify,
    Activate,
    Complete,
    RolledBack,
    Failed,
}

/// Kompatibilnost LoRA adaptera s novim modelom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoraCompatibility {
    /// Ista arhitektura — direktno učitavanje.
    Compatible,
    /// Druga arhitektura — retrening iz DPO parova.
    RetrainNeeded,
    /// Nema adaptera.
    NoAdapters,
}

/// Životni ciklus adaptera. Najviše jedan je `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterStatus {
    Training,
    Evaluating,
    Ready,
    Active,
    Retired,
    Rejected,
    Archived,
}

/// Zapis jednog LoRA adaptera u registru.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterRecord {
    pub adapter_id: String,
    pub base_model: String,
    /// Otisak arhitekture, npr. "qwen3_235b".
    pub base_model_arch: String,
    pub lora_rank: u32,
    pub lora_alpha: f64,
    pub target_modules: Vec<String>,
    pub training_pairs: usize,
    pub created_at: String,
    pub status: AdapterStatus,
    pub path: String,
}

/// SHA-256 manifest svih datoteka znanja.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityManifest {
    pub manifest_id: String,
    pub created_at: String,
    pub base_dir: String,
    /// Relativna putanja → SHA-256 heksadecimalno.
    pub file_hashes: BTreeMap<String, String>,
    pub total_files: usize,
    pub total_size_bytes: u64,
}

impl IntegrityManifest {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}

/// Potpuni zapisnik jedne zamjene modela.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapLog {
    pub swap_id: String,
    pub started_at: String,
    pub completed_at: String,
    pub old_model: String,
    pub new_model: String,
    pub phase: SwapPhase,
    pub lora_compatibility: LoraCompatibility,
    pub knowledge_verified: bool,
    pub rollback_performed: bool,
    pub error: String,
    pub phases_log: Vec<PhaseEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseEntry {
    pub phase: SwapPhase,
    pub message: String,
    pub success: bool,
    pub timestamp: String,
}

impl SwapLog {
    fn new(old_model: &str, new_model: &str) -> Self {
        Self {
            swap_id: short_id(),
            started_at: Utc::now().to_rfc3339(),
            completed_at: String::new(),
            old_model: old_model.to_string(),
            new_model: new_model.to_string(),
            phase: SwapPhase::PreCheck,
            lora_compatibility: LoraCompatibility::NoAdapters,
            knowledge_verified: false,
            rollback_performed: false,
            error: String::new(),
            phases_log: Vec::new(),
        }
    }

    fn log_phase(&mut self, phase: SwapPhase, message: impl Into<String>, success: bool) {
        self.phase = phase;
        self.phases_log.push(PhaseEntry {
            phase,
            message: message.into(),
            success,
            timestamp: Utc::now().to_rfc3339(),
        });
    }
}

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
/// Preuzimanje modela: model id → putanja preuzetog modela.
pub type DownloadFn = dyn Fn(String) -> BoxFuture<Result<PathBuf, String>> + Send + Sync;
/// Test inferencija: (putanja modela, prompt) → odgovor.
pub type InferenceFn = dyn Fn(PathBuf, String) -> BoxFuture<Result<String, String>> + Send + Sync;
/// Retrening: (putanja modela, DPO jsonl, izlazni dir) → putanja adaptera.
pub type RetrainFn = dyn Fn(PathBuf, PathBuf, PathBuf) -> BoxFuture<Result<PathBuf, String>> + Send + Sync;

/// Čuvar znanja nad jednim korijenskim direktorijem.
pub struct KnowledgeVault {
    base_dir: PathBuf,
    adapters: BTreeMap<String, AdapterRecord>,
}

impl KnowledgeVault {
    pub fn open(base_dir: PathBuf) -> Result<Self, VaultError> {
        let mut vault = Self {
            base_dir,
            adapters: BTreeMap::new(),
        };
        vault.ensure_paths()?;
        vault.load_adapter_registry()?;
        Ok(vault)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn ensure_paths(&self) -> Result<(), VaultError> {
        for p in KNOWLEDGE_PATHS {
            let path = self.base_dir.join(p);
            if p.ends_with('/') {
                std::fs::create_dir_all(&path)?;
            } else if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        for p in MODEL_PATHS {
            std::fs::create_dir_all(self.base_dir.join(p))?;
        }
        Ok(())
    }

    // ── INTEGRITY MANIFEST ──

    /// SHA-256 snimka svih datoteka znanja, prije zamjene modela.
    pub fn create_manifest(&self) -> Result<IntegrityManifest, VaultError> {
        let mut manifest = IntegrityManifest {
            manifest_id: short_id(),
            created_at: Utc::now().to_rfc3339(),
            base_dir: self.base_dir.display().to_string(),
            file_hashes: BTreeMap::new(),
            total_files: 0,
            total_size_bytes: 0,
        };

        for kp in KNOWLEDGE_PATHS {
            let path = self.base_dir.join(kp);
            if path.is_file() {
                self.hash_into(&mut manifest, &path)?;
            } else if path.is_dir() {
                for entry in walkdir::WalkDir::new(&path)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(Result::ok)
                {
                    if entry.file_type().is_file() {
                        self.hash_into(&mut manifest, entry.path())?;
                    }
                }
            }
        }

        info!(
            target: "saldo::vault",
            "Manifest {}: {} datoteka, {} B",
            manifest.manifest_id, manifest.total_files, manifest.total_size_bytes
        );
        Ok(manifest)
    }

    fn hash_into(&self, manifest: &mut IntegrityManifest, path: &Path) -> Result<(), VaultError> {
        let rel = path
            .strip_prefix(&self.base_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let hash = sha256_file(path)?;
        let size = std::fs::metadata(path)?.len();
        manifest.file_hashes.insert(rel, hash);
        manifest.total_files += 1;
        manifest.total_size_bytes += size;
        Ok(())
    }

    /// Provjeri integritet: vraća (sve_ok, popis odstupanja).
    pub fn verify_manifest(
        &self,
        manifest: &IntegrityManifest,
    ) -> Result<(bool, Vec<String>), VaultError> {
        let mut mismatches = Vec::new();
        for (rel, expected) in &manifest.file_hashes {
            let full = self.base_dir.join(rel);
            if !full.exists() {
                mismatches.push(format!("MISSING: {}", rel));
                continue;
            }
            let actual = sha256_file(&full)?;
            if actual != *expected {
                mismatches.push(format!(
                    "CHANGED: {} (očekivano {}..., dobiveno {}...)",
                    rel,
                    &expected[..12],
                    &actual[..12]
                ));
            }
        }
        if mismatches.is_empty() {
            info!(
                target: "saldo::vault",
                "Integritet znanja POTVRĐEN: {} datoteka",
                manifest.total_files
            );
        } else {
            error!(
                target: "saldo::vault",
                "Integritet znanja NARUŠEN: {} odstupanja",
                mismatches.len()
            );
        }
        Ok((mismatches.is_empty(), mismatches))
    }

    // ── LoRA ADAPTERI ──

    fn registry_path(&self) -> PathBuf {
        self.base_dir.join("data/models/lora/adapter_registry.json")
    }

    fn load_adapter_registry(&mut self) -> Result<(), VaultError> {
        let path = self.registry_path();
        if !path.exists() {
            return Ok(());
        }
        let data = std::fs::read_to_string(&path)?;
        let parsed: serde_json::Value = serde_json::from_str(&data)?;
        if let Some(list) = parsed.get("adapters").and_then(|v| v.as_array()) {
            for item in list {
                if let Ok(rec) = serde_json::from_value::<AdapterRecord>(item.clone()) {
                    self.adapters.insert(rec.adapter_id.clone(), rec);
                }
            }
        }
        info!(
            target: "saldo::vault",
            "Učitano {} LoRA adaptera iz registra",
            self.adapters.len()
        );
        Ok(())
    }

    fn save_adapter_registry(&self) -> Result<(), VaultError> {
        let path = self.registry_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(&json!({
            "adapters": self.adapters.values().collect::<Vec<_>>(),
            "updated_at": Utc::now().to_rfc3339(),
        }))?;
        std::fs::write(path, body)?;
        Ok(())
    }

    pub fn register_adapter(
        &mut self,
        adapter_path: &str,
        base_model: &str,
        base_model_arch: &str,
        training_pairs: usize,
    ) -> Result<AdapterRecord, VaultError> {
        let rec = AdapterRecord {
            adapter_id: short_id(),
            base_model: base_model.to_string(),
            base_model_arch: if base_model_arch.is_empty() {
                model_arch_fingerprint(base_model)
            } else {
                base_model_arch.to_string()
            },
            lora_rank: 16,
            lora_alpha: 32.0,
            target_modules: vec![
                "self_attn.q_proj".to_string(),
                "self_attn.v_proj".to_string(),
                "self_attn.k_proj".to_string(),
                "self_attn.o_proj".to_string(),
            ],
            training_pairs,
            created_at: Utc::now().to_rfc3339(),
            status: AdapterStatus::Ready,
            path: adapter_path.to_string(),
        };
        self.adapters.insert(rec.adapter_id.clone(), rec.clone());
        self.save_adapter_registry()?;
        info!(
            target: "saldo::vault",
            "Registriran adapter {} za model {} ({} DPO parova)",
            rec.adapter_id, base_model, training_pairs
        );
        Ok(rec)
    }

    /// Aktiviraj adapter; svaki dotad aktivni prelazi u `Retired`.
    /// Time vrijedi invarijanta: najviše jedan `Active`.
    pub fn activate_adapter(&mut self, adapter_id: &str) -> Result<(), VaultError> {
        for rec in self.adapters.values_mut() {
            if rec.status == AdapterStatus::Active {
                rec.status = AdapterStatus::Retired;
            }
        }
        if let Some(rec) = self.adapters.get_mut(adapter_id) {
            rec.status = AdapterStatus::Active;
        }
        self.save_adapter_registry()
    }

    pub fn get_active_adapter(&self) -> Option<&AdapterRecord> {
        self.adapters
            .values()
            .find(|a| a.status == AdapterStatus::Active)
    }

    pub fn get_latest_adapter(&self, model: Option<&str>) -> Option<&AdapterRecord> {
        self.adapters
            .values()
            .filter(|a| {
                matches!(a.status, AdapterStatus::Ready | AdapterStatus::Active)
                    && model.map_or(true, |m| a.base_model == m)
            })
            .max_by(|a, b| a.created_at.cmp(&b.created_at))
    }

    /// Arhiviraj sve adaptere za model (pri zamjeni). Adapteri se NIKAD
    /// ne brišu.
    pub fn archive_adapters_for_model(&mut self, model: &str) -> Result<usize, VaultError> {
        let mut count = 0;
        for rec in self.adapters.values_mut() {
            if rec.base_model == model
                && matches!(rec.status, AdapterStatus::Ready | AdapterStatus::Active)
            {
                rec.status = AdapterStatus::Archived;
                count += 1;
            }
        }
        if count > 0 {
            self.save_adapter_registry()?;
            info!(target: "saldo::vault", "Arhivirano {} adaptera za {}", count, model);
        }
        Ok(count)
    }

    pub fn check_lora_compatibility(&self, new_model: &str, new_arch: &str) -> LoraCompatibility {
        let active = self
            .get_active_adapter()
            .or_else(|| self.get_latest_adapter(None));
        let Some(active) = active else {
            return LoraCompatibility::NoAdapters;
        };

        let new_fp = if new_arch.is_empty() {
            model_arch_fingerprint(new_model)
        } else {
            new_arch.to_string()
        };

        if active.base_model_arch == new_fp && !new_fp.is_empty() {
            info!(
                target: "saldo::vault",
                "Adapter {} KOMPATIBILAN s {} ({})",
                active.adapter_id, new_model, new_fp
            );
            LoraCompatibility::Compatible
        } else {
            info!(
                target: "saldo::vault",
                "Adapter {} NEKOMPATIBILAN s {} ({} → {}) — potreban retrening",
                active.adapter_id, new_model, active.base_model_arch, new_fp
            );
            LoraCompatibility::RetrainNeeded
        }
    }

    // ── DPO SKUP ──

    pub fn count_dpo_pairs(&self) -> usize {
        let dir = self.base_dir.join("data/dpo_datasets");
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return 0;
        };
        entries
            .filter_map(Result::ok)
            .filter(|e| {
                e.path().extension().map(|x| x == "jsonl").unwrap_or(false)
                    && !e
                        .file_name()
                        .to_string_lossy()
                        .starts_with("retrain_export")
            })
            .filter_map(|e| std::fs::read_to_string(e.path()).ok())
            .map(|s| s.lines().filter(|l| !l.trim().is_empty()).count())
            .sum()
    }

    pub fn can_retrain_from_dpo(&self) -> bool {
        self.count_dpo_pairs() >= MIN_DPO_PAIRS_FOR_RETRAIN
    }

    /// Spoji sve DPO parove u jedan JSONL za retrening. Parovi su
    /// model-neovisni pa mogu trenirati adapter bilo kojeg modela.
    pub fn export_dpo_for_retrain(&self) -> Result<Option<PathBuf>, VaultError> {
        let dir = self.base_dir.join("data/dpo_datasets");
        if !dir.exists() {
            return Ok(None);
        }
        let export_path = dir.join(format!("retrain_export_{}.jsonl", Utc::now().timestamp()));
        let mut lines = Vec::new();
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.extension().map(|x| x == "jsonl").unwrap_or(false)
                    && !p
                        .file_name()
                        .map(|n| n.to_string_lossy().starts_with("retrain_export"))
                        .unwrap_or(false)
            })
            .collect();
        files.sort();
        for file in files {
            let content = std::fs::read_to_string(&file)?;
            lines.extend(
                content
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .map(str::to_string),
            );
        }

        if lines.len() < MIN_DPO_PAIRS_FOR_RETRAIN {
            warn!(
                target: "saldo::vault",
                "Samo {} DPO parova (treba {}) — retrening nije moguć",
                lines.len(),
                MIN_DPO_PAIRS_FOR_RETRAIN
            );
            return Ok(None);
        }

        std::fs::write(&export_path, lines.join("\n") + "\n")?;
        info!(
            target: "saldo::vault",
            "Izvezeno {} DPO parova u {}",
            lines.len(),
            export_path.display()
        );
        Ok(Some(export_path))
    }

    /// Sažetak stanja svih slojeva znanja.
    pub fn verify_memory_intact(&self) -> serde_json::Value {
        let exists_nonempty = |rel: &str| {
            let p = self.base_dir.join(rel);
            p.exists()
                && std::fs::read_dir(&p)
                    .map(|mut d| d.next().is_some())
                    .unwrap_or(false)
        };
        let memory_ok = self.base_dir.join("data/memory_db/memory.db").exists();
        let dpo = self.count_dpo_pairs();
        let active = self.get_active_adapter();
        let laws = std::fs::read_dir(self.base_dir.join("data/laws"))
            .map(|d| {
                d.filter_map(Result::ok)
                    .filter(|e| e.path().extension().map(|x| x == "txt").unwrap_or(false))
                    .count()
            })
            .unwrap_or(0);

        // Prazni slojevi su legitimni (prvi start); jedino nedostatak
        // konfiguracije degradira stanje.
        let config_ok = self.base_dir.join("config.json").exists();
        json!({
            "memory": { "status": if memory_ok { "ok" } else { "empty" } },
            "dpo": {
                "pairs": dpo,
                "can_retrain": self.can_retrain_from_dpo(),
            },
            "lora": {
                "total_adapters": self.adapters.len(),
                "active_adapter": active.map(|a| a.adapter_id.clone()),
            },
            "rag": { "status": if exists_nonempty("data/rag_db") { "ok" } else { "empty" } },
            "laws": { "count": laws },
            "config": { "status": if config_ok { "ok" } else { "missing" } },
            "overall": if config_ok { "INTACT" } else { "DEGRADED" },
        })
    }

    // ── SIGURNA ZAMJENA MODELA ──

    /// Deset faza zamjene modela s obveznim rollback putem:
    /// pre-check → snapshot → backup → download → validate → lora-check
    /// → (dpo-retrain) → verify → activate → complete/rolled-back.
    pub async fn safe_swap(
        &mut self,
        old_model: &str,
        new_model: &str,
        download: Option<&DownloadFn>,
        inference: Option<&InferenceFn>,
        retrain: Option<&RetrainFn>,
    ) -> SwapLog {
        let mut log = SwapLog::new(old_model, new_model);
        let archive_dir = self.base_dir.join("data/models/archive").join(format!(
            "{}_{}",
            safe_name(old_model),
            Utc::now().timestamp()
        ));

        match self
            .swap_phases(&mut log, new_model, &archive_dir, download, inference, retrain)
            .await
        {
            Ok(()) => {
                log.phase = SwapPhase::Complete;
                log.completed_at = Utc::now().to_rfc3339();
                info!(
                    target: "saldo::vault",
                    "Zamjena modela dovršena: {} → {} | LoRA: {:?} | znanje: {}",
                    old_model,
                    new_model,
                    log.lora_compatibility,
                    if log.knowledge_verified { "INTACT" } else { "DEGRADED" }
                );
            }
            Err(e) => {
                error!(
                    target: "saldo::vault",
                    "Zamjena modela NEUSPJEŠNA u fazi {:?}: {}",
                    log.phase, e
                );
                log.error = e;
                log.phase = SwapPhase::Failed;
                self.rollback(&mut log, &archive_dir);
            }
        }

        if let Err(e) = self.save_swap_log(&log) {
            error!(target: "saldo::vault", "Zapisnik zamjene nije spremljen: {}", e);
        }
        log
    }

    async fn swap_phases(
        &mut self,
        log: &mut SwapLog,
        new_model: &str,
        archive_dir: &Path,
        download: Option<&DownloadFn>,
        inference: Option<&InferenceFn>,
        retrain: Option<&RetrainFn>,
    ) -> Result<(), String> {
        // Faza 1: pre-check
        log.log_phase(SwapPhase::PreCheck, "Provjera putanja znanja", true);
        let verification = self.verify_memory_intact();
        if verification["overall"] != "INTACT" {
            log.log_phase(SwapPhase::PreCheck, "Znanje degradirano — nastavljam", false);
        }

        // Faza 2: snapshot manifesta
        log.log_phase(SwapPhase::Snapshot, "Stvaranje manifesta integriteta", true);
        let manifest = self.create_manifest().map_err(|e| e.to_string())?;
        let manifest_path = self
            .base_dir
            .join("data/backups")
            .join(format!("manifest_{}.json", log.swap_id));
        std::fs::write(
            &manifest_path,
            manifest.to_json().map_err(|e| e.to_string())?,
        )
        .map_err(|e| e.to_string())?;

        // Faza 3: arhiviraj stari model (premjesti, ne kopiraj)
        log.log_phase(SwapPhase::Backup, format!("Arhiviranje {}", log.old_model), true);
        let primary = self.base_dir.join("data/models/primary");
        if primary.exists() {
            std::fs::create_dir_all(archive_dir).map_err(|e| e.to_string())?;
            for entry in std::fs::read_dir(&primary).map_err(|e| e.to_string())? {
                let entry = entry.map_err(|e| e.to_string())?;
                std::fs::rename(entry.path(), archive_dir.join(entry.file_name()))
                    .map_err(|e| e.to_string())?;
            }
        }

        // Faza 4: preuzmi novi model
        log.log_phase(SwapPhase::Download, format!("Preuzimanje {}", new_model), true);
        let new_model_path = match download {
            Some(f) => f(new_model.to_string()).await?,
            None => {
                std::fs::create_dir_all(&primary).map_err(|e| e.to_string())?;
                primary.clone()
            }
        };

        // Faza 5: validiraj inferenciju poznatim promptom
        log.log_phase(SwapPhase::Validate, "Test inferencije", true);
        if let Some(f) = inference {
            let response = f(
                new_model_path.clone(),
                COMPATIBILITY_TEST_PROMPT.to_string(),
            )
            .await?;
            let lower = response.to_lowercase();
            if !EXPECTED_TEST_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
                return Err(format!(
                    "Validacija modela nije prošla: odgovor bez očekivanih pojmova ({})",
                    EXPECTED_TEST_KEYWORDS.join(", ")
                ));
            }
        }

        // Faza 6: LoRA kompatibilnost
        log.log_phase(SwapPhase::LoraCheck, "Provjera LoRA kompatibilnosti", true);
        let new_arch = model_arch_fingerprint(new_model);
        let compat = self.check_lora_compatibility(new_model, &new_arch);
        log.lora_compatibility = compat;

        if compat == LoraCompatibility::RetrainNeeded {
            // Faza 7: retrening iz DPO parova. Stari adapteri se prvo
            // arhiviraju (nikad brišu), pa tek onda aktivira novi.
            log.log_phase(SwapPhase::DpoRetrain, "Retrening LoRA iz DPO parova", true);
            let old_model_name = log.old_model.clone();
            self.archive_adapters_for_model(&old_model_name)
                .map_err(|e| e.to_string())?;
            if self.can_retrain_from_dpo() {
                if let Some(f) = retrain {
                    if let Some(dpo_path) =
                        self.export_dpo_for_retrain().map_err(|e| e.to_string())?
                    {
                        let adapter_dir = self
                            .base_dir
                            .join("data/models/lora")
                            .join(format!("retrained_{}", log.swap_id));
                        let adapter_path =
                            f(new_model_path.clone(), dpo_path, adapter_dir).await?;
                        let pairs = self.count_dpo_pairs();
                        let rec = self
                            .register_adapter(
                                &adapter_path.display().to_string(),
                                new_model,
                                &new_arch,
                                pairs,
                            )
                            .map_err(|e| e.to_string())?;
                        self.activate_adapter(&rec.adapter_id)
                            .map_err(|e| e.to_string())?;
                        log.log_phase(
                            SwapPhase::DpoRetrain,
                            format!("Novi adapter {} treniran i aktiviran", rec.adapter_id),
                            true,
                        );
                    }
                }
            } else {
                log.log_phase(
                    SwapPhase::DpoRetrain,
                    "Premalo DPO parova — model kreće bez adaptera (memorija i DPO očuvani)",
                    true,
                );
            }
        }

        // Faza 8: ponovna provjera integriteta znanja
        log.log_phase(SwapPhase::Verify, "Provjera integriteta znanja", true);
        let (all_ok, mismatches) = self.verify_manifest(&manifest).map_err(|e| e.to_string())?;
        if all_ok {
            log.knowledge_verified = true;
        } else {
            // Promjene u registru adaptera i DPO exportu su očekivane
            // posljedice retreninga; sve ostalo je korupcija.
            let critical: Vec<&String> = mismatches
                .iter()
                .filter(|m| {
                    !MODEL_PATHS.iter().any(|mp| m.contains(mp))
                        && !m.contains("adapter_registry.json")
                        && !m.contains("retrain_export")
                })
                .collect();
            if !critical.is_empty() {
                return Err(format!("Kritična korupcija znanja: {:?}", critical));
            }
            log.knowledge_verified = true;
        }

        // Faza 9: aktivacija
        log.log_phase(SwapPhase::Activate, format!("Aktivacija {}", new_model), true);
        Ok(())
    }

    /// Vrati arhivirani model. Uspjeh završava zamjenu u `RolledBack`;
    /// neuspjeh je ostavlja u `Failed` uz zahtjev za ručnom intervencijom.
    fn rollback(&self, log: &mut SwapLog, archive_dir: &Path) {
        log.phases_log.push(PhaseEntry {
            phase: SwapPhase::RolledBack,
            message: format!("Povratak na {}", log.old_model),
            success: true,
            timestamp: Utc::now().to_rfc3339(),
        });
        if !archive_dir.exists() {
            return;
        }
        let primary = self.base_dir.join("data/models/primary");
        let _ = std::fs::remove_dir_all(&primary);
        if std::fs::create_dir_all(&primary).is_err() {
            error!(target: "saldo::vault", "ROLLBACK NEUSPJEŠAN — potrebna ručna intervencija");
            return;
        }
        if let Ok(entries) = std::fs::read_dir(archive_dir) {
            for entry in entries.filter_map(Result::ok) {
                if std::fs::rename(entry.path(), primary.join(entry.file_name())).is_err() {
                    error!(
                        target: "saldo::vault",
                        "ROLLBACK: {} nije vraćen — potrebna ručna intervencija",
                        entry.path().display()
                    );
                    return;
                }
            }
        }
        log.rollback_performed = true;
        log.phase = SwapPhase::RolledBack;
        info!(target: "saldo::vault", "Rollback dovršen: {} vraćen", log.old_model);
    }

    fn save_swap_log(&self, log: &SwapLog) -> Result<(), VaultError> {
        let dir = self.base_dir.join("data/logs/swaps");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("swap_{}.json", log.swap_id));
        std::fs::write(path, serde_json::to_string_pretty(log)?)?;
        Ok(())
    }

    pub fn swap_history(&self) -> Vec<SwapLog> {
        let dir = self.base_dir.join("data/logs/swaps");
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut logs: Vec<SwapLog> = entries
            .filter_map(Result::ok)
            .filter_map(|e| std::fs::read_to_string(e.path()).ok())
            .filter_map(|s| serde_json::from_str(&s).ok())
            .collect();
        logs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        logs
    }
}

// ── POMOĆNE FUNKCIJE ──

fn sha256_file(path: &Path) -> Result<String, std::io::Error> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 65536];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn safe_name(model_id: &str) -> String {
    model_id.replace(['/', '\\', ' '], "_")
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// Otisak arhitekture iz imena modela: obitelj + broj parametara.
/// Modeli s istim otiskom dijele LoRA adaptere.
pub fn model_arch_fingerprint(model_id: &str) -> String {
    let lower = model_id.to_lowercase();
    const FAMILIES: [(&str, &str); 13] = [
        ("qwen3", "qwen3"),
        ("qwen2.5", "qwen2.5"),
        ("qwen2", "qwen2"),
        ("qwen", "qwen"),
        ("llama-3.3", "llama3.3"),
        ("llama-3.1", "llama3.1"),
        ("llama-3", "llama3"),
        ("llama3", "llama3"),
        ("llama", "llama"),
        ("deepseek-v3", "deepseek_v3"),
        ("deepseek", "deepseek"),
        ("mistral", "mistral"),
        ("phi", "phi"),
    ];

    static RE_PARAMS: once_cell::sync::Lazy<regex::Regex> =
        once_cell::sync::Lazy::new(|| regex::Regex::new(r"(\d+)b").expect("static regex"));

    for (pattern, family) in FAMILIES {
        if lower.contains(pattern) {
            let params = RE_PARAMS
                .captures(&lower)
                .map(|c| c[1].to_string())
                .unwrap_or_else(|| "unknown".to_string());
            return format!("{}_{}b", family, params);
        }
    }

    let mut hasher = Sha256::new();
    hasher.update(model_id.as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}
