//! saldo-silicon: sloj L0 — hardver i očuvanje znanja.
//!
//! Radna stanica s objedinjenom memorijom (UMA) poslužuje 15 korisnika
//! na jednom čvoru: ovaj sloj mjeri pritisak memorije i termalno
//! stanje, dijeli memorijske budžete i skalira batch. Knowledge Vault
//! čuva svu naučenu inteligenciju (memorija, DPO parovi, LoRA adapteri,
//! RAG) preko svake zamjene modela.

pub mod batch;
pub mod hardware;
pub mod uma;
pub mod vault;

pub use batch::{AdaptiveBatchController, BatchConfig};
pub use hardware::{
    detect_hardware, read_memory_snapshot, DetectedHardware, MemorySnapshot, PressureLevel,
    ThermalState,
};
pub use uma::{MemoryPriority, MemoryRegionType, UmaController};
pub use vault::{
    AdapterRecord, AdapterStatus, IntegrityManifest, KnowledgeVault, LoraCompatibility, SwapLog,
    SwapPhase, VaultError,
};

use serde_json::json;

/// Glavni runtime koji veže hardver, UMA i batch kontroler.
/// Konstruira se jednom pri pokretanju i dijeli kroz `Services`.
pub struct SiliconRuntime {
    pub hardware: DetectedHardware,
    pub uma: UmaController,
    pub batch: AdaptiveBatchController,
}

impl SiliconRuntime {
    pub fn initialize() -> Self {
        let hardware = detect_hardware();
        let uma = UmaController::new(hardware.total_memory_gb);
        tracing::info!(
            target: "saldo::silicon",
            "SiliconRuntime: {} | {:.0} GB UMA",
            hardware.chip_name,
            hardware.total_memory_gb
        );
        Self {
            hardware,
            uma,
            batch: AdaptiveBatchController::new(BatchConfig::default()),
        }
    }

    /// Potpuna zdravstvena slika za dijagnostiku i UI.
    pub fn health_check(&self) -> serde_json::Value {
        let snapshot = read_memory_snapshot();
        let thermal = hardware::read_thermal_state();
        let batch = self.batch.compute(snapshot.pressure_level(), thermal);
        json!({
            "hardware": {
                "chip": self.hardware.chip_name,
                "total_memory_gb": self.hardware.total_memory_gb,
                "cpu_cores": self.hardware.cpu_cores,
                "is_apple_silicon": self.hardware.is_apple_silicon,
            },
            "memory": {
                "total_gb": snapshot.total_gb,
                "used_gb": snapshot.used_gb,
                "available_gb": snapshot.available_gb,
                "pressure": snapshot.pressure_level(),
                "uma": self.uma.status(),
            },
            "thermal": thermal,
            "batch": {
                "batch_size": batch.current_batch_size,
                "max_tokens": batch.current_max_tokens,
            },
        })
    }
}
