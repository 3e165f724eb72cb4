//! Adaptivni batch kontroler: pritisak memorije + termika → (batch, tokeni).
//!
//! | Pritisak  | Batch | Max tokena |
//! |-----------|-------|------------|
//! | nominal   | 8     | 4096       |
//! | elevated  | 6     | 4096       |
//! | warning   | 4     | 2048       |
//! | critical  | 2     | 1024       |
//! | emergency | 1     | 512        |
//!
//! Termalni faktor množi obje vrijednosti. Mapiranje je monotono: veći
//! pritisak ili toplija silicija nikad ne povećava batch; batch nikad
//! ne prelazi konfigurirani maksimum.

use crate::hardware::{PressureLevel, ThermalState};
use serde::{Deserialize, Serialize};

/// Konfiguracija batcha za 15 istovremenih korisnika.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub max_concurrent_users: usize,
    pub max_batch_size: u32,
    pub max_tokens_per_request: u32,
    pub kv_cache_per_user_gb: f64,
    pub current_batch_size: u32,
    pub current_max_tokens: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_users: 15,
            max_batch_size: 8,
            max_tokens_per_request: 4096,
            kv_cache_per_user_gb: 2.0,
            current_batch_size: 8,
            current_max_tokens: 4096,
        }
    }
}

fn pressure_scaling(pressure: PressureLevel) -> (u32, u32) {
    match pressure {
        PressureLevel::Nominal => (8, 4096),
        PressureLevel::Elevated => (6, 4096),
        PressureLevel::Warning => (4, 2048),
        PressureLevel::Critical => (2, 1024),
        PressureLevel::Emergency => (1, 512),
    }
}

fn thermal_factor(thermal: ThermalState) -> f64 {
    match thermal {
        ThermalState::Cool | ThermalState::Nominal => 1.0,
        ThermalState::Warm => 0.85,
        ThermalState::Hot => 0.65,
        ThermalState::Throttling => 0.40,
        ThermalState::Critical => 0.25,
    }
}

/// Kontroler: čita pritisak i termiku, vraća skaliranu konfiguraciju.
#[derive(Debug, Clone)]
pub struct AdaptiveBatchController {
    config: BatchConfig,
}

impl AdaptiveBatchController {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub fn compute(&self, pressure: PressureLevel, thermal: ThermalState) -> BatchConfig {
        let (base_batch, base_tokens) = pressure_scaling(pressure);
        let factor = thermal_factor(thermal);

        let batch = ((base_batch as f64 * factor) as u32)
            .clamp(1, self.config.max_batch_size);
        let tokens = ((base_tokens as f64 * factor) as u32)
            .clamp(256, self.config.max_tokens_per_request);

        let mut out = self.config.clone();
        out.current_batch_size = batch;
        out.current_max_tokens = tokens;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRESSURES: [PressureLevel; 5] = [
        PressureLevel::Nominal,
        PressureLevel::Elevated,
        PressureLevel::Warning,
        PressureLevel::Critical,
        PressureLevel::Emergency,
    ];
    const THERMALS: [ThermalState; 6] = [
        ThermalState::Cool,
        ThermalState::Nominal,
        ThermalState::Warm,
        ThermalState::Hot,
        ThermalState::Throttling,
        ThermalState::Critical,
    ];

    #[test]
    fn nominal_full_batch() {
        let c = AdaptiveBatchController::new(BatchConfig::default())
            .compute(PressureLevel::Nominal, ThermalState::Cool);
        assert_eq!(c.current_batch_size, 8);
        assert_eq!(c.current_max_tokens, 4096);
    }

    #[test]
    fn emergency_single_query() {
        let c = AdaptiveBatchController::new(BatchConfig::default())
            .compute(PressureLevel::Emergency, ThermalState::Critical);
        assert_eq!(c.current_batch_size, 1);
        assert_eq!(c.current_max_tokens, 256);
    }

    #[test]
    fn monotonic_in_pressure_for_every_thermal() {
        let ctrl = AdaptiveBatchController::new(BatchConfig::default());
        for thermal in THERMALS {
            let mut last_batch = u32::MAX;
            let mut last_tokens = u32::MAX;
            for pressure in PRESSURES {
                let c = ctrl.compute(pressure, thermal);
                assert!(
                    c.current_batch_size <= last_batch,
                    "batch raste s pritiskom: {:?}/{:?}",
                    pressure,
                    thermal
                );
                assert!(c.current_max_tokens <= last_tokens);
                last_batch = c.current_batch_size;
                last_tokens = c.current_max_tokens;
            }
        }
    }

    #[test]
    fn monotonic_in_thermal_for_every_pressure() {
        let ctrl = AdaptiveBatchController::new(BatchConfig::default());
        for pressure in PRESSURES {
            let mut last_batch = u32::MAX;
            for thermal in THERMALS {
                let c = ctrl.compute(pressure, thermal);
                assert!(c.current_batch_size <= last_batch);
                last_batch = c.current_batch_size;
            }
        }
    }

    #[test]
    fn never_exceeds_configured_max() {
        let mut config = BatchConfig::default();
        config.max_batch_size = 4;
        let ctrl = AdaptiveBatchController::new(config);
        for pressure in PRESSURES {
            for thermal in THERMALS {
                let c = ctrl.compute(pressure, thermal);
                assert!(c.current_batch_size <= 4);
                assert!(c.current_batch_size >= 1);
            }
        }
    }
}
