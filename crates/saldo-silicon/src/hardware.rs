//! Detekcija hardvera i očitanja pritiska memorije / termike.
//!
//! Na Apple Silicon stroju se čita `sysctl`; drugdje sustav radi u
//! simulacijskom modu s `sysinfo` očitanjima. Oba puta daju iste
//! razine pritiska, pa se ponašanje batch kontrolera ne mijenja.

use serde::{Deserialize, Serialize};
use std::process::Command;
use sysinfo::System;

/// Razina pritiska objedinjene memorije.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureLevel {
    /// < 70 % — puna brzina.
    Nominal,
    /// 70–80 % — manja prilagodba.
    Elevated,
    /// 80–88 % — prepolovi batch.
    Warning,
    /// 88–95 % — minimalni batch, izbaci hladno.
    Critical,
    /// > 95 % — jedan upit istovremeno.
    Emergency,
}

impl PressureLevel {
    pub fn from_utilization(util: f64) -> Self {
        if util < 0.70 {
            Self::Nominal
        } else if util < 0.80 {
            Self::Elevated
        } else if util < 0.88 {
            Self::Warning
        } else if util < 0.95 {
            Self::Critical
        } else {
            Self::Emergency
        }
    }
}

/// Termalno stanje čipa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermalState {
    Cool,
    Nominal,
    Warm,
    Hot,
    Throttling,
    Critical,
}

/// Otkriveni hardver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedHardware {
    pub chip_name: String,
    pub total_memory_gb: f64,
    pub cpu_cores: usize,
    pub is_apple_silicon: bool,
    pub hostname: String,
}

impl DetectedHardware {
    /// Preporučeni rang modela za raspoloživu memoriju.
    pub fn recommended_model_tier(&self) -> &'static str {
        if self.total_memory_gb >= 256.0 {
            "235B"
        } else if self.total_memory_gb >= 96.0 {
            "72B"
        } else if self.total_memory_gb >= 64.0 {
            "30B"
        } else {
            "8B"
        }
    }
}

/// Detektiraj hardver. Izvan macOS-a: simulacijski mod sa `sysinfo`.
pub fn detect_hardware() -> DetectedHardware {
    let mut sys = System::new_all();
    sys.refresh_memory();
    let total_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);
    let cpu_cores = sys.cpus().len();
    let hostname = System::host_name().unwrap_or_default();

    let chip_name = if cfg!(target_os = "macos") {
        sysctl_string("machdep.cpu.brand_string").unwrap_or_else(|| "Apple Silicon".to_string())
    } else {
        tracing::info!(target: "saldo::silicon", "nije macOS — simulacijski mod");
        "simulated".to_string()
    };

    DetectedHardware {
        is_apple_silicon: cfg!(target_os = "macos") && chip_name.contains("Apple"),
        chip_name,
        total_memory_gb: total_gb,
        cpu_cores,
        hostname,
    }
}

fn sysctl_string(key: &str) -> Option<String> {
    let output = Command::new("sysctl").args(["-n", key]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Trenutno stanje sistemske memorije.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub total_gb: f64,
    pub used_gb: f64,
    pub available_gb: f64,
    pub swap_used_gb: f64,
}

impl MemorySnapshot {
    pub fn utilization(&self) -> f64 {
        if self.total_gb == 0.0 {
            0.0
        } else {
            self.used_gb / self.total_gb
        }
    }

    pub fn pressure_level(&self) -> PressureLevel {
        PressureLevel::from_utilization(self.utilization())
    }

    pub fn is_swapping(&self) -> bool {
        self.swap_used_gb > 0.5
    }
}

/// Očitaj memoriju kroz `sysinfo`.
pub fn read_memory_snapshot() -> MemorySnapshot {
    let mut sys = System::new();
    sys.refresh_memory();
    let gb = |b: u64| b as f64 / (1024.0 * 1024.0 * 1024.0);
    MemorySnapshot {
        total_gb: gb(sys.total_memory()),
        used_gb: gb(sys.used_memory()),
        available_gb: gb(sys.available_memory()),
        swap_used_gb: gb(sys.used_swap()),
    }
}

/// Očitaj termalno stanje. macOS: `pmset -g therm` CPU_Speed_Limit;
/// drugdje uvijek `Nominal` (simulacija).
pub fn read_thermal_state() -> ThermalState {
    if !cfg!(target_os = "macos") {
        return ThermalState::Nominal;
    }
    let Some(out) = Command::new("pmset")
        .args(["-g", "therm"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).to_string())
    else {
        return ThermalState::Nominal;
    };

    // CPU_Speed_Limit ispod 100 znači throttling.
    let limit = out
        .lines()
        .find_map(|l| l.trim().strip_prefix("CPU_Speed_Limit"))
        .and_then(|rest| rest.split('=').nth(1))
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(100);

    match limit {
        100 => ThermalState::Nominal,
        80..=99 => ThermalState::Warm,
        60..=79 => ThermalState::Hot,
        30..=59 => ThermalState::Throttling,
        _ => ThermalState::Critical,
    }
}
