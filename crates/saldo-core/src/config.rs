//! Konfiguracija: JSON datoteka + environment varijable.
//!
//! Bez tajni u kodu. `CoreConfig::load` čita `config.json` pa preko
//! njega primjenjuje `SALDO_*` varijable okoline, tako da deployment
//! mijenja ponašanje bez rekompajliranja.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Korijen svih podataka (baze, korpus, exporti, backupi).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
    #[serde(default = "default_backups_dir")]
    pub backups_dir: PathBuf,

    /// HTTP port gatewaya.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Port lokalnog inference servera.
    #[serde(default = "default_inference_port")]
    pub inference_port: u16,

    /// Sandbox mod za fiskalizaciju (produkcija tek uz eksplicitni off).
    #[serde(default = "default_true")]
    pub fiskalizacija_sandbox: bool,
    /// Sandbox mod za Peppol pristupnu točku.
    #[serde(default = "default_true")]
    pub peppol_sandbox: bool,

    /// Globalni limit istovremenih LLM generacija.
    #[serde(default = "default_max_concurrent")]
    pub llm_max_concurrent: usize,
    /// LLM zahtjeva po korisniku u minuti.
    #[serde(default = "default_max_per_minute")]
    pub llm_max_per_minute: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            models_dir: default_models_dir(),
            logs_dir: default_logs_dir(),
            backups_dir: default_backups_dir(),
            http_port: default_http_port(),
            inference_port: default_inference_port(),
            fiskalizacija_sandbox: true,
            peppol_sandbox: true,
            llm_max_concurrent: default_max_concurrent(),
            llm_max_per_minute: default_max_per_minute(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_models_dir() -> PathBuf {
    PathBuf::from("data/models")
}
fn default_logs_dir() -> PathBuf {
    PathBuf::from("data/logs")
}
fn default_backups_dir() -> PathBuf {
    PathBuf::from("data/backups")
}
fn default_http_port() -> u16 {
    8000
}
fn default_inference_port() -> u16 {
    8080
}
fn default_max_concurrent() -> usize {
    3
}
fn default_max_per_minute() -> u32 {
    10
}
fn default_true() -> bool {
    true
}

impl CoreConfig {
    /// Učitaj iz JSON datoteke (ako postoji) pa primijeni env varijable.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(path)?)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_string("SALDO_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = env_string("SALDO_MODELS_DIR") {
            self.models_dir = PathBuf::from(v);
        }
        if let Some(v) = env_parse::<u16>("SALDO_HTTP_PORT") {
            self.http_port = v;
        }
        if let Some(v) = env_parse::<u16>("SALDO_INFERENCE_PORT") {
            self.inference_port = v;
        }
        if let Some(v) = env_bool("SALDO_FISKALIZACIJA_SANDBOX") {
            self.fiskalizacija_sandbox = v;
        }
        if let Some(v) = env_bool("SALDO_PEPPOL_SANDBOX") {
            self.peppol_sandbox = v;
        }
        if let Some(v) = env_parse::<usize>("SALDO_LLM_MAX_CONCURRENT") {
            self.llm_max_concurrent = v;
        }
        if let Some(v) = env_parse::<u32>("SALDO_LLM_MAX_PER_MINUTE") {
            self.llm_max_per_minute = v;
        }
    }

    /// Korijen za Knowledge Vault: direktorij koji SADRŽI `data/`.
    pub fn vault_base_dir(&self) -> PathBuf {
        match self.data_dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn memory_db_path(&self) -> PathBuf {
        self.data_dir.join("memory_db/memory.db")
    }

    pub fn audit_db_path(&self) -> PathBuf {
        self.data_dir.join("audit/saldo.db")
    }

    pub fn rag_db_path(&self) -> PathBuf {
        self.data_dir.join("rag_db")
    }

    pub fn laws_dir(&self) -> PathBuf {
        self.data_dir.join("laws")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }

    pub fn dpo_dir(&self) -> PathBuf {
        self.data_dir.join("dpo_datasets")
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = CoreConfig::default();
        assert_eq!(c.http_port, 8000);
        assert_eq!(c.llm_max_concurrent, 3);
        assert_eq!(c.llm_max_per_minute, 10);
        assert!(c.fiskalizacija_sandbox);
        assert_eq!(c.memory_db_path(), PathBuf::from("data/memory_db/memory.db"));
    }

    #[test]
    fn load_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"http_port": 9000, "fiskalizacija_sandbox": false, "data_dir": "/srv/saldo"}"#,
        )
        .unwrap();

        let c = CoreConfig::load(&path).unwrap();
        assert_eq!(c.http_port, 9000);
        assert!(!c.fiskalizacija_sandbox);
        assert_eq!(c.data_dir, PathBuf::from("/srv/saldo"));
        // Nepostavljena polja zadržavaju default.
        assert_eq!(c.inference_port, 8080);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let c = CoreConfig::load(&dir.path().join("nema.json")).unwrap();
        assert_eq!(c.http_port, 8000);
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{nevaljan json").unwrap();
        assert!(CoreConfig::load(&path).is_err());
    }
}
