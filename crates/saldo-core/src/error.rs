//! Error taxonomy for the core crate.
//!
//! User-facing variants carry Croatian messages; operator-facing detail
//! stays in the source error. Validation and not-found are reported to
//! the caller, storage failures are logged and surfaced to the
//! administrator, never silenced.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed proposal: unbalanced lines, missing required field, bad OIB.
    #[error("Neispravan prijedlog: {0}")]
    InvalidProposal(String),

    /// Referenced proposal id is not in the expected state.
    #[error("Prijedlog {0} nije u pending statusu")]
    NotFound(String),

    /// Export filter matched nothing.
    #[error("Nema odobrenih knjiženja za export")]
    NothingToExport,

    /// Export file could not be written; no status was advanced.
    #[error("Export nije uspio: {0}")]
    ExportFailed(#[from] std::io::Error),

    #[error("Greška baze: {0}")]
    Storage(#[from] rusqlite::Error),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Greška memorijske baze: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Izvoz preferencijskih parova nije uspio: {0}")]
    Export(#[from] std::io::Error),

    /// Fewer unconsumed pairs than the export threshold.
    #[error("Premalo preferencijskih parova: {got} (potrebno {need})")]
    NotEnoughPairs { got: usize, need: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Konfiguracijska datoteka nije čitljiva: {0}")]
    Io(#[from] std::io::Error),

    #[error("Konfiguracija nije ispravan JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
